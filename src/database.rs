//! Persistence traits and the embedded redb store
//!
//! The registry only talks to the [`Store`] traits: a read transaction that
//! sees a consistent snapshot, and a write transaction that either commits as
//! a whole or is rolled back when dropped. [`RedbStore`] is the default
//! backend; [`crate::memory::MemoryStore`] implements the same contract in
//! memory.

use std::collections::BTreeMap;
use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::model::{Link, LinkId, LinkList, ListKind};

/// Link records
///
/// Key: link id
/// Value: JSON-serialized `Link`
pub const TABLE_LINKS: TableDefinition<u64, &str> = TableDefinition::new("links_v1");

/// Unique index from link URL to link id
///
/// Every entry in `TABLE_LINKS` has exactly one entry here, keyed by its
/// current URL.
pub const TABLE_LINK_URLS: TableDefinition<&str, u64> = TableDefinition::new("link_urls_v1");

/// List records, keyword and regex lists alike
///
/// Key: list name (sanitized keyword or regex pattern)
/// Value: JSON-serialized `LinkList`
pub const TABLE_LISTS: TableDefinition<&str, &str> = TableDefinition::new("lists_v1");

/// Names of the lists whose kind is `regex`
///
/// Lets a keyword miss scan the regex lists without reading every keyword
/// list. Maintained by `put_list` and `remove_list`.
pub const TABLE_REGEX_LISTS: TableDefinition<&str, ()> = TableDefinition::new("regex_lists_v1");

/// Global URL template variables
pub const TABLE_VARIABLES: TableDefinition<&str, &str> = TableDefinition::new("variables_v1");

/// Counters; currently only the id sequence shared by links and lists
pub const TABLE_META: TableDefinition<&str, u64> = TableDefinition::new("meta_v1");

const NEXT_ID_KEY: &str = "next_id";

/// Set once the regex list index has been built from `TABLE_LISTS`
const REGEX_INDEX_KEY: &str = "regex_index_built";

/// Read access to a consistent snapshot of the store
pub trait ReadTxn {
    fn link(&self, id: LinkId) -> Result<Option<Link>, StoreError>;

    fn link_id_by_url(&self, url: &str) -> Result<Option<LinkId>, StoreError>;

    fn list(&self, name: &str) -> Result<Option<LinkList>, StoreError>;

    /// All links in id order
    fn links(&self) -> Result<Vec<Link>, StoreError>;

    /// All lists in name order
    fn lists(&self) -> Result<Vec<LinkList>, StoreError>;

    /// Regex lists only, in name order
    fn regex_lists(&self) -> Result<Vec<LinkList>, StoreError>;

    fn variables(&self) -> Result<BTreeMap<String, String>, StoreError>;
}

/// A write transaction; dropping it without [`WriteTxn::commit`] discards
/// every change
pub trait WriteTxn: ReadTxn {
    /// Allocates the next link/list id
    fn next_id(&mut self) -> Result<LinkId, StoreError>;

    /// Inserts or replaces a link and keeps the URL index in step.
    ///
    /// Fails with [`StoreError::UniqueViolation`] if another link owns the URL.
    fn put_link(&mut self, link: &Link) -> Result<(), StoreError>;

    fn remove_link(&mut self, id: LinkId) -> Result<(), StoreError>;

    /// Inserts or replaces a list by name.
    ///
    /// Fails with [`StoreError::UniqueViolation`] if a different list (by id)
    /// already has the name.
    fn put_list(&mut self, list: &LinkList) -> Result<(), StoreError>;

    fn remove_list(&mut self, name: &str) -> Result<(), StoreError>;

    fn set_variable(&mut self, name: &str, value: &str) -> Result<(), StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Transactional storage for links, lists and variables
pub trait Store: Send + Sync {
    fn begin_read(&self) -> Result<Box<dyn ReadTxn + '_>, StoreError>;

    fn begin_write(&self) -> Result<Box<dyn WriteTxn + '_>, StoreError>;
}

/// Embedded, file-backed store
pub struct RedbStore {
    db: Database,
}

/// Initializes the embedded database and creates required tables
///
/// This function:
/// 1. Creates or opens the database file at the specified path
/// 2. Opens every table so later read transactions never miss one
/// 3. Commits the transaction to ensure tables are persisted
///
/// # Example
///
/// ```no_run
/// # use golinks::database::init_db;
/// let store = init_db("data.db").expect("Failed to initialize database");
/// ```
pub fn init_db(db_path: impl AsRef<Path>) -> Result<RedbStore, StoreError> {
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_LINKS)?;
        write_txn.open_table(TABLE_LINK_URLS)?;
        write_txn.open_table(TABLE_LISTS)?;
        write_txn.open_table(TABLE_VARIABLES)?;
        write_txn.open_table(TABLE_REGEX_LISTS)?;
    }
    build_regex_index(&write_txn)?;
    write_txn.commit()?;

    Ok(RedbStore { db })
}

/// Fills the regex list index for databases written before it existed.
fn build_regex_index(txn: &redb::WriteTransaction) -> Result<(), StoreError> {
    let mut meta = txn.open_table(TABLE_META)?;
    if meta.get(REGEX_INDEX_KEY)?.is_some() {
        return Ok(());
    }

    let lists = all_lists(&txn.open_table(TABLE_LISTS)?)?;
    let mut index = txn.open_table(TABLE_REGEX_LISTS)?;
    for list in lists.iter().filter(|list| list.kind == ListKind::Regex) {
        index.insert(list.name.as_str(), ())?;
    }
    meta.insert(REGEX_INDEX_KEY, 1)?;
    Ok(())
}

impl Store for RedbStore {
    fn begin_read(&self) -> Result<Box<dyn ReadTxn + '_>, StoreError> {
        Ok(Box::new(RedbRead {
            txn: self.db.begin_read()?,
        }))
    }

    fn begin_write(&self) -> Result<Box<dyn WriteTxn + '_>, StoreError> {
        Ok(Box::new(RedbWrite {
            txn: self.db.begin_write()?,
        }))
    }
}

struct RedbRead {
    txn: redb::ReadTransaction,
}

struct RedbWrite {
    txn: redb::WriteTransaction,
}

fn get_link(
    table: &impl ReadableTable<u64, &'static str>,
    id: LinkId,
) -> Result<Option<Link>, StoreError> {
    match table.get(id.0)? {
        Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
        None => Ok(None),
    }
}

fn get_url(
    table: &impl ReadableTable<&'static str, u64>,
    url: &str,
) -> Result<Option<LinkId>, StoreError> {
    Ok(table.get(url)?.map(|guard| LinkId(guard.value())))
}

fn get_list(
    table: &impl ReadableTable<&'static str, &'static str>,
    name: &str,
) -> Result<Option<LinkList>, StoreError> {
    match table.get(name)? {
        Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
        None => Ok(None),
    }
}

fn all_links(table: &impl ReadableTable<u64, &'static str>) -> Result<Vec<Link>, StoreError> {
    let mut links = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        links.push(serde_json::from_str(value.value())?);
    }
    Ok(links)
}

fn all_lists(
    table: &impl ReadableTable<&'static str, &'static str>,
) -> Result<Vec<LinkList>, StoreError> {
    let mut lists = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        lists.push(serde_json::from_str(value.value())?);
    }
    Ok(lists)
}

fn indexed_regex_lists(
    index: &impl ReadableTable<&'static str, ()>,
    lists: &impl ReadableTable<&'static str, &'static str>,
) -> Result<Vec<LinkList>, StoreError> {
    let mut regex_lists = Vec::new();
    for entry in index.iter()? {
        let (name, _) = entry?;
        if let Some(list) = get_list(lists, name.value())? {
            regex_lists.push(list);
        }
    }
    Ok(regex_lists)
}

fn all_variables(
    table: &impl ReadableTable<&'static str, &'static str>,
) -> Result<BTreeMap<String, String>, StoreError> {
    let mut vars = BTreeMap::new();
    for entry in table.iter()? {
        let (key, value) = entry?;
        vars.insert(key.value().to_string(), value.value().to_string());
    }
    Ok(vars)
}

impl ReadTxn for RedbRead {
    fn link(&self, id: LinkId) -> Result<Option<Link>, StoreError> {
        get_link(&self.txn.open_table(TABLE_LINKS)?, id)
    }

    fn link_id_by_url(&self, url: &str) -> Result<Option<LinkId>, StoreError> {
        get_url(&self.txn.open_table(TABLE_LINK_URLS)?, url)
    }

    fn list(&self, name: &str) -> Result<Option<LinkList>, StoreError> {
        get_list(&self.txn.open_table(TABLE_LISTS)?, name)
    }

    fn links(&self) -> Result<Vec<Link>, StoreError> {
        all_links(&self.txn.open_table(TABLE_LINKS)?)
    }

    fn lists(&self) -> Result<Vec<LinkList>, StoreError> {
        all_lists(&self.txn.open_table(TABLE_LISTS)?)
    }

    fn regex_lists(&self) -> Result<Vec<LinkList>, StoreError> {
        indexed_regex_lists(
            &self.txn.open_table(TABLE_REGEX_LISTS)?,
            &self.txn.open_table(TABLE_LISTS)?,
        )
    }

    fn variables(&self) -> Result<BTreeMap<String, String>, StoreError> {
        all_variables(&self.txn.open_table(TABLE_VARIABLES)?)
    }
}

impl ReadTxn for RedbWrite {
    fn link(&self, id: LinkId) -> Result<Option<Link>, StoreError> {
        get_link(&self.txn.open_table(TABLE_LINKS)?, id)
    }

    fn link_id_by_url(&self, url: &str) -> Result<Option<LinkId>, StoreError> {
        get_url(&self.txn.open_table(TABLE_LINK_URLS)?, url)
    }

    fn list(&self, name: &str) -> Result<Option<LinkList>, StoreError> {
        get_list(&self.txn.open_table(TABLE_LISTS)?, name)
    }

    fn links(&self) -> Result<Vec<Link>, StoreError> {
        all_links(&self.txn.open_table(TABLE_LINKS)?)
    }

    fn lists(&self) -> Result<Vec<LinkList>, StoreError> {
        all_lists(&self.txn.open_table(TABLE_LISTS)?)
    }

    fn regex_lists(&self) -> Result<Vec<LinkList>, StoreError> {
        indexed_regex_lists(
            &self.txn.open_table(TABLE_REGEX_LISTS)?,
            &self.txn.open_table(TABLE_LISTS)?,
        )
    }

    fn variables(&self) -> Result<BTreeMap<String, String>, StoreError> {
        all_variables(&self.txn.open_table(TABLE_VARIABLES)?)
    }
}

impl WriteTxn for RedbWrite {
    fn next_id(&mut self) -> Result<LinkId, StoreError> {
        let mut meta = self.txn.open_table(TABLE_META)?;
        let next = meta.get(NEXT_ID_KEY)?.map(|guard| guard.value()).unwrap_or(1);
        meta.insert(NEXT_ID_KEY, next + 1)?;
        Ok(LinkId(next))
    }

    fn put_link(&mut self, link: &Link) -> Result<(), StoreError> {
        let previous_url = self.link(link.id)?.map(|previous| previous.url);
        let record_json = serde_json::to_string(link)?;

        {
            let mut urls = self.txn.open_table(TABLE_LINK_URLS)?;

            if let Some(owner) = get_url(&urls, &link.url)? {
                if owner != link.id {
                    return Err(StoreError::UniqueViolation(format!(
                        "url {} belongs to link {}",
                        link.url, owner
                    )));
                }
            }

            if let Some(previous_url) = previous_url.filter(|url| *url != link.url) {
                urls.remove(previous_url.as_str())?;
            }
            urls.insert(link.url.as_str(), link.id.0)?;
        }

        let mut links = self.txn.open_table(TABLE_LINKS)?;
        links.insert(link.id.0, record_json.as_str())?;
        Ok(())
    }

    fn remove_link(&mut self, id: LinkId) -> Result<(), StoreError> {
        let Some(link) = self.link(id)? else {
            return Ok(());
        };

        {
            let mut urls = self.txn.open_table(TABLE_LINK_URLS)?;
            urls.remove(link.url.as_str())?;
        }
        let mut links = self.txn.open_table(TABLE_LINKS)?;
        links.remove(id.0)?;
        Ok(())
    }

    fn put_list(&mut self, list: &LinkList) -> Result<(), StoreError> {
        let mut lists = self.txn.open_table(TABLE_LISTS)?;

        if let Some(existing) = get_list(&lists, &list.name)? {
            if existing.id != list.id {
                return Err(StoreError::UniqueViolation(format!(
                    "list name {} is taken",
                    list.name
                )));
            }
        }

        let record_json = serde_json::to_string(list)?;
        lists.insert(list.name.as_str(), record_json.as_str())?;

        let mut index = self.txn.open_table(TABLE_REGEX_LISTS)?;
        if list.kind == ListKind::Regex {
            index.insert(list.name.as_str(), ())?;
        } else {
            index.remove(list.name.as_str())?;
        }
        Ok(())
    }

    fn remove_list(&mut self, name: &str) -> Result<(), StoreError> {
        let mut lists = self.txn.open_table(TABLE_LISTS)?;
        lists.remove(name)?;
        let mut index = self.txn.open_table(TABLE_REGEX_LISTS)?;
        index.remove(name)?;
        Ok(())
    }

    fn set_variable(&mut self, name: &str, value: &str) -> Result<(), StoreError> {
        let mut vars = self.txn.open_table(TABLE_VARIABLES)?;
        vars.insert(name, value)?;
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.txn.commit()?;
        Ok(())
    }
}
