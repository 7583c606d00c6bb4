//! In-memory store
//!
//! Same transactional contract as the redb backend: readers work on an
//! immutable snapshot, a single writer edits a private copy that replaces the
//! snapshot on commit. Nothing survives the process.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::database::{ReadTxn, Store, WriteTxn};
use crate::error::StoreError;
use crate::model::{Link, LinkId, LinkList, ListKind};

#[derive(Clone, Default)]
struct Tables {
    links: BTreeMap<LinkId, Link>,
    urls: BTreeMap<String, LinkId>,
    lists: BTreeMap<String, LinkList>,
    regex_names: BTreeSet<String>,
    variables: BTreeMap<String, String>,
    next_id: u64,
}

impl Tables {
    fn link(&self, id: LinkId) -> Option<Link> {
        self.links.get(&id).cloned()
    }

    fn list(&self, name: &str) -> Option<LinkList> {
        self.lists.get(name).cloned()
    }

    fn regex_lists(&self) -> Vec<LinkList> {
        self.regex_names
            .iter()
            .filter_map(|name| self.list(name))
            .collect()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    committed: RwLock<Arc<Tables>>,
    writer: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn begin_read(&self) -> Result<Box<dyn ReadTxn + '_>, StoreError> {
        let snapshot = Arc::clone(&*self.committed.read());
        Ok(Box::new(MemoryRead { tables: snapshot }))
    }

    fn begin_write(&self) -> Result<Box<dyn WriteTxn + '_>, StoreError> {
        let guard = self.writer.lock();
        let tables = Tables::clone(&*self.committed.read());
        Ok(Box::new(MemoryWrite {
            store: self,
            _writer: guard,
            tables,
        }))
    }
}

struct MemoryRead {
    tables: Arc<Tables>,
}

struct MemoryWrite<'a> {
    store: &'a MemoryStore,
    _writer: MutexGuard<'a, ()>,
    tables: Tables,
}

impl ReadTxn for MemoryRead {
    fn link(&self, id: LinkId) -> Result<Option<Link>, StoreError> {
        Ok(self.tables.link(id))
    }

    fn link_id_by_url(&self, url: &str) -> Result<Option<LinkId>, StoreError> {
        Ok(self.tables.urls.get(url).copied())
    }

    fn list(&self, name: &str) -> Result<Option<LinkList>, StoreError> {
        Ok(self.tables.list(name))
    }

    fn links(&self) -> Result<Vec<Link>, StoreError> {
        Ok(self.tables.links.values().cloned().collect())
    }

    fn lists(&self) -> Result<Vec<LinkList>, StoreError> {
        Ok(self.tables.lists.values().cloned().collect())
    }

    fn regex_lists(&self) -> Result<Vec<LinkList>, StoreError> {
        Ok(self.tables.regex_lists())
    }

    fn variables(&self) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self.tables.variables.clone())
    }
}

impl ReadTxn for MemoryWrite<'_> {
    fn link(&self, id: LinkId) -> Result<Option<Link>, StoreError> {
        Ok(self.tables.link(id))
    }

    fn link_id_by_url(&self, url: &str) -> Result<Option<LinkId>, StoreError> {
        Ok(self.tables.urls.get(url).copied())
    }

    fn list(&self, name: &str) -> Result<Option<LinkList>, StoreError> {
        Ok(self.tables.list(name))
    }

    fn links(&self) -> Result<Vec<Link>, StoreError> {
        Ok(self.tables.links.values().cloned().collect())
    }

    fn lists(&self) -> Result<Vec<LinkList>, StoreError> {
        Ok(self.tables.lists.values().cloned().collect())
    }

    fn regex_lists(&self) -> Result<Vec<LinkList>, StoreError> {
        Ok(self.tables.regex_lists())
    }

    fn variables(&self) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self.tables.variables.clone())
    }
}

impl WriteTxn for MemoryWrite<'_> {
    fn next_id(&mut self) -> Result<LinkId, StoreError> {
        let next = self.tables.next_id.max(1);
        self.tables.next_id = next + 1;
        Ok(LinkId(next))
    }

    fn put_link(&mut self, link: &Link) -> Result<(), StoreError> {
        if let Some(owner) = self.tables.urls.get(&link.url) {
            if *owner != link.id {
                return Err(StoreError::UniqueViolation(format!(
                    "url {} belongs to link {}",
                    link.url, owner
                )));
            }
        }

        if let Some(previous) = self.tables.links.get(&link.id) {
            if previous.url != link.url {
                self.tables.urls.remove(&previous.url);
            }
        }

        self.tables.urls.insert(link.url.clone(), link.id);
        self.tables.links.insert(link.id, link.clone());
        Ok(())
    }

    fn remove_link(&mut self, id: LinkId) -> Result<(), StoreError> {
        if let Some(link) = self.tables.links.remove(&id) {
            self.tables.urls.remove(&link.url);
        }
        Ok(())
    }

    fn put_list(&mut self, list: &LinkList) -> Result<(), StoreError> {
        if let Some(existing) = self.tables.lists.get(&list.name) {
            if existing.id != list.id {
                return Err(StoreError::UniqueViolation(format!(
                    "list name {} is taken",
                    list.name
                )));
            }
        }

        self.tables.lists.insert(list.name.clone(), list.clone());
        if list.kind == ListKind::Regex {
            self.tables.regex_names.insert(list.name.clone());
        } else {
            self.tables.regex_names.remove(&list.name);
        }
        Ok(())
    }

    fn remove_list(&mut self, name: &str) -> Result<(), StoreError> {
        self.tables.lists.remove(name);
        self.tables.regex_names.remove(name);
        Ok(())
    }

    fn set_variable(&mut self, name: &str, value: &str) -> Result<(), StoreError> {
        self.tables
            .variables
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryWrite {
            store,
            _writer: writer,
            tables,
        } = *self;
        *store.committed.write() = Arc::new(tables);
        // the next writer must see the new snapshot
        drop(writer);
        Ok(())
    }
}
