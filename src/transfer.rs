//! Whole-database export and import
//!
//! A snapshot is plain JSON holding every link, list and variable. Import
//! assigns fresh ids, so a snapshot can be loaded into a database that
//! already has content as long as no URL or list name collides.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GoError, StoreError};
use crate::keyword::{canonical_url, check_url, check_variable_value};
use crate::model::{Link, LinkId, LinkList, Policy};
use crate::registry::LinkDatabase;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Snapshot {
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub lists: Vec<LinkList>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub links: usize,
    pub lists: usize,
    pub variables: usize,
}

impl LinkDatabase {
    pub fn export_snapshot(&self) -> Result<Snapshot, GoError> {
        let txn = self.store().begin_read()?;
        Ok(Snapshot {
            variables: txn.variables()?,
            links: txn.links()?,
            lists: txn.lists()?,
        })
    }

    /// Loads a snapshot in one transaction; any collision aborts all of it.
    ///
    /// Ids are reassigned. List names and URLs are validated as if they were
    /// entered by hand. Lists left without members are skipped, and links
    /// only keep back-references to lists that were actually imported.
    pub fn import_snapshot(&self, snapshot: Snapshot) -> Result<ImportSummary, GoError> {
        let mut txn = self.store().begin_write()?;
        let mut ids: HashMap<LinkId, LinkId> = HashMap::new();

        let mut links = Vec::with_capacity(snapshot.links.len());
        for mut link in snapshot.links {
            let url = canonical_url(&link.url);
            check_url(&url)?;
            if let Some(owner) = txn.link_id_by_url(&url)? {
                let existing = txn.link(owner)?.unwrap_or_else(|| link.clone());
                return Err(GoError::UrlConflict(Box::new(existing)));
            }
            link.set_url(url);

            let id = txn.next_id()?;
            ids.insert(link.id, id);
            link.id = id;
            links.push(link);
        }

        // old list name -> imported list
        let mut imported: BTreeMap<String, LinkList> = BTreeMap::new();
        for mut list in snapshot.lists {
            let generative = list.name.ends_with('/');
            let (name, kind) = self.normalize_list_name(&list.name, generative)?;

            list.links = list.links.iter().filter_map(|id| ids.get(id).copied()).collect();
            if list.links.is_empty() {
                continue;
            }
            if txn.list(&name)?.is_some() || imported.values().any(|other| other.name == name) {
                return Err(GoError::ListConflict(name));
            }

            if let Policy::Link(target) = list.policy {
                list.policy = ids.get(&target).map_or(Policy::List, |id| Policy::Link(*id));
            }
            list.id = txn.next_id()?;
            let old_name = std::mem::replace(&mut list.name, name);
            list.kind = kind;
            imported.insert(old_name, list);
        }

        for link in &mut links {
            let mut names: Vec<String> = link
                .lists
                .iter()
                .filter_map(|old| imported.get(old))
                .filter(|list| list.contains(link.id))
                .map(|list| list.name.clone())
                .collect();
            for list in imported.values() {
                if list.contains(link.id) && !names.contains(&list.name) {
                    names.push(list.name.clone());
                }
            }
            link.lists = names;

            // two snapshot links sharing a url
            txn.put_link(link).map_err(|err| match err {
                StoreError::UniqueViolation(_) => GoError::UrlConflict(Box::new(link.clone())),
                other => GoError::Store(other),
            })?;
        }

        for list in imported.values() {
            txn.put_list(list)?;
        }

        for (name, value) in &snapshot.variables {
            check_variable_value(value)?;
            txn.set_variable(name, value)?;
        }
        txn.commit()?;

        let summary = ImportSummary {
            links: links.len(),
            lists: imported.len(),
            variables: snapshot.variables.len(),
        };
        info!(
            "imported {} links, {} lists, {} variables",
            summary.links, summary.lists, summary.variables
        );
        Ok(summary)
    }

    /// Writes one `lists<TAB>title<TAB>url` line per link.
    pub fn dump_tsv(&self, out: &mut impl Write) -> Result<(), GoError> {
        let txn = self.store().begin_read()?;
        for link in txn.links()? {
            let lists = if link.lists.is_empty() {
                "None".to_string()
            } else {
                link.lists.join("|")
            };
            writeln!(out, "{}\t{}\t{}", lists, link.title, link.url).map_err(StoreError::from)?;
        }
        Ok(())
    }
}
