//! The link registry
//!
//! [`LinkDatabase`] is the only way to change links and lists. Every
//! operation validates its input first and then runs in a single write
//! transaction, so the URL and name indices can never disagree with the
//! records they point at.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use serde::Serialize;
use tracing::{debug, info};

use crate::clicks::day_of;
use crate::database::{ReadTxn, Store, WriteTxn};
use crate::error::{GoError, StoreError};
use crate::keyword::{
    canonical_url, check_url, check_variable_value, is_regex_name, render_template, sanitize,
    TemplateArgs,
};
use crate::memory::MemoryStore;
use crate::model::{Link, LinkId, LinkList, LinkUpdate, ListKind, Policy};
use crate::ranking::rank_by_popularity;
use crate::resolver::{compile_pattern, pick_target, PatternCache, Resolution};

/// A list together with its member links, in list order
#[derive(Serialize, Debug, Clone)]
pub struct ListView {
    pub list: LinkList,
    pub links: Vec<Link>,
}

/// Owner of all links and lists
pub struct LinkDatabase {
    store: Arc<dyn Store>,
    pub(crate) patterns: PatternCache,
}

impl LinkDatabase {
    pub fn new(store: impl Store + 'static) -> Self {
        Self {
            store: Arc::new(store),
            patterns: PatternCache::default(),
        }
    }

    /// Registry backed by the in-memory store
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Number of regex list patterns currently held compiled
    pub fn cached_pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Validates a list name and tells which kind of list it denotes.
    ///
    /// Keyword names are sanitized; `generative` appends the trailing `/`
    /// that marks a list of `{*}` links.
    pub fn normalize_list_name(
        &self,
        name: &str,
        generative: bool,
    ) -> Result<(String, ListKind), GoError> {
        let name = name.trim();
        if is_regex_name(name) {
            compile_pattern(name)?;
            return Ok((name.to_string(), ListKind::Regex));
        }

        let mut sane = sanitize(name)?;
        if generative && !sane.ends_with('/') {
            sane.push('/');
        }
        Ok((sane, ListKind::Keyword))
    }

    fn normalize_list_names(
        &self,
        names: &[String],
        generative: bool,
    ) -> Result<Vec<(String, ListKind)>, GoError> {
        let mut seen = BTreeSet::new();
        let mut normalized = Vec::new();
        for name in names.iter().filter(|name| !name.trim().is_empty()) {
            let (name, kind) = self.normalize_list_name(name, generative)?;
            if seen.insert(name.clone()) {
                normalized.push((name, kind));
            }
        }
        Ok(normalized)
    }

    fn lookup_name(&self, name: &str) -> Result<String, GoError> {
        self.normalize_list_name(name, false).map(|(name, _)| name)
    }

    pub fn get_link(&self, id: LinkId) -> Result<Link, GoError> {
        let txn = self.store.begin_read()?;
        txn.link(id)?.ok_or(GoError::LinkNotFound(id))
    }

    pub fn get_list(&self, name: &str) -> Result<LinkList, GoError> {
        let name = self.lookup_name(name)?;
        let txn = self.store.begin_read()?;
        txn.list(&name)?.ok_or(GoError::ListNotFound(name))
    }

    /// A list and its links, for list pages
    pub fn list_links(&self, name: &str) -> Result<ListView, GoError> {
        let name = self.lookup_name(name)?;
        let txn = self.store.begin_read()?;
        let list = txn.list(&name)?.ok_or(GoError::ListNotFound(name))?;
        let links = members(txn.as_ref(), &list)?;
        Ok(ListView { list, links })
    }

    /// Every list, most popular first
    pub fn all_lists(&self) -> Result<Vec<LinkList>, GoError> {
        let txn = self.store.begin_read()?;
        Ok(rank_by_popularity(txn.lists()?))
    }

    /// The `n` most popular links
    pub fn top_links(&self, n: usize) -> Result<Vec<Link>, GoError> {
        let txn = self.store.begin_read()?;
        let mut ranked = rank_by_popularity(txn.links()?);
        ranked.truncate(n);
        Ok(ranked)
    }

    /// Links that expand into many destinations: members of regex or
    /// generative lists, and links whose URL has a `{*}` placeholder
    pub fn special_links(&self) -> Result<Vec<Link>, GoError> {
        let txn = self.store.begin_read()?;
        let mut ids: BTreeSet<LinkId> = txn
            .lists()?
            .iter()
            .filter(|list| list.is_generative())
            .flat_map(|list| list.links.iter().copied())
            .collect();

        let links = txn.links()?;
        ids.extend(links.iter().filter(|l| l.regex_generated).map(|l| l.id));

        Ok(links.into_iter().filter(|l| ids.contains(&l.id)).collect())
    }

    /// The most clicked list whose redirect lands on this link
    pub fn main_keyword(&self, id: LinkId) -> Result<Option<LinkList>, GoError> {
        let txn = self.store.begin_read()?;
        let link = txn.link(id)?.ok_or(GoError::LinkNotFound(id))?;
        main_keyword_of(txn.as_ref(), &link)
    }

    pub fn variables(&self) -> Result<BTreeMap<String, String>, GoError> {
        let txn = self.store.begin_read()?;
        Ok(txn.variables()?)
    }

    pub fn set_variable(&self, name: &str, value: &str) -> Result<(), GoError> {
        let name = name.trim();
        if name.is_empty() || name.contains(['{', '}']) || name == "*" {
            return Err(GoError::InvalidInput(format!("invalid variable name '{}'", name)));
        }
        if name.chars().all(|c| c.is_ascii_digit()) {
            return Err(GoError::InvalidInput(format!("invalid variable name '{}'", name)));
        }
        check_variable_value(value)?;

        let mut txn = self.store.begin_write()?;
        txn.set_variable(name, value)?;
        txn.commit()?;

        info!("variable {} set", name);
        Ok(())
    }

    /// Creates a link filed under `lists`, creating lists on first use.
    ///
    /// A URL that already belongs to a link is a conflict carrying that link.
    pub fn create_link(
        &self,
        lists: &[String],
        url: &str,
        title: &str,
        editor: &str,
    ) -> Result<Link, GoError> {
        let url = canonical_url(url);
        check_url(&url)?;

        let mut link = Link::new(LinkId(0), url, title.trim());
        let names = self.normalize_list_names(lists, link.regex_generated)?;
        if names.is_empty() {
            return Err(GoError::InvalidInput(
                "a link needs at least one keyword".to_string(),
            ));
        }

        let mut txn = self.store.begin_write()?;
        if let Some(existing) = txn.link_id_by_url(&link.url)? {
            let existing = txn.link(existing)?.ok_or(GoError::LinkNotFound(existing))?;
            return Err(GoError::UrlConflict(Box::new(existing)));
        }

        link.id = txn.next_id()?;
        link.edited_by(editor, Utc::now());

        for (name, kind) in names {
            add_to_list(txn.as_mut(), &name, kind, link.id)?;
            link.lists.push(name);
        }

        txn.put_link(&link).map_err(|err| url_conflict(err, &link))?;
        txn.commit()?;

        info!("link {} created for {:?} by {}", link.id, link.lists, editor);
        Ok(link)
    }

    /// Changes url, title and/or list membership of a link.
    ///
    /// Lists the link leaves are deleted when they become empty.
    pub fn update_link(
        &self,
        id: LinkId,
        update: LinkUpdate,
        editor: &str,
    ) -> Result<Link, GoError> {
        let mut txn = self.store.begin_write()?;
        let mut link = txn.link(id)?.ok_or(GoError::LinkNotFound(id))?;

        if let Some(url) = update.url {
            let url = canonical_url(&url);
            check_url(&url)?;
            if let Some(owner) = txn.link_id_by_url(&url)? {
                if owner != id {
                    let existing = txn.link(owner)?.ok_or(GoError::LinkNotFound(owner))?;
                    return Err(GoError::UrlConflict(Box::new(existing)));
                }
            }
            link.set_url(url);
        }

        if let Some(title) = update.title {
            link.title = title.trim().to_string();
        }

        let requested = update.lists.unwrap_or_else(|| link.lists.clone());
        let names = self.normalize_list_names(&requested, link.regex_generated)?;
        if names.is_empty() {
            return Err(GoError::InvalidInput(
                "delete links that have no keywords instead".to_string(),
            ));
        }

        let wanted: BTreeSet<&str> = names.iter().map(|(name, _)| name.as_str()).collect();
        for name in link.lists.iter().filter(|name| !wanted.contains(name.as_str())) {
            remove_from_list(txn.as_mut(), &self.patterns, name, id)?;
        }
        for (name, kind) in &names {
            if !link.lists.contains(name) {
                add_to_list(txn.as_mut(), name, *kind, id)?;
            }
        }

        link.lists = names.into_iter().map(|(name, _)| name).collect();
        link.edited_by(editor, Utc::now());

        txn.put_link(&link).map_err(|err| url_conflict(err, &link))?;
        txn.commit()?;

        info!("link {} updated by {}", id, editor);
        Ok(link)
    }

    /// Deletes a link, removing it from every list; emptied lists go too.
    pub fn delete_link(&self, id: LinkId) -> Result<(), GoError> {
        let mut txn = self.store.begin_write()?;
        let link = txn.link(id)?.ok_or(GoError::LinkNotFound(id))?;

        for name in &link.lists {
            remove_from_list(txn.as_mut(), &self.patterns, name, id)?;
        }
        txn.remove_link(id)?;
        txn.commit()?;

        info!("link {} deleted", id);
        Ok(())
    }

    /// Deletes a list. Its links stay, they only lose the membership.
    pub fn delete_list(&self, name: &str) -> Result<(), GoError> {
        let name = self.lookup_name(name)?;
        let mut txn = self.store.begin_write()?;
        let list = txn.list(&name)?.ok_or_else(|| GoError::ListNotFound(name.clone()))?;

        for id in &list.links {
            if let Some(mut link) = txn.link(*id)? {
                link.lists.retain(|member| *member != name);
                txn.put_link(&link)?;
            }
        }
        txn.remove_list(&name)?;
        txn.commit()?;
        self.patterns.evict(&name);

        info!("list {} deleted", name);
        Ok(())
    }

    /// Renames a list and rewrites the back-references of its links.
    ///
    /// A generative keyword list stays generative under its new name.
    pub fn rename_list(&self, old: &str, new: &str) -> Result<LinkList, GoError> {
        let old = self.lookup_name(old)?;
        let (new, kind) = self.normalize_list_name(new, old.ends_with('/'))?;

        let mut txn = self.store.begin_write()?;
        let mut list = txn.list(&old)?.ok_or_else(|| GoError::ListNotFound(old.clone()))?;
        if new == old {
            return Ok(list);
        }
        if txn.list(&new)?.is_some() {
            return Err(GoError::ListConflict(new));
        }

        for id in &list.links {
            if let Some(mut link) = txn.link(*id)? {
                for member in link.lists.iter_mut().filter(|member| **member == old) {
                    *member = new.clone();
                }
                txn.put_link(&link)?;
            }
        }

        txn.remove_list(&old)?;
        list.name = new;
        list.kind = kind;
        txn.put_list(&list)?;
        txn.commit()?;
        self.patterns.evict(&old);

        info!("renamed go/{} to go/{}", old, list.name);
        Ok(list)
    }

    /// Sets how a list picks its redirect target.
    ///
    /// A fixed-link policy must name a current member of the list.
    pub fn set_list_policy(&self, name: &str, policy: Policy) -> Result<(), GoError> {
        let name = self.lookup_name(name)?;
        let mut txn = self.store.begin_write()?;
        let mut list = txn.list(&name)?.ok_or(GoError::ListNotFound(name))?;

        if let Policy::Link(id) = policy {
            if !list.contains(id) {
                return Err(GoError::LinkNotFound(id));
            }
        }

        list.policy = policy;
        txn.put_list(&list)?;
        txn.commit()?;

        info!("list {} now resolves by {}", list.name, policy);
        Ok(())
    }

    /// Redirect target for `/_link_/{id}`; counts as a click on the link.
    pub fn follow_link(&self, id: LinkId) -> Result<String, GoError> {
        self.follow_link_at(id, Utc::now())
    }

    pub fn follow_link_at(&self, id: LinkId, now: DateTime<Utc>) -> Result<String, GoError> {
        let (link, variables) = {
            let txn = self.store.begin_read()?;
            let link = txn.link(id)?.ok_or(GoError::LinkNotFound(id))?;
            (link, txn.variables()?)
        };

        let args = TemplateArgs {
            variables: Some(&variables),
            ..TemplateArgs::default()
        };
        let url = render_template(&link.url, &args)?;

        self.record_click(None, id, now)?;
        Ok(url)
    }

    /// Redirects to a random link that has a keyword of its own.
    pub fn lucky(&self) -> Result<Resolution, GoError> {
        let (chosen, variables) = {
            let txn = self.store.begin_read()?;
            let lists: BTreeMap<String, LinkList> = txn
                .lists()?
                .into_iter()
                .map(|list| (list.name.clone(), list))
                .collect();

            let mut candidates = Vec::new();
            for link in txn.links()? {
                let generative = link.regex_generated
                    || link
                        .lists
                        .iter()
                        .any(|name| lists.get(name).is_some_and(LinkList::is_generative));
                if !generative && main_keyword_of(txn.as_ref(), &link)?.is_some() {
                    candidates.push(link);
                }
            }

            (candidates.choose(&mut rand::rng()).cloned(), txn.variables()?)
        };

        let Some(link) = chosen else {
            return Ok(Resolution::NotFound {
                reason: "no links to choose from".to_string(),
            });
        };

        let args = TemplateArgs {
            variables: Some(&variables),
            ..TemplateArgs::default()
        };
        let url = render_template(&link.url, &args)?;
        self.record_click(None, link.id, Utc::now())?;

        Ok(Resolution::Redirect {
            url,
            link: link.id,
            list: None,
        })
    }

    /// Counts one click on a link and, if given, the list it was reached
    /// through. Both records change in the same transaction.
    pub(crate) fn record_click(
        &self,
        list: Option<&str>,
        id: LinkId,
        now: DateTime<Utc>,
    ) -> Result<(), GoError> {
        let day = day_of(now);
        let mut txn = self.store.begin_write()?;

        let mut link = txn.link(id)?.ok_or(GoError::LinkNotFound(id))?;
        link.clicks.record_click(1, day);
        link.last_used = Some(now);
        txn.put_link(&link)?;

        if let Some(name) = list {
            let mut list = txn
                .list(name)?
                .ok_or_else(|| GoError::ListNotFound(name.to_string()))?;
            list.clicks.record_click(1, day);
            list.last_used = Some(now);
            txn.put_list(&list)?;
        }

        txn.commit()?;
        debug!("click on link {} via {:?}", id, list);
        Ok(())
    }
}

/// Member links of a list in list order; dangling ids are skipped
pub(crate) fn members(txn: &dyn ReadTxn, list: &LinkList) -> Result<Vec<Link>, StoreError> {
    let mut links = Vec::with_capacity(list.links.len());
    for id in &list.links {
        if let Some(link) = txn.link(*id)? {
            links.push(link);
        }
    }
    Ok(links)
}

fn main_keyword_of(txn: &dyn ReadTxn, link: &Link) -> Result<Option<LinkList>, GoError> {
    let mut direct = Vec::new();
    for name in &link.lists {
        let Some(list) = txn.list(name)? else {
            continue;
        };
        let goes_directly = match list.policy {
            Policy::Link(target) => target == link.id,
            Policy::Freshest | Policy::Top => {
                let links = members(txn, &list)?;
                pick_target(&list, &links).is_some_and(|target| target.id == link.id)
            }
            Policy::List | Policy::Random => false,
        };
        if goes_directly {
            direct.push(list);
        }
    }

    Ok(rank_by_popularity(direct).into_iter().next())
}

fn add_to_list(
    txn: &mut dyn WriteTxn,
    name: &str,
    kind: ListKind,
    id: LinkId,
) -> Result<(), GoError> {
    let mut list = match txn.list(name)? {
        Some(list) => list,
        None => {
            debug!("creating list {}", name);
            LinkList::new(txn.next_id()?, name, kind)
        }
    };

    if list.add_link(id) {
        txn.put_list(&list)?;
    }
    Ok(())
}

fn remove_from_list(
    txn: &mut dyn WriteTxn,
    patterns: &PatternCache,
    name: &str,
    id: LinkId,
) -> Result<(), GoError> {
    let Some(mut list) = txn.list(name)? else {
        return Ok(());
    };

    list.remove_link(id);
    if list.links.is_empty() {
        debug!("list {} is empty, deleting", name);
        txn.remove_list(name)?;
        patterns.evict(name);
    } else {
        txn.put_list(&list)?;
    }
    Ok(())
}

fn url_conflict(err: StoreError, link: &Link) -> GoError {
    match err {
        StoreError::UniqueViolation(_) => GoError::UrlConflict(Box::new(link.clone())),
        other => GoError::Store(other),
    }
}
