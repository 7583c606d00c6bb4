//! Keyword resolution
//!
//! Turns a request path into a redirect, a list page, a set of candidates
//! to choose from, or "not found". Exact list names win; regex lists are
//! only consulted when no list has the keyword as its name.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::seq::IndexedRandom;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::GoError;
use crate::keyword::{render_template, sanitize, KeywordPath, TemplateArgs};
use crate::model::{Link, LinkId, LinkList, Policy};
use crate::ranking::rank_by_popularity;
use crate::registry::{members, LinkDatabase, ListView};

/// Outcome of resolving a keyword path
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// Send the client to `url`; the click has been recorded
    Redirect {
        url: String,
        link: LinkId,
        /// List (or pattern) the link was reached through
        list: Option<String>,
    },

    /// Show the list instead of redirecting
    List(ListView),

    /// Several regex lists matched; nothing was clicked
    Ambiguous {
        keyword: String,
        candidates: Vec<Candidate>,
    },

    NotFound { reason: String },
}

/// One destination produced by a regex list
#[derive(Serialize, Debug, Clone)]
pub struct Candidate {
    pub pattern: String,
    pub link: Link,
    pub url: String,
}

/// Picks the link a list redirects to under its policy.
///
/// `links` must be the list's members in list order. Returns `None` for the
/// `list` policy and when a fixed target is no longer a member.
pub fn pick_target<'a>(list: &LinkList, links: &'a [Link]) -> Option<&'a Link> {
    match list.policy {
        Policy::List => None,
        Policy::Freshest => links.last(),
        Policy::Top => rank_by_popularity(links.iter().collect()).into_iter().next(),
        Policy::Random => links.choose(&mut rand::rng()),
        Policy::Link(id) => links.iter().find(|link| link.id == id),
    }
}

/// Compiles a regex list name, case-insensitive and anchored at the start.
pub fn compile_pattern(pattern: &str) -> Result<Regex, GoError> {
    RegexBuilder::new(&format!("^(?:{})", pattern))
        .case_insensitive(true)
        .build()
        .map_err(|_| GoError::InvalidKeyword(pattern.to_string()))
}

/// Compiled patterns of stored regex lists, keyed by list name
///
/// Only the resolver fills it, from names read out of the store, so it never
/// holds more entries than there are regex lists. Deleting or renaming a list
/// evicts its entry.
#[derive(Default)]
pub(crate) struct PatternCache {
    compiled: RwLock<HashMap<String, Regex>>,
}

impl PatternCache {
    pub(crate) fn get(&self, pattern: &str) -> Result<Regex, GoError> {
        if let Some(regex) = self.compiled.read().get(pattern) {
            return Ok(regex.clone());
        }

        let regex = compile_pattern(pattern)?;
        self.compiled
            .write()
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    pub(crate) fn evict(&self, pattern: &str) {
        self.compiled.write().remove(pattern);
    }

    pub(crate) fn len(&self) -> usize {
        self.compiled.read().len()
    }
}

impl LinkDatabase {
    /// Resolves a request path such as `/wiki` or `/.bugs/123`.
    pub fn resolve(&self, path: &str) -> Result<Resolution, GoError> {
        self.resolve_at(path, Utc::now())
    }

    /// Same as [`LinkDatabase::resolve`] with an explicit clock.
    pub fn resolve_at(&self, path: &str, now: DateTime<Utc>) -> Result<Resolution, GoError> {
        let request = KeywordPath::parse(path);

        let keyword = match sanitize(&request.keyword) {
            Ok(keyword) => keyword,
            Err(err) => {
                debug!("rejected keyword {:?}: {}", request.keyword, err);
                return Ok(Resolution::NotFound {
                    reason: err.to_string(),
                });
            }
        };

        let txn = self.store().begin_read()?;
        let variables = txn.variables()?;

        let exact = txn.list(&keyword)?;
        if let Some(list) = exact {
            let links = members(txn.as_ref(), &list)?;
            drop(txn);

            let target = if request.force_list {
                None
            } else {
                pick_target(&list, &links).map(|link| (link.id, link.url.clone()))
            };
            let Some((target_id, template)) = target else {
                return Ok(Resolution::List(ListView { list, links }));
            };

            let args = TemplateArgs {
                wildcard: request.remainder.clone(),
                positional: request.segments(),
                variables: Some(&variables),
            };
            let url = match render_template(&template, &args) {
                Ok(url) => url,
                Err(err) => {
                    debug!("go/{} cannot render link {}: {}", keyword, target_id, err);
                    return Ok(Resolution::NotFound {
                        reason: err.to_string(),
                    });
                }
            };

            self.record_click(Some(&list.name), target_id, now)?;
            debug!("go/{} -> {}", keyword, url);
            return Ok(Resolution::Redirect {
                url,
                link: target_id,
                list: Some(list.name),
            });
        }

        let bare = keyword.strip_suffix('/').unwrap_or(&keyword);
        let mut candidates = Vec::new();

        for list in txn.regex_lists()? {
            let regex = match self.patterns.get(&list.name) {
                Ok(regex) => regex,
                Err(err) => {
                    warn!("skipping regex list: {}", err);
                    continue;
                }
            };
            let Some(captures) = regex.captures(bare) else {
                continue;
            };

            let positional: Vec<String> = captures
                .iter()
                .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect();
            let wildcard = if request.remainder.is_empty() {
                positional.get(1).or(positional.first()).cloned().unwrap_or_default()
            } else {
                request.remainder.clone()
            };
            let args = TemplateArgs {
                wildcard,
                positional,
                variables: Some(&variables),
            };

            let links = members(txn.as_ref(), &list)?;
            let targets: Vec<&Link> = match pick_target(&list, &links) {
                Some(target) => vec![target],
                None => links.iter().collect(),
            };

            for link in targets {
                match render_template(&link.url, &args) {
                    Ok(url) => candidates.push(Candidate {
                        pattern: list.name.clone(),
                        link: link.clone(),
                        url,
                    }),
                    Err(err) => debug!("pattern {} skips link {}: {}", list.name, link.id, err),
                }
            }
        }
        drop(txn);

        match candidates.len() {
            0 => Ok(Resolution::NotFound {
                reason: format!("No match found for '{}'", keyword),
            }),
            1 => {
                let candidate = candidates.remove(0);
                self.record_click(Some(&candidate.pattern), candidate.link.id, now)?;
                debug!("go/{} -> {} via {}", keyword, candidate.url, candidate.pattern);
                Ok(Resolution::Redirect {
                    url: candidate.url,
                    link: candidate.link.id,
                    list: Some(candidate.pattern),
                })
            }
            _ => Ok(Resolution::Ambiguous {
                keyword,
                candidates,
            }),
        }
    }
}
