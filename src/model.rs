//! Data models for the go-link redirector
//!
//! This module defines the stored entities (links and lists), the list
//! resolution policy, and the request payloads accepted by the HTTP API.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clicks::ClickLedger;
use crate::error::GoError;
use crate::keyword::WILDCARD;
use crate::ranking::Clickable;

/// Stable integer identity of a link or list, never reused
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LinkId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(LinkId)
    }
}

/// One edit of a link: who touched it and when
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub at: DateTime<Utc>,
    pub editor: String,
}

/// A single redirect target stored in the database
///
/// The URL may contain the `{*}` placeholder, in which case the link is
/// generative: its destination depends on the rest of the request path.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Link {
    pub id: LinkId,

    /// Destination URL or URL template; unique across all links
    pub url: String,

    #[serde(default)]
    pub title: String,

    /// True when `url` contains the wildcard placeholder
    #[serde(default)]
    pub regex_generated: bool,

    #[serde(default)]
    pub clicks: ClickLedger,

    /// Last redirect through this link
    pub last_used: Option<DateTime<Utc>>,

    /// Append-only edit history, most recent last
    #[serde(default)]
    pub edits: Vec<Edit>,

    /// Names of the lists that contain this link
    #[serde(default)]
    pub lists: Vec<String>,

    pub created_at: DateTime<Utc>,
}

impl Link {
    pub fn new(id: LinkId, url: impl Into<String>, title: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id,
            regex_generated: url.contains(WILDCARD),
            url,
            title: title.into(),
            clicks: ClickLedger::new(),
            last_used: None,
            edits: Vec::new(),
            lists: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Replaces the URL and refreshes the generative flag.
    ///
    /// Only the registry calls this, together with the url index update.
    pub(crate) fn set_url(&mut self, url: String) {
        self.regex_generated = url.contains(WILDCARD);
        self.url = url;
    }

    pub fn edited_by(&mut self, editor: &str, at: DateTime<Utc>) {
        self.edits.push(Edit {
            at,
            editor: editor.to_string(),
        });
    }

    /// Most recent edit, if any
    pub fn last_edit(&self) -> Option<&Edit> {
        self.edits.last()
    }

    pub fn click_count(&self) -> u64 {
        self.clicks.total_clicks()
    }
}

impl Clickable for Link {
    fn clicks(&self) -> &ClickLedger {
        &self.clicks
    }
}

/// How a list name is matched against keywords
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    /// Matched by exact (sanitized) name
    #[default]
    Keyword,
    /// Name is a regular expression tried against unresolved keywords
    Regex,
}

/// Rule a list uses to pick its redirect target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Never redirect, always show the list
    List,
    /// Most recently added link
    #[default]
    Freshest,
    /// Most popular link
    Top,
    /// Uniformly random link
    Random,
    /// A fixed member link
    Link(LinkId),
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::List => f.write_str("list"),
            Policy::Freshest => f.write_str("freshest"),
            Policy::Top => f.write_str("top"),
            Policy::Random => f.write_str("random"),
            Policy::Link(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for Policy {
    type Err = GoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "list" => Ok(Policy::List),
            "freshest" => Ok(Policy::Freshest),
            "top" => Ok(Policy::Top),
            "random" => Ok(Policy::Random),
            other => other
                .parse::<LinkId>()
                .map(Policy::Link)
                .map_err(|_| GoError::InvalidInput(format!("unknown list policy '{}'", other))),
        }
    }
}

impl Serialize for Policy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Policy {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A named bucket of links with a resolution policy
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LinkList {
    pub id: LinkId,

    /// Sanitized keyword, or the pattern for regex lists
    pub name: String,

    #[serde(default)]
    pub kind: ListKind,

    #[serde(default)]
    pub policy: Policy,

    /// Member links in insertion order; the tail is the freshest
    #[serde(default)]
    pub links: Vec<LinkId>,

    #[serde(default)]
    pub clicks: ClickLedger,

    pub last_used: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl LinkList {
    pub fn new(id: LinkId, name: impl Into<String>, kind: ListKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            policy: Policy::default(),
            links: Vec::new(),
            clicks: ClickLedger::new(),
            last_used: None,
            created_at: Utc::now(),
        }
    }

    /// Regex lists and keywords ending in `/` expand into many destinations
    pub fn is_generative(&self) -> bool {
        self.kind == ListKind::Regex || self.name.ends_with('/')
    }

    pub fn contains(&self, id: LinkId) -> bool {
        self.links.contains(&id)
    }

    /// Appends a link unless it is already a member. Returns true if added.
    pub(crate) fn add_link(&mut self, id: LinkId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.links.push(id);
        true
    }

    pub(crate) fn remove_link(&mut self, id: LinkId) {
        self.links.retain(|member| *member != id);
    }

    /// How this list shows up in listings: `name...` for generative keywords
    pub fn usage(&self) -> String {
        match self.kind {
            ListKind::Regex => self.name.clone(),
            ListKind::Keyword if self.is_generative() => format!("{}...", self.name),
            ListKind::Keyword => self.name.clone(),
        }
    }
}

impl Clickable for LinkList {
    fn clicks(&self) -> &ClickLedger {
        &self.clicks
    }
}

/// Partial update of a link; `None` keeps the current value
#[derive(Deserialize, Debug, Clone, Default)]
pub struct LinkUpdate {
    pub url: Option<String>,
    pub title: Option<String>,
    pub lists: Option<Vec<String>>,
}

/// Request payload for creating a link
///
/// # Example
/// ```json
/// {
///   "lists": ["wiki", "docs"],
///   "url": "https://wiki.example.com",
///   "title": "Team wiki"
/// }
/// ```
#[derive(Deserialize)]
pub struct CreateLinkRequest {
    /// Keywords (or regex patterns) the link is filed under
    pub lists: Vec<String>,

    pub url: String,

    #[serde(default)]
    pub title: String,
}

/// Request payload for changing a list's policy
#[derive(Deserialize)]
pub struct PolicyRequest {
    /// `list`, `freshest`, `top`, `random` or a member link id
    pub policy: String,
}

/// Request payload for renaming a list
#[derive(Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

/// Request payload for setting a template variable
#[derive(Deserialize)]
pub struct VariableRequest {
    pub name: String,
    pub value: String,
}

/// Query parameters for the top links listing
///
/// Query string: `?n=20`
#[derive(Deserialize)]
pub struct TopParams {
    /// Number of links to return, defaults to 100
    pub n: Option<usize>,
}
