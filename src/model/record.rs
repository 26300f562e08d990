//! Records: the pipeline's working unit.

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::Status;

/// A repository, `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Collection {
    pub owner: String,
    pub name: String,
}

impl Collection {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/name`.
    pub fn parse(full_name: &str) -> Option<Self> {
        let (owner, name) = full_name.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }

    /// Parse a repository API URL: `https://api.github.com/repos/{owner}/{name}`.
    pub fn from_api_url(url: &str) -> Option<Self> {
        let segments = path_segments(url)?;
        match segments.as_slice() {
            ["repos", owner, name] => Some(Self::new(*owner, *name)),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A numbered thing inside a repository: an issue, pull request, or release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub collection: Collection,
    pub number: u64,
}

impl RecordRef {
    /// Parse an API URL against the template `/repos/{owner}/{name}/{kind}/{number}`.
    ///
    /// The number is the last path segment. Returns the `{kind}` segment
    /// (`issues`, `pulls`, `releases`, ...) alongside the reference.
    /// Any other shape, or a non-numeric last segment, yields `None`.
    pub fn from_api_url(url: &str) -> Option<(Self, String)> {
        let segments = path_segments(url)?;
        match segments.as_slice() {
            ["repos", owner, name, kind, number] => {
                let number = number.parse().ok()?;
                let reference = Self {
                    collection: Collection::new(*owner, *name),
                    number,
                };
                Some((reference, (*kind).to_string()))
            }
            _ => None,
        }
    }

    /// Parse a web URL against the template `/{owner}/{name}/{issues|pull}/{number}`.
    pub fn from_html_url(url: &str) -> Option<Self> {
        let segments = path_segments(url)?;
        match segments.as_slice() {
            [owner, name, "issues" | "pull", number] => Some(Self {
                collection: Collection::new(*owner, *name),
                number: number.parse().ok()?,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.collection, self.number)
    }
}

/// Split the path of an absolute `https://host/...` URL into segments.
fn path_segments(url: &str) -> Option<Vec<&str>> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let (_host, path) = rest.split_once('/')?;
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    Some(segments)
}

/// What a record's remote lookups are addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Target {
    Item(RecordRef),
    Repository(Collection),
}

impl Target {
    pub fn collection(&self) -> &Collection {
        match self {
            Self::Item(r) => &r.collection,
            Self::Repository(c) => c,
        }
    }

    pub fn number(&self) -> Option<u64> {
        match self {
            Self::Item(r) => Some(r.number),
            Self::Repository(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item(r) => r.fmt(f),
            Self::Repository(c) => c.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubjectKind {
    Issue,
    PullRequest,
    Release,
    Repository,
}

/// The latest tag of a repository and when it was cut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub tag: String,
    pub date: Option<Timestamp>,
}

/// A classified item, owned by the pipeline for the length of one run.
///
/// `status`, `terminal` and `release` are written by exactly one worker
/// during enrichment and are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable identifier: notification thread id, web URL, or `owner/name`.
    pub id: String,
    pub target: Target,
    pub kind: SubjectKind,
    pub title: String,
    pub url: String,
    pub author: Option<String>,
    pub created_at: Option<Timestamp>,
    pub status: Status,
    pub terminal: bool,
    pub release: Option<Release>,
}

impl Record {
    /// A fresh record with `Unknown` status and no terminal flag.
    pub fn new(id: impl Into<String>, target: Target, kind: SubjectKind) -> Self {
        Self {
            id: id.into(),
            target,
            kind,
            title: String::new(),
            url: String::new(),
            author: None,
            created_at: None,
            status: Status::Unknown,
            terminal: false,
            release: None,
        }
    }

    pub fn collection(&self) -> &Collection {
        self.target.collection()
    }

    pub fn number(&self) -> Option<u64> {
        self.target.number()
    }
}
