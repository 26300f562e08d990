//! The remote collaborator: GitHub, seen through three capabilities.
//!
//! - `list` walks one page of a listing or search at a time.
//! - `details` fetches comments, reviews, state, tags, or a commit for one target.
//! - `mutate` performs one state-changing call.
//!
//! Implementations must be safe to share across worker threads.

mod gh;

#[cfg(test)]
pub mod fake;

use std::fmt;
use std::io;
use std::time::Duration;

use crate::model::{Comment, Commit, IssueState, RawItem, Review, Tag, Target};

pub use gh::GhRemote;

/// Errors reported by a remote source.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("failed to run gh: {0}")]
    Spawn(#[source] io::Error),

    #[error("authentication rejected: {0}")]
    Unauthorized(String),

    #[error("not found or not visible: {0}")]
    NotFound(String),

    #[error("gh {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("gh {command} timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("unexpected response for {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("expected {expected} details, got {got}")]
    Shape {
        expected: &'static str,
        got: &'static str,
    },
}

impl RemoteError {
    /// Fatal errors mean no further call can succeed: the client can't run,
    /// or the credential is rejected. Everything else is local to one request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Spawn(_) | Self::Unauthorized(_))
    }
}

pub type Result<T> = core::result::Result<T, RemoteError>;

/// A paginated listing or search.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListQuery {
    /// Unread notification threads for the authenticated user.
    Notifications,

    /// Issue/PR search, e.g. `state:open type:pr author:jbardin`.
    SearchIssues { query: String, sort: Option<String> },

    /// Public repositories of an organization.
    OrganizationRepositories { organization: String },

    /// Members of a team, by numeric id.
    TeamMembers { team_id: u64 },
}

impl fmt::Display for ListQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notifications => f.write_str("notifications"),
            Self::SearchIssues { query, .. } => write!(f, "search \"{query}\""),
            Self::OrganizationRepositories { organization } => {
                write!(f, "repositories of {organization}")
            }
            Self::TeamMembers { team_id } => write!(f, "members of team {team_id}"),
        }
    }
}

/// Opaque "next page" marker handed back by `list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor(pub u32);

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<RawItem>,
    pub next: Option<Cursor>,
}

/// What to fetch about one target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DetailKind {
    Comments,
    Reviews,
    IssueState,
    Tags,
    Commit { sha: String },
}

#[derive(Debug, Clone)]
pub enum Details {
    Comments(Vec<Comment>),
    Reviews(Vec<Review>),
    IssueState(IssueState),
    Tags(Vec<Tag>),
    Commit(Box<Commit>),
}

impl Details {
    fn name(&self) -> &'static str {
        match self {
            Self::Comments(_) => "comments",
            Self::Reviews(_) => "reviews",
            Self::IssueState(_) => "issue state",
            Self::Tags(_) => "tags",
            Self::Commit(_) => "commit",
        }
    }

    pub fn into_comments(self) -> Result<Vec<Comment>> {
        match self {
            Self::Comments(c) => Ok(c),
            other => Err(other.mismatch("comments")),
        }
    }

    pub fn into_reviews(self) -> Result<Vec<Review>> {
        match self {
            Self::Reviews(r) => Ok(r),
            other => Err(other.mismatch("reviews")),
        }
    }

    pub fn into_issue_state(self) -> Result<IssueState> {
        match self {
            Self::IssueState(s) => Ok(s),
            other => Err(other.mismatch("issue state")),
        }
    }

    pub fn into_tags(self) -> Result<Vec<Tag>> {
        match self {
            Self::Tags(t) => Ok(t),
            other => Err(other.mismatch("tags")),
        }
    }

    pub fn into_commit(self) -> Result<Commit> {
        match self {
            Self::Commit(c) => Ok(*c),
            other => Err(other.mismatch("commit")),
        }
    }

    fn mismatch(&self, expected: &'static str) -> RemoteError {
        RemoteError::Shape {
            expected,
            got: self.name(),
        }
    }
}

/// A state-changing call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mutation {
    MarkThreadRead { thread_id: String },
}

/// GitHub, as the pipeline needs it.
pub trait RemoteSource: Send + Sync {
    /// Fetch one page. `cursor` is `None` for the first page.
    fn list(&self, query: &ListQuery, cursor: Option<Cursor>) -> Result<Page>;

    /// Fetch details for one target, following pagination internally.
    fn details(&self, target: &Target, kind: &DetailKind) -> Result<Details>;

    /// Perform one state-changing call.
    fn mutate(&self, mutation: &Mutation) -> Result<()>;
}
