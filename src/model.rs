//! Core data model for tfteam.
//!
//! Raw items come back from remote listings, records are what the pipeline
//! works on, and statuses are what enrichment writes into them.

mod raw;
mod record;
mod status;
mod version;

pub use raw::{
    Comment, Commit, IssueItem, IssueState, Member, Notification, RawItem, Repository, Review, Tag,
};
#[cfg(test)]
pub use raw::{Actor, CommitAuthor, NotificationRepository, NotificationSubject, TagCommit};
pub use record::{Collection, Record, RecordRef, Release, SubjectKind, Target};
pub use status::{ReviewState, Status};
pub use version::Version;
