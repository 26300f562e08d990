//! Raw items: what the GitHub API hands back, before classification.
//!
//! Field names follow the REST API's snake_case JSON. Only the fields the
//! pipeline reads are modelled; everything else is ignored on decode.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::ReviewState;

/// One item from a paginated listing or search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RawItem {
    /// A notification thread from `GET /notifications`.
    Notification(Notification),

    /// An issue or pull request from `GET /search/issues`.
    Issue(IssueItem),

    /// A repository from `GET /orgs/{org}/repos`.
    Repository(Repository),

    /// A team member from `GET /teams/{id}/members`.
    Member(Member),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub repository: NotificationRepository,
    pub subject: NotificationSubject,
    pub updated_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRepository {
    pub name: String,
    pub owner: Actor,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSubject {
    pub title: String,

    /// API URL of the subject, e.g. `https://api.github.com/repos/o/r/issues/7`.
    /// Absent for some subject types.
    pub url: Option<String>,

    /// `Issue`, `PullRequest`, `Commit`, `Release`, ...
    #[serde(rename = "type")]
    pub kind: String,
}

/// A search hit. Pull requests carry a `pull_request` object; issues don't.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueItem {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub repository_url: String,
    pub user: Actor,
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl IssueItem {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: Actor,
    pub html_url: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default = "default_true")]
    pub has_issues: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub login: String,
}

/// An issue comment. Ghost users come back with a null `user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub user: Option<Actor>,
    pub created_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub user: Option<Actor>,
    pub state: ReviewState,

    /// Pending reviews have no submission time.
    pub submitted_at: Option<Timestamp>,
}

/// `open` or `closed`, as reported by `GET /repos/{o}/{r}/issues/{n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub commit: TagCommit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCommit {
    pub sha: String,
}

/// A git commit from `GET /repos/{o}/{r}/git/commits/{sha}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub author: CommitAuthor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub date: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_notification() {
        let json = r#"{
            "id": "123",
            "unread": true,
            "repository": {"name": "terraform", "private": false, "owner": {"login": "hashicorp"}},
            "subject": {
                "title": "Crash on apply",
                "url": "https://api.github.com/repos/hashicorp/terraform/issues/17",
                "type": "Issue"
            },
            "updated_at": "2018-03-01T10:00:00Z"
        }"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.id, "123");
        assert_eq!(n.repository.owner.login, "hashicorp");
        assert_eq!(n.subject.kind, "Issue");
        assert!(n.updated_at.is_some());
    }

    #[test]
    fn decode_search_hit_detects_pull_requests() {
        let json = r#"{
            "number": 9,
            "title": "Add thing",
            "html_url": "https://github.com/o/r/pull/9",
            "repository_url": "https://api.github.com/repos/o/r",
            "user": {"login": "catsby"},
            "created_at": "2018-03-01T10:00:00Z",
            "pull_request": {"url": "https://api.github.com/repos/o/r/pulls/9"}
        }"#;
        let item: IssueItem = serde_json::from_str(json).unwrap();
        assert!(item.is_pull_request());
    }

    #[test]
    fn decode_review_without_submission_time() {
        let json = r#"{"user": {"login": "jbardin"}, "state": "PENDING", "submitted_at": null}"#;
        let review: Review = serde_json::from_str(json).unwrap();
        assert_eq!(review.state, ReviewState::Pending);
        assert!(review.submitted_at.is_none());
    }

    #[test]
    fn repository_has_issues_defaults_to_true() {
        let json = r#"{"name": "r", "owner": {"login": "o"}, "html_url": "https://x/o/r"}"#;
        let repo: Repository = serde_json::from_str(json).unwrap();
        assert!(repo.has_issues);
        assert!(!repo.private);
    }
}
