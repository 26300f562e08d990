//! Classification: raw items in, records out.
//!
//! Classifiers are pure. An item that doesn't fit (wrong namespace, private,
//! unsupported subject, malformed URL) is dropped, never an error. Survivors
//! keep their input order.

use tracing::debug;

use crate::model::{Collection, RawItem, Record, RecordRef, SubjectKind, Target};

/// Maps one raw item to at most one record.
pub trait Classifier {
    fn classify(&self, item: RawItem) -> Option<Record>;

    /// Classify a sequence, preserving the order of the survivors.
    fn classify_all<I>(&self, items: I) -> Vec<Record>
    where
        I: IntoIterator<Item = RawItem>,
        Self: Sized,
    {
        items
            .into_iter()
            .filter_map(|item| self.classify(item))
            .collect()
    }
}

/// Accepted namespaces: a collection passes when its name or owner login
/// contains one of the patterns. No patterns accepts everything.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    patterns: Vec<String>,
}

impl Namespace {
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn accepts(&self, collection: &Collection) -> bool {
        self.patterns.is_empty()
            || self
                .patterns
                .iter()
                .any(|p| collection.name.contains(p) || collection.owner.contains(p))
    }
}

fn dropped(id: &str, reason: &str) -> Option<Record> {
    debug!(id, reason, "dropped at classification");
    None
}

// ── Notifications ──

/// Notification threads about issues, pull requests, and releases in
/// accepted public repositories.
#[derive(Debug, Clone)]
pub struct NotificationClassifier {
    pub namespace: Namespace,
}

impl Classifier for NotificationClassifier {
    fn classify(&self, item: RawItem) -> Option<Record> {
        let RawItem::Notification(n) = item else {
            return None;
        };

        let collection = Collection::new(&n.repository.owner.login, &n.repository.name);
        if !self.namespace.accepts(&collection) {
            return dropped(&n.id, "outside accepted namespace");
        }
        if n.repository.private {
            return dropped(&n.id, "private repository");
        }
        if n.subject.kind == "Commit" {
            return dropped(&n.id, "commit subject");
        }

        let Some(url) = n.subject.url.as_deref() else {
            return dropped(&n.id, "subject has no url");
        };
        let Some((reference, segment)) = RecordRef::from_api_url(url) else {
            return dropped(&n.id, "subject url has no trailing number");
        };

        let kind = match segment.as_str() {
            "releases" => SubjectKind::Release,
            "pulls" => SubjectKind::PullRequest,
            _ if n.subject.kind == "PullRequest" => SubjectKind::PullRequest,
            _ => SubjectKind::Issue,
        };
        let html_url = match kind {
            SubjectKind::Release => format!("https://github.com/{}/releases", reference.collection),
            SubjectKind::PullRequest => format!(
                "https://github.com/{}/pull/{}",
                reference.collection, reference.number
            ),
            _ => format!(
                "https://github.com/{}/issues/{}",
                reference.collection, reference.number
            ),
        };

        let mut record = Record::new(n.id, Target::Item(reference), kind);
        record.title = n.subject.title;
        record.url = html_url;
        record.created_at = n.updated_at;
        Some(record)
    }
}

// ── Search results ──

/// Open pull requests whose URL contains one of the markers.
#[derive(Debug, Clone)]
pub struct PullRequestClassifier {
    pub markers: Vec<String>,
}

impl Classifier for PullRequestClassifier {
    fn classify(&self, item: RawItem) -> Option<Record> {
        let RawItem::Issue(issue) = item else {
            return None;
        };

        if !issue.is_pull_request() {
            return dropped(&issue.html_url, "not a pull request");
        }
        if !self.markers.is_empty()
            && !self
                .markers
                .iter()
                .any(|m| issue.html_url.contains(m.as_str()))
        {
            return dropped(&issue.html_url, "url has no accepted marker");
        }
        let Some(reference) = RecordRef::from_html_url(&issue.html_url) else {
            return dropped(&issue.html_url, "unrecognised pull request url");
        };

        let mut record = Record::new(
            issue.html_url.clone(),
            Target::Item(reference),
            SubjectKind::PullRequest,
        );
        record.title = issue.title;
        record.url = issue.html_url;
        record.author = Some(issue.user.login);
        record.created_at = issue.created_at;
        Some(record)
    }
}

/// Every issue and pull request in a search, keyed by its repository URL.
#[derive(Debug, Clone, Default)]
pub struct SearchIssueClassifier;

impl Classifier for SearchIssueClassifier {
    fn classify(&self, item: RawItem) -> Option<Record> {
        let RawItem::Issue(issue) = item else {
            return None;
        };

        let Some(collection) = Collection::from_api_url(&issue.repository_url) else {
            return dropped(&issue.html_url, "unrecognised repository url");
        };
        let kind = if issue.is_pull_request() {
            SubjectKind::PullRequest
        } else {
            SubjectKind::Issue
        };

        let reference = RecordRef {
            collection,
            number: issue.number,
        };
        let mut record = Record::new(issue.html_url.clone(), Target::Item(reference), kind);
        record.title = issue.title;
        record.url = issue.html_url;
        record.author = Some(issue.user.login);
        record.created_at = issue.created_at;
        Some(record)
    }
}

// ── Repositories ──

/// Public repositories, optionally only those with issues enabled.
#[derive(Debug, Clone, Default)]
pub struct RepositoryClassifier {
    pub require_issues: bool,
}

impl Classifier for RepositoryClassifier {
    fn classify(&self, item: RawItem) -> Option<Record> {
        let RawItem::Repository(repo) = item else {
            return None;
        };

        let collection = Collection::new(repo.owner.login, repo.name);
        let id = collection.to_string();
        if repo.private {
            return dropped(&id, "private repository");
        }
        if self.require_issues && !repo.has_issues {
            return dropped(&id, "issues disabled");
        }

        let mut record = Record::new(
            id,
            Target::Repository(collection.clone()),
            SubjectKind::Repository,
        );
        record.title = collection.name;
        record.url = repo.html_url;
        Some(record)
    }
}

/// A repository record built from a configured `owner/name`.
pub fn repository_record(collection: Collection) -> Record {
    let url = format!("https://github.com/{collection}");
    let mut record = Record::new(
        collection.to_string(),
        Target::Repository(collection.clone()),
        SubjectKind::Repository,
    );
    record.title = collection.name;
    record.url = url;
    record
}

// ── Team members ──

/// Member logins in listing order, minus the excluded accounts.
pub fn member_logins(items: Vec<RawItem>, excluded: &[String]) -> Vec<String> {
    items
        .into_iter()
        .filter_map(|item| match item {
            RawItem::Member(m) if !excluded.contains(&m.login) => Some(m.login),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{
        Actor, IssueItem, Member, Notification, NotificationRepository, NotificationSubject,
        Repository,
    };

    pub(crate) fn notification(
        id: &str,
        owner: &str,
        name: &str,
        private: bool,
        url: &str,
    ) -> RawItem {
        RawItem::Notification(Notification {
            id: id.to_string(),
            repository: NotificationRepository {
                name: name.to_string(),
                owner: Actor {
                    login: owner.to_string(),
                },
                private,
            },
            subject: NotificationSubject {
                title: format!("subject {id}"),
                url: Some(url.to_string()),
                kind: "Issue".to_string(),
            },
            updated_at: None,
        })
    }

    fn issue_url(owner: &str, name: &str, number: u64) -> String {
        format!("https://api.github.com/repos/{owner}/{name}/issues/{number}")
    }

    /// A notification about issue `number` of `owner/name`.
    fn thread(id: &str, owner: &str, name: &str, private: bool, number: u64) -> RawItem {
        notification(id, owner, name, private, &issue_url(owner, name, number))
    }

    fn search_hit(html_url: &str, repo_url: &str, number: u64, pr: bool) -> RawItem {
        RawItem::Issue(IssueItem {
            number,
            title: format!("item {number}"),
            html_url: html_url.to_string(),
            repository_url: repo_url.to_string(),
            user: Actor {
                login: "catsby".to_string(),
            },
            created_at: None,
            pull_request: pr.then(|| serde_json::json!({})),
        })
    }

    /// A search hit in `repo` (`owner/name`) with well-formed URLs.
    fn hit(repo: &str, number: u64, pr: bool) -> RawItem {
        let path = if pr { "pull" } else { "issues" };
        search_hit(
            &format!("https://github.com/{repo}/{path}/{number}"),
            &format!("https://api.github.com/repos/{repo}"),
            number,
            pr,
        )
    }

    /// Twelve notifications: seven survive, two have the wrong owner, two are
    /// private, one has an unparsable number.
    pub(crate) fn twelve_notifications() -> Vec<RawItem> {
        vec![
            thread("1", "hashicorp", "terraform", false, 30),
            thread("2", "acme", "widgets", false, 1),
            thread("3", "terraform-providers", "terraform-provider-aws", false, 12),
            thread("4", "hashicorp", "terraform", true, 31),
            thread("5", "hashicorp", "terraform", false, 4),
            thread("6", "terraform-providers", "terraform-provider-aws", false, 2),
            thread("7", "hashicorp", "tfteam", false, 9),
            thread("8", "globex", "rockets", false, 3),
            thread("9", "hashicorp", "tfteam", true, 10),
            notification(
                "10",
                "hashicorp",
                "terraform",
                false,
                "https://api.github.com/repos/hashicorp/terraform/issues/abc",
            ),
            thread("11", "hashicorp", "tfteam", false, 1),
            thread("12", "hashicorp", "terraform", false, 17),
        ]
    }

    pub(crate) fn accepted() -> NotificationClassifier {
        NotificationClassifier {
            namespace: Namespace::new(["terraform", "tfteam"]),
        }
    }

    #[test]
    fn notification_scenario_keeps_seven_in_order() {
        let records = accepted().classify_all(twelve_notifications());
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["1", "3", "5", "6", "7", "11", "12"]);
    }

    #[test]
    fn classification_is_repeatable() {
        let first = accepted().classify_all(twelve_notifications());
        let second = accepted().classify_all(twelve_notifications());
        assert_eq!(first, second);
    }

    #[test]
    fn records_start_unknown() {
        let records = accepted().classify_all(twelve_notifications());
        assert!(records.iter().all(|r| r.status == crate::model::Status::Unknown && !r.terminal));
    }

    #[test]
    fn notification_fields() {
        let record = accepted()
            .classify(thread("1", "hashicorp", "terraform", false, 30))
            .unwrap();
        assert_eq!(record.collection().to_string(), "hashicorp/terraform");
        assert_eq!(record.number(), Some(30));
        assert_eq!(record.kind, SubjectKind::Issue);
        assert_eq!(record.url, "https://github.com/hashicorp/terraform/issues/30");
    }

    #[test]
    fn commits_are_dropped() {
        let RawItem::Notification(mut n) = notification(
            "1",
            "hashicorp",
            "terraform",
            false,
            "https://api.github.com/repos/hashicorp/terraform/commits/abc",
        ) else {
            unreachable!()
        };
        n.subject.kind = "Commit".to_string();
        assert!(accepted().classify(RawItem::Notification(n)).is_none());
    }

    #[test]
    fn release_notifications_are_marked() {
        let record = accepted()
            .classify(notification(
                "1",
                "hashicorp",
                "terraform",
                false,
                "https://api.github.com/repos/hashicorp/terraform/releases/12345",
            ))
            .unwrap();
        assert_eq!(record.kind, SubjectKind::Release);
        assert_eq!(record.url, "https://github.com/hashicorp/terraform/releases");
    }

    #[test]
    fn missing_subject_url_is_dropped() {
        let RawItem::Notification(mut n) =
            notification("1", "hashicorp", "terraform", false, "unused")
        else {
            unreachable!()
        };
        n.subject.url = None;
        assert!(accepted().classify(RawItem::Notification(n)).is_none());
    }

    #[test]
    fn other_raw_kinds_are_ignored() {
        let member = RawItem::Member(Member {
            login: "x".to_string(),
        });
        assert!(accepted().classify(member).is_none());
    }

    #[test]
    fn empty_namespace_accepts_all() {
        assert!(Namespace::default().accepts(&Collection::new("any", "thing")));
        assert!(Namespace::new(["hashi"]).accepts(&Collection::new("hashicorp", "x")));
        assert!(!Namespace::new(["hashi"]).accepts(&Collection::new("acme", "x")));
    }

    #[test]
    fn pull_requests_by_marker() {
        let classifier = PullRequestClassifier {
            markers: vec!["terraform".to_string(), "tf-deploy".to_string()],
        };
        let items = vec![
            hit("o/terraform-provider-aws", 5, true),
            hit("o/unrelated", 6, true),
            hit("o/terraform", 7, false),
            hit("o/tf-deploy", 8, true),
        ];

        let records = classifier.classify_all(items);
        let numbers: Vec<_> = records.iter().filter_map(Record::number).collect();
        assert_eq!(numbers, [5, 8]);
        assert_eq!(records[0].author.as_deref(), Some("catsby"));
    }

    #[test]
    fn search_hits_keep_kind() {
        let items = vec![
            hit("o/r", 1, false),
            hit("o/r", 2, true),
            search_hit("https://github.com/o/r/pull/3", "https://example.com/nope", 3, true),
        ];

        let records = SearchIssueClassifier.classify_all(items);
        let kinds: Vec<_> = records.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, [SubjectKind::Issue, SubjectKind::PullRequest]);
    }

    #[test]
    fn repositories_skip_private_and_issueless() {
        let repo = |name: &str, private: bool, has_issues: bool| {
            RawItem::Repository(Repository {
                name: name.to_string(),
                owner: Actor {
                    login: "terraform-providers".to_string(),
                },
                html_url: format!("https://github.com/terraform-providers/{name}"),
                private,
                has_issues,
            })
        };
        let items = vec![repo("a", false, true), repo("b", true, true), repo("c", false, false)];

        let all = RepositoryClassifier::default().classify_all(items.clone());
        assert_eq!(all.len(), 2);

        let with_issues = RepositoryClassifier {
            require_issues: true,
        }
        .classify_all(items);
        assert_eq!(with_issues.len(), 1);
        assert_eq!(with_issues[0].id, "terraform-providers/a");
    }

    #[test]
    fn member_logins_drop_excluded() {
        let items = ["jbardin", "tf-release-bot", "catsby"]
            .into_iter()
            .map(|l| {
                RawItem::Member(Member {
                    login: l.to_string(),
                })
            })
            .collect();
        let logins = member_logins(items, &["tf-release-bot".to_string()]);
        assert_eq!(logins, ["jbardin", "catsby"]);
    }
}
