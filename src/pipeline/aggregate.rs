//! Aggregation: group enriched records and sort them deterministically.
//!
//! Groups are built once per run from the drained results. Group keys sort
//! ascending; members sort by the run's secondary order with the record id
//! as the final tie-break, so completion order never leaks into output.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::model::{Record, Status, Version};

/// The attribute records are grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    /// `owner/name`.
    Collection,
    /// Repository name alone.
    CollectionName,
    /// Repository owner.
    Owner,
    /// Author login.
    Author,
}

impl GroupBy {
    fn key(self, record: &Record) -> String {
        match self {
            Self::Collection => record.collection().to_string(),
            Self::CollectionName => record.collection().name.clone(),
            Self::Owner => record.collection().owner.clone(),
            Self::Author => record.author.clone().unwrap_or_default(),
        }
    }
}

/// Result-level filter applied before grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
    All,
    /// Only records enrichment marked terminal.
    Terminal,
    /// Records no team member has looked at yet.
    NotReviewed,
    /// Records with exactly this status.
    Status(Status),
}

impl Keep {
    pub fn admits(self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::Terminal => record.terminal,
            Self::NotReviewed => !record.status.is_reviewed(),
            Self::Status(status) => record.status == status,
        }
    }
}

/// Order of members within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOrder {
    /// Ascending issue or pull request number.
    NumberAsc,
    /// Newest first; records without a creation time last.
    CreatedDesc,
    /// Highest release version first; non-version tags, then untagged, last.
    VersionDesc,
    /// Most recent release first; undated releases last.
    ReleasedDesc,
}

impl MemberOrder {
    fn compare(self, a: &Record, b: &Record) -> Ordering {
        let primary = match self {
            Self::NumberAsc => a.number().cmp(&b.number()),
            Self::CreatedDesc => newest_first(a.created_at, b.created_at),
            Self::VersionDesc => match (tag(a), tag(b)) {
                (Some(a), Some(b)) => Version::cmp_tags_desc(a, b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            Self::ReleasedDesc => newest_first(released(a), released(b)),
        };
        primary
            .then_with(|| a.collection().cmp(b.collection()))
            .then_with(|| a.number().cmp(&b.number()))
            .then_with(|| a.id.cmp(&b.id))
    }
}

fn tag(record: &Record) -> Option<&str> {
    record.release.as_ref().map(|r| r.tag.as_str())
}

fn released(record: &Record) -> Option<jiff::Timestamp> {
    record.release.as_ref().and_then(|r| r.date)
}

/// Descending with `None` last.
fn newest_first<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// How one run turns results into groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregation {
    pub group_by: GroupBy,
    pub keep: Keep,
    pub order: MemberOrder,
}

impl Aggregation {
    pub fn new(group_by: GroupBy, order: MemberOrder) -> Self {
        Self {
            group_by,
            keep: Keep::All,
            order,
        }
    }

    pub fn keep(mut self, keep: Keep) -> Self {
        self.keep = keep;
        self
    }

    /// Group the records, dropping any the filter rejects.
    ///
    /// Only non-empty groups are produced.
    pub fn aggregate(&self, records: impl IntoIterator<Item = Record>) -> Groups {
        let mut map: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        for record in records {
            if !self.keep.admits(&record) {
                continue;
            }
            map.entry(self.group_by.key(&record))
                .or_default()
                .push(record);
        }

        let groups = map
            .into_iter()
            .map(|(key, mut members)| {
                members.sort_by(|a, b| self.order.compare(a, b));
                Group { key, members }
            })
            .collect();
        Groups(groups)
    }
}

/// Records sharing one grouping key, in member order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub key: String,
    pub members: Vec<Record>,
}

/// All groups of one run, ascending by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Groups(Vec<Group>);

impl Groups {
    pub fn iter(&self) -> std::slice::Iter<'_, Group> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total records across every group.
    pub fn record_count(&self) -> usize {
        self.0.iter().map(|g| g.members.len()).sum()
    }

    /// Every record in table order: by group, then member order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.0.iter().flat_map(|g| g.members.iter())
    }
}

impl<'a> IntoIterator for &'a Groups {
    type Item = &'a Group;
    type IntoIter = std::slice::Iter<'a, Group>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
