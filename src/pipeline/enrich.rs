//! Enrichment: the one remote operation each worker performs per record.
//!
//! A mode is resolved to a concrete operation once per worker; the worker
//! then applies that operation to every record it dequeues.

use tracing::{debug, warn};

use crate::model::{
    Comment, IssueState, Record, Release, Review, ReviewState, Status, SubjectKind, Tag, Version,
};
use crate::remote::{DetailKind, Mutation, RemoteError, RemoteSource};

/// Read-only lookups that compute a record's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// `Reviewed` when any of these logins commented.
    TeamReview { team: Vec<String> },

    /// Adopt the state of the most recently submitted review.
    LatestReview,

    /// Find the newest version tag and when its commit was authored.
    LatestRelease,
}

/// What workers do with each record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentMode {
    Query(Query),

    /// Look up the issue state; when closed, mark the notification thread
    /// read and set `terminal`. A dry run sets `terminal` without the call.
    MutateIfClosed { dry_run: bool },
}

/// A per-record operation bound to a remote.
pub(super) type Operation<'a> = Box<dyn Fn(&mut Record) -> Result<(), RemoteError> + Send + 'a>;

impl EnrichmentMode {
    /// Resolve the operation this mode performs on each record.
    pub(super) fn operation<'a>(&'a self, remote: &'a dyn RemoteSource) -> Operation<'a> {
        match self {
            Self::Query(Query::TeamReview { team }) => {
                Box::new(move |record| check_team_review(remote, record, team))
            }
            Self::Query(Query::LatestReview) => {
                Box::new(move |record| check_latest_review(remote, record))
            }
            Self::Query(Query::LatestRelease) => {
                Box::new(move |record| find_latest_release(remote, record))
            }
            Self::MutateIfClosed { dry_run } => {
                let dry_run = *dry_run;
                Box::new(move |record| mark_read_if_closed(remote, record, dry_run))
            }
        }
    }
}

// ── Status rules ──

/// `Reviewed` if a team member authored any comment, else `Unknown`.
pub fn team_review_status(comments: &[Comment], team: &[String]) -> Status {
    let reviewed = comments
        .iter()
        .filter_map(|c| c.user.as_ref())
        .any(|user| team.iter().any(|m| *m == user.login));

    if reviewed {
        Status::Reviewed
    } else {
        Status::Unknown
    }
}

/// The state of the most recently submitted review, verbatim.
///
/// Reviews without a submission time count as oldest. This is the
/// "last review wins" rule: an earlier `CHANGES_REQUESTED` from one reviewer
/// is masked by a later `APPROVED` from another.
pub fn latest_review_status(reviews: &[Review]) -> Status {
    // `max_by` keeps the last of equal elements; iterate in reverse so ties
    // resolve to the earliest-listed review.
    reviews
        .iter()
        .rev()
        .max_by(|a, b| a.submitted_at.cmp(&b.submitted_at))
        .map_or(Status::Unknown, |r| Status::Review(r.state))
}

/// The tag with the highest version; non-version tags only when nothing else exists.
pub fn latest_tag(mut tags: Vec<Tag>) -> Option<Tag> {
    tags.sort_by(|a, b| Version::cmp_tags_desc(&a.name, &b.name));
    tags.into_iter().next()
}

// ── Operations ──

fn check_team_review(
    remote: &dyn RemoteSource,
    record: &mut Record,
    team: &[String],
) -> Result<(), RemoteError> {
    if record.kind == SubjectKind::Release {
        return Ok(());
    }

    let comments = remote
        .details(&record.target, &DetailKind::Comments)?
        .into_comments()?;
    record.status = team_review_status(&comments, team);
    Ok(())
}

fn check_latest_review(remote: &dyn RemoteSource, record: &mut Record) -> Result<(), RemoteError> {
    let reviews = remote
        .details(&record.target, &DetailKind::Reviews)?
        .into_reviews()?;
    record.status = latest_review_status(&reviews);
    record.terminal = record.status == Status::Review(ReviewState::Approved);
    Ok(())
}

fn find_latest_release(remote: &dyn RemoteSource, record: &mut Record) -> Result<(), RemoteError> {
    let tags = remote
        .details(&record.target, &DetailKind::Tags)?
        .into_tags()?;

    let Some(tag) = latest_tag(tags) else {
        debug!(record = %record.target, "no tags");
        return Ok(());
    };

    let commit = remote
        .details(
            &record.target,
            &DetailKind::Commit {
                sha: tag.commit.sha.clone(),
            },
        )?
        .into_commit()?;

    record.release = Some(Release {
        tag: tag.name,
        date: Some(commit.author.date),
    });
    Ok(())
}

fn mark_read_if_closed(
    remote: &dyn RemoteSource,
    record: &mut Record,
    dry_run: bool,
) -> Result<(), RemoteError> {
    // Release threads have no issue state to check.
    if record.kind == SubjectKind::Release {
        return Ok(());
    }

    let state = remote
        .details(&record.target, &DetailKind::IssueState)?
        .into_issue_state()?;
    if state != IssueState::Closed {
        return Ok(());
    }

    if dry_run {
        record.terminal = true;
        return Ok(());
    }

    let mutation = Mutation::MarkThreadRead {
        thread_id: record.id.clone(),
    };
    match remote.mutate(&mutation) {
        Ok(()) => record.terminal = true,
        Err(e) => warn!(
            record = %record.target,
            thread = %record.id,
            error = %e,
            "failed to mark thread read"
        ),
    }
    Ok(())
}
