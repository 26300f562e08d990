//! Text for command output and the search strings commands send.

use jiff::{SignedDuration, Timestamp};

use crate::pipeline::{CancelReason, Groups, Tally};

pub(super) fn notifications_heading(cleanup: bool, dry_run: bool) -> String {
    match (cleanup, dry_run) {
        (false, _) => "Notifications that have no team member comment".to_string(),
        (true, false) => "Notifications cleanup".to_string(),
        (true, true) => "Notifications cleanup - dry run".to_string(),
    }
}

/// A title line plus repository and item counts.
pub(super) fn search_heading(title: &str, groups: &Groups) -> String {
    format!(
        "{title}\nRepositories: {}  Items: {}",
        groups.len(),
        groups.record_count()
    )
}

/// Lines explaining records that are missing from the report.
pub(super) fn shortfall(tally: &Tally) -> Vec<String> {
    let mut lines = Vec::new();
    if tally.dropped > 0 {
        lines.push(format!(
            "{} record(s) could not be checked and are not shown (run with -v for details)",
            tally.dropped
        ));
    }
    if tally.cancelled > 0 {
        let cause = match tally.cancelled_by {
            Some(CancelReason::Deadline) => "when the run timed out",
            Some(CancelReason::FatalError) => "after a fatal remote error",
            None => "because the run was cancelled",
        };
        lines.push(format!("{} record(s) were skipped {cause}", tally.cancelled));
    }
    lines
}

/// One search for every open pull request by any of `members`.
pub(super) fn author_search(members: &[String]) -> String {
    let authors: Vec<String> = members.iter().map(|m| format!("author:{m}")).collect();
    format!("state:open type:pr {}", authors.join(" "))
}

/// Searches scoped to `repositories`, split in two so no single query grows too long.
///
/// `qualifiers` and `kind` are appended to each. Empty halves are skipped.
pub(super) fn repository_searches(
    qualifiers: &str,
    kind: &str,
    repositories: &[String],
) -> Vec<String> {
    let half = repositories.len() / 2;
    let (first, second) = repositories.split_at(half);

    [first, second]
        .into_iter()
        .filter(|part| !part.is_empty())
        .map(|part| {
            let repos: Vec<String> = part.iter().map(|r| format!("repo:{r}")).collect();
            let query = format!("state:open {qualifiers} {} {kind}", repos.join(" "));
            query.split_whitespace().collect::<Vec<_>>().join(" ")
        })
        .collect()
}

/// The `updated:>=` date for `waiting`: three days before `now`, UTC.
pub(super) fn three_days_before(now: Timestamp) -> String {
    let then = now - SignedDuration::from_hours(72);
    then.strftime("%Y-%m-%d").to_string()
}
