//! Status: what enrichment learned about a record.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A pull request review state, exactly as GitHub reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
    #[serde(other)]
    Other,
}

impl ReviewState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::ChangesRequested => "CHANGES_REQUESTED",
            Self::Commented => "COMMENTED",
            Self::Dismissed => "DISMISSED",
            Self::Pending => "PENDING",
            Self::Other => "OTHER",
        }
    }
}

/// Status of a record. Starts as `Unknown`; enrichment writes it once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "state", rename_all = "camelCase")]
pub enum Status {
    #[default]
    Unknown,

    /// A privileged identity (team member) commented on it.
    Reviewed,

    /// The state of the most recently submitted review.
    Review(ReviewState),
}

impl Status {
    pub fn is_reviewed(self) -> bool {
        matches!(self, Self::Reviewed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Reviewed => f.write_str("reviewed"),
            Self::Review(state) => f.write_str(state.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognised_review_state_decodes_as_other() {
        let state: ReviewState = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(state, ReviewState::Other);
    }

    #[test]
    fn display_is_verbatim_review_state() {
        assert_eq!(Status::Unknown.to_string(), "unknown");
        assert_eq!(Status::Reviewed.to_string(), "reviewed");
        assert_eq!(
            Status::Review(ReviewState::ChangesRequested).to_string(),
            "CHANGES_REQUESTED"
        );
    }
}
