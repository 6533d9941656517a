//! Commit timeline statistics

use crate::github::CommitInfo;
use crate::score::rules::distinct_contributors;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived history statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub first_commit_at: Option<DateTime<Utc>>,
    pub last_commit_at: Option<DateTime<Utc>>,
    pub commit_count: u32,
    pub contributor_count: u32,
}

/// Derive the timeline from a fetched commit page
///
/// An empty history gives no timestamps and zero counts.
pub fn derive_timeline(commits: &[CommitInfo]) -> Timeline {
    let dates = commits.iter().filter_map(|c| c.committed_at);

    Timeline {
        first_commit_at: dates.clone().min(),
        last_commit_at: dates.max(),
        commit_count: commits.len() as u32,
        contributor_count: distinct_contributors(commits) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn commit(sha: &str, email: &str, day: u32) -> CommitInfo {
        CommitInfo {
            sha: sha.to_string(),
            message: "change".to_string(),
            author_name: None,
            author_email: Some(email.to_string()),
            committer_name: None,
            committer_email: None,
            committed_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).single(),
        }
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(derive_timeline(&[]), Timeline::default());
    }

    #[test]
    fn test_bounds_and_counts() {
        // listed newest first, as the API returns them
        let commits = vec![
            commit("c", "a@example.com", 20),
            commit("b", "B@example.com", 10),
            commit("a", "b@example.com", 2),
        ];
        let timeline = derive_timeline(&commits);

        assert_eq!(timeline.commit_count, 3);
        assert_eq!(timeline.contributor_count, 2);
        assert_eq!(timeline.first_commit_at, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).single());
        assert_eq!(timeline.last_commit_at, Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).single());
    }
}
