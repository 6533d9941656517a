//! Repository snapshot types and their hosting-API wire formats
//!
//! Wire structs mirror the JSON returned by the hosting API; the public types are
//! what the rest of the crate consumes and what gets cached.

use super::error::ClientError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Identifies an upstream repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
    /// Numeric id assigned by the hosting service, once known
    pub external_id: Option<u64>,
}

impl RepositoryRef {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            external_id: None,
        }
    }

    /// Parse an `owner/name` slug
    pub fn parse(slug: &str) -> Option<Self> {
        let (owner, name) = slug.trim().trim_end_matches(".git").split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Repository metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoMetadata {
    pub id: u64,
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    /// SPDX id (or name) of the detected license
    pub license: Option<String>,
    pub topics: Vec<String>,
    /// Primary language
    pub language: Option<String>,
    pub default_branch: String,
    pub html_url: Option<String>,
    pub pushed_at: Option<DateTime<Utc>>,
}

/// Kind of a tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Blob,
    Tree,
    Commit,
}

/// A single path in a recursive tree listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
}

/// Recursive file tree of one branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoTree {
    /// Branch the tree was resolved from (after any fallback)
    pub branch: String,
    pub entries: Vec<TreeEntry>,
    /// The listing was cut short by the hosting service
    pub truncated: bool,
}

impl RepoTree {
    /// Paths of all files (blobs) in the tree
    pub fn file_paths(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::Blob)
            .map(|e| e.path.as_str())
    }

    /// Build a tree from a plain list of file paths
    pub fn from_paths<I, S>(branch: &str, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            branch: branch.to_string(),
            entries: paths
                .into_iter()
                .map(|p| TreeEntry {
                    path: p.into(),
                    kind: EntryKind::Blob,
                    size: None,
                })
                .collect(),
            truncated: false,
        }
    }
}

/// One commit from the history listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    #[serde(default)]
    pub committer_name: Option<String>,
    #[serde(default)]
    pub committer_email: Option<String>,
    pub committed_at: Option<DateTime<Utc>>,
}

impl CommitInfo {
    /// Identity used when counting distinct contributors
    ///
    /// The committer email, then the author email, then either name.
    pub fn contributor_key(&self) -> Option<String> {
        [
            &self.committer_email,
            &self.author_email,
            &self.committer_name,
            &self.author_name,
        ]
        .into_iter()
        .filter_map(|field| field.as_deref())
        .map(|s| s.trim().to_lowercase())
        .find(|s| !s.is_empty())
    }
}

/// Options for a commit history page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitQuery {
    pub per_page: u32,
    pub page: u32,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Branch or sha to start listing from
    pub sha: Option<String>,
}

impl Default for CommitQuery {
    fn default() -> Self {
        Self {
            per_page: 100,
            page: 1,
            since: None,
            until: None,
            sha: None,
        }
    }
}

impl CommitQuery {
    /// Query string pairs for the commits endpoint
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = vec![
            ("per_page".to_string(), self.per_page.min(100).to_string()),
            ("page".to_string(), self.page.max(1).to_string()),
        ];
        if let Some(since) = self.since {
            query.push(("since".to_string(), since.to_rfc3339()));
        }
        if let Some(until) = self.until {
            query.push(("until".to_string(), until.to_rfc3339()));
        }
        if let Some(ref sha) = self.sha {
            query.push(("sha".to_string(), sha.clone()));
        }
        query
    }

    /// Stable digest of the options, used as part of the cache key
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (k, v) in self.to_query() {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
            hasher.update(b"&");
        }
        hex::encode(&hasher.finalize()[..8])
    }
}

/// Current API quota
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub used: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitStatus {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Language name to byte count
pub type LanguageBreakdown = BTreeMap<String, u64>;

// ==================== Wire formats ====================

#[derive(Debug, Deserialize)]
pub(crate) struct WireOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireLicense {
    spdx_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRepository {
    id: u64,
    name: String,
    #[serde(default)]
    full_name: String,
    owner: WireOwner,
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    license: Option<WireLicense>,
    #[serde(default)]
    topics: Vec<String>,
    language: Option<String>,
    default_branch: Option<String>,
    html_url: Option<String>,
    pushed_at: Option<DateTime<Utc>>,
}

impl From<WireRepository> for RepoMetadata {
    fn from(w: WireRepository) -> Self {
        let license = w.license.and_then(|l| {
            l.spdx_id
                .filter(|id| !id.is_empty() && id != "NOASSERTION")
                .or(l.name)
        });

        let full_name = if w.full_name.is_empty() {
            format!("{}/{}", w.owner.login, w.name)
        } else {
            w.full_name
        };

        Self {
            id: w.id,
            owner: w.owner.login,
            name: w.name,
            full_name,
            description: w.description.filter(|d| !d.trim().is_empty()),
            stars: w.stargazers_count,
            forks: w.forks_count,
            license,
            topics: w.topics,
            language: w.language,
            default_branch: w.default_branch.unwrap_or_else(|| "main".to_string()),
            html_url: w.html_url,
            pushed_at: w.pushed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireTree {
    #[serde(default)]
    tree: Vec<WireTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

impl WireTree {
    pub(crate) fn into_tree(self, branch: &str) -> RepoTree {
        let entries = self
            .tree
            .into_iter()
            .map(|e| TreeEntry {
                kind: match e.kind.as_str() {
                    "tree" => EntryKind::Tree,
                    "commit" => EntryKind::Commit,
                    _ => EntryKind::Blob,
                },
                path: e.path,
                size: e.size,
            })
            .collect();

        RepoTree {
            branch: branch.to_string(),
            entries,
            truncated: self.truncated,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireSignature {
    name: Option<String>,
    email: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireCommitDetail {
    #[serde(default)]
    message: String,
    author: Option<WireSignature>,
    committer: Option<WireSignature>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireCommit {
    sha: String,
    commit: WireCommitDetail,
}

impl From<WireCommit> for CommitInfo {
    fn from(w: WireCommit) -> Self {
        let committed_at = w
            .commit
            .author
            .as_ref()
            .and_then(|a| a.date)
            .or_else(|| w.commit.committer.as_ref().and_then(|c| c.date));
        let (author_name, author_email) = match w.commit.author {
            Some(a) => (a.name, a.email),
            None => (None, None),
        };
        let (committer_name, committer_email) = match w.commit.committer {
            Some(c) => (c.name, c.email),
            None => (None, None),
        };

        Self {
            sha: w.sha,
            message: w.commit.message,
            author_name,
            author_email,
            committer_name,
            committer_email,
            committed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireTopics {
    #[serde(default)]
    names: Vec<String>,
}

impl WireTopics {
    pub(crate) fn into_names(self) -> Vec<String> {
        self.names
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRate {
    limit: u32,
    remaining: u32,
    reset: i64,
    #[serde(default)]
    used: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRateResources {
    core: WireRate,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRateLimit {
    resources: WireRateResources,
}

impl TryFrom<WireRateLimit> for RateLimitStatus {
    type Error = ClientError;

    fn try_from(w: WireRateLimit) -> Result<Self, Self::Error> {
        let core = w.resources.core;
        let reset_at = Utc
            .timestamp_opt(core.reset, 0)
            .single()
            .ok_or_else(|| ClientError::Decode(format!("invalid reset timestamp {}", core.reset)))?;

        Ok(Self {
            limit: core.limit,
            remaining: core.remaining,
            used: core.used,
            reset_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slug() {
        let r = RepositoryRef::parse("rust-lang/cargo").unwrap();
        assert_eq!(r.owner, "rust-lang");
        assert_eq!(r.name, "cargo");
        assert_eq!(r.full_name(), "rust-lang/cargo");

        assert!(RepositoryRef::parse("no-slash").is_none());
        assert!(RepositoryRef::parse("a/b/c").is_none());
        assert!(RepositoryRef::parse("/b").is_none());
    }

    #[test]
    fn test_repository_wire_conversion() {
        let json = serde_json::json!({
            "id": 42,
            "name": "demo",
            "full_name": "octo/demo",
            "owner": { "login": "octo" },
            "description": "  ",
            "stargazers_count": 7,
            "forks_count": 2,
            "license": { "spdx_id": "NOASSERTION", "name": "Other" },
            "topics": ["cli"],
            "language": "Rust",
            "default_branch": "trunk"
        });

        let wire: WireRepository = serde_json::from_value(json).unwrap();
        let meta = RepoMetadata::from(wire);
        assert_eq!(meta.description, None);
        assert_eq!(meta.license.as_deref(), Some("Other"));
        assert_eq!(meta.default_branch, "trunk");
        assert_eq!(meta.stars, 7);
    }

    #[test]
    fn test_commit_query_fingerprint_depends_on_options() {
        let a = CommitQuery::default();
        let b = CommitQuery {
            page: 2,
            ..Default::default()
        };
        assert_eq!(a.fingerprint(), CommitQuery::default().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_contributor_key_prefers_email() {
        let commit = CommitInfo {
            sha: "abc".into(),
            message: "init".into(),
            author_name: Some("Ada".into()),
            author_email: Some("Ada@Example.com".into()),
            committer_name: None,
            committer_email: None,
            committed_at: None,
        };
        assert_eq!(commit.contributor_key().as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn test_contributor_key_uses_committer_first() {
        let wire: WireCommit = serde_json::from_value(serde_json::json!({
            "sha": "abc",
            "commit": {
                "message": "Merge pull request #1",
                "author": { "name": "Ada", "email": "ada@example.com", "date": "2024-01-01T00:00:00Z" },
                "committer": { "name": "Grace", "email": "Grace@Example.com", "date": "2024-01-02T00:00:00Z" }
            }
        }))
        .unwrap();

        let commit = CommitInfo::from(wire);
        assert_eq!(commit.author_email.as_deref(), Some("ada@example.com"));
        assert_eq!(commit.contributor_key().as_deref(), Some("grace@example.com"));

        let anonymous = CommitInfo {
            committer_email: Some("  ".into()),
            author_email: None,
            committer_name: Some("Linus".into()),
            ..commit
        };
        assert_eq!(anonymous.contributor_key().as_deref(), Some("linus"));
    }
}
