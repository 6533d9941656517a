//! Evidence gathering

use super::signatures::{self, CompiledSignatures};
use super::{DetectionResult, Evidence};
use crate::github::{ClientResult, CommitQuery, RepoClient};
use std::sync::Arc;

/// README file names tried in order
pub const README_VARIANTS: &[&str] = &[
    "README.md",
    "readme.md",
    "Readme.md",
    "README",
    "README.markdown",
    "README.rst",
    "README.txt",
];

/// Number of recent commits inspected
const COMMIT_WINDOW: u32 = 100;

/// Gathers evidence for a repository and classifies it
pub struct AiUsageDetector {
    client: Arc<RepoClient>,
    signatures: CompiledSignatures,
}

impl AiUsageDetector {
    pub fn new(client: Arc<RepoClient>) -> Self {
        Self {
            client,
            signatures: CompiledSignatures::compile(),
        }
    }

    /// Detect AI tool usage; never fails
    ///
    /// If the repository itself cannot be reached the empty result is returned.
    pub async fn detect_ai_usage(&self, owner: &str, repo: &str) -> DetectionResult {
        let metadata = match self.client.get_repository(owner, repo).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(owner, repo, error = %e, "Repository unavailable, skipping detection");
                return DetectionResult::none();
            }
        };

        let branch = metadata.default_branch.as_str();
        let (files, commits, readme) = tokio::join!(
            self.file_evidence(owner, repo, branch),
            self.commit_evidence(owner, repo),
            self.readme_evidence(owner, repo),
        );

        let evidence = Evidence {
            files: degrade(files, owner, repo, "files"),
            commits: degrade(commits, owner, repo, "commits"),
            readme_mentions: degrade(readme, owner, repo, "readme"),
        };

        let result = DetectionResult::from_evidence(evidence);
        tracing::info!(
            owner,
            repo,
            detected = result.detected,
            provider = ?result.provider,
            confidence = result.confidence,
            "AI usage detection finished"
        );
        result
    }

    async fn file_evidence(&self, owner: &str, repo: &str, branch: &str) -> ClientResult<Vec<String>> {
        let tree = self.client.get_tree(owner, repo, Some(branch)).await?;
        Ok(tree
            .entries
            .iter()
            .filter(|entry| signatures::match_file(&entry.path).is_some())
            .map(|entry| entry.path.clone())
            .collect())
    }

    async fn commit_evidence(&self, owner: &str, repo: &str) -> ClientResult<Vec<String>> {
        let query = CommitQuery {
            per_page: COMMIT_WINDOW,
            ..Default::default()
        };
        let commits = self.client.get_commit_history(owner, repo, &query).await?;

        Ok(commits
            .into_iter()
            .filter(|commit| self.signatures.match_commit(&commit.message).is_some())
            .map(|commit| commit.message)
            .collect())
    }

    async fn readme_evidence(&self, owner: &str, repo: &str) -> ClientResult<Vec<String>> {
        for name in README_VARIANTS {
            match self.client.get_file_content(owner, repo, name).await {
                Ok(content) => return Ok(signatures::readme_keywords(&content)),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(Vec::new())
    }
}

fn degrade(result: ClientResult<Vec<String>>, owner: &str, repo: &str, source: &str) -> Vec<String> {
    result.unwrap_or_else(|e| {
        tracing::warn!(owner, repo, source, error = %e, "Evidence source failed");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::detect::{leading_provider, Provider};
    use crate::github::{ClientError, RetryPolicy};
    use crate::testing::FakeTransport;
    use serde_json::json;
    use std::time::Duration;

    fn detector(transport: Arc<FakeTransport>) -> AiUsageDetector {
        let client = RepoClient::new(transport, Arc::new(MemoryCache::new())).with_retry(
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
        );
        AiUsageDetector::new(Arc::new(client))
    }

    fn repo(transport: &FakeTransport) {
        transport.respond(
            "repos/octo/demo",
            json!({ "id": 7, "name": "demo", "owner": { "login": "octo" }, "default_branch": "main" }),
        );
    }

    fn commits(messages: &[&str]) -> serde_json::Value {
        serde_json::Value::Array(
            messages
                .iter()
                .enumerate()
                .map(|(i, m)| {
                    json!({
                        "sha": format!("{:040}", i),
                        "commit": {
                            "message": m,
                            "author": { "name": "dev", "email": "dev@example.com", "date": "2024-01-01T00:00:00Z" }
                        }
                    })
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_commit_mentions_below_threshold() {
        let transport = Arc::new(FakeTransport::new());
        repo(&transport);
        transport.respond(
            "repos/octo/demo/git/trees/main",
            json!({ "tree": [{ "path": "src/lib.rs", "type": "blob" }] }),
        );
        transport.respond(
            "repos/octo/demo/commits",
            commits(&[
                "Add parser (written with Claude)",
                "Claude: fix tests",
                "Refactor with claude",
                "Update docs via Claude",
                "claude suggested this",
                "Bump version",
            ]),
        );

        let result = detector(transport).detect_ai_usage("octo", "demo").await;

        assert_eq!(result.evidence.commits.len(), 5);
        assert!(result.evidence.files.is_empty());
        assert!(result.evidence.readme_mentions.is_empty());
        assert!((result.confidence - 0.5 / 1.8).abs() < 1e-9);
        assert!(!result.detected);
        assert_eq!(result.provider, None);
        assert_eq!(leading_provider(&result.evidence), Some(Provider::Claude));
    }

    #[tokio::test]
    async fn test_all_sources_contribute() {
        let transport = Arc::new(FakeTransport::new());
        repo(&transport);
        transport.respond(
            "repos/octo/demo/git/trees/main",
            json!({ "tree": [
                { "path": ".cursorrules", "type": "blob" },
                { "path": ".cursor/rules/style.mdc", "type": "blob" },
                { "path": "src/app.ts", "type": "blob" }
            ] }),
        );
        transport.respond("repos/octo/demo/commits", commits(&["Initial commit"]));
        transport.respond(
            "repos/octo/demo/contents/readme.md",
            json!({ "type": "file", "encoding": "base64", "content": "QnVpbHQgaW4gQ3Vyc29yIElERQ==" }),
        );

        let result = detector(transport.clone()).detect_ai_usage("octo", "demo").await;

        assert_eq!(result.evidence.files.len(), 2);
        assert_eq!(result.evidence.readme_mentions, vec!["cursor ide"]);
        assert!(result.detected);
        assert_eq!(result.provider, Some(Provider::Cursor));
        assert_eq!(transport.calls("repos/octo/demo/contents/README.md"), 1);
        assert_eq!(transport.calls("repos/octo/demo/contents/readme.md"), 1);
        assert_eq!(transport.calls("repos/octo/demo/contents/README"), 0);
    }

    #[tokio::test]
    async fn test_failing_source_does_not_abort_others() {
        let transport = Arc::new(FakeTransport::new());
        repo(&transport);
        transport.respond(
            "repos/octo/demo/git/trees/main",
            json!({ "tree": [
                { "path": "CLAUDE.md", "type": "blob" },
                { "path": ".claude/settings.json", "type": "blob" }
            ] }),
        );
        transport.fail_times(
            "repos/octo/demo/commits",
            10,
            ClientError::Server {
                status: 500,
                message: "boom".into(),
            },
        );

        let result = detector(transport).detect_ai_usage("octo", "demo").await;

        assert!(result.evidence.commits.is_empty());
        assert_eq!(result.evidence.files.len(), 2);
        assert!(result.detected);
        assert_eq!(result.provider, Some(Provider::Claude));
    }

    #[tokio::test]
    async fn test_unreachable_repository_yields_empty_result() {
        let transport = Arc::new(FakeTransport::new());
        let result = detector(transport).detect_ai_usage("octo", "gone").await;
        assert_eq!(result, DetectionResult::none());
    }
}
