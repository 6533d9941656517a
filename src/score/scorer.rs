//! Fetches the snapshot and applies the rubric

use super::rules::{count_words, readme_path, RuleSet, ScoreInputs};
use super::ScoreReport;
use crate::github::{ClientResult, CommitQuery, RepoClient};
use std::sync::Arc;

/// Scores repositories against the completeness rubric
pub struct CompletenessScorer {
    client: Arc<RepoClient>,
    rules: RuleSet,
}

impl CompletenessScorer {
    pub fn new(client: Arc<RepoClient>) -> Self {
        Self {
            client,
            rules: RuleSet::new(),
        }
    }

    /// Score a repository; never fails
    ///
    /// Each input is fetched once. A failed fetch zeroes the categories that
    /// depend on it and leaves the others untouched.
    pub async fn calculate_score(&self, owner: &str, repo: &str) -> ScoreReport {
        let inputs = self.gather(owner, repo).await;
        let report = self.score_inputs(&inputs);

        tracing::info!(owner, repo, score = report.score, "Completeness score calculated");
        report
    }

    /// Apply the rubric to already-fetched inputs
    pub fn score_inputs(&self, inputs: &ScoreInputs) -> ScoreReport {
        ScoreReport::from_breakdown(self.rules.evaluate(inputs))
    }

    async fn gather(&self, owner: &str, repo: &str) -> ScoreInputs {
        let metadata = optional(self.client.get_repository(owner, repo).await, owner, repo, "metadata");
        let branch = metadata.as_ref().map(|m| m.default_branch.as_str());

        let query = CommitQuery::default();
        let (tree, commits) = tokio::join!(
            self.client.get_tree(owner, repo, branch),
            self.client.get_commit_history(owner, repo, &query),
        );
        let tree = optional(tree, owner, repo, "tree");
        let commits = optional(commits, owner, repo, "commits");

        let readme_words = match tree.as_ref().and_then(readme_path) {
            Some(path) => {
                let content = self.client.get_file_content(owner, repo, path).await;
                optional(content, owner, repo, "readme").map(|content| count_words(&content))
            }
            None => None,
        };

        ScoreInputs {
            metadata,
            tree,
            commits,
            readme_words,
        }
    }
}

fn optional<T>(result: ClientResult<T>, owner: &str, repo: &str, input: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(owner, repo, input, error = %e, "Scoring input unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::github::RetryPolicy;
    use crate::score::CompletenessBreakdown;
    use crate::testing::FakeTransport;
    use base64::Engine;
    use serde_json::json;
    use std::time::Duration;

    fn scorer(transport: Arc<FakeTransport>) -> CompletenessScorer {
        let client = RepoClient::new(transport, Arc::new(MemoryCache::new())).with_retry(
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
        );
        CompletenessScorer::new(Arc::new(client))
    }

    fn tree(paths: &[String]) -> serde_json::Value {
        json!({
            "tree": paths.iter().map(|p| json!({ "path": p, "type": "blob" })).collect::<Vec<_>>(),
            "truncated": false
        })
    }

    fn commits(count: usize, authors: usize) -> serde_json::Value {
        serde_json::Value::Array(
            (0..count)
                .map(|i| {
                    json!({
                        "sha": format!("{:040x}", i),
                        "commit": {
                            "message": format!("change {}", i),
                            "author": {
                                "name": format!("dev{}", i % authors),
                                "email": format!("dev{}@example.com", i % authors),
                                "date": "2024-03-01T12:00:00Z"
                            },
                            "committer": {
                                "name": format!("dev{}", i % authors),
                                "email": format!("dev{}@example.com", i % authors),
                                "date": "2024-03-01T12:00:00Z"
                            }
                        }
                    })
                })
                .collect(),
        )
    }

    fn encoded(text: &str) -> serde_json::Value {
        json!({
            "type": "file",
            "encoding": "base64",
            "content": base64::engine::general_purpose::STANDARD.encode(text)
        })
    }

    #[tokio::test]
    async fn test_well_maintained_repository() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(
            "repos/octo/polished",
            json!({
                "id": 1, "name": "polished", "owner": { "login": "octo" },
                "license": { "spdx_id": "Apache-2.0" }, "default_branch": "main"
            }),
        );

        let mut paths: Vec<String> = vec![
            "package.json".into(),
            "tsconfig.json".into(),
            ".eslintrc.json".into(),
            ".prettierrc".into(),
            "README.md".into(),
            "CONTRIBUTING.md".into(),
            "CHANGELOG.md".into(),
            "docs/guide.md".into(),
            "docs/api.md".into(),
            "docs/setup.md".into(),
            "docs/faq.md".into(),
            "docs/architecture.md".into(),
            ".github/workflows/ci.yml".into(),
            "src/index.ts".into(),
        ];
        paths.extend((0..12).map(|i| format!("src/__tests__/module{}.test.ts", i)));
        transport.respond("repos/octo/polished/git/trees/main", tree(&paths));
        transport.respond("repos/octo/polished/commits", commits(120, 11));
        transport.respond(
            "repos/octo/polished/contents/README.md",
            encoded(&"word ".repeat(600)),
        );

        let report = scorer(transport).calculate_score("octo", "polished").await;

        assert_eq!(
            report.breakdown,
            CompletenessBreakdown {
                readme: 25,
                package_manager: 10,
                tests: 15,
                config: 7,
                documentation: 7,
                license: 5,
                git_maturity: 10,
                contributors: 5,
                cicd: 10,
                total: 94,
            }
        );
        assert_eq!(report.score, 94);
    }

    #[tokio::test]
    async fn test_bare_repository_scores_zero() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(
            "repos/octo/bare",
            json!({ "id": 2, "name": "bare", "owner": { "login": "octo" }, "license": null }),
        );
        transport.respond(
            "repos/octo/bare/git/trees/main",
            tree(&["main.c".to_string()]),
        );
        transport.respond("repos/octo/bare/commits", commits(3, 1));

        let report = scorer(transport).calculate_score("octo", "bare").await;

        assert_eq!(report.breakdown, CompletenessBreakdown::default());
        assert_eq!(report.score, 0);
    }

    #[tokio::test]
    async fn test_unreachable_repository_scores_zero() {
        let transport = Arc::new(FakeTransport::new());
        let report = scorer(transport).calculate_score("octo", "gone").await;
        assert_eq!(report, ScoreReport::empty());
        assert_eq!(report.breakdown.total, report.breakdown.category_sum());
    }

    #[tokio::test]
    async fn test_partial_data_degrades_per_category() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(
            "repos/octo/partial",
            json!({ "id": 3, "name": "partial", "owner": { "login": "octo" }, "license": { "spdx_id": "MIT" } }),
        );
        transport.respond("repos/octo/partial/commits", commits(25, 3));

        let report = scorer(transport).calculate_score("octo", "partial").await;

        assert_eq!(report.breakdown.license, 5);
        assert_eq!(report.breakdown.git_maturity, 6);
        assert_eq!(report.breakdown.contributors, 3);
        assert_eq!(report.breakdown.readme, 0);
        assert_eq!(report.score, 14);
    }
}
