//! Descriptive insights about a repository
//!
//! Insights come from a completion model when one is configured and from
//! simple heuristics otherwise (or when the model fails).

mod client;
mod prompts;

pub use client::{LlmBackend, LlmClient, LlmConfig, LlmResponse};
pub use prompts::{extract_json, InsightPrompt};

use crate::analysis::classify::known_framework;
use crate::score::{CompletenessBreakdown, ScoreCategory};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Maximum entries per insight list
const MAX_ITEMS: usize = 5;

/// Derived, human-readable facts about a repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Insights {
    pub purpose: String,
    pub tech_stack: Vec<String>,
    pub features: Vec<String>,
    pub improvements: Vec<String>,
    pub mistakes: Vec<String>,
}

/// Facts handed to an insight generator
#[derive(Debug, Clone, Default)]
pub struct InsightRequest {
    pub owner: String,
    pub repo: String,
    pub description: Option<String>,
    pub language: Option<String>,
    /// All languages, largest first
    pub languages: Vec<String>,
    pub topics: Vec<String>,
    pub breakdown: Option<CompletenessBreakdown>,
}

/// Produces insights for a repository
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate(&self, request: &InsightRequest) -> Result<Insights>;
}

/// Rule-based insights from metadata and the completeness breakdown
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicInsights;

impl HeuristicInsights {
    pub fn derive(&self, request: &InsightRequest) -> Insights {
        let purpose = match request.description {
            Some(ref description) => description.trim().to_string(),
            None => match request.language {
                Some(ref language) => {
                    format!("A {} project ({}/{}).", language, request.owner, request.repo)
                }
                None => format!("A software project ({}/{}).", request.owner, request.repo),
            },
        };

        let mut tech_stack: Vec<String> = Vec::new();
        let languages = request.language.iter().chain(request.languages.iter());
        for language in languages {
            if !tech_stack.iter().any(|t| t.eq_ignore_ascii_case(language)) {
                tech_stack.push(language.clone());
            }
        }
        for topic in &request.topics {
            if let Some(framework) = known_framework(topic) {
                if !tech_stack.iter().any(|t| t == framework) {
                    tech_stack.push(framework.to_string());
                }
            }
        }

        let features = request
            .topics
            .iter()
            .filter(|topic| known_framework(topic).is_none())
            .take(MAX_ITEMS)
            .cloned()
            .collect();

        let (improvements, mistakes) = match request.breakdown {
            Some(ref breakdown) => (improvements(breakdown), mistakes(breakdown)),
            None => (Vec::new(), Vec::new()),
        };

        Insights {
            purpose,
            tech_stack,
            features,
            improvements,
            mistakes,
        }
    }
}

#[async_trait]
impl InsightGenerator for HeuristicInsights {
    async fn generate(&self, request: &InsightRequest) -> Result<Insights> {
        Ok(self.derive(request))
    }
}

fn improvements(breakdown: &CompletenessBreakdown) -> Vec<String> {
    let mut gaps: Vec<(u32, ScoreCategory)> = ScoreCategory::ALL
        .iter()
        .map(|c| (c.max_points() - breakdown.get(*c), *c))
        .filter(|(missing, _)| *missing > 0)
        .collect();
    // largest gap first, rubric order on ties
    gaps.sort_by(|a, b| b.0.cmp(&a.0));

    gaps.into_iter()
        .take(MAX_ITEMS)
        .map(|(_, category)| suggestion(category).to_string())
        .collect()
}

fn suggestion(category: ScoreCategory) -> &'static str {
    match category {
        ScoreCategory::Readme => "Expand the README with setup, usage and examples",
        ScoreCategory::PackageManager => "Declare dependencies in a package manifest",
        ScoreCategory::Tests => "Add automated tests for the core functionality",
        ScoreCategory::Config => "Check in formatter, linter and editor configuration",
        ScoreCategory::Documentation => "Add documentation beyond the README",
        ScoreCategory::License => "Add a license so others know how they may reuse the code",
        ScoreCategory::GitMaturity => "Commit in smaller, more frequent steps",
        ScoreCategory::Contributors => "Invite contributors and document how to contribute",
        ScoreCategory::Cicd => "Set up continuous integration to run builds and tests",
    }
}

fn mistakes(breakdown: &CompletenessBreakdown) -> Vec<String> {
    let checks = [
        (ScoreCategory::Readme, "No README at the repository root"),
        (ScoreCategory::License, "No license declared"),
        (ScoreCategory::Tests, "No automated tests found"),
        (ScoreCategory::Cicd, "No continuous integration configured"),
        (ScoreCategory::PackageManager, "Dependencies are not declared in a manifest"),
    ];

    checks
        .iter()
        .filter(|(category, _)| breakdown.get(*category) == 0)
        .map(|(_, message)| message.to_string())
        .collect()
}

/// Model-backed generator with heuristic fallback
pub struct LlmInsightGenerator {
    backend: Arc<dyn LlmBackend>,
    fallback: HeuristicInsights,
}

impl LlmInsightGenerator {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            fallback: HeuristicInsights,
        }
    }

    async fn ask(&self, request: &InsightRequest) -> Result<Insights> {
        let prompt = InsightPrompt::generate(request);
        let response = self.backend.complete(&prompt).await?;

        let mut insights: Insights = serde_json::from_str(extract_json(&response.content))
            .map_err(|e| anyhow::anyhow!("Failed to parse insight response: {}", e))?;
        if insights.purpose.trim().is_empty() {
            anyhow::bail!("Insight response has no purpose");
        }

        for list in [
            &mut insights.tech_stack,
            &mut insights.features,
            &mut insights.improvements,
            &mut insights.mistakes,
        ] {
            list.retain(|item| !item.trim().is_empty());
            list.truncate(MAX_ITEMS * 2);
        }
        Ok(insights)
    }
}

#[async_trait]
impl InsightGenerator for LlmInsightGenerator {
    async fn generate(&self, request: &InsightRequest) -> Result<Insights> {
        match self.ask(request).await {
            Ok(insights) => Ok(insights),
            Err(e) => {
                tracing::warn!(
                    owner = %request.owner,
                    repo = %request.repo,
                    error = %e,
                    "Insight generation failed, using heuristics"
                );
                Ok(self.fallback.derive(request))
            }
        }
    }
}
