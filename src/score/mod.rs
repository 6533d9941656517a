//! Weighted completeness rubric
//!
//! Nine independent categories add up to a 0-100 score. Thresholds are fixed;
//! consumers compare scores across runs.

pub mod rules;
mod scorer;

pub use rules::{RuleSet, ScoreInputs, ScoreRule};
pub use scorer::CompletenessScorer;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rubric categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreCategory {
    Readme,
    PackageManager,
    Tests,
    Config,
    Documentation,
    License,
    GitMaturity,
    Contributors,
    Cicd,
}

impl ScoreCategory {
    pub const ALL: [ScoreCategory; 9] = [
        ScoreCategory::Readme,
        ScoreCategory::PackageManager,
        ScoreCategory::Tests,
        ScoreCategory::Config,
        ScoreCategory::Documentation,
        ScoreCategory::License,
        ScoreCategory::GitMaturity,
        ScoreCategory::Contributors,
        ScoreCategory::Cicd,
    ];

    /// Maximum points for the category
    pub fn max_points(&self) -> u32 {
        match self {
            ScoreCategory::Readme => 25,
            ScoreCategory::PackageManager => 10,
            ScoreCategory::Tests => 15,
            ScoreCategory::Config => 10,
            ScoreCategory::Documentation => 10,
            ScoreCategory::License => 5,
            ScoreCategory::GitMaturity => 10,
            ScoreCategory::Contributors => 5,
            ScoreCategory::Cicd => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreCategory::Readme => "readme",
            ScoreCategory::PackageManager => "packageManager",
            ScoreCategory::Tests => "tests",
            ScoreCategory::Config => "config",
            ScoreCategory::Documentation => "documentation",
            ScoreCategory::License => "license",
            ScoreCategory::GitMaturity => "gitMaturity",
            ScoreCategory::Contributors => "contributors",
            ScoreCategory::Cicd => "cicd",
        }
    }
}

impl fmt::Display for ScoreCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Points per category plus their sum
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletenessBreakdown {
    pub readme: u32,
    pub package_manager: u32,
    pub tests: u32,
    pub config: u32,
    pub documentation: u32,
    pub license: u32,
    pub git_maturity: u32,
    pub contributors: u32,
    pub cicd: u32,
    pub total: u32,
}

impl CompletenessBreakdown {
    /// Points awarded for a category
    pub fn get(&self, category: ScoreCategory) -> u32 {
        match category {
            ScoreCategory::Readme => self.readme,
            ScoreCategory::PackageManager => self.package_manager,
            ScoreCategory::Tests => self.tests,
            ScoreCategory::Config => self.config,
            ScoreCategory::Documentation => self.documentation,
            ScoreCategory::License => self.license,
            ScoreCategory::GitMaturity => self.git_maturity,
            ScoreCategory::Contributors => self.contributors,
            ScoreCategory::Cicd => self.cicd,
        }
    }

    /// Set a category (clamped to its maximum) and recompute the total
    pub fn set(&mut self, category: ScoreCategory, points: u32) {
        let points = points.min(category.max_points());
        let slot = match category {
            ScoreCategory::Readme => &mut self.readme,
            ScoreCategory::PackageManager => &mut self.package_manager,
            ScoreCategory::Tests => &mut self.tests,
            ScoreCategory::Config => &mut self.config,
            ScoreCategory::Documentation => &mut self.documentation,
            ScoreCategory::License => &mut self.license,
            ScoreCategory::GitMaturity => &mut self.git_maturity,
            ScoreCategory::Contributors => &mut self.contributors,
            ScoreCategory::Cicd => &mut self.cicd,
        };
        *slot = points;
        self.total = self.category_sum();
    }

    /// Sum of the nine categories
    pub fn category_sum(&self) -> u32 {
        ScoreCategory::ALL.iter().map(|c| self.get(*c)).sum()
    }

    /// `(name, points, max)` for display
    pub fn rows(&self) -> Vec<(&'static str, u32, u32)> {
        ScoreCategory::ALL
            .iter()
            .map(|c| (c.as_str(), self.get(*c), c.max_points()))
            .collect()
    }
}

/// Result of scoring one repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub score: u32,
    pub breakdown: CompletenessBreakdown,
}

impl ScoreReport {
    pub fn from_breakdown(breakdown: CompletenessBreakdown) -> Self {
        Self {
            score: breakdown.total,
            breakdown,
        }
    }

    /// All-zero report
    pub fn empty() -> Self {
        Self::from_breakdown(CompletenessBreakdown::default())
    }
}
