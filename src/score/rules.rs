//! Completeness rules
//!
//! Each rule scores one category from the fetched snapshot and returns 0 when
//! the data it needs is missing.

use super::{CompletenessBreakdown, ScoreCategory};
use crate::github::{CommitInfo, RepoMetadata, RepoTree};
use pulldown_cmark::{Event, Parser};
use std::collections::HashSet;

/// Everything the rules look at; any part may be missing
#[derive(Debug, Clone, Default)]
pub struct ScoreInputs {
    pub metadata: Option<RepoMetadata>,
    pub tree: Option<RepoTree>,
    pub commits: Option<Vec<CommitInfo>>,
    /// Word count of the README, when its content could be fetched
    pub readme_words: Option<usize>,
}

impl ScoreInputs {
    fn files(&self) -> impl Iterator<Item = &str> {
        self.tree.iter().flat_map(|tree| tree.file_paths())
    }

    fn count_files(&self, predicate: fn(&str) -> bool) -> usize {
        self.files().filter(|path| predicate(path)).count()
    }
}

/// A single rubric category
pub trait ScoreRule: Send + Sync {
    fn category(&self) -> ScoreCategory;

    fn score(&self, inputs: &ScoreInputs) -> u32;
}

/// The full rubric
pub struct RuleSet {
    rules: Vec<Box<dyn ScoreRule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(ReadmeRule),
                Box::new(PackageManagerRule),
                Box::new(TestsRule),
                Box::new(ConfigRule),
                Box::new(DocumentationRule),
                Box::new(LicenseRule),
                Box::new(GitMaturityRule),
                Box::new(ContributorsRule),
                Box::new(CicdRule),
            ],
        }
    }

    /// Score every category
    pub fn evaluate(&self, inputs: &ScoreInputs) -> CompletenessBreakdown {
        let mut breakdown = CompletenessBreakdown::default();
        for rule in &self.rules {
            breakdown.set(rule.category(), rule.score(inputs));
        }
        breakdown
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== Rules ====================

struct ReadmeRule;

impl ScoreRule for ReadmeRule {
    fn category(&self) -> ScoreCategory {
        ScoreCategory::Readme
    }

    fn score(&self, inputs: &ScoreInputs) -> u32 {
        if inputs.tree.as_ref().and_then(readme_path).is_none() {
            return 0;
        }

        let depth = match inputs.readme_words {
            Some(words) if words >= 500 => 10,
            Some(words) if words >= 200 => 7,
            Some(words) if words >= 100 => 5,
            Some(words) if words >= 50 => 3,
            Some(_) => 1,
            None => 0,
        };
        15 + depth
    }
}

struct PackageManagerRule;

impl ScoreRule for PackageManagerRule {
    fn category(&self) -> ScoreCategory {
        ScoreCategory::PackageManager
    }

    fn score(&self, inputs: &ScoreInputs) -> u32 {
        if inputs.count_files(is_manifest) > 0 {
            10
        } else {
            0
        }
    }
}

struct TestsRule;

impl ScoreRule for TestsRule {
    fn category(&self) -> ScoreCategory {
        ScoreCategory::Tests
    }

    fn score(&self, inputs: &ScoreInputs) -> u32 {
        match inputs.count_files(is_test) {
            n if n >= 10 => 15,
            n if n >= 5 => 12,
            n if n >= 2 => 10,
            1 => 7,
            _ => 0,
        }
    }
}

struct ConfigRule;

impl ScoreRule for ConfigRule {
    fn category(&self) -> ScoreCategory {
        ScoreCategory::Config
    }

    fn score(&self, inputs: &ScoreInputs) -> u32 {
        match inputs.count_files(is_config) {
            n if n >= 5 => 10,
            n if n >= 3 => 7,
            n if n >= 1 => 5,
            _ => 0,
        }
    }
}

struct DocumentationRule;

impl ScoreRule for DocumentationRule {
    fn category(&self) -> ScoreCategory {
        ScoreCategory::Documentation
    }

    fn score(&self, inputs: &ScoreInputs) -> u32 {
        match inputs.count_files(is_doc) {
            n if n >= 10 => 10,
            n if n >= 5 => 7,
            n if n >= 1 => 5,
            _ => 0,
        }
    }
}

struct LicenseRule;

impl ScoreRule for LicenseRule {
    fn category(&self) -> ScoreCategory {
        ScoreCategory::License
    }

    fn score(&self, inputs: &ScoreInputs) -> u32 {
        match inputs.metadata {
            Some(ref meta) if meta.license.is_some() => 5,
            _ => 0,
        }
    }
}

struct GitMaturityRule;

impl ScoreRule for GitMaturityRule {
    fn category(&self) -> ScoreCategory {
        ScoreCategory::GitMaturity
    }

    fn score(&self, inputs: &ScoreInputs) -> u32 {
        let count = inputs.commits.as_ref().map_or(0, Vec::len);
        match count {
            n if n >= 100 => 10,
            n if n >= 50 => 8,
            n if n >= 20 => 6,
            n if n >= 10 => 5,
            n if n >= 5 => 3,
            // under five commits
            _ => 0,
        }
    }
}

struct ContributorsRule;

impl ScoreRule for ContributorsRule {
    fn category(&self) -> ScoreCategory {
        ScoreCategory::Contributors
    }

    fn score(&self, inputs: &ScoreInputs) -> u32 {
        let count = inputs
            .commits
            .as_deref()
            .map_or(0, distinct_contributors);
        match count {
            n if n >= 10 => 5,
            n if n >= 5 => 4,
            n if n >= 3 => 3,
            2 => 2,
            _ => 0,
        }
    }
}

struct CicdRule;

impl ScoreRule for CicdRule {
    fn category(&self) -> ScoreCategory {
        ScoreCategory::Cicd
    }

    fn score(&self, inputs: &ScoreInputs) -> u32 {
        if inputs.count_files(is_ci) > 0 {
            10
        } else {
            0
        }
    }
}

// ==================== Path classification ====================

const MANIFESTS: &[&str] = &[
    "package.json",
    "cargo.toml",
    "requirements.txt",
    "pyproject.toml",
    "setup.py",
    "pipfile",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "gemfile",
    "composer.json",
    "mix.exs",
    "pubspec.yaml",
    "package.swift",
    "deno.json",
    "environment.yml",
];

const MANIFEST_EXTENSIONS: &[&str] = &[".csproj", ".fsproj", ".gemspec", ".cabal", ".nimble"];

const CONFIG_FILES: &[&str] = &[
    ".editorconfig",
    "dockerfile",
    "makefile",
    ".env.example",
    "rustfmt.toml",
    ".rustfmt.toml",
    "clippy.toml",
    "setup.cfg",
    "tox.ini",
    ".flake8",
    ".pylintrc",
    "mypy.ini",
    ".pre-commit-config.yaml",
    ".dockerignore",
    ".nvmrc",
    ".npmrc",
    ".golangci.yml",
    ".golangci.yaml",
    "renovate.json",
];

const CONFIG_PREFIXES: &[&str] = &[
    ".eslintrc",
    ".prettierrc",
    ".stylelintrc",
    ".babelrc",
    "tsconfig",
    "jsconfig",
    "jest.config",
    "vite.config",
    "vitest.config",
    "webpack.config",
    "rollup.config",
    "babel.config",
    "next.config",
    "tailwind.config",
    "postcss.config",
    "docker-compose",
];

const DOC_EXTENSIONS: &[&str] = &[".md", ".mdx", ".rst", ".adoc"];

const TEST_DIRS: &[&str] = &["test", "tests", "__tests__", "spec", "specs", "e2e", "testing"];

const CI_PREFIXES: &[&str] = &[".github/workflows/", ".circleci/", ".buildkite/"];

const CI_FILES: &[&str] = &[
    ".gitlab-ci.yml",
    ".travis.yml",
    "jenkinsfile",
    "azure-pipelines.yml",
    ".drone.yml",
    "bitbucket-pipelines.yml",
    "appveyor.yml",
    ".woodpecker.yml",
];

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Root-level README path, if the tree has one
pub fn readme_path(tree: &RepoTree) -> Option<&str> {
    tree.file_paths()
        .filter(|path| !path.contains('/'))
        .find(|path| path.to_lowercase().starts_with("readme"))
}

pub fn is_manifest(path: &str) -> bool {
    let name = basename(path).to_lowercase();
    MANIFESTS.contains(&name.as_str()) || MANIFEST_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

pub fn is_test(path: &str) -> bool {
    let lower = path.to_lowercase();
    let mut components: Vec<&str> = lower.split('/').collect();
    let name = components.pop().unwrap_or_default();

    if components.iter().any(|dir| TEST_DIRS.contains(dir)) {
        return true;
    }
    if name.contains(".test.") || name.contains(".spec.") {
        return true;
    }

    let file_stem = stem(name);
    if file_stem.starts_with("test_") || file_stem.ends_with("_test") || file_stem.ends_with("_spec") {
        return true;
    }

    // FooTest.java, FooTests.cs
    let original_stem = stem(basename(path));
    original_stem.len() > 4 && (original_stem.ends_with("Test") || original_stem.ends_with("Tests"))
}

pub fn is_config(path: &str) -> bool {
    let name = basename(path).to_lowercase();
    CONFIG_FILES.contains(&name.as_str()) || CONFIG_PREFIXES.iter().any(|p| name.starts_with(p))
}

pub fn is_doc(path: &str) -> bool {
    let lower = path.to_lowercase();
    DOC_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        || lower.starts_with("docs/")
        || lower.starts_with("doc/")
        || lower.contains("/docs/")
}

pub fn is_ci(path: &str) -> bool {
    let lower = path.to_lowercase();
    CI_PREFIXES.iter().any(|p| lower.starts_with(p)) || CI_FILES.contains(&lower.as_str())
}

/// Distinct contributor identities in a commit list
pub fn distinct_contributors(commits: &[CommitInfo]) -> usize {
    commits
        .iter()
        .filter_map(CommitInfo::contributor_key)
        .collect::<HashSet<_>>()
        .len()
}

/// Words of rendered text in a markdown document
pub fn count_words(markdown: &str) -> usize {
    Parser::new(markdown)
        .map(|event| match event {
            Event::Text(text) | Event::Code(text) => text
                .split_whitespace()
                .filter(|token| token.chars().any(char::is_alphanumeric))
                .count(),
            _ => 0,
        })
        .sum()
}
