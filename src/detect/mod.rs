//! Heuristic detection of AI-assisted development
//!
//! Evidence comes from three independent sources:
//! - Tree paths matched against per-provider file patterns
//! - Recent commit messages matched against per-provider expressions
//! - README text searched for per-provider keywords
//!
//! Detection is best-effort: a source that fails contributes nothing.

mod detector;
pub mod signatures;

pub use detector::{AiUsageDetector, README_VARIANTS};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-item weight of file evidence
pub const FILE_WEIGHT: f64 = 0.4;
/// Cap on the file contribution
pub const FILE_CAP: f64 = 1.0;
/// Per-item weight of commit evidence
pub const COMMIT_WEIGHT: f64 = 0.1;
/// Cap on the commit contribution
pub const COMMIT_CAP: f64 = 0.5;
/// Per-item weight of README evidence
pub const README_WEIGHT: f64 = 0.05;
/// Cap on the README contribution
pub const README_CAP: f64 = 0.3;
/// Normalizing denominator (sum of the caps)
pub const CONFIDENCE_DENOMINATOR: f64 = 1.8;
/// Confidence strictly above this counts as detected
pub const DETECTION_THRESHOLD: f64 = 0.3;

/// Known AI coding tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    Cursor,
    Copilot,
    #[serde(rename = "chatgpt")]
    ChatGpt,
    Windsurf,
    Gemini,
    Aider,
}

impl Provider {
    /// All providers, highest tie-break priority first
    pub const ALL: [Provider; 7] = [
        Provider::Claude,
        Provider::Cursor,
        Provider::Copilot,
        Provider::ChatGpt,
        Provider::Windsurf,
        Provider::Gemini,
        Provider::Aider,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::Cursor => "cursor",
            Provider::Copilot => "copilot",
            Provider::ChatGpt => "chatgpt",
            Provider::Windsurf => "windsurf",
            Provider::Gemini => "gemini",
            Provider::Aider => "aider",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown provider: {}", s))
    }
}

/// Indicators collected per source; never deduplicated across sources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub files: Vec<String>,
    pub commits: Vec<String>,
    pub readme_mentions: Vec<String>,
}

impl Evidence {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.commits.is_empty() && self.readme_mentions.is_empty()
    }

    fn items(&self) -> impl Iterator<Item = &String> {
        self.files
            .iter()
            .chain(self.commits.iter())
            .chain(self.readme_mentions.iter())
    }
}

/// Outcome of a detection run
///
/// `detected` is always `confidence > DETECTION_THRESHOLD`, and `provider` is
/// only set when detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detected: bool,
    pub provider: Option<Provider>,
    pub confidence: f64,
    pub evidence: Evidence,
}

impl DetectionResult {
    /// Result used when the repository cannot be inspected at all
    pub fn none() -> Self {
        Self {
            detected: false,
            provider: None,
            confidence: 0.0,
            evidence: Evidence::default(),
        }
    }

    /// Classify collected evidence
    pub fn from_evidence(evidence: Evidence) -> Self {
        let confidence = confidence(&evidence);
        let detected = confidence > DETECTION_THRESHOLD;
        let provider = if detected {
            leading_provider(&evidence)
        } else {
            None
        };

        Self {
            detected,
            provider,
            confidence,
            evidence,
        }
    }
}

/// Weighted, capped and normalized confidence in `[0, 1]`
pub fn confidence(evidence: &Evidence) -> f64 {
    let files = (evidence.files.len() as f64 * FILE_WEIGHT).min(FILE_CAP);
    let commits = (evidence.commits.len() as f64 * COMMIT_WEIGHT).min(COMMIT_CAP);
    let readme = (evidence.readme_mentions.len() as f64 * README_WEIGHT).min(README_CAP);

    ((files + commits + readme) / CONFIDENCE_DENOMINATOR).clamp(0.0, 1.0)
}

/// Provider with the highest evidence tally, regardless of the threshold
///
/// Ties go to the provider listed first in [`Provider::ALL`].
pub fn leading_provider(evidence: &Evidence) -> Option<Provider> {
    let lowered: Vec<String> = evidence.items().map(|item| item.to_lowercase()).collect();

    let mut best: Option<(Provider, usize)> = None;
    for sig in signatures::SIGNATURES {
        let tally = lowered
            .iter()
            .filter(|item| sig.identifiers.iter().any(|id| item.contains(id)))
            .count();

        if tally == 0 {
            continue;
        }
        match best {
            Some((_, top)) if top >= tally => {}
            _ => best = Some((sig.provider, tally)),
        }
    }

    best.map(|(provider, _)| provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence(files: &[&str], commits: &[&str], readme: &[&str]) -> Evidence {
        Evidence {
            files: files.iter().map(|s| s.to_string()).collect(),
            commits: commits.iter().map(|s| s.to_string()).collect(),
            readme_mentions: readme.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_confidence_is_capped_per_source() {
        let e = evidence(
            &["CLAUDE.md", ".claude/settings.json", ".claude/a", ".claude/b"],
            &["claude"; 12],
            &["claude"; 9],
        );
        assert!((confidence(&e) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_is_strict() {
        let one_file = evidence(&["CLAUDE.md"], &[], &[]);
        let c = confidence(&one_file);
        assert!((c - 0.4 / 1.8).abs() < 1e-9);
        assert!(!DetectionResult::from_evidence(one_file).detected);

        let two_files = evidence(&["CLAUDE.md", ".claude/settings.json"], &[], &[]);
        let result = DetectionResult::from_evidence(two_files);
        assert!(result.detected);
        assert_eq!(result.provider, Some(Provider::Claude));
    }

    #[test]
    fn test_ties_follow_priority_order() {
        let e = evidence(&[".aider.conf.yml", ".cursorrules"], &[], &[]);
        assert_eq!(leading_provider(&e), Some(Provider::Cursor));

        let e = evidence(&[], &["aider: x", "aider: y"], &["cursor ai"]);
        assert_eq!(leading_provider(&e), Some(Provider::Aider));
    }

    #[test]
    fn test_undetected_result_keeps_evidence_but_no_provider() {
        let e = evidence(&[], &["Claude helped"], &[]);
        let result = DetectionResult::from_evidence(e.clone());
        assert!(!result.detected);
        assert_eq!(result.provider, None);
        assert_eq!(result.evidence, e);
        assert_eq!(leading_provider(&e), Some(Provider::Claude));
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("ChatGPT".parse::<Provider>().unwrap(), Provider::ChatGpt);
        assert!("notepad".parse::<Provider>().is_err());
        assert_eq!(
            serde_json::to_string(&Provider::ChatGpt).unwrap(),
            "\"chatgpt\""
        );
    }
}
