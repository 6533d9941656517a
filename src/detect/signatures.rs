//! Per-provider evidence signatures
//!
//! The table is iterated generically by the detector; adding a provider means
//! adding one row here and one variant to [`Provider`].

use super::Provider;
use regex::{Regex, RegexBuilder};

/// Everything that identifies one provider
#[derive(Debug)]
pub struct ProviderSignature {
    pub provider: Provider,
    /// Lower-case substrings matched against tree paths
    pub file_patterns: &'static [&'static str],
    /// Case-insensitive regular expressions matched against commit messages
    pub commit_patterns: &'static [&'static str],
    /// Lower-case keywords searched for in README text
    pub readme_keywords: &'static [&'static str],
    /// Lower-case substrings used to attribute evidence items when tallying
    pub identifiers: &'static [&'static str],
}

/// Signature table, in tie-break priority order
pub const SIGNATURES: &[ProviderSignature] = &[
    ProviderSignature {
        provider: Provider::Claude,
        file_patterns: &["claude.md", ".claude/", ".claude.json", ".claudeignore"],
        commit_patterns: &[
            r"\bclaude\b",
            r"co-authored-by:.*anthropic",
            r"generated with .*claude",
        ],
        readme_keywords: &["claude", "anthropic"],
        identifiers: &["claude", "anthropic"],
    },
    ProviderSignature {
        provider: Provider::Cursor,
        file_patterns: &[".cursorrules", ".cursor/", ".cursorignore"],
        commit_patterns: &[
            r"\bcursor\s*(ai|ide|composer|agent)\b",
            r"generated (by|with|using) cursor",
        ],
        readme_keywords: &["cursor ai", "cursor ide", "cursor.sh", "cursor.com"],
        identifiers: &["cursor"],
    },
    ProviderSignature {
        provider: Provider::Copilot,
        file_patterns: &[".github/copilot-instructions.md", "copilot"],
        commit_patterns: &[r"\bcopilot\b"],
        readme_keywords: &["github copilot", "copilot"],
        identifiers: &["copilot"],
    },
    ProviderSignature {
        provider: Provider::ChatGpt,
        file_patterns: &["chatgpt", ".openai/"],
        commit_patterns: &[r"\bchat\s?gpt\b", r"\bgpt-?4o?\b", r"\bopenai\b"],
        readme_keywords: &["chatgpt", "openai", "gpt-4"],
        identifiers: &["chatgpt", "chat gpt", "openai", "gpt-4", "gpt4"],
    },
    ProviderSignature {
        provider: Provider::Windsurf,
        file_patterns: &[".windsurfrules", ".windsurf/", ".codeium/"],
        commit_patterns: &[r"\bwindsurf\b", r"\bcodeium\b"],
        readme_keywords: &["windsurf", "codeium"],
        identifiers: &["windsurf", "codeium"],
    },
    ProviderSignature {
        provider: Provider::Gemini,
        file_patterns: &["gemini.md", ".gemini/"],
        commit_patterns: &[r"\bgemini\b", r"\bbard\b"],
        readme_keywords: &["gemini", "google ai studio"],
        identifiers: &["gemini", "bard", "google ai studio"],
    },
    ProviderSignature {
        provider: Provider::Aider,
        file_patterns: &[".aider.conf.yml", ".aider.chat.history.md", ".aiderignore", ".aider"],
        commit_patterns: &[r"^aider:", r"\baider\b"],
        readme_keywords: &["aider"],
        identifiers: &["aider"],
    },
];

/// Commit patterns compiled once per detector
pub struct CompiledSignatures {
    commit_patterns: Vec<(Provider, Vec<Regex>)>,
}

impl CompiledSignatures {
    pub fn compile() -> Self {
        let commit_patterns = SIGNATURES
            .iter()
            .map(|sig| {
                let regexes = sig
                    .commit_patterns
                    .iter()
                    .filter_map(|pattern| {
                        RegexBuilder::new(pattern)
                            .case_insensitive(true)
                            .multi_line(true)
                            .build()
                            .map_err(|e| {
                                tracing::warn!(pattern, error = %e, "Skipping invalid commit pattern")
                            })
                            .ok()
                    })
                    .collect();
                (sig.provider, regexes)
            })
            .collect();

        Self { commit_patterns }
    }

    /// First provider whose commit patterns match `message`
    pub fn match_commit(&self, message: &str) -> Option<Provider> {
        self.commit_patterns
            .iter()
            .find(|(_, regexes)| regexes.iter().any(|re| re.is_match(message)))
            .map(|(provider, _)| *provider)
    }
}

/// First provider whose file patterns match `path`
pub fn match_file(path: &str) -> Option<Provider> {
    let lower = path.to_lowercase();
    SIGNATURES
        .iter()
        .find(|sig| sig.file_patterns.iter().any(|p| lower.contains(p)))
        .map(|sig| sig.provider)
}

/// Every README keyword found in `content`, in table order
pub fn readme_keywords(content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    SIGNATURES
        .iter()
        .flat_map(|sig| sig.readme_keywords.iter())
        .filter(|keyword| lower.contains(*keyword))
        .map(|keyword| keyword.to_string())
        .collect()
}
