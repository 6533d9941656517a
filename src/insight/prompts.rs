//! Prompt templates for insight generation

use super::InsightRequest;

/// Prompt asking for a repository summary
pub struct InsightPrompt;

impl InsightPrompt {
    pub fn generate(request: &InsightRequest) -> String {
        let mut prompt = String::new();

        prompt.push_str(INSIGHT_SYSTEM_PROMPT);
        prompt.push('\n');

        prompt.push_str("## Repository\n\n");
        prompt.push_str(&format!("**Name:** {}/{}\n", request.owner, request.repo));
        if let Some(ref description) = request.description {
            prompt.push_str(&format!("**Description:** {}\n", description));
        }
        if let Some(ref language) = request.language {
            prompt.push_str(&format!("**Primary language:** {}\n", language));
        }
        if !request.languages.is_empty() {
            prompt.push_str(&format!("**Languages:** {}\n", request.languages.join(", ")));
        }
        if !request.topics.is_empty() {
            prompt.push_str(&format!("**Topics:** {}\n", request.topics.join(", ")));
        }

        if let Some(ref breakdown) = request.breakdown {
            prompt.push_str("\n## Completeness\n\n");
            for (name, points, max) in breakdown.rows() {
                prompt.push_str(&format!("- {}: {}/{}\n", name, points, max));
            }
            prompt.push_str(&format!("- total: {}/100\n", breakdown.total));
        }

        prompt.push('\n');
        prompt.push_str(INSIGHT_INSTRUCTIONS);

        prompt
    }
}

/// Strip surrounding prose or code fences from a model reply
pub fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

const INSIGHT_SYSTEM_PROMPT: &str = r#"You are reviewing a public source code repository.
Summarize what it is for and how it could be improved, using only the facts given below.
"#;

const INSIGHT_INSTRUCTIONS: &str = r#"## Instructions

Respond with a JSON object containing:
- purpose: one or two sentences describing what the project does
- techStack: array of the main languages, frameworks and tools
- features: array of notable features (at most 5)
- improvements: array of concrete improvement suggestions (at most 5)
- mistakes: array of likely mistakes or gaps, based on the completeness scores (at most 5)

Respond ONLY with valid JSON, no other text.
"#;
