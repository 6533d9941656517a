//! Project type and framework decision table

use serde::{Deserialize, Serialize};

/// Known frameworks: lower-case keyword, display name, implied project type
const FRAMEWORKS: &[FrameworkEntry] = &[
    ("react", "React", None),
    ("reactjs", "React", None),
    ("next.js", "Next.js", None),
    ("nextjs", "Next.js", None),
    ("vue", "Vue", None),
    ("vuejs", "Vue", None),
    ("nuxt", "Nuxt", None),
    ("angular", "Angular", None),
    ("svelte", "Svelte", None),
    ("sveltekit", "Svelte", None),
    ("express", "Express", None),
    ("expressjs", "Express", None),
    ("nestjs", "NestJS", None),
    ("fastify", "Fastify", None),
    ("django", "Django", None),
    ("flask", "Flask", None),
    ("fastapi", "FastAPI", None),
    ("rails", "Rails", None),
    ("ruby-on-rails", "Rails", None),
    ("spring", "Spring", None),
    ("spring-boot", "Spring", None),
    ("laravel", "Laravel", None),
    ("actix", "Actix", None),
    ("actix-web", "Actix", None),
    ("axum", "Axum", None),
    ("rocket", "Rocket", None),
    ("gin", "Gin", None),
    ("flutter", "Flutter", Some("mobile")),
    ("react-native", "React Native", Some("mobile")),
    ("electron", "Electron", Some("desktop")),
    ("tauri", "Tauri", Some("desktop")),
    ("pytorch", "PyTorch", Some("ml")),
    ("tensorflow", "TensorFlow", Some("ml")),
];

/// Keywords that name a project type outright
const TYPE_KEYWORDS: &[(&str, &str)] = &[
    ("cli", "cli"),
    ("command-line", "cli"),
    ("terminal", "cli"),
    ("api", "api"),
    ("rest-api", "api"),
    ("graphql", "api"),
    ("backend", "api"),
    ("library", "library"),
    ("sdk", "library"),
    ("mobile", "mobile"),
    ("android", "mobile"),
    ("ios", "mobile"),
    ("desktop", "desktop"),
    ("web", "web"),
    ("website", "web"),
    ("webapp", "web"),
    ("frontend", "web"),
    ("machine-learning", "ml"),
    ("deep-learning", "ml"),
    ("game", "game"),
    ("gamedev", "game"),
    ("bot", "bot"),
    ("discord-bot", "bot"),
];

/// Project type and framework
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectClass {
    pub project_type: String,
    pub framework: Option<String>,
}

/// Display name of a known framework keyword
pub fn known_framework(keyword: &str) -> Option<&'static str> {
    framework_entry(keyword).map(|(_, name, _)| *name)
}

type FrameworkEntry = (&'static str, &'static str, Option<&'static str>);

fn framework_entry(keyword: &str) -> Option<&'static FrameworkEntry> {
    let keyword = keyword.trim().to_lowercase();
    FRAMEWORKS.iter().find(|(k, _, _)| *k == keyword)
}

fn type_keyword(keyword: &str) -> Option<&'static str> {
    let keyword = keyword.trim().to_lowercase();
    TYPE_KEYWORDS
        .iter()
        .find(|(k, _)| *k == keyword)
        .map(|(_, t)| *t)
}

/// Classify a repository
///
/// Topics are consulted before tech-stack keywords. When neither names a type,
/// a framework-implied type and then the primary language decide.
pub fn classify_project(
    tech_stack: &[String],
    topics: &[String],
    language: Option<&str>,
) -> ProjectClass {
    let keywords = || topics.iter().chain(tech_stack.iter());

    let framework = keywords().find_map(|k| framework_entry(k));
    let explicit_type = keywords().find_map(|k| type_keyword(k));

    let project_type = explicit_type
        .or_else(|| framework.and_then(|(_, _, implied)| *implied))
        .map(str::to_string)
        .unwrap_or_else(|| language_fallback(language, framework.is_some()).to_string());

    ProjectClass {
        project_type,
        framework: framework.map(|(_, name, _)| name.to_string()),
    }
}

fn language_fallback(language: Option<&str>, has_framework: bool) -> &'static str {
    let language = match language {
        Some(language) => language.to_lowercase(),
        None => return "other",
    };

    match language.as_str() {
        "typescript" | "javascript" => {
            if has_framework {
                "web"
            } else {
                "library"
            }
        }
        "python" | "rust" | "go" | "java" | "kotlin" | "ruby" | "php" | "c#" | "elixir" => {
            if has_framework {
                "api"
            } else {
                "library"
            }
        }
        "swift" | "dart" | "objective-c" => "mobile",
        "html" | "css" | "vue" | "svelte" => "web",
        "jupyter notebook" => "ml",
        "c" | "c++" => "library",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_topics_name_the_type() {
        let class = classify_project(&[], &strings(&["cli", "rust"]), Some("Rust"));
        assert_eq!(class.project_type, "cli");
        assert_eq!(class.framework, None);
    }

    #[test]
    fn test_framework_from_tech_stack() {
        let class = classify_project(&strings(&["TypeScript", "React"]), &[], Some("TypeScript"));
        assert_eq!(class.framework.as_deref(), Some("React"));
        assert_eq!(class.project_type, "web");
    }

    #[test]
    fn test_language_fallbacks() {
        assert_eq!(classify_project(&[], &[], Some("JavaScript")).project_type, "library");
        assert_eq!(
            classify_project(&[], &strings(&["fastapi"]), Some("Python")).project_type,
            "api"
        );
        assert_eq!(classify_project(&[], &[], Some("Python")).project_type, "library");
        assert_eq!(classify_project(&[], &[], None).project_type, "other");
    }

    #[test]
    fn test_framework_implied_type() {
        let class = classify_project(&[], &strings(&["flutter"]), Some("Dart"));
        assert_eq!(class.project_type, "mobile");
        assert_eq!(class.framework.as_deref(), Some("Flutter"));
    }
}
