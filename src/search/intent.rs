/// Query intent classification and entity extraction.
///
/// Pattern-matches a free-form query against keyword families to pick a
/// retrieval strategy, and pulls out entity candidates (quoted or
/// code-shaped identifiers, capitalized words), a stopword-filtered keyword
/// set, code-pattern fragments, and a language hint.
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    FindDefinition,
    FindUsage,
    FindSimilar,
    FindRelated,
    Explain,
    General,
}

/// Everything the classifier learned about one query.
#[derive(Debug, Clone)]
pub struct QueryAnalysis {
    pub intent: QueryIntent,
    /// Identifier candidates, best first.
    pub entities: Vec<String>,
    /// Lowercased, stopword-filtered tokens.
    pub keywords: Vec<String>,
    /// Backticked text and call-like fragments.
    pub code_patterns: Vec<String>,
    pub language: Option<String>,
}

static DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(defin(?:e|ed|ition)|declar(?:e|ed|ation)|go\s*to|where\s+is|implement(?:ed|ation)?\s+of|signature)\b")
        .expect("static intent pattern")
});
static USAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(usages?|used|uses|call(?:s|ers|ed)?|invoke[sd]?|who\s+calls|referenc(?:es|ed|ing))\b")
        .expect("static intent pattern")
});
static SIMILAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(similar|like\s+this|resembl\w*|analogous|same\s+as)\b")
        .expect("static intent pattern")
});
static RELATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(related|connected|depend(?:s|encies|ent)?|linked|coupled)\b")
        .expect("static intent pattern")
});
static EXPLAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(explain|what\s+(?:does|is)|how\s+(?:does|do)|describe|walk\s+me\s+through)\b")
        .expect("static intent pattern")
});

static QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[`'"]([A-Za-z_$][A-Za-z0-9_$.]*)[`'"]"#).expect("static entity pattern")
});
/// CamelCase, snake_case with an underscore, or Capitalized words.
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z$][a-z0-9$]*[A-Z][A-Za-z0-9_$]*|[A-Za-z][A-Za-z0-9]*_[A-Za-z0-9_]+|[A-Z][A-Za-z0-9]*)\b")
        .expect("static entity pattern")
});
static BACKTICKED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("static pattern"));
static CALL_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z_$][A-Za-z0-9_$]*\([^)]*\)").expect("static pattern")
});
static LANGUAGE_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(typescript|javascript|rust|python|go(?:lang)?)\b").expect("static pattern")
});

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "in", "on", "of", "to", "for", "by", "with", "and",
    "or", "me", "my", "all", "any", "this", "that", "it", "its", "do", "does", "did", "how",
    "what", "where", "which", "who", "when", "why", "find", "show", "get", "list", "search",
    "code", "function", "class", "method", "file", "please",
];

/// Classify a query and extract its searchable parts.
#[must_use]
pub fn analyze(query: &str) -> QueryAnalysis {
    let intent = classify_intent(query);

    let mut entities: Vec<String> = Vec::new();
    for caps in QUOTED.captures_iter(query) {
        push_unique(&mut entities, caps[1].to_string());
    }
    for caps in IDENTIFIER.captures_iter(query) {
        let candidate = caps[1].to_string();
        // Sentence-leading capitalized stopwords are not identifiers.
        if STOPWORDS.contains(&candidate.to_lowercase().as_str()) {
            continue;
        }
        push_unique(&mut entities, candidate);
    }

    let keywords: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .fold(Vec::new(), |mut acc, t| {
            if !acc.contains(&t) {
                acc.push(t);
            }
            acc
        });

    let mut code_patterns: Vec<String> = Vec::new();
    for caps in BACKTICKED.captures_iter(query) {
        push_unique(&mut code_patterns, caps[1].to_string());
    }
    for m in CALL_FRAGMENT.find_iter(query) {
        push_unique(&mut code_patterns, m.as_str().to_string());
    }

    let language = LANGUAGE_HINT
        .captures(query)
        .map(|caps| normalize_language(&caps[1]))
        // "go to definition" names no language.
        .filter(|lang| !(lang == "go" && query.to_lowercase().contains("go to")));

    QueryAnalysis {
        intent,
        entities,
        keywords,
        code_patterns,
        language,
    }
}

fn classify_intent(query: &str) -> QueryIntent {
    if DEFINITION.is_match(query) {
        QueryIntent::FindDefinition
    } else if USAGE.is_match(query) {
        QueryIntent::FindUsage
    } else if SIMILAR.is_match(query) {
        QueryIntent::FindSimilar
    } else if RELATED.is_match(query) {
        QueryIntent::FindRelated
    } else if EXPLAIN.is_match(query) {
        QueryIntent::Explain
    } else {
        QueryIntent::General
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn normalize_language(hint: &str) -> String {
    let lowered = hint.to_lowercase();
    if lowered == "golang" {
        "go".to_string()
    } else {
        lowered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_intent() {
        assert_eq!(
            analyze("where is getUserData defined").intent,
            QueryIntent::FindDefinition
        );
        assert_eq!(
            analyze("go to definition of Parser").intent,
            QueryIntent::FindDefinition
        );
    }

    #[test]
    fn test_usage_intent() {
        assert_eq!(
            analyze("find usages of getUserData").intent,
            QueryIntent::FindUsage
        );
        assert_eq!(
            analyze("who calls validateToken").intent,
            QueryIntent::FindUsage
        );
    }

    #[test]
    fn test_similar_intent() {
        assert_eq!(
            analyze("code similar to this handler").intent,
            QueryIntent::FindSimilar
        );
    }

    #[test]
    fn test_related_intent() {
        assert_eq!(
            analyze("what depends on the cache layer").intent,
            QueryIntent::FindRelated
        );
    }

    #[test]
    fn test_explain_intent() {
        assert_eq!(
            analyze("explain the retry loop").intent,
            QueryIntent::Explain
        );
    }

    #[test]
    fn test_general_intent() {
        assert_eq!(
            analyze("http retry backoff logic").intent,
            QueryIntent::General
        );
    }

    #[test]
    fn test_intent_precedence_definition_first() {
        // Both "defined" and "used" appear; definition wins.
        assert_eq!(
            analyze("where is this defined and used").intent,
            QueryIntent::FindDefinition
        );
    }

    #[test]
    fn test_entities_from_quotes_and_casing() {
        let analysis = analyze("find usages of 'getUserData' in the UserService");
        assert_eq!(analysis.entities[0], "getUserData");
        assert!(analysis.entities.contains(&"UserService".to_string()));
    }

    #[test]
    fn test_entities_snake_case() {
        let analysis = analyze("where is parse_config defined");
        assert!(analysis.entities.contains(&"parse_config".to_string()));
    }

    #[test]
    fn test_keywords_filter_stopwords() {
        let analysis = analyze("find all the usages of the parser");
        assert!(!analysis.keywords.contains(&"the".to_string()));
        assert!(!analysis.keywords.contains(&"find".to_string()));
        assert!(analysis.keywords.contains(&"parser".to_string()));
    }

    #[test]
    fn test_code_patterns() {
        let analysis = analyze("explain `retry(backoff)` and fetchData(url)");
        assert!(analysis.code_patterns.contains(&"retry(backoff)".to_string()));
        assert!(analysis.code_patterns.contains(&"fetchData(url)".to_string()));
    }

    #[test]
    fn test_language_hint() {
        assert_eq!(analyze("parsers in rust").language.as_deref(), Some("rust"));
        assert_eq!(
            analyze("golang handlers").language.as_deref(),
            Some("go")
        );
        assert_eq!(analyze("any parser").language, None);
        assert_eq!(
            analyze("go to definition of Parser").language,
            None,
            "navigation phrasing is not a language hint"
        );
    }

    #[test]
    fn test_empty_query() {
        let analysis = analyze("");
        assert_eq!(analysis.intent, QueryIntent::General);
        assert!(analysis.entities.is_empty());
        assert!(analysis.keywords.is_empty());
    }
}
