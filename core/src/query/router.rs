use crate::query::types::{QueryClass, QueryDomain};

const DEV_CODE_KEYWORDS: &[&str] = &[
    "cpp", "stacktrace", "exception", "function", "class", "method", "api", "endpoint", "build",
    "deploy", "repo", "git", "commit", "rust", "python", "javascript", "typescript",
];
const FINANCE_KEYWORDS: &[&str] = &["invoice", "receipt", "budget", "tax", "bank", "statement", "expense", "payment"];
const MEDIA_KEYWORDS: &[&str] = &["photo", "image", "screenshot", "video", "music", "podcast", "mp3", "mp4", "png", "jpg"];
const PERSONAL_DOCS_KEYWORDS: &[&str] = &["resume", "notes", "report", "proposal", "document", "contract", "letter", "spreadsheet"];

const INTERROGATIVE_KEYWORDS: &[&str] = &["how", "what", "where", "plan", "overview", "design", "architecture", "guide", "explain", "related"];
const EXTENSION_LIKE_KEYWORDS: &[&str] = &["pdf", "docx", "xlsx", "png", "jpg", "mp3", "zip"];

#[derive(Debug, Clone, Copy)]
pub struct QueryRouterResult {
    pub query_class: QueryClass,
    pub query_domain: QueryDomain,
    pub router_confidence: f64,
    pub query_domain_confidence: f64,
    pub semantic_need_score: f64,
    pub valid: bool,
}

fn looks_like_path_or_code(lower: &str) -> bool {
    if lower.contains('/') || lower.contains('\\') || lower.contains("::") {
        return true;
    }
    if lower.starts_with('.') || lower.starts_with('~') {
        return true;
    }
    if lower.chars().any(|c| "<>{}[]();=#".contains(c)) {
        return true;
    }
    has_extension_like_token(lower)
}

fn has_extension_like_token(lower: &str) -> bool {
    for word in lower.split_whitespace() {
        let token = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '.' && c != '_' && c != '-');
        if let Some(dot) = token.rfind('.') {
            if dot == 0 {
                continue;
            }
            let ext = &token[dot + 1..];
            let stem = &token[..dot];
            let ext_ok = !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric());
            let stem_ok = !stem.is_empty() && stem.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if ext_ok && stem_ok {
                return true;
            }
        }
    }
    false
}

fn contains_any(lower: &str, words: &[&str]) -> bool {
    words.iter().any(|w| lower.contains(w))
}

/// Stage 3 "Route" (§4.4). Classifies query shape and domain from the
/// original text and key tokens, and derives a semantic-need score used to
/// decide whether semantic retrieval is worth the extra cost for this query.
pub fn route(original: &str, cleaned: &str, key_tokens: &[String]) -> QueryRouterResult {
    let lower = original.to_lowercase();

    if cleaned.trim().is_empty() {
        return QueryRouterResult {
            query_class: QueryClass::Unknown,
            query_domain: QueryDomain::Unknown,
            router_confidence: 0.0,
            query_domain_confidence: 0.0,
            semantic_need_score: 0.0,
            valid: false,
        };
    }

    let token_count = key_tokens.len();
    let (query_class, router_confidence) = if looks_like_path_or_code(&lower) {
        (QueryClass::PathOrCode, 0.88)
    } else if token_count >= 3 {
        let bonus = (0.03 * (token_count as f64 - 3.0)).max(0.0).min(0.15);
        (QueryClass::NaturalLanguage, 0.75 + bonus)
    } else if token_count == 0 {
        (QueryClass::ShortAmbiguous, 0.45)
    } else {
        (QueryClass::ShortAmbiguous, 0.60)
    };

    let (query_domain, query_domain_confidence) = if contains_any(&lower, DEV_CODE_KEYWORDS) {
        (QueryDomain::DevCode, 0.82)
    } else if contains_any(&lower, FINANCE_KEYWORDS) {
        (QueryDomain::Finance, 0.80)
    } else if contains_any(&lower, MEDIA_KEYWORDS) {
        (QueryDomain::Media, 0.78)
    } else if contains_any(&lower, PERSONAL_DOCS_KEYWORDS) {
        (QueryDomain::PersonalDocs, 0.74)
    } else {
        (QueryDomain::General, 0.52)
    };

    let mut semantic_need = match query_class {
        QueryClass::NaturalLanguage => 0.68,
        QueryClass::ShortAmbiguous => 0.38,
        QueryClass::PathOrCode => 0.20,
        QueryClass::Unknown => 0.30,
    };
    if contains_any(&lower, INTERROGATIVE_KEYWORDS) {
        semantic_need += 0.12;
    }
    if contains_any(&lower, EXTENSION_LIKE_KEYWORDS) {
        semantic_need -= 0.08;
    }

    QueryRouterResult {
        query_class,
        query_domain,
        router_confidence: router_confidence.clamp(0.0, 1.0),
        query_domain_confidence: query_domain_confidence.clamp(0.0, 1.0),
        semantic_need_score: semantic_need.clamp(0.0, 1.0),
        valid: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::keytokens::key_tokens;
    use crate::query::normalize::normalize;

    fn run(original: &str) -> QueryRouterResult {
        let cleaned = normalize(original);
        let tokens = key_tokens(&cleaned);
        route(original, &cleaned, &tokens)
    }

    #[test]
    fn path_like_query_routes_high_confidence() {
        let result = run("src/main.rs");
        assert_eq!(result.query_class, QueryClass::PathOrCode);
        assert!((result.router_confidence - 0.88).abs() < 1e-9);
    }

    #[test]
    fn long_natural_language_query_gets_bonus_confidence() {
        let result = run("find the quarterly budget report from finance");
        assert_eq!(result.query_class, QueryClass::NaturalLanguage);
        assert!(result.router_confidence > 0.75);
    }

    #[test]
    fn empty_query_is_invalid() {
        let result = run("   ");
        assert!(!result.valid);
    }

    #[test]
    fn finance_keyword_routes_finance_domain() {
        let result = run("march invoice from acme");
        assert_eq!(result.query_domain, QueryDomain::Finance);
    }
}
