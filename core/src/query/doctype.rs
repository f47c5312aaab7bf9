/// Stage 2 doc-type intent classification. Multi-word patterns are checked
/// before single-word ones so "business plan" wins over a bare "plan" match.
const MULTI_WORD_PATTERNS: &[(&str, &str)] = &[
    ("cover letter", "letter"),
    ("business plan", "plan"),
    ("meeting notes", "notes"),
    ("tax return", "tax_document"),
    ("source code", "code"),
];

const SINGLE_WORD_PATTERNS: &[(&str, &str)] = &[
    ("resume", "resume"),
    ("cv", "resume"),
    ("invoice", "invoice"),
    ("receipt", "receipt"),
    ("contract", "contract"),
    ("spreadsheet", "spreadsheet"),
    ("presentation", "presentation"),
    ("report", "report"),
    ("proposal", "proposal"),
    ("screenshot", "screenshot"),
    ("photo", "photo"),
    ("video", "video"),
    ("notes", "notes"),
    ("letter", "letter"),
    ("budget", "budget"),
];

pub fn classify_doc_type(lower_query: &str) -> Option<String> {
    for (pattern, label) in MULTI_WORD_PATTERNS {
        if lower_query.contains(pattern) {
            return Some((*label).to_string());
        }
    }
    for (pattern, label) in SINGLE_WORD_PATTERNS {
        if lower_query.split_whitespace().any(|t| t == *pattern) {
            return Some((*label).to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_word_pattern_wins_over_single_word() {
        assert_eq!(classify_doc_type("my business plan draft").as_deref(), Some("plan"));
    }

    #[test]
    fn single_word_pattern_matches() {
        assert_eq!(classify_doc_type("q3 invoice").as_deref(), Some("invoice"));
    }

    #[test]
    fn no_keyword_returns_none() {
        assert!(classify_doc_type("vacation photos from spain").is_none());
    }
}
