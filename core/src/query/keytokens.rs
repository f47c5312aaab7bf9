const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "in", "on", "at", "to", "for", "with", "is", "are",
    "was", "were", "be", "been", "this", "that", "these", "those", "my", "your", "his", "her",
    "its", "our", "their", "from", "by", "as", "it", "i", "you", "he", "she", "we", "they",
];

/// Stage 2 key-token extraction: the normalized tokens that survive stopword
/// filtering and a minimum length, used both for routing's token count and as
/// the bag the router and scorer fall back to.
pub fn key_tokens(cleaned: &str) -> Vec<String> {
    cleaned
        .split_whitespace()
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_stopwords_and_short_tokens() {
        assert_eq!(key_tokens("the invoice is for my q3 report"), vec!["invoice", "report"]);
    }
}
