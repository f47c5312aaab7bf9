use crate::ranking::types::MatchType;

fn strip_extension(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => &file_name[..dot],
        _ => file_name,
    }
}

/// Collapses runs of `-`/`_`/en-dash/em-dash (with surrounding whitespace)
/// into a single space, then collapses remaining whitespace runs.
fn normalize_separators(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        let is_sep = matches!(ch, '-' | '\u{2013}' | '\u{2014}' | '_');
        if is_sep {
            if !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
            continue;
        }
        if ch.is_whitespace() {
            if out.is_empty() || out.ends_with(' ') {
                continue;
            }
            out.push(' ');
            continue;
        }
        out.push(ch);
    }
    out.trim().to_string()
}

/// Stage 5 "Classify match type" (§4.4). Priority cascade: exact name,
/// prefix name, substring name, exact path, prefix path, fuzzy, else content
/// (content hits are identified upstream by the lexical worker and never
/// reach this classifier with a bm25-only hit).
pub fn classify(query: &str, file_name: &str, file_path: &str) -> MatchType {
    if query.is_empty() {
        return MatchType::Content;
    }

    let query_lower = query.to_lowercase();
    let name_lower = file_name.to_lowercase();
    let name_no_ext_lower = strip_extension(file_name).to_lowercase();

    let query_norm = normalize_separators(&query_lower);
    let name_no_ext_norm = normalize_separators(&name_no_ext_lower);

    if name_no_ext_norm == query_norm {
        return MatchType::ExactName;
    }
    if name_lower.starts_with(&query_lower) {
        return MatchType::PrefixName;
    }
    if name_lower.contains(&query_lower) {
        return MatchType::ContainsName;
    }
    if file_path == query {
        return MatchType::ExactPath;
    }
    if file_path.starts_with(query) {
        return MatchType::PrefixPath;
    }
    if is_fuzzy_match(query, file_name, 2) {
        return MatchType::Fuzzy;
    }
    MatchType::Content
}

/// Standard two-row Levenshtein distance, case-insensitive.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let (m, n) = (a.len(), b.len());
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];
    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            curr[j] = if a[i - 1] == b[j - 1] {
                prev[j - 1]
            } else {
                1 + prev[j].min(curr[j - 1]).min(prev[j - 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

pub fn is_fuzzy_match(query: &str, file_name: &str, max_distance: usize) -> bool {
    if query.is_empty() || file_name.is_empty() {
        return false;
    }
    let name_no_ext = strip_extension(file_name);
    edit_distance(query, name_no_ext) <= max_distance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_name_ignores_separator_style() {
        assert_eq!(classify("quarterly report", "quarterly_report.pdf", "/docs/quarterly_report.pdf"), MatchType::ExactName);
    }

    #[test]
    fn prefix_name_matches() {
        assert_eq!(classify("quart", "quarterly_report.pdf", "/docs/quarterly_report.pdf"), MatchType::PrefixName);
    }

    #[test]
    fn fuzzy_match_within_distance_two() {
        assert_eq!(classify("qarterly", "quarterly.pdf", "/docs/quarterly.pdf"), MatchType::Fuzzy);
    }

    #[test]
    fn unrelated_query_falls_back_to_content() {
        assert_eq!(classify("zzz", "quarterly.pdf", "/docs/quarterly.pdf"), MatchType::Content);
    }

    #[test]
    fn dotfile_extension_is_not_stripped() {
        assert_eq!(strip_extension(".bashrc"), ".bashrc");
    }
}
