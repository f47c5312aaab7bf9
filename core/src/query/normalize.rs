/// Stage 1 "Normalize" (§4.4). Strips a single layer of matching outer
/// quotes, drops noise punctuation, folds en/em dashes to a hyphen, collapses
/// whitespace and dash runs, and lowercases the remainder.
const NOISE_CHARS: &[char] = &['!', '?', '$', '@', '#', '%', '^', '&', '*', '(', ')', '{', '}', '[', ']', '~', '`'];

pub fn normalize(input: &str) -> String {
    let trimmed = input.trim();
    let stripped = strip_outer_quotes(trimmed);

    let mut out = String::with_capacity(stripped.len());
    for ch in stripped.chars() {
        if NOISE_CHARS.contains(&ch) {
            continue;
        }

        let mapped = match ch {
            '\u{2013}' | '\u{2014}' => '-',
            other => other,
        };

        if mapped.is_whitespace() {
            if out.is_empty() || out.ends_with(' ') || out.ends_with('-') {
                continue;
            }
            out.push(' ');
            continue;
        }

        if mapped == '-' {
            if out.ends_with('-') {
                continue;
            }
            if out.ends_with(' ') {
                out.pop();
            }
            out.push('-');
            continue;
        }

        for lower in mapped.to_lowercase() {
            out.push(lower);
        }
    }

    out.trim().to_string()
}

fn strip_outer_quotes(s: &str) -> &str {
    let mut chars = s.chars();
    let Some(first) = chars.next() else { return s };
    let Some(last) = s.chars().last() else { return s };
    if s.chars().count() < 2 {
        return s;
    }
    if (first == '"' && last == '"') || (first == '\'' && last == '\'') {
        let start = first.len_utf8();
        let end = s.len() - last.len_utf8();
        if start <= end {
            return &s[start..end];
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_lowercases() {
        assert_eq!(normalize("  Quarterly   Report  "), "quarterly report");
    }

    #[test]
    fn strips_matching_outer_quotes() {
        assert_eq!(normalize("\"budget plan\""), "budget plan");
    }

    #[test]
    fn folds_dash_variants_and_collapses_runs() {
        assert_eq!(normalize("foo – – bar"), "foo-bar");
    }

    #[test]
    fn drops_noise_punctuation() {
        assert_eq!(normalize("invoice #42!?"), "invoice 42");
    }
}
