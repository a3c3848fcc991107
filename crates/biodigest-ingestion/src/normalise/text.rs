//! Text clean-up shared by the normaliser and the identity resolver.

/// Collapse every run of whitespace (including newlines) to one space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title key used as the last-resort identity: lowercase alphanumeric words
/// joined by single spaces. Punctuation and case differences between sources
/// therefore map to the same key.
pub fn title_key(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First `max_chars` characters, respecting char boundaries.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Deep\n  learning\tfor  EEG \n"), "Deep learning for EEG");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn test_title_key_ignores_case_and_punctuation() {
        assert_eq!(
            title_key("Deep-Learning for EEG: A Survey."),
            title_key("deep learning FOR eeg a survey")
        );
        assert_eq!(title_key("?!"), "");
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("αβγδ", 2), "αβ");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
