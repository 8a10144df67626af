use std::sync::LazyLock;

use regex::Regex;

static FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+|\S+").expect("fragment pattern is valid")
});

/// Splits text into alternating maximal runs of whitespace and non-whitespace.
///
/// The fragments concatenate back to `text` exactly. Empty input yields no
/// fragments.
pub fn split_fragments(text: &str) -> Vec<&str> {
    FRAGMENT.find_iter(text).map(|m| m.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_and_spaces_alternate() {
        assert_eq!(split_fragments("Hello there"), vec!["Hello", " ", "there"]);
    }

    #[test]
    fn keeps_leading_trailing_and_mixed_whitespace() {
        let text = "  a\n\tbc  d. ";
        let fragments = split_fragments(text);
        assert_eq!(fragments, vec!["  ", "a", "\n\t", "bc", "  ", "d.", " "]);
        assert_eq!(fragments.concat(), text);
    }

    #[test]
    fn unicode_text_is_not_split_inside_words() {
        let text = "héllo wörld\u{3000}日本語";
        let fragments = split_fragments(text);
        assert_eq!(fragments, vec!["héllo", " ", "wörld", "\u{3000}", "日本語"]);
        assert_eq!(fragments.concat(), text);
    }

    #[test]
    fn empty_text_has_no_fragments() {
        assert!(split_fragments("").is_empty());
    }

    #[test]
    fn whitespace_only_is_one_fragment() {
        assert_eq!(split_fragments(" \n "), vec![" \n "]);
    }
}
