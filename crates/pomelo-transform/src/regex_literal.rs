//! `$regex` pattern preparation.
//!
//! The public dialect accepts Perl-style `\Q...\E` literal quoting and
//! an extended (`x`) mode with insignificant whitespace and `#`
//! comments. Stores get a pre-expanded pattern: quoted runs have every
//! non-alphanumeric character escaped (single quotes doubled), extended
//! mode is stripped at transform time, and only a leading `^` or
//! trailing `$` anchor survives around a quoted run.

use std::sync::LazyLock;

use regex::Regex;

static COMMENT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#.*\n").expect("static pattern compiles"));
static TRAILING_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)([^\\])#.*\n").expect("static pattern compiles"));
static UNESCAPED_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)([^\\])\s+").expect("static pattern compiles"));
static LEADING_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+").expect("static pattern compiles"));

static QUOTED_TAIL_CLOSED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\Q(\\[^E\n\r].*|[^\\\n\r].*|.??)\\E$").expect("static pattern compiles")
});
static QUOTED_TAIL_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\Q(\\[^E\n\r].*|[^\\\n\r].*|.??)$").expect("static pattern compiles")
});

static STRAY_E: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^\\])(\\E)").expect("static pattern compiles"));
static STRAY_Q: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^\\])(\\Q)").expect("static pattern compiles"));
static QUOTE_AFTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^'])'").expect("static pattern compiles"));
static QUOTE_LEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^'([^'])").expect("static pattern compiles"));

/// Strip extended-mode whitespace and `#` comments.
pub fn remove_whitespace(pattern: &str) -> String {
    let mut s = pattern.to_string();
    if !s.ends_with('\n') {
        s.push('\n');
    }
    let s = COMMENT_LINE.replace_all(&s, "").into_owned();
    let s = TRAILING_COMMENT.replace_all(&s, "$1").into_owned();
    let s = UNESCAPED_WHITESPACE.replace_all(&s, "$1").into_owned();
    let s = LEADING_WHITESPACE.replace_all(&s, "").into_owned();
    s.trim().to_string()
}

/// Expand `\Q...\E` runs, preserving only the outermost anchors.
pub fn process_regex_pattern(pattern: &str) -> String {
    if let Some(rest) = pattern.strip_prefix('^') {
        return format!("^{}", literalize_regex_part(rest));
    }
    if let Some(rest) = pattern.strip_suffix('$') {
        return format!("{}$", literalize_regex_part(rest));
    }
    literalize_regex_part(pattern)
}

/// Escape every non-alphanumeric character of a quoted run; single
/// quotes double instead.
fn create_literal_regex(quoted: &str) -> String {
    quoted
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_string()
            } else if c == '\'' {
                "''".to_string()
            } else {
                format!("\\{c}")
            }
        })
        .collect()
}

fn literalize_regex_part(pattern: &str) -> String {
    // A trailing \Q...\E run: literalize it, recurse on the prefix.
    if let Some(captures) = QUOTED_TAIL_CLOSED.captures(pattern) {
        let whole = captures.get(0).expect("match exists");
        let prefix = &pattern[..whole.start()];
        let quoted = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        return format!("{}{}", literalize_regex_part(prefix), create_literal_regex(quoted));
    }
    // A trailing \Q run left unclosed quotes to the end of the pattern.
    if let Some(captures) = QUOTED_TAIL_OPEN.captures(pattern) {
        let whole = captures.get(0).expect("match exists");
        let prefix = &pattern[..whole.start()];
        let quoted = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        return format!("{}{}", literalize_regex_part(prefix), create_literal_regex(quoted));
    }

    // No quoted runs left: drop stray markers and double bare quotes.
    let s = STRAY_E.replace_all(pattern, "$1").into_owned();
    let s = STRAY_Q.replace_all(&s, "$1").into_owned();
    let s = s.strip_prefix(r"\E").unwrap_or(&s).to_string();
    let s = s.strip_prefix(r"\Q").unwrap_or(&s).to_string();
    let s = QUOTE_AFTER.replace_all(&s, "$1''").into_owned();
    QUOTE_LEADING.replace_all(&s, "''$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_whitespace() {
        assert_eq!(remove_whitespace("^abc  #comment\n"), "^abc");
        assert_eq!(remove_whitespace("a b\tc"), "abc");
        assert_eq!(remove_whitespace("# leading comment\nabc"), "abc");
    }

    #[test]
    fn test_plain_patterns_pass_through() {
        assert_eq!(process_regex_pattern("^abc"), "^abc");
        assert_eq!(process_regex_pattern("abc$"), "abc$");
        assert_eq!(process_regex_pattern("abc"), "abc");
    }

    #[test]
    fn test_quoted_run_is_literalized() {
        assert_eq!(process_regex_pattern(r"^\Qa.b\E"), r"^a\.b");
        assert_eq!(process_regex_pattern(r"\Qa+b\E$"), r"a\+b$");
        assert_eq!(process_regex_pattern(r"\Qa*\E"), r"a\*");
    }

    #[test]
    fn test_unclosed_quote_runs_to_end() {
        assert_eq!(process_regex_pattern(r"\Qa.b"), r"a\.b");
    }

    #[test]
    fn test_single_quotes_double() {
        assert_eq!(process_regex_pattern(r"\Qit's\E"), r"it''s");
    }

    #[test]
    fn test_anchors_inside_quotes_are_neutralized() {
        assert_eq!(process_regex_pattern(r"\Qa^b$c\E"), r"a\^b\$c");
    }
}
