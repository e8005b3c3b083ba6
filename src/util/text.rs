use std::borrow::Cow;

/// Ellipsis string used for truncation
const ELLIPSIS: &str = "...";
/// Length of the ellipsis in chars
const ELLIPSIS_LEN: usize = 3;

/// The five entities feed descriptions are expected to carry.
const ENTITIES: &[(&str, char)] = &[
    ("&amp;", '&'),
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&quot;", '"'),
    ("&#39;", '\''),
];

/// Removes tag-like substrings (`<` up to the next `>`).
///
/// An unmatched `<` is kept as literal text, so `"a < b"` survives intact.
///
/// # Examples
///
/// ```
/// use podcast_ingest::util::strip_tags;
///
/// assert_eq!(strip_tags("<p>Hello <b>world</b></p>"), "Hello world");
/// assert_eq!(strip_tags("1 < 2"), "1 < 2");
/// ```
pub fn strip_tags(s: &str) -> Cow<'_, str> {
    if !s.contains('<') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        match rest[open..].find('>') {
            Some(close) => rest = &rest[open + close + 1..],
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

/// Decodes `&amp; &lt; &gt; &quot; &#39;` in a single left-to-right pass.
///
/// Unknown entities are left untouched. A single pass means `&amp;lt;`
/// decodes to `&lt;`, not `<`.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match ENTITIES.iter().find(|(name, _)| tail.starts_with(name)) {
            Some((name, ch)) => {
                out.push(*ch);
                rest = &tail[name.len()..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

/// Removes control characters other than whitespace.
///
/// Feed text ends up in a remote database and in terminal output, neither of
/// which should receive raw escape sequences.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let needs_strip = s.chars().any(|c| c.is_control() && !c.is_whitespace());
    if !needs_strip {
        return Cow::Borrowed(s);
    }
    Cow::Owned(
        s.chars()
            .filter(|c| !c.is_control() || c.is_whitespace())
            .collect(),
    )
}

/// Collapses every run of whitespace into a single space and trims both ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Full cleaning used for episode titles and descriptions:
/// strip tags, decode entities, drop control chars, collapse whitespace.
///
/// # Examples
///
/// ```
/// use podcast_ingest::util::clean_text;
///
/// assert_eq!(clean_text("<p>Tom &amp; Jerry</p>\n\n  live"), "Tom & Jerry live");
/// ```
pub fn clean_text(s: &str) -> String {
    let stripped = strip_tags(s);
    let decoded = decode_entities(&stripped);
    let safe = strip_control_chars(&decoded);
    collapse_whitespace(&safe)
}

/// Caps a string at `max_chars` characters.
///
/// Over-long input keeps its first `max_chars - 3` characters followed by
/// `...`, so the result is exactly `max_chars` long. Counts chars, not
/// bytes, so multi-byte text is never split inside a code point.
///
/// # Examples
///
/// ```
/// use podcast_ingest::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("Hello World", 8), "Hello...");
/// assert_eq!(truncate_chars("羊の毛刈りイベント", 6), "羊の毛...");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_chars {
        return Cow::Borrowed(s);
    }

    // Too narrow for text + ellipsis: hard cut
    if max_chars <= ELLIPSIS_LEN {
        return Cow::Owned(s.chars().take(max_chars).collect());
    }

    let keep = max_chars - ELLIPSIS_LEN;
    let cut = s
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(s.len());
    Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags_nested_and_attributes() {
        assert_eq!(
            strip_tags(r#"<div class="x"><a href="/e">Episode</a> one</div>"#),
            "Episode one"
        );
    }

    #[test]
    fn test_strip_tags_unclosed_bracket_kept() {
        assert_eq!(strip_tags("a <b>bold</b> < end"), "a bold < end");
    }

    #[test]
    fn test_strip_tags_no_tags_borrows() {
        assert!(matches!(strip_tags("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn test_decode_entities_all_five() {
        assert_eq!(
            decode_entities("&amp; &lt; &gt; &quot; &#39;"),
            "& < > \" '"
        );
    }

    #[test]
    fn test_decode_entities_unknown_left_alone() {
        assert_eq!(decode_entities("&nbsp;&copy; & x"), "&nbsp;&copy; & x");
    }

    #[test]
    fn test_decode_entities_single_pass() {
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_strip_control_chars() {
        assert_eq!(strip_control_chars("a\x1b[31mb\x07c"), "a[31mbc");
        assert_eq!(strip_control_chars("tab\tnewline\n"), "tab\tnewline\n");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b   c  "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
        // Full-width space is Unicode whitespace
        assert_eq!(collapse_whitespace("羊\u{3000}\u{3000}牧場"), "羊 牧場");
    }

    #[test]
    fn test_clean_text_tags_then_entities() {
        // Encoded tags are decoded after stripping, so they survive as text
        assert_eq!(clean_text("&lt;b&gt; <i>x</i>"), "<b> x");
    }

    #[test]
    fn test_truncate_chars_exact_length_untouched() {
        let s = "a".repeat(100);
        assert_eq!(truncate_chars(&s, 100).len(), 100);
        assert!(matches!(truncate_chars(&s, 100), Cow::Borrowed(_)));
    }

    #[test]
    fn test_truncate_chars_over_cap() {
        let s = "x".repeat(600);
        let out = truncate_chars(&s, 500);
        assert_eq!(out.chars().count(), 500);
        assert!(out.ends_with("..."));
        assert_eq!(&out[..497], &s[..497]);
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        let s = "羊".repeat(120);
        let out = truncate_chars(&s, 100);
        assert_eq!(out.chars().count(), 100);
        assert!(out.starts_with(&"羊".repeat(97)));
    }

    #[test]
    fn test_truncate_chars_tiny_cap() {
        assert_eq!(truncate_chars("abcdef", 0), "");
        assert_eq!(truncate_chars("abcdef", 2), "ab");
    }
}
