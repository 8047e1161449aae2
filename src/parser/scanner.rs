//! Low-level tag scanning over a growing buffer.
//!
//! Every routine takes an explicit start offset and never looks behind it.
//! All markers are ASCII, so every offset returned here is a char boundary.

/// The four literal markers of the tag protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNames {
    pub artifact_open: String,
    pub artifact_close: String,
    pub action_open: String,
    pub action_close: String,
}

impl TagNames {
    pub fn new(artifact: &str, action: &str) -> Self {
        Self {
            artifact_open: format!("<{}", artifact),
            artifact_close: format!("</{}>", artifact),
            action_open: format!("<{}", action),
            action_close: format!("</{}>", action),
        }
    }
}

impl Default for TagNames {
    fn default() -> Self {
        Self::new("artifact", "action")
    }
}

/// Result of looking for an open tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenTag {
    /// A full tag `buf[start..=end]`, where `buf[end] == '>'`.
    Complete { start: usize, end: usize },
    /// The marker starts at `start` but the tag has not fully arrived.
    Partial { start: usize },
}

/// Position of the next `marker` at or after `from`.
pub fn find_marker(buf: &str, marker: &str, from: usize) -> Option<usize> {
    buf.get(from..)?.find(marker).map(|pos| from + pos)
}

/// Position of the `>` closing a tag whose body begins at `from`.
///
/// `>` inside single or double quotes does not count. Returns `None` if the
/// buffer ends first.
pub fn find_tag_end(buf: &str, from: usize) -> Option<usize> {
    let bytes = buf.as_bytes();
    let mut quote: Option<u8> = None;
    for (offset, &b) in bytes.get(from..)?.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => return Some(from + offset),
                _ => {}
            },
        }
    }
    None
}

/// Whether the byte following a marker delimits a tag name.
pub fn is_tag_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'>' || b == b'/'
}

/// Find the next open tag for `marker` at or after `from`.
///
/// Occurrences where the marker is only a prefix of a longer name
/// (`<actions`) are skipped. `None` means no candidate exists in the buffer.
pub fn find_open_tag(buf: &str, marker: &str, from: usize) -> Option<OpenTag> {
    let mut search = from;
    loop {
        let start = find_marker(buf, marker, search)?;
        let after = start + marker.len();
        match buf.as_bytes().get(after) {
            None => return Some(OpenTag::Partial { start }),
            Some(&b) if is_tag_delimiter(b) => {
                return Some(match find_tag_end(buf, after) {
                    Some(end) => OpenTag::Complete { start, end },
                    None => OpenTag::Partial { start },
                });
            }
            Some(_) => search = after,
        }
    }
}

/// Offset where a trailing, possibly incomplete copy of `marker` begins.
///
/// Returns `buf.len()` when no suffix of `buf[from..]` is a proper prefix of
/// `marker`, i.e. everything up to the end is safe to consume.
pub fn partial_marker_start(buf: &str, from: usize, marker: &str) -> usize {
    let tail = &buf.as_bytes()[from.min(buf.len())..];
    let marker = marker.as_bytes();
    let longest = tail.len().min(marker.len().saturating_sub(1));
    for len in (1..=longest).rev() {
        if tail[tail.len() - len..] == marker[..len] {
            return buf.len() - len;
        }
    }
    buf.len()
}

/// Whether `buf[at..]` could still grow into `marker`.
pub fn is_marker_prefix(buf: &str, at: usize, marker: &str) -> bool {
    let rest = &buf[at..];
    rest.len() < marker.len() && marker.starts_with(rest)
}

/// Value of attribute `name` inside a tag slice such as `<action type="file">`.
///
/// Accepts double or single quotes. Only attribute names count, so `path`
/// does not match inside `filepath` nor inside another attribute's value.
pub fn extract_attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    attributes(tag).find(|(key, _)| *key == name).map(|(_, value)| value)
}

/// `key=value` pairs of a tag slice, left to right. Bare attributes are
/// skipped; an unterminated quoted value ends the walk.
fn attributes(tag: &str) -> impl Iterator<Item = (&str, &str)> {
    let is_name_end = |c: char| c.is_whitespace() || matches!(c, '=' | '>' | '/');
    let body = tag.strip_prefix('<').unwrap_or(tag);
    let mut rest = body.trim_start_matches(|c: char| !is_name_end(c));

    std::iter::from_fn(move || {
        loop {
            rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '/');
            if rest.is_empty() || rest.starts_with('>') {
                return None;
            }

            let key_len = rest.find(is_name_end).unwrap_or(rest.len());
            if key_len == 0 {
                // Stray `=` with no name before it.
                rest = &rest[1..];
                continue;
            }
            let key = &rest[..key_len];
            rest = rest[key_len..].trim_start();

            let Some(after_eq) = rest.strip_prefix('=') else {
                continue;
            };
            let value = after_eq.trim_start();
            match value.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let inner = &value[1..];
                    let end = inner.find(quote)?;
                    rest = &inner[end + 1..];
                    return Some((key, &inner[..end]));
                }
                _ => {
                    let end = value
                        .find(|c: char| c.is_whitespace() || c == '>')
                        .unwrap_or(value.len());
                    rest = &value[end..];
                    return Some((key, &value[..end]));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_names_markers() {
        let tags = TagNames::new("boltArtifact", "boltAction");
        assert_eq!(tags.artifact_open, "<boltArtifact");
        assert_eq!(tags.artifact_close, "</boltArtifact>");
        assert_eq!(tags.action_open, "<boltAction");
        assert_eq!(tags.action_close, "</boltAction>");
    }

    #[test]
    fn test_find_marker_respects_offset() {
        let buf = "<a><a>";
        assert_eq!(find_marker(buf, "<a>", 0), Some(0));
        assert_eq!(find_marker(buf, "<a>", 1), Some(3));
        assert_eq!(find_marker(buf, "<a>", 4), None);
        assert_eq!(find_marker(buf, "<a>", 100), None);
    }

    #[test]
    fn test_find_tag_end_skips_quoted_gt() {
        let buf = r#"<artifact title="a > b">rest"#;
        assert_eq!(find_tag_end(buf, 9), Some(23));
        assert_eq!(find_tag_end(r#"<artifact title="a > b"#, 9), None);
    }

    #[test]
    fn test_find_open_tag_complete_and_partial() {
        let buf = r#"xx<action type="shell">"#;
        assert_eq!(
            find_open_tag(buf, "<action", 0),
            Some(OpenTag::Complete { start: 2, end: 22 })
        );
        assert_eq!(
            find_open_tag(r#"xx<action type="sh"#, "<action", 0),
            Some(OpenTag::Partial { start: 2 })
        );
        assert_eq!(
            find_open_tag("xx<action", "<action", 0),
            Some(OpenTag::Partial { start: 2 })
        );
        assert_eq!(find_open_tag("plain text", "<action", 0), None);
    }

    #[test]
    fn test_find_open_tag_skips_longer_names() {
        let buf = r#"<actions><action type="file" path="a">"#;
        assert_eq!(
            find_open_tag(buf, "<action", 0),
            Some(OpenTag::Complete { start: 9, end: 37 })
        );
    }

    #[test]
    fn test_partial_marker_start() {
        assert_eq!(partial_marker_start("hello</act", 0, "</action>"), 5);
        assert_eq!(partial_marker_start("hello<", 0, "</action>"), 5);
        assert_eq!(partial_marker_start("hello", 0, "</action>"), 5);
        assert_eq!(partial_marker_start("a<b", 0, "</action>"), 3);
    }

    #[test]
    fn test_is_marker_prefix() {
        assert!(is_marker_prefix("text<arti", 4, "<artifact"));
        assert!(!is_marker_prefix("text<artifact", 4, "<artifact"));
        assert!(!is_marker_prefix("text<b", 4, "<artifact"));
    }

    #[test]
    fn test_extract_attribute() {
        let tag = r#"<artifact id="a1" title="Demo App">"#;
        assert_eq!(extract_attribute(tag, "id"), Some("a1"));
        assert_eq!(extract_attribute(tag, "title"), Some("Demo App"));
        assert_eq!(extract_attribute(tag, "type"), None);
    }

    #[test]
    fn test_extract_attribute_single_quotes_and_spacing() {
        let tag = "<action type = 'file' path='src/a.ts'>";
        assert_eq!(extract_attribute(tag, "type"), Some("file"));
        assert_eq!(extract_attribute(tag, "path"), Some("src/a.ts"));
    }

    #[test]
    fn test_extract_attribute_requires_word_boundary() {
        let tag = r#"<action filepath="x" path="y">"#;
        assert_eq!(extract_attribute(tag, "path"), Some("y"));
    }

    #[test]
    fn test_extract_attribute_ignores_names_inside_values() {
        let tag = r#"<artifact title="fix id='x' bug" id="a1">"#;
        assert_eq!(extract_attribute(tag, "id"), Some("a1"));
        assert_eq!(extract_attribute(tag, "title"), Some("fix id='x' bug"));

        let tag = r#"<action type="shell" note="path='x'" path="real">"#;
        assert_eq!(extract_attribute(tag, "path"), Some("real"));
        assert_eq!(extract_attribute(r#"<artifact title="id='x'">"#, "id"), None);
    }

    #[test]
    fn test_extract_attribute_skips_bare_and_unquoted() {
        let tag = r#"<action hidden type=shell path="a.sh">"#;
        assert_eq!(extract_attribute(tag, "type"), Some("shell"));
        assert_eq!(extract_attribute(tag, "path"), Some("a.sh"));
        assert_eq!(extract_attribute(tag, "hidden"), None);
        assert_eq!(extract_attribute(tag, "action"), None);
    }

    #[test]
    fn test_extract_attribute_unterminated_value() {
        assert_eq!(extract_attribute(r#"<artifact id="a1>"#, "id"), None);
    }
}
