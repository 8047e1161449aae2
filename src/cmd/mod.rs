//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `parse`  | `Parse`          |
//! | `run`    | `Run`, `Apply`   |
//! | `config` | `Config`         |

pub mod config;
pub mod parse;
pub mod run;

pub use config::cmd_config;
pub use parse::cmd_parse;
pub use run::{cmd_apply, cmd_run};

/// Byte offsets at which to cut `text` into chunks of about `size` bytes,
/// never inside a UTF-8 sequence. The last offset is always `text.len()`.
/// A size of 0 yields a single chunk.
pub fn chunk_ends(text: &str, size: usize) -> Vec<usize> {
    if size == 0 || text.is_empty() {
        return vec![text.len()];
    }
    let mut ends = Vec::new();
    let mut end = 0;
    while end < text.len() {
        end = (end + size).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        ends.push(end);
    }
    ends
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ends_cover_text() {
        assert_eq!(chunk_ends("abcdefg", 3), vec![3, 6, 7]);
        assert_eq!(chunk_ends("abc", 0), vec![3]);
        assert_eq!(chunk_ends("", 4), vec![0]);
    }

    #[test]
    fn test_chunk_ends_respect_char_boundaries() {
        let text = "a\u{e9}\u{e9}b";
        for end in chunk_ends(text, 2) {
            assert!(text.is_char_boundary(end));
        }
        assert_eq!(*chunk_ends(text, 2).last().unwrap(), text.len());
    }
}
