//! Markdown code-fence stripping for streamed file content.
//!
//! Models wrap file bodies in fenced code blocks. A fence line is a line that
//! holds nothing but three backticks and an optional language hint; every such
//! line is removed. Applying the rule twice is the same as applying it once.
//!
//! Backticks elsewhere on a line are code and stay. The one exception is a
//! closing fence glued to the last line of a finished body, which
//! `strip_trailing_fence` removes once the close tag has been seen.

use regex::Regex;
use std::sync::LazyLock;

static FENCE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*```[\w.+#-]*[ \t]*(?:\r?\n|$)").unwrap());

static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`{3,}[ \t]*$").unwrap());

/// Remove every fence line from `content`.
pub fn strip_code_fences(content: &str) -> String {
    FENCE_LINE.replace_all(content, "").into_owned()
}

/// Drop a closing fence glued to the end of a finished body.
pub fn strip_trailing_fence(content: &str) -> &str {
    let trimmed = content.trim_end();
    match TRAILING_FENCE.find(trimmed) {
        Some(fence) => trimmed[..fence.start()].trim_end(),
        None => trimmed,
    }
}

/// Whether content for `path` should keep its fences.
///
/// Markdown documents legitimately contain fenced blocks.
pub fn keeps_fences(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".md") || lower.ends_with(".mdx")
}
