//! Shared UI icons.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("\u{2705} ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("\u{274c} ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("\u{26a0}\u{fe0f}  ", "[WARN]");
pub static STOP: Emoji<'_, '_> = Emoji("\u{23f9}\u{fe0f}  ", "[STOP]");

// Action indicators
pub static FILE_NEW: Emoji<'_, '_> = Emoji("\u{1f4c4} ", "+");
pub static FILE_MOD: Emoji<'_, '_> = Emoji("\u{1f4dd} ", "~");
pub static RUNNING: Emoji<'_, '_> = Emoji("\u{25b6}\u{fe0f}  ", "[>]");
pub static QUEUED: Emoji<'_, '_> = Emoji("\u{23f3} ", "[.]");
pub static SERVER: Emoji<'_, '_> = Emoji("\u{1f310} ", "[URL]");
pub static PACKAGE: Emoji<'_, '_> = Emoji("\u{1f4e6} ", "[PKG]");
