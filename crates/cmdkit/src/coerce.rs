// SPDX-License-Identifier: MIT OR Apache-2.0
//! Byte/text coercion at the process I/O boundary.
//!
//! Child processes on different platforms terminate lines differently, so
//! every decode normalizes `\r\n` and `\r` to `\n` and strips the final line
//! terminator. This gives callers a stable text representation regardless of
//! where the child ran.

use serde::{Deserialize, Serialize};

/// Policy for bytes that are not valid UTF-8 when decoding child output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Utf8Handling {
    /// Replace invalid sequences with U+FFFD (the default).
    #[default]
    Replace,
    /// Drop invalid sequences entirely.
    Strip,
}

/// Decode raw child output into normalized text.
///
/// Total: any byte sequence decodes under either [`Utf8Handling`] policy.
pub fn to_text(bytes: &[u8], utf8: Utf8Handling) -> String {
    let decoded = match utf8 {
        Utf8Handling::Replace => String::from_utf8_lossy(bytes).into_owned(),
        // Keep only the valid chunks; a genuine U+FFFD in valid input
        // survives, unlike filtering the lossy decode.
        Utf8Handling::Strip => bytes.utf8_chunks().map(|chunk| chunk.valid()).collect(),
    };
    normalize_newlines(&decoded)
}

/// Encode text for a child's stdin.
pub fn to_bytes(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Normalize `\r\n` and bare `\r` to `\n`, then strip one trailing newline.
pub fn normalize_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    if out.ends_with('\n') {
        out.pop();
    }
    out
}
