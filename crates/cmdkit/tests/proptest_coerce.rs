// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property coverage for the text coercion rules.

use cmdkit::coerce::{normalize_newlines, to_bytes, to_text};
use cmdkit::Utf8Handling;
use proptest::prelude::*;

proptest! {
    /// Decoding what we encoded is the same as normalizing the original.
    #[test]
    fn encode_then_decode_normalizes(s in ".*") {
        prop_assert_eq!(to_text(&to_bytes(&s), Utf8Handling::Replace), normalize_newlines(&s));
    }

    /// Normalization is idempotent for text without a trailing newline.
    #[test]
    fn normalize_is_idempotent_after_one_pass(s in ".*") {
        let once = normalize_newlines(&s);
        // A second pass may only strip a trailing newline the first pass
        // exposed by rewriting a final "\r\n" or "\r".
        let twice = normalize_newlines(&once);
        let twice_with_newline = format!("{}\n", twice);
        prop_assert!(once == twice || once == twice_with_newline);
    }

    /// No carriage returns survive normalization.
    #[test]
    fn no_cr_survives(s in ".*") {
        prop_assert!(!normalize_newlines(&s).contains('\r'));
    }

    /// Both policies decode arbitrary bytes without panicking.
    #[test]
    fn decoding_is_total(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = to_text(&bytes, Utf8Handling::Replace);
        let _ = to_text(&bytes, Utf8Handling::Strip);
    }

    /// On valid UTF-8 the strip policy drops nothing, replacement characters
    /// included.
    #[test]
    fn strip_preserves_valid_utf8(s in ".*") {
        prop_assert_eq!(to_text(s.as_bytes(), Utf8Handling::Strip), normalize_newlines(&s));
    }
}
