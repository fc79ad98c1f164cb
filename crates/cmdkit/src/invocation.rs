// SPDX-License-Identifier: MIT OR Apache-2.0
//! The resolved command an invocation layer hands to the runner.

/// A fully-resolved command line plus optional stdin payload.
///
/// `argv[0]` is the executable. The runner never constructs flags itself;
/// whatever builder produced this value has already done the formatting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Ordered argument sequence; the first element is the executable.
    pub argv: Vec<String>,
    /// Payload written to the child's stdin (then closed), if any.
    pub stdin: Option<Vec<u8>>,
}

impl Invocation {
    /// Build an invocation from an argument sequence.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            stdin: None,
        }
    }

    /// Attach a stdin payload. At most one payload per invocation; callers
    /// that merge several fragments concatenate them before this point.
    #[must_use]
    pub fn with_stdin(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// The executable, or the empty string for an empty argv.
    pub fn program(&self) -> &str {
        self.argv.first().map_or("", String::as_str)
    }
}
