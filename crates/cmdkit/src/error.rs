// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for process execution.

use std::time::Duration;
use thiserror::Error;

/// A child process exited with a non-zero status.
///
/// The `Display` impl is the captured stderr text verbatim, so printing the
/// error surfaces the child program's own diagnostics rather than a generic
/// wrapper message.
#[derive(Clone, Debug, Error)]
#[error("{stderr}")]
pub struct ProcessError {
    /// The non-zero exit code (or signal-derived code) of the child.
    pub code: i32,
    /// The argument sequence used to launch the child.
    pub command: Vec<String>,
    /// Stdout captured at failure time, decoded and newline-normalized.
    pub stdout: String,
    /// Stderr captured at failure time, decoded and newline-normalized.
    pub stderr: String,
}

/// Errors from spawning, driving, and collecting a child process.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The executable could not be started at all (not found, permission
    /// denied). Distinct from [`ExecError::Failed`]: no exit code exists.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// The executable that failed to start.
        program: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The child ran and exited with a non-zero status.
    #[error(transparent)]
    Failed(#[from] ProcessError),

    /// The configured deadline elapsed before the child completed. The child
    /// has been force-killed by the time this is returned.
    #[error("process timed out after {0:?}")]
    Timeout(Duration),

    /// Failed to write to the child's stdin.
    #[error("failed to write process stdin: {0}")]
    Stdin(#[source] std::io::Error),

    /// Failed to read from the child's stdout.
    #[error("failed to read process stdout: {0}")]
    Stdout(#[source] std::io::Error),

    /// Failed to read from the child's stderr.
    #[error("failed to read process stderr: {0}")]
    Stderr(#[source] std::io::Error),

    /// Failed to wait on the child process.
    #[error("failed to wait on process: {0}")]
    Wait(#[source] std::io::Error),

    /// An injected output parser rejected the child's output.
    #[error("failed to parse process output: {0}")]
    Parse(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_error_displays_stderr_verbatim() {
        let err = ProcessError {
            code: 1,
            command: vec!["prog".into()],
            stdout: String::new(),
            stderr: "RuntimeError: Oops".into(),
        };
        assert_eq!(err.to_string(), "RuntimeError: Oops");
    }

    #[test]
    fn failed_variant_is_transparent() {
        let err = ExecError::from(ProcessError {
            code: 2,
            command: vec![],
            stdout: String::new(),
            stderr: "boom".into(),
        });
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn timeout_mentions_the_deadline() {
        let err = ExecError::Timeout(Duration::from_millis(100));
        assert!(err.to_string().contains("100ms"));
    }
}
