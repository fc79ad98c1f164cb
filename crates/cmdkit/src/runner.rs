// SPDX-License-Identifier: MIT OR Apache-2.0
//! The three async invocation shapes: run to completion, stream lines,
//! start and hand back the handle.

use futures::Stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStdout;
use tracing::debug;

use crate::config::ExecConfig;
use crate::error::ExecError;
use crate::invocation::Invocation;
use crate::process::Process;

/// Run the command to completion and return its raw stdout bytes.
///
/// Any stdin payload is written (and the pipe closed) concurrently with the
/// drain of both output streams, all inside the deadline race, so the child
/// can never block on a full pipe in either direction. A non-zero exit
/// becomes [`ExecError::Failed`]; exceeding the configured timeout kills the
/// child and becomes [`ExecError::Timeout`].
pub async fn run(inv: Invocation, config: &ExecConfig) -> Result<Vec<u8>, ExecError> {
    let mut proc = Process::spawn(inv, config).await?;
    proc.finish(config.timeout).await?;
    proc.error_for_status().await?;
    Ok(proc.stdout_bytes().await?.to_vec())
}

/// Spawn the command and return a lazy sequence of its stdout lines.
///
/// See [`Lines`] for the consumption and error-reporting contract.
pub async fn lines(inv: Invocation, config: &ExecConfig) -> Result<Lines, ExecError> {
    let mut proc = start(inv, config).await?;
    let reader = proc.take_stdout().map(BufReader::new);
    Ok(Lines {
        reader,
        proc,
        done: false,
    })
}

/// Spawn the command, write its stdin payload if any, and return the live
/// handle immediately.
///
/// No implicit error checking happens in this shape; call
/// [`Process::error_for_status`] to convert a non-zero exit into an error.
pub async fn start(inv: Invocation, config: &ExecConfig) -> Result<Process, ExecError> {
    let mut proc = Process::spawn(inv, config).await?;
    proc.write_payload().await?;
    Ok(proc)
}

/// Lazy, forward-only sequence of raw stdout lines from a running child.
///
/// Each line includes its terminator and is yielded as soon as the child
/// produces it, so partial output is observable while the child still runs.
/// When the stream is exhausted the exit status is collected and a non-zero
/// exit surfaces as [`ExecError::Failed`] — after all available lines, not
/// before.
///
/// Dropping a `Lines` before exhaustion kills the child and skips the status
/// check; a consumer that stops early but wants the status should call
/// [`finish`](Lines::finish).
pub struct Lines {
    reader: Option<BufReader<ChildStdout>>,
    proc: Process,
    done: bool,
}

impl Lines {
    /// The next raw line, or `None` once the stream is exhausted.
    ///
    /// The exhausting call closes the stream, reaps the child, and reports a
    /// non-zero exit as an error.
    pub async fn next_line(&mut self) -> Result<Option<Vec<u8>>, ExecError> {
        if self.done {
            return Ok(None);
        }
        if let Some(reader) = self.reader.as_mut() {
            let mut buf = Vec::new();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => {}
                Ok(_) => return Ok(Some(buf)),
                Err(e) => {
                    self.done = true;
                    return Err(ExecError::Stdout(e));
                }
            }
        }
        self.done = true;
        self.reader = None;
        self.proc.wait().await?;
        self.proc.error_for_status().await?;
        Ok(None)
    }

    /// Stop consuming lines, wait for the child to exit, and report its
    /// exit status. The child sees a closed stdout pipe from this point on.
    pub async fn finish(mut self) -> Result<(), ExecError> {
        self.done = true;
        self.reader = None;
        debug!(target: "cmdkit.runner", command = ?self.proc.command(), "line stream closed early");
        self.proc.wait().await?;
        self.proc.error_for_status().await
    }

    /// Adapt into a [`Stream`] of line results.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<u8>, ExecError>> {
        futures::stream::unfold(self, |mut lines| async move {
            match lines.next_line().await {
                Ok(Some(line)) => Some((Ok(line), lines)),
                Ok(None) => None,
                Err(e) => Some((Err(e), lines)),
            }
        })
    }
}
