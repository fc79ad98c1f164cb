// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blocking mirror of the runner and process handle.
//!
//! Same observable semantics as the async surface at the crate root, built
//! on `std::process`. The only internal threading is a set of short-lived
//! scoped pipe threads inside [`run`], needed to feed stdin and drain both
//! output pipes while waiting under a deadline.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::coerce::{self, Utf8Handling};
use crate::config::ExecConfig;
use crate::error::{ExecError, ProcessError};
use crate::invocation::Invocation;
use crate::process::{OutputParser, StreamCache, exit_code};

/// Interval at which the timeout race re-polls the child's state.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Run the command to completion and return its raw stdout bytes.
///
/// Blocking counterpart of [`crate::run`], with the same error and timeout
/// contract: the stdin payload is written concurrently with the output
/// drain, inside the deadline race.
pub fn run(inv: Invocation, config: &ExecConfig) -> Result<Vec<u8>, ExecError> {
    let mut proc = Process::spawn(inv, config)?;
    proc.finish(config.timeout)?;
    proc.error_for_status()?;
    Ok(proc.stdout_bytes()?.to_vec())
}

/// Spawn the command and return a lazy iterator over its stdout lines.
pub fn lines(inv: Invocation, config: &ExecConfig) -> Result<Lines, ExecError> {
    let mut proc = start(inv, config)?;
    let reader = proc.stdout.take_open().map(BufReader::new);
    Ok(Lines {
        reader,
        proc,
        done: false,
    })
}

/// Spawn the command, write its stdin payload if any, and return the live
/// handle immediately. No implicit error checking.
pub fn start(inv: Invocation, config: &ExecConfig) -> Result<Process, ExecError> {
    let mut proc = Process::spawn(inv, config)?;
    proc.write_payload()?;
    Ok(proc)
}

/// Owns the child and reaps it on drop so a process is never leaked past
/// the lifetime of its handle (parity with the async side's kill-on-drop).
struct ChildGuard {
    child: Child,
    status: Option<ExitStatus>,
}

impl ChildGuard {
    fn id(&self) -> u32 {
        self.child.id()
    }

    /// Wait for exit, caching the status.
    fn wait(&mut self) -> std::io::Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait()?;
        self.status = Some(status);
        Ok(status)
    }

    /// Non-blocking state re-check, caching the status once present.
    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        if self.status.is_none() {
            self.status = self.child.try_wait()?;
        }
        Ok(self.status)
    }

    /// Force-kill and reap. No-op once the child has been reaped.
    fn kill(&mut self) {
        if self.status.is_some() {
            return;
        }
        let _ = self.child.kill();
        if let Ok(status) = self.child.wait() {
            self.status = Some(status);
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.status.is_none() && matches!(self.child.try_wait(), Ok(None)) {
            self.kill();
        }
    }
}

/// A live or finished child process (blocking variant).
///
/// Same caching and lifecycle contract as the async [`crate::Process`]:
/// stdout and stderr are read in full at most once each, and dropping a
/// handle whose child is still running kills the child.
pub struct Process<T = String> {
    guard: ChildGuard,
    command: Vec<String>,
    stdin: Option<ChildStdin>,
    payload: Option<Vec<u8>>,
    stdout: StreamCache<ChildStdout>,
    stderr: StreamCache<ChildStderr>,
    utf8: Utf8Handling,
    parser: OutputParser<T>,
}

impl Process {
    fn spawn(inv: Invocation, config: &ExecConfig) -> Result<Self, ExecError> {
        let Invocation { argv, stdin: payload } = inv;
        let Some((program, args)) = argv.split_first() else {
            return Err(ExecError::Spawn {
                program: String::new(),
                source: std::io::Error::new(ErrorKind::InvalidInput, "empty argument list"),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .envs(config.resolved_env());
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| ExecError::Spawn {
            program: program.clone(),
            source: e,
        })?;
        debug!(target: "cmdkit.process", program = %program, pid = child.id(), "spawned process");

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .map_or(StreamCache::Cached(Vec::new()), StreamCache::Open);
        let stderr = child
            .stderr
            .take()
            .map_or(StreamCache::Cached(Vec::new()), StreamCache::Open);

        Ok(Self {
            guard: ChildGuard {
                child,
                status: None,
            },
            command: argv,
            stdin,
            payload,
            stdout,
            stderr,
            utf8: config.utf8,
            parser: Arc::new(Ok),
        })
    }
}

impl<T> Process<T> {
    /// Bind an output parser, rebinding the handle's output type.
    pub fn with_parser<U>(
        self,
        parser: impl Fn(String) -> Result<U, ExecError> + Send + Sync + 'static,
    ) -> Process<U> {
        Process {
            guard: self.guard,
            command: self.command,
            stdin: self.stdin,
            payload: self.payload,
            stdout: self.stdout,
            stderr: self.stderr,
            utf8: self.utf8,
            parser: Arc::new(parser),
        }
    }

    /// The argument sequence used to launch the child.
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// OS process id.
    pub fn id(&self) -> u32 {
        self.guard.id()
    }

    /// Write the full payload to the child's stdin, then close it.
    ///
    /// Closing signals end-of-input to children that read stdin to EOF. A
    /// broken pipe is swallowed, exactly as in the async variant.
    pub fn write(&mut self, payload: impl AsRef<[u8]>) -> Result<(), ExecError> {
        let Some(stdin) = self.stdin.take() else {
            return Ok(());
        };
        write_and_close(stdin, payload.as_ref()).map_err(ExecError::Stdin)
    }

    /// Flush the stashed invocation payload now.
    ///
    /// Used by the shapes that hand control back to the caller; [`run`]
    /// defers the write to `finish` so it participates in the deadline race.
    fn write_payload(&mut self) -> Result<(), ExecError> {
        match self.payload.take() {
            Some(payload) => self.write(payload),
            None => Ok(()),
        }
    }

    /// Block until the child exits. Does not error on non-zero status.
    ///
    /// Returns the exit code, with signal terminations mapped to negative
    /// values. Stdin is closed first so a child blocked reading it can exit.
    pub fn wait(&mut self) -> Result<i32, ExecError> {
        drop(self.stdin.take());
        let status = self.guard.wait().map_err(ExecError::Wait)?;
        Ok(exit_code(status))
    }

    /// Re-check the OS process state and return the exit code if the child
    /// has finished. Best-effort: a wait error reads as "still running".
    pub fn poll_status(&mut self) -> Option<i32> {
        self.guard.try_wait().ok().flatten().map(exit_code)
    }

    /// Whether the child has exited.
    pub fn finished(&mut self) -> bool {
        self.poll_status().is_some()
    }

    /// Whether the child is still running.
    pub fn running(&mut self) -> bool {
        !self.finished()
    }

    /// Full stdout of the child. The first call reads the pipe to EOF and
    /// caches; later calls return the cache unchanged.
    pub fn stdout_bytes(&mut self) -> Result<&[u8], ExecError> {
        if let Some(mut stream) = self.stdout.take_open() {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).map_err(ExecError::Stdout)?;
            self.stdout.store(buf);
        }
        Ok(self.stdout.cached())
    }

    /// Full stderr of the child, cached on first read like
    /// [`stdout_bytes`](Self::stdout_bytes). The two caches are independent.
    pub fn stderr_bytes(&mut self) -> Result<&[u8], ExecError> {
        if let Some(mut stream) = self.stderr.take_open() {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).map_err(ExecError::Stderr)?;
            self.stderr.store(buf);
        }
        Ok(self.stderr.cached())
    }

    /// Decode, normalize, and parse the child's stdout.
    ///
    /// Returns `Ok(None)` only when the child produced zero stdout bytes;
    /// non-empty output always goes through the bound parser.
    pub fn read(&mut self) -> Result<Option<T>, ExecError> {
        let parser = Arc::clone(&self.parser);
        let utf8 = self.utf8;
        let bytes = self.stdout_bytes()?;
        if bytes.is_empty() {
            return Ok(None);
        }
        let text = coerce::to_text(bytes, utf8);
        parser(text).map(Some)
    }

    /// Error with [`ProcessError`] if the child has exited non-zero.
    ///
    /// No-op while the child is still running or after a zero exit.
    /// Idempotent: repeated calls re-use the cached stream reads.
    pub fn error_for_status(&mut self) -> Result<(), ExecError> {
        let Some(code) = self.poll_status() else {
            return Ok(());
        };
        if code == 0 {
            return Ok(());
        }
        let utf8 = self.utf8;
        let stdout = coerce::to_text(self.stdout_bytes()?, utf8);
        let stderr = coerce::to_text(self.stderr_bytes()?, utf8);
        Err(ProcessError {
            code,
            command: self.command.clone(),
            stdout,
            stderr,
        }
        .into())
    }

    /// Send an arbitrary signal to the child. Best-effort: signalling an
    /// already-exited process is not an error.
    #[cfg(unix)]
    pub fn send_signal(&mut self, signal: nix::sys::signal::Signal) {
        if self.guard.status.is_some() {
            return;
        }
        let pid = nix::unistd::Pid::from_raw(self.guard.id() as i32);
        if let Err(e) = nix::sys::signal::kill(pid, signal) {
            debug!(target: "cmdkit.process", pid = self.guard.id(), ?signal, "signal not delivered: {e}");
        }
    }

    /// Ask the child to terminate (SIGTERM on unix, forced kill elsewhere).
    pub fn terminate(&mut self) {
        #[cfg(unix)]
        self.send_signal(nix::sys::signal::Signal::SIGTERM);
        #[cfg(not(unix))]
        self.guard.kill();
    }

    /// Force-kill the child and reap it.
    pub fn kill(&mut self) {
        self.guard.kill();
    }

    /// Drive the child to completion under an optional deadline, writing any
    /// stashed stdin payload and draining both output streams on scoped
    /// threads.
    ///
    /// All three pipes must be serviced while waiting: a child that fills a
    /// pipe buffer (or one whose stdin fills ours) blocks until someone is
    /// on the other end, so the payload write runs on its own thread inside
    /// the race. On deadline expiry the child is killed before the timeout
    /// is surfaced, and whatever output it produced up to the kill is still
    /// captured.
    fn finish(&mut self, timeout: Option<Duration>) -> Result<(), ExecError> {
        let out_stream = self.stdout.take_open();
        let err_stream = self.stderr.take_open();
        let in_pair = match (self.stdin.take(), self.payload.take()) {
            (Some(stdin), Some(payload)) => Some((stdin, payload)),
            (stdin, _) => {
                drop(stdin);
                None
            }
        };

        let (out_buf, err_buf, in_res, waited) = std::thread::scope(|scope| {
            let out_handle = out_stream.map(|mut s| {
                scope.spawn(move || {
                    let mut buf = Vec::new();
                    let res = s.read_to_end(&mut buf).map(|_| ());
                    (buf, res)
                })
            });
            let err_handle = err_stream.map(|mut s| {
                scope.spawn(move || {
                    let mut buf = Vec::new();
                    let res = s.read_to_end(&mut buf).map(|_| ());
                    (buf, res)
                })
            });
            let in_handle = in_pair
                .map(|(stdin, payload)| scope.spawn(move || write_and_close(stdin, &payload)));

            // Race process exit against the deadline; the readers unblock on
            // pipe EOF and the writer on a broken pipe once the child is
            // gone either way.
            let waited = match timeout {
                None => self.guard.wait().map(Some),
                Some(deadline) => self.wait_deadline(deadline),
            };
            if matches!(waited, Ok(None)) {
                debug!(
                    target: "cmdkit.runner",
                    command = ?self.command,
                    "deadline of {timeout:?} elapsed; killing process"
                );
                self.guard.kill();
            }

            let out_buf = out_handle.map(|h| h.join().unwrap_or((Vec::new(), Ok(()))));
            let err_buf = err_handle.map(|h| h.join().unwrap_or((Vec::new(), Ok(()))));
            let in_res = in_handle.map(|h| h.join().unwrap_or(Ok(())));
            (out_buf, err_buf, in_res, waited)
        });

        let mut stream_err = None;
        if let Some((buf, res)) = out_buf {
            self.stdout.store(buf);
            if let Err(e) = res {
                stream_err.get_or_insert(ExecError::Stdout(e));
            }
        }
        if let Some((buf, res)) = err_buf {
            self.stderr.store(buf);
            if let Err(e) = res {
                stream_err.get_or_insert(ExecError::Stderr(e));
            }
        }
        if let Some(Err(e)) = in_res {
            stream_err.get_or_insert(ExecError::Stdin(e));
        }

        match waited {
            Ok(Some(status)) => {
                self.guard.status = Some(status);
                match stream_err {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }
            Ok(None) => Err(ExecError::Timeout(timeout.unwrap_or_default())),
            Err(e) => Err(ExecError::Wait(e)),
        }
    }

    /// Poll `try_wait` until the child exits or the deadline passes.
    /// `Ok(None)` means the deadline was reached with the child still alive.
    fn wait_deadline(&mut self, deadline: Duration) -> std::io::Result<Option<ExitStatus>> {
        let end = Instant::now() + deadline;
        loop {
            if let Some(status) = self.guard.try_wait()? {
                return Ok(Some(status));
            }
            let remaining = end.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            std::thread::sleep(remaining.min(WAIT_POLL_INTERVAL));
        }
    }
}

/// Full payload write then close (stdin drops on return), swallowing a
/// broken pipe: a child that already exited or never reads stdin must not
/// fail the caller.
fn write_and_close(mut stdin: ChildStdin, payload: &[u8]) -> Result<(), std::io::Error> {
    match stdin.write_all(payload) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            warn!(target: "cmdkit.process", "stdin pipe closed by child; payload dropped");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

impl<T> std::fmt::Debug for Process<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("command", &self.command)
            .field("pid", &self.guard.id())
            .field("status", &self.guard.status)
            .finish_non_exhaustive()
    }
}

/// Lazy iterator over a running child's stdout lines.
///
/// Yields raw lines (terminator included) as the child produces them; the
/// exhausting step reaps the child and reports a non-zero exit as a final
/// `Err` item — after all available lines, not before. Dropping it early
/// kills the child, like the async [`crate::Lines`].
pub struct Lines {
    reader: Option<BufReader<ChildStdout>>,
    proc: Process,
    done: bool,
}

impl Lines {
    /// Stop consuming lines, wait for the child to exit, and report its
    /// exit status. The child sees a closed stdout pipe from this point on.
    pub fn finish(mut self) -> Result<(), ExecError> {
        self.done = true;
        self.exhaust()
    }

    fn exhaust(&mut self) -> Result<(), ExecError> {
        self.reader = None;
        self.proc.wait()?;
        self.proc.error_for_status()
    }
}

impl Iterator for Lines {
    type Item = Result<Vec<u8>, ExecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(reader) = self.reader.as_mut() {
            let mut buf = Vec::new();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => {}
                Ok(_) => return Some(Ok(buf)),
                Err(e) => {
                    self.done = true;
                    return Some(Err(ExecError::Stdout(e)));
                }
            }
        }
        self.done = true;
        match self.exhaust() {
            Ok(()) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
