// SPDX-License-Identifier: MIT OR Apache-2.0
//! Async process handle with single-consumption output caching.

use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::coerce::{self, Utf8Handling};
use crate::config::ExecConfig;
use crate::error::{ExecError, ProcessError};
use crate::invocation::Invocation;

/// Parser applied by [`Process::read`] to the decoded stdout text.
pub type OutputParser<T> = Arc<dyn Fn(String) -> Result<T, ExecError> + Send + Sync>;

/// Lazy single-read cache over a non-rewindable pipe.
///
/// OS pipes return empty on a second full read, so the first read populates
/// the cache and later logical reads are served from it. Access goes through
/// `&mut self` on the owning handle, which is what makes the first read the
/// only read; no lock is needed under that single-owner discipline.
pub(crate) enum StreamCache<S> {
    /// The stream has not been fully read yet.
    Open(S),
    /// The stream was drained; all reads are served from this buffer.
    Cached(Vec<u8>),
}

impl<S> StreamCache<S> {
    /// Take the unread stream out, leaving an empty cache in its place.
    /// Returns `None` if the stream was already drained.
    pub(crate) fn take_open(&mut self) -> Option<S> {
        match std::mem::replace(self, Self::Cached(Vec::new())) {
            Self::Open(stream) => Some(stream),
            cached => {
                *self = cached;
                None
            }
        }
    }

    pub(crate) fn store(&mut self, buf: Vec<u8>) {
        *self = Self::Cached(buf);
    }

    pub(crate) fn cached(&self) -> &[u8] {
        match self {
            Self::Open(_) => &[],
            Self::Cached(buf) => buf,
        }
    }
}

/// Map an exit status to a single integer code.
///
/// A signal-terminated child yields the negated signal number so that the
/// code is always present and non-zero for abnormal exits.
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status
            .code()
            .or_else(|| status.signal().map(|sig| -sig))
            .unwrap_or(-1)
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(-1)
    }
}

/// A live or finished child process.
///
/// Owns the child and its three piped standard streams. Stdout and stderr are
/// read in full at most once each and cached thereafter. Dropping a handle
/// whose child is still running kills the child; a process is never leaked
/// past the lifetime of its handle.
pub struct Process<T = String> {
    pub(crate) child: Child,
    command: Vec<String>,
    stdin: Option<ChildStdin>,
    payload: Option<Vec<u8>>,
    pub(crate) stdout: StreamCache<ChildStdout>,
    pub(crate) stderr: StreamCache<ChildStderr>,
    utf8: Utf8Handling,
    status: Option<ExitStatus>,
    parser: OutputParser<T>,
}

impl Process {
    /// Spawn a child from the invocation with all stdio piped. Any stdin
    /// payload is stashed, not written; the invocation shape decides when the
    /// write happens (see [`write_payload`](Self::write_payload) and
    /// [`finish`](Self::finish)).
    pub(crate) async fn spawn(inv: Invocation, config: &ExecConfig) -> Result<Self, ExecError> {
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
            .envs(config.resolved_env())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| ExecError::Spawn {
            program: program.clone(),
            source: e,
        })?;
        debug!(target: "cmdkit.process", program = %program, pid = ?child.id(), "spawned process");

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
            child,
            command: argv,
            stdin,
            payload,
            stdout,
            stderr,
            utf8: config.utf8,
            status: None,
            parser: Arc::new(Ok),
        })
    }
}

impl<T> Process<T> {
    /// Bind an output parser, rebinding the handle's output type.
    ///
    /// Applied by [`read`](Self::read) to the decoded stdout text.
    pub fn with_parser<U>(
        self,
        parser: impl Fn(String) -> Result<U, ExecError> + Send + Sync + 'static,
    ) -> Process<U> {
        Process {
            child: self.child,
            command: self.command,
            stdin: self.stdin,
            payload: self.payload,
            stdout: self.stdout,
            stderr: self.stderr,
            utf8: self.utf8,
            status: self.status,
            parser: Arc::new(parser),
        }
    }

    /// The argument sequence used to launch the child.
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// OS process id, if the child has not yet been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Write the full payload to the child's stdin, then close it.
    ///
    /// Closing signals end-of-input to children that read stdin to EOF. A
    /// broken pipe is swallowed: a child that already exited or never reads
    /// stdin must not fail the caller.
    pub async fn write(&mut self, payload: impl AsRef<[u8]>) -> Result<(), ExecError> {
        let Some(stdin) = self.stdin.take() else {
            return Ok(());
        };
        write_and_close(stdin, payload.as_ref().to_vec())
            .await
            .map_err(ExecError::Stdin)
    }

    /// Flush the stashed invocation payload now.
    ///
    /// Used by the shapes that hand control back to the caller; the
    /// run-to-completion shape instead defers the write to
    /// [`finish`](Self::finish) so it cannot block outside the deadline race.
    pub(crate) async fn write_payload(&mut self) -> Result<(), ExecError> {
        match self.payload.take() {
            Some(payload) => self.write(payload).await,
            None => Ok(()),
        }
    }

    /// Suspend until the child exits. Does not error on non-zero status.
    ///
    /// Returns the exit code, with signal terminations mapped to negative
    /// values. Stdin is closed first so a child blocked reading it can exit.
    pub async fn wait(&mut self) -> Result<i32, ExecError> {
        drop(self.stdin.take());
        if let Some(status) = self.status {
            return Ok(exit_code(status));
        }
        let status = self.child.wait().await.map_err(ExecError::Wait)?;
        self.status = Some(status);
        Ok(exit_code(status))
    }

    /// Re-check the OS process state and return the exit code if the child
    /// has finished. Best-effort: a wait error reads as "still running".
    pub fn poll_status(&mut self) -> Option<i32> {
        if let Some(status) = self.status {
            return Some(exit_code(status));
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.status = Some(status);
                Some(exit_code(status))
            }
            _ => None,
        }
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
    pub async fn stdout_bytes(&mut self) -> Result<&[u8], ExecError> {
        if let Some(mut stream) = self.stdout.take_open() {
            let mut buf = Vec::new();
            stream
                .read_to_end(&mut buf)
                .await
                .map_err(ExecError::Stdout)?;
            self.stdout.store(buf);
        }
        Ok(self.stdout.cached())
    }

    /// Full stderr of the child, cached on first read like
    /// [`stdout_bytes`](Self::stdout_bytes). The two caches are independent.
    pub async fn stderr_bytes(&mut self) -> Result<&[u8], ExecError> {
        if let Some(mut stream) = self.stderr.take_open() {
            let mut buf = Vec::new();
            stream
                .read_to_end(&mut buf)
                .await
                .map_err(ExecError::Stderr)?;
            self.stderr.store(buf);
        }
        Ok(self.stderr.cached())
    }

    /// Decode, normalize, and parse the child's stdout.
    ///
    /// Returns `Ok(None)` only when the child produced zero stdout bytes;
    /// non-empty output always goes through the bound parser, so output that
    /// merely parses to something empty or falsy is still `Some`.
    pub async fn read(&mut self) -> Result<Option<T>, ExecError> {
        let parser = Arc::clone(&self.parser);
        let utf8 = self.utf8;
        let bytes = self.stdout_bytes().await?;
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
    pub async fn error_for_status(&mut self) -> Result<(), ExecError> {
        let Some(code) = self.poll_status() else {
            return Ok(());
        };
        if code == 0 {
            return Ok(());
        }
        let utf8 = self.utf8;
        let stdout = coerce::to_text(self.stdout_bytes().await?, utf8);
        let stderr = coerce::to_text(self.stderr_bytes().await?, utf8);
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
        let Some(pid) = self.child.id() else {
            return;
        };
        if let Err(e) = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), signal) {
            debug!(target: "cmdkit.process", pid, ?signal, "signal not delivered: {e}");
        }
    }

    /// Ask the child to terminate (SIGTERM on unix, forced kill elsewhere).
    pub fn terminate(&mut self) {
        #[cfg(unix)]
        self.send_signal(nix::sys::signal::Signal::SIGTERM);
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }
    }

    /// Force-kill the child and reap it.
    pub async fn kill(&mut self) {
        let _ = self.child.kill().await;
        if let Ok(Some(status)) = self.child.try_wait() {
            self.status = Some(status);
        }
    }

    /// Drive the child to completion under an optional deadline, writing any
    /// stashed stdin payload and draining both output streams concurrently.
    ///
    /// All three pipes must be serviced while waiting: a child that fills a
    /// pipe buffer (or one whose stdin fills ours) blocks until someone is on
    /// the other end, so the payload write runs as its own task inside the
    /// race. On deadline expiry the child is killed before the timeout is
    /// surfaced, and whatever output it produced up to the kill is still
    /// captured.
    pub(crate) async fn finish(&mut self, timeout: Option<Duration>) -> Result<(), ExecError> {
        let out_task = self.stdout.take_open().map(drain_task);
        let err_task = self.stderr.take_open().map(drain_task);
        let in_task = match (self.stdin.take(), self.payload.take()) {
            (Some(stdin), Some(payload)) => {
                Some(tokio::spawn(write_and_close(stdin, payload)))
            }
            (stdin, _) => {
                drop(stdin);
                None
            }
        };

        let waited = match timeout {
            None => self.child.wait().await.map_err(ExecError::Wait),
            Some(deadline) => match tokio::time::timeout(deadline, self.child.wait()).await {
                Ok(result) => result.map_err(ExecError::Wait),
                Err(_) => {
                    debug!(
                        target: "cmdkit.runner",
                        command = ?self.command,
                        "deadline of {deadline:?} elapsed; killing process"
                    );
                    self.kill().await;
                    if let Some(task) = out_task {
                        if let Ok(Ok(buf)) = task.await {
                            self.stdout.store(buf);
                        }
                    }
                    if let Some(task) = err_task {
                        if let Ok(Ok(buf)) = task.await {
                            self.stderr.store(buf);
                        }
                    }
                    if let Some(task) = in_task {
                        // Unblocks with a broken pipe once the child is gone.
                        let _ = task.await;
                    }
                    return Err(ExecError::Timeout(deadline));
                }
            },
        };

        if let Some(task) = out_task {
            self.stdout.store(join_drain(task, ExecError::Stdout).await?);
        }
        if let Some(task) = err_task {
            self.stderr.store(join_drain(task, ExecError::Stderr).await?);
        }
        if let Some(task) = in_task {
            match task.await {
                Ok(result) => result.map_err(ExecError::Stdin)?,
                Err(join_err) => return Err(ExecError::Stdin(std::io::Error::other(join_err))),
            }
        }
        self.status = Some(waited?);
        Ok(())
    }

    /// Take the unread stdout stream for line-by-line consumption.
    pub(crate) fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take_open()
    }
}

/// Full payload write then close, swallowing a broken pipe on both steps: a
/// child that already exited or never reads stdin must not fail the caller.
async fn write_and_close(mut stdin: ChildStdin, payload: Vec<u8>) -> Result<(), std::io::Error> {
    match stdin.write_all(&payload).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            warn!(target: "cmdkit.process", "stdin pipe closed by child; payload dropped");
            return Ok(());
        }
        Err(e) => return Err(e),
    }
    match stdin.shutdown().await {
        Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
        _ => Ok(()),
    }
}

type DrainTask = tokio::task::JoinHandle<Result<Vec<u8>, std::io::Error>>;

fn drain_task<S>(mut stream: S) -> DrainTask
where
    S: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        Ok(buf)
    })
}

async fn join_drain(
    task: DrainTask,
    wrap: fn(std::io::Error) -> ExecError,
) -> Result<Vec<u8>, ExecError> {
    match task.await {
        Ok(result) => result.map_err(wrap),
        Err(join_err) => Err(wrap(std::io::Error::other(join_err))),
    }
}

impl<T> std::fmt::Debug for Process<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("command", &self.command)
            .field("pid", &self.child.id())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
