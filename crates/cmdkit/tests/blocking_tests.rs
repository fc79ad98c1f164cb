// SPDX-License-Identifier: MIT OR Apache-2.0
//! The blocking surface mirrors the async one; these cover the same
//! contracts without a runtime.

mod common;

use std::time::Duration;

use cmdkit::blocking;
use cmdkit::{ExecConfig, ExecError};
use common::{py_code, require_python};

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[test]
fn run_captures_stdout_bytes() {
    let py = require_python!();
    let out = blocking::run(py_code(&py, "print('Hello, world!')"), &ExecConfig::default())
        .expect("run should succeed");
    assert_eq!(out, b"Hello, world!\n");
}

#[test]
fn stdin_payload_reaches_the_child() {
    let py = require_python!();
    let inv = py_code(&py, "import sys; print(sys.stdin.read().upper())").with_stdin("quiet");
    let out = blocking::run(inv, &ExecConfig::default()).expect("run should succeed");
    assert_eq!(out, b"QUIET\n");
}

#[test]
fn nonzero_exit_becomes_process_error() {
    let py = require_python!();
    let code = "import sys; print('partial'); print('Oops', file=sys.stderr); sys.exit(1)";
    let err = blocking::run(py_code(&py, code), &ExecConfig::default())
        .expect_err("exit 1 should be an error");
    let ExecError::Failed(perr) = err else {
        panic!("expected Failed, got: {err}");
    };
    assert_eq!(perr.code, 1);
    assert_eq!(perr.stdout, "partial");
    assert_eq!(perr.stderr, "Oops");
    // Display is the child's stderr, nothing more.
    assert_eq!(perr.to_string(), "Oops");
}

#[test]
fn missing_executable_is_a_spawn_error() {
    let err = blocking::run(
        cmdkit::Invocation::new(["definitely-not-a-real-binary-1b8f"]),
        &ExecConfig::default(),
    )
    .expect_err("missing binary");
    assert!(matches!(err, ExecError::Spawn { .. }), "got: {err}");
}

#[test]
fn deadline_kills_the_child_and_reports_timeout() {
    let py = require_python!();
    let marker = "cmdkit_deadline_blocking";
    let code = format!("import time; marker = '{marker}'; time.sleep(30)");
    let config = ExecConfig::default().with_timeout(Duration::from_millis(200));
    let start = std::time::Instant::now();
    let err = blocking::run(py_code(&py, &code), &config).expect_err("deadline must fire");
    assert!(matches!(err, ExecError::Timeout(_)), "got: {err}");
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "timeout did not cut the wait short"
    );
    assert!(
        !common::marker_process_alive(marker),
        "child survived the timeout"
    );
}

#[test]
fn large_stdin_payload_does_not_deadlock_run() {
    let py = require_python!();
    // The child fills its stdout pipe before touching stdin, so the payload
    // write and the output drain must be serviced concurrently.
    let code = "\
import sys
sys.stdout.write('y' * 200000)
sys.stdout.flush()
data = sys.stdin.read()
sys.stdout.write(str(len(data)))
";
    let inv = py_code(&py, code).with_stdin("x".repeat(200_000));
    let config = ExecConfig::default().with_timeout(Duration::from_secs(30));
    let out = blocking::run(inv, &config).expect("run should complete");
    assert_eq!(out.len(), 200_006);
    assert!(out.ends_with(b"200000"), "child did not see the full payload");
}

#[test]
fn deadline_fires_with_unconsumed_stdin_and_full_stdout() {
    let py = require_python!();
    let code = "\
import sys, time
sys.stdout.write('y' * 200000)
sys.stdout.flush()
time.sleep(30)
";
    let inv = py_code(&py, code).with_stdin("x".repeat(200_000));
    let config = ExecConfig::default().with_timeout(Duration::from_millis(500));
    let start = std::time::Instant::now();
    let err = blocking::run(inv, &config).expect_err("deadline must fire");
    assert!(matches!(err, ExecError::Timeout(_)), "got: {err}");
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "timeout blocked behind a full pipe"
    );
}

// ---------------------------------------------------------------------------
// lines
// ---------------------------------------------------------------------------

#[test]
fn lines_iterator_yields_terminated_lines() {
    let py = require_python!();
    let lines = blocking::lines(
        py_code(&py, "print('Hello'); print('world')"),
        &ExecConfig::default(),
    )
    .expect("spawn should succeed");
    let collected: Result<Vec<_>, _> = lines.collect();
    assert_eq!(
        collected.expect("all lines ok"),
        vec![b"Hello\n".to_vec(), b"world\n".to_vec()]
    );
}

#[test]
fn lines_defer_the_exit_error_to_the_end() {
    let py = require_python!();
    let mut lines = blocking::lines(
        py_code(&py, "print('one'); raise SystemExit(3)"),
        &ExecConfig::default(),
    )
    .expect("spawn should succeed");

    assert_eq!(
        lines.next().map(|r| r.expect("first line")),
        Some(b"one\n".to_vec())
    );
    let err = lines
        .next()
        .expect("error item")
        .expect_err("exit 3 surfaces at the end");
    assert!(matches!(err, ExecError::Failed(ref p) if p.code == 3), "got: {err}");
    assert!(lines.next().is_none());
}

#[test]
fn lines_finish_reports_the_exit_status() {
    let py = require_python!();
    let lines = blocking::lines(
        py_code(&py, "print('ignored'); raise SystemExit(2)"),
        &ExecConfig::default(),
    )
    .expect("spawn should succeed");
    let err = lines.finish().expect_err("finish should see exit 2");
    assert!(matches!(err, ExecError::Failed(ref p) if p.code == 2), "got: {err}");
}

// ---------------------------------------------------------------------------
// start
// ---------------------------------------------------------------------------

#[test]
fn handle_write_then_read_round_trips() {
    let py = require_python!();
    let code = "import sys\nline = sys.stdin.readline().strip()\nprint(f'{line} world')";
    let mut proc =
        blocking::start(py_code(&py, code), &ExecConfig::default()).expect("spawn should succeed");
    proc.write("Hello\n").expect("write stdin");
    assert_eq!(proc.wait().expect("wait"), 0);
    assert_eq!(proc.read().expect("read").as_deref(), Some("Hello world"));
}

#[test]
fn handle_read_is_none_for_empty_output() {
    let py = require_python!();
    let mut proc =
        blocking::start(py_code(&py, "pass"), &ExecConfig::default()).expect("spawn should succeed");
    proc.wait().expect("wait");
    assert_eq!(proc.read().expect("read"), None);
}

#[test]
fn handle_parser_shapes_read() {
    let py = require_python!();
    let mut proc = blocking::start(py_code(&py, "print('41')"), &ExecConfig::default())
        .expect("spawn should succeed")
        .with_parser(|text| {
            text.parse::<i64>()
                .map(|n| n + 1)
                .map_err(|e| ExecError::Parse(e.into()))
        });
    proc.wait().expect("wait");
    assert_eq!(proc.read().expect("read"), Some(42));
}

#[cfg(unix)]
#[test]
fn terminate_and_kill_map_to_negative_codes() {
    let py = require_python!();
    let sleeper = || {
        blocking::start(
            py_code(&py, "import time; time.sleep(30)"),
            &ExecConfig::default(),
        )
        .expect("spawn should succeed")
    };

    let mut termed = sleeper();
    termed.terminate();
    assert_eq!(termed.wait().expect("wait"), -(cmdkit::Signal::SIGTERM as i32));

    let mut killed = sleeper();
    killed.kill();
    assert_eq!(killed.wait().expect("wait"), -(cmdkit::Signal::SIGKILL as i32));
}

#[test]
fn dropping_a_live_handle_does_not_hang() {
    let py = require_python!();
    let proc = blocking::start(
        py_code(&py, "import time; time.sleep(30)"),
        &ExecConfig::default(),
    )
    .expect("spawn should succeed");
    let start = std::time::Instant::now();
    drop(proc);
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "drop blocked on a sleeping child"
    );
}
