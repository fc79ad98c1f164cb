// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end coverage of the program builder against a real interpreter.

use std::io::Write;

use cmdkit::{ExecConfig, ExecError};
use cmdkit_program::python::Python;
use cmdkit_program::{Program, opt, stdin};

/// Locate a Python 3 interpreter, or `None` to skip on bare machines.
fn python_cmd() -> Option<&'static str> {
    ["python3", "python"].into_iter().find(|name| {
        std::process::Command::new(name)
            .arg("-c")
            .arg("pass")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    })
}

macro_rules! require_python {
    () => {
        match python_cmd() {
            Some(py) => py,
            None => {
                eprintln!("skipping: no python interpreter on PATH");
                return;
            }
        }
    };
}

#[tokio::test]
async fn version_reports_the_interpreter() {
    let py = require_python!();
    let version = Python::new(py).version().await.expect("version");
    assert!(
        version.as_deref().is_some_and(|v| v.starts_with("Python 3")),
        "unexpected version: {version:?}"
    );
}

#[tokio::test]
async fn run_code_returns_decoded_output() {
    let py = require_python!();
    let out = Python::new(py)
        .run_code("print('Hello, world!')")
        .await
        .expect("run_code");
    assert_eq!(out.as_deref(), Some("Hello, world!"));
}

#[test]
fn run_code_blocking_matches_async() {
    let py = require_python!();
    let out = Python::new(py)
        .run_code_blocking("print('Hello, world!')")
        .expect("run_code_blocking");
    assert_eq!(out.as_deref(), Some("Hello, world!"));
}

#[tokio::test]
async fn silent_code_yields_none() {
    let py = require_python!();
    let out = Python::new(py).run_code("pass").await.expect("run_code");
    assert_eq!(out, None);
}

#[tokio::test]
async fn stdin_arg_feeds_the_child() {
    let py = require_python!();
    let prog = Program::new(py);
    let out = prog
        .run([
            opt("c", "import sys; print(sys.stdin.read().upper())"),
            stdin("quiet"),
        ])
        .await
        .expect("run");
    assert_eq!(out.as_deref(), Some("QUIET"));
}

#[tokio::test]
async fn json_parser_decodes_stdout() {
    let py = require_python!();
    let prog = Program::new(py).with_json_parser();
    let value = prog
        .run([opt("c", "import json; print(json.dumps({'n': 3}))")])
        .await
        .expect("run")
        .expect("json output present");
    assert_eq!(value["n"], 3);
}

#[tokio::test]
async fn json_parser_rejects_non_json() {
    let py = require_python!();
    let prog = Program::new(py).with_json_parser();
    let err = prog
        .run([opt("c", "print('not json')")])
        .await
        .expect_err("parse failure");
    assert!(matches!(err, ExecError::Parse(_)), "got: {err}");
}

#[tokio::test]
async fn failing_code_surfaces_stderr_as_the_error() {
    let py = require_python!();
    let err = Python::new(py)
        .run_code("raise RuntimeError('Oops')")
        .await
        .expect_err("raise must fail the run");
    let ExecError::Failed(perr) = err else {
        panic!("expected Failed, got: {err}");
    };
    assert_eq!(perr.code, 1);
    assert!(
        perr.to_string().trim_end().ends_with("RuntimeError: Oops"),
        "unexpected stderr: {perr}"
    );
}

#[tokio::test]
async fn run_script_passes_positional_args() {
    let py = require_python!();
    let mut script = tempfile::NamedTempFile::new().expect("temp script");
    script
        .write_all(b"import sys\nprint(' '.join(sys.argv[1:]))\n")
        .expect("write script");
    let path = script.path().to_str().expect("utf-8 temp path").to_string();

    let out = Python::new(py)
        .run_script(&path, ["alpha", "beta"])
        .await
        .expect("run_script");
    assert_eq!(out.as_deref(), Some("alpha beta"));
}

#[tokio::test]
async fn run_module_invokes_the_stdlib() {
    let py = require_python!();
    let prog = Python::new(py).map_program(|p| p.with_arg("-I"));
    let out = prog
        .program()
        .run([opt("m", "platform")])
        .await
        .expect("run -m platform");
    assert!(out.is_some(), "platform module printed nothing");
}

#[tokio::test]
async fn run_raw_skips_decoding() {
    let py = require_python!();
    let prog = Program::new(py);
    let bytes = prog
        .run_raw([opt("c", "print('raw')")])
        .await
        .expect("run_raw");
    assert_eq!(bytes, b"raw\n");
}

#[tokio::test]
async fn start_binds_the_program_parser() {
    let py = require_python!();
    let prog = Program::new(py).with_parser(|text| {
        text.parse::<i64>()
            .map_err(|e| ExecError::Parse(e.into()))
    });
    let mut proc = prog
        .start([opt("c", "print(7)")])
        .await
        .expect("start");
    proc.wait().await.expect("wait");
    assert_eq!(proc.read().await.expect("read"), Some(7));
}

#[test]
fn lines_blocking_streams_program_output() {
    let py = require_python!();
    let prog = Program::new(py);
    let lines = prog
        .lines_blocking([opt("c", "print('a'); print('b')")])
        .expect("lines_blocking");
    let collected: Result<Vec<_>, _> = lines.collect();
    assert_eq!(
        collected.expect("all lines ok"),
        vec![b"a\n".to_vec(), b"b\n".to_vec()]
    );
}

#[tokio::test]
async fn per_program_config_applies_to_every_call() {
    let py = require_python!();
    let dir = tempfile::tempdir().expect("tempdir");
    let prog = Program::new(py).with_config(
        ExecConfig::default().with_working_dir(dir.path()),
    );
    let out = prog
        .run([opt("c", "import os; print(os.getcwd())")])
        .await
        .expect("run")
        .expect("cwd printed");
    let expected = dir.path().canonicalize().expect("canonicalize");
    assert_eq!(
        std::path::Path::new(&out).canonicalize().expect("canonicalize output"),
        expected
    );
}
