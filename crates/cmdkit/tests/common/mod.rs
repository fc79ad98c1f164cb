// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared helpers for integration tests that shell out to python.

use cmdkit::Invocation;

/// Locate a usable python interpreter, or `None` to skip the test.
pub fn python_cmd() -> Option<String> {
    for cmd in &["python3", "python"] {
        if std::process::Command::new(cmd)
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok()
        {
            return Some(cmd.to_string());
        }
    }
    None
}

macro_rules! require_python {
    () => {
        match common::python_cmd() {
            Some(cmd) => cmd,
            None => {
                eprintln!("SKIP: python not found");
                return;
            }
        }
    };
}
pub(crate) use require_python;

/// Invocation running an inline python snippet.
pub fn py_code(py: &str, code: &str) -> Invocation {
    Invocation::new([py, "-c", code])
}

/// True if some live process's command line contains `marker`.
///
/// Procfs scan; a missing or unreadable /proc reads as "no such process",
/// as does a zombie (its cmdline is empty).
#[allow(dead_code)]
pub fn marker_process_alive(marker: &str) -> bool {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return false;
    };
    entries.flatten().any(|entry| {
        std::fs::read(entry.path().join("cmdline")).is_ok_and(|cmdline| {
            cmdline
                .windows(marker.len())
                .any(|window| window == marker.as_bytes())
        })
    })
}
