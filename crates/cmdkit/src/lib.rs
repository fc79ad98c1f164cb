// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! # Entry points
//!
//! The crate root exposes the async surface; [`blocking`] mirrors all of it
//! for synchronous callers with identical semantics.
//!
//! - [`run`] — run to completion, capture stdout, enforce the timeout.
//! - [`lines`] — stream stdout line by line while the child runs.
//! - [`start`] — spawn and hand back a live [`Process`] handle.

pub mod blocking;
pub mod coerce;
mod config;
mod error;
mod invocation;
mod process;
mod runner;

pub use coerce::Utf8Handling;
/// Signal type accepted by `send_signal` (re-exported from `nix`).
#[cfg(unix)]
pub use nix::sys::signal::Signal;
pub use config::ExecConfig;
pub use error::{ExecError, ProcessError};
pub use invocation::Invocation;
pub use process::{OutputParser, Process};
pub use runner::{Lines, lines, run, start};
