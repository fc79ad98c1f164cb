// SPDX-License-Identifier: MIT OR Apache-2.0
//! Convenience wrapper for invoking a Python interpreter.

use crate::{Arg, Program, opt};
use cmdkit::ExecError;

/// A Python interpreter described as a [`Program`].
///
/// Thin sugar over the builder: every method is expressible as a plain
/// `Program` call.
#[derive(Clone, Debug)]
pub struct Python {
    program: Program,
}

impl Python {
    /// Wrap a specific interpreter executable.
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            program: Program::new(interpreter),
        }
    }

    /// The platform's conventional interpreter name (`python3` on unix,
    /// `python` on Windows).
    pub fn system() -> Self {
        #[cfg(windows)]
        let name = "python";
        #[cfg(not(windows))]
        let name = "python3";
        Self::new(name)
    }

    /// The underlying program description.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Replace the underlying program description (e.g. to set a timeout).
    #[must_use]
    pub fn map_program(mut self, f: impl FnOnce(Program) -> Program) -> Self {
        self.program = f(self.program);
        self
    }

    /// Run an inline snippet via `-c`.
    pub async fn run_code(&self, code: &str) -> Result<Option<String>, ExecError> {
        self.program.run([opt("c", code)]).await
    }

    /// Blocking counterpart of [`run_code`](Self::run_code).
    pub fn run_code_blocking(&self, code: &str) -> Result<Option<String>, ExecError> {
        self.program.run_blocking([opt("c", code)])
    }

    /// Run a module via `-m`.
    pub async fn run_module(&self, module: &str) -> Result<Option<String>, ExecError> {
        self.program.run([opt("m", module)]).await
    }

    /// Blocking counterpart of [`run_module`](Self::run_module).
    pub fn run_module_blocking(&self, module: &str) -> Result<Option<String>, ExecError> {
        self.program.run_blocking([opt("m", module)])
    }

    /// Run a script file with extra arguments.
    pub async fn run_script<I, A>(&self, script: &str, args: I) -> Result<Option<String>, ExecError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        let call = std::iter::once(Arg::Value(script.to_string()))
            .chain(args.into_iter().map(Into::into));
        self.program.run(call).await
    }

    /// Blocking counterpart of [`run_script`](Self::run_script).
    pub fn run_script_blocking<I, A>(&self, script: &str, args: I) -> Result<Option<String>, ExecError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        let call = std::iter::once(Arg::Value(script.to_string()))
            .chain(args.into_iter().map(Into::into));
        self.program.run_blocking(call)
    }

    /// Interpreter version string, e.g. `Python 3.12.1`.
    pub async fn version(&self) -> Result<Option<String>, ExecError> {
        self.program.run(["-V"]).await
    }

    /// Blocking counterpart of [`version`](Self::version).
    pub fn version_blocking(&self) -> Result<Option<String>, ExecError> {
        self.program.run_blocking(["-V"])
    }
}
