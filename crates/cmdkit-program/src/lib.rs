// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! A [`Program`] describes a command-line program once — executable, default
//! keyword options, flag style, execution configuration, output parser — and
//! is then invoked repeatedly with varying arguments. It builds the final
//! [`Invocation`] (argv plus optional stdin payload) and delegates execution
//! to the `cmdkit` core; the core never constructs flags itself.

pub mod python;

use std::sync::Arc;

use cmdkit::coerce;
use cmdkit::{ExecConfig, ExecError, Invocation, OutputParser};

/// One element of a program call: a positional value, a keyword option, or
/// a stdin payload.
#[derive(Clone, Debug)]
pub enum Arg {
    /// A positional argument, passed through verbatim.
    Value(String),
    /// A keyword option, formatted as `-k value` or `--key value` per the
    /// program's [`ArgForm`].
    Opt(String, String),
    /// A stdin payload. Several payloads in one call are concatenated in
    /// the order given, and the merged payload is written once then the
    /// stream is closed.
    Stdin(Vec<u8>),
}

impl<S: ToString> From<S> for Arg {
    fn from(value: S) -> Self {
        Self::Value(value.to_string())
    }
}

/// A keyword option argument.
pub fn opt(key: impl Into<String>, value: impl ToString) -> Arg {
    Arg::Opt(key.into(), value.to_string())
}

/// A stdin payload argument.
pub fn stdin(payload: impl Into<Vec<u8>>) -> Arg {
    Arg::Stdin(payload.into())
}

/// How keyword option names are rendered into flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ArgForm {
    /// Single-dash for short names, double-dash from
    /// [`LONG_FORM_THRESHOLD`] characters up (the default).
    #[default]
    Auto,
    /// Always single-dash.
    Short,
    /// Always double-dash.
    Long,
}

/// Key length at which [`ArgForm::Auto`] switches to `--long` form.
pub const LONG_FORM_THRESHOLD: usize = 3;

/// A reusable description of a command-line program.
///
/// Immutable: the `with_*` methods consume the value and return a new one,
/// so programs derived from a shared base never interfere. The type
/// parameter is the output of the bound parser (`String` by default, an
/// identity parse of the decoded output).
pub struct Program<T = String> {
    argv: Vec<String>,
    default_opts: Vec<(String, String)>,
    arg_form: ArgForm,
    config: ExecConfig,
    parser: OutputParser<T>,
}

impl Program {
    /// Describe a program by its executable (and any fixed leading
    /// arguments added later via [`with_arg`](Self::with_arg)).
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
            default_opts: Vec::new(),
            arg_form: ArgForm::default(),
            config: ExecConfig::default(),
            parser: Arc::new(Ok),
        }
    }
}

impl<T> Program<T> {
    /// Append a fixed argument included in every invocation.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    /// Add a default keyword option, applied to every invocation unless the
    /// call supplies the same key.
    #[must_use]
    pub fn with_default_opt(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.default_opts.push((key.into(), value.to_string()));
        self
    }

    /// Set the flag style for keyword options.
    #[must_use]
    pub fn with_arg_form(mut self, form: ArgForm) -> Self {
        self.arg_form = form;
        self
    }

    /// Replace the execution configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExecConfig) -> Self {
        self.config = config;
        self
    }

    /// Derive a copy with an adjusted configuration.
    #[must_use]
    pub fn map_config(mut self, f: impl FnOnce(ExecConfig) -> ExecConfig) -> Self {
        self.config = f(self.config);
        self
    }

    /// The execution configuration used by this program.
    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Bind an output parser, rebinding the program's output type.
    ///
    /// The parser receives the decoded, newline-normalized stdout text of
    /// each successful invocation.
    pub fn with_parser<U>(
        self,
        parser: impl Fn(String) -> Result<U, ExecError> + Send + Sync + 'static,
    ) -> Program<U> {
        Program {
            argv: self.argv,
            default_opts: self.default_opts,
            arg_form: self.arg_form,
            config: self.config,
            parser: Arc::new(parser),
        }
    }

    /// Bind a JSON parser: stdout is decoded as a `serde_json::Value`.
    pub fn with_json_parser(self) -> Program<serde_json::Value> {
        self.with_parser(|text| {
            serde_json::from_str(&text).map_err(|e| ExecError::Parse(Box::new(e)))
        })
    }

    /// Build the final invocation for a call: program argv, positional
    /// values, then keyword options (defaults first, call options taking
    /// precedence over same-key defaults), plus the merged stdin payload.
    pub fn invocation<I, A>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        let mut positional = Vec::new();
        let mut call_opts: Vec<(String, String)> = Vec::new();
        let mut payload: Option<Vec<u8>> = None;

        for arg in args {
            match arg.into() {
                Arg::Value(v) => positional.push(v),
                Arg::Opt(k, v) => call_opts.push((k, v)),
                Arg::Stdin(data) => payload.get_or_insert_default().extend(data),
            }
        }

        let mut opts: Vec<(String, String)> = Vec::new();
        for (k, v) in self.default_opts.iter().cloned().chain(call_opts) {
            match opts.iter_mut().find(|(key, _)| *key == k) {
                Some(entry) => entry.1 = v,
                None => opts.push((k, v)),
            }
        }

        let mut argv = self.argv.clone();
        argv.extend(positional);
        for (key, value) in opts {
            argv.push(self.format_key(&key));
            argv.push(value);
        }

        let inv = Invocation::new(argv);
        match payload {
            Some(data) => inv.with_stdin(data),
            None => inv,
        }
    }

    fn format_key(&self, key: &str) -> String {
        if key.starts_with('-') {
            return key.to_string();
        }
        let long = match self.arg_form {
            ArgForm::Auto => key.len() >= LONG_FORM_THRESHOLD,
            ArgForm::Short => false,
            ArgForm::Long => true,
        };
        if long {
            format!("--{key}")
        } else {
            format!("-{key}")
        }
    }

    fn parse_output(&self, bytes: &[u8]) -> Result<Option<T>, ExecError> {
        if bytes.is_empty() {
            return Ok(None);
        }
        let text = coerce::to_text(bytes, self.config.utf8);
        (self.parser)(text).map(Some)
    }

    /// Run to completion and parse the output.
    ///
    /// `Ok(None)` means the child produced no stdout bytes; any output at
    /// all goes through the bound parser.
    pub async fn run<I, A>(&self, args: I) -> Result<Option<T>, ExecError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        let bytes = cmdkit::run(self.invocation(args), &self.config).await?;
        self.parse_output(&bytes)
    }

    /// Blocking counterpart of [`run`](Self::run).
    pub fn run_blocking<I, A>(&self, args: I) -> Result<Option<T>, ExecError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        let bytes = cmdkit::blocking::run(self.invocation(args), &self.config)?;
        self.parse_output(&bytes)
    }

    /// Run to completion and return raw stdout bytes, bypassing decoding
    /// and the parser.
    pub async fn run_raw<I, A>(&self, args: I) -> Result<Vec<u8>, ExecError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        cmdkit::run(self.invocation(args), &self.config).await
    }

    /// Blocking counterpart of [`run_raw`](Self::run_raw).
    pub fn run_raw_blocking<I, A>(&self, args: I) -> Result<Vec<u8>, ExecError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        cmdkit::blocking::run(self.invocation(args), &self.config)
    }

    /// Stream stdout lines while the child runs.
    pub async fn lines<I, A>(&self, args: I) -> Result<cmdkit::Lines, ExecError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        cmdkit::lines(self.invocation(args), &self.config).await
    }

    /// Blocking counterpart of [`lines`](Self::lines).
    pub fn lines_blocking<I, A>(&self, args: I) -> Result<cmdkit::blocking::Lines, ExecError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        cmdkit::blocking::lines(self.invocation(args), &self.config)
    }

    /// Start the program and return the live handle, with this program's
    /// parser bound onto it. No implicit error checking.
    pub async fn start<I, A>(&self, args: I) -> Result<cmdkit::Process<T>, ExecError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
        T: 'static,
    {
        let proc = cmdkit::start(self.invocation(args), &self.config).await?;
        let parser = Arc::clone(&self.parser);
        Ok(proc.with_parser(move |text| parser(text)))
    }

    /// Blocking counterpart of [`start`](Self::start).
    pub fn start_blocking<I, A>(&self, args: I) -> Result<cmdkit::blocking::Process<T>, ExecError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
        T: 'static,
    {
        let proc = cmdkit::blocking::start(self.invocation(args), &self.config)?;
        let parser = Arc::clone(&self.parser);
        Ok(proc.with_parser(move |text| parser(text)))
    }
}

impl<T> Clone for Program<T> {
    fn clone(&self) -> Self {
        Self {
            argv: self.argv.clone(),
            default_opts: self.default_opts.clone(),
            arg_form: self.arg_form,
            config: self.config.clone(),
            parser: Arc::clone(&self.parser),
        }
    }
}

impl<T> std::fmt::Debug for Program<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("argv", &self.argv)
            .field("default_opts", &self.default_opts)
            .field("arg_form", &self.arg_form)
            .finish_non_exhaustive()
    }
}
