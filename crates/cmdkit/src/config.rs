// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-invocation execution configuration.

use crate::coerce::Utf8Handling;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration applied to a single process invocation.
///
/// An `ExecConfig` is an immutable snapshot: the override methods consume the
/// value and return a new one, so invocations built from a shared base
/// configuration never interfere with each other.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Maximum time the process is allowed to run before being killed.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_millis"
    )]
    pub timeout: Option<Duration>,
    /// Working directory for the process.
    pub working_dir: Option<PathBuf>,
    /// Environment variables overlaid on top of (or replacing) the parent's.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Whether to inherit the parent process's environment variables.
    #[serde(default = "default_true")]
    pub inherit_env: bool,
    /// Policy for invalid UTF-8 when decoding child output.
    #[serde(default)]
    pub utf8: Utf8Handling,
}

fn default_true() -> bool {
    true
}

/// Serde helper for `Option<Duration>` as milliseconds.
mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(val: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        match val {
            Some(d) => d.as_millis().serialize(ser),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        let opt: Option<u64> = Option::deserialize(de)?;
        Ok(opt.map(Duration::from_millis))
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            working_dir: None,
            env: BTreeMap::new(),
            inherit_env: true,
            utf8: Utf8Handling::default(),
        }
    }
}

impl ExecConfig {
    /// A configuration with all defaults: no timeout, inherited environment,
    /// inherited working directory, replacement of invalid UTF-8.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout for run-to-completion invocations.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the child's working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set a single environment variable for the child.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables for the child.
    #[must_use]
    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Do not inherit the parent's environment; the child sees only the
    /// explicitly configured variables.
    #[must_use]
    pub fn isolated_env(mut self) -> Self {
        self.inherit_env = false;
        self
    }

    /// Set the invalid-UTF-8 policy used when decoding output.
    #[must_use]
    pub fn with_utf8(mut self, utf8: Utf8Handling) -> Self {
        self.utf8 = utf8;
        self
    }

    /// Resolve the full environment for a spawn.
    ///
    /// Starts empty, seeds with the parent's environment when `inherit_env`
    /// is set, then overlays the configured variables. Resolved fresh for
    /// every invocation since the parent's environment may have changed.
    pub fn resolved_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if self.inherit_env {
            env.extend(std::env::vars());
        }
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }
}
