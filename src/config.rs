use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::SqlFluentDbError;
use crate::executor::{ConnectionMode, SqlExecutor};
use crate::parameter::DEFAULT_VARIABLE_LENGTH_THRESHOLD;
use crate::provider::Provider;

/// Per-executor tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecutorOptions {
    /// String parameters whose size exceeds this are registered as variable-length unless the
    /// caller says otherwise.
    pub variable_length_threshold: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            variable_length_threshold: DEFAULT_VARIABLE_LENGTH_THRESHOLD,
        }
    }
}

/// Application settings in the familiar `appsettings.json` shape:
///
/// ```json
/// {
///   "ConnectionStrings": { "Main": "Data Source=app.db;Foreign Keys=true" },
///   "executor": { "variable_length_threshold": 32 },
///   "mode": "Transactional"
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(rename = "ConnectionStrings", default)]
    pub connection_strings: HashMap<String, String>,
    #[serde(default)]
    pub executor: ExecutorOptions,
    #[serde(default)]
    pub mode: ConnectionMode,
}

impl Settings {
    /// # Errors
    /// Returns `SqlFluentDbError::ConfigError` if the document is not valid settings JSON.
    pub fn from_json(json: &str) -> Result<Self, SqlFluentDbError> {
        serde_json::from_str(json)
            .map_err(|e| SqlFluentDbError::ConfigError(format!("invalid settings: {e}")))
    }

    /// # Errors
    /// Returns `SqlFluentDbError::ConfigError` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SqlFluentDbError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            SqlFluentDbError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    #[must_use]
    pub fn connection_string(&self, name: &str) -> Option<&str> {
        self.connection_strings.get(name).map(String::as_str)
    }
}

/// Something that can produce a ready-to-use executor.
pub trait ExecutorBuilder {
    fn build(&self) -> SqlExecutor;
}

/// Builds executors whose connection string is looked up by name in [`Settings`].
///
/// An unknown name is not an error here: the executor gets an empty connection string and
/// the provider rejects it when the connection is first opened.
#[derive(Clone)]
pub struct ConfiguredExecutorBuilder {
    provider: Arc<dyn Provider>,
    settings: Settings,
    name: String,
    mode: Option<ConnectionMode>,
}

impl ConfiguredExecutorBuilder {
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>, settings: Settings, name: impl Into<String>) -> Self {
        Self {
            provider,
            settings,
            name: name.into(),
            mode: None,
        }
    }

    /// Override the mode from the settings file.
    #[must_use]
    pub fn mode(mut self, mode: ConnectionMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

impl ExecutorBuilder for ConfiguredExecutorBuilder {
    fn build(&self) -> SqlExecutor {
        let connection_string = self.settings.connection_string(&self.name).unwrap_or_else(|| {
            tracing::debug!(name = %self.name, "no connection string configured under this name");
            ""
        });
        SqlExecutor::with_options(
            Arc::clone(&self.provider),
            connection_string,
            self.mode.unwrap_or(self.settings.mode),
            self.settings.executor.clone(),
        )
    }
}

impl std::fmt::Debug for ConfiguredExecutorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredExecutorBuilder")
            .field("provider", &self.provider.name())
            .field("name", &self.name)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
