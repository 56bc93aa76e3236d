use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{ProviderError, SqlFluentDbError};

static KEY_VALUE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z][A-Za-z ]*?)\s*=\s*(.*?)\s*$").ok());

/// Options for opening a `SQLite` connection, parsed from a connection string.
///
/// Accepted forms are a bare path, `:memory:`, or `key=value` pairs separated by `;`:
///
/// ```rust
/// use sql_fluent::sqlite::SqliteOptions;
///
/// let opts = SqliteOptions::parse("Data Source=app.db;Foreign Keys=false;Busy Timeout=250")?;
/// assert_eq!(opts.path, "app.db");
/// assert!(!opts.foreign_keys);
/// # Ok::<(), sql_fluent::SqlFluentDbError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    pub path: String,
    pub foreign_keys: bool,
    pub busy_timeout: Option<Duration>,
    pub read_only: bool,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            foreign_keys: true,
            busy_timeout: None,
            read_only: false,
        }
    }

    #[must_use]
    pub fn with_foreign_keys(mut self, foreign_keys: bool) -> Self {
        self.foreign_keys = foreign_keys;
        self
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Parse a connection string.
    ///
    /// # Errors
    /// Returns a provider connection error for an empty string, a missing data source, an
    /// unknown keyword or a malformed value.
    pub fn parse(connection_string: &str) -> Result<Self, SqlFluentDbError> {
        let trimmed = connection_string.trim();
        if trimmed.is_empty() {
            return Err(connection_error("connection string is empty"));
        }
        if !trimmed.contains('=') {
            return Ok(Self::new(trimmed));
        }

        let pattern = KEY_VALUE
            .as_ref()
            .ok_or_else(|| connection_error("connection string pattern failed to compile"))?;
        let mut path = None;
        let mut opts = Self::new(String::new());
        for segment in trimmed.split(';').filter(|s| !s.trim().is_empty()) {
            let caps = pattern
                .captures(segment)
                .ok_or_else(|| connection_error(&format!("malformed segment '{segment}'")))?;
            let key = caps[1].to_ascii_lowercase();
            let value = &caps[2];
            match key.as_str() {
                "data source" | "datasource" | "filename" => path = Some(value.to_owned()),
                "foreign keys" => opts.foreign_keys = parse_bool(&key, value)?,
                "read only" => opts.read_only = parse_bool(&key, value)?,
                "busy timeout" => {
                    let millis = value.parse::<u64>().map_err(|_| {
                        connection_error(&format!("busy timeout '{value}' is not a number"))
                    })?;
                    opts.busy_timeout = Some(Duration::from_millis(millis));
                }
                other => {
                    return Err(connection_error(&format!("unknown keyword '{other}'")));
                }
            }
        }
        opts.path = path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| connection_error("connection string has no Data Source"))?;
        Ok(opts)
    }
}

/// Renders back to a connection string that [`SqliteOptions::parse`] accepts.
impl fmt::Display for SqliteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Data Source={};Foreign Keys={};Read Only={}",
            self.path, self.foreign_keys, self.read_only
        )?;
        if let Some(timeout) = self.busy_timeout {
            write!(f, ";Busy Timeout={}", timeout.as_millis())?;
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SqlFluentDbError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(connection_error(&format!(
            "'{value}' is not a boolean for {key}"
        ))),
    }
}

fn connection_error(message: &str) -> SqlFluentDbError {
    ProviderError::Connection(format!("sqlite: {message}")).into()
}
