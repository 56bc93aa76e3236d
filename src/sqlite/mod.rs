// SQLite provider - runs executor commands through rusqlite
//
// - config: connection string parsing
// - connection: the provider connection, sync and async paths
// - cursor: async reader fed row by row from the blocking pool
// - params: placeholder binding and value conversion
// - query: statement execution and output-parameter extraction

pub mod config;
pub mod connection;
mod cursor;
pub mod params;
mod query;

pub use config::SqliteOptions;
pub use connection::SqliteConnection;

use crate::constraint::ConstraintCodes;
use crate::error::{ProviderError, SqlFluentDbError};
use crate::provider::{Provider, ProviderConnection};

/// `SQLITE_CONSTRAINT_UNIQUE`
pub const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;
/// `SQLITE_CONSTRAINT_FOREIGNKEY`
pub const SQLITE_CONSTRAINT_FOREIGNKEY: i32 = 787;
/// `SQLITE_CONSTRAINT_PRIMARYKEY`
pub const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;

/// The `SQLite` provider. Stateless; share one instance across executors.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteProvider;

impl Provider for SqliteProvider {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn connect(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn ProviderConnection>, SqlFluentDbError> {
        Ok(Box::new(SqliteConnection::new(connection_string)))
    }

    fn constraint_codes(&self) -> ConstraintCodes {
        ConstraintCodes {
            duplicate_key: SQLITE_CONSTRAINT_UNIQUE,
            foreign_key: SQLITE_CONSTRAINT_FOREIGNKEY,
            primary_key: SQLITE_CONSTRAINT_PRIMARYKEY,
        }
    }

    /// The extended result code of a `SQLite` failure.
    fn native_code(&self, error: &ProviderError) -> Option<i32> {
        match error {
            ProviderError::Sqlite(rusqlite::Error::SqliteFailure(failure, _)) => {
                Some(failure.extended_code)
            }
            ProviderError::Native { code, .. } => Some(*code),
            _ => None,
        }
    }
}
