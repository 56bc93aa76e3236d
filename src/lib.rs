//! Fluent execution of parameterized SQL statements.
//!
//! A [`SqlExecutor`] owns one command and one lazily-opened connection from a [`Provider`].
//! Parameters are registered through typed builders, the command runs as a non-query, a
//! scalar or a streaming read (each synchronous, async, or async with a
//! [`CancellationToken`](tokio_util::sync::CancellationToken)), and provider integrity errors
//! are reclassified into [`ConstraintViolationKind`]s.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sql_fluent::prelude::*;
//!
//! # fn main() -> Result<(), SqlFluentDbError> {
//! let mut exec = SqlExecutor::new(Arc::new(SqliteProvider), "orders.db", ConnectionMode::Normal);
//! exec.on_constraint_violation(|v| eprintln!("{}: {}", v.kind, v.message));
//!
//! exec.set_sql("INSERT INTO orders (customer, total) VALUES (@c, @t) RETURNING id")?
//!     .add_in_parameter("@c", 42_i64)?
//!     .add_in_decimal("@t", "19.99".parse::<Decimal>()?, 10, 2)?
//!     .add_out_parameter("@id", NumericType::Int64)?
//!     .execute()?;
//! let new_id: i64 = exec.get("@id")?;
//! println!("created order {new_id}");
//! # Ok(()) }
//! ```

pub mod command;
pub mod config;
pub mod constraint;
pub mod error;
pub mod executor;
pub mod parameter;
pub mod prelude;
pub mod provider;
pub mod results;
pub mod scalar;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use command::{Command, CommandBehavior, CommandKind};
pub use config::{ConfiguredExecutorBuilder, ExecutorBuilder, ExecutorOptions, Settings};
pub use constraint::{ConstraintCodes, ConstraintViolation, ConstraintViolationKind};
pub use error::{ProviderError, SqlFluentDbError};
pub use executor::{ConnectionMode, SqlExecutor};
pub use parameter::{Direction, ParamKind, Parameter, TableValue};
pub use provider::{Capability, Provider, ProviderConnection, TransactionOp};
pub use results::{Record, ResultSchema};
pub use types::{DbValue, Decimal, NumericType};
