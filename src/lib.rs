//! pgdao - a thin, synchronous data-access helper for PostgreSQL
//!
//! Every call opens a connection, runs one parameterized statement, maps the
//! rows and closes the connection again.
//!
//! # Example
//! ```ignore
//! use pgdao::{entity, ConnectionSettings, Connector, QueryParameter};
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     id: i32,
//!     name: String,
//!     email: Option<String>,
//! }
//!
//! entity!(User { id, name, email });
//!
//! let connector = Connector::connect(ConnectionSettings::new("localhost", "shop", "app", "secret"))?;
//!
//! // Bind rows onto entities by column name
//! let users: Vec<User> = connector.select_entity_list(
//!     "SELECT id, name, email FROM users WHERE name = $1",
//!     &[QueryParameter::new("name", "John")],
//! )?;
//!
//! // Single values
//! let count: i64 = connector.select_value("SELECT count(*) FROM users", &[])?;
//!
//! // Writes, with an output parameter filled from RETURNING
//! let mut params = [
//!     QueryParameter::new("name", "Jane"),
//!     QueryParameter::output("id", None::<i32>),
//! ];
//! connector.execute("INSERT INTO users (name) VALUES ($1) RETURNING id", &mut params, false)?;
//! ```

pub mod config;
pub mod drivers;
pub mod error;
pub mod traits;
pub mod types;

mod connector;

// Re-export main types for convenient access
pub use config::ConnectionSettings;
pub use connector::Connector;
pub use error::{ConstraintKind, DaoError, Result};
pub use traits::{DatabaseDriver, Entity, MappedRows, RowMapper, Session};
pub use types::{QueryParameter, Row, Rows, SqlValue};
