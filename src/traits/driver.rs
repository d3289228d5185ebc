use crate::error::Result;
use crate::types::{Command, Execution, Rows};

/// Trait for database driver implementations.
/// Drivers are responsible for:
/// - Opening a connection from a connection string
/// - Converting SqlValue parameters to native types
/// - Converting fetched rows back to SqlValue
pub trait DatabaseDriver: Send + Sync {
    /// Open a new session. Dropping the session closes the connection.
    fn open(&self, connection_string: &str) -> Result<Box<dyn Session>>;
}

/// One open connection, used for a single operation.
pub trait Session: Send {
    /// Run a row-returning statement. The returned rows own the session
    /// and close it when they are exhausted or dropped.
    fn query(self: Box<Self>, command: &Command<'_>) -> Result<Rows>;

    /// Run a statement for its side effects.
    fn execute(&mut self, command: &Command<'_>) -> Result<Execution>;
}
