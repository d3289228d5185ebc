use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::config::ConnectionSettings;
use crate::drivers::TokioPostgresDriver;
use crate::error::{DaoError, Result};
use crate::traits::{DatabaseDriver, Entity, EntityMapper, FirstColumn, MappedRows, RowMapper, Session};
use crate::types::{Command, FromSqlValue, QueryParameter, Row};

/// Main entry point for pgdao.
///
/// Holds connection settings and opens a fresh connection for every call:
/// one statement runs per connection, and the connection is closed before
/// the call returns (or, for [`select`](Self::select), when the returned
/// iterator is dropped).
///
/// The API blocks. From async code, call it through
/// `tokio::task::spawn_blocking`; opening a session on an async runtime
/// thread fails with [`DaoError::ConnectionFailed`].
pub struct Connector {
    driver: Arc<dyn DatabaseDriver>,
    settings: ConnectionSettings,
    connection_string: OnceLock<String>,
}

impl Connector {
    /// Connect to a PostgreSQL server.
    ///
    /// Opens and immediately closes a connection to check that the server is
    /// reachable and accepts the credentials.
    ///
    /// # Example
    /// ```ignore
    /// let connector = Connector::connect(ConnectionSettings::new("localhost", "shop", "app", "secret"))?;
    /// let count: i64 = connector.select_value("SELECT count(*) FROM orders", &[])?;
    /// ```
    pub fn connect(settings: ConnectionSettings) -> Result<Self> {
        Self::connect_with_driver(Arc::new(TokioPostgresDriver::new()), settings)
    }

    /// Connect through a custom driver.
    /// Useful for testing or using alternative database drivers.
    pub fn connect_with_driver(
        driver: Arc<dyn DatabaseDriver>,
        settings: ConnectionSettings,
    ) -> Result<Self> {
        let connector = Self {
            driver,
            settings,
            connection_string: OnceLock::new(),
        };
        connector.check()?;
        Ok(connector)
    }

    /// Replace the connection settings, checking the new ones first.
    /// On failure the previous settings stay in place.
    pub fn reconnect(&mut self, settings: ConnectionSettings) -> Result<()> {
        let candidate = Self {
            driver: Arc::clone(&self.driver),
            settings,
            connection_string: OnceLock::new(),
        };
        candidate.check()?;
        *self = candidate;
        Ok(())
    }

    /// Returns the active connection settings.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Connection string used for every call. Built on first use.
    pub fn connection_string(&self) -> &str {
        self.connection_string
            .get_or_init(|| self.settings.connection_string())
    }

    fn check(&self) -> Result<()> {
        debug!(
            server = %self.settings.server,
            database = %self.settings.database,
            "checking connection"
        );
        let session = self.open()?;
        drop(session);
        Ok(())
    }

    fn open(&self) -> Result<Box<dyn Session>> {
        self.driver.open(self.connection_string())
    }

    /// Run a read statement and stream the first column of each row as `T`.
    ///
    /// `NULL` maps to `None` when `T` is an `Option`, and is a cast error
    /// otherwise. Rows are fetched as the iterator advances.
    pub fn select<T: FromSqlValue>(
        &self,
        query: &str,
        params: &[QueryParameter],
    ) -> Result<MappedRows<FirstColumn<T>>> {
        self.select_map(query, params, FirstColumn::new())
    }

    /// Run a read statement and stream each row through `mapper`.
    pub fn select_map<M: RowMapper>(
        &self,
        query: &str,
        params: &[QueryParameter],
        mapper: M,
    ) -> Result<MappedRows<M>> {
        let command = Command::text(query, params);
        debug!(sql = %query, params = params.len(), "running query");
        let rows = self.open()?.query(&command)?;
        Ok(MappedRows::new(rows, mapper))
    }

    /// Run a read statement and return the first column of the first row,
    /// or `T::default()` when there are no rows.
    pub fn select_value<T: FromSqlValue + Default>(
        &self,
        query: &str,
        params: &[QueryParameter],
    ) -> Result<T> {
        self.select_value_map(query, params, FirstColumn::new())
    }

    /// Run a read statement and map its first row, or return the output
    /// type's default when there are no rows. Only the first row is mapped,
    /// but the server still sends the whole result before the connection
    /// closes; add `LIMIT 1` to queries that can return many rows.
    pub fn select_value_map<M>(
        &self,
        query: &str,
        params: &[QueryParameter],
        mapper: M,
    ) -> Result<M::Output>
    where
        M: RowMapper,
        M::Output: Default,
    {
        let mut rows = self.select_map(query, params, mapper)?;
        rows.next().unwrap_or_else(|| Ok(Default::default()))
    }

    /// Run a read statement and bind its first row onto a new `E`.
    /// Returns `None` when there are no rows.
    pub fn select_entity<E: Entity>(
        &self,
        query: &str,
        params: &[QueryParameter],
    ) -> Result<Option<E>> {
        let mut rows = self.select_map(query, params, EntityMapper::<E>::new())?;
        rows.next().transpose()
    }

    /// Run a read statement and bind every row onto a new `E`, in result order.
    pub fn select_entity_list<E: Entity>(
        &self,
        query: &str,
        params: &[QueryParameter],
    ) -> Result<Vec<E>> {
        self.select_map(query, params, EntityMapper::<E>::new())?
            .collect()
    }

    /// Run a write, DDL statement or stored procedure and return the number
    /// of affected rows.
    ///
    /// Stored procedures are invoked as `CALL query($1, ..., $n)`. Output
    /// parameters are updated from the first row the statement returns.
    /// Unique and foreign key violations surface as
    /// [`DaoError::ConstraintViolation`]; other errors are returned unchanged.
    pub fn execute(
        &self,
        query: &str,
        params: &mut [QueryParameter],
        is_stored_procedure: bool,
    ) -> Result<u64> {
        let command = if is_stored_procedure {
            Command::stored_procedure(query, params)
        } else {
            Command::text(query, params)
        };
        let has_outputs = command.has_outputs();
        debug!(
            sql = %query,
            params = command.params.len(),
            stored_procedure = is_stored_procedure,
            "executing statement"
        );

        let mut session = self.open()?;
        let execution = session
            .execute(&command)
            .map_err(|e| match e.into_constraint_violation() {
                violation @ DaoError::ConstraintViolation { .. } => {
                    warn!(sql = %query, error = %violation, "constraint violation");
                    violation
                }
                other => other,
            })?;
        drop(session);

        if let (true, Some(row)) = (has_outputs, &execution.returned) {
            copy_outputs(params, row);
        }
        debug!(rows_affected = execution.rows_affected, "statement executed");
        Ok(execution.rows_affected)
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Copies returned values into output parameters: by column name when any
/// output parameter names a returned column, otherwise by position.
fn copy_outputs(params: &mut [QueryParameter], row: &Row) {
    let by_name = params
        .iter()
        .any(|p| p.output && row.value(p.bare_name()).is_some());

    let outputs = params.iter_mut().filter(|p| p.output);
    if by_name {
        for param in outputs {
            if let Some(value) = row.value(param.bare_name()).cloned() {
                param.value = value;
            }
        }
    } else {
        for (param, value) in outputs.zip(row.values()) {
            param.value = value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlValue;

    fn row(columns: &[&str], values: Vec<SqlValue>) -> Row {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        Row::new(columns.into(), values)
    }

    #[test]
    fn test_copy_outputs_by_name() {
        let mut params = [
            QueryParameter::output("@total", SqlValue::Null),
            QueryParameter::new("customer", 5),
            QueryParameter::output("@missing", 0),
            QueryParameter::output("@order_id", SqlValue::Null),
        ];
        let returned = row(
            &["order_id", "total"],
            vec![SqlValue::Int64(99), SqlValue::Float64(10.5)],
        );

        copy_outputs(&mut params, &returned);

        assert_eq!(params[0].value, SqlValue::Float64(10.5));
        assert_eq!(params[1].value, SqlValue::Int32(5));
        assert_eq!(params[2].value, SqlValue::Int32(0));
        assert_eq!(params[3].value, SqlValue::Int64(99));
    }

    #[test]
    fn test_copy_outputs_by_position() {
        let mut params = [
            QueryParameter::new("name", "Ada"),
            QueryParameter::output("a", SqlValue::Null),
            QueryParameter::output("b", SqlValue::Null),
        ];
        let returned = row(&["x", "y"], vec![SqlValue::Int32(1), "two".into()]);

        copy_outputs(&mut params, &returned);

        assert_eq!(params[0].value, SqlValue::Text("Ada".to_string()));
        assert_eq!(params[1].value, SqlValue::Int32(1));
        assert_eq!(params[2].value, SqlValue::Text("two".to_string()));
    }
}
