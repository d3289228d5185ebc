use std::fmt;
use std::sync::Arc;

use crate::error::{DaoError, Result};
use crate::types::{FromSqlValue, SqlValue};

/// Driver-agnostic, fully materialized result of a statement.
#[derive(Debug, Clone, Default)]
pub struct RawQueryResult {
    /// Column names in order
    pub columns: Vec<String>,
    /// Rows, where each row is a vector of values in column order
    pub rows: Vec<Vec<SqlValue>>,
    /// Rows affected as reported by the engine, when known
    pub rows_affected: Option<u64>,
}

impl RawQueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Converts into a lazy [`Rows`] iterator.
    pub fn into_rows(self) -> Rows {
        Rows::new(self.columns, self.rows.into_iter().map(Ok))
    }
}

/// A single row fetched from a statement.
/// Values are kept in column order and looked up by exact column name.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Creates a new Row from shared column names and values.
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Gets the raw value of a column by name. Names match case-sensitively.
    pub fn value(&self, column: &str) -> Option<&SqlValue> {
        self.index_of(column).map(|i| &self.values[i])
    }

    /// Gets a column by name, coerced to `T`.
    pub fn get<T: FromSqlValue>(&self, column: &str) -> Result<T> {
        let value = self
            .value(column)
            .ok_or_else(|| DaoError::ColumnNotFound(column.to_string()))?;
        T::from_sql_value(value, column)
    }

    /// Gets a column by position, coerced to `T`.
    pub fn get_index<T: FromSqlValue>(&self, index: usize) -> Result<T> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| DaoError::ColumnNotFound(format!("#{}", index)))?;
        T::from_sql_value(value, &self.columns[index])
    }

    /// Returns all column names in this row.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the values in column order.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Iterates `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Returns the number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

/// Lazy sequence of rows produced by one statement.
///
/// Owns whatever the driver needs to keep fetching, the open session
/// included, so the connection closes when this is exhausted or dropped.
/// It is finite and cannot be restarted.
pub struct Rows {
    columns: Arc<[String]>,
    inner: Box<dyn Iterator<Item = Result<Vec<SqlValue>>> + Send>,
}

impl Rows {
    pub fn new<I>(columns: Vec<String>, values: I) -> Self
    where
        I: Iterator<Item = Result<Vec<SqlValue>>> + Send + 'static,
    {
        Self {
            columns: columns.into(),
            inner: Box::new(values),
        }
    }

    /// Column names of the result set.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Iterator for Rows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let columns = &self.columns;
        self.inner
            .next()
            .map(|values| values.map(|values| Row::new(Arc::clone(columns), values)))
    }
}

impl fmt::Debug for Rows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// Outcome of a non-query statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    pub rows_affected: u64,
    /// First row returned by the statement, if any. Carries `INOUT`
    /// values of a `CALL` and `RETURNING` columns.
    pub returned: Option<Row>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(columns: &[&str], values: Vec<SqlValue>) -> Row {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        Row::new(columns.into(), values)
    }

    #[test]
    fn test_row_get() {
        let row = row(&["id", "name"], vec![SqlValue::Int32(1), "John".into()]);

        assert_eq!(row.get::<i32>("id").unwrap(), 1);
        assert_eq!(row.get::<String>("name").unwrap(), "John");
        assert_eq!(row.get_index::<i64>(0).unwrap(), 1);
        assert!(matches!(
            row.get::<i32>("missing"),
            Err(DaoError::ColumnNotFound(_))
        ));
        assert!(row.get_index::<i32>(2).is_err());
    }

    #[test]
    fn test_row_lookup_is_case_sensitive() {
        let row = row(&["Name"], vec!["John".into()]);
        assert!(row.value("Name").is_some());
        assert!(row.value("name").is_none());
    }

    #[test]
    fn test_rows_iterates_in_order_once() {
        let raw = RawQueryResult::new(
            vec!["id".to_string()],
            vec![vec![SqlValue::Int32(1)], vec![SqlValue::Int32(2)]],
        );
        let mut rows = raw.into_rows();
        assert_eq!(rows.columns(), &["id".to_string()]);

        let ids: Vec<i32> = rows
            .by_ref()
            .map(|r| r.unwrap().get::<i32>("id").unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(rows.next().is_none());
    }

    #[test]
    fn test_rows_surfaces_fetch_errors() {
        let values = vec![Ok(vec![SqlValue::Int32(1)]), Err(DaoError::query("lost"))];
        let mut rows = Rows::new(vec!["id".to_string()], values.into_iter());
        assert!(rows.next().unwrap().is_ok());
        assert!(rows.next().unwrap().is_err());
        assert!(rows.next().is_none());
    }
}
