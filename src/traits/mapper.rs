use std::fmt;
use std::marker::PhantomData;

use crate::error::{DaoError, Result};
use crate::traits::Entity;
use crate::types::{FromSqlValue, Row, Rows};

/// Converts one fetched row into a caller type.
///
/// Implemented for closures taking `&Row`, so ad-hoc mappings need no
/// named type:
///
/// ```ignore
/// let names = connector.select_map(
///     "SELECT first, last FROM people",
///     &[],
///     |row: &Row| -> Result<String> {
///         Ok(format!("{} {}", row.get::<String>("first")?, row.get::<String>("last")?))
///     },
/// )?;
/// ```
pub trait RowMapper {
    type Output;

    fn map_row(&self, row: &Row) -> Result<Self::Output>;
}

impl<F, T> RowMapper for F
where
    F: Fn(&Row) -> Result<T>,
{
    type Output = T;

    fn map_row(&self, row: &Row) -> Result<T> {
        self(row)
    }
}

/// Maps a row to its first column coerced to `T`.
pub struct FirstColumn<T>(PhantomData<fn() -> T>);

impl<T> FirstColumn<T> {
    pub fn new() -> Self {
        FirstColumn(PhantomData)
    }
}

impl<T> Default for FirstColumn<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for FirstColumn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FirstColumn")
    }
}

impl<T: FromSqlValue> RowMapper for FirstColumn<T> {
    type Output = T;

    fn map_row(&self, row: &Row) -> Result<T> {
        if row.is_empty() {
            return Err(DaoError::ColumnNotFound("#0".to_string()));
        }
        row.get_index(0)
    }
}

/// Maps a row onto a fresh entity through its field table.
///
/// Columns bind to fields of the same name (case-sensitive). Columns with
/// no matching field are skipped, fields with no matching column keep their
/// default, and `NULL` assigns the field's default.
pub struct EntityMapper<E>(PhantomData<fn() -> E>);

impl<E> EntityMapper<E> {
    pub fn new() -> Self {
        EntityMapper(PhantomData)
    }
}

impl<E> Default for EntityMapper<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EntityMapper<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EntityMapper")
    }
}

impl<E: Entity> RowMapper for EntityMapper<E> {
    type Output = E;

    fn map_row(&self, row: &Row) -> Result<E> {
        let fields = E::fields();
        let mut entity = E::default();
        for (column, value) in row.iter() {
            if let Some(field) = fields.iter().find(|f| f.column == column) {
                (field.set)(&mut entity, value)?;
            }
        }
        Ok(entity)
    }
}

/// Rows of one statement passed through a mapper, lazily.
///
/// Finite and not restartable: iterating again means running the
/// statement again. The connection closes when this is exhausted or
/// dropped.
pub struct MappedRows<M> {
    rows: Rows,
    mapper: M,
}

impl<M: RowMapper> MappedRows<M> {
    pub fn new(rows: Rows, mapper: M) -> Self {
        Self { rows, mapper }
    }

    /// Column names of the result set.
    pub fn columns(&self) -> &[String] {
        self.rows.columns()
    }
}

impl<M: RowMapper> Iterator for MappedRows<M> {
    type Item = Result<M::Output>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(row.and_then(|row| self.mapper.map_row(&row)))
    }
}

impl<M> fmt::Debug for MappedRows<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedRows")
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}
