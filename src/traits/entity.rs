use crate::error::Result;
use crate::types::{FromSqlValue, SqlValue};

/// A type that rows can be bound onto column by column.
///
/// Usually implemented with the [`entity!`](crate::entity) macro.
pub trait Entity: Default + Sized + 'static {
    /// Field table, one entry per bindable field.
    fn fields() -> &'static [Field<Self>];
}

/// One bindable field of an entity.
pub struct Field<E> {
    /// Column name the field binds to. Matched case-sensitively.
    pub column: &'static str,
    pub set: fn(&mut E, &SqlValue) -> Result<()>,
}

/// Converts a value for assignment to a field. `NULL` yields the field
/// type's default (`None` for `Option` fields).
pub fn bind_field<T: FromSqlValue + Default>(value: &SqlValue, column: &str) -> Result<T> {
    match value {
        SqlValue::Null => Ok(T::default()),
        other => T::from_sql_value(other, column),
    }
}

/// Implements [`Entity`] for a struct from a list of its fields.
///
/// Each field binds to the column of the same name unless renamed with
/// `field => "Column"`. Field types must implement `FromSqlValue + Default`.
///
/// ```ignore
/// #[derive(Debug, Default)]
/// struct User {
///     id: i32,
///     name: String,
///     email: Option<String>,
/// }
///
/// pgdao::entity!(User { id, name => "full_name", email });
/// ```
#[macro_export]
macro_rules! entity {
    (@column $field:ident) => {
        stringify!($field)
    };
    (@column $field:ident, $column:literal) => {
        $column
    };
    ($ty:ty { $($field:ident $(=> $column:literal)?),* $(,)? }) => {
        impl $crate::traits::Entity for $ty {
            fn fields() -> &'static [$crate::traits::Field<Self>] {
                const FIELDS: &[$crate::traits::Field<$ty>] = &[
                    $(
                        $crate::traits::Field {
                            column: $crate::entity!(@column $field $(, $column)?),
                            set: |entity: &mut $ty, value: &$crate::types::SqlValue| {
                                entity.$field = $crate::traits::bind_field(
                                    value,
                                    $crate::entity!(@column $field $(, $column)?),
                                )?;
                                Ok(())
                            },
                        },
                    )*
                ];
                FIELDS
            }
        }
    };
}
