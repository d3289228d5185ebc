use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{DaoError, Result};

/// Represents a SQL value in a driver-agnostic way.
/// Drivers are responsible for converting these to and from their native types.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SqlValue {
    #[default]
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Numeric(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short name of the variant, used in cast errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int16(_) => "int2",
            SqlValue::Int32(_) => "int4",
            SqlValue::Int64(_) => "int8",
            SqlValue::Float32(_) => "float4",
            SqlValue::Float64(_) => "float8",
            SqlValue::Numeric(_) => "numeric",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytea",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::TimestampTz(_) => "timestamptz",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Json(_) => "json",
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i16> for SqlValue {
    fn from(value: i16) -> Self {
        SqlValue::Int16(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int32(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int64(value)
    }
}

impl From<f32> for SqlValue {
    fn from(value: f32) -> Self {
        SqlValue::Float32(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float64(value)
    }
}

impl From<Decimal> for SqlValue {
    fn from(value: Decimal) -> Self {
        SqlValue::Numeric(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Bytes(value)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(value: NaiveDate) -> Self {
        SqlValue::Date(value)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(value: NaiveTime) -> Self {
        SqlValue::Time(value)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::TimestampTz(value)
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(value: serde_json::Value) -> Self {
        SqlValue::Json(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

/// Conversion from a fetched [`SqlValue`] into a Rust type.
///
/// `column` only feeds error messages. `NULL` is a cast error unless the
/// target is an `Option`.
pub trait FromSqlValue: Sized {
    /// Name of the target type, used in cast errors.
    const TYPE_NAME: &'static str;

    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self>;
}

fn cast_error<T: FromSqlValue>(value: &SqlValue, column: &str) -> DaoError {
    DaoError::Cast {
        column: column.to_string(),
        expected: T::TYPE_NAME,
        found: value.type_name(),
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other, column).map(Some),
        }
    }
}

impl FromSqlValue for SqlValue {
    const TYPE_NAME: &'static str = "any";

    fn from_sql_value(value: &SqlValue, _column: &str) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromSqlValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Bool(b) => Ok(*b),
            other => Err(cast_error::<Self>(other, column)),
        }
    }
}

// Integers accept any integer variant that fits, and whole numerics; narrowing is checked.
macro_rules! integer_from_sql_value {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromSqlValue for $ty {
                const TYPE_NAME: &'static str = $name;

                fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
                    let converted = match value {
                        SqlValue::Int16(n) => <$ty>::try_from(*n).ok(),
                        SqlValue::Int32(n) => <$ty>::try_from(*n).ok(),
                        SqlValue::Int64(n) => <$ty>::try_from(*n).ok(),
                        SqlValue::Numeric(d) if d.fract().is_zero() => {
                            d.to_i64().and_then(|n| <$ty>::try_from(n).ok())
                        }
                        _ => None,
                    };
                    converted.ok_or_else(|| cast_error::<Self>(value, column))
                }
            }
        )*
    };
}

integer_from_sql_value!(i16 => "i16", i32 => "i32", i64 => "i64");

impl FromSqlValue for f32 {
    const TYPE_NAME: &'static str = "f32";

    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Float32(n) => Ok(*n),
            SqlValue::Int16(n) => Ok(f32::from(*n)),
            other => Err(cast_error::<Self>(other, column)),
        }
    }
}

impl FromSqlValue for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Float64(n) => Ok(*n),
            SqlValue::Float32(n) => Ok(f64::from(*n)),
            SqlValue::Int16(n) => Ok(f64::from(*n)),
            SqlValue::Int32(n) => Ok(f64::from(*n)),
            SqlValue::Numeric(d) => d.to_f64().ok_or_else(|| cast_error::<Self>(value, column)),
            other => Err(cast_error::<Self>(other, column)),
        }
    }
}

impl FromSqlValue for Decimal {
    const TYPE_NAME: &'static str = "Decimal";

    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Numeric(d) => Ok(*d),
            SqlValue::Int16(n) => Ok(Decimal::from(*n)),
            SqlValue::Int32(n) => Ok(Decimal::from(*n)),
            SqlValue::Int64(n) => Ok(Decimal::from(*n)),
            other => Err(cast_error::<Self>(other, column)),
        }
    }
}

impl FromSqlValue for String {
    const TYPE_NAME: &'static str = "String";

    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Text(s) => Ok(s.clone()),
            other => Err(cast_error::<Self>(other, column)),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    const TYPE_NAME: &'static str = "Vec<u8>";

    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Bytes(b) => Ok(b.clone()),
            other => Err(cast_error::<Self>(other, column)),
        }
    }
}

impl FromSqlValue for NaiveDate {
    const TYPE_NAME: &'static str = "NaiveDate";

    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Date(d) => Ok(*d),
            other => Err(cast_error::<Self>(other, column)),
        }
    }
}

impl FromSqlValue for NaiveTime {
    const TYPE_NAME: &'static str = "NaiveTime";

    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Time(t) => Ok(*t),
            other => Err(cast_error::<Self>(other, column)),
        }
    }
}

impl FromSqlValue for NaiveDateTime {
    const TYPE_NAME: &'static str = "NaiveDateTime";

    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Timestamp(ts) => Ok(*ts),
            other => Err(cast_error::<Self>(other, column)),
        }
    }
}

impl FromSqlValue for DateTime<Utc> {
    const TYPE_NAME: &'static str = "DateTime<Utc>";

    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::TimestampTz(ts) => Ok(*ts),
            other => Err(cast_error::<Self>(other, column)),
        }
    }
}

impl FromSqlValue for Uuid {
    const TYPE_NAME: &'static str = "Uuid";

    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Uuid(u) => Ok(*u),
            other => Err(cast_error::<Self>(other, column)),
        }
    }
}

impl FromSqlValue for serde_json::Value {
    const TYPE_NAME: &'static str = "serde_json::Value";

    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Json(j) => Ok(j.clone()),
            other => Err(cast_error::<Self>(other, column)),
        }
    }
}
