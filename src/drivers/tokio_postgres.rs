use std::error::Error as StdError;
use std::pin::Pin;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::StreamExt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, Column, NoTls, RowStream, Statement};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DaoError, Result};
use crate::traits::{DatabaseDriver, Session};
use crate::types::{Command, Execution, QueryParameter, Row, Rows, SqlValue};

/// PostgreSQL driver implementation using tokio-postgres.
///
/// Every session runs on its own current-thread runtime; nothing executes
/// between calls and no threads are spawned. Sessions block, so they cannot
/// be opened from inside an async runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPostgresDriver;

impl TokioPostgresDriver {
    pub fn new() -> Self {
        Self
    }
}

impl DatabaseDriver for TokioPostgresDriver {
    fn open(&self, connection_string: &str) -> Result<Box<dyn Session>> {
        if Handle::try_current().is_ok() {
            return Err(DaoError::ConnectionFailed(
                "cannot open a blocking session inside an async runtime; \
                 call through tokio::task::spawn_blocking"
                    .to_string(),
            ));
        }

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DaoError::ConnectionFailed(e.to_string()))?;

        let (client, connection) = runtime
            .block_on(tokio_postgres::connect(connection_string, NoTls))
            .map_err(|e| DaoError::ConnectionFailed(e.to_string()))?;

        // Driven whenever the session blocks on its runtime
        let task = runtime.spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "PostgreSQL connection error");
            }
        });

        debug!("session opened");
        Ok(Box::new(PostgresSession {
            client,
            connection: Connection { runtime, task },
        }))
    }
}

/// Runtime plus the task polling the socket. Dropped after the client so
/// the connection can send its terminate message before the runtime goes.
struct Connection {
    runtime: Runtime,
    task: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.runtime.block_on(&mut self.task);
        debug!("session closed");
    }
}

// Field order matters: `client` must drop before `connection`.
struct PostgresSession {
    client: Client,
    connection: Connection,
}

impl PostgresSession {
    fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.connection.runtime.block_on(future)
    }

    /// Prepares the statement and starts streaming its rows.
    fn start(&self, command: &Command<'_>) -> Result<(Statement, RowStream)> {
        let sql = command.sql();
        self.block_on(async {
            let statement = self.client.prepare(&sql).await.map_err(engine_error)?;
            let values = bind_params(&command.bound(), statement.params())?;
            let refs: Vec<&(dyn ToSql + Sync)> = values
                .iter()
                .map(|v| v.as_ref() as &(dyn ToSql + Sync))
                .collect();
            let stream = self
                .client
                .query_raw(&statement, refs)
                .await
                .map_err(engine_error)?;
            Ok::<_, DaoError>((statement, stream))
        })
    }
}

impl Session for PostgresSession {
    fn query(self: Box<Self>, command: &Command<'_>) -> Result<Rows> {
        let (statement, stream) = self.start(command)?;
        let columns = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        Ok(Rows::new(
            columns,
            PostgresRows {
                stream: Box::pin(stream),
                statement,
                session: self,
            },
        ))
    }

    fn execute(&mut self, command: &Command<'_>) -> Result<Execution> {
        let (statement, stream) = self.start(command)?;
        let mut stream = Box::pin(stream);

        let mut returned = None;
        while let Some(row) = self.block_on(stream.next()) {
            let row = row.map_err(engine_error)?;
            if returned.is_none() {
                let columns: Vec<String> = statement
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect();
                returned = Some(Row::new(columns.into(), decode_row(&row, statement.columns())?));
            }
        }

        Ok(Execution {
            rows_affected: stream.rows_affected().unwrap_or(0),
            returned,
        })
    }
}

// Field order matters: the stream drops before the session closes.
struct PostgresRows {
    stream: Pin<Box<RowStream>>,
    statement: Statement,
    session: Box<PostgresSession>,
}

impl Iterator for PostgresRows {
    type Item = Result<Vec<SqlValue>>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.session.block_on(self.stream.next())?;
        Some(
            row.map_err(engine_error)
                .and_then(|row| decode_row(&row, self.statement.columns())),
        )
    }
}

/// Converts a tokio-postgres error, keeping the SQLSTATE and constraint
/// name when the engine reported them.
fn engine_error(e: tokio_postgres::Error) -> DaoError {
    match e.as_db_error() {
        Some(db) => DaoError::QueryFailed {
            code: Some(db.code().code().to_string()),
            constraint: db.constraint().map(str::to_string),
            message: db.message().to_string(),
        },
        None => DaoError::query(e.to_string()),
    }
}

/// Binds NULL to a parameter of any type.
#[derive(Debug)]
struct Null;

impl ToSql for Null {
    fn to_sql(
        &self,
        _ty: &Type,
        _out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

type Param = Box<dyn ToSql + Sync + Send>;

/// Converts parameters to native values, guided by the types the server
/// inferred for each placeholder.
fn bind_params(params: &[&QueryParameter], types: &[Type]) -> Result<Vec<Param>> {
    if params.len() != types.len() {
        return Err(DaoError::query(format!(
            "statement expects {} parameter(s), got {}",
            types.len(),
            params.len()
        )));
    }
    params
        .iter()
        .zip(types)
        .map(|(param, ty)| bind_value(param, ty))
        .collect()
}

fn bind_value(param: &QueryParameter, ty: &Type) -> Result<Param> {
    let value: Param = match (&param.value, ty) {
        (SqlValue::Null, _) => Box::new(Null),

        (SqlValue::Int16(n), _) => bind_integer(param, i64::from(*n), ty)?,
        (SqlValue::Int32(n), _) => bind_integer(param, i64::from(*n), ty)?,
        (SqlValue::Int64(n), _) => bind_integer(param, *n, ty)?,

        (SqlValue::Float32(n), &Type::FLOAT8) => Box::new(f64::from(*n)),
        (SqlValue::Float32(n), &Type::NUMERIC) => {
            Box::new(Decimal::try_from(*n).map_err(|_| cast(param, "numeric"))?)
        }
        (SqlValue::Float32(n), _) => Box::new(*n),
        (SqlValue::Float64(n), &Type::FLOAT4) => Box::new(*n as f32),
        (SqlValue::Float64(n), &Type::NUMERIC) => {
            Box::new(Decimal::try_from(*n).map_err(|_| cast(param, "numeric"))?)
        }
        (SqlValue::Float64(n), _) => Box::new(*n),
        (SqlValue::Numeric(d), &Type::FLOAT4) => {
            Box::new(d.to_f32().ok_or_else(|| cast(param, "float4"))?)
        }
        (SqlValue::Numeric(d), &Type::FLOAT8) => {
            Box::new(d.to_f64().ok_or_else(|| cast(param, "float8"))?)
        }
        (SqlValue::Numeric(d), _) => Box::new(*d),

        (SqlValue::Text(s), &Type::UUID) => {
            Box::new(Uuid::parse_str(s).map_err(|_| cast(param, "uuid"))?)
        }
        (SqlValue::Text(s), &Type::JSON | &Type::JSONB) => Box::new(
            serde_json::from_str::<serde_json::Value>(s).map_err(|_| cast(param, "json"))?,
        ),
        (SqlValue::Text(s), _) => Box::new(s.clone()),

        (SqlValue::Bool(b), _) => Box::new(*b),
        (SqlValue::Bytes(b), _) => Box::new(b.clone()),
        (SqlValue::Date(d), _) => Box::new(*d),
        (SqlValue::Time(t), _) => Box::new(*t),
        (SqlValue::Timestamp(ts), _) => Box::new(*ts),
        (SqlValue::TimestampTz(ts), _) => Box::new(*ts),
        (SqlValue::Uuid(u), _) => Box::new(*u),
        (SqlValue::Json(j), _) => Box::new(j.clone()),
    };
    Ok(value)
}

fn cast(param: &QueryParameter, expected: &'static str) -> DaoError {
    DaoError::Cast {
        column: param.name.clone(),
        expected,
        found: param.value.type_name(),
    }
}

/// Fits an integer to the placeholder's numeric type; narrowing is checked.
/// Other targets get the value as `int8`.
fn bind_integer(param: &QueryParameter, n: i64, ty: &Type) -> Result<Param> {
    let value: Param = match *ty {
        Type::INT2 => Box::new(i16::try_from(n).map_err(|_| cast(param, "int2"))?),
        Type::INT4 => Box::new(i32::try_from(n).map_err(|_| cast(param, "int4"))?),
        Type::FLOAT4 => Box::new(n as f32),
        Type::FLOAT8 => Box::new(n as f64),
        Type::NUMERIC => Box::new(Decimal::from(n)),
        _ => Box::new(n),
    };
    Ok(value)
}

fn decode_row(row: &tokio_postgres::Row, columns: &[Column]) -> Result<Vec<SqlValue>> {
    columns
        .iter()
        .enumerate()
        .map(|(i, col)| decode_value(row, i, col))
        .collect()
}

/// Convert a PostgreSQL value to a SqlValue, dispatching on the column type.
fn decode_value(row: &tokio_postgres::Row, idx: usize, column: &Column) -> Result<SqlValue> {
    fn get<'a, T>(row: &'a tokio_postgres::Row, idx: usize) -> Result<Option<T>>
    where
        T: tokio_postgres::types::FromSql<'a>,
    {
        row.try_get::<_, Option<T>>(idx)
            .map_err(|e| DaoError::query(e.to_string()))
    }

    let value = match *column.type_() {
        Type::BOOL => get::<bool>(row, idx)?.map(SqlValue::Bool),
        Type::INT2 => get::<i16>(row, idx)?.map(SqlValue::Int16),
        Type::INT4 => get::<i32>(row, idx)?.map(SqlValue::Int32),
        Type::INT8 => get::<i64>(row, idx)?.map(SqlValue::Int64),
        Type::OID => get::<u32>(row, idx)?.map(|n| SqlValue::Int64(i64::from(n))),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(SqlValue::Float32),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(SqlValue::Float64),
        Type::NUMERIC => get::<Decimal>(row, idx)?.map(SqlValue::Numeric),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get::<String>(row, idx)?.map(SqlValue::Text)
        }
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(SqlValue::Bytes),
        Type::DATE => get::<NaiveDate>(row, idx)?.map(SqlValue::Date),
        Type::TIME => get::<NaiveTime>(row, idx)?.map(SqlValue::Time),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx)?.map(SqlValue::Timestamp),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx)?.map(SqlValue::TimestampTz),
        Type::UUID => get::<Uuid>(row, idx)?.map(SqlValue::Uuid),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx)?.map(SqlValue::Json),
        Type::VOID => None,
        ref other => {
            return Err(DaoError::UnsupportedType {
                column: column.name().to_string(),
                type_name: other.name().to_string(),
            })
        }
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(value: SqlValue) -> QueryParameter {
        QueryParameter::new("p", value)
    }

    #[test]
    fn test_integers_fit_placeholder_type() {
        assert!(bind_value(&param(SqlValue::Int64(12)), &Type::INT2).is_ok());
        assert!(bind_value(&param(SqlValue::Int16(12)), &Type::INT8).is_ok());
        assert!(bind_value(&param(SqlValue::Int32(12)), &Type::FLOAT8).is_ok());
    }

    #[test]
    fn test_integer_overflow_is_cast_error() {
        let err = bind_value(&param(SqlValue::Int64(i64::MAX)), &Type::INT4)
            .err()
            .unwrap();
        match err {
            DaoError::Cast {
                column,
                expected,
                found,
            } => {
                assert_eq!(column, "p");
                assert_eq!(expected, "int4");
                assert_eq!(found, "int8");
            }
            other => panic!("Expected Cast error, got {:?}", other),
        }
    }

    #[test]
    fn test_null_accepts_any_type() {
        assert!(<Null as ToSql>::accepts(&Type::INT4));
        assert!(<Null as ToSql>::accepts(&Type::JSONB));

        let mut buf = BytesMut::new();
        let null = bind_value(&param(SqlValue::Null), &Type::UUID).unwrap();
        assert!(matches!(
            null.to_sql_checked(&Type::UUID, &mut buf),
            Ok(IsNull::Yes)
        ));
    }

    fn serializes(value: SqlValue, ty: &Type) -> bool {
        let bound = bind_value(&param(value), ty).unwrap();
        let mut buf = BytesMut::new();
        matches!(bound.to_sql_checked(ty, &mut buf), Ok(IsNull::No))
    }

    #[test]
    fn test_numeric_placeholders() {
        assert!(serializes(SqlValue::Float64(1.5), &Type::NUMERIC));
        assert!(serializes(SqlValue::Float32(1.5), &Type::NUMERIC));
        assert!(serializes(SqlValue::Int32(7), &Type::NUMERIC));
        assert!(serializes(SqlValue::Numeric(Decimal::new(15, 1)), &Type::NUMERIC));
        assert!(serializes(SqlValue::Numeric(Decimal::new(15, 1)), &Type::FLOAT8));

        let err = bind_value(&param(SqlValue::Float64(f64::NAN)), &Type::NUMERIC)
            .err()
            .unwrap();
        assert!(matches!(err, DaoError::Cast { expected: "numeric", .. }));
    }

    #[test]
    fn test_uuid_and_json_placeholders() {
        let id = Uuid::from_u128(7);
        assert!(serializes(SqlValue::Uuid(id), &Type::UUID));
        assert!(serializes(SqlValue::Text(id.to_string()), &Type::UUID));
        assert!(serializes(SqlValue::Json(serde_json::json!({"a": 1})), &Type::JSONB));
        assert!(serializes(SqlValue::Text(r#"{"a": 1}"#.to_string()), &Type::JSON));
        assert!(serializes(
            SqlValue::Time(NaiveTime::from_hms_opt(8, 30, 0).unwrap()),
            &Type::TIME
        ));

        let err = bind_value(&param("not-a-uuid".into()), &Type::UUID).err().unwrap();
        assert!(matches!(err, DaoError::Cast { expected: "uuid", .. }));
    }

    #[test]
    fn test_open_inside_async_runtime_is_an_error() {
        let runtime = Builder::new_current_thread().enable_all().build().unwrap();
        let result = runtime.block_on(async { TokioPostgresDriver::new().open("host=localhost") });
        match result {
            Err(DaoError::ConnectionFailed(message)) => {
                assert!(message.contains("async runtime"));
            }
            Err(other) => panic!("Expected ConnectionFailed, got {:?}", other),
            Ok(_) => panic!("Expected ConnectionFailed, got a session"),
        }
    }

    #[test]
    fn test_bind_params_pairs_values_with_types() {
        let (a, b) = (param(SqlValue::Int32(1)), param("a".into()));
        let params = [&a, &b];
        let bound = bind_params(&params, &[Type::INT8, Type::TEXT]).unwrap();
        assert_eq!(bound.len(), 2);

        let err = bind_params(&params, &[Type::INT8]).err().unwrap();
        assert!(matches!(err, DaoError::QueryFailed { code: None, .. }));
    }
}
