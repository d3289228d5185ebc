mod parameter;
mod row;
mod sql_value;

pub use parameter::{Command, CommandKind, QueryParameter};
pub use row::{Execution, RawQueryResult, Row, Rows};
pub use sql_value::{FromSqlValue, SqlValue};
