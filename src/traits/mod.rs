mod driver;
mod entity;
mod mapper;

pub use driver::{DatabaseDriver, Session};
pub use entity::{bind_field, Entity, Field};
pub use mapper::{EntityMapper, FirstColumn, MappedRows, RowMapper};
