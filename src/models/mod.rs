//! Data models shared by queries and persisted entities.

pub mod schema;
pub mod value;

pub use schema::{BaseRecord, ColumnName, Ident, TableName};
pub use value::{SqlValue, to_sql_values};
