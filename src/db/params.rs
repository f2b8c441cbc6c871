//! Parameter binding utilities for rendered queries.
//!
//! Every [`SqlValue`] is pushed as a bind parameter; nothing is inlined into
//! the SQL text.

use crate::models::SqlValue;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

/// Bind a value to a PostgreSQL query builder.
///
/// `Null` is written as a literal `NULL` so the server infers its type from
/// the surrounding expression.
pub(crate) fn push_bind_value(qb: &mut QueryBuilder<'static, Postgres>, value: &SqlValue) {
    match value {
        SqlValue::Null => qb.push("NULL"),
        SqlValue::Bool(v) => qb.push_bind(*v),
        SqlValue::Int(v) => qb.push_bind(*v),
        SqlValue::Float(v) => qb.push_bind(*v),
        SqlValue::Text(v) => qb.push_bind(v.clone()),
        SqlValue::Uuid(v) => qb.push_bind(*v),
        SqlValue::Timestamp(v) => qb.push_bind(*v),
        SqlValue::Json(v) => qb.push_bind(Json(v.clone())),
    };
}

/// Bind `values` separated by commas.
pub(crate) fn push_bind_list(qb: &mut QueryBuilder<'static, Postgres>, values: &[SqlValue]) {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_bind_value(qb, value);
    }
}
