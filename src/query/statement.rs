//! Concrete query state rendered to PostgreSQL.

use super::builder::{Conjunction, Field, ListOp, Predicate, QueryBuilder, QueryKind};
use super::hook::{QueryHook, apply_query_builder_hooks};
use crate::db::params::{push_bind_list, push_bind_value};
use crate::error::DbResult;
use crate::models::{Ident, SqlValue, TableName};
use sqlx::postgres::PgRow;
use sqlx::{Executor, FromRow, Postgres};
use tracing::debug;

/// A SELECT, UPDATE or DELETE over a single table.
///
/// Conditions, ordering and pagination are normally added through hooks;
/// [`Query::build`] renders the final statement with every value bound.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    kind: QueryKind,
    table: TableName,
    columns: Vec<Field>,
    assignments: Vec<(Ident, SqlValue)>,
    filters: Vec<(Conjunction, Predicate)>,
    order_by: Vec<String>,
    offset: Option<i64>,
    limit: Option<i64>,
}

impl Query {
    fn new(kind: QueryKind, table: TableName) -> Self {
        Self {
            kind,
            table,
            columns: Vec::new(),
            assignments: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    /// `SELECT * FROM table` until columns are added.
    pub fn select(table: impl Into<TableName>) -> Self {
        Self::new(QueryKind::Select, table.into())
    }

    pub fn update(table: impl Into<TableName>) -> Self {
        Self::new(QueryKind::Update, table.into())
    }

    pub fn delete(table: impl Into<TableName>) -> Self {
        Self::new(QueryKind::Delete, table.into())
    }

    pub fn column(mut self, field: impl Into<Field>) -> Self {
        self.columns.push(field.into());
        self
    }

    /// Add a `SET column = value` assignment (UPDATE only).
    pub fn set(mut self, column: impl Into<Ident>, value: impl Into<SqlValue>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    pub fn apply(self, hooks: &[QueryHook<Query>]) -> Self {
        apply_query_builder_hooks(self, hooks)
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn filters(&self) -> &[(Conjunction, Predicate)] {
        &self.filters
    }

    pub fn order_by(&self) -> &[String] {
        &self.order_by
    }

    pub fn offset_value(&self) -> Option<i64> {
        self.offset
    }

    pub fn limit_value(&self) -> Option<i64> {
        self.limit
    }

    /// Render the statement.
    pub fn build(&self) -> sqlx::QueryBuilder<'static, Postgres> {
        let mut qb = sqlx::QueryBuilder::new("");
        match self.kind {
            QueryKind::Select => {
                qb.push("SELECT ");
                self.push_columns(&mut qb);
                qb.push(" FROM ").push(self.table.ident());
            }
            QueryKind::Update => {
                qb.push("UPDATE ").push(self.table.ident()).push(" SET ");
                for (i, (column, value)) in self.assignments.iter().enumerate() {
                    if i > 0 {
                        qb.push(", ");
                    }
                    qb.push(column).push(" = ");
                    push_bind_value(&mut qb, value);
                }
            }
            QueryKind::Delete => {
                qb.push("DELETE FROM ").push(self.table.ident());
            }
        }

        self.push_filters(&mut qb);

        if self.kind == QueryKind::Select {
            if !self.order_by.is_empty() {
                qb.push(" ORDER BY ").push(self.order_by.join(", "));
            }
            if let Some(limit) = self.limit {
                qb.push(" LIMIT ").push_bind(limit);
            }
            if let Some(offset) = self.offset {
                qb.push(" OFFSET ").push_bind(offset);
            }
        }
        qb
    }

    /// Render `SELECT count(*)` over the same table and filters.
    ///
    /// Ordering and pagination are dropped.
    pub fn build_count(&self) -> sqlx::QueryBuilder<'static, Postgres> {
        let mut qb = sqlx::QueryBuilder::new("SELECT count(*) FROM ");
        qb.push(self.table.ident());
        self.push_filters(&mut qb);
        qb
    }

    pub fn to_sql(&self) -> String {
        self.build().sql().to_string()
    }

    fn push_columns(&self, qb: &mut sqlx::QueryBuilder<'static, Postgres>) {
        if self.columns.is_empty() {
            qb.push("*");
            return;
        }
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(column);
        }
    }

    fn push_filters(&self, qb: &mut sqlx::QueryBuilder<'static, Postgres>) {
        for (i, (conjunction, predicate)) in self.filters.iter().enumerate() {
            if i == 0 {
                qb.push(" WHERE (");
            } else {
                qb.push(" ").push(conjunction.as_str()).push(" (");
            }
            push_predicate(qb, predicate);
            qb.push(")");
        }
    }

    pub async fn fetch_all<'c, T, E>(&self, executor: E) -> DbResult<Vec<T>>
    where
        E: Executor<'c, Database = Postgres>,
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut qb = self.build();
        debug!(sql = %qb.sql(), "Fetching rows");
        Ok(qb.build_query_as::<T>().fetch_all(executor).await?)
    }

    pub async fn fetch_one<'c, T, E>(&self, executor: E) -> DbResult<T>
    where
        E: Executor<'c, Database = Postgres>,
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut qb = self.build();
        debug!(sql = %qb.sql(), "Fetching one row");
        Ok(qb.build_query_as::<T>().fetch_one(executor).await?)
    }

    pub async fn fetch_optional<'c, T, E>(&self, executor: E) -> DbResult<Option<T>>
    where
        E: Executor<'c, Database = Postgres>,
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut qb = self.build();
        debug!(sql = %qb.sql(), "Fetching optional row");
        Ok(qb.build_query_as::<T>().fetch_optional(executor).await?)
    }

    /// Execute the statement and return the number of affected rows.
    pub async fn execute<'c, E>(&self, executor: E) -> DbResult<u64>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let mut qb = self.build();
        debug!(sql = %qb.sql(), "Executing statement");
        let result = qb.build().execute(executor).await?;
        Ok(result.rows_affected())
    }

    /// Count the rows matched by the filters, ignoring pagination.
    pub async fn count<'c, E>(&self, executor: E) -> DbResult<i64>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let mut qb = self.build_count();
        debug!(sql = %qb.sql(), "Counting rows");
        Ok(qb.build_query_scalar::<i64>().fetch_one(executor).await?)
    }
}

fn push_predicate(qb: &mut sqlx::QueryBuilder<'static, Postgres>, predicate: &Predicate) {
    match predicate {
        Predicate::Compare { field, op, value } => {
            qb.push(field).push(" ").push(op).push(" ");
            push_bind_value(qb, value);
        }
        Predicate::List { values, .. } if values.is_empty() => {
            qb.push("FALSE");
        }
        Predicate::List { field, op, values } => {
            match op {
                ListOp::In => qb.push(field).push(" IN ("),
                ListOp::NotIn => qb.push(field).push(" NOT IN ("),
                // Element-wise so the array's element type only needs to
                // compare with the bound values, not match them exactly.
                ListOp::Overlap => qb
                    .push("EXISTS (SELECT 1 FROM unnest(")
                    .push(field)
                    .push(") AS e(v) WHERE v IN ("),
            };
            push_bind_list(qb, values);
            match op {
                ListOp::Overlap => qb.push("))"),
                ListOp::In | ListOp::NotIn => qb.push(")"),
            };
        }
        Predicate::False => {
            qb.push("FALSE");
        }
        Predicate::Raw(sql) => {
            qb.push(sql);
        }
    }
}

impl QueryBuilder for Query {
    fn kind(&self) -> QueryKind {
        self.kind
    }

    fn filter(mut self, conjunction: Conjunction, predicate: Predicate) -> Self {
        self.filters.push((conjunction, predicate));
        self
    }

    fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    fn order_expr(mut self, expr: String) -> Self {
        self.order_by.push(expr);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{
        QueryOp, paginate, sort_hook, where_hook, where_in_hook_t, where_overlap_hook_t,
    };

    #[test]
    fn test_plain_select() {
        assert_eq!(Query::select("users").to_sql(), "SELECT * FROM \"users\"");
        assert_eq!(
            Query::select("users")
                .column("id")
                .column(Ident::new("users.email"))
                .to_sql(),
            "SELECT id, \"users\".\"email\" FROM \"users\""
        );
    }

    #[test]
    fn test_select_with_hooks() {
        let q = Query::select("users").apply(&[
            where_hook("age", QueryOp::Gte, 18),
            where_in_hook_t("id", ["a", "b"]),
            sort_hook("name", "ASC"),
            paginate(2, 20),
        ]);
        assert_eq!(
            q.to_sql(),
            "SELECT * FROM \"users\" WHERE (age >= $1) AND (id IN ($2, $3)) \
             ORDER BY name ASC LIMIT $4 OFFSET $5"
        );
        assert_eq!(q.offset_value(), Some(20));
        assert_eq!(q.limit_value(), Some(20));
    }

    #[test]
    fn test_update_and_delete() {
        let q = Query::update("users")
            .set("name", "bob")
            .set("active", true)
            .apply(&[where_hook("id", QueryOp::Eq, 7), paginate(1, 10)]);
        assert_eq!(
            q.to_sql(),
            "UPDATE \"users\" SET \"name\" = $1, \"active\" = $2 WHERE (id = $3)"
        );

        let q = Query::delete("users").apply(&[where_in_hook_t("id", Vec::<i64>::new())]);
        assert_eq!(q.to_sql(), "DELETE FROM \"users\" WHERE (FALSE)");
    }

    #[test]
    fn test_overlap_compares_elements() {
        let q = Query::select("posts").apply(&[where_overlap_hook_t("tags", [2_i32, 3])]);
        assert_eq!(
            q.to_sql(),
            "SELECT * FROM \"posts\" WHERE \
             (EXISTS (SELECT 1 FROM unnest(tags) AS e(v) WHERE v IN ($1, $2)))"
        );
    }

    #[test]
    fn test_null_renders_literally() {
        let q = Query::update("users")
            .set("age", None::<i32>)
            .apply(&[where_hook("id", QueryOp::Eq, 7)]);
        assert_eq!(
            q.to_sql(),
            "UPDATE \"users\" SET \"age\" = NULL WHERE (id = $1)"
        );
    }

    #[test]
    fn test_raw_predicate_is_verbatim() {
        let q = Query::select("users")
            .and_where(Predicate::Raw("deleted_at IS NULL".to_string()))
            .apply(&[where_hook("age", QueryOp::Gt, 1)]);
        assert_eq!(
            q.to_sql(),
            "SELECT * FROM \"users\" WHERE (deleted_at IS NULL) AND (age > $1)"
        );
    }

    #[test]
    fn test_count_drops_pagination() {
        let q = Query::select("users").apply(&[where_hook("age", QueryOp::Gt, 1), paginate(3, 5)]);
        assert_eq!(
            q.build_count().sql(),
            "SELECT count(*) FROM \"users\" WHERE (age > $1)"
        );
    }
}
