//! Composable query hooks.
//!
//! A [`QueryHook`] is a pure `B -> B` transform over a [`QueryBuilder`].
//! A list of hooks applies as a left fold: `[h1, h2, h3]` on `q` is
//! `h3(h2(h1(q)))`.
//!
//! List filters share one policy: an empty option list appends `FALSE`
//! with `AND`, so filtering by an empty set yields no rows instead of a
//! syntax error or an unfiltered query. This holds for the `OR` variants
//! too.

use super::builder::{Conjunction, Field, ListOp, Predicate, QueryBuilder, QueryKind, QueryOp};
use crate::models::{SqlValue, to_sql_values};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub struct QueryHook<B>(Arc<dyn Fn(B) -> B + Send + Sync>);

impl<B: 'static> QueryHook<B> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(B) -> B + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// The no-op hook.
    pub fn identity() -> Self {
        Self::new(|q| q)
    }

    pub fn apply(&self, query: B) -> B {
        (self.0)(query)
    }

    /// Run `self`, then `next`.
    pub fn then(self, next: QueryHook<B>) -> Self {
        Self::new(move |q| next.apply(self.apply(q)))
    }
}

impl<B> Clone for QueryHook<B> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<B: 'static> Default for QueryHook<B> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<B> fmt::Debug for QueryHook<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueryHook")
    }
}

pub fn empty_hook<B: 'static>() -> QueryHook<B> {
    QueryHook::identity()
}

/// Fold `query` through `hooks` in order.
pub fn apply_query_builder_hooks<B>(query: B, hooks: &[QueryHook<B>]) -> B {
    hooks.iter().fold(query, |q, hook| (hook.0)(q))
}

/// Compose `hooks` into a single hook.
pub fn apply_query_hooks<B: 'static>(hooks: Vec<QueryHook<B>>) -> QueryHook<B> {
    QueryHook::new(move |q| apply_query_builder_hooks(q, &hooks))
}

/// A hook that only touches SELECT queries and passes anything else through.
pub fn select_query_hook<B, F>(f: F) -> QueryHook<B>
where
    B: QueryBuilder + 'static,
    F: Fn(B) -> B + Send + Sync + 'static,
{
    QueryHook::new(move |q: B| {
        if q.kind() == QueryKind::Select {
            f(q)
        } else {
            q
        }
    })
}

/// `AND field <op> value`
pub fn where_hook<B>(field: impl Into<Field>, op: QueryOp, value: impl Into<SqlValue>) -> QueryHook<B>
where
    B: QueryBuilder + 'static,
{
    let field = field.into();
    let value = value.into();
    QueryHook::new(move |q: B| {
        q.and_where(Predicate::Compare {
            field: field.clone(),
            op,
            value: value.clone(),
        })
    })
}

fn list_hook<B>(
    conjunction: Conjunction,
    op: ListOp,
    field: Field,
    values: Vec<SqlValue>,
) -> QueryHook<B>
where
    B: QueryBuilder + 'static,
{
    QueryHook::new(move |q: B| {
        if values.is_empty() {
            return q.and_where(Predicate::False);
        }
        q.filter(
            conjunction,
            Predicate::List {
                field: field.clone(),
                op,
                values: values.clone(),
            },
        )
    })
}

/// `AND field IN (options)`, or `AND FALSE` when `options` is empty.
pub fn where_in_hook<B>(field: impl Into<Field>, options: Vec<SqlValue>) -> QueryHook<B>
where
    B: QueryBuilder + 'static,
{
    list_hook(Conjunction::And, ListOp::In, field.into(), options)
}

pub fn where_in_hook_t<B, T>(
    field: impl Into<Field>,
    options: impl IntoIterator<Item = T>,
) -> QueryHook<B>
where
    B: QueryBuilder + 'static,
    T: Into<SqlValue>,
{
    where_in_hook(field, to_sql_values(options))
}

/// `AND field NOT IN (options)`, or `AND FALSE` when `options` is empty.
pub fn where_not_in_hook<B, T>(
    field: impl Into<Field>,
    options: impl IntoIterator<Item = T>,
) -> QueryHook<B>
where
    B: QueryBuilder + 'static,
    T: Into<SqlValue>,
{
    list_hook(
        Conjunction::And,
        ListOp::NotIn,
        field.into(),
        to_sql_values(options),
    )
}

/// `AND` the array `field` overlaps `options`, or `AND FALSE` when `options` is empty.
pub fn where_overlap_hook_t<B, T>(
    field: impl Into<Field>,
    options: impl IntoIterator<Item = T>,
) -> QueryHook<B>
where
    B: QueryBuilder + 'static,
    T: Into<SqlValue>,
{
    list_hook(
        Conjunction::And,
        ListOp::Overlap,
        field.into(),
        to_sql_values(options),
    )
}

/// `OR field IN (options)`, or `AND FALSE` when `options` is empty.
pub fn where_or_in_hook<B>(field: impl Into<Field>, options: Vec<SqlValue>) -> QueryHook<B>
where
    B: QueryBuilder + 'static,
{
    list_hook(Conjunction::Or, ListOp::In, field.into(), options)
}

/// `OR` the array `field` overlaps `options`, or `AND FALSE` when `options` is empty.
pub fn where_or_overlap_hook<B>(field: impl Into<Field>, options: Vec<SqlValue>) -> QueryHook<B>
where
    B: QueryBuilder + 'static,
{
    list_hook(Conjunction::Or, ListOp::Overlap, field.into(), options)
}

pub fn where_or_overlap_hook_t<B, T>(
    field: impl Into<Field>,
    options: impl IntoIterator<Item = T>,
) -> QueryHook<B>
where
    B: QueryBuilder + 'static,
    T: Into<SqlValue>,
{
    where_or_overlap_hook(field, to_sql_values(options))
}

/// Apply `OFFSET`/`LIMIT` to SELECT queries. A zero limit leaves the query untouched.
pub fn paginate_hook<B>(offset: i64, limit: i64) -> QueryHook<B>
where
    B: QueryBuilder + 'static,
{
    select_query_hook(move |q: B| {
        if limit == 0 {
            return q;
        }
        q.offset(offset).limit(limit)
    })
}

/// Page-based pagination, pages start at 1.
///
/// `page <= 0` is not rejected and produces a negative offset.
pub fn paginate<B>(page: i64, per_page: i64) -> QueryHook<B>
where
    B: QueryBuilder + 'static,
{
    let offset = page.saturating_sub(1).saturating_mul(per_page);
    paginate_hook(offset, per_page)
}

/// Append `ORDER BY <key> <order>` to SELECT queries when `key` is non-empty.
///
/// `order` is passed through as given.
pub fn sort_hook<B>(key: impl Into<String>, order: impl Into<String>) -> QueryHook<B>
where
    B: QueryBuilder + 'static,
{
    let key = key.into();
    let order = order.into();
    select_query_hook(move |q: B| {
        if key.is_empty() {
            return q;
        }
        q.order_expr(format!("{} {}", key, order).trim_end().to_string())
    })
}

/// A sort request, typically decoded from API parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sort {
    pub sort_key: String,
    pub ascending: bool,
    pub case_insensitive: bool,
}

impl Sort {
    pub fn new(sort_key: impl Into<String>, ascending: bool) -> Self {
        Self {
            sort_key: sort_key.into(),
            ascending,
            case_insensitive: false,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    pub fn order(&self) -> &'static str {
        if self.ascending { "ASC" } else { "DESC" }
    }

    pub fn hook<B>(&self) -> QueryHook<B>
    where
        B: QueryBuilder + 'static,
    {
        let key = if self.case_insensitive && !self.sort_key.is_empty() {
            format!("LOWER({})", self.sort_key)
        } else {
            self.sort_key.clone()
        };
        sort_hook(key, self.order())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every builder call, no SQL involved.
    #[derive(Debug, Clone, PartialEq)]
    struct Recorder {
        kind: QueryKind,
        calls: Vec<String>,
        filters: Vec<(Conjunction, Predicate)>,
    }

    impl Recorder {
        fn new(kind: QueryKind) -> Self {
            Self {
                kind,
                calls: Vec::new(),
                filters: Vec::new(),
            }
        }
    }

    impl QueryBuilder for Recorder {
        fn kind(&self) -> QueryKind {
            self.kind
        }

        fn filter(mut self, conjunction: Conjunction, predicate: Predicate) -> Self {
            self.calls.push(format!("where:{}", conjunction.as_str()));
            self.filters.push((conjunction, predicate));
            self
        }

        fn offset(mut self, offset: i64) -> Self {
            self.calls.push(format!("offset:{offset}"));
            self
        }

        fn limit(mut self, limit: i64) -> Self {
            self.calls.push(format!("limit:{limit}"));
            self
        }

        fn order_expr(mut self, expr: String) -> Self {
            self.calls.push(format!("order:{expr}"));
            self
        }
    }

    fn select() -> Recorder {
        Recorder::new(QueryKind::Select)
    }

    #[test]
    fn test_identity_hook() {
        let q = QueryHook::identity().apply(select());
        assert_eq!(q, select());
        assert_eq!(empty_hook().apply(select()), select());
    }

    #[test]
    fn test_hooks_apply_in_order() {
        let hooks: Vec<QueryHook<Recorder>> = vec![
            sort_hook("name", "ASC"),
            paginate_hook(10, 5),
            where_hook("age", QueryOp::Gte, 18),
        ];
        let q = apply_query_builder_hooks(select(), &hooks);
        assert_eq!(
            q.calls,
            vec!["order:name ASC", "offset:10", "limit:5", "where:AND"]
        );
    }

    #[test]
    fn test_composition_is_associative() {
        let a = where_hook::<Recorder>("a", QueryOp::Eq, 1);
        let b = where_or_in_hook::<Recorder>("b", to_sql_values([2, 3]));
        let c = sort_hook::<Recorder>("c", "DESC");

        let nested = apply_query_hooks(vec![
            apply_query_hooks(vec![a.clone(), b.clone()]),
            c.clone(),
        ]);
        let flat = apply_query_hooks(vec![a.clone(), b.clone(), c.clone()]);
        let chained = a.then(b).then(c);

        assert_eq!(nested.apply(select()), flat.apply(select()));
        assert_eq!(chained.apply(select()), flat.apply(select()));
    }

    #[test]
    fn test_where_hook() {
        let q = where_hook("age", QueryOp::Lt, 30).apply(select());
        assert_eq!(
            q.filters,
            vec![(
                Conjunction::And,
                Predicate::Compare {
                    field: Field::Raw("age".to_string()),
                    op: QueryOp::Lt,
                    value: SqlValue::Int(30),
                }
            )]
        );
    }

    #[test]
    fn test_where_in_hook_with_options() {
        let q = where_in_hook_t("id", ["a", "b"]).apply(select());
        assert_eq!(
            q.filters,
            vec![(
                Conjunction::And,
                Predicate::List {
                    field: Field::Raw("id".to_string()),
                    op: ListOp::In,
                    values: vec![SqlValue::from("a"), SqlValue::from("b")],
                }
            )]
        );
    }

    #[test]
    fn test_empty_options_match_nothing() {
        let no_values: Vec<i64> = Vec::new();
        let hooks: Vec<QueryHook<Recorder>> = vec![
            where_in_hook("id", Vec::new()),
            where_in_hook_t("id", no_values.clone()),
            where_not_in_hook("id", no_values.clone()),
            where_overlap_hook_t("tags", no_values.clone()),
            where_or_in_hook("id", Vec::new()),
            where_or_overlap_hook("tags", Vec::new()),
            where_or_overlap_hook_t("tags", no_values),
        ];
        for hook in hooks {
            let q = hook.apply(select());
            assert_eq!(q.filters, vec![(Conjunction::And, Predicate::False)]);
        }
    }

    #[test]
    fn test_or_hooks_are_disjunctive() {
        let q = apply_query_builder_hooks(
            select(),
            &[
                where_hook("a", QueryOp::Eq, 1),
                where_or_in_hook("b", to_sql_values([1])),
                where_or_overlap_hook_t("tags", ["x"]),
            ],
        );
        let conjunctions: Vec<_> = q.filters.iter().map(|(c, _)| *c).collect();
        assert_eq!(
            conjunctions,
            vec![Conjunction::And, Conjunction::Or, Conjunction::Or]
        );
    }

    #[test]
    fn test_paginate() {
        let q = paginate(1, 20).apply(select());
        assert_eq!(q.calls, vec!["offset:0", "limit:20"]);

        let q = paginate(2, 20).apply(select());
        assert_eq!(q.calls, vec!["offset:20", "limit:20"]);

        // not validated
        let q = paginate(0, 20).apply(select());
        assert_eq!(q.calls, vec!["offset:-20", "limit:20"]);
    }

    #[test]
    fn test_paginate_zero_limit_is_noop() {
        let q = paginate_hook(40, 0).apply(select());
        assert!(q.calls.is_empty());
    }

    #[test]
    fn test_select_only_hooks_skip_other_queries() {
        let q = apply_query_builder_hooks(
            Recorder::new(QueryKind::Update),
            &[paginate(3, 10), sort_hook("name", "ASC")],
        );
        assert!(q.calls.is_empty());

        let q = where_hook("id", QueryOp::Eq, 1).apply(Recorder::new(QueryKind::Delete));
        assert_eq!(q.calls, vec!["where:AND"]);
    }

    #[test]
    fn test_sort_hook() {
        assert!(sort_hook("", "ASC").apply(select()).calls.is_empty());
        assert_eq!(
            sort_hook("created_at", "DESC").apply(select()).calls,
            vec!["order:created_at DESC"]
        );
        assert_eq!(
            sort_hook("created_at", "").apply(select()).calls,
            vec!["order:created_at"]
        );
    }

    #[test]
    fn test_sort_struct() {
        let q = Sort::new("name", true).hook().apply(select());
        assert_eq!(q.calls, vec!["order:name ASC"]);

        let q = Sort::new("name", false)
            .case_insensitive()
            .hook()
            .apply(select());
        assert_eq!(q.calls, vec!["order:LOWER(name) DESC"]);

        assert!(Sort::default().hook().apply(select()).calls.is_empty());
    }
}
