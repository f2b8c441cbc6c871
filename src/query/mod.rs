//! Query-hook composition.
//!
//! This module provides:
//! - A dialect-free [`QueryBuilder`] trait and the predicates hooks append
//! - [`QueryHook`] transforms with fold/compose helpers
//! - Filter, pagination and sort hook constructors
//! - [`Query`], the concrete builder rendered to PostgreSQL

pub mod builder;
pub mod hook;
pub mod statement;

pub use builder::{Conjunction, Field, ListOp, Predicate, QueryBuilder, QueryKind, QueryOp};
pub use hook::{
    QueryHook, Sort, apply_query_builder_hooks, apply_query_hooks, empty_hook, paginate,
    paginate_hook, select_query_hook, sort_hook, where_hook, where_in_hook, where_in_hook_t,
    where_not_in_hook, where_or_in_hook, where_or_overlap_hook, where_or_overlap_hook_t,
    where_overlap_hook_t,
};
pub use statement::Query;
