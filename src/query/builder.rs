//! Dialect-free query builder abstraction.
//!
//! Hooks only ever talk to the [`QueryBuilder`] trait, so they can be applied
//! to the concrete [`Query`](super::Query) or to any in-memory stand-in.

use crate::models::{ColumnName, Ident, SqlValue};
use std::fmt;

/// Comparison operators accepted by [`where_hook`](super::where_hook).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl QueryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }
}

impl fmt::Display for QueryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Left-hand side of a predicate.
///
/// `&str` and `String` convert to [`Field::Raw`] and are emitted verbatim;
/// identifiers and column names are quoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Ident(Ident),
    Raw(String),
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(ident) => write!(f, "{}", ident),
            Self::Raw(raw) => f.write_str(raw),
        }
    }
}

impl From<Ident> for Field {
    fn from(value: Ident) -> Self {
        Self::Ident(value)
    }
}

/// Column names are qualified with their table.
impl From<&ColumnName> for Field {
    fn from(value: &ColumnName) -> Self {
        Self::Ident(value.with_table())
    }
}

impl From<ColumnName> for Field {
    fn from(value: ColumnName) -> Self {
        Self::from(&value)
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Self::Raw(value.to_string())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Self::Raw(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListOp {
    /// `field IN (...)`
    In,
    /// `field NOT IN (...)`
    NotIn,
    /// The array column shares at least one element with the options.
    Overlap,
}

/// A single `WHERE` condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: Field,
        op: QueryOp,
        value: SqlValue,
    },
    List {
        field: Field,
        op: ListOp,
        values: Vec<SqlValue>,
    },
    /// Matches nothing.
    False,
    /// Emitted verbatim, for conditions the hooks cannot express.
    ///
    /// Nothing is escaped or bound; never build one from user input.
    Raw(String),
}

/// How a condition joins the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Select,
    Update,
    Delete,
}

/// In-progress query state that hooks transform.
pub trait QueryBuilder: Sized {
    fn kind(&self) -> QueryKind;

    fn filter(self, conjunction: Conjunction, predicate: Predicate) -> Self;

    fn offset(self, offset: i64) -> Self;

    fn limit(self, limit: i64) -> Self;

    /// Append an `ORDER BY` expression.
    fn order_expr(self, expr: String) -> Self;

    fn and_where(self, predicate: Predicate) -> Self {
        self.filter(Conjunction::And, predicate)
    }

    fn or_where(self, predicate: Predicate) -> Self {
        self.filter(Conjunction::Or, predicate)
    }
}
