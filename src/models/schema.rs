//! Shared record shape and SQL identifier helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Columns every persisted entity carries.
///
/// Embed it with `#[sqlx(flatten)]` / `#[serde(flatten)]` in entity rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BaseRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BaseRecord {
    /// A fresh record with a random id, created and updated now.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump `updated_at` before an update is written.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for BaseRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// A SQL identifier, quoted per dotted segment when rendered.
///
/// `users.id` renders as `"users"."id"`; a `*` segment is left bare.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw, unquoted identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.split('.').enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            if segment == "*" {
                f.write_str("*")?;
            } else {
                write!(f, "\"{}\"", segment.replace('"', "\"\""))?;
            }
        }
        Ok(())
    }
}

impl From<&str> for Ident {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Ident {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn ident(&self) -> Ident {
        Ident::new(self.0.clone())
    }

    /// `table.*`
    pub fn all(&self) -> ColumnName {
        ColumnName::new(self.clone(), "*")
    }

    pub fn column(&self, name: impl Into<String>) -> ColumnName {
        ColumnName::new(self.clone(), name)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TableName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A column bound to the table it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnName {
    value: String,
    table: TableName,
}

impl ColumnName {
    pub fn new(table: TableName, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            table,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Unqualified identifier.
    pub fn ident(&self) -> Ident {
        Ident::new(self.value.clone())
    }

    /// Identifier qualified with the owning table.
    pub fn with_table(&self) -> Ident {
        self.with_custom_table(&self.table)
    }

    /// Identifier qualified with another table name or alias.
    pub fn with_custom_table(&self, table: &TableName) -> Ident {
        Ident::new(format!("{}.{}", table.as_str(), self.value))
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_quoting() {
        assert_eq!(Ident::new("id").to_string(), "\"id\"");
        assert_eq!(Ident::new("users.id").to_string(), "\"users\".\"id\"");
        assert_eq!(Ident::new("users.*").to_string(), "\"users\".*");
        assert_eq!(Ident::new("we\"ird").to_string(), "\"we\"\"ird\"");
    }

    #[test]
    fn test_column_names() {
        let users = TableName::new("users");
        let email = users.column("email");
        assert_eq!(email.to_string(), "email");
        assert_eq!(email.ident().to_string(), "\"email\"");
        assert_eq!(email.with_table().to_string(), "\"users\".\"email\"");
        assert_eq!(
            email.with_custom_table(&TableName::new("u")).to_string(),
            "\"u\".\"email\""
        );
        assert_eq!(users.all().with_table().to_string(), "\"users\".*");
    }

    #[test]
    fn test_base_record_touch() {
        let mut record = BaseRecord::new();
        assert_eq!(record.created_at, record.updated_at);
        let created = record.created_at;
        record.touch();
        assert!(record.updated_at >= created);
        assert_eq!(record.created_at, created);
    }

    #[test]
    fn test_base_record_serializes_id_as_underscore_id() {
        let record = BaseRecord::new();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["_id"], record.id.to_string());
        assert!(json.get("id").is_none());
    }
}
