//! Row store addressing.
//!
//! # Responsibility
//! - Name a table within a store, optionally narrowed to one row.
//! - Keep address formatting in one place.
//!
//! # Invariants
//! - A locator never changes after construction; narrowing clones.

use std::fmt::{Display, Formatter};

/// Address of a table (or a single row) inside a row store.
///
/// Rendered as `row://authority/table` or `row://authority/table/id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    authority: String,
    table: String,
    row_id: Option<i64>,
}

impl Locator {
    /// Creates a table-level locator.
    pub fn table(authority: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            table: table.into(),
            row_id: None,
        }
    }

    /// Returns a copy of this locator narrowed to one row id.
    ///
    /// Narrowing an already narrowed locator replaces the row id.
    pub fn for_row(&self, id: i64) -> Self {
        Self {
            authority: self.authority.clone(),
            table: self.table.clone(),
            row_id: Some(id),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Row id this locator is narrowed to, if any.
    pub fn row_id(&self) -> Option<i64> {
        self.row_id
    }
}

impl Display for Locator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.row_id {
            Some(id) => write!(f, "row://{}/{}/{id}", self.authority, self.table),
            None => write!(f, "row://{}/{}", self.authority, self.table),
        }
    }
}
