//! Owned result cursors.
//!
//! # Responsibility
//! - Hold a fully materialized query result: named columns plus scalar rows.
//! - Provide positioned, typed access for record restoration.
//! - Build fixture cursors from column/value mappings.
//!
//! # Invariants
//! - A cursor owns its rows; dropping it releases everything it holds.
//! - The position starts before the first row and can pass the end.
//! - Typed getters reject wrong storage classes instead of coercing them.

use super::values::RowValues;
use super::{StoreError, StoreResult};
use rusqlite::types::Value;

/// Positioned, column-named grid of scalar rows.
///
/// Returned by every store query. Also constructible in tests and fixtures
/// via [`RowCursor::new`] / [`RowCursor::from_values`].
#[derive(Debug, Clone)]
pub struct RowCursor {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    // 0 = before the first row, `pos - 1` indexes rows, len + 1 = past the end.
    pos: usize,
}

impl RowCursor {
    /// Creates an empty cursor with the given column list.
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|name| name.to_string()).collect(),
            rows: Vec::new(),
            pos: 0,
        }
    }

    pub(crate) fn from_parts(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            pos: 0,
        }
    }

    /// Appends one row of scalars.
    ///
    /// # Errors
    /// - `InvalidData` when the row length does not match the column list.
    pub fn add_row(&mut self, row: Vec<Value>) -> StoreResult<()> {
        if row.len() != self.columns.len() {
            return Err(StoreError::InvalidData(format!(
                "row has {} values but the cursor has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Builds a cursor from an explicit column list and one mapping per row.
    ///
    /// Every mapping must contain every listed column; extra keys in a
    /// mapping are ignored, a projection is what the column list says.
    ///
    /// # Errors
    /// - `NoSuchColumn` when a mapping is missing a listed column.
    pub fn from_values(columns: &[&str], records: &[RowValues]) -> StoreResult<Self> {
        let mut cursor = Self::new(columns);
        for record in records {
            let mut row = Vec::with_capacity(columns.len());
            for column in columns {
                let value = record.get(column).cloned().ok_or_else(|| {
                    StoreError::NoSuchColumn {
                        column: (*column).to_string(),
                    }
                })?;
                row.push(value);
            }
            cursor.add_row(row)?;
        }
        Ok(cursor)
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Moves to the first row. Returns `false` when the cursor is empty.
    pub fn move_to_first(&mut self) -> bool {
        self.pos = 1;
        !self.rows.is_empty()
    }

    /// Advances one row. Returns `false` once the position passes the end.
    ///
    /// Calling this on a fresh cursor lands on the first row.
    pub fn move_to_next(&mut self) -> bool {
        if self.pos <= self.rows.len() {
            self.pos += 1;
        }
        self.pos <= self.rows.len()
    }

    /// Raw scalar at a positional index of the current row.
    ///
    /// # Errors
    /// - `InvalidData` when the cursor is not positioned on a row.
    /// - `NoSuchColumn` when `index` is out of range.
    pub fn value_at(&self, index: usize) -> StoreResult<&Value> {
        let row = self.current_row()?;
        row.get(index).ok_or_else(|| StoreError::NoSuchColumn {
            column: format!("#{index}"),
        })
    }

    /// Integer at a positional index, used for the identity column.
    pub fn i64_at(&self, index: usize) -> StoreResult<i64> {
        match self.value_at(index)? {
            Value::Integer(value) => Ok(*value),
            _ => Err(self.type_error_at(index, "integer")),
        }
    }

    /// Raw scalar of the current row by column name.
    pub fn value(&self, column: &str) -> StoreResult<&Value> {
        let index = self.column_index(column)?;
        let row = self.current_row()?;
        Ok(&row[index])
    }

    pub fn get_i64(&self, column: &str) -> StoreResult<i64> {
        match self.value(column)? {
            Value::Integer(value) => Ok(*value),
            _ => Err(type_error(column, "integer")),
        }
    }

    /// Real by column name; integers widen, matching SQLite numeric reads.
    pub fn get_f64(&self, column: &str) -> StoreResult<f64> {
        match self.value(column)? {
            Value::Real(value) => Ok(*value),
            Value::Integer(value) => Ok(*value as f64),
            _ => Err(type_error(column, "real")),
        }
    }

    pub fn get_text(&self, column: &str) -> StoreResult<String> {
        match self.value(column)? {
            Value::Text(value) => Ok(value.clone()),
            _ => Err(type_error(column, "text")),
        }
    }

    pub fn get_blob(&self, column: &str) -> StoreResult<Vec<u8>> {
        match self.value(column)? {
            Value::Blob(value) => Ok(value.clone()),
            _ => Err(type_error(column, "blob")),
        }
    }

    /// Bool stored as integer `0`/`1`.
    ///
    /// # Errors
    /// - `InvalidData` for any other integer value.
    pub fn get_bool(&self, column: &str) -> StoreResult<bool> {
        match self.get_i64(column)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StoreError::InvalidData(format!(
                "invalid bool value `{other}` in column `{column}`"
            ))),
        }
    }

    pub fn opt_i64(&self, column: &str) -> StoreResult<Option<i64>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Integer(value) => Ok(Some(*value)),
            _ => Err(type_error(column, "integer")),
        }
    }

    pub fn opt_f64(&self, column: &str) -> StoreResult<Option<f64>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Real(value) => Ok(Some(*value)),
            Value::Integer(value) => Ok(Some(*value as f64)),
            _ => Err(type_error(column, "real")),
        }
    }

    pub fn opt_text(&self, column: &str) -> StoreResult<Option<String>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Text(value) => Ok(Some(value.clone())),
            _ => Err(type_error(column, "text")),
        }
    }

    pub fn opt_blob(&self, column: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Blob(value) => Ok(Some(value.clone())),
            _ => Err(type_error(column, "blob")),
        }
    }

    fn column_index(&self, column: &str) -> StoreResult<usize> {
        self.columns
            .iter()
            .position(|name| name == column)
            .ok_or_else(|| StoreError::NoSuchColumn {
                column: column.to_string(),
            })
    }

    fn current_row(&self) -> StoreResult<&[Value]> {
        if self.pos == 0 || self.pos > self.rows.len() {
            return Err(StoreError::InvalidData(
                "cursor is not positioned on a row".to_string(),
            ));
        }
        Ok(&self.rows[self.pos - 1])
    }

    fn type_error_at(&self, index: usize, expected: &'static str) -> StoreError {
        let column = self
            .columns
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("#{index}"));
        StoreError::ColumnType { column, expected }
    }
}

fn type_error(column: &str, expected: &'static str) -> StoreError {
    StoreError::ColumnType {
        column: column.to_string(),
        expected,
    }
}
