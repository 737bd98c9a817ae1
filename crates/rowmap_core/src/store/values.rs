//! Column/value mappings handed to write operations.
//!
//! # Responsibility
//! - Carry one row worth of named scalar values between records and stores.
//! - Keep the bool-as-integer convention in one place.
//!
//! # Invariants
//! - Iteration order is column-name order, so generated SQL is deterministic.

use rusqlite::types::Value;
use std::collections::btree_map;
use std::collections::BTreeMap;

/// An ordered mapping from column name to scalar value.
///
/// Produced by record serialization and consumed by store writes; also the
/// per-row input of the cursor fixture adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowValues {
    values: BTreeMap<String, Value>,
}

impl RowValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a raw scalar under `column`, replacing any previous value.
    pub fn put(&mut self, column: impl Into<String>, value: Value) -> &mut Self {
        self.values.insert(column.into(), value);
        self
    }

    pub fn put_i64(&mut self, column: impl Into<String>, value: i64) -> &mut Self {
        self.put(column, Value::Integer(value))
    }

    pub fn put_f64(&mut self, column: impl Into<String>, value: f64) -> &mut Self {
        self.put(column, Value::Real(value))
    }

    pub fn put_text(&mut self, column: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.put(column, Value::Text(value.into()))
    }

    pub fn put_blob(&mut self, column: impl Into<String>, value: Vec<u8>) -> &mut Self {
        self.put(column, Value::Blob(value))
    }

    /// Stores a bool as integer `0`/`1`.
    pub fn put_bool(&mut self, column: impl Into<String>, value: bool) -> &mut Self {
        self.put(column, Value::Integer(bool_to_int(value)))
    }

    pub fn put_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.put(column, Value::Null)
    }

    /// Stores `Some` as integer, `None` as SQL null.
    pub fn put_opt_i64(&mut self, column: impl Into<String>, value: Option<i64>) -> &mut Self {
        match value {
            Some(value) => self.put_i64(column, value),
            None => self.put_null(column),
        }
    }

    /// Stores `Some` as text, `None` as SQL null.
    pub fn put_opt_text(&mut self, column: impl Into<String>, value: Option<&str>) -> &mut Self {
        match value {
            Some(value) => self.put_text(column, value),
            None => self.put_null(column),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.values.remove(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates `(column, value)` pairs in column-name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.values.iter()
    }

    /// Column names in iteration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }
}

impl<'a> IntoIterator for &'a RowValues {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::RowValues;
    use rusqlite::types::Value;

    #[test]
    fn put_replaces_existing_value() {
        let mut values = RowValues::new();
        values.put_text("title", "draft");
        values.put_text("title", "final");
        assert_eq!(values.len(), 1);
        assert_eq!(values.get("title"), Some(&Value::Text("final".to_string())));
    }

    #[test]
    fn bool_and_option_helpers_store_expected_scalars() {
        let mut values = RowValues::new();
        values.put_bool("done", true);
        values.put_opt_i64("due", None);
        values.put_opt_text("note", Some("soon"));
        assert_eq!(values.get("done"), Some(&Value::Integer(1)));
        assert_eq!(values.get("due"), Some(&Value::Null));
        assert_eq!(values.get("note"), Some(&Value::Text("soon".to_string())));
    }

    #[test]
    fn iteration_is_in_column_name_order() {
        let mut values = RowValues::new();
        values.put_i64("zeta", 1);
        values.put_i64("alpha", 2);
        assert_eq!(values.column_names(), vec!["alpha", "zeta"]);
    }
}
