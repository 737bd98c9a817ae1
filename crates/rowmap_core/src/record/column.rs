//! Declarative column metadata.
//!
//! # Responsibility
//! - Describe one persisted field per definition: name, storage class,
//!   default, constraints.
//! - Fill declared defaults into outgoing values before a create.
//!
//! # Invariants
//! - Definitions are pure data; nothing here touches a store.
//! - A default is applied only when the column is absent, a stored null is
//!   left alone.

use crate::store::values::RowValues;
use crate::store::{StoreError, StoreResult};
use rusqlite::types::Value;

/// Storage class a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
    Blob,
}

/// Description of one persisted column.
///
/// Built in const context so record types can pin their column list as an
/// associated constant:
///
/// ```
/// use rowmap_core::{ColumnDef, ColumnKind};
///
/// const COLUMNS: &[ColumnDef] = &[
///     ColumnDef::new("title", ColumnKind::Text).not_null(),
///     ColumnDef::new("rank", ColumnKind::Integer).default_value("0"),
/// ];
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub default_value: Option<&'static str>,
    pub not_null: bool,
    pub unique: bool,
}

impl ColumnDef {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            default_value: None,
            not_null: false,
            unique: false,
        }
    }

    pub const fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Declares a default, stored textually and coerced by `kind` when
    /// applied.
    pub const fn default_value(mut self, value: &'static str) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// Fills declared defaults into `values` for every absent defaulted column.
///
/// # Errors
/// - `InvalidData` when a numeric default does not parse as its kind.
pub fn apply_defaults(columns: &[ColumnDef], values: &mut RowValues) -> StoreResult<()> {
    for column in columns {
        let Some(default) = column.default_value else {
            continue;
        };
        if values.contains(column.name) {
            continue;
        }
        values.put(column.name, default_scalar(column, default)?);
    }
    Ok(())
}

fn default_scalar(column: &ColumnDef, default: &str) -> StoreResult<Value> {
    match column.kind {
        ColumnKind::Integer => default.parse::<i64>().map(Value::Integer).map_err(|_| {
            StoreError::InvalidData(format!(
                "default `{default}` for column `{}` is not an integer",
                column.name
            ))
        }),
        ColumnKind::Real => default.parse::<f64>().map(Value::Real).map_err(|_| {
            StoreError::InvalidData(format!(
                "default `{default}` for column `{}` is not a real",
                column.name
            ))
        }),
        ColumnKind::Text => Ok(Value::Text(default.to_string())),
        // Blob defaults are the literal UTF-8 bytes of the declared text.
        ColumnKind::Blob => Ok(Value::Blob(default.as_bytes().to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_defaults, ColumnDef, ColumnKind};
    use crate::store::values::RowValues;
    use crate::store::StoreError;
    use rusqlite::types::Value;

    const COLUMNS: &[ColumnDef] = &[
        ColumnDef::new("title", ColumnKind::Text).not_null(),
        ColumnDef::new("rank", ColumnKind::Integer).default_value("5"),
        ColumnDef::new("tag", ColumnKind::Text).default_value("none").unique(),
    ];

    #[test]
    fn const_builders_set_flags() {
        assert!(COLUMNS[0].not_null);
        assert!(!COLUMNS[0].unique);
        assert!(COLUMNS[2].unique);
        assert_eq!(COLUMNS[1].default_value, Some("5"));
    }

    #[test]
    fn defaults_fill_only_absent_columns() {
        let mut values = RowValues::new();
        values.put_text("title", "kept");
        values.put_i64("rank", 9);
        apply_defaults(COLUMNS, &mut values).unwrap();

        assert_eq!(values.get("rank"), Some(&Value::Integer(9)));
        assert_eq!(values.get("tag"), Some(&Value::Text("none".to_string())));
        // No default declared for title, nothing synthesized.
        assert_eq!(values.get("title"), Some(&Value::Text("kept".to_string())));
    }

    #[test]
    fn null_is_not_replaced_by_a_default() {
        let mut values = RowValues::new();
        values.put_null("rank");
        apply_defaults(COLUMNS, &mut values).unwrap();
        assert_eq!(values.get("rank"), Some(&Value::Null));
    }

    #[test]
    fn unparseable_numeric_default_is_rejected() {
        const BROKEN: &[ColumnDef] =
            &[ColumnDef::new("rank", ColumnKind::Integer).default_value("soon")];
        let mut values = RowValues::new();
        let err = apply_defaults(BROKEN, &mut values).unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
    }
}
