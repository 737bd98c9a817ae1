//! Batch write vocabulary.
//!
//! # Responsibility
//! - Describe inserts, updates, and deletes that travel together in one
//!   atomic batch.
//! - Pair filter clauses with their bound arguments.

use super::locator::Locator;
use super::values::RowValues;
use super::ID_COLUMN;
use rusqlite::types::Value;

/// A filter clause plus its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub clause: String,
    pub args: Vec<Value>,
}

impl Selection {
    pub fn new(clause: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            clause: clause.into(),
            args,
        }
    }

    /// Selects exactly one row by id.
    pub fn by_id(id: i64) -> Self {
        Self {
            clause: format!("{ID_COLUMN} = ?"),
            args: vec![Value::Integer(id)],
        }
    }
}

/// One write in a batch, addressed to a locator.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert {
        locator: Locator,
        values: RowValues,
    },
    Update {
        locator: Locator,
        values: RowValues,
        filter: Option<Selection>,
    },
    Delete {
        locator: Locator,
        filter: Option<Selection>,
    },
}

impl WriteOp {
    /// The locator this operation is addressed to.
    pub fn locator(&self) -> &Locator {
        match self {
            Self::Insert { locator, .. } => locator,
            Self::Update { locator, .. } => locator,
            Self::Delete { locator, .. } => locator,
        }
    }
}

/// Per-operation result of a successful batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// An insert happened; carries the generated row locator.
    Created(Locator),
    /// An update or delete happened; carries the affected-row count.
    Affected(usize),
}

pub(crate) fn split_selection(filter: &Option<Selection>) -> (Option<&str>, &[Value]) {
    match filter {
        Some(selection) => (Some(selection.clause.as_str()), selection.args.as_slice()),
        None => (None, &[]),
    }
}
