//! Row store contract and implementations.
//!
//! # Responsibility
//! - Define the locator-addressed storage interface the mapper runs on.
//! - Keep store-level failure modes in one error type.
//!
//! # Invariants
//! - Query results come back as owned cursors; no store resource outlives a
//!   call.
//! - `apply_batch` is all-or-nothing: a rejected batch changes nothing.
//!
//! # See also
//! - `crate::mapper`

use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod cursor;
pub mod locator;
pub mod memory;
pub mod op;
pub mod sqlite;
pub mod values;

pub use cursor::RowCursor;
pub use locator::Locator;
pub use memory::MemoryRowStore;
pub use op::{Selection, WriteOp, WriteOutcome};
pub use sqlite::SqliteRowStore;
pub use values::RowValues;

/// Name of the identity column every mapped table carries.
pub const ID_COLUMN: &str = "_id";

/// Projection that asks a store for a row count instead of row data.
///
/// The result is a single row whose single column holds the count.
pub const COUNT_PROJECTION: &[&str] = &["COUNT(*)"];

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure modes shared by every row store implementation.
#[derive(Debug)]
pub enum StoreError {
    /// No store can service the locator: wrong authority or missing table.
    Unavailable { locator: String },
    Sqlite(rusqlite::Error),
    /// A batch was rejected; nothing was applied. `index` names the
    /// operation that failed.
    BatchRejected { index: usize, reason: String },
    NoSuchColumn { column: String },
    ColumnType {
        column: String,
        expected: &'static str,
    },
    /// Malformed persisted data or arguments a store refuses to act on.
    InvalidData(String),
    /// The store met an expression it does not evaluate.
    Unsupported { feature: String },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable { locator } => {
                write!(f, "no row store available for `{locator}`")
            }
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::BatchRejected { index, reason } => {
                write!(f, "batch rejected at operation {index}: {reason}")
            }
            Self::NoSuchColumn { column } => write!(f, "no such column `{column}`"),
            Self::ColumnType { column, expected } => {
                write!(f, "column `{column}` does not hold {expected} data")
            }
            Self::InvalidData(message) => write!(f, "invalid row data: {message}"),
            Self::Unsupported { feature } => {
                write!(f, "unsupported store expression: {feature}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

// Bare SQL identifier: ASCII alphanumeric plus underscore, no leading digit.
pub(crate) fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Locator-addressed row storage.
///
/// # Contract
/// - `query` returns an owned cursor positioned before its first row.
/// - `insert` returns the created row's locator; an already row-narrowed
///   locator is rejected as `InvalidData`.
/// - `update`/`delete` return affected-row counts; zero is a valid result.
///   Update values must not include the identity column.
/// - `apply_batch` applies in submission order inside one atomic unit and
///   reports rejection as `BatchRejected` with the failing index. Every
///   operation's locator must match `authority`.
/// - Filter clauses and projections are trusted SQL fragments supplied by
///   the caller; arguments are always bound, never spliced.
pub trait RowStore {
    fn query(
        &self,
        locator: &Locator,
        columns: Option<&[&str]>,
        filter: Option<&str>,
        args: &[Value],
        order_by: Option<&str>,
    ) -> StoreResult<RowCursor>;

    fn insert(&mut self, locator: &Locator, values: &RowValues) -> StoreResult<Locator>;

    fn update(
        &mut self,
        locator: &Locator,
        values: &RowValues,
        filter: Option<&str>,
        args: &[Value],
    ) -> StoreResult<usize>;

    fn delete(
        &mut self,
        locator: &Locator,
        filter: Option<&str>,
        args: &[Value],
    ) -> StoreResult<usize>;

    fn apply_batch(&mut self, authority: &str, ops: Vec<WriteOp>) -> StoreResult<Vec<WriteOutcome>>;
}
