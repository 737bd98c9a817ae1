//! Record lifecycle contract.
//!
//! # Responsibility
//! - Define the shape every mapped type satisfies: identity, blank
//!   construction, serialization, restoration.
//! - Pin the unsaved-identity sentinel in one place.
//!
//! # Invariants
//! - `is_saved()` is a pure function of the identity.
//! - A record's identity is assigned exactly once, by the create path.
//!
//! # See also
//! - `crate::mapper`

use crate::store::cursor::RowCursor;
use crate::store::values::RowValues;
use crate::store::StoreResult;

pub mod column;

pub use column::{apply_defaults, ColumnDef, ColumnKind};

/// Row identity assigned by a store on create.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type RecordId = i64;

/// Identity of a record that has never been persisted.
pub const NOT_SAVED: RecordId = -1;

/// Contract every mapped record type satisfies.
///
/// Implementations serialize themselves into [`RowValues`] and restore
/// themselves from a positioned [`RowCursor`]; the mapper owns identity
/// handling on both paths.
pub trait Record: Sized {
    /// Persisted columns, identity excluded. May be empty.
    const COLUMNS: &'static [ColumnDef] = &[];

    /// A fresh, unsaved instance with identity [`NOT_SAVED`].
    fn blank() -> Self;

    fn id(&self) -> RecordId;

    /// Assigns the identity. Called by the mapper when a create succeeds
    /// and when rows are materialized; not intended for other callers.
    fn set_id(&mut self, id: RecordId);

    /// Serializes every persisted field, identity excluded.
    fn to_values(&self) -> RowValues;

    /// Restores persisted fields from the cursor's current row by column
    /// name. The identity is already assigned when this runs.
    fn restore(&mut self, row: &RowCursor) -> StoreResult<()>;

    /// Whether this record has been persisted.
    fn is_saved(&self) -> bool {
        self.id() != NOT_SAVED
    }
}
