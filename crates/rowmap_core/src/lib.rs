//! Generic record mapping over locator-addressed row stores.
//! This crate is the single source of truth for the mapping contract.

pub mod logging;
pub mod mapper;
pub mod record;
pub mod store;

pub use logging::{default_log_level, init_logging, logging_status};
pub use mapper::{MapperError, MapperResult, RecordMapper};
pub use record::{apply_defaults, ColumnDef, ColumnKind, Record, RecordId, NOT_SAVED};
pub use store::{
    Locator, MemoryRowStore, RowCursor, RowStore, RowValues, Selection, SqliteRowStore,
    StoreError, StoreResult, WriteOp, WriteOutcome, COUNT_PROJECTION, ID_COLUMN,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
