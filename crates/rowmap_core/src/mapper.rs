//! Record mapping and CRUD facade.
//!
//! # Responsibility
//! - Translate typed record operations into row store requests.
//! - Materialize rows back into records through the `Record` contract.
//! - Enforce the saved/unsaved lifecycle before any store call.
//!
//! # Invariants
//! - Read misses return `None`/empty, never errors.
//! - Batch variants submit one atomic batch; a rejected batch surfaces as
//!   an error and assigns no identities.
//! - Every returned cursor is fully consumed before a call returns.
//!
//! # See also
//! - `crate::store`
//! - `crate::record`

use crate::record::{apply_defaults, Record, RecordId, NOT_SAVED};
use crate::store::{
    Locator, RowCursor, RowStore, RowValues, Selection, StoreError, WriteOp, WriteOutcome,
    COUNT_PROJECTION,
};
use rusqlite::types::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type MapperResult<T> = Result<T, MapperError>;

/// Facade-level error for record mapping operations.
#[derive(Debug)]
pub enum MapperError {
    /// A create was attempted on a record that already has an identity.
    AlreadySaved(RecordId),
    /// An identity-addressed operation was attempted on an unsaved record.
    NotSaved,
    Store(StoreError),
}

impl Display for MapperError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadySaved(id) => write!(f, "record is already saved (id {id})"),
            Self::NotSaved => write!(f, "record has not been saved yet"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MapperError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for MapperError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Generic CRUD facade over any [`RowStore`].
///
/// Owns its store; substituting a fixture or double is just constructing
/// the mapper with a different store value.
pub struct RecordMapper<S: RowStore> {
    store: S,
}

impl<S: RowStore> RecordMapper<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Fetches one record by identity.
    ///
    /// Returns `Ok(None)` when no row has that identity.
    pub fn find_by_id<T: Record>(
        &self,
        locator: &Locator,
        id: RecordId,
    ) -> MapperResult<Option<T>> {
        let mut cursor = self
            .store
            .query(&locator.for_row(id), None, None, &[], None)?;
        if !cursor.move_to_first() {
            return Ok(None);
        }
        Ok(Some(materialize(&cursor)?))
    }

    /// Fetches every record under the locator.
    pub fn find_all<T: Record>(&self, locator: &Locator) -> MapperResult<Vec<T>> {
        self.find(locator, None, &[], None)
    }

    /// Fetches records matching a filter, optionally ordered.
    ///
    /// No matches is an empty vec, not an error.
    pub fn find<T: Record>(
        &self,
        locator: &Locator,
        filter: Option<&str>,
        args: &[Value],
        order_by: Option<&str>,
    ) -> MapperResult<Vec<T>> {
        let mut cursor = self.store.query(locator, None, filter, args, order_by)?;
        let mut records = Vec::with_capacity(cursor.row_count());
        while cursor.move_to_next() {
            records.push(materialize(&cursor)?);
        }
        Ok(records)
    }

    /// Fetches the first record matching a filter, in the given order.
    ///
    /// Only that row is materialized into a record.
    pub fn find_first<T: Record>(
        &self,
        locator: &Locator,
        filter: Option<&str>,
        args: &[Value],
        order_by: Option<&str>,
    ) -> MapperResult<Option<T>> {
        let mut cursor = self.store.query(locator, None, filter, args, order_by)?;
        if !cursor.move_to_first() {
            return Ok(None);
        }
        Ok(Some(materialize(&cursor)?))
    }

    /// Counts every row under the locator.
    pub fn count(&self, locator: &Locator) -> MapperResult<i64> {
        self.count_where(locator, None, &[])
    }

    /// Counts rows matching a filter.
    ///
    /// # Contract
    /// - A count result with no row is 0.
    /// - A count row whose first column is not an integer is invalid
    ///   persisted state and reported as an error, never as 0.
    pub fn count_where(
        &self,
        locator: &Locator,
        filter: Option<&str>,
        args: &[Value],
    ) -> MapperResult<i64> {
        let mut cursor = self
            .store
            .query(locator, Some(COUNT_PROJECTION), filter, args, None)?;
        if !cursor.move_to_first() {
            return Ok(0);
        }
        match cursor.value_at(0)? {
            Value::Integer(count) => Ok(*count),
            other => Err(MapperError::Store(StoreError::InvalidData(format!(
                "count query returned non-integer value {other:?}"
            )))),
        }
    }

    /// Creates one record and assigns its generated identity.
    ///
    /// # Contract
    /// - The record must be unsaved; `AlreadySaved` otherwise, with no
    ///   store call made.
    /// - Declared column defaults fill any absent defaulted columns.
    /// - On success the generated id is written onto `record` and the
    ///   created row's locator is returned.
    pub fn save<T: Record>(&mut self, locator: &Locator, record: &mut T) -> MapperResult<Locator> {
        if record.is_saved() {
            return Err(MapperError::AlreadySaved(record.id()));
        }
        let mut values = record.to_values();
        apply_defaults(T::COLUMNS, &mut values)?;
        let created = self.store.insert(locator, &values)?;
        record.set_id(created_id(&created)?);
        Ok(created)
    }

    /// Creates many records in one atomic batch.
    ///
    /// # Contract
    /// - An empty slice returns `Ok(vec![])` without contacting the store.
    /// - Every record must be unsaved before any store call happens.
    /// - All-or-nothing: a rejected batch is an error, assigns no
    ///   identities, and leaves the store unchanged.
    /// - On success, generated locators come back in input order and each
    ///   record receives its id.
    pub fn save_all<T: Record>(
        &mut self,
        locator: &Locator,
        records: &mut [T],
    ) -> MapperResult<Vec<Locator>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        for record in records.iter() {
            if record.is_saved() {
                return Err(MapperError::AlreadySaved(record.id()));
            }
        }

        let mut ops = Vec::with_capacity(records.len());
        for record in records.iter() {
            let mut values = record.to_values();
            apply_defaults(T::COLUMNS, &mut values)?;
            ops.push(WriteOp::Insert {
                locator: locator.clone(),
                values,
            });
        }

        let outcomes = self.store.apply_batch(locator.authority(), ops)?;
        if outcomes.len() != records.len() {
            return Err(unexpected_outcome("wrong outcome count for batch insert"));
        }

        let mut created = Vec::with_capacity(outcomes.len());
        for (record, outcome) in records.iter_mut().zip(outcomes) {
            match outcome {
                WriteOutcome::Created(row) => {
                    record.set_id(created_id(&row)?);
                    created.push(row);
                }
                WriteOutcome::Affected(_) => {
                    return Err(unexpected_outcome("insert reported an affected count"));
                }
            }
        }
        Ok(created)
    }

    /// Writes a saved record's fields back to its row.
    ///
    /// # Contract
    /// - The record must be saved; `NotSaved` otherwise, with no store
    ///   call made.
    pub fn update<T: Record>(&mut self, locator: &Locator, record: &T) -> MapperResult<usize> {
        if !record.is_saved() {
            return Err(MapperError::NotSaved);
        }
        let values = record.to_values();
        Ok(self
            .store
            .update(&locator.for_row(record.id()), &values, None, &[])?)
    }

    /// Updates one row by identity with explicit values.
    ///
    /// A missing row is 0 affected rows, not an error.
    pub fn update_by_id(
        &mut self,
        locator: &Locator,
        id: RecordId,
        values: &RowValues,
    ) -> MapperResult<usize> {
        if id == NOT_SAVED {
            return Err(MapperError::NotSaved);
        }
        Ok(self.store.update(&locator.for_row(id), values, None, &[])?)
    }

    /// Updates every row matching a filter with the same values.
    pub fn update_where(
        &mut self,
        locator: &Locator,
        filter: Option<&str>,
        args: &[Value],
        values: &RowValues,
    ) -> MapperResult<usize> {
        Ok(self.store.update(locator, values, filter, args)?)
    }

    /// Applies per-row values in one atomic batch, ascending id order.
    ///
    /// Returns the number of operations applied; an empty map is 0 without
    /// contacting the store. A rejected batch is an error, not 0.
    pub fn update_each(
        &mut self,
        locator: &Locator,
        changes: &BTreeMap<RecordId, RowValues>,
    ) -> MapperResult<usize> {
        if changes.is_empty() {
            return Ok(0);
        }
        let ops: Vec<WriteOp> = changes
            .iter()
            .map(|(&id, values)| WriteOp::Update {
                locator: locator.clone(),
                values: values.clone(),
                filter: Some(Selection::by_id(id)),
            })
            .collect();
        let outcomes = self.store.apply_batch(locator.authority(), ops)?;
        Ok(outcomes.len())
    }

    /// Deletes one row by identity. A missing row is 0, not an error.
    pub fn delete_by_id(&mut self, locator: &Locator, id: RecordId) -> MapperResult<usize> {
        Ok(self.store.delete(&locator.for_row(id), None, &[])?)
    }

    /// Deletes every row matching a filter.
    pub fn delete_where(
        &mut self,
        locator: &Locator,
        filter: Option<&str>,
        args: &[Value],
    ) -> MapperResult<usize> {
        Ok(self.store.delete(locator, filter, args)?)
    }

    /// Deletes the listed rows in one atomic batch.
    ///
    /// Returns the number of operations applied; an empty list is 0
    /// without contacting the store. A rejected batch is an error, not 0.
    pub fn delete_ids(&mut self, locator: &Locator, ids: &[RecordId]) -> MapperResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ops: Vec<WriteOp> = ids
            .iter()
            .map(|&id| WriteOp::Delete {
                locator: locator.clone(),
                filter: Some(Selection::by_id(id)),
            })
            .collect();
        let outcomes = self.store.apply_batch(locator.authority(), ops)?;
        Ok(outcomes.len())
    }
}

// Identity comes from the positional first column, then the record fills
// the rest by name.
fn materialize<T: Record>(cursor: &RowCursor) -> MapperResult<T> {
    let mut record = T::blank();
    record.set_id(cursor.i64_at(0)?);
    record.restore(cursor)?;
    Ok(record)
}

fn created_id(locator: &Locator) -> MapperResult<RecordId> {
    locator.row_id().ok_or_else(|| {
        unexpected_outcome("store returned a created locator without a row id")
    })
}

fn unexpected_outcome(message: &str) -> MapperError {
    MapperError::Store(StoreError::InvalidData(message.to_string()))
}
