//! In-process row store for fixtures and test doubles.
//!
//! # Responsibility
//! - Serve the `RowStore` contract from plain maps, no database involved.
//! - Evaluate the filter subset it can answer honestly and refuse the rest.
//!
//! # Invariants
//! - Row ids are allocated ascending and never reused.
//! - Filters are conjunctions of `column = ?`; any other expression is
//!   `Unsupported`, never a silently wrong answer.
//! - Batches stage on a copy and swap in only on full success.

use super::cursor::RowCursor;
use super::locator::Locator;
use super::op::{split_selection, WriteOp, WriteOutcome};
use super::values::RowValues;
use super::{
    is_identifier, RowStore, StoreError, StoreResult, COUNT_PROJECTION, ID_COLUMN,
};
use log::{debug, error};
use rusqlite::types::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// Row store backed by in-process ordered maps.
///
/// Tables must be registered before use; an unregistered table behaves like
/// a missing one and reports `Unavailable`.
#[derive(Debug, Clone)]
pub struct MemoryRowStore {
    authority: String,
    tables: BTreeMap<String, MemTable>,
}

#[derive(Debug, Clone, Default)]
struct MemTable {
    rows: BTreeMap<i64, RowValues>,
    // Last allocated id; never decreases, even across deletes.
    next_id: i64,
}

impl MemoryRowStore {
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            tables: BTreeMap::new(),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Registers an empty table; registering twice is a no-op.
    pub fn register_table(&mut self, table: &str) {
        self.tables.entry(table.to_string()).or_default();
    }

    /// Builder form of [`MemoryRowStore::register_table`].
    pub fn with_table(mut self, table: &str) -> Self {
        self.register_table(table);
        self
    }
}

impl RowStore for MemoryRowStore {
    fn query(
        &self,
        locator: &Locator,
        columns: Option<&[&str]>,
        filter: Option<&str>,
        args: &[Value],
        order_by: Option<&str>,
    ) -> StoreResult<RowCursor> {
        exec_query(
            &self.tables,
            &self.authority,
            locator,
            columns,
            filter,
            args,
            order_by,
        )
    }

    fn insert(&mut self, locator: &Locator, values: &RowValues) -> StoreResult<Locator> {
        exec_insert(&mut self.tables, &self.authority, locator, values)
    }

    fn update(
        &mut self,
        locator: &Locator,
        values: &RowValues,
        filter: Option<&str>,
        args: &[Value],
    ) -> StoreResult<usize> {
        exec_update(&mut self.tables, &self.authority, locator, values, filter, args)
    }

    fn delete(
        &mut self,
        locator: &Locator,
        filter: Option<&str>,
        args: &[Value],
    ) -> StoreResult<usize> {
        exec_delete(&mut self.tables, &self.authority, locator, filter, args)
    }

    fn apply_batch(&mut self, authority: &str, ops: Vec<WriteOp>) -> StoreResult<Vec<WriteOutcome>> {
        if authority != self.authority {
            return Err(StoreError::Unavailable {
                locator: authority.to_string(),
            });
        }

        let started_at = Instant::now();
        debug!(
            "event=apply_batch module=store status=start authority={authority} op_count={}",
            ops.len()
        );

        let mut staged = self.tables.clone();
        let mut outcomes = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            match apply_op(&mut staged, authority, op) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    error!(
                        "event=apply_batch module=store status=error index={index} duration_ms={} error_code=batch_rejected error={err}",
                        started_at.elapsed().as_millis()
                    );
                    return Err(StoreError::BatchRejected {
                        index,
                        reason: err.to_string(),
                    });
                }
            }
        }

        self.tables = staged;
        debug!(
            "event=apply_batch module=store status=ok authority={authority} op_count={} duration_ms={}",
            outcomes.len(),
            started_at.elapsed().as_millis()
        );
        Ok(outcomes)
    }
}

fn apply_op(
    tables: &mut BTreeMap<String, MemTable>,
    authority: &str,
    op: &WriteOp,
) -> StoreResult<WriteOutcome> {
    match op {
        WriteOp::Insert { locator, values } => Ok(WriteOutcome::Created(exec_insert(
            tables, authority, locator, values,
        )?)),
        WriteOp::Update {
            locator,
            values,
            filter,
        } => {
            let (clause, args) = split_selection(filter);
            Ok(WriteOutcome::Affected(exec_update(
                tables, authority, locator, values, clause, args,
            )?))
        }
        WriteOp::Delete { locator, filter } => {
            let (clause, args) = split_selection(filter);
            Ok(WriteOutcome::Affected(exec_delete(
                tables, authority, locator, clause, args,
            )?))
        }
    }
}

fn exec_query(
    tables: &BTreeMap<String, MemTable>,
    authority: &str,
    locator: &Locator,
    columns: Option<&[&str]>,
    filter: Option<&str>,
    args: &[Value],
    order_by: Option<&str>,
) -> StoreResult<RowCursor> {
    let table = resolve(tables, authority, locator)?;
    let mut matched = matching_rows(table, locator, filter, args)?;
    if let Some(order) = order_by {
        matched = sort_rows(matched, order)?;
    }

    if let Some(cols) = columns {
        if cols == COUNT_PROJECTION {
            return Ok(RowCursor::from_parts(
                vec![COUNT_PROJECTION[0].to_string()],
                vec![vec![Value::Integer(matched.len() as i64)]],
            ));
        }
        if cols.is_empty() {
            return Err(StoreError::InvalidData(
                "projection cannot be empty".to_string(),
            ));
        }
        let names: Vec<String> = cols.iter().map(|name| name.to_string()).collect();
        return Ok(build_cursor(names, &matched));
    }

    // Star projection: identity first, then every column present in the
    // matched rows. Absent cells read as null.
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for (_, values) in &matched {
        for (column, _) in values.iter() {
            seen.insert(column.as_str());
        }
    }
    let mut names: Vec<String> = vec![ID_COLUMN.to_string()];
    names.extend(seen.into_iter().map(|column| column.to_string()));
    Ok(build_cursor(names, &matched))
}

fn exec_insert(
    tables: &mut BTreeMap<String, MemTable>,
    authority: &str,
    locator: &Locator,
    values: &RowValues,
) -> StoreResult<Locator> {
    if locator.row_id().is_some() {
        return Err(StoreError::InvalidData(format!(
            "cannot insert into row-narrowed locator `{locator}`"
        )));
    }
    let table = resolve_mut(tables, authority, locator)?;

    let id = match values.get(ID_COLUMN) {
        None => {
            table.next_id += 1;
            table.next_id
        }
        Some(Value::Integer(id)) => {
            if table.rows.contains_key(id) {
                return Err(StoreError::InvalidData(format!(
                    "row id {id} already exists in `{}`",
                    locator.table_name()
                )));
            }
            if *id > table.next_id {
                table.next_id = *id;
            }
            *id
        }
        Some(_) => {
            return Err(StoreError::InvalidData(
                "identity column must hold an integer".to_string(),
            ));
        }
    };

    let mut stored = values.clone();
    stored.remove(ID_COLUMN);
    table.rows.insert(id, stored);
    Ok(locator.for_row(id))
}

fn exec_update(
    tables: &mut BTreeMap<String, MemTable>,
    authority: &str,
    locator: &Locator,
    values: &RowValues,
    filter: Option<&str>,
    args: &[Value],
) -> StoreResult<usize> {
    if values.is_empty() {
        return Err(StoreError::InvalidData(
            "update requires at least one column value".to_string(),
        ));
    }
    if values.contains(ID_COLUMN) {
        return Err(StoreError::InvalidData(
            "cannot update the identity column".to_string(),
        ));
    }

    let ids = matching_ids(tables, authority, locator, filter, args)?;
    let table = resolve_mut(tables, authority, locator)?;
    for id in &ids {
        if let Some(row) = table.rows.get_mut(id) {
            for (column, value) in values.iter() {
                row.put(column.clone(), value.clone());
            }
        }
    }
    Ok(ids.len())
}

fn exec_delete(
    tables: &mut BTreeMap<String, MemTable>,
    authority: &str,
    locator: &Locator,
    filter: Option<&str>,
    args: &[Value],
) -> StoreResult<usize> {
    let ids = matching_ids(tables, authority, locator, filter, args)?;
    let table = resolve_mut(tables, authority, locator)?;
    for id in &ids {
        table.rows.remove(id);
    }
    Ok(ids.len())
}

fn matching_ids(
    tables: &BTreeMap<String, MemTable>,
    authority: &str,
    locator: &Locator,
    filter: Option<&str>,
    args: &[Value],
) -> StoreResult<Vec<i64>> {
    let table = resolve(tables, authority, locator)?;
    Ok(matching_rows(table, locator, filter, args)?
        .into_iter()
        .map(|(id, _)| id)
        .collect())
}

fn matching_rows<'a>(
    table: &'a MemTable,
    locator: &Locator,
    filter: Option<&str>,
    args: &[Value],
) -> StoreResult<Vec<(i64, &'a RowValues)>> {
    let eq_columns = match filter {
        Some(filter) => Some(parse_filter(filter, args.len())?),
        None => {
            if !args.is_empty() {
                return Err(StoreError::InvalidData(
                    "filter arguments supplied without a filter".to_string(),
                ));
            }
            None
        }
    };

    let mut matched = Vec::new();
    for (&id, values) in &table.rows {
        if let Some(want) = locator.row_id() {
            if id != want {
                continue;
            }
        }
        if let Some(columns) = &eq_columns {
            if !row_matches(id, values, columns, args) {
                continue;
            }
        }
        matched.push((id, values));
    }
    Ok(matched)
}

fn row_matches(id: i64, values: &RowValues, columns: &[String], args: &[Value]) -> bool {
    columns.iter().zip(args).all(|(column, arg)| {
        // SQL equality: null never matches anything, including null.
        if *arg == Value::Null {
            return false;
        }
        if column == ID_COLUMN {
            return *arg == Value::Integer(id);
        }
        values.get(column).is_some_and(|value| value == arg)
    })
}

/// Parses a conjunction of `column = ?` terms, the one filter shape this
/// store evaluates.
fn parse_filter(filter: &str, arg_count: usize) -> StoreResult<Vec<String>> {
    let mut columns = Vec::new();
    for conjunct in filter.split(" AND ") {
        let column = parse_eq(conjunct).ok_or_else(|| StoreError::Unsupported {
            feature: format!("filter `{filter}`"),
        })?;
        columns.push(column);
    }
    if columns.len() != arg_count {
        return Err(StoreError::InvalidData(format!(
            "filter `{filter}` expects {} arguments, got {arg_count}",
            columns.len()
        )));
    }
    Ok(columns)
}

fn parse_eq(conjunct: &str) -> Option<String> {
    let (column, rest) = conjunct.trim().split_once('=')?;
    let column = column.trim();
    if rest.trim() != "?" || !is_identifier(column) {
        return None;
    }
    Some(column.to_string())
}

fn sort_rows<'a>(
    rows: Vec<(i64, &'a RowValues)>,
    order_by: &str,
) -> StoreResult<Vec<(i64, &'a RowValues)>> {
    let (column, descending) = parse_order(order_by)?;
    let mut keyed: Vec<(Value, (i64, &RowValues))> = rows
        .into_iter()
        .map(|(id, values)| {
            let key = if column == ID_COLUMN {
                Value::Integer(id)
            } else {
                values.get(&column).cloned().unwrap_or(Value::Null)
            };
            (key, (id, values))
        })
        .collect();
    // Stable sort, so ties keep ascending id order.
    keyed.sort_by(|(a, _), (b, _)| {
        let ord = compare_values(a, b);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

fn parse_order(order_by: &str) -> StoreResult<(String, bool)> {
    let unsupported = || StoreError::Unsupported {
        feature: format!("order `{order_by}`"),
    };

    let mut parts = order_by.trim().split_whitespace();
    let column = match parts.next() {
        Some(column) if is_identifier(column) => column.to_string(),
        _ => return Err(unsupported()),
    };
    let descending = match parts.next() {
        None => false,
        Some(word) if word.eq_ignore_ascii_case("asc") => false,
        Some(word) if word.eq_ignore_ascii_case("desc") => true,
        Some(_) => return Err(unsupported()),
    };
    if parts.next().is_some() {
        return Err(unsupported());
    }
    Ok((column, descending))
}

// SQLite storage-class ordering: null, then numerics, then text, then blob.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (rank_a, rank_b) = (type_rank(a), type_rank(b));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::Blob(x), Value::Blob(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        _ => as_f64(a)
            .partial_cmp(&as_f64(b))
            .unwrap_or(Ordering::Equal),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Integer(_) | Value::Real(_) => 1,
        Value::Text(_) => 2,
        Value::Blob(_) => 3,
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Integer(x) => *x as f64,
        Value::Real(x) => *x,
        _ => 0.0,
    }
}

fn build_cursor(columns: Vec<String>, matched: &[(i64, &RowValues)]) -> RowCursor {
    let mut rows = Vec::with_capacity(matched.len());
    for (id, values) in matched {
        let mut cells = Vec::with_capacity(columns.len());
        for column in &columns {
            if column == ID_COLUMN {
                cells.push(Value::Integer(*id));
            } else {
                cells.push(values.get(column).cloned().unwrap_or(Value::Null));
            }
        }
        rows.push(cells);
    }
    RowCursor::from_parts(columns, rows)
}

fn resolve<'a>(
    tables: &'a BTreeMap<String, MemTable>,
    authority: &str,
    locator: &Locator,
) -> StoreResult<&'a MemTable> {
    if locator.authority() != authority {
        return Err(unavailable(locator));
    }
    tables
        .get(locator.table_name())
        .ok_or_else(|| unavailable(locator))
}

fn resolve_mut<'a>(
    tables: &'a mut BTreeMap<String, MemTable>,
    authority: &str,
    locator: &Locator,
) -> StoreResult<&'a mut MemTable> {
    if locator.authority() != authority {
        return Err(unavailable(locator));
    }
    tables
        .get_mut(locator.table_name())
        .ok_or_else(|| unavailable(locator))
}

fn unavailable(locator: &Locator) -> StoreError {
    StoreError::Unavailable {
        locator: locator.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryRowStore;
    use crate::store::{Locator, RowStore, RowValues, Selection, StoreError, WriteOp};
    use rusqlite::types::Value;

    const AUTHORITY: &str = "fixtures.app";

    fn store_with_rows() -> (MemoryRowStore, Locator) {
        let mut store = MemoryRowStore::new(AUTHORITY).with_table("items");
        let locator = Locator::table(AUTHORITY, "items");
        for (name, rank) in [("alpha", 3), ("beta", 1), ("gamma", 2)] {
            let mut values = RowValues::new();
            values.put_text("name", name);
            values.put_i64("rank", rank);
            store.insert(&locator, &values).unwrap();
        }
        (store, locator)
    }

    #[test]
    fn ids_ascend_and_are_never_reused() {
        let (mut store, locator) = store_with_rows();
        store.delete(&locator, Some("name = ?"), &[Value::Text("gamma".to_string())])
            .unwrap();
        let created = store.insert(&locator, &RowValues::new()).unwrap();
        assert_eq!(created.row_id(), Some(4));
    }

    #[test]
    fn equality_filter_and_order_are_evaluated() {
        let (store, locator) = store_with_rows();
        let mut cursor = store
            .query(&locator, None, None, &[], Some("rank DESC"))
            .unwrap();
        let mut names = Vec::new();
        while cursor.move_to_next() {
            names.push(cursor.get_text("name").unwrap());
        }
        assert_eq!(names, vec!["alpha", "gamma", "beta"]);

        let mut cursor = store
            .query(
                &locator,
                None,
                Some("name = ?"),
                &[Value::Text("beta".to_string())],
                None,
            )
            .unwrap();
        assert!(cursor.move_to_first());
        assert_eq!(cursor.row_count(), 1);
        assert_eq!(cursor.get_i64("rank").unwrap(), 1);
    }

    #[test]
    fn null_argument_matches_nothing() {
        let (store, locator) = store_with_rows();
        let cursor = store
            .query(&locator, None, Some("name = ?"), &[Value::Null], None)
            .unwrap();
        assert_eq!(cursor.row_count(), 0);
    }

    #[test]
    fn unsupported_filter_is_refused_not_guessed() {
        let (store, locator) = store_with_rows();
        let err = store
            .query(
                &locator,
                None,
                Some("rank > ?"),
                &[Value::Integer(1)],
                None,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Unsupported { .. }));
    }

    #[test]
    fn unregistered_table_reports_unavailable() {
        let store = MemoryRowStore::new(AUTHORITY);
        let err = store
            .query(&Locator::table(AUTHORITY, "ghosts"), None, None, &[], None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[test]
    fn rejected_batch_leaves_tables_untouched() {
        let (mut store, locator) = store_with_rows();
        let mut values = RowValues::new();
        values.put_text("name", "delta");

        let ops = vec![
            WriteOp::Insert {
                locator: locator.clone(),
                values,
            },
            WriteOp::Delete {
                locator: Locator::table(AUTHORITY, "ghosts"),
                filter: Some(Selection::by_id(1)),
            },
        ];
        let err = store.apply_batch(AUTHORITY, ops).unwrap_err();
        assert!(matches!(err, StoreError::BatchRejected { index: 1, .. }));

        let cursor = store.query(&locator, None, None, &[], None).unwrap();
        assert_eq!(cursor.row_count(), 3);
    }
}
