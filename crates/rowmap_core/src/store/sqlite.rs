//! SQLite-backed row store.
//!
//! # Responsibility
//! - Serve the `RowStore` contract over one `rusqlite` connection.
//! - Keep SQL assembly and identifier hygiene inside this module.
//! - Create tables from declarative column metadata.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a busy timeout.
//! - Batches run inside one immediate transaction; rejection rolls back.
//! - Table and value column names are validated before entering SQL text;
//!   filter, projection, and order-by fragments are caller-trusted.

use super::cursor::RowCursor;
use super::locator::Locator;
use super::op::{split_selection, WriteOp, WriteOutcome};
use super::values::RowValues;
use super::{is_identifier, RowStore, StoreError, StoreResult, ID_COLUMN};
use crate::record::column::{ColumnDef, ColumnKind};
use log::{debug, error, info};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, TransactionBehavior};
use std::path::Path;
use std::time::{Duration, Instant};

/// Row store over a SQLite database file or in-memory database.
pub struct SqliteRowStore {
    conn: Connection,
    authority: String,
}

impl SqliteRowStore {
    /// Opens a SQLite database file and configures connection pragmas.
    ///
    /// # Side effects
    /// - Emits `store_open` logging events with duration and status.
    pub fn open(path: impl AsRef<Path>, authority: impl Into<String>) -> StoreResult<Self> {
        let authority = authority.into();
        let started_at = Instant::now();
        info!("event=store_open module=store status=start mode=file authority={authority}");

        let conn = match Connection::open(path) {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=store_open module=store status=error mode=file authority={authority} duration_ms={} error_code=store_open_failed error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        match bootstrap_connection(&conn) {
            Ok(()) => {
                info!(
                    "event=store_open module=store status=ok mode=file authority={authority} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(Self { conn, authority })
            }
            Err(err) => {
                error!(
                    "event=store_open module=store status=error mode=file authority={authority} duration_ms={} error_code=store_bootstrap_failed error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Opens an in-memory SQLite database and configures connection pragmas.
    ///
    /// # Side effects
    /// - Emits `store_open` logging events with duration and status.
    pub fn open_in_memory(authority: impl Into<String>) -> StoreResult<Self> {
        let authority = authority.into();
        let started_at = Instant::now();
        info!("event=store_open module=store status=start mode=memory authority={authority}");

        let conn = match Connection::open_in_memory() {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=store_open module=store status=error mode=memory authority={authority} duration_ms={} error_code=store_open_failed error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        match bootstrap_connection(&conn) {
            Ok(()) => {
                info!(
                    "event=store_open module=store status=ok mode=memory authority={authority} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(Self { conn, authority })
            }
            Err(err) => {
                error!(
                    "event=store_open module=store status=error mode=memory authority={authority} duration_ms={} error_code=store_bootstrap_failed error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Creates the table a locator points at from column metadata.
    ///
    /// The identity column `_id INTEGER PRIMARY KEY AUTOINCREMENT` is always
    /// first; one column per `ColumnDef` follows with its kind and
    /// constraints. Existing tables are left untouched.
    ///
    /// # Errors
    /// - `Unavailable` when the locator's authority is not this store's.
    /// - `InvalidData` when a table or column name is not a bare identifier.
    pub fn create_table(&self, locator: &Locator, columns: &[ColumnDef]) -> StoreResult<()> {
        self.ensure_authority(locator)?;
        ensure_identifier(locator.table_name())?;

        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {ID_COLUMN} INTEGER PRIMARY KEY AUTOINCREMENT",
            locator.table_name()
        );
        for column in columns {
            ensure_identifier(column.name)?;
            sql.push_str(",\n    ");
            sql.push_str(column.name);
            sql.push(' ');
            sql.push_str(kind_sql(column.kind));
            if column.not_null {
                sql.push_str(" NOT NULL");
            }
            if column.unique {
                sql.push_str(" UNIQUE");
            }
            if let Some(default) = column.default_value {
                sql.push_str(" DEFAULT '");
                sql.push_str(&default.replace('\'', "''"));
                sql.push('\'');
            }
        }
        sql.push_str("\n);");

        self.conn.execute_batch(&sql)?;
        debug!(
            "event=create_table module=store status=ok locator={} column_count={}",
            locator,
            columns.len()
        );
        Ok(())
    }

    fn ensure_authority(&self, locator: &Locator) -> StoreResult<()> {
        if locator.authority() != self.authority {
            return Err(StoreError::Unavailable {
                locator: locator.to_string(),
            });
        }
        Ok(())
    }
}

impl RowStore for SqliteRowStore {
    fn query(
        &self,
        locator: &Locator,
        columns: Option<&[&str]>,
        filter: Option<&str>,
        args: &[Value],
        order_by: Option<&str>,
    ) -> StoreResult<RowCursor> {
        self.ensure_authority(locator)?;
        exec_query(&self.conn, locator, columns, filter, args, order_by)
    }

    fn insert(&mut self, locator: &Locator, values: &RowValues) -> StoreResult<Locator> {
        self.ensure_authority(locator)?;
        exec_insert(&self.conn, locator, values)
    }

    fn update(
        &mut self,
        locator: &Locator,
        values: &RowValues,
        filter: Option<&str>,
        args: &[Value],
    ) -> StoreResult<usize> {
        self.ensure_authority(locator)?;
        exec_update(&self.conn, locator, values, filter, args)
    }

    fn delete(
        &mut self,
        locator: &Locator,
        filter: Option<&str>,
        args: &[Value],
    ) -> StoreResult<usize> {
        self.ensure_authority(locator)?;
        exec_delete(&self.conn, locator, filter, args)
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

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut outcomes = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            if op.locator().authority() != authority {
                return Err(rejected(
                    index,
                    format!(
                        "operation addressed to `{}` does not match authority `{authority}`",
                        op.locator()
                    ),
                    started_at,
                ));
            }
            match apply_op(&tx, op) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => return Err(rejected(index, err.to_string(), started_at)),
            }
        }

        tx.commit()?;
        debug!(
            "event=apply_batch module=store status=ok authority={authority} op_count={} duration_ms={}",
            outcomes.len(),
            started_at.elapsed().as_millis()
        );
        Ok(outcomes)
    }
}

fn bootstrap_connection(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

fn exec_query(
    conn: &Connection,
    locator: &Locator,
    columns: Option<&[&str]>,
    filter: Option<&str>,
    args: &[Value],
    order_by: Option<&str>,
) -> StoreResult<RowCursor> {
    ensure_identifier(locator.table_name())?;

    let projection = match columns {
        Some([]) => {
            return Err(StoreError::InvalidData(
                "projection cannot be empty".to_string(),
            ));
        }
        Some(cols) => cols.join(", "),
        None => "*".to_string(),
    };

    let mut sql = format!("SELECT {projection} FROM {}", locator.table_name());
    let mut bound: Vec<Value> = Vec::new();
    push_where(&mut sql, &mut bound, locator, filter, args);
    if let Some(order) = order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|err| map_table_error(err, locator))?;
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let column_count = column_names.len();

    let mut rows = stmt.query(params_from_iter(bound))?;
    let mut data = Vec::new();
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(column_count);
        for index in 0..column_count {
            cells.push(row.get::<_, Value>(index)?);
        }
        data.push(cells);
    }

    Ok(RowCursor::from_parts(column_names, data))
}

fn exec_insert(conn: &Connection, locator: &Locator, values: &RowValues) -> StoreResult<Locator> {
    ensure_identifier(locator.table_name())?;
    if locator.row_id().is_some() {
        return Err(StoreError::InvalidData(format!(
            "cannot insert into row-narrowed locator `{locator}`"
        )));
    }

    let (sql, bound) = if values.is_empty() {
        (
            format!("INSERT INTO {} DEFAULT VALUES;", locator.table_name()),
            Vec::new(),
        )
    } else {
        for column in values.column_names() {
            ensure_identifier(column)?;
        }
        let columns = values.column_names().join(", ");
        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders});",
            locator.table_name()
        );
        let bound: Vec<Value> = values.iter().map(|(_, value)| value.clone()).collect();
        (sql, bound)
    };

    conn.execute(&sql, params_from_iter(bound))
        .map_err(|err| map_table_error(err, locator))?;
    Ok(locator.for_row(conn.last_insert_rowid()))
}

fn exec_update(
    conn: &Connection,
    locator: &Locator,
    values: &RowValues,
    filter: Option<&str>,
    args: &[Value],
) -> StoreResult<usize> {
    ensure_identifier(locator.table_name())?;
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
    for column in values.column_names() {
        ensure_identifier(column)?;
    }

    let set_list: Vec<String> = values
        .column_names()
        .iter()
        .map(|column| format!("{column} = ?"))
        .collect();
    let mut sql = format!("UPDATE {} SET {}", locator.table_name(), set_list.join(", "));
    let mut bound: Vec<Value> = values.iter().map(|(_, value)| value.clone()).collect();
    push_where(&mut sql, &mut bound, locator, filter, args);

    conn.execute(&sql, params_from_iter(bound))
        .map_err(|err| map_table_error(err, locator))
}

fn exec_delete(
    conn: &Connection,
    locator: &Locator,
    filter: Option<&str>,
    args: &[Value],
) -> StoreResult<usize> {
    ensure_identifier(locator.table_name())?;

    let mut sql = format!("DELETE FROM {}", locator.table_name());
    let mut bound: Vec<Value> = Vec::new();
    push_where(&mut sql, &mut bound, locator, filter, args);

    conn.execute(&sql, params_from_iter(bound))
        .map_err(|err| map_table_error(err, locator))
}

fn apply_op(conn: &Connection, op: &WriteOp) -> StoreResult<WriteOutcome> {
    match op {
        WriteOp::Insert { locator, values } => {
            Ok(WriteOutcome::Created(exec_insert(conn, locator, values)?))
        }
        WriteOp::Update {
            locator,
            values,
            filter,
        } => {
            let (clause, args) = split_selection(filter);
            Ok(WriteOutcome::Affected(exec_update(
                conn, locator, values, clause, args,
            )?))
        }
        WriteOp::Delete { locator, filter } => {
            let (clause, args) = split_selection(filter);
            Ok(WriteOutcome::Affected(exec_delete(
                conn, locator, clause, args,
            )?))
        }
    }
}

// Row-narrowed locators contribute an id conjunct ahead of the caller filter.
fn push_where(
    sql: &mut String,
    bound: &mut Vec<Value>,
    locator: &Locator,
    filter: Option<&str>,
    args: &[Value],
) {
    let mut clauses: Vec<String> = Vec::new();
    if let Some(id) = locator.row_id() {
        clauses.push(format!("{ID_COLUMN} = ?"));
        bound.push(Value::Integer(id));
    }
    if let Some(filter) = filter {
        clauses.push(format!("({filter})"));
        bound.extend(args.iter().cloned());
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
}

fn rejected(index: usize, reason: String, started_at: Instant) -> StoreError {
    error!(
        "event=apply_batch module=store status=error index={index} duration_ms={} error_code=batch_rejected error={reason}",
        started_at.elapsed().as_millis()
    );
    StoreError::BatchRejected { index, reason }
}

fn map_table_error(err: rusqlite::Error, locator: &Locator) -> StoreError {
    if is_missing_table(&err) {
        return StoreError::Unavailable {
            locator: locator.to_string(),
        };
    }
    StoreError::Sqlite(err)
}

fn is_missing_table(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(_, Some(message)) if message.starts_with("no such table")
    )
}

fn ensure_identifier(name: &str) -> StoreResult<()> {
    if !is_identifier(name) {
        return Err(StoreError::InvalidData(format!(
            "`{name}` is not a valid identifier"
        )));
    }
    Ok(())
}

fn kind_sql(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Integer => "INTEGER",
        ColumnKind::Real => "REAL",
        ColumnKind::Text => "TEXT",
        ColumnKind::Blob => "BLOB",
    }
}

#[cfg(test)]
mod tests {
    use super::{ensure_identifier, is_missing_table};

    #[test]
    fn ensure_identifier_accepts_bare_names_only() {
        assert!(ensure_identifier("notes").is_ok());
        assert!(ensure_identifier("note_items2").is_ok());
        assert!(ensure_identifier("").is_err());
        assert!(ensure_identifier("2fast").is_err());
        assert!(ensure_identifier("notes; DROP TABLE notes").is_err());
    }

    #[test]
    fn missing_table_detection_matches_sqlite_message() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some("no such table: notes".to_string()),
        );
        assert!(is_missing_table(&err));

        let other = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some("near \"FROM\": syntax error".to_string()),
        );
        assert!(!is_missing_table(&other));
    }
}
