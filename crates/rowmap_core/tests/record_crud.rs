use rowmap_core::{
    ColumnDef, ColumnKind, Locator, MapperError, Record, RecordId, RecordMapper, RowCursor,
    RowValues, SqliteRowStore, StoreError, StoreResult, NOT_SAVED,
};
use rusqlite::types::Value;

const AUTHORITY: &str = "tasks.app";

#[test]
fn save_assigns_identity_and_roundtrips() {
    let (mut mapper, locator) = task_mapper();

    let mut task = task("write report");
    task.due = Some(1_700_000_000);
    assert!(!task.is_saved());

    let created = mapper.save(&locator, &mut task).unwrap();
    assert!(task.is_saved());
    assert_eq!(created.row_id(), Some(task.id));

    let loaded: Task = mapper.find_by_id(&locator, task.id).unwrap().unwrap();
    assert_eq!(loaded.title, "write report");
    assert_eq!(loaded.due, Some(1_700_000_000));
    assert!(!loaded.done);
}

#[test]
fn find_by_id_miss_returns_none() {
    let (mapper, locator) = task_mapper();
    let missing: Option<Task> = mapper.find_by_id(&locator, 42).unwrap();
    assert!(missing.is_none());
}

#[test]
fn saving_a_saved_record_is_rejected_before_the_store() {
    let (mut mapper, locator) = task_mapper();

    let mut task = task("once");
    mapper.save(&locator, &mut task).unwrap();
    let id = task.id;

    let err = mapper.save(&locator, &mut task).unwrap_err();
    assert!(matches!(err, MapperError::AlreadySaved(saved) if saved == id));
    assert_eq!(mapper.count(&locator).unwrap(), 1);
}

#[test]
fn updating_an_unsaved_record_is_rejected() {
    let (mut mapper, locator) = task_mapper();

    let unsaved = task("never saved");
    let err = mapper.update(&locator, &unsaved).unwrap_err();
    assert!(matches!(err, MapperError::NotSaved));

    let mut values = RowValues::new();
    values.put_bool("done", true);
    let err = mapper.update_by_id(&locator, NOT_SAVED, &values).unwrap_err();
    assert!(matches!(err, MapperError::NotSaved));
}

#[test]
fn update_writes_fields_back_to_the_row() {
    let (mut mapper, locator) = task_mapper();

    let mut task = task("draft");
    mapper.save(&locator, &mut task).unwrap();

    task.title = "final".to_string();
    task.done = true;
    let affected = mapper.update(&locator, &task).unwrap();
    assert_eq!(affected, 1);

    let loaded: Task = mapper.find_by_id(&locator, task.id).unwrap().unwrap();
    assert_eq!(loaded.title, "final");
    assert!(loaded.done);
}

#[test]
fn update_by_id_on_missing_row_returns_zero() {
    let (mut mapper, locator) = task_mapper();

    let mut values = RowValues::new();
    values.put_bool("done", true);
    assert_eq!(mapper.update_by_id(&locator, 7, &values).unwrap(), 0);
}

#[test]
fn update_where_touches_only_matching_rows() {
    let (mut mapper, locator) = task_mapper();
    save_titles(&mut mapper, &locator, &["a", "b", "c"]);

    let mut values = RowValues::new();
    values.put_bool("done", true);
    let affected = mapper
        .update_where(
            &locator,
            Some("title = ?"),
            &[Value::Text("b".to_string())],
            &values,
        )
        .unwrap();
    assert_eq!(affected, 1);

    let done: Vec<Task> = mapper
        .find(&locator, Some("done = ?"), &[Value::Integer(1)], None)
        .unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].title, "b");
}

#[test]
fn empty_update_values_are_rejected() {
    let (mut mapper, locator) = task_mapper();
    save_titles(&mut mapper, &locator, &["a"]);

    let err = mapper
        .update_where(&locator, None, &[], &RowValues::new())
        .unwrap_err();
    assert!(matches!(
        err,
        MapperError::Store(StoreError::InvalidData(_))
    ));
}

#[test]
fn find_filters_and_orders() {
    let (mut mapper, locator) = task_mapper();
    save_titles(&mut mapper, &locator, &["beta", "alpha", "gamma"]);

    let all: Vec<Task> = mapper
        .find(&locator, None, &[], Some("title ASC"))
        .unwrap();
    let titles: Vec<&str> = all.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["alpha", "beta", "gamma"]);

    let one: Vec<Task> = mapper
        .find(
            &locator,
            Some("title = ?"),
            &[Value::Text("alpha".to_string())],
            None,
        )
        .unwrap();
    assert_eq!(one.len(), 1);

    let none: Vec<Task> = mapper
        .find(
            &locator,
            Some("title = ?"),
            &[Value::Text("missing".to_string())],
            None,
        )
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn find_first_returns_the_first_match_only() {
    let (mut mapper, locator) = task_mapper();
    save_titles(&mut mapper, &locator, &["beta", "alpha"]);

    let first: Task = mapper
        .find_first(&locator, None, &[], Some("title ASC"))
        .unwrap()
        .unwrap();
    assert_eq!(first.title, "alpha");

    let missing: Option<Task> = mapper
        .find_first(
            &locator,
            Some("title = ?"),
            &[Value::Text("nope".to_string())],
            None,
        )
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn count_tracks_inserts_and_deletes() {
    let (mut mapper, locator) = task_mapper();
    assert_eq!(mapper.count(&locator).unwrap(), 0);

    save_titles(&mut mapper, &locator, &["a", "b", "c", "d"]);
    assert_eq!(mapper.count(&locator).unwrap(), 4);

    let deleted = mapper
        .delete_where(
            &locator,
            Some("title = ?"),
            &[Value::Text("a".to_string())],
        )
        .unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(mapper.count(&locator).unwrap(), 3);

    let matching = mapper
        .count_where(
            &locator,
            Some("title = ?"),
            &[Value::Text("b".to_string())],
        )
        .unwrap();
    assert_eq!(matching, 1);
}

#[test]
fn delete_by_id_removes_one_row() {
    let (mut mapper, locator) = task_mapper();
    let ids = save_titles(&mut mapper, &locator, &["a", "b"]);

    assert_eq!(mapper.delete_by_id(&locator, ids[0]).unwrap(), 1);
    assert_eq!(mapper.delete_by_id(&locator, ids[0]).unwrap(), 0);
    assert_eq!(mapper.count(&locator).unwrap(), 1);
}

#[test]
fn declared_defaults_fill_absent_columns_on_save() {
    let (mut mapper, locator) = task_mapper();

    let mut task = task("defaulted");
    assert!(task.priority.is_none());
    mapper.save(&locator, &mut task).unwrap();

    let loaded: Task = mapper.find_by_id(&locator, task.id).unwrap().unwrap();
    assert_eq!(loaded.priority, Some(3));

    let mut explicit = task_with_priority("explicit", 9);
    mapper.save(&locator, &mut explicit).unwrap();
    let loaded: Task = mapper.find_by_id(&locator, explicit.id).unwrap().unwrap();
    assert_eq!(loaded.priority, Some(9));
}

#[test]
fn wrong_authority_reports_unavailable() {
    let (mapper, _) = task_mapper();
    let foreign = Locator::table("other.app", "tasks");

    let err = mapper.find_all::<Task>(&foreign).unwrap_err();
    assert!(matches!(
        err,
        MapperError::Store(StoreError::Unavailable { .. })
    ));
}

#[test]
fn missing_table_reports_unavailable() {
    let store = SqliteRowStore::open_in_memory(AUTHORITY).unwrap();
    let mapper = RecordMapper::new(store);
    let locator = Locator::table(AUTHORITY, "never_created");

    let err = mapper.find_all::<Task>(&locator).unwrap_err();
    assert!(matches!(
        err,
        MapperError::Store(StoreError::Unavailable { .. })
    ));
}

#[test]
fn file_backed_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rowmap.db");
    let locator = Locator::table(AUTHORITY, "tasks");

    let mut task = task("persisted");
    {
        let store = SqliteRowStore::open(&path, AUTHORITY).unwrap();
        store.create_table(&locator, Task::COLUMNS).unwrap();
        let mut mapper = RecordMapper::new(store);
        mapper.save(&locator, &mut task).unwrap();
    }

    let mapper = RecordMapper::new(SqliteRowStore::open(&path, AUTHORITY).unwrap());
    let loaded: Task = mapper.find_by_id(&locator, task.id).unwrap().unwrap();
    assert_eq!(loaded.title, "persisted");
}

#[derive(Debug, Clone, PartialEq)]
struct Task {
    id: RecordId,
    title: String,
    done: bool,
    due: Option<i64>,
    // None means "let the declared default decide" on first save.
    priority: Option<i64>,
}

impl Record for Task {
    const COLUMNS: &'static [ColumnDef] = &[
        ColumnDef::new("title", ColumnKind::Text).not_null(),
        ColumnDef::new("done", ColumnKind::Integer).not_null(),
        ColumnDef::new("due", ColumnKind::Integer),
        ColumnDef::new("priority", ColumnKind::Integer).default_value("3"),
    ];

    fn blank() -> Self {
        Self {
            id: NOT_SAVED,
            title: String::new(),
            done: false,
            due: None,
            priority: None,
        }
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn to_values(&self) -> RowValues {
        let mut values = RowValues::new();
        values.put_text("title", self.title.as_str());
        values.put_bool("done", self.done);
        values.put_opt_i64("due", self.due);
        if let Some(priority) = self.priority {
            values.put_i64("priority", priority);
        }
        values
    }

    fn restore(&mut self, row: &RowCursor) -> StoreResult<()> {
        self.title = row.get_text("title")?;
        self.done = row.get_bool("done")?;
        self.due = row.opt_i64("due")?;
        self.priority = row.opt_i64("priority")?;
        Ok(())
    }
}

fn task(title: &str) -> Task {
    Task {
        title: title.to_string(),
        ..Task::blank()
    }
}

fn task_with_priority(title: &str, priority: i64) -> Task {
    Task {
        priority: Some(priority),
        ..task(title)
    }
}

fn task_mapper() -> (RecordMapper<SqliteRowStore>, Locator) {
    let store = SqliteRowStore::open_in_memory(AUTHORITY).unwrap();
    let locator = Locator::table(AUTHORITY, "tasks");
    store.create_table(&locator, Task::COLUMNS).unwrap();
    (RecordMapper::new(store), locator)
}

fn save_titles(
    mapper: &mut RecordMapper<SqliteRowStore>,
    locator: &Locator,
    titles: &[&str],
) -> Vec<RecordId> {
    titles
        .iter()
        .map(|title| {
            let mut task = task(title);
            mapper.save(locator, &mut task).unwrap();
            task.id
        })
        .collect()
}
