//! Synchronization tests through a view catalog.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rowsync_engine::{
    row, BatchMode, ColumnDescriptor, ConnectionRef, DataType, EngineConfig, Error, FilterExpr,
    InProcessStore, Result, Selector, SyncBatch, SyncHint, SyncId, SyncMode, Value, VecTable,
    ViewCatalog,
};
use std::collections::HashMap;
use std::sync::Arc;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn ms(dt: DateTime<Utc>) -> SyncId {
    dt.timestamp_millis()
}

/// A catalog serving views from one in-process store.
struct TestCatalog {
    connection: ConnectionRef,
    versions: HashMap<String, SyncId>,
}

impl TestCatalog {
    fn new() -> Self {
        let t = base_time();
        let tasks = VecTable::new(
            "tasks",
            vec![
                ColumnDescriptor::new("id", DataType::Int),
                ColumnDescriptor::new("title", DataType::Text),
                ColumnDescriptor::new("done", DataType::Bool),
                ColumnDescriptor::new("modified", DataType::DateTime),
            ],
            vec![
                row![1, "write", false, t + Duration::minutes(5)],
                row![2, "review", true, t],
                row![3, "ship", false, t + Duration::minutes(10)],
                row![4, "seed", true, DateTime::<Utc>::UNIX_EPOCH],
            ],
        )
        .unwrap();
        let countries = VecTable::new(
            "countries",
            vec![
                ColumnDescriptor::new("code", DataType::Text),
                ColumnDescriptor::new("name", DataType::Text),
            ],
            vec![row!["no", "Norway"], row!["it", "Italy"]],
        )
        .unwrap();
        let labels = VecTable::new(
            "labels",
            vec![ColumnDescriptor::new("label", DataType::Text)],
            vec![row!["a"]],
        )
        .unwrap();

        let connection: ConnectionRef = Arc::new(
            InProcessStore::new("app")
                .with_table(tasks)
                .with_table(countries)
                .with_table(labels),
        );
        let versions = HashMap::from([("countries".to_string(), 7)]);
        Self {
            connection,
            versions,
        }
    }
}

impl ViewCatalog for TestCatalog {
    fn view_selector(&self, view: &str) -> Result<Selector> {
        let selector = Selector::native(Arc::clone(&self.connection), view)?;
        if view == "tasks" {
            // Views are composed before they are synchronized.
            return selector.with_filter(&FilterExpr::not(FilterExpr::eq("title", "hidden")));
        }
        Ok(selector)
    }

    fn view_version(&self, view: &str) -> Result<SyncId> {
        self.versions
            .get(view)
            .copied()
            .ok_or_else(|| Error::InvalidReference(view.to_string()))
    }
}

fn open(hint: &str, last: SyncId) -> Result<SyncBatch> {
    let hint: SyncHint = hint.parse()?;
    SyncBatch::open(&hint, &TestCatalog::new(), last)
}

fn ids(batch: SyncBatch) -> Vec<i64> {
    batch
        .map(|e| e.unwrap().row.value_at(0).as_i64().unwrap())
        .collect()
}

// ============================================================================
// Timestamp Strategy
// ============================================================================

#[test]
fn initial_timestamp_sync_is_full() {
    let batch = open("TimeStamp: tasks, modified", 0).unwrap();
    assert_eq!(batch.mode(), BatchMode::Full);
    assert_eq!(batch.sync_id(), 0);
    assert_eq!(ids(batch), vec![4, 2, 1, 3]);
}

#[test]
fn incremental_timestamp_sync() {
    let t = base_time();
    let mut batch = open("timestamp: tasks,modified", ms(t)).unwrap();
    assert_eq!(batch.mode(), BatchMode::Parts);
    // Before the first row the client's own id comes back.
    assert_eq!(batch.sync_id(), ms(t));

    let mut seen = Vec::new();
    let mut previous = batch.sync_id();
    while let Some(entry) = batch.next_entry().unwrap() {
        assert!(entry.sync_id >= previous);
        assert_eq!(entry.mode, SyncMode::Replace);
        previous = entry.sync_id;
        seen.push(entry.row.value_at(0).as_i64().unwrap());
    }

    // Row 4 carries the sentinel minimum and is always resent.
    assert_eq!(seen, vec![4, 1, 3]);
    assert_eq!(batch.sync_id(), ms(t + Duration::minutes(10)));
}

#[test]
fn up_to_date_client_gets_only_sentinel_rows() {
    let last = ms(base_time() + Duration::minutes(10));
    let batch = open("TimeStamp: tasks, modified", last).unwrap();
    assert_eq!(ids(batch), vec![4]);
}

#[test]
fn resume_from_page_sync_id() {
    let config = EngineConfig::default();
    let mut first = open("TimeStamp: tasks, modified", 0).unwrap();
    let page = first.next_page(Some(3), &config).unwrap();
    assert!(page.has_more);
    first.release();

    // A later round resumes from the id the page reported.
    let rest = open("TimeStamp: tasks, modified", page.sync_id).unwrap();
    assert_eq!(ids(rest), vec![4, 3]);
}

#[test]
fn non_stamp_column_rejected() {
    let result = open("TimeStamp: tasks, title", 0);
    assert!(matches!(
        result,
        Err(Error::InvalidArgument { column, .. }) if column == "title"
    ));
}

#[test]
fn unknown_sync_column_rejected() {
    let result = open("TimeStamp: tasks, updated", 0);
    assert!(matches!(result, Err(Error::InvalidReference(c)) if c == "updated"));
}

// ============================================================================
// Full Strategy
// ============================================================================

#[test]
fn full_sync_when_version_moved() {
    let batch = open("Full: countries", 3).unwrap();
    assert_eq!(batch.mode(), BatchMode::Full);
    assert_eq!(batch.sync_id(), 7);

    let entries: Vec<_> = batch.collect::<Result<_>>().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.sync_id == 7));
    assert_eq!(entries[0].row.value_at(1), &Value::from("Norway"));
}

#[test]
fn full_sync_when_current() {
    let mut batch = open("Full: countries", 7).unwrap();
    assert_eq!(batch.mode(), BatchMode::Parts);
    let page = batch.next_page(None, &EngineConfig::default()).unwrap();
    assert!(page.entries.is_empty());
    assert!(!page.has_more);
    assert_eq!(page.sync_id, 7);
}

#[test]
fn unversioned_view_fails() {
    assert!(matches!(
        open("Full: labels", 0),
        Err(Error::InvalidReference(v)) if v == "labels"
    ));
}

// ============================================================================
// Hints and Release
// ============================================================================

#[test]
fn bad_hint_is_format_error() {
    assert!(matches!(open("Snapshot: tasks", 0), Err(Error::Format(_))));
    assert!(matches!(open("tasks", 0), Err(Error::Format(_))));
}

#[test]
fn released_batch_is_disposed() {
    let mut batch = open("TimeStamp: tasks, modified", 0).unwrap();
    batch.next_entry().unwrap();
    batch.release();
    batch.release();
    assert!(matches!(batch.next_entry(), Err(Error::Disposed)));
}

#[test]
fn page_json_shape() {
    let mut batch = open("Full: countries", 0).unwrap();
    let page = batch.next_page(Some(1), &EngineConfig::default()).unwrap();
    let json = serde_json::to_value(&page).unwrap();

    assert_eq!(json["mode"], "full");
    assert_eq!(json["syncId"], 7);
    assert_eq!(json["hasMore"], true);
    assert_eq!(json["entries"][0]["mode"], "replace");
    assert_eq!(json["entries"][0]["syncId"], 7);
}
