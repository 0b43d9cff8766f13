use prefsync_core::db::migrations::latest_version;
use prefsync_core::db::{open_db, DbError};
use prefsync_core::{
    HydrationOutcome, KeyValueStore, LocalEventHub, PreferencePatch, PreferenceSet,
    SettingsStore, SqliteKeyValueStore, StorageError, SyncController, SETTINGS_STORAGE_KEY,
};
use rusqlite::Connection;
use std::path::Path;
use std::rc::Rc;

fn start_window(
    hub: &LocalEventHub,
    db_path: &Path,
    label: &str,
) -> (SettingsStore, SyncController, HydrationOutcome) {
    let store = SettingsStore::new();
    let storage = SqliteKeyValueStore::open(db_path).unwrap();
    let mut controller = SyncController::new(
        store.clone(),
        Rc::new(storage),
        Rc::new(hub.endpoint(label)),
    );
    let report = controller.initialize().unwrap();
    (store, controller, report.hydration)
}

#[test]
fn values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.sqlite3");

    let first = SqliteKeyValueStore::open(&path).unwrap();
    first
        .write(SETTINGS_STORAGE_KEY, r#"{"fontSize":19,"wordWrap":true}"#)
        .unwrap();
    drop(first);

    let second = SqliteKeyValueStore::open(&path).unwrap();
    assert_eq!(
        second.read(SETTINGS_STORAGE_KEY).unwrap().as_deref(),
        Some(r#"{"fontSize":19,"wordWrap":true}"#)
    );
}

#[test]
fn two_connections_see_each_others_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.sqlite3");
    let a = SqliteKeyValueStore::open(&path).unwrap();
    let b = SqliteKeyValueStore::open(&path).unwrap();

    a.write("k", "from-a").unwrap();
    assert_eq!(b.read("k").unwrap().as_deref(), Some("from-a"));
    b.write("k", "from-b").unwrap();
    assert_eq!(a.read("k").unwrap().as_deref(), Some("from-b"));
}

#[test]
fn newer_schema_is_reported_as_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 99;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 99);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        SqliteKeyValueStore::open(&path),
        Err(StorageError::Db(DbError::UnsupportedSchemaVersion { .. }))
    ));
}

#[test]
fn restarted_window_hydrates_from_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.sqlite3");
    let hub = LocalEventHub::new();

    let (store, controller, hydration) = start_window(&hub, &path, "main");
    assert_eq!(hydration, HydrationOutcome::Absent);
    store.merge(
        PreferencePatch::new()
            .with_font_size(26)
            .with_word_wrap(true),
    );
    hub.dispatch_pending();
    drop(controller);

    let (reopened, _controller, hydration) = start_window(&hub, &path, "main-reopened");
    assert_eq!(hydration, HydrationOutcome::Loaded);
    assert_eq!(
        reopened.get(),
        PreferenceSet {
            font_size: 26,
            word_wrap: true
        }
    );
}

#[test]
fn sibling_windows_share_one_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.sqlite3");
    let hub = LocalEventHub::new();
    let (editor, _editor_sync, _) = start_window(&hub, &path, "editor");
    let (preview, _preview_sync, _) = start_window(&hub, &path, "preview");

    preview.set_font_size(12);
    hub.dispatch_pending();

    assert_eq!(editor.font_size(), 12);
    let check = SqliteKeyValueStore::open(&path).unwrap();
    let persisted = PreferenceSet::from_json(&check.read(SETTINGS_STORAGE_KEY).unwrap().unwrap())
        .unwrap();
    assert_eq!(persisted.font_size, 12);
}
