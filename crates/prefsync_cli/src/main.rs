//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `prefsync_core` linkage (`ping`, version).
//! - Run two windows against one SQLite file and the in-process hub, then
//!   print what each replica and the database hold.

use prefsync_core::{
    default_log_level, init_logging, KeyValueStore, LocalEventHub, PreferencePatch,
    SettingsStore, SqliteKeyValueStore, SyncController, SETTINGS_STORAGE_KEY,
};
use std::error::Error;
use std::path::Path;
use std::process::ExitCode;
use std::rc::Rc;

const DB_FILE_NAME: &str = "prefsync_demo.sqlite3";

fn main() -> ExitCode {
    println!("prefsync_core ping={}", prefsync_core::ping());
    println!("prefsync_core version={}", prefsync_core::core_version());

    match run_demo() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("demo failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_demo() -> Result<(), Box<dyn Error>> {
    let workdir = tempfile::tempdir()?;
    let log_dir = workdir.path().join("logs");
    init_logging(default_log_level(), &log_dir.to_string_lossy())?;

    let db_path = workdir.path().join(DB_FILE_NAME);
    let hub = LocalEventHub::new();
    let (editor, _editor_sync) = open_window(&hub, &db_path, "editor")?;
    let (preview, _preview_sync) = open_window(&hub, &db_path, "preview")?;

    editor.merge(PreferencePatch::new().with_font_size(18));
    preview.set_word_wrap(true);
    let delivered = hub.dispatch_pending();

    println!("delivered={delivered} published={}", hub.published_count());
    println!("editor={}", editor.get().to_json()?);
    println!("preview={}", preview.get().to_json()?);

    let check = SqliteKeyValueStore::open(&db_path)?;
    let persisted = check
        .read(SETTINGS_STORAGE_KEY)?
        .unwrap_or_else(|| "<absent>".to_string());
    println!("stored={persisted}");
    Ok(())
}

fn open_window(
    hub: &LocalEventHub,
    db_path: &Path,
    label: &str,
) -> Result<(SettingsStore, SyncController), Box<dyn Error>> {
    let store = SettingsStore::new();
    let storage = SqliteKeyValueStore::open(db_path)?;
    let mut controller =
        SyncController::new(store.clone(), Rc::new(storage), Rc::new(hub.endpoint(label)));
    let report = controller.initialize()?;
    println!(
        "window={label} hydration={:?} bus_subscribed={}",
        report.hydration, report.bus_subscribed
    );
    Ok((store, controller))
}
