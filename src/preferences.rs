//! Persistent view preferences
//!
//! Preferences live in a small SQLite key-value store under the user's local
//! data directory. Values are stored as text under the same keys the desktop
//! application uses, so both read the same settings.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::query::QueryPreferences;
use crate::refresh::{RefreshBus, RefreshEvent};

pub const KEY_PAGE_SIZE: &str = "resultsTablePageSize";
pub const KEY_HIDE_KNOWN: &str = "hideKnownFilesInViewsTree";
pub const KEY_HIDE_SLACK: &str = "hideSlackFilesInViewsTree";
pub const KEY_LOCAL_TIME: &str = "displayTimesInLocalTime";

pub const DEFAULT_PAGE_SIZE: i64 = 10_000;

// ============================================================================
// Data Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewPreferences {
    /// Children per page; `<= 0` disables paging
    pub page_size: i64,
    pub hide_known_files: bool,
    pub hide_slack_files: bool,
    pub display_local_time: bool,
}

impl Default for ViewPreferences {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            hide_known_files: false,
            hide_slack_files: false,
            display_local_time: true,
        }
    }
}

impl ViewPreferences {
    /// The subset that shapes view WHERE clauses
    pub fn query_preferences(&self) -> QueryPreferences {
        QueryPreferences {
            hide_known_files: self.hide_known_files,
            hide_slack_files: self.hide_slack_files,
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// SQLite-backed settings table
pub struct PreferencesStore {
    conn: Mutex<Connection>,
}

impl PreferencesStore {
    /// Open (or create) the store at the given path
    pub fn new(db_path: &Path) -> CoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        debug!("Preferences store ready at: {:?}", db_path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> CoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CoreError::DataAccess("preferences store poisoned".to_string()))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> CoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> CoreResult<Option<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;

        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    /// Read all view preferences; missing or unparsable values take their
    /// defaults
    pub fn load(&self) -> CoreResult<ViewPreferences> {
        let defaults = ViewPreferences::default();
        Ok(ViewPreferences {
            page_size: self.parsed(KEY_PAGE_SIZE, defaults.page_size)?,
            hide_known_files: self.parsed(KEY_HIDE_KNOWN, defaults.hide_known_files)?,
            hide_slack_files: self.parsed(KEY_HIDE_SLACK, defaults.hide_slack_files)?,
            display_local_time: self.parsed(KEY_LOCAL_TIME, defaults.display_local_time)?,
        })
    }

    pub fn save(&self, prefs: &ViewPreferences) -> CoreResult<()> {
        self.set_setting(KEY_PAGE_SIZE, &prefs.page_size.to_string())?;
        self.set_setting(KEY_HIDE_KNOWN, &prefs.hide_known_files.to_string())?;
        self.set_setting(KEY_HIDE_SLACK, &prefs.hide_slack_files.to_string())?;
        self.set_setting(KEY_LOCAL_TIME, &prefs.display_local_time.to_string())?;
        Ok(())
    }

    /// Persist a new page size and tell every live branch to re-page.
    /// Returns the number of channels notified.
    pub fn set_page_size(&self, page_size: i64, bus: &RefreshBus) -> CoreResult<usize> {
        self.set_setting(KEY_PAGE_SIZE, &page_size.to_string())?;
        let notified = bus.broadcast(RefreshEvent::PageSizeChanged(page_size));
        info!(page_size, channels = notified, "Results page size changed");
        Ok(notified)
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> CoreResult<T> {
        match self.get_setting(key)? {
            Some(raw) => match raw.trim().parse() {
                Ok(value) => Ok(value),
                Err(_) => {
                    warn!(key, value = %raw, "Ignoring unparsable preference");
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }
}

// ============================================================================
// Global Store Instance
// ============================================================================

static STORE: OnceLock<PreferencesStore> = OnceLock::new();

/// Default location of the preferences database
pub fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("case-views")
        .join("preferences.db")
}

/// Get the global store, opening it at the default location if needed
pub fn get_store() -> CoreResult<&'static PreferencesStore> {
    if let Some(store) = STORE.get() {
        return Ok(store);
    }
    let path = default_store_path();
    info!("Initializing preferences store at: {:?}", path);
    init_store(path)
}

/// Initialize the global store at a custom path. The first store wins.
pub fn init_store(db_path: PathBuf) -> CoreResult<&'static PreferencesStore> {
    let store = PreferencesStore::new(&db_path)?;
    let _ = STORE.set(store);
    STORE
        .get()
        .ok_or_else(|| CoreError::Configuration("preferences store unavailable".to_string()))
}
