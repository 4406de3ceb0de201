// Shared SQLite handle for the link table and the key registry.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS explicit_links (
    left_set  TEXT NOT NULL,
    left_key  TEXT NOT NULL,
    right_set TEXT NOT NULL,
    right_key TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS known_keys (
    set_name  TEXT NOT NULL,
    key       TEXT NOT NULL,
    last_seen INTEGER NOT NULL,
    PRIMARY KEY (set_name, key)
);
"#;

/// Owns the database connection. `explicit_links` deliberately carries no
/// uniqueness constraint: duplicate administrative inserts produce duplicate
/// rows.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Arc<Self>, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::init(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Arc<Self>, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: ":memory:".to_string(),
            message: e.to_string(),
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Arc<Self>, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Arc::new(Self {
            conn: Mutex::new(conn),
        }))
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}
