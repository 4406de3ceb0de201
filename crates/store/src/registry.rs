//! Registry of every (set, key) ever observed, with last-seen times, for
//! staleness review.

use std::sync::Arc;

use rusqlite::params;

use crate::db::Store;
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownKey {
    pub key: String,
    pub last_seen: i64,
}

#[derive(Clone)]
pub struct KeyRegistry {
    db: Arc<Store>,
}

impl KeyRegistry {
    pub fn new(db: Arc<Store>) -> Self {
        Self { db }
    }

    /// Upsert an observation. An existing (set, key) row keeps the later of
    /// the two timestamps.
    pub fn record_observation(&self, set: &str, key: &str, last_seen: i64) -> Result<(), StoreError> {
        self.db.conn().execute(
            "INSERT INTO known_keys (set_name, key, last_seen) VALUES (?1, ?2, ?3)
             ON CONFLICT (set_name, key)
             DO UPDATE SET last_seen = MAX(last_seen, excluded.last_seen)",
            params![set, key, last_seen],
        )?;
        Ok(())
    }

    /// Distinct set names currently present, sorted.
    pub fn known_sets(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare("SELECT DISTINCT set_name FROM known_keys ORDER BY set_name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut sets = Vec::new();
        for row in rows {
            sets.push(row?);
        }
        Ok(sets)
    }

    /// All keys observed in `set`, sorted by key. The order is stable across
    /// calls absent mutation; the admin table rendering aligns rows by index
    /// and depends on that.
    pub fn known_keys(&self, set: &str) -> Result<Vec<KnownKey>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT key, last_seen FROM known_keys WHERE set_name = ?1 ORDER BY key",
        )?;
        let rows = stmt.query_map(params![set], |row| {
            Ok(KnownKey {
                key: row.get(0)?,
                last_seen: row.get(1)?,
            })
        })?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    /// Remove every observation under any of the listed set names. Unknown
    /// names are skipped silently.
    pub fn delete_sets(&self, names: &[String]) -> Result<(), StoreError> {
        let conn = self.db.conn();
        conn.execute("BEGIN TRANSACTION", [])?;
        {
            let mut stmt = conn.prepare("DELETE FROM known_keys WHERE set_name = ?1")?;
            for name in names {
                stmt.execute(params![name])?;
            }
        }
        conn.execute("COMMIT", [])?;
        Ok(())
    }

    /// Remove specific (set, key) rows. Unknown keys are skipped silently.
    pub fn delete_keys(&self, set: &str, keys: &[String]) -> Result<(), StoreError> {
        let conn = self.db.conn();
        conn.execute("BEGIN TRANSACTION", [])?;
        {
            let mut stmt =
                conn.prepare("DELETE FROM known_keys WHERE set_name = ?1 AND key = ?2")?;
            for key in keys {
                stmt.execute(params![set, key])?;
            }
        }
        conn.execute("COMMIT", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> KeyRegistry {
        KeyRegistry::new(Store::open_in_memory().unwrap())
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn observation_keeps_later_timestamp() {
        let reg = registry();
        reg.record_observation("powerschool", "alg-1", 100).unwrap();
        reg.record_observation("powerschool", "alg-1", 300).unwrap();
        reg.record_observation("powerschool", "alg-1", 200).unwrap();

        let keys = reg.known_keys("powerschool").unwrap();
        assert_eq!(keys, vec![KnownKey { key: "alg-1".into(), last_seen: 300 }]);
    }

    #[test]
    fn known_sets_are_distinct_and_sorted() {
        let reg = registry();
        reg.record_observation("powerschool", "a", 1).unwrap();
        reg.record_observation("canvas", "b", 1).unwrap();
        reg.record_observation("powerschool", "c", 1).unwrap();

        assert_eq!(reg.known_sets().unwrap(), names(&["canvas", "powerschool"]));
    }

    #[test]
    fn known_keys_order_is_stable() {
        let reg = registry();
        reg.record_observation("canvas", "chem", 5).unwrap();
        reg.record_observation("canvas", "alg", 5).unwrap();
        reg.record_observation("canvas", "bio", 5).unwrap();

        let first = reg.known_keys("canvas").unwrap();
        let second = reg.known_keys("canvas").unwrap();
        assert_eq!(first, second);
        let ordered: Vec<&str> = first.iter().map(|k| k.key.as_str()).collect();
        assert_eq!(ordered, vec!["alg", "bio", "chem"]);
    }

    #[test]
    fn delete_sets_removes_all_rows_for_each_name() {
        let reg = registry();
        reg.record_observation("powerschool", "a", 1).unwrap();
        reg.record_observation("powerschool", "b", 1).unwrap();
        reg.record_observation("canvas", "c", 1).unwrap();
        reg.record_observation("moodle", "d", 1).unwrap();

        reg.delete_sets(&names(&["powerschool", "moodle", "absent"])).unwrap();
        assert_eq!(reg.known_sets().unwrap(), names(&["canvas"]));
    }

    #[test]
    fn delete_keys_removes_only_named_rows() {
        let reg = registry();
        reg.record_observation("canvas", "a", 1).unwrap();
        reg.record_observation("canvas", "b", 1).unwrap();
        reg.record_observation("canvas", "c", 1).unwrap();

        reg.delete_keys("canvas", &names(&["a", "c", "absent"])).unwrap();
        let remaining = reg.known_keys("canvas").unwrap();
        let left: Vec<&str> = remaining.iter().map(|k| k.key.as_str()).collect();
        assert_eq!(left, vec!["b"]);
    }

    #[test]
    fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crosswalk.db");

        {
            let reg = KeyRegistry::new(Store::open(&path).unwrap());
            reg.record_observation("powerschool", "alg-1", 42).unwrap();
        }

        let reg = KeyRegistry::new(Store::open(&path).unwrap());
        assert_eq!(
            reg.known_keys("powerschool").unwrap(),
            vec![KnownKey { key: "alg-1".into(), last_seen: 42 }]
        );
    }
}
