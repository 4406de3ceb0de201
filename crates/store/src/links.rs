//! Administrator-curated explicit links.
//!
//! A link is stored once in whatever orientation the administrator gave it
//! and answers queries from either side: reads normalize every row into the
//! caller's requested orientation through [`oriented`], the one place the
//! symmetry invariant lives.

use std::sync::Arc;

use rusqlite::params;

use crate::db::Store;
use crate::error::StoreError;

/// One explicit link, already normalized into the caller's orientation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPair {
    pub left: String,
    pub right: String,
}

/// A row as stored, before orientation.
struct StoredLink {
    left_set: String,
    left_key: String,
    right_key: String,
}

/// Normalize a stored row into the orientation the caller asked for: rows
/// stored with the requested left set on the right side are swapped.
fn oriented(row: StoredLink, requested_left_set: &str) -> LinkPair {
    if row.left_set == requested_left_set {
        LinkPair {
            left: row.left_key,
            right: row.right_key,
        }
    } else {
        LinkPair {
            left: row.right_key,
            right: row.left_key,
        }
    }
}

#[derive(Clone)]
pub struct LinkStore {
    db: Arc<Store>,
}

impl LinkStore {
    pub fn new(db: Arc<Store>) -> Self {
        Self { db }
    }

    /// Insert a link unconditionally. Calling twice with identical arguments
    /// inserts two rows.
    pub fn add(
        &self,
        left_set: &str,
        left_key: &str,
        right_set: &str,
        right_key: &str,
    ) -> Result<(), StoreError> {
        self.db.conn().execute(
            "INSERT INTO explicit_links (left_set, left_key, right_set, right_key)
             VALUES (?1, ?2, ?3, ?4)",
            params![left_set, left_key, right_set, right_key],
        )?;
        Ok(())
    }

    /// Delete every row equal to the 4-tuple exactly, as stored. Deleting a
    /// link that does not exist is not an error.
    pub fn delete(
        &self,
        left_set: &str,
        left_key: &str,
        right_set: &str,
        right_key: &str,
    ) -> Result<(), StoreError> {
        self.db.conn().execute(
            "DELETE FROM explicit_links
             WHERE left_set = ?1 AND left_key = ?2 AND right_set = ?3 AND right_key = ?4",
            params![left_set, left_key, right_set, right_key],
        )?;
        Ok(())
    }

    /// Every link between the two sets, regardless of stored orientation,
    /// normalized so `left` belongs to `left_set`. Insertion order.
    pub fn get(&self, left_set: &str, right_set: &str) -> Result<Vec<LinkPair>, StoreError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT left_set, left_key, right_key FROM explicit_links
             WHERE (left_set = ?1 AND right_set = ?2)
                OR (left_set = ?2 AND right_set = ?1)
             ORDER BY rowid",
        )?;

        let rows = stmt.query_map(params![left_set, right_set], |row| {
            Ok(StoredLink {
                left_set: row.get(0)?,
                left_key: row.get(1)?,
                right_key: row.get(2)?,
            })
        })?;

        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(oriented(row?, left_set));
        }
        Ok(pairs)
    }
}
