//! Ids for the accounts on the far end of an interaction

use anyhow::Context;
use rusqlite::Connection;
use rustc_hash::FxHashMap;

/// Name → id counter for interactors.
///
/// Interactors are often not in `artists`, so they get their own id space
/// starting at 1. [`InteractorIds::load`] picks up the ids already stored in
/// `artist_interactions` so later loads reuse them.
#[derive(Debug)]
pub struct InteractorIds {
    ids: FxHashMap<String, i64>,
    next: i64,
}

impl Default for InteractorIds {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractorIds {
    pub fn new() -> Self {
        Self {
            ids: FxHashMap::default(),
            next: 1,
        }
    }

    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        let mut stmt = conn
            .prepare(
                "SELECT artist_name_from, MIN(artist_id_from) FROM artist_interactions \
                 WHERE artist_name_from IS NOT NULL GROUP BY artist_name_from",
            )
            .context("Failed to prepare interactor query")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (name, id) = row.context("Failed to read interactor")?;
            registry.next = registry.next.max(id + 1);
            registry.ids.insert(name, id);
        }
        log::debug!("{} known interactors", registry.ids.len());
        Ok(registry)
    }

    pub fn get_or_assign(&mut self, name: &str) -> i64 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.next;
        self.next += 1;
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_per_name() {
        let mut ids = InteractorIds::new();
        assert_eq!(ids.get_or_assign("amy"), 1);
        assert_eq!(ids.get_or_assign("bo"), 2);
        assert_eq!(ids.get_or_assign("amy"), 1);
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn load_continues_after_stored_ids() {
        let conn = Connection::open_in_memory().unwrap();
        crate::schema::init(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO artists (id, artist_name) VALUES (1, 'amy'), (2, 'bo'); \
             INSERT INTO artist_interactions \
             (artist_id_to, artist_id_from, artist_name_from, interaction_type) \
             VALUES (1, 7, 'zed', 'watcher'), (2, 7, 'zed', 'friend'), (1, 3, 'cy', 'friend');",
        )
        .unwrap();
        let mut ids = InteractorIds::load(&conn).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids.get_or_assign("zed"), 7);
        assert_eq!(ids.get_or_assign("new"), 8);
    }
}
