use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::UserId;

/// A stored position fix. One row per user; the row's existence is itself
/// the privacy contract: inactive or disconnected users have no row.
#[derive(Debug, Clone)]
pub struct StoredLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub last_updated: DateTime<Utc>,
}

/// In-memory location rows, authoritative for live matching. The durable
/// mirror (when enabled) is written by the handler, not here.
pub struct LocationState {
    rows: HashMap<UserId, StoredLocation>,
}

impl LocationState {
    pub fn new() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }

    /// Insert or replace, stamping the current time. Activity gating is the
    /// handler's responsibility, not the store's.
    pub fn upsert(&mut self, user_id: UserId, latitude: f64, longitude: f64) {
        self.rows.insert(
            user_id,
            StoredLocation {
                latitude,
                longitude,
                last_updated: Utc::now(),
            },
        );
    }

    /// Idempotent: deleting an absent row is not an error.
    pub fn delete(&mut self, user_id: UserId) {
        self.rows.remove(&user_id);
    }

    pub fn get(&self, user_id: UserId) -> Option<&StoredLocation> {
        self.rows.get(&user_id)
    }

    /// Rows newer than the staleness window. Older rows are treated as
    /// absent even though no reaper has removed them yet.
    pub fn fresh_rows(&self, staleness: Duration) -> Vec<(UserId, StoredLocation)> {
        let cutoff = Utc::now() - staleness;
        self.rows
            .iter()
            .filter(|(_, row)| row.last_updated > cutoff)
            .map(|(user_id, row)| (*user_id, row.clone()))
            .collect()
    }

    #[cfg(test)]
    pub fn backdate(&mut self, user_id: UserId, age: Duration) {
        if let Some(row) = self.rows.get_mut(&user_id) {
            row.last_updated = Utc::now() - age;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_and_restamps() {
        let mut store = LocationState::new();
        store.upsert(1, 37.0, -122.0);
        store.upsert(1, 38.0, -121.0);

        let row = store.get(1).unwrap();
        assert_eq!(row.latitude, 38.0);
        assert_eq!(row.longitude, -121.0);
        assert!(Utc::now() - row.last_updated < Duration::seconds(5));
    }

    #[test]
    fn delete_is_idempotent() {
        let mut store = LocationState::new();
        store.delete(9);
        store.upsert(9, 0.0, 0.0);
        store.delete(9);
        store.delete(9);
        assert!(store.get(9).is_none());
    }

    #[test]
    fn stale_rows_are_invisible_to_readers() {
        let mut store = LocationState::new();
        store.upsert(1, 37.0, -122.0);
        store.upsert(2, 37.0, -122.0);
        store.backdate(2, Duration::seconds(301));

        let fresh = store.fresh_rows(Duration::seconds(300));
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].0, 1);

        // The stale row was never deleted, only hidden.
        assert!(store.get(2).is_some());
    }
}
