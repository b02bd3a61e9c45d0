//! CRUD operations for [`Event`] records.

use rusqlite::params;

use calshare_shared::Event;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::users::millis_column;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new event and return the assigned row id.
    pub fn create_event(&self, event: &Event) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO events (user_id, title, description, event_time,
                                 reminder_time, creator, reminder_sent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.user_id,
                event.title,
                event.description,
                event.event_time.timestamp_millis(),
                event.reminder_time.timestamp_millis(),
                event.creator,
                event.reminder_sent as i64,
                event.created_at.timestamp_millis(),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single event by id.
    pub fn get_event_by_id(&self, id: i64) -> Result<Event> {
        self.conn()
            .query_row("SELECT * FROM events WHERE id = ?1", params![id], row_to_event)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List every event, soonest first. Ties on `event_time` keep
    /// insertion order.
    pub fn get_all_events(&self) -> Result<Vec<Event>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT * FROM events ORDER BY event_time ASC, id ASC")?;

        let rows = stmt.query_map([], row_to_event)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// List events whose reminder has not been sent yet, ordered by
    /// reminder time. The caller decides which are actually due.
    pub fn get_events_needing_reminder(&self) -> Result<Vec<Event>> {
        let mut stmt = self.conn().prepare(
            "SELECT * FROM events WHERE reminder_sent = 0 ORDER BY reminder_time ASC",
        )?;

        let rows = stmt.query_map([], row_to_event)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Overwrite the mutable fields of an existing event. `user_id` and
    /// `created_at` are never touched. Returns `true` if a row matched.
    pub fn update_event(&self, event: &Event) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE events
             SET title = ?1, description = ?2, event_time = ?3,
                 reminder_time = ?4, creator = ?5, reminder_sent = ?6
             WHERE id = ?7",
            params![
                event.title,
                event.description,
                event.event_time.timestamp_millis(),
                event.reminder_time.timestamp_millis(),
                event.creator,
                event.reminder_sent as i64,
                event.id,
            ],
        )?;
        Ok(affected > 0)
    }

    /// Flip `reminder_sent` to true. Returns `true` if a row matched.
    pub fn mark_reminder_sent(&self, event_id: i64) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE events SET reminder_sent = 1 WHERE id = ?1",
            params![event_id],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete an event by id. Returns `true` if a row was deleted.
    pub fn delete_event(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM events WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to an [`Event`].
fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        description: row.get::<_, Option<String>>("description")?.unwrap_or_default(),
        event_time: millis_column(row, "event_time")?,
        reminder_time: millis_column(row, "reminder_time")?,
        creator: row.get::<_, Option<String>>("creator")?.unwrap_or_default(),
        reminder_sent: row.get::<_, i64>("reminder_sent")? != 0,
        created_at: millis_column(row, "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use calshare_shared::User;
    use chrono::{Duration, TimeZone, Utc};

    fn open_with_user() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let user_id = db
            .create_user(&User::new("alice", "a@example.com", "h", ""))
            .unwrap();
        (db, user_id)
    }

    #[test]
    fn create_and_round_trip() {
        let (db, user_id) = open_with_user();
        let when = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let event = Event::new(user_id, "Standup", "daily", when, "alice");

        let id = db.create_event(&event).unwrap();
        assert!(id > 0);

        let stored = db.get_event_by_id(id).unwrap();
        assert_eq!(stored.title, "Standup");
        assert_eq!(stored.user_id, user_id);
        assert_eq!(stored.event_time, when);
        assert_eq!(stored.reminder_time, when - Duration::hours(1));
        assert!(!stored.reminder_sent);
    }

    #[test]
    fn all_events_sorted_by_time_then_id() {
        let (db, user_id) = open_with_user();
        let base = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        let later = db
            .create_event(&Event::new(user_id, "Later", "", base + Duration::hours(2), ""))
            .unwrap();
        let first_tie = db
            .create_event(&Event::new(user_id, "TieA", "", base, ""))
            .unwrap();
        let second_tie = db
            .create_event(&Event::new(user_id, "TieB", "", base, ""))
            .unwrap();

        let all = db.get_all_events().unwrap();
        let ids: Vec<i64> = all.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![first_tie, second_tie, later]);
    }

    #[test]
    fn update_preserves_owner_and_created_at() {
        let (db, user_id) = open_with_user();
        let when = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let mut event = Event::new(user_id, "Standup", "", when, "alice");
        event.id = db.create_event(&event).unwrap();

        let original = db.get_event_by_id(event.id).unwrap();

        event.title = "Retro".into();
        event.user_id = 999; // must not be persisted
        assert!(db.update_event(&event).unwrap());

        let stored = db.get_event_by_id(event.id).unwrap();
        assert_eq!(stored.title, "Retro");
        assert_eq!(stored.user_id, user_id);
        assert_eq!(stored.created_at, original.created_at);
    }

    #[test]
    fn update_missing_event_is_false() {
        let (db, user_id) = open_with_user();
        let mut event = Event::new(user_id, "Ghost", "", Utc::now(), "");
        event.id = 12345;
        assert!(!db.update_event(&event).unwrap());
    }

    #[test]
    fn delete_is_idempotent() {
        let (db, user_id) = open_with_user();
        let id = db
            .create_event(&Event::new(user_id, "Standup", "", Utc::now(), ""))
            .unwrap();

        assert!(db.delete_event(id).unwrap());
        assert!(!db.delete_event(id).unwrap());
        assert!(matches!(db.get_event_by_id(id), Err(StoreError::NotFound)));
    }

    #[test]
    fn needing_reminder_excludes_sent() {
        let (db, user_id) = open_with_user();
        let soon = Utc::now() + Duration::minutes(30);

        let pending = db
            .create_event(&Event::new(user_id, "Pending", "", soon, ""))
            .unwrap();
        let sent_id = db
            .create_event(&Event::new(user_id, "Sent", "", soon, ""))
            .unwrap();
        assert!(db.mark_reminder_sent(sent_id).unwrap());

        let candidates = db.get_events_needing_reminder().unwrap();
        let ids: Vec<i64> = candidates.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![pending]);

        let sent = db.get_event_by_id(sent_id).unwrap();
        assert!(sent.reminder_sent);
    }
}
