//! CRUD operations for [`User`] records.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::params;

use calshare_shared::User;

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user and return the assigned row id.
    ///
    /// Fails with a SQLite constraint error when the username or email is
    /// already taken.
    pub fn create_user(&self, user: &User) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO users (username, email, password_hash, display_name,
                                created_at, last_login, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.username,
                user.email,
                user.password_hash,
                user.display_name,
                user.created_at.timestamp_millis(),
                user.last_login.timestamp_millis(),
                user.is_active as i64,
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a user by row id.
    pub fn get_user_by_id(&self, id: i64) -> Result<User> {
        self.query_user("SELECT * FROM users WHERE id = ?1", params![id])
    }

    /// Fetch a user by exact (case-sensitive) username.
    pub fn get_user_by_username(&self, username: &str) -> Result<User> {
        self.query_user("SELECT * FROM users WHERE username = ?1", params![username])
    }

    /// Fetch a user by exact (case-sensitive) email.
    pub fn get_user_by_email(&self, email: &str) -> Result<User> {
        self.query_user("SELECT * FROM users WHERE email = ?1", params![email])
    }

    fn query_user(&self, sql: &str, params: impl rusqlite::Params) -> Result<User> {
        self.conn()
            .query_row(sql, params, row_to_user)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Record a successful login.
    pub fn update_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![at.timestamp_millis(), user_id],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`User`].
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        display_name: row.get("display_name")?,
        created_at: millis_column(row, "created_at")?,
        last_login: millis_column(row, "last_login")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
    })
}

pub(crate) fn millis_column(row: &rusqlite::Row<'_>, name: &str) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(name)?;
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Integer,
            format!("timestamp out of range: {ms}").into(),
        )
    })
}
