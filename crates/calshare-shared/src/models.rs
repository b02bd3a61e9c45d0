//! Domain model structs exchanged on the wire and persisted by the store.
//!
//! Every instant is serialized as integer epoch-milliseconds so payloads
//! stay compatible with clients on any platform.

use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A calendar event. Visible to every authenticated user; mutable only by
/// the user identified by `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Row id assigned by the store on creation (0 = not yet persisted).
    #[serde(default)]
    pub id: i64,
    /// Owner of the event, immutable after creation.
    #[serde(default)]
    pub user_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// When the event starts.
    #[serde(with = "ts_milliseconds")]
    pub event_time: DateTime<Utc>,
    /// When the reminder window opens. Always <= `event_time`.
    #[serde(with = "ts_milliseconds")]
    pub reminder_time: DateTime<Utc>,
    /// Display name of the creator (informational only).
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub reminder_sent: bool,
    #[serde(with = "ts_milliseconds", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Client-supplied event fields, before the server fills in the
/// authoritative parts.
#[derive(Deserialize)]
struct EventPayload {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    user_id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    event_time: i64,
    #[serde(default)]
    reminder_time: Option<i64>,
    #[serde(default)]
    creator: String,
    #[serde(default)]
    reminder_sent: bool,
    #[serde(default)]
    created_at: Option<i64>,
}

impl Event {
    /// Construct a new event owned by `user_id`, with the default reminder
    /// lead of one hour before the event.
    pub fn new(
        user_id: i64,
        title: impl Into<String>,
        description: impl Into<String>,
        event_time: DateTime<Utc>,
        creator: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            title: title.into(),
            description: description.into(),
            event_time,
            reminder_time: event_time - Duration::hours(1),
            creator: creator.into(),
            reminder_sent: false,
            created_at: Utc::now(),
        }
    }

    /// Decode an event from a request payload.
    ///
    /// Missing `reminder_time` falls back to one hour before `event_time`;
    /// a reminder after the event is clamped back to the event instant so
    /// the `reminder_time <= event_time` invariant always holds. An absent
    /// or empty title is rejected.
    pub fn from_payload(data: serde_json::Value) -> Result<Self, ProtocolError> {
        let payload: EventPayload = serde_json::from_value(data)?;

        if payload.title.trim().is_empty() {
            return Err(ProtocolError::MissingField("title"));
        }

        let event_time = millis_to_datetime(payload.event_time)?;
        let reminder_time = match payload.reminder_time {
            Some(ms) => millis_to_datetime(ms)?.min(event_time),
            None => event_time - Duration::hours(1),
        };
        let created_at = match payload.created_at {
            Some(ms) => millis_to_datetime(ms)?,
            None => Utc::now(),
        };

        Ok(Self {
            id: payload.id,
            user_id: payload.user_id,
            title: payload.title,
            description: payload.description,
            event_time,
            reminder_time,
            creator: payload.creator,
            reminder_sent: payload.reminder_sent,
            created_at,
        })
    }

    /// Whether the reminder window `[reminder_time, event_time)` is open
    /// and no reminder has been sent yet.
    pub fn needs_reminder(&self, now: DateTime<Utc>) -> bool {
        !self.reminder_sent && now >= self.reminder_time && now < self.event_time
    }

    /// Whole minutes until the event starts (negative once it has).
    pub fn minutes_until_start(&self, now: DateTime<Utc>) -> i64 {
        (self.event_time - now).num_minutes()
    }
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, ProtocolError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(ProtocolError::InvalidTimestamp(ms))
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account. `password_hash` is never serialized, so a `User`
/// can be embedded directly in replies sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    #[serde(default)]
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Salted hash in `hex(salt):hex(digest)` form. Never leaves the server.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(with = "ts_milliseconds", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds", default = "Utc::now")]
    pub last_login: DateTime<Utc>,
    /// Soft-disable flag; inactive accounts cannot log in.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl User {
    /// Construct a new active account. An empty display name falls back to
    /// the username.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        let username = username.into();
        let display_name = display_name.into();
        let display_name = if display_name.is_empty() {
            username.clone()
        } else {
            display_name
        };
        let now = Utc::now();
        Self {
            id: 0,
            username,
            email: email.into(),
            password_hash: password_hash.into(),
            display_name,
            created_at: now,
            last_login: now,
            is_active: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AuthToken
// ---------------------------------------------------------------------------

/// An in-memory bearer token minted on login. Valid until `expires_at`
/// unless revoked by logout first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthToken {
    pub token: String,
    pub user_id: i64,
    #[serde(with = "ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
