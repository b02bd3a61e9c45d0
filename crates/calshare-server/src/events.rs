//! The event broadcast engine: applies create/update/delete/list against
//! the store and fans changes out to every live session.
//!
//! Every operation here is gated on a valid `auth_token` in the payload.
//! Ownership is enforced against the *stored* record, never the payload,
//! so a client cannot spoof its way past the check.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use calshare_shared::{protocol, protocol::error_code, Envelope, Event};
use calshare_store::StoreError;

use crate::registry::SessionHandle;
use crate::state::ServerState;

/// Resolve the payload's `auth_token` to a user id, replying with the
/// appropriate `auth_error` (to the requester only) when it is missing or
/// invalid.
fn authenticate(state: &ServerState, session: &SessionHandle, data: &Value) -> Option<i64> {
    let Some(token) = data.get("auth_token").and_then(Value::as_str) else {
        session.send(&Envelope::auth_error(
            "Authentication required",
            error_code::AUTH_REQUIRED,
        ));
        return None;
    };

    match state.auth.user_id_for(token) {
        Some(user_id) => Some(user_id),
        None => {
            session.send(&Envelope::auth_error(
                "Invalid or expired token",
                error_code::INVALID_TOKEN,
            ));
            None
        }
    }
}

/// Create an event owned by the requester and broadcast it to everyone.
pub async fn create(state: &ServerState, session: &SessionHandle, data: Value) {
    let Some(user_id) = authenticate(state, session, &data) else {
        return;
    };

    let mut event = match Event::from_payload(data) {
        Ok(event) => event,
        Err(e) => {
            warn!(session = %session.id, error = %e, "dropping malformed event payload");
            return;
        }
    };

    // The server is authoritative for ownership and bookkeeping fields.
    event.user_id = user_id;
    event.reminder_sent = false;
    event.created_at = Utc::now();

    let created = { state.db.lock().create_event(&event) };
    match created {
        Ok(id) => {
            event.id = id;
            info!(event_id = id, title = %event.title, user_id, "event created");
            broadcast_event(state, &event, "created").await;
        }
        Err(e) => {
            error!(error = %e, "failed to persist new event");
        }
    }
}

/// Update an event if the requester owns it, then broadcast the new state.
pub async fn update(state: &ServerState, session: &SessionHandle, data: Value) {
    let Some(user_id) = authenticate(state, session, &data) else {
        return;
    };

    let mut event = match Event::from_payload(data) {
        Ok(event) => event,
        Err(e) => {
            warn!(session = %session.id, error = %e, "dropping malformed event payload");
            return;
        }
    };
    if event.id == 0 {
        warn!(session = %session.id, "update without event id");
        return;
    }

    let existing = { state.db.lock().get_event_by_id(event.id) };
    let existing = match existing {
        Ok(existing) => existing,
        Err(StoreError::NotFound) => {
            debug!(event_id = event.id, "update for unknown event");
            return;
        }
        Err(e) => {
            error!(error = %e, event_id = event.id, "event lookup failed");
            return;
        }
    };

    if existing.user_id != user_id {
        debug!(event_id = event.id, owner = existing.user_id, requester = user_id, "update denied");
        session.send(&Envelope::auth_error(
            "You can only modify your own events",
            error_code::PERMISSION_DENIED,
        ));
        return;
    }

    // Ownership and creation time survive every update.
    event.user_id = existing.user_id;
    event.created_at = existing.created_at;

    let updated = { state.db.lock().update_event(&event) };
    match updated {
        Ok(true) => {
            info!(event_id = event.id, title = %event.title, "event updated");
            broadcast_event(state, &event, "updated").await;
        }
        Ok(false) => warn!(event_id = event.id, "event vanished before update"),
        Err(e) => error!(error = %e, event_id = event.id, "failed to persist event update"),
    }
}

/// Delete an event if the requester owns it, then broadcast the deletion.
pub async fn delete(state: &ServerState, session: &SessionHandle, data: Value) {
    let Some(user_id) = authenticate(state, session, &data) else {
        return;
    };

    let Some(event_id) = data.get("id").and_then(Value::as_i64) else {
        warn!(session = %session.id, "delete without event id");
        return;
    };

    let existing = { state.db.lock().get_event_by_id(event_id) };
    let existing = match existing {
        Ok(existing) => existing,
        Err(StoreError::NotFound) => {
            debug!(event_id, "delete for unknown event");
            return;
        }
        Err(e) => {
            error!(error = %e, event_id, "event lookup failed");
            return;
        }
    };

    if existing.user_id != user_id {
        debug!(event_id, owner = existing.user_id, requester = user_id, "delete denied");
        session.send(&Envelope::auth_error(
            "You can only delete your own events",
            error_code::PERMISSION_DENIED,
        ));
        return;
    }

    let deleted = { state.db.lock().delete_event(event_id) };
    match deleted {
        Ok(true) => {
            info!(event_id, "event deleted");
            state
                .registry
                .broadcast(&Envelope::new(
                    protocol::EVENT_DELETE,
                    json!({ "id": event_id, "action": "deleted" }),
                ))
                .await;
        }
        Ok(false) => debug!(event_id, "event vanished before delete"),
        Err(e) => error!(error = %e, event_id, "failed to delete event"),
    }
}

/// Send the full event list (all users' events, soonest first) to the
/// requesting session only.
pub async fn list(state: &ServerState, session: &SessionHandle, data: Value) {
    if authenticate(state, session, &data).is_none() {
        return;
    }

    let events = { state.db.lock().get_all_events() };
    match events {
        Ok(events) => {
            let Ok(data) = serde_json::to_value(&events) else {
                return;
            };
            session.send(&Envelope::new(protocol::EVENT_LIST, data));
        }
        Err(e) => error!(error = %e, "failed to list events"),
    }
}

/// Broadcast `{...event, action}` as an `event_update` message to every
/// live session, the requester included.
pub async fn broadcast_event(state: &ServerState, event: &Event, action: &str) {
    let Ok(mut data) = serde_json::to_value(event) else {
        return;
    };
    if let Some(obj) = data.as_object_mut() {
        obj.insert("action".to_string(), json!(action));
    }
    state
        .registry
        .broadcast(&Envelope::new(protocol::EVENT_UPDATE, data))
        .await;
}
