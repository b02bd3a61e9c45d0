//! Inbound message routing.
//!
//! Each text frame is decoded into the `{type, data, timestamp}` envelope
//! and routed to the auth gate or the event engine. Malformed frames are
//! logged and dropped without a reply; the connection stays open.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use calshare_shared::{protocol, protocol::error_code, Envelope};

use crate::events;
use crate::registry::SessionHandle;
use crate::state::ServerState;

/// Route one inbound frame.
pub async fn handle_message(state: &Arc<ServerState>, session: &Arc<SessionHandle>, text: &str) {
    let envelope = match protocol::parse_message(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(session = %session.id, error = %e, "dropping malformed message");
            return;
        }
    };

    match envelope.kind.as_str() {
        protocol::AUTH_LOGIN => auth_login(state, session, envelope.data),
        protocol::AUTH_REGISTER => auth_register(state, session, envelope.data),
        protocol::AUTH_LOGOUT => auth_logout(state, session, envelope.data),
        protocol::EVENT_CREATE => events::create(state, session, envelope.data).await,
        protocol::EVENT_UPDATE => events::update(state, session, envelope.data).await,
        protocol::EVENT_DELETE => events::delete(state, session, envelope.data).await,
        protocol::EVENT_LIST => events::list(state, session, envelope.data).await,
        protocol::HEARTBEAT => {
            session.send(&Envelope::new(protocol::HEARTBEAT, json!({})));
        }
        other => debug!(session = %session.id, kind = other, "ignoring unknown message type"),
    }
}

fn str_field<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

fn auth_login(state: &ServerState, session: &SessionHandle, data: Value) {
    let (Some(username), Some(password)) =
        (str_field(&data, "username"), str_field(&data, "password"))
    else {
        warn!(session = %session.id, "login without credentials");
        return;
    };

    match state.auth.login(username, password) {
        Some((token, user)) => {
            session.send(&Envelope::new(
                protocol::AUTH_SUCCESS,
                json!({ "token": token.token, "user": user }),
            ));
        }
        None => {
            session.send(&Envelope::auth_error(
                "Invalid username or password",
                error_code::INVALID_CREDENTIALS,
            ));
        }
    }
}

fn auth_register(state: &ServerState, session: &SessionHandle, data: Value) {
    let (Some(username), Some(email), Some(password)) = (
        str_field(&data, "username"),
        str_field(&data, "email"),
        str_field(&data, "password"),
    ) else {
        warn!(session = %session.id, "register with missing fields");
        return;
    };
    let display_name = str_field(&data, "display_name").unwrap_or_default();

    match state.auth.register(username, email, password, display_name) {
        Ok(_) => {
            session.send(&Envelope::new(
                protocol::AUTH_SUCCESS,
                json!({ "message": "Registration successful" }),
            ));
        }
        Err(e) => {
            session.send(&Envelope::auth_error(
                &e.to_string(),
                error_code::REGISTRATION_FAILED,
            ));
        }
    }
}

fn auth_logout(state: &ServerState, session: &SessionHandle, data: Value) {
    if let Some(token) = str_field(&data, "auth_token") {
        state.auth.logout(token);
    }
    // Logout is idempotent from the client's point of view.
    session.send(&Envelope::new(
        protocol::AUTH_SUCCESS,
        json!({ "message": "Logged out" }),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, Utc};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use calshare_store::Database;

    use crate::config::ServerConfig;

    struct TestClient {
        session: Arc<SessionHandle>,
        rx: mpsc::Receiver<Arc<String>>,
    }

    impl TestClient {
        async fn connect(state: &Arc<ServerState>) -> Self {
            let (tx, rx) = mpsc::channel(64);
            let session = Arc::new(SessionHandle::new(Uuid::new_v4(), tx));
            state.registry.add(session.clone()).await;
            Self { session, rx }
        }

        async fn say(&self, state: &Arc<ServerState>, kind: &str, data: Value) {
            let envelope = Envelope::new(kind, data);
            handle_message(state, &self.session, &envelope.encode()).await;
        }

        fn recv(&mut self) -> Envelope {
            let text = self.rx.try_recv().expect("expected a message");
            serde_json::from_str(&text).expect("reply should be a valid envelope")
        }

        fn silent(&mut self) -> bool {
            self.rx.try_recv().is_err()
        }
    }

    fn server_state() -> Arc<ServerState> {
        let db = Database::open_in_memory().unwrap();
        Arc::new(ServerState::new(ServerConfig::default(), db))
    }

    async fn register_and_login(
        state: &Arc<ServerState>,
        client: &mut TestClient,
        username: &str,
        email: &str,
    ) -> String {
        client
            .say(
                state,
                protocol::AUTH_REGISTER,
                json!({ "username": username, "email": email, "password": "secret1" }),
            )
            .await;
        let reply = client.recv();
        assert_eq!(reply.kind, protocol::AUTH_SUCCESS);

        client
            .say(
                state,
                protocol::AUTH_LOGIN,
                json!({ "username": username, "password": "secret1" }),
            )
            .await;
        let reply = client.recv();
        assert_eq!(reply.kind, protocol::AUTH_SUCCESS);
        assert_eq!(reply.data["user"]["username"], username);
        assert!(reply.data["user"].get("password_hash").is_none());
        reply.data["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn malformed_messages_are_dropped_silently() {
        let state = server_state();
        let mut client = TestClient::connect(&state).await;

        handle_message(&state, &client.session, "not json").await;
        handle_message(&state, &client.session, r#"{"data":{}}"#).await;
        assert!(client.silent());
    }

    #[tokio::test]
    async fn heartbeat_is_echoed() {
        let state = server_state();
        let mut client = TestClient::connect(&state).await;

        client.say(&state, protocol::HEARTBEAT, json!({})).await;
        assert_eq!(client.recv().kind, protocol::HEARTBEAT);
    }

    #[tokio::test]
    async fn login_with_bad_credentials() {
        let state = server_state();
        let mut client = TestClient::connect(&state).await;

        client
            .say(
                &state,
                protocol::AUTH_LOGIN,
                json!({ "username": "ghost", "password": "secret1" }),
            )
            .await;
        let reply = client.recv();
        assert_eq!(reply.kind, protocol::AUTH_ERROR);
        assert_eq!(reply.data["code"], error_code::INVALID_CREDENTIALS);
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let state = server_state();
        let mut client = TestClient::connect(&state).await;
        register_and_login(&state, &mut client, "alice", "alice@x.com").await;

        client
            .say(
                &state,
                protocol::AUTH_REGISTER,
                json!({ "username": "alice", "email": "new@x.com", "password": "secret1" }),
            )
            .await;
        let reply = client.recv();
        assert_eq!(reply.kind, protocol::AUTH_ERROR);
        assert_eq!(reply.data["code"], error_code::REGISTRATION_FAILED);
    }

    #[tokio::test]
    async fn mutations_require_a_token() {
        let state = server_state();
        let mut client = TestClient::connect(&state).await;

        client
            .say(
                &state,
                protocol::EVENT_CREATE,
                json!({ "title": "Standup", "event_time": Utc::now().timestamp_millis() }),
            )
            .await;
        let reply = client.recv();
        assert_eq!(reply.kind, protocol::AUTH_ERROR);
        assert_eq!(reply.data["code"], error_code::AUTH_REQUIRED);

        client
            .say(
                &state,
                protocol::EVENT_LIST,
                json!({ "auth_token": "bogus" }),
            )
            .await;
        let reply = client.recv();
        assert_eq!(reply.data["code"], error_code::INVALID_TOKEN);
    }

    #[tokio::test]
    async fn create_broadcasts_to_every_session() {
        let state = server_state();
        let mut alice = TestClient::connect(&state).await;
        let mut bob = TestClient::connect(&state).await;
        let mut carol = TestClient::connect(&state).await;

        let token = register_and_login(&state, &mut alice, "alice", "alice@x.com").await;
        let event_time = Utc::now() + Duration::hours(2);

        alice
            .say(
                &state,
                protocol::EVENT_CREATE,
                json!({
                    "title": "Standup",
                    "event_time": event_time.timestamp_millis(),
                    "auth_token": token,
                    "user_id": 999, // client-suggested owner must be ignored
                }),
            )
            .await;

        for client in [&mut alice, &mut bob, &mut carol] {
            let msg = client.recv();
            assert_eq!(msg.kind, protocol::EVENT_UPDATE);
            assert_eq!(msg.data["action"], "created");
            assert_eq!(msg.data["title"], "Standup");
            assert_eq!(msg.data["user_id"], 1);
            assert_eq!(msg.data["reminder_sent"], false);
            assert!(msg.data["id"].as_i64().unwrap() > 0);
        }
    }

    #[tokio::test]
    async fn update_by_non_owner_is_denied() {
        let state = server_state();
        let mut alice = TestClient::connect(&state).await;
        let mut bob = TestClient::connect(&state).await;

        let alice_token = register_and_login(&state, &mut alice, "alice", "alice@x.com").await;
        let bob_token = register_and_login(&state, &mut bob, "bob", "bob@x.com").await;

        let event_time = Utc::now() + Duration::hours(2);
        alice
            .say(
                &state,
                protocol::EVENT_CREATE,
                json!({
                    "title": "Standup",
                    "event_time": event_time.timestamp_millis(),
                    "auth_token": alice_token,
                }),
            )
            .await;
        let created = alice.recv();
        let event_id = created.data["id"].as_i64().unwrap();
        let _ = bob.recv(); // bob saw the broadcast too

        bob.say(
            &state,
            protocol::EVENT_UPDATE,
            json!({
                "id": event_id,
                "title": "Hijacked",
                "event_time": event_time.timestamp_millis(),
                "auth_token": bob_token,
            }),
        )
        .await;

        let denial = bob.recv();
        assert_eq!(denial.kind, protocol::AUTH_ERROR);
        assert_eq!(denial.data["code"], error_code::PERMISSION_DENIED);
        // No broadcast reached alice, and the stored event is untouched.
        assert!(alice.silent());
        let stored = state.db.lock().get_event_by_id(event_id).unwrap();
        assert_eq!(stored.title, "Standup");
    }

    #[tokio::test]
    async fn owner_update_and_delete_broadcast() {
        let state = server_state();
        let mut alice = TestClient::connect(&state).await;
        let mut bob = TestClient::connect(&state).await;

        let token = register_and_login(&state, &mut alice, "alice", "alice@x.com").await;
        let event_time = Utc::now() + Duration::hours(2);

        alice
            .say(
                &state,
                protocol::EVENT_CREATE,
                json!({
                    "title": "Standup",
                    "event_time": event_time.timestamp_millis(),
                    "auth_token": token,
                }),
            )
            .await;
        let event_id = alice.recv().data["id"].as_i64().unwrap();
        let _ = bob.recv();

        alice
            .say(
                &state,
                protocol::EVENT_UPDATE,
                json!({
                    "id": event_id,
                    "title": "Retro",
                    "event_time": event_time.timestamp_millis(),
                    "auth_token": token,
                }),
            )
            .await;
        for client in [&mut alice, &mut bob] {
            let msg = client.recv();
            assert_eq!(msg.kind, protocol::EVENT_UPDATE);
            assert_eq!(msg.data["action"], "updated");
            assert_eq!(msg.data["title"], "Retro");
        }

        alice
            .say(
                &state,
                protocol::EVENT_DELETE,
                json!({ "id": event_id, "auth_token": token }),
            )
            .await;
        for client in [&mut alice, &mut bob] {
            let msg = client.recv();
            assert_eq!(msg.kind, protocol::EVENT_DELETE);
            assert_eq!(msg.data["id"], event_id);
            assert_eq!(msg.data["action"], "deleted");
        }

        // Deleting again has no effect and no broadcast.
        alice
            .say(
                &state,
                protocol::EVENT_DELETE,
                json!({ "id": event_id, "auth_token": token }),
            )
            .await;
        assert!(alice.silent());
        assert!(bob.silent());
    }

    #[tokio::test]
    async fn list_is_shared_sorted_and_private_to_requester() {
        let state = server_state();
        let mut alice = TestClient::connect(&state).await;
        let mut bob = TestClient::connect(&state).await;

        let alice_token = register_and_login(&state, &mut alice, "alice", "alice@x.com").await;
        let bob_token = register_and_login(&state, &mut bob, "bob", "bob@x.com").await;

        let base = Utc::now() + Duration::hours(1);
        alice
            .say(
                &state,
                protocol::EVENT_CREATE,
                json!({
                    "title": "Later",
                    "event_time": (base + Duration::hours(3)).timestamp_millis(),
                    "auth_token": alice_token,
                }),
            )
            .await;
        let _ = (alice.recv(), bob.recv());
        bob.say(
            &state,
            protocol::EVENT_CREATE,
            json!({
                "title": "Sooner",
                "event_time": base.timestamp_millis(),
                "auth_token": bob_token,
            }),
        )
        .await;
        let _ = (alice.recv(), bob.recv());

        // Both users see both events, soonest first.
        alice
            .say(&state, protocol::EVENT_LIST, json!({ "auth_token": alice_token }))
            .await;
        let listing = alice.recv();
        assert_eq!(listing.kind, protocol::EVENT_LIST);
        let events = listing.data.as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["title"], "Sooner");
        assert_eq!(events[1]["title"], "Later");

        // The list reply went to the requester only.
        assert!(bob.silent());
    }

    #[tokio::test]
    async fn logout_revokes_token_for_mutations() {
        let state = server_state();
        let mut alice = TestClient::connect(&state).await;
        let token = register_and_login(&state, &mut alice, "alice", "alice@x.com").await;

        alice
            .say(&state, protocol::AUTH_LOGOUT, json!({ "auth_token": token }))
            .await;
        assert_eq!(alice.recv().kind, protocol::AUTH_SUCCESS);

        alice
            .say(&state, protocol::EVENT_LIST, json!({ "auth_token": token }))
            .await;
        let reply = alice.recv();
        assert_eq!(reply.kind, protocol::AUTH_ERROR);
        assert_eq!(reply.data["code"], error_code::INVALID_TOKEN);
    }
}
