//! Shared server state handed to every connection task.

use std::sync::Arc;

use parking_lot::Mutex;

use calshare_store::Database;

use crate::auth::AuthManager;
use crate::config::ServerConfig;
use crate::registry::SessionRegistry;

/// The store handle shared across tasks. The mutex is held only for the
/// duration of a single SQLite call, never across an await point.
pub type SharedDb = Arc<Mutex<Database>>;

/// Everything a connection or background task needs.
pub struct ServerState {
    pub config: ServerConfig,
    pub db: SharedDb,
    pub auth: AuthManager,
    pub registry: Arc<SessionRegistry>,
}

impl ServerState {
    pub fn new(config: ServerConfig, db: Database) -> Self {
        let db: SharedDb = Arc::new(Mutex::new(db));
        Self {
            config,
            auth: AuthManager::new(db.clone()),
            registry: Arc::new(SessionRegistry::new()),
            db,
        }
    }
}
