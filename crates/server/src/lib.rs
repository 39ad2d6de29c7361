use std::sync::Arc;

use db::DbService;
use grammar::GrammarEngine;

pub mod error;
pub mod routes;
pub mod sessions;

use sessions::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub db: DbService,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(db: DbService, engine: Arc<dyn GrammarEngine>) -> Self {
        let sessions = Arc::new(SessionRegistry::new(db.clone(), engine));
        Self { db, sessions }
    }
}
