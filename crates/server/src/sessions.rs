//! Live session actors, one per user, spawned lazily on first channel attach
//! and kept for the life of the process.

use std::sync::Arc;

use dashmap::DashMap;
use db::DbService;
use db::models::{language_command::UserLanguageCommands, user_module::UserModule};
use engine::definitions::{LanguageCommandSet, UserModuleDefinition};
use engine::session::{SessionConfig, SessionHandle, SessionMessage, spawn_session};
use grammar::GrammarEngine;
use tracing::info;

use crate::error::ApiError;

pub struct SessionRegistry {
    db: DbService,
    engine: Arc<dyn GrammarEngine>,
    sessions: DashMap<i64, SessionHandle>,
}

impl SessionRegistry {
    pub fn new(db: DbService, engine: Arc<dyn GrammarEngine>) -> Self {
        Self {
            db,
            engine,
            sessions: DashMap::new(),
        }
    }

    /// Returns the user's session, spawning the actor on first use with the
    /// definitions currently persisted for them.
    pub async fn get_or_spawn(&self, id_user: i64) -> Result<SessionHandle, ApiError> {
        if let Some(handle) = self.sessions.get(&id_user) {
            return Ok(handle.value().clone());
        }

        let (modules, language_commands) = self.load_definitions(id_user).await?;
        let handle = self
            .sessions
            .entry(id_user)
            .or_insert_with(|| {
                info!(id_user, "spawning session");
                spawn_session(
                    id_user,
                    Arc::clone(&self.engine),
                    modules,
                    language_commands,
                    SessionConfig::default(),
                )
            })
            .clone();

        Ok(handle)
    }

    pub fn get(&self, id_user: i64) -> Option<SessionHandle> {
        self.sessions
            .get(&id_user)
            .map(|handle| handle.value().clone())
    }

    /// Pushes freshly persisted definitions into the user's session, if one
    /// is running. The rebuild itself is debounced inside the actor.
    pub async fn notify_definitions_changed(&self, id_user: i64) -> Result<(), ApiError> {
        let Some(handle) = self.get(id_user) else {
            return Ok(());
        };

        let (modules, language_commands) = self.load_definitions(id_user).await?;
        handle.send(SessionMessage::DefinitionsChanged {
            modules,
            language_commands,
        });
        Ok(())
    }

    async fn load_definitions(
        &self,
        id_user: i64,
    ) -> Result<(Vec<UserModuleDefinition>, Option<LanguageCommandSet>), ApiError> {
        let modules = UserModule::load_definitions(&self.db.pool, id_user).await?;
        let language_commands = UserLanguageCommands::find_by_user(&self.db.pool, id_user)
            .await?
            .map(|row| row.to_definition())
            .transpose()?;
        Ok((modules, language_commands))
    }
}
