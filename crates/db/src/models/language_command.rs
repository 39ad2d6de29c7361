use std::collections::HashMap;

use chrono::{DateTime, Utc};
use engine::definitions::{LanguageCode, LanguageCommandSet, LanguageSwitchCommand};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use ts_rs::TS;

#[derive(Debug, Error)]
pub enum LanguageCommandError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Language commands not found")]
    NotFound,
    #[error("Invalid definition JSON: {0}")]
    InvalidDefinition(#[from] serde_json::Error),
}

/// A user's language-switch phrases: the languages being listened to and,
/// per spoken language, the phrases that switch to another one. Both columns
/// are JSON.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct UserLanguageCommands {
    pub id: i64,
    pub id_user: i64,
    pub languages_to_listen: String,
    pub commands: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserLanguageCommands {
    pub async fn find_by_user(
        pool: &SqlitePool,
        id_user: i64,
    ) -> Result<Option<Self>, LanguageCommandError> {
        let row = sqlx::query_as::<_, UserLanguageCommands>(
            r#"SELECT * FROM user_language_commands WHERE id_user = ?1"#,
        )
        .bind(id_user)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    pub async fn upsert(
        pool: &SqlitePool,
        id_user: i64,
        definition: &LanguageCommandSet,
    ) -> Result<Self, LanguageCommandError> {
        let languages_to_listen = serde_json::to_string(&definition.languages_to_listen)?;
        let commands = serde_json::to_string(&definition.commands)?;

        let row = sqlx::query_as::<_, UserLanguageCommands>(
            r#"
            INSERT INTO user_language_commands (id_user, languages_to_listen, commands)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (id_user) DO UPDATE SET
                languages_to_listen = excluded.languages_to_listen,
                commands = excluded.commands,
                updated_at = datetime('now', 'subsec')
            RETURNING *
            "#,
        )
        .bind(id_user)
        .bind(languages_to_listen)
        .bind(commands)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    pub fn to_definition(&self) -> Result<LanguageCommandSet, LanguageCommandError> {
        let languages_to_listen: Vec<LanguageCode> =
            serde_json::from_str(&self.languages_to_listen)?;
        let commands: HashMap<LanguageCode, Vec<LanguageSwitchCommand>> =
            serde_json::from_str(&self.commands)?;

        Ok(LanguageCommandSet {
            languages_to_listen,
            commands,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbService;

    async fn test_db() -> (tempfile::TempDir, DbService) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.sqlite").display());
        let db = DbService::new(&url).await.unwrap();
        (dir, db)
    }

    fn definition() -> LanguageCommandSet {
        LanguageCommandSet {
            languages_to_listen: vec![LanguageCode::EnUs, LanguageCode::PtBr],
            commands: HashMap::from([(
                LanguageCode::EnUs,
                vec![LanguageSwitchCommand {
                    target_language: LanguageCode::PtBr,
                    pattern: "listen [in] brazilian portuguese".to_string(),
                    is_active: true,
                }],
            )]),
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (_dir, db) = test_db().await;

        UserLanguageCommands::upsert(&db.pool, 1, &definition())
            .await
            .unwrap();

        let row = UserLanguageCommands::find_by_user(&db.pool, 1)
            .await
            .unwrap()
            .expect("row");
        assert_eq!(row.to_definition().unwrap(), definition());
    }

    #[tokio::test]
    async fn test_upsert_replaces_previous_set() {
        let (_dir, db) = test_db().await;

        UserLanguageCommands::upsert(&db.pool, 1, &definition())
            .await
            .unwrap();
        let mut updated = definition();
        updated.languages_to_listen = vec![LanguageCode::EnUs];
        UserLanguageCommands::upsert(&db.pool, 1, &updated)
            .await
            .unwrap();

        let row = UserLanguageCommands::find_by_user(&db.pool, 1)
            .await
            .unwrap()
            .expect("row");
        assert_eq!(
            row.to_definition().unwrap().languages_to_listen,
            vec![LanguageCode::EnUs]
        );
    }

    #[tokio::test]
    async fn test_missing_user_yields_none() {
        let (_dir, db) = test_db().await;
        assert!(
            UserLanguageCommands::find_by_user(&db.pool, 99)
                .await
                .unwrap()
                .is_none()
        );
    }
}
