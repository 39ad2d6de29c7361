use chrono::{DateTime, Utc};
use engine::definitions::{
    CommandDefinition, FeatureDefinition, ModuleCommandSet, UserModuleDefinition,
};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use ts_rs::TS;

#[derive(Debug, Error)]
pub enum UserModuleError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("User module not found")]
    NotFound,
    #[error("Invalid definition JSON: {0}")]
    InvalidDefinition(#[from] serde_json::Error),
    #[error("Invalid language code: {0}")]
    InvalidLanguage(String),
}

/// One module as installed by a user. The feature contract the module
/// declared at install time is stored as JSON.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct UserModule {
    pub id: i64,
    pub id_user: i64,
    pub id_module: i64,
    pub name: String,
    pub is_active: bool,
    pub features: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserModule {
    pub id_user: i64,
    pub id_module: i64,
    pub name: String,
    #[serde(default)]
    pub features: Vec<FeatureDefinition>,
}

/// The command set of one user module for one language.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct UserModuleCommandSet {
    pub id: i64,
    pub id_user_module: i64,
    pub language: String,
    pub commands: String,
    pub prefix: Option<String>,
    pub is_prefix_mandated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UpsertModuleCommands {
    #[serde(default)]
    pub commands: Vec<CommandDefinition>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub is_prefix_mandated: bool,
}

impl UserModule {
    pub async fn create(
        pool: &SqlitePool,
        data: CreateUserModule,
    ) -> Result<Self, UserModuleError> {
        let features = serde_json::to_string(&data.features)?;
        let user_module = sqlx::query_as::<_, UserModule>(
            r#"
            INSERT INTO user_modules (id_user, id_module, name, features)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING *
            "#,
        )
        .bind(data.id_user)
        .bind(data.id_module)
        .bind(&data.name)
        .bind(features)
        .fetch_one(pool)
        .await?;

        Ok(user_module)
    }

    pub async fn find_by_user(
        pool: &SqlitePool,
        id_user: i64,
    ) -> Result<Vec<Self>, UserModuleError> {
        let user_modules = sqlx::query_as::<_, UserModule>(
            r#"SELECT * FROM user_modules WHERE id_user = ?1 ORDER BY id ASC"#,
        )
        .bind(id_user)
        .fetch_all(pool)
        .await?;

        Ok(user_modules)
    }

    pub async fn find_for_user(
        pool: &SqlitePool,
        id: i64,
        id_user: i64,
    ) -> Result<Self, UserModuleError> {
        sqlx::query_as::<_, UserModule>(
            r#"SELECT * FROM user_modules WHERE id = ?1 AND id_user = ?2"#,
        )
        .bind(id)
        .bind(id_user)
        .fetch_optional(pool)
        .await?
        .ok_or(UserModuleError::NotFound)
    }

    pub async fn set_active(
        pool: &SqlitePool,
        id: i64,
        id_user: i64,
        is_active: bool,
    ) -> Result<Self, UserModuleError> {
        sqlx::query_as::<_, UserModule>(
            r#"
            UPDATE user_modules
            SET is_active = ?3, updated_at = datetime('now', 'subsec')
            WHERE id = ?1 AND id_user = ?2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(id_user)
        .bind(is_active)
        .fetch_optional(pool)
        .await?
        .ok_or(UserModuleError::NotFound)
    }

    /// Assembles the engine-facing definitions for every module the user has
    /// installed, command sets included.
    pub async fn load_definitions(
        pool: &SqlitePool,
        id_user: i64,
    ) -> Result<Vec<UserModuleDefinition>, UserModuleError> {
        let user_modules = Self::find_by_user(pool, id_user).await?;

        let mut definitions = Vec::with_capacity(user_modules.len());
        for user_module in user_modules {
            let command_sets =
                UserModuleCommandSet::find_by_user_module(pool, user_module.id).await?;
            definitions.push(user_module.to_definition(&command_sets)?);
        }

        Ok(definitions)
    }

    pub fn to_definition(
        &self,
        command_sets: &[UserModuleCommandSet],
    ) -> Result<UserModuleDefinition, UserModuleError> {
        let features: Vec<FeatureDefinition> = serde_json::from_str(&self.features)?;
        let command_sets = command_sets
            .iter()
            .map(UserModuleCommandSet::to_definition)
            .collect::<Result<Vec<ModuleCommandSet>, UserModuleError>>()?;

        Ok(UserModuleDefinition {
            id_module: self.id_module,
            name: self.name.clone(),
            is_active: self.is_active,
            command_sets,
            features,
        })
    }
}

impl UserModuleCommandSet {
    pub async fn find_by_user_module(
        pool: &SqlitePool,
        id_user_module: i64,
    ) -> Result<Vec<Self>, UserModuleError> {
        let command_sets = sqlx::query_as::<_, UserModuleCommandSet>(
            r#"SELECT * FROM user_module_commands WHERE id_user_module = ?1 ORDER BY id ASC"#,
        )
        .bind(id_user_module)
        .fetch_all(pool)
        .await?;

        Ok(command_sets)
    }

    /// Creates or updates the command set of a user module for one language.
    /// The module must belong to the given user.
    pub async fn upsert(
        pool: &SqlitePool,
        id_user: i64,
        id_user_module: i64,
        language: &str,
        data: UpsertModuleCommands,
    ) -> Result<Self, UserModuleError> {
        // Reject writes to a module the authenticated user does not own.
        UserModule::find_for_user(pool, id_user_module, id_user).await?;

        let commands = serde_json::to_string(&data.commands)?;
        let command_set = sqlx::query_as::<_, UserModuleCommandSet>(
            r#"
            INSERT INTO user_module_commands (id_user_module, language, commands, prefix, is_prefix_mandated)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (id_user_module, language) DO UPDATE SET
                commands = excluded.commands,
                prefix = excluded.prefix,
                is_prefix_mandated = excluded.is_prefix_mandated,
                updated_at = datetime('now', 'subsec')
            RETURNING *
            "#,
        )
        .bind(id_user_module)
        .bind(language)
        .bind(commands)
        .bind(&data.prefix)
        .bind(data.is_prefix_mandated)
        .fetch_one(pool)
        .await?;

        Ok(command_set)
    }

    pub fn to_definition(&self) -> Result<ModuleCommandSet, UserModuleError> {
        let language = self
            .language
            .parse()
            .map_err(|_| UserModuleError::InvalidLanguage(self.language.clone()))?;
        let commands: Vec<CommandDefinition> = serde_json::from_str(&self.commands)?;

        Ok(ModuleCommandSet {
            language,
            prefix: self.prefix.clone(),
            is_prefix_mandated: self.is_prefix_mandated,
            commands,
        })
    }
}
