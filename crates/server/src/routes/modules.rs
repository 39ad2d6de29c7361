//! CRUD over a user's installed modules and their per-language command sets.
//! Successful writes push the fresh definitions into the user's session,
//! where the registry rebuild is debounced.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use db::models::user_module::{
    CreateUserModule, UpsertModuleCommands, UserModule, UserModuleCommandSet, UserModuleError,
};
use engine::definitions::FeatureDefinition;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct InstallModuleRequest {
    pub id_module: i64,
    pub name: String,
    #[serde(default)]
    pub features: Vec<FeatureDefinition>,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UserModuleResponse {
    pub module: UserModule,
    pub command_sets: Vec<UserModuleCommandSet>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/{id_user}/modules", get(list_modules))
        .route("/users/{id_user}/modules", post(install_module))
        .route(
            "/users/{id_user}/modules/{id_user_module}/active",
            put(set_module_active),
        )
        .route(
            "/users/{id_user}/modules/{id_user_module}/commands/{language}",
            put(upsert_module_commands),
        )
}

async fn list_modules(
    Path(id_user): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<UserModuleResponse>>>, ApiError> {
    let modules = UserModule::find_by_user(&state.db.pool, id_user).await?;

    let mut response = Vec::with_capacity(modules.len());
    for module in modules {
        let command_sets =
            UserModuleCommandSet::find_by_user_module(&state.db.pool, module.id).await?;
        response.push(UserModuleResponse {
            module,
            command_sets,
        });
    }

    Ok(Json(ApiResponse::success(response)))
}

async fn install_module(
    Path(id_user): Path<i64>,
    State(state): State<AppState>,
    Json(request): Json<InstallModuleRequest>,
) -> Result<Json<ApiResponse<UserModule>>, ApiError> {
    let module = UserModule::create(
        &state.db.pool,
        CreateUserModule {
            id_user,
            id_module: request.id_module,
            name: request.name,
            features: request.features,
        },
    )
    .await?;

    state.sessions.notify_definitions_changed(id_user).await?;
    Ok(Json(ApiResponse::success(module)))
}

async fn set_module_active(
    Path((id_user, id_user_module)): Path<(i64, i64)>,
    State(state): State<AppState>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<ApiResponse<UserModule>>, ApiError> {
    let module =
        UserModule::set_active(&state.db.pool, id_user_module, id_user, request.is_active).await?;

    state.sessions.notify_definitions_changed(id_user).await?;
    Ok(Json(ApiResponse::success(module)))
}

async fn upsert_module_commands(
    Path((id_user, id_user_module, language)): Path<(i64, i64, String)>,
    State(state): State<AppState>,
    Json(request): Json<UpsertModuleCommands>,
) -> Result<Json<ApiResponse<UserModuleCommandSet>>, ApiError> {
    // Reject the write early when the language code itself is unknown.
    language
        .parse::<engine::definitions::LanguageCode>()
        .map_err(|_| ApiError::UserModule(UserModuleError::InvalidLanguage(language.clone())))?;

    let command_set = UserModuleCommandSet::upsert(
        &state.db.pool,
        id_user,
        id_user_module,
        &language,
        request,
    )
    .await?;

    state.sessions.notify_definitions_changed(id_user).await?;
    Ok(Json(ApiResponse::success(command_set)))
}
