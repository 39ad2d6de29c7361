//! The user's language-switch command set.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use db::models::language_command::UserLanguageCommands;
use engine::definitions::LanguageCommandSet;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/{id_user}/language-commands", get(get_language_commands))
        .route("/users/{id_user}/language-commands", put(put_language_commands))
}

async fn get_language_commands(
    Path(id_user): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Option<LanguageCommandSet>>>, ApiError> {
    let definition = UserLanguageCommands::find_by_user(&state.db.pool, id_user)
        .await?
        .map(|row| row.to_definition())
        .transpose()?;

    Ok(Json(ApiResponse::success(definition)))
}

async fn put_language_commands(
    Path(id_user): Path<i64>,
    State(state): State<AppState>,
    Json(definition): Json<LanguageCommandSet>,
) -> Result<Json<ApiResponse<LanguageCommandSet>>, ApiError> {
    UserLanguageCommands::upsert(&state.db.pool, id_user, &definition).await?;

    state.sessions.notify_definitions_changed(id_user).await?;
    Ok(Json(ApiResponse::success(definition)))
}
