//! Read access to a session's execution history (the "last commands" table).

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use engine::dispatcher::ExecutedCommand;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

pub fn router() -> Router<AppState> {
    Router::new().route("/users/{id_user}/commands", get(get_command_history))
}

async fn get_command_history(
    Path(id_user): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ExecutedCommand>>>, ApiError> {
    let session = state.sessions.get_or_spawn(id_user).await?;
    Ok(Json(ApiResponse::success(session.history().await)))
}
