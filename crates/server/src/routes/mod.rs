pub mod channel;
pub mod commands;
pub mod language_commands;
pub mod modules;

use axum::Router;
use tower_http::cors::CorsLayer;

use crate::AppState;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(channel::router())
        .merge(commands::router())
        .merge(language_commands::router())
        .merge(modules::router());

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
