use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::models::{language_command::LanguageCommandError, user_module::UserModuleError};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error, ts_rs::TS)]
#[ts(type = "string")]
pub enum ApiError {
    #[error(transparent)]
    UserModule(#[from] UserModuleError),
    #[error(transparent)]
    LanguageCommand(#[from] LanguageCommandError),
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Internal Server Error: {0}")]
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = match &self {
            ApiError::UserModule(err) => match err {
                UserModuleError::NotFound => (StatusCode::NOT_FOUND, "UserModuleError"),
                UserModuleError::InvalidDefinition(_) | UserModuleError::InvalidLanguage(_) => {
                    (StatusCode::BAD_REQUEST, "UserModuleError")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "UserModuleError"),
            },
            ApiError::LanguageCommand(err) => match err {
                LanguageCommandError::NotFound => (StatusCode::NOT_FOUND, "LanguageCommandError"),
                LanguageCommandError::InvalidDefinition(_) => {
                    (StatusCode::BAD_REQUEST, "LanguageCommandError")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "LanguageCommandError"),
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        };

        let error_message = match &self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::InternalError(msg) => msg.clone(),
            _ => format!("{}: {}", error_type, self),
        };
        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}
