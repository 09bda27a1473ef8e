pub mod auth;
pub mod contact;
pub mod documents;
pub mod middleware;
pub mod orders;
pub mod partners;
pub mod rest;
pub mod speech;
pub mod state;

use axum::http::StatusCode;
use tailordesk_core::ports::PortError;
use tracing::error;

pub use middleware::require_auth;

/// The error half of every handler's return type.
pub type HandlerError = (StatusCode, String);

/// Maps a port error onto a response, logging anything the caller cannot fix.
pub fn port_error(context: &str, e: PortError) -> HandlerError {
    match e {
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        PortError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        PortError::Unauthorized => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
        PortError::Unexpected(msg) => {
            error!("{}: {}", context, msg);
            (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
        }
    }
}

/// Parses a string field into one of the core's string enums.
pub fn parse_field<T>(field: &str, value: &str) -> Result<T, HandlerError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid {}: {}", field, e)))
}
