use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Indexing API unreachable or returned a non-success/malformed payload.
    /// Fatal to the scan loop — no forward progress without chain data.
    #[error("chain API error: {0}")]
    Chain(String),

    /// A confirmed sale's detail transactions could not be located.
    /// The affected sale is skipped; the loop continues.
    #[error("sale extraction error: {0}")]
    Extraction(String),

    /// Metadata site unreachable — the sale is still dispatched with
    /// on-chain fields only.
    #[error("metadata enrichment error: {0}")]
    Enrichment(String),

    /// Delivery sink rejected a message — logged, next recipient attempted.
    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Chain(_) | AppError::Enrichment(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
