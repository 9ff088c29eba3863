//! Error handling for the DreamDeck Rust client

use thiserror::Error;

/// Unified error type for the DreamDeck Rust client
#[derive(Error, Debug)]
pub enum Error {
    /// Session store errors
    #[error("Session error: {0}")]
    Session(#[from] dreamdeck_rust_session::SessionError),

    /// Authentication errors
    #[error("Auth error: {0}")]
    Auth(#[from] dreamdeck_rust_auth::AuthError),

    /// Dream feed and CRUD errors
    #[error("Dreams error: {0}")]
    Dreams(#[from] dreamdeck_rust_dreams::DreamsError),

    /// AI insight and suggestion errors
    #[error("Insight error: {0}")]
    Insight(#[from] dreamdeck_rust_insight::InsightError),

    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// An AI-assist action was requested while its gate is closed
    /// (content too short, or the action already fired for this field)
    #[error("Suggestion is not available: {0}")]
    AssistUnavailable(&'static str),

    /// A submit was requested while one is already in flight
    #[error("A submit is already in flight")]
    SubmitInFlight,
}

/// Result type alias for the DreamDeck Rust client
pub type Result<T> = std::result::Result<T, Error>;
