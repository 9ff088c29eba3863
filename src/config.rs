//! Configuration for the DreamDeck client

use crate::error::{Error, Result};
use url::Url;

/// Environment variable holding the API base URL
pub const ENV_API_URL: &str = "DREAMDECK_API_URL";

/// Environment variable holding the optional API key
pub const ENV_API_KEY: &str = "DREAMDECK_API_KEY";

/// Configuration for the DreamDeck client.
///
/// It's recommended to load these values from environment variables or a
/// secure config source rather than hard-coding them.
#[derive(Debug, Clone)]
pub struct DreamDeckConfig {
    /// Base URL of the DreamDeck API, e.g. `http://localhost:8000/api/v1`
    pub base_url: Url,
    /// Optional API key sent as an `apikey` header on every request
    pub api_key: Option<String>,
}

impl DreamDeckConfig {
    /// Creates a new configuration, validating the URL.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "'{}' cannot be used as a base URL",
                base_url
            )));
        }
        if let Some(key) = &api_key {
            if key.is_empty() {
                return Err(Error::Config("api_key cannot be empty".to_string()));
            }
        }
        Ok(Self { base_url, api_key })
    }

    /// Attempts to create configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(ENV_API_URL)
            .map_err(|_| Error::Config(format!("{} environment variable not found", ENV_API_URL)))?;
        let api_key = std::env::var(ENV_API_KEY).ok();
        Self::new(&base_url, api_key)
    }
}
