//! DreamDeck Rust Client Library
//!
//! A Rust client library for the DreamDeck dream journal, providing
//! authentication with persistent sessions, the dream feed with
//! transparent token refresh, dream composition with AI-assisted
//! suggestions, and AI-generated insights.

pub mod composer;
pub mod config;
pub mod error;

use reqwest::Client;
use std::sync::Arc;

use crate::composer::DreamComposer;
use crate::config::DreamDeckConfig;
use crate::error::Result;

use dreamdeck_rust_auth::{AuthClient, AuthFlow, AuthMode};
use dreamdeck_rust_dreams::{DreamFeed, DreamsClient, RefreshBus, RefreshSignal};
use dreamdeck_rust_insight::InsightClient;
use dreamdeck_rust_session::{FileSessionStore, Preferences, SessionStore};

pub use dreamdeck_rust_auth as auth;
pub use dreamdeck_rust_dreams as dreams;
pub use dreamdeck_rust_insight as insight;
pub use dreamdeck_rust_session as session;

/// The main entry point for the DreamDeck Rust client
pub struct DreamDeck {
    config: DreamDeckConfig,
    http_client: Client,
    store: Arc<dyn SessionStore>,
    auth: Arc<AuthClient>,
    insight: Arc<InsightClient>,
    bus: Arc<RefreshBus>,
}

impl DreamDeck {
    /// Create a new DreamDeck client with the default on-disk session store.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dreamdeck_rust::{config::DreamDeckConfig, DreamDeck};
    ///
    /// let config = DreamDeckConfig::new("http://localhost:8000/api/v1", None)?;
    /// let deck = DreamDeck::new(config)?;
    /// # Ok::<(), dreamdeck_rust::error::Error>(())
    /// ```
    pub fn new(config: DreamDeckConfig) -> Result<Self> {
        let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::open_default()?);
        Self::with_store(config, store)
    }

    /// Create a new DreamDeck client with an injected session store.
    ///
    /// Useful for tests (in-memory store) or for embedding into a host
    /// application that manages its own persistence.
    pub fn with_store(config: DreamDeckConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
        let http_client = Client::new();
        let base_url = config.base_url.as_str();
        let api_key = config.api_key.as_deref();

        let auth = Arc::new(AuthClient::new(
            base_url,
            api_key,
            http_client.clone(),
            store.clone(),
        ));
        let insight = Arc::new(InsightClient::new(
            base_url,
            api_key,
            http_client.clone(),
            store.clone(),
        ));

        Ok(Self {
            config,
            http_client,
            store,
            auth,
            insight,
            bus: Arc::new(RefreshBus::new()),
        })
    }

    /// Get a reference to the auth client for sign up, sign in and refresh
    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    /// Create an auth submit flow for the login/signup form
    pub fn auth_flow(&self, mode: AuthMode) -> AuthFlow {
        AuthFlow::new(
            AuthClient::new(
                self.config.base_url.as_str(),
                self.config.api_key.as_deref(),
                self.http_client.clone(),
                self.store.clone(),
            ),
            mode,
        )
    }

    /// Create a new dreams client for feed and CRUD operations
    pub fn dreams(&self) -> DreamsClient {
        DreamsClient::new(
            self.config.base_url.as_str(),
            self.config.api_key.as_deref(),
            self.http_client.clone(),
            self.store.clone(),
        )
    }

    /// Get a reference to the insight client for AI operations
    pub fn insight(&self) -> &Arc<InsightClient> {
        &self.insight
    }

    /// Get the invalidation bus shared by the feed and the mutating flows
    pub fn refresh_bus(&self) -> &Arc<RefreshBus> {
        &self.bus
    }

    /// Subscribe to feed invalidations
    pub fn subscribe(&self) -> RefreshSignal {
        self.bus.subscribe()
    }

    /// Create a dream feed wired to this client's invalidation bus
    pub fn feed(&self) -> DreamFeed {
        DreamFeed::new(self.dreams(), self.bus.subscribe())
    }

    /// Create a dream composer wired to this client's invalidation bus
    pub fn composer(&self) -> DreamComposer {
        DreamComposer::new(self.dreams(), self.insight.clone(), self.bus.clone())
    }

    /// Get a reference to the session store
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Current dark-mode preference
    pub fn dark_mode(&self) -> Result<bool> {
        Ok(self.store.get_preferences()?.dark_mode)
    }

    /// Toggle the dark-mode preference, returning the new value
    pub fn toggle_dark_mode(&self) -> Result<bool> {
        let mut preferences = self.store.get_preferences()?;
        preferences.dark_mode = !preferences.dark_mode;
        self.store.set_preferences(&preferences)?;
        Ok(preferences.dark_mode)
    }

    /// Replace the stored preferences
    pub fn set_preferences(&self, preferences: &Preferences) -> Result<()> {
        Ok(self.store.set_preferences(preferences)?)
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::config::DreamDeckConfig;
    pub use crate::error::Error;
    pub use crate::DreamDeck;
}
