//! DreamDeck dreams client for Rust
//!
//! This crate provides the dream feed for DreamDeck: listing a user's
//! dreams with transparent token refresh, creating dreams (with an
//! optional recorded-audio attachment), deleting them through a
//! confirmation flow, and the invalidation bus that ties the mutating
//! components back to the feed.

use chrono::{DateTime, Utc};
use dreamdeck_rust_insight::Insight;
use dreamdeck_rust_session::SessionError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod client;
mod delete;
mod feed;

pub use client::DreamsClient;
pub use delete::{DeleteFlow, DeleteFlowOptions, DeleteState};
pub use feed::{filter_dreams, DreamFeed, FeedState, RefreshBus, RefreshSignal};

/// 結果型
pub type Result<T> = std::result::Result<T, DreamsError>;

/// エラー型
#[derive(Error, Debug)]
pub enum DreamsError {
    #[error("API error: {message} (Status: {status})")]
    ApiError {
        message: String,
        status: reqwest::StatusCode,
    },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Session store error: {0}")]
    StoreError(#[from] SessionError),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Token refresh failed (Status: {0})")]
    RefreshFailed(reqwest::StatusCode),
}

/// 感情タグの既定の強さ
pub const DEFAULT_INTENSITY: u8 = 5;

/// 夢に付いた感情（1〜10 の強さ付き）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DreamEmotion {
    pub name: String,
    pub intensity: u8,
}

impl DreamEmotion {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            intensity: DEFAULT_INTENSITY,
        }
    }
}

/// 夢ひとつ分
///
/// サーバー側で作られる読み取り専用の射影。クライアントはキャッシュの
/// 一貫性を持たず、リスト取得のたびに丸ごと置き換える。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dream {
    pub id: String,
    pub title: String,
    pub content: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub is_lucid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub emotions: Vec<DreamEmotion>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<Insight>,
}

/// 新しく記録する夢
#[derive(Debug, Clone, Serialize)]
pub struct NewDream {
    pub title: String,
    pub content: String,
    pub date: DateTime<Utc>,
    pub is_lucid: bool,
    pub emotions: Vec<DreamEmotion>,
    pub themes: Vec<String>,
}

/// 録音した音声の添付
#[derive(Debug, Clone)]
pub struct AudioAttachment {
    pub data: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}
