//! DreamDeck insight client for Rust
//!
//! This crate provides the AI-facing functionality of DreamDeck:
//! requesting an interpretive insight for a dream, extracting the
//! tagged sections out of the returned analysis text, and asking the
//! backend for suggested titles, emotions and themes.

use dreamdeck_rust_session::{SessionError, SessionStore};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// 結果型
pub type Result<T> = std::result::Result<T, InsightError>;

/// エラー型
#[derive(Error, Debug)]
pub enum InsightError {
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

    #[error("A generation is already in flight")]
    GenerationInFlight,

    #[error("This dream already has an insight")]
    AlreadyGenerated,
}

/// 夢ひとつ分のインサイト
///
/// `analysis` はセクションマーカー入りのフラットな文字列。
/// 新しいバックエンドはそれに加えて `sections` のマップを返す。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub summary: String,
    pub analysis: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<BTreeMap<String, String>>,
}

/// 表示するセクションの固定セット（この順で見出しを必ず出す）
pub const SECTION_NAMES: [(&str, &str); 5] = [
    ("dream_summary", "Dream Summary"),
    ("emotional_landscape", "Emotional Landscape"),
    ("key_symbols", "Key Symbols"),
    ("recurring_patterns", "Recurring Patterns"),
    ("guidance", "Guidance"),
];

/// 見出しと本文のペア
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightSection {
    pub name: &'static str,
    pub title: &'static str,
    pub body: String,
}

/// `<name>...</name>` のマーカー対から本文を取り出す
///
/// マーカーが片方でも無ければ空文字列。エラーにはしない。
pub fn extract_section(analysis: &str, name: &str) -> String {
    let open = format!("<{}>", name);
    let close = format!("</{}>", name);

    let start = match analysis.find(&open) {
        Some(index) => index + open.len(),
        None => return String::new(),
    };
    match analysis[start..].find(&close) {
        Some(end) => analysis[start..start + end].trim().to_string(),
        None => String::new(),
    }
}

impl Insight {
    /// 固定セットの全セクションを順に取り出す
    ///
    /// 構造化された `sections` マップがあればそちらを使い、
    /// 無ければマーカー抽出にフォールバックする。
    /// 見つからないセクションは空の本文で返る。
    pub fn render_sections(&self) -> Vec<InsightSection> {
        SECTION_NAMES
            .iter()
            .map(|(name, title)| {
                let body = match &self.sections {
                    Some(map) => map.get(*name).map(|s| s.trim().to_string()).unwrap_or_default(),
                    None => extract_section(&self.analysis, name),
                };
                InsightSection { name, title, body }
            })
            .collect()
    }
}

/// AI が提案したタグ（感情またはテーマ）
///
/// クライアント内でしか生きない。名前の大文字小文字を無視して重複排除する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedTag {
    pub id: String,
    pub name: String,
    pub is_ai_suggested: bool,
}

impl SuggestedTag {
    pub fn new(name: &str, is_ai_suggested: bool) -> Self {
        Self {
            id: name.to_lowercase().replace(' ', "-"),
            name: name.to_string(),
            is_ai_suggested,
        }
    }
}

/// 提案された名前をタグプールへマージする
///
/// 既存タグと大文字小文字を無視して一致したら AI 提案フラグを立てるだけ。
/// 新顔はプールに追加し、その名前を返す（呼び出し側が自動選択する）。
pub fn merge_suggestions(pool: &mut Vec<SuggestedTag>, suggested: &[String]) -> Vec<String> {
    let mut newly_added = Vec::new();

    for name in suggested {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            continue;
        }
        match pool
            .iter_mut()
            .find(|tag| tag.name.eq_ignore_ascii_case(trimmed))
        {
            Some(existing) => existing.is_ai_suggested = true,
            None => {
                pool.push(SuggestedTag::new(trimmed, true));
                newly_added.push(trimmed.to_string());
            }
        }
    }

    newly_added
}

#[derive(Debug, Deserialize)]
struct TitleSuggestion {
    title: String,
}

#[derive(Debug, Deserialize)]
struct EmotionSuggestions {
    emotions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ThemeSuggestions {
    themes: Vec<String>,
}

/// インサイト／提案クライアント
pub struct InsightClient {
    base_url: String,
    api_key: Option<String>,
    http_client: Client,
    store: Arc<dyn SessionStore>,
}

impl InsightClient {
    /// 新しいインサイトクライアントを作成
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        http_client: Client,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            http_client,
            store,
        }
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<T> {
        let session = self
            .store
            .get_session()?
            .ok_or(InsightError::NotAuthenticated)?;

        let url = format!("{}/{}", self.base_url, endpoint);

        let mut request = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", session.token))
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request.json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            log::warn!("{} rejected ({})", endpoint, status);
            return Err(InsightError::ApiError { message, status });
        }

        Ok(response.json::<T>().await?)
    }

    /// 夢ひとつ分のインサイトを生成する
    pub async fn generate(&self, dream_id: &str, content: &str) -> Result<Insight> {
        self.post_json(
            "dream-insight/",
            &serde_json::json!({ "dream_id": dream_id, "content": content }),
        )
        .await
    }

    /// タイトルの提案を取得
    pub async fn suggest_title(&self, content: &str) -> Result<String> {
        let suggestion: TitleSuggestion = self
            .post_json("suggest-title/", &serde_json::json!({ "content": content }))
            .await?;
        Ok(suggestion.title)
    }

    /// 感情タグの提案を取得
    pub async fn suggest_emotions(&self, content: &str) -> Result<Vec<String>> {
        let suggestions: EmotionSuggestions = self
            .post_json(
                "suggest-emotions/",
                &serde_json::json!({ "content": content }),
            )
            .await?;
        Ok(suggestions.emotions)
    }

    /// テーマタグの提案を取得
    pub async fn suggest_themes(&self, content: &str) -> Result<Vec<String>> {
        let suggestions: ThemeSuggestions = self
            .post_json(
                "suggest-themes/",
                &serde_json::json!({ "content": content }),
            )
            .await?;
        Ok(suggestions.themes)
    }
}

/// インサイトパネルの状態
///
/// インサイトが無いときだけ生成ボタンが出る。生成中はボタン無効。
/// 成功したら親の夢へその場で書き戻す（再フェッチはしない）。
pub struct InsightPanel {
    dream_id: String,
    insight: Option<Insight>,
    pending: bool,
    error: Option<String>,
}

impl InsightPanel {
    pub fn new(dream_id: &str, existing: Option<Insight>) -> Self {
        Self {
            dream_id: dream_id.to_string(),
            insight: existing,
            pending: false,
            error: None,
        }
    }

    /// 生成ボタンを出すべきか
    pub fn can_generate(&self) -> bool {
        self.insight.is_none() && !self.pending
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn insight(&self) -> Option<&Insight> {
        self.insight.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// インサイトを生成してパネルへ書き込む
    pub async fn generate(&mut self, client: &InsightClient, content: &str) -> Result<&Insight> {
        if self.insight.is_some() {
            return Err(InsightError::AlreadyGenerated);
        }
        if self.pending {
            return Err(InsightError::GenerationInFlight);
        }

        self.pending = true;
        self.error = None;
        let result = client.generate(&self.dream_id, content).await;
        self.pending = false;

        match result {
            Ok(insight) => Ok(&*self.insight.insert(insight)),
            Err(err) => {
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dreamdeck_rust_session::{MemorySessionStore, Session, User};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn signed_in_store() -> Arc<MemorySessionStore> {
        let store = Arc::new(MemorySessionStore::new());
        store
            .set_session(&Session {
                token: "access".to_string(),
                refresh_token: "refresh".to_string(),
                user: User {
                    id: "user-1".to_string(),
                    username: "dreamer".to_string(),
                    email: "dreamer@example.com".to_string(),
                },
            })
            .unwrap();
        store
    }

    #[test]
    fn extract_section_finds_marked_text() {
        let analysis = "<dream_summary>A quiet shoreline.</dream_summary>\
                        <guidance>Sleep more.</guidance>";
        assert_eq!(
            extract_section(analysis, "dream_summary"),
            "A quiet shoreline."
        );
        assert_eq!(extract_section(analysis, "guidance"), "Sleep more.");
    }

    #[test]
    fn missing_marker_pair_yields_empty_string() {
        let analysis = "<dream_summary>X</dream_summary>";
        assert_eq!(extract_section(analysis, "emotional_landscape"), "");
        // 閉じマーカーが無い場合も空
        assert_eq!(extract_section("<guidance>half open", "guidance"), "");
    }

    #[test]
    fn render_sections_always_emits_every_heading() {
        let insight = Insight {
            summary: "short".to_string(),
            analysis: "<dream_summary>X</dream_summary>".to_string(),
            sections: None,
        };

        let sections = insight.render_sections();
        assert_eq!(sections.len(), SECTION_NAMES.len());
        assert_eq!(sections[0].title, "Dream Summary");
        assert_eq!(sections[0].body, "X");
        assert_eq!(sections[1].title, "Emotional Landscape");
        assert_eq!(sections[1].body, "");
    }

    #[test]
    fn structured_sections_bypass_marker_parsing() {
        let mut map = BTreeMap::new();
        map.insert("dream_summary".to_string(), "From the map.".to_string());
        let insight = Insight {
            summary: "short".to_string(),
            // マーカー側にはわざと別の本文を入れておく
            analysis: "<dream_summary>From the markers.</dream_summary>".to_string(),
            sections: Some(map),
        };

        let sections = insight.render_sections();
        assert_eq!(sections[0].body, "From the map.");
        assert_eq!(sections[1].body, "");
    }

    #[test]
    fn merge_deduplicates_case_insensitively() {
        let mut pool = vec![
            SuggestedTag::new("Joy", false),
            SuggestedTag::new("Fear", false),
        ];

        let added = merge_suggestions(
            &mut pool,
            &[
                "joy".to_string(),
                "Wonder".to_string(),
                "  ".to_string(),
                "wonder".to_string(),
            ],
        );

        // 既存の Joy は追加されず、AI 提案フラグだけ立つ
        assert_eq!(added, vec!["Wonder".to_string()]);
        assert_eq!(pool.len(), 3);
        assert!(pool[0].is_ai_suggested);
        assert!(!pool[1].is_ai_suggested);
        assert_eq!(pool[2].name, "Wonder");
        assert!(pool[2].is_ai_suggested);
    }

    #[tokio::test]
    async fn generate_populates_panel_in_place() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/dream-insight/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "summary": "A shoreline dream.",
                "analysis": "<dream_summary>Waves.</dream_summary>"
            })))
            .mount(&mock_server)
            .await;

        let client = InsightClient::new(
            &mock_server.uri(),
            None,
            reqwest::Client::new(),
            signed_in_store(),
        );
        let mut panel = InsightPanel::new("dream-1", None);
        assert!(panel.can_generate());

        assert!(panel
            .generate(&client, "I stood on a shore...")
            .await
            .is_ok());
        assert!(!panel.can_generate());
        assert_eq!(panel.insight().unwrap().summary, "A shoreline dream.");

        // 既に持っている夢への再生成は拒否される
        assert!(matches!(
            panel.generate(&client, "...").await,
            Err(InsightError::AlreadyGenerated)
        ));
    }

    #[tokio::test]
    async fn generation_failure_is_kept_as_panel_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/dream-insight/"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&mock_server)
            .await;

        let client = InsightClient::new(
            &mock_server.uri(),
            None,
            reqwest::Client::new(),
            signed_in_store(),
        );
        let mut panel = InsightPanel::new("dream-1", None);

        assert!(panel.generate(&client, "content").await.is_err());
        assert!(panel.error().is_some());
        // 失敗後はもう一度生成できる
        assert!(panel.can_generate());
    }

    #[tokio::test]
    async fn suggestions_require_a_session() {
        let client = InsightClient::new(
            "http://localhost:9",
            None,
            reqwest::Client::new(),
            Arc::new(MemorySessionStore::new()),
        );

        let result = client.suggest_title("a long enough dream description").await;
        assert!(matches!(result, Err(InsightError::NotAuthenticated)));
    }
}
