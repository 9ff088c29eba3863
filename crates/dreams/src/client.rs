use crate::{AudioAttachment, Dream, DreamEmotion, DreamsError, NewDream, Result};
use dreamdeck_rust_session::{Session, SessionStore};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

/// トークンリフレッシュのレスポンス
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Dreams クライアント
pub struct DreamsClient {
    base_url: String,
    api_key: Option<String>,
    http_client: Client,
    store: Arc<dyn SessionStore>,
}

impl DreamsClient {
    /// 新しい Dreams クライアントを作成
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

    /// ユーザー ID とトークンの揃ったセッションを持っているか
    pub fn is_signed_in(&self) -> Result<bool> {
        Ok(self
            .store
            .get_session()?
            .map(|session| !session.user.id.is_empty() && !session.token.is_empty())
            .unwrap_or(false))
    }

    fn session(&self) -> Result<Session> {
        self.store
            .get_session()?
            .ok_or(DreamsError::NotAuthenticated)
    }

    fn authed(&self, builder: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        let builder = builder.header("Authorization", format!("Bearer {}", token));
        match &self.api_key {
            Some(key) => builder.header("apikey", key),
            None => builder,
        }
    }

    /// 夢の一覧を取得
    ///
    /// 401 が返ったらトークンリフレッシュを 1 往復だけ行い、新しい
    /// トークンで GET を 1 回だけやり直す。2 回目の 401 はそのまま
    /// エラーとして返し、それ以上のリトライはしない。
    /// セッションを勝手に消すこともしない。
    pub async fn list(&self) -> Result<Vec<Dream>> {
        let session = self.session()?;
        let url = format!("{}/dreams/", self.base_url);

        let mut response = self
            .authed(self.http_client.get(&url), &session.token)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            // 期限切れ。リフレッシュして 1 回だけ再試行。
            let token = self.refresh_access_token(&session).await?;
            log::debug!("access token refreshed, retrying dream list");
            response = self
                .authed(self.http_client.get(&url), &token)
                .send()
                .await?;
        }

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DreamsError::ApiError { message, status });
        }

        Ok(response.json::<Vec<Dream>>().await?)
    }

    /// リフレッシュトークンでアクセストークンを更新する
    async fn refresh_access_token(&self, session: &Session) -> Result<String> {
        if session.refresh_token.is_empty() {
            return Err(DreamsError::MissingRefreshToken);
        }

        let url = format!("{}/token/refresh/", self.base_url);
        let payload = serde_json::json!({ "refresh": session.refresh_token });

        let mut request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request.json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("token refresh failed ({})", status);
            return Err(DreamsError::RefreshFailed(status));
        }

        let refreshed: RefreshResponse = response.json().await?;
        self.store.set_access_token(&refreshed.access)?;
        Ok(refreshed.access)
    }

    /// 夢をひとつ取得
    pub async fn get(&self, dream_id: &str) -> Result<Dream> {
        let session = self.session()?;
        let url = format!("{}/dreams/{}/", self.base_url, dream_id);

        let response = self
            .authed(self.http_client.get(&url), &session.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DreamsError::ApiError { message, status });
        }

        Ok(response.json::<Dream>().await?)
    }

    /// 夢を記録する
    ///
    /// 音声付きのときは multipart/form-data で送り、JSON 本体は
    /// `payload` パートに載せる。音声が無ければ素の JSON で送る。
    pub async fn create(
        &self,
        new_dream: &NewDream,
        audio: Option<AudioAttachment>,
    ) -> Result<Dream> {
        let session = self.session()?;
        let url = format!("{}/dreams/", self.base_url);

        let request = self.authed(self.http_client.post(&url), &session.token);

        let request = match audio {
            Some(audio) => {
                let payload_part = Part::text(serde_json::to_string(new_dream)?)
                    .mime_str("application/json")?;
                let audio_part = Part::bytes(audio.data)
                    .file_name(audio.file_name)
                    .mime_str(&audio.content_type)?;
                let form = Form::new()
                    .part("payload", payload_part)
                    .part("audio", audio_part);
                request.multipart(form)
            }
            None => request.json(new_dream),
        };

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DreamsError::ApiError { message, status });
        }

        Ok(response.json::<Dream>().await?)
    }

    /// 夢を削除する
    pub async fn delete(&self, dream_id: &str) -> Result<()> {
        let session = self.session()?;
        let url = format!("{}/dreams/{}/", self.base_url, dream_id);

        let response = self
            .authed(self.http_client.delete(&url), &session.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DreamsError::ApiError { message, status });
        }

        Ok(())
    }

    /// 夢に付いた感情タグを取得
    pub async fn emotions_for(&self, dream_id: &str) -> Result<Vec<DreamEmotion>> {
        let url = format!("{}/dreams/{}/emotions/", self.base_url, dream_id);
        self.get_json(&url).await
    }

    /// 夢に付いたテーマタグを取得
    pub async fn themes_for(&self, dream_id: &str) -> Result<Vec<String>> {
        let url = format!("{}/dreams/{}/themes/", self.base_url, dream_id);
        self.get_json(&url).await
    }

    /// 選択できる感情タグの一覧
    pub async fn known_emotions(&self) -> Result<Vec<String>> {
        let url = format!("{}/emotions/", self.base_url);
        self.get_json(&url).await
    }

    /// 選択できるテーマタグの一覧
    pub async fn known_themes(&self) -> Result<Vec<String>> {
        let url = format!("{}/themes/", self.base_url);
        self.get_json(&url).await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let session = self.session()?;

        let response = self
            .authed(self.http_client.get(url), &session.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DreamsError::ApiError { message, status });
        }

        Ok(response.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dreamdeck_rust_session::{MemorySessionStore, User};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_with(token: &str, refresh: &str) -> Arc<MemorySessionStore> {
        let store = Arc::new(MemorySessionStore::new());
        store
            .set_session(&Session {
                token: token.to_string(),
                refresh_token: refresh.to_string(),
                user: User {
                    id: "user-1".to_string(),
                    username: "dreamer".to_string(),
                    email: "dreamer@example.com".to_string(),
                },
            })
            .unwrap();
        store
    }

    fn dream_json(id: &str, title: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": title,
            "content": "I was walking through fog.",
            "date": "2026-08-01T06:30:00Z",
            "is_lucid": false,
            "audio_url": null,
            "emotions": [{ "name": "Wonder", "intensity": 7 }],
            "themes": ["fog"],
            "insight": null
        })
    }

    #[tokio::test]
    async fn test_list_dreams() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/dreams/"))
            .and(header("Authorization", "Bearer access"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([dream_json("d1", "Fog"), dream_json("d2", "Sea")])),
            )
            .mount(&mock_server)
            .await;

        let client = DreamsClient::new(
            &mock_server.uri(),
            None,
            reqwest::Client::new(),
            store_with("access", "refresh"),
        );

        let dreams = client.list().await.unwrap();
        assert_eq!(dreams.len(), 2);
        assert_eq!(dreams[0].emotions[0].intensity, 7);
        assert_eq!(
            dreams[0].date,
            chrono::Utc.with_ymd_and_hms(2026, 8, 1, 6, 30, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_401_refreshes_once_and_retries_once() {
        let mock_server = MockServer::start().await;

        // 最初の GET は期限切れ
        Mock::given(method("GET"))
            .and(path("/dreams/"))
            .and(header("Authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&mock_server)
            .await;

        // リフレッシュはちょうど 1 回
        Mock::given(method("POST"))
            .and(path("/token/refresh/"))
            .and(body_json(json!({ "refresh": "refresh" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "fresh" })))
            .expect(1)
            .mount(&mock_server)
            .await;

        // 新トークンでの再試行はちょうど 1 回
        Mock::given(method("GET"))
            .and(path("/dreams/"))
            .and(header("Authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([dream_json("d1", "Fog")])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = store_with("stale", "refresh");
        let client = DreamsClient::new(
            &mock_server.uri(),
            None,
            reqwest::Client::new(),
            store.clone(),
        );

        let dreams = client.list().await.unwrap();
        assert_eq!(dreams.len(), 1);

        // ストアのアクセストークンが上書きされている
        assert_eq!(store.get_session().unwrap().unwrap().token, "fresh");
        assert_eq!(store.get_session().unwrap().unwrap().refresh_token, "refresh");
    }

    #[tokio::test]
    async fn test_second_401_is_fatal_for_the_cycle() {
        let mock_server = MockServer::start().await;

        // GET は常に 401。ちょうど 2 回で止まることを検証する。
        Mock::given(method("GET"))
            .and(path("/dreams/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "fresh" })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = DreamsClient::new(
            &mock_server.uri(),
            None,
            reqwest::Client::new(),
            store_with("stale", "refresh"),
        );

        let result = client.list().await;
        match result {
            Err(DreamsError::ApiError { status, .. }) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED)
            }
            other => panic!("Expected ApiError, got {:?}", other.map(|d| d.len())),
        }
    }

    #[tokio::test]
    async fn test_refresh_failure_propagates_without_retry() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/dreams/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/token/refresh/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = store_with("stale", "refresh");
        let client = DreamsClient::new(
            &mock_server.uri(),
            None,
            reqwest::Client::new(),
            store.clone(),
        );

        let result = client.list().await;
        assert!(matches!(result, Err(DreamsError::RefreshFailed(_))));

        // 失敗してもセッションは消えない
        assert!(store.get_session().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_never_calls_refresh() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/dreams/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "fresh" })))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = DreamsClient::new(
            &mock_server.uri(),
            None,
            reqwest::Client::new(),
            store_with("stale", ""),
        );

        let result = client.list().await;
        assert!(matches!(result, Err(DreamsError::MissingRefreshToken)));
    }

    #[tokio::test]
    async fn test_create_without_audio_sends_json() {
        let mock_server = MockServer::start().await;

        let new_dream = NewDream {
            title: "Fog".to_string(),
            content: "I was walking through fog.".to_string(),
            date: chrono::Utc.with_ymd_and_hms(2026, 8, 1, 6, 30, 0).unwrap(),
            is_lucid: true,
            emotions: vec![DreamEmotion::new("Wonder")],
            themes: vec!["fog".to_string()],
        };

        Mock::given(method("POST"))
            .and(path("/dreams/"))
            .and(header("Content-Type", "application/json"))
            .and(body_json(serde_json::to_value(&new_dream).unwrap()))
            .respond_with(ResponseTemplate::new(201).set_body_json(dream_json("d9", "Fog")))
            .mount(&mock_server)
            .await;

        let client = DreamsClient::new(
            &mock_server.uri(),
            None,
            reqwest::Client::new(),
            store_with("access", "refresh"),
        );

        let created = client.create(&new_dream, None).await.unwrap();
        assert_eq!(created.id, "d9");
    }

    #[tokio::test]
    async fn test_create_with_audio_sends_multipart() {
        let mock_server = MockServer::start().await;

        // multipart ボディの厳密な検証は wiremock では難しいので
        // path と method のみでマッチングする
        Mock::given(method("POST"))
            .and(path("/dreams/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(dream_json("d9", "Fog")))
            .mount(&mock_server)
            .await;

        let new_dream = NewDream {
            title: "Fog".to_string(),
            content: "I was walking through fog.".to_string(),
            date: chrono::Utc.with_ymd_and_hms(2026, 8, 1, 6, 30, 0).unwrap(),
            is_lucid: false,
            emotions: vec![],
            themes: vec![],
        };
        let audio = AudioAttachment {
            data: b"RIFF....WAVE".to_vec(),
            file_name: "dream.wav".to_string(),
            content_type: "audio/wav".to_string(),
        };

        let client = DreamsClient::new(
            &mock_server.uri(),
            None,
            reqwest::Client::new(),
            store_with("access", "refresh"),
        );

        let created = client.create(&new_dream, Some(audio)).await.unwrap();
        assert_eq!(created.id, "d9");
    }

    #[tokio::test]
    async fn test_delete_dream() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/dreams/d1/"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let client = DreamsClient::new(
            &mock_server.uri(),
            None,
            reqwest::Client::new(),
            store_with("access", "refresh"),
        );

        assert!(client.delete("d1").await.is_ok());

        let missing = client.delete("d404").await;
        assert!(matches!(missing, Err(DreamsError::ApiError { .. })));
    }

    #[tokio::test]
    async fn test_known_tag_pools() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/emotions/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["Joy", "Fear"])))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/themes/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["flying"])))
            .mount(&mock_server)
            .await;

        let client = DreamsClient::new(
            &mock_server.uri(),
            None,
            reqwest::Client::new(),
            store_with("access", "refresh"),
        );

        assert_eq!(client.known_emotions().await.unwrap(), vec!["Joy", "Fear"]);
        assert_eq!(client.known_themes().await.unwrap(), vec!["flying"]);
    }

    #[tokio::test]
    async fn test_unauthenticated_list_is_rejected_locally() {
        let client = DreamsClient::new(
            "http://localhost:9",
            None,
            reqwest::Client::new(),
            Arc::new(MemorySessionStore::new()),
        );

        let result = client.list().await;
        assert!(matches!(result, Err(DreamsError::NotAuthenticated)));
    }
}
