//! DreamDeck session store
//!
//! This crate provides client-side persistence for the authenticated
//! session (access token, refresh token, user profile) and for user
//! preferences such as dark mode.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

/// 結果型
pub type Result<T> = std::result::Result<T, SessionError>;

/// エラー型
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing session")]
    MissingSession,

    #[error("Storage error: {0}")]
    StorageError(String),
}

/// ユーザー情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
}

/// セッション情報
///
/// `token` が無い状態はログアウトとして扱われる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub refresh_token: String,
    pub user: User,
}

/// ユーザー設定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub dark_mode: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self { dark_mode: true }
    }
}

/// 永続化ドキュメントの固定キー
pub const KEY_TOKEN: &str = "token";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub const KEY_USER: &str = "user";
pub const KEY_PREFERENCES: &str = "preferences";

/// セッションストアの契約
///
/// 認証済みリクエストはすべてここからアクセストークンを読み、
/// トークンリフレッシュはここを上書きする。期限タイマーは持たない。
/// 期限切れはサーバーの 401 で初めて発覚する。
pub trait SessionStore: Send + Sync {
    /// 現在のセッションを取得
    fn get_session(&self) -> Result<Option<Session>>;

    /// セッションを保存
    fn set_session(&self, session: &Session) -> Result<()>;

    /// アクセストークンのみを上書き（リフレッシュ成功時）
    fn set_access_token(&self, token: &str) -> Result<()>;

    /// セッションを破棄
    fn clear_session(&self) -> Result<()>;

    /// ユーザー設定を取得
    fn get_preferences(&self) -> Result<Preferences>;

    /// ユーザー設定を保存
    fn set_preferences(&self, preferences: &Preferences) -> Result<()>;
}

/// メモリ上のセッションストア
///
/// プロセス終了で消える。テストや一時利用向け。
#[derive(Default)]
pub struct MemorySessionStore {
    session: RwLock<Option<Session>>,
    preferences: RwLock<Preferences>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get_session(&self) -> Result<Option<Session>> {
        let guard = self
            .session
            .read()
            .map_err(|_| SessionError::StorageError("session lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn set_session(&self, session: &Session) -> Result<()> {
        let mut guard = self
            .session
            .write()
            .map_err(|_| SessionError::StorageError("session lock poisoned".to_string()))?;
        *guard = Some(session.clone());
        Ok(())
    }

    fn set_access_token(&self, token: &str) -> Result<()> {
        let mut guard = self
            .session
            .write()
            .map_err(|_| SessionError::StorageError("session lock poisoned".to_string()))?;
        match guard.as_mut() {
            Some(session) => {
                session.token = token.to_string();
                Ok(())
            }
            None => Err(SessionError::MissingSession),
        }
    }

    fn clear_session(&self) -> Result<()> {
        let mut guard = self
            .session
            .write()
            .map_err(|_| SessionError::StorageError("session lock poisoned".to_string()))?;
        *guard = None;
        Ok(())
    }

    fn get_preferences(&self) -> Result<Preferences> {
        let guard = self
            .preferences
            .read()
            .map_err(|_| SessionError::StorageError("preferences lock poisoned".to_string()))?;
        Ok(*guard)
    }

    fn set_preferences(&self, preferences: &Preferences) -> Result<()> {
        let mut guard = self
            .preferences
            .write()
            .map_err(|_| SessionError::StorageError("preferences lock poisoned".to_string()))?;
        *guard = *preferences;
        Ok(())
    }
}

/// ディスク上の永続ドキュメント
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preferences: Option<Preferences>,
}

impl StoredState {
    fn session(&self) -> Option<Session> {
        // 3 フィールドが揃って初めてログイン状態とみなす
        match (&self.token, &self.refresh_token, &self.user) {
            (Some(token), Some(refresh_token), Some(user)) => Some(Session {
                token: token.clone(),
                refresh_token: refresh_token.clone(),
                user: user.clone(),
            }),
            _ => None,
        }
    }
}

/// ファイルベースのセッションストア
///
/// JSON ドキュメントひとつを固定キーで保持する。プロセスを跨いで生存する。
pub struct FileSessionStore {
    path: PathBuf,
    state: RwLock<StoredState>,
}

impl FileSessionStore {
    /// 既定の保存先 (`<config_dir>/dreamdeck/session.json`) で開く
    pub fn open_default() -> Result<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| SessionError::StorageError("no config directory".to_string()))?;
        Self::open(base.join("dreamdeck").join("session.json"))
    }

    /// 指定パスで開く
    ///
    /// 壊れたファイルはエラーにせず、ログアウト状態として読み捨てる。
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = Self::load(&path);
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    fn load(path: &Path) -> StoredState {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<StoredState>(&contents) {
                Ok(state) => state,
                Err(err) => {
                    log::warn!(
                        "session file {} is unreadable, treating as signed out: {}",
                        path.display(),
                        err
                    );
                    StoredState::default()
                }
            },
            Err(_) => StoredState::default(),
        }
    }

    /// 一時ファイルへ書いてから rename する
    fn persist(&self, state: &StoredState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut tmp = fs::File::create(&tmp_path)?;
            tmp.write_all(serde_json::to_string_pretty(state)?.as_bytes())?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut StoredState) -> Result<()>,
    {
        let mut guard = self
            .state
            .write()
            .map_err(|_| SessionError::StorageError("session lock poisoned".to_string()))?;
        f(&mut guard)?;
        self.persist(&guard)
    }
}

impl SessionStore for FileSessionStore {
    fn get_session(&self) -> Result<Option<Session>> {
        let guard = self
            .state
            .read()
            .map_err(|_| SessionError::StorageError("session lock poisoned".to_string()))?;
        Ok(guard.session())
    }

    fn set_session(&self, session: &Session) -> Result<()> {
        self.update(|state| {
            state.token = Some(session.token.clone());
            state.refresh_token = Some(session.refresh_token.clone());
            state.user = Some(session.user.clone());
            Ok(())
        })
    }

    fn set_access_token(&self, token: &str) -> Result<()> {
        self.update(|state| {
            if state.session().is_none() {
                return Err(SessionError::MissingSession);
            }
            state.token = Some(token.to_string());
            Ok(())
        })
    }

    fn clear_session(&self) -> Result<()> {
        self.update(|state| {
            state.token = None;
            state.refresh_token = None;
            state.user = None;
            Ok(())
        })
    }

    fn get_preferences(&self) -> Result<Preferences> {
        let guard = self
            .state
            .read()
            .map_err(|_| SessionError::StorageError("session lock poisoned".to_string()))?;
        Ok(guard.preferences.unwrap_or_default())
    }

    fn set_preferences(&self, preferences: &Preferences) -> Result<()> {
        self.update(|state| {
            state.preferences = Some(*preferences);
            Ok(())
        })
    }
}
