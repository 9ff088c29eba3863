//! DreamDeck Auth client for Rust
//!
//! This crate provides authentication functionality for DreamDeck,
//! including sign up, sign in, token refresh and the submit flow
//! used by the login/signup forms.

use chrono::{Datelike, NaiveDate, Utc};
use dreamdeck_rust_session::{Session, SessionError, SessionStore, User};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// 結果型
pub type Result<T> = std::result::Result<T, AuthError>;

/// エラー型
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Authentication failed: {0}")]
    Failure(AuthFailureKind),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Session store error: {0}")]
    StoreError(#[from] SessionError),

    #[error("Missing session")]
    MissingSession,

    #[error("A submit is already in flight")]
    SubmitInFlight,
}

/// パスワード強度の特殊文字集合（固定）
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*(),.?\":{}|<>";

/// 登録できる最低年齢
pub const MINIMUM_AGE: u32 = 18;

/// 送信前バリデーションの失敗
///
/// それぞれが固有のユーザー向けメッセージを持つ。
/// どれかひとつでも失敗したらネットワークには出ない。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Password must be at least 8 characters long")]
    PasswordTooShort,

    #[error("Password must contain an uppercase letter")]
    PasswordNeedsUppercase,

    #[error("Password must contain a lowercase letter")]
    PasswordNeedsLowercase,

    #[error("Password must contain a number")]
    PasswordNeedsDigit,

    #[error("Password must contain a special character")]
    PasswordNeedsSpecial,

    #[error("Passwords do not match")]
    PasswordsDoNotMatch,

    #[error("You must be at least 18 years old to sign up")]
    Underage,

    #[error("Birthday is not a valid date")]
    InvalidBirthday,

    #[error("Username cannot be empty")]
    EmptyUsername,

    #[error("Email address is not valid")]
    InvalidEmail,
}

/// サーバーが返す認証エラーの分類
///
/// 未知のコードは `Unknown` に落とす。メッセージ文言は固定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureKind {
    WeakPassword,
    UserExists,
    InvalidEmail,
    PasswordMismatch,
    InvalidCredentials,
    ServerError,
    Unknown,
}

impl AuthFailureKind {
    /// エラーレスポンスから分類を決める
    ///
    /// ボディの `code` を優先し、無ければステータスで判定する。
    pub fn from_response(status: reqwest::StatusCode, body: &str) -> Self {
        #[derive(Deserialize)]
        struct ErrorBody {
            code: Option<String>,
        }

        if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
            if let Some(code) = parsed.code.as_deref() {
                match code {
                    "weak_password" => return Self::WeakPassword,
                    "user_exists" => return Self::UserExists,
                    "invalid_email" => return Self::InvalidEmail,
                    "password_mismatch" => return Self::PasswordMismatch,
                    "invalid_credentials" => return Self::InvalidCredentials,
                    "server_error" => return Self::ServerError,
                    _ => return Self::Unknown,
                }
            }
        }

        if status.is_server_error() {
            Self::ServerError
        } else if status == reqwest::StatusCode::UNAUTHORIZED {
            Self::InvalidCredentials
        } else {
            Self::Unknown
        }
    }

    /// ユーザー向けの固定メッセージ
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::WeakPassword => "That password is too weak to guard your dreams",
            Self::UserExists => "An account with that name already exists",
            Self::InvalidEmail => "That email address does not look right",
            Self::PasswordMismatch => "The passwords do not match",
            Self::InvalidCredentials => "Wrong email or password",
            Self::ServerError => "The dream server is having trouble, try again later",
            Self::Unknown => "Something went wrong, please try again",
        }
    }
}

impl std::fmt::Display for AuthFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.user_message())
    }
}

/// サインアップフォームの内容
#[derive(Debug, Clone, Serialize)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub name: String,
    pub birthday: NaiveDate,
    pub password: String,
    pub confirm_password: String,
}

/// パスワード強度の各基準
///
/// フォームのライブバリデーター表示用。5 つすべて満たして合格。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PasswordCriteria {
    pub length: bool,
    pub uppercase: bool,
    pub lowercase: bool,
    pub digit: bool,
    pub special: bool,
}

impl PasswordCriteria {
    /// パスワードを評価する
    pub fn evaluate(password: &str) -> Self {
        Self {
            length: password.chars().count() >= 8,
            uppercase: password.chars().any(|c| c.is_ascii_uppercase()),
            lowercase: password.chars().any(|c| c.is_ascii_lowercase()),
            digit: password.chars().any(|c| c.is_ascii_digit()),
            special: password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)),
        }
    }

    pub fn all_met(&self) -> bool {
        self.length && self.uppercase && self.lowercase && self.digit && self.special
    }
}

/// パスワード強度を検証する
///
/// 失敗した最初の基準を固有のエラーで返す。
pub fn validate_password_strength(password: &str) -> std::result::Result<(), ValidationError> {
    let criteria = PasswordCriteria::evaluate(password);
    if !criteria.length {
        return Err(ValidationError::PasswordTooShort);
    }
    if !criteria.uppercase {
        return Err(ValidationError::PasswordNeedsUppercase);
    }
    if !criteria.lowercase {
        return Err(ValidationError::PasswordNeedsLowercase);
    }
    if !criteria.digit {
        return Err(ValidationError::PasswordNeedsDigit);
    }
    if !criteria.special {
        return Err(ValidationError::PasswordNeedsSpecial);
    }
    Ok(())
}

/// 誕生日から暦通りの満年齢を計算する
///
/// 365 日割りの近似ではなく月日で比較する。2/29 生まれは平年では
/// 3/1 に歳をとる扱いになる。
pub fn age_on(birthday: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birthday.year();
    if (today.month(), today.day()) < (birthday.month(), birthday.day()) {
        age -= 1;
    }
    age
}

/// サインアップフォームを検証する
pub fn validate_signup(
    form: &SignupForm,
    today: NaiveDate,
) -> std::result::Result<(), ValidationError> {
    if form.username.trim().is_empty() {
        return Err(ValidationError::EmptyUsername);
    }
    if !is_plausible_email(&form.email) {
        return Err(ValidationError::InvalidEmail);
    }
    if form.birthday > today {
        return Err(ValidationError::InvalidBirthday);
    }
    if age_on(form.birthday, today) < MINIMUM_AGE as i32 {
        return Err(ValidationError::Underage);
    }
    validate_password_strength(&form.password)?;
    if form.password != form.confirm_password {
        return Err(ValidationError::PasswordsDoNotMatch);
    }
    Ok(())
}

// `x@y.z` 程度の形だけ確認する。本検証はサーバー側。
fn is_plausible_email(email: &str) -> bool {
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// 認証レスポンス
#[derive(Debug, Clone, Deserialize)]
struct AuthResponse {
    token: String,
    refresh_token: String,
    user: User,
}

impl From<AuthResponse> for Session {
    fn from(response: AuthResponse) -> Self {
        Session {
            token: response.token,
            refresh_token: response.refresh_token,
            user: response.user,
        }
    }
}

/// トークンリフレッシュのレスポンス
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Auth クライアント
pub struct AuthClient {
    base_url: String,
    api_key: Option<String>,
    http_client: Client,
    store: Arc<dyn SessionStore>,
}

impl AuthClient {
    /// 新しい Auth クライアントを作成
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

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("apikey", key),
            None => builder,
        }
    }

    /// ユーザー登録
    ///
    /// 送信前にフォーム全体を検証し、失敗したらネットワークに出ない。
    /// 成功時はセッションをストアへ保存してから返す。
    pub async fn sign_up(&self, form: &SignupForm) -> Result<Session> {
        validate_signup(form, Utc::now().date_naive())?;

        let url = format!("{}/signup/", self.base_url);

        let payload = serde_json::json!({
            "username": form.username,
            "email": form.email,
            "name": form.name,
            "birthday": form.birthday,
            "password": form.password,
            "confirm_password": form.confirm_password,
        });

        let response = self
            .request(self.http_client.post(&url))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let kind = AuthFailureKind::from_response(status, &body);
            log::warn!("sign up rejected ({}): {:?}", status, kind);
            return Err(AuthError::Failure(kind));
        }

        let session: Session = response.json::<AuthResponse>().await?.into();

        // セッションを保存
        self.store.set_session(&session)?;

        Ok(session)
    }

    /// 識別子（ユーザー名またはメール）とパスワードでログイン
    pub async fn sign_in(&self, identifier: &str, password: &str) -> Result<Session> {
        let url = format!("{}/login/", self.base_url);

        let payload = serde_json::json!({
            "identifier": identifier,
            "password": password,
        });

        let response = self
            .request(self.http_client.post(&url))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let kind = AuthFailureKind::from_response(status, &body);
            log::warn!("sign in rejected ({}): {:?}", status, kind);
            return Err(AuthError::Failure(kind));
        }

        let session: Session = response.json::<AuthResponse>().await?.into();

        // セッションを保存
        self.store.set_session(&session)?;

        Ok(session)
    }

    /// 保存済みのリフレッシュトークンでアクセストークンを更新する
    ///
    /// 成功時はストアのアクセストークンだけを上書きする。
    /// リフレッシュトークンとユーザーはそのまま。
    pub async fn refresh_access_token(&self) -> Result<String> {
        let session = self.store.get_session()?.ok_or(AuthError::MissingSession)?;

        let url = format!("{}/token/refresh/", self.base_url);

        let payload = serde_json::json!({
            "refresh": session.refresh_token,
        });

        let response = self
            .request(self.http_client.post(&url))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let kind = AuthFailureKind::from_response(status, &body);
            log::warn!("token refresh rejected ({}): {:?}", status, kind);
            return Err(AuthError::Failure(kind));
        }

        let refreshed: RefreshResponse = response.json().await?;
        self.store.set_access_token(&refreshed.access)?;

        Ok(refreshed.access)
    }

    /// サインアウト
    ///
    /// サーバー側の失効 API は無いので、ストアのセッションを消すだけ。
    pub fn sign_out(&self) -> Result<()> {
        self.store.clear_session()?;
        Ok(())
    }

    /// 現在のセッションを取得
    pub fn current_session(&self) -> Result<Option<Session>> {
        Ok(self.store.get_session()?)
    }
}

/// フォームのモード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Signup,
}

/// 送信の段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Idle,
    Submitting,
    Errored,
    Succeeded,
}

/// AuthFlow のオプション
#[derive(Debug, Clone)]
pub struct AuthFlowOptions {
    /// エラーメッセージの表示期限
    pub error_ttl: Duration,
}

impl Default for AuthFlowOptions {
    fn default() -> Self {
        Self {
            error_ttl: Duration::from_secs(5),
        }
    }
}

struct FlowError {
    message: String,
    shown_at: Instant,
}

/// ログイン／サインアップフォームの送信フロー
///
/// `{ mode } x { idle, submitting, errored, succeeded }` の状態機械。
/// 同時送信はひとつだけ。エラーメッセージは期限付きで見えなくなる。
pub struct AuthFlow {
    client: AuthClient,
    mode: AuthMode,
    phase: AuthPhase,
    error: Option<FlowError>,
    options: AuthFlowOptions,
}

impl AuthFlow {
    pub fn new(client: AuthClient, mode: AuthMode) -> Self {
        Self::with_options(client, mode, AuthFlowOptions::default())
    }

    pub fn with_options(client: AuthClient, mode: AuthMode, options: AuthFlowOptions) -> Self {
        Self {
            client,
            mode,
            phase: AuthPhase::Idle,
            error: None,
            options,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// モードを切り替える（進行中の送信があるときは無視）
    pub fn set_mode(&mut self, mode: AuthMode) {
        if self.phase != AuthPhase::Submitting {
            self.mode = mode;
            self.phase = AuthPhase::Idle;
            self.error = None;
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    /// 送信ボタンを無効化すべきか
    pub fn is_submitting(&self) -> bool {
        self.phase == AuthPhase::Submitting
    }

    /// 現在見えているエラーメッセージ
    ///
    /// TTL を過ぎたメッセージは自動的に消える。
    pub fn visible_error(&self) -> Option<&str> {
        match &self.error {
            Some(error) if error.shown_at.elapsed() < self.options.error_ttl => {
                Some(error.message.as_str())
            }
            _ => None,
        }
    }

    /// ログインを送信
    pub async fn submit_login(&mut self, identifier: &str, password: &str) -> Result<Session> {
        if self.mode != AuthMode::Login {
            self.mode = AuthMode::Login;
        }
        self.begin_submit()?;
        let result = self.client.sign_in(identifier, password).await;
        self.finish_submit(result)
    }

    /// サインアップを送信
    pub async fn submit_signup(&mut self, form: &SignupForm) -> Result<Session> {
        if self.mode != AuthMode::Signup {
            self.mode = AuthMode::Signup;
        }
        self.begin_submit()?;
        let result = self.client.sign_up(form).await;
        self.finish_submit(result)
    }

    fn begin_submit(&mut self) -> Result<()> {
        if self.phase == AuthPhase::Submitting {
            return Err(AuthError::SubmitInFlight);
        }
        self.phase = AuthPhase::Submitting;
        self.error = None;
        Ok(())
    }

    fn finish_submit(&mut self, result: Result<Session>) -> Result<Session> {
        match result {
            Ok(session) => {
                self.phase = AuthPhase::Succeeded;
                Ok(session)
            }
            Err(err) => {
                self.phase = AuthPhase::Errored;
                let message = match &err {
                    AuthError::Failure(kind) => kind.user_message().to_string(),
                    other => other.to_string(),
                };
                self.error = Some(FlowError {
                    message,
                    shown_at: Instant::now(),
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(password: &str, confirm: &str, birthday: NaiveDate) -> SignupForm {
        SignupForm {
            username: "dreamer".to_string(),
            email: "dreamer@example.com".to_string(),
            name: "Dreamer".to_string(),
            birthday,
            password: password.to_string(),
            confirm_password: confirm.to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 6).unwrap()
    }

    #[test]
    fn password_missing_each_criterion_is_rejected_distinctly() {
        assert_eq!(
            validate_password_strength("Ab1!x"),
            Err(ValidationError::PasswordTooShort)
        );
        assert_eq!(
            validate_password_strength("lowercase1!"),
            Err(ValidationError::PasswordNeedsUppercase)
        );
        assert_eq!(
            validate_password_strength("UPPERCASE1!"),
            Err(ValidationError::PasswordNeedsLowercase)
        );
        assert_eq!(
            validate_password_strength("NoDigits!!"),
            Err(ValidationError::PasswordNeedsDigit)
        );
        assert_eq!(
            validate_password_strength("NoSpecial1"),
            Err(ValidationError::PasswordNeedsSpecial)
        );
        assert_eq!(validate_password_strength("Dreams4ever!"), Ok(()));
    }

    #[test]
    fn age_gate_is_calendar_exact() {
        let today = today();

        // ちょうど 18 年前の生まれは合格
        let on_the_day = NaiveDate::from_ymd_opt(2008, 8, 6).unwrap();
        assert_eq!(age_on(on_the_day, today), 18);
        assert!(validate_signup(&form("Dreams4ever!", "Dreams4ever!", on_the_day), today).is_ok());

        // あと 1 日足りない生まれは不合格
        let one_day_short = NaiveDate::from_ymd_opt(2008, 8, 7).unwrap();
        assert_eq!(age_on(one_day_short, today), 17);
        assert_eq!(
            validate_signup(&form("Dreams4ever!", "Dreams4ever!", one_day_short), today),
            Err(ValidationError::Underage)
        );
    }

    #[test]
    fn leap_day_birthday_rolls_to_march() {
        let birthday = NaiveDate::from_ymd_opt(2008, 2, 29).unwrap();
        let feb_28 = NaiveDate::from_ymd_opt(2026, 2, 28).unwrap();
        let mar_1 = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(age_on(birthday, feb_28), 17);
        assert_eq!(age_on(birthday, mar_1), 18);
    }

    #[test]
    fn confirm_password_must_match() {
        let birthday = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
        assert_eq!(
            validate_signup(&form("Dreams4ever!", "Dreams4ever?", birthday), today()),
            Err(ValidationError::PasswordsDoNotMatch)
        );
    }

    #[test]
    fn email_shape_is_checked() {
        let birthday = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
        let mut bad = form("Dreams4ever!", "Dreams4ever!", birthday);
        bad.email = "not-an-email".to_string();
        assert_eq!(
            validate_signup(&bad, today()),
            Err(ValidationError::InvalidEmail)
        );

        let mut no_dot = form("Dreams4ever!", "Dreams4ever!", birthday);
        no_dot.email = "user@host".to_string();
        assert_eq!(
            validate_signup(&no_dot, today()),
            Err(ValidationError::InvalidEmail)
        );
    }

    #[test]
    fn failure_kind_mapping() {
        use reqwest::StatusCode;

        assert_eq!(
            AuthFailureKind::from_response(StatusCode::BAD_REQUEST, r#"{"code":"user_exists"}"#),
            AuthFailureKind::UserExists
        );
        assert_eq!(
            AuthFailureKind::from_response(StatusCode::BAD_REQUEST, r#"{"code":"weak_password"}"#),
            AuthFailureKind::WeakPassword
        );
        assert_eq!(
            AuthFailureKind::from_response(StatusCode::UNAUTHORIZED, "nonsense"),
            AuthFailureKind::InvalidCredentials
        );
        assert_eq!(
            AuthFailureKind::from_response(StatusCode::INTERNAL_SERVER_ERROR, ""),
            AuthFailureKind::ServerError
        );
        assert_eq!(
            AuthFailureKind::from_response(StatusCode::BAD_REQUEST, r#"{"code":"???"}"#),
            AuthFailureKind::Unknown
        );
    }
}
