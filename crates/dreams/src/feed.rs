use crate::{Dream, DreamsClient};
use tokio::sync::watch;

/// フィード再読み込みの通知バス
///
/// 変更を起こしたコンポーネント（記録ポップアップ、削除フロー）が
/// `publish` を呼び、フィードは購読側で待つ。カウンターを直接増やす
/// 旧方式の置き換え。通知は合流する（連続 publish は 1 回に見える
/// ことがある）が、取りこぼしはない。
pub struct RefreshBus {
    tx: watch::Sender<u64>,
}

impl RefreshBus {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// 再読み込みを要求する
    pub fn publish(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }

    /// 購読を開始する
    pub fn subscribe(&self) -> RefreshSignal {
        RefreshSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for RefreshBus {
    fn default() -> Self {
        Self::new()
    }
}

/// バスの購読側
pub struct RefreshSignal {
    rx: watch::Receiver<u64>,
}

impl RefreshSignal {
    /// 次の通知まで待つ
    ///
    /// バスが落ちた（送信側が破棄された）ときは false。
    pub async fn invalidated(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// 未消化の通知があるか
    pub fn has_pending(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// 未消化の通知を消化済みにする
    pub fn mark_seen(&mut self) {
        self.rx.borrow_and_update();
    }
}

/// 検索語で夢を絞り込む
///
/// タイトルか本文に大文字小文字を無視した部分一致。空の検索語は全件。
pub fn filter_dreams<'a>(dreams: &'a [Dream], term: &str) -> Vec<&'a Dream> {
    if term.is_empty() {
        return dreams.iter().collect();
    }
    let needle = term.to_lowercase();
    dreams
        .iter()
        .filter(|dream| {
            dream.title.to_lowercase().contains(&needle)
                || dream.content.to_lowercase().contains(&needle)
        })
        .collect()
}

/// フィードの状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedState {
    /// セッションが無いので取得しない。ログインを促す。
    SignedOut,
    Loading,
    Loaded,
    Errored(String),
}

/// 夢フィードのシンクロナイザー
///
/// マウント時と、バスからの通知で再取得する。ポーリングもプッシュも
/// 無い。成功のたびにリストを丸ごと置き換える。
pub struct DreamFeed {
    client: DreamsClient,
    signal: RefreshSignal,
    dreams: Vec<Dream>,
    search_term: String,
    state: FeedState,
}

impl DreamFeed {
    pub fn new(client: DreamsClient, signal: RefreshSignal) -> Self {
        Self {
            client,
            signal,
            dreams: Vec::new(),
            search_term: String::new(),
            state: FeedState::Loading,
        }
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn dreams(&self) -> &[Dream] {
        &self.dreams
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn set_search_term(&mut self, term: &str) {
        self.search_term = term.to_string();
    }

    /// 検索語を適用した表示対象
    pub fn visible(&self) -> Vec<&Dream> {
        filter_dreams(&self.dreams, &self.search_term)
    }

    /// フィードを読み込む
    ///
    /// セッションが無ければ取得せず `SignedOut`。エラーはローカルな
    /// 状態に留め、セッションには触れない。
    pub async fn load(&mut self) {
        match self.client.is_signed_in() {
            Ok(true) => {}
            Ok(false) => {
                self.dreams.clear();
                self.state = FeedState::SignedOut;
                return;
            }
            Err(err) => {
                self.state = FeedState::Errored(err.to_string());
                return;
            }
        }

        self.state = FeedState::Loading;
        match self.client.list().await {
            Ok(dreams) => {
                // 差分マージはしない。丸ごと置き換え。
                self.dreams = dreams;
                self.state = FeedState::Loaded;
            }
            Err(err) => {
                log::error!("failed to load dreams: {}", err);
                self.state = FeedState::Errored(err.to_string());
            }
        }
    }

    /// バスの次の通知を待ってから読み込む
    pub async fn reload_on_invalidation(&mut self) {
        if self.signal.invalidated().await {
            self.load().await;
        }
    }
}
