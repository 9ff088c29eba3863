use crate::{DreamsClient, RefreshBus, Result};
use std::time::{Duration, Instant};

/// 削除フローの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteState {
    Normal,
    Confirming,
    Deleting,
}

/// 削除フローのオプション
#[derive(Debug, Clone)]
pub struct DeleteFlowOptions {
    /// 確認パネルを開いた直後の外側クリックを無視する時間。
    /// 開くきっかけになったクリック自身と競合しないようにする。
    pub outside_click_debounce: Duration,
}

impl Default for DeleteFlowOptions {
    fn default() -> Self {
        Self {
            outside_click_debounce: Duration::from_millis(100),
        }
    }
}

/// 夢カードごとの削除フロー
///
/// `Normal -> Confirming -> Deleting -> Normal`。確認パネルは外側
/// クリックでキャンセル扱いで閉じる。確定した削除が 2xx を返したら
/// バスへ 1 回だけ通知し、失敗ならログに残してカードはそのまま。
pub struct DeleteFlow {
    dream_id: String,
    state: DeleteState,
    confirming_since: Option<Instant>,
    options: DeleteFlowOptions,
}

impl DeleteFlow {
    pub fn new(dream_id: &str) -> Self {
        Self::with_options(dream_id, DeleteFlowOptions::default())
    }

    pub fn with_options(dream_id: &str, options: DeleteFlowOptions) -> Self {
        Self {
            dream_id: dream_id.to_string(),
            state: DeleteState::Normal,
            confirming_since: None,
            options,
        }
    }

    pub fn dream_id(&self) -> &str {
        &self.dream_id
    }

    pub fn state(&self) -> DeleteState {
        self.state
    }

    /// 削除アイコンのクリック。確認パネルを開く。
    pub fn request_delete(&mut self) {
        if self.state == DeleteState::Normal {
            self.state = DeleteState::Confirming;
            self.confirming_since = Some(Instant::now());
        }
    }

    /// パネル外のクリック
    ///
    /// 開いた直後のデバウンス時間内は無視。それ以降はキャンセル扱い。
    pub fn outside_click(&mut self) {
        if self.state != DeleteState::Confirming {
            return;
        }
        let settled = self
            .confirming_since
            .map(|since| since.elapsed() >= self.options.outside_click_debounce)
            .unwrap_or(true);
        if settled {
            self.cancel();
        }
    }

    /// キャンセル（Keep ボタン）
    pub fn cancel(&mut self) {
        if self.state == DeleteState::Confirming {
            self.close();
        }
    }

    /// 確定した削除を実行する
    ///
    /// 成否にかかわらずパネルは閉じる。成功時だけバスへ通知する。
    /// 失敗時の自動リトライはしない。
    pub async fn confirm(&mut self, client: &DreamsClient, bus: &RefreshBus) -> Result<()> {
        if self.state != DeleteState::Confirming {
            return Ok(());
        }
        self.state = DeleteState::Deleting;

        match client.delete(&self.dream_id).await {
            Ok(()) => {
                bus.publish();
                self.close();
                Ok(())
            }
            Err(err) => {
                log::error!("failed to delete dream {}: {}", self.dream_id, err);
                self.close();
                Err(err)
            }
        }
    }

    fn close(&mut self) {
        self.state = DeleteState::Normal;
        self.confirming_since = None;
    }
}
