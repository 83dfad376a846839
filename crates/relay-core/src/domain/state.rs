//! State - 完了検出の状態
//!
//! ```text
//! Waiting ──┬─> Found      (候補を選び、取得できた)
//!           ├─> TimedOut   (max_wait 経過)
//!           ├─> Errored    (障害が予算を超えた)
//!           └─> Cancelled  (呼び出し側の中断)
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    Waiting,
    Found,
    TimedOut,
    Errored,
    Cancelled,
}

impl WaitState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        !matches!(self, WaitState::Waiting)
    }
}
