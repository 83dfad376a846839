//! EventSink port - 待機中の進捗イベントを外に出す
//!
//! ポーリングループは表示層を知りません。進捗は `WaitEvent` として
//! ここに流し、CLI やログが好きな形で描画します。

use crate::domain::events::WaitEvent;

/// EventSink は WaitEvent を受け取る
///
/// emit は同期で、失敗しません。重い処理をしたい実装は自分でキューに積むこと。
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &WaitEvent);
}
