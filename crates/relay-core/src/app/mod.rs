//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせて submit → await → fetch を実装します。
//!
//! # 主要コンポーネント
//! - **JobCoordinator**: 入力の投入・完了待ち・出力の取得
//! - **CoordinatorBuilder**: ポートのワイヤリングと起動時検証
//! - **CompletionDetector**: 1 ティックごとの判定（I/O なし）
//! - **PollPolicy**: ティック間の待ち時間と打ち切り条件
//! - **CancelHandle / CancelSignal**: 待機の外部キャンセル

pub mod builder;
pub mod cancel;
pub mod coordinator;
pub mod detector;
pub mod policy;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, CoordinatorBuilder};
pub use self::cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use self::coordinator::JobCoordinator;
pub use self::detector::{CompletionDetector, Selection, select_candidate};
pub use self::policy::{PolicyError, PollPolicy};
