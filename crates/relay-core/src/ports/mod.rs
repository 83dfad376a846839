//! Ports - 抽象化レイヤー
//!
//! 外部システム（オブジェクトストア、時計、ID 生成、進捗表示）への
//! インターフェースを定義します。実装は `impls` にあります。

pub mod storage_gateway;
pub mod clock;
pub mod id_generator;
pub mod event_sink;

pub use self::storage_gateway::{GatewayError, ObjectInfo, StorageGateway, StorageOp};
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::event_sink::EventSink;
