//! relay-core
//!
//! Submit an input to an object store, wait for an external worker to
//! write the converted output next to it, and fetch that output.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, naming, job, state, events, errors, mime, outcome）
//! - **ports**: 抽象化レイヤー（StorageGateway, Clock, IdGenerator, EventSink）
//! - **app**: アプリケーションロジック（JobCoordinator, CompletionDetector, PollPolicy, builder）
//! - **impls**: 実装（InMemory / LocalDir / S3 ゲートウェイ、EventSink）
//! - **config**: JSON 設定の読み込み

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{CancelHandle, CancelSignal, JobCoordinator, PollPolicy, cancel_pair};
pub use domain::{Completion, Job, JobError, NamingConvention};
pub use ports::StorageGateway;
