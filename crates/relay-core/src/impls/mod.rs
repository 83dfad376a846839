//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryGateway**: テスト・開発用のオブジェクトストア（fault injection 付き）
//! - **LocalDirGateway**: ローカルディレクトリ上のストア
//! - **S3Gateway**: aws-sdk-s3 によるストア（feature `s3`）
//! - **NoopEventSink / TracingEventSink**: 進捗イベントの出力先

pub mod event_sinks;
pub mod fs_store;
pub mod inmem_store;
#[cfg(feature = "s3")]
pub mod s3_store;

use std::sync::Arc;

use tracing::info;

use crate::config::{ConfigError, StoreConfig};
use crate::ports::StorageGateway;

// 主要な型を再エクスポート
pub use self::event_sinks::{NoopEventSink, TracingEventSink};
pub use self::fs_store::LocalDirGateway;
pub use self::inmem_store::{Fault, InMemoryGateway, OpCounts};
#[cfg(feature = "s3")]
pub use self::s3_store::S3Gateway;

/// 設定に応じた StorageGateway を構築
pub async fn connect_gateway(store: &StoreConfig) -> Result<Arc<dyn StorageGateway>, ConfigError> {
    match store {
        StoreConfig::Local { root } => {
            info!(root = %root.display(), "using local directory store");
            Ok(Arc::new(LocalDirGateway::new(root.clone())))
        }
        #[cfg(feature = "s3")]
        StoreConfig::S3(settings) => {
            info!(bucket = %settings.bucket, region = %settings.region, "using s3 store");
            let gateway = S3Gateway::connect(
                &settings.bucket,
                &settings.region,
                settings.endpoint.as_deref(),
            )
            .await;
            Ok(Arc::new(gateway))
        }
        #[cfg(not(feature = "s3"))]
        StoreConfig::S3(_) => Err(ConfigError::S3Disabled),
    }
}
