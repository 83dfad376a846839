//! StorageGateway port - 共有オブジェクトストアへの薄いラッパー
//!
//! 入力も出力も同じストアに置かれます。Gateway は状態を持たず、
//! 複数の JobCoordinator から同時に呼ばれても安全である必要があります。
//!
//! # 実装
//! - **InMemoryGateway**: テスト用（fault injection 付き）
//! - **LocalDirGateway**: ローカルディレクトリ
//! - **S3Gateway**: AWS S3 / S3 互換ストア（feature `s3`）

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which gateway operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageOp {
    Put,
    Get,
    List,
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageOp::Put => "put",
            StorageOp::Get => "get",
            StorageOp::List => "list",
        };
        f.write_str(name)
    }
}

/// Failure reported by a [`StorageGateway`].
///
/// `Transient` is the only variant worth retrying. `NotFound` is what `get`
/// returns for an absent key; the coordinator decides how to treat it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("transient storage failure during {op}: {message}")]
    Transient { op: StorageOp, message: String },

    #[error("storage access denied during {op}: {message}")]
    Denied { op: StorageOp, message: String },
}

impl GatewayError {
    pub fn transient(op: StorageOp, message: impl Into<String>) -> Self {
        Self::Transient {
            op,
            message: message.into(),
        }
    }

    pub fn denied(op: StorageOp, message: impl Into<String>) -> Self {
        Self::Denied {
            op,
            message: message.into(),
        }
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Network, throttling and similar failures that may clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound { .. })
    }
}

/// One entry of a listing pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,

    /// Store-side modification time, when the backend reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectInfo {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
        }
    }

    pub fn modified_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }
}

/// StorageGateway は {put, get, list} だけを提供する
///
/// # 契約
/// - `put` は上書きを許す
/// - `get` はキーが無ければ `GatewayError::NotFound`
/// - `list` は prefix に一致する全キーを返す（順序は保証しない）
/// - listing は結果整合（eventually consistent）として扱う
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Write or overwrite the object at `key`.
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), GatewayError>;

    /// Read the whole object at `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, GatewayError>;

    /// List every object whose key starts with `prefix`, in store-native order.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, GatewayError>;
}
