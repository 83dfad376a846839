//! Domain identifiers.
//!
//! # ULID ベースの JobId
//! - **時刻でソート可能**: timestamp が先頭にあるため、生成順序でソートできる
//! - **分散生成可能**: 調整なしで複数のクライアントが生成できる
//!
//! Reserved 命名規約では、ULID の小文字表現を job nonce としてキーに埋め込みます。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Identifier of one submission.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(Ulid);

impl JobId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Lowercase ULID used inside reserved storage keys.
    pub fn nonce(&self) -> String {
        self.0.to_string().to_ascii_lowercase()
    }

    /// Parse a nonce back into an id (case-insensitive, as ULIDs are).
    pub fn from_nonce(nonce: &str) -> Option<Self> {
        Ulid::from_str(&nonce.to_ascii_uppercase()).ok().map(Self)
    }
}

impl From<Ulid> for JobId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}
