//! Errors - ジョブ操作のエラー型と分類
//!
//! 呼び出し側が「もう少し待てば済む」のか「インフラの問題」なのかを
//! 区別できるよう、`ErrorKind` で運用上の分類を返します。

use std::time::Duration;

use thiserror::Error;

use crate::ports::GatewayError;

/// ErrorKind は JobError の運用分類
///
/// - StillProcessing: 出力がまだ無い（待つ or 再実行で解決しうる）
/// - Infrastructure: ストアの障害（待っても解決しない）
/// - Rejected: 入力が不正
/// - Cancelled: 呼び出し側が待機を打ち切った
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    StillProcessing,
    Infrastructure,
    Rejected,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid file name {name:?}: {reason}")]
    InvalidFileName { name: String, reason: &'static str },

    #[error("failed to submit {input_key}")]
    Submit {
        input_key: String,
        #[source]
        source: GatewayError,
    },

    #[error("storage kept failing while waiting ({failures} consecutive failures)")]
    Storage {
        failures: u32,
        #[source]
        source: GatewayError,
    },

    #[error("no output appeared within {waited:?} ({ticks} polls)")]
    Timeout { waited: Duration, ticks: u32 },

    #[error("wait cancelled after {ticks} polls")]
    Cancelled { ticks: u32 },
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::InvalidFileName { .. } => ErrorKind::Rejected,
            JobError::Submit { .. } | JobError::Storage { .. } => ErrorKind::Infrastructure,
            JobError::Timeout { .. } => ErrorKind::StillProcessing,
            JobError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// True when waiting longer (or waiting again) may still produce the result.
    pub fn is_retryable_by_waiting(&self) -> bool {
        self.kind() == ErrorKind::StillProcessing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::StorageOp;

    #[test]
    fn timeout_is_the_only_wait_longer_error() {
        let timeout = JobError::Timeout {
            waited: Duration::from_secs(120),
            ticks: 60,
        };
        let storage = JobError::Storage {
            failures: 4,
            source: GatewayError::transient(StorageOp::List, "503"),
        };

        assert!(timeout.is_retryable_by_waiting());
        assert!(!storage.is_retryable_by_waiting());
        assert_eq!(storage.kind(), ErrorKind::Infrastructure);
    }

    #[test]
    fn submit_error_keeps_gateway_source() {
        let err = JobError::Submit {
            input_key: "input1/a.txt".to_string(),
            source: GatewayError::denied(StorageOp::Put, "403 Forbidden"),
        };
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("403"));
    }
}
