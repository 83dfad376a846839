//! Events - 待機ループが発行する進捗イベント
//!
//! 表示層（CLI のスピナーなど）とループを切り離すため、
//! 進捗はすべてこのイベントとして `EventSink` に流します。

use serde::Serialize;

use super::ids::JobId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WaitEvent {
    Submitted {
        job_id: JobId,
        input_key: String,
    },
    /// One listing pass finished without selecting an output.
    Polled {
        job_id: JobId,
        tick: u32,
        tick_budget: u32,
        elapsed_ms: u64,
    },
    TransientFailure {
        job_id: JobId,
        tick: u32,
        consecutive: u32,
        message: String,
    },
    /// More than one candidate matched; `selected` won the tie-break.
    Ambiguous {
        job_id: JobId,
        selected: String,
        others: Vec<String>,
    },
    Found {
        job_id: JobId,
        tick: u32,
        output_key: String,
        size: usize,
    },
    TimedOut {
        job_id: JobId,
        ticks: u32,
        elapsed_ms: u64,
    },
    Errored {
        job_id: JobId,
        message: String,
    },
    Cancelled {
        job_id: JobId,
        ticks: u32,
    },
}

impl WaitEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            WaitEvent::Submitted { job_id, .. }
            | WaitEvent::Polled { job_id, .. }
            | WaitEvent::TransientFailure { job_id, .. }
            | WaitEvent::Ambiguous { job_id, .. }
            | WaitEvent::Found { job_id, .. }
            | WaitEvent::TimedOut { job_id, .. }
            | WaitEvent::Errored { job_id, .. }
            | WaitEvent::Cancelled { job_id, .. } => *job_id,
        }
    }
}
