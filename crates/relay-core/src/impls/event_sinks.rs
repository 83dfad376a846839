//! EventSink implementations: no-op and `tracing` forwarding.

use tracing::{debug, info, warn};

use crate::domain::WaitEvent;
use crate::ports::EventSink;

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &WaitEvent) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &WaitEvent) {
        let job_id = event.job_id();
        match event {
            WaitEvent::Submitted { input_key, .. } => {
                info!(%job_id, %input_key, "input submitted");
            }
            WaitEvent::Polled {
                tick, tick_budget, ..
            } => {
                debug!(%job_id, tick, tick_budget, "no output yet");
            }
            WaitEvent::TransientFailure {
                tick,
                consecutive,
                message,
                ..
            } => {
                warn!(%job_id, tick, consecutive, %message, "transient storage failure");
            }
            WaitEvent::Ambiguous {
                selected, others, ..
            } => {
                warn!(%job_id, %selected, ?others, "several outputs matched; picked one by tie-break");
            }
            WaitEvent::Found {
                output_key, tick, size, ..
            } => {
                info!(%job_id, %output_key, tick, size, "output found");
            }
            WaitEvent::TimedOut {
                ticks, elapsed_ms, ..
            } => {
                warn!(%job_id, ticks, elapsed_ms, "gave up waiting for output");
            }
            WaitEvent::Errored { message, .. } => {
                warn!(%job_id, %message, "wait failed");
            }
            WaitEvent::Cancelled { ticks, .. } => {
                info!(%job_id, ticks, "wait cancelled");
            }
        }
    }
}
