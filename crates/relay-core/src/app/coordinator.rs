//! JobCoordinator - submit → await → fetch
//!
//! # フロー
//! 1. `submit`: 入力を `input1/` 以下に put して Job を返す（リトライしない）
//! 2. `await_result`: ティックごとに list → 候補選択 → get
//! 3. ティック間は `Clock::sleep` でのみ待つ（cancel と競合させる）
//!
//! どの出力がどのジョブのものかはロックではなく命名規約とタイブレークで決まるので、
//! 同じ Gateway を複数の Coordinator で共有しても構いません。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::app::builder::CoordinatorBuilder;
use crate::app::cancel::CancelSignal;
use crate::app::detector::{CompletionDetector, Selection};
use crate::app::policy::PollPolicy;
use crate::domain::{Completion, INPUT_PREFIX, Job, JobError, NamingConvention, WaitEvent};
use crate::ports::{Clock, EventSink, GatewayError, IdGenerator, StorageGateway};

pub struct JobCoordinator {
    pub(crate) gateway: Arc<dyn StorageGateway>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) convention: NamingConvention,
    pub(crate) policy: PollPolicy,
}

impl JobCoordinator {
    pub fn builder(gateway: Arc<dyn StorageGateway>) -> CoordinatorBuilder {
        CoordinatorBuilder::new(gateway)
    }

    /// Default policy used by [`JobCoordinator::convert`].
    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn convention(&self) -> NamingConvention {
        self.convention
    }

    pub fn gateway(&self) -> &Arc<dyn StorageGateway> {
        &self.gateway
    }

    /// Upload `bytes` as the input for `file_name`.
    ///
    /// Failures from the store come back as `JobError::Submit`; nothing is
    /// retried here.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn submit(&self, bytes: &[u8], file_name: &str) -> Result<Job, JobError> {
        let id = self.ids.generate_job_id();
        let job = Job::new(id, file_name, self.convention, self.clock.now())?;

        if let Err(source) = self.gateway.put(job.input_key(), bytes).await {
            warn!(input_key = job.input_key(), error = %source, "submit failed");
            return Err(JobError::Submit {
                input_key: job.input_key().to_string(),
                source,
            });
        }

        let job = job.stamped(self.clock.now());
        self.events.emit(&WaitEvent::Submitted {
            job_id: job.id(),
            input_key: job.input_key().to_string(),
        });
        Ok(job)
    }

    /// Rebuild a job handle from an input key already in the store.
    pub fn resume(&self, input_key: &str) -> Result<Job, JobError> {
        Job::resume(
            input_key,
            self.convention,
            self.ids.generate_job_id(),
            self.clock.now(),
        )
    }

    /// Poll until the job's output shows up, then fetch it.
    ///
    /// Ends with `Timeout` once `policy.max_wait` (from `job.submitted_at()`)
    /// is used up, `Storage` when the failure budget is exhausted, and
    /// `Cancelled` as soon as `cancel` fires, even mid-call.
    #[instrument(skip_all, fields(job_id = %job.id(), input_key = job.input_key()))]
    pub async fn await_result(
        &self,
        job: &Job,
        policy: &PollPolicy,
        cancel: &CancelSignal,
    ) -> Result<Completion, JobError> {
        let mut detector = CompletionDetector::new(job.clone(), policy.clone());
        let tick_budget = policy.tick_budget();

        loop {
            if cancel.is_cancelled() {
                return Err(self.abandon(&mut detector));
            }

            let tick = detector.begin_tick();
            let listing = match self
                .bounded(&detector, cancel, self.gateway.list(INPUT_PREFIX))
                .await
            {
                Ok(listing) => listing,
                Err(interrupt) => return Err(self.interrupted(&mut detector, interrupt)),
            };
            let failure = listing.as_ref().err().map(ToString::to_string);

            match detector.observe(listing) {
                Ok(Some(selection)) => {
                    if let Some(completion) =
                        self.fetch_selected(&mut detector, selection, cancel).await?
                    {
                        return Ok(completion);
                    }
                }
                Ok(None) => match failure {
                    Some(message) => {
                        warn!(tick, %message, "listing failed; still waiting");
                        self.events.emit(&WaitEvent::TransientFailure {
                            job_id: job.id(),
                            tick,
                            consecutive: detector.consecutive_failures(),
                            message,
                        });
                    }
                    None => {
                        self.events.emit(&WaitEvent::Polled {
                            job_id: job.id(),
                            tick,
                            tick_budget,
                            elapsed_ms: millis(job.elapsed(self.clock.now())),
                        });
                    }
                },
                Err(err) => return Err(self.errored(job, err)),
            }

            let elapsed = job.elapsed(self.clock.now());
            let Some(delay) = detector.next_delay(elapsed) else {
                return Err(self.timed_out(&detector, elapsed));
            };

            debug!(tick, ?delay, "sleeping before next poll");
            tokio::select! {
                () = self.clock.sleep(delay) => {}
                () = cancel.cancelled() => return Err(self.abandon(&mut detector)),
            }
        }
    }

    /// Submit, then wait with the coordinator's default policy.
    pub async fn convert(
        &self,
        bytes: &[u8],
        file_name: &str,
        cancel: &CancelSignal,
    ) -> Result<Completion, JobError> {
        let job = self.submit(bytes, file_name).await?;
        self.await_result(&job, &self.policy, cancel).await
    }

    /// `Ok(None)` means the fetch failed within budget and the wait goes on.
    async fn fetch_selected(
        &self,
        detector: &mut CompletionDetector,
        selection: Selection,
        cancel: &CancelSignal,
    ) -> Result<Option<Completion>, JobError> {
        let job = detector.job().clone();
        let tick = detector.ticks();

        let fetched = match self
            .bounded(detector, cancel, self.fetch(&selection.output_key))
            .await
        {
            Ok(fetched) => fetched,
            Err(interrupt) => return Err(self.interrupted(detector, interrupt)),
        };

        match fetched {
            Ok(bytes) => {
                detector.mark_found();
                if selection.is_ambiguous() {
                    self.events.emit(&WaitEvent::Ambiguous {
                        job_id: job.id(),
                        selected: selection.output_key.clone(),
                        others: selection.others.clone(),
                    });
                }
                self.events.emit(&WaitEvent::Found {
                    job_id: job.id(),
                    tick,
                    output_key: selection.output_key.clone(),
                    size: bytes.len(),
                });
                Ok(Some(Completion {
                    job,
                    output_key: selection.output_key,
                    bytes,
                    ticks: tick,
                    also_matched: selection.others,
                }))
            }
            Err(err) => {
                let message = err.to_string();
                match detector.record_failure(err) {
                    Ok(()) => {
                        warn!(tick, output_key = %selection.output_key, %message, "fetch failed; still waiting");
                        self.events.emit(&WaitEvent::TransientFailure {
                            job_id: job.id(),
                            tick,
                            consecutive: detector.consecutive_failures(),
                            message,
                        });
                        Ok(None)
                    }
                    Err(err) => Err(self.errored(&job, err)),
                }
            }
        }
    }

    /// `get`, retrying once if the key vanished between list and get.
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, GatewayError> {
        match self.gateway.get(key).await {
            Err(err) if err.is_not_found() => {
                debug!(key, "listed object not readable yet; retrying once");
                self.gateway.get(key).await
            }
            other => other,
        }
    }

    /// Run one storage call, giving up if the wait is cancelled or the call
    /// outlives the budget.
    ///
    /// The call gets at least one `interval`, so a poll made right at
    /// `max_wait` can still finish.
    async fn bounded<T>(
        &self,
        detector: &CompletionDetector,
        cancel: &CancelSignal,
        call: impl Future<Output = T>,
    ) -> Result<T, Interrupt> {
        let policy = detector.policy();
        let elapsed = detector.job().elapsed(self.clock.now());
        let allowance = policy.max_wait.saturating_sub(elapsed).max(policy.interval);

        tokio::select! {
            biased;
            out = call => Ok(out),
            () = cancel.cancelled() => Err(Interrupt::Cancelled),
            () = self.clock.sleep(allowance) => Err(Interrupt::DeadlineReached),
        }
    }

    fn interrupted(&self, detector: &mut CompletionDetector, interrupt: Interrupt) -> JobError {
        match interrupt {
            Interrupt::Cancelled => self.abandon(detector),
            Interrupt::DeadlineReached => {
                warn!(tick = detector.ticks(), "storage call outlived the wait budget");
                detector.expire();
                let elapsed = detector.job().elapsed(self.clock.now());
                self.timed_out(detector, elapsed)
            }
        }
    }

    fn timed_out(&self, detector: &CompletionDetector, elapsed: Duration) -> JobError {
        let ticks = detector.ticks();
        self.events.emit(&WaitEvent::TimedOut {
            job_id: detector.job().id(),
            ticks,
            elapsed_ms: millis(elapsed),
        });
        JobError::Timeout {
            waited: elapsed,
            ticks,
        }
    }

    fn errored(&self, job: &Job, err: JobError) -> JobError {
        self.events.emit(&WaitEvent::Errored {
            job_id: job.id(),
            message: err.to_string(),
        });
        err
    }

    fn abandon(&self, detector: &mut CompletionDetector) -> JobError {
        detector.cancel();
        let ticks = detector.ticks();
        self.events.emit(&WaitEvent::Cancelled {
            job_id: detector.job().id(),
            ticks,
        });
        JobError::Cancelled { ticks }
    }
}

/// Why an in-flight storage call was abandoned.
enum Interrupt {
    Cancelled,
    DeadlineReached,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
