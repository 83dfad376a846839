//! CompletionDetector - 完了検出の純粋な状態機械
//!
//! I/O を一切持たず、呼び出し側が 1 ティックごとに
//! `begin_tick` → `observe`（→ 取得失敗なら `record_failure`）→ `next_delay`
//! を呼んで進めます。`JobCoordinator::await_result` はその一例に過ぎません。
//!
//! # タイブレーク
//! 候補が複数あるときは:
//! 1. 全候補に listing の `last_modified` があれば最新のもの（同時刻ならキーの小さい方）
//! 2. そうでなければキーが辞書順で最小のもの
//!
//! 同じストア状態に対しては常に同じキーを選びます。

use std::time::Duration;

use crate::app::policy::PollPolicy;
use crate::domain::{Job, JobError, WaitState};
use crate::ports::{GatewayError, ObjectInfo};

/// Output chosen for a job on one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub output_key: String,
    pub size: u64,

    /// Candidates that lost the tie-break, in preference order.
    pub others: Vec<String>,
}

impl Selection {
    pub fn is_ambiguous(&self) -> bool {
        !self.others.is_empty()
    }
}

/// Deterministic tie-break over the candidates of one listing pass.
pub fn select_candidate(mut candidates: Vec<ObjectInfo>) -> Option<Selection> {
    if candidates.is_empty() {
        return None;
    }

    let all_timestamped = candidates.iter().all(|c| c.last_modified.is_some());
    if all_timestamped {
        candidates.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then_with(|| a.key.cmp(&b.key))
        });
    } else {
        candidates.sort_by(|a, b| a.key.cmp(&b.key));
    }

    let mut iter = candidates.into_iter();
    let selected = iter.next()?;
    Some(Selection {
        output_key: selected.key,
        size: selected.size,
        others: iter.map(|c| c.key).collect(),
    })
}

#[derive(Debug, Clone)]
pub struct CompletionDetector {
    job: Job,
    policy: PollPolicy,
    state: WaitState,
    ticks: u32,
    consecutive_failures: u32,
}

impl CompletionDetector {
    pub fn new(job: Job, policy: PollPolicy) -> Self {
        Self {
            job,
            policy,
            state: WaitState::Waiting,
            ticks: 0,
            consecutive_failures: 0,
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn state(&self) -> WaitState {
        self.state
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Start a new listing pass; returns its 1-based number.
    pub fn begin_tick(&mut self) -> u32 {
        if !self.state.is_terminal() {
            self.ticks += 1;
        }
        self.ticks
    }

    /// Feed the result of one `list` call.
    ///
    /// - `Ok(Some(_))`: a candidate was selected; fetch it, then `mark_found`
    /// - `Ok(None)`: keep waiting (no candidate, or a failure within budget)
    /// - `Err(_)`: the wait is over (ERRORED)
    pub fn observe(
        &mut self,
        listing: Result<Vec<ObjectInfo>, GatewayError>,
    ) -> Result<Option<Selection>, JobError> {
        if self.state.is_terminal() {
            return Ok(None);
        }
        match listing {
            Ok(objects) => {
                let candidates: Vec<ObjectInfo> = objects
                    .into_iter()
                    .filter(|o| self.job.is_candidate(&o.key))
                    .collect();
                let selection = select_candidate(candidates);
                // 候補ありのティックは get が済むまで成功とは数えない
                if selection.is_none() {
                    self.consecutive_failures = 0;
                }
                Ok(selection)
            }
            Err(err) => self.record_failure(err).map(|()| None),
        }
    }

    /// Count a failed `list` or `get` against the failure budget.
    ///
    /// Transient and not-found failures are absorbed while the consecutive
    /// count stays within `max_consecutive_failures`. Only a tick that ends
    /// without any failure resets the count, so a listed output whose `get`
    /// keeps failing exhausts the budget too. Anything else ends the
    /// wait immediately.
    pub fn record_failure(&mut self, err: GatewayError) -> Result<(), JobError> {
        if self.state.is_terminal() {
            return Ok(());
        }
        self.consecutive_failures += 1;
        let absorbable = err.is_transient() || err.is_not_found();
        if absorbable && self.consecutive_failures <= self.policy.max_consecutive_failures {
            return Ok(());
        }
        self.state = WaitState::Errored;
        Err(JobError::Storage {
            failures: self.consecutive_failures,
            source: err,
        })
    }

    pub fn mark_found(&mut self) {
        if self.state == WaitState::Waiting {
            self.state = WaitState::Found;
        }
    }

    pub fn cancel(&mut self) {
        if self.state == WaitState::Waiting {
            self.state = WaitState::Cancelled;
        }
    }

    /// How long to sleep before the next tick, or `None` once the budget is spent.
    ///
    /// See [`PollPolicy::next_sleep`] for the rule.
    pub fn next_delay(&mut self, elapsed: Duration) -> Option<Duration> {
        if self.state.is_terminal() {
            return None;
        }
        let delay = self.policy.next_sleep(self.ticks, elapsed);
        if delay.is_none() {
            self.state = WaitState::TimedOut;
        }
        delay
    }

    /// The deadline passed while a storage call was still in flight.
    pub fn expire(&mut self) {
        if self.state == WaitState::Waiting {
            self.state = WaitState::TimedOut;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobId, NamingConvention};
    use crate::ports::StorageOp;
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    fn detector(file_name: &str, policy: PollPolicy) -> CompletionDetector {
        let job = Job::new(
            JobId::from_ulid(Ulid::new()),
            file_name,
            NamingConvention::Legacy,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        CompletionDetector::new(job, policy)
    }

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn single_candidate_is_selected() {
        let mut d = detector("report.csv", PollPolicy::default());
        d.begin_tick();
        let listing = vec![
            ObjectInfo::new("input1/report.csv", 10),
            ObjectInfo::new("input1/report_converted.json", 7),
            ObjectInfo::new("input1/other.json", 3),
        ];
        let sel = d.observe(Ok(listing)).unwrap().expect("selected");
        assert_eq!(sel.output_key, "input1/report_converted.json");
        assert_eq!(sel.size, 7);
        assert!(!sel.is_ambiguous());
    }

    #[test]
    fn only_the_input_means_waiting() {
        let mut d = detector("report.csv", PollPolicy::default());
        d.begin_tick();
        let sel = d
            .observe(Ok(vec![ObjectInfo::new("input1/report.csv", 10)]))
            .unwrap();
        assert_eq!(sel, None);
        assert_eq!(d.state(), WaitState::Waiting);
    }

    #[test]
    fn newest_candidate_wins_when_timestamps_exist() {
        let candidates = vec![
            ObjectInfo::new("input1/a.json", 1).modified_at(at(5)),
            ObjectInfo::new("input1/b.json", 1).modified_at(at(9)),
            ObjectInfo::new("input1/c.json", 1).modified_at(at(9)),
        ];
        let sel = select_candidate(candidates).unwrap();
        assert_eq!(sel.output_key, "input1/b.json");
        assert_eq!(sel.others, vec!["input1/c.json", "input1/a.json"]);
    }

    #[test]
    fn smallest_key_wins_without_full_timestamps() {
        let candidates = vec![
            ObjectInfo::new("input1/z.json", 1).modified_at(at(9)),
            ObjectInfo::new("input1/m.json", 1),
            ObjectInfo::new("input1/a.json", 1),
        ];
        let sel = select_candidate(candidates).unwrap();
        assert_eq!(sel.output_key, "input1/a.json");
    }

    #[test]
    fn tie_break_ignores_listing_order() {
        let mut listing = vec![
            ObjectInfo::new("input1/report.v2.json", 1),
            ObjectInfo::new("input1/report.v1.json", 1),
            ObjectInfo::new("input1/report_x.json", 1),
        ];
        let first = select_candidate(listing.clone()).unwrap();
        listing.reverse();
        let second = select_candidate(listing).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn transient_failures_are_absorbed_within_budget() {
        let mut d = detector("a.txt", PollPolicy::default().with_failure_budget(2));
        let err = || GatewayError::transient(StorageOp::List, "throttled");

        d.begin_tick();
        assert_eq!(d.observe(Err(err())).unwrap(), None);
        d.begin_tick();
        assert_eq!(d.observe(Err(err())).unwrap(), None);
        d.begin_tick();
        let res = d.observe(Err(err()));
        assert!(matches!(res, Err(JobError::Storage { failures: 3, .. })));
        assert_eq!(d.state(), WaitState::Errored);
    }

    #[test]
    fn successful_listing_resets_failure_count() {
        let mut d = detector("a.txt", PollPolicy::default().with_failure_budget(1));
        let err = || GatewayError::transient(StorageOp::List, "throttled");

        d.observe(Err(err())).unwrap();
        d.observe(Ok(vec![])).unwrap();
        assert_eq!(d.consecutive_failures(), 0);
        d.observe(Err(err())).unwrap();
        assert_eq!(d.state(), WaitState::Waiting);
    }

    #[test]
    fn failed_fetches_accumulate_across_successful_listings() {
        let mut d = detector("report.csv", PollPolicy::default().with_failure_budget(2));
        let listing = || Ok(vec![ObjectInfo::new("input1/report_converted.json", 2)]);
        let err = || GatewayError::transient(StorageOp::Get, "connection reset");

        for _ in 0..2 {
            d.begin_tick();
            assert!(d.observe(listing()).unwrap().is_some());
            d.record_failure(err()).unwrap();
        }
        d.begin_tick();
        assert!(d.observe(listing()).unwrap().is_some());
        assert_eq!(d.consecutive_failures(), 2);
        let res = d.record_failure(err());

        assert!(matches!(res, Err(JobError::Storage { failures: 3, .. })));
        assert_eq!(d.state(), WaitState::Errored);
    }

    #[test]
    fn expire_only_applies_while_waiting() {
        let mut d = detector("a.txt", PollPolicy::default());
        d.begin_tick();
        d.expire();
        assert_eq!(d.state(), WaitState::TimedOut);

        let mut found = detector("a.txt", PollPolicy::default());
        found.mark_found();
        found.expire();
        assert_eq!(found.state(), WaitState::Found);
    }

    #[test]
    fn denied_is_fatal_immediately() {
        let mut d = detector("a.txt", PollPolicy::default());
        let res = d.observe(Err(GatewayError::denied(StorageOp::List, "403")));
        assert!(matches!(res, Err(JobError::Storage { failures: 1, .. })));
        assert_eq!(d.state(), WaitState::Errored);
    }

    #[test]
    fn next_delay_times_out_at_budget() {
        let policy = PollPolicy::fixed(Duration::from_secs(2), Duration::from_secs(4)).unwrap();
        let mut d = detector("a.txt", policy);

        d.begin_tick();
        assert_eq!(d.next_delay(Duration::ZERO), Some(Duration::from_secs(2)));
        d.begin_tick();
        assert_eq!(d.next_delay(Duration::from_secs(2)), None);
        assert_eq!(d.state(), WaitState::TimedOut);
        assert_eq!(d.ticks(), 2);
    }

    #[test]
    fn terminal_states_do_not_transition() {
        let mut d = detector("a.txt", PollPolicy::default());
        d.begin_tick();
        d.mark_found();
        d.cancel();
        assert_eq!(d.state(), WaitState::Found);
        assert_eq!(d.next_delay(Duration::ZERO), None);
        assert_eq!(d.begin_tick(), 1);
        assert!(d.record_failure(GatewayError::denied(StorageOp::Get, "x")).is_ok());
        assert_eq!(d.state(), WaitState::Found);
    }
}
