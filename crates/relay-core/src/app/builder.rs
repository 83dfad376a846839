//! CoordinatorBuilder - JobCoordinator の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 省略したポートには本番向けの既定実装を差し込む

use std::sync::Arc;

use crate::app::coordinator::JobCoordinator;
use crate::app::policy::{PolicyError, PollPolicy};
use crate::domain::NamingConvention;
use crate::impls::TracingEventSink;
use crate::ports::{Clock, EventSink, IdGenerator, StorageGateway, SystemClock, UlidGenerator};

/// CoordinatorBuilder は JobCoordinator を構築
///
/// # 使用例
/// ```ignore
/// let coordinator = JobCoordinator::builder(gateway)
///     .convention(NamingConvention::Reserved)
///     .policy(PollPolicy::fixed(Duration::from_secs(2), Duration::from_secs(60))?)
///     .build()?;
/// ```
///
/// # 既定値
/// - clock: `SystemClock`
/// - ids: 同じ clock を使う `UlidGenerator`
/// - events: `TracingEventSink`
/// - convention: `NamingConvention::Legacy`
/// - policy: `PollPolicy::default()`（2 秒間隔・最大 120 秒）
pub struct CoordinatorBuilder {
    gateway: Arc<dyn StorageGateway>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    events: Option<Arc<dyn EventSink>>,
    convention: NamingConvention,
    policy: PollPolicy,
}

/// BuildError は構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid default poll policy: {0}")]
    InvalidPolicy(#[from] PolicyError),
}

impl CoordinatorBuilder {
    pub fn new(gateway: Arc<dyn StorageGateway>) -> Self {
        Self {
            gateway,
            clock: None,
            ids: None,
            events: None,
            convention: NamingConvention::default(),
            policy: PollPolicy::default(),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn convention(mut self, convention: NamingConvention) -> Self {
        self.convention = convention;
        self
    }

    /// 既定の PollPolicy（`convert` で使用）
    pub fn policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// JobCoordinator を構築
    ///
    /// # 検証
    /// - 既定 policy が不正なら BuildError::InvalidPolicy を返す
    pub fn build(self) -> Result<JobCoordinator, BuildError> {
        self.policy.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));
        let events = self.events.unwrap_or_else(|| Arc::new(TracingEventSink));

        Ok(JobCoordinator {
            gateway: self.gateway,
            clock,
            ids,
            events,
            convention: self.convention,
            policy: self.policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryGateway;
    use std::time::Duration;

    fn gateway() -> Arc<dyn StorageGateway> {
        Arc::new(InMemoryGateway::new())
    }

    #[test]
    fn test_build_with_defaults() {
        let coordinator = CoordinatorBuilder::new(gateway()).build().unwrap();
        assert_eq!(coordinator.convention(), NamingConvention::Legacy);
        assert_eq!(coordinator.policy(), &PollPolicy::default());
    }

    #[test]
    fn test_build_with_overrides() {
        let policy = PollPolicy::fixed(Duration::from_secs(1), Duration::from_secs(5)).unwrap();
        let coordinator = JobCoordinator::builder(gateway())
            .convention(NamingConvention::Reserved)
            .policy(policy.clone())
            .build()
            .unwrap();
        assert_eq!(coordinator.convention(), NamingConvention::Reserved);
        assert_eq!(coordinator.policy(), &policy);
    }

    #[test]
    fn test_build_rejects_invalid_policy() {
        let policy = PollPolicy {
            interval: Duration::ZERO,
            ..PollPolicy::default()
        };
        let built = CoordinatorBuilder::new(gateway()).policy(policy).build();
        assert!(matches!(
            built,
            Err(BuildError::InvalidPolicy(PolicyError::ZeroInterval))
        ));
    }
}
