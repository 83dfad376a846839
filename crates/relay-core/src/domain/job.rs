//! Job - 1 回の投入を表す不変のハンドル
//!
//! ストア上のオブジェクトが永続的な記録で、Job はメモリ上のハンドルに過ぎません。
//! AwaitResult が終われば捨ててよいものです。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::JobError;
use super::ids::JobId;
use super::naming::{
    self, INPUT_PREFIX, NamingConvention, matches_reserved_output, reserved_output_prefix,
};

/// One submission. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    file_name: String,
    base_name: String,
    input_key: String,
    submitted_at: DateTime<Utc>,
    convention: NamingConvention,
}

impl Job {
    pub fn new(
        id: JobId,
        file_name: &str,
        convention: NamingConvention,
        submitted_at: DateTime<Utc>,
    ) -> Result<Self, JobError> {
        validate_file_name(file_name)?;
        Ok(Self {
            id,
            file_name: file_name.to_string(),
            base_name: naming::base_name(file_name).to_string(),
            input_key: convention.input_key(file_name, &id),
            submitted_at,
            convention,
        })
    }

    /// Rebuild a handle for an input that is already in the store.
    ///
    /// Under the reserved convention the id comes from the key's nonce and
    /// `fallback_id` is ignored. `submitted_at` restarts at `now`, so the
    /// resumed wait gets a full budget.
    pub fn resume(
        input_key: &str,
        convention: NamingConvention,
        fallback_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<Self, JobError> {
        match convention {
            NamingConvention::Legacy => {
                let file_name = input_key.strip_prefix(INPUT_PREFIX).ok_or_else(|| {
                    JobError::InvalidFileName {
                        name: input_key.to_string(),
                        reason: "input key must start with input1/",
                    }
                })?;
                Self::new(fallback_id, file_name, convention, now)
            }
            NamingConvention::Reserved => {
                let parsed = naming::parse_reserved_input(input_key).ok_or_else(|| {
                    JobError::InvalidFileName {
                        name: input_key.to_string(),
                        reason: "not a reserved input key (input1/<base>.<nonce>[.<ext>])",
                    }
                })?;
                Self::new(parsed.id, &parsed.file_name, convention, now)
            }
        }
    }

    /// Same job, stamped with the moment its input became durable.
    pub(crate) fn stamped(mut self, submitted_at: DateTime<Utc>) -> Self {
        self.submitted_at = submitted_at;
        self
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn input_key(&self) -> &str {
        &self.input_key
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn convention(&self) -> NamingConvention {
        self.convention
    }

    /// Time since submission; zero if `now` is earlier than `submitted_at`.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.submitted_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Key prefix the worker must write to under the reserved convention.
    pub fn reserved_output_prefix(&self) -> Option<String> {
        match self.convention {
            NamingConvention::Legacy => None,
            NamingConvention::Reserved => {
                Some(reserved_output_prefix(&self.base_name, &self.id.nonce()))
            }
        }
    }

    /// Whether `key` from a listing pass may be this job's output.
    pub fn is_candidate(&self, key: &str) -> bool {
        if key == self.input_key {
            return false;
        }
        match self.convention {
            NamingConvention::Legacy => key.contains(&self.base_name),
            NamingConvention::Reserved => {
                let prefix = reserved_output_prefix(&self.base_name, &self.id.nonce());
                matches_reserved_output(key, &prefix)
            }
        }
    }
}

fn validate_file_name(file_name: &str) -> Result<(), JobError> {
    let reason = if file_name.is_empty() {
        "file name is empty"
    } else if file_name.contains('/') {
        "file name must not contain '/'"
    } else if naming::base_name(file_name).is_empty() {
        "file name has an empty base name"
    } else {
        return Ok(());
    };
    Err(JobError::InvalidFileName {
        name: file_name.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn legacy(file_name: &str) -> Job {
        Job::new(
            JobId::from_ulid(Ulid::new()),
            file_name,
            NamingConvention::Legacy,
            t0(),
        )
        .unwrap()
    }

    #[test]
    fn new_job_derives_base_name_and_input_key() {
        let job = legacy("report.csv");
        assert_eq!(job.base_name(), "report");
        assert_eq!(job.input_key(), "input1/report.csv");
        assert_eq!(job.submitted_at(), t0());
    }

    #[rstest]
    #[case::empty("")]
    #[case::slash("dir/report.csv")]
    fn invalid_file_names_are_rejected(#[case] name: &str) {
        let err = Job::new(
            JobId::from_ulid(Ulid::new()),
            name,
            NamingConvention::Legacy,
            t0(),
        )
        .unwrap_err();
        assert!(matches!(err, JobError::InvalidFileName { .. }));
    }

    #[rstest]
    #[case::converted("input1/report_converted.json", true)]
    #[case::same_stem("input1/report.json", true)]
    #[case::input_itself("input1/report.csv", false)]
    #[case::unrelated("input1/summary.json", false)]
    #[case::superstring("input1/old_report_v2.json", true)]
    fn legacy_matching_is_substring_containment(#[case] key: &str, #[case] expected: bool) {
        assert_eq!(legacy("report.csv").is_candidate(key), expected);
    }

    #[test]
    fn reserved_matching_requires_nonce_and_marker() {
        let id = JobId::from_ulid(Ulid::new());
        let job = Job::new(id, "report.csv", NamingConvention::Reserved, t0()).unwrap();
        let nonce = id.nonce();

        assert!(job.is_candidate(&format!("input1/report.{nonce}.out.json")));
        assert!(!job.is_candidate(job.input_key()));
        assert!(!job.is_candidate("input1/report_converted.json"));
        assert!(!job.is_candidate("input1/report.01aaaaaaaaaaaaaaaaaaaaaaaa.out.json"));
    }

    #[test]
    fn elapsed_is_clamped_at_zero() {
        let job = legacy("a.txt");
        assert_eq!(job.elapsed(t0() - chrono::Duration::seconds(5)), Duration::ZERO);
        assert_eq!(
            job.elapsed(t0() + chrono::Duration::seconds(3)),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn resume_legacy_strips_prefix() {
        let later = t0() + chrono::Duration::minutes(5);
        let job = Job::resume(
            "input1/report.csv",
            NamingConvention::Legacy,
            JobId::from_ulid(Ulid::new()),
            later,
        )
        .unwrap();
        assert_eq!(job.file_name(), "report.csv");
        assert_eq!(job.submitted_at(), later);
    }

    #[test]
    fn resume_reserved_recovers_the_original_id() {
        let id = JobId::from_ulid(Ulid::new());
        let original = Job::new(id, "report.csv", NamingConvention::Reserved, t0()).unwrap();

        let resumed = Job::resume(
            original.input_key(),
            NamingConvention::Reserved,
            JobId::from_ulid(Ulid::new()),
            t0(),
        )
        .unwrap();
        assert_eq!(resumed, original);
    }

    #[test]
    fn resume_rejects_keys_outside_namespace() {
        let err = Job::resume(
            "other/report.csv",
            NamingConvention::Legacy,
            JobId::from_ulid(Ulid::new()),
            t0(),
        )
        .unwrap_err();
        assert!(matches!(err, JobError::InvalidFileName { .. }));
    }
}
