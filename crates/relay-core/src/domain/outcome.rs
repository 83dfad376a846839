//! Completion - AwaitResult が成功したときの結果

use serde::Serialize;

use super::ids::JobId;
use super::job::Job;
use super::mime::mime_for_key;
use super::naming::file_name_of;

/// The fetched output of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub job: Job,
    pub output_key: String,
    pub bytes: Vec<u8>,

    /// Number of listing passes it took.
    pub ticks: u32,

    /// Other candidates that lost the tie-break (empty in the normal case).
    pub also_matched: Vec<String>,
}

impl Completion {
    /// Download name: the last segment of the output key.
    pub fn file_name(&self) -> &str {
        file_name_of(&self.output_key)
    }

    pub fn mime_type(&self) -> &'static str {
        mime_for_key(&self.output_key)
    }

    pub fn is_ambiguous(&self) -> bool {
        !self.also_matched.is_empty()
    }

    pub fn summary(&self) -> CompletionSummary {
        CompletionSummary {
            job_id: self.job.id(),
            input_key: self.job.input_key().to_string(),
            output_key: self.output_key.clone(),
            file_name: self.file_name().to_string(),
            mime_type: self.mime_type(),
            size: self.bytes.len(),
            ticks: self.ticks,
            also_matched: self.also_matched.clone(),
        }
    }
}

/// Serializable view of a [`Completion`] without the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionSummary {
    pub job_id: JobId,
    pub input_key: String,
    pub output_key: String,
    pub file_name: String,
    pub mime_type: &'static str,
    pub size: usize,
    pub ticks: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub also_matched: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobId, NamingConvention};
    use chrono::Utc;
    use ulid::Ulid;

    #[test]
    fn summary_reports_download_details() {
        let job = Job::new(
            JobId::from_ulid(Ulid::new()),
            "report.csv",
            NamingConvention::Legacy,
            Utc::now(),
        )
        .unwrap();
        let completion = Completion {
            job,
            output_key: "input1/report_converted.json".to_string(),
            bytes: b"{}".to_vec(),
            ticks: 3,
            also_matched: vec![],
        };

        let summary = completion.summary();
        assert_eq!(summary.file_name, "report_converted.json");
        assert_eq!(summary.mime_type, "application/json");
        assert_eq!(summary.size, 2);

        let v = serde_json::to_value(&summary).unwrap();
        assert!(v.get("also_matched").is_none());
    }
}
