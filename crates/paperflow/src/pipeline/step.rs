//! Pipeline steps, their retry policy and the persisted per-step job record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStep {
    Hash,
    Thumbnail,
    ParseContent,
    DetectLanguage,
    Rules,
    FtsIndex,
}

/// What happens to a step's job record once the step has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Failure puts the record back to pending and stops the document.
    Mandatory,
    /// The record is cleared whatever the outcome.
    BestEffort,
}

#[derive(Debug, Clone, Copy)]
pub struct StepDefinition {
    pub step: ProcessStep,
    pub name: &'static str,
    pub retry_policy: RetryPolicy,
}

/// Steps in execution order.
pub const PIPELINE_STEPS: [StepDefinition; 6] = [
    StepDefinition {
        step: ProcessStep::Hash,
        name: "hash",
        retry_policy: RetryPolicy::Mandatory,
    },
    StepDefinition {
        step: ProcessStep::Thumbnail,
        name: "thumbnail",
        retry_policy: RetryPolicy::BestEffort,
    },
    StepDefinition {
        step: ProcessStep::ParseContent,
        name: "parse_content",
        retry_policy: RetryPolicy::Mandatory,
    },
    StepDefinition {
        step: ProcessStep::DetectLanguage,
        name: "detect_language",
        retry_policy: RetryPolicy::BestEffort,
    },
    StepDefinition {
        step: ProcessStep::Rules,
        name: "rules",
        retry_policy: RetryPolicy::BestEffort,
    },
    StepDefinition {
        step: ProcessStep::FtsIndex,
        name: "fts_index",
        retry_policy: RetryPolicy::BestEffort,
    },
];

impl ProcessStep {
    pub fn definition(&self) -> &'static StepDefinition {
        &PIPELINE_STEPS[self.position()]
    }

    /// Index of the step in [`PIPELINE_STEPS`].
    pub fn position(&self) -> usize {
        match self {
            ProcessStep::Hash => 0,
            ProcessStep::Thumbnail => 1,
            ProcessStep::ParseContent => 2,
            ProcessStep::DetectLanguage => 3,
            ProcessStep::Rules => 4,
            ProcessStep::FtsIndex => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.definition().name
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.definition().retry_policy
    }

    /// Every step in pipeline order.
    pub fn all() -> impl Iterator<Item = ProcessStep> {
        PIPELINE_STEPS.iter().map(|d| d.step)
    }

    /// This step and every step after it.
    pub fn from_step(self) -> impl Iterator<Item = ProcessStep> {
        PIPELINE_STEPS[self.position()..].iter().map(|d| d.step)
    }
}

impl fmt::Display for ProcessStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PIPELINE_STEPS
            .iter()
            .find(|d| d.name == s)
            .map(|d| d.step)
            .ok_or_else(|| format!("unknown process step '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "finished" => Ok(JobStatus::Finished),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Persisted status of one step for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessItem {
    pub document_id: String,
    pub step: ProcessStep,
    pub status: JobStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl ProcessItem {
    pub fn pending(document_id: &str, step: ProcessStep) -> Self {
        Self {
            document_id: document_id.to_string(),
            step,
            status: JobStatus::Pending,
            message: None,
            created_at: Utc::now(),
            started_at: None,
            stopped_at: None,
        }
    }
}
