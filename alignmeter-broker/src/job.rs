// Copyright 2025 Alignmeter (https://github.com/alignmeter)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Job specifications, retry options, and the handler contract.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::flow::{ChildResult, DependencyCounts};

/// Deterministic job identifier. Equal work must produce equal ids so that
/// re-submission collapses instead of duplicating.
pub type JobId = String;

/// Backoff schedule between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed { delay_ms: u64 },
    /// Delay doubles after each failed attempt, starting at `initial_ms`.
    Exponential { initial_ms: u64 },
}

impl Backoff {
    /// Delay to wait after `attempt` (1-based) has failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            Backoff::Exponential { initial_ms } => {
                let shift = attempt.saturating_sub(1).min(16);
                Duration::from_millis(initial_ms.saturating_mul(1 << shift))
            }
        }
    }
}

/// Retry policy and parent-linkage behavior for one job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Total attempts, including the first.
    pub attempts: u32,

    pub backoff: Backoff,

    /// When true, this child's terminal failure is counted as a failure datum
    /// instead of aborting the parent.
    #[serde(default)]
    pub continue_parent_on_failure: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: Backoff::Fixed { delay_ms: 0 },
            continue_parent_on_failure: false,
        }
    }
}

/// One job to run: kind routes to a registered handler, `data` is the
/// serialized payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: JobId,
    pub kind: String,
    pub queue: String,
    pub data: serde_json::Value,
    pub options: JobOptions,
}

/// Lifecycle of a job inside the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Active,
    Completed,
    Failed,
    /// Deduplicated against a job id already owned by another live flow; the
    /// owning flow will run it, this one only counts it.
    Ignored,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Ignored
        )
    }
}

/// Execution context handed to a handler for one attempt.
///
/// Parent jobs additionally see their settled children through
/// [`JobContext::dependency_counts`] and [`JobContext::children_results`].
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub data: serde_json::Value,

    /// 1-based number of the attempt currently executing.
    pub attempts_made: u32,
    pub max_attempts: u32,

    pub(crate) counts: DependencyCounts,
    pub(crate) results: Vec<ChildResult>,
}

impl JobContext {
    /// Context for a dependency-less job attempt. The broker builds these
    /// internally; embedders and handler tests can drive handlers directly.
    pub fn new(job_id: JobId, data: serde_json::Value, attempts_made: u32, max_attempts: u32) -> Self {
        Self {
            job_id,
            data,
            attempts_made,
            max_attempts,
            counts: DependencyCounts::default(),
            results: Vec::new(),
        }
    }

    /// Attach settled-children state, turning this into a parent context.
    pub fn with_children(mut self, counts: DependencyCounts, results: Vec<ChildResult>) -> Self {
        self.counts = counts;
        self.results = results;
        self
    }

    pub fn is_final_attempt(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }

    /// Settled-children counts. All zero for jobs without dependencies.
    pub fn dependency_counts(&self) -> DependencyCounts {
        self.counts
    }

    /// Terminal children with their statuses and returned values.
    pub fn children_results(&self) -> &[ChildResult] {
        &self.results
    }

    /// Deserialize the job payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

/// Handler for one job kind. Registered on the broker and invoked once per
/// attempt; the returned value becomes the job's result, an error triggers
/// the retry policy.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn kind(&self) -> &str;

    async fn execute(&self, ctx: JobContext) -> anyhow::Result<serde_json::Value>;
}
