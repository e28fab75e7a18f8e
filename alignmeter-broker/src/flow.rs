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

//! Flow submission types: a parent job plus its dependent children.

use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobSpec, JobStatus};

/// A parent job and the children it joins on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSpec {
    pub parent: JobSpec,
    pub children: Vec<JobSpec>,
}

/// Accepted flow. The parent job id doubles as the flow id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowHandle {
    pub parent_job_id: JobId,
    pub child_job_ids: Vec<JobId>,
}

/// Where a flow currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    /// Children still running or parent not yet finished.
    Running,
    Completed,
    Failed,
}

/// Settled-children counts as seen by the parent handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyCounts {
    /// Children that completed successfully.
    pub processed: usize,
    /// Children that exhausted their attempts.
    pub failed: usize,
    /// Children deduplicated against another live flow.
    pub ignored: usize,
    /// Children not yet terminal. Zero under the all-settled completion
    /// policy; surfaced for brokers that invoke parents early.
    pub unprocessed: usize,
}

impl DependencyCounts {
    pub fn total(&self) -> usize {
        self.processed + self.failed + self.ignored + self.unprocessed
    }

    /// Children the parent cannot trust a verdict from.
    pub fn unreliable(&self) -> usize {
        self.failed + self.ignored + self.unprocessed
    }
}

/// Terminal child as exposed to the parent handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildResult {
    pub job_id: JobId,
    pub status: JobStatus,

    /// Handler return value; present only for completed children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}
