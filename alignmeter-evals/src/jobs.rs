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

//! Job kinds, deterministic identifiers, and payload contracts.
//!
//! Job ids are pure functions of their content so that re-submitting an
//! equivalent flow collapses onto the in-flight one instead of duplicating
//! it. That, not a mutex, is what keeps recalculation single-flight per
//! evaluation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use alignmeter_broker::JobId;
use alignmeter_core::{ExpectedSide, SpanId, SpanTraceRef, Verdict, WorkspaceId};

/// Parent job kind: aggregate child verdicts into the alignment metadata.
pub const RECALCULATE_ALIGNMENT_JOB: &str = "recalculate_alignment_metric";

/// Child job kind: dry-run the evaluator against one example.
pub const RUN_EVALUATION_DRY_JOB: &str = "run_evaluation_dry";

/// Queue both job kinds are scheduled on.
pub const EVALUATIONS_QUEUE: &str = "evaluations";

/// Deterministic parent job id for an evaluation's recalculation flow.
pub fn parent_job_id(evaluation_uuid: &Uuid) -> JobId {
    format!("alignment-recalc:{evaluation_uuid}")
}

/// Deterministic child job id for one example of an evaluation's flow.
pub fn child_job_id(evaluation_uuid: &Uuid, span_id: SpanId) -> JobId {
    format!("alignment-example:{evaluation_uuid}:{span_id:032x}")
}

/// Full rebuild or bounded merge, decided by the configuration fingerprint.
/// Both variants carry the balanced example lists the flow was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RecalculationPlan {
    /// Configuration changed: every prior verdict is void, recompute the
    /// matrix over the full balanced lists.
    Full {
        should_fail: Vec<SpanTraceRef>,
        should_pass: Vec<SpanTraceRef>,
    },
    /// Configuration unchanged: only newly arrived examples are judged and
    /// merged additively into the existing matrix.
    Incremental {
        should_fail: Vec<SpanTraceRef>,
        should_pass: Vec<SpanTraceRef>,
    },
}

impl RecalculationPlan {
    pub fn is_full(&self) -> bool {
        matches!(self, RecalculationPlan::Full { .. })
    }

    pub fn examples(&self) -> (&[SpanTraceRef], &[SpanTraceRef]) {
        match self {
            RecalculationPlan::Full {
                should_fail,
                should_pass,
            }
            | RecalculationPlan::Incremental {
                should_fail,
                should_pass,
            } => (should_fail, should_pass),
        }
    }

    /// Number of child jobs this plan fans out into.
    pub fn example_count(&self) -> usize {
        let (fail, pass) = self.examples();
        fail.len() + pass.len()
    }
}

/// Payload of the parent aggregation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentJobData {
    pub workspace_id: WorkspaceId,
    pub commit_uuid: Uuid,
    pub evaluation_uuid: Uuid,
    pub document_uuid: Uuid,

    /// Fingerprint of the config this flow was built under; becomes the
    /// stored `alignment_hash` on success.
    pub current_hash: String,

    pub plan: RecalculationPlan,
}

/// Payload of one dry-run child job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildJobData {
    pub workspace_id: WorkspaceId,
    pub commit_uuid: Uuid,
    pub evaluation_uuid: Uuid,
    pub document_uuid: Uuid,

    pub span: SpanTraceRef,

    /// Which side the human label puts this example on.
    pub expected: ExpectedSide,

    /// Always true: verdicts must not leak into live evaluation results.
    pub dry: bool,
}

/// Value returned by a completed child job and consumed by the parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildJobResult {
    pub span: SpanTraceRef,
    pub expected: ExpectedSide,
    pub verdict: Verdict,
}
