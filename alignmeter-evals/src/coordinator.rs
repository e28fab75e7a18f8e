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

//! Parent job handler: aggregate child verdicts into alignment metadata.
//!
//! Runs once the child set has settled. A gate first checks that enough
//! children produced usable verdicts; an unreliable set makes this attempt
//! error so the broker retries the parent after backoff, giving stragglers
//! and retried children time to settle. Aggregation then either rebuilds the
//! matrix (full plan) or merges the new verdicts into the stored one
//! (incremental plan), advances the rolling cutoffs monotonically, persists,
//! and notifies.
//!
//! On the final attempt a failure switches to the fallback path: the
//! previous matrix and hash are re-persisted with `recalculating_at`
//! cleared, so consumers are never stranded on a stale in-flight marker or
//! handed a zeroed matrix, and the error is re-thrown so the broker's
//! bookkeeping stays accurate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use alignmeter_broker::{JobContext, JobHandler, JobStatus};
use alignmeter_core::{
    AlignmentEvent, AlignmentMetricMetadata, ConfusionMatrix, EngineConfig, ExpectedSide,
};
use alignmeter_storage::EvaluationStore;

use crate::error::{AlignmentError, Result};
use crate::jobs::{ChildJobResult, ParentJobData, RECALCULATE_ALIGNMENT_JOB};
use crate::notifier::AlignmentNotifier;

/// Handler for `recalculate_alignment_metric` parent jobs.
pub struct RecalculationCoordinator {
    evaluations: Arc<dyn EvaluationStore>,
    notifier: Arc<dyn AlignmentNotifier>,
    config: EngineConfig,
}

impl RecalculationCoordinator {
    pub fn new(
        evaluations: Arc<dyn EvaluationStore>,
        notifier: Arc<dyn AlignmentNotifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            evaluations,
            notifier,
            config,
        }
    }

    async fn recalculate(&self, ctx: &JobContext, data: &ParentJobData) -> Result<AlignmentMetricMetadata> {
        let counts = ctx.dependency_counts();
        let total = counts.total();
        let unreliable = counts.unreliable();
        if total > 0 && (unreliable as f64) > (total as f64) * self.config.failure_tolerance {
            warn!(
                unreliable,
                total,
                tolerance = self.config.failure_tolerance,
                "child set not reliable, forcing parent retry"
            );
            return Err(AlignmentError::GateNotSatisfied { unreliable, total });
        }

        let evaluation = self
            .evaluations
            .evaluation(data.commit_uuid, data.document_uuid, data.evaluation_uuid)
            .await?;

        let judged = collect_verdicts(ctx);

        let mut fresh = ConfusionMatrix::default();
        for result in &judged {
            fresh.record(result.expected, result.verdict);
        }

        let confusion_matrix = if data.plan.is_full() {
            fresh
        } else {
            evaluation.alignment.confusion_matrix.merge(&fresh)
        };

        let alignment = AlignmentMetricMetadata {
            alignment_hash: data.current_hash.clone(),
            confusion_matrix,
            last_processed_positive_span_at: advance_cutoff(
                evaluation.alignment.last_processed_positive_span_at,
                newest_created_at(&judged, ExpectedSide::ShouldFail),
            ),
            last_processed_negative_span_at: advance_cutoff(
                evaluation.alignment.last_processed_negative_span_at,
                newest_created_at(&judged, ExpectedSide::ShouldPass),
            ),
            recalculating_at: None,
        };

        self.evaluations
            .update_alignment(data.evaluation_uuid, alignment.clone())
            .await?;
        self.notifier
            .publish(AlignmentEvent::updated(
                data.workspace_id,
                data.evaluation_uuid,
                alignment.clone(),
            ))
            .await;

        info!(
            evaluation = %data.evaluation_uuid,
            judged = judged.len(),
            mcc = alignment.confusion_matrix.metrics().mcc,
            "alignment metric recalculated"
        );

        Ok(alignment)
    }

    /// Best-effort terminal fallback: keep the previous matrix and hash,
    /// clear the in-flight marker, re-notify.
    async fn persist_fallback(&self, data: &ParentJobData) {
        let evaluation = match self
            .evaluations
            .evaluation(data.commit_uuid, data.document_uuid, data.evaluation_uuid)
            .await
        {
            Ok(evaluation) => evaluation,
            Err(err) => {
                error!(evaluation = %data.evaluation_uuid, %err, "fallback read failed");
                return;
            }
        };

        let fallback = evaluation.alignment.cleared();
        if let Err(err) = self
            .evaluations
            .update_alignment(data.evaluation_uuid, fallback.clone())
            .await
        {
            error!(evaluation = %data.evaluation_uuid, %err, "fallback write failed");
            return;
        }

        self.notifier
            .publish(AlignmentEvent::updated(
                data.workspace_id,
                data.evaluation_uuid,
                fallback,
            ))
            .await;
    }
}

#[async_trait]
impl JobHandler for RecalculationCoordinator {
    fn kind(&self) -> &str {
        RECALCULATE_ALIGNMENT_JOB
    }

    #[instrument(skip(self, ctx), fields(job = %ctx.job_id, attempt = ctx.attempts_made))]
    async fn execute(&self, ctx: JobContext) -> anyhow::Result<serde_json::Value> {
        let data: ParentJobData = ctx.payload()?;

        match self.recalculate(&ctx, &data).await {
            Ok(alignment) => Ok(serde_json::to_value(alignment)?),
            Err(err) => {
                if ctx.is_final_attempt() {
                    error!(
                        evaluation = %data.evaluation_uuid,
                        %err,
                        "recalculation exhausted its attempts, persisting fallback"
                    );
                    self.persist_fallback(&data).await;
                }
                Err(err.into())
            }
        }
    }
}

/// Deserialize the verdicts of completed children, skipping failed or
/// ignored ones (they were already counted by the gate) and any payload the
/// runner returned in an unexpected shape.
fn collect_verdicts(ctx: &JobContext) -> Vec<ChildJobResult> {
    ctx.children_results()
        .iter()
        .filter(|child| child.status == JobStatus::Completed)
        .filter_map(|child| {
            let value = child.value.clone()?;
            match serde_json::from_value::<ChildJobResult>(value) {
                Ok(result) => Some(result),
                Err(err) => {
                    warn!(job = %child.job_id, %err, "discarding malformed child result");
                    None
                }
            }
        })
        .collect()
}

fn newest_created_at(judged: &[ChildJobResult], side: ExpectedSide) -> Option<DateTime<Utc>> {
    judged
        .iter()
        .filter(|result| result.expected == side)
        .filter_map(|result| result.span.created_at)
        .max()
}

/// Cutoffs only ever advance.
fn advance_cutoff(
    previous: Option<DateTime<Utc>>,
    observed: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match (previous, observed) {
        (Some(previous), Some(observed)) => Some(previous.max(observed)),
        (previous, observed) => previous.or(observed),
    }
}
