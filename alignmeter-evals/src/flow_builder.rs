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

//! Recalculation trigger: builds and submits the job graph.
//!
//! The fingerprint decides the plan. A changed configuration voids all prior
//! verdicts, so the full balanced lists are submitted. An unchanged one
//! bounds the work to examples created on/after each list's last processing
//! window (its UTC day floor), rebalanced again after filtering so the two
//! sides stay equal.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use alignmeter_broker::{
    Backoff, FlowBroker, FlowHandle, FlowSpec, FlowStatus, JobOptions, JobSpec,
};
use alignmeter_core::{
    AlignmentEvent, AlignmentMetricMetadata, EngineConfig, Evaluation, ExpectedSide, Issue, Scope,
    SpanTraceRef, WorkspaceId,
};
use alignmeter_storage::{EvaluationStore, SpanStore};

use crate::error::Result;
use crate::fingerprint::fingerprint;
use crate::jobs::{
    child_job_id, parent_job_id, ChildJobData, ParentJobData, RecalculationPlan,
    EVALUATIONS_QUEUE, RECALCULATE_ALIGNMENT_JOB, RUN_EVALUATION_DRY_JOB,
};
use crate::notifier::AlignmentNotifier;
use crate::rebalance::rebalance;
use crate::selector::{BalancedExamples, ExampleSelector};

/// Builds one parent aggregation job plus one dry-run child per example and
/// submits the graph to the broker.
pub struct FlowBuilder {
    selector: ExampleSelector,
    evaluations: Arc<dyn EvaluationStore>,
    notifier: Arc<dyn AlignmentNotifier>,
    broker: FlowBroker,
    config: EngineConfig,
}

impl FlowBuilder {
    pub fn new(
        spans: Arc<dyn SpanStore>,
        evaluations: Arc<dyn EvaluationStore>,
        notifier: Arc<dyn AlignmentNotifier>,
        broker: FlowBroker,
        config: EngineConfig,
    ) -> Self {
        Self {
            selector: ExampleSelector::new(spans, config.clone()),
            evaluations,
            notifier,
            broker,
            config,
        }
    }

    /// Kick off a recalculation flow for one evaluation against one issue.
    ///
    /// Returns the accepted flow handle. Submitting again while the flow is
    /// in flight returns the same handle. The evaluation's `recalculating_at`
    /// is stamped (and consumers notified) just before the graph is handed to
    /// the broker, and rolled back if the broker rejects it.
    #[instrument(skip(self, evaluation, issue), fields(evaluation = %evaluation.uuid, issue = issue.id))]
    pub async fn recalculate_alignment_metric(
        &self,
        workspace_id: WorkspaceId,
        commit_uuid: Uuid,
        evaluation: &Evaluation,
        issue: &Issue,
    ) -> Result<FlowHandle> {
        // An in-flight flow for this evaluation absorbs the request.
        let parent_id = parent_job_id(&evaluation.uuid);
        if self.broker.flow_status(&parent_id).ok() == Some(FlowStatus::Running) {
            debug!(flow = %parent_id, "recalculation already in flight, collapsing request");
            return Ok(self.broker.flow_handle(&parent_id)?);
        }

        let scope = Scope::new(workspace_id, commit_uuid);
        let examples = self.selector.select(scope, issue).await?;

        let current_hash = fingerprint(&evaluation.config);
        let configuration_changed = current_hash != evaluation.alignment.alignment_hash;
        let plan = build_plan(&evaluation.alignment, configuration_changed, examples);

        info!(
            mode = if plan.is_full() { "full" } else { "incremental" },
            children = plan.example_count(),
            "submitting recalculation flow"
        );

        let flow = self.build_flow(workspace_id, commit_uuid, evaluation, current_hash, &plan)?;

        // Stamp the in-flight marker before the flow can start: the
        // coordinator's clearing write must always come second.
        let inflight = evaluation.alignment.with_recalculating_at(Utc::now());
        self.evaluations
            .update_alignment(evaluation.uuid, inflight.clone())
            .await?;
        self.notifier
            .publish(AlignmentEvent::updated(
                workspace_id,
                evaluation.uuid,
                inflight,
            ))
            .await;

        match self.broker.submit_flow(flow) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                // No flow is running; un-strand consumers before surfacing
                // the submission error.
                let restored = evaluation.alignment.clone();
                if self
                    .evaluations
                    .update_alignment(evaluation.uuid, restored.clone())
                    .await
                    .is_ok()
                {
                    self.notifier
                        .publish(AlignmentEvent::updated(
                            workspace_id,
                            evaluation.uuid,
                            restored,
                        ))
                        .await;
                }
                Err(err.into())
            }
        }
    }

    fn build_flow(
        &self,
        workspace_id: WorkspaceId,
        commit_uuid: Uuid,
        evaluation: &Evaluation,
        current_hash: String,
        plan: &RecalculationPlan,
    ) -> Result<FlowSpec> {
        let (should_fail, should_pass) = plan.examples();

        let mut children = Vec::with_capacity(plan.example_count());
        let sides = [
            (should_fail, ExpectedSide::ShouldFail),
            (should_pass, ExpectedSide::ShouldPass),
        ];
        for (refs, expected) in sides {
            for span in refs {
                children.push(JobSpec {
                    id: child_job_id(&evaluation.uuid, span.span_id),
                    kind: RUN_EVALUATION_DRY_JOB.to_string(),
                    queue: EVALUATIONS_QUEUE.to_string(),
                    data: serde_json::to_value(ChildJobData {
                        workspace_id,
                        commit_uuid,
                        evaluation_uuid: evaluation.uuid,
                        document_uuid: evaluation.document_uuid,
                        span: *span,
                        expected,
                        dry: true,
                    })?,
                    options: JobOptions {
                        attempts: self.config.child_attempts,
                        backoff: Backoff::Fixed {
                            delay_ms: self.config.child_backoff_ms,
                        },
                        continue_parent_on_failure: true,
                    },
                });
            }
        }

        let parent = JobSpec {
            id: parent_job_id(&evaluation.uuid),
            kind: RECALCULATE_ALIGNMENT_JOB.to_string(),
            queue: EVALUATIONS_QUEUE.to_string(),
            data: serde_json::to_value(ParentJobData {
                workspace_id,
                commit_uuid,
                evaluation_uuid: evaluation.uuid,
                document_uuid: evaluation.document_uuid,
                current_hash,
                plan: plan.clone(),
            })?,
            options: JobOptions {
                attempts: self.config.parent_attempts,
                backoff: Backoff::Exponential {
                    initial_ms: self.config.parent_backoff_ms,
                },
                continue_parent_on_failure: false,
            },
        };

        Ok(FlowSpec { parent, children })
    }
}

/// Start of the UTC day a timestamp falls on.
fn day_floor(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&at.date_naive().and_time(NaiveTime::MIN))
}

fn is_fresh(span: &SpanTraceRef, cutoff: Option<DateTime<Utc>>) -> bool {
    match (span.created_at, cutoff) {
        (Some(created_at), Some(cutoff)) => created_at >= cutoff,
        // No recorded window, or no creation date on the ref: include.
        _ => true,
    }
}

fn build_plan(
    alignment: &AlignmentMetricMetadata,
    configuration_changed: bool,
    examples: BalancedExamples,
) -> RecalculationPlan {
    if configuration_changed {
        return RecalculationPlan::Full {
            should_fail: examples.should_fail,
            should_pass: examples.should_pass,
        };
    }

    let positive_cutoff = alignment.last_processed_positive_span_at.map(day_floor);
    let negative_cutoff = alignment.last_processed_negative_span_at.map(day_floor);

    let fresh_fail: Vec<SpanTraceRef> = examples
        .should_fail
        .into_iter()
        .filter(|span| is_fresh(span, positive_cutoff))
        .collect();
    let fresh_pass: Vec<SpanTraceRef> = examples
        .should_pass
        .into_iter()
        .filter(|span| is_fresh(span, negative_cutoff))
        .collect();

    // Filtering can skew the sides; rebalance the filtered lists, not the
    // originals.
    let (should_fail, should_pass) = rebalance(fresh_fail, fresh_pass);
    RecalculationPlan::Incremental {
        should_fail,
        should_pass,
    }
}
