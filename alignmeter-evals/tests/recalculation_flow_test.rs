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

//! End-to-end recalculation flows against in-memory stores and a scripted
//! evaluation runner.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use alignmeter_broker::FlowStatus;
use alignmeter_core::{
    AlignmentMetricMetadata, ConfusionMatrix, EngineConfig, Evaluation, EvaluationConfig, Issue,
    Scope, Span, SpanLabel, Verdict,
};
use alignmeter_evals::{fingerprint, AlignmentEngine, ChildJobData, EvaluationRunner, RecordingNotifier};
use alignmeter_storage::{InMemoryEvaluationStore, InMemorySpanStore};

const WORKSPACE: u64 = 1;
const ISSUE_ID: u64 = 7;

fn commit() -> Uuid {
    Uuid::from_u128(0xC0)
}

fn document() -> Uuid {
    Uuid::from_u128(0xD0)
}

fn evaluation_uuid() -> Uuid {
    Uuid::from_u128(0xE0)
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap()
}

fn evaluator_config() -> EvaluationConfig {
    EvaluationConfig {
        provider: "openai".into(),
        model: "gpt-4o-mini".into(),
        criteria: "the answer cites only real sources".into(),
        pass_description: "all citations resolve".into(),
        fail_description: "a citation is fabricated".into(),
    }
}

fn issue() -> Issue {
    Issue::new(ISSUE_ID, document(), "fabricated citations")
}

fn evaluation(alignment: AlignmentMetricMetadata) -> Evaluation {
    Evaluation {
        uuid: evaluation_uuid(),
        workspace_id: WORKSPACE,
        commit_uuid: commit(),
        document_uuid: document(),
        name: "citation check".into(),
        description: None,
        config: evaluator_config(),
        alignment,
    }
}

fn positive_span(span_id: u128, created_at: DateTime<Utc>) -> Span {
    Span {
        span_id,
        trace_id: span_id + 1_000,
        document_uuid: document(),
        created_at,
        label: SpanLabel::human_issue(ISSUE_ID),
    }
}

fn negative_span(span_id: u128, created_at: DateTime<Utc>) -> Span {
    Span {
        span_id,
        trace_id: span_id + 1_000,
        document_uuid: document(),
        created_at,
        label: SpanLabel::human_good(),
    }
}

/// Scripted runner: verdict per span id, optional per-span hard failures,
/// optional artificial latency.
#[derive(Default)]
struct ScriptedRunner {
    verdicts: HashMap<u128, Verdict>,
    failing_spans: HashSet<u128>,
    delay_ms: u64,
}

impl ScriptedRunner {
    fn verdict(mut self, span_id: u128, verdict: Verdict) -> Self {
        self.verdicts.insert(span_id, verdict);
        self
    }

    fn failing(mut self, span_id: u128) -> Self {
        self.failing_spans.insert(span_id);
        self
    }

    fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[async_trait]
impl EvaluationRunner for ScriptedRunner {
    async fn run_dry(&self, data: &ChildJobData) -> anyhow::Result<Verdict> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.failing_spans.contains(&data.span.span_id) {
            anyhow::bail!("provider returned 500 for span {}", data.span.span_id);
        }
        Ok(self
            .verdicts
            .get(&data.span.span_id)
            .copied()
            .unwrap_or(Verdict::Pass))
    }
}

struct Harness {
    engine: AlignmentEngine,
    evaluations: Arc<InMemoryEvaluationStore>,
    notifier: Arc<RecordingNotifier>,
}

fn test_config() -> EngineConfig {
    EngineConfig {
        parent_backoff_ms: 1,
        child_backoff_ms: 1,
        ..Default::default()
    }
}

fn harness(spans: InMemorySpanStore, eval: Evaluation, runner: ScriptedRunner) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let spans = Arc::new(spans);
    let evaluations = Arc::new(InMemoryEvaluationStore::new());
    evaluations.insert(eval);
    let notifier = Arc::new(RecordingNotifier::new());

    let engine = AlignmentEngine::new(
        spans,
        evaluations.clone(),
        Arc::new(runner),
        notifier.clone(),
        test_config(),
    );

    Harness {
        engine,
        evaluations,
        notifier,
    }
}

fn scope() -> Scope {
    Scope::new(WORKSPACE, commit())
}

#[tokio::test]
async fn test_first_recalculation_scenario() {
    // 3 positives, 5 negatives, unchanged configuration, no prior cutoffs:
    // the selector balances to 3+3 and the flow fans out 6 children.
    let spans = InMemorySpanStore::new();
    spans.insert_many(
        scope(),
        (1..=3).map(|i| positive_span(i, at(10, i as u32))),
    );
    spans.insert_many(
        scope(),
        (101..=105).map(|i| negative_span(i, at(10, (i - 100) as u32))),
    );

    // Stored hash matches the live config: incremental path, nothing filtered.
    let eval = evaluation(AlignmentMetricMetadata {
        alignment_hash: fingerprint(&evaluator_config()),
        ..Default::default()
    });

    // One positive correctly failed, two slip through, all negatives pass.
    let runner = ScriptedRunner::default()
        .verdict(1, Verdict::Fail)
        .verdict(2, Verdict::Pass)
        .verdict(3, Verdict::Pass);

    let h = harness(spans, eval.clone(), runner);
    let handle = h
        .engine
        .recalculate_alignment_metric(WORKSPACE, commit(), &eval, &issue())
        .await
        .unwrap();

    assert_eq!(handle.child_job_ids.len(), 6);

    let status = h
        .engine
        .broker()
        .wait_for_flow(&handle.parent_job_id)
        .await
        .unwrap();
    assert_eq!(status, FlowStatus::Completed);

    let stored = h.evaluations.get(&evaluation_uuid()).unwrap().alignment;
    assert_eq!(
        stored.confusion_matrix,
        ConfusionMatrix {
            true_positives: 1,
            false_negatives: 2,
            true_negatives: 3,
            false_positives: 0,
        }
    );
    assert_eq!(stored.alignment_hash, fingerprint(&evaluator_config()));
    assert!(stored.recalculating_at.is_none());
    // Newest selected positive was created at hour 3; newest negative at 5.
    assert_eq!(stored.last_processed_positive_span_at, Some(at(10, 3)));
    assert_eq!(stored.last_processed_negative_span_at, Some(at(10, 5)));

    // Consumers saw the marker set, then cleared, exactly once each.
    let events = h.notifier.events();
    assert_eq!(events.len(), 2);
    assert!(events[0].alignment.recalculating_at.is_some());
    assert!(events[1].alignment.recalculating_at.is_none());
    assert_eq!(events[1].alignment.confusion_matrix.total(), 6);
}

#[tokio::test]
async fn test_changed_configuration_rebuilds_matrix() {
    let spans = InMemorySpanStore::new();
    spans.insert_many(
        scope(),
        (1..=2).map(|i| positive_span(i, at(10, i as u32))),
    );
    spans.insert_many(
        scope(),
        (101..=102).map(|i| negative_span(i, at(10, (i - 100) as u32))),
    );

    // Stored hash does not match: full rebuild, old counters discarded even
    // though cutoffs exist.
    let eval = evaluation(AlignmentMetricMetadata {
        alignment_hash: "hash-of-the-old-criteria".into(),
        confusion_matrix: ConfusionMatrix {
            true_positives: 40,
            true_negatives: 40,
            false_positives: 40,
            false_negatives: 40,
        },
        last_processed_positive_span_at: Some(at(20, 0)),
        last_processed_negative_span_at: Some(at(20, 0)),
        recalculating_at: None,
    });

    let runner = ScriptedRunner::default()
        .verdict(1, Verdict::Fail)
        .verdict(2, Verdict::Fail);

    let h = harness(spans, eval.clone(), runner);
    let handle = h
        .engine
        .recalculate_alignment_metric(WORKSPACE, commit(), &eval, &issue())
        .await
        .unwrap();

    // Cutoffs must not filter a full recalculation.
    assert_eq!(handle.child_job_ids.len(), 4);

    h.engine
        .broker()
        .wait_for_flow(&handle.parent_job_id)
        .await
        .unwrap();

    let stored = h.evaluations.get(&evaluation_uuid()).unwrap().alignment;
    assert_eq!(
        stored.confusion_matrix,
        ConfusionMatrix {
            true_positives: 2,
            true_negatives: 2,
            false_positives: 0,
            false_negatives: 0,
        }
    );
    assert_eq!(stored.alignment_hash, fingerprint(&evaluator_config()));
}

#[tokio::test]
async fn test_incremental_recalculation_merges_new_examples_only() {
    let spans = InMemorySpanStore::new();
    // Two old examples per side (before the day-20 window), two new ones.
    spans.insert(scope(), positive_span(1, at(5, 0)));
    spans.insert(scope(), positive_span(2, at(21, 1)));
    spans.insert(scope(), negative_span(101, at(5, 0)));
    spans.insert(scope(), negative_span(102, at(21, 2)));

    let previous_matrix = ConfusionMatrix {
        true_positives: 1,
        true_negatives: 1,
        false_positives: 0,
        false_negatives: 0,
    };
    let eval = evaluation(AlignmentMetricMetadata {
        alignment_hash: fingerprint(&evaluator_config()),
        confusion_matrix: previous_matrix,
        last_processed_positive_span_at: Some(at(20, 12)),
        last_processed_negative_span_at: Some(at(20, 12)),
        recalculating_at: None,
    });

    let runner = ScriptedRunner::default().verdict(2, Verdict::Fail);

    let h = harness(spans, eval.clone(), runner);
    let handle = h
        .engine
        .recalculate_alignment_metric(WORKSPACE, commit(), &eval, &issue())
        .await
        .unwrap();

    // Only the two post-cutoff examples run.
    assert_eq!(handle.child_job_ids.len(), 2);

    h.engine
        .broker()
        .wait_for_flow(&handle.parent_job_id)
        .await
        .unwrap();

    let stored = h.evaluations.get(&evaluation_uuid()).unwrap().alignment;
    assert_eq!(
        stored.confusion_matrix,
        ConfusionMatrix {
            true_positives: 2,
            true_negatives: 2,
            false_positives: 0,
            false_negatives: 0,
        }
    );
    assert_eq!(stored.last_processed_positive_span_at, Some(at(21, 1)));
    assert_eq!(stored.last_processed_negative_span_at, Some(at(21, 2)));
}

#[tokio::test]
async fn test_terminal_failure_keeps_previous_matrix() {
    let spans = InMemorySpanStore::new();
    spans.insert_many(
        scope(),
        (1..=3).map(|i| positive_span(i, at(10, i as u32))),
    );
    spans.insert_many(
        scope(),
        (101..=103).map(|i| negative_span(i, at(10, (i - 100) as u32))),
    );

    let previous_matrix = ConfusionMatrix {
        true_positives: 5,
        true_negatives: 6,
        false_positives: 1,
        false_negatives: 2,
    };
    let eval = evaluation(AlignmentMetricMetadata {
        alignment_hash: fingerprint(&evaluator_config()),
        confusion_matrix: previous_matrix,
        recalculating_at: None,
        ..Default::default()
    });

    // Every child fails hard: the gate can never pass, the parent exhausts
    // its attempts, and the fallback keeps the previous counters.
    let runner = (1..=3)
        .chain(101..=103)
        .fold(ScriptedRunner::default(), |r, id| r.failing(id));

    let h = harness(spans, eval.clone(), runner);
    let handle = h
        .engine
        .recalculate_alignment_metric(WORKSPACE, commit(), &eval, &issue())
        .await
        .unwrap();

    let status = h
        .engine
        .broker()
        .wait_for_flow(&handle.parent_job_id)
        .await
        .unwrap();
    assert_eq!(status, FlowStatus::Failed);

    let stored = h.evaluations.get(&evaluation_uuid()).unwrap().alignment;
    assert_eq!(stored.confusion_matrix, previous_matrix);
    assert!(stored.recalculating_at.is_none());

    // The notification stream still converges on a cleared marker.
    let events = h.notifier.events();
    let last = events.last().unwrap();
    assert!(last.alignment.recalculating_at.is_none());
    assert_eq!(last.alignment.confusion_matrix, previous_matrix);
}

#[tokio::test]
async fn test_resubmission_collapses_to_inflight_flow() {
    let spans = InMemorySpanStore::new();
    spans.insert(scope(), positive_span(1, at(10, 1)));
    spans.insert(scope(), negative_span(101, at(10, 2)));

    let eval = evaluation(AlignmentMetricMetadata {
        alignment_hash: fingerprint(&evaluator_config()),
        ..Default::default()
    });

    // Slow children keep the first flow in flight across the second call.
    let runner = ScriptedRunner::default()
        .verdict(1, Verdict::Fail)
        .with_delay_ms(300);

    let h = harness(spans, eval.clone(), runner);
    let first = h
        .engine
        .recalculate_alignment_metric(WORKSPACE, commit(), &eval, &issue())
        .await
        .unwrap();
    let second = h
        .engine
        .recalculate_alignment_metric(WORKSPACE, commit(), &eval, &issue())
        .await
        .unwrap();

    assert_eq!(first, second);

    let status = h
        .engine
        .broker()
        .wait_for_flow(&first.parent_job_id)
        .await
        .unwrap();
    assert_eq!(status, FlowStatus::Completed);

    // One flow, one set->cleared transition.
    let events = h.notifier.events();
    assert_eq!(events.len(), 2);
    assert!(events[0].alignment.recalculating_at.is_some());
    assert!(events[1].alignment.recalculating_at.is_none());
}

#[tokio::test]
async fn test_no_examples_yields_empty_flow() {
    // Empty span store: no positives means an empty flow, which still
    // completes and records a zeroed matrix for a full plan.
    let spans = InMemorySpanStore::new();
    let eval = evaluation(AlignmentMetricMetadata {
        alignment_hash: "never-computed".into(),
        ..Default::default()
    });

    let h = harness(spans, eval.clone(), ScriptedRunner::default());
    let handle = h
        .engine
        .recalculate_alignment_metric(WORKSPACE, commit(), &eval, &issue())
        .await
        .unwrap();

    assert!(handle.child_job_ids.is_empty());
    let status = h
        .engine
        .broker()
        .wait_for_flow(&handle.parent_job_id)
        .await
        .unwrap();
    assert_eq!(status, FlowStatus::Completed);

    let stored = h.evaluations.get(&evaluation_uuid()).unwrap().alignment;
    assert_eq!(stored.confusion_matrix.total(), 0);
    assert!(stored.recalculating_at.is_none());
}
