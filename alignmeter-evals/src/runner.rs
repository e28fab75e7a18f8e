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

//! Child job body: one dry-run of the evaluator against one example.
//!
//! The evaluator itself (prompt compilation, LLM invocation) lives outside
//! this subsystem; [`EvaluationRunner`] is its boundary. The handler wraps a
//! runner so the broker can retry and count failures per example.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

use alignmeter_broker::{JobContext, JobHandler};
use alignmeter_core::Verdict;

use crate::jobs::{ChildJobData, ChildJobResult, RUN_EVALUATION_DRY_JOB};

/// Executes the evaluator against one example without affecting live
/// results, returning its pass/fail verdict.
#[async_trait]
pub trait EvaluationRunner: Send + Sync {
    async fn run_dry(&self, data: &ChildJobData) -> anyhow::Result<Verdict>;
}

/// Broker handler for `run_evaluation_dry` jobs.
pub struct DryRunJobHandler {
    runner: Arc<dyn EvaluationRunner>,
}

impl DryRunJobHandler {
    pub fn new(runner: Arc<dyn EvaluationRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl JobHandler for DryRunJobHandler {
    fn kind(&self) -> &str {
        RUN_EVALUATION_DRY_JOB
    }

    #[instrument(skip(self, ctx), fields(job = %ctx.job_id))]
    async fn execute(&self, ctx: JobContext) -> anyhow::Result<serde_json::Value> {
        let data: ChildJobData = ctx.payload()?;
        let verdict = self.runner.run_dry(&data).await?;
        debug!(
            evaluation = %data.evaluation_uuid,
            span = data.span.span_id,
            ?verdict,
            "dry run judged example"
        );

        Ok(serde_json::to_value(ChildJobResult {
            span: data.span,
            expected: data.expected,
            verdict,
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alignmeter_core::{ExpectedSide, SpanTraceRef};
    use uuid::Uuid;

    struct AlwaysFails;

    #[async_trait]
    impl EvaluationRunner for AlwaysFails {
        async fn run_dry(&self, _data: &ChildJobData) -> anyhow::Result<Verdict> {
            Ok(Verdict::Fail)
        }
    }

    fn child_data() -> ChildJobData {
        ChildJobData {
            workspace_id: 1,
            commit_uuid: Uuid::from_u128(2),
            evaluation_uuid: Uuid::from_u128(3),
            document_uuid: Uuid::from_u128(4),
            span: SpanTraceRef {
                span_id: 9,
                trace_id: 10,
                created_at: None,
            },
            expected: ExpectedSide::ShouldFail,
            dry: true,
        }
    }

    #[tokio::test]
    async fn test_handler_returns_typed_result() {
        let handler = DryRunJobHandler::new(Arc::new(AlwaysFails));
        let ctx = JobContext::new(
            "j1".into(),
            serde_json::to_value(child_data()).unwrap(),
            1,
            2,
        );

        let value = handler.execute(ctx).await.unwrap();
        let result: ChildJobResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.verdict, Verdict::Fail);
        assert_eq!(result.expected, ExpectedSide::ShouldFail);
        assert_eq!(result.span.span_id, 9);
    }
}
