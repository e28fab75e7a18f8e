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

//! Wired-up alignment engine: broker, handlers, and trigger in one place.

use std::sync::Arc;
use uuid::Uuid;

use alignmeter_broker::{FlowBroker, FlowHandle};
use alignmeter_core::{EngineConfig, Evaluation, Issue, WorkspaceId};
use alignmeter_storage::{EvaluationStore, SpanStore};

use crate::coordinator::RecalculationCoordinator;
use crate::error::Result;
use crate::flow_builder::FlowBuilder;
use crate::notifier::AlignmentNotifier;
use crate::runner::{DryRunJobHandler, EvaluationRunner};

/// The recalculation engine with its handlers registered on a fresh broker.
///
/// Callers that bring their own broker can instead register
/// [`RecalculationCoordinator`] and [`DryRunJobHandler`] themselves and use
/// [`FlowBuilder`] directly.
pub struct AlignmentEngine {
    builder: FlowBuilder,
    broker: FlowBroker,
}

impl AlignmentEngine {
    pub fn new(
        spans: Arc<dyn SpanStore>,
        evaluations: Arc<dyn EvaluationStore>,
        runner: Arc<dyn EvaluationRunner>,
        notifier: Arc<dyn AlignmentNotifier>,
        config: EngineConfig,
    ) -> Self {
        let broker = FlowBroker::new();
        broker.register(Arc::new(DryRunJobHandler::new(runner)));
        broker.register(Arc::new(RecalculationCoordinator::new(
            evaluations.clone(),
            notifier.clone(),
            config.clone(),
        )));

        let builder = FlowBuilder::new(spans, evaluations, notifier, broker.clone(), config);
        Self { builder, broker }
    }

    /// Entry point: schedule a recalculation of the evaluation's alignment
    /// metric against the given issue.
    pub async fn recalculate_alignment_metric(
        &self,
        workspace_id: WorkspaceId,
        commit_uuid: Uuid,
        evaluation: &Evaluation,
        issue: &Issue,
    ) -> Result<FlowHandle> {
        self.builder
            .recalculate_alignment_metric(workspace_id, commit_uuid, evaluation, issue)
            .await
    }

    pub fn broker(&self) -> &FlowBroker {
        &self.broker
    }
}
