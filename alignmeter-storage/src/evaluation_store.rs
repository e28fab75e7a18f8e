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

//! Evaluation records and alignment metadata persistence.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use alignmeter_core::{AlignmentMetricMetadata, Evaluation};

use crate::error::StorageError;

/// Access to the one mutable entity this subsystem owns.
///
/// `update_alignment` is a single last-writer-wins write per flow; there is
/// no read-modify-write cycle to race because flows are idempotency-gated to
/// one per evaluation at a time.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    async fn evaluation(
        &self,
        commit_uuid: Uuid,
        document_uuid: Uuid,
        evaluation_uuid: Uuid,
    ) -> Result<Evaluation, StorageError>;

    async fn update_alignment(
        &self,
        evaluation_uuid: Uuid,
        alignment: AlignmentMetricMetadata,
    ) -> Result<(), StorageError>;
}

/// In-memory evaluation store.
#[derive(Default)]
pub struct InMemoryEvaluationStore {
    evaluations: DashMap<Uuid, Evaluation>,
}

impl InMemoryEvaluationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, evaluation: Evaluation) {
        self.evaluations.insert(evaluation.uuid, evaluation);
    }

    pub fn get(&self, evaluation_uuid: &Uuid) -> Option<Evaluation> {
        self.evaluations.get(evaluation_uuid).map(|e| e.clone())
    }
}

#[async_trait]
impl EvaluationStore for InMemoryEvaluationStore {
    async fn evaluation(
        &self,
        commit_uuid: Uuid,
        document_uuid: Uuid,
        evaluation_uuid: Uuid,
    ) -> Result<Evaluation, StorageError> {
        let evaluation = self
            .evaluations
            .get(&evaluation_uuid)
            .map(|e| e.clone())
            .ok_or_else(|| StorageError::NotFound(format!("evaluation {evaluation_uuid}")))?;

        if evaluation.commit_uuid != commit_uuid || evaluation.document_uuid != document_uuid {
            return Err(StorageError::NotFound(format!(
                "evaluation {evaluation_uuid} in commit {commit_uuid}"
            )));
        }
        Ok(evaluation)
    }

    async fn update_alignment(
        &self,
        evaluation_uuid: Uuid,
        alignment: AlignmentMetricMetadata,
    ) -> Result<(), StorageError> {
        let mut evaluation = self
            .evaluations
            .get_mut(&evaluation_uuid)
            .ok_or_else(|| StorageError::NotFound(format!("evaluation {evaluation_uuid}")))?;

        debug!(
            evaluation = %evaluation_uuid,
            recalculating = alignment.is_recalculating(),
            "alignment metadata updated"
        );
        evaluation.alignment = alignment;
        Ok(())
    }
}
