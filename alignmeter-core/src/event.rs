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

//! Change notification events emitted when an evaluation's alignment
//! metadata is written.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evaluation::AlignmentMetricMetadata;
use crate::span::WorkspaceId;

/// Event type emitted on every alignment metadata write.
pub const EVALUATION_ALIGNMENT_UPDATED: &str = "evaluationAlignmentUpdated";

/// Fire-and-forget notification payload. Consumers watch the stream to see
/// `recalculating_at` transition set -> cleared exactly once per flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentEvent {
    #[serde(rename = "type")]
    pub event_type: String,

    pub workspace_id: WorkspaceId,
    pub evaluation_uuid: Uuid,
    pub alignment: AlignmentMetricMetadata,
}

impl AlignmentEvent {
    pub fn updated(
        workspace_id: WorkspaceId,
        evaluation_uuid: Uuid,
        alignment: AlignmentMetricMetadata,
    ) -> Self {
        Self {
            event_type: EVALUATION_ALIGNMENT_UPDATED.to_string(),
            workspace_id,
            evaluation_uuid,
            alignment,
        }
    }
}
