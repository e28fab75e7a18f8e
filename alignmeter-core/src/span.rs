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

//! Labeled span projections
//!
//! Spans are immutable records of historical model interactions, produced by
//! an external telemetry pipeline. This subsystem only ever reads them; a span
//! becomes usable as ground truth once a human reviewer has attached a label.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::issue::IssueId;

/// Span identifier assigned by the ingesting telemetry pipeline.
pub type SpanId = u128;

/// Trace identifier grouping spans of one interaction.
pub type TraceId = u128;

/// Workspace (tenant) identifier.
pub type WorkspaceId = u64;

/// Workspace plus document-version context a query or flow operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub workspace_id: WorkspaceId,
    pub commit_uuid: Uuid,
}

impl Scope {
    pub fn new(workspace_id: WorkspaceId, commit_uuid: Uuid) -> Self {
        Self {
            workspace_id,
            commit_uuid,
        }
    }
}

/// Who produced the judgment attached to a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// A human reviewer. Only these labels count as ground truth.
    Human,
    /// An automated judge. Excluded from alignment computation.
    Automated,
}

/// Human-in-the-loop judgment attached to a span.
///
/// `issue_id` links the span to a curated failure mode; `marked_good` records
/// an explicit "this output is fine" review. A span carrying a different
/// issue, or marked good, is a valid negative example for any other issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanLabel {
    pub source: LabelSource,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<IssueId>,

    #[serde(default)]
    pub marked_good: bool,
}

impl SpanLabel {
    /// Human label linking the span to an issue.
    pub fn human_issue(issue_id: IssueId) -> Self {
        Self {
            source: LabelSource::Human,
            issue_id: Some(issue_id),
            marked_good: false,
        }
    }

    /// Human label marking the span as a known-good output.
    pub fn human_good() -> Self {
        Self {
            source: LabelSource::Human,
            issue_id: None,
            marked_good: true,
        }
    }

    pub fn is_human(&self) -> bool {
        self.source == LabelSource::Human
    }
}

/// One labeled historical interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub span_id: SpanId,
    pub trace_id: TraceId,
    pub document_uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub label: SpanLabel,
}

impl Span {
    /// Lightweight projection for threading through job payloads.
    pub fn to_ref(&self) -> SpanTraceRef {
        SpanTraceRef {
            span_id: self.span_id,
            trace_id: self.trace_id,
            created_at: Some(self.created_at),
        }
    }
}

/// Span/trace identifier pair carried in job data so child jobs never have to
/// re-fetch the full span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanTraceRef {
    pub span_id: SpanId,
    pub trace_id: TraceId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}
