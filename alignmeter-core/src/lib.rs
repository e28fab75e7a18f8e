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

//! Alignmeter Core
//!
//! Fundamental data structures and shared contracts for tracking how well an
//! automated evaluator agrees with human-labeled ground truth.

pub mod config;
pub mod confusion;
pub mod error;
pub mod evaluation;
pub mod event;
pub mod issue;
pub mod span;

pub use config::EngineConfig;
pub use confusion::{AlignmentMetrics, ConfusionMatrix, ExpectedSide, Verdict};
pub use error::{AlignmeterError, Result};
pub use evaluation::{AlignmentMetricMetadata, Evaluation, EvaluationConfig};
pub use event::{AlignmentEvent, EVALUATION_ALIGNMENT_UPDATED};
pub use issue::{Issue, IssueId};
pub use span::{LabelSource, Scope, Span, SpanId, SpanLabel, SpanTraceRef, TraceId, WorkspaceId};
