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

//! # Alignmeter Evaluation Engine
//!
//! Keeps an evaluator's alignment score (confusion matrix plus derived
//! correlation) up to date against human-labeled spans without re-running
//! history on every change.
//!
//! One recalculation is a broker flow: a balanced set of positive/negative
//! examples fans out into dry-run child jobs, and a parent job joins on them
//! to aggregate verdicts, advance the rolling cutoffs, persist the metadata,
//! and notify consumers. A configuration fingerprint decides between a full
//! rebuild and an incremental merge bounded to newly arrived examples.
//!
//! ## Example
//!
//! ```rust,ignore
//! use alignmeter_evals::AlignmentEngine;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = AlignmentEngine::new(spans, evaluations, runner, notifier, config);
//!     let handle = engine
//!         .recalculate_alignment_metric(workspace_id, commit_uuid, &evaluation, &issue)
//!         .await?;
//!     engine.broker().wait_for_flow(&handle.parent_job_id).await?;
//!     Ok(())
//! }
//! ```

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod flow_builder;
pub mod jobs;
pub mod notifier;
pub mod rebalance;
pub mod runner;
pub mod selector;

pub use coordinator::RecalculationCoordinator;
pub use engine::AlignmentEngine;
pub use error::{AlignmentError, Result};
pub use fingerprint::fingerprint;
pub use flow_builder::FlowBuilder;
pub use jobs::{
    child_job_id, parent_job_id, ChildJobData, ChildJobResult, ParentJobData, RecalculationPlan,
    EVALUATIONS_QUEUE, RECALCULATE_ALIGNMENT_JOB, RUN_EVALUATION_DRY_JOB,
};
pub use notifier::{AlignmentNotifier, BroadcastNotifier, RecordingNotifier};
pub use rebalance::rebalance;
pub use runner::{DryRunJobHandler, EvaluationRunner};
pub use selector::{BalancedExamples, ExampleSelector};
