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

//! Alignmeter Broker
//!
//! An in-process job broker providing the flow primitive the alignment engine
//! is built on: one parent job joined on many independent child jobs, with
//! per-job retry policies and deterministic, content-derived job identifiers.
//!
//! Duplicate submission of a flow whose parent identifier is still live
//! collapses to the existing flow — idempotency keys replace mutex-based
//! mutual exclusion. The parent is invoked only after every child has reached
//! a terminal state; its context exposes dependency counts and child results,
//! which is all the join/barrier semantics the coordinator needs.

pub mod broker;
pub mod error;
pub mod flow;
pub mod job;

pub use broker::FlowBroker;
pub use error::BrokerError;
pub use flow::{ChildResult, DependencyCounts, FlowHandle, FlowSpec, FlowStatus};
pub use job::{Backoff, JobContext, JobHandler, JobId, JobOptions, JobSpec, JobStatus};
