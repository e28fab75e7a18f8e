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

//! Alignmeter Storage
//!
//! Repository boundary for the alignment engine. The durable query engines
//! for spans and evaluations live outside this system; these traits pin down
//! exactly what the engine consumes, and the in-memory implementations back
//! embedded deployments and the test suites.

pub mod error;
pub mod evaluation_store;
pub mod span_store;

pub use error::StorageError;
pub use evaluation_store::{EvaluationStore, InMemoryEvaluationStore};
pub use span_store::{InMemorySpanStore, SpanStore};
