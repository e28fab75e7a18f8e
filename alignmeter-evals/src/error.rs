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

use thiserror::Error;

use alignmeter_broker::BrokerError;
use alignmeter_storage::StorageError;

/// Errors that can occur while triggering or coordinating a recalculation.
#[derive(Debug, Error)]
pub enum AlignmentError {
    /// Upstream span/evaluation query failed; no job is submitted.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The broker rejected the job graph.
    #[error("Submission error: {0}")]
    Broker(#[from] BrokerError),

    /// Too many children are unusable to trust an aggregate yet; the parent
    /// job retries on this.
    #[error("Unreliable child set: {unreliable} of {total} children unusable")]
    GateNotSatisfied { unreliable: usize, total: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AlignmentError>;
