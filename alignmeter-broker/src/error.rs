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

/// Errors surfaced by flow submission and job queries.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("No handler registered for job kind '{0}'")]
    NoHandler(String),

    #[error("Job id must not be empty")]
    EmptyJobId,

    #[error("Flow rejected: {0}")]
    Rejected(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),
}
