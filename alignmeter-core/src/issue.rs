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

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Issue identifier.
pub type IssueId = u64;

/// A human-curated grouping of spans known to exhibit one recurring failure
/// mode of a document's outputs. Owned by an external subsystem; read-only
/// here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub document_uuid: Uuid,
    pub title: String,
}

impl Issue {
    pub fn new(id: IssueId, document_uuid: Uuid, title: impl Into<String>) -> Self {
        Self {
            id,
            document_uuid,
            title: title.into(),
        }
    }
}
