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

//! Evaluation records and their alignment metadata
//!
//! The `Evaluation` is the only persisted, mutable entity this subsystem
//! owns. Everything else (spans, issues) is read-only input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::confusion::ConfusionMatrix;
use crate::span::WorkspaceId;

/// Decision-relevant evaluator configuration. These are exactly the fields
/// covered by the configuration fingerprint: changing any of them invalidates
/// previously aggregated verdicts and forces a full recalculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub provider: String,
    pub model: String,
    pub criteria: String,
    pub pass_description: String,
    pub fail_description: String,
}

/// An evaluator configuration scoped to one document version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub uuid: Uuid,
    pub workspace_id: WorkspaceId,
    pub commit_uuid: Uuid,
    pub document_uuid: Uuid,

    /// Display name; not part of the fingerprint.
    pub name: String,

    /// Display description; not part of the fingerprint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub config: EvaluationConfig,

    #[serde(default)]
    pub alignment: AlignmentMetricMetadata,
}

/// Rolling alignment state carried on each evaluation.
///
/// While `recalculating_at` is set the matrix values are stale and exactly
/// one recalculation flow is in flight; single-flight is enforced by the
/// broker's idempotent job identifiers, not by locks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentMetricMetadata {
    /// Fingerprint of the config the matrix was computed under.
    pub alignment_hash: String,

    pub confusion_matrix: ConfusionMatrix,

    /// Newest positive-example creation date already folded into the matrix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_processed_positive_span_at: Option<DateTime<Utc>>,

    /// Newest negative-example creation date already folded into the matrix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_processed_negative_span_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recalculating_at: Option<DateTime<Utc>>,
}

impl AlignmentMetricMetadata {
    pub fn is_recalculating(&self) -> bool {
        self.recalculating_at.is_some()
    }

    /// Copy of this metadata with the in-flight marker set.
    pub fn with_recalculating_at(&self, at: DateTime<Utc>) -> Self {
        Self {
            recalculating_at: Some(at),
            ..self.clone()
        }
    }

    /// Fallback written on terminal failure: the previous matrix and hash are
    /// kept so downstream consumers never see a zeroed-out score, only the
    /// in-flight marker is cleared.
    pub fn cleared(&self) -> Self {
        Self {
            recalculating_at: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> AlignmentMetricMetadata {
        AlignmentMetricMetadata {
            alignment_hash: "abc".into(),
            confusion_matrix: ConfusionMatrix {
                true_positives: 4,
                true_negatives: 5,
                false_positives: 1,
                false_negatives: 2,
            },
            last_processed_positive_span_at: Some(Utc::now()),
            last_processed_negative_span_at: None,
            recalculating_at: None,
        }
    }

    #[test]
    fn test_recalculating_marker_roundtrip() {
        let meta = sample_metadata();
        assert!(!meta.is_recalculating());

        let inflight = meta.with_recalculating_at(Utc::now());
        assert!(inflight.is_recalculating());
        assert_eq!(inflight.confusion_matrix, meta.confusion_matrix);

        let cleared = inflight.cleared();
        assert!(!cleared.is_recalculating());
        assert_eq!(cleared.alignment_hash, "abc");
        assert_eq!(cleared.confusion_matrix, meta.confusion_matrix);
    }

    #[test]
    fn test_metadata_serde_skips_unset_fields() {
        let meta = AlignmentMetricMetadata::default();
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("recalculating_at").is_none());
        assert!(json.get("last_processed_positive_span_at").is_none());
    }
}
