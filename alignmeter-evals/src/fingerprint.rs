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

//! Configuration fingerprinting
//!
//! A stale fingerprint on an evaluation means its confusion matrix was
//! computed under different evaluator behavior and must be rebuilt from
//! scratch; a matching fingerprint permits the cheap incremental path.
//! Only decision-relevant fields participate — hashing display names or
//! timestamps would force pointless full recalculations.

use alignmeter_core::EvaluationConfig;

/// Deterministic content hash of the decision-relevant evaluator fields.
///
/// Fields are folded in a fixed canonical order, each framed by a tag and a
/// length prefix so that adjacent values can never alias
/// (`"ab" + "c"` vs `"a" + "bc"`).
pub fn fingerprint(config: &EvaluationConfig) -> String {
    let mut hasher = blake3::Hasher::new();

    let fields: [(&str, &str); 5] = [
        ("provider", &config.provider),
        ("model", &config.model),
        ("criteria", &config.criteria),
        ("pass_description", &config.pass_description),
        ("fail_description", &config.fail_description),
    ];

    for (tag, value) in fields {
        hasher.update(tag.as_bytes());
        hasher.update(&(value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }

    hex::encode(hasher.finalize().as_bytes())
}
