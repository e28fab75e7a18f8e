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

//! Balanced truncation of the two example sets.
//!
//! A lopsided example set would bias the confusion matrix toward whichever
//! side has more ground truth, so both the selector and the incremental
//! filter trim to the shorter length. Deterministic head truncation, no
//! sampling: the inputs arrive newest-first and the freshest examples win.

/// Trim both lists to `min(len(a), len(b))`, keeping heads.
pub fn rebalance<T>(mut a: Vec<T>, mut b: Vec<T>) -> (Vec<T>, Vec<T>) {
    let k = a.len().min(b.len());
    a.truncate(k);
    b.truncate(k);
    (a, b)
}
