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

//! Balanced example selection
//!
//! Positives are spans a human linked to the issue (the evaluator should
//! fail them); negatives are human-reviewed spans of the same document
//! without that issue (it should pass them), including spans of other issues
//! and spans explicitly marked good. The negative fetch is bounded by the
//! positive count, and both sides are trimmed to equal length.

use std::sync::Arc;
use tracing::{debug, instrument};

use alignmeter_core::{EngineConfig, Issue, Scope, Span, SpanTraceRef};
use alignmeter_storage::SpanStore;

use crate::error::Result;
use crate::rebalance::rebalance;

/// Equal-length example lists for one issue.
#[derive(Debug, Clone, PartialEq)]
pub struct BalancedExamples {
    /// Spans carrying the issue.
    pub should_fail: Vec<SpanTraceRef>,
    /// Spans free of the issue.
    pub should_pass: Vec<SpanTraceRef>,
}

impl BalancedExamples {
    pub fn len(&self) -> usize {
        self.should_fail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.should_fail.is_empty()
    }
}

/// Selects balanced positive/negative example sets from the span store.
pub struct ExampleSelector {
    spans: Arc<dyn SpanStore>,
    config: EngineConfig,
}

impl ExampleSelector {
    pub fn new(spans: Arc<dyn SpanStore>, config: EngineConfig) -> Self {
        Self { spans, config }
    }

    /// Select up to `max_examples` positives and as many negatives, trimmed
    /// to equal length. Either query failing propagates; no partial result.
    #[instrument(skip(self), fields(workspace = scope.workspace_id, issue = issue.id))]
    pub async fn select(&self, scope: Scope, issue: &Issue) -> Result<BalancedExamples> {
        let positives = self
            .fetch_capped(self.config.max_examples, |page, page_size| {
                self.spans
                    .labeled_spans_by_issue(scope, issue.id, page, page_size)
            })
            .await?;

        let negatives = self
            .fetch_capped(positives.len(), |page, page_size| {
                self.spans.labeled_spans_by_document(
                    scope,
                    issue.document_uuid,
                    issue.id,
                    page,
                    page_size,
                )
            })
            .await?;

        let (positives, negatives) = rebalance(positives, negatives);
        debug!(
            target_length = positives.len(),
            "selected balanced examples"
        );

        Ok(BalancedExamples {
            should_fail: positives.iter().map(Span::to_ref).collect(),
            should_pass: negatives.iter().map(Span::to_ref).collect(),
        })
    }

    /// Walk pages until `cap` spans are collected or the query runs dry.
    async fn fetch_capped<F, Fut>(&self, cap: usize, fetch_page: F) -> Result<Vec<Span>>
    where
        F: Fn(usize, usize) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<Vec<Span>, alignmeter_storage::StorageError>>,
    {
        let mut collected = Vec::new();
        if cap == 0 {
            return Ok(collected);
        }

        let page_size = self.config.page_size.max(1);
        let mut page = 0;
        loop {
            let batch = fetch_page(page, page_size).await?;
            let short_page = batch.len() < page_size;
            collected.extend(batch);

            if collected.len() >= cap {
                collected.truncate(cap);
                break;
            }
            if short_page {
                break;
            }
            page += 1;
        }

        Ok(collected)
    }
}
