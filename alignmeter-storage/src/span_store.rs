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

//! Labeled-span queries
//!
//! Ground truth must be human: both queries return only spans carrying a
//! human-in-the-loop judgment. Automated-only labels are filtered at this
//! boundary so no caller can accidentally score an evaluator against another
//! machine's opinion.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use alignmeter_core::{IssueId, Scope, Span};

use crate::error::StorageError;

/// Read-only access to human-labeled spans.
///
/// Pages are zero-based; implementations return spans newest-first.
#[async_trait]
pub trait SpanStore: Send + Sync {
    /// Human-labeled spans linked to the given issue.
    async fn labeled_spans_by_issue(
        &self,
        scope: Scope,
        issue_id: IssueId,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Span>, StorageError>;

    /// Human-labeled spans of one document that do NOT carry the given issue.
    /// Spans linked to other issues and spans explicitly marked good both
    /// qualify.
    async fn labeled_spans_by_document(
        &self,
        scope: Scope,
        document_uuid: Uuid,
        exclude_issue: IssueId,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Span>, StorageError>;
}

/// In-memory span store, newest-first per scope.
#[derive(Default)]
pub struct InMemorySpanStore {
    spans: DashMap<Scope, Vec<Span>>,
}

impl InMemorySpanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, scope: Scope, span: Span) {
        self.spans.entry(scope).or_default().push(span);
    }

    pub fn insert_many(&self, scope: Scope, spans: impl IntoIterator<Item = Span>) {
        self.spans.entry(scope).or_default().extend(spans);
    }

    fn query<F>(&self, scope: Scope, page: usize, page_size: usize, filter: F) -> Vec<Span>
    where
        F: Fn(&Span) -> bool,
    {
        let Some(spans) = self.spans.get(&scope) else {
            return Vec::new();
        };

        let mut matched: Vec<Span> = spans
            .iter()
            .filter(|s| s.label.is_human() && filter(s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        matched
            .into_iter()
            .skip(page * page_size)
            .take(page_size)
            .collect()
    }
}

#[async_trait]
impl SpanStore for InMemorySpanStore {
    async fn labeled_spans_by_issue(
        &self,
        scope: Scope,
        issue_id: IssueId,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Span>, StorageError> {
        let spans = self.query(scope, page, page_size, |s| s.label.issue_id == Some(issue_id));
        debug!(
            workspace = scope.workspace_id,
            issue = issue_id,
            page,
            count = spans.len(),
            "queried spans by issue"
        );
        Ok(spans)
    }

    async fn labeled_spans_by_document(
        &self,
        scope: Scope,
        document_uuid: Uuid,
        exclude_issue: IssueId,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Span>, StorageError> {
        let spans = self.query(scope, page, page_size, |s| {
            s.document_uuid == document_uuid && s.label.issue_id != Some(exclude_issue)
        });
        debug!(
            workspace = scope.workspace_id,
            document = %document_uuid,
            excluded_issue = exclude_issue,
            page,
            count = spans.len(),
            "queried spans by document"
        );
        Ok(spans)
    }
}
