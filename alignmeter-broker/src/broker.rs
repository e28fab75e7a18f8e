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

//! Flow execution: dependency counting, retries, and the join barrier.
//!
//! Children run concurrently on the tokio runtime, each with its own retry
//! budget. A per-flow atomic counter tracks unsettled children; the task that
//! settles the last child invokes the parent continuation. No locks are held
//! across awaits.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::BrokerError;
use crate::flow::{ChildResult, DependencyCounts, FlowHandle, FlowSpec, FlowStatus};
use crate::job::{JobContext, JobHandler, JobId, JobSpec, JobStatus};

struct JobRecord {
    spec: JobSpec,
    status: JobStatus,
    result: Option<serde_json::Value>,
    error: Option<String>,
}

struct FlowState {
    handle: FlowHandle,
    /// Children this flow owns and executes (deduplicated ids excluded).
    owned_children: Vec<JobId>,
    /// Children whose id was already live under another flow.
    ignored_children: Vec<JobId>,
    remaining: AtomicUsize,
    status_tx: watch::Sender<FlowStatus>,
    status_rx: watch::Receiver<FlowStatus>,
}

struct Inner {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
    jobs: DashMap<JobId, JobRecord>,
    flows: DashMap<JobId, Arc<FlowState>>,
}

/// In-process job broker with flow (parent/children) support.
///
/// Cheap to clone; all clones share the same job index and handler registry.
#[derive(Clone)]
pub struct FlowBroker {
    inner: Arc<Inner>,
}

impl Default for FlowBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                handlers: RwLock::new(HashMap::new()),
                jobs: DashMap::new(),
                flows: DashMap::new(),
            }),
        }
    }

    /// Register a handler for its job kind. Later registrations win.
    pub fn register(&self, handler: Arc<dyn JobHandler>) {
        let kind = handler.kind().to_string();
        self.inner.handlers.write().insert(kind, handler);
    }

    /// Submit a parent job plus its children.
    ///
    /// Idempotent: while a flow with the same parent id is still running, the
    /// existing handle is returned and nothing new is scheduled. Child ids
    /// already live under another flow are recorded as ignored rather than
    /// executed twice.
    pub fn submit_flow(&self, flow: FlowSpec) -> Result<FlowHandle, BrokerError> {
        if flow.parent.id.is_empty() || flow.children.iter().any(|c| c.id.is_empty()) {
            return Err(BrokerError::EmptyJobId);
        }
        {
            let handlers = self.inner.handlers.read();
            for spec in std::iter::once(&flow.parent).chain(flow.children.iter()) {
                if !handlers.contains_key(&spec.kind) {
                    return Err(BrokerError::NoHandler(spec.kind.clone()));
                }
            }
        }

        let parent_id = flow.parent.id.clone();

        // Duplicate submission collapses to the in-flight flow.
        if let Some(existing) = self.inner.flows.get(&parent_id) {
            if *existing.status_rx.borrow() == FlowStatus::Running {
                debug!(flow = %parent_id, "flow already in flight, collapsing submission");
                return Ok(existing.handle.clone());
            }
            drop(existing);
            self.evict_flow(&parent_id);
        }

        let child_ids: Vec<JobId> = flow.children.iter().map(|c| c.id.clone()).collect();
        let handle = FlowHandle {
            parent_job_id: parent_id.clone(),
            child_job_ids: child_ids,
        };

        self.inner.jobs.insert(
            parent_id.clone(),
            JobRecord {
                spec: flow.parent,
                status: JobStatus::Pending,
                result: None,
                error: None,
            },
        );

        let mut owned = Vec::new();
        let mut ignored = Vec::new();
        for child in flow.children {
            if self.inner.jobs.contains_key(&child.id) {
                ignored.push(child.id);
                continue;
            }
            owned.push(child.id.clone());
            self.inner.jobs.insert(
                child.id.clone(),
                JobRecord {
                    spec: child,
                    status: JobStatus::Pending,
                    result: None,
                    error: None,
                },
            );
        }

        let (status_tx, status_rx) = watch::channel(FlowStatus::Running);
        let state = Arc::new(FlowState {
            handle: handle.clone(),
            remaining: AtomicUsize::new(owned.len()),
            owned_children: owned.clone(),
            ignored_children: ignored,
            status_tx,
            status_rx,
        });
        self.inner.flows.insert(parent_id.clone(), state.clone());

        info!(
            flow = %parent_id,
            children = state.owned_children.len(),
            ignored = state.ignored_children.len(),
            "flow accepted"
        );

        if owned.is_empty() {
            let inner = self.inner.clone();
            let flow_id = parent_id;
            tokio::spawn(async move { run_parent(inner, flow_id).await });
        } else {
            for child_id in owned {
                let inner = self.inner.clone();
                let flow_id = parent_id.clone();
                tokio::spawn(async move { run_child(inner, flow_id, child_id).await });
            }
        }

        Ok(handle)
    }

    /// Block until the flow reaches a terminal status.
    pub async fn wait_for_flow(&self, parent_id: &str) -> Result<FlowStatus, BrokerError> {
        let mut rx = {
            let state = self
                .inner
                .flows
                .get(parent_id)
                .ok_or_else(|| BrokerError::JobNotFound(parent_id.to_string()))?;
            state.status_rx.clone()
        };

        loop {
            let status = *rx.borrow();
            if status != FlowStatus::Running {
                return Ok(status);
            }
            if rx.changed().await.is_err() {
                return Ok(*rx.borrow());
            }
        }
    }

    pub fn flow_status(&self, parent_id: &str) -> Result<FlowStatus, BrokerError> {
        self.inner
            .flows
            .get(parent_id)
            .map(|state| *state.status_rx.borrow())
            .ok_or_else(|| BrokerError::JobNotFound(parent_id.to_string()))
    }

    pub fn flow_handle(&self, parent_id: &str) -> Result<FlowHandle, BrokerError> {
        self.inner
            .flows
            .get(parent_id)
            .map(|state| state.handle.clone())
            .ok_or_else(|| BrokerError::JobNotFound(parent_id.to_string()))
    }

    pub fn job_status(&self, job_id: &str) -> Result<JobStatus, BrokerError> {
        self.inner
            .jobs
            .get(job_id)
            .map(|record| record.status)
            .ok_or_else(|| BrokerError::JobNotFound(job_id.to_string()))
    }

    pub fn job_result(&self, job_id: &str) -> Result<Option<serde_json::Value>, BrokerError> {
        self.inner
            .jobs
            .get(job_id)
            .map(|record| record.result.clone())
            .ok_or_else(|| BrokerError::JobNotFound(job_id.to_string()))
    }

    pub fn job_error(&self, job_id: &str) -> Result<Option<String>, BrokerError> {
        self.inner
            .jobs
            .get(job_id)
            .map(|record| record.error.clone())
            .ok_or_else(|| BrokerError::JobNotFound(job_id.to_string()))
    }

    fn evict_flow(&self, parent_id: &str) {
        if let Some((_, state)) = self.inner.flows.remove(parent_id) {
            self.inner.jobs.remove(parent_id);
            for child_id in &state.owned_children {
                self.inner.jobs.remove(child_id);
            }
        }
    }
}

fn handler_for(inner: &Inner, kind: &str) -> Option<Arc<dyn JobHandler>> {
    inner.handlers.read().get(kind).cloned()
}

fn set_status(inner: &Inner, job_id: &str, status: JobStatus) {
    if let Some(mut record) = inner.jobs.get_mut(job_id) {
        record.status = status;
    }
}

fn flow_state(inner: &Inner, flow_id: &str) -> Option<Arc<FlowState>> {
    inner.flows.get(flow_id).map(|s| s.clone())
}

async fn run_child(inner: Arc<Inner>, flow_id: JobId, child_id: JobId) {
    let (kind, data, options) = match inner.jobs.get(&child_id) {
        Some(record) => (
            record.spec.kind.clone(),
            record.spec.data.clone(),
            record.spec.options,
        ),
        None => return,
    };

    let handler = match handler_for(&inner, &kind) {
        Some(h) => h,
        None => {
            // Unreachable after submission validation, but stay consistent
            // with the child's declared failure semantics.
            set_status(&inner, &child_id, JobStatus::Failed);
            settle_child(inner, flow_id, child_id, !options.continue_parent_on_failure).await;
            return;
        }
    };

    set_status(&inner, &child_id, JobStatus::Active);

    let max_attempts = options.attempts.max(1);
    let mut failed = false;
    for attempt in 1..=max_attempts {
        let ctx = JobContext::new(child_id.clone(), data.clone(), attempt, max_attempts);

        match handler.execute(ctx).await {
            Ok(value) => {
                if let Some(mut record) = inner.jobs.get_mut(&child_id) {
                    record.status = JobStatus::Completed;
                    record.result = Some(value);
                }
                failed = false;
                break;
            }
            Err(err) => {
                warn!(job = %child_id, attempt, max_attempts, error = %err, "child job attempt failed");
                failed = true;
                if attempt < max_attempts {
                    tokio::time::sleep(options.backoff.delay_after(attempt)).await;
                } else if let Some(mut record) = inner.jobs.get_mut(&child_id) {
                    record.status = JobStatus::Failed;
                    record.error = Some(err.to_string());
                }
            }
        }
    }

    let abort_parent = failed && !options.continue_parent_on_failure;
    settle_child(inner, flow_id, child_id, abort_parent).await;
}

async fn settle_child(inner: Arc<Inner>, flow_id: JobId, child_id: JobId, abort_parent: bool) {
    let state = match flow_state(&inner, &flow_id) {
        Some(s) => s,
        None => return,
    };

    if abort_parent {
        warn!(flow = %flow_id, child = %child_id, "child failure aborts parent");
        if let Some(mut record) = inner.jobs.get_mut(&flow_id) {
            record.status = JobStatus::Failed;
            record.error = Some(format!("aborted by failed child {child_id}"));
        }
        let _ = state.status_tx.send(FlowStatus::Failed);
        return;
    }

    // The task that settles the last child runs the continuation.
    if state.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
        run_parent(inner, flow_id).await;
    }
}

async fn run_parent(inner: Arc<Inner>, flow_id: JobId) {
    let state = match flow_state(&inner, &flow_id) {
        Some(s) => s,
        None => return,
    };
    if *state.status_rx.borrow() != FlowStatus::Running {
        return;
    }

    let (kind, data, options) = match inner.jobs.get(&flow_id) {
        Some(record) => (
            record.spec.kind.clone(),
            record.spec.data.clone(),
            record.spec.options,
        ),
        None => return,
    };

    let handler = match handler_for(&inner, &kind) {
        Some(h) => h,
        None => {
            set_status(&inner, &flow_id, JobStatus::Failed);
            let _ = state.status_tx.send(FlowStatus::Failed);
            return;
        }
    };

    set_status(&inner, &flow_id, JobStatus::Active);

    let max_attempts = options.attempts.max(1);
    for attempt in 1..=max_attempts {
        let (counts, results) = collect_children(&inner, &state);
        let ctx = JobContext::new(flow_id.clone(), data.clone(), attempt, max_attempts)
            .with_children(counts, results);

        match handler.execute(ctx).await {
            Ok(value) => {
                if let Some(mut record) = inner.jobs.get_mut(&flow_id) {
                    record.status = JobStatus::Completed;
                    record.result = Some(value);
                }
                info!(flow = %flow_id, "flow completed");
                let _ = state.status_tx.send(FlowStatus::Completed);
                return;
            }
            Err(err) => {
                warn!(flow = %flow_id, attempt, max_attempts, error = %err, "parent job attempt failed");
                if attempt < max_attempts {
                    tokio::time::sleep(options.backoff.delay_after(attempt)).await;
                } else {
                    if let Some(mut record) = inner.jobs.get_mut(&flow_id) {
                        record.status = JobStatus::Failed;
                        record.error = Some(err.to_string());
                    }
                    let _ = state.status_tx.send(FlowStatus::Failed);
                }
            }
        }
    }
}

fn collect_children(inner: &Inner, state: &FlowState) -> (DependencyCounts, Vec<ChildResult>) {
    let mut counts = DependencyCounts {
        ignored: state.ignored_children.len(),
        ..Default::default()
    };
    let mut results = Vec::with_capacity(state.owned_children.len() + counts.ignored);

    for child_id in &state.owned_children {
        let Some(record) = inner.jobs.get(child_id) else {
            counts.unprocessed += 1;
            continue;
        };
        match record.status {
            JobStatus::Completed => {
                counts.processed += 1;
                results.push(ChildResult {
                    job_id: child_id.clone(),
                    status: JobStatus::Completed,
                    value: record.result.clone(),
                });
            }
            JobStatus::Failed => {
                counts.failed += 1;
                results.push(ChildResult {
                    job_id: child_id.clone(),
                    status: JobStatus::Failed,
                    value: None,
                });
            }
            JobStatus::Ignored => {
                counts.ignored += 1;
                results.push(ChildResult {
                    job_id: child_id.clone(),
                    status: JobStatus::Ignored,
                    value: None,
                });
            }
            JobStatus::Pending | JobStatus::Active => {
                counts.unprocessed += 1;
            }
        }
    }

    for child_id in &state.ignored_children {
        results.push(ChildResult {
            job_id: child_id.clone(),
            status: JobStatus::Ignored,
            value: None,
        });
    }

    (counts, results)
}
