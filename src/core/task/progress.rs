use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::graph::{TaskGraph, TaskId};

/// Completed/total counter pair of one node.
///
/// Both counters only ever grow; `set_total` keeps the larger value.
#[derive(Debug, Default)]
pub struct Progress {
    completed: AtomicU64,
    total: AtomicU64,
}

impl Progress {
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    pub fn set_total(&self, total: u64) {
        self.total.fetch_max(total, Ordering::AcqRel);
    }

    pub fn advance(&self, amount: u64) {
        self.completed.fetch_add(amount, Ordering::AcqRel);
    }

    /// Raise `completed` to `value`; a smaller value is ignored.
    pub fn advance_to(&self, value: u64) {
        self.completed.fetch_max(value, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> (u64, u64) {
        (self.completed(), self.total())
    }
}

/// Something observable happened to a node.
#[derive(Debug, Clone)]
pub struct TaskEvent {
    pub id: TaskId,
    pub task: String,
    pub stage: Option<String>,
    pub kind: TaskEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEventKind {
    Started,
    Progress { completed: u64, total: u64 },
    Succeeded,
    Failed { message: String },
}

/// Logs every graph event through `tracing`.
///
/// Runs on its own tokio task and stops once the graph is dropped.
pub struct ProgressObserver;

impl ProgressObserver {
    pub fn spawn(graph: &TaskGraph) -> JoinHandle<()> {
        let mut rx = graph.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => log_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Progress observer skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

fn log_event(event: &TaskEvent) {
    let stage = event.stage.as_deref().unwrap_or("-");
    match &event.kind {
        TaskEventKind::Started => debug!("[{}] {} started", stage, event.task),
        TaskEventKind::Progress { completed, total } => {
            if *total > 0 {
                info!("[{}] {}: {}/{}", stage, event.task, completed, total);
            }
        }
        TaskEventKind::Succeeded => debug!("[{}] {} finished", stage, event.task),
        TaskEventKind::Failed { message } => {
            warn!("[{}] {} failed: {}", stage, event.task, message)
        }
    }
}
