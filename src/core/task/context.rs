use std::any::Any;
use std::sync::Arc;

use tokio::sync::broadcast;

use super::graph::TaskId;
use super::progress::{Progress, TaskEvent, TaskEventKind};
use super::Task;
use crate::core::error::LauncherError;

/// A failed child of a node, as seen by the node's post-step.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub id: TaskId,
    pub task: String,
    pub error: Arc<LauncherError>,
}

/// Handle given to a task while one of its phases runs.
///
/// Tasks add children, report progress and publish a result through it;
/// the graph turns what was collected into edges once the phase returns.
pub struct TaskContext {
    id: TaskId,
    name: String,
    stage: Option<String>,
    progress: Arc<Progress>,
    events: broadcast::Sender<TaskEvent>,
    pub(super) new_dependencies: Vec<Arc<dyn Task>>,
    pub(super) new_dependents: Vec<Arc<dyn Task>>,
    pub(super) result: Option<Arc<dyn Any + Send + Sync>>,
    pub(super) dependency_failures: Vec<TaskFailure>,
    pub(super) dependent_failures: Vec<TaskFailure>,
    pub(super) error: Option<Arc<LauncherError>>,
}

impl TaskContext {
    pub(super) fn new(
        id: TaskId,
        name: String,
        stage: Option<String>,
        progress: Arc<Progress>,
        events: broadcast::Sender<TaskEvent>,
    ) -> Self {
        Self {
            id,
            name,
            stage,
            progress,
            events,
            new_dependencies: Vec::new(),
            new_dependents: Vec::new(),
            result: None,
            dependency_failures: Vec::new(),
            dependent_failures: Vec::new(),
            error: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Queue a task that must succeed before this node's body runs.
    ///
    /// Only meaningful from `pre_execute`.
    pub fn add_dependency(&mut self, task: impl Task) {
        self.new_dependencies.push(Arc::new(task));
    }

    /// Queue a task awaited after this node's body and before its post-step.
    pub fn add_dependent(&mut self, task: impl Task) {
        self.new_dependents.push(Arc::new(task));
    }

    pub fn add_dependent_arc(&mut self, task: Arc<dyn Task>) {
        self.new_dependents.push(task);
    }

    pub fn pending_dependents(&self) -> usize {
        self.new_dependents.len()
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn set_total(&self, total: u64) {
        self.progress.set_total(total);
        self.notify_progress();
    }

    pub fn advance(&self, amount: u64) {
        self.progress.advance(amount);
    }

    /// Publish the current counters to observers.
    pub fn notify_progress(&self) {
        let (completed, total) = self.progress.snapshot();
        let _ = self.events.send(TaskEvent {
            id: self.id,
            task: self.name.clone(),
            stage: self.stage.clone(),
            kind: TaskEventKind::Progress { completed, total },
        });
    }

    pub fn set_result<T: Any + Send + Sync>(&mut self, value: T) {
        self.result = Some(Arc::new(value));
    }

    /// Fatal failures among this node's dependencies.
    pub fn dependency_failures(&self) -> &[TaskFailure] {
        &self.dependency_failures
    }

    /// Fatal failures among the dependents spawned by the body.
    pub fn dependent_failures(&self) -> &[TaskFailure] {
        &self.dependent_failures
    }

    /// `true` when no dependency or dependent failed.
    pub fn children_succeeded(&self) -> bool {
        self.dependency_failures.is_empty() && self.dependent_failures.is_empty()
    }

    /// First error recorded so far, visible to a post-step that runs on failure.
    pub fn error(&self) -> Option<&Arc<LauncherError>> {
        self.error.as_ref()
    }
}
