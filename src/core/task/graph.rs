use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use super::context::{TaskContext, TaskFailure};
use super::progress::{Progress, TaskEvent, TaskEventKind};
use super::{FailurePolicy, Significance, Task};
use crate::core::error::{LauncherError, LauncherResult};

const EVENT_CAPACITY: usize = 1024;

type Outcome = Result<(), Arc<LauncherError>>;

/// Opaque node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Execution state of one node.
#[derive(Debug, Clone)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed(Arc<LauncherError>),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed(_))
    }

    fn outcome(&self) -> Option<Outcome> {
        match self {
            TaskStatus::Succeeded => Some(Ok(())),
            TaskStatus::Failed(e) => Some(Err(e.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeKind {
    Dependency,
    Dependent,
}

struct NodeState {
    status: watch::Sender<TaskStatus>,
    progress: Arc<Progress>,
    result: Option<Arc<dyn Any + Send + Sync>>,
}

#[derive(Default)]
struct Edges {
    dependencies: Vec<TaskId>,
    dependents: Vec<TaskId>,
}

impl Edges {
    fn of(&self, kind: EdgeKind) -> &Vec<TaskId> {
        match kind {
            EdgeKind::Dependency => &self.dependencies,
            EdgeKind::Dependent => &self.dependents,
        }
    }

    fn of_mut(&mut self, kind: EdgeKind) -> &mut Vec<TaskId> {
        match kind {
            EdgeKind::Dependency => &mut self.dependencies,
            EdgeKind::Dependent => &mut self.dependents,
        }
    }
}

/// Node descriptors never change once inserted; edges and states do.
#[derive(Default)]
struct Tables {
    descriptors: HashMap<TaskId, Arc<dyn Task>>,
    edges: HashMap<TaskId, Edges>,
    states: HashMap<TaskId, NodeState>,
}

impl Tables {
    fn name(&self, id: TaskId) -> String {
        self.descriptors
            .get(&id)
            .map(|task| task.name())
            .unwrap_or_else(|| id.to_string())
    }

    /// Whether `target` is reachable from `from` through any edge.
    fn reaches(&self, from: TaskId, target: TaskId) -> bool {
        let mut stack = vec![from];
        let mut seen = Vec::new();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if seen.contains(&current) {
                continue;
            }
            seen.push(current);
            if let Some(edges) = self.edges.get(&current) {
                stack.extend(edges.dependencies.iter().copied());
                stack.extend(edges.dependents.iter().copied());
            }
        }
        false
    }
}

struct GraphInner {
    tables: Mutex<Tables>,
    next_id: AtomicU64,
    events: broadcast::Sender<TaskEvent>,
}

enum Claim {
    Run {
        task: Arc<dyn Task>,
        progress: Arc<Progress>,
    },
    Wait(watch::Receiver<TaskStatus>),
    Done(Outcome),
}

impl GraphInner {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert_locked(&self, tables: &mut Tables, task: Arc<dyn Task>) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (status, _) = watch::channel(TaskStatus::Pending);
        tables.descriptors.insert(id, task);
        tables.edges.insert(id, Edges::default());
        tables.states.insert(
            id,
            NodeState {
                status,
                progress: Arc::default(),
                result: None,
            },
        );
        id
    }

    fn link(&self, parent: TaskId, child: TaskId, kind: EdgeKind) -> LauncherResult<()> {
        let mut tables = self.tables();

        let (Some(parent_state), true) = (tables.states.get(&parent), tables.states.contains_key(&child))
        else {
            return Err(LauncherError::Other(format!(
                "Cannot link unknown tasks {} and {}",
                parent, child
            )));
        };

        if !matches!(*parent_state.status.borrow(), TaskStatus::Pending) {
            return Err(LauncherError::Other(format!(
                "Task {} has already started",
                tables.name(parent)
            )));
        }

        if parent == child || tables.reaches(child, parent) {
            return Err(LauncherError::TaskCycle {
                from: tables.name(parent),
                to: tables.name(child),
            });
        }

        if let Some(edges) = tables.edges.get_mut(&parent) {
            let list = edges.of_mut(kind);
            if !list.contains(&child) {
                list.push(child);
            }
        }
        Ok(())
    }

    /// Register freshly created children of a running node.
    fn attach(&self, parent: TaskId, tasks: Vec<Arc<dyn Task>>, kind: EdgeKind) {
        if tasks.is_empty() {
            return;
        }
        let mut tables = self.tables();
        for task in tasks {
            let child = self.insert_locked(&mut tables, task);
            if let Some(edges) = tables.edges.get_mut(&parent) {
                edges.of_mut(kind).push(child);
            }
        }
    }

    fn children(&self, id: TaskId, kind: EdgeKind) -> Vec<TaskId> {
        self.tables()
            .edges
            .get(&id)
            .map(|edges| edges.of(kind).clone())
            .unwrap_or_default()
    }

    fn describe(&self, id: TaskId) -> (String, Significance) {
        let tables = self.tables();
        let significance = tables
            .descriptors
            .get(&id)
            .map(|task| task.significance())
            .unwrap_or(Significance::Major);
        (tables.name(id), significance)
    }

    fn claim(&self, id: TaskId) -> Claim {
        let tables = self.tables();
        let (Some(task), Some(state)) = (tables.descriptors.get(&id), tables.states.get(&id)) else {
            return Claim::Done(Err(Arc::new(LauncherError::Other(format!(
                "Unknown task {}",
                id
            )))));
        };

        let current = state.status.borrow().clone();
        match current {
            TaskStatus::Pending => {
                state.status.send_replace(TaskStatus::Running);
                Claim::Run {
                    task: task.clone(),
                    progress: state.progress.clone(),
                }
            }
            TaskStatus::Running => Claim::Wait(state.status.subscribe()),
            TaskStatus::Succeeded => Claim::Done(Ok(())),
            TaskStatus::Failed(e) => Claim::Done(Err(e)),
        }
    }

    fn finish(
        &self,
        id: TaskId,
        name: &str,
        stage: &Option<String>,
        outcome: &Outcome,
        result: Option<Arc<dyn Any + Send + Sync>>,
    ) {
        {
            let mut tables = self.tables();
            if let Some(state) = tables.states.get_mut(&id) {
                state.result = result;
                state.status.send_replace(match outcome {
                    Ok(()) => TaskStatus::Succeeded,
                    Err(e) => TaskStatus::Failed(e.clone()),
                });
            }
        }

        let kind = match outcome {
            Ok(()) => TaskEventKind::Succeeded,
            Err(e) => TaskEventKind::Failed {
                message: e.to_string(),
            },
        };
        self.emit(id, name, stage, kind);
    }

    /// Used when a node's future died without publishing a terminal state.
    fn fail_if_running(&self, id: TaskId, error: Arc<LauncherError>) {
        let tables = self.tables();
        if let Some(state) = tables.states.get(&id) {
            let running = matches!(*state.status.borrow(), TaskStatus::Running);
            if running {
                state.status.send_replace(TaskStatus::Failed(error));
            }
        }
    }

    fn emit(&self, id: TaskId, name: &str, stage: &Option<String>, kind: TaskEventKind) {
        let _ = self.events.send(TaskEvent {
            id,
            task: name.to_string(),
            stage: stage.clone(),
            kind,
        });
    }
}

/// Dependency graph of tasks plus the execution state of every node.
///
/// Cloning is cheap; clones share the same tables.
#[derive(Clone)]
pub struct TaskGraph {
    inner: Arc<GraphInner>,
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGraph {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(GraphInner {
                tables: Mutex::new(Tables::default()),
                next_id: AtomicU64::new(0),
                events,
            }),
        }
    }

    pub fn add(&self, task: impl Task) -> TaskId {
        self.add_arc(Arc::new(task))
    }

    pub fn add_arc(&self, task: Arc<dyn Task>) -> TaskId {
        let mut tables = self.inner.tables();
        self.inner.insert_locked(&mut tables, task)
    }

    /// `child` must succeed before `parent`'s body runs.
    pub fn add_dependency(&self, parent: TaskId, child: TaskId) -> LauncherResult<()> {
        self.inner.link(parent, child, EdgeKind::Dependency)
    }

    /// `child` runs after `parent`'s body and before `parent` is done.
    pub fn add_dependent(&self, parent: TaskId, child: TaskId) -> LauncherResult<()> {
        self.inner.link(parent, child, EdgeKind::Dependent)
    }

    pub fn dependencies(&self, id: TaskId) -> Vec<TaskId> {
        self.inner.children(id, EdgeKind::Dependency)
    }

    pub fn dependents(&self, id: TaskId) -> Vec<TaskId> {
        self.inner.children(id, EdgeKind::Dependent)
    }

    pub fn name(&self, id: TaskId) -> String {
        self.inner.tables().name(id)
    }

    pub fn len(&self) -> usize {
        self.inner.tables().descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.inner
            .tables()
            .states
            .get(&id)
            .map(|state| state.status.borrow().clone())
    }

    /// `(completed, total)` of one node.
    pub fn progress(&self, id: TaskId) -> Option<(u64, u64)> {
        self.inner
            .tables()
            .states
            .get(&id)
            .map(|state| state.progress.snapshot())
    }

    pub fn result<T: Any + Send + Sync>(&self, id: TaskId) -> Option<Arc<T>> {
        let result = self.inner.tables().states.get(&id)?.result.clone()?;
        result.downcast::<T>().ok()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    /// Resolve once `id` reaches a terminal state.
    pub async fn wait(&self, id: TaskId) -> TaskStatus {
        let receiver = self
            .inner
            .tables()
            .states
            .get(&id)
            .map(|state| state.status.subscribe());
        let Some(mut receiver) = receiver else {
            return TaskStatus::Failed(Arc::new(LauncherError::Other(format!(
                "Unknown task {}",
                id
            ))));
        };
        let status = match receiver.wait_for(TaskStatus::is_terminal).await {
            Ok(status) => status.clone(),
            Err(_) => TaskStatus::Failed(Arc::new(LauncherError::Other(format!(
                "Task {} was dropped",
                id
            )))),
        };
        status
    }

    /// Execute `id` and everything it needs.
    ///
    /// A node that already reached a terminal state is not executed again;
    /// its recorded outcome is returned.
    pub async fn run(&self, id: TaskId) -> LauncherResult<()> {
        let name = self.name(id);
        run_node(self.inner.clone(), id)
            .await
            .map_err(|source| LauncherError::Task { task: name, source })
    }
}

async fn wait_terminal(receiver: &mut watch::Receiver<TaskStatus>) -> Outcome {
    let outcome = match receiver.wait_for(TaskStatus::is_terminal).await {
        Ok(status) => status.outcome(),
        Err(_) => None,
    };
    outcome.unwrap_or_else(|| Err(Arc::new(LauncherError::Other("Task was dropped".into()))))
}

/// The failure a node reports for its children.
///
/// A completion shortfall only wins when nothing worse happened, whatever
/// the order the children finished in.
fn decisive_failure(failures: &[TaskFailure]) -> Option<&TaskFailure> {
    failures
        .iter()
        .find(|failure| failure.error.completion_shortfall().is_none())
        .or_else(|| failures.first())
}

fn wrap_failure(failure: &TaskFailure) -> Arc<LauncherError> {
    Arc::new(LauncherError::Task {
        task: failure.task.clone(),
        source: failure.error.clone(),
    })
}

fn run_node(inner: Arc<GraphInner>, id: TaskId) -> BoxFuture<'static, Outcome> {
    Box::pin(async move {
        let (task, progress) = match inner.claim(id) {
            Claim::Run { task, progress } => (task, progress),
            Claim::Wait(mut receiver) => return wait_terminal(&mut receiver).await,
            Claim::Done(outcome) => return outcome,
        };

        let name = task.name();
        let stage = task.stage().map(str::to_string);
        inner.emit(id, &name, &stage, TaskEventKind::Started);

        let mut ctx = TaskContext::new(
            id,
            name.clone(),
            stage.clone(),
            progress,
            inner.events.clone(),
        );
        let mut first_error: Option<Arc<LauncherError>> = None;

        // ── pre-body + dependencies ──
        if let Err(e) = task.pre_execute(&mut ctx).await {
            first_error = Some(Arc::new(e));
        }
        inner.attach(
            id,
            std::mem::take(&mut ctx.new_dependencies),
            EdgeKind::Dependency,
        );

        if first_error.is_none() {
            let dependencies = inner.children(id, EdgeKind::Dependency);
            let failures = run_children(&inner, &ctx, dependencies).await;
            if let Some(failure) = decisive_failure(&failures) {
                if task.dependency_policy() == FailurePolicy::Propagate {
                    first_error = Some(wrap_failure(failure));
                }
            }
            ctx.dependency_failures = failures;
        }

        // ── body ──
        if first_error.is_none() {
            if let Err(e) = task.execute(&mut ctx).await {
                first_error = Some(Arc::new(e));
            }
        }

        // ── dependents ──
        if first_error.is_none() {
            let late = std::mem::take(&mut ctx.new_dependencies);
            if !late.is_empty() {
                warn!(
                    "Task {} added {} dependencies after its body; running them as dependents",
                    name,
                    late.len()
                );
            }
            let spawned = std::mem::take(&mut ctx.new_dependents);
            inner.attach(
                id,
                late.into_iter().chain(spawned).collect(),
                EdgeKind::Dependent,
            );

            let dependents = inner.children(id, EdgeKind::Dependent);
            let failures = run_children(&inner, &ctx, dependents).await;
            if let Some(failure) = decisive_failure(&failures) {
                if task.dependent_policy() == FailurePolicy::Propagate {
                    first_error = Some(wrap_failure(failure));
                }
            }
            ctx.dependent_failures = failures;
        }

        // ── post-body ──
        if first_error.is_none() || task.post_execute_on_failure() {
            ctx.error = first_error.clone();
            if let Err(e) = task.post_execute(&mut ctx).await {
                match first_error {
                    None => first_error = Some(Arc::new(e)),
                    Some(_) => debug!("Post-step of {} also failed: {}", name, e),
                }
            }
        }

        let outcome = match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        };
        task.on_done(&outcome).await;
        inner.finish(id, &name, &stage, &outcome, ctx.result.take());
        outcome
    })
}

/// Run children concurrently and collect the failures that matter.
///
/// A node that announced a total counts one unit per finished child.
async fn run_children(
    inner: &Arc<GraphInner>,
    ctx: &TaskContext,
    children: Vec<TaskId>,
) -> Vec<TaskFailure> {
    let mut running: FuturesUnordered<_> = children
        .into_iter()
        .map(|child| {
            let handle = tokio::spawn(run_node(inner.clone(), child));
            async move { (child, handle.await) }
        })
        .collect();

    let mut failures = Vec::new();
    while let Some((child, joined)) = running.next().await {
        if ctx.progress().total() > 0 {
            ctx.advance(1);
            ctx.notify_progress();
        }

        let error = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(join_error) => {
                let error = Arc::new(LauncherError::Other(format!(
                    "Task {} panicked: {}",
                    child, join_error
                )));
                inner.fail_if_running(child, error.clone());
                error
            }
        };

        let (task, significance) = inner.describe(child);
        if !significance.is_fatal() {
            warn!("Ignoring failure of minor task {}: {}", task, error);
            continue;
        }
        failures.push(TaskFailure {
            id: child,
            task,
            error,
        });
    }
    failures
}
