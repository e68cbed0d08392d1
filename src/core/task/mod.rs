// ─── Task Graph ───
// Two-phase task engine. A node's dependencies finish before its body runs;
// the dependents its body spawns finish before its post-step.

pub mod context;
pub mod graph;
pub mod progress;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::{LauncherError, LauncherResult};

pub use context::{TaskContext, TaskFailure};
pub use graph::{TaskGraph, TaskId, TaskStatus};
pub use progress::{Progress, ProgressObserver, TaskEvent, TaskEventKind};

/// How much a node's failure matters to whoever waits on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Significance {
    #[default]
    Major,
    Moderate,
    /// Cosmetic: a failure is logged and otherwise ignored.
    Minor,
}

impl Significance {
    pub fn is_fatal(self) -> bool {
        !matches!(self, Significance::Minor)
    }
}

/// What a node does when one of its children fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The node fails with the child's error.
    #[default]
    Propagate,
    /// The node keeps going; the post-step sees the failures.
    Tolerate,
}

/// A unit of work in a [`TaskGraph`].
///
/// Every phase has a no-op default, so a task implements only what it needs.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    fn name(&self) -> String;

    /// Coarse grouping used for progress reporting.
    fn stage(&self) -> Option<&str> {
        None
    }

    fn significance(&self) -> Significance {
        Significance::Major
    }

    fn dependency_policy(&self) -> FailurePolicy {
        FailurePolicy::Propagate
    }

    fn dependent_policy(&self) -> FailurePolicy {
        FailurePolicy::Propagate
    }

    /// Runs first; may queue dependencies with [`TaskContext::add_dependency`].
    async fn pre_execute(&self, _ctx: &mut TaskContext) -> LauncherResult<()> {
        Ok(())
    }

    /// The body. May queue dependents with [`TaskContext::add_dependent`].
    async fn execute(&self, _ctx: &mut TaskContext) -> LauncherResult<()> {
        Ok(())
    }

    /// Whether `post_execute` still runs after an earlier phase failed.
    fn post_execute_on_failure(&self) -> bool {
        false
    }

    async fn post_execute(&self, _ctx: &mut TaskContext) -> LauncherResult<()> {
        Ok(())
    }

    /// Last hook before the terminal status becomes visible to waiters.
    async fn on_done(&self, _outcome: &Result<(), Arc<LauncherError>>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn log_entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    struct Step {
        name: String,
        log: Log,
        fail: bool,
        significance: Significance,
    }

    impl Step {
        fn new(name: &str, log: &Log) -> Self {
            Self {
                name: name.to_string(),
                log: log.clone(),
                fail: false,
                significance: Significance::Major,
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn minor(mut self) -> Self {
            self.significance = Significance::Minor;
            self
        }
    }

    #[async_trait]
    impl Task for Step {
        fn name(&self) -> String {
            self.name.clone()
        }

        fn significance(&self) -> Significance {
            self.significance
        }

        async fn execute(&self, _ctx: &mut TaskContext) -> LauncherResult<()> {
            self.log.lock().unwrap().push(self.name.clone());
            if self.fail {
                return Err(LauncherError::Other(format!("{} broke", self.name)));
            }
            Ok(())
        }
    }

    /// Adds one dependency up front and one dependent from its body.
    struct Parent {
        log: Log,
        tolerate: bool,
        failing_child: bool,
    }

    #[async_trait]
    impl Task for Parent {
        fn name(&self) -> String {
            "parent".into()
        }

        fn dependent_policy(&self) -> FailurePolicy {
            if self.tolerate {
                FailurePolicy::Tolerate
            } else {
                FailurePolicy::Propagate
            }
        }

        async fn pre_execute(&self, ctx: &mut TaskContext) -> LauncherResult<()> {
            ctx.add_dependency(Step::new("dependency", &self.log));
            Ok(())
        }

        async fn execute(&self, ctx: &mut TaskContext) -> LauncherResult<()> {
            self.log.lock().unwrap().push("body".into());
            let child = Step::new("dependent", &self.log);
            if self.failing_child {
                ctx.add_dependent(child.failing());
            } else {
                ctx.add_dependent(child);
            }
            Ok(())
        }

        async fn post_execute(&self, ctx: &mut TaskContext) -> LauncherResult<()> {
            self.log.lock().unwrap().push("post".into());
            if !ctx.children_succeeded() {
                return Err(LauncherError::Other("children failed".into()));
            }
            ctx.set_result(42u32);
            Ok(())
        }
    }

    #[tokio::test]
    async fn phases_run_in_order() {
        let log = Log::default();
        let graph = TaskGraph::new();
        let root = graph.add(Parent {
            log: log.clone(),
            tolerate: false,
            failing_child: false,
        });

        graph.run(root).await.unwrap();

        assert_eq!(
            log_entries(&log),
            vec!["dependency", "body", "dependent", "post"]
        );
        assert!(matches!(graph.status(root), Some(TaskStatus::Succeeded)));
        assert_eq!(graph.result::<u32>(root).as_deref(), Some(&42));
        // No total was announced, so finished children are not counted.
        assert_eq!(graph.progress(root), Some((0, 0)));
    }

    /// Ends after `delay_ms` with the error `outcome` yields, if any.
    struct Timed {
        name: &'static str,
        delay_ms: u64,
        outcome: fn() -> Option<LauncherError>,
    }

    #[async_trait]
    impl Task for Timed {
        fn name(&self) -> String {
            self.name.into()
        }

        async fn execute(&self, _ctx: &mut TaskContext) -> LauncherResult<()> {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            match (self.outcome)() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }
    }

    /// Spawns `children` as dependents, announcing a total when `counted`.
    struct Fanout {
        children: Mutex<Vec<Timed>>,
        counted: bool,
    }

    #[async_trait]
    impl Task for Fanout {
        fn name(&self) -> String {
            "fanout".into()
        }

        async fn execute(&self, ctx: &mut TaskContext) -> LauncherResult<()> {
            let children = std::mem::take(&mut *self.children.lock().unwrap());
            if self.counted {
                ctx.set_total(children.len() as u64);
            }
            for child in children {
                ctx.add_dependent(child);
            }
            Ok(())
        }
    }

    fn succeeds() -> Option<LauncherError> {
        None
    }

    fn disk_on_fire() -> Option<LauncherError> {
        Some(LauncherError::Other("disk on fire".into()))
    }

    fn files_missing() -> Option<LauncherError> {
        Some(LauncherError::Completion(
            crate::core::error::CompletionShortfall::Incomplete,
        ))
    }

    #[tokio::test]
    async fn hard_failure_outranks_earlier_shortfall() {
        let graph = TaskGraph::new();
        let root = graph.add(Fanout {
            children: Mutex::new(vec![
                Timed {
                    name: "broken",
                    delay_ms: 50,
                    outcome: disk_on_fire,
                },
                Timed {
                    name: "partial",
                    delay_ms: 0,
                    outcome: files_missing,
                },
            ]),
            counted: false,
        });

        let err = graph.run(root).await.unwrap_err();

        assert!(err.completion_shortfall().is_none());
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn announced_total_counts_finished_children() {
        let graph = TaskGraph::new();
        let root = graph.add(Fanout {
            children: Mutex::new(vec![
                Timed {
                    name: "one",
                    delay_ms: 0,
                    outcome: succeeds,
                },
                Timed {
                    name: "two",
                    delay_ms: 5,
                    outcome: succeeds,
                },
            ]),
            counted: true,
        });

        graph.run(root).await.unwrap();
        assert_eq!(graph.progress(root), Some((2, 2)));
    }

    #[tokio::test]
    async fn failed_dependency_skips_body() {
        let log = Log::default();
        let graph = TaskGraph::new();
        let root = graph.add(Step::new("root", &log));
        let dep = graph.add(Step::new("dep", &log).failing());
        graph.add_dependency(root, dep).unwrap();

        let err = graph.run(root).await.unwrap_err();

        assert_eq!(log_entries(&log), vec!["dep"]);
        assert!(err.to_string().contains("dep broke"));
        assert!(matches!(graph.status(root), Some(TaskStatus::Failed(_))));
    }

    #[tokio::test]
    async fn propagated_dependent_failure_skips_post_step() {
        let log = Log::default();
        let graph = TaskGraph::new();
        let root = graph.add(Parent {
            log: log.clone(),
            tolerate: false,
            failing_child: true,
        });

        assert!(graph.run(root).await.is_err());
        assert_eq!(log_entries(&log), vec!["dependency", "body", "dependent"]);
    }

    #[tokio::test]
    async fn tolerated_failure_reaches_post_step() {
        let log = Log::default();
        let graph = TaskGraph::new();
        let root = graph.add(Parent {
            log: log.clone(),
            tolerate: true,
            failing_child: true,
        });

        let err = graph.run(root).await.unwrap_err();

        assert!(err.to_string().contains("children failed"));
        assert_eq!(log_entries(&log).last().map(String::as_str), Some("post"));
    }

    #[tokio::test]
    async fn minor_failure_is_ignored() {
        let log = Log::default();
        let graph = TaskGraph::new();
        let root = graph.add(Step::new("root", &log));
        let cosmetic = graph.add(Step::new("cosmetic", &log).minor().failing());
        graph.add_dependency(root, cosmetic).unwrap();

        graph.run(root).await.unwrap();
        assert_eq!(log_entries(&log), vec!["cosmetic", "root"]);
    }

    struct Counter {
        name: &'static str,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Task for Counter {
        fn name(&self) -> String {
            self.name.into()
        }

        async fn execute(&self, _ctx: &mut TaskContext) -> LauncherResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn shared_dependency_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = |name| Counter {
            name,
            runs: runs.clone(),
        };
        let graph = TaskGraph::new();
        let root = graph.add(counter("root"));
        let left = graph.add(counter("left"));
        let right = graph.add(counter("right"));
        let shared = graph.add(counter("shared"));
        graph.add_dependency(root, left).unwrap();
        graph.add_dependency(root, right).unwrap();
        graph.add_dependency(left, shared).unwrap();
        graph.add_dependency(right, shared).unwrap();

        graph.run(root).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 4);

        // Terminal nodes are not executed again.
        graph.run(root).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn cycles_are_rejected() {
        let runs = Arc::new(AtomicUsize::new(0));
        let graph = TaskGraph::new();
        let a = graph.add(Counter {
            name: "a",
            runs: runs.clone(),
        });
        let b = graph.add(Counter {
            name: "b",
            runs: runs.clone(),
        });
        graph.add_dependency(a, b).unwrap();

        let err = graph.add_dependent(b, a).unwrap_err();
        assert!(matches!(err, LauncherError::TaskCycle { .. }));
        assert!(graph.add_dependency(a, a).is_err());
    }

    struct Rollback {
        seen: Arc<Mutex<Option<bool>>>,
    }

    #[async_trait]
    impl Task for Rollback {
        fn name(&self) -> String {
            "rollback".into()
        }

        async fn execute(&self, _ctx: &mut TaskContext) -> LauncherResult<()> {
            Err(LauncherError::Other("nope".into()))
        }

        async fn on_done(&self, outcome: &Result<(), Arc<LauncherError>>) {
            *self.seen.lock().unwrap() = Some(outcome.is_ok());
        }
    }

    #[tokio::test]
    async fn on_done_runs_before_status_is_published() {
        let seen = Arc::new(Mutex::new(None));
        let graph = TaskGraph::new();
        let id = graph.add(Rollback { seen: seen.clone() });

        let waiter = {
            let graph = graph.clone();
            let seen = seen.clone();
            tokio::spawn(async move {
                let status = graph.wait(id).await;
                (status, *seen.lock().unwrap())
            })
        };

        assert!(graph.run(id).await.is_err());
        let (status, observed) = waiter.await.unwrap();
        assert!(matches!(status, TaskStatus::Failed(_)));
        assert_eq!(observed, Some(false));
    }

    #[tokio::test]
    async fn events_are_broadcast() {
        let log = Log::default();
        let graph = TaskGraph::new();
        let mut events = graph.subscribe();
        let id = graph.add(Step::new("solo", &log));

        graph.run(id).await.unwrap();

        let first = events.recv().await.unwrap();
        assert_eq!(first.kind, TaskEventKind::Started);
        let last = events.recv().await.unwrap();
        assert_eq!(last.kind, TaskEventKind::Succeeded);
        assert_eq!(last.task, "solo");
    }
}
