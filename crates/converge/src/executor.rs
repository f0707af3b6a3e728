//! Execution engine - runs tasks in dependency order with a per-task deadline
//!
//! The coordinator stays on the calling thread. Every eligible task gets a
//! worker thread that reports back over a channel; the coordinator waits on
//! that channel until the earliest running deadline. A task that misses its
//! deadline is failed and its worker is left to finish on its own.

use crate::context::Context;
use crate::error::{Error, Result, RunFailure, TaskFailure};
use crate::task::{Task, TaskMap};
use crate::types::{RunOptions, RunSummary, TaskRecord};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Instant;

type Outcome = std::result::Result<anyhow::Result<()>, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Pending,
    /// `deadline` is `None` when the budget does not fit in an `Instant`
    Running {
        started: Instant,
        deadline: Option<Instant>,
    },
    Done,
    Failed,
    Skipped,
}

/// Runs one task set; consumed by [`Executor::run`]
pub struct Executor {
    context: Context,
    options: RunOptions,
}

impl Executor {
    pub fn new(context: Context, options: RunOptions) -> Self {
        Self { context, options }
    }

    /// Run every task, draining all non-skipped tasks before returning
    ///
    /// Fails before starting anything if a dependency is unknown or the
    /// graph has a cycle. Otherwise every task-level failure is collected
    /// into [`Error::RunFailed`].
    pub fn run(self, tasks: &TaskMap) -> Result<RunSummary> {
        let graph = DependencyGraph::build(tasks)?;
        let run_started = Instant::now();
        let limit = self.options.max_task_duration;
        let jobs = self.options.jobs.unwrap_or(usize::MAX);

        let (tx, rx) = mpsc::channel::<(String, Outcome)>();
        let mut states: BTreeMap<&str, State> =
            graph.order.iter().map(|n| (n.as_str(), State::Pending)).collect();
        let mut failures: Vec<TaskFailure> = Vec::new();
        let mut completed: Vec<TaskRecord> = Vec::new();

        loop {
            // Topological order, so a skip reaches transitive dependents in one pass
            for name in &graph.order {
                if states[name.as_str()] != State::Pending {
                    continue;
                }
                let blocked = graph.dependencies[name]
                    .iter()
                    .find(|d| matches!(states[d.as_str()], State::Failed | State::Skipped));
                if let Some(dependency) = blocked {
                    log::warn!("Skipping task {name}: dependency {dependency} did not complete");
                    states.insert(name.as_str(), State::Skipped);
                    failures.push(TaskFailure {
                        task: name.clone(),
                        error: Error::SkippedDueToDependencyFailure {
                            task: name.clone(),
                            dependency: dependency.clone(),
                        },
                    });
                }
            }

            let mut running = states
                .values()
                .filter(|s| matches!(s, State::Running { .. }))
                .count();
            for name in &graph.order {
                if running >= jobs {
                    break;
                }
                if states[name.as_str()] != State::Pending {
                    continue;
                }
                let ready = graph.dependencies[name]
                    .iter()
                    .all(|d| states[d.as_str()] == State::Done);
                if !ready {
                    continue;
                }

                let started = Instant::now();
                match self.spawn(name, &tasks[name], tx.clone()) {
                    Ok(()) => {
                        states.insert(
                            name.as_str(),
                            State::Running {
                                started,
                                deadline: started.checked_add(limit),
                            },
                        );
                        running += 1;
                    }
                    Err(error) => {
                        states.insert(name.as_str(), State::Failed);
                        failures.push(TaskFailure {
                            task: name.clone(),
                            error,
                        });
                    }
                }
            }

            if running == 0 {
                break;
            }
            let next_deadline = states
                .values()
                .filter_map(|s| match s {
                    State::Running { deadline, .. } => *deadline,
                    _ => None,
                })
                .min();

            log::info!(
                "Tasks: {} done / {} total; {} running",
                completed.len(),
                graph.order.len(),
                running
            );

            let received = match next_deadline {
                Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((name, outcome)) => {
                    let Some(state) = states.get_mut(name.as_str()) else {
                        continue;
                    };
                    let State::Running { started, .. } = *state else {
                        log::debug!("discarding late result from task {name}");
                        continue;
                    };
                    match classify(&name, outcome) {
                        Ok(()) => {
                            log::debug!("task {name} completed");
                            *state = State::Done;
                            completed.push(TaskRecord {
                                name,
                                elapsed: started.elapsed(),
                            });
                        }
                        Err(error) => {
                            log::warn!("error running task {name}: {error}");
                            *state = State::Failed;
                            failures.push(TaskFailure { task: name, error });
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    for (name, state) in &mut states {
                        if let State::Running {
                            deadline: Some(deadline),
                            ..
                        } = *state
                            && deadline <= now
                        {
                            log::warn!("task {name} did not complete within {limit:?}");
                            *state = State::Failed;
                            failures.push(TaskFailure {
                                task: (*name).to_string(),
                                error: Error::TaskTimeout {
                                    task: (*name).to_string(),
                                    limit,
                                },
                            });
                        }
                    }
                }
                // The coordinator holds a sender, so this cannot happen
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if failures.is_empty() {
            return Ok(RunSummary {
                completed,
                elapsed: run_started.elapsed(),
            });
        }

        failures.sort_by(|a, b| a.task.cmp(&b.task));
        Err(RunFailure { failures }.into())
    }

    fn spawn(&self, name: &str, task: &Arc<dyn Task>, tx: Sender<(String, Outcome)>) -> Result<()> {
        let task = Arc::clone(task);
        let ctx = self.context.share();
        let key = name.to_string();

        log::debug!("starting task {name}");
        thread::Builder::new()
            .name(format!("task-{name}"))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run(&ctx)))
                    .map_err(|payload| panic_message(payload.as_ref()));
                // The coordinator is gone if the run already returned; nothing to report to
                let _ = tx.send((key, outcome));
            })
            .map(|_| ())
            .map_err(|source| Error::Task {
                task: name.to_string(),
                source: anyhow::Error::new(source).context("failed to spawn worker thread"),
            })
    }
}

fn classify(task: &str, outcome: Outcome) -> Result<()> {
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(match err.downcast::<Error>() {
            Ok(error) => error,
            Err(source) => Error::Task {
                task: task.to_string(),
                source,
            },
        }),
        Err(message) => Err(Error::TaskPanicked {
            task: task.to_string(),
            message,
        }),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Validated dependency structure of a task map
#[derive(Debug)]
pub struct DependencyGraph {
    /// Task names in a topological order (dependencies first, ties by name)
    pub order: Vec<String>,
    /// Deduplicated dependencies of each task
    pub dependencies: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Derive the graph from each task's declared dependencies
    pub fn build(tasks: &TaskMap) -> Result<Self> {
        let mut dependencies: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, task) in tasks {
            let deps: BTreeSet<String> = task.dependencies().into_iter().collect();
            if let Some(missing) = deps.iter().find(|d| !tasks.contains_key(*d)) {
                return Err(Error::UnknownDependency {
                    task: name.clone(),
                    dependency: missing.clone(),
                });
            }
            dependencies.insert(name.clone(), deps.into_iter().collect());
        }

        let mut remaining: HashMap<&str, usize> = dependencies
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (name, deps) in &dependencies {
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(name.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(dependencies.len());

        while let Some(name) = ready.pop_first() {
            order.push(name.to_string());
            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if order.len() < dependencies.len() {
            let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
            return Err(Error::DependencyCycle {
                tasks: find_cycle(&dependencies, &placed),
            });
        }

        Ok(Self {
            order,
            dependencies,
        })
    }
}

/// Walk unplaced dependencies until a task repeats; every unplaced task has one
fn find_cycle(dependencies: &BTreeMap<String, Vec<String>>, placed: &BTreeSet<&str>) -> Vec<String> {
    let Some(start) = dependencies.keys().find(|n| !placed.contains(n.as_str())) else {
        return Vec::new();
    };

    let mut path: Vec<&String> = vec![start];
    loop {
        let current = path[path.len() - 1];
        let Some(next) = dependencies[current]
            .iter()
            .find(|d| !placed.contains(d.as_str()))
        else {
            return path.into_iter().cloned().collect();
        };
        if let Some(pos) = path.iter().position(|n| *n == next) {
            return path[pos..].iter().map(|n| (*n).clone()).collect();
        }
        path.push(next);
    }
}
