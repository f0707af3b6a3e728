//! Error types for the converge engine

use crate::lifecycle::Lifecycle;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why a lifecycle policy rejected the observed object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// The policy requires the object to exist, and it does not
    NotFound,
    /// The policy requires the object to match, and it does not
    DidNotMatch,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("object was not found"),
            Self::DidNotMatch => f.write_str("object did not match"),
        }
    }
}

/// Errors that can occur while rendering or running tasks
#[derive(Error, Debug)]
pub enum Error {
    /// The expected object's lifecycle forbids the observed actual state
    #[error("{task}: lifecycle set to {lifecycle}, but {reason}")]
    LifecycleViolation {
        task: String,
        lifecycle: Lifecycle,
        reason: Violation,
    },

    /// No render routine declared for this task/target combination
    #[error("could not find Render method on type {task_type} (target {target})")]
    NoRenderer { task_type: String, target: String },

    /// More than one render routine declared for the same target
    #[error("found multiple Render methods that could be invoked on {task_type} (target {target})")]
    AmbiguousRenderer { task_type: String, target: String },

    /// The task dependency graph contains a cycle
    #[error("dependency cycle between tasks: {}", .tasks.join(" -> "))]
    DependencyCycle { tasks: Vec<String> },

    /// A task depends on a name that is not in the task map
    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    /// A task ran longer than the allowed duration
    #[error("task {task} did not complete within {limit:?}")]
    TaskTimeout { task: String, limit: Duration },

    /// A task panicked while running
    #[error("task {task} panicked: {message}")]
    TaskPanicked { task: String, message: String },

    /// A task was never started because a dependency failed
    #[error("task {task} skipped: dependency {dependency} did not complete")]
    SkippedDueToDependencyFailure { task: String, dependency: String },

    /// A task, its render routine or a collaborator returned an error
    #[error("error running task {task}: {source:#}")]
    Task {
        task: String,
        #[source]
        source: anyhow::Error,
    },

    /// A task value could not be serialized for comparison or recording
    #[error("unable to serialize {task_type}: {source}")]
    Serialize {
        task_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// Failed to create a scratch directory
    #[error("error creating temporary directory under {}: {source}", .parent.display())]
    ScratchDir {
        parent: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more tasks failed during a run
    #[error(transparent)]
    RunFailed(#[from] RunFailure),
}

impl Error {
    /// Whether this error means the task was never attempted
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::SkippedDueToDependencyFailure { .. })
    }

    /// Whether this error is a lifecycle violation
    pub fn is_lifecycle_violation(&self) -> bool {
        matches!(self, Self::LifecycleViolation { .. })
    }
}

/// A failure attributed to a single task
#[derive(Debug)]
pub struct TaskFailure {
    pub task: String,
    pub error: Error,
}

/// Every task-level failure of a run, sorted by task name
#[derive(Debug)]
pub struct RunFailure {
    pub failures: Vec<TaskFailure>,
}

impl RunFailure {
    /// Failures for tasks that ran and failed (excludes skips)
    pub fn failed(&self) -> impl Iterator<Item = &TaskFailure> {
        self.failures.iter().filter(|f| !f.error.is_skip())
    }

    /// Tasks that were skipped because a dependency failed
    pub fn skipped(&self) -> impl Iterator<Item = &TaskFailure> {
        self.failures.iter().filter(|f| f.error.is_skip())
    }

    /// Look up the failure recorded for a task
    pub fn get(&self, task: &str) -> Option<&Error> {
        self.failures
            .iter()
            .find(|f| f.task == task)
            .map(|f| &f.error)
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let skipped = self.skipped().count();
        write!(
            f,
            "{} task(s) failed, {} skipped:",
            self.failures.len() - skipped,
            skipped
        )?;
        for failure in &self.failures {
            write!(f, "\n  {}: {}", failure.task, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for RunFailure {}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
