//! Run options and results

use serde::Serialize;
use std::time::Duration;

/// Options for running a task set
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Wall-clock budget for each task
    pub max_task_duration: Duration,
    /// Maximum number of tasks running at once (`None` = unbounded)
    pub jobs: Option<usize>,
}

impl RunOptions {
    pub fn new(max_task_duration: Duration) -> Self {
        Self {
            max_task_duration,
            jobs: None,
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs.max(1));
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(10 * 60))
    }
}

/// A task that completed successfully
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub name: String,
    pub elapsed: Duration,
}

/// Summary of a successful run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Completed tasks, in completion order
    pub completed: Vec<TaskRecord>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.completed.len()
    }

    /// Position of a task in completion order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.completed.iter().position(|r| r.name == name)
    }
}
