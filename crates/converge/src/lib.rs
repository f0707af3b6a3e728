//! # Converge
//!
//! Task execution and rendering engine for declarative infrastructure.
//!
//! A run holds a named set of tasks, executes them in dependency order with
//! a per-task time budget, and renders each task's computed delta to the
//! active target: a real backend, or a dry run that only records.
//!
//! ## Core Concepts
//!
//! - **Task**: a unit of desired state the executor schedules ([`Task`])
//! - **Renderable**: the value a task renders, with its [`Lifecycle`] and one
//!   declared routine per backend type ([`Renderers`])
//! - **Target**: [`Target::Real`] backend or [`Target::DryRun`]
//! - **Change list**: field-level diff of actual vs expected ([`Change`])
//! - **Context**: target, collaborators, scratch directory, task set
//!
//! ## Example
//!
//! ```ignore
//! use converge::{Context, Renderable, Renderers, Target, Task};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Network { name: String, cidr: String }
//!
//! impl Renderable for Network {
//!     fn name(&self) -> String { self.name.clone() }
//!
//!     fn renderers(r: &mut Renderers<Self>) -> converge::Result<()> {
//!         r.on::<ApiBackend, _>(|api, _ctx, actual, expected, changes| {
//!             api.put_network(actual, expected, changes)
//!         })?;
//!         Ok(())
//!     }
//! }
//!
//! let ctx = Context::builder(Target::dry_run(), cloud).tasks(tasks).build()?;
//! let result = ctx.run_tasks(Duration::from_secs(600));
//! ctx.close();
//! result?;
//! ```

pub mod changes;
pub mod cloud;
pub mod context;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod render;
pub mod target;
pub mod task;
pub mod types;

// Re-export main types at crate root
pub use changes::{Change, ChangeKind, build_change_list, build_changes};
pub use cloud::{
    Cloud, DnsProvider, Keypair, Keystore, NoKeystore, NoSecrets, Secret, SecretStore, SubnetInfo,
    VpcInfo,
};
pub use context::{Context, ContextBuilder};
pub use error::{Error, Result, RunFailure, TaskFailure, Violation};
pub use executor::{DependencyGraph, Executor};
pub use lifecycle::Lifecycle;
pub use render::Renderers;
pub use target::{Backend, DryRunTarget, Render, Target};
pub use task::{Reconcile, Renderable, Task, TaskMap, default_delta_run, task_map};
pub use types::{RunOptions, RunSummary, TaskRecord};
