//! Task traits for declarative state management
//!
//! A [`Task`] is what the executor schedules: it has a name, may depend on
//! other tasks, and knows how to reconcile itself. The value a task renders
//! implements [`Renderable`], which carries its lifecycle and declares the
//! backend-specific routines that apply it.

use crate::changes::{build_change_list, build_changes, type_name};
use crate::context::Context;
use crate::lifecycle::Lifecycle;
use crate::render::Renderers;
use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A unit of desired state the executor can run
///
/// # Example
///
/// ```ignore
/// impl Task for Network {
///     fn name(&self) -> String {
///         self.name.clone()
///     }
///
///     fn run(&self, ctx: &Context) -> anyhow::Result<()> {
///         default_delta_run(self, ctx)
///     }
/// }
/// ```
pub trait Task: Send + Sync + fmt::Debug {
    /// Key of this task in the task map
    fn name(&self) -> String;

    /// Names of tasks that must complete successfully before this one starts
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Read actual state, compute changes and call [`Context::render`]
    fn run(&self, ctx: &Context) -> Result<()>;
}

/// Tasks keyed by name
pub type TaskMap = BTreeMap<String, Arc<dyn Task>>;

/// Build a task map from a list of tasks, keyed by [`Task::name`]
pub fn task_map(tasks: impl IntoIterator<Item = Arc<dyn Task>>) -> TaskMap {
    tasks.into_iter().map(|t| (t.name(), t)).collect()
}

/// A value that can be rendered to a target
pub trait Renderable: Serialize + Send + Sync + 'static {
    /// Logical name, shown in reports as `<Type>/<name>`
    fn name(&self) -> String;

    /// Lifecycle policy of the expected object
    fn lifecycle(&self) -> Option<Lifecycle> {
        None
    }

    /// Declare one render routine per supported backend type
    fn renderers(renderers: &mut Renderers<Self>) -> crate::Result<()>
    where
        Self: Sized;
}

/// A renderable value that can look up its own actual state
pub trait Reconcile: Renderable + DeserializeOwned + Default + Clone {
    /// Find the real object matching this expected value, if any
    fn find(&self, ctx: &Context) -> Result<Option<Self>>;
}

/// Run the find / diff / render cycle for an expected value
///
/// The actual object is only looked up when the context checks existing
/// objects; otherwise it is treated as missing. An existing object with
/// no differences is not rendered at all.
pub fn default_delta_run<T: Reconcile>(expected: &T, ctx: &Context) -> Result<()> {
    if expected.lifecycle() == Some(Lifecycle::Ignore) {
        log::debug!("{}/{}: lifecycle set to Ignore", type_name::<T>(), expected.name());
        return Ok(());
    }

    let actual = if ctx.check_existing() {
        expected.find(ctx)?
    } else {
        None
    };
    let changes = build_changes(actual.as_ref(), expected)?;

    if let Some(actual) = &actual
        && build_change_list(Some(actual), expected, &changes)?.is_empty()
    {
        log::debug!("{}/{}: no changes", type_name::<T>(), expected.name());
        return Ok(());
    }

    ctx.render(actual.as_ref(), expected, &changes)?;
    Ok(())
}
