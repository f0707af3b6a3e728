//! Execution context - target, collaborators, scratch space and the task set
//!
//! A context is built once per run. Building it creates a private scratch
//! directory; [`Context::close`] removes it. If the context is dropped
//! without being closed (early return, panic) the directory is removed on
//! drop instead.

use crate::changes::{Change, build_change_list, to_value, type_name};
use crate::cloud::{Cloud, DnsProvider, Keystore, NoKeystore, NoSecrets, SecretStore};
use crate::error::{Error, Result, Violation};
use crate::executor::Executor;
use crate::lifecycle::Lifecycle;
use crate::render::Renderers;
use crate::target::{self, Render, Target};
use crate::task::{Renderable, TaskMap};
use crate::types::{RunOptions, RunSummary};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

type RendererCache = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

struct Inner {
    target: Target,
    cloud: Arc<dyn Cloud>,
    keystore: Arc<dyn Keystore>,
    secret_store: Arc<dyn SecretStore>,
    dns: Option<Arc<dyn DnsProvider>>,
    cluster_config_base: Option<String>,
    check_existing: bool,
    tasks: TaskMap,
    diagnostics: Mutex<Box<dyn Write + Send>>,
    renderers: Mutex<RendererCache>,
    scratch: TempDir,
}

/// The environment tasks run in
pub struct Context {
    inner: Arc<Inner>,
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    target: Target,
    cloud: Arc<dyn Cloud>,
    keystore: Arc<dyn Keystore>,
    secret_store: Arc<dyn SecretStore>,
    dns: Option<Arc<dyn DnsProvider>>,
    cluster_config_base: Option<String>,
    check_existing: bool,
    tasks: TaskMap,
    diagnostics: Box<dyn Write + Send>,
    scratch_parent: Option<PathBuf>,
}

impl ContextBuilder {
    pub fn keystore(mut self, keystore: Arc<dyn Keystore>) -> Self {
        self.keystore = keystore;
        self
    }

    pub fn secret_store(mut self, secret_store: Arc<dyn SecretStore>) -> Self {
        self.secret_store = secret_store;
        self
    }

    pub fn dns(mut self, dns: Arc<dyn DnsProvider>) -> Self {
        self.dns = Some(dns);
        self
    }

    /// Location of the cluster configuration, passed through to tasks
    pub fn cluster_config_base(mut self, base: impl Into<String>) -> Self {
        self.cluster_config_base = Some(base.into());
        self
    }

    /// Look up actual objects before rendering (default: true)
    ///
    /// When off, [`default_delta_run`](crate::default_delta_run) treats every
    /// object as missing.
    pub fn check_existing(mut self, check_existing: bool) -> Self {
        self.check_existing = check_existing;
        self
    }

    pub fn tasks(mut self, tasks: TaskMap) -> Self {
        self.tasks = tasks;
        self
    }

    /// Where lifecycle divergence reports are written (default: stderr)
    pub fn diagnostics(mut self, out: impl Write + Send + 'static) -> Self {
        self.diagnostics = Box::new(out);
        self
    }

    /// Create the scratch directory under `parent` instead of the system temp dir
    pub fn scratch_parent(mut self, parent: impl Into<PathBuf>) -> Self {
        self.scratch_parent = Some(parent.into());
        self
    }

    /// Create the scratch directory and the context
    pub fn build(self) -> Result<Context> {
        let parent = self.scratch_parent.unwrap_or_else(std::env::temp_dir);
        let scratch = tempfile::Builder::new()
            .prefix("deploy")
            .tempdir_in(&parent)
            .map_err(|source| Error::ScratchDir {
                parent: parent.clone(),
                source,
            })?;
        log::debug!("created temp dir: {}", scratch.path().display());

        Ok(Context {
            inner: Arc::new(Inner {
                target: self.target,
                cloud: self.cloud,
                keystore: self.keystore,
                secret_store: self.secret_store,
                dns: self.dns,
                cluster_config_base: self.cluster_config_base,
                check_existing: self.check_existing,
                tasks: self.tasks,
                diagnostics: Mutex::new(self.diagnostics),
                renderers: Mutex::new(HashMap::new()),
                scratch,
            }),
        })
    }
}

impl Context {
    /// Start building a context for `target` backed by `cloud`
    pub fn builder(target: Target, cloud: Arc<dyn Cloud>) -> ContextBuilder {
        ContextBuilder {
            target,
            cloud,
            keystore: Arc::new(NoKeystore),
            secret_store: Arc::new(NoSecrets),
            dns: None,
            cluster_config_base: None,
            check_existing: true,
            tasks: TaskMap::new(),
            diagnostics: Box::new(io::stderr()),
            scratch_parent: None,
        }
    }

    /// Handle for a worker thread; shares everything, including the scratch dir
    pub(crate) fn share(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn target(&self) -> &Target {
        &self.inner.target
    }

    pub fn cloud(&self) -> &dyn Cloud {
        self.inner.cloud.as_ref()
    }

    /// Downcast the cloud to the concrete type a task was written for
    pub fn cloud_as<C: Cloud>(&self) -> Option<&C> {
        let cloud: &dyn Cloud = &*self.inner.cloud;
        let cloud: &dyn Any = cloud;
        cloud.downcast_ref::<C>()
    }

    pub fn keystore(&self) -> &dyn Keystore {
        self.inner.keystore.as_ref()
    }

    pub fn secret_store(&self) -> &dyn SecretStore {
        self.inner.secret_store.as_ref()
    }

    pub fn dns(&self) -> Option<&dyn DnsProvider> {
        self.inner.dns.as_deref()
    }

    pub fn cluster_config_base(&self) -> Option<&str> {
        self.inner.cluster_config_base.as_deref()
    }

    pub fn check_existing(&self) -> bool {
        self.inner.check_existing
    }

    pub fn all_tasks(&self) -> &TaskMap {
        &self.inner.tasks
    }

    /// The run's scratch directory
    pub fn tmpdir(&self) -> &Path {
        self.inner.scratch.path()
    }

    /// Create a fresh, distinct subdirectory of the scratch directory
    pub fn new_temp_dir(&self, prefix: &str) -> Result<PathBuf> {
        let parent = self.tmpdir();
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .keep(true)
            .tempdir_in(parent)
            .map_err(|source| Error::ScratchDir {
                parent: parent.to_path_buf(),
                source,
            })?;
        Ok(dir.path().to_path_buf())
    }

    /// Run every task in the context, in dependency order
    pub fn run_tasks(&self, max_task_duration: Duration) -> Result<RunSummary> {
        self.run_tasks_with(RunOptions::new(max_task_duration))
    }

    pub fn run_tasks_with(&self, options: RunOptions) -> Result<RunSummary> {
        Executor::new(self.share(), options).run(&self.inner.tasks)
    }

    /// Let the target finalize after all tasks have rendered
    pub fn finish(&self) -> anyhow::Result<()> {
        self.inner.target.finish(&self.inner.tasks)
    }

    /// Apply `expected` to the active target
    ///
    /// Enforces the lifecycle of `expected` first, then records the triple on
    /// a dry run or calls the routine `T` declared for the active backend.
    pub fn render<T: Renderable>(&self, actual: Option<&T>, expected: &T, changes: &T) -> Result<()> {
        let task = format!("{}/{}", type_name::<T>(), expected.name());

        match expected.lifecycle() {
            Some(Lifecycle::Ignore) => {
                log::info!("Skipping {task}: lifecycle set to Ignore");
                return Ok(());
            }
            Some(lifecycle) if lifecycle.requires_existing() => {
                let Some(actual) = actual else {
                    return Err(Error::LifecycleViolation {
                        task,
                        lifecycle,
                        reason: Violation::NotFound,
                    });
                };

                let change_list = build_change_list(Some(actual), expected, changes)?;
                self.report_divergence(&task, &change_list);

                if lifecycle == Lifecycle::ExistsAndValidates {
                    return Err(Error::LifecycleViolation {
                        task,
                        lifecycle,
                        reason: Violation::DidNotMatch,
                    });
                }
                log::warn!("{task} differs from the expected state; continuing ({lifecycle})");
                return Ok(());
            }
            _ => {}
        }

        match &self.inner.target {
            Target::DryRun(dry_run) => {
                dry_run.record(Render {
                    task,
                    actual: actual.map(to_value).transpose()?,
                    expected: to_value(expected)?,
                    changes: to_value(changes)?,
                    change_list: build_change_list(actual, expected, changes)?,
                });
                Ok(())
            }
            Target::Real(backend) => {
                let renderers = self.renderers::<T>()?;
                renderers.dispatch(&**backend, self, actual, expected, changes)
            }
        }
    }

    /// The routine table for `T`, declared on first use and cached
    pub fn renderers<T: Renderable>(&self) -> Result<Arc<Renderers<T>>> {
        let key = TypeId::of::<T>();
        let mut cache = match self.inner.renderers.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(cached) = cache.get(&key)
            && let Ok(renderers) = Arc::clone(cached).downcast::<Renderers<T>>()
        {
            return Ok(renderers);
        }

        let renderers = Arc::new(Renderers::<T>::declare()?);
        cache.insert(key, renderers.clone());
        Ok(renderers)
    }

    fn report_divergence(&self, task: &str, changes: &[Change]) {
        let mut report = Vec::new();
        let written = writeln!(
            report,
            "Object from different phase did not match, problems possible:"
        )
        .and_then(|()| writeln!(report, "  {task}"))
        .and_then(|()| target::write_changes(&mut report, changes))
        .and_then(|()| writeln!(report));
        if let Err(e) = written {
            log::warn!("unable to format report for {task}: {e}");
            return;
        }

        let mut out = match self.inner.diagnostics.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = out.write_all(&report).and_then(|()| out.flush()) {
            log::warn!("unable to write report for {task}: {e}");
        }
    }

    /// Tear down the context, removing the scratch directory
    ///
    /// Failures are logged, not returned. Worker threads of tasks that timed
    /// out may still hold the context; the directory then goes away when the
    /// last of them finishes.
    pub fn close(self) {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => {
                let path = inner.scratch.path().to_path_buf();
                log::debug!("deleting temp dir: {}", path.display());
                if let Err(e) = inner.scratch.close() {
                    log::warn!("unable to delete temporary directory {}: {e}", path.display());
                }
            }
            Err(inner) => {
                log::warn!(
                    "temporary directory {} still in use by running tasks; it will be removed when they finish",
                    inner.scratch.path().display()
                );
            }
        }
    }
}
