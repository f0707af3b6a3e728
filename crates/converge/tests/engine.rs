//! End-to-end tests for rendering, lifecycle handling and scheduling

use anyhow::bail;
use converge::{
    Backend, Cloud, Context, Error, Lifecycle, Reconcile, Renderable, Renderers, RunOptions, Target,
    Task, TaskMap, Violation, VpcInfo, default_delta_run, task_map,
};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

struct TestCloud;

impl Cloud for TestCloud {
    fn provider_id(&self) -> &str {
        "test"
    }

    fn find_vpc_info(&self, _network_id: &str) -> anyhow::Result<Option<VpcInfo>> {
        Ok(None)
    }
}

/// Backend that remembers which routines were called
#[derive(Default)]
struct ApiTarget {
    calls: Mutex<Vec<String>>,
}

#[derive(Default)]
struct TerraformTarget {
    calls: Mutex<Vec<String>>,
}

/// Backend no task declares a routine for
struct CloudformationTarget;

impl Backend for ApiTarget {
    fn kind(&self) -> &'static str {
        "api"
    }
}

impl Backend for TerraformTarget {
    fn kind(&self) -> &'static str {
        "terraform"
    }
}

impl Backend for CloudformationTarget {
    fn kind(&self) -> &'static str {
        "cloudformation"
    }
}

fn calls(ctx: &Context) -> Vec<String> {
    if let Some(api) = ctx.target().backend_as::<ApiTarget>() {
        return api.calls.lock().unwrap().clone();
    }
    if let Some(tf) = ctx.target().backend_as::<TerraformTarget>() {
        return tf.calls.lock().unwrap().clone();
    }
    Vec::new()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Instance {
    name: String,
    size: String,
    #[serde(skip)]
    lifecycle: Option<Lifecycle>,
}

impl Instance {
    fn new(name: &str, size: &str) -> Self {
        Self {
            name: name.to_string(),
            size: size.to_string(),
            lifecycle: None,
        }
    }

    fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }
}

impl Renderable for Instance {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn lifecycle(&self) -> Option<Lifecycle> {
        self.lifecycle
    }

    fn renderers(r: &mut Renderers<Self>) -> converge::Result<()> {
        r.on::<ApiTarget, _>(|api, _ctx, _a, e, _changes| {
            api.calls.lock().unwrap().push(format!("api:{}", e.name));
            Ok(())
        })?
        .on::<TerraformTarget, _>(|tf, _ctx, _a, e, _changes| {
            tf.calls.lock().unwrap().push(format!("terraform:{}", e.name));
            Ok(())
        })?;
        Ok(())
    }
}

/// Declares two routines for the same backend
#[derive(Debug, Clone, Serialize)]
struct Doubled {
    name: String,
}

impl Renderable for Doubled {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn renderers(r: &mut Renderers<Self>) -> converge::Result<()> {
        r.on::<ApiTarget, _>(|_, _, _, _, _| Ok(()))?;
        r.on::<ApiTarget, _>(|_, _, _, _, _| Ok(()))?;
        Ok(())
    }
}

/// Only renders to a real API; used to prove dry runs never call routines
#[derive(Debug, Clone, Serialize)]
struct Tripwire {
    name: String,
}

impl Renderable for Tripwire {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn renderers(r: &mut Renderers<Self>) -> converge::Result<()> {
        r.on::<ApiTarget, _>(|_, _, _, _, _| panic!("routine must not run on a dry run"))?;
        Ok(())
    }
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn context(target: Target, tasks: TaskMap) -> (Context, SharedBuffer) {
    let diagnostics = SharedBuffer::default();
    let ctx = Context::builder(target, Arc::new(TestCloud))
        .tasks(tasks)
        .diagnostics(diagnostics.clone())
        .build()
        .unwrap();
    (ctx, diagnostics)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    End,
}

type Events = Arc<Mutex<Vec<(String, Phase, Instant)>>>;

#[derive(Debug)]
struct InstanceTask {
    expected: Instance,
    actual: Option<Instance>,
    deps: Vec<String>,
    delay: Duration,
    fail: Option<&'static str>,
    panics: bool,
    events: Events,
}

impl InstanceTask {
    fn new(name: &str, events: &Events) -> Self {
        Self {
            expected: Instance::new(name, "small"),
            actual: None,
            deps: Vec::new(),
            delay: Duration::ZERO,
            fail: None,
            panics: false,
            events: Arc::clone(events),
        }
    }

    fn after(mut self, dep: &str) -> Self {
        self.deps.push(dep.to_string());
        self
    }

    fn sleep(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    fn failing(mut self, message: &'static str) -> Self {
        self.fail = Some(message);
        self
    }

    fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    fn boxed(self) -> Arc<dyn Task> {
        Arc::new(self)
    }

    fn event(&self, phase: Phase) {
        self.events
            .lock()
            .unwrap()
            .push((self.expected.name.clone(), phase, Instant::now()));
    }
}

impl Task for InstanceTask {
    fn name(&self) -> String {
        self.expected.name.clone()
    }

    fn dependencies(&self) -> Vec<String> {
        self.deps.clone()
    }

    fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        self.event(Phase::Start);
        thread::sleep(self.delay);
        if self.panics {
            panic!("task blew up");
        }
        if let Some(message) = self.fail {
            bail!("{message}");
        }
        ctx.render(self.actual.as_ref(), &self.expected, &self.expected)?;
        self.event(Phase::End);
        Ok(())
    }
}

fn at(events: &Events, task: &str, phase: Phase) -> Instant {
    events
        .lock()
        .unwrap()
        .iter()
        .find(|(t, p, _)| t == task && *p == phase)
        .map(|(_, _, at)| *at)
        .unwrap_or_else(|| panic!("no {phase:?} event for {task}"))
}

fn run_failure(err: Error) -> converge::RunFailure {
    match err {
        Error::RunFailed(failure) => failure,
        other => panic!("expected an aggregated run failure, got: {other}"),
    }
}

// ----------------------------------------------------------------------------
// Dispatch
// ----------------------------------------------------------------------------

#[test]
fn test_dispatch_selects_routine_for_each_target() {
    let web = Instance::new("web", "small");

    let (ctx, _) = context(Target::real(ApiTarget::default()), TaskMap::new());
    ctx.render(None, &web, &web).unwrap();
    assert_eq!(calls(&ctx), ["api:web"]);

    let (ctx, _) = context(Target::real(TerraformTarget::default()), TaskMap::new());
    ctx.render(None, &web, &web).unwrap();
    assert_eq!(calls(&ctx), ["terraform:web"]);
}

#[test]
fn test_undeclared_target_has_no_renderer() {
    let web = Instance::new("web", "small");
    let (ctx, _) = context(Target::real(CloudformationTarget), TaskMap::new());

    let err = ctx.render(None, &web, &web).unwrap_err();
    assert!(matches!(err, Error::NoRenderer { ref target, .. } if target == "cloudformation"));
}

#[test]
fn test_duplicate_routines_are_ambiguous_for_any_target() {
    let doubled = Doubled { name: "x".into() };

    let (ctx, _) = context(Target::real(ApiTarget::default()), TaskMap::new());
    let err = ctx.render(None, &doubled, &doubled).unwrap_err();
    assert!(matches!(err, Error::AmbiguousRenderer { .. }));

    let (ctx, _) = context(Target::real(TerraformTarget::default()), TaskMap::new());
    let err = ctx.render(None, &doubled, &doubled).unwrap_err();
    assert!(matches!(err, Error::AmbiguousRenderer { .. }));
}

#[test]
fn test_renderer_table_is_cached() {
    let (ctx, _) = context(Target::real(ApiTarget::default()), TaskMap::new());
    let first = ctx.renderers::<Instance>().unwrap();
    let second = ctx.renderers::<Instance>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.supports::<ApiTarget>());
    assert!(!first.supports::<CloudformationTarget>());
}

#[test]
fn test_routine_error_is_wrapped_with_task_name() {
    #[derive(Debug, Serialize)]
    struct Broken {
        name: String,
    }

    impl Renderable for Broken {
        fn name(&self) -> String {
            self.name.clone()
        }

        fn renderers(r: &mut Renderers<Self>) -> converge::Result<()> {
            r.on::<ApiTarget, _>(|_, _, _, _, _| bail!("quota exceeded"))?;
            Ok(())
        }
    }

    let broken = Broken { name: "b".into() };
    let (ctx, _) = context(Target::real(ApiTarget::default()), TaskMap::new());
    let err = ctx.render(None, &broken, &broken).unwrap_err();
    assert!(matches!(err, Error::Task { ref task, .. } if task == "Broken/b"));
    assert!(err.to_string().contains("quota exceeded"));
}

// ----------------------------------------------------------------------------
// Dry run
// ----------------------------------------------------------------------------

#[test]
fn test_dry_run_records_triple_without_calling_routines() {
    let tripwire = Tripwire { name: "t".into() };
    let (ctx, _) = context(Target::dry_run(), TaskMap::new());

    ctx.render(None, &tripwire, &tripwire).unwrap();

    let renders = ctx.target().as_dry_run().unwrap().renders();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].task, "Tripwire/t");
    assert_eq!(renders[0].actual, None);
    assert_eq!(renders[0].expected, serde_json::json!({ "name": "t" }));
    assert_eq!(renders[0].changes, serde_json::json!({ "name": "t" }));
}

#[test]
fn test_dry_run_records_actual_and_change_list() {
    let actual = Instance::new("web", "small");
    let expected = Instance::new("web", "large");
    let (ctx, _) = context(Target::dry_run(), TaskMap::new());

    ctx.render(Some(&actual), &expected, &expected).unwrap();

    let dry_run = ctx.target().as_dry_run().unwrap();
    let renders = dry_run.renders();
    assert_eq!(renders[0].actual, Some(serde_json::to_value(&actual).unwrap()));
    assert_eq!(renders[0].change_list.len(), 1);
    assert_eq!(renders[0].change_list[0].field_name, "size");
    assert_eq!(renders[0].change_list[0].description, "small -> large");
    assert!(dry_run.has_changes());
}

// ----------------------------------------------------------------------------
// Lifecycle
// ----------------------------------------------------------------------------

#[test]
fn test_missing_object_violates_exists_policies() {
    for lifecycle in [Lifecycle::ExistsAndValidates, Lifecycle::ExistsAndWarnIfChanges] {
        let web = Instance::new("web", "small").with_lifecycle(lifecycle);
        let (ctx, _) = context(Target::real(ApiTarget::default()), TaskMap::new());

        let err = ctx.render(None, &web, &web).unwrap_err();
        assert!(matches!(
            err,
            Error::LifecycleViolation { reason: Violation::NotFound, lifecycle: l, .. } if l == lifecycle
        ));
        assert!(calls(&ctx).is_empty());
    }
}

#[test]
fn test_missing_object_with_sync_or_no_policy_is_applied() {
    for web in [
        Instance::new("web", "small"),
        Instance::new("web", "small").with_lifecycle(Lifecycle::Sync),
    ] {
        let (ctx, _) = context(Target::real(ApiTarget::default()), TaskMap::new());
        ctx.render(None, &web, &web).unwrap();
        assert_eq!(calls(&ctx), ["api:web"]);
    }
}

#[test]
fn test_divergence_fails_exists_and_validates() {
    let actual = Instance::new("web", "small");
    let expected = Instance::new("web", "large").with_lifecycle(Lifecycle::ExistsAndValidates);
    let (ctx, diagnostics) = context(Target::real(ApiTarget::default()), TaskMap::new());

    let err = ctx.render(Some(&actual), &expected, &expected).unwrap_err();
    assert!(matches!(
        err,
        Error::LifecycleViolation {
            reason: Violation::DidNotMatch,
            ..
        }
    ));
    let report = diagnostics.contents();
    assert!(report.contains("Instance/web"));
    assert!(report.contains("size"));
    assert!(calls(&ctx).is_empty());
}

#[test]
fn test_divergence_only_warns_for_exists_and_warn_if_changes() {
    let actual = Instance::new("web", "small");
    let expected = Instance::new("web", "large").with_lifecycle(Lifecycle::ExistsAndWarnIfChanges);
    let (ctx, diagnostics) = context(Target::real(ApiTarget::default()), TaskMap::new());

    ctx.render(Some(&actual), &expected, &expected).unwrap();

    let report = diagnostics.contents();
    assert!(report.starts_with("Object from different phase did not match"));
    assert!(report.contains("  \tsize"));
    assert!(report.contains("small -> large"));
    assert!(report.ends_with("\n\n"));
    assert!(calls(&ctx).is_empty());
}

#[test]
fn test_existing_object_always_validated_on_render() {
    let actual = Instance::new("web", "small");
    let expected = actual.clone().with_lifecycle(Lifecycle::ExistsAndValidates);
    let (ctx, diagnostics) = context(Target::real(ApiTarget::default()), TaskMap::new());

    let err = ctx.render(Some(&actual), &expected, &expected).unwrap_err();
    assert!(matches!(
        err,
        Error::LifecycleViolation {
            reason: Violation::DidNotMatch,
            ..
        }
    ));
    assert!(diagnostics.contents().contains("Instance/web"));
    assert!(calls(&ctx).is_empty());
}

/// Looks itself up as a 10 GB volume
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Volume {
    name: String,
    size_gb: u32,
    #[serde(skip)]
    lifecycle: Option<Lifecycle>,
}

impl Volume {
    fn new(size_gb: u32) -> Self {
        Self {
            name: "data".into(),
            size_gb,
            lifecycle: None,
        }
    }
}

impl Renderable for Volume {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn lifecycle(&self) -> Option<Lifecycle> {
        self.lifecycle
    }

    fn renderers(r: &mut Renderers<Self>) -> converge::Result<()> {
        r.on::<ApiTarget, _>(|api, _ctx, _a, e, _changes| {
            api.calls.lock().unwrap().push(format!("api:{}", e.name));
            Ok(())
        })?;
        Ok(())
    }
}

impl Reconcile for Volume {
    fn find(&self, _ctx: &Context) -> anyhow::Result<Option<Self>> {
        Ok(Some(Self::new(10)))
    }
}

#[test]
fn test_matching_existing_object_is_left_alone() {
    let mut volume = Volume::new(10);
    volume.lifecycle = Some(Lifecycle::ExistsAndValidates);
    let (ctx, diagnostics) = context(Target::real(ApiTarget::default()), TaskMap::new());

    default_delta_run(&volume, &ctx).unwrap();
    assert!(diagnostics.contents().is_empty());
    assert!(calls(&ctx).is_empty());
}

#[test]
fn test_unchanged_object_is_not_recorded_on_dry_run() {
    let (ctx, _) = context(Target::dry_run(), TaskMap::new());
    default_delta_run(&Volume::new(10), &ctx).unwrap();
    assert!(ctx.target().as_dry_run().unwrap().renders().is_empty());
}

#[test]
fn test_check_existing_decides_whether_actual_is_read() {
    let volume = Volume::new(20);

    let (ctx, _) = context(Target::dry_run(), TaskMap::new());
    assert!(ctx.check_existing());
    default_delta_run(&volume, &ctx).unwrap();
    let renders = ctx.target().as_dry_run().unwrap().renders();
    assert!(!renders[0].is_create());
    assert_eq!(renders[0].change_list[0].description, "10 -> 20");

    let ctx = Context::builder(Target::dry_run(), Arc::new(TestCloud))
        .check_existing(false)
        .diagnostics(io::sink())
        .build()
        .unwrap();
    default_delta_run(&volume, &ctx).unwrap();
    let renders = ctx.target().as_dry_run().unwrap().renders();
    assert!(renders[0].is_create());
    assert!(renders[0].actual.is_none());
}

#[test]
fn test_missing_lookup_violates_validated_policy() {
    let mut volume = Volume::new(10);
    volume.lifecycle = Some(Lifecycle::ExistsAndValidates);
    let ctx = Context::builder(Target::real(ApiTarget::default()), Arc::new(TestCloud))
        .check_existing(false)
        .diagnostics(io::sink())
        .build()
        .unwrap();

    let err = default_delta_run(&volume, &ctx).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::LifecycleViolation {
            reason: Violation::NotFound,
            ..
        })
    ));
}

#[test]
fn test_ignore_never_renders() {
    let web = Instance::new("web", "small").with_lifecycle(Lifecycle::Ignore);

    let (ctx, _) = context(Target::real(ApiTarget::default()), TaskMap::new());
    ctx.render(None, &web, &web).unwrap();
    assert!(calls(&ctx).is_empty());

    let (ctx, _) = context(Target::dry_run(), TaskMap::new());
    ctx.render(None, &web, &web).unwrap();
    assert!(ctx.target().as_dry_run().unwrap().renders().is_empty());
}

// ----------------------------------------------------------------------------
// Scheduling
// ----------------------------------------------------------------------------

#[test]
fn test_dependencies_complete_before_dependents_start() {
    let events = Events::default();
    let tasks = task_map([
        InstanceTask::new("a", &events).sleep(30).boxed(),
        InstanceTask::new("b", &events).after("a").sleep(30).boxed(),
        InstanceTask::new("c", &events).after("b").boxed(),
        InstanceTask::new("d", &events).sleep(20).boxed(),
        InstanceTask::new("e", &events).boxed(),
    ]);
    let (ctx, _) = context(Target::dry_run(), tasks);

    let summary = ctx.run_tasks(Duration::from_secs(10)).unwrap();

    assert_eq!(summary.total(), 5);
    assert!(at(&events, "a", Phase::End) <= at(&events, "b", Phase::Start));
    assert!(at(&events, "b", Phase::End) <= at(&events, "c", Phase::Start));
    assert!(summary.position("a") < summary.position("b"));
    assert!(summary.position("b") < summary.position("c"));
    ctx.close();
}

#[test]
fn test_cycle_rejected_before_any_task_runs() {
    #[derive(Debug)]
    struct Flagged(&'static str, &'static str, Arc<AtomicBool>);

    impl Task for Flagged {
        fn name(&self) -> String {
            self.0.to_string()
        }

        fn dependencies(&self) -> Vec<String> {
            vec![self.1.to_string()]
        }

        fn run(&self, _ctx: &Context) -> anyhow::Result<()> {
            self.2.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    let ran = Arc::new(AtomicBool::new(false));
    let tasks = task_map([
        Arc::new(Flagged("a", "b", Arc::clone(&ran))) as Arc<dyn Task>,
        Arc::new(Flagged("b", "a", Arc::clone(&ran))) as Arc<dyn Task>,
    ]);
    let (ctx, _) = context(Target::dry_run(), tasks);

    let err = ctx.run_tasks(Duration::from_secs(10)).unwrap_err();
    match err {
        Error::DependencyCycle { tasks } => {
            assert!(tasks.contains(&"a".to_string()));
            assert!(tasks.contains(&"b".to_string()));
        }
        other => panic!("expected a dependency cycle, got: {other}"),
    }
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn test_unknown_dependency_rejected_before_run() {
    let events = Events::default();
    let tasks = task_map([InstanceTask::new("a", &events).after("ghost").boxed()]);
    let (ctx, _) = context(Target::dry_run(), tasks);

    let err = ctx.run_tasks(Duration::from_secs(10)).unwrap_err();
    assert!(matches!(err, Error::UnknownDependency { .. }));
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn test_failure_skips_dependents_but_not_independent_tasks() {
    let events = Events::default();
    let tasks = task_map([
        InstanceTask::new("a", &events).boxed(),
        InstanceTask::new("b", &events).after("a").failing("api unavailable").boxed(),
        InstanceTask::new("c", &events).after("b").boxed(),
        InstanceTask::new("c2", &events).after("c").boxed(),
        InstanceTask::new("d", &events).sleep(50).boxed(),
    ]);
    let (ctx, _) = context(Target::real(ApiTarget::default()), tasks);

    let failure = run_failure(ctx.run_tasks(Duration::from_secs(10)).unwrap_err());

    assert_eq!(failure.failures.len(), 3);
    assert!(matches!(failure.get("b"), Some(Error::Task { .. })));
    assert!(matches!(
        failure.get("c"),
        Some(Error::SkippedDueToDependencyFailure { dependency, .. }) if dependency == "b"
    ));
    assert!(matches!(
        failure.get("c2"),
        Some(Error::SkippedDueToDependencyFailure { dependency, .. }) if dependency == "c"
    ));
    assert!(failure.get("d").is_none());

    let mut applied = calls(&ctx);
    applied.sort();
    assert_eq!(applied, ["api:a", "api:d"]);
    assert!(failure.to_string().contains("1 task(s) failed, 2 skipped"));
}

#[test]
fn test_timeout_fails_task_and_skips_dependents() {
    let events = Events::default();
    let tasks = task_map([
        InstanceTask::new("slow", &events).sleep(2_000).boxed(),
        InstanceTask::new("after-slow", &events).after("slow").boxed(),
        InstanceTask::new("quick", &events).boxed(),
    ]);
    let (ctx, _) = context(Target::dry_run(), tasks);

    let started = Instant::now();
    let failure = run_failure(ctx.run_tasks(Duration::from_millis(200)).unwrap_err());

    assert!(started.elapsed() < Duration::from_millis(1_500));
    assert!(matches!(failure.get("slow"), Some(Error::TaskTimeout { .. })));
    assert!(matches!(
        failure.get("after-slow"),
        Some(Error::SkippedDueToDependencyFailure { .. })
    ));
    assert!(failure.get("quick").is_none());
    ctx.close();
}

#[test]
fn test_unbounded_task_duration() {
    let events = Events::default();
    let tasks = task_map([
        InstanceTask::new("a", &events).sleep(20).boxed(),
        InstanceTask::new("b", &events).after("a").boxed(),
    ]);
    let (ctx, _) = context(Target::dry_run(), tasks);

    let summary = ctx.run_tasks(Duration::MAX).unwrap();
    assert_eq!(summary.total(), 2);
    assert!(summary.position("a").unwrap() < summary.position("b").unwrap());
}

#[test]
fn test_panicking_task_is_a_failure() {
    let events = Events::default();
    let tasks = task_map([
        InstanceTask::new("boom", &events).panicking().boxed(),
        InstanceTask::new("fine", &events).boxed(),
    ]);
    let (ctx, _) = context(Target::dry_run(), tasks);

    let failure = run_failure(ctx.run_tasks(Duration::from_secs(10)).unwrap_err());
    assert!(matches!(
        failure.get("boom"),
        Some(Error::TaskPanicked { message, .. }) if message == "task blew up"
    ));
    assert_eq!(failure.failures.len(), 1);
}

#[test]
fn test_single_job_runs_everything() {
    let events = Events::default();
    let tasks = task_map([
        InstanceTask::new("a", &events).boxed(),
        InstanceTask::new("b", &events).boxed(),
        InstanceTask::new("c", &events).after("a").boxed(),
    ]);
    let (ctx, _) = context(Target::dry_run(), tasks);

    let summary = ctx
        .run_tasks_with(RunOptions::new(Duration::from_secs(10)).with_jobs(1))
        .unwrap();
    assert_eq!(summary.total(), 3);
}

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

#[test]
fn test_two_independent_tasks_on_dry_run() {
    let events = Events::default();
    let tasks = task_map([
        InstanceTask::new("one", &events).boxed(),
        InstanceTask::new("two", &events).boxed(),
    ]);
    let (ctx, _) = context(Target::dry_run(), tasks);

    ctx.run_tasks(Duration::from_secs(10)).unwrap();

    let mut recorded: Vec<_> = ctx
        .target()
        .as_dry_run()
        .unwrap()
        .renders()
        .into_iter()
        .map(|r| r.task)
        .collect();
    recorded.sort();
    assert_eq!(recorded, ["Instance/one", "Instance/two"]);
}

#[test]
fn test_missing_validated_object_fails_the_run() {
    let events = Events::default();
    let mut task = InstanceTask::new("db", &events);
    task.expected = task.expected.with_lifecycle(Lifecycle::ExistsAndValidates);
    let (ctx, _) = context(Target::real(ApiTarget::default()), task_map([task.boxed()]));

    let failure = run_failure(ctx.run_tasks(Duration::from_secs(10)).unwrap_err());

    assert_eq!(failure.failures.len(), 1);
    assert_eq!(failure.failures[0].task, "db");
    assert!(failure.failures[0].error.is_lifecycle_violation());
}

#[test]
fn test_changed_name_is_reported_and_run_succeeds() {
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Zone {
        id: String,
        name: String,
        #[serde(skip)]
        lifecycle: Option<Lifecycle>,
    }

    impl Renderable for Zone {
        fn name(&self) -> String {
            self.id.clone()
        }

        fn lifecycle(&self) -> Option<Lifecycle> {
            self.lifecycle
        }

        fn renderers(r: &mut Renderers<Self>) -> converge::Result<()> {
            r.on::<ApiTarget, _>(|_, _, _, _, _| bail!("existing zone must not be modified"))?;
            Ok(())
        }
    }

    impl Reconcile for Zone {
        fn find(&self, _ctx: &Context) -> anyhow::Result<Option<Self>> {
            Ok(Some(Zone {
                id: self.id.clone(),
                name: "foo".into(),
                lifecycle: None,
            }))
        }
    }

    #[derive(Debug)]
    struct ZoneTask(Zone);

    impl Task for ZoneTask {
        fn name(&self) -> String {
            self.0.id.clone()
        }

        fn run(&self, ctx: &Context) -> anyhow::Result<()> {
            default_delta_run(&self.0, ctx)
        }
    }

    let zone = Zone {
        id: "zone".into(),
        name: "bar".into(),
        lifecycle: Some(Lifecycle::ExistsAndWarnIfChanges),
    };
    let (ctx, diagnostics) = context(
        Target::real(ApiTarget::default()),
        task_map([Arc::new(ZoneTask(zone)) as Arc<dyn Task>]),
    );

    ctx.run_tasks(Duration::from_secs(10)).unwrap();

    let report = diagnostics.contents();
    let line = report
        .lines()
        .find(|l| l.contains("Name"))
        .expect("report should mention the Name field");
    assert!(line.contains("foo -> bar"));
    assert!(!report.contains("\tId"));
}

#[test]
fn test_default_delta_run_renders_only_differences() {
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Disk {
        name: String,
        size_gb: u32,
        encrypted: bool,
    }

    impl Renderable for Disk {
        fn name(&self) -> String {
            self.name.clone()
        }

        fn renderers(_r: &mut Renderers<Self>) -> converge::Result<()> {
            Ok(())
        }
    }

    impl Reconcile for Disk {
        fn find(&self, _ctx: &Context) -> anyhow::Result<Option<Self>> {
            Ok(Some(Disk {
                size_gb: 10,
                ..self.clone()
            }))
        }
    }

    let disk = Disk {
        name: "data".into(),
        size_gb: 20,
        encrypted: true,
    };
    let (ctx, _) = context(Target::dry_run(), TaskMap::new());

    default_delta_run(&disk, &ctx).unwrap();

    let renders = ctx.target().as_dry_run().unwrap().renders();
    assert_eq!(
        renders[0].changes,
        serde_json::json!({ "name": "", "size_gb": 20, "encrypted": false })
    );
    assert_eq!(renders[0].change_list.len(), 1);
    assert_eq!(renders[0].change_list[0].description, "10 -> 20");
}
