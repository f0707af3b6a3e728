//! `plan` and `apply` - run the tasks of a plan against the local backend
//!
//! `plan` is a dry run: tasks find and diff their objects and the intended
//! changes are printed. `apply` renders them into the state directory.

use anyhow::{Context as _, Result};
use converge::{Error, RunFailure, RunOptions, RunSummary, Target};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::Context;
use crate::cli::{ApplyArgs, PlanArgs};
use crate::local::LocalCloud;
use crate::paths;
use crate::plan::Plan;
use crate::ui;

/// Options shared by `plan` and `apply`
#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub plan: &'a Path,
    pub state_dir: &'a Path,
    pub dry_run: bool,
    pub check_existing: bool,
    pub options: RunOptions,
}

/// What a finished run produced
#[derive(Debug)]
pub struct Outcome {
    pub summary: RunSummary,
    /// Intended changes, only for dry runs
    pub renders: Vec<converge::Render>,
}

pub fn plan(ctx: &Context, args: PlanArgs) -> Result<()> {
    let state_dir = paths::state_dir(ctx.state_dir.as_deref());
    let request = RunRequest {
        plan: &args.plan,
        state_dir: &state_dir,
        dry_run: true,
        check_existing: !args.no_check_existing,
        options: RunOptions::default(),
    };
    report(ctx, &request, execute(&request))
}

pub fn apply(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let state_dir = paths::state_dir(ctx.state_dir.as_deref());
    let mut options = RunOptions::new(*args.max_task_duration);
    if let Some(jobs) = args.jobs {
        options = options.with_jobs(jobs);
    }
    let request = RunRequest {
        plan: &args.plan,
        state_dir: &state_dir,
        dry_run: args.dry_run,
        check_existing: !args.no_check_existing,
        options,
    };
    report(ctx, &request, execute(&request))
}

/// Load the plan and run its tasks
pub fn execute(request: &RunRequest<'_>) -> Result<Outcome> {
    let plan = Plan::load(request.plan)?;
    if plan.is_empty() {
        log::warn!("{} declares no objects", request.plan.display());
    }
    let tasks = plan.tasks()?;

    let target = if request.dry_run {
        Target::dry_run()
    } else {
        Target::real(LocalCloud::new(request.state_dir))
    };
    let run = converge::Context::builder(target, Arc::new(LocalCloud::new(request.state_dir)))
        .tasks(tasks)
        .check_existing(request.check_existing)
        .build()?;

    log::info!(
        "Running {} task(s) against {} (state: {})",
        run.all_tasks().len(),
        run.target().kind(),
        request.state_dir.display()
    );

    let result = run
        .run_tasks_with(request.options.clone())
        .map_err(anyhow::Error::from)
        .and_then(|summary| {
            run.finish().context("Target could not finish")?;
            Ok(summary)
        });
    let renders = run
        .target()
        .as_dry_run()
        .map(converge::DryRunTarget::renders)
        .unwrap_or_default();
    run.close();

    Ok(Outcome {
        summary: result?,
        renders,
    })
}

fn report(ctx: &Context, request: &RunRequest<'_>, outcome: Result<Outcome>) -> Result<()> {
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(Error::RunFailed(failure)) = err.downcast_ref::<Error>() {
                display_failure(failure);
                anyhow::bail!(
                    "{} task(s) failed, {} skipped",
                    failure.failed().count(),
                    failure.skipped().count()
                );
            }
            return Err(err);
        }
    };

    if request.dry_run {
        if !ctx.quiet {
            ui::header(&format!("Plan: {}", request.plan.display()));
        }
        ui::display_renders(&outcome.renders);
        if !ctx.quiet && outcome.renders.iter().any(converge::Render::has_changes) {
            ui::info("Dry run: nothing was written");
        }
        return Ok(());
    }

    if !ctx.quiet {
        ui::header("Apply");
        for record in &outcome.summary.completed {
            ui::kv(&record.name, &humantime::format_duration(round(record.elapsed)).to_string());
        }
        println!();
    }
    ui::success(&format!(
        "Applied {} task(s) in {}",
        outcome.summary.total(),
        humantime::format_duration(round(outcome.summary.elapsed))
    ));
    Ok(())
}

fn display_failure(failure: &RunFailure) {
    for task in failure.failed() {
        ui::error(&task.error.to_string());
    }
    for task in failure.skipped() {
        ui::warn(&task.error.to_string());
    }
}

/// Millisecond precision is plenty for a summary
fn round(elapsed: Duration) -> Duration {
    Duration::from_millis(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
