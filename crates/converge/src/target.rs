//! Render targets - where applied changes go
//!
//! A run renders either into a real backend, which issues the calls that
//! change the world, or into the dry-run target, which only records what
//! would have been done.

use crate::changes::Change;
use crate::task::TaskMap;
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::io::{self, Write};
use std::sync::Mutex;

/// A real destination for rendered changes
///
/// Tasks declare one render routine per backend type they support; the
/// engine never calls anything on a backend beyond this trait.
pub trait Backend: Any + Send + Sync {
    /// Short name of the backend kind, used in messages
    fn kind(&self) -> &'static str;

    /// Called once after every task has been rendered
    fn finish(&self, _tasks: &TaskMap) -> Result<()> {
        Ok(())
    }

    /// Whether tasks should delete objects that are no longer declared
    fn process_deletions(&self) -> bool {
        true
    }
}

/// The active target of a run
pub enum Target {
    /// Apply changes through a real backend
    Real(Box<dyn Backend>),
    /// Record intended changes only
    DryRun(DryRunTarget),
}

impl Target {
    pub fn real(backend: impl Backend) -> Self {
        Self::Real(Box::new(backend))
    }

    pub fn dry_run() -> Self {
        Self::DryRun(DryRunTarget::new())
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Real(backend) => backend.kind(),
            Self::DryRun(_) => "dryrun",
        }
    }

    /// The dry-run recorder, if this is a dry run
    pub fn as_dry_run(&self) -> Option<&DryRunTarget> {
        match self {
            Self::DryRun(d) => Some(d),
            Self::Real(_) => None,
        }
    }

    /// Downcast the real backend to a concrete type
    pub fn backend_as<B: Backend>(&self) -> Option<&B> {
        match self {
            Self::Real(backend) => {
                let backend: &dyn Backend = &**backend;
                let any: &dyn Any = backend;
                any.downcast_ref::<B>()
            }
            Self::DryRun(_) => None,
        }
    }

    pub fn finish(&self, tasks: &TaskMap) -> Result<()> {
        match self {
            Self::Real(backend) => backend.finish(tasks),
            Self::DryRun(_) => Ok(()),
        }
    }

    pub fn process_deletions(&self) -> bool {
        match self {
            Self::Real(backend) => backend.process_deletions(),
            Self::DryRun(_) => false,
        }
    }
}

/// One intended change captured by a dry run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Render {
    /// `<TaskType>/<name>`
    pub task: String,
    pub actual: Option<Value>,
    pub expected: Value,
    pub changes: Value,
    /// Field-level differences computed at record time
    pub change_list: Vec<Change>,
}

impl Render {
    /// Whether the object does not exist yet
    pub fn is_create(&self) -> bool {
        self.actual.is_none()
    }

    pub fn has_changes(&self) -> bool {
        self.is_create() || !self.change_list.is_empty()
    }
}

/// Target that records `(actual, expected, changes)` without side effects
#[derive(Debug, Default)]
pub struct DryRunTarget {
    renders: Mutex<Vec<Render>>,
}

impl DryRunTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, render: Render) {
        log::debug!("dry run: recording {}", render.task);
        match self.renders.lock() {
            Ok(mut renders) => renders.push(render),
            Err(poisoned) => poisoned.into_inner().push(render),
        }
    }

    /// Everything recorded so far, in render order
    pub fn renders(&self) -> Vec<Render> {
        match self.renders.lock() {
            Ok(renders) => renders.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether any recorded task would create or modify an object
    pub fn has_changes(&self) -> bool {
        self.renders().iter().any(Render::has_changes)
    }

    /// Write a human-readable summary of intended changes
    pub fn print_report(&self, out: &mut impl Write) -> io::Result<()> {
        let mut renders = self.renders();
        renders.sort_by(|a, b| a.task.cmp(&b.task));

        let (creates, updates): (Vec<_>, Vec<_>) = renders
            .iter()
            .filter(|r| r.has_changes())
            .partition(|r| r.is_create());

        if creates.is_empty() && updates.is_empty() {
            writeln!(out, "No changes need to be applied")?;
            return Ok(());
        }

        if !creates.is_empty() {
            writeln!(out, "Will create resources:")?;
            for render in &creates {
                writeln!(out, "  {}", render.task)?;
                write_changes(out, &render.change_list)?;
            }
            writeln!(out)?;
        }

        if !updates.is_empty() {
            writeln!(out, "Will modify resources:")?;
            for render in &updates {
                writeln!(out, "  {}", render.task)?;
                write_changes(out, &render.change_list)?;
            }
            writeln!(out)?;
        }

        Ok(())
    }
}

/// Write change lines in the `  \t<field>\t<description>` layout
pub(crate) fn write_changes(out: &mut impl Write, changes: &[Change]) -> io::Result<()> {
    for change in changes {
        let lines: Vec<&str> = change.description.split('\n').collect();
        if lines.len() == 1 {
            writeln!(out, "  \t{:<20}\t{}", change.field_name, change.description)?;
        } else {
            writeln!(out, "  \t{:<20}", change.field_name)?;
            for line in lines {
                writeln!(out, "  \t{:<20}\t{}", "", line)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeKind;
    use serde_json::json;

    fn render(task: &str, actual: Option<Value>, change_list: Vec<Change>) -> Render {
        Render {
            task: task.to_string(),
            actual,
            expected: json!({}),
            changes: json!({}),
            change_list,
        }
    }

    #[test]
    fn test_empty_report() {
        let target = DryRunTarget::new();
        let mut out = Vec::new();
        target.print_report(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No changes need to be applied\n");
        assert!(!target.has_changes());
    }

    #[test]
    fn test_report_groups_creates_and_updates() {
        let target = DryRunTarget::new();
        target.record(render("Subnet/b", None, Vec::new()));
        target.record(render(
            "Network/a",
            Some(json!({})),
            vec![Change {
                field_name: "cidr".into(),
                description: "10.0.0.0/16 -> 10.1.0.0/16".into(),
                kind: ChangeKind::Modified,
            }],
        ));
        target.record(render("Network/unchanged", Some(json!({})), Vec::new()));

        let mut out = Vec::new();
        target.print_report(&mut out).unwrap();
        let report = String::from_utf8(out).unwrap();

        assert!(report.contains("Will create resources:\n  Subnet/b\n"));
        assert!(report.contains("Will modify resources:\n  Network/a\n"));
        assert!(report.contains("cidr"));
        assert!(!report.contains("Network/unchanged"));
        assert!(target.has_changes());
    }

    #[test]
    fn test_multi_line_change_layout() {
        let mut out = Vec::new();
        write_changes(
            &mut out,
            &[Change {
                field_name: "tags".into(),
                description: "a: 1 -> 2\nb: 3 -> 4".into(),
                kind: ChangeKind::Modified,
            }],
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].trim_end(), "  \ttags");
        assert!(lines[1].ends_with("\ta: 1 -> 2"));
    }

    #[test]
    fn test_dry_run_target_kind() {
        let target = Target::dry_run();
        assert!(target.is_dry_run());
        assert_eq!(target.kind(), "dryrun");
        assert!(!target.process_deletions());
    }
}
