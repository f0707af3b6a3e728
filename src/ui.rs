use colored::Colorize;
use converge::{Change, ChangeKind, Render};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Plan output
// ============================================================================

/// Display what a dry run would do, grouped by task type
pub fn display_renders(renders: &[Render]) {
    let mut pending: Vec<&Render> = renders.iter().filter(|r| r.has_changes()).collect();
    if pending.is_empty() {
        println!();
        println!("  {} No changes need to be applied", "✓".green());
        return;
    }
    pending.sort_by(|a, b| a.task.cmp(&b.task));

    println!();
    for render in &pending {
        let symbol = if render.is_create() {
            "+".green()
        } else {
            "~".yellow()
        };
        println!("  {} {}", symbol, render.task.bold());
        for change in &render.change_list {
            display_change(change);
        }
    }

    let creates = pending.iter().filter(|r| r.is_create()).count();
    println!();
    println!(
        "  Summary: {} to create, {} to modify",
        creates.to_string().green(),
        (pending.len() - creates).to_string().yellow()
    );
}

fn display_change(change: &Change) {
    let field = match change.kind {
        ChangeKind::Created => change.field_name.green(),
        ChangeKind::Modified => change.field_name.yellow(),
    };
    if !change.is_multi_line() {
        println!("      {:<20} {}", field, change.description.dimmed());
        return;
    }
    println!("      {field}");
    for line in change.description.lines() {
        let line = match line.chars().next() {
            Some('+') => line.green(),
            Some('-') => line.red(),
            _ => line.dimmed(),
        };
        println!("        {line}");
    }
}
