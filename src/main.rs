mod cli;
mod commands;
mod local;
mod paths;
mod plan;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Explicit state directory (flag or `UPUP_STATE_DIR`)
    pub state_dir: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        state_dir: cli.state_dir,
    };
    log::trace!("verbosity {}", ctx.verbose);

    match cli.command {
        Command::Plan(args) => commands::apply::plan(&ctx, args),
        Command::Apply(args) => commands::apply::apply(&ctx, args),
        Command::Defaults(args) => commands::defaults::run(&ctx, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "upup", &mut io::stdout());
            Ok(())
        }
    }
}
