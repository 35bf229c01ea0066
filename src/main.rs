mod cli;
mod commands;
mod document;
mod engine;
mod paths;
mod progress;
mod state;
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
    };

    match cli.command {
        Command::Plan(args) => commands::stack::plan(&ctx, args),
        Command::Graph(args) => commands::stack::graph(&ctx, args),
        Command::Validate(args) => commands::stack::validate(&ctx, args),
        Command::Outputs(args) => commands::stack::outputs(&ctx, args),
        Command::Diff(args) => commands::stack::diff(&ctx, args),
        Command::Apply(args) => commands::stack::apply(&ctx, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "stackplan", &mut io::stdout());
            Ok(())
        }
    }
}
