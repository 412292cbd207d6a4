mod cli;
mod commands;
mod config;
mod manifest;
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
    pub quiet: bool,
    pub settings: config::Settings,
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

    if let Command::Completions { shell } = cli.command {
        generate(shell, &mut Cli::command(), "provisync", &mut io::stdout());
        return Ok(());
    }

    let settings = config::Settings::load(
        cli.config.as_deref(),
        &cli.connection,
        cli.state.as_deref(),
    )?;
    let ctx = Context {
        quiet: cli.quiet,
        settings,
    };

    match cli.command {
        Command::Plan { manifest } => commands::plan::run(&ctx, &manifest),
        Command::Apply(args) => commands::apply::run(&ctx, &args),
        Command::Show(args) => commands::show::run(&ctx, &args),
        Command::Destroy { yes } => commands::destroy::run(&ctx, yes),
        Command::Completions { .. } => Ok(()),
    }
}
