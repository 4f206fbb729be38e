//! CLI execution and command dispatch logic.
//!
//! This module keeps `main` minimal by providing a single entry point that
//! loads the manifest (or its binary cache) and hands the resulting graph
//! to the executor or one of the emitters.

use crate::cli::{BuildArgs, Cli, Commands};
use crate::emit;
use crate::executor::{Executor, ExecutorConfig};
use crate::manifest;
use anyhow::{Context, Result};
use std::fs;
use tracing::{debug, info};

/// Execute the parsed [`Cli`] commands.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded or the selected
/// command fails.
pub fn run(cli: &Cli) -> Result<()> {
    if let Some(dir) = &cli.directory {
        std::env::set_current_dir(dir.as_std_path())
            .with_context(|| format!("changing directory to {dir}"))?;
    }
    let command = cli
        .command
        .clone()
        .unwrap_or(Commands::Build(BuildArgs::default()));
    match command {
        Commands::Build(args) => handle_build(cli, &args),
        Commands::Clean => handle_clean(cli),
        Commands::Graph => handle_graph(cli),
        Commands::Compdb => handle_compdb(cli),
    }
}

/// Load the manifest and wrap the result in an [`Executor`].
fn load_executor(cli: &Cli, dry_run: bool) -> Result<Executor> {
    let builder = manifest::parse(&cli.file)
        .with_context(|| format!("loading manifest at {}", cli.file))?;
    debug!(
        nodes = builder.graph().nodes().len(),
        steps = builder.graph().steps().len(),
        definitions = builder.definitions().len(),
        "manifest loaded"
    );
    let config = ExecutorConfig {
        dry_run,
        jobs: cli.jobs.unwrap_or(0),
        manifest: cli.file.clone(),
    };
    Ok(Executor::new(builder, config))
}

fn handle_build(cli: &Cli, args: &BuildArgs) -> Result<()> {
    let executor = load_executor(cli, args.dry_run)?;
    executor.execute().context("build failed")?;
    Ok(())
}

fn handle_clean(cli: &Cli) -> Result<()> {
    let executor = load_executor(cli, false)?;
    executor.clean().context("clean failed")?;
    info!("removed build artefacts");
    Ok(())
}

fn handle_graph(cli: &Cli) -> Result<()> {
    let executor = load_executor(cli, true)?;
    print!("{}", emit::dot(executor.graph(), &cli.file));
    Ok(())
}

fn handle_compdb(cli: &Cli) -> Result<()> {
    let executor = load_executor(cli, true)?;
    let json = emit::compile_db(executor.graph(), executor.definitions(), &cli.file)
        .context("rendering compile database")?;
    fs::write(emit::COMPILE_DB_FILE, json)
        .with_context(|| format!("writing {}", emit::COMPILE_DB_FILE))?;
    info!(path = emit::COMPILE_DB_FILE, "wrote compile database");
    Ok(())
}
