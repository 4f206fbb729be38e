//! Command line interface definition using clap.
//!
//! This module defines the [`Cli`] structure and its subcommands. The CLI
//! is a thin collaborator: all real work happens in [`crate::runner`].

use crate::manifest::DEFAULT_MANIFEST;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// A parallel build executor for C and C++ toolchains.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the build manifest.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_MANIFEST)]
    pub file: Utf8PathBuf,

    /// Run as if started in this directory.
    ///
    /// This affects manifest lookup, output paths, and the binary cache.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub directory: Option<Utf8PathBuf>,

    /// Number of parallel build jobs; defaults to the hardware thread count.
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Enable verbose diagnostic logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Optional subcommand to execute; defaults to `build` when omitted.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Apply the default command if none was specified.
    #[must_use]
    pub fn with_default_command(mut self) -> Self {
        if self.command.is_none() {
            self.command = Some(Commands::Build(BuildArgs::default()));
        }
        self
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            file: Utf8PathBuf::from(DEFAULT_MANIFEST),
            directory: None,
            jobs: None,
            verbose: false,
            command: None,
        }
        .with_default_command()
    }
}

/// Arguments accepted by the `build` command.
#[derive(Debug, Args, Clone, Default, PartialEq, Eq)]
pub struct BuildArgs {
    /// Print the commands that would run without executing anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

/// Available top-level commands.
#[derive(Debug, Subcommand, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Build all stale steps in dependency order.
    Build(BuildArgs),

    /// Remove build outputs, depfiles, response files, and the binary cache.
    Clean,

    /// Print the dependency graph in Graphviz DOT format.
    Graph,

    /// Write compile_commands.json covering every compile step.
    Compdb,
}
