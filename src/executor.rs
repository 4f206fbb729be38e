//! Build execution.
//!
//! The executor validates the graph, then drives the parallel scheduler:
//! staleness checks decide which steps rerun, the command builder turns a
//! step into an argv, and the worker pool dispatches ready nodes while
//! honoring dependency order.

mod command;
mod scheduler;
mod stale;

pub use command::build_argv;
pub use stale::needs_rebuild;

use crate::cache;
use crate::error::BuildError;
use crate::graph::{BuildGraph, Builder, Definitions};
use crate::manifest::DEFAULT_MANIFEST;
use crate::stat_cache::StatCache;
use camino::Utf8PathBuf;
use std::fs;
use tracing::debug;

/// Options controlling a build run.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Print commands without spawning subprocesses.
    pub dry_run: bool,
    /// Worker thread count; `0` selects the hardware thread count.
    pub jobs: usize,
    /// Manifest path, consulted by the staleness oracle: edited build
    /// instructions must rebuild even when no source changed.
    pub manifest: Utf8PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 0,
            manifest: Utf8PathBuf::from(DEFAULT_MANIFEST),
        }
    }
}

/// Drives a build of a populated graph.
pub struct Executor {
    graph: BuildGraph,
    definitions: Definitions,
    config: ExecutorConfig,
}

impl Executor {
    /// Take ownership of the parsed build representation.
    #[must_use]
    pub fn new(builder: Builder, config: ExecutorConfig) -> Self {
        let (graph, definitions) = builder.into_parts();
        Self {
            graph,
            definitions,
            config,
        }
    }

    /// The dependency graph being executed.
    #[must_use]
    pub fn graph(&self) -> &BuildGraph {
        &self.graph
    }

    /// The manifest's definition table.
    #[must_use]
    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    /// The configuration this executor runs under.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run every stale step in dependency order across the worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Cycle`] before any step runs when the graph is
    /// cyclic, and otherwise the first execution failure: `StepFailed`,
    /// `SubprocessSpawnFailed`, an I/O error from response-file handling,
    /// or `Stall` should the scheduler ever lose forward progress.
    pub fn execute(&self) -> Result<(), BuildError> {
        self.graph.topo_sort()?;
        let stats = StatCache::new();
        scheduler::run(&self.graph, &self.definitions, &stats, &self.config)
    }

    /// Remove everything the graph can produce: each step's output, its
    /// depfile and response file, and the binary cache.
    ///
    /// Missing files are ignored; removal failures on existing files are
    /// reported.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Io`] for the first artefact that exists but
    /// cannot be removed.
    pub fn clean(&self) -> Result<(), BuildError> {
        for step in self.graph.steps() {
            remove_artefact(step.output.as_str())?;
            remove_artefact(&format!("{}.d", step.output))?;
            remove_artefact(&format!("{}.rsp", step.output))?;
        }
        cache::remove()
    }
}

fn remove_artefact(path: &str) -> Result<(), BuildError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path, "removed");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(BuildError::io(format!("removing {path}"), err)),
    }
}
