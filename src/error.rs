//! Error types shared across the build pipeline.

use crate::graph::Tool;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised while parsing manifests, loading the binary cache, or
/// executing builds.
///
/// Parse-time variants abort before execution. `BinaryCacheInvalid` is
/// recovered locally by falling back to the text parse. Execution variants
/// are fatal for the whole build: peers already in flight finish, then the
/// first error is returned.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A manifest line did not match either recognized line kind.
    #[error("malformed manifest line ({reason}): {line}")]
    MalformedManifest {
        /// What was wrong with the line.
        reason: String,
        /// The offending line, verbatim.
        line: String,
    },

    /// Two steps named the same output path.
    #[error("duplicate producer for output: {0}")]
    DuplicateProducer(Utf8PathBuf),

    /// The dependency graph contains a cycle through the named path.
    #[error("cycle detected in the build graph at: {0}")]
    Cycle(Utf8PathBuf),

    /// The on-disk binary cache is truncated, mistagged, or inconsistent.
    #[error("invalid binary cache: {0}")]
    BinaryCacheInvalid(String),

    /// A build step's subprocess returned a nonzero exit code.
    #[error("{tool} step for {output} exited with code {code}")]
    StepFailed {
        /// Tool kind of the failing step.
        tool: Tool,
        /// Output path of the failing step.
        output: Utf8PathBuf,
        /// Exit code reported by the subprocess.
        code: i32,
    },

    /// The OS refused to launch a child process.
    #[error("failed to spawn subprocess: {0}")]
    SubprocessSpawnFailed(String),

    /// The scheduler found no runnable work while nodes remained unfinished.
    ///
    /// Unreachable after topological validation, but reported rather than
    /// hanging the worker pool.
    #[error("scheduler stalled with {completed} of {total} nodes complete")]
    Stall {
        /// Nodes finished before the stall.
        completed: usize,
        /// Total nodes in the graph.
        total: usize,
    },

    /// An I/O operation outside subprocess handling failed.
    #[error("{context}: {source}")]
    Io {
        /// Description of the failed operation.
        context: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
