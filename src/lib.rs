//! Catalyst core library.
//!
//! This library implements a parallel build executor for C/C++ toolchains:
//! a pipe-delimited manifest is parsed into a file-level dependency graph,
//! an mtime-based staleness oracle decides which steps must rerun, and a
//! work-queue scheduler executes the stale steps on a pool of workers while
//! respecting dependency order. A binary snapshot of the parsed graph is
//! kept on disk so repeated invocations skip text parsing entirely.

pub mod cache;
pub mod cli;
pub mod emit;
pub mod error;
pub mod executor;
pub mod graph;
pub mod manifest;
pub mod mmap;
pub mod process;
pub mod runner;
pub mod stat_cache;
