//! Work-queue scheduler dispatching ready nodes onto a worker pool.
//!
//! All scheduling state lives behind one mutex and one condition variable:
//! an in-degree vector, a FIFO of ready nodes, a completion counter, an
//! active-worker counter, and the first error. Workers pull a ready node,
//! process it unlocked, then relock to retire it and release any successors
//! whose last dependency just finished. A step's subprocess is therefore
//! launched strictly after every producer in its dependency closure has
//! succeeded or been skipped as up to date.

use crate::error::BuildError;
use crate::executor::{command, stale, ExecutorConfig};
use crate::graph::{BuildGraph, Definitions, NodeId};
use crate::process;
use crate::stat_cache::StatCache;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use tracing::debug;

/// Batch size at which waking every worker beats individual signals.
const BROADCAST_THRESHOLD: usize = 10;

struct SchedulerState {
    in_degree: Vec<usize>,
    ready: VecDeque<NodeId>,
    completed: usize,
    active_workers: usize,
    error: Option<BuildError>,
}

struct Scheduler<'a> {
    graph: &'a BuildGraph,
    definitions: &'a Definitions,
    stats: &'a StatCache,
    config: &'a ExecutorConfig,
    total: usize,
    state: Mutex<SchedulerState>,
    work_available: Condvar,
}

/// Execute the graph on `config.jobs` workers and surface the first error.
pub(crate) fn run(
    graph: &BuildGraph,
    definitions: &Definitions,
    stats: &StatCache,
    config: &ExecutorConfig,
) -> Result<(), BuildError> {
    let total = graph.nodes().len();
    if total == 0 {
        return Ok(());
    }

    let mut in_degree = vec![0usize; total];
    for node in graph.nodes() {
        for &successor in &node.out_edges {
            in_degree[successor] += 1;
        }
    }
    let ready: VecDeque<NodeId> = (0..total).filter(|&id| in_degree[id] == 0).collect();

    let scheduler = Scheduler {
        graph,
        definitions,
        stats,
        config,
        total,
        state: Mutex::new(SchedulerState {
            in_degree,
            ready,
            completed: 0,
            active_workers: 0,
            error: None,
        }),
        work_available: Condvar::new(),
    };

    let jobs = effective_jobs(config.jobs);
    debug!(jobs, total, "starting worker pool");
    std::thread::scope(|scope| {
        for _ in 0..jobs {
            scope.spawn(|| scheduler.worker_loop());
        }
    });

    match scheduler.state.into_inner().error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Resolve a job count, treating `0` as hardware concurrency.
fn effective_jobs(jobs: usize) -> usize {
    if jobs > 0 {
        return jobs;
    }
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

impl Scheduler<'_> {
    fn worker_loop(&self) {
        loop {
            let node_id = {
                let mut state = self.state.lock();
                loop {
                    if state.error.is_some() || state.completed == self.total {
                        return;
                    }
                    if let Some(id) = state.ready.pop_front() {
                        state.active_workers += 1;
                        break id;
                    }
                    if state.active_workers == 0 {
                        // Nothing ready, nothing running, nodes remaining:
                        // the graph cannot make progress. Unreachable after
                        // topological validation, but reported rather than
                        // hanging the pool.
                        state.error = Some(BuildError::Stall {
                            completed: state.completed,
                            total: self.total,
                        });
                        state.completed = self.total;
                        self.work_available.notify_all();
                        return;
                    }
                    self.work_available.wait(&mut state);
                }
            };

            match self.process(node_id) {
                Ok(()) => self.retire(node_id),
                Err(err) => {
                    self.fail(err);
                    return;
                }
            }
        }
    }

    /// Run the node's step if it has one and it is stale.
    fn process(&self, node_id: NodeId) -> Result<(), BuildError> {
        let node = &self.graph.nodes()[node_id];
        let Some(step_id) = node.step_id else {
            return Ok(());
        };
        let step = &self.graph.steps()[step_id];

        if !stale::needs_rebuild(step, &self.config.manifest, self.stats) {
            debug!(output = %step.output, "up to date");
            return Ok(());
        }

        let argv = command::build_argv(
            step,
            self.definitions,
            &self.config.manifest,
            self.config.dry_run,
        )?;
        println!("{}", argv.join(" "));
        if self.config.dry_run {
            return Ok(());
        }

        let code = process::exec(&argv, None, None)?;
        if code != 0 {
            return Err(BuildError::StepFailed {
                tool: step.tool,
                output: step.output.clone(),
                code,
            });
        }
        Ok(())
    }

    /// Mark the node finished and release successors whose last dependency
    /// just completed.
    fn retire(&self, node_id: NodeId) {
        let mut state = self.state.lock();
        state.active_workers -= 1;
        state.completed += 1;

        let mut newly_ready = 0usize;
        for &successor in &self.graph.nodes()[node_id].out_edges {
            state.in_degree[successor] -= 1;
            if state.in_degree[successor] == 0 {
                state.ready.push_back(successor);
                newly_ready += 1;
            }
        }

        if state.completed == self.total || newly_ready >= BROADCAST_THRESHOLD {
            self.work_available.notify_all();
        } else {
            for _ in 0..newly_ready {
                self.work_available.notify_one();
            }
        }
    }

    /// Record the first failure and drain the pool: peers finish their
    /// current step but dispatch nothing new.
    fn fail(&self, err: BuildError) {
        let mut state = self.state.lock();
        state.active_workers -= 1;
        if state.error.is_none() {
            state.error = Some(err);
        }
        state.completed = self.total;
        self.work_available.notify_all();
    }
}
