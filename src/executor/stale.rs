//! Staleness decisions for build steps.

use crate::graph::BuildStep;
use crate::stat_cache::StatCache;
use camino::Utf8Path;

/// Decide whether `step` must rerun.
///
/// A step is stale when its output is missing, when the manifest changed
/// after the output was produced, or when any depfile or parsed input did.
/// The manifest check matters: editing build instructions without touching
/// a source file must still rebuild.
pub fn needs_rebuild(step: &BuildStep, manifest: &Utf8Path, stats: &StatCache) -> bool {
    let Some(output_time) = stats.mtime(&step.output) else {
        return true;
    };
    if stats.changed_since(manifest, output_time) {
        return true;
    }
    if let Some(deps) = &step.depfile_inputs {
        if deps.iter().any(|dep| stats.changed_since(dep, output_time)) {
            return true;
        }
    }
    step.parsed_inputs
        .iter()
        .any(|input| stats.changed_since(input, output_time))
}
