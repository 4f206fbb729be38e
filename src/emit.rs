//! Auxiliary emitters: compile database and DOT graph.
//!
//! Both render the populated graph for external consumers. The compile
//! database follows the LSP/clang `compile_commands.json` convention; the
//! DOT output colors each node by its staleness so a render shows at a
//! glance what the next build would touch.

use crate::error::BuildError;
use crate::executor::{build_argv, needs_rebuild};
use crate::graph::{BuildGraph, Definitions};
use crate::stat_cache::StatCache;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::fmt::Write;

/// Default compile database filename.
pub const COMPILE_DB_FILE: &str = "compile_commands.json";

#[derive(Serialize)]
struct CompileDbEntry<'a> {
    directory: &'a str,
    arguments: Vec<String>,
    file: &'a str,
    output: &'a str,
}

/// Render `compile_commands.json` content covering every compile step,
/// regardless of staleness.
///
/// # Errors
///
/// Returns [`BuildError::Io`] when the working directory cannot be
/// resolved, and propagates argv construction failures.
pub fn compile_db(
    graph: &BuildGraph,
    definitions: &Definitions,
    manifest: &Utf8Path,
) -> Result<String, BuildError> {
    let directory = current_dir()?;

    let mut entries = Vec::new();
    for step in graph.steps() {
        if !matches!(step.tool, crate::graph::Tool::Cc | crate::graph::Tool::Cxx) {
            continue;
        }
        let arguments = build_argv(step, definitions, manifest, true)?;
        entries.push(CompileDbEntry {
            directory: directory.as_str(),
            arguments,
            file: step
                .parsed_inputs
                .first()
                .map_or("", |input| input.as_str()),
            output: step.output.as_str(),
        });
    }

    serde_json::to_string_pretty(&entries).map_err(|err| {
        BuildError::io(
            "serializing compile database".to_owned(),
            std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        )
    })
}

fn current_dir() -> Result<Utf8PathBuf, BuildError> {
    let dir = std::env::current_dir()
        .map_err(|err| BuildError::io("resolving working directory", err))?;
    Utf8PathBuf::from_path_buf(dir).map_err(|dir| {
        BuildError::io(
            format!("working directory {} is not valid UTF-8", dir.display()),
            std::io::Error::from(std::io::ErrorKind::InvalidData),
        )
    })
}

/// Render the dependency graph in Graphviz DOT form.
///
/// Nodes produced by a stale step are green, up-to-date outputs are white,
/// and plain source files are gray.
#[must_use]
pub fn dot(graph: &BuildGraph, manifest: &Utf8Path) -> String {
    let stats = StatCache::new();
    let mut out = String::from("digraph build {\n    rankdir=LR;\n");

    for node in graph.nodes() {
        let fill = match node.step_id {
            Some(step_id) if needs_rebuild(&graph.steps()[step_id], manifest, &stats) => "green",
            Some(_) => "white",
            None => "gray",
        };
        writeln!(
            out,
            "    \"{}\" [style=filled, fillcolor={fill}];",
            node.path
        )
        .expect("write graph node");
    }

    for node in graph.nodes() {
        for &successor in &node.out_edges {
            writeln!(
                out,
                "    \"{}\" -> \"{}\";",
                node.path,
                graph.nodes()[successor].path
            )
            .expect("write graph edge");
        }
    }

    out.push_str("}\n");
    out
}
