//! Build graph structures.
//!
//! This module defines the file-level dependency graph built from a parsed
//! manifest: nodes are paths, edges point from a dependency to the nodes it
//! invalidates, and each node is optionally produced by one build step.
//! Nodes and steps are stored in contiguous arenas and referenced by index,
//! so the graph has no shared-ownership pointers and serializes directly.

mod depfile;
mod topo;

use crate::error::BuildError;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

/// Index of a node within its graph.
pub type NodeId = usize;

/// Index of a build step within its graph.
pub type StepId = usize;

/// Definition table mapping manifest `DEF` keys to raw values.
///
/// Keys are unique; the first definition of a key wins. Insertion order is
/// irrelevant to build semantics but is preserved so the binary cache is
/// emitted deterministically.
pub type Definitions = IndexMap<String, String>;

/// The tool invoked by a build step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tool {
    /// C compiler; reads a `<output>.d` depfile.
    Cc,
    /// C++ compiler; reads a `<output>.d` depfile.
    Cxx,
    /// Executable link via the C++ driver.
    Ld,
    /// Shared-object link via the C++ driver.
    Sld,
    /// Static archive via `ar rcs`.
    Ar,
}

impl Tool {
    /// Resolve a manifest tool name. Any other spelling is a parse error.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cc" => Some(Self::Cc),
            "cxx" => Some(Self::Cxx),
            "ld" => Some(Self::Ld),
            "sld" => Some(Self::Sld),
            "ar" => Some(Self::Ar),
            _ => None,
        }
    }

    /// The manifest spelling of this tool.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cc => "cc",
            Self::Cxx => "cxx",
            Self::Ld => "ld",
            Self::Sld => "sld",
            Self::Ar => "ar",
        }
    }

    /// Compiler steps emit and consume Make-style depfiles; link and archive
    /// steps do not.
    pub(crate) const fn reads_depfile(self) -> bool {
        matches!(self, Self::Cc | Self::Cxx)
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tool invocation contract: tool, inputs, and a single output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildStep {
    /// Tool kind.
    pub tool: Tool,
    /// The comma-separated input specification exactly as written in the
    /// manifest, retained for the binary-cache round trip.
    pub inputs_raw: String,
    /// `inputs_raw` split on `,` with empty segments discarded.
    pub parsed_inputs: Vec<Utf8PathBuf>,
    /// The path this step produces.
    pub output: Utf8PathBuf,
    /// Dependencies harvested from `<output>.d` at graph-construction time;
    /// `None` when no depfile existed.
    pub depfile_inputs: Option<Vec<Utf8PathBuf>>,
}

/// A path participating in the graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    /// The file path this node stands for.
    pub path: Utf8PathBuf,
    /// Indices of nodes that depend on this node: a change here invalidates
    /// every node listed.
    pub out_edges: Vec<NodeId>,
    /// The step producing this path, if any. At most one step may produce a
    /// given path.
    pub step_id: Option<StepId>,
}

/// The dependency graph of the build: nodes, edges, and the step list.
#[derive(Debug, Default)]
pub struct BuildGraph {
    nodes: Vec<Node>,
    steps: Vec<BuildStep>,
    index: HashMap<Utf8PathBuf, NodeId>,
}

impl BuildGraph {
    /// Retrieve the index of an existing node or create a new one at the
    /// back of the arena. Idempotent: paths are compared by byte equality
    /// and never normalized, because staleness decisions depend on the
    /// exact strings the manifest wrote.
    pub fn get_or_create_node(&mut self, path: &Utf8Path) -> NodeId {
        if let Some(&id) = self.index.get(path) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            path: path.to_owned(),
            out_edges: Vec::new(),
            step_id: None,
        });
        self.index.insert(path.to_owned(), id);
        id
    }

    /// Add a build step: create its output and input nodes, wire edges from
    /// every input to the output, and harvest `<output>.d` for compiler
    /// steps.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::DuplicateProducer`] when another step already
    /// produces `output`.
    pub fn add_step(
        &mut self,
        tool: Tool,
        inputs_raw: &str,
        output: &str,
    ) -> Result<StepId, BuildError> {
        let out_id = self.get_or_create_node(Utf8Path::new(output));
        if self.nodes[out_id].step_id.is_some() {
            return Err(BuildError::DuplicateProducer(self.nodes[out_id].path.clone()));
        }
        let step_id = self.steps.len();
        self.nodes[out_id].step_id = Some(step_id);

        let depfile_inputs = if tool.reads_depfile() {
            depfile::harvest(Utf8Path::new(&format!("{output}.d")))
        } else {
            None
        };
        if let Some(deps) = &depfile_inputs {
            for dep in deps {
                let in_id = self.get_or_create_node(dep);
                self.nodes[in_id].out_edges.push(out_id);
            }
        }

        let parsed_inputs: Vec<Utf8PathBuf> = inputs_raw
            .split(',')
            .filter(|segment| !segment.is_empty())
            .map(Utf8PathBuf::from)
            .collect();
        for input in &parsed_inputs {
            let in_id = self.get_or_create_node(input);
            self.nodes[in_id].out_edges.push(out_id);
        }

        self.steps.push(BuildStep {
            tool,
            inputs_raw: inputs_raw.to_owned(),
            parsed_inputs,
            output: self.nodes[out_id].path.clone(),
            depfile_inputs,
        });
        Ok(step_id)
    }

    /// All nodes, in creation order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All steps, in manifest order.
    #[must_use]
    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    /// Look up a node by its exact path.
    #[must_use]
    pub fn node_id(&self, path: &Utf8Path) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    /// Order the nodes so that every node precedes the nodes that depend on
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Cycle`] naming a node on a cycle when the graph
    /// is not acyclic; no partial order is returned.
    pub fn topo_sort(&self) -> Result<Vec<NodeId>, BuildError> {
        topo::sort(&self.nodes)
    }

    /// Reassemble a graph from decoded arenas, rebuilding the path index.
    /// Used by the binary-cache load path.
    pub(crate) fn from_parts(nodes: Vec<Node>, steps: Vec<BuildStep>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(id, node)| (node.path.clone(), id))
            .collect();
        Self { nodes, steps, index }
    }
}

/// Collects the graph and definition table while a manifest is parsed or a
/// binary cache is loaded.
#[derive(Debug, Default)]
pub struct Builder {
    graph: BuildGraph,
    definitions: Definitions,
}

impl Builder {
    /// Record a `DEF` entry. The first definition of a key wins; later
    /// redefinitions are ignored.
    pub fn add_definition(&mut self, key: &str, value: &str) {
        self.definitions
            .entry(key.to_owned())
            .or_insert_with(|| value.to_owned());
    }

    /// Add a build step to the underlying graph.
    ///
    /// # Errors
    ///
    /// Propagates [`BuildError::DuplicateProducer`] from the graph.
    pub fn add_step(
        &mut self,
        tool: Tool,
        inputs_raw: &str,
        output: &str,
    ) -> Result<StepId, BuildError> {
        self.graph.add_step(tool, inputs_raw, output)
    }

    /// The graph built so far.
    #[must_use]
    pub fn graph(&self) -> &BuildGraph {
        &self.graph
    }

    /// The definition table built so far.
    #[must_use]
    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    /// Consume the builder, yielding the completed graph and definitions.
    #[must_use]
    pub fn into_parts(self) -> (BuildGraph, Definitions) {
        (self.graph, self.definitions)
    }

    pub(crate) fn from_parts(graph: BuildGraph, definitions: Definitions) -> Self {
        Self { graph, definitions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn get_or_create_node_is_idempotent() {
        let mut graph = BuildGraph::default();
        let a = graph.get_or_create_node(Utf8Path::new("a.c"));
        let b = graph.get_or_create_node(Utf8Path::new("a.c"));
        assert_eq!(a, b);
        assert_eq!(graph.nodes().len(), 1);
    }

    #[test]
    fn paths_are_not_normalized() {
        let mut graph = BuildGraph::default();
        let plain = graph.get_or_create_node(Utf8Path::new("src/a.c"));
        let dotted = graph.get_or_create_node(Utf8Path::new("./src/a.c"));
        assert_ne!(plain, dotted);
    }

    #[test]
    fn add_step_wires_inputs_to_output() {
        let mut graph = BuildGraph::default();
        let step_id = graph.add_step(Tool::Ld, "a.o,b.o", "app").expect("add step");

        let out = graph.node_id(Utf8Path::new("app")).expect("output node");
        assert_eq!(graph.nodes()[out].step_id, Some(step_id));
        for input in ["a.o", "b.o"] {
            let id = graph.node_id(Utf8Path::new(input)).expect("input node");
            assert!(graph.nodes()[id].out_edges.contains(&out));
        }
        let step = &graph.steps()[step_id];
        assert_eq!(step.inputs_raw, "a.o,b.o");
        assert_eq!(
            step.parsed_inputs,
            vec![Utf8PathBuf::from("a.o"), Utf8PathBuf::from("b.o")]
        );
        assert!(step.depfile_inputs.is_none());
    }

    #[rstest]
    #[case("", 0)]
    #[case(",,", 0)]
    #[case("a.o,,b.o", 2)]
    #[case(",a.o", 1)]
    fn empty_input_segments_are_discarded(#[case] inputs: &str, #[case] expected: usize) {
        let mut graph = BuildGraph::default();
        let step_id = graph.add_step(Tool::Ar, inputs, "lib.a").expect("add step");
        assert_eq!(graph.steps()[step_id].parsed_inputs.len(), expected);
    }

    #[test]
    fn duplicate_producer_is_rejected() {
        let mut graph = BuildGraph::default();
        graph.add_step(Tool::Ar, "a.o", "lib.a").expect("first step");
        let err = graph.add_step(Tool::Ar, "b.o", "lib.a").expect_err("duplicate");
        assert!(matches!(
            err,
            BuildError::DuplicateProducer(path) if path == "lib.a"
        ));
    }

    #[test]
    fn first_definition_wins() {
        let mut builder = Builder::default();
        builder.add_definition("cc", "gcc");
        builder.add_definition("cc", "clang");
        assert_eq!(builder.definitions().get("cc").map(String::as_str), Some("gcc"));
    }

    #[rstest]
    #[case("cc", Some(Tool::Cc))]
    #[case("cxx", Some(Tool::Cxx))]
    #[case("ld", Some(Tool::Ld))]
    #[case("sld", Some(Tool::Sld))]
    #[case("ar", Some(Tool::Ar))]
    #[case("CC", None)]
    #[case("link", None)]
    #[case("", None)]
    fn tool_names_round_trip(#[case] name: &str, #[case] expected: Option<Tool>) {
        assert_eq!(Tool::from_name(name), expected);
        if let Some(tool) = expected {
            assert_eq!(tool.as_str(), name);
        }
    }
}
