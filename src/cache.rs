//! Binary snapshot of the parsed graph.
//!
//! After a text parse the populated graph and definition table are written
//! to `.catalyst.bin` in the working directory. On the next invocation,
//! when the snapshot is strictly newer than the manifest, it is loaded in
//! place of the text parse: one memory map, one bounds-checked pass, no
//! line splitting and no depfile reads.
//!
//! Layout (all integers little-endian `u64`): a fixed header, then the
//! definition, node, and step records in order, then a deduplicated string
//! pool. String fields are `(offset, len)` pairs relative to the pool base,
//! which sits at `file_size - strings_size`.

use crate::error::BuildError;
use crate::graph::{BuildGraph, BuildStep, Builder, Definitions, Node, Tool};
use crate::mmap::MappedFile;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fs;

/// Snapshot filename, resolved in the working directory.
pub const CACHE_FILE: &str = ".catalyst.bin";

/// Sentinel encoding an absent `step_id` or `depfile_inputs`.
const NONE_SENTINEL: u64 = u64::MAX;

const HEADER_LEN: usize = 40;

/// The magic doubles as a platform tag: node paths are platform-specific,
/// so a cache written on one OS is rejected on another.
#[cfg(target_os = "linux")]
const MAGIC: &[u8; 8] = b"CATBL001";
#[cfg(target_os = "macos")]
const MAGIC: &[u8; 8] = b"CATBM001";
#[cfg(target_os = "windows")]
const MAGIC: &[u8; 8] = b"CATBW001";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const MAGIC: &[u8; 8] = b"CATBP001";

/// True when the snapshot exists and is strictly newer than the manifest,
/// meaning the text parse can be skipped.
#[must_use]
pub fn is_fresh(manifest: &Utf8Path) -> bool {
    let mtime = |path: &Utf8Path| fs::metadata(path.as_std_path()).and_then(|m| m.modified()).ok();
    match (mtime(Utf8Path::new(CACHE_FILE)), mtime(manifest)) {
        (Some(cache_time), Some(manifest_time)) => cache_time > manifest_time,
        _ => false,
    }
}

/// Remove the snapshot if present.
///
/// # Errors
///
/// Returns [`BuildError::Io`] when an existing snapshot cannot be removed.
pub fn remove() -> Result<(), BuildError> {
    match fs::remove_file(CACHE_FILE) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(BuildError::io(format!("removing {CACHE_FILE}"), err)),
    }
}

/// Deduplicating accumulator for the trailing string pool.
#[derive(Default)]
struct StringPool {
    data: Vec<u8>,
    seen: HashMap<String, (u64, u64)>,
}

impl StringPool {
    fn add(&mut self, s: &str) -> (u64, u64) {
        if let Some(&reference) = self.seen.get(s) {
            return reference;
        }
        let reference = (self.data.len() as u64, s.len() as u64);
        self.data.extend_from_slice(s.as_bytes());
        self.seen.insert(s.to_owned(), reference);
        reference
    }
}

fn push_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_string_ref(out: &mut Vec<u8>, reference: (u64, u64)) {
    push_u64(out, reference.0);
    push_u64(out, reference.1);
}

/// Serialize `builder` to [`CACHE_FILE`].
///
/// # Errors
///
/// Returns [`BuildError::Io`] when the snapshot cannot be written. Callers
/// on the parse path treat this as best-effort and only log it.
pub fn write(builder: &Builder) -> Result<(), BuildError> {
    let graph = builder.graph();
    let definitions = builder.definitions();
    let mut pool = StringPool::default();

    let mut body = Vec::new();
    for (key, value) in definitions {
        push_string_ref(&mut body, pool.add(key));
        push_string_ref(&mut body, pool.add(value));
    }

    for node in graph.nodes() {
        push_string_ref(&mut body, pool.add(node.path.as_str()));
        push_u64(&mut body, node.step_id.map_or(NONE_SENTINEL, |id| id as u64));
        push_u64(&mut body, node.out_edges.len() as u64);
        for &edge in &node.out_edges {
            push_u64(&mut body, edge as u64);
        }
    }

    for step in graph.steps() {
        push_string_ref(&mut body, pool.add(step.tool.as_str()));
        push_string_ref(&mut body, pool.add(&step.inputs_raw));
        push_string_ref(&mut body, pool.add(step.output.as_str()));
        match &step.depfile_inputs {
            None => push_u64(&mut body, NONE_SENTINEL),
            Some(deps) => {
                push_u64(&mut body, deps.len() as u64);
                for dep in deps {
                    push_string_ref(&mut body, pool.add(dep.as_str()));
                }
            }
        }
    }

    let mut out = Vec::with_capacity(HEADER_LEN + body.len() + pool.data.len());
    out.extend_from_slice(MAGIC);
    push_u64(&mut out, definitions.len() as u64);
    push_u64(&mut out, graph.nodes().len() as u64);
    push_u64(&mut out, graph.steps().len() as u64);
    push_u64(&mut out, pool.data.len() as u64);
    out.extend_from_slice(&body);
    out.extend_from_slice(&pool.data);

    fs::write(CACHE_FILE, out).map_err(|err| BuildError::io(format!("writing {CACHE_FILE}"), err))
}

/// Bounds-checked cursor over the mapped snapshot.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], BuildError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| BuildError::BinaryCacheInvalid("truncated record".to_owned()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u64(&mut self) -> Result<u64, BuildError> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
    }

    fn index(&mut self, bound: u64, what: &str) -> Result<usize, BuildError> {
        let value = self.u64()?;
        if value >= bound {
            return Err(BuildError::BinaryCacheInvalid(format!(
                "{what} {value} out of range"
            )));
        }
        Ok(value as usize)
    }
}

/// Resolves `(offset, len)` references against the trailing string pool.
struct Pool<'a> {
    bytes: &'a [u8],
}

impl<'a> Pool<'a> {
    fn get(&self, reader: &mut Reader<'_>) -> Result<&'a str, BuildError> {
        let pool = self.bytes;
        let offset = reader.u64()? as usize;
        let len = reader.u64()? as usize;
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= pool.len())
            .ok_or_else(|| {
                BuildError::BinaryCacheInvalid("string reference out of range".to_owned())
            })?;
        std::str::from_utf8(&pool[offset..end])
            .map_err(|_| BuildError::BinaryCacheInvalid("string pool is not UTF-8".to_owned()))
    }
}

/// Deserialize [`CACHE_FILE`] into a fresh [`Builder`].
///
/// # Errors
///
/// Returns [`BuildError::BinaryCacheInvalid`] for a missing, truncated,
/// mistagged, or inconsistent snapshot. Callers fall back to the text
/// parse.
pub fn load() -> Result<Builder, BuildError> {
    let file = MappedFile::open(Utf8Path::new(CACHE_FILE))
        .map_err(|err| BuildError::BinaryCacheInvalid(format!("mapping {CACHE_FILE}: {err}")))?;
    let bytes = file.bytes();
    if bytes.len() < HEADER_LEN {
        return Err(BuildError::BinaryCacheInvalid(
            "too small for header".to_owned(),
        ));
    }

    let mut reader = Reader { bytes, pos: 0 };
    let magic = reader.take(8)?;
    if magic != MAGIC {
        return Err(BuildError::BinaryCacheInvalid(
            "magic or version mismatch".to_owned(),
        ));
    }
    let num_definitions = reader.u64()?;
    let num_nodes = reader.u64()?;
    let num_steps = reader.u64()?;
    let strings_size = reader.u64()? as usize;
    if strings_size > bytes.len() - HEADER_LEN {
        return Err(BuildError::BinaryCacheInvalid(
            "strings_size exceeds file".to_owned(),
        ));
    }
    let pool = Pool {
        bytes: &bytes[bytes.len() - strings_size..],
    };
    // Records must not run into the pool.
    reader.bytes = &bytes[..bytes.len() - strings_size];

    let mut definitions = Definitions::new();
    for _ in 0..num_definitions {
        let key = pool.get(&mut reader)?;
        let value = pool.get(&mut reader)?;
        definitions.entry(key.to_owned()).or_insert_with(|| value.to_owned());
    }

    let mut nodes = Vec::with_capacity(usize::try_from(num_nodes).unwrap_or(0));
    for _ in 0..num_nodes {
        let path = Utf8PathBuf::from(pool.get(&mut reader)?);
        let step_id_raw = reader.u64()?;
        let step_id = if step_id_raw == NONE_SENTINEL {
            None
        } else if step_id_raw < num_steps {
            Some(step_id_raw as usize)
        } else {
            return Err(BuildError::BinaryCacheInvalid(format!(
                "step id {step_id_raw} out of range"
            )));
        };
        let num_out_edges = reader.u64()?;
        let mut out_edges = Vec::with_capacity(usize::try_from(num_out_edges).unwrap_or(0));
        for _ in 0..num_out_edges {
            out_edges.push(reader.index(num_nodes, "edge target")?);
        }
        nodes.push(Node {
            path,
            out_edges,
            step_id,
        });
    }

    let mut steps = Vec::with_capacity(usize::try_from(num_steps).unwrap_or(0));
    for _ in 0..num_steps {
        let tool_name = pool.get(&mut reader)?;
        let tool = Tool::from_name(tool_name).ok_or_else(|| {
            BuildError::BinaryCacheInvalid(format!("unknown tool `{tool_name}`"))
        })?;
        let inputs_raw = pool.get(&mut reader)?.to_owned();
        let output = Utf8PathBuf::from(pool.get(&mut reader)?);
        let depfile_count = reader.u64()?;
        let depfile_inputs = if depfile_count == NONE_SENTINEL {
            None
        } else {
            let mut deps = Vec::with_capacity(usize::try_from(depfile_count).unwrap_or(0));
            for _ in 0..depfile_count {
                deps.push(Utf8PathBuf::from(pool.get(&mut reader)?));
            }
            Some(deps)
        };
        // `parsed_inputs` is derived, not stored; recompute it from the raw
        // specification exactly as the text parse would.
        let parsed_inputs = inputs_raw
            .split(',')
            .filter(|segment| !segment.is_empty())
            .map(Utf8PathBuf::from)
            .collect();
        steps.push(BuildStep {
            tool,
            inputs_raw,
            parsed_inputs,
            output,
            depfile_inputs,
        });
    }

    Ok(Builder::from_parts(
        BuildGraph::from_parts(nodes, steps),
        definitions,
    ))
}
