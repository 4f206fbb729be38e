//! Manifest loading.
//!
//! A `catalyst.build` manifest is line-oriented: `DEF|key|value` lines
//! populate the definition table and `tool|inputs|output` lines declare
//! build steps, with inputs comma-separated. Lines are `\n`-delimited with
//! an optional trailing `\r`; empty lines and `#` comments are ignored.
//!
//! Parsing prefers the binary cache: when `.catalyst.bin` is strictly newer
//! than the manifest the snapshot is loaded instead and the text is never
//! touched. After a successful text parse the snapshot is rewritten as a
//! best-effort side effect.

use crate::cache;
use crate::error::BuildError;
use crate::graph::{Builder, Tool};
use crate::mmap::MappedFile;
use camino::Utf8Path;
use tracing::debug;

/// Default manifest filename.
pub const DEFAULT_MANIFEST: &str = "catalyst.build";

/// Parse the manifest at `path` into a populated [`Builder`], using the
/// binary cache in the working directory when it is fresh.
///
/// # Errors
///
/// Returns [`BuildError::MalformedManifest`] for unparseable lines,
/// [`BuildError::DuplicateProducer`] when two steps share an output, and
/// [`BuildError::Io`] when the manifest cannot be read. A stale or corrupt
/// binary cache is never an error here; it falls back to the text parse.
pub fn parse(path: &Utf8Path) -> Result<Builder, BuildError> {
    if cache::is_fresh(path) {
        match cache::load() {
            Ok(builder) => {
                debug!(manifest = %path, "loaded graph from binary cache");
                return Ok(builder);
            }
            Err(err) => {
                debug!(%err, "binary cache rejected; falling back to text parse");
            }
        }
    }
    let builder = parse_text(path)?;
    if let Err(err) = cache::write(&builder) {
        debug!(%err, "failed to write binary cache");
    }
    Ok(builder)
}

/// Parse the manifest text at `path`, bypassing the binary cache entirely.
///
/// # Errors
///
/// Same conditions as [`parse`], minus the cache fast path.
pub fn parse_text(path: &Utf8Path) -> Result<Builder, BuildError> {
    let file = MappedFile::open(path)
        .map_err(|err| BuildError::io(format!("opening manifest {path}"), err))?;
    let content = std::str::from_utf8(file.bytes()).map_err(|_| BuildError::MalformedManifest {
        reason: "manifest is not valid UTF-8".to_owned(),
        line: String::new(),
    })?;

    let mut builder = Builder::default();
    for raw_line in content.split('\n') {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(def) = line.strip_prefix("DEF|") {
            parse_def(def, line, &mut builder)?;
        } else {
            parse_step(line, &mut builder)?;
        }
    }
    Ok(builder)
}

fn malformed(reason: &str, line: &str) -> BuildError {
    BuildError::MalformedManifest {
        reason: reason.to_owned(),
        line: line.to_owned(),
    }
}

fn parse_def(def: &str, line: &str, builder: &mut Builder) -> Result<(), BuildError> {
    // The value may contain further pipes; only the first one delimits.
    let (key, value) = def
        .split_once('|')
        .ok_or_else(|| malformed("missing second pipe in definition", line))?;
    builder.add_definition(key, value);
    Ok(())
}

fn parse_step(line: &str, builder: &mut Builder) -> Result<(), BuildError> {
    let (tool_name, rest) = line
        .split_once('|')
        .ok_or_else(|| malformed("missing first pipe in step", line))?;
    let (inputs_raw, output) = rest
        .split_once('|')
        .ok_or_else(|| malformed("missing second pipe in step", line))?;
    let tool = Tool::from_name(tool_name)
        .ok_or_else(|| malformed(&format!("unknown tool `{tool_name}`"), line))?;
    builder.add_step(tool, inputs_raw, output)?;
    Ok(())
}
