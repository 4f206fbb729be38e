//! Read-only memory-mapped file access.
//!
//! Both the text manifest and the binary cache are read through a mapping
//! rather than buffered I/O, so parsing is a single pass over the page
//! cache with no intermediate copies.

use camino::Utf8Path;
use memmap2::Mmap;
use std::fs::File;
use std::io;

/// A file mapped read-only into memory.
///
/// Empty files are represented without a mapping, since mapping zero bytes
/// is rejected on several platforms.
#[derive(Debug)]
pub struct MappedFile {
    map: Option<Mmap>,
}

impl MappedFile {
    /// Map `path` read-only.
    ///
    /// # Errors
    ///
    /// Returns any error from opening, inspecting, or mapping the file.
    pub fn open(path: &Utf8Path) -> io::Result<Self> {
        let file = File::open(path.as_std_path())?;
        if file.metadata()?.len() == 0 {
            return Ok(Self { map: None });
        }
        // SAFETY: the mapping is private and read-only. Callers must not
        // truncate the file while the map is alive; manifests and caches are
        // rewritten via whole-file replacement, never in place.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map: Some(map) })
    }

    /// The mapped bytes; an empty slice for an empty file.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}
