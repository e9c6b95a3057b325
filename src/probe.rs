use memchr::memmem;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

const CHUNK_SIZE: usize = 64 * 1024;

/// Answers "does this file contain this literal?" without the caller loading
/// the file. Used only for oversized documents.
pub trait ContentProbe {
    fn has_pattern(&self, path: &Path, pattern: &str) -> io::Result<bool>;
}

/// Fixed-size chunked scan; memory stays at one chunk plus the pattern
/// length no matter how long the lines are.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamingProbe;

impl ContentProbe for StreamingProbe {
    fn has_pattern(&self, path: &Path, pattern: &str) -> io::Result<bool> {
        scan_chunks(File::open(path)?, pattern.as_bytes(), CHUNK_SIZE)
    }
}

/// Search `reader` chunk by chunk, carrying the last `needle.len() - 1` bytes
/// over so matches across a chunk boundary are still found.
fn scan_chunks<R: Read>(mut reader: R, needle: &[u8], chunk: usize) -> io::Result<bool> {
    if needle.is_empty() {
        return Ok(true);
    }
    let finder = memmem::Finder::new(needle);
    let keep = needle.len() - 1;
    let mut buf = vec![0u8; keep + chunk.max(1)];
    let mut carried = 0;

    loop {
        let read = match reader.read(&mut buf[carried..]) {
            Ok(0) => return Ok(false),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let filled = carried + read;
        if finder.find(&buf[..filled]).is_some() {
            return Ok(true);
        }
        carried = keep.min(filled);
        buf.copy_within(filled - carried..filled, 0);
    }
}

/// Probe backed by an in-memory map, for callers that already hold an index.
#[derive(Debug, Default, Clone)]
pub struct MemoryProbe {
    contents: HashMap<PathBuf, String>,
}

impl MemoryProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.contents.insert(path.into(), content.into());
    }
}

impl ContentProbe for MemoryProbe {
    fn has_pattern(&self, path: &Path, pattern: &str) -> io::Result<bool> {
        self.contents
            .get(path)
            .map(|c| c.contains(pattern))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}
