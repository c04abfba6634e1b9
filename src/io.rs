use std::borrow::Cow;
use std::fs::File;
use std::io::Read;
use std::ops::Deref;
use std::path::Path;

use anyhow::{Context, Result};
use memmap2::Mmap;

/// Threshold in bytes above which we attempt to use mmap for reading.
/// Callers can override via API; this is a reasonable default.
pub const DEFAULT_MMAP_THRESHOLD_BYTES: u64 = 16 * 1024 * 1024; // 16 MiB

/// Decide whether to use mmap based on file size and threshold.
pub fn should_use_mmap(file_size_bytes: u64, threshold_bytes: u64) -> bool {
    file_size_bytes > 0 && file_size_bytes >= threshold_bytes
}

/// Whole contents of an input file, either read into memory or mapped.
pub enum FileBytes {
    Buffered(Vec<u8>),
    Mapped(Mmap),
}

impl Deref for FileBytes {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        match self {
            FileBytes::Buffered(v) => v,
            FileBytes::Mapped(m) => m,
        }
    }
}

/// Read a file fully using a buffered reader (non-mmap).
pub fn read_bufread<P: AsRef<Path>>(path: P) -> Result<FileBytes> {
    let mut file =
        File::open(&path).with_context(|| format!("open {}", path.as_ref().display()))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .with_context(|| format!("read {}", path.as_ref().display()))?;
    Ok(FileBytes::Buffered(buf))
}

/// Map a file into memory. Avoids copying large inputs up front.
pub fn read_mmap<P: AsRef<Path>>(path: P) -> Result<FileBytes> {
    let file = File::open(&path).with_context(|| format!("open {}", path.as_ref().display()))?;
    let mmap =
        unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", path.as_ref().display()))?;
    Ok(FileBytes::Mapped(mmap))
}

/// Choose mmap or bufread based on the file size.
pub fn read_auto<P: AsRef<Path>>(path: P, threshold_bytes: u64) -> Result<FileBytes> {
    let meta =
        std::fs::metadata(&path).with_context(|| format!("stat {}", path.as_ref().display()))?;
    if meta.is_file() && should_use_mmap(meta.len(), threshold_bytes) {
        read_mmap(path)
    } else {
        read_bufread(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

/// Decode a whole file. A single invalid UTF-8 sequence anywhere sends the
/// entire buffer through Latin-1, which maps every byte to one char and
/// never fails.
pub fn decode(bytes: &[u8]) -> (Cow<'_, str>, TextEncoding) {
    match std::str::from_utf8(bytes) {
        Ok(s) => (Cow::Borrowed(s), TextEncoding::Utf8),
        Err(_) => (
            Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
            TextEncoding::Latin1,
        ),
    }
}

/// Iterate `\n`-terminated lines with the newline removed. A final line
/// without a newline is yielded; a trailing newline does not produce an
/// extra empty line. `\r` is kept as part of the line.
pub fn lines(text: &str) -> Lines<'_> {
    Lines { text, pos: 0 }
}

pub struct Lines<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a str;
    fn next(&mut self) -> Option<Self::Item> {
        let data = self.text.as_bytes();
        if self.pos >= data.len() {
            return None;
        }
        let start = self.pos;
        if let Some(off) = memchr::memchr(b'\n', &data[self.pos..]) {
            let end = self.pos + off;
            self.pos = end + 1;
            Some(&self.text[start..end])
        } else {
            self.pos = data.len();
            Some(&self.text[start..])
        }
    }
}
