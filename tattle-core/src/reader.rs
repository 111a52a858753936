//! Incremental log file reader
//!
//! Reads only the bytes appended since the last checkpointed offset, using
//! a fixed-size chunk buffer so memory stays bounded regardless of file
//! size. Newline-delimited records are reassembled across chunk
//! boundaries; an unterminated trailing fragment is returned as a unit
//! because the offset advances to end-of-file either way.

use crate::error::Result;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Fixed read buffer size. Not proportional to file size.
pub const CHUNK_SIZE: usize = 8192;

/// Result of one incremental read.
#[derive(Debug, Default)]
pub struct ReadBatch {
    /// Complete, non-blank lines in file order
    pub lines: Vec<String>,
    /// Offset the caller should checkpoint (end of the bytes consumed)
    pub new_offset: u64,
}

/// Reads newly appended bytes of a single file.
pub struct IncrementalReader {
    chunk_size: usize,
}

impl IncrementalReader {
    pub fn new() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Reader with a custom chunk size, for exercising boundary handling.
    #[cfg(test)]
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    /// Read everything appended between `from_offset` and the current end
    /// of file.
    ///
    /// Returns an empty batch when the file has not grown (or has shrunk;
    /// the offset is left untouched so a truncated file is simply ignored
    /// until the session rotates).
    pub fn read_new(&self, path: &Path, from_offset: u64) -> Result<ReadBatch> {
        let size = std::fs::metadata(path)?.len();
        if from_offset >= size {
            return Ok(ReadBatch {
                lines: Vec::new(),
                new_offset: from_offset,
            });
        }

        let mut file = File::open(path)?;
        if from_offset > 0 {
            file.seek(SeekFrom::Start(from_offset))?;
        }

        let mut lines = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut buf = vec![0u8; self.chunk_size];
        let mut remaining = (size - from_offset) as usize;

        while remaining > 0 {
            let want = remaining.min(self.chunk_size);
            let n = file.read(&mut buf[..want])?;
            if n == 0 {
                // File shrank mid-read; keep what we have
                break;
            }
            remaining -= n;

            let mut start = 0;
            for i in 0..n {
                if buf[i] == b'\n' {
                    pending.extend_from_slice(&buf[start..i]);
                    push_line(&mut lines, &mut pending);
                    start = i + 1;
                }
            }
            // Fragment spanning into the next chunk
            pending.extend_from_slice(&buf[start..n]);
        }

        // Unterminated trailing fragment: it ends the file this cycle, so
        // it is a complete unit from the reader's point of view.
        if !pending.is_empty() {
            push_line(&mut lines, &mut pending);
        }

        Ok(ReadBatch {
            lines,
            new_offset: size,
        })
    }
}

impl Default for IncrementalReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Append the accumulated bytes as one line, discarding blanks.
fn push_line(lines: &mut Vec<String>, pending: &mut Vec<u8>) {
    let raw = std::mem::take(pending);
    let line = String::from_utf8_lossy(&raw);
    let line = line.trim_end_matches('\r');
    if !line.trim().is_empty() {
        lines.push(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_read_from_zero() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "log.jsonl", b"one\ntwo\nthree\n");
        let reader = IncrementalReader::new();

        let batch = reader.read_new(&path, 0).unwrap();
        assert_eq!(batch.lines, vec!["one", "two", "three"]);
        assert_eq!(batch.new_offset, 14);
    }

    #[test]
    fn test_read_from_offset_returns_only_new_lines() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "log.jsonl", b"one\ntwo\n");
        let reader = IncrementalReader::new();

        let first = reader.read_new(&path, 0).unwrap();
        assert_eq!(first.lines.len(), 2);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"three\n").unwrap();

        let second = reader.read_new(&path, first.new_offset).unwrap();
        assert_eq!(second.lines, vec!["three"]);
        assert_eq!(second.new_offset, 14);
    }

    #[test]
    fn test_offset_at_eof_returns_empty() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "log.jsonl", b"one\n");
        let reader = IncrementalReader::new();

        let batch = reader.read_new(&path, 4).unwrap();
        assert!(batch.lines.is_empty());
        assert_eq!(batch.new_offset, 4);
    }

    #[test]
    fn test_offset_past_eof_returns_empty_without_reset() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "log.jsonl", b"one\n");
        let reader = IncrementalReader::new();

        let batch = reader.read_new(&path, 100).unwrap();
        assert!(batch.lines.is_empty());
        assert_eq!(batch.new_offset, 100);
    }

    #[test]
    fn test_blank_lines_discarded() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "log.jsonl", b"one\n\n   \ntwo\n");
        let reader = IncrementalReader::new();

        let batch = reader.read_new(&path, 0).unwrap();
        assert_eq!(batch.lines, vec!["one", "two"]);
    }

    #[test]
    fn test_unterminated_trailing_fragment_is_returned() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "log.jsonl", b"one\ntail-without-newline");
        let reader = IncrementalReader::new();

        let batch = reader.read_new(&path, 0).unwrap();
        assert_eq!(batch.lines, vec!["one", "tail-without-newline"]);
        assert_eq!(batch.new_offset, 24);
    }

    #[test]
    fn test_record_straddling_chunk_boundary() {
        let dir = TempDir::new().unwrap();
        // One short line, then a line whose bytes straddle the 8192-byte
        // chunk boundary.
        let mut content = Vec::new();
        content.extend_from_slice(b"short\n");
        let long_line = "x".repeat(8500);
        content.extend_from_slice(long_line.as_bytes());
        content.push(b'\n');
        let path = write_file(&dir, "log.jsonl", &content);

        let reader = IncrementalReader::new();
        let batch = reader.read_new(&path, 0).unwrap();
        assert_eq!(batch.lines.len(), 2);
        assert_eq!(batch.lines[1], long_line);
        assert_eq!(batch.new_offset, content.len() as u64);
    }

    #[test]
    fn test_many_lines_across_tiny_chunks() {
        let dir = TempDir::new().unwrap();
        let content = b"alpha\nbeta\ngamma\ndelta\n";
        let path = write_file(&dir, "log.jsonl", content);

        // A 4-byte chunk forces every line to straddle a boundary
        let reader = IncrementalReader::with_chunk_size(4);
        let batch = reader.read_new(&path, 0).unwrap();
        assert_eq!(batch.lines, vec!["alpha", "beta", "gamma", "delta"]);
        assert_eq!(batch.new_offset, content.len() as u64);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let reader = IncrementalReader::new();
        let missing = dir.path().join("nope.jsonl");
        assert!(reader.read_new(&missing, 0).is_err());
    }
}
