//! Incremental reader for one growing transcript file.
//!
//! The tailer remembers how far into the file it has read and only ever reads
//! the bytes appended since. A trailing line without its terminator is held
//! back until the rest of it arrives.
//!
//! # Checkpointing
//!
//! - `byte_offset` advances by exactly the number of bytes read.
//! - A file smaller than `byte_offset` was truncated (the assistant's `/clear`
//!   rewrites it); the tailer restarts from offset 0.
//! - A modification time that is not newer than the last one seen means there
//!   is nothing to read, and the file is not opened.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::types::ParsedEvent;

use super::extract::parse_line;

/// Read position and carry-over state for one session's transcript.
#[derive(Debug)]
pub struct MonitoredTranscript {
    path: PathBuf,
    byte_offset: u64,
    last_modified: Option<SystemTime>,
    partial_line: Vec<u8>,
}

impl MonitoredTranscript {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            byte_offset: 0,
            last_modified: None,
            partial_line: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn byte_offset(&self) -> u64 {
        self.byte_offset
    }

    /// Bytes of an unterminated last line waiting for the rest of it.
    pub fn pending_bytes(&self) -> usize {
        self.partial_line.len()
    }

    /// Read everything appended since the last poll and parse it.
    ///
    /// I/O failures are logged and reported as "no events"; the next poll
    /// simply tries again.
    pub fn poll(&mut self) -> Vec<ParsedEvent> {
        self.poll_lines()
            .iter()
            .flat_map(|line| parse_line(line))
            .collect()
    }

    /// Like [`poll`](Self::poll) but returns the complete, non-blank lines.
    pub fn poll_lines(&mut self) -> Vec<String> {
        match self.read_new_lines() {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read transcript");
                Vec::new()
            }
        }
    }

    /// Jump to the current end of file so existing history is not replayed.
    pub fn skip_to_end(&mut self) {
        self.partial_line.clear();
        match std::fs::metadata(&self.path) {
            Ok(meta) => {
                self.byte_offset = meta.len();
                self.last_modified = meta.modified().ok();
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.byte_offset = 0;
                self.last_modified = None;
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to stat transcript");
            }
        }
    }

    fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let meta = match std::fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let modified = meta.modified().ok();
        if let (Some(seen), Some(now)) = (self.last_modified, modified) {
            if now <= seen {
                return Ok(Vec::new());
            }
        }

        let size = meta.len();
        if size < self.byte_offset {
            tracing::info!(
                path = %self.path.display(),
                offset = self.byte_offset,
                size,
                "Transcript truncated, restarting from the beginning"
            );
            self.byte_offset = 0;
            self.partial_line.clear();
        }
        if size <= self.byte_offset {
            self.last_modified = modified;
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.byte_offset))?;
        let mut fresh = Vec::with_capacity((size - self.byte_offset) as usize);
        let read = file.take(size - self.byte_offset).read_to_end(&mut fresh)?;
        self.byte_offset += read as u64;
        // Only a completed read counts as having seen this mtime
        self.last_modified = modified;

        let mut buf = std::mem::take(&mut self.partial_line);
        buf.extend_from_slice(&fresh);

        // Everything after the last newline is incomplete
        let complete_len = match buf.iter().rposition(|&b| b == b'\n') {
            Some(idx) => idx + 1,
            None => 0,
        };
        self.partial_line = buf.split_off(complete_len);

        Ok(String::from_utf8_lossy(&buf)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}
