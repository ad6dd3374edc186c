// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent JSONL output log.
//!
//! The file is the only authority for agent output; the store keeps
//! batched metadata (line count, last seq). Writers open with O_APPEND
//! so concurrent readers never see torn records past the last newline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Which stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

coven_core::simple_display! {
    OutputStream {
        Stdout => "stdout",
        Stderr => "stderr",
    }
}

/// One record in the output log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub seq: u64,
    pub ts: u64,
    pub stream: OutputStream,
    pub data: String,
}

/// Append-only writer with monotonic, contiguous sequence numbers.
pub struct OutputLogWriter {
    file: std::fs::File,
    path: PathBuf,
    next_seq: u64,
}

impl OutputLogWriter {
    /// Create the output file (and its parent directory). The file must
    /// exist before the agent subprocess starts.
    pub fn create(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self { file, path, next_seq: 1 })
    }

    /// Reopen an existing log for appending, continuing after the last
    /// recorded sequence number (orphan reattach).
    pub fn reopen(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let last_seq = read_lines(&path, 0)?.last().map(|line| line.seq).unwrap_or(0);
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { file, path, next_seq: last_seq + 1 })
    }

    /// Append one line; returns its sequence number.
    pub fn append(&mut self, stream: OutputStream, data: &str, ts: u64) -> std::io::Result<u64> {
        let seq = self.next_seq;
        let line = OutputLine { seq, ts, stream, data: data.to_string() };
        let mut encoded = serde_json::to_vec(&line)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        encoded.push(b'\n');
        self.file.write_all(&encoded)?;
        self.next_seq = seq + 1;
        Ok(seq)
    }

    /// The sequence number the next append will use.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Lines written so far.
    pub fn line_count(&self) -> u64 {
        self.next_seq - 1
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reader with a small per-file seq → byte-offset index so repeated
/// `?since=` reads skip ahead instead of rescanning.
pub struct OutputLogReader {
    path: PathBuf,
    /// Checkpoints every [`Self::CHECKPOINT_EVERY`] lines.
    index: BTreeMap<u64, u64>,
}

impl OutputLogReader {
    const CHECKPOINT_EVERY: u64 = 64;

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), index: BTreeMap::new() }
    }

    /// Every line with `seq > since`, in order.
    pub fn read_since(&mut self, since: u64) -> std::io::Result<Vec<OutputLine>> {
        let file = std::fs::File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        // Start from the closest checkpoint at or before `since`.
        let start = self
            .index
            .range(..=since.max(1))
            .next_back()
            .map(|(_, offset)| *offset)
            .unwrap_or(0);
        reader.seek(SeekFrom::Start(start))?;

        let mut out = Vec::new();
        let mut offset = start;
        let mut buf = String::new();
        loop {
            buf.clear();
            let read = reader.read_line(&mut buf)?;
            if read == 0 {
                break;
            }
            let line_start = offset;
            offset += read as u64;
            // A torn trailing record (no newline yet) is skipped; the
            // writer's O_APPEND guarantees it completes later.
            if !buf.ends_with('\n') {
                break;
            }
            let Ok(line) = serde_json::from_str::<OutputLine>(buf.trim_end()) else {
                continue;
            };
            if line.seq % Self::CHECKPOINT_EVERY == 1 {
                self.index.insert(line.seq, line_start);
            }
            if line.seq > since {
                out.push(line);
            }
        }
        Ok(out)
    }
}

/// Cold read without an index.
pub fn read_lines(path: &Path, since: u64) -> std::io::Result<Vec<OutputLine>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    OutputLogReader::new(path).read_since(since)
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
