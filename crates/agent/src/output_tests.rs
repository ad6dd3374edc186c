// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

#[test]
fn sequences_are_contiguous_from_one() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.jsonl");
    let mut writer = OutputLogWriter::create(&path).unwrap();

    assert_eq!(writer.append(OutputStream::Stdout, "a", 10).unwrap(), 1);
    assert_eq!(writer.append(OutputStream::Stderr, "b", 20).unwrap(), 2);
    assert_eq!(writer.append(OutputStream::Stdout, "c", 30).unwrap(), 3);
    assert_eq!(writer.line_count(), 3);

    let lines = read_lines(&path, 0).unwrap();
    let seqs: Vec<u64> = lines.iter().map(|l| l.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
}

#[test]
fn create_makes_parent_directories_and_empty_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("output").join("task-1.jsonl");
    let writer = OutputLogWriter::create(&path).unwrap();
    assert_eq!(writer.next_seq(), 1);
    assert!(path.exists());
}

#[test]
fn read_since_returns_strictly_later_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.jsonl");
    let mut writer = OutputLogWriter::create(&path).unwrap();
    for i in 0..10 {
        writer.append(OutputStream::Stdout, &format!("line {i}"), i).unwrap();
    }

    let mut reader = OutputLogReader::new(&path);
    let lines = reader.read_since(7).unwrap();
    let seqs: Vec<u64> = lines.iter().map(|l| l.seq).collect();
    assert_eq!(seqs, vec![8, 9, 10]);

    // No duplicates on a repeat read.
    let again = reader.read_since(7).unwrap();
    assert_eq!(again.len(), 3);
}

#[test]
fn reader_index_survives_appends_between_reads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.jsonl");
    let mut writer = OutputLogWriter::create(&path).unwrap();
    for i in 0..200 {
        writer.append(OutputStream::Stdout, &format!("line {i}"), i).unwrap();
    }

    let mut reader = OutputLogReader::new(&path);
    assert_eq!(reader.read_since(0).unwrap().len(), 200);

    writer.append(OutputStream::Stdout, "tail", 999).unwrap();
    let lines = reader.read_since(200).unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].seq, 201);
    assert_eq!(lines[0].data, "tail");
}

#[test]
fn reopen_continues_after_last_seq() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.jsonl");
    {
        let mut writer = OutputLogWriter::create(&path).unwrap();
        writer.append(OutputStream::Stdout, "before restart", 1).unwrap();
        writer.append(OutputStream::Stdout, "still before", 2).unwrap();
    }

    let mut writer = OutputLogWriter::reopen(&path).unwrap();
    assert_eq!(writer.append(OutputStream::Stdout, "after restart", 3).unwrap(), 3);

    let seqs: Vec<u64> = read_lines(&path, 0).unwrap().iter().map(|l| l.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
}

#[test]
fn torn_trailing_record_is_ignored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.jsonl");
    let mut writer = OutputLogWriter::create(&path).unwrap();
    writer.append(OutputStream::Stdout, "whole", 1).unwrap();

    // Simulate a torn concurrent write: no trailing newline yet.
    use std::io::Write;
    let mut raw = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    raw.write_all(b"{\"seq\":2,\"ts\":2,\"stream\":\"stdout\",\"da").unwrap();

    let lines = read_lines(&path, 0).unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].data, "whole");
}

#[test]
fn missing_file_reads_empty() {
    let dir = TempDir::new().unwrap();
    assert!(read_lines(&dir.path().join("nope.jsonl"), 0).unwrap().is_empty());
}

#[test]
fn lines_roundtrip_with_streams() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.jsonl");
    let mut writer = OutputLogWriter::create(&path).unwrap();
    writer.append(OutputStream::Stderr, "warning: x", 42).unwrap();

    let lines = read_lines(&path, 0).unwrap();
    assert_eq!(
        lines[0],
        OutputLine { seq: 1, ts: 42, stream: OutputStream::Stderr, data: "warning: x".to_string() }
    );
}
