// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only write-ahead log of [`EventRecord`]s.
//!
//! One line of JSON per record, newest last. `Wal` is the durability
//! primitive underneath [`crate::event_store::EventStore`]: it knows nothing
//! about streams or versions beyond what's already baked into the records it
//! is handed — it just assigns each one a monotonic `seq` (its `position`)
//! and gets it onto disk.
//!
//! Recovery has to tolerate a log that was only partially written (process
//! killed mid-`write`) or that picked up noise after the fact. `open` scans
//! the file once: the longest valid JSON-lines prefix is kept, and anything
//! from the first bad line onward is rotated out to a `.bak` file rather
//! than discarded, so operators can inspect what went wrong. At most three
//! generations of backup are kept (`.bak`, `.bak.2`, `.bak.3`).

use orbitmesh_core::EventRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Flush once this many records are buffered, even if the interval hasn't elapsed.
const FLUSH_THRESHOLD: usize = 100;
/// Flush at least this often if anything is buffered.
const FLUSH_INTERVAL: Duration = Duration::from_millis(250);

pub struct Wal {
    path: PathBuf,
    write_seq: u64,
    processed_seq: u64,
    /// Byte offset in the file where the next `next_unprocessed` read starts.
    read_offset: u64,
    buffer: Vec<String>,
    last_flush: Instant,
}

impl Wal {
    /// Open (creating if absent) the log at `path`, skipping the
    /// `next_unprocessed` cursor past every record with `seq <= processed_seq`
    /// (the caller has a snapshot covering that far already).
    pub fn open(path: impl AsRef<Path>, processed_seq: u64) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            File::create(&path)?;
            return Ok(Wal {
                path,
                write_seq: 0,
                processed_seq,
                read_offset: 0,
                buffer: Vec::new(),
                last_flush: Instant::now(),
            });
        }

        let raw = fs::read(&path)?;
        let (valid_lines, write_seq, corrupt) = scan_valid_prefix(&raw);

        if corrupt {
            rotate_backups(&path)?;
            fs::copy(&path, path.with_extension("bak"))?;
            let mut rewritten = valid_lines.join("\n");
            if !rewritten.is_empty() {
                rewritten.push('\n');
            }
            fs::write(&path, rewritten)?;
        }

        let mut read_offset = 0u64;
        for line in &valid_lines {
            let record: EventRecord = serde_json::from_str(line).expect("line was already validated by scan_valid_prefix");
            if record.position <= processed_seq {
                read_offset += line.len() as u64 + 1;
            } else {
                break;
            }
        }

        Ok(Wal {
            path,
            write_seq,
            processed_seq,
            read_offset,
            buffer: Vec::new(),
            last_flush: Instant::now(),
        })
    }

    /// Append `record` (its `position` is overwritten with the assigned seq)
    /// to the in-memory buffer; returns the assigned seq. Not durable until
    /// [`Wal::flush`].
    pub fn append(&mut self, mut record: EventRecord) -> io::Result<u64> {
        let seq = self.write_seq + 1;
        record.position = seq;
        let line = serde_json::to_string(&record)?;
        self.buffer.push(line);
        self.write_seq = seq;
        Ok(seq)
    }

    /// Whether the caller should call [`Wal::flush`] now.
    pub fn needs_flush(&self) -> bool {
        !self.buffer.is_empty() && (self.buffer.len() >= FLUSH_THRESHOLD || self.last_flush.elapsed() >= FLUSH_INTERVAL)
    }

    /// Write buffered records to disk and clear the buffer.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            self.last_flush = Instant::now();
            return Ok(());
        }
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        for line in self.buffer.drain(..) {
            writeln!(file, "{line}")?;
        }
        file.flush()?;
        self.last_flush = Instant::now();
        Ok(())
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    /// Record `seq` (and everything before it) as processed, so a future
    /// `open` can skip straight past it.
    pub fn mark_processed(&mut self, seq: u64) {
        if seq > self.processed_seq {
            self.processed_seq = seq;
        }
    }

    /// Read and return the next record after the cursor, if any. A corrupt
    /// or non-UTF8 line is skipped (the cursor advances past it) and `None`
    /// is returned for that call — the daemon's replay loop calls again.
    pub fn next_unprocessed(&mut self) -> io::Result<Option<EventRecord>> {
        let mut file = File::open(&self.path)?;
        file.seek_to(self.read_offset)?;
        let mut reader = BufReader::new(file);
        let mut raw = Vec::new();
        let read = reader.read_until(b'\n', &mut raw)?;
        if read == 0 {
            return Ok(None);
        }
        self.read_offset += raw.len() as u64;
        while raw.last() == Some(&b'\n') {
            raw.pop();
        }

        match parse_line(&raw) {
            Some(record) => Ok(Some(record)),
            None => Ok(None),
        }
    }

    /// All valid records with `position > after_seq`, in order. Stops at the
    /// first corrupt line encountered rather than skipping past it.
    pub fn entries_after(&self, after_seq: u64) -> io::Result<Vec<EventRecord>> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();
        for line in reader.split(b'\n') {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            match parse_line(&line) {
                Some(record) => {
                    if record.position > after_seq {
                        out.push(record);
                    }
                }
                None => break,
            }
        }
        Ok(out)
    }

    /// Compact the on-disk log, discarding every record with
    /// `position < keep_from_seq`. Pending buffered writes are flushed first.
    pub fn truncate_before(&mut self, keep_from_seq: u64) -> io::Result<()> {
        self.flush()?;
        let kept = self.entries_after(keep_from_seq.saturating_sub(1))?;
        let mut rewritten = String::new();
        for record in &kept {
            rewritten.push_str(&serde_json::to_string(record)?);
            rewritten.push('\n');
        }
        fs::write(&self.path, rewritten)?;
        Ok(())
    }
}

fn parse_line(raw: &[u8]) -> Option<EventRecord> {
    let text = std::str::from_utf8(raw).ok()?;
    serde_json::from_str(text).ok()
}

/// Splits `raw` into the longest prefix of lines that parse as `EventRecord`
/// JSON, the max `position` seen in that prefix, and whether anything after
/// the prefix was left over (i.e. the log was corrupt).
fn scan_valid_prefix(raw: &[u8]) -> (Vec<String>, u64, bool) {
    let mut valid = Vec::new();
    let mut max_seq = 0u64;
    let mut corrupt = false;

    for chunk in raw.split(|&b| b == b'\n') {
        if chunk.is_empty() {
            continue;
        }
        match parse_line(chunk) {
            Some(record) => {
                max_seq = max_seq.max(record.position);
                valid.push(String::from_utf8_lossy(chunk).into_owned());
            }
            None => {
                corrupt = true;
                break;
            }
        }
    }
    (valid, max_seq, corrupt)
}

/// Rotates `.bak -> .bak.2 -> .bak.3`, evicting whatever was in `.bak.3`.
fn rotate_backups(path: &Path) -> io::Result<()> {
    let bak1 = path.with_extension("bak");
    let bak2 = path.with_extension("bak.2");
    let bak3 = path.with_extension("bak.3");

    if bak2.exists() {
        fs::rename(&bak2, &bak3)?;
    }
    if bak1.exists() {
        fs::rename(&bak1, &bak2)?;
    }
    Ok(())
}

trait SeekExt {
    fn seek_to(&mut self, offset: u64) -> io::Result<()>;
}

impl SeekExt for File {
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        use std::io::Seek;
        self.seek(std::io::SeekFrom::Start(offset))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
