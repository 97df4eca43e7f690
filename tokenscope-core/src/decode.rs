//! JSONL log decoder
//!
//! Turns one file's byte stream into a lazy sequence of decoded JSON
//! objects, in file order.
//!
//! # Error Handling
//!
//! The decoder is designed to recover from anything below the file level:
//!
//! - **Blank lines**: skipped silently.
//! - **Malformed JSON lines**: logged at trace level, skipped, never
//!   surfaced; they do not count as decoded objects.
//! - **Mid-file read errors**: logged as a warning; the sequence ends
//!   cleanly at that point.
//! - **Unreadable files**: [`decode_file`] returns an error so the caller
//!   can report the file to the diagnostic channel and skip it; this is
//!   never fatal to the run.
//!
//! No schema validation is performed; any single JSON value per line is
//! accepted.

use crate::error::Result;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// Lazy iterator over the decoded JSON values of one JSONL stream.
pub struct LineDecoder<R: BufRead> {
    lines: Lines<R>,
    line_number: u64,
}

impl<R: BufRead> LineDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

impl<R: BufRead> Iterator for LineDecoder<R> {
    type Item = serde_json::Value;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(line = self.line_number + 1, error = %e, "read error, stopping decode");
                    return None;
                }
            };
            self.line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str(&line) {
                Ok(value) => return Some(value),
                Err(e) => {
                    tracing::trace!(line = self.line_number, error = %e, "skipping malformed line");
                    continue;
                }
            }
        }
    }
}

/// Open `path` and decode it lazily.
///
/// Returns an error only when the file itself cannot be opened; everything
/// inside the file degrades to skipped lines. Re-calling restarts the
/// sequence from scratch.
pub fn decode_file(path: &Path) -> Result<LineDecoder<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(LineDecoder::new(BufReader::new(file)))
}
