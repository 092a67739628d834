//! Parses the per-core instruction trace: turns `input_<k>.txt` lines into
//! decoded `RD`/`WR` operations.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};

use crate::memory_cache::CoreId;

/// A decoded instruction: a load or a store, both against a byte address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Load from `address`.
    Load {
        /// The address to read.
        address: u8,
    },
    /// Store `value` to `address`.
    Store {
        /// The address to write.
        address: u8,
        /// The value to write.
        value: u8,
    },
}

/// An error encountered while reading or decoding a trace.
#[derive(Debug)]
pub enum TraceError {
    /// The trace file couldn't be opened or read.
    Io(io::Error),
    /// A line didn't parse as a valid `RD`/`WR` instruction.
    Malformed(String),
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::Io(e) => write!(f, "could not read trace: {}", e),
            TraceError::Malformed(line) => write!(f, "malformed trace line: {:?}", line),
        }
    }
}

impl From<io::Error> for TraceError {
    fn from(e: io::Error) -> TraceError {
        TraceError::Io(e)
    }
}

/// Reads decoded operations, in order, from `input_<core_id>.txt`.
pub struct TraceReader {
    lines: Lines<BufReader<File>>,
}

impl TraceReader {
    /// Open the trace file for `core_id`.
    pub fn open(core_id: CoreId) -> Result<TraceReader, TraceError> {
        let path = format!("input_{}.txt", core_id);
        let file = File::open(&path)?;
        Ok(TraceReader {
            lines: BufReader::new(file).lines(),
        })
    }

    fn decode(line: &str) -> Result<Operation, TraceError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            ["RD", addr] => {
                let address = parse_byte(addr, line)?;
                Ok(Operation::Load { address })
            }
            ["WR", addr, val] => {
                let address = parse_byte(addr, line)?;
                let value = parse_byte(val, line)?;
                Ok(Operation::Store { address, value })
            }
            _ => Err(TraceError::Malformed(line.to_string())),
        }
    }
}

fn parse_byte(field: &str, line: &str) -> Result<u8, TraceError> {
    field
        .parse::<u8>()
        .map_err(|_| TraceError::Malformed(line.to_string()))
}

impl Iterator for TraceReader {
    type Item = Result<Operation, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(TraceError::Io(e))),
            };

            // Original traces sometimes carry a trailing blank line; skip
            // it rather than reporting a spurious malformed instruction.
            if line.trim().is_empty() {
                continue;
            }

            return Some(TraceReader::decode(&line));
        }
    }
}
