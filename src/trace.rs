//! Trace file ingestion.
//!
//! The standard trace format is one access per line:
//!
//! ```text
//! <cycle> <R|W> <hex-address> <hex-data> <thread-id>
//! ```
//!
//! Cycles are expected to be monotonic, but past cycles are tolerated
//! and issue immediately. Malformed lines are reported and skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};

use crate::error::SimError;
use crate::mem::request::OpType;

/// One parsed trace access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLine {
    pub cycle: u64,
    pub op: OpType,
    pub address: u64,
    pub data: Vec<u8>,
    pub thread_id: u64,
}

/// Source of trace accesses; the driver pulls until exhaustion.
pub trait TraceReader {
    fn next_access(&mut self) -> Option<TraceLine>;
}

/// Reader for the standard five-field format.
pub struct StandardTraceReader {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl StandardTraceReader {
    pub fn open(path: &str) -> Result<StandardTraceReader, SimError> {
        let file = File::open(path)
            .map_err(|e| SimError::Trace(format!("could not open '{}': {}", path, e)))?;
        Ok(StandardTraceReader {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }

    fn parse(&self, line: &str) -> Result<TraceLine, String> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!("expected 5 fields, found {}", fields.len()));
        }

        let cycle = fields[0]
            .parse::<u64>()
            .map_err(|_| format!("bad cycle '{}'", fields[0]))?;

        let op = match fields[1] {
            "R" | "r" => OpType::Read,
            "W" | "w" => OpType::Write,
            other => return Err(format!("unknown operation '{}'", other)),
        };

        let address = u64::from_str_radix(fields[2].trim_start_matches("0x"), 16)
            .map_err(|_| format!("bad address '{}'", fields[2]))?;

        let data = parse_hex_data(fields[3]).ok_or_else(|| format!("bad data '{}'", fields[3]))?;

        let thread_id = fields[4]
            .parse::<u64>()
            .map_err(|_| format!("bad thread id '{}'", fields[4]))?;

        Ok(TraceLine {
            cycle,
            op,
            address,
            data,
            thread_id,
        })
    }
}

impl TraceReader for StandardTraceReader {
    fn next_access(&mut self) -> Option<TraceLine> {
        loop {
            let line = self.lines.next()?.ok()?;
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match self.parse(trimmed) {
                Ok(access) => return Some(access),
                Err(why) => {
                    eprintln!("[Trace] skipping malformed line {}: {}", self.line_no, why);
                }
            }
        }
    }
}

fn parse_hex_data(field: &str) -> Option<Vec<u8>> {
    let hex = field.trim_start_matches("0x");
    if hex.is_empty() {
        return None;
    }

    // Tolerate odd-length payloads by padding the leading nibble.
    let padded;
    let hex = if hex.len() % 2 == 0 {
        hex
    } else {
        padded = format!("0{}", hex);
        &padded
    };

    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

/// Builds the reader named by the `TraceReader` config key.
pub fn create_trace_reader(name: &str, path: &str) -> Result<Box<dyn TraceReader>, SimError> {
    match name {
        "Standard" => Ok(Box::new(StandardTraceReader::open(path)?)),
        other => Err(SimError::Config(format!("unknown trace reader '{}'", other))),
    }
}
