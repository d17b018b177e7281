//! Write endurance tracking.
//!
//! Non-volatile cells wear out after a bounded number of writes. The
//! model is consulted on every WRITE; exceeding the limit is reported
//! but never fails the command, since the simulator's job is timing.

use std::collections::HashMap;

use crate::mem::request::DeviceAddr;

/// Per-bank endurance bookkeeping.
pub trait EnduranceModel {
    /// Records a write. Returns `false` once the touched row has
    /// exceeded its write limit.
    fn on_write(&mut self, addr: &DeviceAddr) -> bool;

    /// Writes absorbed by the most-written row.
    fn worst_case_writes(&self) -> u64;

    /// Mean writes across rows that have been written at least once.
    fn average_writes(&self) -> u64;
}

/// Model for memories without endurance concerns (DRAM).
pub struct NullEndurance;

impl EnduranceModel for NullEndurance {
    fn on_write(&mut self, _addr: &DeviceAddr) -> bool {
        true
    }

    fn worst_case_writes(&self) -> u64 {
        0
    }

    fn average_writes(&self) -> u64 {
        0
    }
}

/// Per-row write counter with a configurable wear limit.
pub struct WriteCountEndurance {
    writes_per_row: HashMap<u64, u64>,
    limit: u64,
    total_writes: u64,
}

impl WriteCountEndurance {
    pub fn new(limit: u64) -> WriteCountEndurance {
        WriteCountEndurance {
            writes_per_row: HashMap::new(),
            limit,
            total_writes: 0,
        }
    }
}

impl EnduranceModel for WriteCountEndurance {
    fn on_write(&mut self, addr: &DeviceAddr) -> bool {
        let count = self.writes_per_row.entry(addr.row).or_insert(0);
        *count += 1;
        self.total_writes += 1;
        *count <= self.limit
    }

    fn worst_case_writes(&self) -> u64 {
        self.writes_per_row.values().copied().max().unwrap_or(0)
    }

    fn average_writes(&self) -> u64 {
        if self.writes_per_row.is_empty() {
            0
        } else {
            self.total_writes / self.writes_per_row.len() as u64
        }
    }
}

/// Builds the endurance model named by the `EnduranceModel` config key.
pub fn create_endurance_model(name: &str, write_limit: u64) -> Box<dyn EnduranceModel> {
    match name {
        "WriteCount" => Box::new(WriteCountEndurance::new(write_limit)),
        _ => Box::new(NullEndurance),
    }
}
