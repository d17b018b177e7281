//! Simulator error types.
//!
//! Everything that can stop a simulation run flows through `SimError`:
//! configuration problems detected at setup, unusable trace files, and
//! the command-queue deadlock watchdog that fires when a device command
//! has been stuck at the head of its queue for too long.

use std::fmt;

/// Fatal simulator errors.
#[derive(Debug)]
pub enum SimError {
    /// Bad or missing configuration. Reported with the offending key.
    Config(String),
    /// The trace file could not be opened or read.
    Trace(String),
    /// A device command sat unissuable at the head of a bank queue for
    /// more than the watchdog limit. Indicates a timing deadlock.
    Deadlock {
        channel: usize,
        rank: u64,
        bank: u64,
        address: u64,
        queued_cycle: u64,
        current_cycle: u64,
    },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Config(msg) => write!(f, "configuration error: {}", msg),
            SimError::Trace(msg) => write!(f, "trace error: {}", msg),
            SimError::Deadlock {
                channel,
                rank,
                bank,
                address,
                queued_cycle,
                current_cycle,
            } => write!(
                f,
                "command could not be sent to memory after a very long time: \
                 address {:#x} (channel {}, rank {}, bank {}), queued at cycle {}, \
                 current cycle {}",
                address, channel, rank, bank, queued_cycle, current_cycle
            ),
        }
    }
}

impl std::error::Error for SimError {}
