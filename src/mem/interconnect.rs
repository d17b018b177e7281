//! Channel interconnect.
//!
//! The interconnect is the controller's view of the device side of one
//! channel: it fans commands out to the addressed rank and answers
//! issuability queries on its behalf.

use crate::config::SharedParams;
use crate::mem::bank::FailReason;
use crate::mem::rank::Rank;
use crate::mem::request::Request;
use crate::stats;

pub struct Interconnect {
    ranks: Vec<Rank>,
    commands_issued: u64,
}

impl Interconnect {
    pub fn new(params: SharedParams) -> Interconnect {
        let ranks = (0..params.ranks)
            .map(|r| Rank::new(params.clone(), r))
            .collect();
        Interconnect {
            ranks,
            commands_issued: 0,
        }
    }

    pub fn rank(&self, rank: u64) -> &Rank {
        &self.ranks[rank as usize]
    }

    pub fn is_issuable(&self, req: &Request, now: u64) -> Result<(), FailReason> {
        self.ranks[req.addr.rank as usize].is_issuable(req, now)
    }

    /// Forwards a command to the addressed rank.
    ///
    /// Returns the cycle at which the command finishes.
    pub fn issue_command(&mut self, req: &Request, now: u64) -> u64 {
        self.commands_issued += 1;
        self.ranks[req.addr.rank as usize].issue_command(req, now)
    }

    pub fn cycle(&mut self, steps: u64, now: u64) {
        for rank in &mut self.ranks {
            rank.cycle(steps, now);
        }
    }

    pub fn print_stats(&self, interval: u64, prefix: &str) {
        stats::stat(interval, prefix, "commandsIssued", self.commands_issued);
        for rank in &self.ranks {
            rank.print_stats(interval, prefix);
        }
    }
}
