//! Rank-level aggregation.
//!
//! A rank owns its banks and enforces the constraints that span them:
//! the four-activate window (tFAW), activate-to-activate spacing
//! (tRRDR/tRRDW), group-wide refresh, and lockstep power-down. Commands
//! fan out to the addressed bank; REFRESH fans to every bank in the
//! addressed bank group.

use std::collections::VecDeque;

use crate::config::SharedParams;
use crate::mem::bank::{Bank, FailReason, PowerDownMode};
use crate::mem::request::{OpType, Request};

const ACTIVATES_PER_FAW: usize = 4;

pub struct Rank {
    params: SharedParams,
    id: u64,
    banks: Vec<Bank>,
    /// Cycles of the most recent activates, pruned to the tFAW window.
    faw_window: VecDeque<u64>,
    /// Earliest cycle the next ACTIVATE may leave for any bank.
    next_activate: u64,
}

impl Rank {
    pub fn new(params: SharedParams, id: u64) -> Rank {
        let banks = (0..params.banks)
            .map(|b| Bank::new(params.clone(), b))
            .collect();
        Rank {
            params,
            id,
            banks,
            faw_window: VecDeque::new(),
            next_activate: 0,
        }
    }

    pub fn bank(&self, bank: u64) -> &Bank {
        &self.banks[bank as usize]
    }

    fn faw_full(&self, now: u64) -> bool {
        let in_window = self
            .faw_window
            .iter()
            .filter(|&&c| c + self.params.t_faw > now)
            .count();
        in_window >= ACTIVATES_PER_FAW
    }

    fn prune_faw(&mut self, now: u64) {
        while let Some(&front) = self.faw_window.front() {
            if front + self.params.t_faw <= now {
                self.faw_window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Banks covered by the refresh group whose head bank is `head`.
    fn refresh_group(&self, head: u64) -> std::ops::Range<u64> {
        head..(head + self.params.banks_per_refresh).min(self.params.banks)
    }

    pub fn is_issuable(&self, req: &Request, now: u64) -> Result<(), FailReason> {
        match req.op {
            OpType::Activate => {
                if self.faw_full(now) || now < self.next_activate {
                    return Err(FailReason::RankTiming);
                }
                self.banks[req.addr.bank as usize].is_issuable(req, now)
            }
            OpType::Refresh => {
                for b in self.refresh_group(req.addr.bank) {
                    self.banks[b as usize].is_issuable(req, now)?;
                }
                Ok(())
            }
            OpType::PowerDown | OpType::PowerUp => {
                // Power transitions are rank-wide and synchronous.
                for bank in &self.banks {
                    bank.is_issuable(req, now)?;
                }
                Ok(())
            }
            _ => self.banks[req.addr.bank as usize].is_issuable(req, now),
        }
    }

    /// Forwards a command, assuming `is_issuable` held.
    ///
    /// Returns the cycle at which the command finishes.
    pub fn issue_command(&mut self, req: &Request, now: u64) -> u64 {
        match req.op {
            OpType::Activate => {
                self.prune_faw(now);
                self.faw_window.push_back(now);
                self.next_activate = self.next_activate.max(now + self.params.t_rrdr);
                self.banks[req.addr.bank as usize].issue_command(req, now)
            }
            OpType::Write | OpType::WritePrecharge => {
                // A write burst pushes the activate horizon out further
                // than a read does.
                self.next_activate = self.next_activate.max(now + self.params.t_rrdw);
                self.banks[req.addr.bank as usize].issue_command(req, now)
            }
            OpType::Refresh => {
                let mut done = now;
                for b in self.refresh_group(req.addr.bank) {
                    done = done.max(self.banks[b as usize].issue_command(req, now));
                }
                done
            }
            OpType::PowerDown => {
                for bank in &mut self.banks {
                    bank.power_down(PowerDownMode::FastExit, now);
                }
                now + 1
            }
            OpType::PowerUp => {
                for bank in &mut self.banks {
                    bank.power_up(now);
                }
                now + 1
            }
            _ => self.banks[req.addr.bank as usize].issue_command(req, now),
        }
    }

    /// Enters power-down across all banks in lockstep.
    pub fn power_down(&mut self, mode: PowerDownMode, now: u64) {
        for bank in &mut self.banks {
            bank.power_down(mode, now);
        }
    }

    pub fn power_up(&mut self, now: u64) {
        for bank in &mut self.banks {
            bank.power_up(now);
        }
    }

    pub fn cycle(&mut self, steps: u64, now: u64) {
        self.prune_faw(now);
        for bank in &mut self.banks {
            bank.cycle(steps, now);
        }
    }

    pub fn print_stats(&self, interval: u64, prefix: &str) {
        let name = format!("{}.rank{}", prefix, self.id);
        for bank in &self.banks {
            bank.print_stats(interval, &name);
        }
    }
}
