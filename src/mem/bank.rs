//! Per-bank state machine and timing gatekeeper.
//!
//! A bank tracks its row-buffer state and the earliest cycle at which
//! each command class may next be issued. `is_issuable` is a pure query
//! against those deadlines; `issue_command` applies a command's timing
//! effects and reports when it will finish. Only the owning rank calls
//! the mutating operations.

use crate::config::SharedParams;
use crate::mem::endurance::{create_endurance_model, EnduranceModel};
use crate::mem::request::{OpType, Request};
use crate::stats;

/// Row-buffer and power state of one bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankState {
    Unknown,
    /// A row is active in the row buffer.
    Open,
    /// No row active; ready for ACTIVATE or REFRESH.
    Closed,
    /// Precharged power-down, fast exit.
    PowerDownPrechargeFast,
    /// Active power-down; the open row is retained.
    PowerDownActive,
    /// Precharged power-down, slow exit.
    PowerDownPrechargeSlow,
}

impl BankState {
    pub fn is_powered_down(self) -> bool {
        matches!(
            self,
            BankState::PowerDownPrechargeFast
                | BankState::PowerDownActive
                | BankState::PowerDownPrechargeSlow
        )
    }
}

/// Exit speed requested for a precharged power-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerDownMode {
    FastExit,
    SlowExit,
}

/// Why a command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// A bank-level timing deadline has not yet passed.
    BankTiming,
    /// A rank-level constraint (tFAW, activate spacing) refused it.
    RankTiming,
    /// A subarray-level constraint refused it.
    SubarrayTiming,
    /// The bank is in the wrong state for the command.
    BankState,
}

pub struct Bank {
    params: SharedParams,
    id: u64,

    state: BankState,
    open_row: Option<u64>,
    /// Cycle at which an in-flight precharge closes the bank.
    pending_close: Option<u64>,

    next_activate: u64,
    next_precharge: u64,
    next_read: u64,
    next_write: u64,
    next_refresh: u64,
    next_power_up: u64,

    reads: u64,
    writes: u64,
    activates: u64,
    precharges: u64,
    refreshes: u64,

    active_cycles: u64,
    standby_cycles: u64,
    data_cycles: u64,
    power_down_cycles: u64,

    endurance: Box<dyn EnduranceModel>,
    wear_reported: bool,
}

impl Bank {
    pub fn new(params: SharedParams, id: u64) -> Bank {
        let endurance = create_endurance_model(&params.endurance_model, params.write_limit);
        Bank {
            params,
            id,
            state: BankState::Closed,
            open_row: None,
            pending_close: None,
            next_activate: 0,
            next_precharge: 0,
            next_read: 0,
            next_write: 0,
            next_refresh: 0,
            next_power_up: 0,
            reads: 0,
            writes: 0,
            activates: 0,
            precharges: 0,
            refreshes: 0,
            active_cycles: 0,
            standby_cycles: 0,
            data_cycles: 0,
            power_down_cycles: 0,
            endurance,
            wear_reported: false,
        }
    }

    /// State as of `now`, accounting for an in-flight precharge that has
    /// run its course but not yet been committed by `cycle`.
    pub fn state_at(&self, now: u64) -> BankState {
        match self.pending_close {
            Some(done) if done <= now => BankState::Closed,
            _ => self.state,
        }
    }

    pub fn open_row_at(&self, now: u64) -> Option<u64> {
        if self.state_at(now) == BankState::Open {
            self.open_row
        } else {
            None
        }
    }

    pub fn next_activate(&self) -> u64 {
        self.next_activate
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Pure issuability query against the current cycle.
    pub fn is_issuable(&self, req: &Request, now: u64) -> Result<(), FailReason> {
        let state = self.state_at(now);

        if state.is_powered_down() && req.op != OpType::PowerUp {
            return Err(FailReason::BankState);
        }

        match req.op {
            OpType::Activate => {
                if state != BankState::Closed {
                    Err(FailReason::BankState)
                } else if now < self.next_activate {
                    Err(FailReason::BankTiming)
                } else {
                    Ok(())
                }
            }
            OpType::Read | OpType::ReadPrecharge => {
                if state != BankState::Open || self.open_row != Some(req.addr.row) {
                    Err(FailReason::BankState)
                } else if now < self.next_read {
                    Err(FailReason::BankTiming)
                } else {
                    Ok(())
                }
            }
            OpType::Write | OpType::WritePrecharge => {
                if state != BankState::Open || self.open_row != Some(req.addr.row) {
                    Err(FailReason::BankState)
                } else if now < self.next_write {
                    Err(FailReason::BankTiming)
                } else {
                    Ok(())
                }
            }
            OpType::Precharge | OpType::PrechargeAll => {
                if state != BankState::Open {
                    Err(FailReason::BankState)
                } else if now < self.next_precharge {
                    Err(FailReason::BankTiming)
                } else {
                    Ok(())
                }
            }
            OpType::Refresh => {
                // Refresh activates rows internally, so it waits on the
                // same horizon as an ACTIVATE.
                if state != BankState::Closed {
                    Err(FailReason::BankState)
                } else if now < self.next_activate || now < self.next_refresh {
                    Err(FailReason::BankTiming)
                } else {
                    Ok(())
                }
            }
            OpType::PowerDown => {
                if state == BankState::Open || state == BankState::Closed {
                    Ok(())
                } else {
                    Err(FailReason::BankState)
                }
            }
            OpType::PowerUp => {
                if !state.is_powered_down() {
                    Err(FailReason::BankState)
                } else if now < self.next_power_up {
                    Err(FailReason::BankTiming)
                } else {
                    Ok(())
                }
            }
            OpType::Nop => Ok(()),
        }
    }

    /// Applies a command's timing effects, assuming `is_issuable` held.
    ///
    /// Returns the cycle at which the command finishes.
    pub fn issue_command(&mut self, req: &Request, now: u64) -> u64 {
        debug_assert!(self.is_issuable(req, now).is_ok());
        self.commit_pending_close(now);

        let p = self.params.clone();
        match req.op {
            OpType::Activate => {
                self.state = BankState::Open;
                self.open_row = Some(req.addr.row);
                self.next_read = self.next_read.max(now + p.t_rcd);
                self.next_write = self.next_write.max(now + p.t_rcd);
                self.next_precharge = self.next_precharge.max(now + p.t_ras);
                self.next_activate = self.next_activate.max(now + p.t_rc);
                self.activates += 1;
                now + p.t_rcd
            }
            OpType::Read => {
                self.next_read = self.next_read.max(now + p.t_ccd);
                self.next_write = self.next_write.max(now + p.t_ccd);
                self.next_precharge = self.next_precharge.max(now + p.t_rtp);
                self.reads += 1;
                self.data_cycles += p.t_burst;
                now + p.t_cas + p.t_burst
            }
            OpType::Write => {
                self.next_write = self.next_write.max(now + p.t_ccd);
                self.next_read = self.next_read.max(now + p.t_cwd + p.t_burst + p.t_wtr);
                self.next_precharge = self.next_precharge.max(now + p.t_cwd + p.t_burst + p.t_wr);
                self.writes += 1;
                self.data_cycles += p.t_burst;
                self.consult_endurance(req);
                now + p.t_cwd + p.t_burst
            }
            OpType::ReadPrecharge => {
                let pre_start = self.next_precharge.max(now + p.al + p.t_rtp);
                self.pending_close = Some(pre_start + p.t_rp);
                self.next_activate = self.next_activate.max(pre_start + p.t_rp);
                self.reads += 1;
                self.precharges += 1;
                self.data_cycles += p.t_burst;
                now + p.t_cas + p.t_burst
            }
            OpType::WritePrecharge => {
                let pre_start = self
                    .next_precharge
                    .max(now + p.al + p.t_cwd + p.t_burst + p.t_wr);
                self.pending_close = Some(pre_start + p.t_rp);
                self.next_activate = self.next_activate.max(pre_start + p.t_rp);
                self.writes += 1;
                self.precharges += 1;
                self.data_cycles += p.t_burst;
                self.consult_endurance(req);
                now + p.t_cwd + p.t_burst
            }
            OpType::Precharge | OpType::PrechargeAll => {
                self.pending_close = Some(now + p.t_rp);
                self.next_activate = self.next_activate.max(now + p.t_rp);
                self.precharges += 1;
                now + p.t_rp
            }
            OpType::Refresh => {
                self.next_activate = self.next_activate.max(now + p.t_rfc);
                self.next_refresh = self.next_refresh.max(now + p.t_rfc);
                self.refreshes += 1;
                now + p.t_rfc
            }
            OpType::PowerDown => {
                self.power_down(PowerDownMode::FastExit, now);
                now + 1
            }
            OpType::PowerUp => {
                self.power_up(now);
                now + 1
            }
            OpType::Nop => now,
        }
    }

    /// Enters a power-down state. Open banks retain their row and go to
    /// active power-down; closed banks use the requested exit mode.
    pub fn power_down(&mut self, mode: PowerDownMode, now: u64) {
        self.commit_pending_close(now);
        self.state = match self.state {
            BankState::Open => BankState::PowerDownActive,
            _ => match mode {
                PowerDownMode::FastExit => BankState::PowerDownPrechargeFast,
                PowerDownMode::SlowExit => BankState::PowerDownPrechargeSlow,
            },
        };
        self.next_power_up = now + 1;
    }

    /// Leaves power-down, restoring the pre-power-down row-buffer state.
    pub fn power_up(&mut self, _now: u64) {
        self.state = match self.state {
            BankState::PowerDownActive => BankState::Open,
            _ => BankState::Closed,
        };
    }

    /// Advances internal counters and commits due state transitions.
    pub fn cycle(&mut self, steps: u64, now: u64) {
        self.commit_pending_close(now);
        match self.state {
            BankState::Open => self.active_cycles += steps,
            BankState::Closed | BankState::Unknown => self.standby_cycles += steps,
            _ => self.power_down_cycles += steps,
        }
    }

    fn commit_pending_close(&mut self, now: u64) {
        if let Some(done) = self.pending_close {
            if done <= now {
                self.state = BankState::Closed;
                self.open_row = None;
                self.pending_close = None;
            }
        }
    }

    fn consult_endurance(&mut self, req: &Request) {
        if !self.endurance.on_write(&req.addr) && !self.wear_reported {
            println!(
                "[Bank] bank {} row {} exceeded its write endurance limit",
                self.id, req.addr.row
            );
            self.wear_reported = true;
        }
    }

    pub fn print_stats(&self, interval: u64, prefix: &str) {
        let name = format!("{}.bank{}", prefix, self.id);
        stats::stat(interval, &name, "reads", self.reads);
        stats::stat(interval, &name, "writes", self.writes);
        stats::stat(interval, &name, "activates", self.activates);
        stats::stat(interval, &name, "precharges", self.precharges);
        stats::stat(interval, &name, "refreshes", self.refreshes);
        stats::stat(interval, &name, "activeCycles", self.active_cycles);
        stats::stat(interval, &name, "standbyCycles", self.standby_cycles);
        stats::stat(interval, &name, "dataCycles", self.data_cycles);
        stats::stat(interval, &name, "powerDownCycles", self.power_down_cycles);
        stats::stat(
            interval,
            &name,
            "worstCaseWrites",
            self.endurance.worst_case_writes(),
        );
        stats::stat(
            interval,
            &name,
            "averageWrites",
            self.endurance.average_writes(),
        );
    }
}
