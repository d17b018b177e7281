//! Distributed, staggered refresh bookkeeping.
//!
//! Refresh is tracked per (rank, bank group) with a delay counter fed by
//! periodic pulses riding the event queue. Each pulse increments the
//! counter; each issued REFRESH decrements it. Once a counter reaches
//! the configured threshold, every bank in the group is flagged and
//! normal scheduling to those banks stalls until refreshes catch up.

use crate::config::SharedParams;
use crate::mem::event_queue::{EventPayload, EventQueue};

pub struct RefreshState {
    enabled: bool,
    ranks: u64,
    banks_per_refresh: u64,
    num_groups: u64,
    threshold: u64,
    /// Cycles between refresh pulses for one (rank, group) pair.
    trefi: u64,

    delayed_counter: Vec<Vec<u64>>,
    bank_need_refresh: Vec<Vec<bool>>,

    pulses_received: u64,
    refreshes_issued: u64,
}

impl RefreshState {
    pub fn new(params: &SharedParams) -> RefreshState {
        // Group layout is only validated when refresh is in use.
        let (num_groups, trefi) = if params.use_refresh {
            (
                params.refresh_groups(),
                params.t_rfi / (params.rows / params.refresh_rows),
            )
        } else {
            (0, 0)
        };

        RefreshState {
            enabled: params.use_refresh,
            ranks: params.ranks,
            banks_per_refresh: params.banks_per_refresh,
            num_groups,
            threshold: params.delayed_refresh_threshold,
            trefi,
            delayed_counter: vec![vec![0; num_groups as usize]; params.ranks as usize],
            bank_need_refresh: vec![vec![false; params.banks as usize]; params.ranks as usize],
            pulses_received: 0,
            refreshes_issued: 0,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn trefi(&self) -> u64 {
        self.trefi
    }

    pub fn num_groups(&self) -> u64 {
        self.num_groups
    }

    /// Schedules the first pulse for every (rank, group) pair, staggered
    /// across one refresh interval so groups never refresh in lockstep.
    pub fn seed(&self, channel: usize, eq: &mut EventQueue) {
        if !self.enabled {
            return;
        }

        let slice = self.trefi / (self.ranks * self.num_groups);
        let now = eq.current_cycle();
        for rank in 0..self.ranks {
            for group in 0..self.num_groups {
                let offset = (rank * self.num_groups + group) * slice;
                eq.insert(
                    now + self.trefi + offset,
                    channel,
                    EventPayload::RefreshPulse { rank, group },
                );
            }
        }
    }

    /// Whether the group containing `bank` owes enough refreshes that
    /// normal traffic must stall.
    pub fn need_refresh(&self, rank: u64, bank: u64) -> bool {
        self.enabled
            && self.delayed_counter[rank as usize][(bank / self.banks_per_refresh) as usize]
                >= self.threshold
    }

    pub fn need_refresh_group(&self, rank: u64, group: u64) -> bool {
        self.enabled && self.delayed_counter[rank as usize][group as usize] >= self.threshold
    }

    /// Per-bank stall flag, mirrored from the group counters.
    pub fn bank_need_refresh(&self, rank: u64, bank: u64) -> bool {
        self.bank_need_refresh[rank as usize][bank as usize]
    }

    /// Counts one refresh pulse for (rank, group).
    pub fn pulse(&mut self, rank: u64, group: u64) {
        self.pulses_received += 1;
        let counter = &mut self.delayed_counter[rank as usize][group as usize];
        *counter += 1;
        if *counter >= self.threshold {
            self.set_group_flags(rank, group, true);
        }
    }

    /// Accounts for one issued REFRESH command against (rank, group).
    pub fn refresh_issued(&mut self, rank: u64, group: u64) {
        self.refreshes_issued += 1;
        let counter = &mut self.delayed_counter[rank as usize][group as usize];
        debug_assert!(*counter > 0);
        *counter = counter.saturating_sub(1);
        if *counter < self.threshold {
            self.set_group_flags(rank, group, false);
        }
    }

    fn set_group_flags(&mut self, rank: u64, group: u64, value: bool) {
        let start = group * self.banks_per_refresh;
        for bank in start..start + self.banks_per_refresh {
            self.bank_need_refresh[rank as usize][bank as usize] = value;
        }
    }

    pub fn pulses_received(&self) -> u64 {
        self.pulses_received
    }

    pub fn refreshes_issued(&self) -> u64 {
        self.refreshes_issued
    }

    /// Sum of all outstanding delay counters.
    pub fn outstanding(&self) -> u64 {
        self.delayed_counter
            .iter()
            .flat_map(|per_rank| per_rank.iter())
            .sum()
    }
}
