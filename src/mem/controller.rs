//! Memory controller scheduling.
//!
//! One controller owns one channel: a bounded transaction queue fed by
//! the producer, per-(rank, bank) command queues holding expanded device
//! commands, the refresh engine, and the round-robin issue cursor. Every
//! cycle it promotes at most one transaction into device commands and
//! sends at most one command to the interconnect.
//!
//! Scheduling policies share the `SchedulerCore` machinery and differ
//! only in how they pick the next transaction. `Frfcfs` implements
//! first-ready first-come-first-serve with starvation and refresh
//! guards; `Fcfs` serves strictly in arrival order.

use std::collections::VecDeque;

use crate::config::{ClosePagePolicy, ScheduleScheme, SharedParams};
use crate::error::SimError;
use crate::hooks::HookBus;
use crate::mem::event_queue::{EventPayload, EventQueue};
use crate::mem::interconnect::Interconnect;
use crate::mem::refresh::RefreshState;
use crate::mem::request::{DeviceAddr, OpType, Owner, Request, RequestTag, Status};
use crate::stats;

/// Cycles a queued command may sit unissuable before the simulation is
/// declared deadlocked.
pub const DEADLOCK_LIMIT: u64 = 1_000_000;

/// Capability set shared by all controller policies.
pub trait MemoryController {
    /// Whether the transaction queue has no room left.
    fn queue_full(&self) -> bool;

    /// Accepts a transaction, stamping its arrival cycle.
    ///
    /// Returns the request unchanged when the queue is full so the
    /// producer can retry; this is the backpressure signal.
    fn issue_command(&mut self, req: Request, now: u64) -> Result<(), Request>;

    /// Receives a finished command. Controller-owned commands are
    /// disposed here; external transactions are handed back up.
    fn request_complete(&mut self, req: Request, eq: &mut EventQueue) -> Option<Request>;

    /// Receives one refresh countdown pulse for (rank, group).
    fn refresh_pulse(&mut self, rank: u64, group: u64, eq: &mut EventQueue);

    /// Advances the controller by one memory cycle.
    fn cycle(&mut self, eq: &mut EventQueue, hooks: &mut HookBus) -> Result<(), SimError>;

    /// Transactions and device commands still in flight.
    fn pending(&self) -> usize;

    /// Prints this channel's stats and advances its interval counter.
    fn print_stats(&mut self);
}

/// Builds the controller policy named by the `MEM_CTL` config key.
pub fn create_controller(
    params: SharedParams,
    channel: usize,
    eq: &mut EventQueue,
) -> Result<Box<dyn MemoryController>, SimError> {
    match params.controller.as_str() {
        "FRFCFS" => Ok(Box::new(Frfcfs::new(params, channel, eq))),
        "FCFS" => Ok(Box::new(Fcfs::new(params, channel, eq))),
        other => Err(SimError::Config(format!(
            "unknown memory controller '{}'",
            other
        ))),
    }
}

/// Rolling controller statistics. Sums stay integral; averages are
/// computed at print time.
#[derive(Default)]
struct ControllerStats {
    mem_reads: u64,
    mem_writes: u64,
    rb_hits: u64,
    rb_miss: u64,
    starvation_precharges: u64,
    latency_sum: u64,
    latency_samples: u64,
    queue_latency_sum: u64,
    queue_latency_samples: u64,
}

/// Scheduler state common to every controller policy.
pub struct SchedulerCore {
    params: SharedParams,
    channel: usize,
    memory: Interconnect,

    bank_queues: Vec<Vec<VecDeque<Request>>>,
    /// Whether an ACTIVATE has been queued or issued that will leave a
    /// row in the buffer once the queue drains.
    activate_queued: Vec<Vec<bool>>,
    /// The row that will be open then; `params.rows` when none.
    effective_row: Vec<Vec<u64>>,
    /// Consecutive row-buffer hits served since the last ACTIVATE.
    starvation_counter: Vec<Vec<u32>>,

    refresh: RefreshState,
    next_refresh_rank: u64,
    next_refresh_bank: u64,

    cur_rank: usize,
    cur_bank: usize,

    /// Commands issued to the memory whose completions are still queued.
    outstanding: usize,
    stats: ControllerStats,
}

impl SchedulerCore {
    fn new(params: SharedParams, channel: usize, eq: &mut EventQueue) -> SchedulerCore {
        let ranks = params.ranks as usize;
        let banks = params.banks as usize;

        let refresh = RefreshState::new(&params);
        refresh.seed(channel, eq);

        SchedulerCore {
            channel,
            memory: Interconnect::new(params.clone()),
            bank_queues: vec![vec![VecDeque::new(); banks]; ranks],
            activate_queued: vec![vec![false; banks]; ranks],
            effective_row: vec![vec![params.rows; banks]; ranks],
            starvation_counter: vec![vec![0; banks]; ranks],
            refresh,
            next_refresh_rank: 0,
            next_refresh_bank: 0,
            cur_rank: 0,
            cur_bank: 0,
            outstanding: 0,
            stats: ControllerStats::default(),
            params,
        }
    }

    pub fn memory(&self) -> &Interconnect {
        &self.memory
    }

    pub fn refresh(&self) -> &RefreshState {
        &self.refresh
    }

    pub fn bank_queue(&self, rank: u64, bank: u64) -> &VecDeque<Request> {
        &self.bank_queues[rank as usize][bank as usize]
    }

    pub fn starvation_counter(&self, rank: u64, bank: u64) -> u32 {
        self.starvation_counter[rank as usize][bank as usize]
    }

    pub fn activate_queued(&self, rank: u64, bank: u64) -> bool {
        self.activate_queued[rank as usize][bank as usize]
    }

    pub fn effective_row(&self, rank: u64, bank: u64) -> u64 {
        self.effective_row[rank as usize][bank as usize]
    }

    fn need_refresh(&self, rank: u64, bank: u64) -> bool {
        self.refresh.need_refresh(rank, bank)
    }

    /// Tags a selected transaction per the close-page policy, looking at
    /// the transactions still queued behind it.
    fn apply_close_page_tag<'a>(
        &self,
        req: &mut Request,
        remaining: impl Iterator<Item = &'a Request>,
    ) {
        match self.params.close_page {
            ClosePagePolicy::Open => {}
            ClosePagePolicy::Relaxed => {
                let mut more_hits = remaining.filter(|r| {
                    r.addr.rank == req.addr.rank
                        && r.addr.bank == req.addr.bank
                        && r.addr.row == req.addr.row
                });
                if more_hits.next().is_none() {
                    req.tag = RequestTag::LastRequest;
                }
            }
            ClosePagePolicy::Restricted => req.tag = RequestTag::LastRequest,
        }
    }

    fn promote_last_request(req: &mut Request) {
        req.op = match req.op {
            OpType::Read => OpType::ReadPrecharge,
            OpType::Write => OpType::WritePrecharge,
            other => other,
        };
    }

    /// Expands a winning transaction onto its bank's command queue.
    ///
    /// The selectors guarantee the queue is empty for the miss cases, so
    /// the pushed sequence is never interleaved with another
    /// transaction's commands.
    fn issue_memory_commands(&mut self, mut req: Request, now: u64) {
        let rank = req.addr.rank as usize;
        let bank = req.addr.bank as usize;
        let row = req.addr.row;
        let closed_row = self.params.rows;

        req.issue_cycle = now;
        req.status = Status::Issued;

        if !self.activate_queued[rank][bank] && self.bank_queues[rank][bank].is_empty() {
            self.starvation_counter[rank][bank] = 0;
            self.activate_queued[rank][bank] = true;
            self.effective_row[rank][bank] = row;

            let mut activate = Request::internal(OpType::Activate, req.addr);
            activate.issue_cycle = now;
            self.bank_queues[rank][bank].push_back(activate);

            if req.tag == RequestTag::LastRequest {
                Self::promote_last_request(&mut req);
                self.activate_queued[rank][bank] = false;
                self.effective_row[rank][bank] = closed_row;
            }
            self.bank_queues[rank][bank].push_back(req);
        } else if self.activate_queued[rank][bank]
            && self.effective_row[rank][bank] != row
            && self.bank_queues[rank][bank].is_empty()
        {
            self.starvation_counter[rank][bank] = 0;
            self.activate_queued[rank][bank] = true;
            self.effective_row[rank][bank] = row;

            let mut precharge = Request::internal(OpType::Precharge, req.addr);
            precharge.issue_cycle = now;
            self.bank_queues[rank][bank].push_back(precharge);

            let mut activate = Request::internal(OpType::Activate, req.addr);
            activate.issue_cycle = now;
            self.bank_queues[rank][bank].push_back(activate);

            if req.tag == RequestTag::LastRequest {
                Self::promote_last_request(&mut req);
                self.activate_queued[rank][bank] = false;
                self.effective_row[rank][bank] = closed_row;
            }
            self.bank_queues[rank][bank].push_back(req);
        } else if self.activate_queued[rank][bank] && self.effective_row[rank][bank] == row {
            self.starvation_counter[rank][bank] += 1;

            if req.tag == RequestTag::LastRequest {
                debug_assert!(
                    self.params.close_page != ClosePagePolicy::Restricted,
                    "restricted close-page must never see a hit on an open row"
                );
                Self::promote_last_request(&mut req);
                self.activate_queued[rank][bank] = false;
                self.effective_row[rank][bank] = closed_row;
            }
            self.bank_queues[rank][bank].push_back(req);
        } else {
            // Selectors require an empty command queue for miss cases.
            debug_assert!(false, "transaction selected against a busy bank queue");
            self.bank_queues[rank][bank].push_back(req);
        }
    }

    /// Issues one due refresh if possible. Returns true when a REFRESH
    /// left for the memory this cycle; refresh monopolises the channel
    /// for that cycle.
    fn handle_refresh(&mut self, hooks: &mut HookBus, now: u64) -> bool {
        if !self.refresh.enabled() {
            return false;
        }

        let ranks = self.params.ranks;
        let num_groups = self.refresh.num_groups();
        let bpr = self.params.banks_per_refresh;
        let cursor_group = self.next_refresh_bank / bpr;

        for rank_off in 0..ranks {
            for group_off in 0..num_groups {
                let rank = (self.next_refresh_rank + rank_off) % ranks;
                let group = (cursor_group + group_off) % num_groups;

                if !self.refresh.need_refresh_group(rank, group) {
                    continue;
                }

                let head_bank = group * bpr;
                if !self.group_queues_empty(rank, head_bank) {
                    continue;
                }

                let addr = DeviceAddr {
                    rank,
                    bank: head_bank,
                    channel: self.channel as u64,
                    ..DeviceAddr::default()
                };
                let mut refresh_req = Request::internal(OpType::Refresh, addr);
                refresh_req.issue_cycle = now;

                if self.memory.is_issuable(&refresh_req, now).is_err() {
                    // Force open, idle banks closed so the refresh can go
                    // on a later cycle. The controller's own view gates
                    // this; it is cleared on enqueue, so each bank gets
                    // one PRECHARGE_ALL, not one per cycle.
                    for bank in head_bank..head_bank + bpr {
                        let open = self.activate_queued[rank as usize][bank as usize];
                        if open && self.bank_queues[rank as usize][bank as usize].is_empty() {
                            let pre_addr = DeviceAddr { bank, ..addr };
                            let mut pre = Request::internal(OpType::PrechargeAll, pre_addr);
                            pre.issue_cycle = now;
                            self.bank_queues[rank as usize][bank as usize].push_back(pre);
                            self.activate_queued[rank as usize][bank as usize] = false;
                            self.effective_row[rank as usize][bank as usize] = self.params.rows;
                        }
                    }
                    continue;
                }

                hooks.issue(&refresh_req);
                self.memory.issue_command(&refresh_req, now);
                self.refresh.refresh_issued(rank, group);

                self.next_refresh_bank += bpr;
                if self.next_refresh_bank >= self.params.banks {
                    self.next_refresh_bank = 0;
                    self.next_refresh_rank = (self.next_refresh_rank + 1) % ranks;
                }
                return true;
            }
        }
        false
    }

    fn group_queues_empty(&self, rank: u64, head_bank: u64) -> bool {
        (head_bank..head_bank + self.params.banks_per_refresh)
            .all(|b| self.bank_queues[rank as usize][b as usize].is_empty())
    }

    /// Issues at most one queued command to the memory. Refresh goes
    /// first and, if it issues, takes the whole cycle.
    fn cycle_command_queues(
        &mut self,
        eq: &mut EventQueue,
        hooks: &mut HookBus,
        now: u64,
    ) -> Result<(), SimError> {
        if self.handle_refresh(hooks, now) {
            return Ok(());
        }

        let ranks = self.params.ranks as usize;
        let banks = self.params.banks as usize;

        for rank_off in 0..ranks {
            for bank_off in 0..banks {
                let i = (self.cur_rank + rank_off) % ranks;
                let j = (self.cur_bank + bank_off) % banks;

                let Some(head) = self.bank_queues[i][j].front() else {
                    continue;
                };

                if self.memory.is_issuable(head, now).is_ok() {
                    let req = self.bank_queues[i][j].pop_front().unwrap();
                    hooks.issue(&req);
                    let done = self.memory.issue_command(&req, now);
                    eq.insert(done, self.channel, EventPayload::Completion(req));
                    self.outstanding += 1;
                    self.move_rank_bank();
                    return Ok(());
                }

                if now.saturating_sub(head.issue_cycle) > DEADLOCK_LIMIT {
                    return Err(SimError::Deadlock {
                        channel: self.channel,
                        rank: i as u64,
                        bank: j as u64,
                        address: head.addr.physical,
                        queued_cycle: head.issue_cycle,
                        current_cycle: now,
                    });
                }
            }
        }
        Ok(())
    }

    /// Advances the scan cursor per the configured scheduling scheme.
    fn move_rank_bank(&mut self) {
        let ranks = self.params.ranks as usize;
        let banks = self.params.banks as usize;
        match self.params.schedule_scheme {
            ScheduleScheme::Fixed => {}
            ScheduleScheme::RankFirst => {
                self.cur_rank += 1;
                if self.cur_rank == ranks {
                    self.cur_rank = 0;
                    self.cur_bank = (self.cur_bank + 1) % banks;
                }
            }
            ScheduleScheme::BankFirst => {
                self.cur_bank += 1;
                if self.cur_bank == banks {
                    self.cur_bank = 0;
                    self.cur_rank = (self.cur_rank + 1) % ranks;
                }
            }
        }
    }

    /// Increments the pulse counter and rearms the countdown.
    fn process_refresh_pulse(&mut self, rank: u64, group: u64, eq: &mut EventQueue) {
        self.refresh.pulse(rank, group);
        eq.insert(
            eq.current_cycle() + self.refresh.trefi(),
            self.channel,
            EventPayload::RefreshPulse { rank, group },
        );
    }

    /// Stamps a completed command and decides who disposes of it.
    fn complete_request(&mut self, mut req: Request, now: u64) -> Option<Request> {
        self.outstanding -= 1;
        req.status = Status::Complete;
        req.completion_cycle = now;

        if req.op.is_column_op() {
            self.stats.latency_sum += req.completion_cycle - req.issue_cycle;
            self.stats.latency_samples += 1;
            self.stats.queue_latency_sum += req.issue_cycle - req.arrival_cycle;
            self.stats.queue_latency_samples += 1;
        }

        match req.owner {
            Owner::Controller => None,
            Owner::External => Some(req),
        }
    }

    fn queued_commands(&self) -> usize {
        self.bank_queues
            .iter()
            .flat_map(|per_rank| per_rank.iter())
            .map(|q| q.len())
            .sum()
    }

    fn print_stats(&self, interval: u64) {
        let name = format!("channel{}", self.channel);
        let s = &self.stats;
        stats::stat(interval, &name, "mem_reads", s.mem_reads);
        stats::stat(interval, &name, "mem_writes", s.mem_writes);
        stats::stat(interval, &name, "rb_hits", s.rb_hits);
        stats::stat(interval, &name, "rb_miss", s.rb_miss);
        stats::stat(interval, &name, "starvation_precharges", s.starvation_precharges);
        stats::stat_average(
            interval,
            &name,
            "averageLatency",
            s.latency_sum,
            s.latency_samples,
        );
        stats::stat_average(
            interval,
            &name,
            "averageQueueLatency",
            s.queue_latency_sum,
            s.queue_latency_samples,
        );
        stats::stat(interval, &name, "measuredLatencies", s.latency_samples);
        stats::stat(
            interval,
            &name,
            "measuredQueueLatencies",
            s.queue_latency_samples,
        );
        stats::stat(
            interval,
            &name,
            "refreshPulses",
            self.refresh.pulses_received(),
        );
        stats::stat(
            interval,
            &name,
            "refreshesIssued",
            self.refresh.refreshes_issued(),
        );
        self.memory.print_stats(interval, &name);
    }
}

/// First-ready first-come-first-serve controller.
///
/// Selector priority per cycle: starved requests, then row-buffer hits,
/// then the oldest request to a ready bank, then requests to closed
/// banks. Banks awaiting refresh are skipped by every selector.
pub struct Frfcfs {
    core: SchedulerCore,
    queue: VecDeque<Request>,
    ps_interval: u64,
}

impl Frfcfs {
    pub fn new(params: SharedParams, channel: usize, eq: &mut EventQueue) -> Frfcfs {
        Frfcfs {
            core: SchedulerCore::new(params, channel, eq),
            queue: VecDeque::new(),
            ps_interval: 0,
        }
    }

    pub fn core(&self) -> &SchedulerCore {
        &self.core
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Removes and tags the first queued transaction matching `pred`,
    /// skipping banks that owe a refresh.
    fn take_first<F>(&mut self, pred: F) -> Option<Request>
    where
        F: Fn(&SchedulerCore, &Request) -> bool,
    {
        let core = &self.core;
        let idx = self.queue.iter().position(|r| {
            !core.need_refresh(r.addr.rank, r.addr.bank) && pred(core, r)
        })?;

        let mut req = self.queue.remove(idx).unwrap();
        self.core.apply_close_page_tag(&mut req, self.queue.iter());
        Some(req)
    }

    fn find_starved(&mut self) -> Option<Request> {
        let threshold = self.core.params.starvation_threshold;
        self.take_first(|core, r| {
            let (rank, bank) = (r.addr.rank, r.addr.bank);
            core.activate_queued(rank, bank)
                && core.effective_row(rank, bank) != r.addr.row
                && core.starvation_counter(rank, bank) >= threshold
                && core.bank_queue(rank, bank).is_empty()
        })
    }

    fn find_row_buffer_hit(&mut self) -> Option<Request> {
        self.take_first(|core, r| {
            let (rank, bank) = (r.addr.rank, r.addr.bank);
            core.activate_queued(rank, bank)
                && core.effective_row(rank, bank) == r.addr.row
                && core.bank_queue(rank, bank).is_empty()
        })
    }

    fn find_oldest_ready(&mut self) -> Option<Request> {
        self.take_first(|core, r| {
            let (rank, bank) = (r.addr.rank, r.addr.bank);
            core.activate_queued(rank, bank) && core.bank_queue(rank, bank).is_empty()
        })
    }

    fn find_closed_bank(&mut self) -> Option<Request> {
        self.take_first(|core, r| {
            let (rank, bank) = (r.addr.rank, r.addr.bank);
            !core.activate_queued(rank, bank) && core.bank_queue(rank, bank).is_empty()
        })
    }
}

impl MemoryController for Frfcfs {
    fn queue_full(&self) -> bool {
        self.queue.len() >= self.core.params.queue_size
    }

    fn issue_command(&mut self, mut req: Request, now: u64) -> Result<(), Request> {
        if self.queue_full() {
            return Err(req);
        }

        req.arrival_cycle = now;
        if req.op == OpType::Read {
            self.core.stats.mem_reads += 1;
        } else {
            self.core.stats.mem_writes += 1;
        }
        self.queue.push_back(req);
        Ok(())
    }

    fn request_complete(&mut self, req: Request, eq: &mut EventQueue) -> Option<Request> {
        self.core.complete_request(req, eq.current_cycle())
    }

    fn refresh_pulse(&mut self, rank: u64, group: u64, eq: &mut EventQueue) {
        self.core.process_refresh_pulse(rank, group, eq);
    }

    fn cycle(&mut self, eq: &mut EventQueue, hooks: &mut HookBus) -> Result<(), SimError> {
        let now = eq.current_cycle();

        // Starved requests go before row-buffer hits.
        if let Some(req) = self.find_starved() {
            self.core.stats.rb_miss += 1;
            self.core.stats.starvation_precharges += 1;
            self.core.issue_memory_commands(req, now);
        } else if let Some(req) = self.find_row_buffer_hit() {
            self.core.stats.rb_hits += 1;
            self.core.issue_memory_commands(req, now);
        } else if let Some(req) = self.find_oldest_ready() {
            self.core.stats.rb_miss += 1;
            self.core.issue_memory_commands(req, now);
        } else if let Some(req) = self.find_closed_bank() {
            self.core.stats.rb_miss += 1;
            self.core.issue_memory_commands(req, now);
        }

        self.core.cycle_command_queues(eq, hooks, now)?;
        self.core.memory.cycle(1, now);
        Ok(())
    }

    fn pending(&self) -> usize {
        self.queue.len() + self.core.queued_commands() + self.core.outstanding
    }

    fn print_stats(&mut self) {
        self.core.print_stats(self.ps_interval);
        self.ps_interval += 1;
    }
}

/// Strict arrival-order controller.
///
/// Only the transaction at the head of the queue is ever considered, so
/// a stalled head blocks everything behind it. Useful as a scheduling
/// baseline.
pub struct Fcfs {
    core: SchedulerCore,
    queue: VecDeque<Request>,
    ps_interval: u64,
}

impl Fcfs {
    pub fn new(params: SharedParams, channel: usize, eq: &mut EventQueue) -> Fcfs {
        Fcfs {
            core: SchedulerCore::new(params, channel, eq),
            queue: VecDeque::new(),
            ps_interval: 0,
        }
    }
}

impl MemoryController for Fcfs {
    fn queue_full(&self) -> bool {
        self.queue.len() >= self.core.params.queue_size
    }

    fn issue_command(&mut self, mut req: Request, now: u64) -> Result<(), Request> {
        if self.queue_full() {
            return Err(req);
        }

        req.arrival_cycle = now;
        if req.op == OpType::Read {
            self.core.stats.mem_reads += 1;
        } else {
            self.core.stats.mem_writes += 1;
        }
        self.queue.push_back(req);
        Ok(())
    }

    fn request_complete(&mut self, req: Request, eq: &mut EventQueue) -> Option<Request> {
        self.core.complete_request(req, eq.current_cycle())
    }

    fn refresh_pulse(&mut self, rank: u64, group: u64, eq: &mut EventQueue) {
        self.core.process_refresh_pulse(rank, group, eq);
    }

    fn cycle(&mut self, eq: &mut EventQueue, hooks: &mut HookBus) -> Result<(), SimError> {
        let now = eq.current_cycle();

        let servable = self.queue.front().is_some_and(|r| {
            let (rank, bank) = (r.addr.rank, r.addr.bank);
            !self.core.need_refresh(rank, bank) && self.core.bank_queue(rank, bank).is_empty()
        });

        if servable {
            let mut req = self.queue.pop_front().unwrap();
            let (rank, bank) = (req.addr.rank, req.addr.bank);
            if self.core.activate_queued(rank, bank)
                && self.core.effective_row(rank, bank) == req.addr.row
            {
                self.core.stats.rb_hits += 1;
            } else {
                self.core.stats.rb_miss += 1;
            }
            self.core.apply_close_page_tag(&mut req, self.queue.iter());
            self.core.issue_memory_commands(req, now);
        }

        self.core.cycle_command_queues(eq, hooks, now)?;
        self.core.memory.cycle(1, now);
        Ok(())
    }

    fn pending(&self) -> usize {
        self.queue.len() + self.core.queued_commands() + self.core.outstanding
    }

    fn print_stats(&mut self) {
        self.core.print_stats(self.ps_interval);
        self.ps_interval += 1;
    }
}
