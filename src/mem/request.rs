//! Memory request record.
//!
//! A `Request` is the mutable record carried through the whole pipeline:
//! it enters as a logical READ or WRITE from the producer, is expanded by
//! the controller into device commands (which are themselves requests),
//! and is stamped with arrival, issue, and completion cycles along the way.

use std::fmt;

/// Device-level operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    Read,
    Write,
    /// Read fused with an implicit precharge (close-page policies).
    ReadPrecharge,
    /// Write fused with an implicit precharge (close-page policies).
    WritePrecharge,
    Activate,
    Precharge,
    /// Precharge forcing a bank closed ahead of a refresh.
    PrechargeAll,
    Refresh,
    PowerDown,
    PowerUp,
    Nop,
}

impl OpType {
    /// True for the column operations that move data over the bus.
    pub fn is_column_op(self) -> bool {
        matches!(
            self,
            OpType::Read | OpType::Write | OpType::ReadPrecharge | OpType::WritePrecharge
        )
    }

    /// True for reads, including the fused-precharge variant.
    pub fn is_read(self) -> bool {
        matches!(self, OpType::Read | OpType::ReadPrecharge)
    }

    /// True for writes, including the fused-precharge variant.
    pub fn is_write(self) -> bool {
        matches!(self, OpType::Write | OpType::WritePrecharge)
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpType::Read => "READ",
            OpType::Write => "WRITE",
            OpType::ReadPrecharge => "READ_PRECHARGE",
            OpType::WritePrecharge => "WRITE_PRECHARGE",
            OpType::Activate => "ACTIVATE",
            OpType::Precharge => "PRECHARGE",
            OpType::PrechargeAll => "PRECHARGE_ALL",
            OpType::Refresh => "REFRESH",
            OpType::PowerDown => "POWERDOWN",
            OpType::PowerUp => "POWERUP",
            OpType::Nop => "NOP",
        };
        f.write_str(s)
    }
}

/// Request lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Incomplete,
    Issued,
    Complete,
}

/// Who is responsible for disposing of a request at completion.
///
/// Controller-owned requests are the device commands the scheduler
/// fabricates (ACTIVATE, PRECHARGE, REFRESH); they die inside the
/// controller. External requests are handed back up the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Controller,
    External,
}

/// Scheduling hints attached by the selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTag {
    None,
    /// No more queued requests target this row; close it behind the op.
    LastRequest,
}

/// Decoded device coordinates for a physical address.
///
/// The sub-line byte offset is preserved as a bit address so that
/// translation is exactly invertible for unaligned addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceAddr {
    pub physical: u64,
    pub row: u64,
    pub col: u64,
    pub bank: u64,
    pub rank: u64,
    pub channel: u64,
    pub subarray: u64,
    pub bit: u64,
}

/// A memory transaction or device command in flight.
#[derive(Debug, Clone)]
pub struct Request {
    pub op: OpType,
    pub addr: DeviceAddr,
    pub status: Status,
    pub owner: Owner,
    pub tag: RequestTag,
    /// Cycle the transaction entered the controller queue.
    pub arrival_cycle: u64,
    /// Cycle the transaction was expanded into device commands.
    pub issue_cycle: u64,
    /// Cycle the final device command finished.
    pub completion_cycle: u64,
    pub data: Option<Vec<u8>>,
    pub thread_id: u64,
}

impl Request {
    pub fn new(op: OpType, addr: DeviceAddr) -> Request {
        Request {
            op,
            addr,
            status: Status::Incomplete,
            owner: Owner::External,
            tag: RequestTag::None,
            arrival_cycle: 0,
            issue_cycle: 0,
            completion_cycle: 0,
            data: None,
            thread_id: 0,
        }
    }

    /// A controller-fabricated device command aimed at `addr`.
    pub fn internal(op: OpType, addr: DeviceAddr) -> Request {
        let mut req = Request::new(op, addr);
        req.owner = Owner::Controller;
        req
    }
}
