//! Integration tests for the event queue.

use nvsim::mem::event_queue::{EventPayload, EventQueue};
use nvsim::mem::request::{DeviceAddr, OpType, Request};

fn completion(op: OpType) -> EventPayload {
    EventPayload::Completion(Request::new(op, DeviceAddr::default()))
}

/// Tests that events fire on their scheduled cycle, in cycle order.
#[test]
fn test_event_ordering() {
    let mut eq = EventQueue::new();
    eq.insert(5, 0, completion(OpType::Read));
    eq.insert(2, 0, completion(OpType::Activate));

    assert!(eq.advance().is_empty()); // cycle 1
    let due = eq.advance(); // cycle 2
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].cycle, 2);

    assert!(eq.advance().is_empty()); // 3
    assert!(eq.advance().is_empty()); // 4
    let due = eq.advance(); // 5
    assert_eq!(due.len(), 1);
    assert_eq!(eq.current_cycle(), 5);
}

/// Tests that same-cycle events are delivered in insertion order.
#[test]
fn test_event_same_cycle_fifo() {
    let mut eq = EventQueue::new();
    eq.insert(3, 0, completion(OpType::Read));
    eq.insert(3, 1, completion(OpType::Write));
    eq.insert(3, 2, completion(OpType::Precharge));

    eq.advance();
    eq.advance();
    let due = eq.advance();
    let channels: Vec<usize> = due.iter().map(|e| e.channel).collect();
    assert_eq!(channels, vec![0, 1, 2]);
}

/// Tests cancelling pending events by predicate.
#[test]
fn test_event_cancel() {
    let mut eq = EventQueue::new();
    eq.insert(4, 0, completion(OpType::Read));
    eq.insert(4, 1, completion(OpType::Write));
    eq.insert(6, 0, EventPayload::RefreshPulse { rank: 0, group: 0 });

    let dropped = eq.cancel_if(|ev| ev.channel == 1);
    assert_eq!(dropped, 1);

    let mut seen = 0;
    for _ in 0..10 {
        seen += eq.advance().len();
    }
    assert_eq!(seen, 2);
}

/// Tests that only completions count as outstanding work.
#[test]
fn test_event_pending_completions() {
    let mut eq = EventQueue::new();
    eq.insert(10, 0, EventPayload::RefreshPulse { rank: 0, group: 0 });
    assert_eq!(eq.pending_completions(), 0);

    eq.insert(10, 0, completion(OpType::Read));
    assert_eq!(eq.pending_completions(), 1);
}
