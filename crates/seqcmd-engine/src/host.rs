//! Host interface traits and queue-backed implementations
//!
//! The sequencer talks to its host through four narrow seams: the command
//! bus it emits packets on, the event sink, the time service, and the
//! table service. Production wiring plugs in the real host; the queue and
//! atomic implementations here back the simulator and the test suites.

use crate::events::{EventId, EventType};
use crossbeam_queue::{ArrayQueue, SegQueue};
use seqcmd_core::constants::{NUM_ATS, NUM_RTS};
use seqcmd_core::error::BusError;
use seqcmd_core::id::{AtsId, RtsId};
use seqcmd_core::time::AbsTimeTag;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Downstream command transport
///
/// `Send` so the sequencer task can live on its own thread.
pub trait CommandBus: Send {
    /// Emit a command packet toward its consumer
    fn transmit(&mut self, packet: &[u8]) -> Result<(), BusError>;
}

/// Event reporting seam
pub trait EventSink: Send {
    /// Report a numbered event with rendered text
    fn event(&mut self, id: EventId, ty: EventType, text: &str);
}

/// Host time service
pub trait TimeSource: Send {
    /// Current absolute time in seconds since the mission epoch
    fn now(&self) -> AbsTimeTag;
}

/// Identifier of a managed table
///
/// The numeric encoding follows the table registration order: ATS tables
/// first, then the Append table, then the RTS pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableId {
    Ats(AtsId),
    Append,
    Rts(RtsId),
}

impl TableId {
    /// Decode a wire table id
    pub fn from_u16(raw: u16) -> Option<TableId> {
        let ats_end = NUM_ATS as u16;
        let append = ats_end + 1;
        let rts_end = append + NUM_RTS as u16;
        match raw {
            0 => None,
            id if id <= ats_end => Some(TableId::Ats(AtsId::new(id))),
            id if id == append => Some(TableId::Append),
            id if id <= rts_end => Some(TableId::Rts(RtsId::new(id - append))),
            _ => None,
        }
    }

    /// Encode to the wire table id
    pub fn as_u16(&self) -> u16 {
        match self {
            TableId::Ats(id) => id.as_u16(),
            TableId::Append => NUM_ATS as u16 + 1,
            TableId::Rts(id) => NUM_ATS as u16 + 1 + id.as_u16(),
        }
    }
}

/// A table image the host has staged for commit
#[derive(Debug, Clone)]
pub struct StagedLoad {
    pub table: TableId,
    pub image: Vec<u8>,
}

/// Host table service
pub trait TableHost: Send {
    /// Called from the ManageTable command handler; returns a staged load
    /// for the table if one is pending
    fn manage(&mut self, table: TableId) -> Option<StagedLoad>;
}

/// An event as captured by [`QueueBus`]
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub id: EventId,
    pub ty: EventType,
    pub text: String,
}

/// Queue-backed bus and event sink
///
/// Transmitted packets land in a bounded lock-free queue; events in an
/// unbounded one. Handles are cheap clones sharing the same queues, so a
/// test or simulator keeps one handle and drains what the sequencer
/// pushed through the other.
#[derive(Clone)]
pub struct QueueBus {
    commands: Arc<ArrayQueue<Vec<u8>>>,
    events: Arc<SegQueue<EventRecord>>,
    fail_transmits: Arc<AtomicU32>,
}

impl QueueBus {
    /// Create a bus whose command queue holds `depth` packets
    pub fn new(depth: usize) -> Self {
        Self {
            commands: Arc::new(ArrayQueue::new(depth)),
            events: Arc::new(SegQueue::new()),
            fail_transmits: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Pop the oldest transmitted packet
    pub fn pop_command(&self) -> Option<Vec<u8>> {
        self.commands.pop()
    }

    /// Pop the oldest recorded event
    pub fn pop_event(&self) -> Option<EventRecord> {
        self.events.pop()
    }

    /// Number of packets waiting in the queue
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Drain and discard all recorded events
    pub fn clear_events(&self) {
        while self.events.pop().is_some() {}
    }

    /// Make the next `n` transmits fail (fault injection)
    pub fn inject_transmit_failures(&self, n: u32) {
        self.fail_transmits.store(n, Ordering::Relaxed);
    }
}

impl CommandBus for QueueBus {
    fn transmit(&mut self, packet: &[u8]) -> Result<(), BusError> {
        let pending = self.fail_transmits.load(Ordering::Relaxed);
        if pending > 0 {
            self.fail_transmits.store(pending - 1, Ordering::Relaxed);
            return Err(BusError::TransmitFailed);
        }
        self.commands
            .push(packet.to_vec())
            .map_err(|_| BusError::TransmitFailed)
    }
}

impl EventSink for QueueBus {
    fn event(&mut self, id: EventId, ty: EventType, text: &str) {
        self.events.push(EventRecord {
            id,
            ty,
            text: text.to_string(),
        });
    }
}

/// Settable clock for simulation and tests
#[derive(Clone)]
pub struct SimClock {
    now: Arc<AtomicU32>,
}

impl SimClock {
    pub fn new(start: AbsTimeTag) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(start)),
        }
    }

    /// Jump the clock to an absolute time
    pub fn set(&self, t: AbsTimeTag) {
        self.now.store(t, Ordering::Relaxed);
    }

    /// Advance the clock by `dt` seconds
    pub fn advance(&self, dt: u32) {
        self.now.fetch_add(dt, Ordering::Relaxed);
    }
}

impl TimeSource for SimClock {
    fn now(&self) -> AbsTimeTag {
        self.now.load(Ordering::Relaxed)
    }
}

/// Wall-clock time source for the simulator binary
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> AbsTimeTag {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as AbsTimeTag)
            .unwrap_or(0)
    }
}

/// Table host with a shared staging area
///
/// The host side pushes staged loads; the sequencer pulls them out when
/// it services a ManageTable command for the matching table.
#[derive(Clone)]
pub struct StagedTableHost {
    pending: Arc<Mutex<VecDeque<StagedLoad>>>,
}

impl StagedTableHost {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Stage a load for a later ManageTable command
    pub fn stage(&self, load: StagedLoad) {
        self.pending.lock().unwrap().push_back(load);
    }

    /// Number of staged loads not yet claimed
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl Default for StagedTableHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TableHost for StagedTableHost {
    fn manage(&mut self, table: TableId) -> Option<StagedLoad> {
        let mut pending = self.pending.lock().unwrap();
        let pos = pending.iter().position(|l| l.table == table)?;
        pending.remove(pos)
    }
}

/// Table host with nothing to manage
pub struct NullTableHost;

impl TableHost for NullTableHost {
    fn manage(&mut self, _table: TableId) -> Option<StagedLoad> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_id_round_trip() {
        let ids = [
            TableId::Ats(AtsId::new(1)),
            TableId::Ats(AtsId::new(2)),
            TableId::Append,
            TableId::Rts(RtsId::new(1)),
            TableId::Rts(RtsId::new(NUM_RTS as u16)),
        ];
        for id in ids {
            assert_eq!(TableId::from_u16(id.as_u16()), Some(id));
        }
        assert_eq!(TableId::from_u16(0), None);
        assert_eq!(TableId::from_u16(NUM_ATS as u16 + 1 + NUM_RTS as u16 + 1), None);
    }

    #[test]
    fn test_queue_bus_round_trip() {
        let bus = QueueBus::new(4);
        let mut sender = bus.clone();
        sender.transmit(&[1, 2, 3]).unwrap();
        assert_eq!(bus.pop_command(), Some(vec![1, 2, 3]));
        assert_eq!(bus.pop_command(), None);
    }

    #[test]
    fn test_queue_bus_fault_injection() {
        let bus = QueueBus::new(4);
        let mut sender = bus.clone();
        bus.inject_transmit_failures(1);
        assert_eq!(sender.transmit(&[9]), Err(BusError::TransmitFailed));
        assert!(sender.transmit(&[9]).is_ok());
    }

    #[test]
    fn test_queue_bus_full_is_transmit_failure() {
        let bus = QueueBus::new(1);
        let mut sender = bus.clone();
        sender.transmit(&[1]).unwrap();
        assert_eq!(sender.transmit(&[2]), Err(BusError::TransmitFailed));
    }

    #[test]
    fn test_sim_clock() {
        let clock = SimClock::new(100);
        assert_eq!(clock.now(), 100);
        clock.advance(5);
        assert_eq!(clock.now(), 105);
        clock.set(42);
        assert_eq!(clock.now(), 42);
    }

    #[test]
    fn test_staged_table_host_matches_table() {
        let host = StagedTableHost::new();
        host.stage(StagedLoad {
            table: TableId::Append,
            image: vec![1],
        });
        host.stage(StagedLoad {
            table: TableId::Ats(AtsId::new(1)),
            image: vec![2],
        });

        let mut h = host.clone();
        let got = h.manage(TableId::Ats(AtsId::new(1))).unwrap();
        assert_eq!(got.image, vec![2]);
        assert_eq!(host.pending_count(), 1);
        assert!(h.manage(TableId::Rts(RtsId::new(3))).is_none());
    }
}
