//! The `Sequencer` aggregate
//!
//! One owned structure holds every table, control block, and counter; the
//! single task that owns it runs command handlers and the dispatcher to
//! completion, so no locking is needed anywhere. Hosts plug in through
//! the trait objects passed at construction.

use crate::config::SequencerConfig;
use crate::events::{EventId, EventType};
use crate::host::{CommandBus, EventSink, StagedLoad, TableHost, TableId, TimeSource};
use crate::table::{AppendTable, AtpControl, AtsSlot, DispatchState, RtpControl, RtsSlot};
use crate::validate::{parse_rts, verify_ats_table, TableStats};
use seqcmd_core::constants::{APPEND_BUFF_WORDS, ATS_BUFF_WORDS, NUM_ATS, NUM_RTS, RTS_BUFF_WORDS};
use seqcmd_core::error::{SeqError, SeqResult};
use seqcmd_core::id::{AtsId, RtsId};
use seqcmd_core::pipe::{PipeReceiver, RecvTimeoutError};
use seqcmd_core::{kdebug, kerror, kinfo};

/// Messages arriving on the sequencer's input pipe
#[derive(Debug, Clone)]
pub enum PipeMessage {
    /// Periodic tick: run the dispatcher
    Wakeup,

    /// Emit the housekeeping telemetry packet
    SendHk,

    /// A ground command packet
    Command(Vec<u8>),
}

/// Reset type reported by the host at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetType {
    PowerOn,
    ProcessorReset,
}

/// Housekeeping counters
///
/// The 8-bit command counters are deliberate: they match the telemetry
/// word layout and roll over in view of the ground.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    pub cmd_ctr: u8,
    pub cmd_err_ctr: u8,
    pub ats_cmd_ctr: u16,
    pub ats_cmd_err_ctr: u16,
    pub rts_cmd_ctr: u16,
    pub rts_cmd_err_ctr: u16,
    pub rts_active_ctr: u16,
    pub rts_active_err_ctr: u16,
    pub last_ats_err_seq: u16,
    pub last_ats_err_cmd: u16,
    pub last_rts_err_seq: u16,
    pub last_rts_err_cmd: u16,
    pub append_cmd_arg: u16,
}

impl Counters {
    /// Clear every counter (the ResetCounters command)
    pub fn reset(&mut self) {
        *self = Counters {
            append_cmd_arg: self.append_cmd_arg,
            ..Counters::default()
        };
    }
}

/// The stored-command sequencer
pub struct Sequencer {
    pub(crate) config: SequencerConfig,
    pub(crate) bus: Box<dyn CommandBus>,
    pub(crate) events: Box<dyn EventSink>,
    pub(crate) clock: Box<dyn TimeSource>,
    pub(crate) tables: Box<dyn TableHost>,

    pub(crate) ats: Vec<AtsSlot>,
    pub(crate) append: AppendTable,
    pub(crate) rts: Vec<RtsSlot>,

    pub(crate) atp: AtpControl,
    pub(crate) rtp: RtpControl,
    pub(crate) disp: DispatchState,
    pub(crate) counters: Counters,
}

impl Sequencer {
    /// Build a sequencer wired to the given host seams
    pub fn new(
        config: SequencerConfig,
        bus: Box<dyn CommandBus>,
        events: Box<dyn EventSink>,
        clock: Box<dyn TimeSource>,
        tables: Box<dyn TableHost>,
    ) -> Self {
        let continue_on_failure = config.continue_on_failure;
        let mut seq = Self {
            config,
            bus,
            events,
            clock,
            tables,
            ats: (0..NUM_ATS).map(|_| AtsSlot::new()).collect(),
            append: AppendTable::new(),
            rts: (0..NUM_RTS).map(|_| RtsSlot::new()).collect(),
            atp: AtpControl::new(continue_on_failure),
            rtp: RtpControl::new(),
            disp: DispatchState::new(),
            counters: Counters::default(),
        };
        seq.disp.current_time = seq.clock.now();
        seq
    }

    /// Apply the configured auto-start selector for this reset type
    pub fn startup(&mut self, reset: ResetType) {
        let rts_num = match reset {
            ResetType::PowerOn => self.config.auto_start_power_on,
            ResetType::ProcessorReset => self.config.auto_start_proc_reset,
        };
        if rts_num == 0 {
            return;
        }

        let id = RtsId::new(rts_num);
        let Some(index) = id.to_index() else {
            self.send_event(
                EventId::StartRtsInvalidId,
                EventType::Error,
                &format!("Auto-start rejected: invalid RTS ID {}", rts_num),
            );
            return;
        };

        // The selected RTS is enabled as part of the auto-start
        self.rts[index].info.disabled = false;
        self.send_event(
            EventId::AutoStartRts,
            EventType::Info,
            &format!("Auto-start RTS {:03}", rts_num),
        );
        self.start_rts_cmd(id);
    }

    /// Report an event to the host sink and mirror it to the log
    pub(crate) fn send_event(&mut self, id: EventId, ty: EventType, text: &str) {
        match ty {
            EventType::Error => kerror!("{}", text),
            EventType::Info => kinfo!("{}", text),
            EventType::Debug => kdebug!("{}", text),
        }
        self.events.event(id, ty, text);
    }

    /// Handle one input pipe message
    pub fn handle_message(&mut self, msg: PipeMessage) {
        match msg {
            PipeMessage::Wakeup => self.tick(),
            PipeMessage::SendHk => self.emit_housekeeping(),
            PipeMessage::Command(pkt) => self.process_command(&pkt),
        }
    }

    /// Main loop: block on the pipe and service messages until every
    /// producer is gone
    pub fn run(&mut self, rx: &PipeReceiver<PipeMessage>) {
        loop {
            match rx.recv_timeout(self.config.sb_timeout) {
                Ok(msg) => self.handle_message(msg),
                Err(RecvTimeoutError::Timeout) => {
                    // No traffic: keep the sequencer's clock view current
                    self.disp.current_time = self.clock.now();
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    // ------------------------------------------------------------------
    // Table commits
    // ------------------------------------------------------------------

    /// Validate and commit an ATS table image
    pub fn load_ats_image(&mut self, id: AtsId, image: &[u8]) -> SeqResult<TableStats> {
        let index = id.to_index().ok_or(SeqError::InvalidAtsId(id.as_u16()))?;
        if image.len() / 4 > ATS_BUFF_WORDS {
            return Err(seqcmd_core::error::TableError::BufferOverflow.into());
        }

        match verify_ats_table(image, image.len() / 4) {
            Ok(stats) => {
                self.send_event(
                    EventId::VerifyAtsInfo,
                    EventType::Info,
                    &format!(
                        "Verify ATS Table: command count = {}, byte count = {}",
                        stats.entry_count,
                        stats.byte_count()
                    ),
                );
                self.ats[index].install_image(image);
                Ok(stats)
            }
            Err(e) => {
                self.send_event(
                    EventId::VerifyAtsError,
                    EventType::Error,
                    &format!("Verify ATS Table error: {}", e),
                );
                Err(e.into())
            }
        }
    }

    /// Validate and commit an RTS table image
    pub fn load_rts_image(&mut self, id: RtsId, image: &[u8]) -> SeqResult<TableStats> {
        let index = id.to_index().ok_or(SeqError::InvalidRtsId(id.as_u16()))?;
        if image.len() / 4 > RTS_BUFF_WORDS {
            return Err(seqcmd_core::error::TableError::BufferOverflow.into());
        }

        match parse_rts(image, image.len() / 4) {
            Ok(stats) => {
                self.send_event(
                    EventId::VerifyRtsInfo,
                    EventType::Info,
                    &format!(
                        "RTS {:03} Table Verified: command count = {}",
                        id.as_u16(),
                        stats.entry_count
                    ),
                );
                self.rts[index].install_image(image);
                Ok(stats)
            }
            Err(e) => {
                self.send_event(
                    EventId::VerifyRtsError,
                    EventType::Error,
                    &format!("RTS {:03} Table Verify error: {}", id.as_u16(), e),
                );
                Err(e.into())
            }
        }
    }

    /// Validate and commit an Append table image
    pub fn load_append_image(&mut self, image: &[u8]) -> SeqResult<TableStats> {
        if image.len() / 4 > APPEND_BUFF_WORDS {
            return Err(seqcmd_core::error::TableError::BufferOverflow.into());
        }
        match verify_ats_table(image, image.len() / 4) {
            Ok(stats) => {
                self.append.install_image(image);
                self.send_event(
                    EventId::UpdateAppendInfo,
                    EventType::Info,
                    &format!(
                        "Update Append ATS Table: load count = {}, command count = {}, byte count = {}",
                        self.append.load_count,
                        self.append.entry_count,
                        self.append.word_count * 4
                    ),
                );
                Ok(stats)
            }
            Err(e) => {
                self.send_event(
                    EventId::VerifyAtsError,
                    EventType::Error,
                    &format!("Verify Append ATS Table error: {}", e),
                );
                Err(e.into())
            }
        }
    }

    /// Commit a staged load claimed from the host table service
    pub(crate) fn commit_staged(&mut self, load: StagedLoad) {
        let result = match load.table {
            TableId::Ats(id) => self.load_ats_image(id, &load.image).map(|_| ()),
            TableId::Rts(id) => self.load_rts_image(id, &load.image).map(|_| ()),
            TableId::Append => self.load_append_image(&load.image).map(|_| ()),
        };
        if let Err(e) = result {
            self.send_event(
                EventId::TableCommitFailed,
                EventType::Error,
                &format!("Table commit rejected: {}", e),
            );
        }
    }

    // ------------------------------------------------------------------
    // Inspection (tests, tools, housekeeping)
    // ------------------------------------------------------------------

    /// Housekeeping counters
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// ATP control block
    pub fn atp(&self) -> &AtpControl {
        &self.atp
    }

    /// RTP control block
    pub fn rtp(&self) -> &RtpControl {
        &self.rtp
    }

    /// Dispatcher state
    pub fn dispatch_state(&self) -> &DispatchState {
        &self.disp
    }

    /// An ATS slot by identifier
    pub fn ats_slot(&self, id: AtsId) -> Option<&AtsSlot> {
        id.to_index().map(|i| &self.ats[i])
    }

    /// An RTS slot by identifier
    pub fn rts_slot(&self, id: RtsId) -> Option<&RtsSlot> {
        id.to_index().map(|i| &self.rts[i])
    }

    /// The Append staging table
    pub fn append_table(&self) -> &AppendTable {
        &self.append
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::test_sequencer;
    use super::*;
    use crate::image::{AtsImageBuilder, RtsImageBuilder};
    use seqcmd_core::state::RtsStatus;

    #[test]
    fn test_load_ats_image_populates_slot() {
        let (mut seq, _bus, _clock) = test_sequencer(0);
        let image = AtsImageBuilder::new().noop(1, 10, 0x1800).finish();
        let stats = seq.load_ats_image(AtsId::new(1), &image).unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(seq.ats_slot(AtsId::new(1)).unwrap().entry_count(), 1);
    }

    #[test]
    fn test_load_ats_rejection_leaves_slot_untouched() {
        let (mut seq, _bus, _clock) = test_sequencer(0);
        let good = AtsImageBuilder::new().noop(1, 10, 0x1800).finish();
        seq.load_ats_image(AtsId::new(1), &good).unwrap();

        let bad = AtsImageBuilder::new()
            .noop(2, 10, 0x1800)
            .noop(2, 20, 0x1800)
            .finish();
        assert!(seq.load_ats_image(AtsId::new(1), &bad).is_err());
        // The earlier table is still loaded
        assert_eq!(seq.ats_slot(AtsId::new(1)).unwrap().entry_count(), 1);
    }

    #[test]
    fn test_load_rts_image_marks_loaded_and_disabled() {
        let (mut seq, _bus, _clock) = test_sequencer(0);
        let image = RtsImageBuilder::new().noop(1, 0x1800).finish();
        seq.load_rts_image(RtsId::new(5), &image).unwrap();
        let slot = seq.rts_slot(RtsId::new(5)).unwrap();
        assert_eq!(slot.info.status, RtsStatus::Loaded);
        assert!(slot.info.disabled);
    }

    #[test]
    fn test_load_invalid_ids_rejected() {
        let (mut seq, _bus, _clock) = test_sequencer(0);
        let image = AtsImageBuilder::new().noop(1, 10, 0x1800).finish();
        assert!(matches!(
            seq.load_ats_image(AtsId::new(0), &image),
            Err(SeqError::InvalidAtsId(0))
        ));
        assert!(matches!(
            seq.load_rts_image(RtsId::new(NUM_RTS as u16 + 1), &image),
            Err(SeqError::InvalidRtsId(_))
        ));
    }

    #[test]
    fn test_startup_auto_starts_selected_rts() {
        use crate::host::{NullTableHost, QueueBus, SimClock};

        let bus = QueueBus::new(16);
        let clock = SimClock::new(0);
        let config = SequencerConfig::default()
            .auto_start_power_on(2)
            .auto_start_proc_reset(3);
        let mut seq = Sequencer::new(
            config,
            Box::new(bus.clone()),
            Box::new(bus.clone()),
            Box::new(clock.clone()),
            Box::new(NullTableHost),
        );

        let image = RtsImageBuilder::new().noop(1, 0x1800).finish();
        seq.load_rts_image(RtsId::new(2), &image).unwrap();
        seq.load_rts_image(RtsId::new(3), &image).unwrap();

        // Power-on reset fires only the power-on selector, enabling the
        // target as it goes
        seq.startup(ResetType::PowerOn);
        assert_eq!(
            seq.rts_slot(RtsId::new(2)).unwrap().info.status,
            RtsStatus::Executing
        );
        assert_eq!(
            seq.rts_slot(RtsId::new(3)).unwrap().info.status,
            RtsStatus::Loaded
        );
        assert!(seq.rts_slot(RtsId::new(3)).unwrap().info.disabled);
    }

    #[test]
    fn test_startup_without_selector_is_quiet() {
        let (mut seq, _bus, _clock) = test_sequencer(0);
        seq.startup(ResetType::ProcessorReset);
        assert_eq!(seq.rtp().num_active, 0);
        assert_eq!(seq.counters().cmd_err_ctr, 0);
    }

    #[test]
    fn test_counters_reset_keeps_append_arg() {
        let mut c = Counters {
            cmd_ctr: 5,
            rts_cmd_ctr: 9,
            append_cmd_arg: 2,
            ..Counters::default()
        };
        c.reset();
        assert_eq!(c.cmd_ctr, 0);
        assert_eq!(c.rts_cmd_ctr, 0);
        assert_eq!(c.append_cmd_arg, 2);
    }
}
