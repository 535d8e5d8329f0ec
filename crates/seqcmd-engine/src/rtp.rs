//! Relative time processor
//!
//! Up to the full RTS pool can execute at once. Every tick the selection
//! scan picks the executing RTS whose next command is due soonest, with
//! ties going to the lowest number; the dispatcher then emits one command
//! from it and advances that RTS to its next entry.

use crate::events::{EventId, EventType};
use crate::msg;
use crate::entry;
use crate::seq::Sequencer;
use crate::table::PROC_RTP;
use seqcmd_core::constants::{
    BYTES_PER_WORD, NUM_RTS, PACKET_MIN_SIZE, RTS_BUFF_WORDS, RTS_HDR_WORDS,
};
use seqcmd_core::id::{EntryOffset, RtsId};
use seqcmd_core::kprint;
use seqcmd_core::state::RtsStatus;
use seqcmd_core::time::{abs_time_at, is_time_after, MAX_TIME};

const MIN_PKT_WORDS: usize = (PACKET_MIN_SIZE + BYTES_PER_WORD - 1) / BYTES_PER_WORD;

/// Why an RTS could not be started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartRefusal {
    Disabled,
    AlreadyRunning,
    NotLoaded,
    BadFirstLength,
}

impl Sequencer {
    // ------------------------------------------------------------------
    // Ground requests
    // ------------------------------------------------------------------

    /// Start an RTS
    pub fn start_rts_cmd(&mut self, id: RtsId) {
        let Some(index) = id.to_index() else {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::StartRtsInvalidId,
                EventType::Error,
                &format!("Start RTS {} Rejected: Invalid RTS ID", id.as_u16()),
            );
            return;
        };

        match self.try_start_rts(index) {
            Ok(()) => {
                self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
                self.counters.rts_active_ctr = self.counters.rts_active_ctr.wrapping_add(1);
                let (eid, ty) = if id.has_events() {
                    (EventId::StartRtsInfo, EventType::Info)
                } else {
                    (EventId::StartRtsInfo, EventType::Debug)
                };
                self.send_event(eid, ty, &format!("RTS {:03} Execution Started", id.as_u16()));
            }
            Err(refusal) => {
                self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
                self.counters.rts_active_err_ctr =
                    self.counters.rts_active_err_ctr.wrapping_add(1);
                let (eid, text) = match refusal {
                    StartRefusal::Disabled => (
                        EventId::StartRtsDisabled,
                        format!("Start RTS {:03} Rejected: RTS Disabled", id.as_u16()),
                    ),
                    StartRefusal::AlreadyRunning => (
                        EventId::StartRtsAlreadyRunning,
                        format!("Start RTS {:03} Rejected: RTS already running", id.as_u16()),
                    ),
                    StartRefusal::NotLoaded => (
                        EventId::StartRtsNotLoaded,
                        format!("Start RTS {:03} Rejected: RTS Not Loaded", id.as_u16()),
                    ),
                    StartRefusal::BadFirstLength => (
                        EventId::StartRtsBadFirstLength,
                        format!(
                            "Start RTS {:03} Rejected: invalid first command length",
                            id.as_u16()
                        ),
                    ),
                };
                self.send_event(eid, EventType::Error, &text);
            }
        }
    }

    /// Stop an RTS (idempotent)
    pub fn stop_rts_cmd(&mut self, id: RtsId) {
        let Some(index) = id.to_index() else {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::StopRtsInvalidId,
                EventType::Error,
                &format!("Stop RTS {} Rejected: Invalid RTS ID", id.as_u16()),
            );
            return;
        };

        self.kill_rts(index);
        self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
        self.send_event(
            EventId::StopRtsInfo,
            EventType::Info,
            &format!("RTS {:03} Aborted", id.as_u16()),
        );
    }

    /// Disable an RTS (it keeps running if already started)
    pub fn disable_rts_cmd(&mut self, id: RtsId) {
        let Some(index) = id.to_index() else {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::DisableRtsInvalidId,
                EventType::Error,
                &format!("Disable RTS {} Rejected: Invalid RTS ID", id.as_u16()),
            );
            return;
        };

        self.rts[index].info.disabled = true;
        self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
        self.send_event(
            EventId::DisableRtsDebug,
            EventType::Debug,
            &format!("Disabled RTS {:03}", id.as_u16()),
        );
    }

    /// Enable an RTS
    pub fn enable_rts_cmd(&mut self, id: RtsId) {
        let Some(index) = id.to_index() else {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::EnableRtsInvalidId,
                EventType::Error,
                &format!("Enable RTS {} Rejected: Invalid RTS ID", id.as_u16()),
            );
            return;
        };

        self.rts[index].info.disabled = false;
        self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
        self.send_event(
            EventId::EnableRtsDebug,
            EventType::Debug,
            &format!("Enabled RTS {:03}", id.as_u16()),
        );
    }

    // ------------------------------------------------------------------
    // Group requests
    // ------------------------------------------------------------------

    /// Start every eligible RTS in a number range
    ///
    /// Members that are unloaded, disabled or already running are passed
    /// over without error; only an invalid range rejects the command.
    pub fn start_rts_group_cmd(&mut self, first: RtsId, last: RtsId) {
        let Some(range) = self.validate_rts_range(first, last, EventId::StartRtsGroupRange) else {
            return;
        };

        let mut started = 0u16;
        for index in range {
            if self.try_start_rts(index).is_ok() {
                self.counters.rts_active_ctr = self.counters.rts_active_ctr.wrapping_add(1);
                started += 1;
            }
        }

        self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
        self.send_event(
            EventId::StartRtsGroupInfo,
            EventType::Info,
            &format!(
                "Start RTS group: FirstID={}, LastID={}, Modified={}",
                first.as_u16(),
                last.as_u16(),
                started
            ),
        );
    }

    /// Stop every executing RTS in a number range
    pub fn stop_rts_group_cmd(&mut self, first: RtsId, last: RtsId) {
        let Some(range) = self.validate_rts_range(first, last, EventId::StopRtsGroupRange) else {
            return;
        };

        let mut stopped = 0u16;
        for index in range {
            if self.rts[index].info.status == RtsStatus::Executing {
                self.kill_rts(index);
                stopped += 1;
            }
        }

        self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
        self.send_event(
            EventId::StopRtsGroupInfo,
            EventType::Info,
            &format!(
                "Stop RTS group: FirstID={}, LastID={}, Modified={}",
                first.as_u16(),
                last.as_u16(),
                stopped
            ),
        );
    }

    /// Disable every RTS in a number range
    pub fn disable_rts_group_cmd(&mut self, first: RtsId, last: RtsId) {
        let Some(range) = self.validate_rts_range(first, last, EventId::DisableRtsGroupRange)
        else {
            return;
        };

        let mut modified = 0u16;
        for index in range {
            self.rts[index].info.disabled = true;
            modified += 1;
        }

        self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
        self.send_event(
            EventId::DisableRtsGroupInfo,
            EventType::Info,
            &format!(
                "Disable RTS group: FirstID={}, LastID={}, Modified={}",
                first.as_u16(),
                last.as_u16(),
                modified
            ),
        );
    }

    /// Enable every RTS in a number range
    pub fn enable_rts_group_cmd(&mut self, first: RtsId, last: RtsId) {
        let Some(range) = self.validate_rts_range(first, last, EventId::EnableRtsGroupRange)
        else {
            return;
        };

        let mut modified = 0u16;
        for index in range {
            self.rts[index].info.disabled = false;
            modified += 1;
        }

        self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
        self.send_event(
            EventId::EnableRtsGroupInfo,
            EventType::Info,
            &format!(
                "Enable RTS group: FirstID={}, LastID={}, Modified={}",
                first.as_u16(),
                last.as_u16(),
                modified
            ),
        );
    }

    fn validate_rts_range(
        &mut self,
        first: RtsId,
        last: RtsId,
        event: EventId,
    ) -> Option<std::ops::RangeInclusive<usize>> {
        match (first.to_index(), last.to_index()) {
            (Some(f), Some(l)) if f <= l => Some(f..=l),
            _ => {
                self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
                self.send_event(
                    event,
                    EventType::Error,
                    &format!(
                        "RTS group Rejected: invalid range, FirstID={}, LastID={}",
                        first.as_u16(),
                        last.as_u16()
                    ),
                );
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Internal requests
    // ------------------------------------------------------------------

    /// Start one RTS if its state admits it
    fn try_start_rts(&mut self, index: usize) -> Result<(), StartRefusal> {
        let info = &self.rts[index].info;
        if info.disabled {
            return Err(StartRefusal::Disabled);
        }
        match info.status {
            RtsStatus::Executing => return Err(StartRefusal::AlreadyRunning),
            RtsStatus::Empty => return Err(StartRefusal::NotLoaded),
            RtsStatus::Loaded => {}
        }

        // The first entry must read back as a legal command before the
        // RTS is allowed to run
        let Some(size) = self.rts[index].raw_packet_size(0) else {
            return Err(StartRefusal::BadFirstLength);
        };
        if !msg::size_in_bounds(size)
            || entry::entry_words(RTS_HDR_WORDS, size) > RTS_BUFF_WORDS
        {
            return Err(StartRefusal::BadFirstLength);
        }

        let wakeup = self.rts[index].header_at(0).map(|h| h.wakeup_count).unwrap_or(0);
        let now = self.clock.now();

        let info = &mut self.rts[index].info;
        info.cmd_ctr = 0;
        info.cmd_err_ctr = 0;
        info.next_offset = EntryOffset::FIRST;
        info.next_cmd_time = abs_time_at(now, wakeup);
        info.status = RtsStatus::Executing;
        info.use_ctr += 1;
        self.rtp.num_active += 1;
        Ok(())
    }

    /// Take an RTS out of execution
    pub(crate) fn kill_rts(&mut self, index: usize) {
        let info = &mut self.rts[index].info;
        if info.status == RtsStatus::Executing {
            info.status = RtsStatus::Loaded;
            info.next_cmd_time = MAX_TIME;
            self.rtp.num_active = self.rtp.num_active.saturating_sub(1);
        }
    }

    /// Select the RTS that fires next
    ///
    /// The scan runs backwards with a non-strict compare so that among
    /// equal next-command times the lowest number wins: it is visited
    /// last and overwrites the higher-numbered ties.
    pub(crate) fn get_next_rts_time(&mut self) {
        let mut next_time = MAX_TIME;
        let mut next: Option<usize> = None;

        for i in (0..NUM_RTS).rev() {
            let info = &self.rts[i].info;
            if info.status == RtsStatus::Executing && info.next_cmd_time <= next_time {
                next_time = info.next_cmd_time;
                next = Some(i);
            }
        }

        match next {
            Some(i) => {
                self.rtp.next_rts = RtsId::from_index(i);
                self.disp.next_cmd_time[PROC_RTP] = next_time;
            }
            None => {
                self.rtp.next_rts = RtsId::NONE;
                self.disp.next_cmd_time[PROC_RTP] = MAX_TIME;
            }
        }
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Emit the selected RTS command
    pub(crate) fn process_rtp_command(&mut self) {
        let id = self.rtp.next_rts;
        let Some(index) = id.to_index() else {
            return;
        };
        if self.rts[index].info.status != RtsStatus::Executing
            || is_time_after(self.rts[index].info.next_cmd_time, self.disp.current_time)
        {
            return;
        }

        kprint::set_rts_context(id.as_u16());
        let offset = self.rts[index].info.next_offset.words();

        match self.rts[index].packet_at(offset) {
            Ok(pkt) => {
                if msg::validate_checksum(pkt) {
                    match self.bus.transmit(pkt) {
                        Ok(()) => {
                            self.rts[index].info.cmd_ctr += 1;
                            self.counters.rts_cmd_ctr = self.counters.rts_cmd_ctr.wrapping_add(1);
                        }
                        Err(_) => {
                            self.record_rts_error(index, offset);
                            self.send_event(
                                EventId::RtsDistribFailed,
                                EventType::Error,
                                &format!("RTS {:03} Command Distribution Failed", id.as_u16()),
                            );
                        }
                    }
                    self.get_next_rts_command();
                } else {
                    self.record_rts_error(index, offset);
                    self.send_event(
                        EventId::RtsChecksumFailed,
                        EventType::Error,
                        &format!("RTS {:03} Command Failed Checksum, RTS Aborted", id.as_u16()),
                    );
                    self.kill_rts(index);
                }
            }
            Err(_) => {
                self.record_rts_error(index, offset);
                self.send_event(
                    EventId::RtsAbortedLength,
                    EventType::Error,
                    &format!("Invalid Command Entry in RTS {:03}, RTS Aborted", id.as_u16()),
                );
                self.kill_rts(index);
            }
        }
        kprint::clear_rts_context();
    }

    /// Advance the selected RTS past the command it just emitted
    pub(crate) fn get_next_rts_command(&mut self) {
        let id = self.rtp.next_rts;
        let Some(index) = id.to_index() else {
            return;
        };
        if self.rts[index].info.status != RtsStatus::Executing {
            return;
        }

        let offset = self.rts[index].info.next_offset.words();
        let Some(cur_size) = self.rts[index].raw_packet_size(offset) else {
            self.complete_rts(index, id);
            return;
        };
        let new_offset = offset + entry::entry_words(RTS_HDR_WORDS, cur_size);

        // Not even a minimum entry fits in what remains
        if new_offset + RTS_HDR_WORDS + MIN_PKT_WORDS > RTS_BUFF_WORDS {
            self.complete_rts(index, id);
            return;
        }

        let size = self
            .rts[index]
            .raw_packet_size(new_offset)
            .unwrap_or(usize::MAX);

        if size == 7 {
            // Zero length field: the sentinel marking the end of the list
            self.complete_rts(index, id);
        } else if !msg::size_in_bounds(size) {
            self.record_rts_error(index, new_offset);
            self.send_event(
                EventId::RtsAbortedLength,
                EventType::Error,
                &format!(
                    "Invalid Length Field in RTS Command, RTS {:03} Aborted. Length: {}",
                    id.as_u16(),
                    size
                ),
            );
            self.kill_rts(index);
        } else if new_offset + entry::entry_words(RTS_HDR_WORDS, size) > RTS_BUFF_WORDS {
            self.record_rts_error(index, new_offset);
            self.send_event(
                EventId::RtsAbortedOverflow,
                EventType::Error,
                &format!("Cmd Runs passed end of table, RTS {:03} Aborted", id.as_u16()),
            );
            self.kill_rts(index);
        } else {
            let wakeup = self
                .rts[index]
                .header_at(new_offset)
                .map(|h| h.wakeup_count)
                .unwrap_or(0);
            self.rts[index].info.next_cmd_time = abs_time_at(self.disp.current_time, wakeup);
            self.rts[index].info.next_offset = EntryOffset::new(new_offset as u32);
        }
    }

    fn complete_rts(&mut self, index: usize, id: RtsId) {
        self.kill_rts(index);
        if id.has_events() {
            self.send_event(
                EventId::RtsCompleted,
                EventType::Info,
                &format!("RTS {:03} Execution Completed", id.as_u16()),
            );
        }
    }

    fn record_rts_error(&mut self, index: usize, offset: usize) {
        self.rts[index].info.cmd_err_ctr += 1;
        self.counters.rts_cmd_err_ctr = self.counters.rts_cmd_err_ctr.wrapping_add(1);
        self.counters.last_rts_err_seq = RtsId::from_index(index).as_u16();
        self.counters.last_rts_err_cmd = offset as u16;
    }
}
