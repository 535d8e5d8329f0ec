//! Absolute time processor
//!
//! One ATS executes at a time. Activation walks the time index skipping
//! entries already in the past, execution follows the time index rank by
//! rank, and three request paths reposition the processor: the deferred
//! ground switch, the inline switch embedded in an ATS, and the time
//! jump. Stop requests and the all-skipped condition funnel through
//! `kill_ats`, which is the only way out of the EXECUTING state.

use crate::events::{EventId, EventType};
use crate::msg;
use crate::seq::Sequencer;
use crate::table::PROC_ATP;
use seqcmd_core::constants::{CMD_MID, NUM_ATS};
use seqcmd_core::id::{AtsId, CommandNum};
use seqcmd_core::kprint;
use seqcmd_core::state::{AtpState, CmdStatus};
use seqcmd_core::time::{abs_time_at, is_time_after, AbsTimeTag, MAX_TIME};

/// Function code of the switch command, recognized inline in ATS streams
pub(crate) const SWITCH_ATS_CC: u8 = 8;

impl Sequencer {
    // ------------------------------------------------------------------
    // Ground requests
    // ------------------------------------------------------------------

    /// Start an ATS from idle
    pub fn start_ats_cmd(&mut self, id: AtsId) {
        let Some(index) = id.to_index() else {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::StartAtsInvalidId,
                EventType::Error,
                &format!("Start ATS {} Rejected: Invalid ATS ID", id.as_u16()),
            );
            return;
        };

        if self.atp.state != AtpState::Idle {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::StartAtsNotIdle,
                EventType::Error,
                "Start ATS Rejected: ATP is not Idle",
            );
            return;
        }

        if self.ats[index].entry_count() == 0 {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::StartAtsNotLoaded,
                EventType::Error,
                &format!("Start ATS Rejected: ATS {} Not Loaded", id.letter()),
            );
            return;
        }

        if self.begin_ats(index, 0) {
            self.atp.state = AtpState::Executing;
            self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
            kprint::set_ats_context(id.letter());
            self.send_event(
                EventId::StartAtsInfo,
                EventType::Info,
                &format!("ATS {} Execution Started", id.letter()),
            );
        } else {
            // All commands were skipped; begin_ats reported it
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
        }
    }

    /// Stop the executing ATS (idempotent, always counted as success)
    pub fn stop_ats_cmd(&mut self) {
        if self.atp.ats.is_valid() {
            let letter = self.atp.ats.letter();
            self.send_event(
                EventId::StopAtsInfo,
                EventType::Info,
                &format!("ATS {} stopped", letter),
            );
        } else {
            self.send_event(
                EventId::StopAtsNoAts,
                EventType::Info,
                "There is no ATS running to stop",
            );
        }

        self.kill_ats();
        self.atp.switch_pend = false;
        self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
    }

    /// Request a deferred switch to the other ATS
    pub fn switch_ats_cmd(&mut self) {
        if self.atp.state == AtpState::Executing {
            let current = self.atp.ats.to_index().unwrap_or(0);
            let other = AtsId::other_index(current);

            if self.ats[other].entry_count() > 0 {
                self.atp.switch_pend = true;
                self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
                self.send_event(EventId::SwitchAtsPending, EventType::Info, "Switch ATS is Pending");
            } else {
                self.atp.switch_pend = false;
                self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
                self.send_event(
                    EventId::SwitchAtsNotLoaded,
                    EventType::Error,
                    "Switch ATS Failure: Destination ATS Not Loaded",
                );
            }
        } else {
            self.atp.switch_pend = false;
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::SwitchAtsIdle,
                EventType::Error,
                "Switch ATS Rejected: ATP is idle",
            );
        }
    }

    /// Reposition the ATP to a new absolute time within the current ATS
    ///
    /// Entries earlier than the jump time that are still LOADED become
    /// SKIPPED; entries with any other status keep their history. If the
    /// walk consumes the whole sequence the ATS stops.
    pub fn jump_ats_cmd(&mut self, jump_time: AbsTimeTag) {
        if self.atp.state != AtpState::Executing {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::JumpAtsNoAts,
                EventType::Error,
                "ATS Jump Failed: No active ATS",
            );
            return;
        }

        let index = self.atp.ats.to_index().unwrap_or(0);
        let count = self.ats[index].entry_count();
        let mut rank = 0usize;
        let mut skipped = 0u16;
        let mut list_time: AbsTimeTag = 0;
        let mut cmd = CommandNum::END;

        while rank < count {
            cmd = self.ats[index].rank_cmd(rank).unwrap_or(CommandNum::END);
            list_time = self.ats[index].entry_time(cmd).unwrap_or(0);

            if is_time_after(jump_time, list_time) {
                if self.ats[index].status_of(cmd) == CmdStatus::Loaded {
                    self.ats[index].set_status(cmd, CmdStatus::Skipped);
                    skipped += 1;
                }
                rank += 1;
            } else {
                break;
            }
        }

        if rank == count {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::JumpAtsStopped,
                EventType::Error,
                "Jump Cmd: All ATS commands were skipped, ATS stopped",
            );
            self.kill_ats();
            return;
        }

        self.atp.cmd_num = cmd;
        self.atp.time_rank = rank;
        self.disp.next_cmd_time[PROC_ATP] = list_time;
        self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
        self.send_event(
            EventId::JumpAtsInfo,
            EventType::Info,
            &format!("Next ATS command time in the ATP was set to {}", list_time),
        );
        if skipped > 0 {
            self.send_event(
                EventId::JumpAtsSkipped,
                EventType::Debug,
                &format!("Jump Cmd: Skipped {} ATS commands", skipped),
            );
        }
    }

    /// Set the continue-on-checksum-failure flag
    pub fn continue_on_failure_cmd(&mut self, state: u16) {
        if state > 1 {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::ContinueFlagInvalid,
                EventType::Error,
                &format!("Continue ATS On Failure command failed, invalid state: {}", state),
            );
            return;
        }

        self.atp.continue_on_failure = state == 1;
        self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
        self.send_event(
            EventId::ContinueFlagDebug,
            EventType::Debug,
            &format!("Continue-ATS-On-Failure command, State: {}", state),
        );
    }

    // ------------------------------------------------------------------
    // Internal requests
    // ------------------------------------------------------------------

    /// Position the ATP at the first entry at or after now + `time_offset`
    ///
    /// Entries earlier than the target are marked SKIPPED. Returns false
    /// (with the ATS killed) if nothing remains to execute. The caller
    /// decides the processor state on success.
    pub(crate) fn begin_ats(&mut self, index: usize, time_offset: u32) -> bool {
        if index >= NUM_ATS {
            self.send_event(
                EventId::BeginAtsInvalidIndex,
                EventType::Error,
                &format!("Begin ATS error: invalid ATS index {}", index),
            );
            return false;
        }

        let start_time = abs_time_at(self.clock.now(), time_offset);
        let count = self.ats[index].entry_count();
        let mut rank = 0usize;
        let mut skipped = 0u16;
        let mut list_time: AbsTimeTag = 0;
        let mut cmd = CommandNum::END;

        while rank < count {
            cmd = self.ats[index].rank_cmd(rank).unwrap_or(CommandNum::END);
            list_time = self.ats[index].entry_time(cmd).unwrap_or(0);

            if is_time_after(start_time, list_time) {
                self.ats[index].set_status(cmd, CmdStatus::Skipped);
                skipped += 1;
                rank += 1;
            } else {
                break;
            }
        }

        if rank == count {
            self.send_event(
                EventId::AllCommandsSkipped,
                EventType::Error,
                "All ATS commands were skipped, ATS stopped",
            );
            self.kill_ats();
            return false;
        }

        self.atp.ats = AtsId::from_index(index);
        self.atp.cmd_num = cmd;
        self.atp.time_rank = rank;
        self.disp.next_cmd_time[PROC_ATP] = list_time;
        if skipped > 0 {
            self.send_event(
                EventId::JumpAtsSkipped,
                EventType::Debug,
                &format!("ATS started, skipped {} commands", skipped),
            );
        }
        true
    }

    /// Stop the executing ATS and reset the ATP
    pub(crate) fn kill_ats(&mut self) {
        if self.atp.ats.is_valid() && self.atp.state != AtpState::Idle {
            let index = self.atp.ats.to_index().unwrap_or(0);
            self.ats[index].info.use_ctr += 1;
        }
        self.atp.state = AtpState::Idle;
        self.atp.switch_pend = false;
        self.disp.next_cmd_time[PROC_ATP] = MAX_TIME;
        kprint::clear_ats_context();
    }

    /// Service a pending ground switch at the command boundary
    ///
    /// Called once the ATP has drained every command due at the current
    /// time; the handoff happens here so commands already executed this
    /// second are not repeated by the other ATS.
    pub(crate) fn service_switch_pend(&mut self) {
        if self.atp.state == AtpState::Executing {
            let old = self.atp.ats;
            let other = AtsId::other_index(old.to_index().unwrap_or(0));

            if self.ats[other].entry_count() > 0 {
                self.kill_ats();
                if self.begin_ats(other, 1) {
                    self.atp.state = AtpState::Executing;
                    kprint::set_ats_context(self.atp.ats.letter());
                    self.send_event(
                        EventId::SwitchServiced,
                        EventType::Info,
                        &format!(
                            "ATS Switched from {} to {}",
                            old.letter(),
                            AtsId::from_index(other).letter()
                        ),
                    );
                }
            } else {
                self.send_event(
                    EventId::SwitchServicedNotLoaded,
                    EventType::Error,
                    "Switch ATS Failure: Destination ATS is empty",
                );
            }
        } else {
            // Only reachable if the flag was corrupted
            self.send_event(
                EventId::SwitchServicedIdle,
                EventType::Error,
                "Switch ATS Rejected: ATP is idle",
            );
        }

        self.atp.switch_pend = false;
    }

    /// Execute a switch entry found inline in the ATS stream
    ///
    /// The new ATS starts at the current second in the STARTING latch
    /// state; its commands begin on the next wakeup tick.
    pub(crate) fn inline_switch(&mut self) -> bool {
        let old = self.atp.ats;
        let other = AtsId::other_index(old.to_index().unwrap_or(0));
        let ok;

        if self.ats[other].entry_count() > 0 {
            self.kill_ats();
            if self.begin_ats(other, 0) {
                self.atp.state = AtpState::Starting;
                kprint::set_ats_context(self.atp.ats.letter());
                self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
                self.send_event(
                    EventId::InlineSwitchInfo,
                    EventType::Info,
                    &format!(
                        "ATS Switched from {} to {}",
                        old.letter(),
                        AtsId::from_index(other).letter()
                    ),
                );
                ok = true;
            } else {
                self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
                ok = false;
            }
        } else {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::InlineSwitchNotLoaded,
                EventType::Error,
                "Switch ATS Failure: Destination ATS Not Loaded",
            );
            ok = false;
        }

        self.atp.switch_pend = false;
        ok
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Emit the ATS command the processor is positioned on
    pub(crate) fn process_atp_command(&mut self) {
        if self.atp.state != AtpState::Executing
            || is_time_after(self.disp.next_cmd_time[PROC_ATP], self.disp.current_time)
        {
            return;
        }
        let Some(index) = self.atp.ats.to_index() else {
            return;
        };
        let cmd = self.atp.cmd_num;

        if self.ats[index].status_of(cmd) == CmdStatus::Loaded {
            match self.ats[index].packet_of(cmd) {
                Ok(pkt) => {
                    if msg::validate_checksum(pkt) {
                        if msg::msg_id(pkt) == CMD_MID && msg::function_code(pkt) == SWITCH_ATS_CC {
                            // Inline switch request addressed to the sequencer
                            self.ats[index].set_status(cmd, CmdStatus::Executed);
                            self.counters.ats_cmd_ctr = self.counters.ats_cmd_ctr.wrapping_add(1);
                            self.inline_switch();
                            return;
                        }

                        match self.bus.transmit(pkt) {
                            Ok(()) => {
                                self.ats[index].set_status(cmd, CmdStatus::Executed);
                                self.counters.ats_cmd_ctr =
                                    self.counters.ats_cmd_ctr.wrapping_add(1);
                            }
                            Err(_) => {
                                self.ats[index].set_status(cmd, CmdStatus::FailedDistrib);
                                self.record_ats_error(cmd);
                                self.send_event(
                                    EventId::AtsDistribFailed,
                                    EventType::Error,
                                    &format!(
                                        "ATS Command Distribution Failed, Cmd Number: {}",
                                        cmd.as_u16()
                                    ),
                                );
                            }
                        }
                        self.get_next_ats_command();
                    } else {
                        self.ats[index].set_status(cmd, CmdStatus::FailedChecksum);
                        self.record_ats_error(cmd);
                        self.send_event(
                            EventId::AtsChecksumFailed,
                            EventType::Error,
                            &format!("ATS Command Failed Checksum: Command #{}", cmd.as_u16()),
                        );

                        if self.atp.continue_on_failure {
                            self.get_next_ats_command();
                        } else {
                            self.send_event(
                                EventId::AtsAborted,
                                EventType::Error,
                                &format!("ATS {} Aborted", self.atp.ats.letter()),
                            );
                            self.kill_ats();
                        }
                    }
                }
                Err(_) => {
                    // The stored entry no longer reads back cleanly
                    self.ats[index].set_status(cmd, CmdStatus::Skipped);
                    self.record_ats_error(cmd);
                    self.send_event(
                        EventId::AtsCommandNotLoaded,
                        EventType::Error,
                        &format!("Invalid ATS Command Entry, Cmd Number: {}", cmd.as_u16()),
                    );
                    self.get_next_ats_command();
                }
            }
        } else {
            // History says this command already resolved; skip it
            self.ats[index].set_status(cmd, CmdStatus::Skipped);
            self.record_ats_error(cmd);
            self.send_event(
                EventId::AtsCommandNotLoaded,
                EventType::Error,
                &format!("ATS Command Not Loaded, Cmd Number: {}", cmd.as_u16()),
            );
            self.get_next_ats_command();
        }

        // A ground switch waits for the command boundary: once nothing
        // else is due this second, hand over to the other ATS
        if self.atp.switch_pend
            && self.atp.state == AtpState::Executing
            && is_time_after(self.disp.next_cmd_time[PROC_ATP], self.disp.current_time)
        {
            self.service_switch_pend();
        }
    }

    /// Advance the ATP to the next time rank
    pub(crate) fn get_next_ats_command(&mut self) {
        match self.atp.state {
            AtpState::Executing => {
                let Some(index) = self.atp.ats.to_index() else {
                    return;
                };
                let rank = self.atp.time_rank + 1;

                if rank < self.ats[index].entry_count() {
                    let cmd = self.ats[index].rank_cmd(rank).unwrap_or(CommandNum::END);
                    self.atp.time_rank = rank;
                    self.atp.cmd_num = cmd;
                    self.disp.next_cmd_time[PROC_ATP] =
                        self.ats[index].entry_time(cmd).unwrap_or(MAX_TIME);
                } else {
                    let letter = self.atp.ats.letter();
                    self.kill_ats();
                    self.send_event(
                        EventId::AtsCompleted,
                        EventType::Info,
                        &format!("ATS {} Execution Completed", letter),
                    );
                }
            }
            AtpState::Starting => {
                // Latch: execution resumes on the next wakeup cycle
                self.atp.state = AtpState::Executing;
            }
            AtpState::Idle => {}
        }
    }

    /// Record last-error telemetry for an ATS command failure
    fn record_ats_error(&mut self, cmd: CommandNum) {
        self.counters.ats_cmd_err_ctr = self.counters.ats_cmd_err_ctr.wrapping_add(1);
        self.counters.last_ats_err_seq = self.atp.ats.as_u16();
        self.counters.last_ats_err_cmd = cmd.as_u16();
    }
}
