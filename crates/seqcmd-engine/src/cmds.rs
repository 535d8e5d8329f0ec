//! Ground command interface
//!
//! Command packets arriving on the input pipe are length-checked against
//! the expected payload for their function code before any field is read,
//! then dispatched to the matching handler. Unknown message ids and codes
//! count as command errors and change no state.

use crate::events::{EventId, EventType};
use crate::host::TableId;
use crate::msg;
use crate::seq::Sequencer;
use seqcmd_core::constants::{CMD_MID, SEND_HK_MID, WAKEUP_MID};
use seqcmd_core::id::{AtsId, RtsId};

/// Function codes accepted on the command pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmdCode {
    Noop = 0,
    ResetCounters = 1,
    StartAts = 2,
    StopAts = 3,
    StartRts = 4,
    StopRts = 5,
    DisableRts = 6,
    EnableRts = 7,
    SwitchAts = 8,
    JumpAts = 9,
    ContinueOnFailure = 10,
    AppendAts = 11,
    ManageTable = 12,
    StartRtsGroup = 13,
    StopRtsGroup = 14,
    DisableRtsGroup = 15,
    EnableRtsGroup = 16,
}

impl CmdCode {
    fn from_u8(cc: u8) -> Option<CmdCode> {
        match cc {
            0 => Some(CmdCode::Noop),
            1 => Some(CmdCode::ResetCounters),
            2 => Some(CmdCode::StartAts),
            3 => Some(CmdCode::StopAts),
            4 => Some(CmdCode::StartRts),
            5 => Some(CmdCode::StopRts),
            6 => Some(CmdCode::DisableRts),
            7 => Some(CmdCode::EnableRts),
            8 => Some(CmdCode::SwitchAts),
            9 => Some(CmdCode::JumpAts),
            10 => Some(CmdCode::ContinueOnFailure),
            11 => Some(CmdCode::AppendAts),
            12 => Some(CmdCode::ManageTable),
            13 => Some(CmdCode::StartRtsGroup),
            14 => Some(CmdCode::StopRtsGroup),
            15 => Some(CmdCode::DisableRtsGroup),
            16 => Some(CmdCode::EnableRtsGroup),
            _ => None,
        }
    }

    /// Expected payload size in bytes after the command header
    fn payload_size(&self) -> usize {
        match self {
            CmdCode::Noop | CmdCode::ResetCounters | CmdCode::StopAts | CmdCode::SwitchAts => 0,
            CmdCode::StartAts
            | CmdCode::StartRts
            | CmdCode::StopRts
            | CmdCode::DisableRts
            | CmdCode::EnableRts
            | CmdCode::ContinueOnFailure
            | CmdCode::AppendAts
            | CmdCode::JumpAts
            | CmdCode::ManageTable
            | CmdCode::StartRtsGroup
            | CmdCode::StopRtsGroup
            | CmdCode::DisableRtsGroup
            | CmdCode::EnableRtsGroup => 4,
        }
    }
}

#[inline]
fn payload_u16(pkt: &[u8], word: usize) -> u16 {
    let base = msg::CMD_HDR_SIZE + word * 2;
    u16::from_be_bytes([pkt[base], pkt[base + 1]])
}

#[inline]
fn payload_u32(pkt: &[u8]) -> u32 {
    let base = msg::CMD_HDR_SIZE;
    u32::from_be_bytes([pkt[base], pkt[base + 1], pkt[base + 2], pkt[base + 3]])
}

impl Sequencer {
    /// Route a raw pipe packet by message id
    ///
    /// Hosts that deliver undecoded packets use this instead of building
    /// [`crate::seq::PipeMessage`] values themselves.
    pub fn route_packet(&mut self, pkt: &[u8]) {
        if pkt.len() < msg::PRI_HDR_SIZE {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::InvalidMsgId,
                EventType::Error,
                &format!("Runt packet on command pipe: {} bytes", pkt.len()),
            );
            return;
        }

        match msg::msg_id(pkt) {
            WAKEUP_MID => self.tick(),
            SEND_HK_MID => self.emit_housekeeping(),
            CMD_MID => self.process_command(pkt),
            other => {
                self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
                self.send_event(
                    EventId::InvalidMsgId,
                    EventType::Error,
                    &format!("Invalid command pipe message ID: {:#06x}", other),
                );
            }
        }
    }

    /// Decode and execute one ground command packet
    pub fn process_command(&mut self, pkt: &[u8]) {
        if pkt.len() < msg::CMD_HDR_SIZE {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::InvalidCmdLength,
                EventType::Error,
                &format!("Invalid command packet: {} bytes", pkt.len()),
            );
            return;
        }

        let mid = msg::msg_id(pkt);
        if mid != CMD_MID {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::InvalidMsgId,
                EventType::Error,
                &format!("Invalid command pipe message ID: {:#06x}", mid),
            );
            return;
        }

        let raw_cc = msg::function_code(pkt);
        let Some(cc) = CmdCode::from_u8(raw_cc) else {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::InvalidCmdCode,
                EventType::Error,
                &format!("Invalid Command Code: MID = {:#06x} CC = {}", mid, raw_cc),
            );
            return;
        };

        let expected = msg::CMD_HDR_SIZE + cc.payload_size();
        if pkt.len() != expected || msg::total_size(pkt) != expected {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::InvalidCmdLength,
                EventType::Error,
                &format!(
                    "Invalid msg length: CC = {}, Len = {}, Expected = {}",
                    raw_cc,
                    pkt.len(),
                    expected
                ),
            );
            return;
        }

        match cc {
            CmdCode::Noop => {
                self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
                self.send_event(EventId::NoopInfo, EventType::Info, "No-op command");
            }
            CmdCode::ResetCounters => {
                self.counters.reset();
                self.send_event(
                    EventId::ResetCountersDebug,
                    EventType::Debug,
                    "Reset counters command",
                );
            }
            CmdCode::StartAts => self.start_ats_cmd(AtsId::new(payload_u16(pkt, 0))),
            CmdCode::StopAts => self.stop_ats_cmd(),
            CmdCode::StartRts => self.start_rts_cmd(RtsId::new(payload_u16(pkt, 0))),
            CmdCode::StopRts => self.stop_rts_cmd(RtsId::new(payload_u16(pkt, 0))),
            CmdCode::DisableRts => self.disable_rts_cmd(RtsId::new(payload_u16(pkt, 0))),
            CmdCode::EnableRts => self.enable_rts_cmd(RtsId::new(payload_u16(pkt, 0))),
            CmdCode::SwitchAts => self.switch_ats_cmd(),
            CmdCode::JumpAts => self.jump_ats_cmd(payload_u32(pkt)),
            CmdCode::ContinueOnFailure => self.continue_on_failure_cmd(payload_u16(pkt, 0)),
            CmdCode::AppendAts => self.append_ats_cmd(AtsId::new(payload_u16(pkt, 0))),
            CmdCode::ManageTable => self.manage_table_cmd(payload_u32(pkt)),
            CmdCode::StartRtsGroup => self.start_rts_group_cmd(
                RtsId::new(payload_u16(pkt, 0)),
                RtsId::new(payload_u16(pkt, 1)),
            ),
            CmdCode::StopRtsGroup => self.stop_rts_group_cmd(
                RtsId::new(payload_u16(pkt, 0)),
                RtsId::new(payload_u16(pkt, 1)),
            ),
            CmdCode::DisableRtsGroup => self.disable_rts_group_cmd(
                RtsId::new(payload_u16(pkt, 0)),
                RtsId::new(payload_u16(pkt, 1)),
            ),
            CmdCode::EnableRtsGroup => self.enable_rts_group_cmd(
                RtsId::new(payload_u16(pkt, 0)),
                RtsId::new(payload_u16(pkt, 1)),
            ),
        }
    }

    /// Service a host table-manage notification
    ///
    /// Claims any staged load for the named table and commits it here, in
    /// handler context, so the update never lands mid-dispatch.
    pub(crate) fn manage_table_cmd(&mut self, raw_id: u32) {
        let Some(table) = (raw_id <= u16::MAX as u32)
            .then(|| TableId::from_u16(raw_id as u16))
            .flatten()
        else {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::TableManageInvalidId,
                EventType::Error,
                &format!("Table manage command packet with invalid table ID: {}", raw_id),
            );
            return;
        };

        if let Some(load) = self.tables.manage(table) {
            self.commit_staged(load);
        }
        self.send_event(
            EventId::TableManageInfo,
            EventType::Debug,
            &format!("Managed table ID {}", raw_id),
        );
    }
}
