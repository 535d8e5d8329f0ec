//! Housekeeping telemetry
//!
//! The fixed-layout packet summarizing sequencer state. Field order and
//! widths are the downlink contract; the two RTS bitmaps pack sixteen
//! sequences per word with RTS 1 in the LSB of word zero.

use crate::seq::Sequencer;
use seqcmd_core::bitmap::RtsStatusBits;
use seqcmd_core::constants::{NUM_ATS, RTS_BITMAP_WORDS};
use seqcmd_core::state::RtsStatus;
use seqcmd_core::time::AbsTimeTag;

/// Message id of the housekeeping telemetry packet
pub const HK_TLM_MID: u16 = 0x08AA;

/// Housekeeping packet contents
#[derive(Debug, Clone)]
pub struct HkPacket {
    pub ats_number: u8,
    pub atp_state: u8,
    pub continue_ats_on_failure: u8,
    pub cmd_err_ctr: u8,
    pub cmd_ctr: u8,
    pub switch_pend_flag: u16,
    pub num_rts_active: u16,
    pub rts_number: u16,
    pub rts_active_ctr: u16,
    pub rts_active_err_ctr: u16,
    pub ats_cmd_ctr: u16,
    pub ats_cmd_err_ctr: u16,
    pub rts_cmd_ctr: u16,
    pub rts_cmd_err_ctr: u16,
    pub last_ats_err_seq: u16,
    pub last_ats_err_cmd: u16,
    pub last_rts_err_seq: u16,
    pub last_rts_err_cmd: u16,
    pub append_cmd_arg: u16,
    pub append_entry_count: u16,
    pub append_byte_count: u16,
    pub append_load_count: u16,
    pub atp_cmd_number: u32,
    pub atp_free_bytes: [u32; NUM_ATS],
    pub next_rts_time: AbsTimeTag,
    pub next_ats_time: AbsTimeTag,
    pub rts_executing: RtsStatusBits,
    pub rts_disabled: RtsStatusBits,
}

impl HkPacket {
    /// Serialize to the big-endian wire layout, telemetry header included
    pub fn encode(&self, sequence: u16) -> Vec<u8> {
        // Six u8 fields, seventeen u16 fields, the u32 block, two bitmaps
        let body_len = 6 + 17 * 2 + 4 + NUM_ATS * 4 + 8 + RTS_BITMAP_WORDS * 4;
        let total = 6 + body_len;
        let mut out = Vec::with_capacity(total);

        // Telemetry primary header
        out.extend_from_slice(&HK_TLM_MID.to_be_bytes());
        out.extend_from_slice(&sequence.to_be_bytes());
        out.extend_from_slice(&((total - 7) as u16).to_be_bytes());

        out.push(self.ats_number);
        out.push(self.atp_state);
        out.push(self.continue_ats_on_failure);
        out.push(self.cmd_err_ctr);
        out.push(self.cmd_ctr);
        out.push(0); // pad

        out.extend_from_slice(&self.switch_pend_flag.to_be_bytes());
        out.extend_from_slice(&self.num_rts_active.to_be_bytes());
        out.extend_from_slice(&self.rts_number.to_be_bytes());
        out.extend_from_slice(&self.rts_active_ctr.to_be_bytes());
        out.extend_from_slice(&self.rts_active_err_ctr.to_be_bytes());
        out.extend_from_slice(&self.ats_cmd_ctr.to_be_bytes());
        out.extend_from_slice(&self.ats_cmd_err_ctr.to_be_bytes());
        out.extend_from_slice(&self.rts_cmd_ctr.to_be_bytes());
        out.extend_from_slice(&self.rts_cmd_err_ctr.to_be_bytes());
        out.extend_from_slice(&self.last_ats_err_seq.to_be_bytes());
        out.extend_from_slice(&self.last_ats_err_cmd.to_be_bytes());
        out.extend_from_slice(&self.last_rts_err_seq.to_be_bytes());
        out.extend_from_slice(&self.last_rts_err_cmd.to_be_bytes());
        out.extend_from_slice(&self.append_cmd_arg.to_be_bytes());
        out.extend_from_slice(&self.append_entry_count.to_be_bytes());
        out.extend_from_slice(&self.append_byte_count.to_be_bytes());
        out.extend_from_slice(&self.append_load_count.to_be_bytes());

        out.extend_from_slice(&self.atp_cmd_number.to_be_bytes());
        for free in &self.atp_free_bytes {
            out.extend_from_slice(&free.to_be_bytes());
        }
        out.extend_from_slice(&self.next_rts_time.to_be_bytes());
        out.extend_from_slice(&self.next_ats_time.to_be_bytes());

        for word in self.rts_executing.words() {
            out.extend_from_slice(&word.to_be_bytes());
        }
        for word in self.rts_disabled.words() {
            out.extend_from_slice(&word.to_be_bytes());
        }

        out
    }
}

impl Sequencer {
    /// Snapshot current state into a housekeeping packet
    pub fn build_hk(&mut self) -> HkPacket {
        // Refresh the RTS selection so the reported next time is current
        self.get_next_rts_time();

        let mut executing = RtsStatusBits::new();
        let mut disabled = RtsStatusBits::new();
        for (i, slot) in self.rts.iter().enumerate() {
            executing.assign(i, slot.info.status == RtsStatus::Executing);
            disabled.assign(i, slot.info.disabled);
        }

        let mut free = [0u32; NUM_ATS];
        for (i, slot) in self.ats.iter().enumerate() {
            free[i] = slot.free_bytes();
        }

        HkPacket {
            ats_number: self.atp.ats.as_u16() as u8,
            atp_state: self.atp.state.into(),
            continue_ats_on_failure: self.atp.continue_on_failure as u8,
            cmd_err_ctr: self.counters.cmd_err_ctr,
            cmd_ctr: self.counters.cmd_ctr,
            switch_pend_flag: self.atp.switch_pend as u16,
            num_rts_active: self.rtp.num_active,
            rts_number: self.rtp.next_rts.as_u16(),
            rts_active_ctr: self.counters.rts_active_ctr,
            rts_active_err_ctr: self.counters.rts_active_err_ctr,
            ats_cmd_ctr: self.counters.ats_cmd_ctr,
            ats_cmd_err_ctr: self.counters.ats_cmd_err_ctr,
            rts_cmd_ctr: self.counters.rts_cmd_ctr,
            rts_cmd_err_ctr: self.counters.rts_cmd_err_ctr,
            last_ats_err_seq: self.counters.last_ats_err_seq,
            last_ats_err_cmd: self.counters.last_ats_err_cmd,
            last_rts_err_seq: self.counters.last_rts_err_seq,
            last_rts_err_cmd: self.counters.last_rts_err_cmd,
            append_cmd_arg: self.counters.append_cmd_arg,
            append_entry_count: self.append.entry_count,
            append_byte_count: (self.append.word_count * 4) as u16,
            append_load_count: self.append.load_count,
            atp_cmd_number: self.atp.cmd_num.as_u16() as u32,
            atp_free_bytes: free,
            next_rts_time: self.disp.next_cmd_time[crate::table::PROC_RTP],
            next_ats_time: self.disp.next_cmd_time[crate::table::PROC_ATP],
            rts_executing: executing,
            rts_disabled: disabled,
        }
    }

    /// Emit the housekeeping packet on the bus
    pub fn emit_housekeeping(&mut self) {
        let pkt = self.build_hk();
        let bytes = pkt.encode(0);
        // Telemetry is best effort; a refused packet is not an error the
        // sequencer can act on
        let _ = self.bus.transmit(&bytes);
    }
}
