//! Table buffers, derived index maps, and control blocks
//!
//! Each ATS owns a fixed word buffer plus three derived maps rebuilt on
//! every (re)load: the command index (command number to entry offset),
//! the command status table, and the time index (execution rank to
//! command number, sorted by time tag). Each RTS owns a small buffer and
//! an info record; the Append table is a staging area shared by both ATS.

use crate::entry::{self, read_ats_header, read_rts_header, RtsEntryHeader};
use seqcmd_core::constants::{
    APPEND_BUFF_WORDS, ATS_BUFF_WORDS, ATS_HDR_WORDS, BYTES_PER_WORD, MAX_ATS_CMDS,
    RTS_BUFF_WORDS, RTS_HDR_WORDS,
};
use seqcmd_core::error::TableError;
use seqcmd_core::id::{AtsId, CommandNum, EntryOffset, RtsId};
use seqcmd_core::state::{AtpState, CmdStatus, RtsStatus};
use seqcmd_core::time::{is_time_after, AbsTimeTag, MAX_TIME};

/// Per-ATS totals
#[derive(Debug, Clone, Copy, Default)]
pub struct AtsInfo {
    /// Number of loaded commands
    pub entry_count: u16,

    /// Words consumed by the loaded entries
    pub size_words: usize,

    /// Times this ATS has been taken from executing to stopped
    pub use_ctr: u32,
}

/// One ATS table with its derived maps
pub struct AtsSlot {
    buffer: Vec<u8>,
    pub info: AtsInfo,
    cmd_index: Vec<EntryOffset>,
    cmd_status: Vec<CmdStatus>,
    time_index: Vec<CommandNum>,
}

impl AtsSlot {
    pub fn new() -> Self {
        Self {
            buffer: vec![0u8; ATS_BUFF_WORDS * BYTES_PER_WORD],
            info: AtsInfo::default(),
            cmd_index: vec![EntryOffset::INVALID; MAX_ATS_CMDS],
            cmd_status: vec![CmdStatus::Empty; MAX_ATS_CMDS],
            time_index: Vec::new(),
        }
    }

    /// Clear the derived maps and totals (the use counter survives)
    pub fn clear(&mut self) {
        self.cmd_index.fill(EntryOffset::INVALID);
        self.cmd_status.fill(CmdStatus::Empty);
        self.time_index.clear();
        self.info.entry_count = 0;
        self.info.size_words = 0;
    }

    /// Copy a table image into the buffer and rebuild the derived maps
    ///
    /// Returns false (with the slot cleared) if the image does not fit or
    /// holds no loadable entries.
    pub fn install_image(&mut self, image: &[u8]) -> bool {
        if image.len() > self.buffer.len() {
            self.clear();
            return false;
        }
        self.buffer.fill(0);
        self.buffer[..image.len()].copy_from_slice(image);
        self.load();
        self.info.entry_count > 0
    }

    /// Rebuild the derived maps from the buffer contents
    ///
    /// The buffer is expected to have passed validation; any malformed
    /// entry found here wipes the slot rather than loading half a table.
    pub fn load(&mut self) {
        self.clear();

        let mut offset = 0usize;
        let mut count: u16 = 0;

        loop {
            let Some(hdr) = read_ats_header(&self.buffer, offset) else {
                break;
            };
            if hdr.cmd_num.is_end() {
                break;
            }

            let Some(slot) = hdr.cmd_num.to_index() else {
                return self.clear();
            };
            if self.cmd_status[slot] != CmdStatus::Empty {
                // Same command number twice
                return self.clear();
            }

            match entry::checked_packet(&self.buffer, offset + ATS_HDR_WORDS, ATS_BUFF_WORDS) {
                Ok(pkt) => {
                    self.cmd_index[slot] = EntryOffset::new(offset as u32);
                    self.cmd_status[slot] = CmdStatus::Loaded;
                    count += 1;
                    offset += entry::entry_words(ATS_HDR_WORDS, pkt.len());
                }
                Err(_) => return self.clear(),
            }

            if offset >= ATS_BUFF_WORDS {
                break;
            }
        }

        if count == 0 {
            return self.clear();
        }

        self.info.entry_count = count;
        self.info.size_words = offset;
        self.build_time_index();
    }

    /// Rebuild the time index from the command index
    ///
    /// Slots are visited in command-number order, which fixes the tie
    /// rule: equal time tags execute in ascending command number.
    fn build_time_index(&mut self) {
        self.time_index.clear();
        for slot in 0..MAX_ATS_CMDS {
            if !self.cmd_index[slot].is_invalid() {
                self.insert_sorted(CommandNum::from_index(slot));
            }
        }
    }

    /// Stable insertion into the time-sorted list
    ///
    /// Walks back from the tail shifting entries with a strictly later
    /// time tag; equal tags stop the walk, so the new command lands after
    /// them. Loads and appends are rare, the list is scanned every tick,
    /// so exact ordering matters more than construction cost.
    fn insert_sorted(&mut self, cmd: CommandNum) {
        let new_time = self.entry_time(cmd).unwrap_or(0);
        let mut pos = self.time_index.len();
        while pos > 0 {
            let prior = self.entry_time(self.time_index[pos - 1]).unwrap_or(0);
            if is_time_after(prior, new_time) {
                pos -= 1;
            } else {
                break;
            }
        }
        self.time_index.insert(pos, cmd);
    }

    /// Graft validated Append entries onto the end of this table
    ///
    /// A grafted command number that already exists is re-pointed at the
    /// new copy; the old bytes become dead. The time index is rebuilt in
    /// full afterwards.
    pub fn graft(&mut self, staged: &[u8], word_count: usize, entry_count: u16) {
        let dst = self.info.size_words;
        let dst_base = dst * BYTES_PER_WORD;
        let src_bytes = word_count * BYTES_PER_WORD;
        self.buffer[dst_base..dst_base + src_bytes].copy_from_slice(&staged[..src_bytes]);
        self.info.size_words += word_count;

        let mut offset = dst;
        let mut remaining = entry_count;
        while remaining > 0 {
            let Some(hdr) = read_ats_header(&self.buffer, offset) else {
                break;
            };
            let Some(slot) = hdr.cmd_num.to_index() else {
                break;
            };
            let Ok(pkt) =
                entry::checked_packet(&self.buffer, offset + ATS_HDR_WORDS, self.info.size_words)
            else {
                break;
            };

            if self.cmd_index[slot].is_invalid() {
                self.info.entry_count += 1;
            }
            self.cmd_index[slot] = EntryOffset::new(offset as u32);
            self.cmd_status[slot] = CmdStatus::Loaded;

            offset += entry::entry_words(ATS_HDR_WORDS, pkt.len());
            remaining -= 1;
        }

        self.build_time_index();
    }

    /// Number of loaded commands
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.info.entry_count as usize
    }

    /// Command number at the given execution rank
    #[inline]
    pub fn rank_cmd(&self, rank: usize) -> Option<CommandNum> {
        self.time_index.get(rank).copied()
    }

    /// Execution status of a command slot
    pub fn status_of(&self, cmd: CommandNum) -> CmdStatus {
        match cmd.to_index() {
            Some(slot) => self.cmd_status[slot],
            None => CmdStatus::Empty,
        }
    }

    /// Update the execution status of a command slot
    pub fn set_status(&mut self, cmd: CommandNum, status: CmdStatus) {
        if let Some(slot) = cmd.to_index() {
            self.cmd_status[slot] = status;
        }
    }

    /// Entry offset of a command
    pub fn offset_of(&self, cmd: CommandNum) -> EntryOffset {
        match cmd.to_index() {
            Some(slot) => self.cmd_index[slot],
            None => EntryOffset::INVALID,
        }
    }

    /// Time tag of a loaded command
    pub fn entry_time(&self, cmd: CommandNum) -> Option<AbsTimeTag> {
        let off = self.offset_of(cmd);
        if off.is_invalid() {
            return None;
        }
        read_ats_header(&self.buffer, off.words()).map(|h| h.time_tag)
    }

    /// Embedded packet of a loaded command, bounds-checked on every read
    pub fn packet_of(&self, cmd: CommandNum) -> Result<&[u8], TableError> {
        let off = self.offset_of(cmd);
        if off.is_invalid() {
            return Err(TableError::BufferOverflow);
        }
        entry::checked_packet(&self.buffer, off.words() + ATS_HDR_WORDS, self.info.size_words)
    }

    /// Unused buffer capacity in bytes (reported in housekeeping)
    pub fn free_bytes(&self) -> u32 {
        ((ATS_BUFF_WORDS - self.info.size_words) * BYTES_PER_WORD) as u32
    }

    /// Direct buffer access for tools and tests
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }
}

impl Default for AtsSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-RTS execution state
#[derive(Debug, Clone, Copy)]
pub struct RtsInfo {
    /// Load/run status
    pub status: RtsStatus,

    /// A disabled RTS may not be started
    pub disabled: bool,

    /// Commands emitted during the current and prior activations
    pub cmd_ctr: u32,

    /// Command failures attributed to this RTS
    pub cmd_err_ctr: u32,

    /// Absolute time the next command becomes due
    pub next_cmd_time: AbsTimeTag,

    /// Word offset of the next entry to dispatch
    pub next_offset: EntryOffset,

    /// Times this RTS has been started
    pub use_ctr: u32,
}

impl Default for RtsInfo {
    fn default() -> Self {
        Self {
            status: RtsStatus::Empty,
            disabled: true,
            cmd_ctr: 0,
            cmd_err_ctr: 0,
            next_cmd_time: 0,
            next_offset: EntryOffset::FIRST,
            use_ctr: 0,
        }
    }
}

/// One RTS table
pub struct RtsSlot {
    buffer: Vec<u8>,
    pub info: RtsInfo,
}

impl RtsSlot {
    pub fn new() -> Self {
        Self {
            buffer: vec![0u8; RTS_BUFF_WORDS * BYTES_PER_WORD],
            info: RtsInfo::default(),
        }
    }

    /// Copy a validated RTS image into the buffer and mark it loaded
    ///
    /// A freshly loaded RTS comes up disabled; the ground enables it
    /// explicitly before the first start.
    pub fn install_image(&mut self, image: &[u8]) -> bool {
        if image.len() > self.buffer.len() {
            return false;
        }
        self.buffer.fill(0);
        self.buffer[..image.len()].copy_from_slice(image);

        self.info.status = RtsStatus::Loaded;
        self.info.disabled = true;
        self.info.cmd_ctr = 0;
        self.info.cmd_err_ctr = 0;
        self.info.next_cmd_time = 0;
        self.info.next_offset = EntryOffset::FIRST;
        true
    }

    /// Entry header at a word offset
    pub fn header_at(&self, word_off: usize) -> Option<RtsEntryHeader> {
        read_rts_header(&self.buffer, word_off)
    }

    /// Embedded packet at an entry word offset, bounds-checked
    pub fn packet_at(&self, entry_word_off: usize) -> Result<&[u8], TableError> {
        entry::checked_packet(&self.buffer, entry_word_off + RTS_HDR_WORDS, RTS_BUFF_WORDS)
    }

    /// Raw size of the packet at an entry word offset
    pub fn raw_packet_size(&self, entry_word_off: usize) -> Option<usize> {
        entry::raw_packet_size(&self.buffer, entry_word_off + RTS_HDR_WORDS)
    }

    /// Direct buffer access for tools and tests
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }
}

impl Default for RtsSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// The Append staging table
pub struct AppendTable {
    buffer: Vec<u8>,

    /// Entries counted by the last commit scan
    pub entry_count: u16,

    /// Words those entries occupy
    pub word_count: usize,

    /// Commits seen since startup
    pub load_count: u16,
}

impl AppendTable {
    pub fn new() -> Self {
        Self {
            buffer: vec![0u8; APPEND_BUFF_WORDS * BYTES_PER_WORD],
            entry_count: 0,
            word_count: 0,
            load_count: 0,
        }
    }

    /// Copy a staged image in and rescan it
    ///
    /// The scan stops quietly at the first malformed entry, keeping the
    /// counts accumulated so far; validation is expected to have run
    /// before the commit.
    pub fn install_image(&mut self, image: &[u8]) -> bool {
        if image.len() > self.buffer.len() {
            return false;
        }
        self.buffer.fill(0);
        self.buffer[..image.len()].copy_from_slice(image);
        self.rescan();
        true
    }

    /// Recount entries and words after a commit
    pub fn rescan(&mut self) {
        let mut offset = 0usize;
        let mut count: u16 = 0;

        loop {
            let Some(hdr) = read_ats_header(&self.buffer, offset) else {
                break;
            };
            if !hdr.cmd_num.is_valid() {
                break;
            }
            let Ok(pkt) =
                entry::checked_packet(&self.buffer, offset + ATS_HDR_WORDS, APPEND_BUFF_WORDS)
            else {
                break;
            };

            count += 1;
            offset += entry::entry_words(ATS_HDR_WORDS, pkt.len());
        }

        self.entry_count = count;
        self.word_count = offset;
        self.load_count = self.load_count.wrapping_add(1);
    }

    /// The staged bytes
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }
}

impl Default for AppendTable {
    fn default() -> Self {
        Self::new()
    }
}

/// ATP control block
#[derive(Debug, Clone, Copy)]
pub struct AtpControl {
    /// Processor state
    pub state: AtpState,

    /// The executing ATS (NONE when idle)
    pub ats: AtsId,

    /// Command number the processor is positioned on
    pub cmd_num: CommandNum,

    /// Rank within the time index
    pub time_rank: usize,

    /// A ground switch is waiting for the next command boundary
    pub switch_pend: bool,

    /// Keep executing after a checksum failure
    pub continue_on_failure: bool,
}

impl AtpControl {
    pub fn new(continue_on_failure: bool) -> Self {
        Self {
            state: AtpState::Idle,
            ats: AtsId::NONE,
            cmd_num: CommandNum::END,
            time_rank: 0,
            switch_pend: false,
            continue_on_failure,
        }
    }
}

/// RTP control block
#[derive(Debug, Clone, Copy)]
pub struct RtpControl {
    /// Number of RTS currently executing
    pub num_active: u16,

    /// The RTS selected to fire next (NONE when none are due)
    pub next_rts: RtsId,
}

impl RtpControl {
    pub fn new() -> Self {
        Self {
            num_active: 0,
            next_rts: RtsId::NONE,
        }
    }
}

impl Default for RtpControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of the ATP in the next-command-time array
pub const PROC_ATP: usize = 0;

/// Index of the RTP in the next-command-time array
pub const PROC_RTP: usize = 1;

/// Dispatcher bookkeeping shared by both processors
#[derive(Debug, Clone, Copy)]
pub struct DispatchState {
    /// Sequencer view of current absolute time
    pub current_time: AbsTimeTag,

    /// Next command times, indexed by [`PROC_ATP`] and [`PROC_RTP`]
    pub next_cmd_time: [AbsTimeTag; 2],

    /// Which processor the dispatcher services next
    pub next_proc: Option<seqcmd_core::state::Process>,

    /// Commands emitted during the current tick
    pub cmds_this_tick: u16,
}

impl DispatchState {
    pub fn new() -> Self {
        Self {
            current_time: 0,
            next_cmd_time: [MAX_TIME; 2],
            next_proc: None,
            cmds_this_tick: 0,
        }
    }
}

impl Default for DispatchState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::AtsImageBuilder;
    use crate::msg;

    fn two_cmd_slot() -> AtsSlot {
        // Command 1 at t=100 precedes command 2 at t=50 in the buffer
        let image = AtsImageBuilder::new()
            .noop(1, 100, 0x1800)
            .noop(2, 50, 0x1800)
            .finish();
        let mut slot = AtsSlot::new();
        assert!(slot.install_image(&image));
        slot
    }

    #[test]
    fn test_load_two_commands_sorted_by_time() {
        let slot = two_cmd_slot();
        assert_eq!(slot.entry_count(), 2);
        assert_eq!(slot.rank_cmd(0), Some(CommandNum::new(2)));
        assert_eq!(slot.rank_cmd(1), Some(CommandNum::new(1)));
        assert_eq!(slot.status_of(CommandNum::new(1)), CmdStatus::Loaded);
        assert_eq!(slot.status_of(CommandNum::new(2)), CmdStatus::Loaded);
        assert_eq!(slot.offset_of(CommandNum::new(1)).words(), 0);
        assert_eq!(slot.offset_of(CommandNum::new(2)).words(), 4);
    }

    #[test]
    fn test_tie_break_by_command_number() {
        let image = AtsImageBuilder::new()
            .noop(9, 40, 0x1800)
            .noop(3, 40, 0x1800)
            .noop(5, 40, 0x1800)
            .finish();
        let mut slot = AtsSlot::new();
        assert!(slot.install_image(&image));
        let order: Vec<u16> = (0..3).map(|r| slot.rank_cmd(r).unwrap().as_u16()).collect();
        assert_eq!(order, vec![3, 5, 9]);
    }

    #[test]
    fn test_load_wipes_on_duplicate() {
        let image = AtsImageBuilder::new()
            .noop(4, 10, 0x1800)
            .noop(4, 20, 0x1800)
            .finish();
        let mut slot = AtsSlot::new();
        assert!(!slot.install_image(&image));
        assert_eq!(slot.entry_count(), 0);
        assert_eq!(slot.status_of(CommandNum::new(4)), CmdStatus::Empty);
        assert!(slot.offset_of(CommandNum::new(4)).is_invalid());
    }

    #[test]
    fn test_load_wipes_on_invalid_cmd_number() {
        let image = AtsImageBuilder::new().noop(2000, 10, 0x1800).finish();
        let mut slot = AtsSlot::new();
        assert!(!slot.install_image(&image));
        assert_eq!(slot.entry_count(), 0);
        assert_eq!(slot.info.size_words, 0);
    }

    #[test]
    fn test_use_ctr_survives_reload() {
        let mut slot = two_cmd_slot();
        slot.info.use_ctr = 3;
        let image = AtsImageBuilder::new().noop(7, 5, 0x1800).finish();
        assert!(slot.install_image(&image));
        assert_eq!(slot.info.use_ctr, 3);
        assert_eq!(slot.entry_count(), 1);
        // The old commands are gone
        assert_eq!(slot.status_of(CommandNum::new(1)), CmdStatus::Empty);
    }

    #[test]
    fn test_packet_accessor_validates() {
        let slot = two_cmd_slot();
        let pkt = slot.packet_of(CommandNum::new(1)).unwrap();
        assert!(msg::validate_checksum(pkt));
        assert!(slot.packet_of(CommandNum::new(99)).is_err());
    }

    #[test]
    fn test_graft_new_command() {
        let mut slot = two_cmd_slot();
        let before_words = slot.info.size_words;

        let staged = AtsImageBuilder::new().noop(10, 75, 0x1800).finish();
        let words = staged.len() / BYTES_PER_WORD;
        slot.graft(&staged, words, 1);

        assert_eq!(slot.entry_count(), 3);
        assert_eq!(slot.info.size_words, before_words + words);
        assert_eq!(slot.status_of(CommandNum::new(10)), CmdStatus::Loaded);

        // New command sorts between the two existing ones
        let order: Vec<u16> = (0..3).map(|r| slot.rank_cmd(r).unwrap().as_u16()).collect();
        assert_eq!(order, vec![2, 10, 1]);
    }

    #[test]
    fn test_graft_replaces_existing_command() {
        let mut slot = two_cmd_slot();
        let old_offset = slot.offset_of(CommandNum::new(2));

        let staged = AtsImageBuilder::new().noop(2, 200, 0x1800).finish();
        let words = staged.len() / BYTES_PER_WORD;
        slot.graft(&staged, words, 1);

        // Count unchanged, offset re-pointed at the graft
        assert_eq!(slot.entry_count(), 2);
        assert_ne!(slot.offset_of(CommandNum::new(2)), old_offset);
        assert_eq!(slot.entry_time(CommandNum::new(2)), Some(200));

        // Command 2 now sorts last
        let order: Vec<u16> = (0..2).map(|r| slot.rank_cmd(r).unwrap().as_u16()).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn test_rts_install_resets_state() {
        let mut slot = RtsSlot::new();
        slot.info.cmd_ctr = 9;
        slot.info.use_ctr = 2;

        let image = crate::image::RtsImageBuilder::new().noop(1, 0x1800).finish();
        assert!(slot.install_image(&image));
        assert_eq!(slot.info.status, RtsStatus::Loaded);
        assert!(slot.info.disabled);
        assert_eq!(slot.info.cmd_ctr, 0);
        assert_eq!(slot.info.use_ctr, 2);
        assert_eq!(slot.header_at(0).unwrap().wakeup_count, 1);
    }

    #[test]
    fn test_rts_install_rejects_oversize() {
        let mut slot = RtsSlot::new();
        let image = vec![0u8; (RTS_BUFF_WORDS + 1) * BYTES_PER_WORD];
        assert!(!slot.install_image(&image));
    }

    #[test]
    fn test_append_rescan_counts() {
        let mut tbl = AppendTable::new();
        let image = AtsImageBuilder::new()
            .noop(1, 10, 0x1800)
            .noop(2, 20, 0x1800)
            .finish();
        assert!(tbl.install_image(&image));
        assert_eq!(tbl.entry_count, 2);
        assert_eq!(tbl.word_count, image.len() / BYTES_PER_WORD);
        assert_eq!(tbl.load_count, 1);
    }

    #[test]
    fn test_append_rescan_stops_at_bad_entry() {
        let mut tbl = AppendTable::new();
        let image = AtsImageBuilder::new()
            .noop(1, 10, 0x1800)
            .noop(5000, 20, 0x1800)
            .finish();
        assert!(tbl.install_image(&image));
        assert_eq!(tbl.entry_count, 1);
        assert_eq!(tbl.word_count, 4);
    }

    #[test]
    fn test_empty_append_counts_zero() {
        let mut tbl = AppendTable::new();
        assert!(tbl.install_image(&[]));
        assert_eq!(tbl.entry_count, 0);
        assert_eq!(tbl.word_count, 0);
        assert_eq!(tbl.load_count, 1);
    }
}
