//! The Append grafting operation
//!
//! Append is a patch operator: entries staged in the Append table are
//! copied onto the end of a target ATS that already has content, the
//! derived maps absorb them, and the time index is re-sorted. An ATS can
//! be appended to while it executes; the processor is then re-positioned
//! so the combined table keeps running from the current time.

use crate::events::{EventId, EventType};
use crate::seq::Sequencer;
use seqcmd_core::constants::ATS_BUFF_WORDS;
use seqcmd_core::id::AtsId;
use seqcmd_core::state::AtpState;

impl Sequencer {
    /// Graft the staged Append entries onto the selected ATS
    pub fn append_ats_cmd(&mut self, id: AtsId) {
        let Some(index) = id.to_index() else {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::AppendInvalidId,
                EventType::Error,
                &format!("Append ATS error: invalid ATS ID = {}", id.as_u16()),
            );
            return;
        };

        if self.ats[index].entry_count() == 0 {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::AppendTargetEmpty,
                EventType::Error,
                &format!("Append ATS {} error: ATS table is empty", id.letter()),
            );
        } else if self.append.entry_count == 0 {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::AppendSourceEmpty,
                EventType::Error,
                &format!("Append ATS {} error: Append table is empty", id.letter()),
            );
        } else if self.ats[index].info.size_words + self.append.word_count > ATS_BUFF_WORDS {
            self.counters.cmd_err_ctr = self.counters.cmd_err_ctr.wrapping_add(1);
            self.send_event(
                EventId::AppendTooLarge,
                EventType::Error,
                &format!(
                    "Append ATS {} error: ATS size = {}, Append size = {}, ATS buffer = {}",
                    id.letter(),
                    self.ats[index].info.size_words,
                    self.append.word_count,
                    ATS_BUFF_WORDS
                ),
            );
        } else {
            self.counters.append_cmd_arg = id.as_u16();
            self.process_append(index);
            self.counters.cmd_ctr = self.counters.cmd_ctr.wrapping_add(1);
            self.send_event(
                EventId::AppendInfo,
                EventType::Info,
                &format!(
                    "Append ATS {} command: {} ATS entries appended",
                    id.letter(),
                    self.append.entry_count
                ),
            );
        }
    }

    /// Copy the staged entries in and re-position a running ATP
    pub(crate) fn process_append(&mut self, index: usize) {
        let word_count = self.append.word_count;
        let entry_count = self.append.entry_count;
        self.ats[index].graft(self.append.bytes(), word_count, entry_count);

        // If this ATS is mid-execution, re-walk the combined time index
        // from the current time so the rank pointer matches the new sort.
        // Entries grafted behind the current time are skipped outright.
        if self.atp.state == AtpState::Executing
            && self.atp.ats.to_index() == Some(index)
            && !self.begin_ats(index, 0)
        {
            // Everything left was behind us; begin_ats stopped the ATS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::AtsImageBuilder;
    use crate::seq::testutil::test_sequencer;
    use seqcmd_core::id::CommandNum;
    use seqcmd_core::state::CmdStatus;

    fn base_image() -> Vec<u8> {
        AtsImageBuilder::new()
            .noop(1, 100, 0x1800)
            .noop(2, 50, 0x1800)
            .finish()
    }

    #[test]
    fn test_append_to_idle_ats() {
        let (mut seq, _bus, _clock) = test_sequencer(0);
        seq.load_ats_image(AtsId::new(1), &base_image()).unwrap();

        let staged = AtsImageBuilder::new().noop(3, 75, 0x1800).finish();
        seq.load_append_image(&staged).unwrap();
        seq.append_ats_cmd(AtsId::new(1));

        let slot = seq.ats_slot(AtsId::new(1)).unwrap();
        assert_eq!(slot.entry_count(), 3);
        assert_eq!(slot.status_of(CommandNum::new(3)), CmdStatus::Loaded);
        assert_eq!(seq.counters().append_cmd_arg, 1);
        assert_eq!(seq.counters().cmd_ctr, 1);

        // New command slots into time order
        let order: Vec<u16> = (0..3).map(|r| slot.rank_cmd(r).unwrap().as_u16()).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_append_target_empty_rejected() {
        let (mut seq, _bus, _clock) = test_sequencer(0);
        let staged = AtsImageBuilder::new().noop(3, 75, 0x1800).finish();
        seq.load_append_image(&staged).unwrap();

        seq.append_ats_cmd(AtsId::new(1));
        assert_eq!(seq.counters().cmd_err_ctr, 1);
        assert_eq!(seq.ats_slot(AtsId::new(1)).unwrap().entry_count(), 0);
    }

    #[test]
    fn test_append_source_empty_rejected() {
        let (mut seq, _bus, _clock) = test_sequencer(0);
        seq.load_ats_image(AtsId::new(1), &base_image()).unwrap();

        seq.append_ats_cmd(AtsId::new(1));
        assert_eq!(seq.counters().cmd_err_ctr, 1);

        // Derived maps untouched by the failed append
        let slot = seq.ats_slot(AtsId::new(1)).unwrap();
        assert_eq!(slot.entry_count(), 2);
        assert_eq!(slot.rank_cmd(0), Some(CommandNum::new(2)));
        assert_eq!(slot.rank_cmd(1), Some(CommandNum::new(1)));
    }

    #[test]
    fn test_append_invalid_id_rejected() {
        let (mut seq, _bus, _clock) = test_sequencer(0);
        seq.append_ats_cmd(AtsId::new(0));
        seq.append_ats_cmd(AtsId::new(5));
        assert_eq!(seq.counters().cmd_err_ctr, 2);
    }

    #[test]
    fn test_append_while_executing_repositions_atp() {
        let (mut seq, _bus, clock) = test_sequencer(0);
        seq.load_ats_image(AtsId::new(1), &base_image()).unwrap();
        seq.start_ats_cmd(AtsId::new(1));

        // Run past command 2 (t=50)
        clock.set(50);
        seq.tick();
        assert_eq!(seq.atp().cmd_num, CommandNum::new(1));

        // Graft a command earlier than now and one later than now
        clock.set(51);
        let staged = AtsImageBuilder::new()
            .noop(5, 10, 0x1800)
            .noop(6, 80, 0x1800)
            .finish();
        seq.load_append_image(&staged).unwrap();
        seq.append_ats_cmd(AtsId::new(1));

        let slot = seq.ats_slot(AtsId::new(1)).unwrap();
        assert_eq!(slot.entry_count(), 4);
        // The re-walk skipped the stale graft and re-pointed the ATP at
        // the next future command
        assert_eq!(slot.status_of(CommandNum::new(5)), CmdStatus::Skipped);
        assert_eq!(seq.atp().cmd_num, CommandNum::new(6));
        assert_eq!(seq.atp().state, AtpState::Executing);

        // Commands still ahead of the graft keep their place
        assert_eq!(slot.status_of(CommandNum::new(1)), CmdStatus::Loaded);
    }

    #[test]
    fn test_append_oversize_rejected() {
        let (mut seq, _bus, _clock) = test_sequencer(0);

        // Fill most of the ATS with large commands
        let big_pkt = crate::msg::build_command(0x1800, 0, 0, &[0u8; 248]);
        let mut builder = AtsImageBuilder::new();
        for i in 0..60u16 {
            builder = builder.entry(i + 1, 10 + i as u32, &big_pkt);
        }
        seq.load_ats_image(AtsId::new(1), &builder.finish()).unwrap();

        let mut staged = AtsImageBuilder::new();
        for i in 0..8u16 {
            staged = staged.entry(100 + i, 500 + i as u32, &big_pkt);
        }
        seq.load_append_image(&staged.finish()).unwrap();

        seq.append_ats_cmd(AtsId::new(1));
        assert_eq!(seq.counters().cmd_err_ctr, 1);
        assert_eq!(seq.ats_slot(AtsId::new(1)).unwrap().entry_count(), 60);
    }
}
