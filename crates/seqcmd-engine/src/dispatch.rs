//! Per-tick dispatch loop
//!
//! Each wakeup refreshes the sequencer's view of time, then drains every
//! due command under the per-tick budget, interleaving ATP and RTP by
//! strict priority: the ATP wins ties, and among due RTS the selection
//! rule picks the lowest number. Overload shows up as commands sliding to
//! later ticks, never as drops.

use crate::seq::Sequencer;
use crate::table::{PROC_ATP, PROC_RTP};
use seqcmd_core::state::{AtpState, Process};
use seqcmd_core::time::is_time_after;

impl Sequencer {
    /// Recompute which processor is serviced next
    ///
    /// The RTP only runs when its next command is strictly earlier than
    /// the ATP's; equal times go to the ATP.
    pub(crate) fn update_next_proc(&mut self) {
        self.get_next_rts_time();

        self.disp.next_proc = None;
        if self.atp.state == AtpState::Executing {
            self.disp.next_proc = Some(Process::Atp);
        }
        if self.rtp.next_rts.is_valid()
            && self.disp.next_cmd_time[PROC_RTP] < self.disp.next_cmd_time[PROC_ATP]
        {
            self.disp.next_proc = Some(Process::Rtp);
        }
    }

    /// Service one wakeup tick
    pub fn tick(&mut self) {
        self.disp.current_time = self.clock.now();
        self.disp.cmds_this_tick = 0;

        // An inline switch left the ATP latched; commands begin now
        if self.atp.state == AtpState::Starting {
            self.atp.state = AtpState::Executing;
        }

        loop {
            self.update_next_proc();

            let Some(proc) = self.disp.next_proc else {
                break;
            };
            if self.disp.cmds_this_tick >= self.config.max_cmds_per_tick {
                break;
            }

            let slot = match proc {
                Process::Atp => PROC_ATP,
                Process::Rtp => PROC_RTP,
            };
            if is_time_after(self.disp.next_cmd_time[slot], self.disp.current_time) {
                break;
            }

            match proc {
                Process::Atp => self.process_atp_command(),
                Process::Rtp => self.process_rtp_command(),
            }
            self.disp.cmds_this_tick += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{AtsImageBuilder, RtsImageBuilder};
    use crate::msg;
    use crate::seq::testutil::test_sequencer;
    use seqcmd_core::constants::CMD_MID;
    use seqcmd_core::id::{AtsId, CommandNum, RtsId};
    use seqcmd_core::state::{CmdStatus, RtsStatus};

    fn enable_and_start(seq: &mut Sequencer, id: u16, image: &[u8]) {
        seq.load_rts_image(RtsId::new(id), image).unwrap();
        seq.enable_rts_cmd(RtsId::new(id));
        seq.start_rts_cmd(RtsId::new(id));
    }

    #[test]
    fn test_two_command_ats_executes_in_time_order() {
        let (mut seq, bus, clock) = test_sequencer(0);
        let image = AtsImageBuilder::new()
            .noop(1, 100, 0x1800)
            .noop(2, 50, 0x1800)
            .finish();
        seq.load_ats_image(AtsId::new(1), &image).unwrap();
        seq.start_ats_cmd(AtsId::new(1));

        // Nothing fires before t=50
        clock.set(49);
        seq.tick();
        assert_eq!(bus.command_count(), 0);

        clock.set(50);
        seq.tick();
        assert_eq!(bus.command_count(), 1);
        assert_eq!(
            seq.ats_slot(AtsId::new(1)).unwrap().status_of(CommandNum::new(2)),
            CmdStatus::Executed
        );

        clock.set(100);
        seq.tick();
        assert_eq!(bus.command_count(), 2);
        assert_eq!(
            seq.ats_slot(AtsId::new(1)).unwrap().status_of(CommandNum::new(1)),
            CmdStatus::Executed
        );

        // Sequence complete, processor idle
        assert_eq!(seq.atp().state, AtpState::Idle);
        assert_eq!(seq.ats_slot(AtsId::new(1)).unwrap().info.use_ctr, 1);
    }

    #[test]
    fn test_jump_forward_skips_then_executes() {
        let (mut seq, bus, clock) = test_sequencer(0);
        let image = AtsImageBuilder::new()
            .noop(1, 100, 0x1800)
            .noop(2, 50, 0x1800)
            .finish();
        seq.load_ats_image(AtsId::new(1), &image).unwrap();
        seq.start_ats_cmd(AtsId::new(1));

        clock.set(10);
        seq.tick();
        seq.jump_ats_cmd(80);

        let slot = seq.ats_slot(AtsId::new(1)).unwrap();
        assert_eq!(slot.status_of(CommandNum::new(2)), CmdStatus::Skipped);
        assert_eq!(slot.status_of(CommandNum::new(1)), CmdStatus::Loaded);

        clock.set(100);
        seq.tick();
        assert_eq!(bus.command_count(), 1);
        assert_eq!(
            seq.ats_slot(AtsId::new(1)).unwrap().status_of(CommandNum::new(1)),
            CmdStatus::Executed
        );
    }

    #[test]
    fn test_rts_tie_lowest_id_fires_first() {
        let (mut seq, bus, clock) = test_sequencer(995);
        let rts3 = RtsImageBuilder::new().noop(5, 0x1803).finish();
        let rts7 = RtsImageBuilder::new().noop(5, 0x1807).finish();
        enable_and_start(&mut seq, 7, &rts7);
        enable_and_start(&mut seq, 3, &rts3);

        clock.set(1000);
        seq.tick();

        // Both single-command sequences fired within the tick, lowest
        // number first
        assert_eq!(seq.counters().rts_cmd_ctr, 2);
        let first = bus.pop_command().unwrap();
        let second = bus.pop_command().unwrap();
        assert_eq!(msg::msg_id(&first), 0x1803);
        assert_eq!(msg::msg_id(&second), 0x1807);
        assert_eq!(
            seq.rts_slot(RtsId::new(3)).unwrap().info.status,
            RtsStatus::Loaded
        );
        assert_eq!(
            seq.rts_slot(RtsId::new(7)).unwrap().info.status,
            RtsStatus::Loaded
        );
    }

    #[test]
    fn test_per_tick_budget_drains_across_ticks() {
        let (mut seq, bus, clock) = test_sequencer(0);
        let image = RtsImageBuilder::new().noop(1, 0x1800).finish();
        for id in 1..=20u16 {
            enable_and_start(&mut seq, id, &image);
        }

        clock.set(1);
        seq.tick();
        assert_eq!(bus.command_count(), 8);
        assert_eq!(seq.dispatch_state().cmds_this_tick, 8);

        clock.set(2);
        seq.tick();
        assert_eq!(bus.command_count(), 16);

        clock.set(3);
        seq.tick();
        assert_eq!(bus.command_count(), 20);
        assert_eq!(seq.rtp().num_active, 0);
    }

    #[test]
    fn test_atp_beats_rtp_on_equal_times() {
        let (mut seq, bus, clock) = test_sequencer(0);
        let ats = AtsImageBuilder::new().entry(
            1,
            10,
            &msg::build_command(0x1810, 0, 0, &[]),
        );
        seq.load_ats_image(AtsId::new(1), &ats.finish()).unwrap();
        seq.start_ats_cmd(AtsId::new(1));

        let rts = RtsImageBuilder::new()
            .entry(10, &msg::build_command(0x1820, 0, 0, &[]))
            .finish();
        enable_and_start(&mut seq, 1, &rts);

        clock.set(10);
        seq.tick();

        // Both were due at t=10; the ATS command went out first
        let first = bus.pop_command().unwrap();
        let second = bus.pop_command().unwrap();
        assert_eq!(msg::msg_id(&first), 0x1810);
        assert_eq!(msg::msg_id(&second), 0x1820);
    }

    #[test]
    fn test_deferred_switch_services_at_command_boundary() {
        let (mut seq, bus, clock) = test_sequencer(0);
        let ats_a = AtsImageBuilder::new()
            .noop(1, 60, 0x1810)
            .noop(2, 100, 0x1810)
            .finish();
        let ats_b = AtsImageBuilder::new()
            .noop(1, 55, 0x1820)
            .noop(2, 70, 0x1820)
            .finish();
        seq.load_ats_image(AtsId::new(1), &ats_a).unwrap();
        seq.load_ats_image(AtsId::new(2), &ats_b).unwrap();
        seq.start_ats_cmd(AtsId::new(1));

        clock.set(50);
        seq.tick();
        seq.switch_ats_cmd();
        assert!(seq.atp().switch_pend);

        // Ticks before the boundary leave the switch pending
        clock.set(55);
        seq.tick();
        assert!(seq.atp().switch_pend);
        assert_eq!(bus.command_count(), 0);

        // At t=60 the ATS A command fires, then the handoff happens in
        // the same tick
        clock.set(60);
        seq.tick();
        assert_eq!(bus.command_count(), 1);
        assert!(!seq.atp().switch_pend);
        assert_eq!(seq.atp().ats, AtsId::new(2));
        assert_eq!(seq.atp().state, AtpState::Executing);

        // ATS B entries at or before t=60 were skipped by the +1 offset
        assert_eq!(
            seq.ats_slot(AtsId::new(2)).unwrap().status_of(CommandNum::new(1)),
            CmdStatus::Skipped
        );

        clock.set(70);
        seq.tick();
        assert_eq!(bus.command_count(), 2);
        assert_eq!(
            seq.ats_slot(AtsId::new(2)).unwrap().status_of(CommandNum::new(2)),
            CmdStatus::Executed
        );
    }

    #[test]
    fn test_inline_switch_latches_starting_state() {
        let (mut seq, bus, clock) = test_sequencer(0);
        // ATS A's only command is a switch request addressed to the
        // sequencer itself
        let switch_pkt = msg::build_command(CMD_MID, 0, 8, &[]);
        let ats_a = AtsImageBuilder::new().entry(1, 20, &switch_pkt).finish();
        let ats_b = AtsImageBuilder::new().noop(1, 30, 0x1820).finish();
        seq.load_ats_image(AtsId::new(1), &ats_a).unwrap();
        seq.load_ats_image(AtsId::new(2), &ats_b).unwrap();
        seq.start_ats_cmd(AtsId::new(1));

        clock.set(20);
        seq.tick();

        // The switch entry was consumed, not transmitted, and the new
        // ATS sits in the STARTING latch until the next wakeup
        assert_eq!(bus.command_count(), 0);
        assert_eq!(
            seq.ats_slot(AtsId::new(1)).unwrap().status_of(CommandNum::new(1)),
            CmdStatus::Executed
        );
        assert_eq!(seq.atp().ats, AtsId::new(2));
        assert_eq!(seq.atp().state, AtpState::Starting);

        clock.set(30);
        seq.tick();
        assert_eq!(seq.atp().state, AtpState::Executing);
        assert_eq!(bus.command_count(), 1);
    }

    #[test]
    fn test_checksum_failure_kills_ats_unless_continue() {
        let (mut seq, bus, clock) = test_sequencer(0);

        let mut bad = msg::build_command(0x1810, 0, 0, &[]);
        bad[7] ^= 0xFF; // break the checksum
        let image = AtsImageBuilder::new()
            .entry(1, 10, &bad)
            .noop(2, 20, 0x1810)
            .finish();
        seq.load_ats_image(AtsId::new(1), &image).unwrap();
        seq.continue_on_failure_cmd(0);
        seq.start_ats_cmd(AtsId::new(1));

        clock.set(10);
        seq.tick();
        assert_eq!(bus.command_count(), 0);
        assert_eq!(
            seq.ats_slot(AtsId::new(1)).unwrap().status_of(CommandNum::new(1)),
            CmdStatus::FailedChecksum
        );
        assert_eq!(seq.atp().state, AtpState::Idle);
        assert_eq!(seq.counters().ats_cmd_err_ctr, 1);
        assert_eq!(seq.counters().last_ats_err_cmd, 1);
    }

    #[test]
    fn test_checksum_failure_continues_when_flagged() {
        let (mut seq, bus, clock) = test_sequencer(0);

        let mut bad = msg::build_command(0x1810, 0, 0, &[]);
        bad[7] ^= 0xFF;
        let image = AtsImageBuilder::new()
            .entry(1, 10, &bad)
            .noop(2, 20, 0x1810)
            .finish();
        seq.load_ats_image(AtsId::new(1), &image).unwrap();
        seq.continue_on_failure_cmd(1);
        seq.start_ats_cmd(AtsId::new(1));

        clock.set(20);
        seq.tick();
        assert_eq!(
            seq.ats_slot(AtsId::new(1)).unwrap().status_of(CommandNum::new(1)),
            CmdStatus::FailedChecksum
        );
        assert_eq!(
            seq.ats_slot(AtsId::new(1)).unwrap().status_of(CommandNum::new(2)),
            CmdStatus::Executed
        );
        assert_eq!(bus.command_count(), 1);
    }

    #[test]
    fn test_bus_failure_marks_distrib_and_continues() {
        let (mut seq, bus, clock) = test_sequencer(0);
        let image = AtsImageBuilder::new()
            .noop(1, 10, 0x1810)
            .noop(2, 20, 0x1810)
            .finish();
        seq.load_ats_image(AtsId::new(1), &image).unwrap();
        seq.start_ats_cmd(AtsId::new(1));

        bus.inject_transmit_failures(1);
        clock.set(20);
        seq.tick();

        let slot = seq.ats_slot(AtsId::new(1)).unwrap();
        assert_eq!(slot.status_of(CommandNum::new(1)), CmdStatus::FailedDistrib);
        assert_eq!(slot.status_of(CommandNum::new(2)), CmdStatus::Executed);
        assert_eq!(seq.counters().ats_cmd_err_ctr, 1);
        assert_eq!(seq.counters().ats_cmd_ctr, 1);
        assert_eq!(bus.command_count(), 1);
    }

    #[test]
    fn test_rts_checksum_failure_aborts_rts() {
        let (mut seq, bus, clock) = test_sequencer(0);
        let mut bad = msg::build_command(0x1820, 0, 0, &[]);
        bad[6] ^= 0x01;
        let image = RtsImageBuilder::new().entry(1, &bad).finish();
        enable_and_start(&mut seq, 4, &image);

        clock.set(1);
        seq.tick();
        assert_eq!(bus.command_count(), 0);
        assert_eq!(
            seq.rts_slot(RtsId::new(4)).unwrap().info.status,
            RtsStatus::Loaded
        );
        assert_eq!(seq.counters().rts_cmd_err_ctr, 1);
        assert_eq!(seq.counters().last_rts_err_seq, 4);
    }

    #[test]
    fn test_rts_multi_command_spacing() {
        let (mut seq, bus, clock) = test_sequencer(0);
        let image = RtsImageBuilder::new()
            .noop(2, 0x1820)
            .noop(3, 0x1821)
            .finish();
        enable_and_start(&mut seq, 1, &image);

        clock.set(2);
        seq.tick();
        assert_eq!(bus.command_count(), 1);
        // Next command due three ticks after this dispatch
        assert_eq!(seq.rts_slot(RtsId::new(1)).unwrap().info.next_cmd_time, 5);

        clock.set(4);
        seq.tick();
        assert_eq!(bus.command_count(), 1);

        clock.set(5);
        seq.tick();
        assert_eq!(bus.command_count(), 2);
        // Sequence exhausted: graceful completion
        assert_eq!(
            seq.rts_slot(RtsId::new(1)).unwrap().info.status,
            RtsStatus::Loaded
        );
    }

    #[test]
    fn test_wakeup_latches_starting_state() {
        let (mut seq, _bus, _clock) = test_sequencer(0);
        seq.atp.state = AtpState::Starting;
        seq.tick();
        assert_eq!(seq.atp().state, AtpState::Executing);
    }
}
