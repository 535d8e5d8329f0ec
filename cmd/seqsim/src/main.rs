//! Sequencer simulation example
//!
//! Builds a small ATS and two RTS tables, wires the sequencer to a queue
//! bus and a simulated clock, then drives wakeup ticks and prints every
//! packet that comes out the other side.

use seqcmd::{
    constants, function_code, msg_id, pipe, AtsId, AtsImageBuilder, NullTableHost, PipeMessage,
    QueueBus, ResetType, RtsId, RtsImageBuilder, Sequencer, SequencerConfig, SimClock,
};
use std::thread;
use std::time::Duration;

fn main() {
    println!("=== seqcmd Sequencer Simulation ===\n");
    seqcmd::init_logging();

    let bus = QueueBus::new(64);
    let clock = SimClock::new(0);

    let config = SequencerConfig::default().auto_start_power_on(1);
    let mut seq = Sequencer::new(
        config,
        Box::new(bus.clone()),
        Box::new(bus.clone()),
        Box::new(clock.clone()),
        Box::new(NullTableHost),
    );

    // ATS A: three commands, loaded out of time order on purpose
    let ats = AtsImageBuilder::new()
        .noop(1, 6, 0x1810)
        .noop(2, 2, 0x1811)
        .noop(3, 4, 0x1812)
        .finish();
    seq.load_ats_image(AtsId::new(1), &ats)
        .expect("ATS A image rejected");

    // RTS 1 is the auto-start target: two commands one tick apart
    let rts1 = RtsImageBuilder::new().noop(1, 0x1821).noop(1, 0x1822).finish();
    seq.load_rts_image(RtsId::new(1), &rts1)
        .expect("RTS 001 image rejected");

    // RTS 2 started by hand below
    let rts2 = RtsImageBuilder::new().noop(3, 0x1823).finish();
    seq.load_rts_image(RtsId::new(2), &rts2)
        .expect("RTS 002 image rejected");

    seq.startup(ResetType::PowerOn);
    seq.enable_rts_cmd(RtsId::new(2));
    seq.start_rts_cmd(RtsId::new(2));
    seq.start_ats_cmd(AtsId::new(1));

    // Hand the sequencer its input pipe and run it on its own thread
    let (tx, rx) = pipe(constants::PIPE_DEPTH);
    let worker = thread::spawn(move || {
        seq.run(&rx);
        seq
    });

    for t in 1..=8u32 {
        clock.set(t);
        tx.try_send(PipeMessage::Wakeup).expect("pipe full");
        thread::sleep(Duration::from_millis(20));

        while let Some(cmd) = bus.pop_command() {
            println!(
                "t={:2}  sent MID {:#06x} FC {} ({} bytes)",
                t,
                msg_id(&cmd),
                function_code(&cmd),
                cmd.len()
            );
        }
    }

    tx.try_send(PipeMessage::SendHk).expect("pipe full");
    drop(tx);
    let seq = worker.join().expect("sequencer thread panicked");

    while let Some(pkt) = bus.pop_command() {
        println!("telemetry MID {:#06x} ({} bytes)", msg_id(&pkt), pkt.len());
    }

    println!("\n--- events ---");
    while let Some(ev) = bus.pop_event() {
        println!("[{:?}] {:?}: {}", ev.ty, ev.id, ev.text);
    }

    let c = seq.counters();
    println!(
        "\ncounters: cmd={} err={} ats_cmds={} rts_cmds={}",
        c.cmd_ctr, c.cmd_err_ctr, c.ats_cmd_ctr, c.rts_cmd_ctr
    );
}
