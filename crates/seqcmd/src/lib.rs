//! # seqcmd - Stored Command Sequencer
//!
//! Autonomously issues pre-loaded command packets onto an in-process bus
//! at scheduled times, with no ground interaction.
//!
//! ## Features
//!
//! - **ATS**: absolute time sequences, one executing at a time, with
//!   deferred and inline switching, time jumps, and in-flight appends
//! - **RTS**: up to 64 concurrent relative time sequences with strict
//!   lowest-number tie priority
//! - **Budgeted dispatch**: at most a configured number of commands per
//!   wakeup tick; overload delays commands, never drops them
//! - **Fail-closed table validation**: one bad entry rejects a load
//! - **Housekeeping**: fixed-layout telemetry with RTS status bitmaps
//!
//! ## Quick Start
//!
//! ```ignore
//! use seqcmd::{
//!     pipe, AtsImageBuilder, PipeMessage, QueueBus, Sequencer,
//!     SequencerConfig, SimClock, AtsId, NullTableHost,
//! };
//!
//! fn main() {
//!     let bus = QueueBus::new(64);
//!     let clock = SimClock::new(0);
//!     let mut seq = Sequencer::new(
//!         SequencerConfig::default(),
//!         Box::new(bus.clone()),
//!         Box::new(bus.clone()),
//!         Box::new(clock.clone()),
//!         Box::new(NullTableHost),
//!     );
//!
//!     // Load a two-command sequence and start it
//!     let image = AtsImageBuilder::new()
//!         .noop(1, 100, 0x1800)
//!         .noop(2, 50, 0x1800)
//!         .finish();
//!     seq.load_ats_image(AtsId::new(1), &image).unwrap();
//!     seq.start_ats_cmd(AtsId::new(1));
//!
//!     // Drive wakeup ticks; commands come out of the bus queue in
//!     // time order
//!     let (tx, rx) = pipe(12);
//!     clock.set(50);
//!     tx.try_send(PipeMessage::Wakeup).unwrap();
//!     drop(tx);
//!     seq.run(&rx);
//!
//!     assert!(bus.pop_command().is_some());
//! }
//! ```

// Re-export core types
pub use seqcmd_core::{
    constants, AbsTimeTag, AtpState, AtsId, BusError, CmdStatus, CommandNum, EntryOffset, Process,
    RtsId, RtsStatus, RtsStatusBits, SeqError, SeqResult, TableError, MAX_TIME,
};

// Re-export the input pipe
pub use seqcmd_core::{pipe, PipeReceiver, PipeSender, RecvTimeoutError, TrySendError};

// Re-export kprint macros for debug logging
pub use seqcmd_core::kprint::{init as init_logging, set_log_level, LogLevel};
pub use seqcmd_core::{kdebug, kerror, kinfo, kprint, kprintln, ktrace, kwarn};

// Re-export env utilities
pub use seqcmd_core::env::{env_flag, env_parse};

// Re-export the engine
pub use seqcmd_engine::host::{
    EventRecord, NullTableHost, StagedTableHost, SystemClock,
};
pub use seqcmd_engine::{
    parse_rts, verify_ats_table, AtsImageBuilder, CommandBus, EventId, EventSink, EventType,
    HkPacket, PipeMessage, QueueBus, ResetType, RtsImageBuilder, Sequencer, SequencerConfig,
    SimClock, StagedLoad, TableHost, TableId, TableStats, TimeSource,
};
pub use seqcmd_engine::msg::{build_command, function_code, msg_id, validate_checksum};
pub use seqcmd_engine::seq::Counters;
pub use seqcmd_engine::table::{AtpControl, AtsInfo, DispatchState, RtpControl, RtsInfo};
