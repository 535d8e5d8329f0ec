//! # seqcmd-engine
//!
//! The stored-command sequencer: autonomously issues pre-loaded command
//! packets onto an in-process bus at scheduled times.
//!
//! Two table families are supported. An ATS (absolute time sequence) is a
//! pool of commands tagged with absolute execution times, driven by the
//! single ATP. An RTS (relative time sequence) is a short list of commands
//! separated by wakeup-tick deltas; many RTS run concurrently under the
//! logical RTP.
//!
//! ## Modules
//!
//! - `msg` - embedded command packet codec (header, length, checksum)
//! - `entry` - ATS/RTS entry headers and the checked packet accessor
//! - `image` - table image builders for tools and tests
//! - `validate` - whole-table validators (fail closed)
//! - `table` - buffers, derived index maps, control blocks, loaders
//! - `append` - the Append grafting operation
//! - `atp` - absolute time processor state machine
//! - `rtp` - relative time processor and RTS selection
//! - `dispatch` - the per-tick dispatch loop
//! - `cmds` - ground command decoding and handlers
//! - `hk` - housekeeping telemetry packet
//! - `events` - event identifiers
//! - `host` - host interface traits and queue-backed implementations
//! - `config` - sequencer configuration
//! - `seq` - the `Sequencer` aggregate and its input-pipe run loop

pub mod append;
pub mod atp;
pub mod cmds;
pub mod config;
pub mod dispatch;
pub mod entry;
pub mod events;
pub mod hk;
pub mod host;
pub mod image;
pub mod msg;
pub mod rtp;
pub mod seq;
pub mod table;
pub mod validate;

// Re-exports for convenience
pub use config::SequencerConfig;
pub use events::{EventId, EventType};
pub use hk::HkPacket;
pub use host::{CommandBus, EventSink, QueueBus, SimClock, StagedLoad, TableHost, TableId, TimeSource};
pub use image::{AtsImageBuilder, RtsImageBuilder};
pub use seq::{PipeMessage, ResetType, Sequencer};
pub use validate::{parse_rts, verify_ats_table, TableStats};
