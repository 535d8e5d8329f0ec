//! # seqcmd-core
//!
//! Core types for the seqcmd stored-command sequencer.
//!
//! This crate is host-agnostic and contains no bus- or table-service
//! specific code. The sequencer engine lives in `seqcmd-engine`.
//!
//! ## Modules
//!
//! - `id` - ATS / RTS / command-number identifier types
//! - `state` - processor and command status enums
//! - `time` - absolute time tags and comparisons
//! - `bitmap` - fixed 16-bit-word RTS status bitmaps (telemetry format)
//! - `pipe` - bounded input pipe with receive timeout
//! - `error` - error types
//! - `kprint` - kernel-style debug printing macros
//! - `env` - environment variable utilities

#![allow(dead_code)]

pub mod bitmap;
pub mod env;
pub mod error;
pub mod id;
pub mod kprint;
pub mod pipe;
pub mod state;
pub mod time;

// Re-exports for convenience
pub use bitmap::RtsStatusBits;
pub use error::{BusError, SeqError, SeqResult, TableError};
pub use id::{AtsId, CommandNum, EntryOffset, RtsId};
pub use pipe::{pipe, PipeReceiver, PipeSender, RecvTimeoutError, TrySendError};
pub use state::{AtpState, CmdStatus, Process, RtsStatus};
pub use time::{AbsTimeTag, MAX_TIME};

/// Compile-time sequencer limits
///
/// These mirror the platform configuration of the flight build and size
/// every fixed table in the engine.
pub mod constants {
    /// Number of ATS tables (A and B)
    pub const NUM_ATS: usize = 2;

    /// Number of RTS tables
    pub const NUM_RTS: usize = 64;

    /// Maximum command number within one ATS
    pub const MAX_ATS_CMDS: usize = 1000;

    /// ATS buffer capacity in 32-bit words
    pub const ATS_BUFF_WORDS: usize = 4000;

    /// RTS buffer capacity in 32-bit words
    pub const RTS_BUFF_WORDS: usize = 75;

    /// Append staging buffer capacity in 32-bit words
    pub const APPEND_BUFF_WORDS: usize = ATS_BUFF_WORDS / 2;

    /// Per-tick command emission budget
    pub const MAX_CMDS_PER_SEC: u16 = 8;

    /// RTS numbers at or below this emit start/complete events
    pub const LAST_RTS_WITH_EVENTS: u16 = 20;

    /// Smallest embedded command packet, in bytes
    pub const PACKET_MIN_SIZE: usize = 8;

    /// Largest embedded command packet, in bytes
    pub const PACKET_MAX_SIZE: usize = 256;

    /// Input pipe receive timeout in milliseconds
    pub const SB_TIMEOUT_MS: u64 = 1000;

    /// Input pipe depth
    pub const PIPE_DEPTH: usize = 12;

    /// Bytes per buffer word
    pub const BYTES_PER_WORD: usize = 4;

    /// ATS entry header size in words (pad + command number + time tag)
    pub const ATS_HDR_WORDS: usize = 2;

    /// RTS entry header size in words (wakeup-count delta)
    pub const RTS_HDR_WORDS: usize = 1;

    /// Message id of the sequencer's own command pipe
    pub const CMD_MID: u16 = 0x18A9;

    /// Message id requesting a housekeeping emission
    pub const SEND_HK_MID: u16 = 0x18AA;

    /// Message id of the periodic wakeup
    pub const WAKEUP_MID: u16 = 0x18AB;

    /// Command number stored in cleared ATS index slots
    pub const INVALID_CMD_NUMBER: u16 = 0xFFFF;

    /// Number of RTS status bits packed into one telemetry word
    pub const RTS_BITS_PER_WORD: usize = 16;

    /// Telemetry words in each RTS status bitmap
    pub const RTS_BITMAP_WORDS: usize = (NUM_RTS + RTS_BITS_PER_WORD - 1) / RTS_BITS_PER_WORD;

    /// Power-up value of the continue-on-checksum-failure flag
    pub const CONT_ON_FAILURE_START: bool = true;
}
