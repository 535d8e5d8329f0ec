//! Table image builders
//!
//! Build on-disk/in-memory table images in the packed wire layout. Used by
//! the command-line tools and the test suites; the flight path only ever
//! reads images, it never authors them.

use crate::entry::{write_ats_header, write_rts_header, AtsEntryHeader, RtsEntryHeader};
use crate::msg;
use seqcmd_core::constants::{ATS_HDR_WORDS, BYTES_PER_WORD, RTS_HDR_WORDS};
use seqcmd_core::id::CommandNum;
use seqcmd_core::time::AbsTimeTag;

/// Incrementally builds an ATS table image
///
/// Entries are appended in call order; the time-sorting happens at load,
/// not here. `finish` returns the packed bytes without a terminator word;
/// loading into a zero-filled buffer provides the terminator.
pub struct AtsImageBuilder {
    bytes: Vec<u8>,
}

impl AtsImageBuilder {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Append an entry holding an arbitrary packet
    pub fn entry(mut self, cmd_num: u16, time_tag: AbsTimeTag, packet: &[u8]) -> Self {
        let word_off = self.bytes.len() / BYTES_PER_WORD;
        let entry_bytes = (ATS_HDR_WORDS * BYTES_PER_WORD) + padded(packet.len());
        self.bytes.resize(self.bytes.len() + entry_bytes, 0);
        write_ats_header(
            &mut self.bytes,
            word_off,
            AtsEntryHeader {
                cmd_num: CommandNum::new(cmd_num),
                time_tag,
            },
        );
        let base = (word_off + ATS_HDR_WORDS) * BYTES_PER_WORD;
        self.bytes[base..base + packet.len()].copy_from_slice(packet);
        self
    }

    /// Append an entry holding a no-op command addressed to `mid`
    pub fn noop(self, cmd_num: u16, time_tag: AbsTimeTag, mid: u16) -> Self {
        let pkt = msg::build_command(mid, 0, 0, &[]);
        self.entry(cmd_num, time_tag, &pkt)
    }

    /// The packed image bytes
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

impl Default for AtsImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Incrementally builds an RTS table image
pub struct RtsImageBuilder {
    bytes: Vec<u8>,
}

impl RtsImageBuilder {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Append an entry firing `wakeup_count` ticks after the previous one
    pub fn entry(mut self, wakeup_count: u32, packet: &[u8]) -> Self {
        let word_off = self.bytes.len() / BYTES_PER_WORD;
        let entry_bytes = (RTS_HDR_WORDS * BYTES_PER_WORD) + padded(packet.len());
        self.bytes.resize(self.bytes.len() + entry_bytes, 0);
        write_rts_header(&mut self.bytes, word_off, RtsEntryHeader { wakeup_count });
        let base = (word_off + RTS_HDR_WORDS) * BYTES_PER_WORD;
        self.bytes[base..base + packet.len()].copy_from_slice(packet);
        self
    }

    /// Append a no-op command entry
    pub fn noop(self, wakeup_count: u32, mid: u16) -> Self {
        let pkt = msg::build_command(mid, 0, 0, &[]);
        self.entry(wakeup_count, &pkt)
    }

    /// The packed image bytes
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

impl Default for RtsImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn padded(bytes: usize) -> usize {
    (bytes + BYTES_PER_WORD - 1) / BYTES_PER_WORD * BYTES_PER_WORD
}
