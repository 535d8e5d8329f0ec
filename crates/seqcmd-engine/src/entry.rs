//! Table entry headers
//!
//! ATS and RTS entries live in 32-bit-word-aligned buffers. An ATS entry
//! is a two-word header (pad, command number, absolute time tag) followed
//! by the embedded packet; an RTS entry is a one-word header (wakeup-count
//! delta) followed by the packet. The packet size always comes from the
//! packet's own length field, never from table metadata, so every read
//! goes through the checked accessor at the bottom of this module.

use crate::msg;
use seqcmd_core::constants::{ATS_HDR_WORDS, BYTES_PER_WORD, RTS_HDR_WORDS};
use seqcmd_core::error::TableError;
use seqcmd_core::id::CommandNum;
use seqcmd_core::time::AbsTimeTag;

/// Decoded ATS entry header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtsEntryHeader {
    /// Command identifier within the ATS
    pub cmd_num: CommandNum,

    /// Absolute execution time
    pub time_tag: AbsTimeTag,
}

/// Decoded RTS entry header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtsEntryHeader {
    /// Ticks after the previous entry's dispatch (or RTS start)
    pub wakeup_count: u32,
}

/// Read an ATS entry header at the given word offset
///
/// Returns `None` if the two header words do not fit in the buffer.
pub fn read_ats_header(buf: &[u8], word_off: usize) -> Option<AtsEntryHeader> {
    let base = word_off.checked_mul(BYTES_PER_WORD)?;
    let end = base.checked_add(ATS_HDR_WORDS * BYTES_PER_WORD)?;
    if end > buf.len() {
        return None;
    }
    Some(AtsEntryHeader {
        cmd_num: CommandNum::new(u16::from_be_bytes([buf[base + 2], buf[base + 3]])),
        time_tag: u32::from_be_bytes([buf[base + 4], buf[base + 5], buf[base + 6], buf[base + 7]]),
    })
}

/// Write an ATS entry header at the given word offset
pub fn write_ats_header(buf: &mut [u8], word_off: usize, hdr: AtsEntryHeader) {
    let base = word_off * BYTES_PER_WORD;
    buf[base] = 0;
    buf[base + 1] = 0;
    buf[base + 2..base + 4].copy_from_slice(&hdr.cmd_num.as_u16().to_be_bytes());
    buf[base + 4..base + 8].copy_from_slice(&hdr.time_tag.to_be_bytes());
}

/// Read an RTS entry header at the given word offset
pub fn read_rts_header(buf: &[u8], word_off: usize) -> Option<RtsEntryHeader> {
    let base = word_off.checked_mul(BYTES_PER_WORD)?;
    let end = base.checked_add(RTS_HDR_WORDS * BYTES_PER_WORD)?;
    if end > buf.len() {
        return None;
    }
    Some(RtsEntryHeader {
        wakeup_count: u32::from_be_bytes([buf[base], buf[base + 1], buf[base + 2], buf[base + 3]]),
    })
}

/// Write an RTS entry header at the given word offset
pub fn write_rts_header(buf: &mut [u8], word_off: usize, hdr: RtsEntryHeader) {
    let base = word_off * BYTES_PER_WORD;
    buf[base..base + 4].copy_from_slice(&hdr.wakeup_count.to_be_bytes());
}

/// Read the embedded packet size at a packet-start word offset
///
/// The size comes out of the packet's own length field; no bounds are
/// applied here beyond being able to read the primary header.
pub fn raw_packet_size(buf: &[u8], pkt_word_off: usize) -> Option<usize> {
    let base = pkt_word_off.checked_mul(BYTES_PER_WORD)?;
    if base + msg::PRI_HDR_SIZE > buf.len() {
        return None;
    }
    Some(msg::total_size(&buf[base..]))
}

/// Checked accessor for an embedded packet
///
/// Validates the size against the packet bounds and the end of the buffer
/// region (`capacity_words`), then returns the packet bytes.
pub fn checked_packet(
    buf: &[u8],
    pkt_word_off: usize,
    capacity_words: usize,
) -> Result<&[u8], TableError> {
    let size = raw_packet_size(buf, pkt_word_off).ok_or(TableError::BufferOverflow)?;
    if !msg::size_in_bounds(size) {
        return Err(TableError::InvalidLength(size));
    }
    let end_words = pkt_word_off + (size + BYTES_PER_WORD - 1) / BYTES_PER_WORD;
    if end_words > capacity_words {
        return Err(TableError::BufferOverflow);
    }
    let base = pkt_word_off * BYTES_PER_WORD;
    Ok(&buf[base..base + size])
}

/// Words occupied by an entry with the given header size and packet size
#[inline]
pub fn entry_words(hdr_words: usize, pkt_bytes: usize) -> usize {
    hdr_words + (pkt_bytes + BYTES_PER_WORD - 1) / BYTES_PER_WORD
}
