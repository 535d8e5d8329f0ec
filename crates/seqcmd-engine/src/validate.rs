//! Whole-table validators
//!
//! The host calls these before committing a staged table buffer. They are
//! pure: they inspect the staging bytes and never touch live state. A
//! single bad entry rejects the whole table.

use crate::entry::{self, read_ats_header};
use crate::msg;
use seqcmd_core::constants::{
    ATS_HDR_WORDS, BYTES_PER_WORD, MAX_ATS_CMDS, PACKET_MIN_SIZE, RTS_HDR_WORDS,
};
use seqcmd_core::error::TableError;

/// Words needed for the smallest possible packet
const MIN_PKT_WORDS: usize = (PACKET_MIN_SIZE + BYTES_PER_WORD - 1) / BYTES_PER_WORD;

/// Accepted-table summary returned by the validators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStats {
    /// Number of valid entries preceding the terminator
    pub entry_count: u16,

    /// Words consumed by those entries
    pub word_count: usize,
}

impl TableStats {
    /// Bytes consumed by the valid entries
    pub fn byte_count(&self) -> usize {
        self.word_count * BYTES_PER_WORD
    }
}

/// Per-entry verdict from the ATS entry check
enum EntryVerdict {
    /// Terminator or clean end of the region
    End,

    /// A valid entry occupying this many words
    Entry { words: usize },
}

/// Validate one ATS entry at the cursor
///
/// `seen` is the duplicate-detection scratch array indexed by command
/// number; the entry's number is recorded on success.
fn verify_ats_entry(
    buf: &[u8],
    cursor: usize,
    capacity_words: usize,
    seen: &mut [bool],
) -> Result<EntryVerdict, TableError> {
    // No room left for a header: clean end of the valid region
    if cursor + ATS_HDR_WORDS > capacity_words {
        return Ok(EntryVerdict::End);
    }

    let hdr = read_ats_header(buf, cursor).ok_or(TableError::BufferOverflow)?;
    if hdr.cmd_num.is_end() {
        return Ok(EntryVerdict::End);
    }

    let cmd_index = hdr
        .cmd_num
        .to_index()
        .ok_or(TableError::InvalidCmdNumber(hdr.cmd_num.as_u16()))?;

    // A header with no room for even the smallest packet is an overflow,
    // not a terminator
    if cursor + ATS_HDR_WORDS + MIN_PKT_WORDS > capacity_words {
        return Err(TableError::BufferOverflow);
    }

    let pkt = entry::checked_packet(buf, cursor + ATS_HDR_WORDS, capacity_words)?;

    if seen[cmd_index] {
        return Err(TableError::DuplicateCmdNumber(hdr.cmd_num.as_u16()));
    }
    seen[cmd_index] = true;

    Ok(EntryVerdict::Entry {
        words: entry::entry_words(ATS_HDR_WORDS, pkt.len()),
    })
}

/// Validate an ATS or Append table image
///
/// Walks entries left to right until the terminator (command number zero)
/// or the end of the declared capacity. Rejects out-of-range command
/// numbers, duplicates, bad packet lengths, overflow, and empty tables.
pub fn verify_ats_table(buf: &[u8], capacity_words: usize) -> Result<TableStats, TableError> {
    let mut seen = vec![false; MAX_ATS_CMDS];
    let mut cursor = 0usize;
    let mut entries = 0u16;

    loop {
        match verify_ats_entry(buf, cursor, capacity_words, &mut seen)? {
            EntryVerdict::End => break,
            EntryVerdict::Entry { words } => {
                entries += 1;
                cursor += words;
            }
        }
    }

    if entries == 0 {
        return Err(TableError::EmptyTable);
    }

    Ok(TableStats {
        entry_count: entries,
        word_count: cursor,
    })
}

/// Validate an RTS table image
///
/// Entries are parsed in buffer order. Termination is keyed on the entry
/// header: a zero wakeup-count delta ends the valid region before the
/// packet bytes behind it are ever read. Anything else malformed rejects
/// the table.
pub fn parse_rts(buf: &[u8], capacity_words: usize) -> Result<TableStats, TableError> {
    let mut cursor = 0usize;
    let mut entries = 0u16;

    loop {
        // Remaining space cannot hold another minimum entry: clean end
        if cursor + RTS_HDR_WORDS + MIN_PKT_WORDS > capacity_words {
            break;
        }

        let Some(hdr) = entry::read_rts_header(buf, cursor) else {
            break;
        };
        if hdr.wakeup_count == 0 {
            // Zero delta: the end-of-list sentinel
            break;
        }

        let pkt_off = cursor + RTS_HDR_WORDS;
        let base = pkt_off * BYTES_PER_WORD;
        let mid = u16::from_be_bytes([buf[base], buf[base + 1]]);
        let size = entry::raw_packet_size(buf, pkt_off).ok_or(TableError::BufferOverflow)?;

        if mid == 0 {
            return Err(TableError::InvalidMsgId);
        }

        if !msg::size_in_bounds(size) {
            return Err(TableError::InvalidLength(size));
        }

        let words = entry::entry_words(RTS_HDR_WORDS, size);
        if cursor + words > capacity_words {
            return Err(TableError::BufferOverflow);
        }

        entries += 1;
        cursor += words;
    }

    if entries == 0 {
        return Err(TableError::EmptyTable);
    }

    Ok(TableStats {
        entry_count: entries,
        word_count: cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{AtsImageBuilder, RtsImageBuilder};
    use seqcmd_core::constants::{ATS_BUFF_WORDS, PACKET_MAX_SIZE, RTS_BUFF_WORDS};

    fn padded_ats(image: Vec<u8>) -> Vec<u8> {
        let mut buf = vec![0u8; ATS_BUFF_WORDS * BYTES_PER_WORD];
        buf[..image.len()].copy_from_slice(&image);
        buf
    }

    fn padded_rts(image: Vec<u8>) -> Vec<u8> {
        let mut buf = vec![0u8; RTS_BUFF_WORDS * BYTES_PER_WORD];
        buf[..image.len()].copy_from_slice(&image);
        buf
    }

    #[test]
    fn test_ats_nominal() {
        let image = AtsImageBuilder::new()
            .noop(1, 100, 0x1800)
            .noop(2, 50, 0x1800)
            .finish();
        let words = image.len() / BYTES_PER_WORD;
        let stats = verify_ats_table(&padded_ats(image), ATS_BUFF_WORDS).unwrap();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.word_count, words);
        assert_eq!(stats.byte_count(), words * 4);
    }

    #[test]
    fn test_ats_empty_table() {
        let buf = padded_ats(Vec::new());
        assert_eq!(
            verify_ats_table(&buf, ATS_BUFF_WORDS),
            Err(TableError::EmptyTable)
        );
    }

    #[test]
    fn test_ats_invalid_cmd_number() {
        let image = AtsImageBuilder::new().noop(5000, 10, 0x1800).finish();
        assert_eq!(
            verify_ats_table(&padded_ats(image), ATS_BUFF_WORDS),
            Err(TableError::InvalidCmdNumber(5000))
        );
    }

    #[test]
    fn test_ats_duplicate_cmd_number() {
        let image = AtsImageBuilder::new()
            .noop(3, 10, 0x1800)
            .noop(3, 20, 0x1800)
            .finish();
        assert_eq!(
            verify_ats_table(&padded_ats(image), ATS_BUFF_WORDS),
            Err(TableError::DuplicateCmdNumber(3))
        );
    }

    #[test]
    fn test_ats_bad_packet_length() {
        // Hand-build an entry whose length field exceeds the maximum
        let mut buf = padded_ats(Vec::new());
        crate::entry::write_ats_header(
            &mut buf,
            0,
            crate::entry::AtsEntryHeader {
                cmd_num: seqcmd_core::id::CommandNum::new(1),
                time_tag: 10,
            },
        );
        let base = ATS_HDR_WORDS * BYTES_PER_WORD;
        buf[base] = 0x18;
        buf[base + 1] = 0x00;
        let bad_len = (PACKET_MAX_SIZE as u16 - 7) + 8;
        buf[base + 4..base + 6].copy_from_slice(&bad_len.to_be_bytes());

        assert_eq!(
            verify_ats_table(&buf, ATS_BUFF_WORDS),
            Err(TableError::InvalidLength(PACKET_MAX_SIZE + 8))
        );
    }

    #[test]
    fn test_ats_entry_overflows_capacity() {
        let image = AtsImageBuilder::new()
            .entry(1, 10, &crate::msg::build_command(0x1800, 0, 0, &[0u8; 32]))
            .finish();
        // Capacity covers the header but not the packet
        assert_eq!(
            verify_ats_table(&padded_ats(image), 4),
            Err(TableError::BufferOverflow)
        );
    }

    #[test]
    fn test_ats_exact_fit_without_terminator() {
        let image = AtsImageBuilder::new().noop(1, 10, 0x1800).finish();
        let words = image.len() / BYTES_PER_WORD;
        let stats = verify_ats_table(&padded_ats(image), words).unwrap();
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_rts_nominal() {
        let image = RtsImageBuilder::new().noop(1, 0x1800).noop(5, 0x1801).finish();
        let words = image.len() / BYTES_PER_WORD;
        let stats = parse_rts(&padded_rts(image), RTS_BUFF_WORDS).unwrap();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.word_count, words);
    }

    #[test]
    fn test_rts_empty_rejected() {
        let buf = padded_rts(Vec::new());
        assert_eq!(parse_rts(&buf, RTS_BUFF_WORDS), Err(TableError::EmptyTable));
    }

    #[test]
    fn test_rts_zero_mid_rejected() {
        // Live entry (non-zero delta) holding a null message id
        let mut buf = padded_rts(Vec::new());
        crate::entry::write_rts_header(
            &mut buf,
            0,
            crate::entry::RtsEntryHeader { wakeup_count: 1 },
        );
        let base = RTS_HDR_WORDS * BYTES_PER_WORD;
        buf[base + 4..base + 6].copy_from_slice(&10u16.to_be_bytes());
        assert_eq!(parse_rts(&buf, RTS_BUFF_WORDS), Err(TableError::InvalidMsgId));
    }

    #[test]
    fn test_rts_zero_wakeup_terminates_before_packet() {
        // A zero delta ends the region even when plausible packet bytes
        // sit behind it
        let first = RtsImageBuilder::new().noop(2, 0x1800).finish();
        let first_words = first.len() / BYTES_PER_WORD;
        let mut buf = padded_rts(first);

        // Terminator header followed by a well-formed packet
        crate::entry::write_rts_header(
            &mut buf,
            first_words,
            crate::entry::RtsEntryHeader { wakeup_count: 0 },
        );
        let pkt = crate::msg::build_command(0x1801, 0, 0, &[]);
        let base = (first_words + RTS_HDR_WORDS) * BYTES_PER_WORD;
        buf[base..base + pkt.len()].copy_from_slice(&pkt);

        let stats = parse_rts(&buf, RTS_BUFF_WORDS).unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.word_count, first_words);
    }

    #[test]
    fn test_rts_oversize_packet_rejected() {
        let mut buf = padded_rts(Vec::new());
        crate::entry::write_rts_header(
            &mut buf,
            0,
            crate::entry::RtsEntryHeader { wakeup_count: 1 },
        );
        let base = RTS_HDR_WORDS * BYTES_PER_WORD;
        buf[base] = 0x18;
        let bad_len = (PACKET_MAX_SIZE as u16 - 7) + 4;
        buf[base + 4..base + 6].copy_from_slice(&bad_len.to_be_bytes());
        assert_eq!(
            parse_rts(&buf, RTS_BUFF_WORDS),
            Err(TableError::InvalidLength(PACKET_MAX_SIZE + 4))
        );
    }

    #[test]
    fn test_rts_entry_runs_past_capacity() {
        let image = RtsImageBuilder::new()
            .entry(1, &crate::msg::build_command(0x1800, 0, 0, &[0u8; 64]))
            .finish();
        let words = image.len() / BYTES_PER_WORD;
        assert_eq!(
            parse_rts(&padded_rts(image), words - 1),
            Err(TableError::BufferOverflow)
        );
    }

    #[test]
    fn test_rts_exact_fit() {
        let image = RtsImageBuilder::new().noop(2, 0x1800).finish();
        let words = image.len() / BYTES_PER_WORD;
        let stats = parse_rts(&padded_rts(image), words).unwrap();
        assert_eq!(stats.entry_count, 1);
    }
}
