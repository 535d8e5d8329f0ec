//! Embedded command packet codec
//!
//! Every table entry carries a complete command packet: a 6-byte primary
//! header (message id, sequence, length) followed by a 2-byte command
//! secondary header (function code, checksum). All fields are big-endian.
//! The length field counts the bytes after it, so the total packet size is
//! `length + 7` and the smallest legal packet is the 8-byte bare header.

use seqcmd_core::constants::{PACKET_MAX_SIZE, PACKET_MIN_SIZE};

/// Size of the primary header in bytes
pub const PRI_HDR_SIZE: usize = 6;

/// Size of the full command header (primary + secondary) in bytes
pub const CMD_HDR_SIZE: usize = 8;

/// Offset of the function code byte
const FC_OFFSET: usize = 6;

/// Offset of the checksum byte
const CKSUM_OFFSET: usize = 7;

/// Read the message id from a packet
#[inline]
pub fn msg_id(pkt: &[u8]) -> u16 {
    u16::from_be_bytes([pkt[0], pkt[1]])
}

/// Read the sequence field from a packet
#[inline]
pub fn sequence(pkt: &[u8]) -> u16 {
    u16::from_be_bytes([pkt[2], pkt[3]])
}

/// Total packet size in bytes, derived from the packet's own length field
#[inline]
pub fn total_size(pkt: &[u8]) -> usize {
    u16::from_be_bytes([pkt[4], pkt[5]]) as usize + 7
}

/// Read the command function code
#[inline]
pub fn function_code(pkt: &[u8]) -> u8 {
    pkt[FC_OFFSET]
}

/// Compute the checksum byte that makes the whole-packet XOR equal 0xFF
pub fn compute_checksum(pkt: &[u8]) -> u8 {
    let mut acc = 0xFFu8;
    for (i, b) in pkt.iter().enumerate() {
        if i != CKSUM_OFFSET {
            acc ^= b;
        }
    }
    acc
}

/// Check the packet checksum
///
/// Valid packets XOR to 0xFF across every byte, checksum included.
pub fn validate_checksum(pkt: &[u8]) -> bool {
    if pkt.len() < CMD_HDR_SIZE {
        return false;
    }
    pkt.iter().fold(0u8, |acc, b| acc ^ b) == 0xFF
}

/// Build a command packet with a valid length field and checksum
///
/// Panics if the payload would push the packet over `PACKET_MAX_SIZE`;
/// callers building table images are expected to respect the bound.
pub fn build_command(mid: u16, seq: u16, fc: u8, payload: &[u8]) -> Vec<u8> {
    let total = CMD_HDR_SIZE + payload.len();
    assert!(
        total <= PACKET_MAX_SIZE,
        "packet of {} bytes exceeds maximum",
        total
    );

    let mut pkt = Vec::with_capacity(total);
    pkt.extend_from_slice(&mid.to_be_bytes());
    pkt.extend_from_slice(&seq.to_be_bytes());
    pkt.extend_from_slice(&((total - 7) as u16).to_be_bytes());
    pkt.push(fc);
    pkt.push(0);
    pkt.extend_from_slice(payload);

    let cksum = compute_checksum(&pkt);
    pkt[CKSUM_OFFSET] = cksum;
    pkt
}

/// Check a raw size against the packet bounds
#[inline]
pub fn size_in_bounds(size: usize) -> bool {
    (PACKET_MIN_SIZE..=PACKET_MAX_SIZE).contains(&size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_read_fields() {
        let pkt = build_command(0x18A9, 7, 3, &[0xAA, 0xBB]);
        assert_eq!(pkt.len(), 10);
        assert_eq!(msg_id(&pkt), 0x18A9);
        assert_eq!(sequence(&pkt), 7);
        assert_eq!(total_size(&pkt), 10);
        assert_eq!(function_code(&pkt), 3);
    }

    #[test]
    fn test_min_packet() {
        let pkt = build_command(0x1000, 0, 0, &[]);
        assert_eq!(pkt.len(), PACKET_MIN_SIZE);
        assert_eq!(total_size(&pkt), PACKET_MIN_SIZE);
    }

    #[test]
    fn test_checksum_validates() {
        let pkt = build_command(0x18A9, 1, 2, &[1, 2, 3]);
        assert!(validate_checksum(&pkt));
    }

    #[test]
    fn test_corrupt_byte_fails_checksum() {
        let mut pkt = build_command(0x18A9, 1, 2, &[1, 2, 3]);
        pkt[8] ^= 0x40;
        assert!(!validate_checksum(&pkt));
    }

    #[test]
    fn test_short_slice_fails_checksum() {
        assert!(!validate_checksum(&[0u8; 4]));
    }

    #[test]
    fn test_size_bounds() {
        assert!(!size_in_bounds(PACKET_MIN_SIZE - 1));
        assert!(size_in_bounds(PACKET_MIN_SIZE));
        assert!(size_in_bounds(PACKET_MAX_SIZE));
        assert!(!size_in_bounds(PACKET_MAX_SIZE + 1));
    }

    #[test]
    #[should_panic]
    fn test_oversize_build_panics() {
        build_command(0x18A9, 0, 0, &[0u8; PACKET_MAX_SIZE]);
    }
}
