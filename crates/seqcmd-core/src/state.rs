//! Processor and command status enums
//!
//! The numeric values share one code space because they are reported
//! together in telemetry; keep them stable when adding variants.

use core::fmt;

/// Execution status of a single ATS command slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmdStatus {
    /// Slot has no command loaded
    Empty = 0,

    /// Command is loaded and ready to run
    Loaded = 1,

    /// Command was emitted on the bus
    Executed = 3,

    /// Command was passed over by a start offset or a jump
    Skipped = 4,

    /// Command is being processed right now
    Executing = 5,

    /// Embedded packet failed its checksum test
    FailedChecksum = 6,

    /// Bus refused the packet
    FailedDistrib = 7,

    /// Reserved for the inline-switch latch
    Starting = 8,
}

impl CmdStatus {
    /// Check whether the slot holds a command (loaded or already resolved)
    #[inline]
    pub const fn is_occupied(&self) -> bool {
        !matches!(self, CmdStatus::Empty)
    }

    /// Check whether the command may still be dispatched
    #[inline]
    pub const fn is_pending(&self) -> bool {
        matches!(self, CmdStatus::Loaded)
    }
}

impl From<u8> for CmdStatus {
    fn from(v: u8) -> Self {
        match v {
            1 => CmdStatus::Loaded,
            3 => CmdStatus::Executed,
            4 => CmdStatus::Skipped,
            5 => CmdStatus::Executing,
            6 => CmdStatus::FailedChecksum,
            7 => CmdStatus::FailedDistrib,
            8 => CmdStatus::Starting,
            _ => CmdStatus::Empty,
        }
    }
}

impl From<CmdStatus> for u8 {
    fn from(s: CmdStatus) -> u8 {
        s as u8
    }
}

/// State of the absolute time processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AtpState {
    /// No ATS is active
    Idle = 2,

    /// An ATS is being executed
    Executing = 5,

    /// An inline switch completed this second; execution resumes on the
    /// next wakeup tick
    Starting = 8,
}

impl AtpState {
    /// Check whether the processor can dispatch commands
    #[inline]
    pub const fn is_executing(&self) -> bool {
        matches!(self, AtpState::Executing)
    }
}

impl From<u8> for AtpState {
    fn from(v: u8) -> Self {
        match v {
            5 => AtpState::Executing,
            8 => AtpState::Starting,
            _ => AtpState::Idle,
        }
    }
}

impl From<AtpState> for u8 {
    fn from(s: AtpState) -> u8 {
        s as u8
    }
}

impl fmt::Display for AtpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtpState::Idle => write!(f, "IDLE"),
            AtpState::Executing => write!(f, "EXECUTING"),
            AtpState::Starting => write!(f, "STARTING"),
        }
    }
}

/// Run status of one RTS table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RtsStatus {
    /// Never loaded
    Empty = 0,

    /// Loaded but not running
    Loaded = 1,

    /// Actively emitting commands
    Executing = 5,
}

impl RtsStatus {
    /// Check whether the RTS is running
    #[inline]
    pub const fn is_executing(&self) -> bool {
        matches!(self, RtsStatus::Executing)
    }

    /// Check whether the RTS can be started
    #[inline]
    pub const fn is_startable(&self) -> bool {
        matches!(self, RtsStatus::Loaded)
    }
}

impl From<u8> for RtsStatus {
    fn from(v: u8) -> Self {
        match v {
            1 => RtsStatus::Loaded,
            5 => RtsStatus::Executing,
            _ => RtsStatus::Empty,
        }
    }
}

impl From<RtsStatus> for u8 {
    fn from(s: RtsStatus) -> u8 {
        s as u8
    }
}

impl fmt::Display for RtsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtsStatus::Empty => write!(f, "EMPTY"),
            RtsStatus::Loaded => write!(f, "LOADED"),
            RtsStatus::Executing => write!(f, "EXECUTING"),
        }
    }
}

/// Which processor the dispatcher services next
///
/// `None` (as in `Option::None`) means neither has work due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Process {
    /// Absolute time processor
    Atp,

    /// Relative time processor
    Rtp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmd_status_round_trip() {
        for s in [
            CmdStatus::Empty,
            CmdStatus::Loaded,
            CmdStatus::Executed,
            CmdStatus::Skipped,
            CmdStatus::Executing,
            CmdStatus::FailedChecksum,
            CmdStatus::FailedDistrib,
            CmdStatus::Starting,
        ] {
            assert_eq!(CmdStatus::from(u8::from(s)), s);
        }
    }

    #[test]
    fn test_cmd_status_predicates() {
        assert!(!CmdStatus::Empty.is_occupied());
        assert!(CmdStatus::Loaded.is_occupied());
        assert!(CmdStatus::Loaded.is_pending());
        assert!(!CmdStatus::Executed.is_pending());
        assert!(!CmdStatus::Skipped.is_pending());
    }

    #[test]
    fn test_atp_state_round_trip() {
        for s in [AtpState::Idle, AtpState::Executing, AtpState::Starting] {
            assert_eq!(AtpState::from(u8::from(s)), s);
        }
        assert_eq!(AtpState::from(0), AtpState::Idle);
    }

    #[test]
    fn test_rts_status_round_trip() {
        for s in [RtsStatus::Empty, RtsStatus::Loaded, RtsStatus::Executing] {
            assert_eq!(RtsStatus::from(u8::from(s)), s);
        }
        assert!(RtsStatus::Loaded.is_startable());
        assert!(!RtsStatus::Executing.is_startable());
        assert!(RtsStatus::Executing.is_executing());
    }
}
