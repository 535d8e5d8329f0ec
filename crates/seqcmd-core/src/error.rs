//! Error types for the sequencer

use core::fmt;

/// Result type for sequencer operations
pub type SeqResult<T> = Result<T, SeqError>;

/// Errors surfaced by sequencer operations
///
/// Ground command handlers never propagate these; they translate each
/// one into a counter bump and an event. The variants exist so that the
/// library API can also be driven directly (tests, tools, the host
/// table service).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeqError {
    /// A table image failed validation
    Table(TableError),

    /// The downstream bus rejected an operation
    Bus(BusError),

    /// ATS identifier outside `1..=NUM_ATS`
    InvalidAtsId(u16),

    /// RTS identifier outside `1..=NUM_RTS`
    InvalidRtsId(u16),

    /// RTS group range invalid (bad bounds or first > last)
    InvalidRtsRange(u16, u16),

    /// Start rejected because the ATP is already running an ATS
    AtpNotIdle,

    /// The target ATS has no commands loaded
    AtsNotLoaded,

    /// No ATS is active for a jump or switch
    AtsNotActive,

    /// Every command in the sequence was skipped
    AllCommandsSkipped,

    /// The target RTS has never been loaded
    RtsNotLoaded,

    /// Start rejected because the RTS is already running
    RtsAlreadyRunning,

    /// Start rejected because the RTS is disabled
    RtsDisabled,

    /// Append rejected: target ATS is empty
    AppendTargetEmpty,

    /// Append rejected: staging table is empty
    AppendSourceEmpty,

    /// Append rejected: combined size exceeds the ATS buffer
    AppendTooLarge,

    /// Command packet length does not match the expected payload
    BadPayloadLength { expected: usize, actual: usize },

    /// Command code not recognized
    UnknownCommandCode(u8),

    /// Message id not recognized on the input pipe
    UnknownMessageId(u16),

    /// Argument value out of range (e.g. continue flag not 0/1)
    InvalidArgument,
}

impl fmt::Display for SeqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeqError::Table(e) => write!(f, "table validation failed: {}", e),
            SeqError::Bus(e) => write!(f, "bus error: {}", e),
            SeqError::InvalidAtsId(id) => write!(f, "invalid ATS id {}", id),
            SeqError::InvalidRtsId(id) => write!(f, "invalid RTS id {}", id),
            SeqError::InvalidRtsRange(first, last) => {
                write!(f, "invalid RTS range {}..{}", first, last)
            }
            SeqError::AtpNotIdle => write!(f, "ATP is not idle"),
            SeqError::AtsNotLoaded => write!(f, "ATS is not loaded"),
            SeqError::AtsNotActive => write!(f, "no active ATS"),
            SeqError::AllCommandsSkipped => write!(f, "all commands were skipped"),
            SeqError::RtsNotLoaded => write!(f, "RTS is not loaded"),
            SeqError::RtsAlreadyRunning => write!(f, "RTS is already running"),
            SeqError::RtsDisabled => write!(f, "RTS is disabled"),
            SeqError::AppendTargetEmpty => write!(f, "append target ATS is empty"),
            SeqError::AppendSourceEmpty => write!(f, "append table is empty"),
            SeqError::AppendTooLarge => write!(f, "append does not fit the ATS buffer"),
            SeqError::BadPayloadLength { expected, actual } => {
                write!(f, "bad payload length: expected {}, got {}", expected, actual)
            }
            SeqError::UnknownCommandCode(cc) => write!(f, "unknown command code {}", cc),
            SeqError::UnknownMessageId(mid) => write!(f, "unknown message id {:#06x}", mid),
            SeqError::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

impl std::error::Error for SeqError {}

/// Categorized table validation failures
///
/// A single bad entry rejects the whole table; the variant records what
/// the validator tripped on first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// An entry (or its header) runs past the end of the buffer
    BufferOverflow,

    /// ATS command number outside `1..=MAX_ATS_CMDS`
    InvalidCmdNumber(u16),

    /// The same command number appeared twice in one ATS
    DuplicateCmdNumber(u16),

    /// Embedded packet size outside the min/max packet bounds
    InvalidLength(usize),

    /// RTS entry carries a null message id
    InvalidMsgId,

    /// The terminator appeared before any valid entry
    EmptyTable,
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::BufferOverflow => write!(f, "entry runs past end of buffer"),
            TableError::InvalidCmdNumber(n) => write!(f, "invalid command number {}", n),
            TableError::DuplicateCmdNumber(n) => write!(f, "duplicate command number {}", n),
            TableError::InvalidLength(len) => write!(f, "invalid packet length {}", len),
            TableError::InvalidMsgId => write!(f, "invalid message id"),
            TableError::EmptyTable => write!(f, "table has no entries"),
        }
    }
}

impl std::error::Error for TableError {}

impl From<TableError> for SeqError {
    fn from(e: TableError) -> Self {
        SeqError::Table(e)
    }
}

/// Downstream bus failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The transport refused the packet
    TransmitFailed,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::TransmitFailed => write!(f, "transmit failed"),
        }
    }
}

impl std::error::Error for BusError {}

impl From<BusError> for SeqError {
    fn from(e: BusError) -> Self {
        SeqError::Bus(e)
    }
}
