//! Event identifiers
//!
//! Every user-visible condition is reported as a numbered event through
//! the host event sink. Identifiers are stable: telemetry screens key on
//! them, so renumbering is an interface change.

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Debug,
    Info,
    Error,
}

/// Numbered event identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EventId {
    // General command interface
    NoopInfo = 10,
    ResetCountersDebug = 11,
    InvalidMsgId = 12,
    InvalidCmdCode = 13,
    InvalidCmdLength = 14,

    // ATP requests
    StartAtsInfo = 20,
    StartAtsInvalidId = 21,
    StartAtsNotLoaded = 22,
    StartAtsNotIdle = 23,
    StopAtsInfo = 24,
    StopAtsNoAts = 25,
    SwitchAtsPending = 26,
    SwitchAtsNotLoaded = 27,
    SwitchAtsIdle = 28,
    SwitchServiced = 29,
    SwitchServicedNotLoaded = 30,
    SwitchServicedIdle = 31,
    InlineSwitchInfo = 32,
    InlineSwitchNotLoaded = 33,
    JumpAtsInfo = 34,
    JumpAtsSkipped = 35,
    JumpAtsStopped = 36,
    JumpAtsNoAts = 37,
    ContinueFlagDebug = 38,
    ContinueFlagInvalid = 39,
    AllCommandsSkipped = 40,
    AtsCompleted = 41,
    AtsAborted = 42,
    AtsChecksumFailed = 43,
    AtsDistribFailed = 44,
    AtsCommandNotLoaded = 45,
    BeginAtsInvalidIndex = 46,

    // Append requests
    AppendInfo = 50,
    AppendInvalidId = 51,
    AppendTargetEmpty = 52,
    AppendSourceEmpty = 53,
    AppendTooLarge = 54,
    UpdateAppendInfo = 55,

    // RTP requests
    StartRtsInfo = 60,
    StartRtsInvalidId = 61,
    StartRtsNotLoaded = 62,
    StartRtsDisabled = 63,
    StartRtsAlreadyRunning = 64,
    StartRtsBadFirstLength = 65,
    StopRtsInfo = 66,
    StopRtsInvalidId = 67,
    DisableRtsDebug = 68,
    DisableRtsInvalidId = 69,
    EnableRtsDebug = 70,
    EnableRtsInvalidId = 71,
    RtsCompleted = 72,
    RtsAbortedLength = 73,
    RtsAbortedOverflow = 74,
    RtsChecksumFailed = 75,
    RtsDistribFailed = 76,
    AutoStartRts = 77,

    // RTS group requests
    StartRtsGroupInfo = 80,
    StartRtsGroupRange = 81,
    StopRtsGroupInfo = 82,
    StopRtsGroupRange = 83,
    DisableRtsGroupInfo = 84,
    DisableRtsGroupRange = 85,
    EnableRtsGroupInfo = 86,
    EnableRtsGroupRange = 87,

    // Table management
    VerifyAtsInfo = 90,
    VerifyAtsError = 91,
    VerifyRtsInfo = 92,
    VerifyRtsError = 93,
    TableManageInfo = 94,
    TableManageInvalidId = 95,
    TableCommitFailed = 96,
}
