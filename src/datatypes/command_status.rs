// ABOUTME: Status and result codes carried by CMPP response messages
// ABOUTME: Unknown codes are preserved through a catch-all variant so decoding never loses data

use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;

/// Connect response status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum ConnectStatus {
    Ok = 0,
    InvalidStructure = 1,
    InvalidSourceAddr = 2,
    AuthError = 3,
    VersionTooHigh = 4,
    Other = 5,
    #[num_enum(catch_all)]
    Unknown(u32),
}

impl ConnectStatus {
    pub fn is_ok(&self) -> bool {
        *self == ConnectStatus::Ok
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConnectStatus::Ok => "success",
            ConnectStatus::InvalidStructure => "invalid message structure",
            ConnectStatus::InvalidSourceAddr => "invalid source address",
            ConnectStatus::AuthError => "authentication error",
            ConnectStatus::VersionTooHigh => "version too high",
            ConnectStatus::Other => "other error",
            ConnectStatus::Unknown(_) => "unknown status",
        }
    }
}

/// Submit response result
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum SubmitResult {
    Ok = 0,
    InvalidStructure = 1,
    InvalidCommand = 2,
    DuplicateSequence = 3,
    InvalidMsgLength = 4,
    InvalidFeeCode = 5,
    MessageTooLong = 6,
    InvalidServiceId = 7,
    FlowControl = 8,
    FeeTerminalNotServed = 9,
    InvalidSrcId = 10,
    InvalidMsgSrc = 11,
    InvalidFeeTerminalId = 12,
    InvalidDestTerminalId = 13,
    #[num_enum(catch_all)]
    Unknown(u32),
}

impl SubmitResult {
    pub fn is_ok(&self) -> bool {
        *self == SubmitResult::Ok
    }

    pub fn description(&self) -> &'static str {
        match self {
            SubmitResult::Ok => "success",
            SubmitResult::InvalidStructure => "invalid message structure",
            SubmitResult::InvalidCommand => "invalid command",
            SubmitResult::DuplicateSequence => "duplicate sequence id",
            SubmitResult::InvalidMsgLength => "invalid message length",
            SubmitResult::InvalidFeeCode => "invalid fee code",
            SubmitResult::MessageTooLong => "message too long",
            SubmitResult::InvalidServiceId => "invalid service id",
            SubmitResult::FlowControl => "flow control",
            SubmitResult::FeeTerminalNotServed => "fee terminal not served by this gateway",
            SubmitResult::InvalidSrcId => "invalid src_id",
            SubmitResult::InvalidMsgSrc => "invalid msg_src",
            SubmitResult::InvalidFeeTerminalId => "invalid fee_terminal_id",
            SubmitResult::InvalidDestTerminalId => "invalid dest_terminal_id",
            SubmitResult::Unknown(_) => "unknown result",
        }
    }
}

/// Deliver response result
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum DeliverResult {
    Ok = 0,
    InvalidStructure = 1,
    InvalidCommand = 2,
    DuplicateSequence = 3,
    InvalidMsgLength = 4,
    InvalidFeeCode = 5,
    MessageTooLong = 6,
    InvalidServiceId = 7,
    FlowControl = 8,
    UnknownError = 9,
    #[num_enum(catch_all)]
    Unknown(u32),
}

impl DeliverResult {
    pub fn is_ok(&self) -> bool {
        *self == DeliverResult::Ok
    }

    pub fn description(&self) -> &'static str {
        match self {
            DeliverResult::Ok => "success",
            DeliverResult::InvalidStructure => "invalid message structure",
            DeliverResult::InvalidCommand => "invalid command",
            DeliverResult::DuplicateSequence => "duplicate sequence id",
            DeliverResult::InvalidMsgLength => "invalid message length",
            DeliverResult::InvalidFeeCode => "invalid fee code",
            DeliverResult::MessageTooLong => "message too long",
            DeliverResult::InvalidServiceId => "invalid service id",
            DeliverResult::FlowControl => "flow control",
            DeliverResult::UnknownError => "unknown error",
            DeliverResult::Unknown(_) => "unknown result",
        }
    }
}

macro_rules! impl_status_display {
    ($($status:ty),*) => {
        $(
            impl fmt::Display for $status {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}: {}", u32::from(*self), self.description())
                }
            }
        )*
    };
}

impl_status_display!(ConnectStatus, SubmitResult, DeliverResult);
