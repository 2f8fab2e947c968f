use num_enum::{IntoPrimitive, TryFromPrimitive};

/// CMPP command identifiers.
///
/// Every request has a paired response whose ID sets the high bit.
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandId {
    Connect = 0x0000_0001,
    ConnectResp = 0x8000_0001,
    Terminate = 0x0000_0002,
    TerminateResp = 0x8000_0002,
    Submit = 0x0000_0004,
    SubmitResp = 0x8000_0004,
    Deliver = 0x0000_0005,
    DeliverResp = 0x8000_0005,
    ActiveTest = 0x0000_0008,
    ActiveTestResp = 0x8000_0008,
}

const RESPONSE_BIT: u32 = 0x8000_0000;

impl CommandId {
    /// Check if this command_id represents a response
    pub fn is_response(&self) -> bool {
        u32::from(*self) & RESPONSE_BIT != 0
    }

    /// The response paired with this request, or `self` for responses
    pub fn response(&self) -> CommandId {
        CommandId::try_from(u32::from(*self) | RESPONSE_BIT).unwrap_or(*self)
    }
}
