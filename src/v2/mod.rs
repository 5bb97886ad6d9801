//! The IPMI v2.0 (RMCP+) session layer: establishment payloads, the
//! negotiated crypto, and the authenticated session engine.

pub mod crypto;
pub mod messages;

mod backoff;
pub use backoff::BackoffConfig;

mod wire;
pub use wire::{PacketCodec, ReadError, WriteError};

mod establish;
pub use establish::{
    AlgorithmPreferences, EstablishError, HandshakeFailure, HandshakeStep, SessionConfig,
};

mod session;
pub use session::{Session, SessionError};

/// A privilege level for a session or command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrivilegeLevel {
    Callback,
    User,
    Operator,
    Administrator,
}

impl TryFrom<u8> for PrivilegeLevel {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let value = match value {
            0x01 => Self::Callback,
            0x02 => Self::User,
            0x03 => Self::Operator,
            0x04 => Self::Administrator,
            _ => return Err(()),
        };

        Ok(value)
    }
}

impl From<PrivilegeLevel> for u8 {
    fn from(value: PrivilegeLevel) -> Self {
        match value {
            PrivilegeLevel::Callback => 0x01,
            PrivilegeLevel::User => 0x02,
            PrivilegeLevel::Operator => 0x03,
            PrivilegeLevel::Administrator => 0x04,
        }
    }
}

/// What a v2 session packet carries, from the low six bits of the
/// payload type byte.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadType {
    IpmiMessage,
    Sol,
    OemExplicit { iana: u32, payload_id: u16 },
    OpenSessionRequest,
    OpenSessionResponse,
    RakpMessage1,
    RakpMessage2,
    RakpMessage3,
    RakpMessage4,
}

impl PayloadType {
    /// The six-bit payload descriptor.
    pub fn descriptor(&self) -> u8 {
        match self {
            Self::IpmiMessage => 0x00,
            Self::Sol => 0x01,
            Self::OemExplicit { .. } => 0x02,
            Self::OpenSessionRequest => 0x10,
            Self::OpenSessionResponse => 0x11,
            Self::RakpMessage1 => 0x12,
            Self::RakpMessage2 => 0x13,
            Self::RakpMessage3 => 0x14,
            Self::RakpMessage4 => 0x15,
        }
    }
}

/// `TryFrom` covers the descriptors without trailing fields; the OEM
/// descriptor (0x02) needs the IANA bytes that follow it and is handled
/// by the wire codec.
impl TryFrom<u8> for PayloadType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let value = match value {
            0x00 => Self::IpmiMessage,
            0x01 => Self::Sol,
            0x10 => Self::OpenSessionRequest,
            0x11 => Self::OpenSessionResponse,
            0x12 => Self::RakpMessage1,
            0x13 => Self::RakpMessage2,
            0x14 => Self::RakpMessage3,
            0x15 => Self::RakpMessage4,
            _ => return Err(()),
        };

        Ok(value)
    }
}

/// One v2 session packet, between the RMCP envelope and the (decrypted)
/// payload bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct V2Payload {
    pub ty: PayloadType,
    pub session_id: u32,
    pub session_sequence_number: u32,
    pub payload: Vec<u8>,
}
