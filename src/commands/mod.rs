//! The command capability consumed by the session engine, and the
//! commands this crate ships.

mod close_session;
pub use close_session::CloseSession;

mod get_device_id;
pub use get_device_id::{DeviceId, GetDeviceId};

mod raw;
pub use raw::RawCommand;

/// A generic error indicating that the message did not contain
/// enough data to constitute a valid response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotEnoughData;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NetFn {
    App,
    Chassis,
    Storage,
    Unknown(u8),
}

impl From<u8> for NetFn {
    fn from(value: u8) -> Self {
        match value {
            0x00 | 0x01 => Self::Chassis,
            0x06 | 0x07 => Self::App,
            0x0A | 0x0B => Self::Storage,
            v => Self::Unknown(v),
        }
    }
}

impl NetFn {
    /// The even (request) value of this network function.
    pub fn request_value(&self) -> u8 {
        match self {
            NetFn::Chassis => 0x00,
            NetFn::App => 0x06,
            NetFn::Storage => 0x0A,
            NetFn::Unknown(v) => v & !1,
        }
    }

    /// The odd (response) value of this network function.
    pub fn response_value(&self) -> u8 {
        self.request_value() | 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(missing_docs)]
pub enum LogicalUnit {
    Zero,
    One,
    Two,
    Three,
}

impl LogicalUnit {
    /// Construct a `LogicalUnit` from the two lowest bits of `value`,
    /// ignoring all other bits.
    pub fn from_low_bits(value: u8) -> Self {
        match value & 0b11 {
            0b00 => Self::Zero,
            0b01 => Self::One,
            0b10 => Self::Two,
            _ => Self::Three,
        }
    }

    /// Get a raw value describing this logical unit.
    ///
    /// This value is always in the range `0..=3`.
    pub fn value(&self) -> u8 {
        match self {
            LogicalUnit::Zero => 0,
            LogicalUnit::One => 1,
            LogicalUnit::Two => 2,
            LogicalUnit::Three => 3,
        }
    }
}

/// An IPMI completion code.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(missing_docs)]
pub enum CompletionCode {
    Completed,
    NodeBusy,
    InvalidCommand,
    InvalidCommandForLun,
    ProcessingTimeout,
    OutOfSpace,
    ReservationCancelledOrInvalidId,
    RequestDataTruncated,
    RequestDataLenInvalid,
    RequestDataLengthLimitExceeded,
    ParameterOutOfRange,
    CannotReturnNumOfRequestedBytes,
    RequestedDataNotPresent,
    InvalidDataFieldInRequest,
    CommandIllegalForSensorOrRecord,
    CannotProvideResponse,
    CannotExecuteDuplicateRequest,
    SdrRepositoryInUpdateMode,
    DeviceInFirmwareUpdate,
    BmcInitializing,
    DestinationUnavailable,
    InsufficientPrivilege,
    CannotExecuteCommandInCurrentState,
    SubFunctionDisabled,
    Unspecified,
    Oem(u8),
    CommandSpecific(u8),
    Reserved(u8),
}

impl From<u8> for CompletionCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Completed,
            0xC0 => Self::NodeBusy,
            0xC1 => Self::InvalidCommand,
            0xC2 => Self::InvalidCommandForLun,
            0xC3 => Self::ProcessingTimeout,
            0xC4 => Self::OutOfSpace,
            0xC5 => Self::ReservationCancelledOrInvalidId,
            0xC6 => Self::RequestDataTruncated,
            0xC7 => Self::RequestDataLenInvalid,
            0xC8 => Self::RequestDataLengthLimitExceeded,
            0xC9 => Self::ParameterOutOfRange,
            0xCA => Self::CannotReturnNumOfRequestedBytes,
            0xCB => Self::RequestedDataNotPresent,
            0xCC => Self::InvalidDataFieldInRequest,
            0xCD => Self::CommandIllegalForSensorOrRecord,
            0xCE => Self::CannotProvideResponse,
            0xCF => Self::CannotExecuteDuplicateRequest,
            0xD0 => Self::SdrRepositoryInUpdateMode,
            0xD1 => Self::DeviceInFirmwareUpdate,
            0xD2 => Self::BmcInitializing,
            0xD3 => Self::DestinationUnavailable,
            0xD4 => Self::InsufficientPrivilege,
            0xD5 => Self::CannotExecuteCommandInCurrentState,
            0xD6 => Self::SubFunctionDisabled,
            0xFF => Self::Unspecified,
            v @ 0x01..=0x7E => Self::Oem(v),
            v @ 0x80..=0xBE => Self::CommandSpecific(v),
            v => Self::Reserved(v),
        }
    }
}

impl From<CompletionCode> for u8 {
    fn from(value: CompletionCode) -> Self {
        match value {
            CompletionCode::Completed => 0x00,
            CompletionCode::NodeBusy => 0xC0,
            CompletionCode::InvalidCommand => 0xC1,
            CompletionCode::InvalidCommandForLun => 0xC2,
            CompletionCode::ProcessingTimeout => 0xC3,
            CompletionCode::OutOfSpace => 0xC4,
            CompletionCode::ReservationCancelledOrInvalidId => 0xC5,
            CompletionCode::RequestDataTruncated => 0xC6,
            CompletionCode::RequestDataLenInvalid => 0xC7,
            CompletionCode::RequestDataLengthLimitExceeded => 0xC8,
            CompletionCode::ParameterOutOfRange => 0xC9,
            CompletionCode::CannotReturnNumOfRequestedBytes => 0xCA,
            CompletionCode::RequestedDataNotPresent => 0xCB,
            CompletionCode::InvalidDataFieldInRequest => 0xCC,
            CompletionCode::CommandIllegalForSensorOrRecord => 0xCD,
            CompletionCode::CannotProvideResponse => 0xCE,
            CompletionCode::CannotExecuteDuplicateRequest => 0xCF,
            CompletionCode::SdrRepositoryInUpdateMode => 0xD0,
            CompletionCode::DeviceInFirmwareUpdate => 0xD1,
            CompletionCode::BmcInitializing => 0xD2,
            CompletionCode::DestinationUnavailable => 0xD3,
            CompletionCode::InsufficientPrivilege => 0xD4,
            CompletionCode::CannotExecuteCommandInCurrentState => 0xD5,
            CompletionCode::SubFunctionDisabled => 0xD6,
            CompletionCode::Unspecified => 0xFF,
            CompletionCode::Oem(v) | CompletionCode::CommandSpecific(v) => v,
            CompletionCode::Reserved(v) => v,
        }
    }
}

impl CompletionCode {
    pub fn is_success(&self) -> bool {
        matches!(self, CompletionCode::Completed)
    }
}

/// What a command addresses: its network function, command code and
/// target logical unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operation {
    pub netfn: NetFn,
    pub cmd: u8,
    pub lun: LogicalUnit,
}

impl Operation {
    pub const fn new(netfn: NetFn, cmd: u8) -> Self {
        Self {
            netfn,
            cmd,
            lun: LogicalUnit::Zero,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageParseError {
    NotEnoughData,
}

/// The wire representation of an IPMI message carried in a session
/// payload.
///
/// The first byte packs the network function and LUN, the second is the
/// command code. Responses (odd network function) carry a completion
/// code before the body.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    netfn: u8,
    lun: LogicalUnit,
    cmd: u8,
    completion_code: Option<CompletionCode>,
    data: Vec<u8>,
}

impl Message {
    /// Create a request message for `operation` with body `data`.
    pub fn request(operation: Operation, data: Vec<u8>) -> Self {
        Self {
            netfn: operation.netfn.request_value(),
            lun: operation.lun,
            cmd: operation.cmd,
            completion_code: None,
            data,
        }
    }

    /// Create a response message, as a BMC would produce it.
    pub fn response(operation: Operation, code: CompletionCode, data: Vec<u8>) -> Self {
        Self {
            netfn: operation.netfn.response_value(),
            lun: operation.lun,
            cmd: operation.cmd,
            completion_code: Some(code),
            data,
        }
    }

    pub fn netfn(&self) -> NetFn {
        NetFn::from(self.netfn)
    }

    pub fn netfn_raw(&self) -> u8 {
        self.netfn
    }

    pub fn is_response(&self) -> bool {
        self.netfn & 1 == 1
    }

    pub fn lun(&self) -> LogicalUnit {
        self.lun
    }

    pub fn cmd(&self) -> u8 {
        self.cmd
    }

    pub fn completion_code(&self) -> Option<CompletionCode> {
        self.completion_code
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn write(&self, buffer: &mut Vec<u8>) {
        buffer.push(self.netfn << 2 | self.lun.value());
        buffer.push(self.cmd);

        if let Some(code) = self.completion_code {
            buffer.push(code.into());
        }

        buffer.extend_from_slice(&self.data);
    }

    pub fn from_data(data: &[u8]) -> Result<Self, MessageParseError> {
        if data.len() < 2 {
            return Err(MessageParseError::NotEnoughData);
        }

        let netfn = data[0] >> 2;
        let lun = LogicalUnit::from_low_bits(data[0]);
        let cmd = data[1];

        // Responses carry a completion code as their first body byte.
        let (completion_code, data) = if netfn & 1 == 1 {
            if data.len() < 3 {
                return Err(MessageParseError::NotEnoughData);
            }

            (Some(CompletionCode::from(data[2])), data[3..].to_vec())
        } else {
            (None, data[2..].to_vec())
        };

        Ok(Self {
            netfn,
            lun,
            cmd,
            completion_code,
            data,
        })
    }
}

/// A command the session can execute: a name for telemetry, an
/// [`Operation`], a request body encoder and a response body decoder.
pub trait Command {
    type Output;
    type Error;

    fn name(&self) -> &'static str;

    fn operation(&self) -> Operation;

    fn write_request(&self, buffer: &mut Vec<u8>);

    fn parse_response(&self, data: &[u8]) -> Result<Self::Output, Self::Error>;
}

/// The outcome of a completed command round-trip.
///
/// `response` is present only when the completion code indicates
/// success; the caller interprets other codes.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult<T> {
    pub completion_code: CompletionCode,
    pub response: Option<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_message_bytes() {
        let message = Message::request(Operation::new(NetFn::App, 0x01), Vec::new());

        let mut buffer = Vec::new();
        message.write(&mut buffer);

        assert_eq!(buffer, [0x06 << 2, 0x01]);
    }

    #[test]
    fn response_round_trip() {
        let message = Message::response(
            Operation::new(NetFn::App, 0x3C),
            CompletionCode::Completed,
            vec![0xAA, 0xBB],
        );

        let mut buffer = Vec::new();
        message.write(&mut buffer);
        assert_eq!(buffer, [0x07 << 2, 0x3C, 0x00, 0xAA, 0xBB]);

        let parsed = Message::from_data(&buffer).unwrap();
        assert_eq!(parsed, message);
        assert!(parsed.is_response());
        assert_eq!(parsed.completion_code(), Some(CompletionCode::Completed));
    }

    #[test]
    fn response_netfn_is_request_netfn_plus_one() {
        assert_eq!(NetFn::App.request_value() | 1, NetFn::App.response_value());
        assert_eq!(NetFn::from(0x07).request_value(), 0x06);
    }

    #[test]
    fn short_messages_are_rejected() {
        assert_eq!(
            Message::from_data(&[0x06 << 2]),
            Err(MessageParseError::NotEnoughData)
        );
        // A response without its completion code byte.
        assert_eq!(
            Message::from_data(&[0x07 << 2, 0x01]),
            Err(MessageParseError::NotEnoughData)
        );
    }

    #[test]
    fn completion_code_byte_round_trip() {
        for value in 0..=0xFFu8 {
            let code = CompletionCode::from(value);
            assert_eq!(u8::from(code), value);
        }
    }
}
