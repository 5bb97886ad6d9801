//! The RMCP envelope.
//!
//! Every packet starts with a four byte RMCP header: version, a reserved
//! byte, a sequence number and a message class. IPMI packets always use
//! sequence number 0xFF, which asks the other end not to ACK.

pub const RMCP_VERSION_1: u8 = 0x06;

/// Sequence number that suppresses RMCP ACKs.
pub const NO_ACK_SEQUENCE: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RmcpClass {
    Ack(u8),
    Asf,
    Ipmi,
    OemDefined,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RmcpError {
    NotEnoughData,
    UnsupportedVersion(u8),
    UnknownClass(u8),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RmcpHeader {
    pub version: u8,
    pub sequence_number: u8,
    pub class: RmcpClass,
}

impl RmcpHeader {
    /// Header for an IPMI-class message, with ACKs suppressed.
    pub fn new_ipmi() -> Self {
        Self {
            version: RMCP_VERSION_1,
            sequence_number: NO_ACK_SEQUENCE,
            class: RmcpClass::Ipmi,
        }
    }

    pub fn write(&self, buffer: &mut Vec<u8>) {
        let class = match self.class {
            RmcpClass::Ack(value) => value | 0x80,
            RmcpClass::Asf => 0x06,
            RmcpClass::Ipmi => 0x07,
            RmcpClass::OemDefined => 0x08,
        };

        buffer.extend_from_slice(&[self.version, 0, self.sequence_number, class]);
    }

    /// Parse the envelope, returning the header and the remaining bytes.
    pub fn from_data(data: &[u8]) -> Result<(Self, &[u8]), RmcpError> {
        if data.len() < 4 {
            return Err(RmcpError::NotEnoughData);
        }

        let version = data[0];
        if version != RMCP_VERSION_1 {
            return Err(RmcpError::UnsupportedVersion(version));
        }

        let sequence_number = data[2];

        let class = match data[3] {
            0x06 => RmcpClass::Asf,
            0x07 => RmcpClass::Ipmi,
            0x08 => RmcpClass::OemDefined,
            v if v & 0x80 == 0x80 => RmcpClass::Ack(v & 0x7F),
            v => return Err(RmcpError::UnknownClass(v)),
        };

        Ok((
            Self {
                version,
                sequence_number,
                class,
            },
            &data[4..],
        ))
    }
}
