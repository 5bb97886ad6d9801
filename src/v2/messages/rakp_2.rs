use std::num::NonZeroU32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParseError {
    NotEnoughData,
    /// The BMC reported a non-zero RAKP status code.
    ErrorStatus(u8),
    InvalidRemoteConsoleSessionId,
}

/// RAKP message 2: the BMC's random number, GUID and key exchange auth
/// code.
///
/// The auth code length depends on the negotiated authentication
/// algorithm, so it is everything after the fixed header.
#[derive(Debug, Clone, PartialEq)]
pub struct RakpMessage2<'a> {
    pub message_tag: u8,
    pub remote_console_session_id: NonZeroU32,
    pub managed_system_random_number: [u8; 16],
    pub managed_system_guid: [u8; 16],
    pub key_exchange_auth_code: &'a [u8],
}

impl<'a> RakpMessage2<'a> {
    pub fn from_data(data: &'a [u8]) -> Result<Self, ParseError> {
        // 4 = tag, status code, reserved bytes
        if data.len() < 4 {
            return Err(ParseError::NotEnoughData);
        }

        let message_tag = data[0];
        let status_code = data[1];

        if status_code != 0 {
            return Err(ParseError::ErrorStatus(status_code));
        }

        if data.len() < 40 {
            return Err(ParseError::NotEnoughData);
        }

        let remote_console_session_id =
            NonZeroU32::new(u32::from_le_bytes(data[4..8].try_into().unwrap()))
                .ok_or(ParseError::InvalidRemoteConsoleSessionId)?;

        let managed_system_random_number = data[8..24].try_into().unwrap();
        let managed_system_guid = data[24..40].try_into().unwrap();
        let key_exchange_auth_code = &data[40..];

        Ok(Self {
            message_tag,
            remote_console_session_id,
            managed_system_random_number,
            managed_system_guid,
            key_exchange_auth_code,
        })
    }

    pub fn write(&self, buffer: &mut Vec<u8>) {
        buffer.push(self.message_tag);

        // Status code: success, and two reserved bytes
        buffer.extend_from_slice(&[0x00, 0x00, 0x00]);

        buffer.extend_from_slice(&self.remote_console_session_id.get().to_le_bytes());
        buffer.extend_from_slice(&self.managed_system_random_number);
        buffer.extend_from_slice(&self.managed_system_guid);
        buffer.extend_from_slice(self.key_exchange_auth_code);
    }
}
