use std::num::NonZeroU32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParseError {
    NotEnoughData,
    ZeroManagedSystemSessionId,
}

/// RAKP message 3: proves we know the user key, or reports why the
/// exchange is being abandoned.
///
/// A non-zero status code carries no auth code.
#[derive(Debug, Clone, PartialEq)]
pub struct RakpMessage3<'a> {
    pub message_tag: u8,
    pub status_code: u8,
    pub managed_system_session_id: NonZeroU32,
    pub key_exchange_auth_code: Option<&'a [u8]>,
}

impl<'a> RakpMessage3<'a> {
    pub fn is_failure(&self) -> bool {
        self.status_code != 0
    }

    pub fn write(&self, buffer: &mut Vec<u8>) {
        buffer.push(self.message_tag);
        buffer.push(self.status_code);

        // Two reserved bytes
        buffer.extend_from_slice(&[0x00, 0x00]);

        buffer.extend_from_slice(&self.managed_system_session_id.get().to_le_bytes());

        if let Some(auth_code) = self.key_exchange_auth_code {
            buffer.extend_from_slice(auth_code);
        }
    }

    pub fn from_data(data: &'a [u8]) -> Result<Self, ParseError> {
        if data.len() < 8 {
            return Err(ParseError::NotEnoughData);
        }

        let message_tag = data[0];
        let status_code = data[1];

        let managed_system_session_id =
            NonZeroU32::new(u32::from_le_bytes(data[4..8].try_into().unwrap()))
                .ok_or(ParseError::ZeroManagedSystemSessionId)?;

        // Failure messages strip the auth code.
        let key_exchange_auth_code = if status_code == 0 {
            Some(&data[8..])
        } else {
            None
        };

        Ok(Self {
            message_tag,
            status_code,
            managed_system_session_id,
            key_exchange_auth_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_round_trip() {
        let wire = [0x01, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x02, 0x01];

        let expected = RakpMessage3 {
            message_tag: 0x01,
            status_code: 0x00,
            managed_system_session_id: NonZeroU32::new(0x04030201).unwrap(),
            key_exchange_auth_code: Some(&[0x02, 0x01]),
        };

        assert_eq!(RakpMessage3::from_data(&wire).unwrap(), expected);

        let mut buffer = Vec::new();
        expected.write(&mut buffer);
        assert_eq!(buffer, wire);
    }

    #[test]
    fn failure_round_trip() {
        let wire = [0x00, 0x02, 0x00, 0x00, 0x04, 0x03, 0x02, 0x01];

        let expected = RakpMessage3 {
            message_tag: 0x00,
            status_code: 0x02,
            managed_system_session_id: NonZeroU32::new(0x01020304).unwrap(),
            key_exchange_auth_code: None,
        };

        let parsed = RakpMessage3::from_data(&wire).unwrap();
        assert_eq!(parsed, expected);
        assert!(parsed.is_failure());

        let mut buffer = Vec::new();
        expected.write(&mut buffer);
        assert_eq!(buffer, wire);
    }

    #[test]
    fn short_message_is_rejected() {
        assert_eq!(
            RakpMessage3::from_data(&[0x00, 0x00, 0x00]),
            Err(ParseError::NotEnoughData)
        );
    }
}
