use std::num::NonZeroU32;

use crate::v2::PrivilegeLevel;

/// A username for RAKP authentication: at most 16 bytes of non-NUL
/// ASCII.
#[derive(Debug, Clone, PartialEq)]
pub struct Username {
    data: [u8; 16],
    length: usize,
}

impl Username {
    pub fn new_empty() -> Self {
        Self {
            data: [0u8; 16],
            length: 0,
        }
    }

    /// Returns `None` if `data` is longer than 16 bytes or contains
    /// non-ASCII or NUL characters.
    pub fn new(data: &str) -> Option<Self> {
        if data.len() > 16 {
            return None;
        }

        let mut username = [0u8; 16];
        let mut length = 0;

        for char in data.chars() {
            if char.is_ascii() && char as u32 != 0 {
                username[length] = char as u8;
                length += 1;
            } else {
                return None;
            }
        }

        Some(Self {
            data: username,
            length,
        })
    }

    pub fn len(&self) -> u8 {
        self.length as u8
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl core::ops::Deref for Username {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data[..self.length]
    }
}

/// RAKP message 1: opens the key exchange by sending our random number
/// and identity for the managed system session just allocated.
#[derive(Debug, Clone, PartialEq)]
pub struct RakpMessage1 {
    pub message_tag: u8,
    pub managed_system_session_id: NonZeroU32,
    pub remote_console_random_number: [u8; 16],
    pub name_only_lookup: bool,
    pub requested_maximum_privilege_level: PrivilegeLevel,
    pub username: Username,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParseError {
    NotEnoughData,
    ZeroManagedSystemSessionId,
    InvalidPrivilegeLevel(u8),
    InconsistentUsernameLength,
}

impl RakpMessage1 {
    /// The role byte sent on the wire and fed into the RAKP HMACs:
    /// the name-only-lookup bit plus the requested privilege level.
    pub fn role_byte(&self) -> u8 {
        (self.name_only_lookup as u8) << 4 | u8::from(self.requested_maximum_privilege_level)
    }

    pub fn write(&self, buffer: &mut Vec<u8>) {
        // Message tag
        buffer.push(self.message_tag);

        // Three reserved bytes
        buffer.extend_from_slice(&[0x00, 0x00, 0x00]);

        // Managed system session ID
        buffer.extend_from_slice(&self.managed_system_session_id.get().to_le_bytes());

        // Remote console random number
        buffer.extend_from_slice(&self.remote_console_random_number);

        // Requested maximum privilege level + name-only lookup
        buffer.push(self.role_byte());

        // Two reserved bytes
        buffer.extend_from_slice(&[0x00, 0x00]);

        // User name length
        buffer.push(self.username.len());

        // User name data
        buffer.extend_from_slice(&self.username);
    }

    pub fn from_data(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < 28 {
            return Err(ParseError::NotEnoughData);
        }

        let message_tag = data[0];

        let managed_system_session_id =
            NonZeroU32::new(u32::from_le_bytes(data[4..8].try_into().unwrap()))
                .ok_or(ParseError::ZeroManagedSystemSessionId)?;

        let remote_console_random_number = data[8..24].try_into().unwrap();

        let role = data[24];
        let name_only_lookup = role & 0x10 == 0x10;
        let requested_maximum_privilege_level = PrivilegeLevel::try_from(role & 0x0F)
            .map_err(|_| ParseError::InvalidPrivilegeLevel(role))?;

        let username_length = data[27] as usize;
        if username_length > 16 || data.len() != 28 + username_length {
            return Err(ParseError::InconsistentUsernameLength);
        }

        let username_str = core::str::from_utf8(&data[28..])
            .map_err(|_| ParseError::InconsistentUsernameLength)?;
        let username =
            Username::new(username_str).ok_or(ParseError::InconsistentUsernameLength)?;

        Ok(Self {
            message_tag,
            managed_system_session_id,
            remote_console_random_number,
            name_only_lookup,
            requested_maximum_privilege_level,
            username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write() {
        let expected_data = [
            0x00, 0x00, 0x00, 0x00, 0x61, 0x01, 0x59, 0x2f, 0x52, 0xf0, 0x5e, 0x19, 0x70, 0x79,
            0xb4, 0xf9, 0xab, 0xec, 0x4a, 0x0e, 0x69, 0x36, 0xa9, 0xa3, 0x04, 0x00, 0x00, 0x04,
            0x6a, 0x6f, 0x6e, 0x61,
        ];

        let message = RakpMessage1 {
            message_tag: 0x00,
            managed_system_session_id: NonZeroU32::new(0x2f590161).unwrap(),
            remote_console_random_number: [
                0x52, 0xf0, 0x5e, 0x19, 0x70, 0x79, 0xb4, 0xf9, 0xab, 0xec, 0x4a, 0x0e, 0x69,
                0x36, 0xa9, 0xa3,
            ],
            name_only_lookup: false,
            requested_maximum_privilege_level: PrivilegeLevel::Administrator,
            username: Username::new("jona").unwrap(),
        };

        let mut buffer = Vec::new();
        message.write(&mut buffer);

        assert_eq!(expected_data, buffer.as_ref());

        assert_eq!(RakpMessage1::from_data(&buffer).unwrap(), message);
    }

    #[test]
    fn role_byte_carries_name_only_lookup() {
        let message = RakpMessage1 {
            message_tag: 0x00,
            managed_system_session_id: NonZeroU32::new(1).unwrap(),
            remote_console_random_number: [0; 16],
            name_only_lookup: true,
            requested_maximum_privilege_level: PrivilegeLevel::Administrator,
            username: Username::new("admin").unwrap(),
        };

        assert_eq!(message.role_byte(), 0x14);
    }

    #[test]
    fn username_rules() {
        assert!(Username::new("abcdefghijklmnop").is_some());
        assert!(Username::new("abcdefghijklmnopq").is_none());
        assert!(Username::new("nöpe").is_none());
        assert_eq!(Username::new_empty().len(), 0);
    }
}
