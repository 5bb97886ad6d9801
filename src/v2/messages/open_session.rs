use std::num::NonZeroU32;

use crate::v2::{
    crypto::{AuthenticationAlgorithm, ConfidentialityAlgorithm, IntegrityAlgorithm},
    PrivilegeLevel,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlgorithmPayloadError {
    IncorrectDataLen,
    IncorrectPayloadLenValue,
    UnknownAuthAlgorithm(u8),
    UnknownIntegrityAlgorithm(u8),
    UnknownConfidentialityAlgorithm(u8),
    UnknownPayloadType(u8),
}

/// A decoded 8-byte algorithm TLV. `None` is a wildcard entry, which
/// only requests may carry.
#[derive(Debug, Clone, Copy, PartialEq)]
enum AlgorithmPayload {
    Authentication(Option<AuthenticationAlgorithm>),
    Integrity(Option<IntegrityAlgorithm>),
    Confidentiality(Option<ConfidentialityAlgorithm>),
}

fn write_algorithm_payload(ty: u8, algorithm: Option<u8>, buffer: &mut Vec<u8>) {
    // Type
    buffer.push(ty);

    // Reserved data
    buffer.extend_from_slice(&[0x00, 0x00]);

    match algorithm {
        Some(value) => {
            // Assert valid value
            assert!((value & 0xC0) == 0);

            buffer.push(0x08);
            buffer.push(value);
        }
        // A wildcard entry has a zero payload length and no algorithm.
        None => {
            buffer.push(0x00);
            buffer.push(0x00);
        }
    }

    // Reserved data
    buffer.extend_from_slice(&[0x00, 0x00, 0x00]);
}

impl AlgorithmPayload {
    fn from_data(data: &[u8]) -> Result<Self, AlgorithmPayloadError> {
        use AlgorithmPayloadError::*;

        if data.len() != 8 {
            return Err(IncorrectDataLen);
        }

        let ty = data[0];
        let payload_len = data[3];
        let algo = data[4];

        let wildcard = match payload_len {
            0x00 if algo == 0 => true,
            0x08 => false,
            _ => return Err(IncorrectPayloadLenValue),
        };

        match ty {
            0x00 => {
                if wildcard {
                    return Ok(Self::Authentication(None));
                }

                let algo =
                    AuthenticationAlgorithm::try_from(algo).map_err(|_| UnknownAuthAlgorithm(algo))?;
                Ok(Self::Authentication(Some(algo)))
            }
            0x01 => {
                if wildcard {
                    return Ok(Self::Integrity(None));
                }

                let algo =
                    IntegrityAlgorithm::try_from(algo).map_err(|_| UnknownIntegrityAlgorithm(algo))?;
                Ok(Self::Integrity(Some(algo)))
            }
            0x02 => {
                if wildcard {
                    return Ok(Self::Confidentiality(None));
                }

                let algo = ConfidentialityAlgorithm::try_from(algo)
                    .map_err(|_| UnknownConfidentialityAlgorithm(algo))?;
                Ok(Self::Confidentiality(Some(algo)))
            }
            _ => Err(UnknownPayloadType(ty)),
        }
    }
}

/// The RMCP+ Open Session request.
///
/// Each algorithm family carries the caller's ordered proposals; an
/// empty list encodes the wildcard entry, leaving the choice to the
/// BMC.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenSessionRequest {
    pub message_tag: u8,
    /// `None` asks for the highest privilege level the BMC will grant.
    pub requested_max_privilege: Option<PrivilegeLevel>,
    pub remote_console_session_id: NonZeroU32,
    pub authentication_algorithms: Vec<AuthenticationAlgorithm>,
    pub integrity_algorithms: Vec<IntegrityAlgorithm>,
    pub confidentiality_algorithms: Vec<ConfidentialityAlgorithm>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParseOpenSessionRequestError {
    NotEnoughData,
    IncorrectDataLen,
    InvalidPrivilegeLevel(u8),
    ZeroRemoteConsoleSessionId,
    MissingAlgorithmPayload,
    AlgorithmPayloadError(AlgorithmPayloadError),
}

impl OpenSessionRequest {
    pub fn write_data(&self, buffer: &mut Vec<u8>) {
        buffer.push(self.message_tag);
        buffer.push(self.requested_max_privilege.map(Into::into).unwrap_or(0));

        // Two reserved bytes
        buffer.push(0);
        buffer.push(0);

        buffer.extend_from_slice(&self.remote_console_session_id.get().to_le_bytes());

        if self.authentication_algorithms.is_empty() {
            write_algorithm_payload(0x00, None, buffer);
        }
        for algorithm in &self.authentication_algorithms {
            write_algorithm_payload(0x00, Some((*algorithm).into()), buffer);
        }

        if self.integrity_algorithms.is_empty() {
            write_algorithm_payload(0x01, None, buffer);
        }
        for algorithm in &self.integrity_algorithms {
            write_algorithm_payload(0x01, Some((*algorithm).into()), buffer);
        }

        if self.confidentiality_algorithms.is_empty() {
            write_algorithm_payload(0x02, None, buffer);
        }
        for algorithm in &self.confidentiality_algorithms {
            write_algorithm_payload(0x02, Some((*algorithm).into()), buffer);
        }
    }

    pub fn from_data(data: &[u8]) -> Result<Self, ParseOpenSessionRequestError> {
        use ParseOpenSessionRequestError::*;

        if data.len() < 8 {
            return Err(NotEnoughData);
        }

        if (data.len() - 8) % 8 != 0 {
            return Err(IncorrectDataLen);
        }

        let message_tag = data[0];

        let requested_max_privilege = match data[1] {
            0 => None,
            v => Some(PrivilegeLevel::try_from(v).map_err(|_| InvalidPrivilegeLevel(v))?),
        };

        let remote_console_session_id =
            NonZeroU32::new(u32::from_le_bytes(data[4..8].try_into().unwrap()))
                .ok_or(ZeroRemoteConsoleSessionId)?;

        let mut authentication_algorithms = Vec::new();
        let mut integrity_algorithms = Vec::new();
        let mut confidentiality_algorithms = Vec::new();
        let (mut seen_auth, mut seen_integrity, mut seen_confidentiality) = (false, false, false);

        for tlv in data[8..].chunks_exact(8) {
            match AlgorithmPayload::from_data(tlv).map_err(AlgorithmPayloadError)? {
                AlgorithmPayload::Authentication(a) => {
                    seen_auth = true;
                    authentication_algorithms.extend(a);
                }
                AlgorithmPayload::Integrity(i) => {
                    seen_integrity = true;
                    integrity_algorithms.extend(i);
                }
                AlgorithmPayload::Confidentiality(c) => {
                    seen_confidentiality = true;
                    confidentiality_algorithms.extend(c);
                }
            }
        }

        if !(seen_auth && seen_integrity && seen_confidentiality) {
            return Err(MissingAlgorithmPayload);
        }

        Ok(Self {
            message_tag,
            requested_max_privilege,
            remote_console_session_id,
            authentication_algorithms,
            integrity_algorithms,
            confidentiality_algorithms,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParseOpenSessionResponseError {
    NotEnoughData,
    /// The BMC reported a non-zero RMCP+ status code.
    ErrorStatus(u8),
    ZeroRemoteConsoleSessionId,
    ZeroManagedSystemSessionId,
    InvalidPrivilegeLevel(u8),
    /// Responses must carry a concrete algorithm per family.
    UnexpectedWildcard,
    WrongPayloadFamily,
    AlgorithmPayloadError(AlgorithmPayloadError),
}

/// The RMCP+ Open Session response: the BMC's session ID and one
/// negotiated algorithm per family.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenSessionResponse {
    pub message_tag: u8,
    pub maximum_privilege_level: PrivilegeLevel,
    pub remote_console_session_id: NonZeroU32,
    pub managed_system_session_id: NonZeroU32,
    pub authentication_algorithm: AuthenticationAlgorithm,
    pub integrity_algorithm: IntegrityAlgorithm,
    pub confidentiality_algorithm: ConfidentialityAlgorithm,
}

impl OpenSessionResponse {
    pub fn from_data(data: &[u8]) -> Result<Self, ParseOpenSessionResponseError> {
        use ParseOpenSessionResponseError::*;

        if data.len() < 2 {
            return Err(NotEnoughData);
        }

        let message_tag = data[0];
        let status_code = data[1];

        if status_code != 0 {
            return Err(ErrorStatus(status_code));
        }

        if data.len() != 36 {
            return Err(NotEnoughData);
        }

        let maximum_privilege_level =
            PrivilegeLevel::try_from(data[2]).map_err(|_| InvalidPrivilegeLevel(data[2]))?;

        let remote_console_session_id =
            NonZeroU32::new(u32::from_le_bytes(data[4..8].try_into().unwrap()))
                .ok_or(ZeroRemoteConsoleSessionId)?;
        let managed_system_session_id =
            NonZeroU32::new(u32::from_le_bytes(data[8..12].try_into().unwrap()))
                .ok_or(ZeroManagedSystemSessionId)?;

        let authentication_algorithm =
            match AlgorithmPayload::from_data(&data[12..20]).map_err(AlgorithmPayloadError)? {
                AlgorithmPayload::Authentication(Some(a)) => a,
                AlgorithmPayload::Authentication(None) => return Err(UnexpectedWildcard),
                _ => return Err(WrongPayloadFamily),
            };

        let integrity_algorithm =
            match AlgorithmPayload::from_data(&data[20..28]).map_err(AlgorithmPayloadError)? {
                AlgorithmPayload::Integrity(Some(i)) => i,
                AlgorithmPayload::Integrity(None) => return Err(UnexpectedWildcard),
                _ => return Err(WrongPayloadFamily),
            };

        let confidentiality_algorithm =
            match AlgorithmPayload::from_data(&data[28..36]).map_err(AlgorithmPayloadError)? {
                AlgorithmPayload::Confidentiality(Some(c)) => c,
                AlgorithmPayload::Confidentiality(None) => return Err(UnexpectedWildcard),
                _ => return Err(WrongPayloadFamily),
            };

        Ok(Self {
            message_tag,
            maximum_privilege_level,
            remote_console_session_id,
            managed_system_session_id,
            authentication_algorithm,
            integrity_algorithm,
            confidentiality_algorithm,
        })
    }

    pub fn write_data(&self, buffer: &mut Vec<u8>) {
        buffer.push(self.message_tag);

        // Status code: success, and the reserved byte.
        buffer.push(0x00);
        buffer.push(self.maximum_privilege_level.into());
        buffer.push(0x00);

        buffer.extend_from_slice(&self.remote_console_session_id.get().to_le_bytes());
        buffer.extend_from_slice(&self.managed_system_session_id.get().to_le_bytes());

        write_algorithm_payload(0x00, Some(self.authentication_algorithm.into()), buffer);
        write_algorithm_payload(0x01, Some(self.integrity_algorithm.into()), buffer);
        write_algorithm_payload(0x02, Some(self.confidentiality_algorithm.into()), buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST_WIRE: [u8; 40] = [
        0x7b, 0x02, 0x00, 0x00, 0x01, 0x04, 0x02, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x01, 0x00, 0x00, 0x08, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x08, 0x01, 0x00,
        0x00, 0x00, 0x02, 0x00, 0x00, 0x08, 0x02, 0x00, 0x00, 0x00,
    ];

    fn request() -> OpenSessionRequest {
        OpenSessionRequest {
            message_tag: 123,
            requested_max_privilege: Some(PrivilegeLevel::User),
            remote_console_session_id: NonZeroU32::new(0x03020401).unwrap(),
            // A single wildcard authentication entry.
            authentication_algorithms: Vec::new(),
            integrity_algorithms: vec![IntegrityAlgorithm::HmacSha1_96],
            confidentiality_algorithms: vec![
                ConfidentialityAlgorithm::AesCbc128,
                ConfidentialityAlgorithm::Xrc4_128,
            ],
        }
    }

    #[test]
    fn request_decode() {
        assert_eq!(OpenSessionRequest::from_data(&REQUEST_WIRE).unwrap(), request());
    }

    #[test]
    fn request_serialize() {
        let mut buffer = Vec::new();
        request().write_data(&mut buffer);

        assert_eq!(buffer, REQUEST_WIRE);
    }

    #[test]
    fn response_decode() {
        let data = [
            0x00, 0x00, 0x04, 0x00, 0xa4, 0xa3, 0xa2, 0xa0, 0x9c, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x08, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x08, 0x01, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x08, 0x01, 0x00, 0x00, 0x00,
        ];

        let message = OpenSessionResponse::from_data(&data).unwrap();

        let expected = OpenSessionResponse {
            message_tag: 0x00,
            maximum_privilege_level: PrivilegeLevel::Administrator,
            remote_console_session_id: NonZeroU32::new(0xa0a2a3a4).unwrap(),
            managed_system_session_id: NonZeroU32::new(0x9c).unwrap(),
            authentication_algorithm: AuthenticationAlgorithm::RakpHmacSha1,
            integrity_algorithm: IntegrityAlgorithm::HmacSha1_96,
            confidentiality_algorithm: ConfidentialityAlgorithm::AesCbc128,
        };

        assert_eq!(message, expected);

        let mut reencoded = Vec::new();
        message.write_data(&mut reencoded);
        assert_eq!(reencoded, data);
    }

    #[test]
    fn response_error_status_is_surfaced() {
        let data = [0x10, 0x01];

        assert_eq!(
            OpenSessionResponse::from_data(&data),
            Err(ParseOpenSessionResponseError::ErrorStatus(0x01))
        );
    }

    #[test]
    fn bad_tlv_length_is_rejected() {
        let mut data = REQUEST_WIRE;
        // Corrupt the integrity TLV's payload length.
        data[19] = 0x07;

        assert_eq!(
            OpenSessionRequest::from_data(&data),
            Err(ParseOpenSessionRequestError::AlgorithmPayloadError(
                AlgorithmPayloadError::IncorrectPayloadLenValue
            ))
        );
    }
}
