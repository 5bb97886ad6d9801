//! The v2 session wrapper: payload type bits, session IDs and
//! sequence number, length, and the confidentiality and integrity
//! sub-layers.

use super::{
    crypto::{
        ConfidentialityAlgorithm, ConfidentialityCodec, CryptoUnwrapError, IntegrityAlgorithm,
        IntegrityHasher, Keys, UnsupportedAlgorithm,
    },
    PayloadType, V2Payload,
};

/// The AuthType/Format byte that marks a v2.0 session wrapper.
pub const FORMAT_IPMI_V2_0: u8 = 0x06;

const NEXT_HEADER: u8 = 0x07;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteError {
    PayloadTooLong,
    EncryptedPayloadTooLong,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadError {
    NotEnoughData,
    NotIpmiV2_0,
    InvalidPayloadType(u8),
    Unwrap(CryptoUnwrapError),
}

impl From<CryptoUnwrapError> for ReadError {
    fn from(value: CryptoUnwrapError) -> Self {
        Self::Unwrap(value)
    }
}

/// Encodes and decodes v2 session packets with the negotiated
/// integrity and confidentiality sub-layers.
///
/// Session establishment runs on the [`plaintext`] codec; once keys are
/// derived, [`for_session`] builds the codec that authenticates with K₁
/// and encrypts with K₂. The codec owns its keyed hasher and cipher;
/// nothing is shared between sessions.
///
/// [`plaintext`]: PacketCodec::plaintext
/// [`for_session`]: PacketCodec::for_session
#[derive(Clone)]
pub struct PacketCodec {
    integrity_algorithm: IntegrityAlgorithm,
    integrity_hasher: IntegrityHasher,
    confidentiality: ConfidentialityCodec,
}

impl core::fmt::Debug for PacketCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PacketCodec")
            .field("integrity_algorithm", &self.integrity_algorithm)
            .field("confidentiality_algorithm", &self.confidentiality.algorithm())
            .finish()
    }
}

impl PacketCodec {
    /// The pre-session codec: unauthenticated, unencrypted.
    pub fn plaintext() -> Self {
        Self {
            integrity_algorithm: IntegrityAlgorithm::None,
            integrity_hasher: IntegrityHasher::Null,
            confidentiality: ConfidentialityCodec::None,
        }
    }

    /// Build the in-session codec from the derived keys.
    pub fn for_session(
        keys: &Keys,
        integrity: IntegrityAlgorithm,
        confidentiality: ConfidentialityAlgorithm,
    ) -> Result<Self, UnsupportedAlgorithm> {
        Ok(Self {
            integrity_algorithm: integrity,
            integrity_hasher: integrity.hasher(keys.k1())?,
            confidentiality: ConfidentialityCodec::new(confidentiality, keys)?,
        })
    }

    pub fn authenticated(&self) -> bool {
        self.integrity_algorithm != IntegrityAlgorithm::None
    }

    pub fn encrypted(&self) -> bool {
        self.confidentiality.encrypted()
    }

    /// Append the v2 session wrapper and `payload` to `buffer`, which
    /// must already hold the RMCP envelope.
    pub fn write(&self, payload: &V2Payload, buffer: &mut Vec<u8>) -> Result<(), WriteError> {
        assert_eq!(buffer.len(), 4, "Buffer must only contain the RMCP header.");

        if payload.payload.len() > u16::MAX as usize {
            return Err(WriteError::PayloadTooLong);
        }

        buffer.push(FORMAT_IPMI_V2_0);

        let encrypted = (self.encrypted() as u8) << 7;
        let authenticated = (self.authenticated() as u8) << 6;
        let flags = encrypted | authenticated;

        match payload.ty {
            PayloadType::OemExplicit { iana, payload_id } => {
                buffer.push(flags | 0x02);
                buffer.extend_from_slice(&iana.to_le_bytes()[..3]);

                // 4th byte of the OEM IANA is reserved
                buffer.push(0);
                buffer.extend_from_slice(&payload_id.to_le_bytes());
            }
            ty => buffer.push(flags | ty.descriptor()),
        }

        buffer.extend_from_slice(&payload.session_id.to_le_bytes());
        buffer.extend_from_slice(&payload.session_sequence_number.to_le_bytes());

        let wrapped = self.confidentiality.wrap(&payload.payload);
        if wrapped.len() > u16::MAX as usize {
            return Err(WriteError::EncryptedPayloadTooLong);
        }

        buffer.extend_from_slice(&(wrapped.len() as u16).to_le_bytes());
        buffer.extend_from_slice(&wrapped);

        self.write_trailer(buffer);

        Ok(())
    }

    fn write_trailer(&self, buffer: &mut Vec<u8>) {
        // The session trailer is only present on authenticated packets.
        if !self.authenticated() {
            return;
        }

        // + 2 because pad length and next header are also covered by
        // the integrity checksum.
        let auth_code_data_len = buffer[4..].len() + 2;

        // Integrity PAD
        let pad_length = (4 - auth_code_data_len % 4) % 4;

        buffer.extend(std::iter::repeat(0xFF).take(pad_length));
        buffer.push(pad_length as u8);
        buffer.push(NEXT_HEADER);

        let mut hasher = self.integrity_hasher.clone();
        hasher.update(&buffer[4..]);
        buffer.extend_from_slice(&hasher.finalize());
    }

    /// Check the ICV and strip the trailer, returning the
    /// authenticated region up to the end of the payload length field's
    /// coverage.
    fn validate_trailer<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], CryptoUnwrapError> {
        if !self.authenticated() {
            return Ok(data);
        }

        let icv_len = self.integrity_hasher.icv_len();
        if data.len() < icv_len + 2 {
            return Err(CryptoUnwrapError::IncorrectIntegrityTrailerLen);
        }

        let (data, icv) = data.split_at(data.len() - icv_len);

        let mut hasher = self.integrity_hasher.clone();
        hasher.update(data);
        if hasher.finalize() != icv {
            return Err(CryptoUnwrapError::AuthCodeMismatch);
        }

        let pad_len = data[data.len() - 2] as usize;
        let next_header = data[data.len() - 1];

        if next_header != NEXT_HEADER {
            return Err(CryptoUnwrapError::UnknownNextHeader(next_header));
        }

        // The pad fills to a 4-byte multiple, so it is at most 3 bytes.
        if pad_len > 3 || pad_len + 2 > data.len() {
            return Err(CryptoUnwrapError::InconsistentPadLength);
        }

        Ok(&data[..data.len() - 2 - pad_len])
    }

    /// Decode a v2 session packet; `data` starts at the AuthType byte.
    ///
    /// The ICV is verified before any inner byte is interpreted.
    pub fn read(&self, data: &[u8]) -> Result<V2Payload, ReadError> {
        if data.len() < 12 {
            return Err(ReadError::NotEnoughData);
        }

        if data[0] != FORMAT_IPMI_V2_0 {
            return Err(ReadError::NotIpmiV2_0);
        }

        let encrypted = (data[1] & 0x80) == 0x80;
        let authenticated = (data[1] & 0x40) == 0x40;

        if self.encrypted() != encrypted {
            return Err(CryptoUnwrapError::MismatchingEncryptionState.into());
        }

        if self.authenticated() != authenticated {
            return Err(CryptoUnwrapError::MismatchingAuthenticationState.into());
        }

        let data = self.validate_trailer(data)?;
        if data.len() < 2 {
            return Err(ReadError::NotEnoughData);
        }

        let descriptor = data[1] & 0x3F;
        let (ty, data) = if descriptor == 0x02 {
            if data.len() < 8 {
                return Err(ReadError::NotEnoughData);
            }

            let mut iana = [0u8; 4];
            iana[..3].copy_from_slice(&data[2..5]);

            let payload_id = u16::from_le_bytes(data[6..8].try_into().unwrap());

            (
                PayloadType::OemExplicit {
                    iana: u32::from_le_bytes(iana),
                    payload_id,
                },
                &data[8..],
            )
        } else {
            let ty = PayloadType::try_from(descriptor)
                .map_err(|_| ReadError::InvalidPayloadType(descriptor))?;
            (ty, &data[2..])
        };

        if data.len() < 10 {
            return Err(ReadError::NotEnoughData);
        }

        let session_id = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let session_sequence_number = u32::from_le_bytes(data[4..8].try_into().unwrap());

        let payload_len = u16::from_le_bytes(data[8..10].try_into().unwrap());
        let data = &data[10..];

        if payload_len as usize != data.len() {
            return Err(CryptoUnwrapError::IncorrectPayloadLen.into());
        }

        let payload = self.confidentiality.unwrap(data)?;

        Ok(V2Payload {
            ty,
            session_id,
            session_sequence_number,
            payload,
        })
    }
}
