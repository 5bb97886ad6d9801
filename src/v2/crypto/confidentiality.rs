use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use super::{CryptoUnwrapError, Keys, UnsupportedAlgorithm};

/// The confidentiality algorithm negotiated for in-session packets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfidentialityAlgorithm {
    None,
    AesCbc128,
    Xrc4_128,
    Xrc4_40,
}

impl TryFrom<u8> for ConfidentialityAlgorithm {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let value = match value {
            0x00 => Self::None,
            0x01 => Self::AesCbc128,
            0x02 => Self::Xrc4_128,
            0x03 => Self::Xrc4_40,
            _ => return Err(()),
        };

        Ok(value)
    }
}

impl From<ConfidentialityAlgorithm> for u8 {
    fn from(value: ConfidentialityAlgorithm) -> Self {
        match value {
            ConfidentialityAlgorithm::None => 0x00,
            ConfidentialityAlgorithm::AesCbc128 => 0x01,
            ConfidentialityAlgorithm::Xrc4_128 => 0x02,
            ConfidentialityAlgorithm::Xrc4_40 => 0x03,
        }
    }
}

/// The confidentiality sub-layer of session payloads.
///
/// [`wrap`] produces the encrypted form: a fresh 16-byte IV, the
/// ciphertext of the plaintext plus an ascending 0x01, 0x02, … pad and
/// a pad-length byte, everything sized to a block multiple. [`unwrap`]
/// reverses it and checks the pad form. The `None` codec passes data
/// through unchanged.
///
/// [`wrap`]: ConfidentialityCodec::wrap
/// [`unwrap`]: ConfidentialityCodec::unwrap
#[derive(Clone)]
pub enum ConfidentialityCodec {
    None,
    AesCbc128 { key: [u8; 16] },
}

impl core::fmt::Debug for ConfidentialityCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::AesCbc128 { .. } => "AesCbc128",
        };

        f.debug_tuple(name).finish()
    }
}

impl ConfidentialityCodec {
    /// Build the codec for `algorithm`, keyed from K₂.
    ///
    /// The xRC4 variants are valid on the wire but not implemented;
    /// selecting one fails here, at session setup.
    pub fn new(
        algorithm: ConfidentialityAlgorithm,
        keys: &Keys,
    ) -> Result<Self, UnsupportedAlgorithm> {
        match algorithm {
            ConfidentialityAlgorithm::None => Ok(Self::None),
            ConfidentialityAlgorithm::AesCbc128 => keys
                .aes_key()
                .map(|key| Self::AesCbc128 { key: *key })
                .ok_or(UnsupportedAlgorithm::MissingKeyMaterial),
            ConfidentialityAlgorithm::Xrc4_128 | ConfidentialityAlgorithm::Xrc4_40 => {
                Err(UnsupportedAlgorithm::Confidentiality(algorithm))
            }
        }
    }

    pub fn algorithm(&self) -> ConfidentialityAlgorithm {
        match self {
            Self::None => ConfidentialityAlgorithm::None,
            Self::AesCbc128 { .. } => ConfidentialityAlgorithm::AesCbc128,
        }
    }

    pub fn encrypted(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Encrypt `plaintext` into its on-wire form.
    pub fn wrap(&self, plaintext: &[u8]) -> Vec<u8> {
        let key = match self {
            Self::None => return plaintext.to_vec(),
            Self::AesCbc128 { key } => key,
        };

        let mut iv = [0u8; 16];
        getrandom::getrandom(&mut iv).unwrap();

        // Pad so that plaintext + pad + pad-length byte fill whole
        // blocks.
        let pad_len = (16 - (plaintext.len() + 1) % 16) % 16;

        let mut output = Vec::with_capacity(16 + plaintext.len() + pad_len + 1);
        output.extend_from_slice(&iv);
        output.extend_from_slice(plaintext);
        output.extend((1u8..).take(pad_len));
        output.push(pad_len as u8);

        let encryptor = cbc::Encryptor::<aes::Aes128>::new(key.into(), &iv.into());

        let body = &mut output[16..];
        let body_len = body.len();
        encryptor
            .encrypt_padded_mut::<NoPadding>(body, body_len)
            .unwrap();

        output
    }

    /// Decrypt on-wire `data` back into the plaintext.
    pub fn unwrap(&self, data: &[u8]) -> Result<Vec<u8>, CryptoUnwrapError> {
        let key = match self {
            Self::None => return Ok(data.to_vec()),
            Self::AesCbc128 { key } => key,
        };

        if data.len() < 32 {
            return Err(CryptoUnwrapError::NotEnoughData);
        }

        let (iv, ciphertext) = data.split_at(16);
        if ciphertext.len() % 16 != 0 {
            return Err(CryptoUnwrapError::CiphertextNotBlockAligned);
        }

        let iv = <[u8; 16]>::try_from(iv).unwrap();
        let decryptor = cbc::Decryptor::<aes::Aes128>::new(key.into(), &iv.into());

        let mut buffer = ciphertext.to_vec();
        decryptor
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .unwrap();

        let pad_len = buffer[buffer.len() - 1] as usize;
        if pad_len + 1 > buffer.len() {
            return Err(CryptoUnwrapError::IncorrectConfidentialityTrailerLen);
        }

        let plaintext_len = buffer.len() - 1 - pad_len;
        let (plaintext, pad) = buffer.split_at(plaintext_len);

        if pad[..pad_len].iter().zip(1u8..).any(|(l, r)| *l != r) {
            return Err(CryptoUnwrapError::InvalidConfidentialityTrailer);
        }

        Ok(plaintext.to_vec())
    }
}
