use hmac::{digest::KeyInit, Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;

/// The RAKP authentication algorithm negotiated for session
/// establishment.
///
/// It drives every HMAC of the key exchange: the RAKP 2 and 3 auth
/// codes, the RAKP 4 integrity check and the derivation of the session
/// integrity key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuthenticationAlgorithm {
    RakpNone,
    RakpHmacSha1,
    RakpHmacMd5,
    RakpHmacSha256,
}

impl TryFrom<u8> for AuthenticationAlgorithm {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let value = match value {
            0x00 => Self::RakpNone,
            0x01 => Self::RakpHmacSha1,
            0x02 => Self::RakpHmacMd5,
            0x03 => Self::RakpHmacSha256,
            _ => return Err(()),
        };

        Ok(value)
    }
}

impl From<AuthenticationAlgorithm> for u8 {
    fn from(value: AuthenticationAlgorithm) -> Self {
        match value {
            AuthenticationAlgorithm::RakpNone => 0x00,
            AuthenticationAlgorithm::RakpHmacSha1 => 0x01,
            AuthenticationAlgorithm::RakpHmacMd5 => 0x02,
            AuthenticationAlgorithm::RakpHmacSha256 => 0x03,
        }
    }
}

fn keyed_mac<M: Mac + KeyInit>(key: &[u8], chunks: &[&[u8]]) -> Vec<u8> {
    let mut mac =
        <M as Mac>::new_from_slice(key).expect("HMAC initialization accepts any key length");

    for chunk in chunks {
        mac.update(chunk);
    }

    mac.finalize().into_bytes().to_vec()
}

impl AuthenticationAlgorithm {
    /// Length of the MACs this algorithm produces.
    pub fn mac_len(&self) -> usize {
        match self {
            Self::RakpNone => 0,
            Self::RakpHmacSha1 => 20,
            Self::RakpHmacMd5 => 16,
            Self::RakpHmacSha256 => 32,
        }
    }

    /// Length the user key material is null-padded to before use.
    ///
    /// HMAC zero-extends short keys itself, so this only matters to
    /// callers that store or compare key material.
    pub fn key_material_len(&self) -> usize {
        match self {
            Self::RakpNone => 0,
            Self::RakpHmacSha1 => 20,
            Self::RakpHmacMd5 => 16,
            Self::RakpHmacSha256 => 20,
        }
    }

    /// Length of the integrity check value carried by RAKP message 4.
    pub fn rakp4_icv_len(&self) -> usize {
        match self {
            Self::RakpNone => 0,
            Self::RakpHmacSha1 => 12,
            Self::RakpHmacMd5 => 16,
            Self::RakpHmacSha256 => 16,
        }
    }

    /// Apply this algorithm's MAC to `chunks`, keyed with `key`.
    ///
    /// `RakpNone` produces an empty MAC.
    pub fn mac(&self, key: &[u8], chunks: &[&[u8]]) -> Vec<u8> {
        match self {
            Self::RakpNone => Vec::new(),
            Self::RakpHmacSha1 => keyed_mac::<Hmac<Sha1>>(key, chunks),
            Self::RakpHmacMd5 => keyed_mac::<Hmac<Md5>>(key, chunks),
            Self::RakpHmacSha256 => keyed_mac::<Hmac<Sha256>>(key, chunks),
        }
    }
}

/// The auth code the BMC must present in RAKP message 2.
///
/// Covers both session IDs, both random numbers, the BMC GUID and the
/// requested role and username, keyed with the user password.
#[allow(clippy::too_many_arguments)]
pub fn rakp2_auth_code(
    algorithm: AuthenticationAlgorithm,
    password: &[u8],
    remote_console_session_id: u32,
    managed_system_session_id: u32,
    remote_console_random_number: &[u8; 16],
    managed_system_random_number: &[u8; 16],
    managed_system_guid: &[u8; 16],
    role: u8,
    username: &[u8],
) -> Vec<u8> {
    algorithm.mac(
        password,
        &[
            &remote_console_session_id.to_le_bytes(),
            &managed_system_session_id.to_le_bytes(),
            remote_console_random_number,
            managed_system_random_number,
            managed_system_guid,
            &[role, username.len() as u8],
            username,
        ],
    )
}

/// The auth code we send in RAKP message 3.
pub fn rakp3_auth_code(
    algorithm: AuthenticationAlgorithm,
    password: &[u8],
    managed_system_random_number: &[u8; 16],
    remote_console_session_id: u32,
    role: u8,
    username: &[u8],
) -> Vec<u8> {
    algorithm.mac(
        password,
        &[
            managed_system_random_number,
            &remote_console_session_id.to_le_bytes(),
            &[role, username.len() as u8],
            username,
        ],
    )
}

/// The session integrity key, from which K₁ and K₂ are derived.
///
/// Keyed with K_G where one is configured, otherwise the user password.
pub fn session_integrity_key(
    algorithm: AuthenticationAlgorithm,
    generator_key: &[u8],
    remote_console_random_number: &[u8; 16],
    managed_system_random_number: &[u8; 16],
    role: u8,
    username: &[u8],
) -> Vec<u8> {
    algorithm.mac(
        generator_key,
        &[
            remote_console_random_number,
            managed_system_random_number,
            &[role, username.len() as u8],
            username,
        ],
    )
}

/// The integrity check value the BMC must present in RAKP message 4,
/// truncated to this algorithm's RAKP 4 length.
pub fn rakp4_integrity_check(
    algorithm: AuthenticationAlgorithm,
    sik: &[u8],
    remote_console_random_number: &[u8; 16],
    managed_system_session_id: u32,
    managed_system_guid: &[u8; 16],
) -> Vec<u8> {
    let mut mac = algorithm.mac(
        sik,
        &[
            remote_console_random_number,
            &managed_system_session_id.to_le_bytes(),
            managed_system_guid,
        ],
    );

    mac.truncate(algorithm.rakp4_icv_len());
    mac
}
