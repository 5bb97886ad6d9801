use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;

use super::UnsupportedAlgorithm;

/// The integrity algorithm negotiated for in-session packets.
///
/// Authenticated packets carry an ICV trailer of [`icv_len`] bytes,
/// produced by an [`IntegrityHasher`] keyed with K₁.
///
/// [`icv_len`]: IntegrityAlgorithm::icv_len
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntegrityAlgorithm {
    None,
    HmacSha1_96,
    HmacMd5_128,
    Md5_128,
    HmacSha256_128,
}

impl TryFrom<u8> for IntegrityAlgorithm {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let value = match value {
            0x00 => Self::None,
            0x01 => Self::HmacSha1_96,
            0x02 => Self::HmacMd5_128,
            0x03 => Self::Md5_128,
            0x04 => Self::HmacSha256_128,
            _ => return Err(()),
        };

        Ok(value)
    }
}

impl From<IntegrityAlgorithm> for u8 {
    fn from(value: IntegrityAlgorithm) -> Self {
        match value {
            IntegrityAlgorithm::None => 0x00,
            IntegrityAlgorithm::HmacSha1_96 => 0x01,
            IntegrityAlgorithm::HmacMd5_128 => 0x02,
            IntegrityAlgorithm::Md5_128 => 0x03,
            IntegrityAlgorithm::HmacSha256_128 => 0x04,
        }
    }
}

impl IntegrityAlgorithm {
    /// Length of the ICV trailer on authenticated packets.
    pub fn icv_len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::HmacSha1_96 => 12,
            Self::HmacMd5_128 => 16,
            Self::Md5_128 => 16,
            Self::HmacSha256_128 => 16,
        }
    }

    /// Build a hasher keyed with `key` (K₁ for session packets).
    ///
    /// `Md5_128` is password-keyed plain MD5 rather than an HMAC and is
    /// not supported; selecting it fails here, at session setup.
    pub fn hasher(&self, key: &[u8]) -> Result<IntegrityHasher, UnsupportedAlgorithm> {
        let hasher = match self {
            Self::None => IntegrityHasher::Null,
            Self::HmacSha1_96 => IntegrityHasher::Sha1(
                <Hmac<Sha1> as Mac>::new_from_slice(key)
                    .expect("HMAC initialization accepts any key length"),
            ),
            Self::HmacMd5_128 => IntegrityHasher::Md5(
                <Hmac<Md5> as Mac>::new_from_slice(key)
                    .expect("HMAC initialization accepts any key length"),
            ),
            Self::HmacSha256_128 => IntegrityHasher::Sha256(
                <Hmac<Sha256> as Mac>::new_from_slice(key)
                    .expect("HMAC initialization accepts any key length"),
            ),
            Self::Md5_128 => return Err(UnsupportedAlgorithm::Integrity(*self)),
        };

        Ok(hasher)
    }
}

/// A keyed, streaming ICV computation.
///
/// Feed the authenticated region with [`update`], then [`finalize`] to
/// get the truncated ICV. The session keeps one keyed instance and
/// clones it per packet.
///
/// [`update`]: IntegrityHasher::update
/// [`finalize`]: IntegrityHasher::finalize
#[derive(Clone)]
pub enum IntegrityHasher {
    Null,
    Sha1(Hmac<Sha1>),
    Md5(Hmac<Md5>),
    Sha256(Hmac<Sha256>),
}

impl core::fmt::Debug for IntegrityHasher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Null => "Null",
            Self::Sha1(_) => "Sha1",
            Self::Md5(_) => "Md5",
            Self::Sha256(_) => "Sha256",
        };

        f.debug_tuple(name).finish()
    }
}

impl IntegrityHasher {
    pub fn icv_len(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::Sha1(_) => 12,
            Self::Md5(_) => 16,
            Self::Sha256(_) => 16,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Null => {}
            Self::Sha1(mac) => mac.update(data),
            Self::Md5(mac) => mac.update(data),
            Self::Sha256(mac) => mac.update(data),
        }
    }

    /// Produce the ICV, truncated to this algorithm's trailer length.
    pub fn finalize(self) -> Vec<u8> {
        let truncation = self.icv_len();

        let mut icv = match self {
            Self::Null => Vec::new(),
            Self::Sha1(mac) => mac.finalize().into_bytes().to_vec(),
            Self::Md5(mac) => mac.finalize().into_bytes().to_vec(),
            Self::Sha256(mac) => mac.finalize().into_bytes().to_vec(),
        };

        icv.truncate(truncation);
        icv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icv_is_truncated_to_algorithm_length() {
        let mut hasher = IntegrityAlgorithm::HmacSha1_96.hasher(&[0x0B; 20]).unwrap();
        hasher.update(b"some authenticated region");
        assert_eq!(hasher.clone().finalize().len(), 12);

        let mut hasher = IntegrityAlgorithm::HmacSha256_128
            .hasher(&[0x0B; 20])
            .unwrap();
        hasher.update(b"some authenticated region");
        assert_eq!(hasher.finalize().len(), 16);
    }

    #[test]
    fn cloned_hashers_are_independent() {
        let template = IntegrityAlgorithm::HmacSha1_96.hasher(b"key").unwrap();

        let mut first = template.clone();
        first.update(b"one");
        let mut second = template;
        second.update(b"two");

        assert_ne!(first.finalize(), second.finalize());
    }

    #[test]
    fn md5_128_is_rejected() {
        assert_eq!(
            IntegrityAlgorithm::Md5_128.hasher(b"key").unwrap_err(),
            UnsupportedAlgorithm::Integrity(IntegrityAlgorithm::Md5_128)
        );
    }

    #[test]
    fn null_hasher_produces_no_icv() {
        let mut hasher = IntegrityAlgorithm::None.hasher(&[]).unwrap();
        hasher.update(b"ignored");
        assert!(hasher.finalize().is_empty());
    }
}
