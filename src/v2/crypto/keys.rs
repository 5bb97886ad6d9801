use super::AuthenticationAlgorithm;

/// The session integrity key and the key material derived from it.
///
/// K₁ keys the integrity hasher, K₂ the confidentiality codec (its
/// first 16 bytes are the AES key). K₃ is derived for completeness and
/// exposed through [`Keys::k`].
pub struct Keys {
    sik: Vec<u8>,
    k1: Vec<u8>,
    k2: Vec<u8>,
    k3: Vec<u8>,
    aes_key: Option<[u8; 16]>,
}

impl core::fmt::Debug for Keys {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Keys").finish()
    }
}

impl Keys {
    /// Derive K₁..K₃ from the session integrity key.
    ///
    /// Kₙ is the authentication algorithm's MAC of the byte `n`
    /// repeated twenty times, keyed with the SIK.
    pub fn derive(algorithm: AuthenticationAlgorithm, sik: Vec<u8>) -> Self {
        let k1 = algorithm.mac(&sik, &[&[0x01; 20]]);
        let k2 = algorithm.mac(&sik, &[&[0x02; 20]]);
        let k3 = algorithm.mac(&sik, &[&[0x03; 20]]);

        let aes_key = if k2.len() >= 16 {
            Some(<[u8; 16]>::try_from(&k2[..16]).unwrap())
        } else {
            None
        };

        Self {
            sik,
            k1,
            k2,
            k3,
            aes_key,
        }
    }

    pub fn sik(&self) -> &[u8] {
        &self.sik
    }

    pub fn k1(&self) -> &[u8] {
        &self.k1
    }

    pub fn k2(&self) -> &[u8] {
        &self.k2
    }

    /// Kₙ for `n` in `1..=3`, for information purposes.
    pub fn k(&self, n: u8) -> Option<&[u8]> {
        match n {
            1 => Some(&self.k1),
            2 => Some(&self.k2),
            3 => Some(&self.k3),
            _ => None,
        }
    }

    /// The AES-CBC-128 key, if K₂ provides enough material.
    pub(crate) fn aes_key(&self) -> Option<&[u8; 16]> {
        self.aes_key.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_k1_and_k2_from_sik() {
        // SIK for (password "admin", fixed randoms, role 0x14, user
        // "admin"); expected keys computed with an independent HMAC
        // implementation.
        let sik = vec![
            0xed, 0x3b, 0xf2, 0x23, 0x3b, 0xbd, 0xd2, 0xbd, 0x31, 0x4c, 0x5f, 0x2d, 0xce, 0xbe,
            0x36, 0x09, 0x3c, 0xaa, 0x83, 0xf8,
        ];

        let keys = Keys::derive(AuthenticationAlgorithm::RakpHmacSha1, sik);

        let k1 = [
            0x51, 0x3b, 0xcc, 0x47, 0xc4, 0x3b, 0x99, 0xb9, 0xc9, 0x78, 0xb5, 0x0d, 0x58, 0xd6,
            0xa9, 0x4d, 0xdf, 0x0d, 0x94, 0x13,
        ];
        let k2 = [
            0x2d, 0xc1, 0xb9, 0x94, 0x18, 0x69, 0xce, 0x0a, 0x77, 0xdd, 0x90, 0x4b, 0xc1, 0x98,
            0xa5, 0xf3, 0x5e, 0xaa, 0x16, 0xf5,
        ];

        assert_eq!(keys.k1(), k1);
        assert_eq!(keys.k2(), k2);
        assert_eq!(keys.k(1), Some(&k1[..]));
        assert_eq!(keys.aes_key(), Some(&<[u8; 16]>::try_from(&k2[..16]).unwrap()));
    }

    #[test]
    fn rakp_none_leaves_no_key_material() {
        let keys = Keys::derive(AuthenticationAlgorithm::RakpNone, Vec::new());

        assert!(keys.k1().is_empty());
        assert_eq!(keys.aes_key(), None);
    }
}
