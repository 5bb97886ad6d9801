//! The negotiable RMCP+ algorithm families and their implementations.

mod authentication;
pub use authentication::{
    rakp2_auth_code, rakp3_auth_code, rakp4_integrity_check, session_integrity_key,
    AuthenticationAlgorithm,
};

mod confidentiality;
pub use confidentiality::{ConfidentialityAlgorithm, ConfidentialityCodec};

mod integrity;
pub use integrity::{IntegrityAlgorithm, IntegrityHasher};

mod keys;
pub use keys::Keys;

/// An algorithm that is valid on the wire but that this crate cannot
/// run a session with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnsupportedAlgorithm {
    Confidentiality(ConfidentialityAlgorithm),
    Integrity(IntegrityAlgorithm),
    /// The negotiated suite leaves no key material for the requested
    /// algorithm, e.g. AES with RAKP-none authentication.
    MissingKeyMaterial,
}

/// Failures while unwrapping a received session packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CryptoUnwrapError {
    NotEnoughData,
    MismatchingEncryptionState,
    MismatchingAuthenticationState,
    IncorrectPayloadLen,
    CiphertextNotBlockAligned,
    IncorrectConfidentialityTrailerLen,
    InvalidConfidentialityTrailer,
    IncorrectIntegrityTrailerLen,
    AuthCodeMismatch,
    InconsistentPadLength,
    UnknownNextHeader(u8),
}
