use std::{num::NonZeroU32, time::Duration};

use crate::{
    context::Context,
    metrics::{NoOpObserver, SessionObserver},
    rmcp::{RmcpClass, RmcpError, RmcpHeader},
    transport::{Transport, TransportError},
};

use super::{
    backoff::Backoff,
    crypto::{
        self, AuthenticationAlgorithm, ConfidentialityAlgorithm, IntegrityAlgorithm, Keys,
        UnsupportedAlgorithm,
    },
    messages::{
        OpenSessionRequest, OpenSessionResponse, ParseOpenSessionResponseError, RakpMessage1,
        RakpMessage2, RakpMessage2ParseError, RakpMessage3, RakpMessage4, RakpMessage4ParseError,
        RakpStatusCode, Username,
    },
    session::{SequenceNumbers, Session},
    wire::{PacketCodec, ReadError, WriteError},
    BackoffConfig, PayloadType, PrivilegeLevel, V2Payload,
};

/// Ordered algorithm preferences for session negotiation.
///
/// Every listed algorithm is proposed in the Open Session request, most
/// preferred first; the BMC's pick must be among them. An empty list
/// sends the wildcard entry, accepting whatever the BMC chooses.
#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmPreferences {
    pub authentication: Vec<AuthenticationAlgorithm>,
    pub integrity: Vec<IntegrityAlgorithm>,
    pub confidentiality: Vec<ConfidentialityAlgorithm>,
}

impl Default for AlgorithmPreferences {
    fn default() -> Self {
        Self {
            authentication: vec![
                AuthenticationAlgorithm::RakpHmacSha1,
                AuthenticationAlgorithm::RakpHmacSha256,
            ],
            integrity: vec![
                IntegrityAlgorithm::HmacSha1_96,
                IntegrityAlgorithm::HmacSha256_128,
            ],
            confidentiality: vec![ConfidentialityAlgorithm::AesCbc128],
        }
    }
}

impl AlgorithmPreferences {
    /// Propose nothing concrete; let the BMC choose everything.
    pub fn any() -> Self {
        Self {
            authentication: Vec::new(),
            integrity: Vec::new(),
            confidentiality: Vec::new(),
        }
    }

    fn accepts<A: PartialEq>(proposed: &[A], negotiated: &A) -> bool {
        proposed.is_empty() || proposed.contains(negotiated)
    }
}

/// Everything needed to establish a session.
pub struct SessionConfig {
    pub username: Username,
    password: Vec<u8>,
    kg: Option<Vec<u8>>,
    pub privilege_level: PrivilegeLevel,
    pub preferences: AlgorithmPreferences,
    /// Per-attempt reply deadline.
    pub attempt_timeout: Duration,
    pub backoff: BackoffConfig,
    pub observer: Box<dyn SessionObserver>,
}

impl core::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("kg", &self.kg.as_ref().map(|_| "<redacted>"))
            .field("privilege_level", &self.privilege_level)
            .field("preferences", &self.preferences)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl SessionConfig {
    pub fn new(username: Username, password: &[u8]) -> Self {
        Self {
            username,
            password: password.to_vec(),
            kg: None,
            privilege_level: PrivilegeLevel::Administrator,
            preferences: AlgorithmPreferences::default(),
            attempt_timeout: Duration::from_secs(2),
            backoff: BackoffConfig::default(),
            observer: Box::new(NoOpObserver),
        }
    }

    /// Use the BMC key K_G instead of the user password for SIK
    /// derivation.
    pub fn with_kg(mut self, kg: &[u8]) -> Self {
        self.kg = Some(kg.to_vec());
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn generator_key(&self) -> &[u8] {
        self.kg.as_deref().unwrap_or(&self.password)
    }
}

/// Which handshake exchange an [`EstablishError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HandshakeStep {
    OpenSession,
    Rakp1,
    Rakp2,
    Rakp3,
    Rakp4,
}

/// Why session establishment failed.
#[derive(Debug)]
pub enum HandshakeFailure<E> {
    /// The exchange's transport attempts were exhausted (or the
    /// context was cancelled or expired).
    Transport(TransportError<E>),
    /// The request could not be serialized.
    Write(WriteError),
    /// The final reply had a malformed RMCP envelope.
    Envelope(RmcpError),
    /// The final reply failed v2 wrapper decode.
    Read(ReadError),
    /// The final reply was not an IPMI-class RMCP message.
    UnexpectedRmcpClass(RmcpClass),
    /// The final reply carried the wrong payload type.
    UnexpectedPayloadType(PayloadType),
    /// The final reply echoed a tag we never sent.
    TagMismatch,
    OpenSessionParse(ParseOpenSessionResponseError),
    Rakp2Parse(RakpMessage2ParseError),
    Rakp4Parse(RakpMessage4ParseError),
    /// The BMC reported a non-zero status code.
    ErrorStatus(u8),
    /// A response carried a session ID we never allocated.
    SessionIdMismatch,
    /// The BMC selected an algorithm that was not among our proposals.
    AlgorithmNotProposed,
    /// The negotiated suite is valid but not supported by this crate.
    Unsupported(UnsupportedAlgorithm),
    /// The RAKP 2 key exchange auth code did not verify: wrong
    /// password, or a BMC we should not trust.
    KeyExchangeAuthCodeMismatch,
    /// The RAKP 4 integrity check value did not verify.
    IntegrityCheckValueMismatch,
}

impl<E> HandshakeFailure<E> {
    /// The BMC-reported status code, decoded where it is a known RMCP+
    /// status, for failures that carry one.
    pub fn status_code(&self) -> Option<Result<RakpStatusCode, u8>> {
        match self {
            Self::ErrorStatus(code) => {
                Some(RakpStatusCode::try_from(*code).map_err(|_| *code))
            }
            _ => None,
        }
    }
}

/// An aggregate establishment failure: the handshake step it happened
/// in, and the cause.
#[derive(Debug)]
pub struct EstablishError<E> {
    pub step: HandshakeStep,
    pub failure: HandshakeFailure<E>,
}

fn fail<E, T>(step: HandshakeStep, failure: HandshakeFailure<E>) -> Result<T, EstablishError<E>> {
    Err(EstablishError { step, failure })
}

/// Send one pre-session payload and await the reply of `expected` type
/// carrying `expected_tag`, retrying with backoff.
///
/// Packets of the wrong type or with a foreign tag are unrelated; they
/// are logged, dropped, and the attempt retried.
fn exchange<T: Transport>(
    transport: &mut T,
    ctx: &Context,
    backoff: &mut Backoff,
    attempt_timeout: Duration,
    request: &V2Payload,
    expected: PayloadType,
    expected_tag: u8,
) -> Result<Vec<u8>, HandshakeFailure<T::Error>> {
    let codec = PacketCodec::plaintext();

    let mut packet = Vec::new();
    RmcpHeader::new_ipmi().write(&mut packet);
    codec
        .write(request, &mut packet)
        .map_err(HandshakeFailure::Write)?;

    backoff.reset();
    let mut first_attempt = true;

    loop {
        ctx.check()
            .map_err(|e| HandshakeFailure::Transport(e.into()))?;

        if !first_attempt {
            log::debug!("Retrying {expected:?} exchange");
        }
        first_attempt = false;

        let failure = 'attempt: {
            let attempt_ctx = ctx.bounded(attempt_timeout);

            let reply = match transport.send(&attempt_ctx, &packet) {
                Ok(reply) => reply,
                Err(TransportError::Cancelled) => {
                    return Err(HandshakeFailure::Transport(TransportError::Cancelled))
                }
                Err(e) => break 'attempt HandshakeFailure::Transport(e),
            };

            let (header, rest) = match RmcpHeader::from_data(&reply) {
                Ok(v) => v,
                Err(e) => break 'attempt HandshakeFailure::Envelope(e),
            };

            if header.class != RmcpClass::Ipmi {
                log::debug!("Dropping non-IPMI RMCP packet ({:?})", header.class);
                break 'attempt HandshakeFailure::UnexpectedRmcpClass(header.class);
            }

            let payload = match codec.read(rest) {
                Ok(payload) => payload,
                Err(e) => break 'attempt HandshakeFailure::Read(e),
            };

            if payload.ty != expected {
                log::debug!("Dropping unexpected payload type {:?}", payload.ty);
                break 'attempt HandshakeFailure::UnexpectedPayloadType(payload.ty);
            }

            if payload.payload.first() != Some(&expected_tag) {
                log::debug!(
                    "Dropping {:?} with mismatched tag {:?}",
                    expected,
                    payload.payload.first()
                );
                break 'attempt HandshakeFailure::TagMismatch;
            }

            return Ok(payload.payload);
        };

        let Some(delay) = backoff.next_delay() else {
            return Err(failure);
        };

        ctx.sleep(delay)
            .map_err(|e| HandshakeFailure::Transport(e.into()))?;
    }
}

impl<T: Transport> Session<T> {
    /// Establish an RMCP+ session: Open Session, then RAKP 1 through 4.
    ///
    /// Each response is validated before the next step; any BMC error
    /// status, verification failure, or exhausted exchange aborts with
    /// the step it happened in. On success the returned session is
    /// ready for [`send_command`].
    ///
    /// [`send_command`]: Session::send_command
    pub fn establish(
        mut transport: T,
        ctx: &Context,
        config: SessionConfig,
    ) -> Result<Self, EstablishError<T::Error>> {
        use HandshakeFailure as F;
        use HandshakeStep as Step;

        let mut backoff = Backoff::new(config.backoff);

        let mut id_bytes = [0u8; 4];
        getrandom::getrandom(&mut id_bytes).unwrap();
        let remote_console_session_id =
            NonZeroU32::new(u32::from_le_bytes(id_bytes)).unwrap_or(NonZeroU32::MIN);

        // Open Session

        let open_session_request = OpenSessionRequest {
            message_tag: 0x00,
            requested_max_privilege: Some(config.privilege_level),
            remote_console_session_id,
            authentication_algorithms: config.preferences.authentication.clone(),
            integrity_algorithms: config.preferences.integrity.clone(),
            confidentiality_algorithms: config.preferences.confidentiality.clone(),
        };

        let mut request_data = Vec::new();
        open_session_request.write_data(&mut request_data);

        let response_data = exchange(
            &mut transport,
            ctx,
            &mut backoff,
            config.attempt_timeout,
            &V2Payload {
                ty: PayloadType::OpenSessionRequest,
                session_id: 0,
                session_sequence_number: 0,
                payload: request_data,
            },
            PayloadType::OpenSessionResponse,
            open_session_request.message_tag,
        )
        .map_err(|failure| EstablishError {
            step: Step::OpenSession,
            failure,
        })?;

        let response = match OpenSessionResponse::from_data(&response_data) {
            Ok(response) => response,
            Err(ParseOpenSessionResponseError::ErrorStatus(code)) => {
                return fail(Step::OpenSession, F::ErrorStatus(code))
            }
            Err(e) => return fail(Step::OpenSession, F::OpenSessionParse(e)),
        };

        if response.remote_console_session_id != remote_console_session_id {
            return fail(Step::OpenSession, F::SessionIdMismatch);
        }

        let authentication = response.authentication_algorithm;
        let integrity = response.integrity_algorithm;
        let confidentiality = response.confidentiality_algorithm;
        let managed_system_session_id = response.managed_system_session_id;

        let accepted = AlgorithmPreferences::accepts(
            &config.preferences.authentication,
            &authentication,
        ) && AlgorithmPreferences::accepts(&config.preferences.integrity, &integrity)
            && AlgorithmPreferences::accepts(&config.preferences.confidentiality, &confidentiality);

        if !accepted {
            return fail(Step::OpenSession, F::AlgorithmNotProposed);
        }

        // Reject suites we cannot run before any key exchange happens.
        if let Err(e) = integrity.hasher(&[0u8; 20]) {
            return fail(Step::OpenSession, F::Unsupported(e));
        }

        let negotiated_encryption = confidentiality != ConfidentialityAlgorithm::None;
        if matches!(
            confidentiality,
            ConfidentialityAlgorithm::Xrc4_128 | ConfidentialityAlgorithm::Xrc4_40
        ) {
            return fail(
                Step::OpenSession,
                F::Unsupported(UnsupportedAlgorithm::Confidentiality(confidentiality)),
            );
        }

        if negotiated_encryption && authentication == AuthenticationAlgorithm::RakpNone {
            return fail(
                Step::OpenSession,
                F::Unsupported(UnsupportedAlgorithm::MissingKeyMaterial),
            );
        }

        log::debug!(
            "Opened session {:08X}/{:08X}: {authentication:?}, {integrity:?}, {confidentiality:?}",
            remote_console_session_id,
            managed_system_session_id,
        );

        // RAKP 1 / RAKP 2

        let mut remote_console_random_number = [0u8; 16];
        getrandom::getrandom(&mut remote_console_random_number).unwrap();

        let rakp1 = RakpMessage1 {
            message_tag: 0x01,
            managed_system_session_id,
            remote_console_random_number,
            name_only_lookup: true,
            requested_maximum_privilege_level: config.privilege_level,
            username: config.username.clone(),
        };
        let role = rakp1.role_byte();

        let mut rakp1_data = Vec::new();
        rakp1.write(&mut rakp1_data);

        let rakp2_data = exchange(
            &mut transport,
            ctx,
            &mut backoff,
            config.attempt_timeout,
            &V2Payload {
                ty: PayloadType::RakpMessage1,
                session_id: 0,
                session_sequence_number: 0,
                payload: rakp1_data,
            },
            PayloadType::RakpMessage2,
            rakp1.message_tag,
        )
        .map_err(|failure| EstablishError {
            step: Step::Rakp1,
            failure,
        })?;

        let rakp2 = match RakpMessage2::from_data(&rakp2_data) {
            Ok(rakp2) => rakp2,
            Err(RakpMessage2ParseError::ErrorStatus(code)) => {
                return fail(Step::Rakp2, F::ErrorStatus(code))
            }
            Err(e) => return fail(Step::Rakp2, F::Rakp2Parse(e)),
        };

        if rakp2.remote_console_session_id != remote_console_session_id {
            return fail(Step::Rakp2, F::SessionIdMismatch);
        }

        let expected_auth_code = crypto::rakp2_auth_code(
            authentication,
            &config.password,
            remote_console_session_id.get(),
            managed_system_session_id.get(),
            &remote_console_random_number,
            &rakp2.managed_system_random_number,
            &rakp2.managed_system_guid,
            role,
            &config.username,
        );

        if rakp2.key_exchange_auth_code != expected_auth_code {
            return fail(Step::Rakp2, F::KeyExchangeAuthCodeMismatch);
        }

        let sik = crypto::session_integrity_key(
            authentication,
            config.generator_key(),
            &remote_console_random_number,
            &rakp2.managed_system_random_number,
            role,
            &config.username,
        );
        let keys = Keys::derive(authentication, sik);

        // RAKP 3 / RAKP 4

        let rakp3_auth_code = crypto::rakp3_auth_code(
            authentication,
            &config.password,
            &rakp2.managed_system_random_number,
            remote_console_session_id.get(),
            role,
            &config.username,
        );

        let rakp3 = RakpMessage3 {
            message_tag: 0x02,
            status_code: 0x00,
            managed_system_session_id,
            key_exchange_auth_code: Some(&rakp3_auth_code),
        };

        let mut rakp3_data = Vec::new();
        rakp3.write(&mut rakp3_data);

        let rakp4_data = exchange(
            &mut transport,
            ctx,
            &mut backoff,
            config.attempt_timeout,
            &V2Payload {
                ty: PayloadType::RakpMessage3,
                session_id: 0,
                session_sequence_number: 0,
                payload: rakp3_data,
            },
            PayloadType::RakpMessage4,
            rakp3.message_tag,
        )
        .map_err(|failure| EstablishError {
            step: Step::Rakp3,
            failure,
        })?;

        let rakp4 = match RakpMessage4::from_data(&rakp4_data) {
            Ok(rakp4) => rakp4,
            Err(e) => return fail(Step::Rakp4, F::Rakp4Parse(e)),
        };

        if rakp4.is_failure() {
            return fail(Step::Rakp4, F::ErrorStatus(rakp4.status_code));
        }

        if rakp4.remote_console_session_id != remote_console_session_id.get() {
            return fail(Step::Rakp4, F::SessionIdMismatch);
        }

        let expected_icv = crypto::rakp4_integrity_check(
            authentication,
            keys.sik(),
            &remote_console_random_number,
            managed_system_session_id.get(),
            &rakp2.managed_system_guid,
        );

        match rakp4.integrity_check_value {
            Some(icv) if icv == expected_icv.as_slice() => {}
            _ => return fail(Step::Rakp4, F::IntegrityCheckValueMismatch),
        }

        let codec = match PacketCodec::for_session(&keys, integrity, confidentiality) {
            Ok(codec) => codec,
            Err(e) => return fail(Step::Rakp4, F::Unsupported(e)),
        };

        config.observer.session_established();
        log::info!(
            "Established RMCP+ session {:08X} with BMC session {:08X}",
            remote_console_session_id,
            managed_system_session_id,
        );

        Ok(Session {
            transport,
            local_id: remote_console_session_id,
            remote_id: managed_system_session_id,
            authentication_algorithm: authentication,
            integrity_algorithm: integrity,
            confidentiality_algorithm: confidentiality,
            keys,
            codec,
            authenticated: SequenceNumbers::new(),
            unauthenticated: SequenceNumbers::new(),
            attempt_timeout: config.attempt_timeout,
            backoff,
            observer: config.observer,
        })
    }
}
