//! Full-session tests against a scripted in-memory BMC.
//!
//! The fake BMC terminates the handshake and the authenticated session
//! with its own HMAC calls, so these tests exercise the real packet
//! flow end to end: Open Session, RAKP 1-4, encrypted commands, and
//! teardown.

use std::{cell::RefCell, num::NonZeroU32, rc::Rc, time::Duration};

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::{
    commands::{CompletionCode, GetDeviceId, Message, NetFn, Operation, RawCommand},
    context::Context,
    rmcp::{RmcpClass, RmcpHeader},
    transport::{Transport, TransportError},
    v2::{
        crypto::{AuthenticationAlgorithm, ConfidentialityAlgorithm, IntegrityAlgorithm, Keys},
        messages::{
            OpenSessionRequest, OpenSessionResponse, RakpMessage1, RakpMessage2, RakpMessage3,
            RakpMessage4, RakpStatusCode, Username,
        },
        BackoffConfig, HandshakeFailure, HandshakeStep, PacketCodec, PayloadType, PrivilegeLevel,
        Session, SessionConfig, V2Payload,
    },
};

const BMC_SID: u32 = 0x02F00A17;
const BMC_RANDOM: [u8; 16] = [
    0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xBB, 0xBC, 0xBD, 0xBE,
    0xBF,
];
const BMC_GUID: [u8; 16] = [
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E,
    0x1F,
];

const DEVICE_ID_RESPONSE: [u8; 11] = [
    0x20, 0x81, 0x02, 0x21, 0x02, 0xBF, 0x57, 0x01, 0x00, 0x34, 0x12,
];

fn hmac_sha1(key: &[u8], chunks: &[&[u8]]) -> Vec<u8> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).unwrap();
    for chunk in chunks {
        mac.update(chunk);
    }
    mac.finalize().into_bytes().to_vec()
}

#[derive(Default)]
struct BmcState {
    password: Vec<u8>,
    /// Reply with this RMCP+ status instead of opening a session.
    refuse_open_with: Option<u8>,
    /// Swallow this many in-session replies (the request is still
    /// processed).
    drop_session_replies: usize,

    console_sid: u32,
    console_random: [u8; 16],
    role: u8,
    username: Vec<u8>,
    keys: Option<Keys>,
    codec: Option<PacketCodec>,

    outbound_sequence: u32,
    received_session_sequences: Vec<u32>,
    closed: bool,
}

/// A [`Transport`] that *is* the BMC.
#[derive(Clone)]
struct FakeBmc {
    state: Rc<RefCell<BmcState>>,
}

impl FakeBmc {
    fn new(password: &[u8]) -> Self {
        Self {
            state: Rc::new(RefCell::new(BmcState {
                password: password.to_vec(),
                ..BmcState::default()
            })),
        }
    }
}

impl BmcState {
    fn sik(&self) -> Vec<u8> {
        hmac_sha1(
            &self.password,
            &[
                &self.console_random,
                &BMC_RANDOM,
                &[self.role, self.username.len() as u8],
                &self.username,
            ],
        )
    }

    fn packet(
        &self,
        ty: PayloadType,
        payload: Vec<u8>,
        codec: &PacketCodec,
        session_id: u32,
        sequence: u32,
    ) -> Vec<u8> {
        let mut packet = Vec::new();
        RmcpHeader::new_ipmi().write(&mut packet);
        codec
            .write(
                &V2Payload {
                    ty,
                    session_id,
                    session_sequence_number: sequence,
                    payload,
                },
                &mut packet,
            )
            .unwrap();
        packet
    }

    fn handle(&mut self, data: &[u8]) -> Vec<u8> {
        let (header, rest) = RmcpHeader::from_data(data).unwrap();
        assert_eq!(header.class, RmcpClass::Ipmi);

        if rest[1] & 0xC0 != 0 {
            return self.handle_session_packet(rest);
        }

        let plaintext = PacketCodec::plaintext();
        let payload = plaintext.read(rest).unwrap();

        match payload.ty {
            PayloadType::OpenSessionRequest => self.open_session(&payload.payload, &plaintext),
            PayloadType::RakpMessage1 => self.rakp_1(&payload.payload, &plaintext),
            PayloadType::RakpMessage3 => self.rakp_3(&payload.payload, &plaintext),
            other => panic!("unexpected pre-session payload {other:?}"),
        }
    }

    fn open_session(&mut self, data: &[u8], codec: &PacketCodec) -> Vec<u8> {
        let request = OpenSessionRequest::from_data(data).unwrap();
        self.console_sid = request.remote_console_session_id.get();

        if let Some(status) = self.refuse_open_with {
            let payload = vec![request.message_tag, status];
            return self.packet(PayloadType::OpenSessionResponse, payload, codec, 0, 0);
        }

        let response = OpenSessionResponse {
            message_tag: request.message_tag,
            maximum_privilege_level: request
                .requested_max_privilege
                .unwrap_or(PrivilegeLevel::Administrator),
            remote_console_session_id: request.remote_console_session_id,
            managed_system_session_id: NonZeroU32::new(BMC_SID).unwrap(),
            authentication_algorithm: AuthenticationAlgorithm::RakpHmacSha1,
            integrity_algorithm: IntegrityAlgorithm::HmacSha1_96,
            confidentiality_algorithm: ConfidentialityAlgorithm::AesCbc128,
        };

        let mut payload = Vec::new();
        response.write_data(&mut payload);
        self.packet(PayloadType::OpenSessionResponse, payload, codec, 0, 0)
    }

    fn rakp_1(&mut self, data: &[u8], codec: &PacketCodec) -> Vec<u8> {
        let rakp1 = RakpMessage1::from_data(data).unwrap();
        assert_eq!(rakp1.managed_system_session_id.get(), BMC_SID);

        self.console_random = rakp1.remote_console_random_number;
        self.role = rakp1.role_byte();
        self.username = rakp1.username.to_vec();

        let auth_code = hmac_sha1(
            &self.password,
            &[
                &self.console_sid.to_le_bytes(),
                &BMC_SID.to_le_bytes(),
                &self.console_random,
                &BMC_RANDOM,
                &BMC_GUID,
                &[self.role, self.username.len() as u8],
                &self.username,
            ],
        );

        let rakp2 = RakpMessage2 {
            message_tag: rakp1.message_tag,
            remote_console_session_id: NonZeroU32::new(self.console_sid).unwrap(),
            managed_system_random_number: BMC_RANDOM,
            managed_system_guid: BMC_GUID,
            key_exchange_auth_code: &auth_code,
        };

        let mut payload = Vec::new();
        rakp2.write(&mut payload);
        self.packet(PayloadType::RakpMessage2, payload, codec, 0, 0)
    }

    fn rakp_3(&mut self, data: &[u8], codec: &PacketCodec) -> Vec<u8> {
        let rakp3 = RakpMessage3::from_data(data).unwrap();
        assert_eq!(rakp3.status_code, 0x00);
        assert_eq!(rakp3.managed_system_session_id.get(), BMC_SID);

        let expected = hmac_sha1(
            &self.password,
            &[
                &BMC_RANDOM,
                &self.console_sid.to_le_bytes(),
                &[self.role, self.username.len() as u8],
                &self.username,
            ],
        );
        assert_eq!(rakp3.key_exchange_auth_code, Some(expected.as_slice()));

        let sik = self.sik();
        let keys = Keys::derive(AuthenticationAlgorithm::RakpHmacSha1, sik.clone());

        let icv = hmac_sha1(&sik, &[&self.console_random, &BMC_SID.to_le_bytes(), &BMC_GUID]);

        let rakp4 = RakpMessage4 {
            message_tag: rakp3.message_tag,
            status_code: 0x00,
            remote_console_session_id: self.console_sid,
            integrity_check_value: Some(&icv[..12]),
        };

        let mut payload = Vec::new();
        rakp4.write(&mut payload);

        self.codec = Some(
            PacketCodec::for_session(
                &keys,
                IntegrityAlgorithm::HmacSha1_96,
                ConfidentialityAlgorithm::AesCbc128,
            )
            .unwrap(),
        );
        self.keys = Some(keys);

        self.packet(PayloadType::RakpMessage4, payload, codec, 0, 0)
    }

    fn handle_session_packet(&mut self, rest: &[u8]) -> Vec<u8> {
        // Encrypted + authenticated IPMI payload, ICV verifying under
        // K1 -- checked before any decoding.
        assert_eq!(rest[1], 0xC0);

        let keys = self.keys.as_ref().unwrap();
        let icv_offset = rest.len() - 12;
        let expected_icv = hmac_sha1(keys.k1(), &[&rest[..icv_offset]]);
        assert_eq!(
            &expected_icv[..12],
            &rest[icv_offset..],
            "console packet ICV must verify under K1"
        );

        let codec = self.codec.clone().unwrap();
        let payload = codec.read(rest).unwrap();
        assert_eq!(payload.session_id, BMC_SID);
        self.received_session_sequences
            .push(payload.session_sequence_number);

        let message = Message::from_data(&payload.payload).unwrap();
        assert!(!message.is_response());

        let (code, body) = match (message.netfn().request_value(), message.cmd()) {
            (0x06, 0x01) => (CompletionCode::Completed, DEVICE_ID_RESPONSE.to_vec()),
            (0x06, 0x3C) => {
                assert_eq!(message.data(), BMC_SID.to_le_bytes());
                self.closed = true;
                (CompletionCode::Completed, Vec::new())
            }
            _ => (CompletionCode::InvalidCommand, Vec::new()),
        };

        let operation = Operation {
            netfn: message.netfn(),
            cmd: message.cmd(),
            lun: message.lun(),
        };

        let mut response = Vec::new();
        Message::response(operation, code, body).write(&mut response);

        self.outbound_sequence += 1;
        let sequence = self.outbound_sequence;
        self.packet(PayloadType::IpmiMessage, response, &codec, self.console_sid, sequence)
    }
}

impl Transport for FakeBmc {
    type Error = std::convert::Infallible;

    fn send(&mut self, ctx: &Context, data: &[u8]) -> Result<Vec<u8>, TransportError<Self::Error>> {
        if ctx.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let mut state = self.state.borrow_mut();

        let (_, rest) = RmcpHeader::from_data(data).unwrap();
        let in_session = rest[1] & 0xC0 != 0;

        let reply = state.handle(data);

        if in_session && state.drop_session_replies > 0 {
            state.drop_session_replies -= 1;
            return Err(TransportError::Timeout);
        }

        Ok(reply)
    }
}

fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 1.5,
        jitter_factor: 0.0,
        max_elapsed: None,
    }
}

fn config(password: &[u8]) -> SessionConfig {
    let mut config = SessionConfig::new(Username::new("admin").unwrap(), password);
    config.backoff = fast_backoff();
    config
}

#[test]
fn full_session_against_scripted_bmc() {
    let bmc = FakeBmc::new(b"admin");
    let state = bmc.state.clone();
    let ctx = Context::background();

    let mut session = Session::establish(bmc, &ctx, config(b"admin")).unwrap();

    assert_eq!(
        session.authentication_algorithm(),
        AuthenticationAlgorithm::RakpHmacSha1
    );
    assert_eq!(session.integrity_algorithm(), IntegrityAlgorithm::HmacSha1_96);
    assert_eq!(
        session.confidentiality_algorithm(),
        ConfidentialityAlgorithm::AesCbc128
    );
    assert_eq!(session.remote_id(), BMC_SID);

    // The RAKP 1 role byte requests administrator privilege with
    // name-only lookup.
    assert_eq!(state.borrow().role, 0x14);

    // The SIK matches an independent derivation from the exchanged
    // randoms, and K1/K2 derive from it.
    let sik = state.borrow().sik();
    assert_eq!(session.sik(), sik);
    assert_eq!(session.k(1).unwrap(), hmac_sha1(&sik, &[&[0x01; 20]]));
    assert_eq!(session.k(2).unwrap(), hmac_sha1(&sik, &[&[0x02; 20]]));

    let device_id = session.send_command(&ctx, &GetDeviceId).unwrap();
    assert_eq!(device_id.completion_code, CompletionCode::Completed);

    let device_id = device_id.response.unwrap();
    assert_eq!(device_id.manufacturer_id, 0x157);
    assert_eq!(device_id.product_id, 0x1234);
    assert_eq!(device_id.ipmi_version_major, 2);

    // A command the BMC refuses completes the round-trip; the code is
    // for the caller.
    let refused = session
        .send_command(&ctx, &RawCommand::new(Operation::new(NetFn::App, 0x99), Vec::new()))
        .unwrap();
    assert_eq!(refused.completion_code, CompletionCode::InvalidCommand);
    assert!(refused.response.is_none());

    session.close(&ctx).unwrap();

    let state = state.borrow();
    assert!(state.closed);
    // One sequence number per attempt, starting at 1, never zero.
    assert_eq!(state.received_session_sequences, [1, 2, 3]);
}

#[test]
fn dropped_replies_are_retried_to_the_same_result() {
    let ctx = Context::background();

    let run = |drops: usize| {
        let bmc = FakeBmc::new(b"admin");
        let state = bmc.state.clone();

        let mut session = Session::establish(bmc, &ctx, config(b"admin")).unwrap();
        state.borrow_mut().drop_session_replies = drops;

        let result = session.send_command(&ctx, &GetDeviceId).unwrap();
        let sequences = state.borrow().received_session_sequences.clone();
        (result, sequences)
    };

    let (immediate, immediate_sequences) = run(0);
    let (retried, retried_sequences) = run(2);

    // Same outcome, modulo the sequence numbers the retries consumed.
    assert_eq!(immediate, retried);
    assert_eq!(immediate_sequences, [1]);
    assert_eq!(retried_sequences, [1, 2, 3]);
}

#[test]
fn wrong_password_fails_key_exchange() {
    let bmc = FakeBmc::new(b"admin");
    let ctx = Context::background();

    let error = Session::establish(bmc, &ctx, config(b"hunter2")).unwrap_err();

    assert_eq!(error.step, HandshakeStep::Rakp2);
    assert!(matches!(
        error.failure,
        HandshakeFailure::KeyExchangeAuthCodeMismatch
    ));
}

#[test]
fn bmc_error_status_aborts_establishment() {
    let bmc = FakeBmc::new(b"admin");
    bmc.state.borrow_mut().refuse_open_with = Some(0x01);
    let ctx = Context::background();

    let error = Session::establish(bmc, &ctx, config(b"admin")).unwrap_err();

    assert_eq!(error.step, HandshakeStep::OpenSession);
    assert!(matches!(error.failure, HandshakeFailure::ErrorStatus(0x01)));
    assert_eq!(
        error.failure.status_code(),
        Some(Ok(RakpStatusCode::InsufficientResources))
    );
}

#[test]
fn cancelled_context_stops_establishment() {
    let bmc = FakeBmc::new(b"admin");
    let ctx = Context::background();
    ctx.cancel_handle().cancel();

    let error = Session::establish(bmc, &ctx, config(b"admin")).unwrap_err();

    assert_eq!(error.step, HandshakeStep::OpenSession);
    assert!(matches!(
        error.failure,
        HandshakeFailure::Transport(TransportError::Cancelled)
    ));
}

#[test]
fn cancellation_mid_session_is_terminal() {
    let bmc = FakeBmc::new(b"admin");
    let ctx = Context::background();

    let mut session = Session::establish(bmc, &ctx, config(b"admin")).unwrap();

    ctx.cancel_handle().cancel();
    let error = session.send_command(&ctx, &GetDeviceId).unwrap_err();

    assert!(matches!(error, crate::v2::SessionError::Cancelled));
}
