use std::num::NonZeroU32;
use std::time::Duration;

use crate::{
    commands::{CloseSession, Command, CommandResult, Message, MessageParseError, Operation},
    context::{Context, ContextError},
    metrics::SessionObserver,
    rmcp::{RmcpClass, RmcpError, RmcpHeader},
    transport::{Transport, TransportError},
};

use super::{
    backoff::Backoff,
    crypto::{AuthenticationAlgorithm, ConfidentialityAlgorithm, IntegrityAlgorithm, Keys},
    wire::{PacketCodec, ReadError, WriteError},
    PayloadType, V2Payload,
};

/// Errors from a command round-trip inside an established session.
///
/// `T` is the transport's error type, `P` the command's response parse
/// error, surfaced verbatim.
#[derive(Debug)]
pub enum SessionError<T, P> {
    /// The context was cancelled.
    Cancelled,
    /// The context deadline passed before a valid reply arrived.
    DeadlineExceeded,
    /// The retry budget was spent without a valid reply; the final
    /// attempt timed out or only produced stale packets.
    Timeout,
    /// The retry budget was spent; the final attempt failed in the
    /// transport.
    Transport(T),
    /// The retry budget was spent; the final reply had a malformed RMCP
    /// envelope.
    Envelope(RmcpError),
    /// The retry budget was spent; the final reply failed session
    /// decode (bad wrapper, ICV mismatch, or decryption failure).
    Decode(ReadError),
    /// The request could not be serialized.
    Write(WriteError),
    /// The reply's IPMI message layer was malformed.
    MessageParse(MessageParseError),
    /// The command's response parser rejected the reply body.
    ParseResponse(P),
}

/// Why an attempt failed in a way that allows another attempt.
enum RetryReason<T> {
    Timeout,
    Transport(T),
    Envelope(RmcpError),
    Decode(ReadError),
    /// A structurally valid packet that is not the awaited reply: bad
    /// session ID, replayed or stale sequence number, or an echo of a
    /// different command.
    Stale,
}

impl<T> RetryReason<T> {
    fn into_session_error<P>(self) -> SessionError<T, P> {
        match self {
            RetryReason::Timeout | RetryReason::Stale => SessionError::Timeout,
            RetryReason::Transport(e) => SessionError::Transport(e),
            RetryReason::Envelope(e) => SessionError::Envelope(e),
            RetryReason::Decode(e) => SessionError::Decode(e),
        }
    }
}

enum Attempt<T> {
    /// A response message for this session arrived.
    Reply(Message),
    Retry(RetryReason<T>),
    Cancelled,
    MessageParse(MessageParseError),
}

/// Anti-replay acceptance for inbound session sequence numbers.
///
/// Accepts a number if it advances past the newest accepted one, or if
/// it is at most [`SIZE`] behind and not seen before. Zero is never
/// accepted.
///
/// [`SIZE`]: ReplayWindow::SIZE
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ReplayWindow {
    last: u32,
    seen: u8,
}

impl ReplayWindow {
    const SIZE: u32 = 8;

    pub fn new() -> Self {
        Self { last: 0, seen: 0 }
    }

    pub fn accept(&mut self, sequence: u32) -> bool {
        if sequence == 0 {
            return false;
        }

        if sequence > self.last {
            let shift = sequence - self.last;
            self.seen = if shift >= Self::SIZE {
                0
            } else {
                self.seen << shift
            };
            self.seen |= 1;
            self.last = sequence;
            true
        } else {
            let age = self.last - sequence;
            if age >= Self::SIZE {
                return false;
            }

            let bit = 1u8 << age;
            if self.seen & bit != 0 {
                return false;
            }

            self.seen |= bit;
            true
        }
    }
}

/// One direction pair of session sequence state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SequenceNumbers {
    pub outbound: u32,
    pub inbound: ReplayWindow,
}

impl SequenceNumbers {
    pub fn new() -> Self {
        Self {
            outbound: 0,
            inbound: ReplayWindow::new(),
        }
    }
}

/// An established IPMI v2.0 (RMCP+) session.
///
/// Owns its transport, keys, sequence counters and packet codec. A
/// session runs one command at a time; closing it consumes the value,
/// so no command can race the teardown.
pub struct Session<T> {
    pub(crate) transport: T,
    /// Our session ID; the BMC addresses us with it.
    pub(crate) local_id: NonZeroU32,
    /// The BMC's session ID; we address it with it.
    pub(crate) remote_id: NonZeroU32,
    pub(crate) authentication_algorithm: AuthenticationAlgorithm,
    pub(crate) integrity_algorithm: IntegrityAlgorithm,
    pub(crate) confidentiality_algorithm: ConfidentialityAlgorithm,
    pub(crate) keys: Keys,
    pub(crate) codec: PacketCodec,
    pub(crate) authenticated: SequenceNumbers,
    pub(crate) unauthenticated: SequenceNumbers,
    pub(crate) attempt_timeout: Duration,
    pub(crate) backoff: Backoff,
    pub(crate) observer: Box<dyn SessionObserver>,
}

impl<T> core::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("local_id", &self.local_id)
            .field("remote_id", &self.remote_id)
            .field("authentication_algorithm", &self.authentication_algorithm)
            .field("integrity_algorithm", &self.integrity_algorithm)
            .field("confidentiality_algorithm", &self.confidentiality_algorithm)
            .finish()
    }
}

impl<T> Session<T> {
    /// Our session ID.
    pub fn local_id(&self) -> u32 {
        self.local_id.get()
    }

    /// The managed system's session ID.
    pub fn remote_id(&self) -> u32 {
        self.remote_id.get()
    }

    pub fn authentication_algorithm(&self) -> AuthenticationAlgorithm {
        self.authentication_algorithm
    }

    pub fn integrity_algorithm(&self) -> IntegrityAlgorithm {
        self.integrity_algorithm
    }

    pub fn confidentiality_algorithm(&self) -> ConfidentialityAlgorithm {
        self.confidentiality_algorithm
    }

    /// The session integrity key, for information purposes.
    pub fn sik(&self) -> &[u8] {
        self.keys.sik()
    }

    /// Kₙ for `n` in `1..=3`, for information purposes.
    pub fn k(&self, n: u8) -> Option<&[u8]> {
        self.keys.k(n)
    }

    /// Abandon the session without telling the BMC, recovering the
    /// transport.
    pub fn release(self) -> T {
        self.transport
    }

    fn sequences(&mut self) -> &mut SequenceNumbers {
        if self.codec.authenticated() {
            &mut self.authenticated
        } else {
            &mut self.unauthenticated
        }
    }

    /// The next outbound session sequence number. Starts at 1 and skips
    /// 0 on wrap-around; every attempt consumes a fresh number.
    fn next_outbound_sequence(&mut self) -> u32 {
        let counters = self.sequences();

        counters.outbound = counters.outbound.wrapping_add(1);
        if counters.outbound == 0 {
            counters.outbound = 1;
        }

        counters.outbound
    }
}

impl<T: Transport> Session<T> {
    /// Run `command` against the BMC and return its completion code and
    /// parsed response.
    ///
    /// Transport failures, timeouts and undecodable replies are retried
    /// with backoff until the context deadline or retry budget runs
    /// out. Serialization errors, cancellation, and response-parse
    /// failures are not retried. A non-success completion code is a
    /// completed round-trip, returned for the caller to interpret.
    pub fn send_command<C: Command>(
        &mut self,
        ctx: &Context,
        command: &C,
    ) -> Result<CommandResult<C::Output>, SessionError<T::Error, C::Error>> {
        self.observer.command_attempt(command.name());

        let result = self.send_command_inner(ctx, command);

        match &result {
            Ok(outcome) => {
                self.observer
                    .command_response(command.name(), outcome.completion_code);
            }
            Err(_) => self.observer.command_failure(command.name()),
        }

        result
    }

    fn send_command_inner<C: Command>(
        &mut self,
        ctx: &Context,
        command: &C,
    ) -> Result<CommandResult<C::Output>, SessionError<T::Error, C::Error>> {
        let operation = command.operation();

        let mut body = Vec::new();
        command.write_request(&mut body);

        let mut message_bytes = Vec::new();
        Message::request(operation, body).write(&mut message_bytes);

        self.backoff.reset();
        let mut first_attempt = true;

        let reply = loop {
            match ctx.check() {
                Ok(()) => {}
                Err(ContextError::Cancelled) => return Err(SessionError::Cancelled),
                Err(ContextError::DeadlineExceeded) => return Err(SessionError::DeadlineExceeded),
            }

            if !first_attempt {
                log::debug!("Retrying command {}", command.name());
                self.observer.command_retry(command.name());
            }
            first_attempt = false;

            let reason = match self.attempt(ctx, operation, &message_bytes)? {
                Attempt::Reply(message) => break message,
                Attempt::Cancelled => return Err(SessionError::Cancelled),
                Attempt::MessageParse(e) => return Err(SessionError::MessageParse(e)),
                Attempt::Retry(reason) => reason,
            };

            let Some(delay) = self.backoff.next_delay() else {
                return Err(reason.into_session_error());
            };

            match ctx.sleep(delay) {
                Ok(()) => {}
                Err(ContextError::Cancelled) => return Err(SessionError::Cancelled),
                Err(ContextError::DeadlineExceeded) => return Err(reason.into_session_error()),
            }
        };

        let completion_code = reply
            .completion_code()
            .expect("response messages always carry a completion code");

        let response = if completion_code.is_success() {
            match command.parse_response(reply.data()) {
                Ok(output) => Some(output),
                Err(e) => return Err(SessionError::ParseResponse(e)),
            }
        } else {
            log::debug!(
                "Command {} completed with code {:?}",
                command.name(),
                completion_code
            );
            None
        };

        Ok(CommandResult {
            completion_code,
            response,
        })
    }

    /// One serialize → send → decode round. The `Err` branch carries
    /// request serialization failures only.
    fn attempt<P>(
        &mut self,
        ctx: &Context,
        operation: Operation,
        message_bytes: &[u8],
    ) -> Result<Attempt<T::Error>, SessionError<T::Error, P>> {
        let sequence = self.next_outbound_sequence();

        let payload = V2Payload {
            ty: PayloadType::IpmiMessage,
            session_id: self.remote_id.get(),
            session_sequence_number: sequence,
            payload: message_bytes.to_vec(),
        };

        let mut packet = Vec::new();
        RmcpHeader::new_ipmi().write(&mut packet);
        self.codec
            .write(&payload, &mut packet)
            .map_err(SessionError::Write)?;

        let attempt_ctx = ctx.bounded(self.attempt_timeout);

        let reply = match self.transport.send(&attempt_ctx, &packet) {
            Ok(reply) => reply,
            Err(TransportError::Cancelled) => return Ok(Attempt::Cancelled),
            Err(TransportError::Timeout) => return Ok(Attempt::Retry(RetryReason::Timeout)),
            Err(TransportError::Transport(e)) => {
                return Ok(Attempt::Retry(RetryReason::Transport(e)))
            }
        };

        Ok(self.decode_reply(&reply, operation))
    }

    fn decode_reply(&mut self, reply: &[u8], operation: Operation) -> Attempt<T::Error> {
        let (header, rest) = match RmcpHeader::from_data(reply) {
            Ok(v) => v,
            Err(e) => return Attempt::Retry(RetryReason::Envelope(e)),
        };

        if header.class != RmcpClass::Ipmi {
            log::debug!("Dropping non-IPMI RMCP packet ({:?})", header.class);
            return Attempt::Retry(RetryReason::Stale);
        }

        let payload = match self.codec.read(rest) {
            Ok(payload) => payload,
            Err(e) => return Attempt::Retry(RetryReason::Decode(e)),
        };

        if payload.ty != PayloadType::IpmiMessage {
            log::debug!("Dropping unexpected payload type {:?}", payload.ty);
            return Attempt::Retry(RetryReason::Stale);
        }

        if payload.session_id != self.local_id.get() {
            log::debug!(
                "Dropping packet for session {:08X} (ours is {:08X})",
                payload.session_id,
                self.local_id
            );
            return Attempt::Retry(RetryReason::Stale);
        }

        let sequence = payload.session_sequence_number;
        if !self.sequences().inbound.accept(sequence) {
            log::debug!("Dropping replayed or stale sequence number {sequence}");
            return Attempt::Retry(RetryReason::Stale);
        }

        let message = match Message::from_data(&payload.payload) {
            Ok(message) => message,
            Err(e) => return Attempt::MessageParse(e),
        };

        let echoes_request = message.is_response()
            && message.netfn().request_value() == operation.netfn.request_value()
            && message.cmd() == operation.cmd;

        if !echoes_request {
            log::debug!(
                "Dropping response for a different command ({:?}/{:02X})",
                message.netfn(),
                message.cmd()
            );
            return Attempt::Retry(RetryReason::Stale);
        }

        Attempt::Reply(message)
    }

    /// Tear the session down.
    ///
    /// Sends Close Session with the managed system's session ID. The
    /// local session is gone regardless of the outcome; the result only
    /// reports whether the BMC confirmed.
    pub fn close(
        mut self,
        ctx: &Context,
    ) -> Result<(), SessionError<T::Error, core::convert::Infallible>> {
        let command = CloseSession {
            session_id: self.remote_id.get(),
        };

        let result = self.send_command(ctx, &command).map(|outcome| {
            if !outcome.completion_code.is_success() {
                log::warn!(
                    "BMC rejected Close Session with {:?}",
                    outcome.completion_code
                );
            }
        });

        self.observer.session_closed();
        log::debug!("Closed session {:08X}", self.local_id);

        result
    }
}
