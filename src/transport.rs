use std::{
    io::ErrorKind,
    net::{ToSocketAddrs, UdpSocket},
    time::Duration,
};

use crate::context::{Context, ContextError};

/// The IPMI-over-LAN port.
pub const IPMI_PORT: u16 = 623;

#[derive(Debug)]
pub enum TransportError<E> {
    /// No reply arrived before the attempt deadline.
    Timeout,
    /// The context was cancelled while the call was in flight.
    Cancelled,
    /// The underlying transport failed.
    Transport(E),
}

impl<E> From<ContextError> for TransportError<E> {
    fn from(value: ContextError) -> Self {
        match value {
            ContextError::Cancelled => TransportError::Cancelled,
            ContextError::DeadlineExceeded => TransportError::Timeout,
        }
    }
}

/// A datagram round-trip used by the session.
///
/// `send` transmits one packet and blocks until a single reply datagram
/// arrives or the context expires. The session performs its own retries;
/// implementations must not.
pub trait Transport {
    type Error: core::fmt::Debug;

    fn send(&mut self, ctx: &Context, data: &[u8]) -> Result<Vec<u8>, TransportError<Self::Error>>;
}

/// [`Transport`] over a connected [`UdpSocket`].
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    buffer: [u8; 1024],
}

impl UdpTransport {
    /// Read-timeout slice used to poll for cancellation while waiting
    /// for a reply.
    const POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Bind an ephemeral local socket and connect it to `remote`.
    pub fn connect<R: ToSocketAddrs>(remote: R) -> std::io::Result<Self> {
        let address = remote.to_socket_addrs()?.next().ok_or_else(|| {
            std::io::Error::new(ErrorKind::NotFound, "remote resolved to no addresses")
        })?;

        let socket = UdpSocket::bind("[::]:0").or_else(|_| UdpSocket::bind("0.0.0.0:0"))?;
        socket.connect(address)?;

        log::debug!("Connected UDP transport to {address}");

        Ok(Self {
            socket,
            buffer: [0u8; 1024],
        })
    }

    /// Recover the underlying socket.
    pub fn release(self) -> UdpSocket {
        self.socket
    }
}

impl Transport for UdpTransport {
    type Error = std::io::Error;

    fn send(&mut self, ctx: &Context, data: &[u8]) -> Result<Vec<u8>, TransportError<Self::Error>> {
        ctx.check()?;

        self.socket.send(data).map_err(TransportError::Transport)?;

        loop {
            ctx.check()?;

            let slice = match ctx.remaining() {
                Some(left) => left.min(Self::POLL_INTERVAL),
                None => Self::POLL_INTERVAL,
            };

            self.socket
                .set_read_timeout(Some(slice.max(Duration::from_millis(1))))
                .map_err(TransportError::Transport)?;

            match self.socket.recv(&mut self.buffer) {
                Ok(received) => return Ok(self.buffer[..received].to_vec()),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue;
                }
                Err(e) => return Err(TransportError::Transport(e)),
            }
        }
    }
}
