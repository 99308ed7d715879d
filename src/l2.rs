//! L2 service access point: framed datagrams over one UDP socket.
//!
//! [`L2Sap`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! [`crate::frame`]-formatted frames toward exactly one peer.  All
//! reliability logic lives above in [`crate::l4`]; this layer owns byte I/O,
//! framing, and the checksum gate: a corrupted or truncated datagram never
//! reaches the caller, it surfaces as an error the layer above treats as
//! transient.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::frame::{self, FrameError, L2_FRAME_SIZE};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from L2 operations.
#[derive(Debug)]
pub enum L2Error {
    /// Underlying I/O error from the OS.
    Io(io::Error),
    /// The datagram could not be parsed as a valid frame (short, corrupt).
    Frame(FrameError),
    /// The peer address string did not parse as an IPv4 address.
    InvalidAddress(String),
    /// The received payload does not fit in the caller's buffer.
    BufferTooSmall { need: usize, have: usize },
}

impl std::fmt::Display for L2Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "socket I/O error: {e}"),
            Self::Frame(e) => write!(f, "frame error: {e}"),
            Self::InvalidAddress(a) => write!(f, "invalid peer address: {a}"),
            Self::BufferTooSmall { need, have } => {
                write!(f, "payload of {need} bytes exceeds caller buffer of {have}")
            }
        }
    }
}

impl std::error::Error for L2Error {}

impl From<io::Error> for L2Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<FrameError> for L2Error {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

// ---------------------------------------------------------------------------
// Receive outcome
// ---------------------------------------------------------------------------

/// Outcome of a bounded receive.  A timeout is an expected event for the
/// layer above, not an error.
#[derive(Debug, PartialEq, Eq)]
pub enum L2Recv {
    /// A valid frame arrived; its payload of this many bytes is in the
    /// caller's buffer.
    Payload(usize),
    /// The timeout elapsed with no valid frame.
    Timeout,
}

// ---------------------------------------------------------------------------
// L2Sap
// ---------------------------------------------------------------------------

/// A framing endpoint bound to one UDP socket and one fixed peer.
///
/// The socket is owned exclusively; dropping the SAP closes it.
#[derive(Debug)]
pub struct L2Sap {
    socket: UdpSocket,
    peer: SocketAddrV4,
    /// Opaque tag written into every outgoing frame header.  Derived from
    /// the peer address at creation and never interpreted on receive.
    dst_addr: u16,
}

/// The frame tag for a peer: its first two address octets, big-endian.
fn peer_tag(ip: &Ipv4Addr) -> u16 {
    let octets = ip.octets();
    u16::from_be_bytes([octets[0], octets[1]])
}

impl L2Sap {
    /// Open a UDP/IPv4 socket on an OS-assigned port, aimed at
    /// `peer_ip:peer_port`.
    pub async fn create(peer_ip: &str, peer_port: u16) -> Result<L2Sap, L2Error> {
        let ip: Ipv4Addr = peer_ip
            .parse()
            .map_err(|_| L2Error::InvalidAddress(peer_ip.to_string()))?;
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        Ok(Self::from_socket(socket, SocketAddrV4::new(ip, peer_port)))
    }

    /// Build an L2 SAP from an already-bound socket.
    ///
    /// Lets callers pin the local port (CLI) or learn an ephemeral one
    /// before wiring up the peer (tests).
    pub fn from_socket(socket: UdpSocket, peer: SocketAddrV4) -> L2Sap {
        let dst_addr = peer_tag(peer.ip());
        log::debug!("[l2] created SAP toward {peer} (tag {dst_addr:#06x})");
        L2Sap {
            socket,
            peer,
            dst_addr,
        }
    }

    /// Address this socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The configured peer.
    pub fn peer(&self) -> SocketAddrV4 {
        self.peer
    }

    /// Frame `payload` and transmit it as one UDP datagram to the peer.
    ///
    /// Returns the number of payload bytes accepted.
    pub async fn send(&self, payload: &[u8]) -> Result<usize, L2Error> {
        let frame = frame::encode(self.dst_addr, payload)?;
        self.socket.send_to(&frame, self.peer).await?;
        log::trace!("[l2] → frame of {} bytes", frame.len());
        Ok(payload.len())
    }

    /// Wait for one valid frame, copying its payload into `buf`.
    ///
    /// `timeout` of `None` waits forever.  Corrupt and truncated frames are
    /// discarded with an error; the caller decides whether to keep waiting.
    pub async fn recv(&self, buf: &mut [u8], timeout: Option<Duration>) -> Result<L2Recv, L2Error> {
        let mut frame_buf = [0u8; L2_FRAME_SIZE];
        let received = match timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.socket.recv_from(&mut frame_buf)).await {
                    Ok(result) => result?.0,
                    Err(_elapsed) => return Ok(L2Recv::Timeout),
                }
            }
            None => self.socket.recv_from(&mut frame_buf).await?.0,
        };

        let payload = frame::decode(&frame_buf, received).map_err(|e| {
            log::debug!("[l2] discarding frame of {received} bytes: {e}");
            e
        })?;
        if payload.len() > buf.len() {
            return Err(L2Error::BufferTooSmall {
                need: payload.len(),
                have: buf.len(),
            });
        }
        buf[..payload.len()].copy_from_slice(payload);
        log::trace!("[l2] ← payload of {} bytes", payload.len());
        Ok(L2Recv::Payload(payload.len()))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
