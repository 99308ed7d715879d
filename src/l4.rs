//! L4 service access point: stop-and-wait reliable delivery over [`crate::l2`].
//!
//! # Protocol contract
//!
//! - One DATA segment is in flight at a time; the sender blocks until the
//!   matching ACK arrives, retransmitting on a 1 s timer up to 4 times.
//! - Sequence numbers alternate between 0 and 1 per direction
//!   ([`crate::segment::SeqNo`]); an ACK matches when its `ackno` equals the
//!   toggled value of the sequence number in flight.
//! - A DATA segment that arrives while we are waiting for an ACK is
//!   acknowledged immediately and stashed in a single pending slot so the
//!   next [`L4Sap::recv`] can deliver it.  The slot is written only when
//!   empty; stop-and-wait guarantees at most one such frame can race a send.
//! - A RESET from the peer aborts whichever operation observes it.
//!
//! Each SAP drives one operation at a time; there are no internal tasks and
//! no timers beyond the bounded I/O waits themselves.

use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::l2::{L2Error, L2Recv, L2Sap};
use crate::segment::{Segment, SegmentKind, SeqNo, L4_FRAME_SIZE, L4_PAYLOAD_SIZE};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// How long each transmission waits for its ACK before the next attempt.
pub const RETRANSMIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Total transmissions per send: 1 initial + 4 retransmissions.
pub const MAX_TRANSMISSIONS: u32 = 5;

/// Number of best-effort RESET frames emitted on close.
const RESET_BURST: u32 = 3;

/// Ports below this are rejected at creation.
const MIN_PEER_PORT: u16 = 1024;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced by L4 operations.
#[derive(Debug)]
pub enum SapError {
    /// The peer sent a RESET; the session is over.
    Reset,
    /// Every transmission of a DATA segment went unacknowledged.
    RetriesExhausted,
    /// An empty payload or an empty receive buffer was passed in.
    EmptyBuffer,
    /// The peer port is in the reserved range.
    PortOutOfRange(u16),
    /// A link-layer failure that is not handled by retransmission.
    Link(L2Error),
}

impl std::fmt::Display for SapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reset => write!(f, "peer reset the session"),
            Self::RetriesExhausted => {
                write!(f, "no ACK after {MAX_TRANSMISSIONS} transmissions")
            }
            Self::EmptyBuffer => write!(f, "empty payload or buffer"),
            Self::PortOutOfRange(p) => write!(f, "peer port {p} is below {MIN_PEER_PORT}"),
            Self::Link(e) => write!(f, "link error: {e}"),
        }
    }
}

impl std::error::Error for SapError {}

impl From<L2Error> for SapError {
    fn from(e: L2Error) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// L4Sap
// ---------------------------------------------------------------------------

/// A DATA segment received while waiting for an ACK, parked for the next
/// `recv`.
#[derive(Debug)]
struct Pending {
    seqno: SeqNo,
    payload: Vec<u8>,
}

/// A reliable stop-and-wait endpoint bound to exactly one peer.
///
/// Owns its [`L2Sap`] exclusively; dropping the L4 SAP tears the link layer
/// down with it.
#[derive(Debug)]
pub struct L4Sap {
    l2: L2Sap,
    /// Sequence number of the next DATA segment we send.
    send_seqno: SeqNo,
    /// Sequence number we expect in the peer's next DATA segment.
    expected_seqno: SeqNo,
    /// At most one unexpected DATA frame parked during a send.
    pending: Option<Pending>,
}

impl L4Sap {
    /// Create an L4 SAP toward `peer_ip:peer_port` on an OS-assigned local
    /// port.  Reserved peer ports are rejected at this layer.
    pub async fn create(peer_ip: &str, peer_port: u16) -> Result<L4Sap, SapError> {
        if peer_port < MIN_PEER_PORT {
            return Err(SapError::PortOutOfRange(peer_port));
        }
        let l2 = L2Sap::create(peer_ip, peer_port).await?;
        Ok(Self::wrap(l2))
    }

    /// Build an L4 SAP from an already-bound socket.
    pub fn from_socket(socket: UdpSocket, peer: SocketAddrV4) -> Result<L4Sap, SapError> {
        if peer.port() < MIN_PEER_PORT {
            return Err(SapError::PortOutOfRange(peer.port()));
        }
        Ok(Self::wrap(L2Sap::from_socket(socket, peer)))
    }

    fn wrap(l2: L2Sap) -> L4Sap {
        log::debug!("[l4] created SAP toward {}", l2.peer());
        L4Sap {
            l2,
            send_seqno: SeqNo::ZERO,
            expected_seqno: SeqNo::ZERO,
            pending: None,
        }
    }

    /// Address the underlying socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.l2.local_addr()
    }

    // -----------------------------------------------------------------------
    // Send
    // -----------------------------------------------------------------------

    /// Deliver `data` to the peer, blocking until it is acknowledged.
    ///
    /// Payloads longer than [`L4_PAYLOAD_SIZE`] are truncated; the return
    /// value is the number of bytes actually accepted.  Empty payloads are
    /// rejected.
    ///
    /// Returns [`SapError::RetriesExhausted`] when every transmission went
    /// unanswered and [`SapError::Reset`] when the peer tore the session
    /// down mid-send.
    pub async fn send(&mut self, data: &[u8]) -> Result<usize, SapError> {
        if data.is_empty() {
            return Err(SapError::EmptyBuffer);
        }
        let accepted = data.len().min(L4_PAYLOAD_SIZE);
        let segment = Segment::data(self.send_seqno, data[..accepted].to_vec()).encode();
        let mut buf = [0u8; L4_FRAME_SIZE];

        for transmission in 1..=MAX_TRANSMISSIONS {
            self.l2.send(&segment).await?;
            log::debug!(
                "[l4] → DATA seq={} len={accepted} (transmission {transmission}/{MAX_TRANSMISSIONS})",
                self.send_seqno
            );

            // Anything other than the matching ACK re-waits within this
            // attempt; only the 1 s window elapsing costs a transmission.
            let deadline = Instant::now() + RETRANSMIT_TIMEOUT;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    log::debug!("[l4] ACK wait timed out (transmission {transmission})");
                    break;
                }

                let n = match self.l2.recv(&mut buf, Some(remaining)).await {
                    Ok(L2Recv::Payload(n)) => n,
                    Ok(L2Recv::Timeout) => {
                        log::debug!("[l4] ACK wait timed out (transmission {transmission})");
                        break;
                    }
                    Err(e) => {
                        log::debug!("[l4] transient link error while awaiting ACK: {e}");
                        continue;
                    }
                };
                let seg = match Segment::decode(&buf[..n]) {
                    Ok(seg) => seg,
                    Err(e) => {
                        log::debug!("[l4] dropping malformed segment: {e}");
                        continue;
                    }
                };

                match seg.kind {
                    SegmentKind::Reset => {
                        log::debug!("[l4] ← RESET during send");
                        return Err(SapError::Reset);
                    }
                    SegmentKind::Ack if seg.ackno == self.send_seqno.toggled() => {
                        log::debug!("[l4] ← ACK ackno={}", seg.ackno);
                        self.send_seqno = self.send_seqno.toggled();
                        return Ok(accepted);
                    }
                    SegmentKind::Ack => {
                        log::debug!("[l4] ← stale ACK ackno={}, ignoring", seg.ackno);
                    }
                    SegmentKind::Data => {
                        // The peer is sending concurrently.
                        self.absorb_unexpected_data(seg).await;
                    }
                }
            }
        }

        log::debug!("[l4] giving up after {MAX_TRANSMISSIONS} transmissions");
        Err(SapError::RetriesExhausted)
    }

    // -----------------------------------------------------------------------
    // Receive
    // -----------------------------------------------------------------------

    /// Block until the next in-order DATA segment arrives and copy its
    /// payload into `buf`.
    ///
    /// Delivers a frame parked by a concurrent [`send`](L4Sap::send) first.
    /// Duplicate DATA (the peer missed our ACK) is re-acknowledged without
    /// being delivered again.  Returns [`SapError::Reset`] when the peer
    /// tears the session down.
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, SapError> {
        if buf.is_empty() {
            return Err(SapError::EmptyBuffer);
        }

        if let Some(pending) = self.pending.take() {
            if pending.seqno == self.expected_seqno {
                let n = pending.payload.len().min(buf.len());
                buf[..n].copy_from_slice(&pending.payload[..n]);
                self.emit_ack(pending.seqno.toggled()).await;
                self.expected_seqno = self.expected_seqno.toggled();
                log::debug!("[l4] delivering parked DATA seq={} ({n} bytes)", pending.seqno);
                return Ok(n);
            }
            // Parked frame is a retransmission of something already
            // delivered; acknowledge it again and fall through to the wire.
            log::debug!("[l4] re-acking stale parked DATA seq={}", pending.seqno);
            self.emit_ack(pending.seqno.toggled()).await;
        }

        let mut frame_buf = [0u8; L4_FRAME_SIZE];
        loop {
            let n = match self.l2.recv(&mut frame_buf, None).await {
                Ok(L2Recv::Payload(n)) => n,
                Ok(L2Recv::Timeout) => continue,
                Err(e) => {
                    log::debug!("[l4] transient link error while receiving: {e}");
                    continue;
                }
            };
            let seg = match Segment::decode(&frame_buf[..n]) {
                Ok(seg) => seg,
                Err(e) => {
                    log::debug!("[l4] dropping malformed segment: {e}");
                    continue;
                }
            };

            match seg.kind {
                SegmentKind::Reset => {
                    log::debug!("[l4] ← RESET during recv");
                    return Err(SapError::Reset);
                }
                SegmentKind::Data if seg.seqno == self.expected_seqno => {
                    let copied = seg.payload.len().min(buf.len());
                    buf[..copied].copy_from_slice(&seg.payload[..copied]);
                    self.emit_ack(seg.seqno.toggled()).await;
                    self.expected_seqno = self.expected_seqno.toggled();
                    log::debug!("[l4] ← DATA seq={} ({copied} bytes), delivered", seg.seqno);
                    return Ok(copied);
                }
                SegmentKind::Data => {
                    // The peer missed our last ACK; acknowledge the old
                    // frame again, deliver nothing.
                    log::debug!("[l4] ← duplicate DATA seq={}, re-acking", seg.seqno);
                    self.emit_ack(seg.seqno.toggled()).await;
                }
                SegmentKind::Ack => {
                    log::debug!("[l4] ← stray ACK ackno={}, ignoring", seg.ackno);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Tear the session down, nudging the peer with a burst of RESET frames
    /// so its blocked operation returns promptly.  Best-effort; never blocks
    /// on the peer.
    pub async fn close(self) {
        let reset = Segment::reset().encode();
        for _ in 0..RESET_BURST {
            if let Err(e) = self.l2.send(&reset).await {
                log::warn!("[l4] failed to send RESET: {e}");
                break;
            }
        }
        log::debug!("[l4] session closed");
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Handle a DATA segment that arrived while we were waiting for an ACK:
    /// acknowledge it, and park it for the next `recv` if the slot is free.
    async fn absorb_unexpected_data(&mut self, seg: Segment) {
        self.emit_ack(seg.seqno.toggled()).await;
        if self.pending.is_none() {
            log::debug!(
                "[l4] parking DATA seq={} ({} bytes) for a later recv",
                seg.seqno,
                seg.payload.len()
            );
            self.pending = Some(Pending {
                seqno: seg.seqno,
                payload: seg.payload,
            });
        } else {
            log::debug!("[l4] pending slot occupied, DATA seq={} dropped", seg.seqno);
        }
    }

    /// Emit one ACK segment.  Failures are logged and swallowed; the peer's
    /// retransmission covers a lost ACK.
    async fn emit_ack(&self, ackno: SeqNo) {
        match self.l2.send(&Segment::ack(ackno).encode()).await {
            Ok(_) => log::debug!("[l4] → ACK ackno={ackno}"),
            Err(e) => log::warn!("[l4] failed to send ACK ackno={ackno}: {e}"),
        }
    }
}
