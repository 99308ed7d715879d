//! Fault-injecting UDP relay for testing.
//!
//! Real networks drop and corrupt datagrams.  To exercise the reliability
//! mechanisms without depending on actual network conditions, a [`Relay`]
//! sits between two SAPs and applies a per-datagram [`Verdict`]:
//!
//! | Fault      | Description                                   |
//! |------------|-----------------------------------------------|
//! | Loss       | Silently discard the datagram.                |
//! | Corruption | Flip one bit, then deliver.                   |
//!
//! Both endpoints are configured with the relay as their peer.  The relay
//! knows its `downstream` endpoint up front and learns the other end from
//! the first datagram it sees, so the wiring order is: bind downstream,
//! spawn relay, point both SAPs at `relay.local_addr`.
//!
//! Policies are either deterministic closures over `(direction, index)` —
//! "drop the first ACK" — or the seeded random loss of [`Relay::lossy`],
//! so failures reproduce.

use std::io;
use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::frame::L2_FRAME_SIZE;

// ---------------------------------------------------------------------------
// Policy types
// ---------------------------------------------------------------------------

/// Which way a datagram is travelling through the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From the learned endpoint toward the configured downstream address.
    ToDownstream,
    /// From the downstream address back toward the learned endpoint.
    ToUpstream,
}

/// What to do with one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Deliver,
    Drop,
    /// Flip one bit and deliver the damaged datagram.
    Corrupt,
}

/// Per-datagram decision: direction, zero-based index within that
/// direction, and the datagram bytes.
pub type FaultPolicy = Box<dyn FnMut(Direction, usize, &[u8]) -> Verdict + Send>;

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// A fault-injecting relay running as a background task.
///
/// The task is aborted when the handle is dropped.
#[derive(Debug)]
pub struct Relay {
    /// Address both SAPs should use as their peer.
    pub local_addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl Relay {
    /// Spawn a relay forwarding between `downstream` and whichever endpoint
    /// sends to it first, under the given policy.
    pub async fn spawn(downstream: SocketAddr, policy: FaultPolicy) -> io::Result<Relay> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let local_addr = socket.local_addr()?;
        let handle = tokio::spawn(relay_loop(socket, downstream, policy));
        Ok(Relay { local_addr, handle })
    }

    /// A relay that delivers everything unchanged.
    pub async fn transparent(downstream: SocketAddr) -> io::Result<Relay> {
        Self::spawn(downstream, Box::new(|_, _, _| Verdict::Deliver)).await
    }

    /// A relay that drops each datagram with probability `loss_rate`,
    /// using a seeded RNG so runs reproduce.
    pub async fn lossy(downstream: SocketAddr, loss_rate: f64, seed: u64) -> io::Result<Relay> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::spawn(
            downstream,
            Box::new(move |_, _, _| {
                if rng.gen::<f64>() < loss_rate {
                    Verdict::Drop
                } else {
                    Verdict::Deliver
                }
            }),
        )
        .await
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn relay_loop(socket: UdpSocket, downstream: SocketAddr, mut policy: FaultPolicy) {
    let mut upstream: Option<SocketAddr> = None;
    let mut to_downstream = 0usize;
    let mut to_upstream = 0usize;
    let mut buf = [0u8; L2_FRAME_SIZE];

    loop {
        let (n, src) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                log::warn!("[relay] socket error, shutting down: {e}");
                break;
            }
        };

        let (dest, direction, index) = if src == downstream {
            let Some(up) = upstream else {
                log::debug!("[relay] datagram from downstream before any upstream, dropping");
                continue;
            };
            to_upstream += 1;
            (up, Direction::ToUpstream, to_upstream - 1)
        } else {
            upstream = Some(src);
            to_downstream += 1;
            (downstream, Direction::ToDownstream, to_downstream - 1)
        };

        match policy(direction, index, &buf[..n]) {
            Verdict::Drop => {
                log::debug!("[relay] dropping {direction:?} datagram #{index} ({n} bytes)");
            }
            Verdict::Corrupt => {
                if n > 0 {
                    buf[n - 1] ^= 0x01;
                }
                log::debug!("[relay] corrupting {direction:?} datagram #{index}");
                let _ = socket.send_to(&buf[..n], dest).await;
            }
            Verdict::Deliver => {
                let _ = socket.send_to(&buf[..n], dest).await;
            }
        }
    }
}
