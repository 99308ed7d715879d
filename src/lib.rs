//! `abp-over-udp` — a stop-and-wait reliable datagram transport over UDP.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  send(data) / recv(buf)
//!      ▼
//!  ┌──────────┐   alternating-bit DATA/ACK/RESET segments
//!  │  L4Sap   │   (1 s retransmit timer, pending slot)
//!  └────┬─────┘
//!       │ segment bytes
//!  ┌────▼─────┐   dst/len/XOR-checksum framing,
//!  │  L2Sap   │   corrupt frames discarded
//!  └────┬─────┘
//!       │ raw UDP datagrams
//!  ┌────▼──────┐
//!  │ UdpSocket │  (tokio)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`frame`]   — L2 wire format (serialise / deserialise, checksum)
//! - [`segment`] — L4 wire format (DATA / ACK / RESET, sequence bits)
//! - [`l2`]      — framing service access point over one UDP socket
//! - [`l4`]      — stop-and-wait reliability on top of [`l2`]
//! - [`sim`]     — lossy/corrupting UDP relay for testing

pub mod frame;
pub mod l2;
pub mod l4;
pub mod segment;
pub mod sim;

pub use l2::{L2Error, L2Recv, L2Sap};
pub use l4::{L4Sap, SapError};
pub use segment::{Segment, SegmentKind, SeqNo};
