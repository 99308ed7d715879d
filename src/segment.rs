//! L4 wire format: segments and sequence bits.
//!
//! A segment is what the reliability layer exchanges inside an L2 payload:
//! a 4-byte header (kind, seqno, ackno, mbz) followed by application bytes.
//! As with [`crate::frame`], no I/O happens here.
//!
//! The segment kind is a closed set of three variants; the stop-and-wait
//! discipline needs nothing more.  Sequence numbers alternate between 0 and
//! 1, which is sufficient to tell a retransmission from a new segment when
//! at most one frame is ever in flight.

use crate::frame::L2_PAYLOAD_SIZE;

/// Size of the fixed segment header in bytes.
pub const L4_HEADER_SIZE: usize = 4;

/// A whole segment must fit in one L2 payload.
pub const L4_FRAME_SIZE: usize = L2_PAYLOAD_SIZE;

/// Maximum application payload carried by one segment.
pub const L4_PAYLOAD_SIZE: usize = L4_FRAME_SIZE - L4_HEADER_SIZE;

// ---------------------------------------------------------------------------
// Sequence bit
// ---------------------------------------------------------------------------

/// An alternating-bit sequence number: 0 or 1, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqNo(u8);

impl SeqNo {
    /// Both sides of a session start at sequence number 0.
    pub const ZERO: SeqNo = SeqNo(0);

    /// The other sequence number.
    pub fn toggled(self) -> SeqNo {
        SeqNo(1 - self.0)
    }

    /// Wire representation.
    pub fn bit(self) -> u8 {
        self.0
    }

    fn from_wire(b: u8) -> Option<SeqNo> {
        match b {
            0 | 1 => Some(SeqNo(b)),
            _ => None,
        }
    }
}

impl std::fmt::Display for SeqNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Segment kind
// ---------------------------------------------------------------------------

/// The three segment kinds, with their 1-byte wire encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Carries application payload; `seqno` is meaningful.
    Data = 1,
    /// Acknowledges a DATA segment; `ackno` is meaningful.
    Ack = 2,
    /// The peer is tearing the session down.
    Reset = 3,
}

impl SegmentKind {
    fn from_wire(b: u8) -> Option<SegmentKind> {
        match b {
            1 => Some(SegmentKind::Data),
            2 => Some(SegmentKind::Ack),
            3 => Some(SegmentKind::Reset),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise when parsing a received segment.
///
/// The SAP layers treat every variant the same way: drop the frame and keep
/// waiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    /// Fewer bytes than the fixed header.
    TooShort(usize),
    /// The kind byte is none of DATA / ACK / RESET.
    UnknownKind(u8),
    /// The must-be-zero byte was not zero.
    NonZeroMbz(u8),
    /// A sequence field held something other than 0 or 1.
    BadSeqBit(u8),
}

impl std::fmt::Display for SegmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort(n) => write!(f, "segment of {n} bytes is shorter than the header"),
            Self::UnknownKind(b) => write!(f, "unknown segment kind {b}"),
            Self::NonZeroMbz(b) => write!(f, "mbz byte is {b}, must be zero"),
            Self::BadSeqBit(b) => write!(f, "sequence field is {b}, must be 0 or 1"),
        }
    }
}

impl std::error::Error for SegmentError {}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// A complete L4 segment: header fields + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub seqno: SeqNo,
    pub ackno: SeqNo,
    pub payload: Vec<u8>,
}

impl Segment {
    /// A DATA segment carrying `payload` under sequence number `seqno`.
    pub fn data(seqno: SeqNo, payload: Vec<u8>) -> Segment {
        Segment {
            kind: SegmentKind::Data,
            seqno,
            ackno: SeqNo::ZERO,
            payload,
        }
    }

    /// A bare ACK segment acknowledging with `ackno`.
    pub fn ack(ackno: SeqNo) -> Segment {
        Segment {
            kind: SegmentKind::Ack,
            seqno: SeqNo::ZERO,
            ackno,
            payload: Vec::new(),
        }
    }

    /// A bare RESET segment.
    pub fn reset() -> Segment {
        Segment {
            kind: SegmentKind::Reset,
            seqno: SeqNo::ZERO,
            ackno: SeqNo::ZERO,
            payload: Vec::new(),
        }
    }

    /// Serialise this segment into a newly allocated, fully written buffer.
    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(
            self.payload.len() <= L4_PAYLOAD_SIZE,
            "segment payload of {} bytes exceeds {L4_PAYLOAD_SIZE}",
            self.payload.len()
        );
        let mut bytes = Vec::with_capacity(L4_HEADER_SIZE + self.payload.len());
        bytes.push(self.kind as u8);
        bytes.push(self.seqno.bit());
        bytes.push(self.ackno.bit());
        bytes.push(0); // mbz
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Parse a [`Segment`] from a received L2 payload.
    pub fn decode(bytes: &[u8]) -> Result<Segment, SegmentError> {
        if bytes.len() < L4_HEADER_SIZE {
            return Err(SegmentError::TooShort(bytes.len()));
        }
        if bytes[3] != 0 {
            return Err(SegmentError::NonZeroMbz(bytes[3]));
        }
        let kind = SegmentKind::from_wire(bytes[0]).ok_or(SegmentError::UnknownKind(bytes[0]))?;
        let seqno = SeqNo::from_wire(bytes[1]).ok_or(SegmentError::BadSeqBit(bytes[1]))?;
        let ackno = SeqNo::from_wire(bytes[2]).ok_or(SegmentError::BadSeqBit(bytes[2]))?;
        Ok(Segment {
            kind,
            seqno,
            ackno,
            payload: bytes[L4_HEADER_SIZE..].to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
