//! Wire-format definitions for protocol frames.
//!
//! Every message on every connection is one fixed-size [`Frame`] of
//! [`FRAME_SIZE`] bytes.  This module is responsible for:
//! - Defining the on-wire binary layout.
//! - Serialising a [`Frame`] into a 256-byte buffer.
//! - Deserialising a buffer back into a [`Frame`], rejecting a declared data
//!   length that would overrun the data field.
//! - Computing and verifying the additive checksum.
//!
//! No I/O happens here.
//!
//! # Wire format
//!
//! All multi-byte integers are **little-endian**.
//!
//! ```text
//!  offset  size  field
//!  ------  ----  ----------------------------------------------
//!       0     1  type
//!       1     2  dataLength            (<= 247)
//!       3   247  data                  (zero-padded after dataLength)
//!     250     2  checksum
//!     252     4  timestamp             (i32, seconds since epoch)
//! ```
//!
//! The checksum is the 16-bit wrapping sum of the type byte, both
//! `dataLength` bytes, the first `dataLength` data bytes and the four
//! timestamp bytes.  The checksum field never covers itself.

use std::borrow::Cow;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::FrameError;

/// Total size of every frame on the wire.
pub const FRAME_SIZE: usize = 256;

/// Capacity of the data field.
pub const MAX_DATA_LEN: usize = FRAME_SIZE - 9;

// Byte offsets of each field within the serialised frame.
const OFF_TYPE: usize = 0;
const OFF_DATA_LEN: usize = 1;
const OFF_DATA: usize = 3;
const OFF_CHECKSUM: usize = FRAME_SIZE - 6;
const OFF_TIMESTAMP: usize = FRAME_SIZE - 4;

/// Frame kinds understood by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Client login to the coordinator (`username&ip&port`).
    Connect,
    /// Worker registration with the coordinator (`category&ip&port`).
    WorkerConnect,
    /// Client request sent directly to a worker.
    WorkerRequest,
    /// Logout / worker shutdown notice.
    Disconnect,
    /// Terminal error signal, always with an empty payload.
    Error,
    /// Client asks the coordinator where to send a file (`category&fileName`).
    Distort,
    /// Any other type byte; kept so the receiver can answer with an error.
    Unknown(u8),
}

impl FrameType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => FrameType::Connect,
            0x02 => FrameType::WorkerConnect,
            0x03 => FrameType::WorkerRequest,
            0x07 => FrameType::Disconnect,
            0x09 => FrameType::Error,
            0x10 => FrameType::Distort,
            other => FrameType::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            FrameType::Connect => 0x01,
            FrameType::WorkerConnect => 0x02,
            FrameType::WorkerRequest => 0x03,
            FrameType::Disconnect => 0x07,
            FrameType::Error => 0x09,
            FrameType::Distort => 0x10,
            FrameType::Unknown(v) => v,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Unknown(v) => write!(f, "Unknown({v:#04x})"),
            known => write!(f, "{known:?}({:#04x})", known.to_u8()),
        }
    }
}

/// One protocol frame.
///
/// `data` holds exactly `dataLength` bytes; the padding is implicit.  Frames
/// built through [`Frame::new`] always carry a correct checksum, frames
/// produced by [`Frame::decode`] carry whatever the peer sent and must be
/// checked with [`Frame::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub data: Vec<u8>,
    pub checksum: u16,
    pub timestamp: i32,
}

impl Frame {
    /// Build a frame stamped with the current time and a fresh checksum.
    pub fn new(frame_type: FrameType, data: impl Into<Vec<u8>>) -> Result<Self, FrameError> {
        Self::with_timestamp(frame_type, data, now_timestamp())
    }

    /// Build a frame with an explicit timestamp.
    pub fn with_timestamp(
        frame_type: FrameType,
        data: impl Into<Vec<u8>>,
        timestamp: i32,
    ) -> Result<Self, FrameError> {
        let data = data.into();
        if data.len() > MAX_DATA_LEN {
            return Err(FrameError::PayloadTooLong {
                len: data.len(),
                max: MAX_DATA_LEN,
            });
        }
        let mut frame = Frame {
            frame_type,
            data,
            checksum: 0,
            timestamp,
        };
        frame.checksum = frame.compute_checksum();
        Ok(frame)
    }

    /// A zero-payload frame: acknowledgments, the error frame.
    pub fn empty(frame_type: FrameType) -> Self {
        let mut frame = Frame {
            frame_type,
            data: Vec::new(),
            checksum: 0,
            timestamp: now_timestamp(),
        };
        frame.checksum = frame.compute_checksum();
        frame
    }

    /// The `0x09` error frame.
    pub fn error() -> Self {
        Self::empty(FrameType::Error)
    }

    /// Value of the `dataLength` field.
    pub fn data_len(&self) -> u16 {
        self.data.len().min(MAX_DATA_LEN) as u16
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Payload as text, with invalid UTF-8 replaced.  Intended for logs.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    /// Compute the checksum over type, length, payload and timestamp.
    pub fn compute_checksum(&self) -> u16 {
        let len = self.data_len();
        let mut sum = u16::from(self.frame_type.to_u8());
        for b in len
            .to_le_bytes()
            .iter()
            .chain(&self.data[..len as usize])
            .chain(self.timestamp.to_le_bytes().iter())
        {
            sum = sum.wrapping_add(u16::from(*b));
        }
        sum
    }

    /// Compare the carried checksum against a fresh computation.
    pub fn verify(&self) -> Result<(), FrameError> {
        let actual = self.compute_checksum();
        if actual != self.checksum {
            return Err(FrameError::ChecksumMismatch {
                expected: self.checksum,
                actual,
            });
        }
        Ok(())
    }

    /// Serialise into a zero-padded fixed-size buffer.
    ///
    /// At most [`MAX_DATA_LEN`] payload bytes are written; the constructors
    /// already refuse anything longer.
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut buf = [0u8; FRAME_SIZE];
        let len = self.data_len();

        buf[OFF_TYPE] = self.frame_type.to_u8();
        buf[OFF_DATA_LEN..OFF_DATA_LEN + 2].copy_from_slice(&len.to_le_bytes());
        buf[OFF_DATA..OFF_DATA + len as usize].copy_from_slice(&self.data[..len as usize]);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&self.checksum.to_le_bytes());
        buf[OFF_TIMESTAMP..OFF_TIMESTAMP + 4].copy_from_slice(&self.timestamp.to_le_bytes());

        buf
    }

    /// Parse a frame out of a fixed-size buffer.
    ///
    /// Fails with [`FrameError::MalformedFrame`] when `dataLength` is larger
    /// than the data field.  The checksum is *not* checked here.
    pub fn decode(buf: &[u8; FRAME_SIZE]) -> Result<Self, FrameError> {
        let frame_type = FrameType::from_u8(buf[OFF_TYPE]);
        let declared = u16::from_le_bytes([buf[OFF_DATA_LEN], buf[OFF_DATA_LEN + 1]]);
        if declared as usize > MAX_DATA_LEN {
            return Err(FrameError::MalformedFrame {
                declared,
                max: MAX_DATA_LEN,
            });
        }

        let checksum = u16::from_le_bytes([buf[OFF_CHECKSUM], buf[OFF_CHECKSUM + 1]]);
        let timestamp = i32::from_le_bytes([
            buf[OFF_TIMESTAMP],
            buf[OFF_TIMESTAMP + 1],
            buf[OFF_TIMESTAMP + 2],
            buf[OFF_TIMESTAMP + 3],
        ]);

        Ok(Frame {
            frame_type,
            data: buf[OFF_DATA..OFF_DATA + declared as usize].to_vec(),
            checksum,
            timestamp,
        })
    }
}

/// Seconds since the Unix epoch, truncated to the wire's `i32`.
pub fn now_timestamp() -> i32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i32)
        .unwrap_or(0)
}
