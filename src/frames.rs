//! HTTP/2 frame primitives
//!
//! Frame types, flags, the fixed 9-byte frame header and the 5-byte priority
//! section shared by HEADERS and PRIORITY frames (RFC 7540 Section 4 and 6).

use crate::{FRAME_HEADER_LEN, MAX_STREAM_ID};
use bytes::{Buf, BufMut};
use std::fmt;

/// HTTP/2 frame types (RFC 7540 Section 6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// DATA frame (0x0)
    Data = 0x0,
    /// HEADERS frame (0x1)
    Headers = 0x1,
    /// PRIORITY frame (0x2)
    Priority = 0x2,
    /// RST_STREAM frame (0x3)
    RstStream = 0x3,
    /// SETTINGS frame (0x4)
    Settings = 0x4,
    /// PUSH_PROMISE frame (0x5)
    PushPromise = 0x5,
    /// PING frame (0x6)
    Ping = 0x6,
    /// GOAWAY frame (0x7)
    Goaway = 0x7,
    /// WINDOW_UPDATE frame (0x8)
    WindowUpdate = 0x8,
    /// CONTINUATION frame (0x9)
    Continuation = 0x9,
}

impl FrameType {
    /// Convert frame type to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create frame type from u8; `None` for extension types
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(FrameType::Data),
            0x1 => Some(FrameType::Headers),
            0x2 => Some(FrameType::Priority),
            0x3 => Some(FrameType::RstStream),
            0x4 => Some(FrameType::Settings),
            0x5 => Some(FrameType::PushPromise),
            0x6 => Some(FrameType::Ping),
            0x7 => Some(FrameType::Goaway),
            0x8 => Some(FrameType::WindowUpdate),
            0x9 => Some(FrameType::Continuation),
            _ => None,
        }
    }

    /// Get frame type name
    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Headers => "HEADERS",
            FrameType::Priority => "PRIORITY",
            FrameType::RstStream => "RST_STREAM",
            FrameType::Settings => "SETTINGS",
            FrameType::PushPromise => "PUSH_PROMISE",
            FrameType::Ping => "PING",
            FrameType::Goaway => "GOAWAY",
            FrameType::WindowUpdate => "WINDOW_UPDATE",
            FrameType::Continuation => "CONTINUATION",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u8())
    }
}

/// HTTP/2 frame flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// END_STREAM flag (0x1)
    pub const END_STREAM: u8 = 0x1;

    /// ACK flag (0x1) - used for SETTINGS and PING
    pub const ACK: u8 = 0x1;

    /// END_HEADERS flag (0x4)
    pub const END_HEADERS: u8 = 0x4;

    /// PADDED flag (0x8)
    pub const PADDED: u8 = 0x8;

    /// PRIORITY flag (0x20)
    pub const PRIORITY: u8 = 0x20;

    /// Create empty flags
    pub fn empty() -> Self {
        FrameFlags(0)
    }

    /// Create from u8
    pub fn from_u8(flags: u8) -> Self {
        FrameFlags(flags)
    }

    /// Get raw u8 value
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Set a flag
    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    /// Check if a flag is set
    pub fn is_set(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    /// Check if END_STREAM is set
    pub fn is_end_stream(&self) -> bool {
        self.is_set(Self::END_STREAM)
    }

    /// Check if ACK is set
    pub fn is_ack(&self) -> bool {
        self.is_set(Self::ACK)
    }

    /// Check if END_HEADERS is set
    pub fn is_end_headers(&self) -> bool {
        self.is_set(Self::END_HEADERS)
    }

    /// Check if PADDED is set
    pub fn is_padded(&self) -> bool {
        self.is_set(Self::PADDED)
    }

    /// Check if PRIORITY is set
    pub fn is_priority(&self) -> bool {
        self.is_set(Self::PRIORITY)
    }
}

/// Decoded 9-byte frame header (RFC 7540 Section 4.1)
///
/// The type byte is kept raw so extension frames pass through unharmed;
/// [`FrameHeader::frame_type`] resolves it to a known [`FrameType`].
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Declared payload length (24 bits)
    pub length: u32,
    /// Raw frame type byte
    pub raw_type: u8,
    /// Frame flags
    pub flags: FrameFlags,
    /// Stream ID (31 bits, reserved high bit stripped)
    pub stream_id: u32,
}

impl FrameHeader {
    /// Decode a header from exactly [`FRAME_HEADER_LEN`] bytes
    pub fn decode(bytes: &[u8; FRAME_HEADER_LEN]) -> Self {
        let length =
            ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32);
        let raw_type = bytes[3];
        let flags = FrameFlags::from_u8(bytes[4]);
        // Reserved high bit is ignored on read
        let stream_id = ((bytes[5] as u32 & 0x7F) << 24)
            | ((bytes[6] as u32) << 16)
            | ((bytes[7] as u32) << 8)
            | (bytes[8] as u32);

        FrameHeader {
            length,
            raw_type,
            flags,
            stream_id,
        }
    }

    /// Encode a header into a buffer
    pub fn encode<B: BufMut>(
        buf: &mut B,
        length: usize,
        raw_type: u8,
        flags: FrameFlags,
        stream_id: u32,
    ) {
        buf.put_u8(((length >> 16) & 0xFF) as u8);
        buf.put_u8(((length >> 8) & 0xFF) as u8);
        buf.put_u8((length & 0xFF) as u8);
        buf.put_u8(raw_type);
        buf.put_u8(flags.as_u8());
        buf.put_u32(stream_id & MAX_STREAM_ID);
    }

    /// Resolve the raw type byte, `None` for extension frames
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_u8(self.raw_type)
    }

    /// Whether this frame is addressed to the connection itself
    pub fn is_connection_frame(&self) -> bool {
        self.stream_id == 0
    }
}

/// Priority section of HEADERS and PRIORITY frames (RFC 7540 Section 6.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrioritySpec {
    /// Stream this one depends on
    pub dependency: u32,
    /// Exclusive dependency flag
    pub exclusive: bool,
    /// Weight (1-256)
    pub weight: u16,
}

impl PrioritySpec {
    /// Wire size of the priority section
    pub const WIRE_LEN: usize = 5;

    /// Create a new priority specification
    pub fn new(dependency: u32, exclusive: bool, weight: u16) -> Self {
        PrioritySpec {
            dependency,
            exclusive,
            weight,
        }
    }

    /// Decode the 5-byte priority section
    ///
    /// The wire carries weight as one byte biased by 1, giving 1-256.
    pub fn decode<B: Buf>(buf: &mut B) -> Self {
        let word = buf.get_u32();
        let weight = buf.get_u8() as u16 + 1;
        PrioritySpec {
            dependency: word & MAX_STREAM_ID,
            exclusive: word & 0x8000_0000 != 0,
            weight,
        }
    }

    /// Encode the 5-byte priority section
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        let mut word = self.dependency & MAX_STREAM_ID;
        if self.exclusive {
            word |= 0x8000_0000;
        }
        buf.put_u32(word);
        buf.put_u8((self.weight - 1) as u8);
    }
}
