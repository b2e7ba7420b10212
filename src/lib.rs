//! Sans-I/O HTTP/2 connection core
//!
//! This crate implements the connection- and stream-management layer of an
//! HTTP/2 protocol engine: the frame reader/writer, the per-stream state
//! machine and weighted priority tree, inbound/outbound flow control and the
//! top-level connection handler that sequences preface exchange, settings
//! negotiation and shutdown.
//!
//! The crate performs no I/O of its own. Inbound bytes are pushed into
//! [`handler::ConnectionHandler::on_bytes`] and outbound frames are handed to a
//! [`sink::FrameSink`] provided by the embedder, together with per-write
//! completion callbacks. HPACK is likewise pluggable through the
//! [`headers::HeaderCodec`] trait; a default implementation backed by the
//! `hpack` crate is provided.
//!
//! # Architecture
//!
//! - **Frame reader** ([`reader`]): incremental byte-stream-to-frame decoder
//!   that suspends between calls when input is short.
//! - **Frame writer** ([`writer`]): frame encoder that splits oversized
//!   payloads into CONTINUATION/DATA sequences.
//! - **Connection model** ([`connection`], [`stream`]): stream table,
//!   lifecycle state machine, priority dependency tree, GOAWAY bookkeeping
//!   and listener fan-out.
//! - **Flow control** ([`inbound_flow`], [`outbound_flow`]): receive-window
//!   accounting with threshold-triggered WINDOW_UPDATE emission, and
//!   weighted write-budget distribution over the priority tree.
//! - **Connection handler** ([`handler`]): the protocol state machine gluing
//!   the pieces together.

pub mod connection;
pub mod error;
pub mod frames;
pub mod handler;
pub mod headers;
pub mod inbound_flow;
pub mod listener;
pub mod outbound_flow;
pub mod reader;
pub mod settings;
pub mod sink;
pub mod stream;
pub mod writer;

pub use connection::{Connection, Endpoint};
pub use error::{Error, ErrorCode, Result, StreamError};
pub use frames::{FrameFlags, FrameHeader, FrameType, PrioritySpec};
pub use handler::ConnectionHandler;
pub use headers::{Header, HeaderCodec, HpackCodec};
pub use inbound_flow::LocalFlowController;
pub use listener::{ConnectionListener, FrameListener};
pub use outbound_flow::{FlowControlled, RemoteFlowController};
pub use reader::FrameReader;
pub use settings::{Settings, SettingsBuilder};
pub use sink::{AggregateCompletion, FrameSink, WriteCompletion};
pub use stream::{Stream, StreamId, StreamState};
pub use writer::FrameWriter;

/// HTTP/2 connection preface sent by clients (RFC 7540 Section 3.5)
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Size of the fixed frame header (RFC 7540 Section 4.1)
pub const FRAME_HEADER_LEN: usize = 9;

/// Default initial flow-control window size (65535 bytes)
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;

/// Default maximum frame payload size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;

/// Upper bound on the negotiable frame payload size (2^24 - 1)
pub const MAX_FRAME_SIZE_UPPER_BOUND: u32 = 16_777_215;

/// Default HPACK header table size (4096 bytes)
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4_096;

/// Default priority weight assigned to new streams
pub const DEFAULT_PRIORITY_WEIGHT: u16 = 16;

/// Smallest valid priority weight
pub const MIN_WEIGHT: u16 = 1;

/// Largest valid priority weight
pub const MAX_WEIGHT: u16 = 256;

/// Maximum flow-control window size (2^31 - 1)
pub const MAX_WINDOW_SIZE: i64 = 0x7FFF_FFFF;

/// Maximum stream ID value (2^31 - 1)
pub const MAX_STREAM_ID: u32 = 0x7FFF_FFFF;

/// Stream ID of the connection itself
pub const CONNECTION_STREAM_ID: u32 = 0;
