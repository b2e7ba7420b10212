//! Inbound (local) flow control (RFC 7540 Section 6.9)
//!
//! Tracks how many flow-controlled bytes the peer may still send, per stream
//! and for the connection as a whole, and emits WINDOW_UPDATE frames once the
//! application has consumed enough of what arrived. The window state itself
//! lives on each [`crate::stream::Stream`]; the controller drives it through
//! the connection's stream table.

use crate::connection::Connection;
use crate::error::{Error, ErrorCode, Result, StreamError};
use crate::sink::{discard_completion, FrameSink};
use crate::stream::StreamId;
use crate::writer::FrameWriter;
use crate::{CONNECTION_STREAM_ID, DEFAULT_INITIAL_WINDOW_SIZE, MAX_WINDOW_SIZE};
use tracing::trace;

/// Default fraction of the initial window that may stay unacknowledged
/// before a WINDOW_UPDATE is written
pub const DEFAULT_WINDOW_UPDATE_RATIO: f32 = 0.5;

/// Per-stream inbound window state
///
/// `window` is decremented as frames arrive; `processed` is decremented as
/// the application consumes bytes and restored when a WINDOW_UPDATE goes
/// out. `window <= processed` holds at all times. `lower_bound` admits the
/// temporary deficit caused by shrinking the initial window size.
#[derive(Debug)]
pub struct InboundWindow {
    window: i64,
    processed: i64,
    lower_bound: i64,
}

impl InboundWindow {
    pub(crate) fn new(initial: u32) -> Self {
        InboundWindow {
            window: initial as i64,
            processed: initial as i64,
            lower_bound: 0,
        }
    }

    /// Bytes the peer may still send before exhausting the window
    pub fn window(&self) -> i64 {
        self.window
    }

    /// Window as the application's consumption has acknowledged it
    pub fn processed(&self) -> i64 {
        self.processed
    }

    /// Received bytes not yet consumed by the application
    pub fn unconsumed(&self) -> i64 {
        self.processed - self.window
    }

    fn receive(&mut self, stream_id: StreamId, bytes: i64) -> Result<()> {
        self.window -= bytes;
        if self.window < self.lower_bound {
            if stream_id == CONNECTION_STREAM_ID {
                return Err(Error::connection(
                    ErrorCode::FlowControlError,
                    "connection flow-control window exceeded",
                ));
            }
            return Err(Error::stream(
                stream_id,
                ErrorCode::FlowControlError,
                "stream flow-control window exceeded",
            ));
        }
        Ok(())
    }

    fn consume(&mut self, stream_id: StreamId, bytes: i64) -> Result<()> {
        if bytes > self.unconsumed() {
            return Err(Error::connection(
                ErrorCode::InternalError,
                format!(
                    "consumed {} bytes on stream {} but only {} were received",
                    bytes,
                    stream_id,
                    self.unconsumed()
                ),
            ));
        }
        self.processed -= bytes;
        Ok(())
    }

    fn adjust(&mut self, stream_id: StreamId, delta: i64) -> Result<()> {
        if self.window + delta > MAX_WINDOW_SIZE {
            return Err(Error::stream(
                stream_id,
                ErrorCode::FlowControlError,
                "window size overflow",
            ));
        }
        self.window += delta;
        self.processed += delta;
        // A shrink admits a temporary deficit; a grow revokes it.
        self.lower_bound = if delta < 0 { delta } else { 0 };
        Ok(())
    }
}

/// Controller for data the peer sends to us
///
/// Stateless apart from configuration; every operation reads and writes
/// window state held on the streams themselves.
pub struct LocalFlowController {
    initial_window_size: u32,
    update_ratio: f32,
}

impl LocalFlowController {
    /// Create a controller with the protocol-default initial window and the
    /// default update ratio
    pub fn new() -> Self {
        Self::with_update_ratio(DEFAULT_WINDOW_UPDATE_RATIO)
    }

    /// Create a controller with a custom WINDOW_UPDATE threshold ratio
    ///
    /// The ratio must be strictly between 0 and 1.
    pub fn with_update_ratio(ratio: f32) -> Self {
        assert!(
            ratio > 0.0 && ratio < 1.0,
            "update ratio must be in (0, 1)"
        );
        LocalFlowController {
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            update_ratio: ratio,
        }
    }

    /// The advertised initial window size for new streams
    pub fn initial_window_size(&self) -> u32 {
        self.initial_window_size
    }

    /// Current inbound window for a stream (ID 0 for the connection)
    pub fn window(&self, conn: &Connection, stream_id: StreamId) -> Result<i64> {
        Ok(conn.require_stream(stream_id)?.inbound.window())
    }

    /// Account for received flow-controlled bytes
    ///
    /// `bytes` must include padding. Both the connection window and, when the
    /// stream is still in the table, the stream window are charged. A breach
    /// of the connection window is a connection error; a breach of the
    /// stream's window a stream error.
    pub fn receive_data(
        &mut self,
        conn: &mut Connection,
        stream_id: StreamId,
        bytes: usize,
    ) -> Result<()> {
        let bytes = bytes as i64;
        conn.stream_mut(CONNECTION_STREAM_ID)
            .expect("connection stream")
            .inbound
            .receive(CONNECTION_STREAM_ID, bytes)?;
        if let Some(stream) = conn.stream_mut(stream_id) {
            stream.inbound.receive(stream_id, bytes)?;
        }
        Ok(())
    }

    /// Acknowledge that the application consumed `bytes` on a stream
    ///
    /// Charges both levels; once the processed window of either level drops
    /// to or below `initial * ratio`, a WINDOW_UPDATE restoring it to the
    /// initial size is written. Returns whether any frame was written.
    pub fn consume_bytes(
        &mut self,
        conn: &mut Connection,
        writer: &mut FrameWriter,
        sink: &mut dyn FrameSink,
        stream_id: StreamId,
        bytes: usize,
    ) -> Result<bool> {
        if stream_id == CONNECTION_STREAM_ID {
            return Err(Error::protocol(
                "bytes are consumed per stream, not on the connection stream",
            ));
        }
        if bytes == 0 {
            return Ok(false);
        }
        let bytes = bytes as i64;

        conn.stream_mut(CONNECTION_STREAM_ID)
            .expect("connection stream")
            .inbound
            .consume(CONNECTION_STREAM_ID, bytes)?;
        let mut wrote = self.update_window_if_needed(conn, writer, sink, CONNECTION_STREAM_ID)?;

        // The stream may already be gone; connection-level accounting above
        // still had to happen.
        if conn.stream(stream_id).is_some() {
            conn.stream_mut(stream_id)
                .expect("just checked")
                .inbound
                .consume(stream_id, bytes)?;
            wrote |= self.update_window_if_needed(conn, writer, sink, stream_id)?;
        }
        Ok(wrote)
    }

    fn update_window_if_needed(
        &mut self,
        conn: &mut Connection,
        writer: &mut FrameWriter,
        sink: &mut dyn FrameSink,
        stream_id: StreamId,
    ) -> Result<bool> {
        let threshold = (self.initial_window_size as f32 * self.update_ratio) as i64;
        let initial = self.initial_window_size as i64;
        let stream = conn.stream_mut(stream_id).expect("stream present");
        if stream.inbound.processed > threshold {
            return Ok(false);
        }
        let delta = initial - stream.inbound.processed;
        stream.inbound.processed = initial;
        stream.inbound.window += delta;
        trace!(stream_id, delta, "window update");
        writer.write_window_update(sink, stream_id, delta as u32, discard_completion())?;
        Ok(true)
    }

    /// Change the advertised initial window size
    ///
    /// Applies the delta retroactively to every active stream; per-stream
    /// overflows are collected and reported together while the remaining
    /// streams are still adjusted.
    pub fn set_initial_window_size(&mut self, conn: &mut Connection, size: u32) -> Result<()> {
        if size as i64 > MAX_WINDOW_SIZE {
            return Err(Error::connection(
                ErrorCode::FlowControlError,
                "initial window size exceeds 2^31-1",
            ));
        }
        let delta = size as i64 - self.initial_window_size as i64;
        self.initial_window_size = size;
        conn.set_inbound_initial_window(size);
        if delta == 0 {
            return Ok(());
        }

        let mut failures: Vec<StreamError> = Vec::new();
        let ids: Vec<StreamId> = conn.active_streams().collect();
        for stream_id in ids {
            let stream = conn.stream_mut(stream_id).expect("active stream");
            if let Err(e) = stream.inbound.adjust(stream_id, delta) {
                match e {
                    Error::Stream(se) => failures.push(se),
                    other => return Err(other),
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::CompositeStream(failures))
        }
    }
}

impl Default for LocalFlowController {
    fn default() -> Self {
        Self::new()
    }
}
