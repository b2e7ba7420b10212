//! Outbound (remote) flow control (RFC 7540 Sections 5.3 and 6.9)
//!
//! Payloads the peer must window-accept are queued per stream as
//! [`FlowControlled`] descriptors. When window opens, a distribution pass
//! walks the priority tree: a parent's available bytes are split between its
//! children in proportion to their weights, saturated at each child's
//! subtree demand, and bytes a stream cannot use itself flow through to its
//! descendants. Writes happen only during
//! [`RemoteFlowController::write_pending_frames`], which flushes the sink
//! once at the end of the pass.

use crate::connection::Connection;
use crate::error::{Error, ErrorCode, Result, StreamError};
use crate::frames::PrioritySpec;
use crate::sink::{clone_error, AggregateCompletion, FrameSink, WriteCompletion};
use crate::stream::StreamId;
use crate::writer::FrameWriter;
use crate::{CONNECTION_STREAM_ID, DEFAULT_INITIAL_WINDOW_SIZE, MAX_WINDOW_SIZE};
use bytes::Bytes;
use std::collections::VecDeque;
use tracing::trace;

/// Write capability handed to flow-controlled descriptors during a
/// distribution pass
pub struct WriteContext<'a> {
    /// Destination for encoded frames
    pub sink: &'a mut dyn FrameSink,
    /// Frame encoder honoring the peer's max frame size
    pub writer: &'a mut FrameWriter,
}

/// A queued outbound payload subject to flow control
///
/// DATA frames carry their flow-controlled size; HEADERS (trailers) queue
/// with size zero purely to preserve ordering behind earlier DATA.
pub trait FlowControlled {
    /// Remaining flow-controlled bytes, zero for ordering-only entries
    fn size(&self) -> usize;

    /// Write up to `allowed` flow-controlled bytes; returns the number
    /// actually charged against the windows
    fn write(&mut self, ctx: &mut WriteContext<'_>, allowed: usize) -> Result<usize>;

    /// Whether the payload has been fully written
    fn is_finished(&self) -> bool;

    /// Abort the payload, failing its completion
    fn fail(&mut self, error: Error);
}

/// Per-stream outbound window and send queue
#[derive(Default)]
pub struct OutboundState {
    pub(crate) window: i64,
    pub(crate) pending: VecDeque<Box<dyn FlowControlled>>,
    /// Flow-controlled bytes queued on this stream itself
    pub(crate) pending_bytes: u64,
    /// Flow-controlled bytes queued in this stream's subtree, self included
    pub(crate) pending_bytes_for_tree: u64,
}

impl std::fmt::Debug for OutboundState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundState")
            .field("window", &self.window)
            .field("pending", &self.pending.len())
            .field("pending_bytes", &self.pending_bytes)
            .field("pending_bytes_for_tree", &self.pending_bytes_for_tree)
            .finish()
    }
}

impl OutboundState {
    pub(crate) fn new(initial: u32) -> Self {
        OutboundState {
            window: initial as i64,
            pending: VecDeque::new(),
            pending_bytes: 0,
            pending_bytes_for_tree: 0,
        }
    }

    /// Bytes we may still send before exhausting the peer's window
    pub fn window(&self) -> i64 {
        self.window
    }

    /// Queued flow-controlled bytes awaiting window
    pub fn pending_bytes(&self) -> u64 {
        self.pending_bytes
    }
}

/// A DATA payload under flow control
///
/// Split across writes as window permits; padding and END_STREAM ride on the
/// final fragment. The caller completion fires once every fragment has been
/// written, or with the first failure.
pub struct FlowControlledData {
    stream_id: StreamId,
    data: Bytes,
    padding: u8,
    end_stream: bool,
    aggregate: Option<AggregateCompletion>,
    finished: bool,
}

impl FlowControlledData {
    /// Wrap a DATA payload for queueing
    pub fn new(
        stream_id: StreamId,
        data: Bytes,
        padding: u8,
        end_stream: bool,
        completion: WriteCompletion,
    ) -> Self {
        FlowControlledData {
            stream_id,
            data,
            padding,
            end_stream,
            aggregate: Some(AggregateCompletion::new(completion)),
            finished: false,
        }
    }

    fn padding_overhead(&self) -> usize {
        if self.padding > 0 {
            self.padding as usize + 1
        } else {
            0
        }
    }
}

impl FlowControlled for FlowControlledData {
    fn size(&self) -> usize {
        if self.finished {
            0
        } else {
            self.data.len() + self.padding_overhead()
        }
    }

    fn write(&mut self, ctx: &mut WriteContext<'_>, allowed: usize) -> Result<usize> {
        let overhead = self.padding_overhead();
        let aggregate = self.aggregate.as_ref().expect("not finished");

        if allowed >= self.data.len() + overhead {
            // Final fragment: padding and END_STREAM go out now.
            let data = std::mem::take(&mut self.data);
            let charged = data.len() + overhead;
            ctx.writer.write_data(
                ctx.sink,
                self.stream_id,
                data,
                self.padding,
                self.end_stream,
                aggregate.fork(),
            )?;
            self.finished = true;
            self.aggregate.take().expect("present").seal();
            return Ok(charged);
        }

        // Partial fragment; hold back enough window for the padding so the
        // final fragment can always carry it.
        let chunk_len = allowed.saturating_sub(overhead).min(self.data.len());
        if chunk_len == 0 {
            return Ok(0);
        }
        let chunk = self.data.split_to(chunk_len);
        ctx.writer
            .write_data(ctx.sink, self.stream_id, chunk, 0, false, aggregate.fork())?;
        Ok(chunk_len)
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn fail(&mut self, error: Error) {
        if let Some(aggregate) = self.aggregate.take() {
            let child = aggregate.fork();
            child(Err(error));
            self.finished = true;
        }
    }
}

/// Trailing HEADERS queued behind flow-controlled DATA
///
/// Carries no flow-controlled bytes; queueing it preserves frame ordering on
/// the stream.
pub struct FlowControlledHeaders {
    stream_id: StreamId,
    block: Bytes,
    priority: Option<PrioritySpec>,
    padding: u8,
    end_stream: bool,
    completion: Option<WriteCompletion>,
    finished: bool,
}

impl FlowControlledHeaders {
    /// Wrap an encoded header block for queueing
    pub fn new(
        stream_id: StreamId,
        block: Bytes,
        priority: Option<PrioritySpec>,
        padding: u8,
        end_stream: bool,
        completion: WriteCompletion,
    ) -> Self {
        FlowControlledHeaders {
            stream_id,
            block,
            priority,
            padding,
            end_stream,
            completion: Some(completion),
            finished: false,
        }
    }
}

impl FlowControlled for FlowControlledHeaders {
    fn size(&self) -> usize {
        0
    }

    fn write(&mut self, ctx: &mut WriteContext<'_>, _allowed: usize) -> Result<usize> {
        let completion = self.completion.take().expect("not finished");
        ctx.writer.write_headers(
            ctx.sink,
            self.stream_id,
            std::mem::take(&mut self.block),
            self.priority.take(),
            self.padding,
            self.end_stream,
            completion,
        )?;
        self.finished = true;
        Ok(0)
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn fail(&mut self, error: Error) {
        if let Some(completion) = self.completion.take() {
            completion(Err(error));
            self.finished = true;
        }
    }
}

/// Controller for data we send to the peer
pub struct RemoteFlowController {
    initial_window_size: u32,
}

impl RemoteFlowController {
    /// Create a controller with the protocol-default initial window
    pub fn new() -> Self {
        RemoteFlowController {
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
        }
    }

    /// The peer's advertised initial window size
    pub fn initial_window_size(&self) -> u32 {
        self.initial_window_size
    }

    /// Current outbound window for a stream (ID 0 for the connection)
    pub fn window(&self, conn: &Connection, stream_id: StreamId) -> Result<i64> {
        Ok(conn.require_stream(stream_id)?.outbound.window())
    }

    /// Queue a flow-controlled payload on a stream
    ///
    /// The payload waits until [`Self::write_pending_frames`] grants it
    /// window. Queueing on a closed or absent stream fails the payload
    /// immediately.
    pub fn send_flow_controlled(
        &mut self,
        conn: &mut Connection,
        stream_id: StreamId,
        mut frame: Box<dyn FlowControlled>,
    ) -> Result<()> {
        let sendable = conn
            .stream(stream_id)
            .map(|s| s.state().local_side_open())
            .unwrap_or(false);
        if !sendable {
            let error = Error::stream(
                stream_id,
                ErrorCode::StreamClosed,
                "cannot send on a closed stream",
            );
            frame.fail(clone_error(&error));
            return Err(error);
        }
        let size = frame.size();
        conn.stream_mut(stream_id)
            .expect("just checked")
            .outbound
            .pending
            .push_back(frame);
        conn.add_pending_bytes(stream_id, size as i64);
        trace!(stream_id, size, "flow-controlled payload queued");
        Ok(())
    }

    /// Apply a WINDOW_UPDATE from the peer
    ///
    /// A zero increment and window overflow are protocol violations, scoped
    /// to the stream or to the connection for stream 0.
    pub fn increment_window(
        &mut self,
        conn: &mut Connection,
        stream_id: StreamId,
        increment: u32,
    ) -> Result<()> {
        if increment == 0 {
            if stream_id == CONNECTION_STREAM_ID {
                return Err(Error::protocol("connection WINDOW_UPDATE with zero increment"));
            }
            return Err(Error::stream(
                stream_id,
                ErrorCode::ProtocolError,
                "WINDOW_UPDATE with zero increment",
            ));
        }
        let stream = conn.stream_mut(stream_id).ok_or_else(|| {
            Error::protocol(format!("WINDOW_UPDATE for unknown stream {}", stream_id))
        })?;
        if stream.outbound.window + increment as i64 > MAX_WINDOW_SIZE {
            if stream_id == CONNECTION_STREAM_ID {
                return Err(Error::connection(
                    ErrorCode::FlowControlError,
                    "connection flow-control window overflow",
                ));
            }
            return Err(Error::stream(
                stream_id,
                ErrorCode::FlowControlError,
                "stream flow-control window overflow",
            ));
        }
        stream.outbound.window += increment as i64;
        Ok(())
    }

    /// Apply the peer's SETTINGS_INITIAL_WINDOW_SIZE
    ///
    /// The delta applies retroactively to every active stream's window;
    /// per-stream overflows are collected and reported together while the
    /// remaining streams are still adjusted.
    pub fn set_initial_window_size(&mut self, conn: &mut Connection, size: u32) -> Result<()> {
        if size as i64 > MAX_WINDOW_SIZE {
            return Err(Error::connection(
                ErrorCode::FlowControlError,
                "initial window size exceeds 2^31-1",
            ));
        }
        let delta = size as i64 - self.initial_window_size as i64;
        self.initial_window_size = size;
        conn.set_outbound_initial_window(size);
        if delta == 0 {
            return Ok(());
        }

        let mut failures: Vec<StreamError> = Vec::new();
        let ids: Vec<StreamId> = conn.active_streams().collect();
        for stream_id in ids {
            let stream = conn.stream_mut(stream_id).expect("active stream");
            if stream.outbound.window + delta > MAX_WINDOW_SIZE {
                failures.push(StreamError {
                    stream_id,
                    code: ErrorCode::FlowControlError,
                    message: "window size overflow".into(),
                });
                continue;
            }
            stream.outbound.window += delta;
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::CompositeStream(failures))
        }
    }

    /// Fail every queued payload on a stream that closed or was reset
    pub fn stream_closed(&mut self, conn: &mut Connection, stream_id: StreamId) {
        let Some(stream) = conn.stream_mut(stream_id) else {
            return;
        };
        let mut queue = std::mem::take(&mut stream.outbound.pending);
        let own = stream.outbound.pending_bytes;
        if queue.is_empty() && own == 0 {
            return;
        }
        conn.add_pending_bytes(stream_id, -(own as i64));
        let error = Error::stream(stream_id, ErrorCode::StreamClosed, "stream closed");
        for frame in queue.iter_mut() {
            frame.fail(clone_error(&error));
        }
    }

    /// Distribute the available connection window over queued payloads and
    /// write what it covers
    ///
    /// Bytes flow down the priority tree: siblings split their parent's
    /// allocation proportionally to weight (heaviest first, shares rounded
    /// up, unsatisfied demand carrying into further passes), and anything a
    /// stream cannot use itself passes through to its children. Actual
    /// writes are additionally capped by each stream's own window. The sink
    /// is flushed once per pass.
    pub fn write_pending_frames(
        &mut self,
        conn: &mut Connection,
        ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        let available = conn
            .require_stream(CONNECTION_STREAM_ID)?
            .outbound
            .window()
            .max(0) as u64;

        let mut grants: Vec<(StreamId, u64)> = Vec::new();
        self.allocate(conn, CONNECTION_STREAM_ID, available, &mut grants);

        // Streams holding only ordering entries (trailers) get no byte
        // grants but must still drain.
        let queued: Vec<StreamId> = conn
            .active_streams()
            .filter(|&id| {
                conn.stream(id)
                    .map_or(false, |s| !s.outbound.pending.is_empty())
            })
            .collect();

        for (stream_id, bytes) in grants {
            self.write_allocated(conn, ctx, stream_id, bytes)?;
        }
        for stream_id in queued {
            self.write_allocated(conn, ctx, stream_id, 0)?;
        }
        ctx.sink.flush();
        Ok(())
    }

    /// Allocate `available` bytes among the children of `node`
    fn allocate(
        &self,
        conn: &Connection,
        node: StreamId,
        available: u64,
        grants: &mut Vec<(StreamId, u64)>,
    ) {
        if available == 0 {
            return;
        }
        let Some(parent) = conn.stream(node) else {
            return;
        };
        let mut children: Vec<(StreamId, u64, u16)> = parent
            .children()
            .filter_map(|child| {
                let stream = conn.stream(child)?;
                let demand = stream.outbound.pending_bytes_for_tree;
                (demand > 0).then(|| (child, demand, stream.weight()))
            })
            .collect();
        let total_demand: u64 = children.iter().map(|&(_, d, _)| d).sum();
        if total_demand == 0 {
            return;
        }

        if total_demand <= available {
            // Everything fits; grant full demand and stop subdividing.
            for (child, demand, _) in children {
                self.grant_subtree(conn, child, demand, grants);
            }
            return;
        }

        // Contended: proportional shares by weight, heaviest first. Shares
        // round up, so a pass may hand out slightly more than one exact
        // split; the per-window caps at write time bound the actual bytes.
        children.sort_by(|a, b| b.2.cmp(&a.2));
        let mut need: Vec<u64> = children.iter().map(|&(_, d, _)| d).collect();
        let mut granted: Vec<u64> = vec![0; children.len()];
        let mut remaining = available as i64;
        while remaining > 0 && need.iter().any(|&n| n > 0) {
            let total_weight: u64 = children
                .iter()
                .zip(&need)
                .filter(|&(_, &n)| n > 0)
                .map(|(&(_, _, w), _)| w as u64)
                .sum();
            let budget = remaining as u64;
            for i in 0..children.len() {
                if need[i] == 0 {
                    continue;
                }
                let weight = children[i].2 as u64;
                let share = (budget * weight + total_weight - 1) / total_weight;
                let grant = share.min(need[i]);
                need[i] -= grant;
                granted[i] += grant;
                remaining -= grant as i64;
                if remaining <= 0 {
                    break;
                }
            }
        }
        for (i, &(child, _, _)) in children.iter().enumerate() {
            if granted[i] > 0 {
                self.grant_subtree(conn, child, granted[i], grants);
            }
        }
    }

    /// Give `amount` bytes to a subtree: the stream's own queue first, the
    /// remainder to its children
    fn grant_subtree(
        &self,
        conn: &Connection,
        stream_id: StreamId,
        amount: u64,
        grants: &mut Vec<(StreamId, u64)>,
    ) {
        let Some(stream) = conn.stream(stream_id) else {
            return;
        };
        let own = stream.outbound.pending_bytes.min(amount);
        if own > 0 {
            grants.push((stream_id, own));
        }
        let rest = amount - own;
        if rest > 0 {
            self.allocate(conn, stream_id, rest, grants);
        }
    }

    /// Write a stream's queue front-to-back within its byte grant
    fn write_allocated(
        &mut self,
        conn: &mut Connection,
        ctx: &mut WriteContext<'_>,
        stream_id: StreamId,
        mut budget: u64,
    ) -> Result<()> {
        loop {
            let (stream_window, mut frame) = {
                let Some(stream) = conn.stream_mut(stream_id) else {
                    return Ok(());
                };
                let window = stream.outbound.window.max(0) as u64;
                match stream.outbound.pending.pop_front() {
                    Some(frame) => (window, frame),
                    None => return Ok(()),
                }
            };
            let conn_window = conn
                .stream(CONNECTION_STREAM_ID)
                .expect("connection stream")
                .outbound
                .window
                .max(0) as u64;

            let size = frame.size();
            let cap = budget.min(stream_window).min(conn_window);
            if size > 0 && cap == 0 {
                conn.stream_mut(stream_id)
                    .expect("still present")
                    .outbound
                    .pending
                    .push_front(frame);
                return Ok(());
            }

            let allowed = cap.min(size as u64) as usize;
            let written = match frame.write(ctx, allowed) {
                Ok(written) => written,
                Err(e) => {
                    frame.fail(clone_error(&e));
                    return Err(e);
                }
            };
            let finished = frame.is_finished();
            if !finished {
                conn.stream_mut(stream_id)
                    .expect("still present")
                    .outbound
                    .pending
                    .push_front(frame);
            }
            if written > 0 {
                trace!(stream_id, written, "flow-controlled bytes written");
                conn.stream_mut(stream_id)
                    .expect("still present")
                    .outbound
                    .window -= written as i64;
                conn.stream_mut(CONNECTION_STREAM_ID)
                    .expect("connection stream")
                    .outbound
                    .window -= written as i64;
                conn.add_pending_bytes(stream_id, -(written as i64));
                budget = budget.saturating_sub(written as u64);
            }
            if !finished && written == 0 {
                return Ok(());
            }
        }
    }
}

impl Default for RemoteFlowController {
    fn default() -> Self {
        Self::new()
    }
}
