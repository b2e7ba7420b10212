//! Connection handler
//!
//! Ties the frame reader, frame writer, connection model and both flow
//! controllers into one driver. The embedder feeds inbound bytes through
//! [`ConnectionHandler::on_bytes`] and issues outbound operations through
//! the `send_*` methods; encoded frames leave through the [`FrameSink`]
//! supplied at construction. Stream errors are answered with RST_STREAM and
//! absorbed; connection errors emit GOAWAY and surface to the embedder.

use crate::connection::Connection;
use crate::error::{Error, ErrorCode, Result, StreamError};
use crate::frames::{FrameFlags, PrioritySpec};
use crate::headers::{Header, HeaderCodec};
use crate::inbound_flow::LocalFlowController;
use crate::listener::FrameListener;
use crate::outbound_flow::{
    FlowControlledData, FlowControlledHeaders, RemoteFlowController, WriteContext,
};
use crate::reader::FrameReader;
use crate::settings::Settings;
use crate::sink::{discard_completion, FrameSink, WriteCompletion};
use crate::stream::{StreamId, StreamState};
use crate::writer::FrameWriter;
use crate::{connection::Side, CONNECTION_PREFACE, DEFAULT_HEADER_TABLE_SIZE};
use bytes::{Bytes, BytesMut};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Reader reconfiguration deferred until the read pass returns
enum ReaderUpdate {
    MaxFrameSize(u32),
    HeaderTableSize(u32),
    MaxHeaderListSize(u32),
}

/// Driver for one HTTP/2 connection
pub struct ConnectionHandler {
    connection: Connection,
    reader: FrameReader,
    writer: FrameWriter,
    local_flow: LocalFlowController,
    remote_flow: RemoteFlowController,
    codec: Box<dyn HeaderCodec>,
    listener: Box<dyn FrameListener>,
    sink: Box<dyn FrameSink>,
    local_settings: Settings,
    /// Our SETTINGS awaiting the peer's ACK, oldest first
    outstanding_settings: VecDeque<Settings>,
    /// Peer-advertised HEADER_TABLE_SIZE, bounding our encoder
    encoder_table_size: u32,
    /// Client preface bytes still expected (server side only)
    preface_remaining: &'static [u8],
    preface_sent: bool,
    /// Streams to half-close locally once their END_STREAM write completed
    deferred_closes: Rc<RefCell<Vec<StreamId>>>,
    closing: bool,
}

impl ConnectionHandler {
    /// Create a handler for one connection
    ///
    /// `local_settings` is sent as our initial SETTINGS when
    /// [`Self::start`] runs and applied locally once the peer ACKs it.
    pub fn new(
        server: bool,
        local_settings: Settings,
        codec: Box<dyn HeaderCodec>,
        listener: Box<dyn FrameListener>,
        sink: Box<dyn FrameSink>,
    ) -> Self {
        ConnectionHandler {
            connection: Connection::new(server),
            reader: FrameReader::new(),
            writer: FrameWriter::new(),
            local_flow: LocalFlowController::new(),
            remote_flow: RemoteFlowController::new(),
            codec,
            listener,
            sink,
            local_settings,
            outstanding_settings: VecDeque::new(),
            encoder_table_size: DEFAULT_HEADER_TABLE_SIZE,
            preface_remaining: if server { CONNECTION_PREFACE } else { b"" },
            preface_sent: false,
            deferred_closes: Rc::new(RefCell::new(Vec::new())),
            closing: false,
        }
    }

    /// The connection model
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The connection model, mutably
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    /// Controller for data the peer sends us
    pub fn local_flow(&self) -> &LocalFlowController {
        &self.local_flow
    }

    /// Controller for data we send the peer
    pub fn remote_flow(&self) -> &RemoteFlowController {
        &self.remote_flow
    }

    /// Whether a graceful close has been initiated
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Whether a graceful close has finished draining
    pub fn is_shutdown_complete(&self) -> bool {
        self.closing && self.connection.num_active_streams() == 0
    }

    /// Send the connection preface
    ///
    /// Clients emit the preface string followed by our SETTINGS; servers
    /// emit SETTINGS only. Must run once, before any other write.
    pub fn start(&mut self) {
        if self.preface_sent {
            return;
        }
        self.preface_sent = true;
        if !self.connection.is_server() {
            self.sink
                .write(Bytes::from_static(CONNECTION_PREFACE), discard_completion());
        }
        let settings = self.local_settings.clone();
        self.writer
            .write_settings(&mut *self.sink, &settings, discard_completion());
        self.outstanding_settings.push_back(settings);
        self.sink.flush();
        debug!(server = self.connection.is_server(), "connection preface sent");
    }

    /// Register a connection upgraded from HTTP/1.1
    ///
    /// Stream 1 carries the upgrade request: half-closed toward the side
    /// that sent it.
    pub fn on_http1_upgrade(&mut self) -> Result<()> {
        if self.connection.is_server() {
            self.connection.create_stream(Side::Remote, 1, true)?;
        } else {
            self.connection.create_stream(Side::Local, 1, true)?;
        }
        Ok(())
    }

    /// Feed inbound transport bytes
    ///
    /// Complete frames are decoded and dispatched; a trailing partial frame
    /// stays in `input`. Stream-level protocol violations answer with
    /// RST_STREAM and return `Ok`; connection-level ones emit GOAWAY and
    /// return the error so the embedder tears the transport down.
    pub fn on_bytes(&mut self, input: &mut BytesMut) -> Result<()> {
        loop {
            match self.read_frames(input) {
                // Input exhausted of complete frames.
                Ok(()) => return Ok(()),
                // Stream errors are absorbed with an RST_STREAM and reading
                // continues; connection errors propagate after GOAWAY.
                Err(e) => self.handle_error(e)?,
            }
        }
    }

    fn read_frames(&mut self, input: &mut BytesMut) -> Result<()> {
        self.consume_preface(input)?;

        let mut reader_updates = Vec::new();
        let mut window_opened = false;
        let result = {
            let mut dispatch = InboundDispatch {
                connection: &mut self.connection,
                local_flow: &mut self.local_flow,
                remote_flow: &mut self.remote_flow,
                writer: &mut self.writer,
                sink: &mut *self.sink,
                listener: &mut *self.listener,
                outstanding_settings: &mut self.outstanding_settings,
                encoder_table_size: &mut self.encoder_table_size,
                reader_updates: &mut reader_updates,
                window_opened: &mut window_opened,
            };
            self.reader.read(input, &mut *self.codec, &mut dispatch)
        };
        for update in reader_updates {
            match update {
                ReaderUpdate::MaxFrameSize(v) => self.reader.set_max_frame_size(v),
                ReaderUpdate::HeaderTableSize(v) => self.reader.set_header_table_size(v),
                ReaderUpdate::MaxHeaderListSize(v) => self.reader.set_max_header_list_size(v),
            }
        }
        result?;
        if window_opened {
            self.flush_pending()?;
        }
        Ok(())
    }

    /// Incrementally match the client preface (server side)
    fn consume_preface(&mut self, input: &mut BytesMut) -> Result<()> {
        if self.preface_remaining.is_empty() {
            return Ok(());
        }
        let n = self.preface_remaining.len().min(input.len());
        if input[..n] != self.preface_remaining[..n] {
            return Err(Error::protocol("invalid connection preface"));
        }
        let _ = input.split_to(n);
        self.preface_remaining = &self.preface_remaining[n..];
        Ok(())
    }

    /// Classify and answer a protocol failure
    fn handle_error(&mut self, error: Error) -> Result<()> {
        match error {
            Error::Stream(e) => {
                warn!(stream_id = e.stream_id, code = %e.code, "stream error: {}", e.message);
                self.reset_stream_on_error(&e);
                Ok(())
            }
            Error::CompositeStream(errors) => {
                for e in &errors {
                    warn!(stream_id = e.stream_id, code = %e.code, "stream error: {}", e.message);
                    self.reset_stream_on_error(e);
                }
                Ok(())
            }
            error => {
                let code = error.code();
                warn!(code = %code, "connection error: {}", error);
                let last = self.connection.remote().last_created();
                self.writer.write_goaway(
                    &mut *self.sink,
                    last,
                    code,
                    Bytes::from(error.to_string()),
                    discard_completion(),
                );
                self.sink.flush();
                self.connection.goaway_sent(last, code);
                self.closing = true;
                Err(error)
            }
        }
    }

    fn reset_stream_on_error(&mut self, error: &StreamError) {
        if let Err(e) =
            self.send_rst_stream(error.stream_id, error.code, discard_completion())
        {
            warn!(stream_id = error.stream_id, "failed to reset stream: {}", e);
        }
    }

    /// Send a header set, opening the stream if needed
    ///
    /// With flow-controlled data still queued on the stream, the block is
    /// queued behind it to preserve ordering; otherwise it is written
    /// immediately. `end_stream` half-closes our side once the write
    /// completes.
    pub fn send_headers(
        &mut self,
        stream_id: StreamId,
        headers: &[Header],
        priority: Option<PrioritySpec>,
        padding: u8,
        end_stream: bool,
        completion: WriteCompletion,
    ) -> Result<()> {
        match self.connection.stream(stream_id).map(|s| s.state()) {
            None | Some(StreamState::Idle) | Some(StreamState::ReservedLocal) => {
                self.connection.create_stream(Side::Local, stream_id, false)?;
            }
            Some(state) if state.local_side_open() => {}
            Some(_) => {
                return Err(Error::stream(
                    stream_id,
                    ErrorCode::StreamClosed,
                    "cannot send headers on a closed stream",
                ))
            }
        }
        if let Some(spec) = priority {
            self.connection
                .set_priority(stream_id, spec.dependency, spec.weight, spec.exclusive)?;
        }

        let block = Bytes::from(self.codec.encode(headers, self.encoder_table_size)?);
        let completion = if end_stream {
            self.closing_completion(stream_id, completion)
        } else {
            completion
        };

        let data_queued = self
            .connection
            .stream(stream_id)
            .map_or(false, |s| !s.outbound.pending.is_empty());
        if data_queued {
            trace!(stream_id, "headers queued behind pending data");
            self.remote_flow.send_flow_controlled(
                &mut self.connection,
                stream_id,
                Box::new(FlowControlledHeaders::new(
                    stream_id, block, priority, padding, end_stream, completion,
                )),
            )?;
            self.flush_pending()
        } else {
            self.writer.write_headers(
                &mut *self.sink,
                stream_id,
                block,
                priority,
                padding,
                end_stream,
                completion,
            )?;
            self.sink.flush();
            self.drain_deferred_closes();
            Ok(())
        }
    }

    /// Queue flow-controlled data and write what the current window covers
    pub fn send_data(
        &mut self,
        stream_id: StreamId,
        data: Bytes,
        padding: u8,
        end_stream: bool,
        completion: WriteCompletion,
    ) -> Result<()> {
        let completion = if end_stream {
            self.closing_completion(stream_id, completion)
        } else {
            completion
        };
        self.remote_flow.send_flow_controlled(
            &mut self.connection,
            stream_id,
            Box::new(FlowControlledData::new(
                stream_id, data, padding, end_stream, completion,
            )),
        )?;
        self.flush_pending()
    }

    /// Reprioritize a stream locally and announce it on the wire
    pub fn send_priority(&mut self, stream_id: StreamId, spec: PrioritySpec) -> Result<()> {
        self.connection
            .set_priority(stream_id, spec.dependency, spec.weight, spec.exclusive)?;
        self.writer
            .write_priority(&mut *self.sink, stream_id, spec, discard_completion())?;
        self.sink.flush();
        Ok(())
    }

    /// Reset a stream
    ///
    /// Idempotent: a second reset of the same stream completes without
    /// writing another frame. Queued payloads on the stream fail.
    pub fn send_rst_stream(
        &mut self,
        stream_id: StreamId,
        error_code: ErrorCode,
        completion: WriteCompletion,
    ) -> Result<()> {
        let Some(stream) = self.connection.stream(stream_id) else {
            // No local state, but the peer still needs the reset.
            self.writer
                .write_rst_stream(&mut *self.sink, stream_id, error_code, completion)?;
            self.sink.flush();
            return Ok(());
        };
        if stream.is_reset_sent() {
            completion(Ok(()));
            return Ok(());
        }
        self.connection
            .stream_mut(stream_id)
            .expect("just checked")
            .mark_reset_sent();
        self.remote_flow.stream_closed(&mut self.connection, stream_id);
        self.writer
            .write_rst_stream(&mut *self.sink, stream_id, error_code, completion)?;
        self.sink.flush();
        self.connection.close_stream(stream_id);
        Ok(())
    }

    /// Send a SETTINGS frame; applied locally once the peer ACKs it
    pub fn send_settings(&mut self, settings: Settings) {
        self.writer
            .write_settings(&mut *self.sink, &settings, discard_completion());
        self.sink.flush();
        self.outstanding_settings.push_back(settings);
    }

    /// Send a PING
    pub fn send_ping(&mut self, data: [u8; 8]) {
        self.writer
            .write_ping(&mut *self.sink, false, data, discard_completion());
        self.sink.flush();
    }

    /// Reserve a stream toward the peer with a PUSH_PROMISE
    pub fn send_push_promise(
        &mut self,
        stream_id: StreamId,
        promised_stream_id: StreamId,
        headers: &[Header],
        padding: u8,
        completion: WriteCompletion,
    ) -> Result<()> {
        if !self.connection.remote().push_enabled() {
            return Err(Error::protocol("peer has disabled server push"));
        }
        let parent_open = self
            .connection
            .stream(stream_id)
            .map_or(false, |s| s.state().local_side_open());
        if !parent_open {
            return Err(Error::stream(
                stream_id,
                ErrorCode::StreamClosed,
                "push requires an open associated stream",
            ));
        }
        self.connection
            .create_reserved_stream(Side::Local, promised_stream_id)?;
        let block = Bytes::from(self.codec.encode(headers, self.encoder_table_size)?);
        self.writer.write_push_promise(
            &mut *self.sink,
            stream_id,
            promised_stream_id,
            block,
            padding,
            completion,
        )?;
        self.sink.flush();
        Ok(())
    }

    /// Start a graceful shutdown
    ///
    /// GOAWAY names the highest peer-created stream we processed; streams at
    /// or below it drain normally, everything above is implicitly refused.
    pub fn close_gracefully(&mut self, error_code: ErrorCode, debug_data: Bytes) {
        let last = self.connection.remote().last_created();
        self.writer.write_goaway(
            &mut *self.sink,
            last,
            error_code,
            debug_data,
            discard_completion(),
        );
        self.sink.flush();
        self.connection.goaway_sent(last, error_code);
        self.closing = true;
    }

    /// Acknowledge application consumption of received data
    ///
    /// Replenishes the inbound windows and emits WINDOW_UPDATE frames when
    /// the configured threshold is crossed.
    pub fn consume_bytes(&mut self, stream_id: StreamId, bytes: usize) -> Result<bool> {
        let wrote = self.local_flow.consume_bytes(
            &mut self.connection,
            &mut self.writer,
            &mut *self.sink,
            stream_id,
            bytes,
        )?;
        if wrote {
            self.sink.flush();
        }
        Ok(wrote)
    }

    /// Retry queued flow-controlled writes against the current windows
    pub fn flush_pending(&mut self) -> Result<()> {
        let mut ctx = WriteContext {
            sink: &mut *self.sink,
            writer: &mut self.writer,
        };
        self.remote_flow
            .write_pending_frames(&mut self.connection, &mut ctx)?;
        self.drain_deferred_closes();
        Ok(())
    }

    fn drain_deferred_closes(&mut self) {
        loop {
            let ids: Vec<StreamId> = self.deferred_closes.borrow_mut().drain(..).collect();
            if ids.is_empty() {
                return;
            }
            for stream_id in ids {
                self.connection.close_local_side(stream_id);
            }
        }
    }

    /// Wrap a completion so the stream half-closes after a successful
    /// END_STREAM write
    fn closing_completion(
        &self,
        stream_id: StreamId,
        completion: WriteCompletion,
    ) -> WriteCompletion {
        let closes = Rc::clone(&self.deferred_closes);
        Box::new(move |result| {
            if result.is_ok() {
                closes.borrow_mut().push(stream_id);
            }
            completion(result);
        })
    }
}

/// Per-frame dispatch borrowing the handler's parts while the reader runs
struct InboundDispatch<'a> {
    connection: &'a mut Connection,
    local_flow: &'a mut LocalFlowController,
    remote_flow: &'a mut RemoteFlowController,
    writer: &'a mut FrameWriter,
    sink: &'a mut dyn FrameSink,
    listener: &'a mut dyn FrameListener,
    outstanding_settings: &'a mut VecDeque<Settings>,
    encoder_table_size: &'a mut u32,
    reader_updates: &'a mut Vec<ReaderUpdate>,
    window_opened: &'a mut bool,
}

impl InboundDispatch<'_> {
    fn ignorable(&self, stream_id: StreamId) -> bool {
        self.connection.is_ignorable_stream(stream_id)
    }
}

impl FrameListener for InboundDispatch<'_> {
    fn on_data(
        &mut self,
        stream_id: StreamId,
        data: Bytes,
        padding: u32,
        end_stream: bool,
    ) -> Result<()> {
        let flow_bytes = data.len() + padding as usize;
        // Window accounting happens before any validity check; the peer
        // spent this window either way.
        self.local_flow
            .receive_data(self.connection, stream_id, flow_bytes)?;

        let receivable = self
            .connection
            .stream(stream_id)
            .map_or(false, |s| s.state().remote_side_open());
        if !receivable {
            // Nobody will consume these bytes; return them right away. The
            // stream may live on past the reset, so the connection window
            // must not keep the debit.
            self.local_flow.consume_bytes(
                self.connection,
                self.writer,
                self.sink,
                stream_id,
                flow_bytes,
            )?;
            if self.ignorable(stream_id) {
                trace!(stream_id, "DATA for ignorable stream dropped");
                return Ok(());
            }
            return Err(Error::stream(
                stream_id,
                ErrorCode::StreamClosed,
                "DATA on a stream not open for receiving",
            ));
        }

        if let Err(err) = self.listener.on_data(stream_id, data, padding, end_stream) {
            if !err.is_connection_error() {
                self.local_flow.consume_bytes(
                    self.connection,
                    self.writer,
                    self.sink,
                    stream_id,
                    flow_bytes,
                )?;
            }
            return Err(err);
        }
        if end_stream {
            self.connection.close_remote_side(stream_id);
        }
        Ok(())
    }

    fn on_headers(
        &mut self,
        stream_id: StreamId,
        headers: Vec<Header>,
        priority: Option<PrioritySpec>,
        padding: u32,
        end_stream: bool,
    ) -> Result<()> {
        if self.ignorable(stream_id) {
            trace!(stream_id, "HEADERS for ignorable stream dropped");
            return Ok(());
        }
        let mut trailers = false;
        match self.connection.stream(stream_id).map(|s| s.state()) {
            None
            | Some(StreamState::Idle)
            | Some(StreamState::ReservedLocal)
            | Some(StreamState::ReservedRemote) => {
                self.connection
                    .create_stream(Side::Remote, stream_id, end_stream)?;
            }
            Some(state) if state.remote_side_open() => trailers = true,
            Some(_) => {
                return Err(Error::stream(
                    stream_id,
                    ErrorCode::StreamClosed,
                    "HEADERS on a stream not open for receiving",
                ))
            }
        }
        if let Some(spec) = priority {
            self.connection
                .set_priority(stream_id, spec.dependency, spec.weight, spec.exclusive)?;
        }

        self.listener
            .on_headers(stream_id, headers, priority, padding, end_stream)?;
        if trailers && end_stream {
            self.connection.close_remote_side(stream_id);
        }
        Ok(())
    }

    fn on_priority(&mut self, stream_id: StreamId, spec: PrioritySpec) -> Result<()> {
        self.connection
            .set_priority(stream_id, spec.dependency, spec.weight, spec.exclusive)?;
        self.listener.on_priority(stream_id, spec)
    }

    fn on_rst_stream(&mut self, stream_id: StreamId, error_code: ErrorCode) -> Result<()> {
        match self.connection.stream(stream_id).map(|s| s.state()) {
            None => {
                if self.ignorable(stream_id) {
                    return Ok(());
                }
                return Err(Error::protocol(format!(
                    "RST_STREAM for unknown stream {}",
                    stream_id
                )));
            }
            Some(StreamState::Idle) => {
                return Err(Error::protocol(format!(
                    "RST_STREAM for idle stream {}",
                    stream_id
                )));
            }
            Some(StreamState::Closed) => return Ok(()),
            Some(_) => {}
        }
        self.remote_flow.stream_closed(self.connection, stream_id);
        self.connection.close_stream(stream_id);
        self.listener.on_rst_stream(stream_id, error_code)
    }

    fn on_settings(&mut self, settings: Settings) -> Result<()> {
        // The peer's parameters govern what we send.
        if let Some(size) = settings.header_table_size() {
            *self.encoder_table_size = size;
        }
        if let Some(enabled) = settings.enable_push() {
            self.connection.remote_mut().set_push_enabled(enabled);
        }
        if let Some(max) = settings.max_concurrent_streams() {
            self.connection.local_mut().set_max_active_streams(max);
        }
        if let Some(size) = settings.initial_window_size() {
            self.remote_flow
                .set_initial_window_size(self.connection, size)?;
            *self.window_opened = true;
        }
        if let Some(size) = settings.max_frame_size() {
            self.writer.set_max_frame_size(size);
        }

        self.writer.write_settings_ack(self.sink, discard_completion());
        self.sink.flush();
        self.listener.on_settings(settings)
    }

    fn on_settings_ack(&mut self) -> Result<()> {
        // The oldest outstanding SETTINGS of ours is now in effect; its
        // parameters govern what we accept.
        let Some(settings) = self.outstanding_settings.pop_front() else {
            return Err(Error::protocol("SETTINGS ACK without outstanding settings"));
        };
        if let Some(size) = settings.header_table_size() {
            self.reader_updates.push(ReaderUpdate::HeaderTableSize(size));
        }
        if let Some(enabled) = settings.enable_push() {
            self.connection.local_mut().set_push_enabled(enabled);
        }
        if let Some(max) = settings.max_concurrent_streams() {
            self.connection.remote_mut().set_max_active_streams(max);
        }
        if let Some(size) = settings.initial_window_size() {
            self.local_flow
                .set_initial_window_size(self.connection, size)?;
        }
        if let Some(size) = settings.max_frame_size() {
            self.reader_updates.push(ReaderUpdate::MaxFrameSize(size));
        }
        if let Some(size) = settings.max_header_list_size() {
            self.reader_updates
                .push(ReaderUpdate::MaxHeaderListSize(size));
        }
        self.listener.on_settings_ack()
    }

    fn on_push_promise(
        &mut self,
        stream_id: StreamId,
        promised_stream_id: StreamId,
        headers: Vec<Header>,
        padding: u32,
    ) -> Result<()> {
        if self.connection.is_server() {
            return Err(Error::protocol("client attempted server push"));
        }
        if !self.connection.local().push_enabled() {
            return Err(Error::protocol("push received while disabled"));
        }
        if self.ignorable(stream_id) {
            return Ok(());
        }
        let parent_open = self
            .connection
            .stream(stream_id)
            .map_or(false, |s| s.state().remote_side_open());
        if !parent_open {
            return Err(Error::protocol(format!(
                "PUSH_PROMISE on inactive stream {}",
                stream_id
            )));
        }
        self.connection
            .create_reserved_stream(Side::Remote, promised_stream_id)?;
        self.listener
            .on_push_promise(stream_id, promised_stream_id, headers, padding)
    }

    fn on_ping(&mut self, data: [u8; 8]) -> Result<()> {
        // Acks are automatic and immediate.
        self.writer.write_ping(self.sink, true, data, discard_completion());
        self.sink.flush();
        self.listener.on_ping(data)
    }

    fn on_ping_ack(&mut self, data: [u8; 8]) -> Result<()> {
        self.listener.on_ping_ack(data)
    }

    fn on_goaway(
        &mut self,
        last_stream_id: StreamId,
        error_code: ErrorCode,
        debug_data: Bytes,
    ) -> Result<()> {
        self.connection.goaway_received(last_stream_id, error_code);
        self.listener.on_goaway(last_stream_id, error_code, debug_data)
    }

    fn on_window_update(&mut self, stream_id: StreamId, increment: u32) -> Result<()> {
        if stream_id != 0 && self.connection.stream(stream_id).is_none() {
            if self.ignorable(stream_id) {
                return Ok(());
            }
            return Err(Error::protocol(format!(
                "WINDOW_UPDATE for unknown stream {}",
                stream_id
            )));
        }
        self.remote_flow
            .increment_window(self.connection, stream_id, increment)?;
        *self.window_opened = true;
        self.listener.on_window_update(stream_id, increment)
    }

    fn on_unknown_frame(
        &mut self,
        frame_type: u8,
        flags: FrameFlags,
        stream_id: StreamId,
        payload: Bytes,
    ) -> Result<()> {
        self.listener
            .on_unknown_frame(frame_type, flags, stream_id, payload)
    }
}
