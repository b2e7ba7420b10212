//! HTTP/2 frame reader
//!
//! Incremental byte-stream-to-frame decoder: bytes accumulate in the
//! caller's buffer and only complete frames are consumed, so arbitrary
//! fragmentation (including mid-frame-header) is handled. Header blocks are
//! coalesced across CONTINUATION frames and decoded as one unit before the
//! listener sees them. A connection-level error poisons the reader; later
//! input is discarded.

use crate::error::{Error, ErrorCode, Result};
use crate::frames::{FrameFlags, FrameHeader, FrameType, PrioritySpec};
use crate::headers::HeaderCodec;
use crate::listener::FrameListener;
use crate::settings::Settings;
use crate::{
    DEFAULT_HEADER_TABLE_SIZE, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_LEN, MAX_STREAM_ID,
    MAX_WINDOW_SIZE,
};
use bytes::{Buf, Bytes, BytesMut};
use tracing::{trace, warn};

#[derive(Clone, Copy)]
enum ReadState {
    /// Waiting for a complete 9-byte frame header
    Header,
    /// Header parsed, waiting for the complete payload
    Payload(FrameHeader),
}

enum HeaderKind {
    Headers {
        priority: Option<PrioritySpec>,
        end_stream: bool,
    },
    PushPromise {
        promised_stream_id: u32,
    },
}

/// A header block spanning an initial frame plus CONTINUATIONs
struct HeadersInProgress {
    stream_id: u32,
    kind: HeaderKind,
    block: BytesMut,
    padding: u32,
}

/// Byte-stream decoder feeding a [`FrameListener`]
pub struct FrameReader {
    state: ReadState,
    headers: Option<HeadersInProgress>,
    max_frame_size: u32,
    max_header_list_size: u32,
    header_table_size: u32,
    failed: bool,
}

impl FrameReader {
    /// Create a reader with protocol-default limits
    pub fn new() -> Self {
        FrameReader {
            state: ReadState::Header,
            headers: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_header_list_size: u32::MAX,
            header_table_size: DEFAULT_HEADER_TABLE_SIZE,
            failed: false,
        }
    }

    /// The largest frame payload we accept
    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Apply our acknowledged SETTINGS_MAX_FRAME_SIZE
    pub fn set_max_frame_size(&mut self, size: u32) {
        self.max_frame_size = size;
    }

    /// Apply our acknowledged SETTINGS_MAX_HEADER_LIST_SIZE
    pub fn set_max_header_list_size(&mut self, size: u32) {
        self.max_header_list_size = size;
    }

    /// Apply our acknowledged SETTINGS_HEADER_TABLE_SIZE
    pub fn set_header_table_size(&mut self, size: u32) {
        self.header_table_size = size;
    }

    /// Decode every complete frame in `input`
    ///
    /// Consumed bytes are removed from `input`; a trailing partial frame
    /// stays for the next call. Frames are dispatched to `listener` in wire
    /// order. Connection-level errors leave the reader poisoned.
    pub fn read(
        &mut self,
        input: &mut BytesMut,
        codec: &mut dyn HeaderCodec,
        listener: &mut dyn FrameListener,
    ) -> Result<()> {
        if self.failed {
            // The connection is being torn down; drop whatever trails the
            // fatal frame.
            input.clear();
            return Ok(());
        }
        loop {
            match self.state {
                ReadState::Header => {
                    if input.len() < FRAME_HEADER_LEN {
                        return Ok(());
                    }
                    let mut raw = [0u8; FRAME_HEADER_LEN];
                    raw.copy_from_slice(&input.split_to(FRAME_HEADER_LEN));
                    let header = FrameHeader::decode(&raw);
                    if header.length > self.max_frame_size {
                        return self.fail(Error::frame_size(format!(
                            "frame length {} exceeds max frame size {}",
                            header.length, self.max_frame_size
                        )));
                    }
                    self.state = ReadState::Payload(header);
                }
                ReadState::Payload(header) => {
                    if input.len() < header.length as usize {
                        return Ok(());
                    }
                    let payload = input.split_to(header.length as usize).freeze();
                    self.state = ReadState::Header;
                    if let Err(e) = self.process_frame(header, payload, codec, listener) {
                        if e.is_connection_error() {
                            return self.fail(e);
                        }
                        return Err(e);
                    }
                }
            }
        }
    }

    fn fail(&mut self, error: Error) -> Result<()> {
        self.failed = true;
        Err(error)
    }

    fn process_frame(
        &mut self,
        header: FrameHeader,
        payload: Bytes,
        codec: &mut dyn HeaderCodec,
        listener: &mut dyn FrameListener,
    ) -> Result<()> {
        trace!(
            frame_type = header.raw_type,
            stream_id = header.stream_id,
            length = header.length,
            "frame received"
        );

        // An unterminated header block admits only its own CONTINUATIONs.
        if let Some(in_progress) = &self.headers {
            let continues = header.frame_type() == Some(FrameType::Continuation)
                && header.stream_id == in_progress.stream_id;
            if !continues {
                return Err(Error::protocol(format!(
                    "expected CONTINUATION for stream {}, got frame type {} on stream {}",
                    in_progress.stream_id, header.raw_type, header.stream_id
                )));
            }
        }

        match header.frame_type() {
            Some(FrameType::Data) => self.read_data(header, payload, listener),
            Some(FrameType::Headers) => self.read_headers(header, payload, codec, listener),
            Some(FrameType::Priority) => self.read_priority(header, payload, listener),
            Some(FrameType::RstStream) => self.read_rst_stream(header, payload, listener),
            Some(FrameType::Settings) => self.read_settings(header, payload, listener),
            Some(FrameType::PushPromise) => {
                self.read_push_promise(header, payload, codec, listener)
            }
            Some(FrameType::Ping) => self.read_ping(header, payload, listener),
            Some(FrameType::Goaway) => self.read_goaway(header, payload, listener),
            Some(FrameType::WindowUpdate) => self.read_window_update(header, payload, listener),
            Some(FrameType::Continuation) => {
                self.read_continuation(header, payload, codec, listener)
            }
            None => {
                // Extension frames pass through untouched.
                listener.on_unknown_frame(header.raw_type, header.flags, header.stream_id, payload)
            }
        }
    }

    /// Strip the pad-length octet and trailing padding
    ///
    /// Returns the flow-controlled padding: pad bytes plus the length octet.
    fn strip_padding(header: &FrameHeader, payload: &mut Bytes) -> Result<u32> {
        if !header.flags.is_padded() {
            return Ok(0);
        }
        if payload.is_empty() {
            return Err(Error::frame_size("PADDED frame too short for pad length"));
        }
        let pad = payload.get_u8() as usize;
        if pad > payload.len() {
            return Err(Error::protocol(format!(
                "pad length {} exceeds remaining payload {}",
                pad,
                payload.len()
            )));
        }
        payload.truncate(payload.len() - pad);
        Ok(pad as u32 + 1)
    }

    fn read_data(
        &mut self,
        header: FrameHeader,
        mut payload: Bytes,
        listener: &mut dyn FrameListener,
    ) -> Result<()> {
        if header.stream_id == 0 {
            return Err(Error::protocol("DATA frame on the connection stream"));
        }
        let padding = Self::strip_padding(&header, &mut payload)?;
        listener.on_data(
            header.stream_id,
            payload,
            padding,
            header.flags.is_end_stream(),
        )
    }

    fn read_headers(
        &mut self,
        header: FrameHeader,
        mut payload: Bytes,
        codec: &mut dyn HeaderCodec,
        listener: &mut dyn FrameListener,
    ) -> Result<()> {
        if header.stream_id == 0 {
            return Err(Error::protocol("HEADERS frame on the connection stream"));
        }
        let padding = Self::strip_padding(&header, &mut payload)?;
        let priority = if header.flags.is_priority() {
            if payload.len() < PrioritySpec::WIRE_LEN {
                return Err(Error::frame_size("HEADERS frame too short for priority"));
            }
            let spec = PrioritySpec::decode(&mut payload);
            if spec.dependency == header.stream_id {
                return Err(Error::protocol(format!(
                    "stream {} cannot depend on itself",
                    header.stream_id
                )));
            }
            Some(spec)
        } else {
            None
        };

        Self::check_block_size(payload.len(), self.max_header_list_size)?;
        self.headers = Some(HeadersInProgress {
            stream_id: header.stream_id,
            kind: HeaderKind::Headers {
                priority,
                end_stream: header.flags.is_end_stream(),
            },
            block: BytesMut::from(&payload[..]),
            padding,
        });
        if header.flags.is_end_headers() {
            self.finish_headers(codec, listener)?;
        }
        Ok(())
    }

    fn read_push_promise(
        &mut self,
        header: FrameHeader,
        mut payload: Bytes,
        codec: &mut dyn HeaderCodec,
        listener: &mut dyn FrameListener,
    ) -> Result<()> {
        if header.stream_id == 0 {
            return Err(Error::protocol(
                "PUSH_PROMISE frame on the connection stream",
            ));
        }
        let padding = Self::strip_padding(&header, &mut payload)?;
        if payload.len() < 4 {
            return Err(Error::frame_size(
                "PUSH_PROMISE frame too short for promised stream ID",
            ));
        }
        let promised_stream_id = payload.get_u32() & MAX_STREAM_ID;
        if promised_stream_id == 0 {
            return Err(Error::protocol("PUSH_PROMISE promising stream 0"));
        }

        Self::check_block_size(payload.len(), self.max_header_list_size)?;
        self.headers = Some(HeadersInProgress {
            stream_id: header.stream_id,
            kind: HeaderKind::PushPromise { promised_stream_id },
            block: BytesMut::from(&payload[..]),
            padding,
        });
        if header.flags.is_end_headers() {
            self.finish_headers(codec, listener)?;
        }
        Ok(())
    }

    fn read_continuation(
        &mut self,
        header: FrameHeader,
        payload: Bytes,
        codec: &mut dyn HeaderCodec,
        listener: &mut dyn FrameListener,
    ) -> Result<()> {
        let Some(in_progress) = &mut self.headers else {
            return Err(Error::protocol(format!(
                "CONTINUATION on stream {} without open header block",
                header.stream_id
            )));
        };
        in_progress.block.extend_from_slice(&payload);
        // Every decoded field is at least as large as its encoded bytes, so
        // a block already past the list limit can be rejected before the
        // remaining fragments are buffered.
        Self::check_block_size(in_progress.block.len(), self.max_header_list_size)?;
        if header.flags.is_end_headers() {
            self.finish_headers(codec, listener)?;
        }
        Ok(())
    }

    fn check_block_size(accumulated: usize, limit: u32) -> Result<()> {
        if accumulated as u64 > limit as u64 {
            return Err(Error::connection(
                ErrorCode::EnhanceYourCalm,
                format!("header block of {} bytes exceeds limit {}", accumulated, limit),
            ));
        }
        Ok(())
    }

    fn finish_headers(
        &mut self,
        codec: &mut dyn HeaderCodec,
        listener: &mut dyn FrameListener,
    ) -> Result<()> {
        let in_progress = self.headers.take().expect("header block in progress");
        let headers = codec.decode(
            &in_progress.block,
            self.max_header_list_size,
            self.header_table_size,
        )?;
        match in_progress.kind {
            HeaderKind::Headers {
                priority,
                end_stream,
            } => listener.on_headers(
                in_progress.stream_id,
                headers,
                priority,
                in_progress.padding,
                end_stream,
            ),
            HeaderKind::PushPromise { promised_stream_id } => listener.on_push_promise(
                in_progress.stream_id,
                promised_stream_id,
                headers,
                in_progress.padding,
            ),
        }
    }

    fn read_priority(
        &mut self,
        header: FrameHeader,
        mut payload: Bytes,
        listener: &mut dyn FrameListener,
    ) -> Result<()> {
        if header.stream_id == 0 {
            return Err(Error::protocol("PRIORITY frame on the connection stream"));
        }
        if header.length as usize != PrioritySpec::WIRE_LEN {
            return Err(Error::stream(
                header.stream_id,
                ErrorCode::FrameSizeError,
                format!("PRIORITY frame with length {}", header.length),
            ));
        }
        let spec = PrioritySpec::decode(&mut payload);
        if spec.dependency == header.stream_id {
            return Err(Error::protocol(format!(
                "stream {} cannot depend on itself",
                header.stream_id
            )));
        }
        listener.on_priority(header.stream_id, spec)
    }

    fn read_rst_stream(
        &mut self,
        header: FrameHeader,
        mut payload: Bytes,
        listener: &mut dyn FrameListener,
    ) -> Result<()> {
        if header.stream_id == 0 {
            return Err(Error::protocol("RST_STREAM frame on the connection stream"));
        }
        if header.length != 4 {
            return Err(Error::frame_size(format!(
                "RST_STREAM frame with length {}",
                header.length
            )));
        }
        let code = payload.get_u32();
        let code = ErrorCode::from_u32(code).unwrap_or(ErrorCode::InternalError);
        listener.on_rst_stream(header.stream_id, code)
    }

    fn read_settings(
        &mut self,
        header: FrameHeader,
        mut payload: Bytes,
        listener: &mut dyn FrameListener,
    ) -> Result<()> {
        if header.stream_id != 0 {
            return Err(Error::protocol("SETTINGS frame on a stream"));
        }
        if header.flags.is_ack() {
            if header.length != 0 {
                return Err(Error::frame_size("SETTINGS ACK with a payload"));
            }
            return listener.on_settings_ack();
        }
        if header.length % 6 != 0 {
            return Err(Error::frame_size(format!(
                "SETTINGS frame length {} not a multiple of 6",
                header.length
            )));
        }
        let mut settings = Settings::new();
        while payload.has_remaining() {
            let id = payload.get_u16();
            let value = payload.get_u32();
            settings.apply_raw(id, value)?;
        }
        listener.on_settings(settings)
    }

    fn read_ping(
        &mut self,
        header: FrameHeader,
        mut payload: Bytes,
        listener: &mut dyn FrameListener,
    ) -> Result<()> {
        if header.stream_id != 0 {
            return Err(Error::protocol("PING frame on a stream"));
        }
        if header.length != 8 {
            return Err(Error::frame_size(format!(
                "PING frame with length {}",
                header.length
            )));
        }
        let mut data = [0u8; 8];
        payload.copy_to_slice(&mut data);
        if header.flags.is_ack() {
            listener.on_ping_ack(data)
        } else {
            listener.on_ping(data)
        }
    }

    fn read_goaway(
        &mut self,
        header: FrameHeader,
        mut payload: Bytes,
        listener: &mut dyn FrameListener,
    ) -> Result<()> {
        if header.stream_id != 0 {
            return Err(Error::protocol("GOAWAY frame on a stream"));
        }
        if header.length < 8 {
            return Err(Error::frame_size(format!(
                "GOAWAY frame with length {}",
                header.length
            )));
        }
        let last_stream_id = payload.get_u32() & MAX_STREAM_ID;
        let raw_code = payload.get_u32();
        let code = ErrorCode::from_u32(raw_code).unwrap_or_else(|| {
            warn!(raw_code, "unrecognized GOAWAY error code");
            ErrorCode::InternalError
        });
        listener.on_goaway(last_stream_id, code, payload)
    }

    fn read_window_update(
        &mut self,
        header: FrameHeader,
        mut payload: Bytes,
        listener: &mut dyn FrameListener,
    ) -> Result<()> {
        if header.length != 4 {
            return Err(Error::frame_size(format!(
                "WINDOW_UPDATE frame with length {}",
                header.length
            )));
        }
        let increment = payload.get_u32() & (MAX_WINDOW_SIZE as u32);
        listener.on_window_update(header.stream_id, increment)
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::{Header, HpackCodec};
    use crate::sink::discard_completion;
    use crate::writer::FrameWriter;
    use crate::SettingsBuilder;

    #[derive(Default)]
    struct Recorder {
        data: Vec<(u32, Bytes, u32, bool)>,
        headers: Vec<(u32, Vec<Header>, Option<PrioritySpec>, bool)>,
        priorities: Vec<(u32, PrioritySpec)>,
        resets: Vec<(u32, ErrorCode)>,
        settings: Vec<Settings>,
        settings_acks: usize,
        pings: Vec<[u8; 8]>,
        ping_acks: Vec<[u8; 8]>,
        goaways: Vec<(u32, ErrorCode, Bytes)>,
        window_updates: Vec<(u32, u32)>,
        unknown: Vec<(u8, u32)>,
    }

    impl FrameListener for Recorder {
        fn on_data(&mut self, stream_id: u32, data: Bytes, padding: u32, end: bool) -> Result<()> {
            self.data.push((stream_id, data, padding, end));
            Ok(())
        }
        fn on_headers(
            &mut self,
            stream_id: u32,
            headers: Vec<Header>,
            priority: Option<PrioritySpec>,
            _padding: u32,
            end_stream: bool,
        ) -> Result<()> {
            self.headers.push((stream_id, headers, priority, end_stream));
            Ok(())
        }
        fn on_priority(&mut self, stream_id: u32, spec: PrioritySpec) -> Result<()> {
            self.priorities.push((stream_id, spec));
            Ok(())
        }
        fn on_rst_stream(&mut self, stream_id: u32, code: ErrorCode) -> Result<()> {
            self.resets.push((stream_id, code));
            Ok(())
        }
        fn on_settings(&mut self, settings: Settings) -> Result<()> {
            self.settings.push(settings);
            Ok(())
        }
        fn on_settings_ack(&mut self) -> Result<()> {
            self.settings_acks += 1;
            Ok(())
        }
        fn on_ping(&mut self, data: [u8; 8]) -> Result<()> {
            self.pings.push(data);
            Ok(())
        }
        fn on_ping_ack(&mut self, data: [u8; 8]) -> Result<()> {
            self.ping_acks.push(data);
            Ok(())
        }
        fn on_goaway(&mut self, last: u32, code: ErrorCode, debug: Bytes) -> Result<()> {
            self.goaways.push((last, code, debug));
            Ok(())
        }
        fn on_window_update(&mut self, stream_id: u32, increment: u32) -> Result<()> {
            self.window_updates.push((stream_id, increment));
            Ok(())
        }
        fn on_unknown_frame(
            &mut self,
            frame_type: u8,
            _flags: FrameFlags,
            stream_id: u32,
            _payload: Bytes,
        ) -> Result<()> {
            self.unknown.push((frame_type, stream_id));
            Ok(())
        }
    }

    struct BufSink(BytesMut);
    impl crate::sink::FrameSink for BufSink {
        fn write(&mut self, bytes: Bytes, completion: crate::sink::WriteCompletion) {
            self.0.extend_from_slice(&bytes);
            completion(Ok(()));
        }
        fn flush(&mut self) {}
    }

    fn sample_headers() -> Vec<Header> {
        vec![
            (b":method".to_vec(), b"GET".to_vec()),
            (b":path".to_vec(), b"/".to_vec()),
        ]
    }

    fn read_all(input: &mut BytesMut, recorder: &mut Recorder) -> Result<()> {
        let mut reader = FrameReader::new();
        let mut codec = HpackCodec::new();
        reader.read(input, &mut codec, recorder)
    }

    #[test]
    fn test_data_then_settings() {
        let mut writer = FrameWriter::new();
        let mut sink = BufSink(BytesMut::new());
        writer
            .write_data(
                &mut sink,
                1,
                Bytes::from_static(b"payload"),
                0,
                false,
                discard_completion(),
            )
            .unwrap();
        let settings = SettingsBuilder::new().initial_window_size(1).build().unwrap();
        writer.write_settings(&mut sink, &settings, discard_completion());

        let mut recorder = Recorder::default();
        read_all(&mut sink.0, &mut recorder).unwrap();

        assert_eq!(recorder.data.len(), 1);
        assert_eq!(&recorder.data[0].1[..], b"payload");
        assert_eq!(recorder.settings.len(), 1);
        assert_eq!(recorder.settings[0].initial_window_size(), Some(1));
    }

    #[test]
    fn test_empty_settings_frame() {
        let mut buf = BytesMut::new();
        FrameHeader::encode(&mut buf, 0, FrameType::Settings.as_u8(), FrameFlags::empty(), 0);

        let mut recorder = Recorder::default();
        read_all(&mut buf, &mut recorder).unwrap();
        assert_eq!(recorder.settings.len(), 1);
        assert!(recorder.settings[0].is_empty());
    }

    #[test]
    fn test_fragmented_input() {
        let mut writer = FrameWriter::new();
        let mut sink = BufSink(BytesMut::new());
        writer.write_ping(&mut sink, false, [1, 2, 3, 4, 5, 6, 7, 8], discard_completion());
        let wire = sink.0.freeze();

        let mut reader = FrameReader::new();
        let mut codec = HpackCodec::new();
        let mut recorder = Recorder::default();
        let mut input = BytesMut::new();

        // One byte at a time, including a split inside the frame header
        for byte in wire.iter() {
            input.extend_from_slice(&[*byte]);
            reader.read(&mut input, &mut codec, &mut recorder).unwrap();
        }
        assert_eq!(recorder.pings, vec![[1, 2, 3, 4, 5, 6, 7, 8]]);
        assert!(input.is_empty());
    }

    #[test]
    fn test_headers_coalesced_across_continuations() {
        let mut writer = FrameWriter::new();
        writer.set_max_frame_size(16_384);
        let mut codec = HpackCodec::new();
        let mut headers = sample_headers();
        // Force a block larger than one frame
        headers.push((b"x-filler".to_vec(), vec![b'a'; 40_000]));
        let block = codec.encode(&headers, crate::DEFAULT_HEADER_TABLE_SIZE).unwrap();

        let mut sink = BufSink(BytesMut::new());
        writer
            .write_headers(
                &mut sink,
                5,
                Bytes::from(block),
                None,
                0,
                true,
                discard_completion(),
            )
            .unwrap();

        let mut reader = FrameReader::new();
        let mut decode_codec = HpackCodec::new();
        let mut recorder = Recorder::default();
        reader
            .read(&mut sink.0, &mut decode_codec, &mut recorder)
            .unwrap();

        assert_eq!(recorder.headers.len(), 1);
        let (stream_id, decoded, priority, end_stream) = &recorder.headers[0];
        assert_eq!(*stream_id, 5);
        assert_eq!(decoded.len(), 3);
        assert!(priority.is_none());
        assert!(end_stream);
    }

    #[test]
    fn test_interleaved_frame_during_headers_is_connection_error() {
        let mut writer = FrameWriter::new();
        let mut sink = BufSink(BytesMut::new());
        // HEADERS without END_HEADERS, built by hand
        let mut buf = BytesMut::new();
        FrameHeader::encode(&mut buf, 3, FrameType::Headers.as_u8(), FrameFlags::empty(), 1);
        buf.extend_from_slice(b"abc");
        sink.0.extend_from_slice(&buf);
        writer.write_ping(&mut sink, false, [0; 8], discard_completion());

        let mut recorder = Recorder::default();
        let err = read_all(&mut sink.0, &mut recorder).unwrap_err();
        assert!(err.is_connection_error());
        assert_eq!(err.code(), ErrorCode::ProtocolError);
    }

    #[test]
    fn test_continuation_without_headers_is_connection_error() {
        let mut buf = BytesMut::new();
        FrameHeader::encode(
            &mut buf,
            2,
            FrameType::Continuation.as_u8(),
            FrameFlags::from_u8(FrameFlags::END_HEADERS),
            1,
        );
        buf.extend_from_slice(b"ab");

        let mut recorder = Recorder::default();
        let err = read_all(&mut buf, &mut recorder).unwrap_err();
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_header_block_rejected_before_end_headers() {
        // HEADERS without END_HEADERS followed by a CONTINUATION that pushes
        // the accumulated block past the list limit; the error fires before
        // the block terminates
        let mut buf = BytesMut::new();
        FrameHeader::encode(
            &mut buf,
            60,
            FrameType::Headers.as_u8(),
            FrameFlags::empty(),
            1,
        );
        buf.extend_from_slice(&[0u8; 60]);
        FrameHeader::encode(
            &mut buf,
            60,
            FrameType::Continuation.as_u8(),
            FrameFlags::empty(),
            1,
        );
        buf.extend_from_slice(&[0u8; 60]);

        let mut reader = FrameReader::new();
        reader.set_max_header_list_size(100);
        let mut codec = HpackCodec::new();
        let mut recorder = Recorder::default();
        let err = reader.read(&mut buf, &mut codec, &mut recorder).unwrap_err();
        assert!(err.is_connection_error());
        assert_eq!(err.code(), ErrorCode::EnhanceYourCalm);
        assert!(recorder.headers.is_empty());
    }

    #[test]
    fn test_data_on_stream_zero_is_connection_error() {
        let mut buf = BytesMut::new();
        FrameHeader::encode(&mut buf, 2, FrameType::Data.as_u8(), FrameFlags::empty(), 0);
        buf.extend_from_slice(b"no");

        let mut recorder = Recorder::default();
        let err = read_all(&mut buf, &mut recorder).unwrap_err();
        assert!(err.is_connection_error());
        assert_eq!(err.code(), ErrorCode::ProtocolError);
    }

    #[test]
    fn test_padding_exceeding_payload_is_error() {
        let mut buf = BytesMut::new();
        FrameHeader::encode(
            &mut buf,
            3,
            FrameType::Data.as_u8(),
            FrameFlags::from_u8(FrameFlags::PADDED),
            1,
        );
        // Pad length 200 but only 2 bytes follow
        buf.extend_from_slice(&[200, b'h', b'i']);

        let mut recorder = Recorder::default();
        let err = read_all(&mut buf, &mut recorder).unwrap_err();
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_padding_counts_length_octet() {
        let mut writer = FrameWriter::new();
        let mut sink = BufSink(BytesMut::new());
        writer
            .write_data(
                &mut sink,
                1,
                Bytes::from_static(b"hi"),
                4,
                false,
                discard_completion(),
            )
            .unwrap();

        let mut recorder = Recorder::default();
        read_all(&mut sink.0, &mut recorder).unwrap();
        let (_, data, padding, _) = &recorder.data[0];
        assert_eq!(&data[..], b"hi");
        assert_eq!(*padding, 5);
    }

    #[test]
    fn test_settings_ack_with_payload_is_frame_size_error() {
        let mut buf = BytesMut::new();
        FrameHeader::encode(
            &mut buf,
            6,
            FrameType::Settings.as_u8(),
            FrameFlags::from_u8(FrameFlags::ACK),
            0,
        );
        buf.extend_from_slice(&[0; 6]);

        let mut recorder = Recorder::default();
        let err = read_all(&mut buf, &mut recorder).unwrap_err();
        assert!(err.is_connection_error());
        assert_eq!(err.code(), ErrorCode::FrameSizeError);
    }

    #[test]
    fn test_settings_length_not_multiple_of_six() {
        let mut buf = BytesMut::new();
        FrameHeader::encode(&mut buf, 5, FrameType::Settings.as_u8(), FrameFlags::empty(), 0);
        buf.extend_from_slice(&[0; 5]);

        let mut recorder = Recorder::default();
        let err = read_all(&mut buf, &mut recorder).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FrameSizeError);
    }

    #[test]
    fn test_priority_self_dependency_is_connection_error() {
        let mut buf = BytesMut::new();
        FrameHeader::encode(&mut buf, 5, FrameType::Priority.as_u8(), FrameFlags::empty(), 3);
        PrioritySpec::new(3, false, 16).encode(&mut buf);

        let mut recorder = Recorder::default();
        let err = read_all(&mut buf, &mut recorder).unwrap_err();
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_oversized_frame_is_frame_size_error() {
        let mut buf = BytesMut::new();
        FrameHeader::encode(
            &mut buf,
            DEFAULT_MAX_FRAME_SIZE as usize + 1,
            FrameType::Data.as_u8(),
            FrameFlags::empty(),
            1,
        );

        let mut recorder = Recorder::default();
        let err = read_all(&mut buf, &mut recorder).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FrameSizeError);
    }

    #[test]
    fn test_unknown_frame_passthrough() {
        let mut buf = BytesMut::new();
        FrameHeader::encode(&mut buf, 4, 0xEE, FrameFlags::empty(), 7);
        buf.extend_from_slice(&[1, 2, 3, 4]);

        let mut recorder = Recorder::default();
        read_all(&mut buf, &mut recorder).unwrap();
        assert_eq!(recorder.unknown, vec![(0xEE, 7)]);
    }

    #[test]
    fn test_poisoned_reader_discards_input() {
        let mut reader = FrameReader::new();
        let mut codec = HpackCodec::new();
        let mut recorder = Recorder::default();

        let mut buf = BytesMut::new();
        FrameHeader::encode(&mut buf, 1, FrameType::Data.as_u8(), FrameFlags::empty(), 0);
        buf.extend_from_slice(b"x");
        assert!(reader.read(&mut buf, &mut codec, &mut recorder).is_err());

        let mut more = BytesMut::new();
        FrameHeader::encode(&mut more, 8, FrameType::Ping.as_u8(), FrameFlags::empty(), 0);
        more.extend_from_slice(&[0; 8]);
        reader.read(&mut more, &mut codec, &mut recorder).unwrap();
        assert!(recorder.pings.is_empty());
        assert!(more.is_empty());
    }

    #[test]
    fn test_goaway_carries_debug_data() {
        let mut writer = FrameWriter::new();
        let mut sink = BufSink(BytesMut::new());
        writer.write_goaway(
            &mut sink,
            7,
            ErrorCode::EnhanceYourCalm,
            Bytes::from_static(b"slow down"),
            discard_completion(),
        );

        let mut recorder = Recorder::default();
        read_all(&mut sink.0, &mut recorder).unwrap();
        assert_eq!(recorder.goaways.len(), 1);
        let (last, code, debug) = &recorder.goaways[0];
        assert_eq!(*last, 7);
        assert_eq!(*code, ErrorCode::EnhanceYourCalm);
        assert_eq!(&debug[..], b"slow down");
    }
}
