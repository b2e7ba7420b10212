//! HTTP/2 frame writer
//!
//! Stateless per call: serializes the 9-byte header, applies zero-filled
//! padding and splits payloads exceeding the negotiated max frame size.
//! Header blocks become one HEADERS/PUSH_PROMISE frame plus CONTINUATIONs;
//! DATA is split across DATA frames. Multi-frame writes share one caller
//! completion through [`AggregateCompletion`].

use crate::error::{Error, Result};
use crate::frames::{FrameFlags, FrameHeader, FrameType, PrioritySpec};
use crate::settings::Settings;
use crate::sink::{AggregateCompletion, FrameSink, WriteCompletion};
use crate::{DEFAULT_MAX_FRAME_SIZE, ErrorCode, MAX_STREAM_ID, MAX_WINDOW_SIZE};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

/// Frame-to-byte-stream encoder
pub struct FrameWriter {
    max_frame_size: u32,
}

impl FrameWriter {
    /// Create a writer with the protocol-default max frame size
    pub fn new() -> Self {
        FrameWriter {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Currently negotiated max frame payload size
    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Apply the peer's SETTINGS_MAX_FRAME_SIZE
    pub fn set_max_frame_size(&mut self, size: u32) {
        self.max_frame_size = size;
    }

    fn check_stream_id(stream_id: u32) -> Result<()> {
        if stream_id == 0 || stream_id > MAX_STREAM_ID {
            return Err(Error::protocol(format!(
                "invalid stream ID {} for stream frame",
                stream_id
            )));
        }
        Ok(())
    }

    /// Write a DATA frame, splitting payloads above the max frame size
    ///
    /// END_STREAM is carried only on the final fragment. Padding, when
    /// requested, is applied to the final fragment.
    pub fn write_data(
        &mut self,
        sink: &mut dyn FrameSink,
        stream_id: u32,
        mut data: Bytes,
        padding: u8,
        end_stream: bool,
        completion: WriteCompletion,
    ) -> Result<()> {
        Self::check_stream_id(stream_id)?;
        let max = self.max_frame_size as usize;
        trace!(stream_id, len = data.len(), end_stream, "writing DATA");

        let aggregate = AggregateCompletion::new(completion);
        loop {
            let last = data.len() <= max && Self::padded_len(data.len(), padding) <= max;
            let chunk = if last {
                std::mem::take(&mut data)
            } else {
                data.split_to(max.min(data.len()))
            };

            let mut flags = FrameFlags::empty();
            if last && end_stream {
                flags.set(FrameFlags::END_STREAM);
            }
            let frame_padding = if last { padding } else { 0 };
            if frame_padding > 0 {
                flags.set(FrameFlags::PADDED);
            }

            let payload_len = Self::padded_len(chunk.len(), frame_padding);
            let mut buf = BytesMut::with_capacity(crate::FRAME_HEADER_LEN + payload_len);
            FrameHeader::encode(
                &mut buf,
                payload_len,
                FrameType::Data.as_u8(),
                flags,
                stream_id,
            );
            if frame_padding > 0 {
                buf.put_u8(frame_padding);
            }
            buf.put_slice(&chunk);
            if frame_padding > 0 {
                buf.put_bytes(0, frame_padding as usize);
            }
            sink.write(buf.freeze(), aggregate.fork());

            if last {
                break;
            }
        }
        aggregate.seal();
        Ok(())
    }

    fn padded_len(data_len: usize, padding: u8) -> usize {
        if padding > 0 {
            data_len + 1 + padding as usize
        } else {
            data_len
        }
    }

    /// Write a HEADERS frame, continuing into CONTINUATION frames when the
    /// encoded block exceeds the max frame size
    ///
    /// END_HEADERS is set only on the final fragment; priority and padding
    /// ride on the initial frame.
    pub fn write_headers(
        &mut self,
        sink: &mut dyn FrameSink,
        stream_id: u32,
        block: Bytes,
        priority: Option<PrioritySpec>,
        padding: u8,
        end_stream: bool,
        completion: WriteCompletion,
    ) -> Result<()> {
        Self::check_stream_id(stream_id)?;
        if let Some(spec) = &priority {
            if spec.dependency == stream_id {
                return Err(Error::protocol(format!(
                    "stream {} cannot depend on itself",
                    stream_id
                )));
            }
        }

        let mut flags = FrameFlags::empty();
        if end_stream {
            flags.set(FrameFlags::END_STREAM);
        }
        let mut prefix = BytesMut::new();
        if padding > 0 {
            flags.set(FrameFlags::PADDED);
            prefix.put_u8(padding);
        }
        if let Some(spec) = &priority {
            flags.set(FrameFlags::PRIORITY);
            spec.encode(&mut prefix);
        }

        self.write_header_block(
            sink,
            FrameType::Headers,
            flags,
            stream_id,
            prefix.freeze(),
            block,
            padding,
            completion,
        )
    }

    /// Write a PUSH_PROMISE frame, continuing into CONTINUATION frames when
    /// the encoded block exceeds the max frame size
    pub fn write_push_promise(
        &mut self,
        sink: &mut dyn FrameSink,
        stream_id: u32,
        promised_stream_id: u32,
        block: Bytes,
        padding: u8,
        completion: WriteCompletion,
    ) -> Result<()> {
        Self::check_stream_id(stream_id)?;
        Self::check_stream_id(promised_stream_id)?;

        let mut flags = FrameFlags::empty();
        let mut prefix = BytesMut::new();
        if padding > 0 {
            flags.set(FrameFlags::PADDED);
            prefix.put_u8(padding);
        }
        prefix.put_u32(promised_stream_id & MAX_STREAM_ID);

        self.write_header_block(
            sink,
            FrameType::PushPromise,
            flags,
            stream_id,
            prefix.freeze(),
            block,
            padding,
            completion,
        )
    }

    /// Common splitting path for HEADERS and PUSH_PROMISE
    #[allow(clippy::too_many_arguments)]
    fn write_header_block(
        &mut self,
        sink: &mut dyn FrameSink,
        frame_type: FrameType,
        mut flags: FrameFlags,
        stream_id: u32,
        prefix: Bytes,
        mut block: Bytes,
        padding: u8,
        completion: WriteCompletion,
    ) -> Result<()> {
        let max = self.max_frame_size as usize;
        let trailer = if padding > 0 { padding as usize } else { 0 };
        let first_capacity = max
            .checked_sub(prefix.len() + trailer)
            .ok_or_else(|| Error::frame_size("padding and priority exceed max frame size"))?;

        let aggregate = AggregateCompletion::new(completion);
        let fragment = block.split_to(first_capacity.min(block.len()));
        if block.is_empty() {
            flags.set(FrameFlags::END_HEADERS);
        }

        let payload_len = prefix.len() + fragment.len() + trailer;
        let mut buf = BytesMut::with_capacity(crate::FRAME_HEADER_LEN + payload_len);
        FrameHeader::encode(&mut buf, payload_len, frame_type.as_u8(), flags, stream_id);
        buf.put_slice(&prefix);
        buf.put_slice(&fragment);
        buf.put_bytes(0, trailer);
        sink.write(buf.freeze(), aggregate.fork());

        while !block.is_empty() {
            let fragment = block.split_to(max.min(block.len()));
            let mut flags = FrameFlags::empty();
            if block.is_empty() {
                flags.set(FrameFlags::END_HEADERS);
            }
            let mut buf = BytesMut::with_capacity(crate::FRAME_HEADER_LEN + fragment.len());
            FrameHeader::encode(
                &mut buf,
                fragment.len(),
                FrameType::Continuation.as_u8(),
                flags,
                stream_id,
            );
            buf.put_slice(&fragment);
            sink.write(buf.freeze(), aggregate.fork());
        }
        aggregate.seal();
        Ok(())
    }

    /// Write a PRIORITY frame
    pub fn write_priority(
        &mut self,
        sink: &mut dyn FrameSink,
        stream_id: u32,
        spec: PrioritySpec,
        completion: WriteCompletion,
    ) -> Result<()> {
        Self::check_stream_id(stream_id)?;
        let mut buf = BytesMut::with_capacity(crate::FRAME_HEADER_LEN + PrioritySpec::WIRE_LEN);
        FrameHeader::encode(
            &mut buf,
            PrioritySpec::WIRE_LEN,
            FrameType::Priority.as_u8(),
            FrameFlags::empty(),
            stream_id,
        );
        spec.encode(&mut buf);
        sink.write(buf.freeze(), completion);
        Ok(())
    }

    /// Write a RST_STREAM frame
    pub fn write_rst_stream(
        &mut self,
        sink: &mut dyn FrameSink,
        stream_id: u32,
        error_code: ErrorCode,
        completion: WriteCompletion,
    ) -> Result<()> {
        Self::check_stream_id(stream_id)?;
        let mut buf = BytesMut::with_capacity(crate::FRAME_HEADER_LEN + 4);
        FrameHeader::encode(
            &mut buf,
            4,
            FrameType::RstStream.as_u8(),
            FrameFlags::empty(),
            stream_id,
        );
        buf.put_u32(error_code.as_u32());
        sink.write(buf.freeze(), completion);
        Ok(())
    }

    /// Write a SETTINGS frame carrying the present parameters
    pub fn write_settings(
        &mut self,
        sink: &mut dyn FrameSink,
        settings: &Settings,
        completion: WriteCompletion,
    ) {
        let payload_len = settings.len() * 6;
        let mut buf = BytesMut::with_capacity(crate::FRAME_HEADER_LEN + payload_len);
        FrameHeader::encode(
            &mut buf,
            payload_len,
            FrameType::Settings.as_u8(),
            FrameFlags::empty(),
            0,
        );
        for (id, value) in settings.iter() {
            buf.put_u16(id.as_u16());
            buf.put_u32(value);
        }
        sink.write(buf.freeze(), completion);
    }

    /// Write a SETTINGS ACK
    pub fn write_settings_ack(&mut self, sink: &mut dyn FrameSink, completion: WriteCompletion) {
        let mut buf = BytesMut::with_capacity(crate::FRAME_HEADER_LEN);
        FrameHeader::encode(
            &mut buf,
            0,
            FrameType::Settings.as_u8(),
            FrameFlags::from_u8(FrameFlags::ACK),
            0,
        );
        sink.write(buf.freeze(), completion);
    }

    /// Write a PING frame or PING ACK
    pub fn write_ping(
        &mut self,
        sink: &mut dyn FrameSink,
        ack: bool,
        data: [u8; 8],
        completion: WriteCompletion,
    ) {
        let flags = if ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };
        let mut buf = BytesMut::with_capacity(crate::FRAME_HEADER_LEN + 8);
        FrameHeader::encode(&mut buf, 8, FrameType::Ping.as_u8(), flags, 0);
        buf.put_slice(&data);
        sink.write(buf.freeze(), completion);
    }

    /// Write a GOAWAY frame
    pub fn write_goaway(
        &mut self,
        sink: &mut dyn FrameSink,
        last_stream_id: u32,
        error_code: ErrorCode,
        debug_data: Bytes,
        completion: WriteCompletion,
    ) {
        let payload_len = 8 + debug_data.len();
        let mut buf = BytesMut::with_capacity(crate::FRAME_HEADER_LEN + payload_len);
        FrameHeader::encode(
            &mut buf,
            payload_len,
            FrameType::Goaway.as_u8(),
            FrameFlags::empty(),
            0,
        );
        buf.put_u32(last_stream_id & MAX_STREAM_ID);
        buf.put_u32(error_code.as_u32());
        buf.put_slice(&debug_data);
        sink.write(buf.freeze(), completion);
    }

    /// Write a WINDOW_UPDATE frame; rejects a zero or oversized increment
    pub fn write_window_update(
        &mut self,
        sink: &mut dyn FrameSink,
        stream_id: u32,
        increment: u32,
        completion: WriteCompletion,
    ) -> Result<()> {
        if increment == 0 || increment as i64 > MAX_WINDOW_SIZE {
            return Err(Error::protocol(format!(
                "window update increment {} outside 1..=2^31-1",
                increment
            )));
        }
        let mut buf = BytesMut::with_capacity(crate::FRAME_HEADER_LEN + 4);
        FrameHeader::encode(
            &mut buf,
            4,
            FrameType::WindowUpdate.as_u8(),
            FrameFlags::empty(),
            stream_id,
        );
        buf.put_u32(increment);
        sink.write(buf.freeze(), completion);
        Ok(())
    }

    /// Write an extension frame of an arbitrary type
    pub fn write_unknown(
        &mut self,
        sink: &mut dyn FrameSink,
        frame_type: u8,
        flags: FrameFlags,
        stream_id: u32,
        payload: Bytes,
        completion: WriteCompletion,
    ) {
        let mut buf = BytesMut::with_capacity(crate::FRAME_HEADER_LEN + payload.len());
        FrameHeader::encode(&mut buf, payload.len(), frame_type, flags, stream_id);
        buf.put_slice(&payload);
        sink.write(buf.freeze(), completion);
    }
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new()
    }
}
