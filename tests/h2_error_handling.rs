//! HTTP/2 error handling integration tests
//!
//! These tests drive hand-crafted frame sequences into a handler and verify
//! the error choreography:
//! - Stream errors answered with RST_STREAM while the connection survives
//! - Connection errors answered with GOAWAY and surfaced to the embedder
//! - Late frames on ignorable streams dropped silently
//! - HTTP/1.1 upgrade stream bootstrap

use bytes::{Bytes, BytesMut};
use h2_core::frames::{FrameFlags, FrameHeader, FrameType};
use h2_core::handler::ConnectionHandler;
use h2_core::headers::{HeaderCodec, HpackCodec};
use h2_core::listener::FrameListener;
use h2_core::sink::{FrameSink, WriteCompletion};
use h2_core::stream::StreamState;
use h2_core::{ErrorCode, Settings, CONNECTION_PREFACE, FRAME_HEADER_LEN};
use std::cell::RefCell;
use std::rc::Rc;

struct PipeSink {
    out: Rc<RefCell<BytesMut>>,
}

impl FrameSink for PipeSink {
    fn write(&mut self, bytes: Bytes, completion: WriteCompletion) {
        self.out.borrow_mut().extend_from_slice(&bytes);
        completion(Ok(()));
    }
    fn flush(&mut self) {}
}

struct Quiet;
impl FrameListener for Quiet {}

fn server() -> (ConnectionHandler, Rc<RefCell<BytesMut>>) {
    let out = Rc::new(RefCell::new(BytesMut::new()));
    let mut handler = ConnectionHandler::new(
        true,
        Settings::new(),
        Box::new(HpackCodec::new()),
        Box::new(Quiet),
        Box::new(PipeSink {
            out: Rc::clone(&out),
        }),
    );
    handler.start();
    out.borrow_mut().clear();

    // Feed the preface and the client's empty SETTINGS, then ACK ours
    let mut input = BytesMut::from(CONNECTION_PREFACE);
    FrameHeader::encode(
        &mut input,
        0,
        FrameType::Settings.as_u8(),
        FrameFlags::empty(),
        0,
    );
    FrameHeader::encode(
        &mut input,
        0,
        FrameType::Settings.as_u8(),
        FrameFlags::from_u8(FrameFlags::ACK),
        0,
    );
    handler.on_bytes(&mut input).unwrap();
    out.borrow_mut().clear();
    (handler, out)
}

/// Frame types present in the captured output, in order
fn frame_types(out: &Rc<RefCell<BytesMut>>) -> Vec<Option<FrameType>> {
    let mut buf = out.borrow_mut().split().freeze();
    let mut types = Vec::new();
    while buf.len() >= FRAME_HEADER_LEN {
        let mut raw = [0u8; FRAME_HEADER_LEN];
        raw.copy_from_slice(&buf[..FRAME_HEADER_LEN]);
        let header = FrameHeader::decode(&raw);
        types.push(header.frame_type());
        let _ = buf.split_to(FRAME_HEADER_LEN + header.length as usize);
    }
    types
}

fn data_frame(stream_id: u32, payload: &[u8], end_stream: bool) -> BytesMut {
    let mut buf = BytesMut::new();
    let flags = if end_stream {
        FrameFlags::from_u8(FrameFlags::END_STREAM)
    } else {
        FrameFlags::empty()
    };
    FrameHeader::encode(
        &mut buf,
        payload.len(),
        FrameType::Data.as_u8(),
        flags,
        stream_id,
    );
    buf.extend_from_slice(payload);
    buf
}

fn headers_frame(stream_id: u32, end_stream: bool) -> BytesMut {
    let block = HpackCodec::new()
        .encode(
            &[(b":method".to_vec(), b"GET".to_vec())],
            h2_core::DEFAULT_HEADER_TABLE_SIZE,
        )
        .unwrap();
    let mut flags = FrameFlags::from_u8(FrameFlags::END_HEADERS);
    if end_stream {
        flags.set(FrameFlags::END_STREAM);
    }
    let mut buf = BytesMut::new();
    FrameHeader::encode(
        &mut buf,
        block.len(),
        FrameType::Headers.as_u8(),
        flags,
        stream_id,
    );
    buf.extend_from_slice(&block);
    buf
}

#[test]
fn test_data_on_idle_stream_is_reset() {
    let (mut handler, out) = server();

    let mut input = data_frame(1, b"early", false);
    // Stream error: absorbed, connection stays usable
    handler.on_bytes(&mut input).unwrap();

    let types = frame_types(&out);
    assert_eq!(types, vec![Some(FrameType::RstStream)]);

    // The connection still accepts a proper request afterwards
    let mut input = headers_frame(3, true);
    handler.on_bytes(&mut input).unwrap();
    assert_eq!(
        handler.connection().stream(3).unwrap().state(),
        StreamState::HalfClosedRemote
    );
}

#[test]
fn test_rejected_data_returns_connection_window() {
    let (mut handler, out) = server();

    // Five frames on idle streams together exceed the 65535-byte connection
    // window. Each one is a stream error; the window debit must be returned
    // every time or the connection would die on the last frame.
    for stream_id in [1u32, 3, 5, 7, 9] {
        let mut input = data_frame(stream_id, &[0u8; 16_000], false);
        handler.on_bytes(&mut input).unwrap();
        assert!(frame_types(&out).contains(&Some(FrameType::RstStream)));
    }
    assert!(!handler.is_closing());

    // The connection still accepts a proper request afterwards
    let mut input = headers_frame(11, true);
    handler.on_bytes(&mut input).unwrap();
    assert_eq!(
        handler.connection().stream(11).unwrap().state(),
        StreamState::HalfClosedRemote
    );
}

#[test]
fn test_data_on_connection_stream_is_goaway() {
    let (mut handler, out) = server();

    let mut input = data_frame(0, b"bad", false);
    let err = handler.on_bytes(&mut input).unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(err.code(), ErrorCode::ProtocolError);

    let types = frame_types(&out);
    assert_eq!(types, vec![Some(FrameType::Goaway)]);
    assert!(handler.is_closing());
}

#[test]
fn test_settings_ack_without_outstanding_is_goaway() {
    let (mut handler, out) = server();

    let mut input = BytesMut::new();
    FrameHeader::encode(
        &mut input,
        0,
        FrameType::Settings.as_u8(),
        FrameFlags::from_u8(FrameFlags::ACK),
        0,
    );
    let err = handler.on_bytes(&mut input).unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(frame_types(&out), vec![Some(FrameType::Goaway)]);
}

#[test]
fn test_late_data_on_reset_stream_is_dropped() {
    let (mut handler, out) = server();

    let mut input = headers_frame(1, false);
    handler.on_bytes(&mut input).unwrap();
    handler
        .send_rst_stream(1, ErrorCode::Cancel, Box::new(|_| {}))
        .unwrap();
    out.borrow_mut().clear();

    // Data racing the reset must not produce another error or reset
    let mut input = data_frame(1, b"racing", false);
    handler.on_bytes(&mut input).unwrap();
    assert!(frame_types(&out).is_empty());
}

#[test]
fn test_reset_is_idempotent() {
    let (mut handler, out) = server();

    let mut input = headers_frame(1, false);
    handler.on_bytes(&mut input).unwrap();

    handler
        .send_rst_stream(1, ErrorCode::Cancel, Box::new(|_| {}))
        .unwrap();
    let completed = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&completed);
    handler
        .send_rst_stream(1, ErrorCode::Cancel, Box::new(move |r| {
            r.unwrap();
            *flag.borrow_mut() = true;
        }))
        .unwrap();

    // One RST_STREAM on the wire, second completion satisfied locally
    let resets = frame_types(&out)
        .into_iter()
        .filter(|t| *t == Some(FrameType::RstStream))
        .count();
    assert_eq!(resets, 1);
    assert!(*completed.borrow());
}

#[test]
fn test_window_update_on_unknown_stream_is_goaway() {
    let (mut handler, out) = server();

    let mut input = BytesMut::new();
    FrameHeader::encode(
        &mut input,
        4,
        FrameType::WindowUpdate.as_u8(),
        FrameFlags::empty(),
        9,
    );
    input.extend_from_slice(&100u32.to_be_bytes());

    let err = handler.on_bytes(&mut input).unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(frame_types(&out), vec![Some(FrameType::Goaway)]);
}

#[test]
fn test_streams_beyond_goaway_horizon_are_ignored() {
    let (mut handler, out) = server();

    let mut input = headers_frame(1, false);
    handler.on_bytes(&mut input).unwrap();
    handler.close_gracefully(ErrorCode::NoError, Bytes::new());
    out.borrow_mut().clear();

    // Stream 3 is beyond the advertised horizon: dropped, no reset, no error
    let mut input = data_frame(3, b"too late", false);
    handler.on_bytes(&mut input).unwrap();
    assert!(frame_types(&out).is_empty());
    assert!(handler.connection().stream(3).is_none());
}

#[test]
fn test_http1_upgrade_creates_half_closed_stream() {
    let out = Rc::new(RefCell::new(BytesMut::new()));
    let mut handler = ConnectionHandler::new(
        true,
        Settings::new(),
        Box::new(HpackCodec::new()),
        Box::new(Quiet),
        Box::new(PipeSink {
            out: Rc::clone(&out),
        }),
    );
    handler.on_http1_upgrade().unwrap();

    let stream = handler.connection().stream(1).unwrap();
    assert_eq!(stream.state(), StreamState::HalfClosedRemote);
    assert!(!stream.is_local());
}
