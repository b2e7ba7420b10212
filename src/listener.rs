//! Listener interfaces
//!
//! [`FrameListener`] receives decoded frames from the frame reader and is
//! re-exposed, filtered and annotated, by the connection handler to the
//! application. [`ConnectionListener`] observes stream topology and state
//! changes on the connection model. Both carry default bodies so an
//! implementation overrides only what it cares about.

use crate::error::{ErrorCode, Result};
use crate::frames::{FrameFlags, PrioritySpec};
use crate::headers::Header;
use crate::settings::Settings;
use bytes::Bytes;

/// Per-frame-type callbacks delivered by the frame reader
///
/// `padding` counts the padding bytes plus the pad-length octet, so it is
/// exactly the number of flow-controlled bytes beyond the data itself.
#[allow(unused_variables)]
pub trait FrameListener {
    /// A DATA frame arrived
    fn on_data(
        &mut self,
        stream_id: u32,
        data: Bytes,
        padding: u32,
        end_stream: bool,
    ) -> Result<()> {
        Ok(())
    }

    /// A complete, decoded header set arrived (HEADERS plus CONTINUATIONs)
    fn on_headers(
        &mut self,
        stream_id: u32,
        headers: Vec<Header>,
        priority: Option<PrioritySpec>,
        padding: u32,
        end_stream: bool,
    ) -> Result<()> {
        Ok(())
    }

    /// A PRIORITY frame arrived
    fn on_priority(&mut self, stream_id: u32, spec: PrioritySpec) -> Result<()> {
        Ok(())
    }

    /// A RST_STREAM frame arrived
    fn on_rst_stream(&mut self, stream_id: u32, error_code: ErrorCode) -> Result<()> {
        Ok(())
    }

    /// A SETTINGS frame (not an ACK) arrived
    fn on_settings(&mut self, settings: Settings) -> Result<()> {
        Ok(())
    }

    /// A SETTINGS ACK arrived
    fn on_settings_ack(&mut self) -> Result<()> {
        Ok(())
    }

    /// A complete, decoded PUSH_PROMISE header set arrived
    fn on_push_promise(
        &mut self,
        stream_id: u32,
        promised_stream_id: u32,
        headers: Vec<Header>,
        padding: u32,
    ) -> Result<()> {
        Ok(())
    }

    /// A PING frame arrived
    fn on_ping(&mut self, data: [u8; 8]) -> Result<()> {
        Ok(())
    }

    /// A PING ACK arrived
    fn on_ping_ack(&mut self, data: [u8; 8]) -> Result<()> {
        Ok(())
    }

    /// A GOAWAY frame arrived
    fn on_goaway(
        &mut self,
        last_stream_id: u32,
        error_code: ErrorCode,
        debug_data: Bytes,
    ) -> Result<()> {
        Ok(())
    }

    /// A WINDOW_UPDATE frame arrived
    fn on_window_update(&mut self, stream_id: u32, increment: u32) -> Result<()> {
        Ok(())
    }

    /// A frame of an unrecognized type arrived (extension passthrough)
    fn on_unknown_frame(
        &mut self,
        frame_type: u8,
        flags: FrameFlags,
        stream_id: u32,
        payload: Bytes,
    ) -> Result<()> {
        Ok(())
    }
}

/// Observer of stream topology and lifecycle changes
///
/// Listeners are registered on the connection and invoked synchronously in
/// registration order.
#[allow(unused_variables)]
pub trait ConnectionListener {
    /// A stream entered the table (possibly still idle)
    fn on_stream_added(&mut self, stream_id: u32) {}

    /// A stream became active (OPEN or half-closed)
    fn on_stream_active(&mut self, stream_id: u32) {}

    /// One side of an active stream closed
    fn on_stream_half_closed(&mut self, stream_id: u32) {}

    /// A stream left the active set
    fn on_stream_inactive(&mut self, stream_id: u32) {}

    /// A stream was removed from the table
    fn on_stream_removed(&mut self, stream_id: u32) {}

    /// A stream is about to be moved under a different parent
    fn on_parent_changing(&mut self, stream_id: u32, old_parent: u32) {}

    /// A stream finished moving under a different parent
    fn on_parent_changed(&mut self, stream_id: u32, new_parent: u32) {}

    /// A stream's priority weight changed
    fn on_weight_changed(&mut self, stream_id: u32, old_weight: u16) {}

    /// GOAWAY was sent or received on this connection
    fn on_going_away(&mut self, last_stream_id: u32, error_code: ErrorCode) {}
}
