//! Stream entity and lifecycle states (RFC 7540 Section 5.1)
//!
//! A [`Stream`] is pure data plus local transitions; topology changes,
//! activation bookkeeping and listener fan-out are driven by
//! [`crate::connection::Connection`], which owns the stream table.

use crate::error::{Error, ErrorCode, Result};
use crate::inbound_flow::InboundWindow;
use crate::outbound_flow::OutboundState;
use crate::{CONNECTION_STREAM_ID, DEFAULT_PRIORITY_WEIGHT};
use indexmap::IndexSet;

/// Stream ID type
pub type StreamId = u32;

/// Stream state as defined in RFC 7540 Section 5.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No frames have been exchanged
    Idle,
    /// PUSH_PROMISE sent by us
    ReservedLocal,
    /// PUSH_PROMISE received from the peer
    ReservedRemote,
    /// Both sides may send frames
    Open,
    /// Our side finished sending
    HalfClosedLocal,
    /// The peer's side finished sending
    HalfClosedRemote,
    /// Terminal state
    Closed,
}

impl StreamState {
    /// A stream counts as active exactly while open or half-closed
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            StreamState::Open | StreamState::HalfClosedLocal | StreamState::HalfClosedRemote
        )
    }

    /// Whether our side may still send
    pub fn local_side_open(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Whether the peer's side may still send
    pub fn remote_side_open(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    /// Whether this is the terminal state
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed)
    }
}

/// A single HTTP/2 stream
///
/// Parent links are ID back-references; the owning edges of the priority
/// tree run through `children`. The connection stream (ID 0) is the tree
/// root and never leaves the table.
#[derive(Debug)]
pub struct Stream {
    id: StreamId,
    state: StreamState,
    /// Created by the local endpoint
    local: bool,
    weight: u16,
    parent: StreamId,
    children: IndexSet<StreamId>,
    total_child_weights: u32,
    reset_sent: bool,
    /// Inbound flow-control state, owned by the local flow controller
    pub(crate) inbound: InboundWindow,
    /// Outbound flow-control state, owned by the remote flow controller
    pub(crate) outbound: OutboundState,
}

impl Stream {
    /// Create a stream in IDLE state under the connection root
    pub(crate) fn new(id: StreamId, local: bool, inbound_window: u32, outbound_window: u32) -> Self {
        Stream {
            id,
            state: StreamState::Idle,
            local,
            weight: DEFAULT_PRIORITY_WEIGHT,
            parent: CONNECTION_STREAM_ID,
            children: IndexSet::new(),
            total_child_weights: 0,
            reset_sent: false,
            inbound: InboundWindow::new(inbound_window),
            outbound: OutboundState::new(outbound_window),
        }
    }

    /// Stream ID
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether the local endpoint created this stream
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Priority weight (1-256)
    pub fn weight(&self) -> u16 {
        self.weight
    }

    /// Parent stream in the priority tree
    pub fn parent(&self) -> StreamId {
        self.parent
    }

    /// Immediate children in insertion order
    pub fn children(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.children.iter().copied()
    }

    /// Number of immediate children
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Sum of immediate children's weights, kept incrementally consistent
    pub fn total_child_weights(&self) -> u32 {
        self.total_child_weights
    }

    /// Whether a RST_STREAM has been sent for this stream
    pub fn is_reset_sent(&self) -> bool {
        self.reset_sent
    }

    pub(crate) fn mark_reset_sent(&mut self) {
        self.reset_sent = true;
    }

    pub(crate) fn set_state(&mut self, state: StreamState) {
        self.state = state;
    }

    pub(crate) fn set_weight(&mut self, weight: u16) {
        self.weight = weight;
    }

    pub(crate) fn set_parent(&mut self, parent: StreamId) {
        self.parent = parent;
    }

    pub(crate) fn add_child(&mut self, child: StreamId, child_weight: u16) {
        if self.children.insert(child) {
            self.total_child_weights += child_weight as u32;
        }
    }

    pub(crate) fn remove_child(&mut self, child: StreamId, child_weight: u16) {
        if self.children.shift_remove(&child) {
            self.total_child_weights -= child_weight as u32;
        }
    }

    pub(crate) fn take_children(&mut self) -> IndexSet<StreamId> {
        self.total_child_weights = 0;
        std::mem::take(&mut self.children)
    }

    /// Transition out of IDLE or a reserved state
    ///
    /// With `half_closed` set the initiating headers carried END_STREAM, so
    /// the creating side is closed immediately.
    pub(crate) fn open(&mut self, half_closed: bool) -> Result<()> {
        self.state = match self.state {
            StreamState::Idle => {
                if half_closed {
                    if self.local {
                        StreamState::HalfClosedLocal
                    } else {
                        StreamState::HalfClosedRemote
                    }
                } else {
                    StreamState::Open
                }
            }
            StreamState::ReservedLocal => StreamState::HalfClosedRemote,
            StreamState::ReservedRemote => StreamState::HalfClosedLocal,
            _ => {
                return Err(Error::stream(
                    self.id,
                    ErrorCode::ProtocolError,
                    format!("cannot open stream in state {:?}", self.state),
                ))
            }
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(id: StreamId, local: bool) -> Stream {
        let w = crate::DEFAULT_INITIAL_WINDOW_SIZE;
        Stream::new(id, local, w, w)
    }

    #[test]
    fn test_open_from_idle() {
        let mut s = stream(1, true);
        s.open(false).unwrap();
        assert_eq!(s.state(), StreamState::Open);

        let mut s = stream(3, true);
        s.open(true).unwrap();
        assert_eq!(s.state(), StreamState::HalfClosedLocal);

        let mut s = stream(5, false);
        s.open(true).unwrap();
        assert_eq!(s.state(), StreamState::HalfClosedRemote);
    }

    #[test]
    fn test_open_from_reserved() {
        let mut s = stream(2, true);
        s.set_state(StreamState::ReservedLocal);
        s.open(false).unwrap();
        assert_eq!(s.state(), StreamState::HalfClosedRemote);

        let mut s = stream(4, false);
        s.set_state(StreamState::ReservedRemote);
        s.open(false).unwrap();
        assert_eq!(s.state(), StreamState::HalfClosedLocal);
    }

    #[test]
    fn test_open_invalid_states() {
        for state in [
            StreamState::Open,
            StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote,
            StreamState::Closed,
        ] {
            let mut s = stream(1, true);
            s.set_state(state);
            let err = s.open(false).unwrap_err();
            assert!(!err.is_connection_error());
        }
    }

    #[test]
    fn test_activity_predicate() {
        assert!(!StreamState::Idle.is_active());
        assert!(!StreamState::ReservedLocal.is_active());
        assert!(StreamState::Open.is_active());
        assert!(StreamState::HalfClosedLocal.is_active());
        assert!(StreamState::HalfClosedRemote.is_active());
        assert!(!StreamState::Closed.is_active());
    }

    #[test]
    fn test_child_weight_accounting() {
        let mut s = stream(0, true);
        s.add_child(1, 16);
        s.add_child(3, 32);
        assert_eq!(s.total_child_weights(), 48);
        // Duplicate insertion does not double-count
        s.add_child(1, 16);
        assert_eq!(s.total_child_weights(), 48);

        s.remove_child(1, 16);
        assert_eq!(s.total_child_weights(), 32);
        assert_eq!(s.child_count(), 1);
    }
}
