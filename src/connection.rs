//! Connection and stream model
//!
//! The connection owns the stream table (including the synthetic connection
//! stream 0), the insertion-ordered active-stream set, the two endpoints and
//! the weighted priority dependency tree. All topology and lifecycle changes
//! flow through here and fan out to registered
//! [`ConnectionListener`]s synchronously, in registration order.

use crate::error::{Error, ErrorCode, Result};
use crate::listener::ConnectionListener;
use crate::stream::{Stream, StreamId, StreamState};
use crate::{
    CONNECTION_STREAM_ID, DEFAULT_INITIAL_WINDOW_SIZE, MAX_STREAM_ID, MAX_WEIGHT, MIN_WEIGHT,
};
use indexmap::IndexSet;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Trailing grace period before a CLOSED stream is removed from the table
pub const DEFAULT_REMOVAL_GRACE: Duration = Duration::from_secs(5);

/// One direction of the connection
///
/// Tracks stream-ID allocation, GOAWAY state and concurrency limits for the
/// streams created by that side.
#[derive(Debug)]
pub struct Endpoint {
    /// This endpoint plays the server role (creates even stream IDs)
    server: bool,
    next_stream_id: u32,
    last_created: u32,
    last_known_stream: Option<u32>,
    push_enabled: bool,
    max_active_streams: u32,
    active_count: u32,
}

impl Endpoint {
    fn new(server: bool) -> Self {
        Endpoint {
            server,
            next_stream_id: if server { 2 } else { 1 },
            last_created: 0,
            last_known_stream: None,
            push_enabled: !server,
            max_active_streams: u32::MAX,
            active_count: 0,
        }
    }

    /// Whether this endpoint allocates IDs of this parity
    pub fn creates_stream_id(&self, stream_id: StreamId) -> bool {
        stream_id != 0 && (stream_id % 2 == 0) == self.server
    }

    /// Whether this endpoint created the stream (parity and range match)
    pub fn created_stream(&self, stream_id: StreamId) -> bool {
        self.creates_stream_id(stream_id) && stream_id <= self.last_created
    }

    /// Next stream ID this endpoint would allocate; `None` once exhausted
    pub fn next_stream_id(&self) -> Option<StreamId> {
        if self.next_stream_id > MAX_STREAM_ID {
            None
        } else {
            Some(self.next_stream_id)
        }
    }

    /// Highest stream ID created so far
    pub fn last_created(&self) -> StreamId {
        self.last_created
    }

    /// Last stream ID the peer guaranteed to process, once going away
    pub fn last_known_stream(&self) -> Option<StreamId> {
        self.last_known_stream
    }

    /// Whether server push is permitted toward this endpoint's peer
    pub fn push_enabled(&self) -> bool {
        self.push_enabled
    }

    /// Enable or disable push
    pub fn set_push_enabled(&mut self, enabled: bool) {
        self.push_enabled = enabled;
    }

    /// Concurrent active-stream limit for this endpoint
    pub fn max_active_streams(&self) -> u32 {
        self.max_active_streams
    }

    /// Set the concurrent active-stream limit
    pub fn set_max_active_streams(&mut self, max: u32) {
        self.max_active_streams = max;
    }

    /// Number of currently active streams created by this endpoint
    pub fn active_count(&self) -> u32 {
        self.active_count
    }
}

/// Which endpoint an operation acts for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The local endpoint
    Local,
    /// The remote endpoint
    Remote,
}

enum StreamEvent {
    Added(StreamId),
    Active(StreamId),
    HalfClosed(StreamId),
    Inactive(StreamId),
    Removed(StreamId),
    ParentChanging { stream_id: StreamId, old_parent: StreamId },
    ParentChanged { stream_id: StreamId, new_parent: StreamId },
    WeightChanged { stream_id: StreamId, old_weight: u16 },
    GoingAway { last_stream_id: StreamId, error_code: ErrorCode },
}

/// HTTP/2 connection state: stream table, endpoints and priority tree
pub struct Connection {
    streams: HashMap<StreamId, Stream>,
    active: IndexSet<StreamId>,
    local: Endpoint,
    remote: Endpoint,
    listeners: Vec<Box<dyn ConnectionListener>>,
    removal_queue: VecDeque<(Instant, StreamId)>,
    removal_grace: Duration,
    /// Initial window advertised by us for inbound data
    inbound_initial_window: u32,
    /// Initial window advertised by the peer for outbound data
    outbound_initial_window: u32,
}

impl Connection {
    /// Create a connection model for the given role
    pub fn new(server: bool) -> Self {
        let mut streams = HashMap::new();
        // The synthetic connection stream roots the priority tree and
        // carries the connection-level flow-control windows.
        streams.insert(
            CONNECTION_STREAM_ID,
            Stream::new(
                CONNECTION_STREAM_ID,
                true,
                DEFAULT_INITIAL_WINDOW_SIZE,
                DEFAULT_INITIAL_WINDOW_SIZE,
            ),
        );

        Connection {
            streams,
            active: IndexSet::new(),
            local: Endpoint::new(server),
            remote: Endpoint::new(!server),
            listeners: Vec::new(),
            removal_queue: VecDeque::new(),
            removal_grace: DEFAULT_REMOVAL_GRACE,
            inbound_initial_window: DEFAULT_INITIAL_WINDOW_SIZE,
            outbound_initial_window: DEFAULT_INITIAL_WINDOW_SIZE,
        }
    }

    /// Whether the local endpoint plays the server role
    pub fn is_server(&self) -> bool {
        self.local.server
    }

    /// The local endpoint
    pub fn local(&self) -> &Endpoint {
        &self.local
    }

    /// The local endpoint, mutably
    pub fn local_mut(&mut self) -> &mut Endpoint {
        &mut self.local
    }

    /// The remote endpoint
    pub fn remote(&self) -> &Endpoint {
        &self.remote
    }

    /// The remote endpoint, mutably
    pub fn remote_mut(&mut self) -> &mut Endpoint {
        &mut self.remote
    }

    fn endpoint_for(&self, side: Side) -> &Endpoint {
        match side {
            Side::Local => &self.local,
            Side::Remote => &self.remote,
        }
    }

    fn endpoint_for_mut(&mut self, side: Side) -> &mut Endpoint {
        match side {
            Side::Local => &mut self.local,
            Side::Remote => &mut self.remote,
        }
    }

    /// The endpoint that allocates IDs of this stream's parity
    pub fn creator_side(&self, stream_id: StreamId) -> Side {
        if self.local.creates_stream_id(stream_id) {
            Side::Local
        } else {
            Side::Remote
        }
    }

    /// Register a topology/state listener
    pub fn add_listener(&mut self, listener: Box<dyn ConnectionListener>) {
        self.listeners.push(listener);
    }

    /// Override the closed-stream removal grace period
    pub fn set_removal_grace(&mut self, grace: Duration) {
        self.removal_grace = grace;
    }

    /// Look up a stream
    pub fn stream(&self, stream_id: StreamId) -> Option<&Stream> {
        self.streams.get(&stream_id)
    }

    /// Look up a stream, mutably
    pub fn stream_mut(&mut self, stream_id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&stream_id)
    }

    /// Look up a stream or fail with a connection protocol error
    pub fn require_stream(&self, stream_id: StreamId) -> Result<&Stream> {
        self.streams
            .get(&stream_id)
            .ok_or_else(|| Error::protocol(format!("unknown stream {}", stream_id)))
    }

    /// Number of streams in the table, excluding the connection stream
    pub fn stream_count(&self) -> usize {
        self.streams.len() - 1
    }

    /// Active stream IDs in activation order
    pub fn active_streams(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.active.iter().copied()
    }

    /// Number of active streams across both endpoints
    pub fn num_active_streams(&self) -> usize {
        self.active.len()
    }

    /// True once either direction has signaled GOAWAY
    pub fn is_going_away(&self) -> bool {
        self.local.last_known_stream.is_some() || self.remote.last_known_stream.is_some()
    }

    /// Record that we sent GOAWAY promising to process up to `last_stream_id`
    pub fn goaway_sent(&mut self, last_stream_id: StreamId, error_code: ErrorCode) {
        debug!(last_stream_id, code = %error_code, "GOAWAY sent");
        self.remote.last_known_stream = Some(last_stream_id);
        self.notify(StreamEvent::GoingAway {
            last_stream_id,
            error_code,
        });
    }

    /// Record a received GOAWAY carrying the peer's last processed stream ID
    pub fn goaway_received(&mut self, last_stream_id: StreamId, error_code: ErrorCode) {
        debug!(last_stream_id, code = %error_code, "GOAWAY received");
        self.local.last_known_stream = Some(last_stream_id);
        self.notify(StreamEvent::GoingAway {
            last_stream_id,
            error_code,
        });
    }

    /// Whether a frame for this unknown stream may be silently dropped
    ///
    /// True when the stream demonstrably existed before (created and since
    /// removed or reset) or falls beyond a signaled GOAWAY horizon.
    pub fn is_ignorable_stream(&self, stream_id: StreamId) -> bool {
        if let Some(stream) = self.stream(stream_id) {
            return stream.is_reset_sent() || stream.state().is_closed();
        }
        let creator = self.endpoint_for(self.creator_side(stream_id));
        if creator.created_stream(stream_id) {
            // Closed and removed; late frames during and after the grace
            // window stay ignorable.
            return true;
        }
        match creator.last_known_stream {
            Some(last) => stream_id > last,
            None => false,
        }
    }

    /// Initial window size for inbound data on newly created streams
    pub fn inbound_initial_window(&self) -> u32 {
        self.inbound_initial_window
    }

    pub(crate) fn set_inbound_initial_window(&mut self, size: u32) {
        self.inbound_initial_window = size;
    }

    /// Initial window size for outbound data on newly created streams
    pub fn outbound_initial_window(&self) -> u32 {
        self.outbound_initial_window
    }

    pub(crate) fn set_outbound_initial_window(&mut self, size: u32) {
        self.outbound_initial_window = size;
    }

    fn check_new_stream(&self, side: Side, stream_id: StreamId) -> Result<()> {
        let endpoint = self.endpoint_for(side);
        if stream_id == 0 || stream_id > MAX_STREAM_ID {
            return Err(Error::protocol(format!("invalid stream ID {}", stream_id)));
        }
        if !endpoint.creates_stream_id(stream_id) {
            return Err(Error::protocol(format!(
                "stream ID {} has wrong parity for this endpoint",
                stream_id
            )));
        }
        if stream_id <= endpoint.last_created {
            // An endpoint never reuses or rewinds IDs
            return Err(Error::protocol(format!(
                "stream ID {} not above last created {}",
                stream_id, endpoint.last_created
            )));
        }
        if self.is_going_away() {
            return Err(Error::protocol(format!(
                "cannot create stream {} after GOAWAY",
                stream_id
            )));
        }
        Ok(())
    }

    fn insert_idle(&mut self, side: Side, stream_id: StreamId) {
        let local = side == Side::Local;
        let stream = Stream::new(
            stream_id,
            local,
            self.inbound_initial_window,
            self.outbound_initial_window,
        );
        self.streams.insert(stream_id, stream);
        self.streams
            .get_mut(&CONNECTION_STREAM_ID)
            .expect("connection stream")
            .add_child(stream_id, crate::DEFAULT_PRIORITY_WEIGHT);
        self.notify(StreamEvent::Added(stream_id));
    }

    /// Create (or promote) a stream and open it
    ///
    /// With `half_closed` set the initiating headers carried END_STREAM. A
    /// pre-existing idle stream (from a PRIORITY frame) is promoted in
    /// place.
    pub fn create_stream(
        &mut self,
        side: Side,
        stream_id: StreamId,
        half_closed: bool,
    ) -> Result<&mut Stream> {
        match self.stream(stream_id).map(Stream::state) {
            None => {
                self.check_new_stream(side, stream_id)?;
                self.insert_idle(side, stream_id);
            }
            Some(StreamState::Idle) => {}
            Some(StreamState::ReservedLocal) | Some(StreamState::ReservedRemote) => {}
            Some(state) => {
                return Err(Error::stream(
                    stream_id,
                    ErrorCode::ProtocolError,
                    format!("cannot create stream in state {:?}", state),
                ))
            }
        }

        let endpoint = self.endpoint_for(side);
        if endpoint.active_count >= endpoint.max_active_streams {
            return Err(Error::stream(
                stream_id,
                ErrorCode::RefusedStream,
                "maximum concurrent streams exceeded",
            ));
        }

        {
            let stream = self.streams.get_mut(&stream_id).expect("just checked");
            stream.open(half_closed)?;
        }
        let endpoint = self.endpoint_for_mut(side);
        if stream_id > endpoint.last_created {
            endpoint.last_created = stream_id;
            endpoint.next_stream_id = stream_id.saturating_add(2);
        }
        self.activate(side, stream_id);
        trace!(stream_id, half_closed, "stream opened");
        Ok(self.streams.get_mut(&stream_id).expect("just inserted"))
    }

    /// Create a stream in a reserved state (PUSH_PROMISE)
    pub fn create_reserved_stream(
        &mut self,
        side: Side,
        stream_id: StreamId,
    ) -> Result<&mut Stream> {
        self.check_new_stream(side, stream_id)?;
        self.insert_idle(side, stream_id);
        let endpoint = self.endpoint_for_mut(side);
        endpoint.last_created = stream_id;
        endpoint.next_stream_id = stream_id.saturating_add(2);

        let state = match side {
            Side::Local => StreamState::ReservedLocal,
            Side::Remote => StreamState::ReservedRemote,
        };
        let stream = self.streams.get_mut(&stream_id).expect("just inserted");
        stream.set_state(state);
        Ok(stream)
    }

    /// Create an idle stream, as a PRIORITY frame's implicit parent does
    pub fn create_idle_stream(&mut self, stream_id: StreamId) -> Result<()> {
        if self.streams.contains_key(&stream_id) {
            return Ok(());
        }
        let side = self.creator_side(stream_id);
        if stream_id == 0 || stream_id > MAX_STREAM_ID {
            return Err(Error::protocol(format!("invalid stream ID {}", stream_id)));
        }
        self.insert_idle(side, stream_id);
        Ok(())
    }

    fn activate(&mut self, side: Side, stream_id: StreamId) {
        if self.active.insert(stream_id) {
            self.endpoint_for_mut(side).active_count += 1;
            self.notify(StreamEvent::Active(stream_id));
        }
    }

    fn deactivate(&mut self, stream_id: StreamId) {
        if self.active.shift_remove(&stream_id) {
            let side = self.creator_side(stream_id);
            let endpoint = self.endpoint_for_mut(side);
            endpoint.active_count = endpoint.active_count.saturating_sub(1);
            self.notify(StreamEvent::Inactive(stream_id));
        }
    }

    /// Close our sending side of the stream
    ///
    /// A no-op when already half-closed locally; a full close when the
    /// remote side is already done or the stream is not open.
    pub fn close_local_side(&mut self, stream_id: StreamId) {
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return;
        };
        match stream.state() {
            StreamState::Open => {
                stream.set_state(StreamState::HalfClosedLocal);
                self.notify(StreamEvent::HalfClosed(stream_id));
            }
            StreamState::HalfClosedLocal => {}
            _ => self.close_stream(stream_id),
        }
    }

    /// Close the peer's sending side of the stream
    pub fn close_remote_side(&mut self, stream_id: StreamId) {
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return;
        };
        match stream.state() {
            StreamState::Open => {
                stream.set_state(StreamState::HalfClosedRemote);
                self.notify(StreamEvent::HalfClosed(stream_id));
            }
            StreamState::HalfClosedRemote => {}
            _ => self.close_stream(stream_id),
        }
    }

    /// Fully close a stream
    ///
    /// Idempotent: closing an already-CLOSED stream has no further
    /// observable effect. The stream stays in the table for the removal
    /// grace period so late frames classify as ignorable.
    pub fn close_stream(&mut self, stream_id: StreamId) {
        if stream_id == CONNECTION_STREAM_ID {
            return;
        }
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return;
        };
        if stream.state().is_closed() {
            return;
        }
        let was_active = stream.state().is_active();
        stream.set_state(StreamState::Closed);
        trace!(stream_id, "stream closed");
        if was_active {
            self.deactivate(stream_id);
        }
        self.removal_queue
            .push_back((Instant::now() + self.removal_grace, stream_id));
    }

    /// Remove expired closed streams from the table
    ///
    /// Driven by the embedder's recurring task; `now` is compared against
    /// each stream's close time plus the grace period.
    pub fn run_pending_removals(&mut self, now: Instant) {
        while let Some(&(deadline, stream_id)) = self.removal_queue.front() {
            if deadline > now {
                break;
            }
            self.removal_queue.pop_front();
            self.remove_stream(stream_id);
        }
    }

    fn remove_stream(&mut self, stream_id: StreamId) {
        let Some(stream) = self.streams.get(&stream_id) else {
            return;
        };
        if !stream.state().is_closed() {
            // Re-opened identifiers never happen; being defensive here would
            // hide a state-machine bug, so only closed streams are removed.
            return;
        }
        let parent_id = stream.parent();
        let weight = stream.weight();
        let residual = self.streams[&stream_id].outbound.pending_bytes_for_tree;
        if residual > 0 {
            self.propagate_pending(parent_id, -(residual as i64));
        }

        // Children are adopted by the removed stream's parent.
        let children = self
            .streams
            .get_mut(&stream_id)
            .expect("checked above")
            .take_children();
        for child in &children {
            self.notify(StreamEvent::ParentChanging {
                stream_id: *child,
                old_parent: stream_id,
            });
        }
        for child in &children {
            let child_weight = self.streams[child].weight();
            let child_tree_bytes = self.streams[child].outbound.pending_bytes_for_tree;
            self.streams.get_mut(child).expect("child").set_parent(parent_id);
            let parent = self.streams.get_mut(&parent_id).expect("parent");
            parent.add_child(*child, child_weight);
            if child_tree_bytes > 0 {
                self.propagate_pending(parent_id, child_tree_bytes as i64);
            }
        }
        for child in &children {
            self.notify(StreamEvent::ParentChanged {
                stream_id: *child,
                new_parent: parent_id,
            });
        }

        self.streams
            .get_mut(&parent_id)
            .expect("parent")
            .remove_child(stream_id, weight);
        self.streams.remove(&stream_id);
        self.notify(StreamEvent::Removed(stream_id));
    }

    /// Whether `candidate` sits in the subtree rooted at `root`
    fn is_descendant(&self, root: StreamId, candidate: StreamId) -> bool {
        let mut at = candidate;
        while at != CONNECTION_STREAM_ID {
            match self.streams.get(&at) {
                Some(stream) => {
                    let parent = stream.parent();
                    if parent == root {
                        return true;
                    }
                    at = parent;
                }
                None => return false,
            }
        }
        root == CONNECTION_STREAM_ID && candidate != CONNECTION_STREAM_ID
    }

    /// Reprioritize a stream (RFC 7540 Section 5.3.3)
    ///
    /// Creates the stream and/or the requested parent implicitly as idle
    /// streams when absent. With `exclusive`, the parent's current children
    /// are adopted by the moving stream first. When the requested parent is
    /// a descendant of the moving stream, the old parent adopts the new
    /// parent before reattachment, keeping the tree cycle-free.
    pub fn set_priority(
        &mut self,
        stream_id: StreamId,
        parent_id: StreamId,
        weight: u16,
        exclusive: bool,
    ) -> Result<()> {
        if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
            return Err(Error::protocol(format!(
                "priority weight {} outside 1..=256",
                weight
            )));
        }
        if stream_id == CONNECTION_STREAM_ID {
            return Err(Error::protocol("cannot prioritize the connection stream"));
        }
        if stream_id == parent_id {
            return Err(Error::protocol(format!(
                "stream {} cannot depend on itself",
                stream_id
            )));
        }
        self.create_idle_stream(stream_id)?;
        if parent_id != CONNECTION_STREAM_ID {
            self.create_idle_stream(parent_id)?;
        }

        // Weight change is independent of any move.
        let old_weight = self.streams[&stream_id].weight();
        if weight != old_weight {
            let parent = self.streams[&stream_id].parent();
            let parent_stream = self.streams.get_mut(&parent).expect("parent");
            parent_stream.remove_child(stream_id, old_weight);
            parent_stream.add_child(stream_id, weight);
            self.streams
                .get_mut(&stream_id)
                .expect("stream")
                .set_weight(weight);
            self.notify(StreamEvent::WeightChanged {
                stream_id,
                old_weight,
            });
        }

        let current_parent = self.streams[&stream_id].parent();
        let needs_move = current_parent != parent_id;
        if !needs_move && !exclusive {
            return Ok(());
        }

        // Collect the whole edit before mutating so child iteration never
        // observes a half-applied move.
        let mut moves: Vec<(StreamId, StreamId)> = Vec::new();
        if needs_move && self.is_descendant(stream_id, parent_id) {
            moves.push((parent_id, current_parent));
        }
        if exclusive {
            let adopted: Vec<StreamId> = self.streams[&parent_id]
                .children()
                .filter(|&c| c != stream_id)
                .collect();
            for child in adopted {
                moves.push((child, stream_id));
            }
        }
        if needs_move {
            moves.push((stream_id, parent_id));
        }

        let mut batch: Vec<(StreamId, StreamId, StreamId)> = Vec::new();
        for (moved, new_parent) in moves {
            let old_parent = self.streams[&moved].parent();
            if old_parent == new_parent {
                continue;
            }
            batch.push((moved, old_parent, new_parent));
        }

        for &(moved, old_parent, _) in &batch {
            self.notify(StreamEvent::ParentChanging {
                stream_id: moved,
                old_parent,
            });
        }
        for &(moved, _, new_parent) in &batch {
            self.reattach(moved, new_parent);
        }
        for &(moved, _, new_parent) in &batch {
            self.notify(StreamEvent::ParentChanged {
                stream_id: moved,
                new_parent,
            });
        }
        Ok(())
    }

    /// Detach `stream_id` from its current parent and attach under
    /// `new_parent`, keeping child-weight sums and pending-byte tree
    /// counters consistent.
    fn reattach(&mut self, stream_id: StreamId, new_parent: StreamId) {
        let old_parent = self.streams[&stream_id].parent();
        let weight = self.streams[&stream_id].weight();
        let tree_bytes = self.streams[&stream_id].outbound.pending_bytes_for_tree;

        self.streams
            .get_mut(&old_parent)
            .expect("old parent")
            .remove_child(stream_id, weight);
        if tree_bytes > 0 {
            self.propagate_pending(old_parent, -(tree_bytes as i64));
        }

        self.streams
            .get_mut(&stream_id)
            .expect("stream")
            .set_parent(new_parent);
        self.streams
            .get_mut(&new_parent)
            .expect("new parent")
            .add_child(stream_id, weight);
        if tree_bytes > 0 {
            self.propagate_pending(new_parent, tree_bytes as i64);
        }
    }

    /// Adjust a stream's own pending outbound bytes and every ancestor's
    /// subtree counter
    pub(crate) fn add_pending_bytes(&mut self, stream_id: StreamId, delta: i64) {
        if delta == 0 {
            return;
        }
        let stream = self.streams.get_mut(&stream_id).expect("stream");
        stream.outbound.pending_bytes = add_clamped(stream.outbound.pending_bytes, delta);
        self.propagate_pending(stream_id, delta);
    }

    /// Apply a subtree-counter delta at `start` and every ancestor up to and
    /// including the connection stream
    fn propagate_pending(&mut self, start: StreamId, delta: i64) {
        let mut at = start;
        loop {
            let stream = self.streams.get_mut(&at).expect("ancestor");
            stream.outbound.pending_bytes_for_tree =
                add_clamped(stream.outbound.pending_bytes_for_tree, delta);
            if at == CONNECTION_STREAM_ID {
                break;
            }
            at = stream.parent();
        }
    }

    fn notify(&mut self, event: StreamEvent) {
        // Listeners are invoked after the mutation completed; the vector is
        // split off so a listener may inspect the connection indirectly.
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in listeners.iter_mut() {
            match &event {
                StreamEvent::Added(id) => listener.on_stream_added(*id),
                StreamEvent::Active(id) => listener.on_stream_active(*id),
                StreamEvent::HalfClosed(id) => listener.on_stream_half_closed(*id),
                StreamEvent::Inactive(id) => listener.on_stream_inactive(*id),
                StreamEvent::Removed(id) => listener.on_stream_removed(*id),
                StreamEvent::ParentChanging {
                    stream_id,
                    old_parent,
                } => listener.on_parent_changing(*stream_id, *old_parent),
                StreamEvent::ParentChanged {
                    stream_id,
                    new_parent,
                } => listener.on_parent_changed(*stream_id, *new_parent),
                StreamEvent::WeightChanged {
                    stream_id,
                    old_weight,
                } => listener.on_weight_changed(*stream_id, *old_weight),
                StreamEvent::GoingAway {
                    last_stream_id,
                    error_code,
                } => listener.on_going_away(*last_stream_id, *error_code),
            }
        }
        self.listeners = listeners;
    }
}

fn add_clamped(value: u64, delta: i64) -> u64 {
    if delta >= 0 {
        value.saturating_add(delta as u64)
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct EventLog {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl ConnectionListener for EventLog {
        fn on_stream_added(&mut self, id: u32) {
            self.events.borrow_mut().push(format!("added:{}", id));
        }
        fn on_stream_active(&mut self, id: u32) {
            self.events.borrow_mut().push(format!("active:{}", id));
        }
        fn on_stream_half_closed(&mut self, id: u32) {
            self.events.borrow_mut().push(format!("half-closed:{}", id));
        }
        fn on_stream_inactive(&mut self, id: u32) {
            self.events.borrow_mut().push(format!("inactive:{}", id));
        }
        fn on_stream_removed(&mut self, id: u32) {
            self.events.borrow_mut().push(format!("removed:{}", id));
        }
        fn on_parent_changed(&mut self, id: u32, new_parent: u32) {
            self.events
                .borrow_mut()
                .push(format!("parent:{}->{}", id, new_parent));
        }
    }

    fn client_conn() -> Connection {
        Connection::new(false)
    }

    #[test]
    fn test_endpoint_parity() {
        let conn = Connection::new(true);
        assert!(conn.local().creates_stream_id(2));
        assert!(!conn.local().creates_stream_id(3));
        assert!(conn.remote().creates_stream_id(3));
        assert_eq!(conn.local().next_stream_id(), Some(2));
        assert_eq!(conn.remote().next_stream_id(), Some(1));
    }

    #[test]
    fn test_create_stream_monotonic_ids() {
        let mut conn = client_conn();
        conn.create_stream(Side::Local, 1, false).unwrap();
        conn.create_stream(Side::Local, 5, false).unwrap();
        assert_eq!(conn.local().last_created(), 5);

        // Rewinding is refused
        let err = conn.create_stream(Side::Local, 3, false).unwrap_err();
        assert!(err.is_connection_error());
        // Wrong parity is refused
        let err = conn.create_stream(Side::Local, 6, false).unwrap_err();
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_max_concurrent_streams() {
        let mut conn = client_conn();
        conn.local_mut().set_max_active_streams(1);
        conn.create_stream(Side::Local, 1, false).unwrap();
        let err = conn.create_stream(Side::Local, 3, false).unwrap_err();
        assert!(!err.is_connection_error());
        assert_eq!(err.code(), ErrorCode::RefusedStream);
    }

    #[test]
    fn test_close_choreography() {
        let mut conn = client_conn();
        conn.create_stream(Side::Local, 1, false).unwrap();

        conn.close_local_side(1);
        assert_eq!(conn.stream(1).unwrap().state(), StreamState::HalfClosedLocal);
        // Second local-side close is a no-op
        conn.close_local_side(1);
        assert_eq!(conn.stream(1).unwrap().state(), StreamState::HalfClosedLocal);

        // Closing the other side completes the stream
        conn.close_remote_side(1);
        assert_eq!(conn.stream(1).unwrap().state(), StreamState::Closed);
        assert_eq!(conn.num_active_streams(), 0);
    }

    #[test]
    fn test_close_idempotent() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut conn = client_conn();
        conn.add_listener(Box::new(EventLog {
            events: Rc::clone(&events),
        }));
        conn.create_stream(Side::Local, 1, false).unwrap();
        conn.close_stream(1);
        conn.close_stream(1);

        let inactive = events
            .borrow()
            .iter()
            .filter(|e| e.as_str() == "inactive:1")
            .count();
        assert_eq!(inactive, 1);
    }

    #[test]
    fn test_removal_grace_window() {
        let mut conn = client_conn();
        conn.create_stream(Side::Local, 1, false).unwrap();
        conn.close_stream(1);

        let now = Instant::now();
        conn.run_pending_removals(now);
        assert!(conn.stream(1).is_some(), "still within grace period");
        assert!(conn.is_ignorable_stream(1));

        conn.run_pending_removals(now + Duration::from_secs(6));
        assert!(conn.stream(1).is_none());
        assert!(conn.is_ignorable_stream(1), "removed streams stay ignorable");
        assert!(!conn.is_ignorable_stream(3), "never-created is not ignorable");
    }

    #[test]
    fn test_priority_implicit_parent() {
        let mut conn = client_conn();
        conn.set_priority(3, 1, 32, false).unwrap();
        // Parent 1 was created idle
        assert_eq!(conn.stream(1).unwrap().state(), StreamState::Idle);
        assert_eq!(conn.stream(3).unwrap().parent(), 1);
        assert_eq!(conn.stream(3).unwrap().weight(), 32);
        assert_eq!(conn.stream(1).unwrap().total_child_weights(), 32);
    }

    #[test]
    fn test_priority_self_dependency_rejected() {
        let mut conn = client_conn();
        assert!(conn.set_priority(3, 3, 16, false).is_err());
    }

    #[test]
    fn test_exclusive_adoption() {
        let mut conn = client_conn();
        // Tree: 0 <- 2 <- {1, 3}
        conn.set_priority(1, 2, 16, false).unwrap();
        conn.set_priority(3, 2, 16, false).unwrap();

        // Stream 4 becomes the exclusive child of 2
        conn.set_priority(4, 2, 32, true).unwrap();

        let two = conn.stream(2).unwrap();
        assert_eq!(two.children().collect::<Vec<_>>(), vec![4]);
        assert_eq!(two.total_child_weights(), 32);

        let four = conn.stream(4).unwrap();
        let mut adopted: Vec<_> = four.children().collect();
        adopted.sort_unstable();
        assert_eq!(adopted, vec![1, 3]);
        assert_eq!(four.total_child_weights(), 32);
    }

    #[test]
    fn test_cycle_avoidance() {
        let mut conn = client_conn();
        // Chain: 0 <- 1 <- 3 <- 5
        conn.set_priority(3, 1, 16, false).unwrap();
        conn.set_priority(5, 3, 16, false).unwrap();

        // Move 1 under its own descendant 5: 5 must first move under 0
        conn.set_priority(1, 5, 16, false).unwrap();
        assert_eq!(conn.stream(5).unwrap().parent(), 0);
        assert_eq!(conn.stream(1).unwrap().parent(), 5);
        assert_eq!(conn.stream(3).unwrap().parent(), 1);

        // No stream became its own ancestor
        for id in [1, 3, 5] {
            assert!(!conn.is_descendant(id, id));
        }
    }

    #[test]
    fn test_goaway_refuses_new_streams() {
        let mut conn = client_conn();
        conn.create_stream(Side::Local, 1, false).unwrap();
        conn.goaway_received(1, ErrorCode::NoError);
        assert!(conn.is_going_away());
        assert!(conn.create_stream(Side::Local, 3, false).is_err());
    }

    #[test]
    fn test_removed_stream_children_adopted() {
        let mut conn = client_conn();
        conn.set_priority(1, 0, 16, false).unwrap();
        conn.set_priority(3, 1, 16, false).unwrap();
        conn.create_stream(Side::Local, 1, false).unwrap();
        conn.close_stream(1);
        conn.run_pending_removals(Instant::now() + Duration::from_secs(6));

        assert!(conn.stream(1).is_none());
        assert_eq!(conn.stream(3).unwrap().parent(), 0);
    }
}
