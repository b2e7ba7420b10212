//! Outbound write capability
//!
//! The core hands encoded frames to a [`FrameSink`] supplied by the
//! embedder. Every write carries a completion callback; multi-frame writes
//! (header-block splitting, DATA splitting) share one caller-visible
//! completion through [`AggregateCompletion`].

use crate::error::{Error, Result};
use bytes::Bytes;
use std::cell::RefCell;
use std::rc::Rc;

/// Completion callback for a single logical write
///
/// Fired exactly once, with `Ok(())` once the bytes are accepted downstream
/// or with the failure that prevented it.
pub type WriteCompletion = Box<dyn FnOnce(Result<()>)>;

/// A completion that ignores the outcome
pub fn discard_completion() -> WriteCompletion {
    Box::new(|_| {})
}

/// Abstract "write bytes downstream" capability
///
/// Implementations must not reorder writes. `flush` pushes everything
/// buffered so far toward the transport; the core calls it at most once per
/// flow-control distribution pass.
pub trait FrameSink {
    /// Submit bytes with a completion signal
    fn write(&mut self, bytes: Bytes, completion: WriteCompletion);

    /// Push buffered writes toward the transport
    fn flush(&mut self);
}

struct AggregateState {
    outstanding: usize,
    sealed: bool,
    completion: Option<WriteCompletion>,
}

impl AggregateState {
    fn complete(&mut self, result: Result<()>) {
        if let Some(completion) = self.completion.take() {
            completion(result);
        }
    }
}

/// Aggregates several physical writes behind one caller completion
///
/// The caller completion fires with success only once every forked child has
/// succeeded and [`AggregateCompletion::seal`] was called; it fires with
/// failure (exactly once) on the first child failure.
pub struct AggregateCompletion {
    state: Rc<RefCell<AggregateState>>,
}

impl AggregateCompletion {
    /// Wrap a caller completion
    pub fn new(completion: WriteCompletion) -> Self {
        AggregateCompletion {
            state: Rc::new(RefCell::new(AggregateState {
                outstanding: 0,
                sealed: false,
                completion: Some(completion),
            })),
        }
    }

    /// Fork a child completion for one constituent write
    pub fn fork(&self) -> WriteCompletion {
        self.state.borrow_mut().outstanding += 1;
        let state = Rc::clone(&self.state);
        Box::new(move |result| {
            let mut state = state.borrow_mut();
            state.outstanding -= 1;
            match result {
                Ok(()) => {
                    if state.sealed && state.outstanding == 0 {
                        state.complete(Ok(()));
                    }
                }
                Err(e) => state.complete(Err(e)),
            }
        })
    }

    /// Declare that no further children will be forked
    ///
    /// If every child already completed successfully, the caller completion
    /// fires now; a childless aggregate fires immediately.
    pub fn seal(self) {
        let mut state = self.state.borrow_mut();
        state.sealed = true;
        if state.outstanding == 0 {
            state.complete(Ok(()));
        }
    }
}

/// Clone an error for fan-out to several completions
///
/// Completions take errors by value; when one failure must be reported to
/// many waiters the original is duplicated through its classification.
pub(crate) fn clone_error(err: &Error) -> Error {
    match err {
        Error::Connection { code, message } => Error::Connection {
            code: *code,
            message: message.clone(),
        },
        Error::Stream(e) => Error::Stream(e.clone()),
        Error::CompositeStream(errors) => Error::CompositeStream(errors.clone()),
        Error::HeaderCodec { code, message } => Error::HeaderCodec {
            code: *code,
            message: message.clone(),
        },
        Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
    }
}
