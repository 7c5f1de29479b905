use std::collections::VecDeque;

use crate::llm::sse::classifier::classify_frame;
use crate::llm::sse::dispatcher::{DispatchState, Dispatcher, StreamItem};
use crate::llm::sse::splitter::FrameBuffer;

/// How a stream session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// A terminal event was observed.
    Completed,
    /// The transport ran out of data first. `trailing_bytes` counts buffered
    /// text that never completed a frame.
    Ended { trailing_bytes: usize },
}

impl StreamOutcome {
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// State of one streaming response, independent of how bytes arrive.
///
/// Chunks go in through [`feed`](Self::feed); items come out of
/// [`next_item`](Self::next_item) one frame at a time, in arrival order.
#[derive(Debug, Default)]
pub struct StreamSession {
    buffer: FrameBuffer,
    frames: VecDeque<String>,
    dispatcher: Dispatcher,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DispatchState {
        self.dispatcher.state()
    }

    pub fn is_terminated(&self) -> bool {
        self.dispatcher.is_terminated()
    }

    /// Appends one raw chunk and queues the frames it completes.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.is_terminated() || chunk.is_empty() {
            return;
        }
        self.dispatcher.begin();
        self.buffer.push_bytes(chunk);
        let frames = self.buffer.drain_frames();
        tracing::trace!(
            bytes = chunk.len(),
            frames = frames.len(),
            "buffered SSE chunk"
        );
        self.frames.extend(frames);
    }

    /// Dispatches queued frames until one yields an item.
    ///
    /// Returns `None` when the queue is empty or the session has terminated.
    /// Frames still queued at termination are discarded.
    pub fn next_item(&mut self) -> Option<StreamItem> {
        while let Some(frame) = self.frames.pop_front() {
            let item = classify_frame(&frame).and_then(|event| self.dispatcher.dispatch(&event));
            if self.dispatcher.is_terminated() {
                self.discard_pending();
            }
            if item.is_some() {
                return item;
            }
        }
        None
    }

    /// Closes the session at end-of-data.
    pub fn finish(&mut self) -> StreamOutcome {
        if self.is_terminated() {
            return StreamOutcome::Completed;
        }
        let trailing_bytes = self.buffer.trailing_len();
        if trailing_bytes > 0 {
            tracing::warn!(trailing_bytes, "stream ended inside an unterminated SSE record");
        }
        self.dispatcher.end();
        self.discard_pending();
        StreamOutcome::Ended { trailing_bytes }
    }

    fn discard_pending(&mut self) {
        self.frames.clear();
        self.buffer.clear();
    }
}
