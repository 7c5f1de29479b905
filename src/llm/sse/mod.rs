//! Streaming event ingestion for SSE response bodies.
//!
//! Raw chunks are appended to a [`FrameBuffer`] and split on blank lines;
//! each complete frame is classified into an event name and data payload,
//! decoded as JSON, and run through the dispatch table of [`Dispatcher`].
//! The resulting [`StreamItem`]s reach the consumer in arrival order until a
//! terminal event or end-of-data.
//!
//! [`drive`] and [`EventStream`] pull from a blocking [`Transport`];
//! [`drive_async`] consumes an async byte stream. Both share
//! [`StreamSession`].

mod classifier;
mod decoder;
mod dispatcher;
mod driver;
mod session;
mod splitter;

pub use classifier::{
    ClassifiedEvent, DONE_SENTINEL, MESSAGE_OTHER, MESSAGE_STOP, classify_frame,
};
pub use decoder::{MalformedPayload, decode_payload};
pub use dispatcher::{DispatchState, Dispatcher, StreamItem};
pub use driver::{
    DEFAULT_CHUNK_SIZE, EventStream, ReadTransport, StreamError, Transport, drive, drive_async,
    drive_with_chunk_size,
};
pub use session::{StreamOutcome, StreamSession};
pub use splitter::{FRAME_DELIMITER, FrameBuffer, split_frames};
