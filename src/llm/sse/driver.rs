use std::error::Error;
use std::fmt;
use std::io::{self, Read};
use std::pin::pin;

use futures::{Stream, StreamExt};

use crate::llm::sse::dispatcher::StreamItem;
use crate::llm::sse::session::{StreamOutcome, StreamSession};

/// Bytes requested from the transport per read.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Pull source of raw response bytes.
pub trait Transport {
    /// Reads up to `max_bytes`. `Ok(None)` signals end-of-data.
    fn read_chunk(&mut self, max_bytes: usize) -> io::Result<Option<Vec<u8>>>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read_chunk(&mut self, max_bytes: usize) -> io::Result<Option<Vec<u8>>> {
        (**self).read_chunk(max_bytes)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_chunk(&mut self, max_bytes: usize) -> io::Result<Option<Vec<u8>>> {
        (**self).read_chunk(max_bytes)
    }
}

/// [`Transport`] over any [`Read`], such as a blocking HTTP response body.
#[derive(Debug)]
pub struct ReadTransport<R> {
    reader: R,
}

impl<R: Read> ReadTransport<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> Transport for ReadTransport<R> {
    fn read_chunk(&mut self, max_bytes: usize) -> io::Result<Option<Vec<u8>>> {
        let mut chunk = vec![0; max_bytes.max(1)];
        loop {
            match self.reader.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(read) => {
                    chunk.truncate(read);
                    return Ok(Some(chunk));
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

/// Failure that stops a stream.
#[derive(Debug)]
pub enum StreamError<E> {
    /// Reading from the transport failed.
    Transport(io::Error),
    /// The consumer asked to stop.
    Consumer(E),
}

impl<E: fmt::Display> fmt::Display for StreamError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(source) => write!(f, "stream transport failed: {source}"),
            Self::Consumer(source) => write!(f, "stream consumer stopped: {source}"),
        }
    }
}

impl<E: Error + 'static> Error for StreamError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(source) => Some(source),
            Self::Consumer(source) => Some(source),
        }
    }
}

/// Lazily pulls items from a transport.
///
/// Each call to `next` reads only as much as needed to produce the next
/// item. After a terminal event or end-of-data the transport is dropped and
/// the iterator is exhausted; [`outcome`](Self::outcome) then tells which of
/// the two happened. A transport error is yielded once, then iteration ends.
pub struct EventStream<T> {
    transport: Option<T>,
    session: StreamSession,
    chunk_size: usize,
    outcome: Option<StreamOutcome>,
}

impl<T: Transport> EventStream<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
            session: StreamSession::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            outcome: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set once the stream has completed or ended.
    pub fn outcome(&self) -> Option<StreamOutcome> {
        self.outcome
    }

    fn close(&mut self) {
        if self.outcome.is_none() {
            let outcome = self.session.finish();
            tracing::debug!(?outcome, "SSE stream closed");
            self.outcome = Some(outcome);
        }
        self.transport = None;
    }
}

impl<T: Transport> Iterator for EventStream<T> {
    type Item = io::Result<StreamItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.session.next_item() {
                if self.session.is_terminated() {
                    self.close();
                }
                return Some(Ok(item));
            }
            if self.session.is_terminated() {
                self.close();
                return None;
            }

            let transport = self.transport.as_mut()?;
            match transport.read_chunk(self.chunk_size) {
                Ok(Some(chunk)) => self.session.feed(&chunk),
                Ok(None) => {
                    self.close();
                    return None;
                }
                Err(err) => {
                    tracing::debug!(error = %err, "SSE transport read failed");
                    self.transport = None;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Runs the blocking read loop, handing each item to `consumer`.
///
/// Reads [`DEFAULT_CHUNK_SIZE`] bytes at a time. The transport is dropped
/// before returning on every path.
pub fn drive<T, F, E>(transport: T, consumer: F) -> Result<StreamOutcome, StreamError<E>>
where
    T: Transport,
    F: FnMut(StreamItem) -> Result<(), E>,
{
    drive_with_chunk_size(transport, DEFAULT_CHUNK_SIZE, consumer)
}

pub fn drive_with_chunk_size<T, F, E>(
    transport: T,
    chunk_size: usize,
    mut consumer: F,
) -> Result<StreamOutcome, StreamError<E>>
where
    T: Transport,
    F: FnMut(StreamItem) -> Result<(), E>,
{
    let mut events = EventStream::new(transport).with_chunk_size(chunk_size);
    for item in events.by_ref() {
        let item = item.map_err(StreamError::Transport)?;
        consumer(item).map_err(StreamError::Consumer)?;
    }
    Ok(events
        .outcome()
        .unwrap_or(StreamOutcome::Ended { trailing_bytes: 0 }))
}

/// Async counterpart of [`drive`] over a byte stream such as
/// `reqwest::Response::bytes_stream()`.
pub async fn drive_async<S, B, X, F, E>(
    body: S,
    mut consumer: F,
) -> Result<StreamOutcome, StreamError<E>>
where
    S: Stream<Item = Result<B, X>>,
    B: AsRef<[u8]>,
    X: Into<Box<dyn Error + Send + Sync>>,
    F: FnMut(StreamItem) -> Result<(), E>,
{
    let mut body = pin!(body);
    let mut session = StreamSession::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|err| StreamError::Transport(io::Error::other(err)))?;
        session.feed(chunk.as_ref());
        while let Some(item) = session.next_item() {
            consumer(item).map_err(StreamError::Consumer)?;
        }
        if session.is_terminated() {
            tracing::debug!("SSE stream completed");
            return Ok(StreamOutcome::Completed);
        }
    }

    let outcome = session.finish();
    tracing::debug!(?outcome, "SSE stream closed");
    Ok(outcome)
}
