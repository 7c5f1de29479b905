use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use mpchat::llm::sse::{
    DispatchState, EventStream, StreamError, StreamItem, StreamOutcome, StreamSession, Transport,
    classify_frame, drive, drive_with_chunk_size, split_frames,
};
use mpchat::logging::default_level;
use serde_json::json;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Serves a fixed list of chunks and counts reads.
struct ChunkTransport {
    chunks: VecDeque<Vec<u8>>,
    reads: Rc<Cell<usize>>,
}

impl ChunkTransport {
    fn new<I, C>(chunks: I) -> (Self, Rc<Cell<usize>>)
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        let reads = Rc::new(Cell::new(0));
        let transport = Self {
            chunks: chunks.into_iter().map(|chunk| chunk.as_ref().to_vec()).collect(),
            reads: Rc::clone(&reads),
        };
        (transport, reads)
    }
}

impl Transport for ChunkTransport {
    fn read_chunk(&mut self, _max_bytes: usize) -> io::Result<Option<Vec<u8>>> {
        self.reads.set(self.reads.get() + 1);
        Ok(self.chunks.pop_front())
    }
}

const ANTHROPIC_STREAM: &str = concat!(
    "event: message_start\n",
    "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"role\":\"assistant\",\"content\":[],\"usage\":{\"input_tokens\":12}}}\n\n",
    ": keep-alive\n\n",
    "event: content_block_start\n",
    "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
    "event: ping\n",
    "data: {\"type\":\"ping\"}\n\n",
    "event: content_block_delta\n",
    "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Héllo\"}}\n\n",
    "event: content_block_delta\n",
    "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" wörld\"}}\n\n",
    "event: message_delta\n",
    "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":4}}\n\n",
    "event: message_stop\n",
    "data: {\"type\":\"message_stop\"}\n\n",
);

fn collect_items<T: Transport>(transport: T, chunk_size: usize) -> (Vec<StreamItem>, StreamOutcome) {
    let mut items = Vec::new();
    let outcome = drive_with_chunk_size(transport, chunk_size, |item| {
        items.push(item);
        Ok::<(), io::Error>(())
    })
    .unwrap();
    (items, outcome)
}

fn items_for_chunks(chunks: &[&[u8]]) -> Vec<StreamItem> {
    let mut session = StreamSession::new();
    let mut items = Vec::new();
    for chunk in chunks {
        session.feed(chunk);
        while let Some(item) = session.next_item() {
            items.push(item);
        }
    }
    items
}

#[test]
fn incremental_split_matches_batch_split_at_every_boundary() {
    let input = "event: a\ndata: 1\n\n\n\ndata: 2\n\nevent: b\ndata: 3\n\ndata: tail";
    let (batch_frames, batch_rest) = split_frames(input);

    for cut in 0..=input.len() {
        let (first, rest) = input.split_at(cut);
        let (mut frames, remainder) = split_frames(first);
        let carried = format!("{remainder}{rest}");
        let (more, final_rest) = split_frames(&carried);
        frames.extend(more);

        assert_eq!(frames, batch_frames, "cut at {cut}");
        assert_eq!(final_rest, batch_rest, "cut at {cut}");
    }
}

#[test]
fn one_byte_chunks_lose_no_events() {
    let (whole, whole_outcome) = collect_items(ChunkTransport::new([ANTHROPIC_STREAM]).0, 1024);
    let (bytewise, bytewise_outcome) = collect_items(
        ChunkTransport::new(ANTHROPIC_STREAM.as_bytes().chunks(1)).0,
        1,
    );

    assert_eq!(whole.len(), 7);
    assert_eq!(bytewise, whole);
    assert_eq!(whole_outcome, StreamOutcome::Completed);
    assert_eq!(bytewise_outcome, StreamOutcome::Completed);
}

#[test]
fn every_two_chunk_split_yields_the_same_items() {
    let bytes = ANTHROPIC_STREAM.as_bytes();
    let expected = items_for_chunks(&[bytes]);

    for cut in 0..=bytes.len() {
        let (first, second) = bytes.split_at(cut);
        assert_eq!(items_for_chunks(&[first, second]), expected, "cut at {cut}");
    }
}

#[test]
fn items_arrive_in_frame_order_with_text_deltas() {
    let (items, _) = collect_items(ChunkTransport::new([ANTHROPIC_STREAM]).0, 64);

    let StreamItem::Message(start) = &items[0] else {
        panic!("expected aggregated message first, got {:?}", items[0]);
    };
    assert_eq!(start.id.as_deref(), Some("msg_1"));
    assert_eq!(start.usage.as_ref().and_then(|usage| usage.input()), Some(12));

    let types = items[1..]
        .iter()
        .map(|item| item.payload_type().unwrap_or("?"))
        .collect::<Vec<_>>();
    assert_eq!(
        types,
        [
            "content_block_start",
            "ping",
            "content_block_delta",
            "content_block_delta",
            "message_delta",
            "message_stop"
        ]
    );

    let text = items.iter().filter_map(StreamItem::text_delta).collect::<String>();
    assert_eq!(text, "Héllo wörld");
}

#[test]
fn termination_is_sticky() {
    let mut session = StreamSession::new();
    session.feed(b"data: [DONE]\n\ndata: {\"late\":1}\n\n");
    assert!(matches!(session.next_item(), Some(StreamItem::Malformed(_))));
    assert_eq!(session.state(), DispatchState::Terminated);
    assert_eq!(session.next_item(), None);

    session.feed(b"event: content_block_delta\ndata: {\"delta\":{\"text\":\"x\"}}\n\n");
    assert_eq!(session.next_item(), None);
    assert_eq!(session.finish(), StreamOutcome::Completed);
}

#[test]
fn single_delta_frame_is_forwarded_raw() {
    let (items, outcome) = collect_items(
        ChunkTransport::new(["event: content_block_delta\ndata: {\"delta\":{\"text\":\"Hi\"}}\n\n"]).0,
        1024,
    );

    assert_eq!(items, vec![StreamItem::Payload(json!({"delta": {"text": "Hi"}}))]);
    assert_eq!(outcome, StreamOutcome::Ended { trailing_bytes: 0 });
}

#[test]
fn event_line_split_across_chunks_terminates_without_further_reads() {
    let (transport, reads) = ChunkTransport::new([
        "event: message_sto",
        "p\ndata: {\"type\":\"message_stop\"}\n\n",
        "event: content_block_delta\ndata: {\"delta\":{\"text\":\"never\"}}\n\n",
    ]);

    let (items, outcome) = collect_items(transport, 1024);

    assert_eq!(items, vec![StreamItem::Payload(json!({"type": "message_stop"}))]);
    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(reads.get(), 2);
}

#[test]
fn done_sentinel_is_malformed_then_terminal() {
    let event = classify_frame("data: [DONE]").unwrap();
    assert_eq!(event.event_name, "message_stop");
    assert_eq!(event.raw_data, "[DONE]");

    let (transport, reads) = ChunkTransport::new(["data: [DONE]\n\n", "data: {}\n\n"]);
    let (items, outcome) = collect_items(transport, 1024);

    assert_eq!(items.len(), 1);
    let StreamItem::Malformed(malformed) = &items[0] else {
        panic!("expected malformed item, got {:?}", items[0]);
    };
    assert_eq!(malformed.raw, "[DONE]");
    assert_eq!(malformed.event_name, "message_stop");
    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(reads.get(), 1);
}

#[test]
fn message_start_yields_aggregated_message() {
    let (items, _) = collect_items(
        ChunkTransport::new(["event: message_start\ndata: {\"message\":{\"id\":\"m1\"}}\n\n"]).0,
        1024,
    );

    assert_eq!(items.len(), 1);
    let StreamItem::Message(message) = &items[0] else {
        panic!("expected aggregated message, got {:?}", items[0]);
    };
    assert_eq!(message.id.as_deref(), Some("m1"));
}

#[test]
fn two_frames_in_one_chunk_are_dispatched_from_one_read() {
    let (transport, reads) = ChunkTransport::new([
        "event: content_block_delta\ndata: {\"delta\":{\"text\":\"a\"}}\n\nevent: content_block_delta\ndata: {\"delta\":{\"text\":\"b\"}}\n\n",
    ]);
    let mut events = EventStream::new(transport);

    let first = events.next().unwrap().unwrap();
    let second = events.next().unwrap().unwrap();
    assert_eq!(first.text_delta(), Some("a"));
    assert_eq!(second.text_delta(), Some("b"));
    assert_eq!(reads.get(), 1);

    assert!(events.next().is_none());
    assert_eq!(events.outcome(), Some(StreamOutcome::Ended { trailing_bytes: 0 }));
}

#[test]
fn malformed_payload_does_not_stop_the_stream() {
    let (items, outcome) = collect_items(
        ChunkTransport::new([
            "event: content_block_delta\ndata: {not json\n\nevent: content_block_delta\ndata: {\"delta\":{\"text\":\"ok\"}}\n\n",
        ])
        .0,
        1024,
    );

    assert_eq!(items.len(), 2);
    assert!(matches!(&items[0], StreamItem::Malformed(bad) if bad.raw == "{not json"));
    assert_eq!(items[1].text_delta(), Some("ok"));
    assert_eq!(outcome, StreamOutcome::Ended { trailing_bytes: 0 });
}

#[test]
fn trailing_partial_frame_is_reported() {
    let (items, outcome) = collect_items(
        ChunkTransport::new(["data: {\"a\":1}\n\ndata: {\"b\":"]).0,
        1024,
    );

    assert_eq!(items, vec![StreamItem::Payload(json!({"a": 1}))]);
    assert_eq!(outcome, StreamOutcome::Ended { trailing_bytes: 11 });
    assert!(!outcome.is_completed());
}

#[test]
fn openai_chunks_stream_until_done() {
    let stream = concat!(
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"4\"}}]}\n\n",
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    let (items, outcome) = collect_items(ChunkTransport::new(stream.as_bytes().chunks(7)).0, 7);

    assert_eq!(items.len(), 4);
    let text = items.iter().filter_map(StreamItem::text_delta).collect::<String>();
    assert_eq!(text, "4");
    assert!(matches!(items[3], StreamItem::Malformed(_)));
    assert_eq!(outcome, StreamOutcome::Completed);
}

#[test]
fn consumer_error_cancels_the_stream() {
    let (transport, reads) = ChunkTransport::new([
        "data: {\"n\":1}\n\n",
        "data: {\"n\":2}\n\n",
        "data: {\"n\":3}\n\n",
    ]);

    let mut seen = 0;
    let result = drive(transport, |_| {
        seen += 1;
        if seen == 2 { Err("enough") } else { Ok(()) }
    });

    assert!(matches!(result, Err(StreamError::Consumer("enough"))));
    assert_eq!(seen, 2);
    assert_eq!(reads.get(), 2);
}

/// In-memory log sink for a scoped subscriber.
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLog {
    type Writer = CapturedLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn logs_at_default_level(run: impl FnOnce()) -> String {
    let log = CapturedLog::default();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(default_level(false, false)))
        .with_writer(log.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, run);
    log.contents()
}

#[test]
fn done_sentinel_ends_stream_without_warning() {
    let stream = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"4\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    let mut items = Vec::new();
    let output = logs_at_default_level(|| {
        items = collect_items(ChunkTransport::new([stream]).0, 1024).0;
    });

    assert_eq!(items.len(), 2);
    assert!(matches!(&items[1], StreamItem::Malformed(done) if done.raw == "[DONE]"));
    assert!(!output.contains("WARN"), "unexpected log output: {output}");
}

#[test]
fn undecodable_payload_still_warns() {
    let output = logs_at_default_level(|| {
        collect_items(
            ChunkTransport::new(["event: content_block_delta\ndata: {oops\n\ndata: [DONE]\n\n"]).0,
            1024,
        );
    });

    assert_eq!(output.matches("undecodable SSE payload").count(), 1, "{output}");
    assert!(output.contains("WARN"));
}
