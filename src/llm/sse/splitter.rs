use std::mem;

/// Blank line separating two SSE records.
pub const FRAME_DELIMITER: &str = "\n\n";

/// Splits `buffer` into complete frames and the unconsumed remainder.
///
/// Every segment that precedes a delimiter is a frame; whatever follows the
/// last delimiter (or the whole buffer when there is none) is returned
/// verbatim as the remainder. Empty and whitespace-only segments are skipped.
pub fn split_frames(buffer: &str) -> (Vec<&str>, &str) {
    let mut segments = buffer.split(FRAME_DELIMITER);
    let mut remainder = segments.next().unwrap_or_default();
    let mut frames = Vec::new();

    for segment in segments {
        if !remainder.trim().is_empty() {
            frames.push(remainder);
        }
        remainder = segment;
    }
    (frames, remainder)
}

/// Growing text buffer fed with raw transport chunks.
///
/// Chunks are appended as UTF-8. A multi-byte sequence cut by a chunk
/// boundary is held back until the next chunk completes it; invalid bytes
/// are replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    text: String,
    partial: Vec<u8>,
    /// No delimiter starts before this offset of `text`.
    scan_from: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one raw chunk.
    pub fn push_bytes(&mut self, chunk: &[u8]) {
        if self.partial.is_empty() {
            self.decode_into_text(chunk);
        } else {
            let mut joined = mem::take(&mut self.partial);
            joined.extend_from_slice(chunk);
            self.decode_into_text(&joined);
        }
    }

    /// Appends already-decoded text.
    pub fn push_str(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Removes and returns every complete frame, keeping the remainder.
    ///
    /// Only text appended since the previous call is searched, so a frame
    /// that arrives over many chunks is scanned once. Yields the same frames
    /// as [`split_frames`] over the whole buffer.
    pub fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        let mut consumed = 0;
        let mut pos = self.scan_from;

        while let Some(found) = self.text[pos..].find(FRAME_DELIMITER) {
            let end = pos + found;
            let segment = &self.text[consumed..end];
            if !segment.trim().is_empty() {
                frames.push(segment.to_owned());
            }
            consumed = end + FRAME_DELIMITER.len();
            pos = consumed;
        }

        self.text.drain(..consumed);
        // A trailing `\n` may be the first half of the next delimiter.
        self.scan_from = if self.text.ends_with('\n') {
            self.text.len() - 1
        } else {
            self.text.len()
        };
        frames
    }

    /// Text waiting for a delimiter.
    pub fn remainder(&self) -> &str {
        &self.text
    }

    /// Number of buffered bytes that never completed a frame, ignoring
    /// whitespace.
    pub fn trailing_len(&self) -> usize {
        self.text.trim().len() + self.partial.len()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.partial.clear();
        self.scan_from = 0;
    }

    fn decode_into_text(&mut self, mut bytes: &[u8]) {
        loop {
            match std::str::from_utf8(bytes) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = bytes.split_at(err.valid_up_to());
                    // `valid_up_to` guarantees this prefix is UTF-8.
                    self.text.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(invalid) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            bytes = &rest[invalid..];
                        }
                        None => {
                            self.partial = rest.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }
}
