use std::{
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Buf, Bytes, BytesMut};
use futures::Stream;
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::{
    parser::headers::{parse_part_headers, ParsedPartHeaders},
    ParseError, UploadError,
};

/// Upper bound on the header block of a single part.
pub const MAX_PART_HEADER_BYTES: usize = 16 * 1024;

/// Event emitted by [`MultipartStream`] while walking a multipart body.
///
/// Every part produces one `Headers`, zero or more `Chunk`s and one `End`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartEvent {
    /// A new part starts with these headers.
    Headers(ParsedPartHeaders),
    /// A slice of the current part's body.
    Chunk(Bytes),
    /// The current part is complete.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Discarding anything before the first delimiter.
    Preamble,
    Headers,
    Body,
    Finished,
}

/// What follows a delimiter.
enum Transport {
    NextPart,
    Close,
}

/// Incremental multipart parser over a chunked byte stream.
///
/// The buffer starts with a synthetic CRLF so the opening boundary is found by
/// the same `CRLF--boundary` search as every later one. Part bodies are
/// forwarded as they arrive and only a delimiter-sized tail is held back, so
/// memory use does not grow with part size.
#[derive(Debug)]
pub struct MultipartStream<S> {
    upstream: S,
    delimiter: Box<[u8]>,
    buffer: BytesMut,
    state: State,
    eof: bool,
}

impl<S> MultipartStream<S> {
    /// Creates a parser for a boundary already taken from `Content-Type`.
    pub fn new(boundary: impl AsRef<str>, upstream: S) -> Result<Self, ParseError> {
        let boundary = boundary.as_ref();
        if boundary.is_empty() {
            return Err(ParseError::new("multipart boundary cannot be empty"));
        }
        if boundary.contains(|c: char| c == '\r' || c == '\n') {
            return Err(ParseError::new("multipart boundary cannot contain CRLF"));
        }

        let mut delimiter = Vec::with_capacity(boundary.len() + 4);
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(boundary.as_bytes());

        Ok(Self {
            upstream,
            delimiter: delimiter.into_boxed_slice(),
            buffer: BytesMut::from(&b"\r\n"[..]),
            state: State::Preamble,
            eof: false,
        })
    }

    fn step(&mut self) -> Step {
        match self.state {
            State::Preamble => match find(&self.buffer, &self.delimiter) {
                Some(at) => {
                    self.buffer.advance(at);
                    match self.after_delimiter() {
                        Some(Ok(Transport::NextPart)) => {
                            self.state = State::Headers;
                            Step::Continue
                        }
                        Some(Ok(Transport::Close)) => {
                            self.state = State::Finished;
                            Step::Done
                        }
                        // A line that only looks like a delimiter is preamble.
                        Some(Err(_)) => {
                            self.buffer.advance(self.delimiter.len());
                            Step::Continue
                        }
                        None => Step::NeedMore,
                    }
                }
                None if self.eof => self.fail(ParseError::new("missing opening boundary")),
                None => {
                    let keep = self.delimiter.len() - 1;
                    let stale = self.buffer.len().saturating_sub(keep);
                    self.buffer.advance(stale);
                    Step::NeedMore
                }
            },
            State::Headers => {
                if self.buffer.starts_with(b"\r\n") {
                    // Part with no headers at all.
                    self.buffer.advance(2);
                    return self.headers(BytesMut::new());
                }
                let Some(at) = find(&self.buffer, b"\r\n\r\n") else {
                    if self.buffer.len() > MAX_PART_HEADER_BYTES {
                        return self.fail(ParseError::new("part headers are too large"));
                    }
                    return Step::NeedMore;
                };
                if at > MAX_PART_HEADER_BYTES {
                    return self.fail(ParseError::new("part headers are too large"));
                }
                let block = self.buffer.split_to(at);
                self.buffer.advance(4);
                self.headers(block)
            }
            State::Body => {
                let Some(at) = find(&self.buffer, &self.delimiter) else {
                    // The delimiter may straddle two chunks; keep its longest
                    // possible prefix.
                    let ready = self
                        .buffer
                        .len()
                        .saturating_sub(self.delimiter.len() - 1);
                    return match ready {
                        0 => Step::NeedMore,
                        n => Step::Emit(PartEvent::Chunk(self.buffer.split_to(n).freeze())),
                    };
                };
                if at > 0 {
                    return Step::Emit(PartEvent::Chunk(self.buffer.split_to(at).freeze()));
                }
                match self.after_delimiter() {
                    Some(Ok(Transport::NextPart)) => {
                        self.state = State::Headers;
                        Step::Emit(PartEvent::End)
                    }
                    Some(Ok(Transport::Close)) => {
                        self.state = State::Finished;
                        Step::Emit(PartEvent::End)
                    }
                    Some(Err(err)) => self.fail(err),
                    None => Step::NeedMore,
                }
            }
            State::Finished => Step::Done,
        }
    }

    /// Consumes a delimiter sitting at the start of the buffer together with
    /// its transport padding. `None` means more input is needed.
    fn after_delimiter(&mut self) -> Option<Result<Transport, ParseError>> {
        let tail = &self.buffer[self.delimiter.len()..];

        let (transport, consumed) = if tail.starts_with(b"--") {
            // Anything after the close delimiter is epilogue.
            (Transport::Close, tail.len())
        } else {
            let padding = tail
                .iter()
                .take_while(|byte| matches!(byte, b' ' | b'\t'))
                .count();
            match &tail[padding..] {
                [b'\r', b'\n', ..] => (Transport::NextPart, padding + 2),
                [] | [b'\r'] if !self.eof => return None,
                [b'-'] if !self.eof && padding == 0 => return None,
                _ => {
                    return Some(Err(ParseError::new("malformed multipart boundary")));
                }
            }
        };

        self.buffer.advance(self.delimiter.len() + consumed);
        Some(Ok(transport))
    }

    fn headers(&mut self, block: BytesMut) -> Step {
        match header_map(&block).and_then(|map| parse_part_headers(&map)) {
            Ok(headers) => {
                self.state = State::Body;
                Step::Emit(PartEvent::Headers(headers))
            }
            Err(err) => self.fail(err),
        }
    }

    fn fail(&mut self, err: impl Into<UploadError>) -> Step {
        self.state = State::Finished;
        self.buffer.clear();
        Step::Fail(err.into())
    }
}

enum Step {
    Continue,
    NeedMore,
    Emit(PartEvent),
    Fail(UploadError),
    Done,
}

impl<S> Stream for MultipartStream<S>
where
    S: Stream<Item = Result<Bytes, UploadError>> + Unpin,
{
    type Item = Result<PartEvent, UploadError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            match this.step() {
                Step::Continue => continue,
                Step::Emit(event) => return Poll::Ready(Some(Ok(event))),
                Step::Fail(err) => return Poll::Ready(Some(Err(err))),
                Step::Done => return Poll::Ready(None),
                Step::NeedMore if this.eof => {
                    this.state = State::Finished;
                    return Poll::Ready(Some(Err(UploadError::IncompleteStream)));
                }
                Step::NeedMore => {}
            }

            match Pin::new(&mut this.upstream).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => this.buffer.extend_from_slice(&chunk),
                Poll::Ready(Some(Err(err))) => {
                    this.state = State::Finished;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => this.eof = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

fn header_map(block: &[u8]) -> Result<HeaderMap, ParseError> {
    let mut map = HeaderMap::new();
    for line in block.split(|byte| *byte == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let Some(colon) = line.iter().position(|byte| *byte == b':') else {
            return Err(ParseError::new("invalid part header line"));
        };
        let name = HeaderName::from_bytes(trim(&line[..colon]))
            .map_err(|_| ParseError::new("invalid part header name"))?;
        let value = HeaderValue::from_bytes(trim(&line[colon + 1..]))
            .map_err(|_| ParseError::new("invalid part header value"))?;
        map.append(name, value);
    }
    Ok(map)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(start, |last| last + 1);
    &bytes[start..end]
}
