// crates/secure-audit-mcp/src/transport/pipe.rs
// ============================================================================
// Module: Pipe Transport
// Description: Framed JSON-RPC over a byte pipe (stdio in production).
// Purpose: Serve one local client with one request in flight.
// Dependencies: async-trait, tokio
// ============================================================================

//! ## Overview
//! Two framings are accepted on input: MCP `Content-Length` headers followed
//! by a body, and newline-delimited JSON. The reply uses the framing of the
//! request it answers. Bodies larger than the limit are read off the pipe
//! and discarded so the next frame starts cleanly. A header block that
//! cannot be trusted (bad `Content-Length`, overlong header line) is skipped
//! up to its terminating blank line and answered in line framing; detection
//! then starts over with the next line.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;

use async_trait::async_trait;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

use crate::invocation::TransportKind;
use crate::protocol::JsonRpcResponse;
use crate::transport::Transport;
use crate::transport::TransportError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Longest accepted header line.
const MAX_HEADER_BYTES: usize = 1024;

// ============================================================================
// SECTION: Framing
// ============================================================================

/// Framing of the most recent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `Content-Length` header block and body.
    ContentLength,
    /// One JSON document per line.
    Lines,
}

/// First line of a frame.
enum LineKind {
    /// `Content-Length` header with a valid value.
    ContentLength(usize),
    /// `Content-Length` header with an unparsable value.
    BadContentLength,
    /// Anything else, treated as a line-framed request.
    Other,
}

/// Outcome of a bounded line read.
enum BoundedLine {
    /// Line without its terminator.
    Bytes(Vec<u8>),
    /// Line exceeded the bound; holds the full length read.
    TooLong(usize),
}

// ============================================================================
// SECTION: Pipe Transport
// ============================================================================

/// Pipe transport over any buffered reader and writer.
pub struct PipeTransport<R, W> {
    /// Request source.
    reader: R,
    /// Reply sink.
    writer: W,
    /// Largest accepted body.
    max_body_bytes: usize,
    /// Framing used for the next reply.
    framing: Framing,
}

impl<R, W> PipeTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a pipe transport.
    pub const fn new(reader: R, writer: W, max_body_bytes: usize) -> Self {
        Self {
            reader,
            writer,
            max_body_bytes,
            framing: Framing::ContentLength,
        }
    }

    /// Returns the framing of the most recent request.
    pub const fn framing(&self) -> Framing {
        self.framing
    }

    /// Returns the reader and writer.
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Reads one line of at most `limit` bytes. Longer lines are consumed in
    /// full and reported as [`BoundedLine::TooLong`].
    async fn read_line_bounded(&mut self, limit: usize) -> Result<Option<BoundedLine>, TransportError> {
        let mut line = Vec::new();
        let mut total = 0_usize;
        let mut oversized = false;
        loop {
            let available = self.reader.fill_buf().await.map_err(read_error)?;
            if available.is_empty() {
                if total == 0 {
                    return Ok(None);
                }
                break;
            }
            let (chunk, done) = match available.iter().position(|byte| *byte == b'\n') {
                Some(pos) => (&available[..=pos], true),
                None => (available, false),
            };
            let len = chunk.len();
            if !oversized && line.len() + len <= limit.saturating_add(2) {
                line.extend_from_slice(chunk);
            } else {
                oversized = true;
                line.clear();
            }
            total += len;
            self.reader.consume(len);
            if done {
                break;
            }
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if oversized || line.len() > limit {
            return Ok(Some(BoundedLine::TooLong(total)));
        }
        Ok(Some(BoundedLine::Bytes(line)))
    }

    /// Discards header lines up to and including the blank terminator.
    async fn skip_header_block(&mut self) -> Result<(), TransportError> {
        loop {
            match self.read_line_bounded(MAX_HEADER_BYTES).await? {
                None => return Ok(()),
                Some(BoundedLine::Bytes(line)) if line.is_empty() => return Ok(()),
                Some(_) => {}
            }
        }
    }

    /// Skips the broken header block and reports the desync.
    async fn desync(&mut self, reason: &str) -> TransportError {
        self.framing = Framing::Lines;
        match self.skip_header_block().await {
            Ok(()) => TransportError::Desync(reason.to_string()),
            Err(err) => err,
        }
    }

    /// Reads the rest of a header block and its body.
    async fn read_body(&mut self, length: usize) -> Result<Vec<u8>, TransportError> {
        loop {
            match self.read_line_bounded(MAX_HEADER_BYTES).await? {
                None => return Err(TransportError::Closed),
                Some(BoundedLine::TooLong(_)) => return Err(self.desync("header line too long").await),
                Some(BoundedLine::Bytes(line)) if line.is_empty() => break,
                Some(BoundedLine::Bytes(_)) => {}
            }
        }
        self.framing = Framing::ContentLength;
        if length > self.max_body_bytes {
            let mut body = (&mut self.reader).take(u64::try_from(length).unwrap_or(u64::MAX));
            tokio::io::copy(&mut body, &mut tokio::io::sink()).await.map_err(read_error)?;
            return Err(TransportError::PayloadTooLarge {
                limit: self.max_body_bytes,
                actual: length,
            });
        }
        let mut body = vec![0_u8; length];
        self.reader.read_exact(&mut body).await.map_err(read_error)?;
        Ok(body)
    }
}

#[async_trait]
impl<R, W> Transport for PipeTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn kind(&self) -> TransportKind {
        TransportKind::Pipe
    }

    async fn receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            let line = match self.read_line_bounded(self.max_body_bytes).await? {
                None => return Ok(None),
                Some(BoundedLine::TooLong(actual)) => {
                    self.framing = Framing::Lines;
                    return Err(TransportError::PayloadTooLarge {
                        limit: self.max_body_bytes,
                        actual,
                    });
                }
                Some(BoundedLine::Bytes(line)) => line,
            };
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match classify_line(&line) {
                LineKind::ContentLength(length) => return self.read_body(length).await.map(Some),
                LineKind::BadContentLength => {
                    return Err(self.desync("invalid content length").await);
                }
                LineKind::Other => {}
            }
            self.framing = Framing::Lines;
            return Ok(Some(line));
        }
    }

    async fn reply(&mut self, response: &JsonRpcResponse) -> Result<(), TransportError> {
        let body = response.to_bytes();
        match self.framing {
            Framing::ContentLength => {
                let header = format!("Content-Length: {}\r\n\r\n", body.len());
                self.writer.write_all(header.as_bytes()).await.map_err(write_error)?;
                self.writer.write_all(&body).await.map_err(write_error)?;
            }
            Framing::Lines => {
                self.writer.write_all(&body).await.map_err(write_error)?;
                self.writer.write_all(b"\n").await.map_err(write_error)?;
            }
        }
        self.writer.flush().await.map_err(write_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.writer.flush().await.map_err(write_error)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Classifies the first line of a frame.
fn classify_line(line: &[u8]) -> LineKind {
    let Some((name, value)) = std::str::from_utf8(line).ok().and_then(|text| text.split_once(':')) else {
        return LineKind::Other;
    };
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return LineKind::Other;
    }
    value.trim().parse().map_or(LineKind::BadContentLength, LineKind::ContentLength)
}

/// Maps a read failure.
fn read_error(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => TransportError::Closed,
        _ => TransportError::Io(err.to_string()),
    }
}

/// Maps a write failure.
fn write_error(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => TransportError::Closed,
        _ => TransportError::Io(err.to_string()),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions."
    )]

    use proptest::prelude::*;
    use serde_json::json;

    use super::Framing;
    use super::PipeTransport;
    use crate::protocol::JsonRpcResponse;
    use crate::transport::Transport;
    use crate::transport::TransportError;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut out = format!("Content-Length: {}\r\n\r\n", payload.len()).into_bytes();
        out.extend_from_slice(payload);
        out
    }

    #[tokio::test]
    async fn reads_content_length_then_line_frames() {
        let mut input = framed(br#"{"a":1}"#);
        input.extend_from_slice(b"\n{\"b\":2}\n");
        let mut pipe = PipeTransport::new(input.as_slice(), Vec::new(), 1024);

        assert_eq!(pipe.receive().await.unwrap().unwrap(), br#"{"a":1}"#);
        assert_eq!(pipe.framing(), Framing::ContentLength);
        assert_eq!(pipe.receive().await.unwrap().unwrap(), br#"{"b":2}"#);
        assert_eq!(pipe.framing(), Framing::Lines);
        assert!(pipe.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn payload_at_limit_is_accepted() {
        let payload = br#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;
        let input = framed(payload);
        let mut pipe = PipeTransport::new(input.as_slice(), Vec::new(), payload.len());
        assert_eq!(pipe.receive().await.unwrap().unwrap(), payload);
    }

    #[tokio::test]
    async fn oversized_body_is_drained_and_next_frame_survives() {
        let big = vec![b'x'; 64];
        let mut input = framed(&big);
        input.extend_from_slice(&framed(br#"{"ok":true}"#));
        let mut pipe = PipeTransport::new(input.as_slice(), Vec::new(), 32);

        let err = pipe.receive().await.unwrap_err();
        assert_eq!(
            err,
            TransportError::PayloadTooLarge {
                limit: 32,
                actual: 64
            }
        );
        assert!(err.is_recoverable());
        assert_eq!(pipe.receive().await.unwrap().unwrap(), br#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn oversized_line_is_rejected() {
        let mut input = vec![b'y'; 100];
        input.extend_from_slice(b"\n{}\n");
        let mut pipe = PipeTransport::new(input.as_slice(), Vec::new(), 16);
        assert!(matches!(pipe.receive().await, Err(TransportError::PayloadTooLarge { .. })));
        assert_eq!(pipe.receive().await.unwrap().unwrap(), b"{}");
    }

    #[tokio::test]
    async fn bad_content_length_skips_the_header_block() {
        let input = b"Content-Length: lots\r\nX-Trace: 1\r\n\r\n{\"id\":7}\n".to_vec();
        let mut pipe = PipeTransport::new(input.as_slice(), Vec::new(), 64);
        let err = pipe.receive().await.unwrap_err();
        assert!(matches!(err, TransportError::Desync(_)));
        assert!(err.is_recoverable());
        assert_eq!(pipe.framing(), Framing::Lines);
        assert_eq!(pipe.receive().await.unwrap().unwrap(), br#"{"id":7}"#);
    }

    #[tokio::test]
    async fn overlong_header_line_skips_the_header_block() {
        let mut input = b"Content-Length: 2\r\nX-Pad: ".to_vec();
        input.extend_from_slice(&[b'p'; 2048]);
        input.extend_from_slice(b"\r\n\r\n{\"id\":8}\n");
        let mut pipe = PipeTransport::new(input.as_slice(), Vec::new(), 64);
        let err = pipe.receive().await.unwrap_err();
        assert_eq!(err, TransportError::Desync("header line too long".to_string()));
        assert_eq!(pipe.receive().await.unwrap().unwrap(), br#"{"id":8}"#);
    }

    #[tokio::test]
    async fn truncated_header_block_is_closed() {
        let input = b"Content-Length: 2\r\n".to_vec();
        let mut pipe = PipeTransport::new(input.as_slice(), Vec::new(), 64);
        let err = pipe.receive().await.unwrap_err();
        assert_eq!(err, TransportError::Closed);
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn reply_matches_request_framing() {
        let input = b"{}\n".to_vec();
        let mut pipe = PipeTransport::new(input.as_slice(), Vec::new(), 16);
        pipe.receive().await.unwrap();
        pipe.reply(&JsonRpcResponse::success(json!(1), json!({}))).await.unwrap();
        let (_, written) = pipe.into_inner();
        assert_eq!(written, b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");
    }

    proptest! {
        #[test]
        fn content_length_frames_round_trip(payloads in prop::collection::vec(
            prop::collection::vec(b'a'..=b'z', 0..512), 1..6)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let input: Vec<u8> = payloads.iter().flat_map(|payload| framed(payload)).collect();
            runtime.block_on(async {
                let mut pipe = PipeTransport::new(input.as_slice(), Vec::new(), 512);
                for payload in &payloads {
                    let frame = pipe.receive().await.unwrap().unwrap();
                    prop_assert_eq!(&frame, payload);
                }
                prop_assert!(pipe.receive().await.unwrap().is_none());
                Ok(())
            })?;
        }
    }
}
