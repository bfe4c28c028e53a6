//! JSON-RPC framing codec for LSP communication.
//!
//! LSP uses `Content-Length: N\r\n\r\n{json}` framing over stdin/stdout.
//! This module provides [`FrameReader`] and [`FrameWriter`] for async
//! reading and writing of framed JSON-RPC messages.
//!
//! A single corrupt frame must not wedge the stream: header blocks without
//! a usable `Content-Length` and bodies that fail JSON parsing are consumed
//! and skipped, and the reader moves on to the next frame.

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum frame size (4 MiB) to prevent unbounded memory allocation.
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

enum HeaderBlock {
    /// Clean EOF before any header bytes.
    Eof,
    Length(usize),
    /// Complete header block with no parseable `Content-Length`.
    Unusable,
}

/// Reads JSON-RPC frames from an async reader.
///
/// Parses `Content-Length` headers and reads exactly that many bytes,
/// then deserializes the body as JSON.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next JSON-RPC frame.
    ///
    /// Returns `Ok(None)` on EOF (clean shutdown).
    /// Corrupt frames are skipped; `Err` is reserved for conditions that
    /// leave the stream unrecoverable (EOF mid-frame, oversized frames).
    pub async fn read_frame(&mut self) -> Result<Option<serde_json::Value>> {
        loop {
            let content_length = match self.read_headers().await? {
                HeaderBlock::Eof => return Ok(None),
                HeaderBlock::Length(len) => len,
                HeaderBlock::Unusable => {
                    tracing::warn!("skipping frame with no parseable Content-Length");
                    continue;
                }
            };

            if content_length > MAX_FRAME_BYTES {
                bail!("Content-Length {content_length} exceeds maximum {MAX_FRAME_BYTES}");
            }

            let mut body = vec![0u8; content_length];
            self.reader
                .read_exact(&mut body)
                .await
                .context("reading frame body")?;

            // Body bytes are consumed either way; a parse failure leaves the
            // stream aligned on the next header block.
            match serde_json::from_slice(&body) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => {
                    tracing::warn!("skipping frame with invalid JSON body: {e}");
                }
            }
        }
    }

    /// Parse headers until the empty line separator.
    async fn read_headers(&mut self) -> Result<HeaderBlock> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();
        let mut saw_any_header_bytes = false;

        loop {
            line.clear();
            let bytes_read = self
                .reader
                .read_line(&mut line)
                .await
                .context("reading header line")?;

            if bytes_read == 0 {
                // EOF — only valid if we haven't started reading headers at all.
                if !saw_any_header_bytes {
                    return Ok(HeaderBlock::Eof);
                }
                bail!("unexpected EOF while reading headers");
            }
            saw_any_header_bytes = true;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                // Empty line = end of headers
                break;
            }

            // LSP spec uses "Content-Length" but parse case-insensitively for robustness.
            if let Some(colon_pos) = trimmed.find(':') {
                let key = &trimmed[..colon_pos];
                if key.eq_ignore_ascii_case("Content-Length") {
                    content_length = trimmed[colon_pos + 1..].trim().parse().ok();
                }
            }
            // Ignore other headers (e.g. Content-Type)
        }

        match content_length {
            Some(len) => Ok(HeaderBlock::Length(len)),
            None => Ok(HeaderBlock::Unusable),
        }
    }
}

/// Writes JSON-RPC frames to an async writer.
///
/// Serializes JSON and prepends the `Content-Length` header. The declared
/// length is the exact UTF-8 byte count of the body; no trailing data.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a JSON-RPC frame with `Content-Length` header.
    pub async fn write_frame(&mut self, msg: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_string(msg).context("serializing JSON-RPC frame")?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.writer
            .write_all(header.as_bytes())
            .await
            .context("writing frame header")?;
        self.writer
            .write_all(body.as_bytes())
            .await
            .context("writing frame body")?;
        self.writer.flush().await.context("flushing frame")?;

        Ok(())
    }
}
