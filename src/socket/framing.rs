//! Wire protocol codec for the evaluation service.
//!
//! Every message is one length-prefixed frame of UTF-8 text:
//!
//! ```text
//! [u64 BE length] [payload: length bytes of UTF-8]
//! ```
//!
//! Requests and responses use the same frame shape. A zero-length payload is
//! a valid frame; the server read loop treats it as end-of-input.

use std::collections::VecDeque;

use anyhow::{anyhow, bail, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::{LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE, READ_BUFFER_SIZE};

/// Encode a text message into a wire-format byte vector.
///
/// Returns `[u64 BE length][UTF-8 bytes]`.
pub fn encode(text: &str) -> Vec<u8> {
    let payload = text.as_bytes();
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Write one framed message and flush the writer.
///
/// # Errors
///
/// Returns an error if the peer is gone or the write fails.
pub async fn write_message<W>(writer: &mut W, text: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode(text)).await?;
    writer.flush().await?;
    Ok(())
}

/// Incremental frame decoder that handles partial reads.
///
/// Feed bytes via [`FrameDecoder::feed`] and extract complete messages.
/// Handles TCP-style byte stream reassembly.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create a new decoder with empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the decoder and extract all complete messages.
    ///
    /// Incomplete data is buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame exceeds [`MAX_FRAME_SIZE`] or its payload
    /// is not valid UTF-8.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.buf.extend_from_slice(bytes);
        let mut messages = Vec::new();

        while self.buf.len() >= LENGTH_PREFIX_SIZE {
            let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
            prefix.copy_from_slice(&self.buf[..LENGTH_PREFIX_SIZE]);
            let length = u64::from_be_bytes(prefix);

            if length > MAX_FRAME_SIZE {
                bail!("Frame too large: {length} bytes (max {MAX_FRAME_SIZE})");
            }

            let total = LENGTH_PREFIX_SIZE + length as usize;
            if self.buf.len() < total {
                break;
            }

            let text = std::str::from_utf8(&self.buf[LENGTH_PREFIX_SIZE..total])
                .map_err(|e| anyhow!("Frame payload is not valid UTF-8: {e}"))?
                .to_owned();
            messages.push(text);

            self.buf.drain(..total);
        }

        Ok(messages)
    }

    /// Returns true if the decoder has buffered partial data.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}

/// Reads framed messages from an async byte stream.
///
/// Wraps a [`FrameDecoder`] and queues messages that arrived in the same
/// read, so callers always receive one message at a time.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
    pending: VecDeque<String>,
    read_buf: Vec<u8>,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            read_buf: vec![0u8; READ_BUFFER_SIZE],
        }
    }

    /// Read the next complete message.
    ///
    /// Returns `Ok(None)` when the stream closes. A stream that closes in
    /// the middle of a frame is also reported as `Ok(None)`; the partial
    /// frame is discarded.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or a malformed frame.
    pub async fn next_message(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Ok(Some(message));
            }

            let n = self.reader.read(&mut self.read_buf).await?;
            if n == 0 {
                if self.decoder.has_partial() {
                    log::debug!("Stream closed with a partial frame buffered");
                }
                return Ok(None);
            }

            self.pending.extend(self.decoder.feed(&self.read_buf[..n])?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(text: &str) -> String {
        let mut decoder = FrameDecoder::new();
        let mut messages = decoder.feed(&encode(text)).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(!decoder.has_partial());
        messages.remove(0)
    }

    #[test]
    fn test_encode_layout() {
        let encoded = encode("abc");
        assert_eq!(&encoded[..8], &[0, 0, 0, 0, 0, 0, 0, 3]);
        assert_eq!(&encoded[8..], b"abc");
    }

    #[test]
    fn test_encode_empty_is_prefix_only() {
        assert_eq!(encode(""), vec![0u8; 8]);
    }

    #[test]
    fn test_round_trip_text() {
        assert_eq!(round_trip("return 1 + 1"), "return 1 + 1");
        assert_eq!(round_trip(""), "");
        assert_eq!(round_trip("héllo wörld ✓ 日本語 🦀"), "héllo wörld ✓ 日本語 🦀");
        assert_eq!(round_trip("line one\nline two\n"), "line one\nline two\n");
    }

    #[test]
    fn test_length_counts_bytes_not_chars() {
        let encoded = encode("🦀");
        assert_eq!(u64::from_be_bytes(encoded[..8].try_into().unwrap()), 4);
    }

    #[test]
    fn test_multiple_frames_in_single_feed() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&encode("x = 1"));
        buf.extend_from_slice(&encode(""));
        buf.extend_from_slice(&encode("x"));

        let mut decoder = FrameDecoder::new();
        let messages = decoder.feed(&buf).unwrap();
        assert_eq!(messages, vec!["x = 1", "", "x"]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let encoded = encode("print('hi')");
        let mut decoder = FrameDecoder::new();
        for (i, byte) in encoded.iter().enumerate() {
            let messages = decoder.feed(&[*byte]).unwrap();
            if i < encoded.len() - 1 {
                assert!(messages.is_empty());
                assert!(decoder.has_partial());
            } else {
                assert_eq!(messages, vec!["print('hi')"]);
            }
        }
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let buf = (MAX_FRAME_SIZE + 1).to_be_bytes();
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&buf).is_err());
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut buf = 2u64.to_be_bytes().to_vec();
        buf.extend_from_slice(&[0xC3, 0x28]);
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&buf).is_err());
    }

    #[tokio::test]
    async fn test_reader_yields_messages_then_end_of_stream() {
        let mut bytes = encode("first");
        bytes.extend_from_slice(&encode("second"));
        let mut reader = FrameReader::new(bytes.as_slice());

        assert_eq!(reader.next_message().await.unwrap().as_deref(), Some("first"));
        assert_eq!(reader.next_message().await.unwrap().as_deref(), Some("second"));
        assert_eq!(reader.next_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reader_short_prefix_is_end_of_stream() {
        let bytes = [0u8, 0, 0];
        let mut reader = FrameReader::new(&bytes[..]);
        assert_eq!(reader.next_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reader_truncated_payload_is_end_of_stream() {
        let mut bytes = 10u64.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"short");
        let mut reader = FrameReader::new(bytes.as_slice());
        assert_eq!(reader.next_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_message_frames_text() {
        let mut out = Vec::new();
        write_message(&mut out, "ok").await.unwrap();
        assert_eq!(out, encode("ok"));
    }
}
