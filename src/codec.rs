//! Wire framing for the message channel.
//!
//! The protocol frames each JSON message as `Content-Length: N\r\n\r\n{json}`
//! over the subprocess's stdin/stdout. [`FrameReader`] and [`FrameWriter`]
//! handle one direction each.

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Frames above this size are rejected rather than buffered.
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Reads framed JSON messages from the server's output stream.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next frame. `Ok(None)` means the stream ended cleanly at a
    /// frame boundary; EOF anywhere inside a frame is an error.
    pub async fn read_frame(&mut self) -> Result<Option<serde_json::Value>> {
        let Some(content_length) = self.read_content_length().await? else {
            return Ok(None);
        };
        if content_length > MAX_FRAME_BYTES {
            bail!("Content-Length {content_length} exceeds maximum {MAX_FRAME_BYTES}");
        }

        let mut body = vec![0u8; content_length];
        self.reader
            .read_exact(&mut body)
            .await
            .context("reading frame body")?;
        let frame = serde_json::from_slice(&body).context("parsing frame body as JSON")?;
        Ok(Some(frame))
    }

    /// Consume header lines up to the blank separator and return the
    /// `Content-Length` value, or `None` on EOF before any header byte.
    async fn read_content_length(&mut self) -> Result<Option<usize>> {
        let mut content_length = None;
        let mut line = String::new();
        let mut mid_frame = false;

        loop {
            line.clear();
            let n = self
                .reader
                .read_line(&mut line)
                .await
                .context("reading header line")?;
            if n == 0 {
                if mid_frame {
                    bail!("unexpected EOF inside frame headers");
                }
                return Ok(None);
            }
            mid_frame = true;

            let header = line.trim();
            if header.is_empty() {
                break;
            }
            // Header names are matched case-insensitively; anything other
            // than Content-Length (e.g. Content-Type) is skipped.
            if let Some((name, value)) = header.split_once(':')
                && name.eq_ignore_ascii_case("Content-Length")
            {
                content_length = Some(
                    value
                        .trim()
                        .parse::<usize>()
                        .context("invalid Content-Length value")?,
                );
            }
        }

        match content_length {
            Some(len) => Ok(Some(len)),
            None => bail!("frame headers missing Content-Length"),
        }
    }
}

/// Writes framed JSON messages to the server's input stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Recover the underlying writer, e.g. to shut the stream down.
    pub fn into_inner(self) -> W {
        self.writer
    }

    pub async fn write_frame(&mut self, frame: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec(frame).context("serializing frame")?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.writer
            .write_all(header.as_bytes())
            .await
            .context("writing frame header")?;
        self.writer
            .write_all(&body)
            .await
            .context("writing frame body")?;
        self.writer.flush().await.context("flushing frame")?;
        Ok(())
    }
}
