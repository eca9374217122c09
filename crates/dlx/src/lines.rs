// ai
//! 🫁 Gzip Line Reader: compressed bytes in, one text line at a time out.
//!
//! INT. LAMBDA SANDBOX, 512MB OF RAM, NIGHT. The export is 9GB uncompressed.
//! Somebody suggests "just read it all into a Vec". The room goes quiet.
//!
//! This reader never holds more than one read buffer of compressed bytes plus
//! whatever decompressed tail has not yet met a newline. It pulls a chunk from the
//! async source, pushes it through a write-side `flate2` decoder whose sink is our
//! own `Vec<u8>`, then hands out complete lines with `memchr` doing the newline hunting.
//!
//! 🧠 Knowledge graph:
//! - Ownership chain: `AsyncRead` (S3 body / file / bytes) → decoder → line buffer. One value, one drop.
//! - Multi-member gzip is fine (`MultiGzDecoder`), because some exporters concatenate.
//! - `\r\n` endings are tolerated; the `\r` is trimmed.
//! - A final line without a trailing newline is still a line.

use std::io::Write;

use anyhow::{Context, Result};
use flate2::write::MultiGzDecoder;
use tokio::io::{AsyncRead, AsyncReadExt};

// 📦 64KiB per read: big enough to keep S3 busy, small enough to not care about.
const READ_CHUNK_BYTES: usize = 64 * 1024;

/// 🔤 A line whose bytes are not UTF-8. The stream itself is fine; the content is not.
///
/// Raised through `anyhow` like every other reader error, so the driver downcasts
/// to tell a bad line apart from a bad stream.
#[derive(Debug)]
pub(crate) struct InvalidUtf8Line {
    pub(crate) line: u64,
    source: std::str::Utf8Error,
}

impl std::fmt::Display for InvalidUtf8Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "not valid UTF-8 ({})", self.source)
    }
}

impl std::error::Error for InvalidUtf8Line {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

pub(crate) struct GzipLineReader<R> {
    reader: R,
    decoder: MultiGzDecoder<Vec<u8>>,
    read_buf: Box<[u8]>,
    // -- decompressed bytes before `consumed` were already handed out as lines
    consumed: usize,
    // -- no newline exists in decoder output between `consumed` and `scan_from`
    scan_from: usize,
    finished: bool,
    compressed_bytes_read: u64,
    line_number: u64,
}

impl<R> std::fmt::Debug for GzipLineReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipLineReader")
            .field("compressed_bytes_read", &self.compressed_bytes_read)
            .field("line_number", &self.line_number)
            .field("finished", &self.finished)
            .finish()
    }
}

impl<R: AsyncRead + Unpin> GzipLineReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: MultiGzDecoder::new(Vec::with_capacity(READ_CHUNK_BYTES * 4)),
            read_buf: vec![0u8; READ_CHUNK_BYTES].into_boxed_slice(),
            consumed: 0,
            scan_from: 0,
            finished: false,
            compressed_bytes_read: 0,
            line_number: 0,
        }
    }

    /// 📏 Compressed bytes pulled from the source so far.
    pub(crate) fn compressed_bytes_read(&self) -> u64 {
        self.compressed_bytes_read
    }

    /// 🔢 1-based number of the line most recently returned (blank lines count).
    pub(crate) fn line_number(&self) -> u64 {
        self.line_number
    }

    /// 📄 Next decompressed line, without its terminator. `None` at end of stream.
    pub(crate) async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            let decompressed = self.decoder.get_ref();
            if let Some(offset) = memchr::memchr(b'\n', &decompressed[self.scan_from..]) {
                let end = self.scan_from + offset;
                let line = self.take_line(end)?;
                self.consumed = end + 1;
                self.scan_from = self.consumed;
                return Ok(Some(line));
            }
            self.scan_from = decompressed.len();

            if self.finished {
                if self.consumed < self.decoder.get_ref().len() {
                    let end = self.decoder.get_ref().len();
                    let line = self.take_line(end)?;
                    self.consumed = end;
                    self.scan_from = end;
                    return Ok(Some(line));
                }
                return Ok(None);
            }

            self.refill().await?;
        }
    }

    fn take_line(&mut self, end: usize) -> Result<String> {
        self.line_number += 1;
        let raw = &self.decoder.get_ref()[self.consumed..end];
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        // -- the export promised text. if it lied, say which line lied.
        match std::str::from_utf8(raw) {
            Ok(text) => Ok(text.to_owned()),
            Err(source) => Err(InvalidUtf8Line {
                line: self.line_number,
                source,
            }
            .into()),
        }
    }

    async fn refill(&mut self) -> Result<()> {
        // 🧹 compact: drop lines already handed out so the buffer only holds the unfinished tail
        if self.consumed > 0 {
            self.decoder.get_mut().drain(..self.consumed);
            self.scan_from -= self.consumed;
            self.consumed = 0;
        }

        let bytes_read = self
            .reader
            .read(&mut self.read_buf)
            .await
            .context("💀 reading the compressed stream failed mid-flight")?;

        if bytes_read == 0 {
            self.decoder
                .try_finish()
                .context("💀 the gzip stream ended before the gzip stream said it would. Truncated upload?")?;
            self.finished = true;
            return Ok(());
        }

        self.compressed_bytes_read += bytes_read as u64;
        self.decoder
            .write_all(&self.read_buf[..bytes_read])
            .context("💀 gzip decoding failed. Either not gzip, or gzip having a bad day")?;
        Ok(())
    }
}
