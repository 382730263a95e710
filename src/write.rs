/*!
This module provides two `std::io::Write` implementations:

* [`write::FrameEncoder`](struct.FrameEncoder.html)
  wraps another `std::io::Write` implementation and compresses data into the
  Snappy frame format.
* [`write::LegacyEncoder`](struct.LegacyEncoder.html)
  does the same for the legacy `snappy\0` stream format.

Typically, `write::FrameEncoder` is the version that you'll want: the legacy
format exists to interoperate with systems that still speak it.

Both writers buffer caller bytes up to one block, so there's no need to wrap
the given writer in a `std::io::BufWriter`. Each full block is compressed
and emitted as one chunk; a block whose compressed form isn't small enough
is stored raw instead. Explicit [`close`](struct.FrameEncoder.html#method.close)
emits the final partial block and returns the working buffers to the pool;
dropping a writer closes it with errors ignored.
*/

use std::fmt;
use std::io::{self, Write};
use std::mem;
use std::sync::Arc;

use crate::compress::{max_compress_len, Encoder};
use crate::crc32c::crc32c_masked;
use crate::error::{Error, IntoInnerError};
use crate::frame::{
    encode_block, write_chunk_header, write_legacy_header, ChunkType,
    CHUNK_HEADER_AND_CRC_SIZE, DEFAULT_MIN_COMPRESS_RATIO,
    LEGACY_CHUNK_HEADER_SIZE, LEGACY_FLAG_COMPRESSED, LEGACY_FLAG_RAW,
    LEGACY_MIN_COMPRESS_RATIO, LEGACY_STREAM_IDENTIFIER, STREAM_IDENTIFIER,
};
use crate::pool::{default_pool, BufferPool, BufferRole};
use crate::{LEGACY_BLOCK_SIZE, MAX_BLOCK_SIZE};

/// Which wire format a `BlockWriter` emits. The buffering state machine is
/// identical for both; only the header shape differs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Format {
    Framed,
    Legacy,
}

/// A writer for compressing a Snappy stream.
///
/// This `FrameEncoder` wraps any other writer that implements `io::Write`.
/// Bytes written to this writer are compressed using the [Snappy frame
/// format](https://github.com/google/snappy/blob/master/framing_format.txt)
/// (file extension `sz`, MIME type `application/x-snappy-framed`).
///
/// The stream identifier is written when the encoder is constructed, so an
/// encoder that is closed without ever being written to still produces a
/// well formed (empty) stream.
pub struct FrameEncoder<W: io::Write> {
    inner: BlockWriter<W>,
}

impl<W: io::Write> FrameEncoder<W> {
    /// Create a new writer for streaming Snappy compression, with the
    /// default block size (65,536 bytes) and minimum compression ratio
    /// (0.85). The stream identifier is written before this returns.
    pub fn new(wtr: W) -> io::Result<FrameEncoder<W>> {
        FrameEncoder::with_options(wtr, MAX_BLOCK_SIZE, DEFAULT_MIN_COMPRESS_RATIO)
    }

    /// Create a new writer with an explicit block size and minimum
    /// compression ratio.
    ///
    /// `block_size` must be in `(0, 65536]` and `min_compress_ratio` in
    /// `(0, 1]`; anything else fails with `Error::InvalidArgument`. A block
    /// is emitted compressed only when its compressed length is at most
    /// `min_compress_ratio` times its raw length, so a ratio of `1.0` means
    /// "whenever compression does not expand".
    pub fn with_options(
        wtr: W,
        block_size: usize,
        min_compress_ratio: f64,
    ) -> io::Result<FrameEncoder<W>> {
        FrameEncoder::with_pool(wtr, block_size, min_compress_ratio, default_pool())
    }

    /// Create a new writer drawing its working buffers from the given pool
    /// instead of the process default.
    pub fn with_pool(
        wtr: W,
        block_size: usize,
        min_compress_ratio: f64,
        pool: Arc<dyn BufferPool>,
    ) -> io::Result<FrameEncoder<W>> {
        if block_size == 0 || block_size > MAX_BLOCK_SIZE {
            return Err(Error::InvalidArgument {
                message: "block size must be in (0, 65536]",
            }
            .into());
        }
        let inner = BlockWriter::new(
            wtr,
            Format::Framed,
            block_size,
            min_compress_ratio,
            pool,
        )?;
        Ok(FrameEncoder { inner })
    }

    /// Emit any buffered block, flush the underlying writer and return the
    /// working buffers to the pool.
    ///
    /// Closing an already closed encoder is a no-op; writes after close fail
    /// with an error.
    pub fn close(&mut self) -> io::Result<()> {
        self.inner.close()
    }

    /// Returns the underlying stream, consuming and closing this encoder.
    ///
    /// If closing the encoder caused an error, then an `IntoInnerError` is
    /// returned, which contains both the encoder and the original error.
    pub fn into_inner(
        mut self,
    ) -> Result<W, IntoInnerError<FrameEncoder<W>>> {
        match self.inner.close() {
            Ok(()) => Ok(self.inner.take_writer()),
            Err(err) => Err(IntoInnerError::new(self, err)),
        }
    }

    /// Gets a reference to the underlying writer in this encoder.
    pub fn get_ref(&self) -> &W {
        self.inner.get_ref()
    }

    /// Gets a mutable reference to the underlying writer in this encoder.
    ///
    /// Note that mutating the output/input state of the stream may corrupt
    /// this encoder, so care must be taken when using this method.
    pub fn get_mut(&mut self) -> &mut W {
        self.inner.get_mut()
    }
}

impl<W: io::Write> io::Write for FrameEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: fmt::Debug + io::Write> fmt::Debug for FrameEncoder<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameEncoder").field("inner", &self.inner).finish()
    }
}

/// A writer for compressing a legacy format Snappy stream.
///
/// This `LegacyEncoder` wraps any other writer that implements `io::Write`
/// and emits the `snappy\0` stream format: a seven byte stream header, then
/// chunks of at most 32,768 uncompressed bytes whose headers carry a big
/// endian length and the checksum. A block is compressed only when that
/// saves at least an eighth of its size.
pub struct LegacyEncoder<W: io::Write> {
    inner: BlockWriter<W>,
}

impl<W: io::Write> LegacyEncoder<W> {
    /// Create a new writer for streaming legacy Snappy compression. The
    /// stream header is written before this returns.
    pub fn new(wtr: W) -> io::Result<LegacyEncoder<W>> {
        LegacyEncoder::with_pool(wtr, default_pool())
    }

    /// Create a new writer drawing its working buffers from the given pool
    /// instead of the process default.
    pub fn with_pool(
        wtr: W,
        pool: Arc<dyn BufferPool>,
    ) -> io::Result<LegacyEncoder<W>> {
        let inner = BlockWriter::new(
            wtr,
            Format::Legacy,
            LEGACY_BLOCK_SIZE,
            LEGACY_MIN_COMPRESS_RATIO,
            pool,
        )?;
        Ok(LegacyEncoder { inner })
    }

    /// Emit any buffered block, flush the underlying writer and return the
    /// working buffers to the pool.
    ///
    /// Closing an already closed encoder is a no-op; writes after close fail
    /// with an error.
    pub fn close(&mut self) -> io::Result<()> {
        self.inner.close()
    }

    /// Returns the underlying stream, consuming and closing this encoder.
    ///
    /// If closing the encoder caused an error, then an `IntoInnerError` is
    /// returned, which contains both the encoder and the original error.
    pub fn into_inner(
        mut self,
    ) -> Result<W, IntoInnerError<LegacyEncoder<W>>> {
        match self.inner.close() {
            Ok(()) => Ok(self.inner.take_writer()),
            Err(err) => Err(IntoInnerError::new(self, err)),
        }
    }

    /// Gets a reference to the underlying writer in this encoder.
    pub fn get_ref(&self) -> &W {
        self.inner.get_ref()
    }

    /// Gets a mutable reference to the underlying writer in this encoder.
    ///
    /// Note that mutating the output/input state of the stream may corrupt
    /// this encoder, so care must be taken when using this method.
    pub fn get_mut(&mut self) -> &mut W {
        self.inner.get_mut()
    }
}

impl<W: io::Write> io::Write for LegacyEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: fmt::Debug + io::Write> fmt::Debug for LegacyEncoder<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyEncoder").field("inner", &self.inner).finish()
    }
}

/// The buffering state machine both encoders share.
struct BlockWriter<W: io::Write> {
    /// Everything `emit` needs, split out for borrowck reasons (happily
    /// paid): `write` reads from `src` while `inner` compresses and writes.
    ///
    /// It's an `Option` so `take_writer` can move the underlying writer out
    /// even though the encoders impl `Drop`.
    inner: Option<Inner<W>>,
    /// Our buffer of uncompressed bytes. This isn't part of `inner` because
    /// the emit path needs to accept either this buffer or the caller's
    /// bytes directly (when a caller hands us one or more full blocks, the
    /// copy into `src` is skipped).
    src: Vec<u8>,
    /// The frame boundary: `src` never holds more than this many bytes.
    block_size: usize,
    closed: bool,
}

struct Inner<W> {
    /// The underlying writer.
    w: W,
    /// The reusable compression context doing the block based compression.
    enc: Encoder,
    /// The compressed bytes buffer. Bytes are compressed from `src` to
    /// `dst` before being written to `w`.
    dst: Vec<u8>,
    format: Format,
    min_compress_ratio: f64,
    /// Space for assembling a chunk header before writing it out. Sized for
    /// the larger (framed) header; the legacy header uses the first seven
    /// bytes.
    chunk_header: [u8; CHUNK_HEADER_AND_CRC_SIZE],
    pool: Arc<dyn BufferPool>,
}

impl<W: io::Write> BlockWriter<W> {
    fn new(
        mut wtr: W,
        format: Format,
        block_size: usize,
        min_compress_ratio: f64,
        pool: Arc<dyn BufferPool>,
    ) -> io::Result<BlockWriter<W>> {
        if !(min_compress_ratio > 0.0 && min_compress_ratio <= 1.0) {
            return Err(Error::InvalidArgument {
                message: "min compression ratio must be in (0, 1]",
            }
            .into());
        }
        let identifier = match format {
            Format::Framed => STREAM_IDENTIFIER,
            Format::Legacy => LEGACY_STREAM_IDENTIFIER,
        };
        wtr.write_all(identifier)?;
        let mut src = pool.acquire(BufferRole::Output, block_size);
        src.clear();
        let dst = pool.acquire(BufferRole::Encode, max_compress_len(block_size));
        Ok(BlockWriter {
            inner: Some(Inner {
                w: wtr,
                enc: Encoder::new(),
                dst,
                format,
                min_compress_ratio,
                chunk_header: [0; CHUNK_HEADER_AND_CRC_SIZE],
                pool,
            }),
            src,
            block_size,
            closed: false,
        })
    }

    fn write(&mut self, mut buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(Error::Closed.into());
        }
        let mut total = 0;
        // If there isn't enough room to add buf to src, then add only a
        // piece of it, flush it and mush on.
        loop {
            let free = self.block_size - self.src.len();
            // n is the number of bytes extracted from buf.
            let n = if buf.len() <= free {
                break;
            } else if self.src.is_empty() {
                // If buf is bigger than our entire buffer then avoid
                // the indirection and write the buffer directly.
                let block_size = self.block_size;
                self.inner.as_mut().unwrap().emit(buf, block_size)?
            } else {
                self.src.extend_from_slice(&buf[0..free]);
                self.flush_block()?;
                free
            };
            buf = &buf[n..];
            total += n;
        }
        // We're only here if buf.len() will fit within the available space
        // of self.src.
        debug_assert!(buf.len() <= self.block_size - self.src.len());
        self.src.extend_from_slice(buf);
        total += buf.len();
        Ok(total)
    }

    /// Emits the buffered block, if any.
    fn flush_block(&mut self) -> io::Result<()> {
        if self.src.is_empty() {
            return Ok(());
        }
        let block_size = self.block_size;
        self.inner.as_mut().unwrap().emit(&self.src, block_size)?;
        self.src.truncate(0);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush_block()?;
        self.inner.as_mut().unwrap().w.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.flush();
        let inner = self.inner.as_mut().unwrap();
        inner.pool.release(
            BufferRole::Output,
            mem::replace(&mut self.src, Vec::new()),
        );
        inner.pool.release(
            BufferRole::Encode,
            mem::replace(&mut inner.dst, Vec::new()),
        );
        self.closed = true;
        result
    }

    fn take_writer(&mut self) -> W {
        self.inner.take().unwrap().w
    }

    fn get_ref(&self) -> &W {
        &self.inner.as_ref().unwrap().w
    }

    fn get_mut(&mut self) -> &mut W {
        &mut self.inner.as_mut().unwrap().w
    }
}

impl<W: io::Write> Drop for BlockWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() && !self.closed {
            // Ignore errors because we can't conceivably return an error
            // and panicking in a dtor is bad juju.
            let _ = self.close();
        }
    }
}

impl<W> Inner<W>
where
    W: io::Write,
{
    /// Compresses and writes out every full block in `buf`, choosing the
    /// compressed or raw representation per block.
    fn emit(&mut self, mut buf: &[u8], block_size: usize) -> io::Result<usize> {
        let mut total = 0;
        while !buf.is_empty() {
            // Advance buf and get our block.
            let mut src = buf;
            if src.len() > block_size {
                src = &src[0..block_size];
            }
            buf = &buf[src.len()..];

            let checksum = crc32c_masked(src);
            let (payload, compressed) = encode_block(
                &mut self.enc,
                src,
                &mut self.dst,
                self.min_compress_ratio,
            )?;
            let header = match self.format {
                Format::Framed => {
                    let ty = if compressed {
                        ChunkType::Compressed
                    } else {
                        ChunkType::Uncompressed
                    };
                    write_chunk_header(
                        &mut self.chunk_header,
                        ty,
                        payload.len(),
                        checksum,
                    );
                    &self.chunk_header[..]
                }
                Format::Legacy => {
                    let flag = if compressed {
                        LEGACY_FLAG_COMPRESSED
                    } else {
                        LEGACY_FLAG_RAW
                    };
                    write_legacy_header(
                        &mut self.chunk_header[..LEGACY_CHUNK_HEADER_SIZE],
                        flag,
                        payload.len(),
                        checksum,
                    );
                    &self.chunk_header[..LEGACY_CHUNK_HEADER_SIZE]
                }
            };
            self.w.write_all(header)?;
            self.w.write_all(payload)?;
            total += src.len();
        }
        Ok(total)
    }
}

impl<W: fmt::Debug + io::Write> fmt::Debug for BlockWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockWriter")
            .field("inner", &self.inner)
            .field("src", &"[...]")
            .field("block_size", &self.block_size)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<W: fmt::Debug> fmt::Debug for Inner<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inner")
            .field("w", &self.w)
            .field("enc", &self.enc)
            .field("dst", &"[...]")
            .field("format", &self.format)
            .field("min_compress_ratio", &self.min_compress_ratio)
            .field("chunk_header", &self.chunk_header)
            .finish()
    }
}
