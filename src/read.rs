/*!
This module provides three `std::io::Read` implementations:

* [`read::FrameDecoder`](struct.FrameDecoder.html)
  wraps another `std::io::Read` implementation and decompresses data encoded
  using the Snappy frame format.
* [`read::LegacyDecoder`](struct.LegacyDecoder.html)
  does the same for the legacy `snappy\0` stream format.
* [`read::AnyDecoder`](struct.AnyDecoder.html)
  peeks at the stream, decides which of the two formats it carries and
  decompresses accordingly.

Each decoder validates its stream header when it is constructed, so a source
that is not a Snappy stream is rejected up front rather than on the first
read. These readers can potentially make many small reads from the
underlying stream depending on its format, therefore, passing in a buffered
reader may be beneficial.
*/

use std::cmp;
use std::fmt;
use std::io;
use std::mem;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian as LE};

use crate::crc32c::crc32c_masked;
use crate::decompress::{decompress_len, Decoder};
use crate::error::Error;
use crate::frame::{
    parse_legacy_header, ChunkType, CHUNK_HEADER_SIZE,
    LEGACY_CHUNK_HEADER_SIZE, LEGACY_FLAG_COMPRESSED, LEGACY_FLAG_RAW,
    LEGACY_STREAM_IDENTIFIER, STREAM_BODY, STREAM_IDENTIFIER,
};
use crate::pool::{default_pool, BufferPool, BufferRole};

/// A reader for decompressing a Snappy frame format stream.
///
/// This `FrameDecoder` wraps any other reader that implements
/// `std::io::Read`. Bytes read from this reader are decompressed using the
/// [Snappy frame format](https://github.com/google/snappy/blob/master/framing_format.txt)
/// (file extension `sz`, MIME type `application/x-snappy-framed`).
///
/// Construction reads and validates the ten byte stream identifier.
/// Repeated identifier chunks later in the stream are treated as
/// resynchronization markers and skipped; reserved skippable chunks are
/// consumed silently; reserved unskippable chunks fail the read. Checksum
/// verification recomputes the masked CRC32-C of every chunk's uncompressed
/// bytes and can be disabled at construction when raw throughput matters
/// more than integrity.
pub struct FrameDecoder<R: io::Read> {
    /// The underlying reader.
    r: R,
    /// A Snappy decoder that we reuse that does the actual block based
    /// decompression.
    dec: Decoder,
    /// The compressed bytes buffer, taken from the underlying reader and
    /// grown to the largest chunk seen so far.
    src: Vec<u8>,
    /// The decompressed bytes buffer. Bytes are decompressed from src to
    /// dst before being passed back to the caller.
    dst: Vec<u8>,
    /// Index into dst: starting point of bytes not yet given back to
    /// caller.
    dsts: usize,
    /// Index into dst: ending point of bytes not yet given back to caller.
    dste: usize,
    verify_checksums: bool,
    closed: bool,
    pool: Arc<dyn BufferPool>,
}

impl<R: io::Read> FrameDecoder<R> {
    /// Create a new reader for streaming Snappy decompression, with
    /// checksum verification enabled.
    ///
    /// The ten byte stream identifier is read and validated before this
    /// returns: a short read fails with an unexpected-eof error and a
    /// mismatch with an invalid-stream-header error.
    pub fn new(rdr: R) -> io::Result<FrameDecoder<R>> {
        FrameDecoder::with_options(rdr, true)
    }

    /// Create a new reader with explicit control over checksum
    /// verification.
    pub fn with_options(
        rdr: R,
        verify_checksums: bool,
    ) -> io::Result<FrameDecoder<R>> {
        FrameDecoder::with_pool(rdr, verify_checksums, default_pool())
    }

    /// Create a new reader drawing its working buffers from the given pool
    /// instead of the process default.
    pub fn with_pool(
        mut rdr: R,
        verify_checksums: bool,
        pool: Arc<dyn BufferPool>,
    ) -> io::Result<FrameDecoder<R>> {
        let mut header = [0; 10];
        read_exact_or_eof(&mut rdr, &mut header)?;
        if header != *STREAM_IDENTIFIER {
            return Err(Error::InvalidStreamHeader {
                bytes: header.to_vec(),
            }
            .into());
        }
        let src = pool.acquire(BufferRole::Input, 0);
        let dst = pool.acquire(BufferRole::Decode, 0);
        Ok(FrameDecoder {
            r: rdr,
            dec: Decoder::new(),
            src,
            dst,
            dsts: 0,
            dste: 0,
            verify_checksums,
            closed: false,
            pool,
        })
    }

    /// Returns the number of decompressed bytes from the current chunk that
    /// have not yet been delivered.
    pub fn available(&self) -> usize {
        self.dste - self.dsts
    }

    /// Returns the working buffers to the pool. Closing an already closed
    /// reader is a no-op; reads after close return end of stream.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.pool
            .release(BufferRole::Input, mem::replace(&mut self.src, Vec::new()));
        self.pool
            .release(BufferRole::Decode, mem::replace(&mut self.dst, Vec::new()));
        self.dsts = 0;
        self.dste = 0;
        self.closed = true;
    }

    /// Gets a reference to the underlying reader in this decoder.
    pub fn get_ref(&self) -> &R {
        &self.r
    }

    /// Gets a mutable reference to the underlying reader in this decoder.
    ///
    /// Note that mutation of the stream may result in surprising results if
    /// this decoder is continued to be used.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.r
    }

    /// Gets the underlying reader of this decoder.
    pub fn into_inner(self) -> R {
        self.r
    }

    fn grow_src(&mut self, len: usize) {
        if self.src.len() < len {
            self.src.resize(len, 0);
        }
    }

    fn grow_dst(&mut self, len: usize) {
        if self.dst.len() < len {
            self.dst.resize(len, 0);
        }
    }

    fn check_crc(&self, expected: u32, n: usize) -> io::Result<()> {
        if !self.verify_checksums {
            return Ok(());
        }
        let got = crc32c_masked(&self.dst[..n]);
        if expected != got {
            return Err(Error::CorruptChecksum { expected, got }.into());
        }
        Ok(())
    }
}

impl<R: io::Read> io::Read for FrameDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Ok(0);
        }
        macro_rules! fail {
            ($err:expr) => {
                return Err(io::Error::from($err))
            };
        }
        loop {
            if self.dsts < self.dste {
                let len = cmp::min(self.dste - self.dsts, buf.len());
                let dste = self.dsts + len;
                buf[0..len].copy_from_slice(&self.dst[self.dsts..dste]);
                self.dsts = dste;
                return Ok(len);
            }
            let mut header = [0; CHUNK_HEADER_SIZE];
            if !read_exact_eof(&mut self.r, &mut header)? {
                return Ok(0);
            }
            let len = LE::read_uint(&header[1..], 3) as usize;
            match ChunkType::from_u8(header[0]) {
                Err(flag) if 0x02 <= flag && flag <= 0x7F => {
                    // Reserved unskippable chunks; conformant decoders must
                    // refuse them.
                    fail!(Error::UnsupportedChunk { flag });
                }
                Err(_) => {
                    // Reserved skippable chunks, 0x80 through 0xFE.
                    self.grow_src(len);
                    read_exact_or_eof(&mut self.r, &mut self.src[0..len])?;
                }
                Ok(ChunkType::Stream) => {
                    // A mid-stream identifier is a resynchronization
                    // marker; validate it and carry on.
                    if len != STREAM_BODY.len() {
                        fail!(Error::InvalidChunkLength {
                            flag: header[0],
                            len: len as u64,
                        });
                    }
                    self.grow_src(len);
                    read_exact_or_eof(&mut self.r, &mut self.src[0..len])?;
                    if &self.src[0..len] != STREAM_BODY {
                        fail!(Error::InvalidStreamHeader {
                            bytes: self.src[0..len].to_vec(),
                        });
                    }
                }
                Ok(ChunkType::Compressed) => {
                    // Data chunks must hold the checksum and at least one
                    // payload byte.
                    if len < 5 {
                        fail!(Error::InvalidChunkLength {
                            flag: header[0],
                            len: len as u64,
                        });
                    }
                    let expected_sum = io_read_u32_le(&mut self.r)?;
                    let sn = len - 4;
                    self.grow_src(sn);
                    read_exact_or_eof(&mut self.r, &mut self.src[0..sn])?;
                    let dn = decompress_len(&self.src[0..sn])
                        .map_err(io::Error::from)?;
                    self.grow_dst(dn);
                    self.dec
                        .decompress(&self.src[0..sn], &mut self.dst[0..dn])
                        .map_err(io::Error::from)?;
                    self.check_crc(expected_sum, dn)?;
                    self.dsts = 0;
                    self.dste = dn;
                }
                Ok(ChunkType::Uncompressed) => {
                    if len < 5 {
                        fail!(Error::InvalidChunkLength {
                            flag: header[0],
                            len: len as u64,
                        });
                    }
                    let expected_sum = io_read_u32_le(&mut self.r)?;
                    let n = len - 4;
                    self.grow_dst(n);
                    read_exact_or_eof(&mut self.r, &mut self.dst[0..n])?;
                    self.check_crc(expected_sum, n)?;
                    self.dsts = 0;
                    self.dste = n;
                }
            }
        }
    }
}

impl<R: fmt::Debug + io::Read> fmt::Debug for FrameDecoder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("r", &self.r)
            .field("dec", &self.dec)
            .field("src", &"[...]")
            .field("dst", &"[...]")
            .field("dsts", &self.dsts)
            .field("dste", &self.dste)
            .field("verify_checksums", &self.verify_checksums)
            .field("closed", &self.closed)
            .finish()
    }
}

/// A reader for decompressing a legacy format Snappy stream.
///
/// This `LegacyDecoder` wraps any other reader that implements
/// `std::io::Read` and decodes the `snappy\0` stream format: a seven byte
/// stream header, then chunks whose headers carry a big endian length and
/// the checksum.
///
/// A recurrence of the seven header bytes mid-stream is skipped, so the
/// concatenation of two legacy streams decodes as the concatenation of
/// their payloads.
pub struct LegacyDecoder<R: io::Read> {
    /// The underlying reader.
    r: R,
    dec: Decoder,
    /// The compressed bytes buffer, grown to the largest chunk seen so far.
    src: Vec<u8>,
    /// The decompressed bytes buffer; `dsts..dste` is the window not yet
    /// delivered to the caller.
    dst: Vec<u8>,
    dsts: usize,
    dste: usize,
    verify_checksums: bool,
    closed: bool,
    pool: Arc<dyn BufferPool>,
}

impl<R: io::Read> LegacyDecoder<R> {
    /// Create a new reader for streaming legacy Snappy decompression, with
    /// checksum verification enabled.
    ///
    /// The seven byte stream header is read and validated before this
    /// returns.
    pub fn new(rdr: R) -> io::Result<LegacyDecoder<R>> {
        LegacyDecoder::with_options(rdr, true)
    }

    /// Create a new reader with explicit control over checksum
    /// verification.
    pub fn with_options(
        rdr: R,
        verify_checksums: bool,
    ) -> io::Result<LegacyDecoder<R>> {
        LegacyDecoder::with_pool(rdr, verify_checksums, default_pool())
    }

    /// Create a new reader drawing its working buffers from the given pool
    /// instead of the process default.
    pub fn with_pool(
        mut rdr: R,
        verify_checksums: bool,
        pool: Arc<dyn BufferPool>,
    ) -> io::Result<LegacyDecoder<R>> {
        let mut header = [0; LEGACY_CHUNK_HEADER_SIZE];
        read_exact_or_eof(&mut rdr, &mut header)?;
        if header != *LEGACY_STREAM_IDENTIFIER {
            return Err(Error::InvalidStreamHeader {
                bytes: header.to_vec(),
            }
            .into());
        }
        let src = pool.acquire(BufferRole::Input, 0);
        let dst = pool.acquire(BufferRole::Decode, 0);
        Ok(LegacyDecoder {
            r: rdr,
            dec: Decoder::new(),
            src,
            dst,
            dsts: 0,
            dste: 0,
            verify_checksums,
            closed: false,
            pool,
        })
    }

    /// Returns the number of decompressed bytes from the current chunk that
    /// have not yet been delivered.
    pub fn available(&self) -> usize {
        self.dste - self.dsts
    }

    /// Returns the working buffers to the pool. Closing an already closed
    /// reader is a no-op; reads after close return end of stream.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.pool
            .release(BufferRole::Input, mem::replace(&mut self.src, Vec::new()));
        self.pool
            .release(BufferRole::Decode, mem::replace(&mut self.dst, Vec::new()));
        self.dsts = 0;
        self.dste = 0;
        self.closed = true;
    }

    /// Gets a reference to the underlying reader in this decoder.
    pub fn get_ref(&self) -> &R {
        &self.r
    }

    /// Gets a mutable reference to the underlying reader in this decoder.
    ///
    /// Note that mutation of the stream may result in surprising results if
    /// this decoder is continued to be used.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.r
    }

    /// Gets the underlying reader of this decoder.
    pub fn into_inner(self) -> R {
        self.r
    }

    fn grow_src(&mut self, len: usize) {
        if self.src.len() < len {
            self.src.resize(len, 0);
        }
    }

    fn grow_dst(&mut self, len: usize) {
        if self.dst.len() < len {
            self.dst.resize(len, 0);
        }
    }

    fn check_crc(&self, expected: u32, n: usize) -> io::Result<()> {
        if !self.verify_checksums {
            return Ok(());
        }
        let got = crc32c_masked(&self.dst[..n]);
        if expected != got {
            return Err(Error::CorruptChecksum { expected, got }.into());
        }
        Ok(())
    }
}

impl<R: io::Read> io::Read for LegacyDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Ok(0);
        }
        macro_rules! fail {
            ($err:expr) => {
                return Err(io::Error::from($err))
            };
        }
        loop {
            if self.dsts < self.dste {
                let len = cmp::min(self.dste - self.dsts, buf.len());
                let dste = self.dsts + len;
                buf[0..len].copy_from_slice(&self.dst[self.dsts..dste]);
                self.dsts = dste;
                return Ok(len);
            }
            // The chunk header and the stream identifier are both seven
            // bytes; pull seven and then decide what we're looking at.
            let mut header = [0; LEGACY_CHUNK_HEADER_SIZE];
            if !read_exact_eof(&mut self.r, &mut header)? {
                return Ok(0);
            }
            if header == *LEGACY_STREAM_IDENTIFIER {
                // Another stream was concatenated onto this one.
                continue;
            }
            let meta = parse_legacy_header(&header);
            match meta.flag {
                LEGACY_FLAG_COMPRESSED => {
                    if meta.len == 0 {
                        fail!(Error::InvalidChunkLength {
                            flag: meta.flag,
                            len: meta.len as u64,
                        });
                    }
                    self.grow_src(meta.len);
                    read_exact_or_eof(&mut self.r, &mut self.src[0..meta.len])?;
                    let dn = decompress_len(&self.src[0..meta.len])
                        .map_err(io::Error::from)?;
                    self.grow_dst(dn);
                    self.dec
                        .decompress(
                            &self.src[0..meta.len],
                            &mut self.dst[0..dn],
                        )
                        .map_err(io::Error::from)?;
                    self.check_crc(meta.crc, dn)?;
                    self.dsts = 0;
                    self.dste = dn;
                }
                LEGACY_FLAG_RAW => {
                    if meta.len == 0 {
                        fail!(Error::InvalidChunkLength {
                            flag: meta.flag,
                            len: meta.len as u64,
                        });
                    }
                    self.grow_dst(meta.len);
                    read_exact_or_eof(&mut self.r, &mut self.dst[0..meta.len])?;
                    self.check_crc(meta.crc, meta.len)?;
                    self.dsts = 0;
                    self.dste = meta.len;
                }
                flag => {
                    fail!(Error::UnsupportedChunk { flag });
                }
            }
        }
    }
}

impl<R: fmt::Debug + io::Read> fmt::Debug for LegacyDecoder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyDecoder")
            .field("r", &self.r)
            .field("dec", &self.dec)
            .field("src", &"[...]")
            .field("dst", &"[...]")
            .field("dsts", &self.dsts)
            .field("dste", &self.dste)
            .field("verify_checksums", &self.verify_checksums)
            .field("closed", &self.closed)
            .finish()
    }
}

/// The stream formats `AnyDecoder` can detect.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamFormat {
    /// The Snappy frame format.
    Framed,
    /// The legacy stream format.
    Legacy,
}

/// A reader that detects which Snappy stream format its source carries and
/// decompresses accordingly.
///
/// Detection peeks at the first byte: `0xff` can only open a frame format
/// stream identifier and `0x73` (`'s'`) the legacy header. Anything else is
/// rejected with an invalid-stream-header error. The peeked byte is handed
/// back to the chosen decoder, which still validates the complete header.
pub struct AnyDecoder<R: io::Read>(Dispatch<R>);

enum Dispatch<R: io::Read> {
    Framed(FrameDecoder<Peeked<R>>),
    Legacy(LegacyDecoder<Peeked<R>>),
}

impl<R: io::Read> AnyDecoder<R> {
    /// Create a new reader that detects its stream format, with checksum
    /// verification enabled.
    pub fn new(rdr: R) -> io::Result<AnyDecoder<R>> {
        AnyDecoder::with_options(rdr, true)
    }

    /// Create a new format detecting reader with explicit control over
    /// checksum verification.
    pub fn with_options(
        rdr: R,
        verify_checksums: bool,
    ) -> io::Result<AnyDecoder<R>> {
        AnyDecoder::with_pool(rdr, verify_checksums, default_pool())
    }

    /// Create a new format detecting reader drawing its working buffers
    /// from the given pool instead of the process default.
    pub fn with_pool(
        mut rdr: R,
        verify_checksums: bool,
        pool: Arc<dyn BufferPool>,
    ) -> io::Result<AnyDecoder<R>> {
        let mut first = [0; 1];
        read_exact_or_eof(&mut rdr, &mut first)?;
        let peeked = Peeked { head: Some(first[0]), r: rdr };
        match first[0] {
            0xFF => {
                let dec =
                    FrameDecoder::with_pool(peeked, verify_checksums, pool)?;
                Ok(AnyDecoder(Dispatch::Framed(dec)))
            }
            0x73 => {
                let dec =
                    LegacyDecoder::with_pool(peeked, verify_checksums, pool)?;
                Ok(AnyDecoder(Dispatch::Legacy(dec)))
            }
            b => Err(Error::InvalidStreamHeader { bytes: vec![b] }.into()),
        }
    }

    /// Returns which stream format detection settled on.
    pub fn format(&self) -> StreamFormat {
        match self.0 {
            Dispatch::Framed(_) => StreamFormat::Framed,
            Dispatch::Legacy(_) => StreamFormat::Legacy,
        }
    }

    /// Returns the number of decompressed bytes from the current chunk that
    /// have not yet been delivered.
    pub fn available(&self) -> usize {
        match self.0 {
            Dispatch::Framed(ref dec) => dec.available(),
            Dispatch::Legacy(ref dec) => dec.available(),
        }
    }

    /// Returns the working buffers to the pool. Closing an already closed
    /// reader is a no-op; reads after close return end of stream.
    pub fn close(&mut self) {
        match self.0 {
            Dispatch::Framed(ref mut dec) => dec.close(),
            Dispatch::Legacy(ref mut dec) => dec.close(),
        }
    }

    /// Gets a reference to the underlying reader in this decoder.
    pub fn get_ref(&self) -> &R {
        match self.0 {
            Dispatch::Framed(ref dec) => &dec.get_ref().r,
            Dispatch::Legacy(ref dec) => &dec.get_ref().r,
        }
    }
}

impl<R: io::Read> io::Read for AnyDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0 {
            Dispatch::Framed(ref mut dec) => dec.read(buf),
            Dispatch::Legacy(ref mut dec) => dec.read(buf),
        }
    }
}

impl<R: fmt::Debug + io::Read> fmt::Debug for AnyDecoder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Dispatch::Framed(ref dec) => {
                f.debug_tuple("AnyDecoder").field(dec).finish()
            }
            Dispatch::Legacy(ref dec) => {
                f.debug_tuple("AnyDecoder").field(dec).finish()
            }
        }
    }
}

/// Re-presents one peeked byte ahead of the wrapped reader, standing in for
/// the mark/reset capability format detection would otherwise need.
struct Peeked<R> {
    head: Option<u8>,
    r: R,
}

impl<R: io::Read> io::Read for Peeked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(b) = self.head.take() {
            if buf.is_empty() {
                self.head = Some(b);
                return Ok(0);
            }
            buf[0] = b;
            return Ok(1);
        }
        self.r.read(buf)
    }
}

impl<R: fmt::Debug> fmt::Debug for Peeked<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peeked")
            .field("head", &self.head)
            .field("r", &self.r)
            .finish()
    }
}

// read_exact_eof is like Read::read_exact, except it detects EOF at the
// first byte and returns Ok(false) instead of an error. A clean EOF is only
// legal at a chunk boundary; anywhere else the short read surfaces as an
// UnexpectedEof error.
//
// If buf was read successfully, it returns Ok(true).
fn read_exact_eof<R: io::Read>(
    rdr: &mut R,
    buf: &mut [u8],
) -> io::Result<bool> {
    match rdr.read(buf) {
        // EOF
        Ok(0) => Ok(false),
        // Read everything w/ the read call
        Ok(i) if i == buf.len() => Ok(true),
        // There's some bytes left to fill, which can be deferred to
        // read_exact
        Ok(i) => {
            read_exact_or_eof(rdr, &mut buf[i..])?;
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

// read_exact_or_eof is Read::read_exact with the io-level eof error
// normalized to this crate's UnexpectedEof, so callers can downcast every
// framing fault to the same error type.
fn read_exact_or_eof<R: io::Read>(
    rdr: &mut R,
    buf: &mut [u8],
) -> io::Result<()> {
    rdr.read_exact(buf).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            io::Error::from(Error::UnexpectedEof)
        } else {
            err
        }
    })
}

fn io_read_u32_le<R: io::Read>(rdr: &mut R) -> io::Result<u32> {
    let mut buf = [0; 4];
    read_exact_or_eof(rdr, &mut buf)?;
    Ok(LE::read_u32(&buf))
}
