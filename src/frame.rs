/*!
Wire format definitions shared by the readers in `read` and the writers in
`write`: chunk flags, stream identifiers, header codecs and the
compress-or-store decision every data chunk goes through.

Two formats are supported. The Snappy frame format keeps its checksum as the
first four bytes of each data chunk's payload, behind a flag byte and a
24 bit little endian length. The legacy format keeps the checksum in the
chunk header itself, behind a flag byte and a 16 bit big endian length.
*/

use std::io;
use std::result;

use byteorder::{BigEndian as BE, ByteOrder, LittleEndian as LE};

use crate::compress::Encoder;

/// The chunk that must open a stream in the Snappy frame format, and that
/// may reappear anywhere inside one as a resynchronization marker.
pub const STREAM_IDENTIFIER: &[u8] = b"\xFF\x06\x00\x00sNaPpY";

/// The payload of a stream identifier chunk.
pub const STREAM_BODY: &[u8] = b"sNaPpY";

/// Size of a frame format chunk header: flag byte plus 24 bit length.
pub const CHUNK_HEADER_SIZE: usize = 4;

/// Size of a frame format chunk header together with the checksum leading
/// every data chunk payload.
pub const CHUNK_HEADER_AND_CRC_SIZE: usize = CHUNK_HEADER_SIZE + 4;

/// Default fraction of the input size that a compressed frame format block
/// must not exceed to be stored compressed.
pub const DEFAULT_MIN_COMPRESS_RATIO: f64 = 0.85;

/// The header that opens a legacy stream. A second occurrence mid-stream is
/// skipped, so concatenated streams decode as concatenated payloads.
pub const LEGACY_STREAM_IDENTIFIER: &[u8] = b"snappy\x00";

/// Size of a legacy chunk header: flag byte, big endian u16 length, big
/// endian CRC32-C. Identical to the stream identifier length, so the reader
/// always pulls seven bytes and then decides what it is looking at.
pub const LEGACY_CHUNK_HEADER_SIZE: usize = 7;

/// Legacy flag for a chunk stored uncompressed.
pub const LEGACY_FLAG_RAW: u8 = 0x00;

/// Legacy flag for a chunk stored as a compressed block.
pub const LEGACY_FLAG_COMPRESSED: u8 = 0x01;

/// The legacy writer's compress-or-store threshold, 7/8.
pub const LEGACY_MIN_COMPRESS_RATIO: f64 = 0.875;

/// The defined chunk flags of the Snappy frame format. Flags outside these
/// three fall into the reserved ranges: `0x02..=0x7f` must be rejected and
/// `0x80..=0xfe` must be skipped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChunkType {
    /// A chunk whose payload is a checksum followed by a compressed block.
    Compressed = 0x00,
    /// A chunk whose payload is a checksum followed by stored bytes.
    Uncompressed = 0x01,
    /// The stream identifier chunk.
    Stream = 0xFF,
}

impl ChunkType {
    /// Converts a chunk flag byte to its chunk type, or returns the flag
    /// unchanged if it is not one of the three defined types.
    pub fn from_u8(b: u8) -> result::Result<ChunkType, u8> {
        match b {
            0x00 => Ok(ChunkType::Compressed),
            0x01 => Ok(ChunkType::Uncompressed),
            0xFF => Ok(ChunkType::Stream),
            b => Err(b),
        }
    }
}

/// Compresses `src` into `scratch` and decides whether the compressed form
/// earns its keep: the payload is the compressed bytes only when their
/// length stays within `min_compress_ratio` of the input length.
///
/// Returns the chosen payload and whether it is compressed. `scratch` must
/// be at least `max_compress_len(src.len())` bytes.
pub fn encode_block<'a>(
    enc: &mut Encoder,
    src: &'a [u8],
    scratch: &'a mut [u8],
    min_compress_ratio: f64,
) -> io::Result<(&'a [u8], bool)> {
    let compressed_len =
        enc.compress(src, scratch).map_err(io::Error::from)?;
    if (compressed_len as f64) <= min_compress_ratio * (src.len() as f64) {
        Ok((&scratch[..compressed_len], true))
    } else {
        Ok((src, false))
    }
}

/// Assembles a frame format chunk header: flag, 24 bit little endian length
/// covering the checksum and the payload, then the checksum itself.
/// `header` must be `CHUNK_HEADER_AND_CRC_SIZE` bytes.
pub fn write_chunk_header(
    header: &mut [u8],
    ty: ChunkType,
    payload_len: usize,
    crc: u32,
) {
    header[0] = ty as u8;
    LE::write_uint(&mut header[1..4], (payload_len + 4) as u64, 3);
    LE::write_u32(&mut header[4..8], crc);
}

/// Assembles a legacy chunk header. The length covers the payload only; the
/// checksum lives here in the header, most significant byte first.
/// `header` must be `LEGACY_CHUNK_HEADER_SIZE` bytes.
pub fn write_legacy_header(
    header: &mut [u8],
    flag: u8,
    payload_len: usize,
    crc: u32,
) {
    header[0] = flag;
    BE::write_u16(&mut header[1..3], payload_len as u16);
    BE::write_u32(&mut header[3..7], crc);
}

/// A parsed legacy chunk header.
pub struct LegacyChunkHeader {
    /// The flag byte; `LEGACY_FLAG_RAW` or `LEGACY_FLAG_COMPRESSED` in a
    /// well formed stream.
    pub flag: u8,
    /// The payload length in bytes.
    pub len: usize,
    /// The masked CRC32-C of the chunk's uncompressed bytes.
    pub crc: u32,
}

/// Splits a legacy chunk header into its fields. `header` must be
/// `LEGACY_CHUNK_HEADER_SIZE` bytes.
pub fn parse_legacy_header(header: &[u8]) -> LegacyChunkHeader {
    LegacyChunkHeader {
        flag: header[0],
        len: BE::read_u16(&header[1..3]) as usize,
        crc: BE::read_u32(&header[3..7]),
    }
}
