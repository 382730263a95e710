use std::fmt;

use byteorder::{ByteOrder, LittleEndian as LE};

use crate::error::{Error, Result};
use crate::varint::write_varu32;
use crate::MAX_INPUT_SIZE;

/// Inputs are compressed in independent blocks of this size, each against a
/// logically fresh hash table.
const BLOCK_SIZE: usize = 1 << 15;

/// The match finder stops probing this many bytes before the end of a block.
/// The guard zone keeps every 4 and 8 byte wide read inside the block; the
/// tail is swept up by the final literal.
const INPUT_MARGIN: usize = 16 - 1;

/// Blocks shorter than this are emitted as a single literal without running
/// the match finder at all.
const MIN_NON_LITERAL_BLOCK_SIZE: usize = 1 + 1 + INPUT_MARGIN;

/// Bounds on the hash table: the smallest power of two that covers the block,
/// clamped to [256, 16384] entries.
const MIN_TABLE_SIZE: usize = 1 << 8;
const MAX_TABLE_SIZE: usize = 1 << 14;

const TAG_LITERAL: u8 = 0b00;
const TAG_COPY1: u8 = 0b01;
const TAG_COPY2: u8 = 0b10;

/// Returns the maximum possible compressed size given the length of the
/// input to compress.
///
/// Compression into any buffer at least this large never fails and never
/// writes past the bound. If the input (or the bound itself) exceeds the
/// 32 bit length limit, `0` is returned instead.
pub fn max_compress_len(input_len: usize) -> usize {
    let input_len = input_len as u64;
    if input_len > MAX_INPUT_SIZE {
        return 0;
    }
    let max = 32 + input_len + (input_len / 6);
    if max > MAX_INPUT_SIZE {
        0
    } else {
        max as usize
    }
}

/// `Encoder` is a raw Snappy block compressor and a reusable compression
/// context.
///
/// The encoder owns the hash table driving the match finder. The table's
/// prior contents are never meaningful across calls (each block starts from
/// a cleared table), so a single encoder can be recycled across any number
/// of inputs; reuse only saves the allocation.
///
/// An `Encoder` is cheap to construct and may be used from multiple threads
/// only one at a time; distinct encoders are fully independent.
pub struct Encoder {
    table: Vec<u16>,
}

impl Encoder {
    /// Constructs a new encoder. The hash table is allocated lazily on the
    /// first compression.
    pub fn new() -> Encoder {
        Encoder { table: Vec::new() }
    }

    /// Compresses all bytes in `input` into `output`, returning the number
    /// of bytes written.
    ///
    /// `output` must be at least `max_compress_len(input.len())` bytes long,
    /// otherwise `Error::BufferTooSmall` is returned. Inputs beyond the
    /// 32 bit length limit are rejected with `Error::TooBig`. Given a big
    /// enough buffer, compression itself cannot fail.
    pub fn compress(
        &mut self,
        mut input: &[u8],
        output: &mut [u8],
    ) -> Result<usize> {
        match max_compress_len(input.len()) {
            0 => {
                return Err(Error::TooBig {
                    given: input.len() as u64,
                    max: MAX_INPUT_SIZE,
                });
            }
            min if output.len() < min => {
                return Err(Error::BufferTooSmall {
                    given: output.len() as u64,
                    min: min as u64,
                });
            }
            _ => {}
        }
        let mut opos = write_varu32(output, input.len() as u32);
        while !input.is_empty() {
            let mut block = input;
            if block.len() > BLOCK_SIZE {
                block = &block[..BLOCK_SIZE];
            }
            input = &input[block.len()..];
            if block.len() < MIN_NON_LITERAL_BLOCK_SIZE {
                opos += emit_literal(block, &mut output[opos..]);
            } else {
                opos += self.compress_block(block, &mut output[opos..]);
            }
        }
        Ok(opos)
    }

    /// Compresses `input` into a freshly allocated `Vec`.
    pub fn compress_vec(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut buf = vec![0; max_compress_len(input.len())];
        let n = self.compress(input, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Compresses a single block against a cleared hash table, returning the
    /// number of bytes written.
    fn compress_block(&mut self, input: &[u8], output: &mut [u8]) -> usize {
        debug_assert!(input.len() >= MIN_NON_LITERAL_BLOCK_SIZE);
        debug_assert!(input.len() <= BLOCK_SIZE);

        let mut table_size = MIN_TABLE_SIZE;
        let mut shift: u32 = 32 - 8;
        while table_size < MAX_TABLE_SIZE && table_size < input.len() {
            table_size *= 2;
            shift -= 1;
        }
        if self.table.len() < table_size {
            self.table.resize(table_size, 0);
        }
        let table = &mut self.table[..table_size];
        for entry in table.iter_mut() {
            *entry = 0;
        }
        // With shift = 32 - log2(table_size), the hash can never index past
        // the table.
        let hash = |x: u32| (x.wrapping_mul(0x1E35A7BD) >> shift) as usize;

        let mut opos = 0;
        let s_limit = input.len() - INPUT_MARGIN;
        let mut next_emit = 0;
        let mut s = 1;
        let mut next_hash = hash(LE::read_u32(&input[s..]));
        loop {
            // Probe until a previous position with the same 4 bytes turns
            // up. While probes keep missing, the stride between them grows:
            // `skip` counts probe attempts in its top 27 bits, so every 32
            // misses lengthen the stride by one byte, and incompressible
            // data is skimmed rather than scanned.
            let mut skip: u32 = 32;
            let mut next_s = s;
            let mut candidate;
            loop {
                s = next_s;
                next_s = s + (skip >> 5) as usize;
                skip += 1;
                if next_s > s_limit {
                    if next_emit < input.len() {
                        opos += emit_literal(
                            &input[next_emit..],
                            &mut output[opos..],
                        );
                    }
                    return opos;
                }
                candidate = table[next_hash] as usize;
                table[next_hash] = s as u16;
                next_hash = hash(LE::read_u32(&input[next_s..]));
                // A stale or zero table entry is harmless: the candidate
                // only counts if its 4 bytes actually match.
                if LE::read_u32(&input[s..]) == LE::read_u32(&input[candidate..])
                {
                    break;
                }
            }
            opos += emit_literal(&input[next_emit..s], &mut output[opos..]);
            loop {
                let base = s;
                s += 4;
                let mut i = candidate + 4;
                while s < input.len() && input[i] == input[s] {
                    i += 1;
                    s += 1;
                }
                opos += emit_copy(base - candidate, s - base, &mut output[opos..]);
                next_emit = s;
                if s >= s_limit {
                    if next_emit < input.len() {
                        opos += emit_literal(
                            &input[next_emit..],
                            &mut output[opos..],
                        );
                    }
                    return opos;
                }
                // One wide read serves three hashes: back-fill an entry for
                // s - 1 so short matches overlapping the copy we just wrote
                // are still found, then probe at s.
                let x = LE::read_u64(&input[s - 1..]);
                let prev_hash = hash(x as u32);
                table[prev_hash] = (s - 1) as u16;
                let cur_hash = hash((x >> 8) as u32);
                candidate = table[cur_hash] as usize;
                table[cur_hash] = s as u16;
                if (x >> 8) as u32 != LE::read_u32(&input[candidate..]) {
                    next_hash = hash((x >> 16) as u32);
                    s += 1;
                    break;
                }
            }
        }
    }
}

impl Default for Encoder {
    fn default() -> Encoder {
        Encoder::new()
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoder").field("table", &"[...]").finish()
    }
}

fn emit_literal(literal: &[u8], output: &mut [u8]) -> usize {
    let n = literal.len().checked_sub(1).unwrap();
    let mut start = 0;
    if n <= 59 {
        output[0] = ((n as u8) << 2) | TAG_LITERAL;
        start = 1;
    } else if n < 256 {
        output[0] = (60 << 2) | TAG_LITERAL;
        output[1] = n as u8;
        start = 2;
    } else if n < 65536 {
        output[0] = (61 << 2) | TAG_LITERAL;
        output[1] = n as u8;
        output[2] = (n >> 8) as u8;
        start = 3;
    } else {
        // Literals are bounded by the block size.
        unreachable!();
    }
    output[start..start + literal.len()].copy_from_slice(literal);
    start + literal.len()
}

fn emit_copy(offset: usize, mut len: usize, output: &mut [u8]) -> usize {
    debug_assert!(offset >= 1 && offset < BLOCK_SIZE);
    let mut i = 0;
    // Long matches are split into copies of at most 64 bytes. When the
    // remainder would land between 64 and 68, emit 60 first so that the
    // final copy keeps a length of at least 4 and stays eligible for the
    // two byte encoding.
    while len >= 68 {
        output[i + 0] = (63 << 2) | TAG_COPY2;
        output[i + 1] = offset as u8;
        output[i + 2] = (offset >> 8) as u8;
        i += 3;
        len -= 64;
    }
    if len > 64 {
        output[i + 0] = (59 << 2) | TAG_COPY2;
        output[i + 1] = offset as u8;
        output[i + 2] = (offset >> 8) as u8;
        i += 3;
        len -= 60;
    }
    if len <= 11 && offset <= 2047 {
        output[i + 0] = (((offset >> 8) as u8) << 5)
            | (((len - 4) as u8) << 2)
            | TAG_COPY1;
        output[i + 1] = offset as u8;
        i + 2
    } else {
        output[i + 0] = (((len - 1) as u8) << 2) | TAG_COPY2;
        output[i + 1] = offset as u8;
        output[i + 2] = (offset >> 8) as u8;
        i + 3
    }
}
