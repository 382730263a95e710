/*!
This crate provides an implementation of the
[Snappy compression format](https://github.com/google/snappy/blob/master/format_description.txt),
along with the two stream formats that wrap it: the standard
[Snappy frame format](https://github.com/google/snappy/blob/master/framing_format.txt)
(MIME type `application/x-snappy-framed`) and the legacy `snappy\0` stream
format, with automatic detection between the two.

There are three layers to this crate:

* The raw block codec, exposed through [`Encoder`](struct.Encoder.html) and
  [`Decoder`](struct.Decoder.html). An encoder doubles as a reusable
  compression context: it owns the hash table scratch space, so recycling one
  across calls avoids repeated allocation.
* The [`read`](read/index.html) and [`write`](write/index.html) modules,
  which provide `std::io::Read` and `std::io::Write` implementations for the
  two stream formats.
* The [`pool`](pool/index.html) module, a small buffer recycling capability
  that the stream types draw their working buffers from. The default pool is
  a per-thread cache; substitute [`pool::NoopPool`](pool/struct.NoopPool.html)
  or your own implementation through the `with_pool` constructors.

# Example: compress data on `stdin`

This program reads data from `stdin`, compresses it and emits it to `stdout`
using the Snappy frame format:

```no_run
use std::io;

fn main() -> io::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut wtr = snappy_stream::write::FrameEncoder::new(stdout.lock())?;
    io::copy(&mut stdin.lock(), &mut wtr)?;
    wtr.close()
}
```

# Example: one-shot block compression

```
use snappy_stream::{Decoder, Encoder};

let mut enc = Encoder::new();
let compressed = enc.compress_vec(b"the quick brown fox").unwrap();
let original = Decoder::new().decompress_vec(&compressed).unwrap();
assert_eq!(&original, b"the quick brown fox");
```
*/

#![deny(missing_docs)]

pub use crate::compress::{max_compress_len, Encoder};
pub use crate::decompress::{decompress_len, Decoder};
pub use crate::error::{Error, IntoInnerError, Result};

/// The maximum number of uncompressed bytes carried by one chunk of the
/// Snappy frame format. Also the default (and maximum) block size of
/// `write::FrameEncoder`.
const MAX_BLOCK_SIZE: usize = 1 << 16;

/// The maximum number of uncompressed bytes carried by one chunk of the
/// legacy stream format.
const LEGACY_BLOCK_SIZE: usize = 1 << 15;

/// The largest input this crate will compress or decompress. Lengths are
/// carried in a 32 bit varint.
const MAX_INPUT_SIZE: u64 = std::u32::MAX as u64;

mod compress;
mod crc32c;
mod decompress;
mod error;
mod frame;
pub mod pool;
pub mod read;
mod varint;
pub mod write;

#[cfg(test)]
mod tests;
