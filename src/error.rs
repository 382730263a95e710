use std::fmt;
use std::io;
use std::result;

/// A convenient type alias for `Result<T, snappy_stream::Error>`.
pub type Result<T> = result::Result<T, Error>;

/// `IntoInnerError` occurs when consuming an encoder fails.
///
/// Consuming the encoder causes a flush to happen. If the flush fails, then
/// this error is returned, which contains both the original encoder and the
/// error that occurred.
///
/// The type parameter `W` is the unconsumed writer.
pub struct IntoInnerError<W> {
    wtr: W,
    err: io::Error,
}

impl<W> IntoInnerError<W> {
    pub(crate) fn new(wtr: W, err: io::Error) -> IntoInnerError<W> {
        IntoInnerError { wtr, err }
    }

    /// Returns the error which caused the call to `into_inner` to fail.
    ///
    /// This error was returned when attempting to flush the internal buffer.
    pub fn error(&self) -> &io::Error {
        &self.err
    }

    /// Returns the error which caused the call to `into_inner` to fail.
    ///
    /// This error was returned when attempting to flush the internal buffer.
    pub fn into_error(self) -> io::Error {
        self.err
    }

    /// Returns the underlying writer which generated the error.
    ///
    /// The returned value can be used for error recovery, such as
    /// re-inspecting the buffer.
    pub fn into_inner(self) -> W {
        self.wtr
    }
}

impl<W: std::any::Any> std::error::Error for IntoInnerError<W> {}

impl<W> fmt::Display for IntoInnerError<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.err.fmt(f)
    }
}

impl<W> fmt::Debug for IntoInnerError<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.err.fmt(f)
    }
}

/// Error describes all the possible errors that may occur during Snappy
/// compression, decompression or stream processing.
#[derive(Clone, Debug)]
pub enum Error {
    /// This error occurs when the given input is too big. This can happen
    /// during compression or decompression.
    TooBig {
        /// The size of the given input.
        given: u64,
        /// The maximum allowed size of an input buffer.
        max: u64,
    },
    /// This error occurs when the given buffer is too small to contain the
    /// maximum possible compressed bytes or the total number of decompressed
    /// bytes.
    BufferTooSmall {
        /// The size of the given output buffer.
        given: u64,
        /// The minimum size of the output buffer.
        min: u64,
    },
    /// This error occurs when a caller supplies an out-of-range parameter,
    /// such as a zero block size or a min-compression-ratio outside `(0, 1]`.
    InvalidArgument {
        /// A description of the rejected parameter.
        message: &'static str,
    },
    /// This error occurs during decompression when the compressed input is
    /// malformed: a bad varint, a bad opcode, an out-of-range copy, a
    /// truncated literal, or a decoded length that does not match the
    /// declared length.
    ///
    /// Two `Corruption` errors are equal when they report the same offset;
    /// the message carries diagnostics only.
    Corruption {
        /// The byte offset into the compressed input at which the fault was
        /// detected.
        offset: u64,
        /// A description of the fault.
        message: &'static str,
    },
    /// This error occurs when the magic stream identifier bytes do not match
    /// what is expected, or when stream format detection cannot recognize
    /// the leading bytes of a stream.
    InvalidStreamHeader {
        /// The bytes that were read.
        bytes: Vec<u8>,
    },
    /// This error occurs when a chunk header carries a length outside the
    /// bounds allowed for its flag. Data chunks must be long enough to hold
    /// their checksum and at least one payload byte; a stream identifier
    /// chunk must be exactly six bytes long.
    InvalidChunkLength {
        /// The chunk's flag byte.
        flag: u8,
        /// The length declared by the chunk header.
        len: u64,
    },
    /// This error occurs when a reserved unskippable chunk flag is seen in a
    /// framed stream, or an unknown flag is seen in a legacy stream.
    UnsupportedChunk {
        /// The flag byte that was read.
        flag: u8,
    },
    /// This error occurs when a checksum validity check fails.
    CorruptChecksum {
        /// The checksum read from the stream.
        expected: u32,
        /// The checksum computed over the delivered bytes.
        got: u32,
    },
    /// This error occurs when the underlying stream ends in the middle of a
    /// chunk header or payload where more bytes were required.
    UnexpectedEof,
    /// This error occurs when writing to a stream that has been closed.
    Closed,
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        let kind = match err {
            Error::UnexpectedEof => io::ErrorKind::UnexpectedEof,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

impl Eq for Error {}

/// Corruption errors compare by offset alone. Everything else compares by
/// all of its fields.
impl PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        use self::Error::*;
        match (self, other) {
            (
                &TooBig { given: given1, max: max1 },
                &TooBig { given: given2, max: max2 },
            ) => (given1, max1) == (given2, max2),
            (
                &BufferTooSmall { given: given1, min: min1 },
                &BufferTooSmall { given: given2, min: min2 },
            ) => (given1, min1) == (given2, min2),
            (
                &InvalidArgument { message: msg1 },
                &InvalidArgument { message: msg2 },
            ) => msg1 == msg2,
            (
                &Corruption { offset: offset1, .. },
                &Corruption { offset: offset2, .. },
            ) => offset1 == offset2,
            (
                &InvalidStreamHeader { bytes: ref bytes1 },
                &InvalidStreamHeader { bytes: ref bytes2 },
            ) => bytes1 == bytes2,
            (
                &InvalidChunkLength { flag: flag1, len: len1 },
                &InvalidChunkLength { flag: flag2, len: len2 },
            ) => (flag1, len1) == (flag2, len2),
            (
                &UnsupportedChunk { flag: flag1 },
                &UnsupportedChunk { flag: flag2 },
            ) => flag1 == flag2,
            (
                &CorruptChecksum { expected: e1, got: g1 },
                &CorruptChecksum { expected: e2, got: g2 },
            ) => (e1, g1) == (e2, g2),
            (&UnexpectedEof, &UnexpectedEof) | (&Closed, &Closed) => true,
            _ => false,
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::TooBig { given, max } => write!(
                f,
                "snappy: input buffer (size = {}) is larger than \
                 allowed (size = {})",
                given, max
            ),
            Error::BufferTooSmall { given, min } => write!(
                f,
                "snappy: output buffer (size = {}) is smaller than \
                 required (size = {})",
                given, min
            ),
            Error::InvalidArgument { message } => {
                write!(f, "snappy: invalid argument: {}", message)
            }
            Error::Corruption { offset, message } => write!(
                f,
                "snappy: corrupt input ({} at compressed offset {})",
                message, offset
            ),
            Error::InvalidStreamHeader { ref bytes } => write!(
                f,
                "snappy: corrupt input (expected a stream header but \
                 got {})",
                escape(&**bytes)
            ),
            Error::InvalidChunkLength { flag, len } => write!(
                f,
                "snappy: corrupt input (chunk with flag {:#04x} has \
                 invalid length {})",
                flag, len
            ),
            Error::UnsupportedChunk { flag } => write!(
                f,
                "snappy: corrupt input (unsupported chunk flag: {:#04x})",
                flag
            ),
            Error::CorruptChecksum { expected, got } => write!(
                f,
                "snappy: corrupt input (bad checksum; \
                 expected: {}, got: {})",
                expected, got
            ),
            Error::UnexpectedEof => write!(
                f,
                "snappy: corrupt input (stream ended in the middle of \
                 a chunk)"
            ),
            Error::Closed => write!(f, "snappy: stream has been closed"),
        }
    }
}

fn escape(bytes: &[u8]) -> String {
    use std::ascii::escape_default;
    bytes.iter().flat_map(|&b| escape_default(b)).map(|b| b as char).collect()
}
