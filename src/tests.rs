use std::io::{self, Read, Write};
use std::sync::Arc;

use quickcheck::{QuickCheck, StdGen, TestResult};

use crate::crc32c::crc32c_masked;
use crate::error::Error;
use crate::frame::{LEGACY_STREAM_IDENTIFIER, STREAM_IDENTIFIER};
use crate::pool::NoopPool;
use crate::read::{AnyDecoder, FrameDecoder, LegacyDecoder, StreamFormat};
use crate::write::{FrameEncoder, LegacyEncoder};
use crate::{decompress_len, max_compress_len, Decoder, Encoder};

// roundtrip is a macro that compresses the input, then decompresses the
// result and compares it with the original input. If they are not equal,
// then the test fails.
macro_rules! roundtrip {
    ($data:expr) => {{
        let d = &$data[..];
        assert_eq!(d, &*depress(&press(d)));
    }};
}

// errored is a macro that tries to decompress the input and asserts that it
// resulted in the given error. If decompression was successful, then the
// test fails.
macro_rules! errored {
    ($data:expr, $err:expr) => {{
        let d = &$data[..];
        match Decoder::new().decompress_vec(d) {
            Err(ref err) if err == &$err => {}
            Err(ref err) => panic!(
                "expected decompression to fail with {:?}, but got {:?}",
                $err, err
            ),
            Ok(v) => panic!(
                "expected decompression to fail, but got {} bytes",
                v.len()
            ),
        }
    }};
}

// testtrip is a macro that defines a test that compresses the input, then
// decompresses the result and compares it with the original input. If they
// are not equal, then the test fails. This test is performed on the raw
// Snappy format, the Snappy frame format and the legacy stream format.
macro_rules! testtrip {
    ($name:ident, $data:expr) => {
        mod $name {
            #[test]
            fn roundtrip_raw() {
                use super::{depress, press};
                roundtrip!($data);
            }

            #[test]
            fn roundtrip_frame() {
                use super::{frame_depress, frame_press};
                let d = &$data[..];
                assert_eq!(d, &*frame_depress(&frame_press(d)));
            }

            #[test]
            fn roundtrip_legacy() {
                use super::{legacy_depress, legacy_press};
                let d = &$data[..];
                assert_eq!(d, &*legacy_depress(&legacy_press(d)));
            }
        }
    };
}

// testerrored is a macro that defines a test that decompresses the input,
// and if the result is anything other than the error given, the test fails.
macro_rules! testerrored {
    ($name:ident, $data:expr, $err:expr) => {
        #[test]
        fn $name() {
            errored!($data, $err);
        }
    };
}

// Simple test cases.
testtrip!(empty, &[]);
testtrip!(one_zero, &[0]);
testtrip!(one_a, b"a");
testtrip!(tiny, b"abcdef");
testtrip!(
    repeat_boundary,
    b"aaaaaaaaaaaabbbbbbbaaaaaa"
);
testtrip!(
    pi,
    b"3.14159265358979323846264338327950288419716939937510582097494459"
);

// Do it again, with data crossing the internal 32K compression block
// boundary and the stream block boundaries.
#[test]
fn trip_zeros_64k() {
    roundtrip!(vec![0; 65536]);
}

#[test]
fn trip_zeros_many_blocks() {
    let data = vec![0; 200_000];
    assert_eq!(data, depress(&press(&data)));
    assert_eq!(data, frame_depress(&frame_press(&data)));
    assert_eq!(data, legacy_depress(&legacy_press(&data)));
}

#[test]
fn trip_text_many_blocks() {
    let data = sample_text(150_000);
    assert_eq!(data, depress(&press(&data)));
    assert_eq!(data, frame_depress(&frame_press(&data)));
    assert_eq!(data, legacy_depress(&legacy_press(&data)));
}

#[test]
fn trip_random_many_blocks() {
    let data = random_bytes(150_000);
    assert_eq!(data, depress(&press(&data)));
    assert_eq!(data, frame_depress(&frame_press(&data)));
    assert_eq!(data, legacy_depress(&legacy_press(&data)));
}

#[test]
fn trip_byte_sequence() {
    let data: Vec<u8> =
        (0..100_000u32).map(|i| (i % 251) as u8).collect();
    roundtrip!(data);
}

#[test]
fn small_copy() {
    use std::iter::repeat;
    for i in 1..32 {
        let inner: String = repeat('b').take(i).collect();
        roundtrip!(format!("aaaa{}aaaabbbb", inner).into_bytes());
    }
}

#[test]
fn small_regular() {
    let mut i = 1;
    while i < 20_000 {
        let mut data = Vec::new();
        for byte in 0..i {
            data.push((byte % 10) as u8 + b'a');
        }
        roundtrip!(data);
        i += 23;
    }
}

// Decompression of malformed blocks.
testerrored!(
    err_empty_input,
    &b""[..],
    Error::Corruption { offset: 0, message: "" }
);
testerrored!(
    err_varint_truncated,
    &[0x80][..],
    Error::Corruption { offset: 1, message: "" }
);
testerrored!(
    err_varint_sixth_byte,
    &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01][..],
    Error::Corruption { offset: 4, message: "" }
);
testerrored!(
    err_varint_overflow,
    &[0xFF, 0xFF, 0xFF, 0xFF, 0x10][..],
    Error::Corruption { offset: 4, message: "" }
);
testerrored!(
    err_missing_body,
    &[0x01][..],
    Error::Corruption { offset: 1, message: "" }
);
testerrored!(
    err_literal_overruns_output,
    // Declares one byte, then carries a two byte literal.
    &[0x01, 0x04, 0x61, 0x62][..],
    Error::Corruption { offset: 1, message: "" }
);
testerrored!(
    err_copy_offset_zero,
    // Literal "a", then a one byte copy with offset zero.
    &[0x02, 0x00, 0x61, 0x02, 0x00, 0x00][..],
    Error::Corruption { offset: 3, message: "" }
);
testerrored!(
    err_copy_offset_too_far,
    // Literal "a", then a one byte copy reaching before the output start.
    &[0x02, 0x00, 0x61, 0x02, 0x02, 0x00][..],
    Error::Corruption { offset: 3, message: "" }
);
testerrored!(
    err_copy_overruns_output,
    // Declares three bytes, then copies three bytes after a one byte
    // literal.
    &[0x03, 0x00, 0x61, 0x0A, 0x01, 0x00][..],
    Error::Corruption { offset: 3, message: "" }
);
testerrored!(
    err_copy_operand_truncated,
    &[0x03, 0x00, 0x61, 0x0A, 0x01][..],
    Error::Corruption { offset: 5, message: "" }
);

#[test]
fn err_truncated_literal_reports_input_length() {
    // 100 distinct bytes compress to a single long literal; cutting the
    // block mid-literal must report the truncated length.
    let data: Vec<u8> = (0..100u8).collect();
    let compressed = press(&data);
    let cut = &compressed[..50];
    errored!(cut, Error::Corruption { offset: 50, message: "" });
}

#[test]
fn err_short_declared_length() {
    // The block decodes to more bytes than its header declares.
    let mut compressed = press(&[b'x'; 50]);
    // Rewrite the varint from 50 to 49.
    assert_eq!(compressed[0], 50);
    compressed[0] = 49;
    match Decoder::new().decompress_vec(&compressed) {
        Err(Error::Corruption { .. }) => {}
        other => panic!("expected corruption, got {:?}", other),
    }
}

#[test]
fn decompress_len_reads_header_only() {
    assert_eq!(decompress_len(&[0x00]).unwrap(), 0);
    assert_eq!(decompress_len(&[0x0A, 0xFF]).unwrap(), 10);
    let huge = &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
    assert_eq!(decompress_len(huge).unwrap(), u32::max_value() as usize);
}

#[test]
fn compress_empty_is_a_bare_varint() {
    assert_eq!(press(&[]), vec![0x00]);
    assert_eq!(depress(&[0x00]), Vec::<u8>::new());
}

#[test]
fn compress_rejects_short_output() {
    let mut enc = Encoder::new();
    let mut buf = [0; 10];
    match enc.compress(&[b'z'; 100], &mut buf) {
        Err(Error::BufferTooSmall { given: 10, .. }) => {}
        other => panic!("expected BufferTooSmall, got {:?}", other),
    }
}

#[test]
fn decompress_rejects_short_output() {
    let compressed = press(b"some reasonably long input string");
    let mut buf = [0; 4];
    match Decoder::new().decompress(&compressed, &mut buf) {
        Err(Error::BufferTooSmall { given: 4, .. }) => {}
        other => panic!("expected BufferTooSmall, got {:?}", other),
    }
}

#[test]
fn encoder_is_reusable() {
    let mut enc = Encoder::new();
    let inputs: Vec<Vec<u8>> = vec![
        b"hello hello hello hello".to_vec(),
        vec![0; 70_000],
        random_bytes(40_000),
        Vec::new(),
    ];
    for input in &inputs {
        let compressed = enc.compress_vec(input).unwrap();
        assert_eq!(input, &depress(&compressed));
    }
}

#[test]
fn max_compress_len_bounds() {
    assert_eq!(max_compress_len(0), 32);
    assert!(max_compress_len(100) >= 100);
    // Beyond the 32 bit limit there is no bound to give.
    assert_eq!(max_compress_len(std::u32::MAX as usize + 1), 0);
}

// The long copy in an all-zero block must start with a one byte literal.
#[test]
fn zeros_compress_to_literal_then_copies() {
    let data = vec![0; 65536];
    let compressed = press(&data);
    // varint(65536)
    assert_eq!(&compressed[0..3], &[0x80, 0x80, 0x04]);
    // A literal of length one carrying the first zero.
    assert_eq!(&compressed[3..5], &[0x00, 0x00]);
    // Then a maximal two byte offset copy at offset one.
    assert_eq!(&compressed[5..8], &[(63 << 2) | 0b10, 0x01, 0x00]);
    assert!(compressed.len() < data.len() / 10);
    assert_eq!(depress(&compressed), data);
}

// Format stability: the compressed bytes themselves are fixed, not just the
// roundtrip.
#[test]
fn frame_format_stability() {
    let data = b"aaaaaaaaaaaabbbbbbbaaaaaa";
    let out = frame_press(data);
    assert_eq!(out.len(), 37);
    assert_eq!(&out[0..10], STREAM_IDENTIFIER);
    // Compressed data chunk, 23 bytes of checksum plus payload.
    assert_eq!(out[10], 0x00);
    assert_eq!(&out[11..14], &[0x17, 0x00, 0x00]);
    // Masked CRC32-C of the uncompressed bytes, little endian.
    assert_eq!(&out[14..18], &[0xA8, 0xCD, 0x74, 0x92]);
    // The Snappy block: varint 25, literal "a", a copy of 11 bytes at
    // offset 1, then the 13 byte tail literal.
    let mut block = vec![0x19, 0x00, 0x61, 0x1D, 0x01, 0x30];
    block.extend_from_slice(b"bbbbbbbaaaaaa");
    assert_eq!(&out[18..], &*block);
    assert_eq!(press(data), block);
}

#[test]
fn legacy_format_stability() {
    let data = b"aaaaaaaaaaaabbbbbbbaaaaaa";
    let out = legacy_press(data);
    assert_eq!(out.len(), 33);
    assert_eq!(&out[0..7], LEGACY_STREAM_IDENTIFIER);
    // Compressed chunk of 19 bytes, big endian length.
    assert_eq!(out[7], 0x01);
    assert_eq!(&out[8..10], &[0x00, 0x13]);
    // The same masked CRC32-C, most significant byte first.
    assert_eq!(&out[10..14], &[0x92, 0x74, 0xCD, 0xA8]);
    assert_eq!(&out[14..], &press(data)[..]);
}

#[test]
fn legacy_single_byte_stays_raw() {
    // A compressed single byte costs three bytes, which never passes the
    // 7/8 threshold, so the chunk is stored raw.
    let out = legacy_press(b"a");
    assert_eq!(out.len(), 15);
    assert_eq!(&out[0..7], LEGACY_STREAM_IDENTIFIER);
    assert_eq!(out[7], 0x00);
    assert_eq!(&out[8..10], &[0x00, 0x01]);
    assert_eq!(&out[10..14], &crc32c_masked(b"a").to_be_bytes());
    assert_eq!(out[14], b'a');
    assert_eq!(legacy_depress(&out), b"a");
}

#[test]
fn empty_frame_stream_is_just_the_identifier() {
    let mut wtr = FrameEncoder::new(Vec::new()).unwrap();
    wtr.close().unwrap();
    let out = wtr.into_inner().unwrap();
    assert_eq!(out, STREAM_IDENTIFIER);
    assert_eq!(frame_depress(&out), Vec::<u8>::new());
}

#[test]
fn empty_legacy_stream_is_just_the_header() {
    let wtr = LegacyEncoder::new(Vec::new()).unwrap();
    let out = wtr.into_inner().unwrap();
    assert_eq!(out, LEGACY_STREAM_IDENTIFIER);
    assert_eq!(legacy_depress(&out), Vec::<u8>::new());
}

#[test]
fn incompressible_blow_up_bound() {
    for &n in &[1000usize, 65536] {
        let data = random_bytes(n);
        let out = frame_press(&data);
        // Stream identifier, one chunk header and one checksum.
        assert!(out.len() <= n + 18, "{} > {}", out.len(), n + 18);
        assert_eq!(frame_depress(&out), data);
    }
}

#[test]
fn flush_emits_a_chunk_per_call() {
    let mut wtr = FrameEncoder::new(Vec::new()).unwrap();
    wtr.write_all(b"first").unwrap();
    wtr.flush().unwrap();
    let after_first = wtr.get_ref().len();
    assert!(after_first > STREAM_IDENTIFIER.len());
    // An empty flush emits nothing at the framing layer.
    wtr.flush().unwrap();
    assert_eq!(wtr.get_ref().len(), after_first);
    wtr.write_all(b"second").unwrap();
    wtr.close().unwrap();
    let out = wtr.into_inner().unwrap();
    assert_eq!(frame_depress(&out), b"firstsecond");
}

#[test]
fn skippable_chunks_are_transparent() {
    for flag in 0x80u8..=0xFE {
        let mut stream = STREAM_IDENTIFIER.to_vec();
        stream.push(flag);
        stream.extend_from_slice(&[3, 0, 0]);
        stream.extend_from_slice(&[0xDE, 0xAD, 0xBE]);
        push_raw_chunk(&mut stream, b"payload");
        assert_eq!(frame_depress(&stream), b"payload");
    }
}

#[test]
fn unskippable_chunks_fail() {
    for flag in 0x02u8..=0x7F {
        let mut stream = STREAM_IDENTIFIER.to_vec();
        stream.push(flag);
        stream.extend_from_slice(&[1, 0, 0, 0xAA]);
        let err = frame_depress_err(&stream);
        assert_eq!(err, Error::UnsupportedChunk { flag });
    }
}

#[test]
fn stream_identifier_resynchronizes() {
    // Concatenating two framed streams puts an identifier chunk in the
    // middle; the decoder must treat it as a marker, not an error.
    let mut stream = frame_press(b"hello ");
    stream.extend_from_slice(&frame_press(b"world"));
    assert_eq!(frame_depress(&stream), b"hello world");
}

#[test]
fn data_chunk_needs_room_for_its_checksum() {
    let mut stream = STREAM_IDENTIFIER.to_vec();
    stream.push(0x00);
    stream.extend_from_slice(&[4, 0, 0]);
    stream.extend_from_slice(&[0, 0, 0, 0]);
    let err = frame_depress_err(&stream);
    assert_eq!(err, Error::InvalidChunkLength { flag: 0x00, len: 4 });
}

#[test]
fn stream_identifier_chunk_needs_exact_length() {
    let mut stream = STREAM_IDENTIFIER.to_vec();
    push_raw_chunk(&mut stream, b"data");
    // A second identifier chunk claiming seven payload bytes.
    stream.extend_from_slice(&[0xFF, 7, 0, 0]);
    stream.extend_from_slice(b"sNaPpY!");
    let mut rdr = FrameDecoder::new(&stream[..]).unwrap();
    let mut buf = [0; 4];
    rdr.read_exact(&mut buf).unwrap();
    let err = rdr.read(&mut buf).unwrap_err();
    assert_eq!(
        unwrap_lib_err(err),
        Error::InvalidChunkLength { flag: 0xFF, len: 7 }
    );
}

#[test]
fn corrupt_checksum_detected_when_verifying() {
    let data = b"checksummed bytes that are long enough to matter";
    let mut stream = frame_press(data);
    // Flip a bit in the stored checksum of the first data chunk.
    stream[14] ^= 0x01;
    let err = frame_depress_err(&stream);
    match err {
        Error::CorruptChecksum { .. } => {}
        other => panic!("expected CorruptChecksum, got {:?}", other),
    }
    // With verification off the bytes come through unchanged.
    let mut rdr = FrameDecoder::with_options(&stream[..], false).unwrap();
    let mut buf = Vec::new();
    rdr.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, data);
}

#[test]
fn legacy_corrupt_checksum() {
    let data = b"legacy checksummed bytes, long enough to compress";
    let mut stream = legacy_press(data);
    stream[10] ^= 0x01;
    let mut rdr = LegacyDecoder::new(&stream[..]).unwrap();
    let mut buf = Vec::new();
    let err = rdr.read_to_end(&mut buf).unwrap_err();
    match unwrap_lib_err(err) {
        Error::CorruptChecksum { .. } => {}
        other => panic!("expected CorruptChecksum, got {:?}", other),
    }
    let mut rdr = LegacyDecoder::with_options(&stream[..], false).unwrap();
    let mut buf = Vec::new();
    rdr.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, data);
}

#[test]
fn legacy_streams_concatenate() {
    let mut stream = legacy_press(b"front ");
    stream.extend_from_slice(&legacy_press(b"back"));
    assert_eq!(legacy_depress(&stream), b"front back");
}

#[test]
fn legacy_unknown_flag_fails() {
    let mut stream = LEGACY_STREAM_IDENTIFIER.to_vec();
    stream.extend_from_slice(&[0x02, 0x00, 0x01, 0, 0, 0, 0, 0xAA]);
    let mut rdr = LegacyDecoder::new(&stream[..]).unwrap();
    let mut buf = Vec::new();
    let err = rdr.read_to_end(&mut buf).unwrap_err();
    assert_eq!(unwrap_lib_err(err), Error::UnsupportedChunk { flag: 0x02 });
}

#[test]
fn bad_stream_headers_are_rejected() {
    let err = FrameDecoder::new(&b"not snappy at all"[..]).unwrap_err();
    match unwrap_lib_err(err) {
        Error::InvalidStreamHeader { .. } => {}
        other => panic!("expected InvalidStreamHeader, got {:?}", other),
    }
    let err = LegacyDecoder::new(&b"znappy\x00"[..]).unwrap_err();
    match unwrap_lib_err(err) {
        Error::InvalidStreamHeader { .. } => {}
        other => panic!("expected InvalidStreamHeader, got {:?}", other),
    }
}

#[test]
fn short_stream_headers_are_eof() {
    let err = FrameDecoder::new(&STREAM_IDENTIFIER[..5]).unwrap_err();
    assert_eq!(unwrap_lib_err(err), Error::UnexpectedEof);
    let err = FrameDecoder::new(&b""[..]).unwrap_err();
    assert_eq!(unwrap_lib_err(err), Error::UnexpectedEof);
}

#[test]
fn truncated_chunk_is_eof() {
    let stream = frame_press(b"about to be cut short");
    // Cut inside the first data chunk's payload.
    let cut = &stream[..stream.len() - 3];
    let err = frame_depress_err(cut);
    assert_eq!(err, Error::UnexpectedEof);
    // Cut inside a chunk header.
    let cut = &stream[..12];
    let err = frame_depress_err(cut);
    assert_eq!(err, Error::UnexpectedEof);
}

#[test]
fn detection_picks_the_right_format() {
    let data = b"bytes that went through format detection";

    let stream = frame_press(data);
    let mut rdr = AnyDecoder::new(&stream[..]).unwrap();
    assert_eq!(rdr.format(), StreamFormat::Framed);
    let mut buf = Vec::new();
    rdr.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, data);

    let stream = legacy_press(data);
    let mut rdr = AnyDecoder::new(&stream[..]).unwrap();
    assert_eq!(rdr.format(), StreamFormat::Legacy);
    let mut buf = Vec::new();
    rdr.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, data);
}

#[test]
fn detection_rejects_unknown_leading_bytes() {
    let err = AnyDecoder::new(&b"\x1f\x8b gzip, not snappy"[..]).unwrap_err();
    assert_eq!(
        unwrap_lib_err(err),
        Error::InvalidStreamHeader { bytes: vec![0x1F] }
    );
    let err = AnyDecoder::new(&b""[..]).unwrap_err();
    assert_eq!(unwrap_lib_err(err), Error::UnexpectedEof);
}

#[test]
fn writer_close_is_idempotent() {
    let mut wtr = FrameEncoder::new(Vec::new()).unwrap();
    wtr.write_all(b"some bytes").unwrap();
    wtr.close().unwrap();
    wtr.close().unwrap();
    let err = wtr.write(b"more").unwrap_err();
    assert_eq!(unwrap_lib_err(err), Error::Closed);

    let mut wtr = LegacyEncoder::new(Vec::new()).unwrap();
    wtr.close().unwrap();
    wtr.close().unwrap();
    let err = wtr.write(b"more").unwrap_err();
    assert_eq!(unwrap_lib_err(err), Error::Closed);
}

#[test]
fn reader_close_is_idempotent() {
    let stream = frame_press(b"reader close test");
    let mut rdr = FrameDecoder::new(&stream[..]).unwrap();
    let mut buf = [0; 6];
    rdr.read_exact(&mut buf).unwrap();
    rdr.close();
    rdr.close();
    assert_eq!(rdr.read(&mut buf).unwrap(), 0);

    let stream = legacy_press(b"reader close test");
    let mut rdr = LegacyDecoder::new(&stream[..]).unwrap();
    rdr.close();
    rdr.close();
    assert_eq!(rdr.read(&mut buf).unwrap(), 0);
}

#[test]
fn available_tracks_the_current_chunk() {
    let stream = frame_press(b"abcdefgh");
    let mut rdr = FrameDecoder::new(&stream[..]).unwrap();
    assert_eq!(rdr.available(), 0);
    let mut buf = [0; 3];
    rdr.read_exact(&mut buf).unwrap();
    assert_eq!(rdr.available(), 5);
    let mut rest = Vec::new();
    rdr.read_to_end(&mut rest).unwrap();
    assert_eq!(rdr.available(), 0);
}

#[test]
fn writer_options_are_validated() {
    for &(block_size, ratio) in &[
        (0usize, 0.85),
        (65537, 0.85),
        (65536, 0.0),
        (65536, 1.5),
        (65536, std::f64::NAN),
    ] {
        let err = FrameEncoder::with_options(Vec::new(), block_size, ratio)
            .err()
            .expect("constructor must reject bad options");
        match unwrap_lib_err(err) {
            Error::InvalidArgument { .. } => {}
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
    }
}

#[test]
fn small_block_sizes_roundtrip() {
    let data = sample_text(10_000);
    for &block_size in &[1usize, 2, 7, 64, 333, 65536] {
        let mut wtr =
            FrameEncoder::with_options(Vec::new(), block_size, 0.85).unwrap();
        wtr.write_all(&data).unwrap();
        wtr.close().unwrap();
        let out = wtr.into_inner().unwrap();
        assert_eq!(frame_depress(&out), data, "block_size {}", block_size);
    }
}

#[test]
fn ratio_one_always_prefers_compression() {
    // With a min ratio of 1.0, a block is stored compressed whenever the
    // compressed form is no larger.
    let data = vec![b'q'; 4096];
    let mut wtr = FrameEncoder::with_options(Vec::new(), 65536, 1.0).unwrap();
    wtr.write_all(&data).unwrap();
    wtr.close().unwrap();
    let out = wtr.into_inner().unwrap();
    assert_eq!(out[10], 0x00);
    assert_eq!(frame_depress(&out), data);
}

#[test]
fn streams_work_with_a_noop_pool() {
    let pool = Arc::new(NoopPool::new());
    let data = sample_text(50_000);

    let mut wtr =
        FrameEncoder::with_pool(Vec::new(), 65536, 0.85, pool.clone())
            .unwrap();
    wtr.write_all(&data).unwrap();
    wtr.close().unwrap();
    let out = wtr.into_inner().unwrap();

    let mut rdr =
        FrameDecoder::with_pool(&out[..], true, pool.clone()).unwrap();
    let mut buf = Vec::new();
    rdr.read_to_end(&mut buf).unwrap();
    rdr.close();
    assert_eq!(buf, data);
}

#[test]
fn write_segmentation_does_not_change_the_payload() {
    let data = sample_text(40_000);
    let mut wtr = FrameEncoder::new(Vec::new()).unwrap();
    for piece in data.chunks(997) {
        wtr.write_all(piece).unwrap();
    }
    wtr.close().unwrap();
    let out = wtr.into_inner().unwrap();
    assert_eq!(frame_depress(&out), data);
}

// quickcheck properties. The sizes are big enough to cross block
// boundaries now and then.

#[test]
fn qc_roundtrip_raw() {
    fn p(bytes: Vec<u8>) -> bool {
        depress(&press(&bytes)) == bytes
    }
    QuickCheck::new()
        .gen(StdGen::new(::rand::thread_rng(), 10_000))
        .tests(1_000)
        .quickcheck(p as fn(_) -> _);
}

#[test]
fn qc_roundtrip_frame() {
    fn p(bytes: Vec<u8>) -> bool {
        frame_depress(&frame_press(&bytes)) == bytes
    }
    QuickCheck::new()
        .gen(StdGen::new(::rand::thread_rng(), 10_000))
        .tests(500)
        .quickcheck(p as fn(_) -> _);
}

#[test]
fn qc_roundtrip_legacy() {
    fn p(bytes: Vec<u8>) -> bool {
        legacy_depress(&legacy_press(&bytes)) == bytes
    }
    QuickCheck::new()
        .gen(StdGen::new(::rand::thread_rng(), 10_000))
        .tests(500)
        .quickcheck(p as fn(_) -> _);
}

#[test]
fn qc_roundtrip_frame_any_options() {
    fn p(bytes: Vec<u8>, block_size: u16, ratio_pct: u8, seg: u16) -> TestResult {
        let block_size = block_size as usize + 1;
        let ratio = ((ratio_pct % 100) as f64 + 1.0) / 100.0;
        let seg = seg as usize + 1;
        let mut wtr =
            match FrameEncoder::with_options(Vec::new(), block_size, ratio) {
                Ok(wtr) => wtr,
                Err(_) => return TestResult::discard(),
            };
        for piece in bytes.chunks(seg) {
            wtr.write_all(piece).unwrap();
        }
        wtr.close().unwrap();
        let out = wtr.into_inner().unwrap();
        TestResult::from_bool(frame_depress(&out) == bytes)
    }
    QuickCheck::new()
        .gen(StdGen::new(::rand::thread_rng(), 5_000))
        .tests(200)
        .quickcheck(p as fn(_, _, _, _) -> _);
}

#[test]
fn qc_decompress_arbitrary_input_never_misbehaves() {
    // Arbitrary bytes may declare any length at all, so decompress into a
    // fixed buffer: the result is exactly the declared length, or a
    // corruption error, or a buffer-too-small refusal. Nothing else.
    fn p(bytes: Vec<u8>) -> bool {
        let mut buf = vec![0; 1 << 16];
        match Decoder::new().decompress(&bytes, &mut buf) {
            Ok(n) => n == decompress_len(&bytes).unwrap(),
            Err(Error::Corruption { .. }) => true,
            Err(Error::BufferTooSmall { .. }) => true,
            Err(err) => panic!("unexpected error kind: {:?}", err),
        }
    }
    QuickCheck::new()
        .gen(StdGen::new(::rand::thread_rng(), 2_000))
        .tests(2_000)
        .quickcheck(p as fn(_) -> _);
}

#[test]
fn qc_decompress_mutated_compressions_never_misbehave() {
    fn p(bytes: Vec<u8>, pos: usize, xor: u8) -> TestResult {
        if bytes.is_empty() || xor == 0 {
            return TestResult::discard();
        }
        let mut compressed = press(&bytes);
        let pos = pos % compressed.len();
        compressed[pos] ^= xor;
        let mut buf = vec![0; 1 << 16];
        match Decoder::new().decompress(&compressed, &mut buf) {
            // A mutation may happen to produce a different valid block; it
            // must still decode to exactly the declared length.
            Ok(n) => TestResult::from_bool(
                n == decompress_len(&compressed).unwrap(),
            ),
            Err(Error::Corruption { .. })
            | Err(Error::BufferTooSmall { .. }) => TestResult::passed(),
            Err(err) => panic!("unexpected error kind: {:?}", err),
        }
    }
    QuickCheck::new()
        .gen(StdGen::new(::rand::thread_rng(), 5_000))
        .tests(1_000)
        .quickcheck(p as fn(_, _, _) -> _);
}

// Test helpers.

fn press(bytes: &[u8]) -> Vec<u8> {
    Encoder::new().compress_vec(bytes).unwrap()
}

fn depress(bytes: &[u8]) -> Vec<u8> {
    Decoder::new().decompress_vec(bytes).unwrap()
}

fn frame_press(bytes: &[u8]) -> Vec<u8> {
    let mut wtr = FrameEncoder::new(Vec::new()).unwrap();
    wtr.write_all(bytes).unwrap();
    wtr.close().unwrap();
    wtr.into_inner().unwrap()
}

fn frame_depress(bytes: &[u8]) -> Vec<u8> {
    let mut rdr = FrameDecoder::new(bytes).unwrap();
    let mut buf = Vec::new();
    rdr.read_to_end(&mut buf).unwrap();
    buf
}

fn frame_depress_err(bytes: &[u8]) -> Error {
    let mut rdr = FrameDecoder::new(bytes).unwrap();
    let mut buf = Vec::new();
    unwrap_lib_err(rdr.read_to_end(&mut buf).unwrap_err())
}

fn legacy_press(bytes: &[u8]) -> Vec<u8> {
    let mut wtr = LegacyEncoder::new(Vec::new()).unwrap();
    wtr.write_all(bytes).unwrap();
    wtr.close().unwrap();
    wtr.into_inner().unwrap()
}

fn legacy_depress(bytes: &[u8]) -> Vec<u8> {
    let mut rdr = LegacyDecoder::new(bytes).unwrap();
    let mut buf = Vec::new();
    rdr.read_to_end(&mut buf).unwrap();
    buf
}

/// Appends an uncompressed data chunk holding `payload` to a framed stream.
fn push_raw_chunk(stream: &mut Vec<u8>, payload: &[u8]) {
    let len = payload.len() + 4;
    stream.push(0x01);
    stream.push(len as u8);
    stream.push((len >> 8) as u8);
    stream.push((len >> 16) as u8);
    stream.extend_from_slice(&crc32c_masked(payload).to_le_bytes());
    stream.extend_from_slice(payload);
}

fn unwrap_lib_err(err: io::Error) -> Error {
    *err.into_inner()
        .expect("expected a library error, not a bare io error")
        .downcast::<Error>()
        .unwrap()
}

fn random_bytes(n: usize) -> Vec<u8> {
    use rand::Rng;
    let mut buf = vec![0; n];
    ::rand::thread_rng().fill(&mut buf[..]);
    buf
}

/// Repeats a sentence until the buffer reaches `n` bytes; compressible the
/// way real text is.
fn sample_text(n: usize) -> Vec<u8> {
    let sentence = b"The quick brown fox jumps over the lazy dog, \
                     while the slow red fox naps in the sun. ";
    let mut buf = Vec::with_capacity(n + sentence.len());
    while buf.len() < n {
        buf.extend_from_slice(sentence);
    }
    buf.truncate(n);
    buf
}
