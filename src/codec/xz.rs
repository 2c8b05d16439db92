// xz decoding via liblzma (`xz2`).
//
// `XzDecoder` adapts `xz2::stream::Stream` to the bounded-decompressor
// contract: byte counts come from the difference in `total_in`/`total_out`
// around each `process` call, and liblzma return codes are folded into
// `Outcome` / `CodecError`.
//
// Also provides a stream header probe used by the CLI.

use xz2::stream::{Action, Error as LzmaError, Status, Stream};

use super::{BoundedDecompressor, CodecError, DecoderFactory, Outcome, Run};
use crate::config::DecoderFlags;
use crate::integrity;

/// Creates liblzma stream decoders with a fixed set of flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct XzFactory {
    flags: DecoderFlags,
}

impl XzFactory {
    pub fn new(flags: DecoderFlags) -> Self {
        Self { flags }
    }

    pub fn flags(&self) -> DecoderFlags {
        self.flags
    }
}

impl DecoderFactory for XzFactory {
    type Decoder = XzDecoder;

    fn create(&self, memory_limit: u64) -> Result<XzDecoder, CodecError> {
        let stream = Stream::new_stream_decoder(memory_limit, self.flags.bits())
            .map_err(|e| CodecError::OutOfMemory(format!("xz decoder init failed: {e}")))?;
        log::trace!(
            "created xz decoder (memlimit={memory_limit}, flags={:?})",
            self.flags
        );
        Ok(XzDecoder {
            stream,
            memory_limit,
        })
    }
}

/// A single liblzma `.xz` stream decoder.
pub struct XzDecoder {
    stream: Stream,
    memory_limit: u64,
}

impl XzDecoder {
    /// Total compressed bytes consumed so far.
    pub fn total_in(&self) -> u64 {
        self.stream.total_in()
    }

    /// Total decompressed bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.stream.total_out()
    }
}

impl BoundedDecompressor for XzDecoder {
    fn run(&mut self, input: &[u8], output: &mut [u8]) -> Result<Run, CodecError> {
        let before_in = self.stream.total_in();
        let before_out = self.stream.total_out();

        let result = self.stream.process(input, output, Action::Run);

        let consumed = (self.stream.total_in() - before_in) as usize;
        let produced = (self.stream.total_out() - before_out) as usize;

        let outcome = match result {
            Ok(Status::StreamEnd) => Outcome::StreamEnd,
            Ok(Status::Ok | Status::GetCheck) => fill_outcome(produced, output.len()),
            // LZMA_BUF_ERROR: two calls in a row made no progress.
            Ok(Status::MemNeeded) => {
                if !input.is_empty() && !output.is_empty() {
                    return Err(CodecError::Corrupt("decoder made no progress".into()));
                }
                Outcome::NeedInput
            }
            Err(LzmaError::UnsupportedCheck | LzmaError::NoCheck) => Outcome::CheckAdvisory,
            Err(LzmaError::MemLimit) => {
                return Err(CodecError::MemLimit(format!(
                    "stream needs more than {} bytes of dictionary memory",
                    self.memory_limit
                )));
            }
            Err(LzmaError::Mem) => {
                return Err(CodecError::OutOfMemory("liblzma allocation failed".into()));
            }
            Err(LzmaError::Options) => {
                return Err(CodecError::Unsupported("unsupported xz filter options".into()));
            }
            Err(LzmaError::Program) => {
                return Err(CodecError::Program("liblzma reported a programming error".into()));
            }
            Err(other) => return Err(CodecError::Corrupt(other.to_string())),
        };

        Ok(Run {
            consumed,
            produced,
            outcome,
        })
    }
}

fn fill_outcome(produced: usize, capacity: usize) -> Outcome {
    if produced == capacity && capacity > 0 {
        Outcome::OutputReady
    } else {
        Outcome::NeedInput
    }
}

// ---------------------------------------------------------------------------
// Stream header probe
// ---------------------------------------------------------------------------

/// Magic bytes opening every `.xz` stream.
pub const STREAM_MAGIC: [u8; 6] = [0xFD, b'7', b'z', b'X', b'Z', 0x00];

/// Size of the `.xz` stream header.
pub const STREAM_HEADER_LEN: usize = 12;

/// Integrity check declared in a stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    None,
    Crc32,
    Crc64,
    Sha256,
    /// An ID the format reserves but does not define.
    Reserved(u8),
}

impl CheckKind {
    fn from_id(id: u8) -> Self {
        match id {
            0x00 => Self::None,
            0x01 => Self::Crc32,
            0x04 => Self::Crc64,
            0x0A => Self::Sha256,
            other => Self::Reserved(other),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::Crc32 => 0x01,
            Self::Crc64 => 0x04,
            Self::Sha256 => 0x0A,
            Self::Reserved(id) => *id,
        }
    }

    /// Size of the check field stored after each block.
    pub fn size(&self) -> usize {
        match self.id() {
            0 => 0,
            id => 4usize << ((id - 1) / 3),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Crc32 => "CRC32",
            Self::Crc64 => "CRC64",
            Self::Sha256 => "SHA-256",
            Self::Reserved(_) => "Unknown",
        }
    }
}

/// Stream header validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("stream header truncated: {0} of 12 bytes")]
    Truncated(usize),
    #[error("not an xz stream (bad magic)")]
    BadMagic,
    #[error("reserved stream flag bits set: {0:#04x} {1:#04x}")]
    ReservedFlags(u8, u8),
    #[error("stream flags CRC32 mismatch: expected {expected:#010X}, got {actual:#010X}")]
    CrcMismatch { expected: u32, actual: u32 },
}

/// Decoded `.xz` stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub check: CheckKind,
}

impl StreamHeader {
    /// Parse and validate the first 12 bytes of a stream.
    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < STREAM_HEADER_LEN {
            return Err(HeaderError::Truncated(bytes.len()));
        }
        if bytes[..6] != STREAM_MAGIC {
            return Err(HeaderError::BadMagic);
        }
        let flags = &bytes[6..8];
        let expected = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let actual = integrity::crc32(flags);
        if expected != actual {
            return Err(HeaderError::CrcMismatch { expected, actual });
        }
        if flags[0] != 0 || flags[1] & 0xF0 != 0 {
            return Err(HeaderError::ReservedFlags(flags[0], flags[1]));
        }
        Ok(Self {
            check: CheckKind::from_id(flags[1]),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn decoder() -> XzDecoder {
        XzFactory::default().create(32 * 1024 * 1024).unwrap()
    }

    #[test]
    fn decodes_whole_stream_in_one_call() {
        let data = b"hello xz hello xz hello xz".repeat(10);
        let compressed = compress(&data);
        let mut dec = decoder();
        let mut out = vec![0u8; 4096];
        let run = dec.run(&compressed, &mut out).unwrap();
        assert_eq!(run.outcome, Outcome::StreamEnd);
        assert_eq!(run.consumed, compressed.len());
        assert_eq!(&out[..run.produced], &data[..]);
        assert_eq!(dec.total_out(), data.len() as u64);
    }

    #[test]
    fn small_output_buffer_reports_output_ready() {
        let data = vec![b'A'; 100_000];
        let compressed = compress(&data);
        let mut dec = decoder();
        let mut out = vec![0u8; 1024];
        let run = dec.run(&compressed, &mut out).unwrap();
        assert_eq!(run.outcome, Outcome::OutputReady);
        assert_eq!(run.produced, 1024);
        assert!(run.consumed < compressed.len());
    }

    #[test]
    fn garbage_is_corrupt() {
        let mut dec = decoder();
        let mut out = vec![0u8; 64];
        let err = dec.run(b"definitely not xz data", &mut out).unwrap_err();
        assert!(matches!(err, CodecError::Corrupt(_)), "{err:?}");
    }

    #[test]
    fn tiny_memory_limit_is_reported() {
        let compressed = compress(&vec![7u8; 10_000]);
        let mut dec = XzFactory::default().create(1024).unwrap();
        let mut out = vec![0u8; 64 * 1024];
        let err = dec.run(&compressed, &mut out).unwrap_err();
        assert!(matches!(err, CodecError::MemLimit(_)), "{err:?}");
    }

    #[test]
    fn parses_crc64_header() {
        let compressed = compress(b"abc");
        let hdr = StreamHeader::parse(&compressed).unwrap();
        assert_eq!(hdr.check, CheckKind::Crc64);
        assert_eq!(hdr.check.size(), 8);
        assert_eq!(hdr.check.name(), "CRC64");
    }

    #[test]
    fn header_rejects_bad_input() {
        assert_eq!(StreamHeader::parse(&[0xFD, b'7']), Err(HeaderError::Truncated(2)));
        assert_eq!(
            StreamHeader::parse(b"PK\x03\x04xxxxxxxx"),
            Err(HeaderError::BadMagic)
        );

        let mut hdr = compress(b"abc")[..STREAM_HEADER_LEN].to_vec();
        hdr[7] = 0x01;
        assert!(matches!(
            StreamHeader::parse(&hdr),
            Err(HeaderError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn check_sizes() {
        assert_eq!(CheckKind::None.size(), 0);
        assert_eq!(CheckKind::Crc32.size(), 4);
        assert_eq!(CheckKind::Crc64.size(), 8);
        assert_eq!(CheckKind::Sha256.size(), 32);
        assert_eq!(CheckKind::Reserved(0x0F).size(), 64);
    }
}
