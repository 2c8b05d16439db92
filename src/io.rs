// File-level I/O helpers for xz decoding.
//
// Provides `decode_reader()` and `decode_file()` convenience functions that
// push a byte stream through a `DecodeSession` in fixed-size chunks, the same
// way a transport would. Optionally computes a streaming SHA-256 of the
// output (feature-gated behind `file-io`).

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::config::DecoderConfig;
use crate::error::Error;
use crate::session::{DecodeSession, SessionState};
use crate::sink::{EndStatus, RelaySink, WriteSink};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `decode_reader()` and `decode_file()`.
#[derive(Debug, Clone)]
pub struct DecodeStats {
    /// Compressed bytes read from the input.
    pub input_size: u64,
    /// Decompressed bytes written.
    pub output_size: u64,
    /// Chunks delivered to the session.
    pub chunks: u64,
    /// Relay calls made by the session.
    pub relays: u64,
    /// Input bytes ignored after the end of the xz stream.
    pub bytes_discarded: u64,
    /// CRC-64 of the output.
    pub crc64: u64,
    /// SHA-256 of the output (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// I/O error (file open, read, write).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Decoding error.
    #[error("decode error: {0}")]
    Decode(#[from] Error),
}

// ---------------------------------------------------------------------------
// Default buffer size
// ---------------------------------------------------------------------------

/// Default chunk size used to feed the session.
pub const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// decode_reader
// ---------------------------------------------------------------------------

/// Decode an xz stream read from `reader`, writing the output to `writer`.
///
/// The input is delivered in chunks of `chunk_size` bytes (the last one may
/// be shorter). A `chunk_size` of zero fails with [`Error::Malformed`].
/// Returns the stats and the writer, flushed.
pub fn decode_reader<R: Read, W: Write>(
    mut reader: R,
    writer: W,
    chunk_size: usize,
    config: &DecoderConfig,
) -> Result<(DecodeStats, W), IoError> {
    let mut session = DecodeSession::new(config, OutputSink::new(writer))?;
    session.notify_start()?;

    let mut offset = 0u64;
    loop {
        match session.deliver_from(offset, &mut reader, chunk_size) {
            Ok(0) => break,
            Ok(n) => offset += n as u64,
            Err(e) => {
                if let Err(end) = session.notify_end(EndStatus::Failed) {
                    log::warn!("sink failed while closing a failed decode: {end}");
                }
                return Err(e.into());
            }
        }
    }

    if session.state() != SessionState::Ended {
        session.notify_end(EndStatus::Failed)?;
        return Err(Error::ContentEncoding(format!(
            "compressed stream is truncated after {offset} bytes"
        ))
        .into());
    }
    session.notify_end(EndStatus::Complete)?;

    let stats = session.stats();
    let (writer, output_sha256) = session.finish()?.finish();

    Ok((
        DecodeStats {
            input_size: offset,
            output_size: stats.bytes_out,
            chunks: stats.chunks,
            relays: stats.relays,
            bytes_discarded: stats.bytes_discarded,
            crc64: stats.crc64,
            output_sha256,
        },
        writer,
    ))
}

// ---------------------------------------------------------------------------
// decode_file
// ---------------------------------------------------------------------------

/// Decode an `.xz` file, writing the output to `output_path`.
///
/// The input is streamed in chunks of `chunk_size` bytes. The output uses
/// `BufWriter`.
///
/// When the `file-io` feature is enabled, a SHA-256 checksum of the output
/// is computed incrementally.
pub fn decode_file(
    input_path: &Path,
    output_path: &Path,
    chunk_size: usize,
    config: &DecoderConfig,
) -> Result<DecodeStats, IoError> {
    let input = File::open(input_path)?;
    let output = File::create(output_path)?;
    let writer = BufWriter::with_capacity(BUF_SIZE, output);

    let (stats, writer) = decode_reader(input, writer, chunk_size, config)?;
    writer.into_inner().map_err(|e| e.into_error())?;
    Ok(stats)
}

// ---------------------------------------------------------------------------
// Output sink (hashes when file-io is enabled)
// ---------------------------------------------------------------------------

struct OutputSink<W: Write> {
    inner: WriteSink<W>,
    #[cfg(feature = "file-io")]
    hasher: sha2::Sha256,
}

impl<W: Write> OutputSink<W> {
    fn new(writer: W) -> Self {
        Self {
            inner: WriteSink::new(writer),
            #[cfg(feature = "file-io")]
            hasher: sha2::Sha256::new(),
        }
    }

    fn finish(self) -> (W, Option<[u8; 32]>) {
        #[cfg(feature = "file-io")]
        let digest = Some(self.hasher.finalize().into());
        #[cfg(not(feature = "file-io"))]
        let digest: Option<[u8; 32]> = None;
        (self.inner.into_inner(), digest)
    }
}

impl<W: Write> RelaySink for OutputSink<W> {
    fn relay(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        self.inner.relay(offset, bytes)?;
        #[cfg(feature = "file-io")]
        self.hasher.update(bytes);
        Ok(())
    }

    fn on_end(&mut self, status: EndStatus) -> io::Result<()> {
        self.inner.on_end(status)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn sample() -> Vec<u8> {
        b"The quick brown fox jumps over the lazy dog. 1234567890\n".repeat(2_000)
    }

    #[test]
    fn decode_reader_roundtrip() {
        let data = sample();
        let compressed = compress(&data);
        for chunk in [1usize, 100, 4096, BUF_SIZE] {
            let (stats, out) = decode_reader(
                &compressed[..],
                Vec::new(),
                chunk,
                &DecoderConfig::default(),
            )
            .unwrap();
            assert_eq!(out, data, "chunk size {chunk}");
            assert_eq!(stats.input_size, compressed.len() as u64);
            assert_eq!(stats.output_size, data.len() as u64);
            assert_eq!(stats.chunks, compressed.len().div_ceil(chunk) as u64);
            assert_eq!(stats.crc64, crate::integrity::crc64(&data));
            assert_eq!(stats.bytes_discarded, 0);
        }
    }

    #[test]
    fn trailing_bytes_are_counted_not_written() {
        let data = sample();
        let mut compressed = compress(&data);
        let stream_len = compressed.len() as u64;
        compressed.extend_from_slice(&[0u8; 100]);
        let (stats, out) =
            decode_reader(&compressed[..], Vec::new(), 512, &DecoderConfig::default()).unwrap();
        assert_eq!(out, data);
        assert_eq!(stats.input_size, stream_len + 100);
        assert_eq!(stats.bytes_discarded, 100);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let compressed = compress(&sample());
        let cut = &compressed[..compressed.len() / 2];
        let err = decode_reader(cut, Vec::new(), 1024, &DecoderConfig::default()).unwrap_err();
        assert!(
            matches!(err, IoError::Decode(Error::ContentEncoding(_))),
            "{err:?}"
        );
    }

    #[test]
    fn decode_error_wins_over_failing_flush() {
        #[derive(Debug)]
        struct FlushFails;
        impl Write for FlushFails {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Err(io::Error::other("flush refused"))
            }
        }

        let err = decode_reader(
            &b"plainly not an xz stream"[..],
            FlushFails,
            1024,
            &DecoderConfig::default(),
        )
        .unwrap_err();
        assert!(
            matches!(err, IoError::Decode(Error::ContentEncoding(_))),
            "{err:?}"
        );
    }

    #[test]
    fn empty_input_is_truncated() {
        let err =
            decode_reader(&b""[..], Vec::new(), 1024, &DecoderConfig::default()).unwrap_err();
        assert!(matches!(err, IoError::Decode(Error::ContentEncoding(_))));
    }

    #[test]
    fn zero_chunk_size_is_malformed() {
        let compressed = compress(b"x");
        let err =
            decode_reader(&compressed[..], Vec::new(), 0, &DecoderConfig::default()).unwrap_err();
        assert!(matches!(err, IoError::Decode(Error::Malformed)));
    }

    #[test]
    fn disabled_config_is_rejected() {
        let cfg = DecoderConfig {
            enabled: false,
            ..Default::default()
        };
        let err = decode_reader(&b"anything"[..], Vec::new(), 16, &cfg).unwrap_err();
        assert!(matches!(err, IoError::Decode(Error::Disabled)));
    }

    #[test]
    fn decode_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("body.xz");
        let output = dir.path().join("body.txt");
        let data = sample();
        std::fs::write(&input, compress(&data)).unwrap();

        let stats = decode_file(&input, &output, BUF_SIZE, &DecoderConfig::default()).unwrap();
        assert_eq!(stats.output_size, data.len() as u64);
        assert_eq!(std::fs::read(&output).unwrap(), data);
    }

    #[test]
    fn missing_input_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = decode_file(
            &dir.path().join("missing.xz"),
            &dir.path().join("out"),
            BUF_SIZE,
            &DecoderConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, IoError::Io(_)));
    }

    #[cfg(feature = "file-io")]
    #[test]
    fn sha256_of_output_computed() {
        let data = sample();
        let compressed = compress(&data);
        let (stats, _) =
            decode_reader(&compressed[..], Vec::new(), 777, &DecoderConfig::default()).unwrap();
        let expected: [u8; 32] = sha2::Sha256::digest(&data).into();
        assert_eq!(stats.output_sha256, Some(expected));
    }
}
