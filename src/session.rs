// Per-body decode session.
//
// DecodeSession is pushed compressed chunks by the transport and relays
// decompressed output downstream from inside the same call:
//   - Chunk is staged into the input buffer (sized by StagingBuffers)
//   - The decoder is run over the staged bytes until they are consumed, the
//     stream ends, or an error occurs
//   - Every decoder call that produced bytes is relayed before the next call
//
// The decoder handle lives inside `State::Active`, so it exists exactly while
// the session is active and is released on any transition out of it.

use std::io::{self, Read};

use crate::buffer::StagingBuffers;
use crate::codec::{BoundedDecompressor, DecoderFactory, Outcome, XzFactory};
use crate::config::DecoderConfig;
use crate::error::Error;
use crate::gate::{self, LifecycleGate};
use crate::sink::{EndStatus, Relay, RelaySink};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No chunk has been delivered yet.
    Uninitialized,
    /// A decoder is live and accepting input.
    Active,
    /// The decoder reported the end of the stream. Further input is discarded.
    Ended,
    /// An unrecoverable error occurred. Further deliveries are rejected.
    Failed,
}

enum State<D> {
    Uninitialized,
    Active(D),
    Ended,
    Failed,
}

impl<D> State<D> {
    fn public(&self) -> SessionState {
        match self {
            Self::Uninitialized => SessionState::Uninitialized,
            Self::Active(_) => SessionState::Active,
            Self::Ended => SessionState::Ended,
            Self::Failed => SessionState::Failed,
        }
    }
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Non-empty chunks accepted (including discarded trailing chunks).
    pub chunks: u64,
    /// Compressed bytes consumed by the decoder.
    pub bytes_in: u64,
    /// Compressed bytes discarded after the end of the stream.
    pub bytes_discarded: u64,
    /// Decompressed bytes relayed downstream.
    pub bytes_out: u64,
    /// Number of relay calls.
    pub relays: u64,
    /// CRC-64 of the relayed output.
    pub crc64: u64,
}

// ---------------------------------------------------------------------------
// DecodeSession
// ---------------------------------------------------------------------------

/// Streaming decoder for one compressed body.
///
/// # Example
/// ```no_run
/// use xzrelay::config::DecoderConfig;
/// use xzrelay::session::DecodeSession;
///
/// # let compressed: Vec<u8> = Vec::new();
/// let mut session = DecodeSession::new(&DecoderConfig::default(), Vec::new()).unwrap();
/// for (i, chunk) in compressed.chunks(4096).enumerate() {
///     session.deliver((i * 4096) as u64, chunk).unwrap();
/// }
/// let plain: Vec<u8> = session.finish().unwrap();
/// ```
pub struct DecodeSession<S, F: DecoderFactory = XzFactory> {
    state: State<F::Decoder>,
    factory: F,
    memory_limit: u64,
    buffers: StagingBuffers,
    relay: Relay<S>,
    chunks: u64,
    bytes_in: u64,
    bytes_discarded: u64,
}

impl<S: RelaySink> DecodeSession<S, XzFactory> {
    /// Create an xz session.
    ///
    /// Fails with [`Error::Disabled`] if the configuration does not permit
    /// decoding; nothing is allocated in that case.
    pub fn new(config: &DecoderConfig, sink: S) -> Result<Self, Error> {
        Self::with_factory(config, XzFactory::new(config.flags), sink)
    }
}

impl<S: RelaySink, F: DecoderFactory> DecodeSession<S, F> {
    /// Create a session that obtains its decoder from `factory`.
    pub fn with_factory(config: &DecoderConfig, factory: F, sink: S) -> Result<Self, Error> {
        if !LifecycleGate::new(config).permit() {
            log::debug!("xz decoding disabled; refusing session");
            return Err(Error::Disabled);
        }
        Ok(Self {
            state: State::Uninitialized,
            factory,
            memory_limit: config.memory_limit_bytes(),
            buffers: StagingBuffers::new(),
            relay: Relay::new(sink),
            chunks: 0,
            bytes_in: 0,
            bytes_discarded: 0,
        })
    }

    /// Forward the start of the transfer to the sink.
    pub fn notify_start(&mut self) -> Result<(), Error> {
        self.relay.start().map_err(Error::Relay)
    }

    /// Forward the end of the transfer to the sink, releasing the decoder if
    /// the stream never reached its end.
    pub fn notify_end(&mut self, status: EndStatus) -> Result<(), Error> {
        if matches!(self.state, State::Active(_)) && status == EndStatus::Complete {
            log::warn!(
                "transfer completed before the end of the xz stream ({} bytes decoded)",
                self.relay.stats().bytes
            );
        }
        self.abort();
        self.relay.end(status).map_err(Error::Relay)
    }

    /// Release the decoder if one is live. Safe to call any number of times.
    pub fn abort(&mut self) {
        if matches!(self.state, State::Active(_)) {
            log::debug!("releasing xz decoder before end of stream");
            self.state = State::Failed;
        }
    }

    /// Decode one chunk of compressed bytes.
    ///
    /// `offset` is the upstream position of the chunk; it is passed through
    /// to the sink with every run of output this chunk produces.
    pub fn deliver(&mut self, offset: u64, chunk: &[u8]) -> Result<(), Error> {
        let live = self.accept(chunk.len())?;
        self.chunks += 1;
        if !live {
            self.bytes_discarded += chunk.len() as u64;
            return Ok(());
        }
        self.prepare(chunk.len())?;
        self.buffers.stage_input(chunk);
        self.decode_staged(offset, chunk.len())
    }

    /// Read up to `count` bytes from `reader` and decode them.
    ///
    /// A short read decodes whatever was read. Returns the number of bytes
    /// taken from `reader`; zero means the reader is exhausted.
    pub fn deliver_from<R: Read + ?Sized>(
        &mut self,
        offset: u64,
        reader: &mut R,
        count: usize,
    ) -> Result<usize, Error> {
        if !self.accept(count)? {
            let discarded = io::copy(&mut (&mut *reader).take(count as u64), &mut io::sink())?;
            if discarded > 0 {
                self.chunks += 1;
                self.bytes_discarded += discarded;
            }
            return Ok(discarded as usize);
        }
        self.prepare(count)?;
        let filled = match read_up_to(reader, &mut self.buffers.input_mut()[..count]) {
            Ok(n) => n,
            Err(e) => return self.fail(Error::Io(e)),
        };
        if filled > 0 {
            self.chunks += 1;
            self.decode_staged(offset, filled)?;
        }
        Ok(filled)
    }

    /// Consume the session once the stream has ended, returning the sink.
    ///
    /// Fails if the stream is incomplete or the session failed.
    pub fn finish(self) -> Result<S, Error> {
        match self.state {
            State::Ended => Ok(self.relay.into_sink()),
            State::Failed => Err(Error::Internal("session failed".into())),
            State::Uninitialized | State::Active(_) => Err(Error::ContentEncoding(
                "compressed stream is truncated".into(),
            )),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.public()
    }

    pub fn stats(&self) -> SessionStats {
        let relay = self.relay.stats();
        SessionStats {
            chunks: self.chunks,
            bytes_in: self.bytes_in,
            bytes_discarded: self.bytes_discarded,
            bytes_out: relay.bytes,
            relays: relay.calls,
            crc64: relay.crc64,
        }
    }

    /// Dictionary memory limit handed to the decoder, in bytes.
    pub fn memory_limit(&self) -> u64 {
        self.memory_limit
    }

    pub fn input_capacity(&self) -> usize {
        self.buffers.input_capacity()
    }

    pub fn output_capacity(&self) -> usize {
        self.buffers.output_capacity()
    }

    pub fn sink(&self) -> &S {
        self.relay.sink()
    }

    pub fn sink_mut(&mut self) -> &mut S {
        self.relay.sink_mut()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Validate a delivery of `len` bytes. Returns `false` when the bytes
    /// arrive after the end of the stream and must be discarded.
    fn accept(&mut self, len: usize) -> Result<bool, Error> {
        if len == 0 {
            return Err(Error::Malformed);
        }
        match self.state {
            State::Failed => Err(Error::Internal("delivery after session failed".into())),
            State::Ended => {
                log::trace!("discarding up to {len} bytes after end of xz stream");
                Ok(false)
            }
            State::Uninitialized | State::Active(_) => Ok(true),
        }
    }

    fn prepare(&mut self, len: usize) -> Result<(), Error> {
        if let Err(e) = self.buffers.ensure_input_capacity(len) {
            return self.fail(Error::OutOfMemory(format!("input buffer: {e}")));
        }
        if let Err(e) = self.buffers.ensure_output_capacity(len) {
            return self.fail(Error::OutOfMemory(format!("output buffer: {e}")));
        }
        Ok(())
    }

    fn activate(&mut self) -> Result<(), Error> {
        gate::ensure_initialized();
        match self.factory.create(self.memory_limit) {
            Ok(decoder) => {
                log::debug!("xz session active (memlimit={})", self.memory_limit);
                self.state = State::Active(decoder);
                Ok(())
            }
            Err(e) => self.fail(e.into()),
        }
    }

    /// Run the decoder over the first `len` bytes of the input buffer.
    fn decode_staged(&mut self, offset: u64, len: usize) -> Result<(), Error> {
        if matches!(self.state, State::Uninitialized) {
            self.activate()?;
        }

        let mut pos = 0usize;
        // Set when the last call filled the whole output buffer: the decoder
        // may still hold output for input it has already consumed.
        let mut drain = false;

        while pos < len || drain {
            if let Err(e) = self.buffers.ensure_output_capacity(len) {
                return self.fail(Error::OutOfMemory(format!("output buffer: {e}")));
            }
            let State::Active(decoder) = &mut self.state else {
                return self.fail(Error::Internal("decoder missing in active session".into()));
            };
            let (input, output) = self.buffers.split(len);
            let window = &input[pos..];
            let window_len = window.len();
            let capacity = output.len();

            let run = match decoder.run(window, output) {
                Ok(run) => run,
                Err(e) => {
                    log::debug!("xz decode failed after {} input bytes: {e}", self.bytes_in);
                    return self.fail(e.into());
                }
            };
            if run.consumed > window_len || run.produced > capacity {
                return self.fail(Error::Internal(format!(
                    "decoder over-reported progress: consumed {} of {window_len}, produced {} of {capacity}",
                    run.consumed, run.produced
                )));
            }

            if let Err(e) = self.relay.relay(offset, &output[..run.produced]) {
                return self.fail(Error::Relay(e));
            }
            pos += run.consumed;
            self.bytes_in += run.consumed as u64;

            match run.outcome {
                Outcome::StreamEnd => {
                    let rest = (len - pos) as u64;
                    if rest > 0 {
                        log::debug!("discarding {rest} bytes after end of xz stream");
                        self.bytes_discarded += rest;
                    }
                    log::debug!(
                        "xz stream ended: {} bytes in, {} bytes out",
                        self.bytes_in,
                        self.relay.stats().bytes
                    );
                    self.state = State::Ended;
                    return Ok(());
                }
                Outcome::CheckAdvisory => {
                    log::debug!("xz integrity check will not be verified");
                    drain = run.produced == capacity;
                }
                Outcome::OutputReady => drain = true,
                Outcome::NeedInput => drain = false,
            }

            if run.consumed == 0 && run.produced == 0 && pos < len {
                return self.fail(Error::ContentEncoding("decoder made no progress".into()));
            }
        }

        Ok(())
    }

    /// Move to Failed (releasing any decoder) and return `err`.
    fn fail<T>(&mut self, err: Error) -> Result<T, Error> {
        log::debug!("xz session failed: {err}");
        self.state = State::Failed;
        Err(err)
    }
}

fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// Convenience functions
// ---------------------------------------------------------------------------

/// Decode a complete in-memory xz stream.
pub fn decode_all(config: &DecoderConfig, data: &[u8]) -> Result<Vec<u8>, Error> {
    decode_chunks(config, [data])
}

/// Decode an xz stream delivered as a sequence of chunks. Empty chunks are
/// skipped. Fails if the stream does not reach its end.
pub fn decode_chunks<'a, I>(config: &DecoderConfig, chunks: I) -> Result<Vec<u8>, Error>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut session = DecodeSession::new(config, Vec::new())?;
    let mut offset = 0u64;
    for chunk in chunks {
        if chunk.is_empty() {
            continue;
        }
        session.deliver(offset, chunk)?;
        offset += chunk.len() as u64;
    }
    session.finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
