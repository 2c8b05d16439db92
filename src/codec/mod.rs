// Bounded decompressor seam.
//
// The session never touches a bitstream format directly. It drives a
// `BoundedDecompressor`: a streaming decoder that consumes as much of the
// input window as it can and writes at most `output.len()` bytes per call.
//
// - `xz`: liblzma-backed implementation via the `xz2` crate

pub mod xz;

pub use xz::{XzDecoder, XzFactory};

/// Why a decoder call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Input window was exhausted; the decoder wants more bytes.
    NeedInput,
    /// The output buffer was filled; more output may be pending.
    OutputReady,
    /// The logical end of the compressed stream was reached.
    StreamEnd,
    /// The stream's integrity check cannot be (or is not) verified.
    /// Decoding continues; this is not an error.
    CheckAdvisory,
}

/// Result of one decoder invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    /// Bytes consumed from the front of the input window.
    pub consumed: usize,
    /// Bytes written to the front of the output buffer.
    pub produced: usize,
    /// Why the call returned.
    pub outcome: Outcome,
}

/// Fatal decoder outcomes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The stream needs more dictionary memory than the configured limit.
    #[error("memory limit exceeded: {0}")]
    MemLimit(String),
    /// The decoder could not allocate its internal state.
    #[error("decoder allocation failed: {0}")]
    OutOfMemory(String),
    /// The input is not a valid compressed stream.
    #[error("corrupt input: {0}")]
    Corrupt(String),
    /// The stream uses a feature the decoder does not implement.
    #[error("unsupported feature: {0}")]
    Unsupported(String),
    /// The decoder was misused.
    #[error("decoder misuse: {0}")]
    Program(String),
}

/// A streaming decoder producing output into caller-supplied buffers.
///
/// Implementations must report exactly how many bytes of `input` they
/// consumed; the caller never re-presents consumed bytes.
pub trait BoundedDecompressor {
    fn run(&mut self, input: &[u8], output: &mut [u8]) -> Result<Run, CodecError>;
}

/// Creates decoder handles for new sessions.
///
/// A handle is released by dropping it.
pub trait DecoderFactory {
    type Decoder: BoundedDecompressor;

    /// Create a decoder whose dictionary memory is capped at `memory_limit`
    /// bytes.
    fn create(&self, memory_limit: u64) -> Result<Self::Decoder, CodecError>;
}

impl<F: DecoderFactory + ?Sized> DecoderFactory for &F {
    type Decoder = F::Decoder;

    fn create(&self, memory_limit: u64) -> Result<Self::Decoder, CodecError> {
        (**self).create(memory_limit)
    }
}

impl<D: BoundedDecompressor + ?Sized> BoundedDecompressor for Box<D> {
    fn run(&mut self, input: &[u8], output: &mut [u8]) -> Result<Run, CodecError> {
        (**self).run(input, output)
    }
}
