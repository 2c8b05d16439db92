// Input/output staging buffers for a decode session.
//
// Both buffers only ever grow. Growth discards content: the output buffer is
// always fully relayed before it is resized, and the input buffer is refilled
// from scratch for every chunk.

use std::collections::TryReserveError;

/// Minimum input buffer size, applied on first use.
pub const MIN_INPUT_CAPACITY: usize = 8192;

/// Output capacity is this multiple of the input (or chunk) size.
const OUTPUT_GROWTH_FACTOR: usize = 3;

/// The output buffer is regrown when it drops below this multiple of the
/// chunk size.
const OUTPUT_LOW_WATER_FACTOR: usize = 2;

/// Owned, exclusively-held staging buffers.
#[derive(Debug, Default)]
pub struct StagingBuffers {
    input: Vec<u8>,
    output: Vec<u8>,
}

impl StagingBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make room for a chunk of `n` bytes.
    ///
    /// First use sizes the buffer to `max(n, 8192)`. Afterwards it grows to
    /// exactly `n`, and only when `n` exceeds the current capacity.
    pub fn ensure_input_capacity(&mut self, n: usize) -> Result<(), TryReserveError> {
        let target = if self.input.is_empty() {
            n.max(MIN_INPUT_CAPACITY)
        } else if self.input.len() < n {
            n
        } else {
            return Ok(());
        };
        log::trace!("input buffer: {} -> {target} bytes", self.input.len());
        regrow(&mut self.input, target)
    }

    /// Make room for the output of a chunk of `n` bytes.
    ///
    /// First use sizes the buffer to three times the input capacity. After
    /// that it is regrown to `3n` whenever it is smaller than `2n`.
    pub fn ensure_output_capacity(&mut self, n: usize) -> Result<(), TryReserveError> {
        let target = if self.output.is_empty() {
            self.input.len().max(n).max(1) * OUTPUT_GROWTH_FACTOR
        } else if self.output.len() < n.saturating_mul(OUTPUT_LOW_WATER_FACTOR) {
            n.saturating_mul(OUTPUT_GROWTH_FACTOR)
        } else {
            return Ok(());
        };
        log::trace!("output buffer: {} -> {target} bytes", self.output.len());
        regrow(&mut self.output, target)
    }

    /// Copy a chunk into the front of the input buffer.
    ///
    /// The caller must have sized the buffer with `ensure_input_capacity`.
    pub fn stage_input(&mut self, chunk: &[u8]) {
        self.input[..chunk.len()].copy_from_slice(chunk);
    }

    /// Input buffer capacity in bytes.
    pub fn input_capacity(&self) -> usize {
        self.input.len()
    }

    /// Output buffer capacity in bytes.
    pub fn output_capacity(&self) -> usize {
        self.output.len()
    }

    /// Borrow the first `n` bytes of the input buffer and the whole output
    /// buffer at once.
    pub fn split(&mut self, n: usize) -> (&[u8], &mut [u8]) {
        (&self.input[..n], &mut self.output[..])
    }

    /// The whole input buffer, for filling from a reader.
    pub fn input_mut(&mut self) -> &mut [u8] {
        &mut self.input
    }
}

/// Replace `buf` with a zeroed buffer of exactly `len` bytes.
fn regrow(buf: &mut Vec<u8>, len: usize) -> Result<(), TryReserveError> {
    buf.clear();
    buf.try_reserve_exact(len)?;
    buf.resize(len, 0);
    Ok(())
}
