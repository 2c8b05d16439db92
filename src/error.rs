// Session error kinds.
//
// Every error returned from `DecodeSession::deliver` (other than `Malformed`)
// leaves the session in the Failed state.

use std::io;

use crate::codec::CodecError;

/// Error returned by session creation and chunk delivery.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// xz decoding is turned off by configuration. Reported once, at creation.
    #[error("xz decoding is disabled by configuration")]
    Disabled,

    /// A zero-length chunk was delivered.
    #[error("malformed delivery: zero-length chunk")]
    Malformed,

    /// A staging buffer could not be allocated or the decoder hit its
    /// memory limit.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// The compressed stream is corrupt or uses an unsupported feature.
    #[error("content encoding error: {0}")]
    ContentEncoding(String),

    /// A precondition was violated, e.g. delivery after the session failed.
    #[error("internal error: {0}")]
    Internal(String),

    /// The downstream sink rejected relayed output.
    #[error("relay to downstream sink failed: {0}")]
    Relay(#[source] io::Error),

    /// Reading a chunk from the upstream reader failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Short stable name for logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Malformed => "malformed",
            Self::OutOfMemory(_) => "out_of_memory",
            Self::ContentEncoding(_) => "content_encoding",
            Self::Internal(_) => "internal",
            Self::Relay(_) => "relay",
            Self::Io(_) => "io",
        }
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::MemLimit(msg) | CodecError::OutOfMemory(msg) => Self::OutOfMemory(msg),
            CodecError::Corrupt(msg) | CodecError::Unsupported(msg) => Self::ContentEncoding(msg),
            CodecError::Program(msg) => Self::Internal(msg),
        }
    }
}
