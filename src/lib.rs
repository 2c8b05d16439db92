//! xzrelay: streaming xz (`Content-Encoding: xz`) decoding for HTTP response
//! bodies.
//!
//! The crate provides:
//! - A push-driven decode session that relays output as chunks arrive (`session`)
//! - The bounded decompressor seam and its liblzma backend (`codec`)
//! - Accept-Encoding reconciliation and the enable/disable gate (`gate`, `config`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use xzrelay::config::DecoderConfig;
//! use xzrelay::session::DecodeSession;
//!
//! # let body: Vec<u8> = Vec::new();
//! let mut session = DecodeSession::new(&DecoderConfig::default(), Vec::new()).unwrap();
//! let mut offset = 0u64;
//! for chunk in body.chunks(16 * 1024) {
//!     session.deliver(offset, chunk).unwrap();
//!     offset += chunk.len() as u64;
//! }
//! let plain = session.finish().unwrap();
//! ```

pub mod buffer;
pub mod codec;
pub mod config;
pub mod error;
pub mod gate;
pub mod integrity;
pub mod io;
pub mod session;
pub mod sink;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::{DecoderConfig, DecoderFlags, Preferences};
pub use error::Error;
pub use session::{DecodeSession, SessionState, SessionStats};
pub use sink::{EndStatus, RelaySink};
