// Decoder configuration.
//
// `DecoderConfig` is the snapshot a session captures at creation.
// `Preferences` is an in-memory stand-in for the host's preference store: it
// owns the enabled flag, the memory limit, and the Accept-Encoding list, and
// keeps the list in sync whenever the enabled flag changes.

use bitflags::bitflags;

use crate::gate;

/// Preference holding the enabled flag.
pub const ENABLED_PREF: &str = "converter.xz.enabled";
/// Preference holding the per-stream dictionary memory limit in MiB.
pub const MEMORY_LIMIT_PREF: &str = "converter.xz.memory_limit_mb";
/// Preference holding the advertised Accept-Encoding list.
pub const ACCEPT_ENCODING_PREF: &str = "network.http.accept-encoding";

/// Default dictionary memory limit (MiB). `xz -9` needs about 65 MiB.
pub const DEFAULT_MEMORY_LIMIT_MB: u32 = 32;

/// Accept-Encoding list used when none is configured.
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate";

const MIB: u64 = 1024 * 1024;

bitflags! {
    /// liblzma stream decoder flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DecoderFlags: u32 {
        /// Report streams that carry no integrity check.
        const TELL_NO_CHECK = xz2::stream::TELL_NO_CHECK;
        /// Report integrity checks the decoder cannot verify.
        const TELL_UNSUPPORTED_CHECK = xz2::stream::TELL_UNSUPPORTED_CHECK;
        /// Report the check type of every stream.
        const TELL_ANY_CHECK = xz2::stream::TELL_ANY_CHECK;
        /// Keep decoding concatenated streams instead of stopping after the
        /// first one. The decoder then never reports the end of the stream
        /// on its own, so the session stays active until the transfer ends.
        const CONCATENATED = xz2::stream::CONCATENATED;
    }
}

impl Default for DecoderFlags {
    fn default() -> Self {
        Self::TELL_UNSUPPORTED_CHECK
    }
}

/// Read side of the host configuration.
pub trait ConfigSource {
    /// Whether xz decoding is permitted.
    fn enabled(&self) -> bool;

    /// Per-stream dictionary memory limit in MiB.
    fn memory_limit_mb(&self) -> u32 {
        DEFAULT_MEMORY_LIMIT_MB
    }
}

/// Configuration captured by a session when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Whether decoding is permitted at all.
    pub enabled: bool,
    /// Dictionary memory limit in MiB.
    pub memory_limit_mb: u32,
    /// liblzma decoder flags.
    pub flags: DecoderFlags,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            flags: DecoderFlags::default(),
        }
    }
}

impl DecoderConfig {
    /// Snapshot a configuration source.
    pub fn from_source(source: &impl ConfigSource) -> Self {
        Self {
            enabled: source.enabled(),
            memory_limit_mb: source.memory_limit_mb(),
            flags: DecoderFlags::default(),
        }
    }

    /// Memory limit in bytes, capped to 32 bits.
    pub fn memory_limit_bytes(&self) -> u64 {
        (self.memory_limit_mb as u64 * MIB).min(u32::MAX as u64)
    }
}

impl ConfigSource for DecoderConfig {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn memory_limit_mb(&self) -> u32 {
        self.memory_limit_mb
    }
}

/// In-memory preference store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    enabled: bool,
    memory_limit_mb: u32,
    accept_encoding: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self::new(true, DEFAULT_ACCEPT_ENCODING)
    }
}

impl Preferences {
    /// Create a store. The Accept-Encoding list is reconciled against
    /// `enabled` immediately, so a fresh store is always consistent.
    pub fn new(enabled: bool, accept_encoding: &str) -> Self {
        let accept_encoding = if enabled {
            gate::reconcile(false, true, accept_encoding)
        } else {
            gate::reconcile(true, false, accept_encoding)
        };
        Self {
            enabled,
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            accept_encoding,
        }
    }

    /// Change the enabled flag, updating the Accept-Encoding list.
    pub fn set_enabled(&mut self, enabled: bool) {
        let updated = gate::reconcile(self.enabled, enabled, &self.accept_encoding);
        if updated != self.accept_encoding {
            log::debug!(
                "{ACCEPT_ENCODING_PREF}: {:?} -> {:?}",
                self.accept_encoding,
                updated
            );
            self.accept_encoding = updated;
        }
        self.enabled = enabled;
    }

    pub fn set_memory_limit_mb(&mut self, mb: u32) {
        self.memory_limit_mb = mb;
    }

    /// Current Accept-Encoding list.
    pub fn accept_encoding(&self) -> &str {
        &self.accept_encoding
    }

    /// Snapshot for a new session.
    pub fn snapshot(&self) -> DecoderConfig {
        DecoderConfig::from_source(self)
    }
}

impl ConfigSource for Preferences {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn memory_limit_mb(&self) -> u32 {
        self.memory_limit_mb
    }
}
