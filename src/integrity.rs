// Process-wide integrity-check state.
//
// CRC-32 (IEEE) and CRC-64 (ECMA-182) as used by the xz container format.
// CRC-32 comes from `crc32fast`; the CRC-64 engine and its lookup table are
// built once per process, the first time anything asks for them.
// `DecodeSession` forces initialization before it creates its first decoder
// handle.

use std::sync::OnceLock;

use crc::{CRC_64_XZ, Crc, Digest};

/// Checksum engines shared by every session in the process.
pub struct Checksums {
    crc64: Crc<u64>,
}

static CHECKSUMS: OnceLock<Checksums> = OnceLock::new();

/// Return the process-wide engines, building them on first use.
pub fn tables() -> &'static Checksums {
    CHECKSUMS.get_or_init(|| {
        log::debug!("building CRC-64 lookup table");
        Checksums {
            crc64: Crc::<u64>::new(&CRC_64_XZ),
        }
    })
}

/// Whether the engines have been built yet.
pub fn is_initialized() -> bool {
    CHECKSUMS.get().is_some()
}

impl Checksums {
    /// Continue a CRC-32 over `data`. Start from 0.
    pub fn crc32_update(&self, crc: u32, data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new_with_initial(crc);
        hasher.update(data);
        hasher.finalize()
    }

    /// Start an incremental CRC-64.
    pub fn crc64_digest(&'static self) -> Digest<'static, u64> {
        self.crc64.digest()
    }
}

/// CRC-32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// CRC-64 of `data`.
pub fn crc64(data: &[u8]) -> u64 {
    tables().crc64.checksum(data)
}
