#![no_main]
use libfuzzer_sys::fuzz_target;
use xzrelay::config::DecoderConfig;
use xzrelay::session::DecodeSession;
use xzrelay::sink::NullSink;

fuzz_target!(|data: &[u8]| {
    // The session must never panic on arbitrary bodies, only return errors.
    // The first byte picks the chunk size.
    let Some((&first, body)) = data.split_first() else {
        return;
    };
    let chunk = first as usize + 1;
    let cfg = DecoderConfig {
        memory_limit_mb: 16,
        ..Default::default()
    };
    let Ok(mut s) = DecodeSession::new(&cfg, NullSink) else {
        return;
    };
    let mut offset = 0u64;
    for c in body.chunks(chunk) {
        if s.deliver(offset, c).is_err() {
            // A failed session must keep rejecting input.
            assert!(s.deliver(offset, c).is_err());
            return;
        }
        offset += c.len() as u64;
    }
});
