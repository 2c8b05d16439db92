// Downstream side of the relay.
//
// A sink sees each run of decompressed bytes as a borrowed slice that is only
// valid for the duration of `relay`; the slice points into the session's
// output buffer, which is overwritten by the next decoder call.

use std::io::{self, Write};

use crc::Digest;

use crate::integrity;

/// How the upstream transfer finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndStatus {
    /// The transfer completed normally.
    Complete,
    /// The transfer was cancelled before completion.
    Aborted,
    /// The transfer failed upstream.
    Failed,
}

/// Consumer of decompressed output.
pub trait RelaySink {
    /// The transfer is starting.
    fn on_start(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Receive one contiguous run of output. `offset` is the upstream
    /// offset of the compressed chunk that produced it.
    fn relay(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()>;

    /// The transfer has finished.
    fn on_end(&mut self, _status: EndStatus) -> io::Result<()> {
        Ok(())
    }
}

impl<S: RelaySink + ?Sized> RelaySink for &mut S {
    fn on_start(&mut self) -> io::Result<()> {
        (**self).on_start()
    }

    fn relay(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        (**self).relay(offset, bytes)
    }

    fn on_end(&mut self, status: EndStatus) -> io::Result<()> {
        (**self).on_end(status)
    }
}

/// Collects all output in memory.
impl RelaySink for Vec<u8> {
    fn relay(&mut self, _offset: u64, bytes: &[u8]) -> io::Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Writes output to any `io::Write`, flushing when the transfer ends.
pub struct WriteSink<W: Write> {
    inner: W,
}

impl<W: Write> WriteSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> RelaySink for WriteSink<W> {
    fn relay(&mut self, _offset: u64, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }

    fn on_end(&mut self, _status: EndStatus) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Discards all output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl RelaySink for NullSink {
    fn relay(&mut self, _offset: u64, _bytes: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

/// Counters kept by [`Relay`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Number of `relay` calls made.
    pub calls: u64,
    /// Total bytes relayed.
    pub bytes: u64,
    /// CRC-64 (xz polynomial) of everything relayed so far.
    pub crc64: u64,
}

/// Hands output to a sink and tracks what has been handed over.
pub struct Relay<S> {
    sink: S,
    stats: RelayStats,
    crc64: Digest<'static, u64>,
}

impl<S: RelaySink> Relay<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            stats: RelayStats::default(),
            crc64: integrity::tables().crc64_digest(),
        }
    }

    /// Relay one run of output. Empty runs are not forwarded.
    pub fn relay(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.sink.relay(offset, bytes)?;
        self.stats.calls += 1;
        self.stats.bytes += bytes.len() as u64;
        self.crc64.update(bytes);
        Ok(())
    }

    pub fn start(&mut self) -> io::Result<()> {
        self.sink.on_start()
    }

    pub fn end(&mut self, status: EndStatus) -> io::Result<()> {
        self.sink.on_end(status)
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            crc64: self.crc64.clone().finalize(),
            ..self.stats
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recording {
        events: Vec<String>,
    }

    impl RelaySink for Recording {
        fn on_start(&mut self) -> io::Result<()> {
            self.events.push("start".into());
            Ok(())
        }
        fn relay(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
            self.events.push(format!("relay@{offset}:{}", bytes.len()));
            Ok(())
        }
        fn on_end(&mut self, status: EndStatus) -> io::Result<()> {
            self.events.push(format!("end:{status:?}"));
            Ok(())
        }
    }

    #[test]
    fn relay_skips_empty_runs_and_counts() {
        let mut relay = Relay::new(Recording::default());
        relay.start().unwrap();
        relay.relay(0, b"").unwrap();
        relay.relay(7, b"abc").unwrap();
        relay.relay(7, b"de").unwrap();
        relay.end(EndStatus::Complete).unwrap();

        let stats = relay.stats();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.bytes, 5);
        assert_eq!(stats.crc64, integrity::crc64(b"abcde"));
        assert_eq!(
            relay.sink().events,
            ["start", "relay@7:3", "relay@7:2", "end:Complete"]
        );
    }

    #[test]
    fn write_sink_flushes_on_end() {
        let mut sink = WriteSink::new(io::BufWriter::new(Vec::new()));
        sink.relay(0, b"hello").unwrap();
        sink.on_end(EndStatus::Complete).unwrap();
        assert_eq!(sink.get_ref().get_ref(), b"hello");
    }

    #[test]
    fn sink_error_is_not_counted() {
        struct Broken;
        impl RelaySink for Broken {
            fn relay(&mut self, _offset: u64, _bytes: &[u8]) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
        }
        let mut relay = Relay::new(Broken);
        assert!(relay.relay(0, b"x").is_err());
        assert_eq!(relay.stats(), RelayStats::default());
    }
}
