//! Public tracing facade.
//!
//! `TraceLogger` owns the [`RingArena`] and turns a `trace` call into a
//! packed record: monotonic timestamp, call-site address, argument-type tag,
//! argument bytes. The whole hot path is a clock read, two address
//! materializations, a stack copy, and one atomic fetch-add. It allocates
//! nothing, performs no IO, and cannot fail.
//!
//! Call-site identity comes from `#[track_caller]`: the compiler emits one
//! static `Location` per tracked call site, and its address is recorded as
//! the opaque identity (per call site, not per monomorphization). Offline
//! tooling resolves it against the build's image; the tracer itself never
//! touches the file/line strings.

use std::io::{self, Write};
use std::panic::Location;
use std::sync::OnceLock;
use std::time::Instant;

use crate::record::{type_tag, ArgPack, RecordBytes, MAX_RECORD_BYTES};
use crate::ring_arena::RingArena;

/// Smallest accepted logger capacity exponent (512 bytes).
///
/// Chosen so that any record the packer can produce is strictly smaller than
/// the arena, discharging the record-size contract at construction time.
pub const MIN_LOGGER_CAPACITY_LOG2: u32 = 9;

const _: () = assert!(
    MAX_RECORD_BYTES < (1usize << MIN_LOGGER_CAPACITY_LOG2),
    "every packable record must be strictly smaller than the smallest arena"
);

/// Construction-time tuning for a [`TraceLogger`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceConfig {
    /// log2 of the arena capacity in bytes.
    pub capacity_log2: u32,
}

impl Default for TraceConfig {
    /// 1 MiB arena.
    fn default() -> Self {
        Self { capacity_log2: 20 }
    }
}

/// In-process event tracer over a lock-free ring arena.
///
/// `trace` takes `&self` and may be called from any number of threads
/// concurrently. `dump` and `clear` take `&mut self`: draining requires
/// writer quiescence, and the exclusive borrow makes that a compile-time
/// property instead of a footnote.
#[derive(Debug)]
pub struct TraceLogger {
    arena: RingArena,
}

impl TraceLogger {
    /// Creates a logger with the given configuration.
    ///
    /// # Panics
    /// Panics if `config.capacity_log2` is below
    /// [`MIN_LOGGER_CAPACITY_LOG2`] or above
    /// [`MAX_CAPACITY_LOG2`](crate::ring_arena::MAX_CAPACITY_LOG2).
    pub fn new(config: TraceConfig) -> Self {
        assert!(
            config.capacity_log2 >= MIN_LOGGER_CAPACITY_LOG2,
            "TraceLogger capacity_log2 must be at least {MIN_LOGGER_CAPACITY_LOG2}, got {}",
            config.capacity_log2
        );
        Self {
            arena: RingArena::with_capacity_log2(config.capacity_log2),
        }
    }

    /// Creates a logger with a `1 << capacity_log2` byte arena.
    pub fn with_capacity_log2(capacity_log2: u32) -> Self {
        Self::new(TraceConfig { capacity_log2 })
    }

    /// Records one trace event with the given plain-data arguments.
    ///
    /// Arguments are passed as a tuple (`()` for none); the [`trace!`]
    /// macro restores variadic syntax. In order: reads the monotonic clock,
    /// captures the call-site address, resolves the type tag for `A`, packs
    /// the record on the stack, and appends its byte image to the arena.
    /// Lock-free, allocation-free, infallible.
    #[track_caller]
    #[inline]
    pub fn trace<A: ArgPack>(&self, args: A) {
        let timestamp = monotonic_nanos();
        let call_site = Location::caller() as *const Location<'static> as usize;
        let record = RecordBytes::pack(timestamp, call_site, type_tag::<A>(), &args);
        self.arena.append(record.as_bytes());
    }

    /// Writes the retained record stream to `sink`, oldest first.
    ///
    /// Requires writer quiescence (`&mut self`). The only error surface is
    /// the sink's own IO failure.
    pub fn dump<W: Write + ?Sized>(&mut self, sink: &mut W) -> io::Result<()> {
        self.arena.write_to(sink)
    }

    /// Logically discards all retained records without zeroing storage.
    pub fn clear(&mut self) {
        self.arena.clear();
    }

    /// Arena capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// Total bytes ever reserved by trace calls (advisory while tracing).
    #[inline]
    pub fn bytes_reserved(&self) -> u64 {
        self.arena.bytes_reserved()
    }

    /// True once older records have started being overwritten (advisory
    /// while tracing).
    #[inline]
    pub fn has_wrapped(&self) -> bool {
        self.arena.has_wrapped()
    }
}

/// Nanoseconds on a monotonic clock, anchored at first use in the process.
///
/// Only internal ordering is meaningful; there is no absolute epoch.
#[inline]
fn monotonic_nanos() -> i64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as i64
}

/// Variadic sugar over [`TraceLogger::trace`].
///
/// `trace!(logger)` records a zero-argument event; `trace!(logger, a, b)`
/// records the tuple `(a, b)`. Expands at the invocation site, so the
/// recorded call-site identity is the invocation's own location.
#[macro_export]
macro_rules! trace {
    ($logger:expr $(,)?) => {
        $logger.trace(())
    };
    ($logger:expr, $($arg:expr),+ $(,)?) => {
        $logger.trace(($($arg,)+))
    };
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{record_len, ADDR_BYTES, HEADER_BYTES, TIMESTAMP_BYTES};

    /// Splits a dump of uniform `len`-byte records into
    /// `(timestamp, call_site, type_tag, argument bytes)` tuples.
    fn parse_records(bytes: &[u8], len: usize) -> Vec<(i64, usize, usize, Vec<u8>)> {
        assert_eq!(bytes.len() % len, 0, "dump is not record-aligned");
        bytes
            .chunks_exact(len)
            .map(|rec| {
                let ts = i64::from_ne_bytes(rec[..TIMESTAMP_BYTES].try_into().unwrap());
                let site = usize::from_ne_bytes(
                    rec[TIMESTAMP_BYTES..TIMESTAMP_BYTES + ADDR_BYTES]
                        .try_into()
                        .unwrap(),
                );
                let tag = usize::from_ne_bytes(
                    rec[TIMESTAMP_BYTES + ADDR_BYTES..HEADER_BYTES]
                        .try_into()
                        .unwrap(),
                );
                (ts, site, tag, rec[HEADER_BYTES..].to_vec())
            })
            .collect()
    }

    #[test]
    fn single_trace_produces_one_well_formed_record() {
        let mut log = TraceLogger::with_capacity_log2(9);
        log.trace((0xABCDu16,));

        let mut out = Vec::new();
        log.dump(&mut out).unwrap();

        let len = record_len::<(u16,)>();
        let records = parse_records(&out, len);
        assert_eq!(records.len(), 1);

        let (ts, site, tag, args) = &records[0];
        assert!(*ts >= 0);
        assert_ne!(*site, 0);
        assert_eq!(*tag, type_tag::<(u16,)>());
        assert_eq!(args, &0xABCDu16.to_ne_bytes());
    }

    #[test]
    fn zero_argument_trace_is_header_only() {
        let mut log = TraceLogger::with_capacity_log2(9);
        trace!(log);

        let mut out = Vec::new();
        log.dump(&mut out).unwrap();
        assert_eq!(out.len(), HEADER_BYTES);

        let records = parse_records(&out, HEADER_BYTES);
        assert_eq!(records[0].2, type_tag::<()>());
        assert!(records[0].3.is_empty());
    }

    #[test]
    fn call_site_identity_is_per_site_not_per_type() {
        let mut log = TraceLogger::with_capacity_log2(9);
        for _ in 0..2 {
            trace!(log, 1u8); // one site, two calls
        }
        trace!(log, 2u8); // a different site, same argument types

        let mut out = Vec::new();
        log.dump(&mut out).unwrap();
        let records = parse_records(&out, record_len::<(u8,)>());
        assert_eq!(records.len(), 3);

        let sites: Vec<usize> = records.iter().map(|r| r.1).collect();
        assert_eq!(sites[0], sites[1], "same line must share a call-site id");
        assert_ne!(sites[1], sites[2], "distinct lines must have distinct ids");
        // All three share one type tag: identity of the argument sequence,
        // not of the call.
        assert!(records.iter().all(|r| r.2 == type_tag::<(u8,)>()));
    }

    #[test]
    fn timestamps_are_nondecreasing_in_call_order() {
        let mut log = TraceLogger::with_capacity_log2(9);
        for _ in 0..16 {
            trace!(log);
        }

        let mut out = Vec::new();
        log.dump(&mut out).unwrap();
        let records = parse_records(&out, HEADER_BYTES);
        assert_eq!(records.len(), 16);
        for pair in records.windows(2) {
            assert!(pair[0].0 <= pair[1].0);
        }
    }

    #[test]
    fn macro_accepts_mixed_arities() {
        let mut log = TraceLogger::with_capacity_log2(9);
        trace!(log);
        trace!(log, 1u8);
        trace!(log, 2u16, 3u32, 4.0f64);

        let mut out = Vec::new();
        log.dump(&mut out).unwrap();
        assert_eq!(
            out.len(),
            record_len::<()>() + record_len::<(u8,)>() + record_len::<(u16, u32, f64)>()
        );
    }

    #[test]
    fn clear_then_dump_is_empty() {
        let mut log = TraceLogger::with_capacity_log2(9);
        trace!(log, 42u64);
        log.clear();
        assert_eq!(log.bytes_reserved(), 0);

        let mut out = Vec::new();
        log.dump(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn dump_propagates_sink_errors() {
        struct FailingSink;
        impl Write for FailingSink {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut log = TraceLogger::with_capacity_log2(9);
        trace!(log, 1u8);
        let err = log.dump(&mut FailingSink).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    #[should_panic(expected = "capacity_log2")]
    fn rejects_arena_smaller_than_max_record() {
        let _ = TraceLogger::with_capacity_log2(8);
    }

    #[test]
    fn default_config_is_one_mebibyte() {
        let log = TraceLogger::new(TraceConfig::default());
        assert_eq!(log.capacity(), 1 << 20);
    }
}
