//! Low-overhead in-process event tracer over a lock-free ring arena.
//!
//! ## Scope
//! Application code emits short trace events (a monotonic timestamp, an
//! opaque call-site address, and zero or more plain-data arguments) into a
//! fixed-size, pre-allocated circular byte arena. The arena is later dumped
//! as a raw byte stream for an external decoder that reconstructs typed
//! records using symbol information from the build, entirely offline.
//!
//! ## Key invariants
//! - The hot path (`trace`) performs no allocation, no IO, and cannot fail;
//!   its only synchronization is one atomic fetch-add on the shared cursor.
//! - Records are packed with no interior padding and no length prefix; the
//!   length is a compile-time function of the argument-type sequence,
//!   recovered by the decoder from the record's type tag.
//! - Code-location and type identity are opaque pointer-sized addresses,
//!   stable for the exact build that produced the stream; all naming is
//!   deferred to offline symbol resolution.
//! - The arena is lossy by design: once it wraps, the oldest bytes are
//!   silently overwritten and the dump returns the most recent
//!   `capacity` bytes in chronological order.
//!
//! ## Hot path flow
//! `trace!(log, args...) -> monotonic clock read -> call-site address
//! (#[track_caller] static) -> type tag (per-sequence anchor address) ->
//! record packed on the stack -> RingArena::append (atomic reserve + raw copy)`
//!
//! ## Notable entry points
//! - [`TraceLogger`] / [`TraceConfig`]: the tracing facade.
//! - [`trace!`]: variadic call-site sugar.
//! - [`RingArena`]: the lock-free byte store, usable on its own.
//! - [`ArgPack`] / [`Plain`]: the argument-packing contract.
//! - [`record_len`] / [`type_tag`]: writer-side forms of the derivations a
//!   decoder performs from the stream.
//!
//! ## Design trade-offs
//! Draining requires writer quiescence: `dump` and `clear` take `&mut self`,
//! so a dump racing an in-flight `trace` is a borrow error rather than a
//! data race. Linearizable dump-while-tracing is deliberately unsupported in
//! exchange for a zero-synchronization hot path; under heavy concurrent
//! wraparound a slow writer may overwrite a faster writer's newer bytes.

pub mod record;
pub mod ring_arena;

mod logger;

pub use logger::{TraceConfig, TraceLogger, MIN_LOGGER_CAPACITY_LOG2};
pub use record::{
    record_len, type_tag, ArgPack, Plain, ADDR_BYTES, HEADER_BYTES, MAX_RECORD_BYTES,
    TIMESTAMP_BYTES,
};
pub use ring_arena::{RingArena, MAX_CAPACITY_LOG2, MIN_CAPACITY_LOG2};
