//! Lock-free multi-writer byte arena with wraparound.
//!
//! The arena models an unbounded logical byte stream of which only the most
//! recent `capacity` bytes are retained. Writers reserve a range with a single
//! atomic fetch-add on the shared cursor and then copy their bytes into the
//! reservation with ordinary (non-atomic) stores. There is no per-writer
//! state and no blocking: the fetch-add is the only coordination point.
//!
//! # Invariants
//! - `capacity` is a power of 2 (unrepresentable otherwise: construction takes
//!   the log2 exponent). Physical offset of logical position `p` is
//!   `p & (capacity - 1)`.
//! - `cursor` counts total bytes ever reserved and is never reduced modulo
//!   capacity in place.
//! - A reserved range `[c, c + len)` belongs to exactly one writer: no two
//!   callers can observe the same cursor value from `fetch_add`.
//! - Every appended record is strictly smaller than `capacity` (a
//!   construction-time contract of the caller, checked here only by
//!   `debug_assert`).
//!
//! # Ordering rationale
//!
//! All atomic accesses are `Relaxed`. Reservation disjointness needs only the
//! atomicity of `fetch_add`, not ordering. Readers (`write_to`) take
//! `&mut self`, so any correct caller has already established a
//! happens-before edge with every writer (joining the threads, ending a
//! `thread::scope`, ...) before the exclusive borrow can exist; that external
//! edge is what makes the plain byte copies visible. Draining while writers
//! are still running is thereby a compile error rather than a documented
//! race.
//!
//! # Lossiness
//!
//! Once the cursor passes `capacity` the arena wraps and old bytes are
//! silently overwritten. Under concurrent wraparound a slow writer can also
//! overwrite a faster writer's newer bytes; the dump is chronological in
//! reservation order, not completion order. This is the accepted price for a
//! zero-synchronization hot path.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use std::cell::UnsafeCell;
use std::fmt;
use std::io::{self, Write};
use std::ptr;
use std::slice;

use crossbeam_utils::CachePadded;

/// Smallest accepted capacity exponent (64 bytes).
pub const MIN_CAPACITY_LOG2: u32 = 6;

/// Largest accepted capacity exponent (4 GiB).
pub const MAX_CAPACITY_LOG2: u32 = 32;

/// Fixed-capacity byte store shared by all writer threads.
///
/// `append` is lock-free and takes `&self`; `write_to` and `clear` take
/// `&mut self` and therefore require writer quiescence by construction.
pub struct RingArena {
    /// Byte storage. Writers copy into disjoint reserved ranges through the
    /// base pointer; `UnsafeCell` makes the shared mutation explicit.
    storage: Box<[UnsafeCell<u8>]>,

    /// Bitmask for power-of-2 modulo: `pos & mask == pos % capacity`.
    mask: u64,

    /// Total bytes ever reserved. Monotonically increasing; the physical
    /// offset is derived lazily. Cache-line padded so writer contention on
    /// the counter does not drag the neighboring fields along.
    cursor: CachePadded<AtomicU64>,

    /// Set once the cursor has advanced past `capacity` at least once. Tells
    /// `write_to` whether the logical stream starts at physical offset 0 or
    /// at the current (oldest) offset. Exactly filling the arena does not
    /// set it.
    wrapped: AtomicBool,
}

// SAFETY: The reservation protocol guarantees that concurrent writers touch
// disjoint byte ranges of `storage` (each `fetch_add` hands out a unique
// range), and all reads of those bytes go through `&mut self`, which cannot
// coexist with in-flight `append` borrows.
unsafe impl Send for RingArena {}
unsafe impl Sync for RingArena {}

impl RingArena {
    /// Creates a zeroed arena of `1 << capacity_log2` bytes.
    ///
    /// Taking the exponent instead of a byte count makes a non-power-of-two
    /// capacity unrepresentable instead of merely checked.
    ///
    /// # Panics
    /// Panics if `capacity_log2` is outside
    /// [`MIN_CAPACITY_LOG2`]`..=`[`MAX_CAPACITY_LOG2`].
    pub fn with_capacity_log2(capacity_log2: u32) -> Self {
        assert!(
            (MIN_CAPACITY_LOG2..=MAX_CAPACITY_LOG2).contains(&capacity_log2),
            "RingArena capacity_log2 must be in {MIN_CAPACITY_LOG2}..={MAX_CAPACITY_LOG2}, got {capacity_log2}"
        );
        let capacity = 1usize << capacity_log2;
        let storage: Box<[UnsafeCell<u8>]> =
            (0..capacity).map(|_| UnsafeCell::new(0u8)).collect();
        Self {
            storage,
            mask: capacity as u64 - 1,
            cursor: CachePadded::new(AtomicU64::new(0)),
            wrapped: AtomicBool::new(false),
        }
    }

    /// Returns the fixed capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Returns the total number of bytes ever reserved.
    ///
    /// Advisory while writers are active (a racy snapshot); exact once the
    /// arena has quiesced.
    #[inline]
    pub fn bytes_reserved(&self) -> u64 {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Returns true once the cursor has advanced past `capacity`.
    ///
    /// Advisory while writers are active; exact once the arena has quiesced.
    #[inline]
    pub fn has_wrapped(&self) -> bool {
        self.wrapped.load(Ordering::Relaxed)
    }

    /// Returns true if nothing has been appended since creation or the last
    /// [`clear`](Self::clear).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes_reserved() == 0
    }

    /// Base pointer of the storage.
    ///
    /// Mutation through the returned pointer is sound only inside a range
    /// handed out by the cursor `fetch_add`.
    #[inline(always)]
    fn base_ptr(&self) -> *mut u8 {
        // `UnsafeCell<u8>` is `repr(transparent)`, so the slice of cells has
        // the same layout as a slice of bytes.
        self.storage.as_ptr() as *mut u8
    }

    /// Appends `bytes` at the current logical write position.
    ///
    /// Reserves the range with one Relaxed `fetch_add`, then copies with at
    /// most two `copy_nonoverlapping` calls (one when the range does not
    /// cross the physical end, two when it splits). Lock-free and O(len);
    /// never fails.
    ///
    /// Callers must keep every record strictly smaller than
    /// [`capacity`](Self::capacity); that is a configuration contract, not a
    /// per-call check (see module docs).
    #[inline]
    pub fn append(&self, bytes: &[u8]) {
        let len = bytes.len();
        debug_assert!(
            len < self.capacity(),
            "record of {len} bytes cannot fit a {} byte arena",
            self.capacity()
        );

        let start_total = self.cursor.fetch_add(len as u64, Ordering::Relaxed);
        let start = (start_total & self.mask) as usize;
        let end_total = start_total + len as u64;

        // The flag is monotonic; checking before storing keeps the quiescent
        // steady state read-only on this line.
        if end_total > self.capacity() as u64 && !self.wrapped.load(Ordering::Relaxed) {
            self.wrapped.store(true, Ordering::Relaxed);
        }

        let first = (self.capacity() - start).min(len);
        let base = self.base_ptr();
        // SAFETY: `[start_total, end_total)` was reserved exclusively for this
        // call by the fetch_add above, `start + first <= capacity`, and the
        // wrapped remainder `len - first < capacity` lands at offset 0.
        // `bytes` cannot alias the storage (it is a `&[u8]` while storage is
        // only written through reservations).
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), base.add(start), first);
            if len > first {
                ptr::copy_nonoverlapping(bytes.as_ptr().add(first), base, len - first);
            }
        }
    }

    /// Writes the retained logical stream to `sink`, oldest byte first.
    ///
    /// If the arena has wrapped, emits `[offset, capacity)` (the older half)
    /// followed by `[0, offset)` (the newer half), where
    /// `offset = cursor & mask`. Otherwise emits `[0, cursor)`; note this
    /// covers the exactly-full arena, whose offset is 0 but whose every byte
    /// is live.
    ///
    /// Taking `&mut self` is what makes this sound: an exclusive borrow
    /// cannot exist while any `append` is in flight.
    pub fn write_to<W: Write + ?Sized>(&mut self, sink: &mut W) -> io::Result<()> {
        let total = self.cursor.load(Ordering::Relaxed);
        let wrapped = self.wrapped.load(Ordering::Relaxed);
        let offset = (total & self.mask) as usize;

        // SAFETY: `&mut self` guarantees quiescence, so no byte of storage is
        // concurrently written; the cells have the layout of plain bytes.
        let data: &[u8] = unsafe {
            slice::from_raw_parts(self.storage.as_ptr() as *const u8, self.storage.len())
        };

        if wrapped {
            sink.write_all(&data[offset..])?;
            sink.write_all(&data[..offset])?;
        } else {
            sink.write_all(&data[..total as usize])?;
        }
        Ok(())
    }

    /// Logically discards all retained bytes.
    ///
    /// Resets the cursor and the wrapped flag; stale bytes become
    /// unreachable, not erased. `&mut self` for the same reason as
    /// [`write_to`](Self::write_to).
    pub fn clear(&mut self) {
        self.cursor.store(0, Ordering::Relaxed);
        self.wrapped.store(false, Ordering::Relaxed);
    }
}

impl fmt::Debug for RingArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingArena")
            .field("capacity", &self.capacity())
            .field("bytes_reserved", &self.bytes_reserved())
            .field("wrapped", &self.has_wrapped())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================


// ============================================================================
// Property Tests
// ============================================================================

#[cfg(all(test, not(loom), feature = "arena-proptest"))]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Against a flat `Vec<u8>` model of the unbounded logical stream,
        /// the dump is the whole stream until capacity is exceeded and the
        /// last `capacity` bytes afterwards.
        #[test]
        fn dump_matches_logical_stream_tail(
            chunks in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 1..48),
                0..40,
            )
        ) {
            let mut arena = RingArena::with_capacity_log2(6);
            let mut logical = Vec::new();

            for chunk in &chunks {
                arena.append(chunk);
                logical.extend_from_slice(chunk);
            }

            let mut out = Vec::new();
            arena.write_to(&mut out).unwrap();

            if logical.len() <= 64 {
                prop_assert!(!arena.has_wrapped());
                prop_assert_eq!(out, logical);
            } else {
                prop_assert!(arena.has_wrapped());
                prop_assert_eq!(out, &logical[logical.len() - 64..]);
            }
        }
    }
}

// ============================================================================
// Loom Tests
// ============================================================================
