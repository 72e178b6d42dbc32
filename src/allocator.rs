//! Append-only byte-region allocator.
//!
//! There is no free list: deleted tree node slots and orphaned payloads are
//! tombstoned, never reused (see the archive's Non-goals). The allocator's
//! only state is the superblock's `next_free` watermark; node allocation
//! and payload allocation share it and may interleave in file order.

use crate::record::{Offset, Superblock};
use log::trace;

/// Grants a region of `len` bytes starting at the current watermark,
/// advances `next_free` by `len`, and mirrors the new watermark into
/// `total_size`.
pub fn allocate(sb: &mut Superblock, len: u64) -> Offset {
    let granted = sb.next_free;
    let advanced = granted.get() + len as i64;
    sb.next_free = Offset::new(advanced);
    sb.total_size = sb.next_free;
    trace!("allocated {len} bytes at {granted}, watermark now {}", sb.next_free);
    granted
}

#[test]
fn grants_are_monotonic_and_non_overlapping() {
    let mut sb = Superblock::fresh();
    let start = sb.next_free;
    let a = allocate(&mut sb, 130);
    let b = allocate(&mut sb, 64);
    assert_eq!(a, start);
    assert_eq!(b.get(), a.get() + 130);
    assert_eq!(sb.next_free.get(), b.get() + 64);
    assert_eq!(sb.total_size, sb.next_free);
}
