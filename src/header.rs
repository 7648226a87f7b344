//! The block header record and the sole pointer-punning primitives.
//!
//! Every block in the region — free or live — begins with a [`Header`].
//! Free blocks thread their [`Header::next`] link through the free list;
//! live blocks leave it undefined garbage and are read only through
//! [`Header::size`]. This module is the single, narrow surface where a
//! raw byte region is reinterpreted as typed records; the one direction
//! that arithmetic alone can safely recover (header to payload) goes
//! through [`payload_of`]. The reverse (a caller-supplied pointer back to
//! its owning header) cannot be done by blind subtraction — the caller's
//! pointer may point anywhere inside the block's payload, not only at its
//! start — so that direction is instead resolved by
//! [`crate::raw_allocator::RawAllocator::locate_block`], which walks the
//! region's block chain from its base.

use core::mem;
use core::ptr::NonNull;

/// Required alignment of every block address and every payload pointer.
pub const ALIGNMENT: usize = 8;

/// The block header: total block size (header + payload) and, when the
/// block is free, a link to the next free block in address order.
#[repr(C)]
pub(crate) struct Header {
    /// Total size of the block, including this header, in bytes.
    pub size: usize,
    /// Free-list link. Meaningless while the block is live.
    pub next: Option<NonNull<Header>>,
}

/// Size of a [`Header`], in bytes. Fixed at compile time and always a
/// multiple of [`ALIGNMENT`], so payloads placed one header past a
/// block's start stay aligned.
pub(crate) const HEADER_SIZE: usize = mem::size_of::<Header>();

const _: () = assert!(
    HEADER_SIZE % ALIGNMENT == 0,
    "Header size must be a multiple of ALIGNMENT to keep payloads aligned"
);

/// Round `n` up to the next multiple of [`ALIGNMENT`].
pub(crate) const fn align_up(n: usize) -> usize {
    (n + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Recover the payload pointer one header past a block's address.
///
/// # Safety
/// `header` must point at a valid, live [`Header`] whose block extends at
/// least `HEADER_SIZE` bytes past `header` within the owning region.
pub(crate) unsafe fn payload_of(header: NonNull<Header>) -> NonNull<u8> {
    // SAFETY: caller guarantees `header` is a valid block start with at
    // least HEADER_SIZE bytes following it in the same allocation.
    unsafe { NonNull::new_unchecked(header.as_ptr().cast::<u8>().add(HEADER_SIZE)) }
}
