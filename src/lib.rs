//! A fixed-capacity, best-fit memory allocator for embedded systems.
//!
//! This crate provides a single type called [`Allocator`]. This type
//! implements the [`core::alloc::GlobalAlloc`]-trait, which is required to
//! use the [`alloc`-crate][alloc] on `#![no_std]`-targets, and additionally
//! exposes the whole allocator surface directly — `alloc`, `calloc`,
//! `realloc`, `free`, `validate`, `validate_ptr`, `get_stats`,
//! `get_usage_percent`, `reset_stats` — for callers that want to manage
//! memory explicitly or audit the heap at runtime rather than going through
//! `extern crate alloc`.
//!
//! # Usage
//! Copy the following into your binary crate and adjust the number of
//! bytes of the heap (here 2K, the default):
//! ```
//! #[global_allocator]
//! static ALLOCATOR: eheap::Allocator<2048> = eheap::Allocator::new();
//!
//! extern crate alloc;
//! ```
//! Afterwards you don't need to interact with the crate or the variable
//! `ALLOCATOR` anymore to use `alloc::vec::Vec`, `alloc::collections::BTreeMap`,
//! and friends. If you do want to interact with it — to check how full the
//! heap is, for example — the same static exposes [`Allocator::get_stats`]
//! and [`Allocator::get_usage_percent`] directly.
//!
//! The minimal buffer size is `HEADER_SIZE + ALIGNMENT` bytes (24 bytes on
//! most 64-bit targets), which allows exactly one allocation of a handful
//! of bytes at a time. Size the buffer for your worst case, plus some
//! headroom — 10% is a reasonable starting point.
//!
//! Note to users with things like `MPU`s, `MMU`s, etc.: this crate doesn't
//! use those features at all. If memory protection for the heap region is
//! desired, take the address of the static and its size `N` and apply
//! protection externally.
//!
//! # Implementation
//! The heap is a single contiguous byte region. Every block — free or
//! live — begins with a header holding its total size (header + payload);
//! free blocks additionally thread a link to the next free block, kept in
//! strictly increasing address order. Allocation does a best-fit scan of
//! that list (the smallest block that satisfies the request, ties going to
//! the lowest address), splitting off a remainder when the match is
//! comfortably larger than needed. Freeing inserts the block back into its
//! sorted position and eagerly merges it with any block it now sits flush
//! against. `realloc` tries to grow in place by absorbing the block
//! immediately following a live allocation before falling back to
//! allocate-copy-free.
//!
//! [alloc]: https://doc.rust-lang.org/alloc/index.html
#![cfg_attr(not(test), no_std)]
#![warn(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

mod free_list;
mod header;
mod raw_allocator;
mod region;
mod stats;

use raw_allocator::RawAllocator;

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

pub use header::ALIGNMENT;
pub use stats::Stats;

/// The memory allocator for embedded systems.
///
/// This is the core type of this crate: it is an allocator with a
/// predefined, fixed heap size `N` (default `2048`, matching the "default
/// capacity" recommended for constrained targets). Because the heap is
/// counted as static memory (`.data`/`.bss`), its usage is bounded at
/// compile time and cannot grow into the stack.
///
/// Construct it directly in a `static`:
/// ```no_run
/// #[global_allocator]
/// static ALLOCATOR: eheap::Allocator<4096> = eheap::Allocator::new();
/// ```
/// See the [crate-level](crate) documentation for sizing recommendations.
pub struct Allocator<const N: usize = 2048> {
    /// The core allocator, guarded so it is usable behind the shared
    /// reference `GlobalAlloc` requires.
    raw: spin::Mutex<RawAllocator<N>>,
}

impl<const N: usize> Allocator<N> {
    /// Create a new [`Allocator`].
    ///
    /// `const fn`, so it can be assigned directly to a `static`. The heap
    /// is lazily initialized on first use (or explicitly via [`Allocator::init`]).
    ///
    /// # Panics
    /// This function panics at compile time if `N` is smaller than
    /// `HEADER_SIZE + ALIGNMENT` (the minimum size able to hold one block).
    #[must_use = "assign the allocator to a static variable and apply the `#[global_allocator]`-attribute to make it the global allocator"]
    pub const fn new() -> Self {
        Self {
            raw: spin::Mutex::new(RawAllocator::new()),
        }
    }

    /// (Re)initialize the heap and statistics.
    ///
    /// Idempotent, and implicitly invalidates every live allocation handed
    /// out before the call — callers must not touch them afterwards.
    pub fn init(&self) {
        self.raw.lock().init();
    }

    /// Allocate `size` bytes, zero-initialized, `ALIGNMENT`-aligned.
    ///
    /// Returns null if `size` is zero, larger than the heap can ever hold,
    /// or if no free block large enough remains.
    pub fn alloc(&self, size: usize) -> *mut u8 {
        match self.raw.lock().alloc(size) {
            Some(ptr) => ptr.as_ptr(),
            None => ptr::null_mut(),
        }
    }

    /// Allocate space for `count` elements of `elem_size` bytes each,
    /// zero-initialized.
    ///
    /// Returns null if `count * elem_size` overflows `usize`, or for the
    /// same reasons [`Allocator::alloc`] would.
    pub fn calloc(&self, count: usize, elem_size: usize) -> *mut u8 {
        match self.raw.lock().calloc(count, elem_size) {
            Some(ptr) => ptr.as_ptr(),
            None => ptr::null_mut(),
        }
    }

    /// Resize a live allocation to `new_size` bytes, preserving its
    /// contents up to the smaller of the old and new sizes.
    ///
    /// `ptr == null` behaves as [`Allocator::alloc`]; `new_size == 0` frees
    /// `ptr` and returns null. Returns null without modifying the heap if
    /// `ptr` is not a pointer this allocator handed out, or if growth
    /// requires a fresh allocation that itself fails (the original block
    /// is left untouched in that case).
    ///
    /// # Safety
    /// `ptr` must be null or a pointer previously returned by
    /// [`Allocator::alloc`], [`Allocator::calloc`], or
    /// [`Allocator::realloc`] on this allocator, not yet freed.
    pub unsafe fn realloc(&self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        // SAFETY: forwarded from this function's own safety contract.
        match unsafe { self.raw.lock().realloc(ptr, new_size) } {
            Some(ptr) => ptr.as_ptr(),
            None => ptr::null_mut(),
        }
    }

    /// Free a live allocation.
    ///
    /// A no-op if `ptr` is null, was not handed out by this allocator, or
    /// has already been freed (no counter is incremented for those cases).
    ///
    /// # Safety
    /// `ptr` must be null or a pointer previously returned by
    /// [`Allocator::alloc`], [`Allocator::calloc`], or
    /// [`Allocator::realloc`] on this allocator.
    pub unsafe fn free(&self, ptr: *mut u8) {
        // SAFETY: forwarded from this function's own safety contract.
        unsafe { self.raw.lock().free(ptr) };
    }

    /// Check whether `ptr` is null-safe to pass to [`Allocator::free`] on
    /// pointer-validity grounds alone: non-null, within the heap region,
    /// and `ALIGNMENT`-aligned. Does *not* verify that `ptr` points at a
    /// currently-live allocation — double frees and corrupt headers are
    /// caught separately by `free` itself.
    pub fn validate_ptr(&self, ptr: *mut u8) -> bool {
        self.raw.lock().validate_ptr(ptr)
    }

    /// Walk the free list and check that it is internally consistent:
    /// every node lies within the heap, nodes are strictly address-ordered,
    /// and free bytes plus live bytes account for the whole heap.
    ///
    /// Intended as an integrity probe after suspicious sequences (e.g. in
    /// tests that deliberately attempt a double free).
    pub fn validate(&self) -> bool {
        self.raw.lock().validate()
    }

    /// Copy out the current statistics snapshot.
    pub fn get_stats(&self) -> Stats {
        self.raw.lock().get_stats()
    }

    /// Current heap usage as a percentage (`0..=100`).
    pub fn get_usage_percent(&self) -> usize {
        self.raw.lock().get_usage_percent()
    }

    /// Reset the cumulative counters (`total_allocations`, `total_frees`,
    /// `alloc_failures`) to zero. Live-state fields such as `peak_usage`
    /// and `current_usage` are untouched.
    pub fn reset_stats(&self) {
        self.raw.lock().reset_stats();
    }

    /// Align a given pointer to the specified alignment.
    ///
    /// # Safety
    /// This function requires `align` to be a power of two and requires
    /// the `ptr` to point to a memory region large enough that the aligned
    /// pointer is still in that memory region.
    unsafe fn align_to(ptr: *mut u8, align: usize) -> *mut u8 {
        let addr = ptr as usize;
        let mismatch = addr & (align - 1);
        let offset = if mismatch != 0 { align - mismatch } else { 0 };
        // SAFETY: the "in-bounds" requirement is part of this function's
        // own safety contract, so the caller is responsible for it.
        unsafe { ptr.add(offset) }
    }
}

impl<const N: usize> Default for Allocator<N> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the safety contract of `GlobalAlloc` is lengthy, but in short:
// the implementation never panics (a panic here would itself be a bug)
// and adheres to the layout requirements, which the tests in this crate
// and in `raw_allocator` exercise directly.
unsafe impl<const N: usize> GlobalAlloc for Allocator<N> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let align = layout.align();
        // The raw allocator always returns `ALIGNMENT`-aligned slices, so
        // smaller alignments are always satisfied for free. Larger
        // alignments require over-allocation and adjusting the returned
        // pointer; the over-allocation is a conservative worst case, but
        // guarantees enough slack remains after alignment.
        let size = if align > ALIGNMENT {
            layout.size() + align
        } else {
            layout.size()
        };

        match self.raw.lock().alloc(size) {
            // SAFETY: `align` is a power of two by `Layout`'s own
            // contract, and the memory was over-allocated above so the
            // aligned pointer still lies within it.
            Some(memory) => unsafe { Self::align_to(memory.as_ptr(), align) },
            None => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        // `ptr` may be an interior pointer when `alloc` over-allocated for
        // an alignment stricter than `ALIGNMENT` — `RawAllocator::free`
        // locates the owning block by walking from the region's base
        // rather than assuming `ptr` is exactly a payload's start, so the
        // raw pointer is simply forwarded as-is. `GlobalAlloc::dealloc`
        // must not panic, and `free` never does — invalid pointers are
        // silently ignored.
        //
        // SAFETY: forwarded from this function's own `unsafe fn` contract,
        // which callers of `GlobalAlloc::dealloc` must uphold.
        unsafe { self.raw.lock().free(ptr) };
    }
}

#[cfg(test)]
mod tests {
    use crate::Allocator;
    use core::alloc::{GlobalAlloc, Layout};
    use core::ptr;

    #[test]
    fn alignment_of_align_to() {
        // Use a real, suitably-aligned buffer for indexing rather than
        // casting arbitrary integers to pointers, to stay within strict
        // provenance rules (this test is meant to run cleanly under miri).
        #[repr(align(16))]
        struct Align([u8; 16]);
        let mut buffer = Align([0u8; 16]);
        let base: *mut u8 = ptr::addr_of_mut!(buffer.0).cast();

        let ptr_0x10 = base;
        let ptr_0x11 = base.wrapping_add(1);
        let ptr_0x14 = base.wrapping_add(4);
        let ptr_0x1c = base.wrapping_add(0xc);
        let ptr_0x20 = base.wrapping_add(0x10);

        assert_eq!(unsafe { Allocator::<2048>::align_to(ptr_0x11, 4) }, ptr_0x14);
        assert_eq!(unsafe { Allocator::<2048>::align_to(ptr_0x10, 4) }, ptr_0x10);
        assert_eq!(unsafe { Allocator::<2048>::align_to(ptr_0x11, 1) }, ptr_0x11);
        assert_eq!(unsafe { Allocator::<2048>::align_to(ptr_0x1c, 16) }, ptr_0x20);
    }

    macro_rules! assert_alignment {
        ($ptr:expr, $align:expr) => {{
            assert_eq!(($ptr as usize) % $align, 0, "Alignment not fulfilled");
        }};
    }

    #[test]
    fn small_alignments() {
        let allocator = Allocator::<64>::new();

        let ptr = unsafe { allocator.alloc(Layout::from_size_align(8, 2).unwrap()) };
        assert_alignment!(ptr, 1);

        let ptr = unsafe { allocator.alloc(Layout::from_size_align(4, 4).unwrap()) };
        assert_alignment!(ptr, 4);
    }

    #[test]
    fn medium_alignments() {
        let allocator = Allocator::<256>::new();

        let ptr = unsafe { allocator.alloc(Layout::from_size_align(4, 8).unwrap()) };
        assert_alignment!(ptr, 8);

        let ptr = unsafe { allocator.alloc(Layout::from_size_align(4, 32).unwrap()) };
        assert_alignment!(ptr, 32);
    }

    #[cfg(not(miri))] // too slow under miri
    #[test]
    fn huge_alignment() {
        const FOUR_MEG: usize = 4 * 1024 * 1024;

        static ALLOCATOR: Allocator<{ 10 * 1024 * 1024 }> = Allocator::new();
        let ptr = unsafe { ALLOCATOR.alloc(Layout::from_size_align(4, FOUR_MEG).unwrap()) };

        assert_alignment!(ptr, FOUR_MEG);
    }

    #[test]
    fn global_alloc_example_usage() {
        static ALLOCATOR: Allocator<4096> = Allocator::new();

        unsafe {
            let layout1 = Layout::new::<u32>();
            let ptr1 = ALLOCATOR.alloc(layout1);
            assert_ne!(ptr1, ptr::null_mut());

            let layout2 = Layout::new::<f64>();
            let ptr2 = ALLOCATOR.alloc(layout2);
            assert_ne!(ptr2, ptr::null_mut());

            let layout3 = Layout::new::<[u16; 12]>();
            let ptr3 = ALLOCATOR.alloc(layout3);
            assert_ne!(ptr3, ptr::null_mut());

            ALLOCATOR.dealloc(ptr2, layout2);

            let layout4 = Layout::new::<[u128; 3]>();
            let ptr4 = ALLOCATOR.alloc(layout4);
            assert_ne!(ptr4, ptr::null_mut());

            let layout5 = Layout::new::<f32>();
            let ptr5 = ALLOCATOR.alloc(layout5);
            assert_ne!(ptr5, ptr::null_mut());

            ALLOCATOR.dealloc(ptr3, layout3);
            ALLOCATOR.dealloc(ptr4, layout4);
            ALLOCATOR.dealloc(ptr5, layout5);
            ALLOCATOR.dealloc(ptr1, layout1);
        }
    }

    #[test]
    fn over_aligned_dealloc_fully_reclaims_its_block() {
        // `align` here (16) exceeds `ALIGNMENT` (8), so `alloc` returns an
        // interior pointer into an over-allocated block; `dealloc` must
        // still free the whole block instead of leaking it.
        static ALLOCATOR: Allocator<4096> = Allocator::new();
        let layout = Layout::new::<[u128; 3]>();
        unsafe {
            let ptr = ALLOCATOR.alloc(layout);
            assert_ne!(ptr, ptr::null_mut());
            assert_eq!(ptr as usize % layout.align(), 0);
            let usage_while_live = ALLOCATOR.get_stats().current_usage;
            assert!(usage_while_live > 0);

            ALLOCATOR.dealloc(ptr, layout);
            assert_eq!(ALLOCATOR.get_stats().current_usage, 0);
            assert_eq!(ALLOCATOR.get_stats().total_frees, 1);
            assert!(ALLOCATOR.validate());
        }
    }

    #[test]
    fn inherent_api_round_trips_without_global_alloc() {
        let allocator: Allocator<2048> = Allocator::new();
        let ptr = allocator.alloc(64);
        assert_ne!(ptr, ptr::null_mut());
        assert!(allocator.validate_ptr(ptr));
        assert_eq!(allocator.get_stats().total_allocations, 1);

        unsafe { allocator.free(ptr) };
        assert_eq!(allocator.get_stats().total_frees, 1);
        assert_eq!(allocator.get_stats().current_usage, 0);
        assert!(allocator.validate());
    }

    #[test]
    fn default_matches_new() {
        let allocator: Allocator<2048> = Allocator::default();
        assert_eq!(allocator.get_stats(), Default::default());
    }
}
