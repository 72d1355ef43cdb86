//! A bit-pivoted binary trie over non-overlapping `[start, end)` ranges of a
//! 64-bit address space, plus a first-fit allocator facade built on top of it.
//!
//! This is the primitive a kernel uses to track owned address regions
//! (physical frames, virtual pages, I/O apertures): look up the owner of an
//! address in sub-linear time, carve sub-ranges out of tracked ranges, and
//! hand out freshly allocated sub-ranges of a requested length.
//!
//! The trie is single-threaded cooperative: it takes no internal locks. A
//! caller sharing a [`RangeTrie`] across threads or interrupt contexts must
//! serialize access itself, the way `kernel::memory::range_alloc::RangeAllocator`
//! is wrapped in a lock by its callers.

#![no_std]

extern crate alloc;

mod error;
mod range;
mod trie;

pub use error::RangeTrieError;
pub use range::Range;
pub use trie::{INVALID, RangeTrie, RangeTrieAllocator};
