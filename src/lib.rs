//! Bookkeeping for binary-buddy allocation over an arena this crate never
//! touches.
//!
//! A [`BuddyAllocator`] manages a fixed address range of `2^max_level` pages.
//! It decides *which* offset and size to hand out; it holds no pointer into
//! the managed range and performs no I/O. Callers map the returned offsets
//! onto pages, heap regions, device memory, or anything else addressable by
//! a byte offset.
//!
//! All bookkeeping lives in storage allocated once at construction: a
//! bit-per-node status bitmap over the implicit binary tree of blocks, a
//! permanent registry of block records, and one intrusive free list per
//! block size. `allocate` and `release` run in `O(max_level)` and never
//! allocate.
//!
//! ```
//! use buddy_ledger::BuddyAllocator;
//!
//! // Eight pages of 4 KiB each.
//! let mut buddy = BuddyAllocator::new(3, 12).unwrap();
//!
//! // A block of 2^1 pages.
//! let block = buddy.allocate(1).unwrap();
//! assert_eq!(buddy.block_size(&block), 8192);
//! assert_eq!(block.offset() % 8192, 0);
//!
//! buddy.release(block);
//! ```
//!
//! The allocator assumes a single logical owner; embedders that share it
//! across threads must wrap it in their own mutual exclusion.

#![no_std]
#![forbid(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]
#![doc(html_root_url = "https://docs.rs/buddy-ledger/0.1.0")]

extern crate alloc;

mod bitmap;
mod block;
mod tree;

pub mod buddy;


use core::fmt;

pub use crate::buddy::{Block, BuddyAllocator};

/// The error type for allocator constructors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocInitError {
    /// The configuration of the allocator is invalid.
    ///
    /// This variant is returned when the requested `max_level` and
    /// `page_size_order` produce an arena or a node index space that cannot
    /// be represented in a `usize`.
    InvalidConfig,
}

impl fmt::Display for AllocInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocInitError::InvalidConfig => f.write_str("invalid allocator configuration"),
        }
    }
}

/// The error type for [`BuddyAllocator::allocate`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The requested order exceeds the allocator's `max_level`.
    InvalidOrder,

    /// No free block of the requested order, or any coarser one, exists.
    ///
    /// The allocator state is unchanged when this is returned; the embedder
    /// decides whether to wait, evict, or propagate the failure.
    Exhausted,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::InvalidOrder => f.write_str("requested order exceeds max_level"),
            AllocError::Exhausted => f.write_str("no free block of the requested order"),
        }
    }
}
