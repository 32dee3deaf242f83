//! A binary-buddy bookkeeping allocator.
//!
//! The allocator tracks free and used power-of-two-sized ranges of an
//! implicit arena. Allocation walks the free lists from the requested block
//! size toward the whole arena and splits the first free block it finds;
//! release re-merges a block with its buddy whenever both halves of a pair
//! are whole and free, so no two buddies are ever simultaneously free and
//! unmerged.

use core::fmt;

use crate::{
    bitmap::Bitmap,
    block::{BlockRecord, FreeLists, NodeId, Registry},
    tree, AllocError, AllocInitError,
};

/// A power-of-two-sized range checked out of a [`BuddyAllocator`].
///
/// A `Block` identifies the range but grants no access to any memory; the
/// embedder maps [`offset`] and [`BuddyAllocator::block_size`] onto its own
/// arena. The handle is move-only and cannot be constructed outside the
/// crate: it exists from the `allocate` that issued it until the `release`
/// that consumes it, which makes releasing the same block twice a compile
/// error rather than silent corruption.
///
/// [`offset`]: Block::offset
#[derive(Debug, PartialEq, Eq)]
pub struct Block {
    level: u32,
    offset: usize,
}

impl Block {
    /// Depth of this block in the tree; level 0 is the whole arena.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Byte offset of this block from the start of the arena.
    ///
    /// Always a multiple of the block's size.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// A binary-buddy allocator over an implicit arena of
/// `2^(max_level + page_size_order)` bytes.
///
/// The allocator owns three pieces of storage, all sized at construction
/// and never resized:
///
/// - a status bitmap with one bit per node of the implicit block tree, set
///   when the node is checked out or has been split;
/// - a registry holding one permanent block record per node;
/// - one free-list head per level, linking the whole free blocks of that
///   level's size through the registry records.
///
/// Block sizes halve with each level down the tree: a block at `level`
/// spans `page_size << (max_level - level)` bytes.
pub struct BuddyAllocator {
    max_level: u32,
    page_size: usize,
    /// One bit per tree node; set means checked out or split.
    pub(crate) used: Bitmap,
    pub(crate) blocks: Registry,
    pub(crate) free: FreeLists,
}

impl BuddyAllocator {
    /// Creates an allocator managing `2^max_level` pages of
    /// `2^page_size_order` bytes each.
    ///
    /// All bookkeeping storage is allocated here, sized by `max_level`, and
    /// the whole arena starts out as one free block at offset 0. The
    /// metadata overhead relative to the arena size is reported through a
    /// `log` record at debug level.
    ///
    /// # Errors
    ///
    /// Returns [`AllocInitError::InvalidConfig`] if the node index space or
    /// the arena size would overflow a `usize`.
    pub fn new(max_level: u32, page_size_order: u32) -> Result<BuddyAllocator, AllocInitError> {
        // Node indices need max_level + 1 bits; the arena size needs
        // max_level + page_size_order bits.
        let usize_bits = u64::from(usize::BITS);
        if u64::from(max_level) + 1 >= usize_bits
            || u64::from(max_level) + u64::from(page_size_order) >= usize_bits
        {
            return Err(AllocInitError::InvalidConfig);
        }

        let node_count = tree::node_count(max_level);

        let mut allocator = BuddyAllocator {
            max_level,
            page_size: 1 << page_size_order,
            used: Bitmap::new(node_count),
            blocks: Registry::new(node_count),
            free: FreeLists::new(max_level as usize + 1),
        };

        // The root record stands for the whole arena, immediately free.
        allocator.blocks[0] = BlockRecord {
            level: 0,
            offset: 0,
            prev: None,
            next: None,
        };
        allocator.free.push(&mut allocator.blocks, 0, 0);

        let metadata_bytes = allocator.used.size_in_bytes()
            + allocator.blocks.size_in_bytes()
            + allocator.free.size_in_bytes();
        log::debug!(
            "created buddy allocator: {} levels, arena {} bytes, metadata {} bytes ({:.3}% overhead)",
            max_level + 1,
            allocator.total_size(),
            metadata_bytes,
            metadata_bytes as f64 / allocator.total_size() as f64 * 100.0,
        );

        Ok(allocator)
    }

    /// Allocates a block of `2^order` pages.
    ///
    /// The requested level is `max_level - order`. If no block of that size
    /// is free, the first free block at a coarser level is split downward
    /// until one is; within a level, the most recently freed or split block
    /// is taken first. Worst case `O(max_level)`, with no storage allocated.
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidOrder`] if `order > max_level`.
    /// - [`AllocError::Exhausted`] if no free block of the requested or any
    ///   coarser size exists. The allocator is unchanged in both cases.
    pub fn allocate(&mut self, order: u32) -> Result<Block, AllocError> {
        if order > self.max_level {
            return Err(AllocError::InvalidOrder);
        }

        let target = self.max_level - order;

        // Scan toward the root for a level with a free block. Nothing is
        // mutated until the scan succeeds.
        let found = (0..=target)
            .rev()
            .find(|&level| self.free.head(level).is_some())
            .ok_or(AllocError::Exhausted)?;

        // Split downward until a block of the target size exists. Each
        // split retires the parent (its bit now means "divided") and stocks
        // the next level's list with both halves.
        for level in found..target {
            let divided = self
                .free
                .pop(&mut self.blocks, level)
                .expect("split source missing from free list");
            self.used.set(divided, true);
            self.split(divided, level);
        }

        let node = self
            .free
            .pop(&mut self.blocks, target)
            .expect("free block missing at target level");
        self.used.set(node, true);

        let record = &self.blocks[node];
        Ok(Block {
            level: record.level,
            offset: record.offset,
        })
    }

    /// Returns a block to the allocator, coalescing it with its buddy where
    /// possible.
    ///
    /// Merging walks toward the root and stops at the first level whose
    /// buddy is still checked out or divided, so the worst case is
    /// `O(max_level)`.
    ///
    /// Passing a `Block` issued by a different allocator instance is a
    /// caller-contract violation and is not detected.
    pub fn release(&mut self, block: Block) {
        let Block { mut level, offset } = block;
        let mut node = tree::index_of(level, offset, self.size_at_level(level));

        while level > 0 {
            let buddy = tree::sibling(node);
            self.used.set(node, false);

            if self.used.get(buddy) {
                // The buddy is checked out or divided; this block stays
                // whole at its own level.
                self.free.push(&mut self.blocks, level, node);
                return;
            }

            // The buddy is free and whole: withdraw it from its list and
            // let the parent stand for the pair.
            self.free.unlink(&mut self.blocks, level, buddy);
            node = tree::parent(node);
            level -= 1;
        }

        // Merged (or released) all the way up: the whole arena is free again.
        self.used.set(0, false);
        self.free.push(&mut self.blocks, 0, 0);
    }

    /// Creates both halves of `node` and stocks the next level's free list.
    ///
    /// The right half is pushed last, so it sits at the head and repeated
    /// splits descend through the most recently divided block.
    fn split(&mut self, node: NodeId, level: u32) {
        let child_level = level + 1;
        let child_size = self.size_at_level(child_level);
        let offset = self.blocks[node].offset;

        let left = tree::left_child(node);
        let right = left + 1;

        self.blocks[left] = BlockRecord {
            level: child_level,
            offset,
            prev: None,
            next: None,
        };
        self.blocks[right] = BlockRecord {
            level: child_level,
            offset: offset + child_size,
            prev: None,
            next: None,
        };

        self.free.push(&mut self.blocks, child_level, left);
        self.free.push(&mut self.blocks, child_level, right);
    }

    /// Size in bytes of a block of `2^order` pages.
    ///
    /// `order` must not exceed [`max_level`](Self::max_level).
    pub fn size_of_order(&self, order: u32) -> usize {
        self.page_size << order
    }

    /// Size in bytes of a checked-out block.
    pub fn block_size(&self, block: &Block) -> usize {
        self.size_at_level(block.level)
    }

    /// Total size in bytes of the managed arena.
    pub fn total_size(&self) -> usize {
        self.page_size << self.max_level
    }

    /// Size in bytes of the smallest allocatable unit.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Deepest level of the block tree; blocks at this level are single
    /// pages.
    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    fn size_at_level(&self, level: u32) -> usize {
        self.page_size << (self.max_level - level)
    }
}

impl fmt::Debug for BuddyAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuddyAllocator")
            .field("max_level", &self.max_level)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::AllocError;

    #[test]
    fn rejects_oversized_config() {
        assert!(matches!(
            BuddyAllocator::new(usize::BITS, 0),
            Err(AllocInitError::InvalidConfig)
        ));
        assert!(matches!(
            BuddyAllocator::new(1, usize::BITS - 1),
            Err(AllocInitError::InvalidConfig)
        ));
    }

    #[test]
    fn single_page_arena() {
        let mut buddy = BuddyAllocator::new(0, 4).unwrap();
        assert_eq!(buddy.total_size(), 16);

        let block = buddy.allocate(0).unwrap();
        assert_eq!(block.level(), 0);
        assert_eq!(block.offset(), 0);
        assert!(matches!(buddy.allocate(0), Err(AllocError::Exhausted)));

        buddy.release(block);
        let again = buddy.allocate(0).unwrap();
        assert_eq!(again.offset(), 0);
    }

    #[test]
    fn invalid_order_is_side_effect_free() {
        let mut buddy = BuddyAllocator::new(2, 4).unwrap();

        assert!(matches!(buddy.allocate(3), Err(AllocError::InvalidOrder)));
        assert!(matches!(buddy.allocate(100), Err(AllocError::InvalidOrder)));

        // The whole arena is still allocatable in one piece.
        let root = buddy.allocate(2).unwrap();
        assert_eq!(root.offset(), 0);
        assert_eq!(root.level(), 0);
    }

    #[test]
    fn exhaustion_is_complete() {
        // max_level = 3: eight pages of one byte.
        let mut buddy = BuddyAllocator::new(3, 0).unwrap();

        let blocks: Vec<Block> = (0..8).map(|_| buddy.allocate(0).unwrap()).collect();

        let mut offsets: Vec<usize> = blocks.iter().map(Block::offset).collect();
        offsets.sort_unstable();
        assert_eq!(offsets, (0..8).collect::<Vec<_>>());
        for block in &blocks {
            assert_eq!(block.level(), 3);
        }

        // Every order is exhausted, and repeatedly so.
        for order in 0..=3 {
            assert!(matches!(buddy.allocate(order), Err(AllocError::Exhausted)));
        }

        for block in blocks {
            buddy.release(block);
        }
    }

    #[test]
    fn full_release_coalesces_to_root() {
        let mut buddy = BuddyAllocator::new(3, 0).unwrap();

        let mut blocks: Vec<Block> = (0..8).map(|_| buddy.allocate(0).unwrap()).collect();

        // Release in a scrambled order: evens by offset, then odds.
        blocks.sort_by_key(|b| (b.offset() % 2, b.offset()));
        for block in blocks.drain(..) {
            buddy.release(block);
        }

        let root = buddy.allocate(3).unwrap();
        assert_eq!(root.offset(), 0);
        assert_eq!(root.level(), 0);
        assert!(matches!(buddy.allocate(3), Err(AllocError::Exhausted)));
    }

    #[test]
    fn whole_arena_round_trip() {
        // The concrete eight-page scenario: whole arena out, back, carved
        // into pages, back, whole again.
        let mut buddy = BuddyAllocator::new(3, 0).unwrap();

        let root = buddy.allocate(3).unwrap();
        assert_eq!(root.offset(), 0);
        assert_eq!(root.level(), 0);
        assert!(matches!(buddy.allocate(0), Err(AllocError::Exhausted)));
        buddy.release(root);

        let pages: Vec<Block> = (0..8).map(|_| buddy.allocate(0).unwrap()).collect();
        assert!(matches!(buddy.allocate(0), Err(AllocError::Exhausted)));
        for page in pages {
            buddy.release(page);
        }

        let root = buddy.allocate(3).unwrap();
        assert_eq!(root.offset(), 0);
        assert_eq!(root.level(), 0);
    }

    #[test]
    fn consecutive_page_allocations_are_buddies() {
        let mut buddy = BuddyAllocator::new(2, 0).unwrap();

        // Both halves of a freshly split pair are stocked together, so the
        // second allocation is the first one's buddy.
        let a = buddy.allocate(0).unwrap();
        let b = buddy.allocate(0).unwrap();
        assert_eq!(a.offset() ^ 1, b.offset());

        buddy.release(a);
        buddy.release(b);
    }

    #[test]
    fn coalesce_withdraws_list_interior() {
        // Four pages; frees are ordered so that coalescing has to unlink a
        // buddy that sits at the head of a longer list.
        let mut buddy = BuddyAllocator::new(2, 0).unwrap();

        let mut pages: Vec<Block> = (0..4).map(|_| buddy.allocate(0).unwrap()).collect();
        pages.sort_by_key(Block::offset);
        let d = pages.pop().unwrap();
        let c = pages.pop().unwrap();
        let b = pages.pop().unwrap();
        let a = pages.pop().unwrap();

        buddy.release(c);
        buddy.release(a);
        // Freeing b merges with a, whose record is the head of the
        // page-level list with c behind it.
        buddy.release(b);

        // Pages 0 and 1 are one block again.
        let half = buddy.allocate(1).unwrap();
        assert_eq!(half.offset(), 0);
        assert_eq!(half.level(), 1);
        buddy.release(half);

        buddy.release(d);
        let root = buddy.allocate(2).unwrap();
        assert_eq!(root.offset(), 0);
        assert_eq!(root.level(), 0);
    }

    #[test]
    fn sizes_and_queries() {
        let buddy = BuddyAllocator::new(4, 12).unwrap();

        assert_eq!(buddy.page_size(), 4096);
        assert_eq!(buddy.max_level(), 4);
        assert_eq!(buddy.size_of_order(0), 4096);
        assert_eq!(buddy.size_of_order(4), 65536);
        assert_eq!(buddy.total_size(), 65536);
    }

    #[test]
    fn mixed_orders_do_not_overlap() {
        let mut buddy = BuddyAllocator::new(4, 0).unwrap();

        let mut blocks = Vec::new();
        for order in [2, 0, 1, 0, 2, 1] {
            blocks.push(buddy.allocate(order).unwrap());
        }

        let mut ranges: Vec<(usize, usize)> = blocks
            .iter()
            .map(|b| (b.offset(), b.offset() + buddy.block_size(b)))
            .collect();
        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "ranges overlap: {:?}", pair);
        }

        for block in blocks {
            buddy.release(block);
        }
        let root = buddy.allocate(4).unwrap();
        assert_eq!(root.offset(), 0);
    }
}
