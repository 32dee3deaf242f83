//! The block registry and per-level free lists.
//!
//! Every tree node owns one permanently assigned [`BlockRecord`] in the
//! registry, located at the node's tree index. Records are never created or
//! destroyed after construction; splitting, allocating, and coalescing only
//! change their level/offset fields and their free-list membership.
//!
//! The free lists are intrusive and doubly linked, but the links are
//! registry indices rather than pointers, so relinking is O(1) with no
//! aliasing or lifetime hazards. A record that is not on a list always has
//! both link fields empty; every removal clears them.

use alloc::{boxed::Box, vec};
use core::{
    mem,
    ops::{Index, IndexMut},
};

/// Index of a block record, equal to the block's tree node index.
pub(crate) type NodeId = usize;

/// Bookkeeping record for one tree node.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct BlockRecord {
    /// Depth in the tree; 0 is the whole arena.
    pub level: u32,
    /// Byte offset of the block from the start of the arena.
    pub offset: usize,
    /// Previous record in this record's free list, `Some` only while linked.
    pub prev: Option<NodeId>,
    /// Next record in this record's free list, `Some` only while linked.
    pub next: Option<NodeId>,
}

/// A preallocated array of one record per tree node.
pub(crate) struct Registry {
    records: Box<[BlockRecord]>,
}

impl Registry {
    /// Constructs a registry of `node_count` default records.
    pub fn new(node_count: usize) -> Registry {
        Registry {
            records: vec![BlockRecord::default(); node_count].into_boxed_slice(),
        }
    }

    /// Size of the backing storage in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.records.len() * mem::size_of::<BlockRecord>()
    }
}

impl Index<NodeId> for Registry {
    type Output = BlockRecord;

    fn index(&self, node: NodeId) -> &BlockRecord {
        &self.records[node]
    }
}

impl IndexMut<NodeId> for Registry {
    fn index_mut(&mut self, node: NodeId) -> &mut BlockRecord {
        &mut self.records[node]
    }
}

/// One free-list head per level.
///
/// Lists are unordered; pushes go to the front, so the most recently split
/// or released block is reused first.
pub(crate) struct FreeLists {
    heads: Box<[Option<NodeId>]>,
}

impl FreeLists {
    /// Constructs `levels` empty lists.
    pub fn new(levels: usize) -> FreeLists {
        FreeLists {
            heads: vec![None; levels].into_boxed_slice(),
        }
    }

    /// Returns the front of `level`'s list without removing it.
    pub fn head(&self, level: u32) -> Option<NodeId> {
        self.heads[level as usize]
    }

    /// Pushes `node` onto the front of `level`'s list.
    pub fn push(&mut self, registry: &mut Registry, level: u32, node: NodeId) {
        let old_head = self.heads[level as usize];

        if let Some(h) = old_head {
            registry[h].prev = Some(node);
        }

        let record = &mut registry[node];
        record.prev = None;
        record.next = old_head;

        self.heads[level as usize] = Some(node);
    }

    /// Pops the front of `level`'s list, clearing the removed record's links.
    pub fn pop(&mut self, registry: &mut Registry, level: u32) -> Option<NodeId> {
        let head = self.heads[level as usize]?;

        let next = registry[head].next.take();
        if let Some(n) = next {
            registry[n].prev = None;
        }

        self.heads[level as usize] = next;

        Some(head)
    }

    /// Unlinks `node` from wherever it sits in `level`'s list.
    ///
    /// Needed by coalescing, which withdraws a buddy that is not necessarily
    /// at the head. Both link fields of the removed record are cleared.
    pub fn unlink(&mut self, registry: &mut Registry, level: u32, node: NodeId) {
        let BlockRecord { prev, next, .. } = registry[node];

        match prev {
            // Link `prev` forward to `next`.
            Some(p) => registry[p].next = next,

            // If there's no previous record, then `node` is the head.
            None => self.heads[level as usize] = next,
        }

        if let Some(n) = next {
            // Link `next` back to `prev`.
            registry[n].prev = prev;
        }

        let record = &mut registry[node];
        record.prev = None;
        record.next = None;
    }

    /// Size of the backing storage in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.heads.len() * mem::size_of::<Option<NodeId>>()
    }
}
