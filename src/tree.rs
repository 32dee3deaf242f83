//! Index arithmetic for the implicit complete binary tree of blocks.
//!
//! Nodes use heap numbering: the root is 0, the children of node `i` are
//! `2i + 1` and `2i + 2`, and the parent of node `c` is `(c - 1) / 2`. A
//! node is equally identified by its `(level, offset)` pair; the two forms
//! must always agree, and [`index_of`] is the bridge between them.
//!
//! These functions are pure integer arithmetic on internally derived values;
//! none of them can fail on inputs that respect the tree bounds.

/// Number of nodes in a tree with levels `0..=max_level`.
pub(crate) const fn node_count(max_level: u32) -> usize {
    (1 << (max_level + 1)) - 1
}

/// Index of the leftmost node at `level`.
pub(crate) const fn first_at_level(level: u32) -> usize {
    (1 << level) - 1
}

/// Index of the node at `level` whose block starts `offset` bytes into the
/// arena, given the block size at that level.
pub(crate) const fn index_of(level: u32, offset: usize, block_size: usize) -> usize {
    first_at_level(level) + offset / block_size
}

/// Index of the left child of `index`; the right child follows it.
pub(crate) const fn left_child(index: usize) -> usize {
    2 * index + 1
}

/// Index of the parent of `index`. The root has no parent.
pub(crate) const fn parent(index: usize) -> usize {
    (index - 1) / 2
}

/// Index of the other child of this node's parent.
///
/// Left children have even 1-based positions within their level, so the
/// flip is on the low bit of the index itself.
pub(crate) const fn sibling(index: usize) -> usize {
    if index % 2 == 0 {
        index - 1
    } else {
        index + 1
    }
}
