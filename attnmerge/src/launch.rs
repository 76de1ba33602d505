//! Work partitioning for data-parallel kernels.
//!
//! Kernels are launched as a 1-D grid of blocks, each block holding
//! `block_dim` workers. A worker's linear index is
//! `block * block_dim + lane`; indices past the end of the work range
//! do nothing.

#![allow(clippy::module_name_repetitions)]

/// Grid/block sizing for a 1-D launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Number of blocks
    pub grid_dim: usize,
    /// Workers per block
    pub block_dim: usize,
}

impl LaunchConfig {
    /// Cover `total_work` workers with blocks of `block_dim`.
    ///
    /// # Panics
    /// Panics if `block_dim` is zero.
    #[must_use]
    pub fn for_work(total_work: usize, block_dim: usize) -> Self {
        assert!(block_dim > 0, "block_dim must be non-zero");
        Self {
            grid_dim: total_work.div_ceil(block_dim),
            block_dim,
        }
    }

    /// Total workers launched, including idle tail workers.
    #[must_use]
    pub const fn num_workers(&self) -> usize {
        self.grid_dim * self.block_dim
    }

    /// Linear worker index range covered by `block`.
    #[must_use]
    pub fn block_range(&self, block: usize) -> std::ops::Range<usize> {
        let start = block * self.block_dim;
        start..start + self.block_dim
    }
}

/// The `(token, head, pack)` coordinates owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub token: usize,
    pub head: usize,
    pub pack: usize,
}

impl WorkItem {
    /// Decompose a linear worker index.
    ///
    /// Returns `None` for indices at or past `tokens * heads * packs_per_head`.
    #[must_use]
    pub fn from_linear(
        idx: usize,
        tokens: usize,
        heads: usize,
        packs_per_head: usize,
    ) -> Option<Self> {
        let per_token = heads * packs_per_head;
        if idx >= tokens * per_token {
            return None;
        }
        Some(Self {
            token: idx / per_token,
            head: (idx % per_token) / packs_per_head,
            pack: idx % packs_per_head,
        })
    }

    /// Inverse of [`WorkItem::from_linear`].
    #[must_use]
    pub const fn to_linear(&self, heads: usize, packs_per_head: usize) -> usize {
        (self.token * heads + self.head) * packs_per_head + self.pack
    }

    /// Index into a `[tokens, heads]` LSE buffer.
    #[must_use]
    pub const fn lse_index(&self, heads: usize) -> usize {
        self.token * heads + self.head
    }

    /// First element of this worker's pack in a `[tokens, heads, head_dim]` buffer.
    #[must_use]
    pub const fn element_offset(&self, heads: usize, head_dim: usize, pack_width: usize) -> usize {
        (self.token * heads + self.head) * head_dim + self.pack * pack_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_for_work_exact() {
        let cfg = LaunchConfig::for_work(256, 128);
        assert_eq!(cfg.grid_dim, 2);
        assert_eq!(cfg.num_workers(), 256);
    }

    #[test]
    fn test_for_work_rounds_up() {
        let cfg = LaunchConfig::for_work(129, 128);
        assert_eq!(cfg.grid_dim, 2);
        assert_eq!(cfg.block_range(1), 128..256);
    }

    #[test]
    fn test_for_work_empty() {
        assert_eq!(LaunchConfig::for_work(0, 64).grid_dim, 0);
    }

    #[test]
    fn test_from_linear_decomposition() {
        // tokens=2, heads=3, packs_per_head=2
        let item = WorkItem::from_linear(7, 2, 3, 2).unwrap();
        assert_eq!(
            item,
            WorkItem {
                token: 1,
                head: 0,
                pack: 1
            }
        );
        assert_eq!(item.lse_index(3), 3);
        assert_eq!(item.element_offset(3, 8, 4), 3 * 8 + 4);
    }

    #[test]
    fn test_from_linear_out_of_range() {
        assert!(WorkItem::from_linear(12, 2, 3, 2).is_none());
        assert!(WorkItem::from_linear(usize::MAX, 2, 3, 2).is_none());
    }

    #[test]
    fn test_mapping_is_bijective_and_writes_disjoint() {
        let (tokens, heads, packs) = (3, 5, 4);
        let pack_width = 8;
        let head_dim = packs * pack_width;
        let mut seen = HashSet::new();
        let mut offsets = HashSet::new();
        for idx in 0..tokens * heads * packs {
            let item = WorkItem::from_linear(idx, tokens, heads, packs).unwrap();
            assert_eq!(item.to_linear(heads, packs), idx);
            assert!(seen.insert(item));
            let off = item.element_offset(heads, head_dim, pack_width);
            // Packs are laid out in worker order.
            assert_eq!(off, idx * pack_width);
            assert!(offsets.insert(off));
        }
    }
}
