//! Step-scoped scratch arenas.
//!
//! Four growable linear buffers back the dynamics update: body infos, joint
//! infos, solver-matrix rows, and per-body force accumulators. They are
//! reused across steps and grown when exceeded; growth only ever happens on
//! the calling thread during the serial phases. Writers reserve before
//! indexed stores: references taken before a
//! [`ScratchArena::reserve_at_least`] do not survive it, indices do.

use std::ops::{Index, IndexMut};

use islet_types::{consts, BodyId};

use crate::cluster::{BodyInfo, JointInfo};
use crate::constraint::Jacobian;
use crate::jacobian::SolverRow;

/// Round a row count up to the SIMD row block.
#[must_use]
pub fn round_up_to_row_block(rows: usize) -> usize {
    (rows + consts::ROW_BLOCK - 1) & !(consts::ROW_BLOCK - 1)
}

/// A step-scoped growable buffer.
#[derive(Debug, Clone)]
pub struct ScratchArena<T> {
    items: Vec<T>,
}

impl<T> Default for ScratchArena<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Default> ScratchArena<T> {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grow to at least `len` slots, default-filling new ones.
    pub fn reserve_at_least(&mut self, len: usize) {
        if self.items.len() < len {
            self.items.resize_with(len, T::default);
        }
    }

    /// Append an item, returning its slot.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push(item);
        self.items.len() - 1
    }

    /// Drop every slot past `len`.
    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    /// Drop every slot, keeping the allocation.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Number of live slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no slots are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The live slots.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// The live slots, mutable.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }
}

impl<T> Index<usize> for ScratchArena<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<T> IndexMut<usize> for ScratchArena<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.items[index]
    }
}

/// The four step-scoped arenas plus the traversal stack.
#[derive(Debug, Default)]
pub(crate) struct StepArenas {
    /// One record per body claimed by a cluster this step.
    pub body_info: ScratchArena<BodyInfo>,
    /// One record per joint claimed by a cluster this step.
    pub joint_info: ScratchArena<JointInfo>,
    /// The solver matrix, partitioned by cluster row ranges.
    pub rows: ScratchArena<SolverRow>,
    /// Per-body internal force accumulators for the serial solve paths.
    pub forces: ScratchArena<Jacobian>,
    /// Spanning-tree traversal stack.
    pub stack: Vec<BodyId>,
}

impl StepArenas {
    /// Reset the per-step buffers, keeping their allocations.
    pub fn begin_step(&mut self) {
        self.body_info.clear();
        self.joint_info.clear();
        self.stack.clear();
    }
}
