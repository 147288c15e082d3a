//! Joint identifiers and classification.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier for a joint: its slot in the world's joint list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointId(pub u32);

impl JointId {
    /// Create a new joint id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Get the id as a slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for JointId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Joint({})", self.0)
    }
}

/// Identifier of a skeleton container (an articulated assembly of bodies).
///
/// Contacts between two bodies of the same skeleton are registered as
/// self-collision joints on that skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SkeletonId(pub u32);

impl SkeletonId {
    /// Create a new skeleton id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Classification of a constraint-graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointKind {
    /// A contact constraint produced by collision detection. Carries an
    /// active flag and a manifold-derived row count, and may trigger
    /// continuous collision handling.
    Contact,
    /// A bilateral constraint (hinge, slider, distance, ...). Always active.
    Bilateral,
}

impl JointKind {
    /// True for contact constraints.
    #[must_use]
    pub const fn is_contact(self) -> bool {
        matches!(self, Self::Contact)
    }
}
