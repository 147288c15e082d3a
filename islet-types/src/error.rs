//! Error types for world construction and configuration.
//!
//! The per-step dynamics update itself never surfaces errors; these cover
//! the world-building API around it.

use thiserror::Error;

/// Errors that can occur building or configuring a dynamics world.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DynamicsError {
    /// Invalid body ID referenced.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(u32),

    /// Invalid joint ID referenced.
    #[error("invalid joint ID: {0}")]
    InvalidJointId(u32),

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMass {
        /// Description of what's wrong.
        reason: String,
    },

    /// A static body was inserted after a movable one. The master-list walk
    /// requires statics to be grouped ahead of all dynamics.
    #[error("static body inserted after movable bodies")]
    StaticOrdering,

    /// A joint references the same body on both ends.
    #[error("joint connects body {0} to itself")]
    SelfJoint(u32),
}

impl DynamicsError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMass {
            reason: reason.into(),
        }
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }

    /// Check if this is an ordering violation.
    #[must_use]
    pub fn is_ordering_error(&self) -> bool {
        matches!(self, Self::StaticOrdering)
    }
}
