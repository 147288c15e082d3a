//! Core data types for the islet rigid-body dynamics update.
//!
//! This crate provides the shared vocabulary of the dynamics core:
//!
//! - [`RigidBody`] - Mass properties, motion state, and step-lifecycle flags
//! - [`BodyMotion`] - The motion bundle a solver or broad phase sees
//! - [`JointKind`] / id newtypes - Constraint-graph edge classification
//! - [`WorldConfig`] - Freeze thresholds, sleep table, parallel dispatch knobs
//! - [`DynamicsError`] - Construction and configuration failures
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They carry no traversal, no scheduling, no
//! solving. They are the common language between:
//!
//! - The dynamics update core (islet-dynamics)
//! - Constraint implementations (contacts, bilateral joints)
//! - Collision engines (broad phase, continuous collision)
//! - Logging and test harnesses
//!
//! The per-step subsystem itself never returns errors (inputs are validated
//! by the world API); [`DynamicsError`] exists for world construction and
//! configuration validation.
//!
//! # Example
//!
//! ```
//! use islet_types::{RigidBody, ShapeId};
//! use nalgebra::{Point3, Vector3};
//!
//! let body = RigidBody::dynamic(2.0, ShapeId::new(0), 0.5)
//!     .with_position(Point3::new(0.0, 1.0, 0.0))
//!     .with_external_accel(Vector3::new(0.0, -9.81, 0.0));
//!
//! assert!(body.is_movable());
//! assert!((body.inv_mass - 0.5).abs() < 1e-12);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,  // Many methods can't be const due to nalgebra
    clippy::cast_precision_loss,   // usize to f64 is fine for counts
    clippy::missing_errors_doc,    // Error docs added where non-obvious
)]

mod body;
mod config;
mod error;
mod joint;

pub use body::{BodyId, BodyMotion, RigidBody, ShapeId};
pub use config::{consts, ParallelDynamicsConfig, SleepEntry, WorldConfig};
pub use error::DynamicsError;
pub use joint::{JointId, JointKind, SkeletonId};

// Re-export math types for convenience
pub use nalgebra::{Point3, UnitQuaternion, Vector3};

/// Result type for dynamics-world operations.
pub type Result<T> = std::result::Result<T, DynamicsError>;
