//! Island-based dynamics update for rigid-body worlds.
//!
//! Each simulation step partitions the active bodies and constraints into
//! independent solver islands ("clusters"), orders each island's joints for
//! iterative solving, dispatches per-island solves across a worker pool, and
//! integrates the resulting velocities under a sleep policy that retires
//! quiescent islands atomically.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DynamicsWorld::update_dynamics          │
//! │  epochs → cluster build → sort → dispatch → soft bodies     │
//! └───────────────┬─────────────────────────────────────────────┘
//!                 │
//!                 ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Per-island resolve                      │
//! │  BFS joint ordering → Jacobian assembly → IslandSolver      │
//! │  → velocity integration + island sleep consensus            │
//! └───────────────┬─────────────────────────────────────────────┘
//!                 │
//!                 ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Merge (calling thread)                  │
//! │  arena write-back, body patches, joint force feedback       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The inner iterative solver, broad phase, contact generation, and
//! continuous-collision probes are external collaborators; they appear here
//! only through the [`IslandSolver`], [`CollisionEngine`], and
//! [`Constraint`] contracts.
//!
//! # Concurrency
//!
//! Islands are disjoint subgraphs, so per-island solves are independent.
//! Worker tasks claim sorted clusters through a shared atomic counter and
//! resolve them against read-only world state; results are merged on the
//! calling thread after the pool joins. The largest islands can instead be
//! promoted to a synchronous intra-island parallel solve, largest first.
//!
//! # Example
//!
//! ```no_run
//! use islet_dynamics::{CollisionEngine, DynamicsWorld, IslandSolver};
//! use islet_types::{RigidBody, ShapeId, Vector3, WorldConfig};
//!
//! fn run(collision: Box<dyn CollisionEngine>, solver: Box<dyn IslandSolver>) {
//!     let mut world = DynamicsWorld::new(WorldConfig::default(), collision, solver)
//!         .expect("default config is valid");
//!     world.add_body(
//!         RigidBody::dynamic(1.0, ShapeId::new(0), 0.5)
//!             .with_external_accel(Vector3::new(0.0, -9.81, 0.0)),
//!     )
//!     .expect("body is valid");
//!
//!     world.update_dynamics(1.0 / 60.0);
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,      // Many methods can't be const due to nalgebra
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::cast_possible_truncation,  // bounded cluster-local indices
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod arena;
mod ccd;
mod cluster;
mod collide;
mod constraint;
mod epoch;
mod integrate;
mod jacobian;
mod ordering;
mod schedule;
mod solver;
mod world;

pub use arena::{round_up_to_row_block, ScratchArena};
pub use cluster::{BodyCluster, BodyInfo, JointInfo};
pub use collide::{CcdBodyState, CcdContact, CollisionEngine, SoftBodyIntegrator};
pub use constraint::{
    Constraint, ConstraintDescriptor, DescribeContext, ForceBound, Jacobian, JacobianPair,
};
pub use epoch::EpochCounter;
pub use jacobian::SolverRow;
pub use solver::{IslandBody, IslandSolver, IslandView};
pub use world::{ClusterBodies, ClusterUpdateFn, DynamicsWorld, StepStats};

// Re-export the shared data types for convenience.
pub use islet_types::{
    consts, BodyId, BodyMotion, DynamicsError, JointId, JointKind, RigidBody, ShapeId, SkeletonId,
    SleepEntry, WorldConfig,
};
