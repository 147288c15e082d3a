//! The inner-solver contract.
//!
//! The iterative constraint solver (PGS, LCP, skeleton solver, ...) lives
//! outside the dynamics core. Per island it receives an [`IslandView`]: body
//! snapshots with the sentinel in slot 0, the BFS-ordered joint infos, the
//! packed solver rows, and a per-body force accumulator. It writes new
//! velocities and accelerations into the body snapshots and accumulated
//! forces into the rows; the core merges those results into the world.

use islet_types::{BodyId, BodyMotion, RigidBody};

use crate::cluster::JointInfo;
use crate::constraint::Jacobian;
use crate::jacobian::SolverRow;

/// Snapshot of one island body handed to the solver and the velocity
/// integrator. Slot 0 is always the sentinel.
#[derive(Debug, Clone)]
pub struct IslandBody {
    /// The world body this snapshot was taken from.
    pub body: BodyId,
    /// Inverse mass; zero for the sentinel.
    pub inv_mass: f64,
    /// Pose, velocities, and accelerations.
    pub motion: BodyMotion,
    /// Kinematically at rest this step.
    pub equilibrium: bool,
    /// Consensus at rest.
    pub resting: bool,
    /// Retired; written by the island sleep decision.
    pub sleeping: bool,
    /// Permission to sleep.
    pub auto_sleep: bool,
    /// Consecutive quiet steps.
    pub sleeping_counter: u32,
}

impl IslandBody {
    pub(crate) fn from_body(id: BodyId, body: &RigidBody) -> Self {
        Self {
            body: id,
            inv_mass: body.inv_mass,
            motion: body.motion,
            equilibrium: body.equilibrium,
            resting: body.resting,
            sleeping: body.sleeping,
            auto_sleep: body.auto_sleep,
            sleeping_counter: body.sleeping_counter,
        }
    }
}

/// Everything the solver sees of one island.
#[derive(Debug)]
pub struct IslandView<'a> {
    /// Island bodies; slot 0 is the sentinel.
    pub bodies: &'a mut [IslandBody],
    /// Joint infos in solver order.
    pub joints: &'a [JointInfo],
    /// Packed solver rows; `JointInfo::pair_start` indexes into this slice.
    pub rows: &'a mut [SolverRow],
    /// Per-body internal force accumulators, parallel to `bodies`.
    pub forces: &'a mut [Jacobian],
    /// Joints whose endpoints are not both resting.
    pub active_joints: usize,
    /// Island was flagged by the CCD trigger.
    pub is_continuous_collision: bool,
    /// Step size, seconds.
    pub timestep: f64,
}

/// The iterative per-island constraint solver.
pub trait IslandSolver: Send + Sync {
    /// Solve one island on the current thread.
    fn solve(&self, island: &mut IslandView<'_>);

    /// Solve one large island with intra-island parallelism. Called
    /// synchronously from the scheduler for promoted islands; the default
    /// forwards to [`IslandSolver::solve`].
    fn solve_parallel(&self, island: &mut IslandView<'_>) {
        self.solve(island);
    }
}
