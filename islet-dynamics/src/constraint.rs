//! The joint contract: how a constraint describes its solver rows.
//!
//! The dynamics core never looks inside a joint. During Jacobian assembly it
//! hands the joint a [`ConstraintDescriptor`] to fill, packs the returned
//! rows into the island's slice of the solver matrix, and after the solve
//! reports the per-row forces back through [`Constraint::store_row_forces`].

use nalgebra::Vector3;

use islet_types::{consts, BodyId, JointKind, RigidBody};

/// One half of a constraint row: the linear and angular parts of a Jacobian
/// applied to one body. Also serves as the per-body internal force
/// accumulator of the solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jacobian {
    /// Linear part.
    pub linear: Vector3<f64>,
    /// Angular part.
    pub angular: Vector3<f64>,
}

impl Default for Jacobian {
    fn default() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }
}

/// A full constraint row: Jacobians for both endpoint bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JacobianPair {
    /// Jacobian applied to the first endpoint.
    pub j0: Jacobian,
    /// Jacobian applied to the second endpoint.
    pub j1: Jacobian,
}

/// Force bounds of one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceBound {
    /// Lower force bound.
    pub low: f64,
    /// Upper force bound.
    pub upper: f64,
    /// Row (within this joint) whose force scales the friction bounds.
    /// `None` marks the row as its own normal; it is packed as pointing one
    /// past the joint's last row.
    pub normal_index: Option<usize>,
}

impl Default for ForceBound {
    fn default() -> Self {
        Self {
            low: consts::MIN_BOUND,
            upper: consts::MAX_BOUND,
            normal_index: None,
        }
    }
}

/// The descriptor a joint fills during [`Constraint::describe`]: one entry
/// per row, up to [`consts::CONSTRAINT_MAX_ROWS`].
#[derive(Debug, Clone)]
pub struct ConstraintDescriptor {
    /// Step size, seconds.
    pub timestep: f64,
    /// Reciprocal step size.
    pub inv_timestep: f64,
    /// Row Jacobians.
    pub jacobians: [JacobianPair; consts::CONSTRAINT_MAX_ROWS],
    /// Per-row coordinate acceleration.
    pub joint_accel: [f64; consts::CONSTRAINT_MAX_ROWS],
    /// Per-row stiffness in [0, 1]; 1 is fully rigid.
    pub joint_stiffness: [f64; consts::CONSTRAINT_MAX_ROWS],
    /// Per-row restitution.
    pub restitution: [f64; consts::CONSTRAINT_MAX_ROWS],
    /// Per-row penetration depth.
    pub penetration: [f64; consts::CONSTRAINT_MAX_ROWS],
    /// Per-row penetration recovery stiffness.
    pub penetration_stiffness: [f64; consts::CONSTRAINT_MAX_ROWS],
    /// Per-row force bounds.
    pub bounds: [ForceBound; consts::CONSTRAINT_MAX_ROWS],
}

impl ConstraintDescriptor {
    /// Create a descriptor with every row at its defaults: unbounded
    /// friction, no normal coupling, full stiffness.
    #[must_use]
    pub fn new(timestep: f64) -> Self {
        Self {
            timestep,
            inv_timestep: 1.0 / timestep,
            jacobians: [JacobianPair::default(); consts::CONSTRAINT_MAX_ROWS],
            joint_accel: [0.0; consts::CONSTRAINT_MAX_ROWS],
            joint_stiffness: [1.0; consts::CONSTRAINT_MAX_ROWS],
            restitution: [0.0; consts::CONSTRAINT_MAX_ROWS],
            penetration: [0.0; consts::CONSTRAINT_MAX_ROWS],
            penetration_stiffness: [0.0; consts::CONSTRAINT_MAX_ROWS],
            bounds: [ForceBound::default(); consts::CONSTRAINT_MAX_ROWS],
        }
    }
}

/// Read-only body views handed to [`Constraint::describe`].
///
/// The views are immutable, so a describing joint cannot reach back into
/// the world mid-assembly.
#[derive(Debug, Clone, Copy)]
pub struct DescribeContext<'a> {
    /// First endpoint body.
    pub body0: &'a RigidBody,
    /// Second endpoint body.
    pub body1: &'a RigidBody,
    /// Step size, seconds.
    pub timestep: f64,
}

/// A constraint edge between two bodies.
///
/// Implementations live outside the dynamics core (contact manifolds,
/// hinges, sliders, inverse-dynamics joints). The core calls `describe`
/// during assembly, inside worker tasks; `store_row_forces` and
/// `reset_inverse_dynamics` are called on the calling thread when the
/// island's results are merged.
pub trait Constraint: Send + Sync {
    /// Contact or bilateral.
    fn kind(&self) -> JointKind;

    /// The two endpoint bodies.
    fn bodies(&self) -> (BodyId, BodyId);

    /// Upper bound on the rows this joint contributes.
    fn max_dof(&self) -> usize;

    /// Contacts: whether the manifold currently has active points.
    /// Bilateral joints are always active.
    fn is_active(&self) -> bool {
        true
    }

    /// Fill the descriptor's rows; returns the number actually used
    /// (at most [`Constraint::max_dof`]).
    fn describe(&self, ctx: &DescribeContext<'_>, desc: &mut ConstraintDescriptor) -> usize;

    /// Receive the solved per-row forces, in described row order.
    fn store_row_forces(&mut self, _forces: &[f64]) {}

    /// Clear any inverse-dynamics state after a solve.
    fn reset_inverse_dynamics(&mut self) {}
}
