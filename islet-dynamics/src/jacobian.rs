//! Jacobian assembly: querying joints for their rows and packing them into
//! the island's slice of the solver matrix.

use islet_types::consts;

use crate::arena::round_up_to_row_block;
use crate::constraint::{ConstraintDescriptor, DescribeContext, JacobianPair};
use crate::cluster::JointInfo;
use crate::world::JointSlot;
use islet_types::RigidBody;

/// One packed row of the solver matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolverRow {
    /// Jacobian transpose for both endpoints.
    pub jacobian: JacobianPair,
    /// Diagonal damping; zero at pack time, owned by the solver.
    pub diag_damp: f64,
    /// Row regularizer derived from the joint stiffness.
    pub stiffness: f64,
    /// Coordinate acceleration.
    pub coord_accel: f64,
    /// Restitution.
    pub restitution: f64,
    /// Penetration depth.
    pub penetration: f64,
    /// Penetration recovery stiffness.
    pub penetration_stiffness: f64,
    /// Lower friction bound.
    pub lower_friction: f64,
    /// Upper friction bound.
    pub upper_friction: f64,
    /// Row (within the owning joint) whose force scales this row's friction
    /// bounds; the joint's row count when the row is its own normal.
    pub normal_force_index: usize,
    /// Accumulated constraint force; written by the solver, reported back
    /// to the joint at merge.
    pub force: f64,
}

/// Query one joint for its rows and pack them at the end of `rows`,
/// padding to the row block. Returns the rows actually used.
///
/// `info.pair_start`/`info.pair_count` are rewritten from the build-phase
/// budget to the packed location and actual count.
pub(crate) fn assemble_joint_rows(
    slot: &JointSlot,
    info: &mut JointInfo,
    body0: &RigidBody,
    body1: &RigidBody,
    timestep: f64,
    rows: &mut Vec<SolverRow>,
) -> usize {
    let max_dof = slot.constraint.max_dof();
    debug_assert!(max_dof <= consts::CONSTRAINT_MAX_ROWS);

    let mut desc = ConstraintDescriptor::new(timestep);
    let ctx = DescribeContext {
        body0,
        body1,
        timestep,
    };
    let dof = slot.constraint.describe(&ctx, &mut desc);
    debug_assert!(dof <= max_dof);

    let row_start = rows.len();
    info.pair_start = row_start as u32;
    info.pair_count = dof as u16;

    for i in 0..dof {
        let bound = desc.bounds[i];
        debug_assert!(desc.joint_stiffness[i] <= 1.0);
        rows.push(SolverRow {
            jacobian: desc.jacobians[i],
            diag_damp: 0.0,
            stiffness: (consts::PSD_DAMP_TOL * (1.0 - desc.joint_stiffness[i]))
                .max(consts::MIN_ROW_STIFFNESS),
            coord_accel: desc.joint_accel[i],
            restitution: desc.restitution[i],
            penetration: desc.penetration[i],
            penetration_stiffness: desc.penetration_stiffness[i],
            lower_friction: bound.low,
            upper_friction: bound.upper,
            normal_force_index: bound.normal_index.unwrap_or(dof),
            force: 0.0,
        });
    }

    let padded = row_start + round_up_to_row_block(dof);
    rows.resize(padded, SolverRow::default());
    dof
}
