//! Collision-side contracts.
//!
//! The dynamics core consumes collision services through these traits: the
//! continuous-collision probe feeding the CCD trigger, the broad-phase AABB
//! refresh after velocity integration, and the open-loop force integrator
//! for deformable bodies.

use nalgebra::{Point3, UnitQuaternion, Vector3};

use islet_types::{BodyId, BodyMotion, RigidBody, ShapeId};

/// One body's state handed to a continuous-collision probe.
#[derive(Debug, Clone, Copy)]
pub struct CcdBodyState {
    /// Collision shape handle.
    pub shape: ShapeId,
    /// World position.
    pub position: Point3<f64>,
    /// World orientation.
    pub rotation: UnitQuaternion<f64>,
    /// Centre of mass, world coordinates.
    pub com: Point3<f64>,
    /// Linear velocity.
    pub veloc: Vector3<f64>,
    /// Angular velocity.
    pub omega: Vector3<f64>,
}

impl CcdBodyState {
    /// Snapshot a body for a probe.
    #[must_use]
    pub fn from_body(body: &RigidBody) -> Self {
        Self {
            shape: body.shape,
            position: body.motion.position,
            rotation: body.motion.rotation,
            com: body.global_com(),
            veloc: body.motion.veloc,
            omega: body.motion.omega,
        }
    }
}

/// A candidate contact discovered by a continuous-collision probe.
#[derive(Debug, Clone, Copy)]
pub struct CcdContact {
    /// Contact point, world coordinates.
    pub point: Point3<f64>,
    /// Contact normal, pointing from the first body to the second.
    pub normal: Vector3<f64>,
    /// Penetration depth along the normal.
    pub penetration: f64,
    /// Shape-defined attribute of the first body's face.
    pub attribute0: u64,
    /// Shape-defined attribute of the second body's face.
    pub attribute1: u64,
}

/// Collision services the dynamics update consumes.
pub trait CollisionEngine: Send + Sync {
    /// Sweep two shapes over one timestep, appending up to
    /// [`consts::CCD_MAX_PROBE_CONTACTS`] candidate contacts.
    ///
    /// [`consts::CCD_MAX_PROBE_CONTACTS`]: islet_types::consts::CCD_MAX_PROBE_CONTACTS
    fn collide_continue(
        &self,
        body0: &CcdBodyState,
        body1: &CcdBodyState,
        timestep: f64,
        out: &mut Vec<CcdContact>,
    );

    /// Refresh the broad-phase entry of a body after velocity integration.
    ///
    /// Called from worker tasks; implementations must synchronize
    /// internally.
    fn update_collision_matrix(
        &self,
        body: BodyId,
        motion: &BodyMotion,
        timestep: f64,
        thread_id: usize,
    );
}

/// Integrator for deformable bodies, invoked single-threaded under the
/// world's soft-body lock because deformable state may be shared between
/// islands.
pub trait SoftBodyIntegrator: Send + Sync {
    /// Apply open-loop external forces to a deformable body.
    fn integrate_open_loop(&self, body: BodyId, motion: &mut BodyMotion, timestep: f64);
}
