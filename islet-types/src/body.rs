//! Rigid body state and step-lifecycle flags.
//!
//! A [`RigidBody`] is one slot in the world's master body list. Besides mass
//! and motion state it carries the per-step lifecycle flags the dynamics
//! update reads and writes: equilibrium, resting, sleeping, and the epoch
//! marks that stand in for per-step visited sets.

use nalgebra::{Point3, UnitQuaternion, Vector3};

use crate::joint::SkeletonId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier for a body: its slot in the world's master list.
///
/// Slot 0 is always the sentinel (the zero-inverse-mass "world/ground" body
/// that occupies position 0 of every solver island).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub u32);

impl BodyId {
    /// The sentinel body's id.
    pub const SENTINEL: Self = Self(0);

    /// Create a new body id.
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

impl From<u32> for BodyId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Body({})", self.0)
    }
}

/// Opaque handle to a collision shape owned by the collision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShapeId(pub u32);

impl ShapeId {
    /// Create a new shape handle.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw handle value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// The motion bundle a solver or the broad phase sees: pose, velocities,
/// and accelerations.
///
/// Extracted from a [`RigidBody`] before an island solve and applied back
/// when the island's results are merged.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyMotion {
    /// Linear velocity in world coordinates (m/s).
    pub veloc: Vector3<f64>,
    /// Angular velocity in world coordinates (rad/s).
    pub omega: Vector3<f64>,
    /// Linear acceleration, external forces included (m/s²).
    pub accel: Vector3<f64>,
    /// Angular acceleration (rad/s²).
    pub alpha: Vector3<f64>,
    /// Position in world coordinates.
    pub position: Point3<f64>,
    /// Orientation as a unit quaternion.
    pub rotation: UnitQuaternion<f64>,
}

impl Default for BodyMotion {
    fn default() -> Self {
        Self {
            veloc: Vector3::zeros(),
            omega: Vector3::zeros(),
            accel: Vector3::zeros(),
            alpha: Vector3::zeros(),
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }
}

impl BodyMotion {
    /// Advance the pose by one timestep using the current velocities.
    ///
    /// Rotation uses the exponential map (`q' = exp(ω·dt)·q`), which avoids
    /// quaternion drift for the step sizes a fixed-rate simulation uses.
    pub fn integrate_velocity(&mut self, timestep: f64) {
        self.position += self.veloc * timestep;

        if self.omega.norm_squared() > 1.0e-20 {
            let delta = UnitQuaternion::from_scaled_axis(self.omega * timestep);
            self.rotation = delta * self.rotation;
        }
    }

    /// True when every component of every vector is exactly zero.
    ///
    /// Bodies whose combined motion indicator is zero are skipped by the
    /// velocity integrator and count as being in equilibrium.
    #[must_use]
    pub fn is_at_rest(&self) -> bool {
        self.veloc == Vector3::zeros()
            && self.omega == Vector3::zeros()
            && self.accel == Vector3::zeros()
            && self.alpha == Vector3::zeros()
    }

    /// Zero velocities and accelerations, keeping the pose.
    pub fn clear(&mut self) {
        self.veloc = Vector3::zeros();
        self.omega = Vector3::zeros();
        self.accel = Vector3::zeros();
        self.alpha = Vector3::zeros();
    }

    /// Check for `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.veloc.iter().all(|x| x.is_finite())
            && self.omega.iter().all(|x| x.is_finite())
            && self.accel.iter().all(|x| x.is_finite())
            && self.alpha.iter().all(|x| x.is_finite())
            && self.position.coords.iter().all(|x| x.is_finite())
            && self.rotation.coords.iter().all(|x| x.is_finite())
    }
}

/// A simulated rigid object: mass properties, motion state, collision shape
/// reference, and the step-lifecycle bookkeeping of the dynamics update.
///
/// Zero inverse mass means infinite mass: the body is static, terminates the
/// master-list walk, and maps to the sentinel slot inside solver islands.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidBody {
    /// Mass in kg (`f64::INFINITY` for static bodies).
    pub mass: f64,
    /// Inverse mass; zero for static bodies.
    pub inv_mass: f64,
    /// Pose and velocities.
    pub motion: BodyMotion,
    /// Centre of mass offset from the body origin, local coordinates.
    pub com_offset: Vector3<f64>,
    /// Collision shape handle.
    pub shape: ShapeId,
    /// Smallest bounding radius of the shape, cached for CCD heuristics.
    pub min_bounding_radius: f64,
    /// Owning skeleton, if this body is part of an articulated container.
    pub skeleton: Option<SkeletonId>,

    /// Kinematically at rest this step.
    pub equilibrium: bool,
    /// Consensus at rest (conservatively cleared during constraint ordering).
    pub resting: bool,
    /// Retired until perturbed.
    pub sleeping: bool,
    /// Permission to sleep.
    pub auto_sleep: bool,
    /// Externally pinned: never seeds an island this step.
    pub freeze: bool,
    /// Created mid-step from a callback; skipped this step.
    pub spawned_from_callback: bool,
    /// Continuous-collision opt-in.
    pub continuous_collision: bool,
    /// Participates in collision at all.
    pub collidable: bool,
    /// Part of a deformable mesh; routes its island to the soft-body path.
    pub is_deformable: bool,

    /// Step epoch at which this body was last claimed by a cluster.
    pub dynamics_epoch: u32,
    /// Slot within the owning cluster's body array (0 = sentinel).
    pub index: u32,
    /// Consecutive quiet steps, feeding the sleep table.
    pub sleeping_counter: u32,
}

impl RigidBody {
    /// Create a dynamic body.
    ///
    /// `min_bounding_radius` is the smallest bounding-sphere radius of the
    /// collision shape; the CCD trigger derives its travel budget from it.
    #[must_use]
    pub fn dynamic(mass: f64, shape: ShapeId, min_bounding_radius: f64) -> Self {
        let inv_mass = if mass > 0.0 && mass.is_finite() {
            1.0 / mass
        } else {
            0.0
        };
        Self {
            mass,
            inv_mass,
            motion: BodyMotion::default(),
            com_offset: Vector3::zeros(),
            shape,
            min_bounding_radius,
            skeleton: None,
            equilibrium: false,
            resting: false,
            sleeping: false,
            auto_sleep: true,
            freeze: false,
            spawned_from_callback: false,
            continuous_collision: false,
            collidable: true,
            is_deformable: false,
            dynamics_epoch: 0,
            index: 0,
            sleeping_counter: 0,
        }
    }

    /// Create a static (infinite mass) body.
    #[must_use]
    pub fn static_body(shape: ShapeId) -> Self {
        let mut body = Self::dynamic(f64::INFINITY, shape, 0.0);
        body.equilibrium = true;
        body.resting = true;
        body
    }

    /// Create the sentinel: the zero-inverse-mass "world/ground" body that
    /// occupies slot 0 of the master list and of every solver island.
    #[must_use]
    pub fn sentinel() -> Self {
        let mut body = Self::static_body(ShapeId::default());
        body.sleeping = true;
        body.collidable = false;
        body
    }

    /// Set the world position.
    #[must_use]
    pub fn with_position(mut self, position: Point3<f64>) -> Self {
        self.motion.position = position;
        self
    }

    /// Set the linear velocity.
    #[must_use]
    pub fn with_velocity(mut self, veloc: Vector3<f64>) -> Self {
        self.motion.veloc = veloc;
        self
    }

    /// Set the external acceleration (gravity plus applied forces over mass).
    #[must_use]
    pub fn with_external_accel(mut self, accel: Vector3<f64>) -> Self {
        self.motion.accel = accel;
        self
    }

    /// Opt into continuous collision detection.
    #[must_use]
    pub fn with_continuous_collision(mut self) -> Self {
        self.continuous_collision = true;
        self
    }

    /// Grant or revoke sleep permission.
    #[must_use]
    pub fn with_auto_sleep(mut self, auto_sleep: bool) -> Self {
        self.auto_sleep = auto_sleep;
        self
    }

    /// Mark as part of a deformable mesh.
    #[must_use]
    pub fn with_deformable(mut self) -> Self {
        self.is_deformable = true;
        self
    }

    /// Attach to a skeleton container.
    #[must_use]
    pub fn with_skeleton(mut self, skeleton: SkeletonId) -> Self {
        self.skeleton = Some(skeleton);
        self
    }

    /// True when the body has nonzero inverse mass.
    #[must_use]
    pub fn is_movable(&self) -> bool {
        self.inv_mass > 0.0
    }

    /// Centre of mass in world coordinates.
    #[must_use]
    pub fn global_com(&self) -> Point3<f64> {
        self.motion.position + self.motion.rotation * self.com_offset
    }

    /// Validate the mass properties and motion state.
    pub fn validate(&self) -> crate::Result<()> {
        if self.mass <= 0.0 && self.mass != f64::INFINITY {
            return Err(crate::DynamicsError::invalid_mass(
                "mass must be positive or infinity (static)",
            ));
        }
        if !self.motion.is_finite() {
            return Err(crate::DynamicsError::invalid_mass(
                "motion state must be finite",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_body_id() {
        let id = BodyId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(id.index(), 42);
        assert_eq!(id.to_string(), "Body(42)");
        assert_eq!(BodyId::SENTINEL.index(), 0);
    }

    #[test]
    fn test_dynamic_body_inverse_mass() {
        let body = RigidBody::dynamic(4.0, ShapeId::new(1), 0.5);
        assert_relative_eq!(body.inv_mass, 0.25, epsilon = 1e-12);
        assert!(body.is_movable());
        assert!(body.auto_sleep);
        assert!(!body.sleeping);
    }

    #[test]
    fn test_static_body() {
        let body = RigidBody::static_body(ShapeId::new(0));
        assert_eq!(body.inv_mass, 0.0);
        assert!(!body.is_movable());
        assert!(body.equilibrium);
    }

    #[test]
    fn test_sentinel_is_retired() {
        let sentinel = RigidBody::sentinel();
        assert_eq!(sentinel.inv_mass, 0.0);
        assert!(sentinel.sleeping);
        assert!(!sentinel.collidable);
    }

    #[test]
    fn test_motion_integrate_velocity() {
        let mut motion = BodyMotion {
            veloc: Vector3::new(1.0, 0.0, 0.0),
            ..Default::default()
        };
        motion.integrate_velocity(0.5);
        assert_relative_eq!(motion.position.x, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_motion_integrate_rotation() {
        let mut motion = BodyMotion {
            omega: Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            ..Default::default()
        };
        motion.integrate_velocity(1.0);

        // Quarter turn around Z maps +X to +Y.
        let rotated = motion.rotation * Vector3::x();
        assert_relative_eq!(rotated.y, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_motion_at_rest() {
        let mut motion = BodyMotion::default();
        assert!(motion.is_at_rest());
        motion.accel.y = -9.81;
        assert!(!motion.is_at_rest());
        motion.clear();
        assert!(motion.is_at_rest());
    }

    #[test]
    fn test_body_validation() {
        assert!(RigidBody::dynamic(1.0, ShapeId::new(0), 0.5)
            .validate()
            .is_ok());
        assert!(RigidBody::static_body(ShapeId::new(0)).validate().is_ok());

        let negative = RigidBody::dynamic(-1.0, ShapeId::new(0), 0.5);
        assert!(negative.validate().is_err());

        let mut nan = RigidBody::dynamic(1.0, ShapeId::new(0), 0.5);
        nan.motion.veloc.x = f64::NAN;
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_global_com() {
        let mut body = RigidBody::dynamic(1.0, ShapeId::new(0), 0.5)
            .with_position(Point3::new(1.0, 0.0, 0.0));
        body.com_offset = Vector3::new(0.0, 1.0, 0.0);
        let com = body.global_com();
        assert_relative_eq!(com.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(com.y, 1.0, epsilon = 1e-12);
    }
}
