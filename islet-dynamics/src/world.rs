//! The dynamics world: master lists, the per-step update entry point, and
//! the observable step surface.
//!
//! All mutable step state (epoch counters, arenas, cluster records) is
//! bundled here and passed explicitly to the build, dispatch, and merge
//! phases; there are no process-wide statics beyond compile-time tuning
//! constants.

use std::sync::{Mutex, PoisonError};

use hashbrown::HashMap;

use islet_types::{
    consts, BodyId, DynamicsError, JointId, JointKind, RigidBody, SkeletonId, WorldConfig,
};

use crate::arena::StepArenas;
use crate::cluster::{BodyCluster, BodyInfo, ClusterBuilder, JointInfo};
use crate::collide::{CollisionEngine, SoftBodyIntegrator};
use crate::constraint::Constraint;
use crate::epoch::EpochCounter;
use crate::integrate::integrate_cluster_velocities;
use crate::jacobian::SolverRow;
use crate::schedule::cluster_sort_key;
use crate::solver::{IslandBody, IslandSolver};

/// One directed adjacency edge: a joint incident on a body, and the body on
/// the other end.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JointEdge {
    pub joint: JointId,
    pub other: BodyId,
}

/// A joint slot in the master list: the constraint object plus the step
/// bookkeeping the dynamics update owns.
pub(crate) struct JointSlot {
    pub body0: BodyId,
    pub body1: BodyId,
    pub kind: JointKind,
    /// Tag of the island that claimed this joint this step.
    pub cluster_epoch: u32,
    /// Step epoch at which this joint was last claimed.
    pub dynamics_epoch: u32,
    /// Cluster-local index; rewritten to solver order at merge.
    pub index: u32,
    pub constraint: Box<dyn Constraint>,
}

/// Body list of one island, handed to the cluster-update callback.
///
/// Slot 0 is the sentinel; out-of-range access returns `None`.
pub struct ClusterBodies<'a> {
    bodies: &'a [RigidBody],
    infos: &'a [BodyInfo],
}

impl<'a> ClusterBodies<'a> {
    pub(crate) fn new(bodies: &'a [RigidBody], infos: &'a [BodyInfo]) -> Self {
        Self { bodies, infos }
    }

    /// Number of bodies in the island, sentinel included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// True when the island is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Id of the i-th island body.
    #[must_use]
    pub fn id(&self, index: usize) -> Option<BodyId> {
        self.infos.get(index).map(|info| info.body)
    }

    /// The i-th island body, or `None` when out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'a RigidBody> {
        self.infos
            .get(index)
            .map(|info| &self.bodies[info.body.index()])
    }
}

/// Cluster veto callback: return `false` to silently discard the island for
/// this step (its bodies stay awake but unprocessed).
pub type ClusterUpdateFn = dyn Fn(&ClusterBodies<'_>) -> bool + Send + Sync;

/// Observable statistics of the last step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Bodies claimed by emitted clusters, sentinel slots included.
    pub body_count: usize,
    /// Joints claimed by emitted clusters.
    pub joint_count: usize,
    /// Emitted clusters.
    pub cluster_count: usize,
    /// Total solver rows reserved across all clusters.
    pub solver_rows: usize,
    /// Islands retired by the auto-sleep consensus (no cluster emitted).
    pub retired_islands: usize,
    /// Islands vetoed by the cluster-update callback.
    pub discarded_islands: usize,
    /// Islands promoted to intra-island parallel solves.
    pub promoted_islands: usize,
    /// Islands dispatched through the worker pool.
    pub pooled_islands: usize,
    /// Soft-body islands handled after the barrier.
    pub soft_islands: usize,
}

/// A rigid-body world and its per-step dynamics update.
pub struct DynamicsWorld {
    pub(crate) config: WorldConfig,
    pub(crate) bodies: Vec<RigidBody>,
    pub(crate) adjacency: Vec<Vec<JointEdge>>,
    pub(crate) joints: Vec<JointSlot>,
    pub(crate) collision: Box<dyn CollisionEngine>,
    pub(crate) solver: Box<dyn IslandSolver>,
    pub(crate) soft_integrator: Option<Box<dyn SoftBodyIntegrator>>,
    pub(crate) cluster_update: Option<Box<ClusterUpdateFn>>,

    step_counter: EpochCounter,
    cluster_counter: EpochCounter,
    pub(crate) step_mark: u32,
    movable_count: usize,

    pub(crate) arenas: StepArenas,
    pub(crate) clusters: Vec<BodyCluster>,
    pub(crate) body_total: usize,
    pub(crate) joint_total: usize,
    soft_body_lock: Mutex<()>,
    pub(crate) self_collision_registry: HashMap<SkeletonId, Vec<JointId>>,
    pub(crate) stats: StepStats,
}

impl DynamicsWorld {
    /// Create a world from a validated configuration and its collaborators.
    /// The sentinel body occupies slot 0.
    pub fn new(
        config: WorldConfig,
        collision: Box<dyn CollisionEngine>,
        solver: Box<dyn IslandSolver>,
    ) -> islet_types::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            bodies: vec![RigidBody::sentinel()],
            adjacency: vec![Vec::new()],
            joints: Vec::new(),
            collision,
            solver,
            soft_integrator: None,
            cluster_update: None,
            step_counter: EpochCounter::new(),
            cluster_counter: EpochCounter::new(),
            step_mark: 0,
            movable_count: 0,
            arenas: StepArenas::default(),
            clusters: Vec::new(),
            body_total: 0,
            joint_total: 0,
            soft_body_lock: Mutex::new(()),
            self_collision_registry: HashMap::new(),
            stats: StepStats::default(),
        })
    }

    /// Install the deformable-body integrator.
    #[must_use]
    pub fn with_soft_body_integrator(mut self, integrator: Box<dyn SoftBodyIntegrator>) -> Self {
        self.soft_integrator = Some(integrator);
        self
    }

    /// Install or remove the cluster veto callback.
    pub fn set_cluster_update(&mut self, callback: Option<Box<ClusterUpdateFn>>) {
        self.cluster_update = callback;
    }

    /// Append a body to the master list.
    ///
    /// Statics must be inserted before any movable body so they group ahead
    /// of the dynamics and terminate the build walk.
    pub fn add_body(&mut self, body: RigidBody) -> islet_types::Result<BodyId> {
        body.validate()?;
        if !body.is_movable() && self.movable_count > 0 {
            return Err(DynamicsError::StaticOrdering);
        }
        if body.is_movable() {
            self.movable_count += 1;
        }
        let id = BodyId::new(self.bodies.len() as u32);
        self.bodies.push(body);
        self.adjacency.push(Vec::new());
        Ok(id)
    }

    /// Register a constraint between two existing bodies.
    pub fn add_joint(&mut self, constraint: Box<dyn Constraint>) -> islet_types::Result<JointId> {
        let (body0, body1) = constraint.bodies();
        if body0.index() >= self.bodies.len() {
            return Err(DynamicsError::InvalidBodyId(body0.raw()));
        }
        if body1.index() >= self.bodies.len() {
            return Err(DynamicsError::InvalidBodyId(body1.raw()));
        }
        if body0 == body1 {
            return Err(DynamicsError::SelfJoint(body0.raw()));
        }

        let id = JointId::new(self.joints.len() as u32);
        self.adjacency[body0.index()].push(JointEdge {
            joint: id,
            other: body1,
        });
        self.adjacency[body1.index()].push(JointEdge {
            joint: id,
            other: body0,
        });
        self.joints.push(JointSlot {
            body0,
            body1,
            kind: constraint.kind(),
            cluster_epoch: 0,
            dynamics_epoch: 0,
            index: 0,
            constraint,
        });
        Ok(id)
    }

    /// The world configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Look up a body.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id.index())
    }

    /// Look up a body mutably.
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id.index())
    }

    /// Number of bodies, sentinel included.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of joints.
    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Look up a constraint.
    #[must_use]
    pub fn constraint(&self, id: JointId) -> Option<&dyn Constraint> {
        self.joints.get(id.index()).map(|slot| slot.constraint.as_ref())
    }

    /// Look up a constraint mutably.
    pub fn constraint_mut(&mut self, id: JointId) -> Option<&mut (dyn Constraint + '_)> {
        self.joints
            .get_mut(id.index())
            .map(move |slot| -> &mut (dyn Constraint + '_) { slot.constraint.as_mut() })
    }

    /// The current step epoch.
    #[must_use]
    pub fn dynamics_epoch(&self) -> u32 {
        self.step_counter.current()
    }

    /// Clusters emitted by the last step, in dispatch order.
    #[must_use]
    pub fn clusters(&self) -> &[BodyCluster] {
        &self.clusters
    }

    /// A cluster's body records.
    #[must_use]
    pub fn cluster_bodies(&self, cluster: &BodyCluster) -> &[BodyInfo] {
        &self.arenas.body_info.as_slice()[cluster.body_start..cluster.body_start + cluster.body_count]
    }

    /// A cluster's joint records, in solver order after the step.
    #[must_use]
    pub fn cluster_joints(&self, cluster: &BodyCluster) -> &[JointInfo] {
        &self.arenas.joint_info.as_slice()
            [cluster.joint_start..cluster.joint_start + cluster.joint_count]
    }

    /// A cluster's slice of the solver matrix.
    #[must_use]
    pub fn cluster_rows(&self, cluster: &BodyCluster) -> &[SolverRow] {
        &self.arenas.rows.as_slice()[cluster.rows_start..cluster.rows_start + cluster.rows_count]
    }

    /// The i-th body of a cluster, sentinel at 0; `None` out of range.
    #[must_use]
    pub fn cluster_body(&self, cluster: &BodyCluster, index: usize) -> Option<&RigidBody> {
        self.cluster_bodies(cluster)
            .get(index)
            .map(|info| &self.bodies[info.body.index()])
    }

    /// Row slots available in the solver matrix arena.
    #[must_use]
    pub fn solver_row_capacity(&self) -> usize {
        self.arenas.rows.len()
    }

    /// Self-collision contacts registered on a skeleton during the last
    /// step.
    #[must_use]
    pub fn skeleton_self_contacts(&self, skeleton: SkeletonId) -> &[JointId] {
        self.self_collision_registry
            .get(&skeleton)
            .map_or(&[], Vec::as_slice)
    }

    /// Statistics of the last step.
    #[must_use]
    pub fn stats(&self) -> StepStats {
        self.stats
    }

    /// Run one dynamics step.
    ///
    /// Partitions the active set into islands, orders and solves each
    /// island across the worker pool, and integrates velocities under the
    /// sleep policy. The world must not be mutated for the duration of the
    /// call; all dispatched work completes before it returns.
    pub fn update_dynamics(&mut self, timestep: f64) {
        debug_assert!(timestep > 0.0 && timestep.is_finite());

        self.body_total = 0;
        self.joint_total = 0;
        self.clusters.clear();
        self.arenas.begin_step();
        self.self_collision_registry.clear();
        self.stats = StepStats::default();

        let mark = self.step_counter.advance(consts::BODY_EPOCH_STEP);
        self.step_mark = mark;

        // Re-stamp the sentinel first; this also makes an epoch wrap safe.
        let sentinel = &mut self.bodies[0];
        sentinel.index = 0;
        sentinel.resting = true;
        sentinel.sleeping = true;
        sentinel.equilibrium = true;
        sentinel.dynamics_epoch = mark;

        self.build_clusters(timestep);

        self.clusters
            .sort_unstable_by(|a, b| cluster_sort_key(b).cmp(&cluster_sort_key(a)));

        let mut row_total = 0usize;
        let mut soft_count = 0usize;
        for cluster in &mut self.clusters {
            cluster.rows_start = row_total;
            row_total += cluster.rows_count;
            soft_count += usize::from(cluster.has_soft_bodies);
        }
        self.arenas.rows.reserve_at_least(row_total);
        self.arenas.forces.reserve_at_least(self.body_total + 8);

        self.stats.body_count = self.body_total;
        self.stats.joint_count = self.joint_total;
        self.stats.cluster_count = self.clusters.len();
        self.stats.solver_rows = row_total;
        self.stats.soft_islands = soft_count;

        tracing::debug!(
            clusters = self.clusters.len(),
            bodies = self.body_total,
            joints = self.joint_total,
            rows = row_total,
            soft = soft_count,
            "built solver islands"
        );

        self.dispatch_clusters(timestep, soft_count);
        self.integrate_soft_clusters(timestep, soft_count);
    }

    fn build_clusters(&mut self, timestep: f64) {
        let mut builder = ClusterBuilder {
            bodies: self.bodies.as_mut_slice(),
            adjacency: self.adjacency.as_slice(),
            joints: self.joints.as_mut_slice(),
            arenas: &mut self.arenas,
            clusters: &mut self.clusters,
            collision: self.collision.as_ref(),
            cluster_update: self.cluster_update.as_deref(),
            cluster_epoch: &mut self.cluster_counter,
            step_mark: self.step_mark,
            body_total: &mut self.body_total,
            joint_total: &mut self.joint_total,
            stats: &mut self.stats,
        };
        builder.build(timestep);
    }

    /// Soft-body islands run single-threaded after the barrier because the
    /// deformable integrator is not re-entrant: islands may share
    /// deformable state.
    fn integrate_soft_clusters(&mut self, timestep: f64, soft_count: usize) {
        for cluster_index in 0..soft_count {
            let cluster = self.clusters[cluster_index];
            debug_assert!(cluster.has_soft_bodies);
            debug_assert_eq!(cluster.body_count, 2);

            let body_info = &self.arenas.body_info.as_slice()
                [cluster.body_start..cluster.body_start + cluster.body_count];
            let mut bodies: Vec<IslandBody> = body_info
                .iter()
                .map(|info| IslandBody::from_body(info.body, &self.bodies[info.body.index()]))
                .collect();

            {
                let _guard = self
                    .soft_body_lock
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);

                if let Some(soft) = self.soft_integrator.as_deref() {
                    if let Some(body) = bodies.get_mut(1) {
                        soft.integrate_open_loop(body.body, &mut body.motion, timestep);
                    }
                } else {
                    tracing::warn!("soft-body island with no soft-body integrator installed");
                }

                integrate_cluster_velocities(
                    &cluster,
                    &mut bodies,
                    &self.config,
                    self.collision.as_ref(),
                    timestep,
                    0,
                );
            }

            self.apply_body_patches(&bodies);
        }
    }

    /// Copy an island's post-solve body snapshots back into the master
    /// list. Slot 0 (the sentinel) is never patched.
    pub(crate) fn apply_body_patches(&mut self, bodies: &[IslandBody]) {
        for snapshot in &bodies[1..] {
            let body = &mut self.bodies[snapshot.body.index()];
            body.motion = snapshot.motion;
            body.equilibrium = snapshot.equilibrium;
            body.resting = snapshot.resting;
            body.sleeping = snapshot.sleeping;
            body.sleeping_counter = snapshot.sleeping_counter;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::collide::{CcdBodyState, CcdContact};
    use crate::constraint::{ConstraintDescriptor, DescribeContext};
    use crate::solver::IslandView;
    use islet_types::{BodyMotion, ShapeId};

    struct NullCollision;

    impl CollisionEngine for NullCollision {
        fn collide_continue(
            &self,
            _body0: &CcdBodyState,
            _body1: &CcdBodyState,
            _timestep: f64,
            _out: &mut Vec<CcdContact>,
        ) {
        }

        fn update_collision_matrix(
            &self,
            _body: BodyId,
            _motion: &BodyMotion,
            _timestep: f64,
            _thread_id: usize,
        ) {
        }
    }

    struct NullSolver;

    impl IslandSolver for NullSolver {
        fn solve(&self, _island: &mut IslandView<'_>) {}
    }

    struct PairJoint {
        body0: BodyId,
        body1: BodyId,
    }

    impl Constraint for PairJoint {
        fn kind(&self) -> JointKind {
            JointKind::Bilateral
        }

        fn bodies(&self) -> (BodyId, BodyId) {
            (self.body0, self.body1)
        }

        fn max_dof(&self) -> usize {
            3
        }

        fn describe(&self, _ctx: &DescribeContext<'_>, _desc: &mut ConstraintDescriptor) -> usize {
            3
        }
    }

    fn world() -> DynamicsWorld {
        DynamicsWorld::new(
            WorldConfig::default(),
            Box::new(NullCollision),
            Box::new(NullSolver),
        )
        .expect("default config is valid")
    }

    #[test]
    fn test_sentinel_occupies_slot_zero() {
        let world = world();
        assert_eq!(world.body_count(), 1);
        let sentinel = world.body(BodyId::SENTINEL).expect("sentinel exists");
        assert_eq!(sentinel.inv_mass, 0.0);
    }

    #[test]
    fn test_static_after_dynamic_is_rejected() {
        let mut world = world();
        world
            .add_body(RigidBody::dynamic(1.0, ShapeId::new(0), 0.5))
            .expect("dynamic body");
        let err = world
            .add_body(RigidBody::static_body(ShapeId::new(0)))
            .expect_err("static after dynamic");
        assert!(err.is_ordering_error());
    }

    #[test]
    fn test_statics_before_dynamics_are_accepted() {
        let mut world = world();
        world
            .add_body(RigidBody::static_body(ShapeId::new(0)))
            .expect("static body");
        world
            .add_body(RigidBody::dynamic(1.0, ShapeId::new(0), 0.5))
            .expect("dynamic body");
        assert_eq!(world.body_count(), 3);
    }

    #[test]
    fn test_self_joint_is_rejected() {
        let mut world = world();
        let body = world
            .add_body(RigidBody::dynamic(1.0, ShapeId::new(0), 0.5))
            .expect("dynamic body");
        let err = world
            .add_joint(Box::new(PairJoint {
                body0: body,
                body1: body,
            }))
            .expect_err("self joint");
        assert_eq!(err, DynamicsError::SelfJoint(body.raw()));
    }

    #[test]
    fn test_joint_with_unknown_body_is_rejected() {
        let mut world = world();
        let body = world
            .add_body(RigidBody::dynamic(1.0, ShapeId::new(0), 0.5))
            .expect("dynamic body");
        let err = world
            .add_joint(Box::new(PairJoint {
                body0: body,
                body1: BodyId::new(99),
            }))
            .expect_err("unknown body");
        assert_eq!(err, DynamicsError::InvalidBodyId(99));
    }

    #[test]
    fn test_cluster_body_accessor_bounds() {
        let mut world = world();
        let a = world
            .add_body(RigidBody::dynamic(1.0, ShapeId::new(0), 0.5))
            .expect("body a");
        let b = world
            .add_body(RigidBody::dynamic(1.0, ShapeId::new(0), 0.5))
            .expect("body b");
        world
            .add_joint(Box::new(PairJoint { body0: a, body1: b }))
            .expect("joint");

        world.update_dynamics(1.0 / 60.0);

        let clusters = world.clusters().to_vec();
        assert_eq!(clusters.len(), 1);
        let cluster = &clusters[0];
        assert!(world.cluster_body(cluster, 0).is_some(), "sentinel slot");
        assert!(world.cluster_body(cluster, 2).is_some());
        assert!(world.cluster_body(cluster, 3).is_none(), "out of range");
    }
}
