//! Cluster building: partitioning the constraint graph into solver islands.
//!
//! The builder walks the master body list from the tail toward the head
//! (statics are grouped at the front and terminate the walk), growing one
//! spanning tree per unvisited movable seed. Each tree either commits a
//! [`BodyCluster`], retires in place (island-wide auto-sleep consensus), or
//! is vetoed by the installed cluster-update callback.

use islet_types::{consts, BodyId, JointId, RigidBody};

use crate::arena::{round_up_to_row_block, StepArenas};
use crate::ccd::contact_needs_continuous_resolve;
use crate::collide::{CcdContact, CollisionEngine};
use crate::epoch::EpochCounter;
use crate::world::{ClusterBodies, ClusterUpdateFn, JointEdge, JointSlot, StepStats};

/// One solver island: a connected component of the dynamics graph restricted
/// to movable bodies plus every joint touching them.
///
/// `body_start`/`joint_start`/`rows_start` index the shared step arenas;
/// slot 0 of the body range is the sentinel.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyCluster {
    /// First slot of this island's body range.
    pub body_start: usize,
    /// Bodies in the island, sentinel included.
    pub body_count: usize,
    /// First slot of this island's joint range.
    pub joint_start: usize,
    /// Joints in the island.
    pub joint_count: usize,
    /// First row of this island's solver-matrix range.
    pub rows_start: usize,
    /// Row budget of this island.
    pub rows_count: usize,
    /// Unique tag of this island within the step.
    pub epoch: u32,
    /// Island contains deformable bodies; routed to the soft-body path.
    pub has_soft_bodies: bool,
    /// Island was flagged by the continuous-collision trigger.
    pub is_continuous_collision: bool,
}

/// One body claimed by an island.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyInfo {
    /// The claimed body; slot 0 of every island holds the sentinel.
    pub body: BodyId,
}

/// One joint claimed by an island.
#[derive(Debug, Clone, Copy, Default)]
pub struct JointInfo {
    /// The claimed joint.
    pub joint: JointId,
    /// Cluster-local index of the first endpoint (0 for static endpoints).
    pub m0: u32,
    /// Cluster-local index of the second endpoint (0 for static endpoints).
    pub m1: u32,
    /// First row of this joint in the solver matrix.
    pub pair_start: u32,
    /// Row budget before assembly; actual rows used after assembly.
    pub pair_count: u16,
}

/// The split-off world state the build phase works on.
pub(crate) struct ClusterBuilder<'a> {
    pub bodies: &'a mut [RigidBody],
    pub adjacency: &'a [Vec<JointEdge>],
    pub joints: &'a mut [JointSlot],
    pub arenas: &'a mut StepArenas,
    pub clusters: &'a mut Vec<BodyCluster>,
    pub collision: &'a dyn CollisionEngine,
    pub cluster_update: Option<&'a ClusterUpdateFn>,
    pub cluster_epoch: &'a mut EpochCounter,
    pub step_mark: u32,
    pub body_total: &'a mut usize,
    pub joint_total: &'a mut usize,
    pub stats: &'a mut StepStats,
}

impl ClusterBuilder<'_> {
    /// Walk the master list tail to head, seeding one spanning tree per
    /// unvisited movable body. Statics terminate the walk.
    pub fn build(&mut self, timestep: f64) {
        let step_mark = self.step_mark;
        let seen_mark = step_mark.wrapping_sub(1);

        for i in (1..self.bodies.len()).rev() {
            if self.bodies[i].inv_mass == 0.0 {
                #[cfg(debug_assertions)]
                for j in 1..=i {
                    debug_assert_eq!(
                        self.bodies[j].inv_mass,
                        0.0,
                        "statics must be grouped ahead of all movable bodies"
                    );
                }
                break;
            }

            let (visited, skip) = {
                let body = &self.bodies[i];
                (
                    body.dynamics_epoch == seen_mark || body.dynamics_epoch == step_mark,
                    body.freeze || body.spawned_from_callback || body.sleeping,
                )
            };
            if !visited && !skip {
                self.spanning_tree(BodyId::new(i as u32), timestep);
            }
            self.bodies[i].spawned_from_callback = false;
        }
    }

    /// Grow one island from `seed`, then retire, veto, or commit it.
    fn spanning_tree(&mut self, seed: BodyId, timestep: f64) {
        let step_mark = self.step_mark;
        let seen_mark = step_mark.wrapping_sub(1);
        let epoch = self.cluster_epoch.next_tag();

        let body_start = *self.body_total;
        let joint_start = *self.joint_total;
        debug_assert_eq!(self.arenas.body_info.len(), body_start);
        debug_assert_eq!(self.arenas.joint_info.len(), joint_start);

        self.arenas.body_info.push(BodyInfo {
            body: BodyId::SENTINEL,
        });
        debug_assert_eq!(self.bodies[0].index, 0);
        debug_assert_eq!(self.bodies[0].dynamics_epoch, step_mark);

        let mut body_count = 1usize;
        let mut joint_count = 0usize;
        let mut has_soft_bodies = false;
        let mut global_auto_sleep = true;

        let mut stack = std::mem::take(&mut self.arenas.stack);
        stack.clear();
        stack.push(seed);

        while let Some(bid) = stack.pop() {
            let src_cc = {
                let body = &mut self.bodies[bid.index()];
                if body.dynamics_epoch == seen_mark || body.dynamics_epoch == step_mark {
                    continue;
                }
                debug_assert!(body.inv_mass > 0.0);

                body.index = body_count as u32;
                body.dynamics_epoch = seen_mark;
                body.resting = body.equilibrium;
                body.sleeping = false;
                global_auto_sleep &= body.auto_sleep && body.equilibrium;
                has_soft_bodies |= body.is_deformable;
                body.continuous_collision
            };
            self.arenas.body_info.push(BodyInfo { body: bid });
            body_count += 1;

            for edge in &self.adjacency[bid.index()] {
                let other_body = &self.bodies[edge.other.index()];
                let slot = &self.joints[edge.joint.index()];
                debug_assert!(slot.body0 == bid || slot.body1 == bid);

                let admit = other_body.collidable
                    && (!slot.kind.is_contact()
                        || (slot.constraint.is_active() && slot.constraint.max_dof() > 0)
                        || src_cc
                        || other_body.continuous_collision);
                if !admit {
                    continue;
                }

                let slot = &mut self.joints[edge.joint.index()];
                if slot.dynamics_epoch != seen_mark {
                    slot.index = joint_count as u32;
                    slot.cluster_epoch = epoch;
                    slot.dynamics_epoch = seen_mark;

                    let rows = round_up_to_row_block(slot.constraint.max_dof());
                    debug_assert!(rows <= consts::CONSTRAINT_MAX_ROWS);
                    self.arenas.joint_info.push(JointInfo {
                        joint: edge.joint,
                        m0: 0,
                        m1: 0,
                        pair_start: 0,
                        pair_count: rows as u16,
                    });
                    joint_count += 1;
                }

                let other_body = &self.bodies[edge.other.index()];
                if other_body.inv_mass > 0.0
                    && other_body.dynamics_epoch != seen_mark
                    && other_body.dynamics_epoch != step_mark
                {
                    stack.push(edge.other);
                }
            }
        }
        self.arenas.stack = stack;

        if global_auto_sleep {
            // Island-wide consensus at rest: retire every body in place and
            // emit no cluster.
            for k in body_start + 1..body_start + body_count {
                let bid = self.arenas.body_info[k].body;
                let body = &mut self.bodies[bid.index()];
                body.dynamics_epoch = step_mark;
                body.sleeping = true;
            }
            self.arenas.body_info.truncate(body_start);
            self.arenas.joint_info.truncate(joint_start);
            self.stats.retired_islands += 1;
            return;
        }

        if let Some(callback) = self.cluster_update {
            let view = ClusterBodies::new(
                self.bodies,
                &self.arenas.body_info.as_slice()[body_start..body_start + body_count],
            );
            if !callback(&view) {
                for k in body_start + 1..body_start + body_count {
                    let bid = self.arenas.body_info[k].body;
                    self.bodies[bid.index()].dynamics_epoch = step_mark;
                }
                self.arenas.body_info.truncate(body_start);
                self.arenas.joint_info.truncate(joint_start);
                self.stats.discarded_islands += 1;
                return;
            }
        }

        // Commit: map endpoints to cluster-local slots, finalize the row
        // budget (CCD included), and claim the arena ranges.
        let mut rows_count = 0usize;
        let mut is_ccd_cluster = false;
        let mut probe_scratch: Vec<CcdContact> = Vec::new();

        for k in joint_start..joint_start + joint_count {
            let info = &mut self.arenas.joint_info[k];
            let slot = &self.joints[info.joint.index()];
            let body0 = &self.bodies[slot.body0.index()];
            let body1 = &self.bodies[slot.body1.index()];

            info.m0 = if body0.inv_mass != 0.0 { body0.index } else { 0 };
            info.m1 = if body1.inv_mass != 0.0 { body1.index } else { 0 };

            debug_assert!((info.pair_count as usize) <= consts::CONSTRAINT_MAX_ROWS);
            rows_count += info.pair_count as usize;

            if slot.kind.is_contact()
                && (body0.continuous_collision || body1.continuous_collision)
            {
                is_ccd_cluster |= contact_needs_continuous_resolve(
                    body0,
                    body1,
                    self.collision,
                    timestep,
                    &mut probe_scratch,
                );
                rows_count += consts::CCD_EXTRA_CONTACT_COUNT;
            }

            let b0 = slot.body0;
            let b1 = slot.body1;
            self.bodies[b0.index()].dynamics_epoch = step_mark;
            self.bodies[b1.index()].dynamics_epoch = step_mark;
        }

        // Claim every island body, joint-less stragglers included.
        for k in body_start + 1..body_start + body_count {
            let bid = self.arenas.body_info[k].body;
            self.bodies[bid.index()].dynamics_epoch = step_mark;
        }

        if is_ccd_cluster {
            rows_count = rows_count.max(consts::CCD_MIN_CLUSTER_ROWS);
        }

        self.clusters.push(BodyCluster {
            body_start,
            body_count,
            joint_start,
            joint_count,
            rows_start: 0,
            rows_count,
            epoch,
            has_soft_bodies,
            is_continuous_collision: is_ccd_cluster,
        });

        *self.body_total += body_count;
        *self.joint_total += joint_count;
    }
}
