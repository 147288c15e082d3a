//! Island scheduling: cost sort, intra-island promotion, and pooled
//! dispatch.
//!
//! Clusters are sorted by descending cost so the scheduler reasons about the
//! heaviest islands first. Walking from the front, an island is promoted to
//! a synchronous intra-island parallel solve while it dominates the
//! remaining work (`workers x joint_count >= remaining joints`, above the
//! joint-count cutoff). Everything after the promotion point is dispatched
//! across the pool: one task per worker, each claiming the next cluster
//! through a shared atomic counter, with the scope join as the barrier.
//! Soft-body islands sort to the front and are excluded here; their
//! integrator is not re-entrant and runs after the barrier.
//!
//! Workers resolve claimed clusters against read-only world state into
//! [`ClusterOutcome`]s; outcomes are merged on the calling thread.
//! Disjointness of islands makes the merge order irrelevant.

use std::sync::atomic::{AtomicUsize, Ordering};

use islet_types::{consts, JointId, SkeletonId};

use crate::arena::ScratchArena;
use crate::cluster::{BodyCluster, JointInfo};
use crate::constraint::Jacobian;
use crate::integrate::integrate_cluster_velocities;
use crate::jacobian::{assemble_joint_rows, SolverRow};
use crate::ordering::{order_cluster_joints, OrderedCluster};
use crate::solver::{IslandBody, IslandView};
use crate::world::DynamicsWorld;

/// Descending-sort key: joint count, with a bias that floats soft-body
/// islands to the front.
pub(crate) fn cluster_sort_key(cluster: &BodyCluster) -> u64 {
    cluster.joint_count as u64 + (u64::from(cluster.has_soft_bodies) << 30)
}

/// How an island's solve is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SolveMode {
    /// Claimed by a pool worker; solved sequentially on that worker.
    Pooled,
    /// Promoted: solved synchronously with intra-island parallelism.
    IntraIsland,
}

/// Everything one island solve produced, merged on the calling thread.
pub(crate) struct ClusterOutcome {
    pub cluster_index: usize,
    /// Joint infos in solver order; `pair_start` is island-local here.
    pub infos: Vec<JointInfo>,
    pub rows: Vec<SolverRow>,
    pub bodies: Vec<IslandBody>,
    pub self_collisions: Vec<(SkeletonId, JointId)>,
}

impl DynamicsWorld {
    pub(crate) fn worker_count(&self) -> usize {
        match self.config.parallel.worker_threads {
            0 => rayon::current_num_threads(),
            n => n,
        }
    }

    /// Dispatch every non-soft cluster: promoted islands first, the rest
    /// through the worker pool.
    pub(crate) fn dispatch_clusters(&mut self, timestep: f64, soft_count: usize) {
        let cluster_count = self.clusters.len();
        let mut index = soft_count;

        let thread_count = self.worker_count();
        if self.config.parallel.enabled && thread_count > 1 {
            let mut remaining: usize = self.clusters[index..]
                .iter()
                .map(|c| c.joint_count)
                .sum();
            let mut forces = std::mem::take(&mut self.arenas.forces);
            while index < cluster_count {
                let joint_count = self.clusters[index].joint_count;
                if joint_count <= consts::PARALLEL_JOINT_COUNT_CUT_OFF
                    || thread_count * joint_count < remaining
                {
                    break;
                }
                let outcome =
                    self.resolve_cluster(index, timestep, 0, SolveMode::IntraIsland, &mut forces);
                self.merge_outcome(outcome);
                self.stats.promoted_islands += 1;
                remaining -= joint_count;
                index += 1;
            }
            self.arenas.forces = forces;
        }

        if index >= cluster_count {
            return;
        }

        let pending = cluster_count - index;
        let worker_count = thread_count.min(pending).max(1);
        let mut buckets: Vec<Vec<ClusterOutcome>> = Vec::new();
        buckets.resize_with(worker_count, Vec::new);

        if worker_count == 1 {
            let mut forces = std::mem::take(&mut self.arenas.forces);
            for k in 0..pending {
                let outcome =
                    self.resolve_cluster(index + k, timestep, 0, SolveMode::Pooled, &mut forces);
                buckets[0].push(outcome);
            }
            self.arenas.forces = forces;
        } else {
            let world = &*self;
            let counter = AtomicUsize::new(0);
            rayon::scope(|scope| {
                for (thread_id, bucket) in buckets.iter_mut().enumerate() {
                    let counter = &counter;
                    scope.spawn(move |_| {
                        let mut forces = ScratchArena::new();
                        loop {
                            let k = counter.fetch_add(1, Ordering::Relaxed);
                            if k >= pending {
                                break;
                            }
                            bucket.push(world.resolve_cluster(
                                index + k,
                                timestep,
                                thread_id,
                                SolveMode::Pooled,
                                &mut forces,
                            ));
                        }
                    });
                }
            });
        }

        for outcome in buckets.into_iter().flatten() {
            self.merge_outcome(outcome);
            self.stats.pooled_islands += 1;
        }
    }

    /// Resolve one island against read-only world state: order its joints,
    /// assemble its rows, solve, and integrate velocities.
    pub(crate) fn resolve_cluster(
        &self,
        cluster_index: usize,
        timestep: f64,
        thread_id: usize,
        mode: SolveMode,
        forces: &mut ScratchArena<Jacobian>,
    ) -> ClusterOutcome {
        let cluster = self.clusters[cluster_index];
        let body_info = &self.arenas.body_info.as_slice()
            [cluster.body_start..cluster.body_start + cluster.body_count];
        let joint_info = &self.arenas.joint_info.as_slice()
            [cluster.joint_start..cluster.joint_start + cluster.joint_count];

        let mut bodies: Vec<IslandBody> = body_info
            .iter()
            .map(|info| IslandBody::from_body(info.body, &self.bodies[info.body.index()]))
            .collect();

        let OrderedCluster {
            mut infos,
            active_joints,
            resting,
        } = order_cluster_joints(
            &cluster,
            joint_info,
            body_info,
            &self.bodies,
            &self.adjacency,
            &self.joints,
        );
        for (body, resting) in bodies.iter_mut().zip(&resting) {
            body.resting = *resting;
        }

        let mut rows: Vec<SolverRow> = Vec::with_capacity(cluster.rows_count);
        let mut self_collisions = Vec::new();
        for info in &mut infos {
            let slot = &self.joints[info.joint.index()];
            let body0 = &self.bodies[slot.body0.index()];
            let body1 = &self.bodies[slot.body1.index()];
            assemble_joint_rows(slot, info, body0, body1, timestep, &mut rows);

            if slot.kind.is_contact() {
                if let (Some(skeleton0), Some(skeleton1)) = (body0.skeleton, body1.skeleton) {
                    if skeleton0 == skeleton1 {
                        self_collisions.push((skeleton0, info.joint));
                    }
                    // A skeleton on only one side registers nothing.
                }
            }
        }
        debug_assert!(rows.len() <= cluster.rows_count);

        forces.clear();
        forces.reserve_at_least(bodies.len());
        {
            let mut view = IslandView {
                bodies: &mut bodies,
                joints: &infos,
                rows: &mut rows,
                forces: forces.as_mut_slice(),
                active_joints,
                is_continuous_collision: cluster.is_continuous_collision,
                timestep,
            };
            match mode {
                SolveMode::Pooled => self.solver.solve(&mut view),
                SolveMode::IntraIsland => self.solver.solve_parallel(&mut view),
            }
        }

        integrate_cluster_velocities(
            &cluster,
            &mut bodies,
            &self.config,
            self.collision.as_ref(),
            timestep,
            thread_id,
        );

        ClusterOutcome {
            cluster_index,
            infos,
            rows,
            bodies,
            self_collisions,
        }
    }

    /// Merge one island's results into the world: arena write-back, joint
    /// force feedback, body patches, self-collision registrations.
    pub(crate) fn merge_outcome(&mut self, outcome: ClusterOutcome) {
        let cluster = self.clusters[outcome.cluster_index];
        debug_assert_eq!(outcome.infos.len(), cluster.joint_count);
        debug_assert!(outcome.rows.len() <= cluster.rows_count);

        for (k, info) in outcome.infos.iter().enumerate() {
            let mut global = *info;
            global.pair_start += cluster.rows_start as u32;
            self.arenas.joint_info[cluster.joint_start + k] = global;
            self.joints[info.joint.index()].index = k as u32;
        }
        for (k, row) in outcome.rows.iter().enumerate() {
            self.arenas.rows[cluster.rows_start + k] = *row;
        }

        let mut feedback: Vec<f64> = Vec::new();
        for info in &outcome.infos {
            let start = info.pair_start as usize;
            let count = info.pair_count as usize;
            feedback.clear();
            feedback.extend(outcome.rows[start..start + count].iter().map(|row| row.force));
            let slot = &mut self.joints[info.joint.index()];
            slot.constraint.store_row_forces(&feedback);
            slot.constraint.reset_inverse_dynamics();
        }

        self.apply_body_patches(&outcome.bodies);

        for (skeleton, joint) in outcome.self_collisions {
            self.self_collision_registry
                .entry(skeleton)
                .or_default()
                .push(joint);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn plain(joint_count: usize) -> BodyCluster {
        BodyCluster {
            joint_count,
            ..Default::default()
        }
    }

    #[test]
    fn test_sort_key_orders_by_joint_count() {
        assert!(cluster_sort_key(&plain(300)) > cluster_sort_key(&plain(10)));
        assert_eq!(cluster_sort_key(&plain(0)), 0);
    }

    #[test]
    fn test_soft_body_bias_dominates() {
        let mut soft = plain(1);
        soft.has_soft_bodies = true;
        assert!(cluster_sort_key(&soft) > cluster_sort_key(&plain(100_000)));
    }
}
