//! Constraint ordering within an island.
//!
//! A breadth-first reorder produces a solver-friendly joint sequence:
//! joints anchored at static bodies first, then outward in waves. When no
//! joint touches a static body, the wave starts at the joint touching the
//! most massive dynamic body. The pass also propagates the conservative
//! `resting` flag and counts the joints that still need solving.
//!
//! The reorder works on a local copy of the island's joint infos; the
//! permuted order is written back to the shared arena when the island's
//! results are merged.

use std::collections::VecDeque;

use islet_types::RigidBody;

use crate::cluster::{BodyCluster, BodyInfo, JointInfo};
use crate::world::{JointEdge, JointSlot};

/// Result of the BFS reorder.
pub(crate) struct OrderedCluster {
    /// Joint infos in solver order.
    pub infos: Vec<JointInfo>,
    /// Joints whose endpoints are not both resting.
    pub active_joints: usize,
    /// Post-propagation resting flag per cluster-local body slot.
    pub resting: Vec<bool>,
}

/// Reorder an island's joints breadth-first from its static anchors.
pub(crate) fn order_cluster_joints(
    cluster: &BodyCluster,
    infos: &[JointInfo],
    body_info: &[BodyInfo],
    bodies: &[RigidBody],
    adjacency: &[Vec<JointEdge>],
    joints: &[JointSlot],
) -> OrderedCluster {
    let joint_count = cluster.joint_count;
    debug_assert_eq!(infos.len(), joint_count);
    debug_assert_eq!(body_info.len(), cluster.body_count);

    let mut resting: Vec<bool> = body_info
        .iter()
        .map(|info| bodies[info.body.index()].resting)
        .collect();

    let mut enqueued = vec![false; joint_count];
    let mut queue: VecDeque<usize> = VecDeque::with_capacity(joint_count);
    let mut ordered: Vec<JointInfo> = Vec::with_capacity(joint_count);

    // Seed selection and resting propagation in one scan. Static endpoints
    // resolve to the sentinel slot, which is always resting.
    let mut heaviest_inv_mass = f64::INFINITY;
    let mut heaviest: Option<usize> = None;
    for (k, info) in infos.iter().enumerate() {
        let body0 = &bodies[body_info[info.m0 as usize].body.index()];
        let body1 = &bodies[body_info[info.m1 as usize].body.index()];
        let inv0 = body0.inv_mass;
        let inv1 = body1.inv_mass;

        let pair_resting = body0.equilibrium && body1.equilibrium;
        resting[info.m0 as usize] &= pair_resting || inv0 == 0.0;
        resting[info.m1 as usize] &= pair_resting || inv1 == 0.0;

        if inv0 == 0.0 || inv1 == 0.0 {
            queue.push_back(k);
            enqueued[k] = true;
        } else if inv0 < heaviest_inv_mass {
            heaviest_inv_mass = inv0;
            heaviest = Some(k);
        } else if inv1 < heaviest_inv_mass {
            heaviest_inv_mass = inv1;
            heaviest = Some(k);
        }
    }

    if queue.is_empty() {
        if let Some(k) = heaviest {
            queue.push_back(k);
            enqueued[k] = true;
        }
    }

    let mut active_joints = 0usize;
    while let Some(k) = queue.pop_front() {
        let info = infos[k];
        ordered.push(info);
        if !(resting[info.m0 as usize] && resting[info.m1 as usize]) {
            active_joints += 1;
        }

        for &slot_index in &[info.m0, info.m1] {
            let bid = body_info[slot_index as usize].body;
            if bodies[bid.index()].inv_mass == 0.0 {
                continue;
            }
            for edge in &adjacency[bid.index()] {
                let slot = &joints[edge.joint.index()];
                if slot.cluster_epoch == cluster.epoch {
                    let local = slot.index as usize;
                    debug_assert!(local < joint_count);
                    if !enqueued[local] {
                        enqueued[local] = true;
                        queue.push_back(local);
                    }
                }
            }
        }

        if ordered.len() == joint_count {
            break;
        }
    }

    debug_assert_eq!(ordered.len(), joint_count);
    OrderedCluster {
        infos: ordered,
        active_joints,
        resting,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::constraint::{Constraint, ConstraintDescriptor, DescribeContext};
    use islet_types::{BodyId, JointId, JointKind, ShapeId};

    struct StubJoint {
        body0: BodyId,
        body1: BodyId,
    }

    impl Constraint for StubJoint {
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

    struct Chain {
        bodies: Vec<RigidBody>,
        adjacency: Vec<Vec<JointEdge>>,
        joints: Vec<JointSlot>,
        infos: Vec<JointInfo>,
        body_info: Vec<BodyInfo>,
        cluster: BodyCluster,
    }

    /// S - B1 - B2 - B3 with the static anchor first in the master list.
    /// Body masses rise along the chain so the heaviest-body fallback is
    /// distinguishable when the anchor is removed.
    fn line_chain(with_static_anchor: bool) -> Chain {
        let mut bodies = vec![RigidBody::sentinel()];
        bodies[0].dynamics_epoch = 0;

        // Slot 1: anchor (static or heavy dynamic), slots 2-4: chain.
        if with_static_anchor {
            bodies.push(RigidBody::static_body(ShapeId::new(0)));
        } else {
            bodies.push(RigidBody::dynamic(100.0, ShapeId::new(0), 0.5));
        }
        for mass in [3.0, 2.0, 1.0] {
            bodies.push(RigidBody::dynamic(mass, ShapeId::new(0), 0.5));
        }

        let epoch = 7;
        let mut adjacency: Vec<Vec<JointEdge>> = vec![Vec::new(); bodies.len()];
        let mut joints = Vec::new();
        let mut infos = Vec::new();
        for (k, (a, b)) in [(1u32, 2u32), (2, 3), (3, 4)].iter().copied().enumerate() {
            let joint = JointId::new(k as u32);
            joints.push(JointSlot {
                body0: BodyId::new(a),
                body1: BodyId::new(b),
                kind: JointKind::Bilateral,
                cluster_epoch: epoch,
                dynamics_epoch: 0,
                index: k as u32,
                constraint: Box::new(StubJoint {
                    body0: BodyId::new(a),
                    body1: BodyId::new(b),
                }),
            });
            adjacency[a as usize].push(JointEdge {
                joint,
                other: BodyId::new(b),
            });
            adjacency[b as usize].push(JointEdge {
                joint,
                other: BodyId::new(a),
            });
            infos.push(JointInfo {
                joint,
                m0: 0,
                m1: 0,
                pair_start: 0,
                pair_count: 4,
            });
        }

        // Cluster-local slots: sentinel 0, then the movable bodies in
        // traversal order. A static anchor maps to slot 0.
        let mut body_info = vec![BodyInfo {
            body: BodyId::SENTINEL,
        }];
        let mut local = 1u32;
        for i in 1..bodies.len() {
            if bodies[i].inv_mass > 0.0 {
                bodies[i].index = local;
                body_info.push(BodyInfo {
                    body: BodyId::new(i as u32),
                });
                local += 1;
            }
        }
        for (k, info) in infos.iter_mut().enumerate() {
            let slot = &joints[k];
            info.m0 = if bodies[slot.body0.index()].inv_mass > 0.0 {
                bodies[slot.body0.index()].index
            } else {
                0
            };
            info.m1 = if bodies[slot.body1.index()].inv_mass > 0.0 {
                bodies[slot.body1.index()].index
            } else {
                0
            };
        }

        let cluster = BodyCluster {
            body_start: 0,
            body_count: body_info.len(),
            joint_start: 0,
            joint_count: infos.len(),
            rows_start: 0,
            rows_count: 12,
            epoch,
            has_soft_bodies: false,
            is_continuous_collision: false,
        };

        Chain {
            bodies,
            adjacency,
            joints,
            infos,
            body_info,
            cluster,
        }
    }

    #[test]
    fn test_ordering_seeds_from_static_anchor() {
        let chain = line_chain(true);
        let ordered = order_cluster_joints(
            &chain.cluster,
            &chain.infos,
            &chain.body_info,
            &chain.bodies,
            &chain.adjacency,
            &chain.joints,
        );

        let sequence: Vec<u32> = ordered.infos.iter().map(|i| i.joint.raw()).collect();
        assert_eq!(sequence, vec![0, 1, 2], "BFS proceeds outward from S-B1");
    }

    #[test]
    fn test_ordering_falls_back_to_heaviest_body() {
        let chain = line_chain(false);
        let ordered = order_cluster_joints(
            &chain.cluster,
            &chain.infos,
            &chain.body_info,
            &chain.bodies,
            &chain.adjacency,
            &chain.joints,
        );

        // The 100 kg body touches only joint 0, so the wave still starts
        // there.
        assert_eq!(ordered.infos[0].joint.raw(), 0);
        assert_eq!(ordered.infos.len(), 3);
    }

    #[test]
    fn test_active_joint_count_with_resting_bodies() {
        let mut chain = line_chain(true);
        // Everything in equilibrium except the chain tip.
        for body in &mut chain.bodies {
            body.equilibrium = true;
            body.resting = true;
        }
        chain.bodies[4].equilibrium = false;
        chain.bodies[4].resting = false;

        let ordered = order_cluster_joints(
            &chain.cluster,
            &chain.infos,
            &chain.body_info,
            &chain.bodies,
            &chain.adjacency,
            &chain.joints,
        );

        // Joint 2's pair is not in equilibrium, so propagation clears both
        // of its endpoints; only the anchor joint stays fully at rest.
        assert_eq!(ordered.active_joints, 2);
        assert!(ordered.resting[1]);
        assert!(!ordered.resting[2]);
        assert!(!ordered.resting[3]);
    }
}
