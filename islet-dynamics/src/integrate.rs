//! Velocity integration and the island sleep decision.
//!
//! Runs per cluster after the constraint solve, on the island's body
//! snapshots. Each movable body advances its pose, feeds the island-wide
//! motion maxima, and votes on equilibrium; the cluster then either retires
//! atomically (`stack_sleeping` consensus) or consults the sleep table with
//! its time-scaled quiet-step count.
//!
//! The cluster-level check gates on `joint_count` alone. When the
//! equilibrium consensus holds, each body gets `sleeping = auto_sleep`, so
//! an island can retire even though a member with `auto_sleep = false`
//! stays awake.

use islet_types::{consts, SleepEntry, Vector3, WorldConfig};

use crate::cluster::BodyCluster;
use crate::collide::CollisionEngine;
use crate::solver::IslandBody;

/// Convert a quiet-step counter into sleep-table steps at the reference
/// rate.
pub(crate) fn time_scaled_steps(counter: u32, timestep: f64) -> u32 {
    (consts::SLEEP_STEP_RATE * f64::from(counter) * timestep) as u32
}

/// Find the table row unlocked by `ts` quiet steps: the row before the
/// first whose `steps` exceeds `ts`.
pub(crate) fn sleep_table_index(table: &[SleepEntry], ts: u32) -> usize {
    let mut index = table.len();
    for (i, entry) in table.iter().enumerate().skip(1) {
        if entry.steps > ts {
            index = i;
            break;
        }
    }
    index - 1
}

/// Integrate one island's velocities and apply the sleep policy to its body
/// snapshots. `bodies` is the island's body array, sentinel in slot 0.
pub(crate) fn integrate_cluster_velocities(
    cluster: &BodyCluster,
    bodies: &mut [IslandBody],
    config: &WorldConfig,
    collision: &dyn CollisionEngine,
    timestep: f64,
    thread_id: usize,
) {
    let movable = &mut bodies[1..];
    let count = movable.len();

    // Tiny islands that are still moving get the strong freeze drag; the
    // mild drag applies everywhere else.
    let mut drag = consts::EQUILIBRIUM_VELOCITY_DRAG;
    if count <= 2 {
        let mut equilibrium = movable.first().map_or(true, |b| b.equilibrium);
        if count == 2 {
            equilibrium &= movable[1].equilibrium;
        }
        if !equilibrium {
            drag = consts::FREEZING_VELOCITY_DRAG;
        }
    }

    let speed_freeze = config.freeze_speed2;
    let accel_freeze = config.freeze_accel2
        * if cluster.joint_count <= consts::SMALL_ISLAND_COUNT {
            0.05
        } else {
            1.0
        };

    let mut stack_sleeping = true;
    let mut sleep_counter = 10_000u32;
    let mut max_accel = 0.0f64;
    let mut max_alpha = 0.0f64;
    let mut max_speed = 0.0f64;
    let mut max_omega = 0.0f64;

    for body in movable.iter_mut() {
        body.equilibrium = true;
        if body.motion.is_at_rest() {
            continue;
        }
        debug_assert!(body.inv_mass > 0.0);

        body.motion.integrate_velocity(timestep);

        let accel2 = body.motion.accel.norm_squared();
        let alpha2 = body.motion.alpha.norm_squared();
        let speed2 = body.motion.veloc.norm_squared();
        let omega2 = body.motion.omega.norm_squared();
        max_accel = max_accel.max(accel2);
        max_alpha = max_alpha.max(alpha2);
        max_speed = max_speed.max(speed2);
        max_omega = max_omega.max(omega2);

        let equilibrium = accel2 < accel_freeze
            && alpha2 < accel_freeze
            && speed2 < speed_freeze
            && omega2 < speed_freeze;
        if equilibrium {
            let veloc = body.motion.veloc * drag;
            let omega = body.motion.omega * drag;
            body.motion.veloc = if veloc.norm_squared() > consts::VELOC_TOL_SQUARED {
                veloc
            } else {
                Vector3::zeros()
            };
            body.motion.omega = if omega.norm_squared() > consts::VELOC_TOL_SQUARED {
                omega
            } else {
                Vector3::zeros()
            };
        }

        body.equilibrium = equilibrium;
        stack_sleeping &= equilibrium;
        sleep_counter = sleep_counter.min(body.sleeping_counter);
        body.sleeping_counter += 1;

        collision.update_collision_matrix(body.body, &body.motion, timestep, thread_id);
    }

    if cluster.joint_count == 0 {
        return;
    }

    let table = &config.sleep_table;
    if stack_sleeping {
        for body in movable.iter_mut() {
            body.motion.clear();
            body.sleeping = body.auto_sleep;
        }
    } else if table[consts::SLEEP_ENTRIES - 1]
        .exceeded_by(max_accel, max_alpha, max_speed, max_omega)
    {
        for body in movable.iter_mut() {
            body.sleeping_counter = 0;
        }
    } else {
        let ts = time_scaled_steps(sleep_counter, timestep);
        let entry = &table[sleep_table_index(table, ts)];
        if entry.admits(max_accel, max_alpha, max_speed, max_omega) {
            for body in movable.iter_mut() {
                body.motion.clear();
                body.sleeping = body.auto_sleep;
                body.sleeping_counter = 0;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::collide::{CcdBodyState, CcdContact};
    use islet_types::{BodyId, BodyMotion, RigidBody, ShapeId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCollision {
        updates: AtomicUsize,
    }

    impl CollisionEngine for CountingCollision {
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
            self.updates.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn island_body(id: u32, veloc: Vector3<f64>) -> IslandBody {
        let body = RigidBody::dynamic(1.0, ShapeId::new(0), 0.5).with_velocity(veloc);
        IslandBody::from_body(BodyId::new(id), &body)
    }

    fn sentinel() -> IslandBody {
        IslandBody::from_body(BodyId::SENTINEL, &RigidBody::sentinel())
    }

    fn one_joint_cluster() -> BodyCluster {
        BodyCluster {
            body_count: 2,
            joint_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_sleep_table_index_lookup() {
        let table = &WorldConfig::default().sleep_table;
        assert_eq!(sleep_table_index(table, 0), 0);
        assert_eq!(sleep_table_index(table, 7), 0);
        assert_eq!(sleep_table_index(table, 8), 1);
        assert_eq!(sleep_table_index(table, 100), 4);
        assert_eq!(sleep_table_index(table, 100_000), consts::SLEEP_ENTRIES - 1);
    }

    #[test]
    fn test_time_scaled_steps() {
        assert_eq!(time_scaled_steps(60, 1.0 / 60.0), 60);
        assert_eq!(time_scaled_steps(10, 1.0 / 120.0), 5);
    }

    #[test]
    fn test_resting_body_is_skipped() {
        let collision = CountingCollision {
            updates: AtomicUsize::new(0),
        };
        let cluster = one_joint_cluster();
        let mut bodies = vec![sentinel(), island_body(1, Vector3::zeros())];

        integrate_cluster_velocities(
            &cluster,
            &mut bodies,
            &WorldConfig::default(),
            &collision,
            1.0 / 60.0,
            0,
        );

        assert!(bodies[1].equilibrium);
        assert_eq!(collision.updates.load(Ordering::Relaxed), 0);
        // Full consensus retires the island.
        assert!(bodies[1].sleeping);
    }

    #[test]
    fn test_moving_body_advances_and_updates_broad_phase() {
        let collision = CountingCollision {
            updates: AtomicUsize::new(0),
        };
        let cluster = one_joint_cluster();
        let mut bodies = vec![sentinel(), island_body(1, Vector3::new(6.0, 0.0, 0.0))];

        integrate_cluster_velocities(
            &cluster,
            &mut bodies,
            &WorldConfig::default(),
            &collision,
            0.5,
            0,
        );

        assert_eq!(bodies[1].motion.position.x, 3.0);
        assert!(!bodies[1].equilibrium);
        assert!(!bodies[1].sleeping);
        assert_eq!(collision.updates.load(Ordering::Relaxed), 1);
        // Past the last table row, so the post-incremented counter resets.
        assert_eq!(bodies[1].sleeping_counter, 0);
    }

    #[test]
    fn test_equilibrium_drag_clamps_tiny_velocity() {
        let collision = CountingCollision {
            updates: AtomicUsize::new(0),
        };
        let cluster = one_joint_cluster();
        // Below the freeze thresholds but above zero; the dragged square
        // magnitude falls under the clamp tolerance.
        let mut bodies = vec![sentinel(), island_body(1, Vector3::new(5.0e-5, 0.0, 0.0))];

        integrate_cluster_velocities(
            &cluster,
            &mut bodies,
            &WorldConfig::default(),
            &collision,
            1.0 / 60.0,
            0,
        );

        assert!(bodies[1].equilibrium);
        assert_eq!(bodies[1].motion.veloc, Vector3::zeros());
    }

    #[test]
    fn test_runaway_island_resets_sleep_counters() {
        let collision = CountingCollision {
            updates: AtomicUsize::new(0),
        };
        let cluster = one_joint_cluster();
        let mut body = island_body(1, Vector3::new(50.0, 0.0, 0.0));
        body.sleeping_counter = 30;
        let mut bodies = vec![sentinel(), body];

        integrate_cluster_velocities(
            &cluster,
            &mut bodies,
            &WorldConfig::default(),
            &collision,
            1.0 / 60.0,
            0,
        );

        // Past the last table row: counters reset, nobody sleeps.
        assert_eq!(bodies[1].sleeping_counter, 0);
        assert!(!bodies[1].sleeping);
    }

    #[test]
    fn test_jointless_cluster_never_sleeps_here() {
        let collision = CountingCollision {
            updates: AtomicUsize::new(0),
        };
        let cluster = BodyCluster {
            body_count: 2,
            joint_count: 0,
            ..Default::default()
        };
        let mut bodies = vec![sentinel(), island_body(1, Vector3::zeros())];

        integrate_cluster_velocities(
            &cluster,
            &mut bodies,
            &WorldConfig::default(),
            &collision,
            1.0 / 60.0,
            0,
        );

        assert!(!bodies[1].sleeping);
    }
}
