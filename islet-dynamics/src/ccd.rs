//! The continuous-collision trigger.
//!
//! Consulted by the cluster builder for every contact whose endpoints opted
//! into continuous collision: a cheap relative-motion predicate decides
//! whether to pay for a swept probe, and the probe's candidate contacts
//! decide whether the island must be solved in continuous-collision mode.

use islet_types::{consts, RigidBody};

use crate::collide::{CcdBodyState, CcdContact, CollisionEngine};

/// Decide whether a contact needs continuous-collision resolution.
///
/// The probe is consulted only when the relative angular rate exceeds
/// [`consts::CCD_OMEGA_MAG2_THRESHOLD`] or the relative linear travel over
/// the step exceeds the contact's travel budget (a quarter of the smaller
/// shape's bounding radius). A candidate contact trips the flag when its
/// normal-projected closing travel exceeds the same budget.
pub(crate) fn contact_needs_continuous_resolve(
    body0: &RigidBody,
    body1: &RigidBody,
    collision: &dyn CollisionEngine,
    timestep: f64,
    probe: &mut Vec<CcdContact>,
) -> bool {
    let rel_veloc = body1.motion.veloc - body0.motion.veloc;
    let rel_omega = body1.motion.omega - body0.motion.omega;
    let dist =
        consts::CCD_MIN_RADIUS_SCALE * body0.min_bounding_radius.max(body1.min_bounding_radius);

    let spinning = rel_omega.norm_squared() > consts::CCD_OMEGA_MAG2_THRESHOLD;
    let travelling = rel_veloc.norm_squared() * timestep * timestep > dist * dist;
    if !(spinning || travelling) {
        return false;
    }

    probe.clear();
    collision.collide_continue(
        &CcdBodyState::from_body(body0),
        &CcdBodyState::from_body(body1),
        timestep,
        probe,
    );
    debug_assert!(probe.len() <= consts::CCD_MAX_PROBE_CONTACTS);

    let com0 = body0.global_com();
    let com1 = body1.global_com();
    probe.iter().any(|contact| {
        let vel0 = body0.motion.veloc + body0.motion.omega.cross(&(contact.point - com0));
        let vel1 = body1.motion.veloc + body1.motion.omega.cross(&(contact.point - com1));
        (vel1 - vel0).dot(&contact.normal) * timestep > dist
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use islet_types::{BodyId, BodyMotion, ShapeId, Vector3};
    use nalgebra::Point3;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ProbeStub {
        contacts: Vec<CcdContact>,
        probes: AtomicUsize,
    }

    impl ProbeStub {
        fn new(contacts: Vec<CcdContact>) -> Self {
            Self {
                contacts,
                probes: AtomicUsize::new(0),
            }
        }

        fn probe_count(&self) -> usize {
            self.probes.load(Ordering::Relaxed)
        }
    }

    impl CollisionEngine for ProbeStub {
        fn collide_continue(
            &self,
            _body0: &CcdBodyState,
            _body1: &CcdBodyState,
            _timestep: f64,
            out: &mut Vec<CcdContact>,
        ) {
            self.probes.fetch_add(1, Ordering::Relaxed);
            out.extend(self.contacts.iter().copied());
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

    fn sphere(radius: f64, veloc: Vector3<f64>) -> RigidBody {
        let mut body = RigidBody::dynamic(1.0, ShapeId::new(0), radius).with_velocity(veloc);
        body.continuous_collision = true;
        body
    }

    fn head_on_contact() -> CcdContact {
        CcdContact {
            point: Point3::new(1.0, 0.0, 0.0),
            normal: Vector3::new(1.0, 0.0, 0.0),
            penetration: 0.0,
            attribute0: 0,
            attribute1: 0,
        }
    }

    #[test]
    fn test_slow_contact_skips_probe() {
        let body0 = sphere(1.0, Vector3::zeros());
        let body1 = sphere(1.0, Vector3::new(0.1, 0.0, 0.0));
        let stub = ProbeStub::new(vec![head_on_contact()]);
        let mut scratch = Vec::new();

        let flagged =
            contact_needs_continuous_resolve(&body0, &body1, &stub, 1.0 / 60.0, &mut scratch);

        assert!(!flagged);
        assert_eq!(stub.probe_count(), 0);
    }

    #[test]
    fn test_fast_approach_trips_flag() {
        // 200 m/s closing speed over 1/60 s travels ~3.3 m, far past the
        // 0.25 m budget of radius-1 spheres.
        let body0 = sphere(1.0, Vector3::new(100.0, 0.0, 0.0));
        let body1 = sphere(1.0, Vector3::new(-100.0, 0.0, 0.0));
        let mut contact = head_on_contact();
        contact.normal = Vector3::new(-1.0, 0.0, 0.0);
        let stub = ProbeStub::new(vec![contact]);
        let mut scratch = Vec::new();

        let flagged =
            contact_needs_continuous_resolve(&body0, &body1, &stub, 1.0 / 60.0, &mut scratch);

        assert!(flagged);
        assert_eq!(stub.probe_count(), 1);
    }

    #[test]
    fn test_fast_but_separating_stays_clear() {
        let body0 = sphere(1.0, Vector3::new(-100.0, 0.0, 0.0));
        let body1 = sphere(1.0, Vector3::new(100.0, 0.0, 0.0));
        // Separating along the closing direction: the projected travel is
        // negative, so the probe finds nothing to resolve.
        let mut contact = head_on_contact();
        contact.normal = Vector3::new(-1.0, 0.0, 0.0);
        let stub = ProbeStub::new(vec![contact]);
        let mut scratch = Vec::new();

        let flagged =
            contact_needs_continuous_resolve(&body0, &body1, &stub, 1.0 / 60.0, &mut scratch);

        assert!(!flagged);
        assert_eq!(stub.probe_count(), 1);
    }

    #[test]
    fn test_angular_rate_alone_probes() {
        let mut body0 = sphere(1.0, Vector3::zeros());
        body0.motion.omega = Vector3::new(0.0, 0.0, 1.5);
        let body1 = sphere(1.0, Vector3::zeros());
        let stub = ProbeStub::new(Vec::new());
        let mut scratch = Vec::new();

        let flagged =
            contact_needs_continuous_resolve(&body0, &body1, &stub, 1.0 / 60.0, &mut scratch);

        assert!(!flagged);
        assert_eq!(stub.probe_count(), 1, "spin should force a probe");
    }
}
