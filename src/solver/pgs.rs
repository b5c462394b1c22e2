use crate::collision::{BodyHandle, ContactManifold};
use crate::constraints::{ContactConstraint, JointHandle, JointSet};
use crate::dynamics::{BodySet, RigidBody};
use crate::math::Vec3;

use super::SolverConfig;

/// Per-manifold velocity constraints, one per contact point
#[derive(Debug, Clone)]
struct ManifoldConstraints {
    /// Index into the manifold slice passed to [`ConstraintSolver::prepare`]
    manifold: usize,
    body_a: BodyHandle,
    body_b: BodyHandle,
    points: Vec<ContactConstraint>,
}

/// Projected Gauss-Seidel (sequential impulse) solver for contacts and joints
#[derive(Debug, Clone, Default)]
pub struct ConstraintSolver {
    config: SolverConfig,
    contacts: Vec<ManifoldConstraints>,
    joints: Vec<JointHandle>,
}

impl ConstraintSolver {
    /// Creates a new solver with the given configuration
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            contacts: Vec::new(),
            joints: Vec::new(),
        }
    }

    /// Builds velocity constraints for this step.
    ///
    /// Manifolds between two immovable bodies and disabled joints or joints
    /// with a missing body are skipped.
    pub fn prepare(&mut self, manifolds: &[ContactManifold], joints: &mut JointSet, bodies: &BodySet, dt: f32) {
        self.contacts.clear();
        self.joints.clear();

        for (index, manifold) in manifolds.iter().enumerate() {
            let (Some(body_a), Some(body_b)) = (bodies.get(manifold.body_a), bodies.get(manifold.body_b)) else {
                continue;
            };
            if body_a.solver_inv_mass() == 0.0 && body_b.solver_inv_mass() == 0.0 {
                continue;
            }

            let points: Vec<_> = manifold
                .iter()
                .map(|contact| {
                    ContactConstraint::new(
                        contact,
                        manifold.normal,
                        body_a,
                        body_b,
                        manifold.friction,
                        manifold.restitution,
                        &self.config,
                        dt,
                    )
                })
                .collect();

            if !points.is_empty() {
                self.contacts.push(ManifoldConstraints {
                    manifold: index,
                    body_a: manifold.body_a,
                    body_b: manifold.body_b,
                    points,
                });
            }
        }

        for (handle, joint) in joints.iter_mut() {
            if !joint.is_enabled() {
                continue;
            }
            let Some(body_a) = bodies.get(joint.body_a()) else {
                continue;
            };
            let body_b = match joint.body_b() {
                Some(b) => match bodies.get(b) {
                    Some(body) => Some(body),
                    None => continue,
                },
                None => None,
            };

            joint.prepare(body_a, body_b, dt, self.config.baumgarte, self.config.warm_start_factor);
            self.joints.push(handle);
        }
    }

    /// Warm starts the solver using previously accumulated impulses
    pub fn warm_start(&self, bodies: &mut BodySet, joints: &JointSet) {
        for handle in &self.joints {
            if let Some(joint) = joints.get(*handle) {
                with_joint_bodies(bodies, joint.body_a(), joint.body_b(), |a, b| joint.warm_start(a, b));
            }
        }

        for manifold in &self.contacts {
            if let Some((body_a, body_b)) = bodies.get2_mut(manifold.body_a, manifold.body_b) {
                for constraint in &manifold.points {
                    constraint.warm_start(body_a, body_b);
                }
            }
        }
    }

    /// Runs the velocity iterations over joints and contacts
    pub fn solve_velocities(&mut self, bodies: &mut BodySet, joints: &mut JointSet) {
        for _ in 0..self.config.velocity_iterations {
            for handle in &self.joints {
                if let Some(joint) = joints.get_mut(*handle) {
                    let (a, b) = (joint.body_a(), joint.body_b());
                    with_joint_bodies(bodies, a, b, |body_a, body_b| joint.solve(body_a, body_b));
                }
            }

            for manifold in &mut self.contacts {
                let Some((body_a, body_b)) = bodies.get2_mut(manifold.body_a, manifold.body_b) else {
                    continue;
                };
                for constraint in &mut manifold.points {
                    constraint.solve_normal(body_a, body_b);
                    constraint.solve_friction(body_a, body_b);
                }
            }
        }
    }

    /// Writes accumulated impulses back to the manifolds for warm starting
    pub fn store_impulses(&self, manifolds: &mut [ContactManifold]) {
        for constraints in &self.contacts {
            let Some(manifold) = manifolds.get_mut(constraints.manifold) else {
                continue;
            };
            for (contact, constraint) in manifold.iter_mut().zip(&constraints.points) {
                constraint.store_impulses(contact);
            }
        }
    }

    /// Breaks joints whose force exceeded their limit this step.
    /// Returns the handles that broke.
    pub fn check_joint_breaks(&self, joints: &mut JointSet, dt: f32) -> Vec<JointHandle> {
        self.joints
            .iter()
            .copied()
            .filter(|handle| joints.get_mut(*handle).is_some_and(|joint| joint.check_break(dt)))
            .collect()
    }

    /// Pushes penetrating bodies apart, see [`solve_position_constraints`]
    pub fn solve_positions(&self, manifolds: &mut [ContactManifold], bodies: &mut BodySet) -> bool {
        solve_position_constraints(manifolds, bodies, &self.config)
    }

    /// Refreshes every manifold from the final transforms, drops points that
    /// separated past the threshold and then empty manifolds
    pub fn post_solve(&self, manifolds: &mut Vec<ContactManifold>, bodies: &BodySet) {
        manifolds.retain_mut(|manifold| {
            let (Some(a), Some(b)) = (bodies.get(manifold.body_a), bodies.get(manifold.body_b)) else {
                return false;
            };
            manifold.refresh(a.transform(), b.transform());
            manifold.remove_separated(self.config.separation_threshold);
            !manifold.is_empty()
        });
    }

    pub fn num_contact_constraints(&self) -> usize {
        self.contacts.iter().map(|m| m.points.len()).sum()
    }

    pub fn num_joint_constraints(&self) -> usize {
        self.joints.len()
    }

    /// Returns the solver configuration
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Sets the solver configuration
    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }
}

/// Runs `f` with body A and, unless the joint is world-anchored, body B
fn with_joint_bodies<R>(
    bodies: &mut BodySet,
    a: BodyHandle,
    b: Option<BodyHandle>,
    f: impl FnOnce(&mut RigidBody, Option<&mut RigidBody>) -> R,
) -> Option<R> {
    match b {
        Some(b) => {
            let (body_a, body_b) = bodies.get2_mut(a, b)?;
            Some(f(body_a, Some(body_b)))
        }
        None => bodies.get_mut(a).map(|body_a| f(body_a, None)),
    }
}

/// Solves position constraints to resolve penetration.
///
/// Each point's penetration is recomputed from its cached local points and
/// moves both bodies (position and orientation) along the normal by
/// `position_correction` of the error beyond the slop, split by inverse
/// mass. Returns true when the last iteration found every point within the
/// slop.
pub fn solve_position_constraints(
    manifolds: &mut [ContactManifold],
    bodies: &mut BodySet,
    config: &SolverConfig,
) -> bool {
    let mut solved = true;

    for _ in 0..config.position_iterations {
        let mut max_penetration = 0.0f32;

        for manifold in manifolds.iter_mut() {
            let Some((body_a, body_b)) = bodies.get2_mut(manifold.body_a, manifold.body_b) else {
                continue;
            };
            if body_a.solver_inv_mass() == 0.0 && body_b.solver_inv_mass() == 0.0 {
                continue;
            }

            let normal = manifold.normal;
            for contact in manifold.iter() {
                // Earlier points may already have moved the bodies
                let point_a = body_a.transform().transform_point(contact.local_point_a);
                let point_b = body_b.transform().transform_point(contact.local_point_b);
                let penetration = (point_a - point_b).dot(normal);
                max_penetration = max_penetration.max(penetration);

                let error = penetration - config.slop;
                if error > 0.0 {
                    let midpoint = (point_a + point_b) * 0.5;
                    solve_single_position_constraint(midpoint, normal, error, body_a, body_b, config);
                }
            }
            manifold.refresh(body_a.transform(), body_b.transform());
        }

        solved = max_penetration <= config.slop;
        if solved {
            break;
        }
    }

    solved
}

/// Moves A against and B along `normal` to remove part of `error`
fn solve_single_position_constraint(
    point: Vec3,
    normal: Vec3,
    error: f32,
    body_a: &mut RigidBody,
    body_b: &mut RigidBody,
    config: &SolverConfig,
) {
    let r_a = point - body_a.position;
    let r_b = point - body_b.position;
    let (inv_mass_a, inv_mass_b) = (body_a.solver_inv_mass(), body_b.solver_inv_mass());
    let (inv_inertia_a, inv_inertia_b) = (body_a.solver_inv_inertia(), body_b.solver_inv_inertia());

    let rn_a = r_a.cross(normal);
    let rn_b = r_b.cross(normal);
    let k = inv_mass_a + inv_mass_b + rn_a.dot(inv_inertia_a * rn_a) + rn_b.dot(inv_inertia_b * rn_b);
    if k <= 0.0 {
        return;
    }

    let correction = config.position_correction * error / k;
    let impulse = normal * correction;

    body_a.position -= impulse * inv_mass_a;
    body_a.orientation = body_a.orientation.integrate(-(inv_inertia_a * r_a.cross(impulse)), 1.0);
    body_a.update_world_inertia();

    body_b.position += impulse * inv_mass_b;
    body_b.orientation = body_b.orientation.integrate(inv_inertia_b * r_b.cross(impulse), 1.0);
    body_b.update_world_inertia();
}
