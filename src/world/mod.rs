//! The physics world: owns every body, joint and contact and advances
//! them with a fixed timestep.

mod events;
mod query;

pub use events::{CollisionEvent, CollisionListener};
pub use query::RaycastHit;

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::collision::{
    detect_collision, BodyHandle, BroadPhaseConfig, CollisionPair, ContactManifold, SpatialHashBroadPhase,
};
use crate::constraints::{Joint, JointHandle, JointSet};
use crate::dynamics::{integrate_positions, integrate_velocities, BodySet, RigidBody, RigidBodyDesc};
use crate::error::{PhysicsError, Result};
use crate::geometry::Shape;
use crate::math::{Quat, Transform, Vec3};
use crate::solver::{ConstraintSolver, SolverConfig};

use events::EventTracker;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default simulation rate
pub const DEFAULT_TIMESTEP: f32 = 1.0 / 60.0;

/// Configuration for the physics world
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldConfig {
    /// Gravity vector
    pub gravity: Vec3,
    /// Length of one simulation step
    pub fixed_timestep: f32,
    /// Maximum steps per `update`; time beyond that is dropped
    pub max_substeps: usize,
    pub solver: SolverConfig,
    pub broad_phase: BroadPhaseConfig,
    /// Linear speed below which a body counts as resting
    pub sleep_linear_threshold: f32,
    /// Angular speed below which a body counts as resting
    pub sleep_angular_threshold: f32,
    /// Resting time before a body sleeps
    pub sleep_time_threshold: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            fixed_timestep: DEFAULT_TIMESTEP,
            max_substeps: 8,
            solver: SolverConfig::default(),
            broad_phase: BroadPhaseConfig::default(),
            sleep_linear_threshold: 0.05,
            sleep_angular_threshold: 0.05,
            sleep_time_threshold: 0.5,
        }
    }
}

/// The main physics world containing all bodies and managing simulation
pub struct World {
    config: WorldConfig,
    bodies: BodySet,
    broad_phase: SpatialHashBroadPhase,
    /// Manifolds from the last step, keyed by pair, for warm starting
    manifolds: HashMap<CollisionPair, ContactManifold>,
    joints: JointSet,
    solver: ConstraintSolver,
    events: EventTracker,
    listeners: Vec<Box<dyn CollisionListener>>,
    /// Unsimulated time carried between updates
    accumulator: f32,
    time: f32,
    step_count: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl World {
    /// Creates a new physics world with the given configuration
    pub fn new(mut config: WorldConfig) -> Self {
        if !(config.fixed_timestep > 0.0 && config.fixed_timestep.is_finite()) {
            warn!(timestep = config.fixed_timestep, "invalid fixed timestep, using default");
            config.fixed_timestep = DEFAULT_TIMESTEP;
        }
        config.max_substeps = config.max_substeps.max(1);

        Self {
            solver: ConstraintSolver::new(config.solver),
            broad_phase: SpatialHashBroadPhase::new(config.broad_phase),
            config,
            bodies: BodySet::new(),
            manifolds: HashMap::new(),
            joints: JointSet::new(),
            events: EventTracker::default(),
            listeners: Vec::new(),
            accumulator: 0.0,
            time: 0.0,
            step_count: 0,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Replaces the solver settings
    pub fn set_solver_config(&mut self, solver: SolverConfig) {
        self.config.solver = solver;
        self.solver.set_config(solver);
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.config.gravity = gravity;
    }

    pub fn gravity(&self) -> Vec3 {
        self.config.gravity
    }

    /// Total simulated time
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Number of fixed steps run so far
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    // --- bodies ---

    /// Creates a rigid body and returns its handle
    pub fn add_rigid_body(&mut self, desc: RigidBodyDesc) -> BodyHandle {
        let handle = self.bodies.insert(&desc);
        if let Some(aabb) = self.bodies.get(handle).and_then(RigidBody::world_aabb) {
            self.broad_phase.insert_body(handle, aabb);
        }
        debug!(?handle, body_type = ?desc.body_type, "added rigid body");
        handle
    }

    /// Removes a body along with its contacts and joints.
    ///
    /// Bodies that were touching it are woken so they can react. No exit
    /// event is reported for the removed body's pairs.
    pub fn remove_rigid_body(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        let body = self.bodies.remove(handle)?;
        self.broad_phase.remove_body(handle);

        let touching: Vec<CollisionPair> = self.manifolds.keys().filter(|p| p.contains(handle)).copied().collect();
        for pair in touching {
            self.manifolds.remove(&pair);
            if let Some(other) = pair.other(handle).and_then(|h| self.bodies.get_mut(h)) {
                other.wake_up();
            }
        }
        self.events.forget_body(handle);

        let joints = self.joints.remove_attached(handle);
        debug!(?handle, removed_joints = joints.len(), "removed rigid body");
        Some(body)
    }

    #[inline]
    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    /// Mutable access for material and flag changes. Position changes made
    /// here reach the broad phase at the next step; prefer
    /// [`World::set_position`] when queries must see them immediately.
    #[inline]
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn body_transform(&self, handle: BodyHandle) -> Option<Transform> {
        self.bodies.get(handle).map(RigidBody::transform)
    }

    pub fn bodies(&self) -> impl Iterator<Item = &RigidBody> {
        self.bodies.iter()
    }

    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    /// Attaches, replaces or (with `None`) removes a body's collision shape.
    ///
    /// Dynamic bodies get their inertia recomputed from the new shape.
    pub fn set_collision_shape(&mut self, handle: BodyHandle, shape: Option<Shape>) -> Result<()> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidBody(handle))?;
        body.set_shape(shape);
        body.wake_up();

        match body.world_aabb() {
            Some(aabb) => {
                self.broad_phase.update_body(handle, aabb);
            }
            None => {
                self.broad_phase.remove_body(handle);
                self.manifolds.retain(|pair, _| !pair.contains(handle));
            }
        }
        Ok(())
    }

    pub fn set_position(&mut self, handle: BodyHandle, position: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_position(position);
            self.refresh_body_bounds(handle);
        }
    }

    pub fn set_orientation(&mut self, handle: BodyHandle, orientation: Quat) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_orientation(orientation);
            self.refresh_body_bounds(handle);
        }
    }

    pub fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linear_velocity(velocity);
        }
    }

    pub fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_angular_velocity(velocity);
        }
    }

    /// Applies a force to a body at its center of mass
    pub fn apply_force(&mut self, handle: BodyHandle, force: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_force(force);
        }
    }

    /// Applies a force to a body at a world point
    pub fn apply_force_at_point(&mut self, handle: BodyHandle, force: Vec3, point: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_force_at_point(force, point);
        }
    }

    pub fn apply_torque(&mut self, handle: BodyHandle, torque: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_torque(torque);
        }
    }

    /// Applies an impulse to a body at its center of mass
    pub fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_impulse(impulse);
        }
    }

    /// Applies an impulse to a body at a world point
    pub fn apply_impulse_at_point(&mut self, handle: BodyHandle, impulse: Vec3, point: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_impulse_at_point(impulse, point);
        }
    }

    pub fn apply_angular_impulse(&mut self, handle: BodyHandle, impulse: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_angular_impulse(impulse);
        }
    }

    pub fn wake_up(&mut self, handle: BodyHandle) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.wake_up();
        }
    }

    fn refresh_body_bounds(&mut self, handle: BodyHandle) {
        if let Some(aabb) = self.bodies.get(handle).and_then(RigidBody::world_aabb) {
            self.broad_phase.update_body(handle, aabb);
        }
    }

    // --- joints ---

    /// Adds a joint after checking that its bodies exist. The bodies'
    /// current relative pose becomes the joint's reference pose.
    pub fn add_joint(&mut self, joint: impl Into<Joint>) -> Result<JointHandle> {
        let mut joint = joint.into();
        let (a, b) = (joint.body_a(), joint.body_b());

        let body_a = self.bodies.get(a).ok_or(PhysicsError::InvalidBody(a))?;
        let body_b = match b {
            Some(b) => Some(self.bodies.get(b).ok_or(PhysicsError::InvalidBody(b))?),
            None => None,
        };
        joint.bind(body_a, body_b);

        let handle = self.joints.insert(joint);
        self.wake_up(a);
        if let Some(b) = b {
            self.wake_up(b);
        }
        debug!(?handle, body_a = ?a, body_b = ?b, "added joint");
        Ok(handle)
    }

    pub fn remove_joint(&mut self, handle: JointHandle) -> Result<Joint> {
        let joint = self.joints.remove(handle).ok_or(PhysicsError::InvalidJoint(handle))?;
        self.wake_up(joint.body_a());
        if let Some(b) = joint.body_b() {
            self.wake_up(b);
        }
        debug!(?handle, "removed joint");
        Ok(joint)
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&Joint> {
        self.joints.get(handle)
    }

    pub fn joint_mut(&mut self, handle: JointHandle) -> Option<&mut Joint> {
        self.joints.get_mut(handle)
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &Joint)> {
        self.joints.iter()
    }

    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    /// Current angle of a hinge joint
    pub fn hinge_angle(&self, handle: JointHandle) -> Option<f32> {
        let hinge = self.joints.get(handle)?.as_hinge()?;
        let body_a = self.bodies.get(hinge.body_a())?;
        let body_b = match hinge.body_b() {
            Some(b) => Some(self.bodies.get(b)?),
            None => None,
        };
        Some(hinge.angle(body_a, body_b))
    }

    /// Current anchor distance of a distance joint
    pub fn joint_length(&self, handle: JointHandle) -> Option<f32> {
        let joint = self.joints.get(handle)?.as_distance()?;
        let body_a = self.bodies.get(joint.body_a())?;
        let body_b = match joint.body_b() {
            Some(b) => Some(self.bodies.get(b)?),
            None => None,
        };
        Some(joint.current_length(body_a, body_b))
    }

    // --- contacts and events ---

    /// Contact manifolds from the last step
    pub fn manifolds(&self) -> impl Iterator<Item = &ContactManifold> {
        self.manifolds.values()
    }

    pub fn manifold(&self, a: BodyHandle, b: BodyHandle) -> Option<&ContactManifold> {
        self.manifolds.get(&CollisionPair::new(a, b))
    }

    pub fn num_manifolds(&self) -> usize {
        self.manifolds.len()
    }

    /// Contact transitions reported by the last `update` that ran a step
    pub fn collision_events(&self) -> &[CollisionEvent] {
        self.events.events()
    }

    /// True if the pair was touching at the end of the last update that
    /// ran a step
    pub fn is_touching(&self, a: BodyHandle, b: BodyHandle) -> bool {
        self.events.is_touching(&CollisionPair::new(a, b))
    }

    pub fn add_collision_listener(&mut self, listener: Box<dyn CollisionListener>) {
        self.listeners.push(listener);
    }

    pub fn broad_phase(&self) -> &SpatialHashBroadPhase {
        &self.broad_phase
    }

    // --- simulation ---

    /// Advances the simulation by `dt` of wall time.
    ///
    /// Runs as many fixed steps as fit into the accumulated time, at most
    /// `max_substeps`; any excess is dropped. Collision events are diffed
    /// once at the end. Returns the number of steps run.
    pub fn update(&mut self, dt: f32) -> usize {
        if !(dt > 0.0 && dt.is_finite()) {
            return 0;
        }

        let fixed_dt = self.config.fixed_timestep;
        self.accumulator += dt;

        let mut steps = 0;
        while self.accumulator >= fixed_dt && steps < self.config.max_substeps {
            self.step(fixed_dt);
            self.accumulator -= fixed_dt;
            steps += 1;
        }

        if self.accumulator >= fixed_dt {
            let dropped = self.accumulator - self.accumulator % fixed_dt;
            self.accumulator %= fixed_dt;
            debug!(steps, dropped, "substep cap reached, dropping simulation time");
        }

        if steps > 0 {
            self.dispatch_events();
        } else {
            self.events.clear_events();
        }
        steps
    }

    /// Runs exactly one step of length `dt` without touching the
    /// accumulator or dispatching events
    pub fn step(&mut self, dt: f32) {
        if !(dt > 0.0 && dt.is_finite()) {
            return;
        }

        let gravity = self.config.gravity;
        for body in self.bodies.iter_mut() {
            integrate_velocities(body, gravity, dt);
            body.clear_forces();
        }

        self.broad_phase.update_all_bodies(&self.bodies);
        let pairs = self.broad_phase.find_potential_collisions(&self.bodies);
        self.wake_touched_bodies(&pairs);

        let warm_start_factor = self.config.solver.warm_start_factor;
        let mut manifolds: Vec<ContactManifold> = pairs
            .iter()
            .filter_map(|pair| {
                let mut manifold = detect_collision(&self.bodies, pair.body_a, pair.body_b)?;
                if let Some(old) = self.manifolds.get(pair) {
                    manifold.warm_start_from(old, warm_start_factor);
                }
                Some(manifold)
            })
            .collect();

        self.solver.prepare(&manifolds, &mut self.joints, &self.bodies, dt);
        self.solver.warm_start(&mut self.bodies, &self.joints);
        self.solver.solve_velocities(&mut self.bodies, &mut self.joints);
        self.solver.store_impulses(&mut manifolds);

        for handle in self.solver.check_joint_breaks(&mut self.joints, dt) {
            if let Some(joint) = self.joints.get(handle) {
                warn!(?handle, body_a = ?joint.body_a(), body_b = ?joint.body_b(), break_force = joint.break_force(), "joint broke");
            }
        }

        for body in self.bodies.iter_mut() {
            integrate_positions(body, dt);
        }

        self.solver.solve_positions(&mut manifolds, &mut self.bodies);
        self.solver.post_solve(&mut manifolds, &self.bodies);
        self.cache_manifolds(manifolds);

        self.update_sleep(dt);
        self.broad_phase.update_all_bodies(&self.bodies);

        self.time += dt;
        self.step_count += 1;
        trace!(
            step = self.step_count,
            pairs = pairs.len(),
            manifolds = self.manifolds.len(),
            contacts = self.solver.num_contact_constraints(),
            joints = self.solver.num_joint_constraints(),
            "step complete"
        );
    }

    /// Wakes sleeping bodies that a fast-moving partner touches, either
    /// through a candidate pair or a joint
    fn wake_touched_bodies(&mut self, pairs: &[CollisionPair]) {
        let linear = self.config.sleep_linear_threshold;
        let angular = self.config.sleep_angular_threshold;

        let links = pairs
            .iter()
            .map(|p| (p.body_a, Some(p.body_b)))
            .chain(self.joints.iter().filter(|(_, j)| j.is_enabled()).map(|(_, j)| (j.body_a(), j.body_b())));

        let mut to_wake = Vec::new();
        for (a, b) in links {
            let Some(b) = b else {
                continue;
            };
            let (Some(body_a), Some(body_b)) = (self.bodies.get(a), self.bodies.get(b)) else {
                continue;
            };
            if body_a.is_sleeping() && body_b.is_active() && body_b.is_moving_faster_than(linear, angular) {
                to_wake.push(a);
            }
            if body_b.is_sleeping() && body_a.is_active() && body_a.is_moving_faster_than(linear, angular) {
                to_wake.push(b);
            }
        }

        for handle in to_wake {
            self.wake_up(handle);
        }
    }

    /// Replaces the cache with this step's manifolds. Pairs whose bodies are
    /// now both inactive keep their old manifold so they still count as
    /// touching while asleep.
    fn cache_manifolds(&mut self, manifolds: Vec<ContactManifold>) {
        let bodies = &self.bodies;
        self.manifolds.retain(|pair, _| match (bodies.get(pair.body_a), bodies.get(pair.body_b)) {
            (Some(a), Some(b)) => !a.is_active() && !b.is_active(),
            _ => false,
        });
        for manifold in manifolds {
            self.manifolds.insert(CollisionPair::new(manifold.body_a, manifold.body_b), manifold);
        }
    }

    fn update_sleep(&mut self, dt: f32) {
        let (linear, angular, time) = (
            self.config.sleep_linear_threshold,
            self.config.sleep_angular_threshold,
            self.config.sleep_time_threshold,
        );
        for body in self.bodies.iter_mut() {
            if body.update_sleep(dt, linear, angular, time) {
                trace!(handle = ?body.handle(), "body fell asleep");
            }
        }
    }

    fn dispatch_events(&mut self) {
        self.events.update(self.manifolds.keys().copied());

        if self.listeners.is_empty() {
            return;
        }
        for event in self.events.events() {
            let pair = event.pair();
            let (a, b) = (pair.body_a, pair.body_b);
            for listener in &mut self.listeners {
                match event {
                    CollisionEvent::Enter(_) => {
                        if let Some(manifold) = self.manifolds.get(&pair) {
                            listener.on_collision_enter(a, b, manifold);
                        }
                    }
                    CollisionEvent::Stay(_) => {
                        if let Some(manifold) = self.manifolds.get(&pair) {
                            listener.on_collision_stay(a, b, manifold);
                        }
                    }
                    CollisionEvent::Exit(_) => listener.on_collision_exit(a, b),
                }
            }
        }
    }

    /// Removes every body, joint and contact
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.broad_phase.clear();
        self.manifolds.clear();
        self.joints.clear();
        self.events.clear();
        self.accumulator = 0.0;
    }
}
