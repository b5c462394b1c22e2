#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::collision::BodyHandle;
use crate::geometry::{Aabb, Shape};
use crate::math::{Mat3, Quat, Transform, Vec3};

use super::integrator::{integrate_positions, integrate_velocities};

/// Mass used when a dynamic body is created with a non-positive mass
pub const DEFAULT_MASS: f32 = 1.0;

/// The type of rigid body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BodyType {
    /// Never moves, infinite mass
    Static,
    /// Moves with its velocity but is not affected by forces or contacts
    Kinematic,
    /// Affected by forces and collisions
    #[default]
    Dynamic,
}

/// A rigid body in the physics simulation.
///
/// Bodies are owned by the [`World`](crate::World); state that must
/// keep the sleep machine consistent (transform, velocities, shape) is only
/// writable through setters that wake the body.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub(crate) handle: BodyHandle,
    pub(crate) body_type: BodyType,

    pub(crate) position: Vec3,
    pub(crate) orientation: Quat,

    pub(crate) linear_velocity: Vec3,
    /// Angular velocity (in radians per second)
    pub(crate) angular_velocity: Vec3,

    mass: f32,
    inv_mass: f32,
    inertia_local: Mat3,
    inv_inertia_local: Mat3,
    /// World space inverse inertia tensor (refreshed on every orientation change)
    inv_inertia_world: Mat3,

    /// Accumulated force (reset each step)
    pub(crate) force: Vec3,
    /// Accumulated torque (reset each step)
    pub(crate) torque: Vec3,

    /// Friction coefficient
    pub friction: f32,
    /// Restitution (bounciness)
    pub restitution: f32,
    /// Linear damping (0-1)
    pub linear_damping: f32,
    /// Angular damping (0-1)
    pub angular_damping: f32,
    /// Multiplier on world gravity
    pub gravity_scale: f32,

    shape: Option<Shape>,

    sleeping: bool,
    sleep_time: f32,
    /// Whether the body may fall asleep
    pub can_sleep: bool,
    lock_rotation: bool,

    /// Optional user data
    pub user_data: u64,
}

impl RigidBody {
    /// Builds a body from a description. Used by the world when inserting.
    pub fn from_desc(handle: BodyHandle, desc: &RigidBodyDesc) -> Self {
        let mut body = Self {
            handle,
            body_type: desc.body_type,
            position: desc.position,
            orientation: desc.orientation.normalize(),
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            mass: 0.0,
            inv_mass: 0.0,
            inertia_local: Mat3::ZERO,
            inv_inertia_local: Mat3::ZERO,
            inv_inertia_world: Mat3::ZERO,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            friction: desc.friction.max(0.0),
            restitution: desc.restitution.clamp(0.0, 1.0),
            linear_damping: desc.linear_damping.clamp(0.0, 1.0),
            angular_damping: desc.angular_damping.clamp(0.0, 1.0),
            gravity_scale: desc.gravity_scale,
            shape: desc.shape,
            sleeping: false,
            sleep_time: 0.0,
            can_sleep: desc.can_sleep,
            lock_rotation: desc.lock_rotation,
            user_data: desc.user_data,
        };

        body.set_mass(desc.mass);
        if body.body_type != BodyType::Static {
            body.linear_velocity = desc.linear_velocity;
            if !body.lock_rotation {
                body.angular_velocity = desc.angular_velocity;
            }
        }
        body
    }

    #[inline]
    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    #[inline]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    #[inline]
    pub fn is_kinematic(&self) -> bool {
        self.body_type == BodyType::Kinematic
    }

    /// True for awake dynamic bodies and for kinematic bodies, i.e. bodies
    /// that can move this step
    #[inline]
    pub fn is_active(&self) -> bool {
        match self.body_type {
            BodyType::Dynamic => !self.sleeping,
            BodyType::Kinematic => true,
            BodyType::Static => false,
        }
    }

    #[inline]
    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    #[inline]
    pub fn sleep_time(&self) -> f32 {
        self.sleep_time
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    /// Snapshot of position and orientation for rendering
    #[inline]
    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.orientation)
    }

    #[inline]
    pub fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }

    #[inline]
    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    #[inline]
    pub fn force(&self) -> Vec3 {
        self.force
    }

    #[inline]
    pub fn torque(&self) -> Vec3 {
        self.torque
    }

    /// Returns the mass, or infinity for static and kinematic bodies
    #[inline]
    pub fn mass(&self) -> f32 {
        if self.inv_mass > 0.0 {
            self.mass
        } else {
            f32::INFINITY
        }
    }

    #[inline]
    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    #[inline]
    pub fn inertia_local(&self) -> Mat3 {
        self.inertia_local
    }

    #[inline]
    pub fn inv_inertia_world(&self) -> Mat3 {
        self.inv_inertia_world
    }

    /// Inverse mass seen by the solver: sleeping bodies behave as static
    #[inline]
    pub fn solver_inv_mass(&self) -> f32 {
        if self.sleeping {
            0.0
        } else {
            self.inv_mass
        }
    }

    /// Inverse world inertia seen by the solver
    #[inline]
    pub fn solver_inv_inertia(&self) -> Mat3 {
        if self.sleeping {
            Mat3::ZERO
        } else {
            self.inv_inertia_world
        }
    }

    #[inline]
    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    #[inline]
    pub fn lock_rotation(&self) -> bool {
        self.lock_rotation
    }

    /// World bounds of the attached shape
    #[inline]
    pub fn world_aabb(&self) -> Option<Aabb> {
        self.shape.map(|shape| shape.world_aabb(self.transform()))
    }

    /// Sets the mass and recomputes the inertia from the shape.
    ///
    /// Static and kinematic bodies keep infinite mass. A dynamic body given a
    /// non-positive or non-finite mass falls back to [`DEFAULT_MASS`].
    pub fn set_mass(&mut self, mass: f32) {
        if !self.is_dynamic() {
            self.mass = 0.0;
            self.inv_mass = 0.0;
            self.inertia_local = Mat3::ZERO;
            self.inv_inertia_local = Mat3::ZERO;
            self.inv_inertia_world = Mat3::ZERO;
            return;
        }

        let mass = if mass > 0.0 && mass.is_finite() {
            mass
        } else {
            tracing::warn!(
                body = ?self.handle,
                mass,
                "dynamic body has invalid mass, using default"
            );
            DEFAULT_MASS
        };

        self.mass = mass;
        self.inv_mass = 1.0 / mass;
        self.recompute_inertia();
    }

    /// Attaches or removes the collision shape, refreshing the inertia
    pub fn set_shape(&mut self, shape: Option<Shape>) {
        self.shape = shape;
        if self.is_dynamic() {
            self.recompute_inertia();
        }
        self.wake_up();
    }

    /// Locks or unlocks rotation (infinite rotational inertia)
    pub fn set_lock_rotation(&mut self, lock: bool) {
        self.lock_rotation = lock;
        if lock {
            self.angular_velocity = Vec3::ZERO;
        }
        if self.is_dynamic() {
            self.recompute_inertia();
        }
    }

    fn recompute_inertia(&mut self) {
        // Without a shape the body spins like a unit sphere
        self.inertia_local = match &self.shape {
            Some(shape) => shape.inertia_tensor(self.mass),
            None => Mat3::from_diagonal(Vec3::splat(0.4 * self.mass)),
        };
        self.inv_inertia_local = if self.lock_rotation {
            Mat3::ZERO
        } else {
            self.inertia_local.try_inverse().unwrap_or(Mat3::ZERO)
        };
        self.update_world_inertia();
    }

    /// Updates the world space inertia tensor
    pub fn update_world_inertia(&mut self) {
        if !self.is_dynamic() {
            self.inv_inertia_world = Mat3::ZERO;
            return;
        }
        self.inv_inertia_world = self.inv_inertia_local.rotated(Mat3::from_quat(self.orientation));
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.wake_up();
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation.normalize();
        self.update_world_inertia();
        self.wake_up();
    }

    /// Sets the linear velocity. Ignored for static bodies.
    pub fn set_linear_velocity(&mut self, velocity: Vec3) {
        if self.is_static() {
            return;
        }
        self.linear_velocity = velocity;
        self.wake_up();
    }

    /// Sets the angular velocity. Ignored for static and rotation-locked bodies.
    pub fn set_angular_velocity(&mut self, velocity: Vec3) {
        if self.is_static() || self.lock_rotation {
            return;
        }
        self.angular_velocity = velocity;
        self.wake_up();
    }

    /// Applies a force at the center of mass
    pub fn apply_force(&mut self, force: Vec3) {
        if self.is_dynamic() {
            self.force += force;
            self.wake_up();
        }
    }

    /// Applies a force at a world point
    pub fn apply_force_at_point(&mut self, force: Vec3, point: Vec3) {
        if self.is_dynamic() {
            self.force += force;
            self.torque += (point - self.position).cross(force);
            self.wake_up();
        }
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        if self.is_dynamic() {
            self.torque += torque;
            self.wake_up();
        }
    }

    /// Applies an impulse at the center of mass
    pub fn apply_impulse(&mut self, impulse: Vec3) {
        if self.is_dynamic() {
            self.linear_velocity += impulse * self.inv_mass;
            self.wake_up();
        }
    }

    /// Applies an impulse at a world point
    pub fn apply_impulse_at_point(&mut self, impulse: Vec3, point: Vec3) {
        if self.is_dynamic() {
            self.linear_velocity += impulse * self.inv_mass;
            let r = point - self.position;
            self.angular_velocity += self.inv_inertia_world * r.cross(impulse);
            self.wake_up();
        }
    }

    pub fn apply_angular_impulse(&mut self, impulse: Vec3) {
        if self.is_dynamic() {
            self.angular_velocity += self.inv_inertia_world * impulse;
            self.wake_up();
        }
    }

    /// Gets the velocity at a world point
    #[inline]
    pub fn velocity_at_point(&self, point: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(point - self.position)
    }

    /// Clears accumulated forces
    #[inline]
    pub fn clear_forces(&mut self) {
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }

    /// Advances this body on its own by one semi-implicit Euler step.
    ///
    /// Only awake dynamic bodies move; the force accumulators are cleared in
    /// every case. World gravity is not applied here.
    pub fn integrate(&mut self, dt: f32) {
        if self.is_dynamic() && !self.sleeping {
            integrate_velocities(self, Vec3::ZERO, dt);
            integrate_positions(self, dt);
        }
        self.clear_forces();
    }

    /// Wakes the body and restarts its sleep timer
    pub fn wake_up(&mut self) {
        if self.is_dynamic() {
            self.sleeping = false;
        }
        self.sleep_time = 0.0;
    }

    /// Puts the body to sleep, zeroing its velocities
    pub fn sleep(&mut self) {
        if self.can_sleep && self.is_dynamic() {
            self.sleeping = true;
            self.linear_velocity = Vec3::ZERO;
            self.angular_velocity = Vec3::ZERO;
            self.clear_forces();
        }
    }

    /// True when either speed exceeds its threshold
    #[inline]
    pub fn is_moving_faster_than(&self, linear: f32, angular: f32) -> bool {
        self.linear_velocity.length_squared() > linear * linear
            || self.angular_velocity.length_squared() > angular * angular
    }

    /// Advances the sleep timer. Returns true if the body fell asleep.
    pub fn update_sleep(
        &mut self,
        dt: f32,
        linear_threshold: f32,
        angular_threshold: f32,
        time_threshold: f32,
    ) -> bool {
        if !self.can_sleep || !self.is_dynamic() || self.sleeping {
            return false;
        }

        if self.is_moving_faster_than(linear_threshold, angular_threshold) {
            self.sleep_time = 0.0;
            return false;
        }

        self.sleep_time += dt;
        if self.sleep_time > time_threshold {
            self.sleep();
            return true;
        }
        false
    }
}

/// Description for creating a rigid body
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidBodyDesc {
    pub body_type: BodyType,
    pub position: Vec3,
    pub orientation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub mass: f32,
    pub shape: Option<Shape>,
    pub friction: f32,
    pub restitution: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub gravity_scale: f32,
    pub can_sleep: bool,
    pub lock_rotation: bool,
    pub user_data: u64,
}

impl Default for RigidBodyDesc {
    fn default() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            mass: 1.0,
            shape: None,
            friction: 0.6,
            restitution: 0.3,
            linear_damping: 0.0,
            angular_damping: 0.1,
            gravity_scale: 1.0,
            can_sleep: true,
            lock_rotation: false,
            user_data: 0,
        }
    }
}

impl RigidBodyDesc {
    /// Creates a new dynamic body description
    pub fn dynamic() -> Self {
        Self::default()
    }

    /// Creates a new static body description
    pub fn fixed() -> Self {
        Self {
            body_type: BodyType::Static,
            mass: 0.0,
            ..Self::default()
        }
    }

    /// Creates a new kinematic body description
    pub fn kinematic() -> Self {
        Self {
            body_type: BodyType::Kinematic,
            mass: 0.0,
            ..Self::default()
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn with_linear_velocity(mut self, velocity: Vec3) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, velocity: Vec3) -> Self {
        self.angular_velocity = velocity;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn with_can_sleep(mut self, can_sleep: bool) -> Self {
        self.can_sleep = can_sleep;
        self
    }

    pub fn with_lock_rotation(mut self, lock: bool) -> Self {
        self.lock_rotation = lock;
        self
    }

    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn body(desc: RigidBodyDesc) -> RigidBody {
        RigidBody::from_desc(BodyHandle::new(0, 0), &desc)
    }

    #[test]
    fn test_body_creation() {
        let b = body(
            RigidBodyDesc::dynamic()
                .with_position(Vec3::new(1.0, 2.0, 3.0))
                .with_mass(2.0),
        );
        assert_eq!(b.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_abs_diff_eq!(b.inv_mass(), 0.5);
        assert!(b.is_active());
    }

    #[test]
    fn test_static_body_has_infinite_mass() {
        let b = body(RigidBodyDesc::fixed().with_mass(10.0));
        assert!(b.is_static());
        assert_eq!(b.inv_mass(), 0.0);
        assert_eq!(b.inv_inertia_world(), Mat3::ZERO);
        assert!(!b.is_active());
    }

    #[test]
    fn test_invalid_mass_is_clamped() {
        let b = body(RigidBodyDesc::dynamic().with_mass(-3.0));
        assert_abs_diff_eq!(b.mass(), DEFAULT_MASS);
        let b = body(RigidBodyDesc::dynamic().with_mass(f32::NAN));
        assert_abs_diff_eq!(b.mass(), DEFAULT_MASS);
    }

    #[test]
    fn test_inertia_follows_shape() {
        let mut b = body(RigidBodyDesc::dynamic().with_mass(5.0));
        b.set_shape(Some(Shape::sphere(1.0)));
        assert_abs_diff_eq!(b.inertia_local().diagonal().x, 2.0, epsilon = 1e-5);

        b.set_lock_rotation(true);
        assert_eq!(b.inv_inertia_world(), Mat3::ZERO);
    }

    #[test]
    fn test_apply_impulse() {
        let mut b = body(RigidBodyDesc::dynamic().with_mass(1.0));
        b.apply_impulse(Vec3::X);
        assert_eq!(b.linear_velocity(), Vec3::X);
    }

    #[test]
    fn test_forces_ignored_on_static_and_kinematic() {
        for desc in [RigidBodyDesc::fixed(), RigidBodyDesc::kinematic()] {
            let mut b = body(desc);
            b.apply_force(Vec3::new(100.0, 0.0, 0.0));
            b.apply_torque(Vec3::Y);
            b.integrate(1.0 / 60.0);
            assert_eq!(b.position(), Vec3::ZERO);
            assert_eq!(b.orientation(), Quat::IDENTITY);
        }
    }

    #[test]
    fn test_sleep_state_machine() {
        let mut b = body(RigidBodyDesc::dynamic());
        let dt = 0.125;
        for _ in 0..4 {
            assert!(!b.update_sleep(dt, 0.05, 0.05, 0.5));
        }
        assert!(b.update_sleep(dt, 0.05, 0.05, 0.5));
        assert!(b.is_sleeping());
        assert!(!b.is_active());

        b.apply_force(Vec3::Y);
        assert!(!b.is_sleeping());
        assert_eq!(b.sleep_time(), 0.0);
    }

    #[test]
    fn test_motion_resets_sleep_timer() {
        let mut b = body(RigidBodyDesc::dynamic());
        b.update_sleep(0.3, 0.05, 0.05, 0.5);
        b.set_linear_velocity(Vec3::X);
        b.update_sleep(0.3, 0.05, 0.05, 0.5);
        assert_eq!(b.sleep_time(), 0.0);
        assert!(!b.is_sleeping());
    }

    #[test]
    fn test_velocity_at_point() {
        let mut b = body(RigidBodyDesc::dynamic());
        b.set_linear_velocity(Vec3::X);
        b.set_angular_velocity(Vec3::Z);
        // (0, 0, 1) x (0, 1, 0) = (-1, 0, 0)
        let vel = b.velocity_at_point(Vec3::Y);
        assert!(vel.length() < 1e-4);
    }
}
