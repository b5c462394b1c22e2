use crate::math::Vec3;

use super::rigid_body::RigidBody;

/// Speed caps that keep a single bad step from exploding the simulation
const MAX_LINEAR_VELOCITY: f32 = 100.0;
const MAX_ANGULAR_VELOCITY: f32 = 50.0;

/// Integrates velocities (applies gravity and accumulated forces).
///
/// Only awake dynamic bodies are affected.
pub fn integrate_velocities(body: &mut RigidBody, gravity: Vec3, dt: f32) {
    if !body.is_dynamic() || body.is_sleeping() {
        return;
    }

    body.linear_velocity += (gravity * body.gravity_scale + body.force * body.inv_mass()) * dt;
    body.angular_velocity += body.inv_inertia_world() * body.torque * dt;

    body.linear_velocity *= (1.0 - body.linear_damping).powf(dt);
    body.angular_velocity *= (1.0 - body.angular_damping).powf(dt);

    let linear_speed = body.linear_velocity.length();
    if linear_speed > MAX_LINEAR_VELOCITY {
        body.linear_velocity *= MAX_LINEAR_VELOCITY / linear_speed;
    }

    let angular_speed = body.angular_velocity.length();
    if angular_speed > MAX_ANGULAR_VELOCITY {
        body.angular_velocity *= MAX_ANGULAR_VELOCITY / angular_speed;
    }

    if body.lock_rotation() {
        body.angular_velocity = Vec3::ZERO;
    }
}

/// Integrates positions (applies velocities to the transform).
///
/// Awake dynamic bodies and kinematic bodies move; static and sleeping
/// bodies stay put.
pub fn integrate_positions(body: &mut RigidBody, dt: f32) {
    if !body.is_active() {
        return;
    }

    body.position += body.linear_velocity * dt;
    body.orientation = body.orientation.integrate(body.angular_velocity, dt);
    body.update_world_inertia();
}
