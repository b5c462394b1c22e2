use crate::collision::ContactPoint;
use crate::dynamics::RigidBody;
use crate::math::Vec3;
use crate::solver::SolverConfig;

/// A velocity constraint for a contact point
#[derive(Debug, Clone, Copy)]
pub struct ContactConstraint {
    /// Contact normal (pointing from A to B)
    pub normal: Vec3,
    /// First tangent direction
    pub tangent1: Vec3,
    /// Second tangent direction
    pub tangent2: Vec3,
    /// Radius vector from body A center to contact point
    pub r_a: Vec3,
    /// Radius vector from body B center to contact point
    pub r_b: Vec3,
    /// Effective mass for normal constraint
    pub normal_mass: f32,
    pub tangent1_mass: f32,
    pub tangent2_mass: f32,
    /// Target separating velocity (restitution plus penetration feedback)
    pub velocity_bias: f32,
    pub friction: f32,
    /// Accumulated normal impulse
    pub normal_impulse: f32,
    pub tangent1_impulse: f32,
    pub tangent2_impulse: f32,
}

impl ContactConstraint {
    /// Creates a contact constraint for one manifold point
    pub fn new(
        contact: &ContactPoint,
        normal: Vec3,
        body_a: &RigidBody,
        body_b: &RigidBody,
        friction: f32,
        restitution: f32,
        config: &SolverConfig,
        dt: f32,
    ) -> Self {
        let point = contact.midpoint();
        let (tangent1, tangent2) = normal.orthonormal_basis();

        let r_a = point - body_a.position;
        let r_b = point - body_b.position;

        let normal_mass = effective_mass(body_a, body_b, r_a, r_b, normal);
        let tangent1_mass = effective_mass(body_a, body_b, r_a, r_b, tangent1);
        let tangent2_mass = effective_mass(body_a, body_b, r_a, r_b, tangent2);

        let penetration = contact.penetration;
        let velocity_bias = if penetration < 0.0 {
            // Speculative: allow closing exactly the gap within this step
            penetration / dt
        } else {
            let normal_velocity = relative_velocity(body_a, body_b, r_a, r_b).dot(normal);
            let restitution_bias = if normal_velocity < -config.restitution_threshold {
                -restitution * normal_velocity
            } else {
                0.0
            };
            let penetration_bias = config.baumgarte / dt * (penetration - config.slop).max(0.0);
            restitution_bias + penetration_bias
        };

        Self {
            normal,
            tangent1,
            tangent2,
            r_a,
            r_b,
            normal_mass,
            tangent1_mass,
            tangent2_mass,
            velocity_bias,
            friction,
            normal_impulse: contact.normal_impulse,
            tangent1_impulse: contact.tangent_impulse_1,
            tangent2_impulse: contact.tangent_impulse_2,
        }
    }

    /// Solves the normal constraint (non-penetration)
    pub fn solve_normal(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody) {
        let normal_velocity = relative_velocity(body_a, body_b, self.r_a, self.r_b).dot(self.normal);
        let impulse = self.normal_mass * (-normal_velocity + self.velocity_bias);

        // Clamp accumulated impulse (non-negative for contacts)
        let old_impulse = self.normal_impulse;
        self.normal_impulse = (old_impulse + impulse).max(0.0);
        let applied = self.normal_impulse - old_impulse;

        apply_impulse(body_a, body_b, self.normal * applied, self.r_a, self.r_b);
    }

    /// Solves both friction directions, bounded by the friction cone
    pub fn solve_friction(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody) {
        let max_friction = self.friction * self.normal_impulse;

        let tangents = [
            (self.tangent1, self.tangent1_mass, &mut self.tangent1_impulse),
            (self.tangent2, self.tangent2_mass, &mut self.tangent2_impulse),
        ];
        for (tangent, mass, accumulated) in tangents {
            let tangent_velocity = relative_velocity(body_a, body_b, self.r_a, self.r_b).dot(tangent);
            let impulse = mass * -tangent_velocity;

            let old_impulse = *accumulated;
            *accumulated = (old_impulse + impulse).clamp(-max_friction, max_friction);
            let applied = *accumulated - old_impulse;

            apply_impulse(body_a, body_b, tangent * applied, self.r_a, self.r_b);
        }
    }

    /// Applies the impulses carried over from the previous step
    pub fn warm_start(&self, body_a: &mut RigidBody, body_b: &mut RigidBody) {
        let p = self.normal * self.normal_impulse
            + self.tangent1 * self.tangent1_impulse
            + self.tangent2 * self.tangent2_impulse;
        apply_impulse(body_a, body_b, p, self.r_a, self.r_b);
    }

    /// Stores accumulated impulses back to the contact point
    pub fn store_impulses(&self, contact: &mut ContactPoint) {
        contact.normal_impulse = self.normal_impulse;
        contact.tangent_impulse_1 = self.tangent1_impulse;
        contact.tangent_impulse_2 = self.tangent2_impulse;
    }
}

/// Effective mass along `direction`; sleeping bodies count as immovable
pub(crate) fn effective_mass(body_a: &RigidBody, body_b: &RigidBody, r_a: Vec3, r_b: Vec3, direction: Vec3) -> f32 {
    let rn_a = r_a.cross(direction);
    let rn_b = r_b.cross(direction);

    let k = body_a.solver_inv_mass()
        + body_b.solver_inv_mass()
        + rn_a.dot(body_a.solver_inv_inertia() * rn_a)
        + rn_b.dot(body_b.solver_inv_inertia() * rn_b);

    if k > 0.0 {
        1.0 / k
    } else {
        0.0
    }
}

/// Velocity of B relative to A at the contact. With the normal pointing
/// from A to B, a negative normal component means the bodies approach.
fn relative_velocity(body_a: &RigidBody, body_b: &RigidBody, r_a: Vec3, r_b: Vec3) -> Vec3 {
    let vel_a = body_a.linear_velocity + body_a.angular_velocity.cross(r_a);
    let vel_b = body_b.linear_velocity + body_b.angular_velocity.cross(r_b);
    vel_b - vel_a
}

/// B receives `impulse`, A receives its opposite
fn apply_impulse(body_a: &mut RigidBody, body_b: &mut RigidBody, impulse: Vec3, r_a: Vec3, r_b: Vec3) {
    body_a.linear_velocity -= impulse * body_a.solver_inv_mass();
    body_a.angular_velocity -= body_a.solver_inv_inertia() * r_a.cross(impulse);

    body_b.linear_velocity += impulse * body_b.solver_inv_mass();
    body_b.angular_velocity += body_b.solver_inv_inertia() * r_b.cross(impulse);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::BodyHandle;
    use crate::dynamics::RigidBodyDesc;
    use crate::math::Transform;
    use approx::assert_abs_diff_eq;

    fn ground_and_ball(ball_velocity: Vec3) -> (RigidBody, RigidBody) {
        let ground = RigidBody::from_desc(BodyHandle::new(0, 0), &RigidBodyDesc::fixed());
        let ball = RigidBody::from_desc(
            BodyHandle::new(1, 0),
            &RigidBodyDesc::dynamic()
                .with_position(Vec3::new(0.0, 1.0, 0.0))
                .with_linear_velocity(ball_velocity),
        );
        (ground, ball)
    }

    fn contact(penetration: f32) -> ContactPoint {
        let on_ground = Vec3::new(0.0, 0.0, 0.0);
        ContactPoint::new(
            on_ground + Vec3::Y * penetration,
            on_ground,
            Transform::IDENTITY,
            Transform::from_position(Vec3::new(0.0, 1.0, 0.0)),
            penetration,
        )
    }

    #[test]
    fn test_effective_mass_against_static() {
        let (ground, ball) = ground_and_ball(Vec3::ZERO);
        // Contact straight below the center: no lever arm
        let mass = effective_mass(&ground, &ball, Vec3::ZERO, Vec3::new(0.0, -1.0, 0.0), Vec3::Y);
        assert_abs_diff_eq!(mass, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normal_impulse_stops_approach_without_pulling() {
        let config = SolverConfig::default();
        let dt = 1.0 / 60.0;

        // Ground is A, ball is B; the normal points up into the ball
        let (mut ground, mut ball) = ground_and_ball(Vec3::new(0.0, -0.5, 0.0));
        let mut c = ContactConstraint::new(&contact(0.0), Vec3::Y, &ground, &ball, 0.5, 0.0, &config, dt);
        c.solve_normal(&mut ground, &mut ball);
        assert_abs_diff_eq!(ball.linear_velocity().y, 0.0, epsilon = 1e-5);
        assert!(c.normal_impulse > 0.0);

        let (mut ground, mut ball) = ground_and_ball(Vec3::new(0.0, 2.0, 0.0));
        let mut c = ContactConstraint::new(&contact(0.0), Vec3::Y, &ground, &ball, 0.5, 0.0, &config, dt);
        c.solve_normal(&mut ground, &mut ball);
        assert_eq!(c.normal_impulse, 0.0);
        assert_abs_diff_eq!(ball.linear_velocity().y, 2.0);
    }

    #[test]
    fn test_restitution_only_above_threshold() {
        let config = SolverConfig::default();
        let dt = 1.0 / 60.0;

        let (ground, ball) = ground_and_ball(Vec3::new(0.0, -4.0, 0.0));
        let c = ContactConstraint::new(&contact(0.0), Vec3::Y, &ground, &ball, 0.5, 0.5, &config, dt);
        assert_abs_diff_eq!(c.velocity_bias, 2.0, epsilon = 1e-5);

        let (ground, ball) = ground_and_ball(Vec3::new(0.0, -0.5, 0.0));
        let c = ContactConstraint::new(&contact(0.0), Vec3::Y, &ground, &ball, 0.5, 0.5, &config, dt);
        assert_eq!(c.velocity_bias, 0.0);
    }

    #[test]
    fn test_speculative_contact_allows_closing_the_gap() {
        let config = SolverConfig::default();
        let dt = 0.1;
        let (ground, ball) = ground_and_ball(Vec3::ZERO);
        let c = ContactConstraint::new(&contact(-0.02), Vec3::Y, &ground, &ball, 0.5, 0.0, &config, dt);
        assert_abs_diff_eq!(c.velocity_bias, -0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_friction_is_bounded_by_cone() {
        let config = SolverConfig::default();
        let dt = 1.0 / 60.0;
        let (mut ground, mut ball) = ground_and_ball(Vec3::new(5.0, -1.0, 0.0));
        let mut c = ContactConstraint::new(&contact(0.0), Vec3::Y, &ground, &ball, 0.2, 0.0, &config, dt);

        c.solve_normal(&mut ground, &mut ball);
        c.solve_friction(&mut ground, &mut ball);

        let tangential = (c.tangent1_impulse.powi(2) + c.tangent2_impulse.powi(2)).sqrt();
        assert!(tangential <= 0.2 * c.normal_impulse * std::f32::consts::SQRT_2 + 1e-6);
        assert!(ball.linear_velocity().x < 5.0);
    }
}
