use crate::dynamics::RigidBody;
use crate::math::Vec3;

/// One scalar velocity constraint between a body and an optional second
/// body (`None` means the world).
///
/// The row's Jacobian is split into the four blocks below so that
/// `Jv = linear_a·vA + angular_a·ωA + linear_b·vB + angular_b·ωB`. Each
/// iteration applies
///
/// ```text
/// Δλ = -effective_mass · (Jv + bias + softness · accumulated_impulse)
/// ```
///
/// clamped so the accumulated impulse stays within
/// `[lower_limit, upper_limit]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstraintRow {
    pub linear_a: Vec3,
    pub angular_a: Vec3,
    pub linear_b: Vec3,
    pub angular_b: Vec3,
    /// Velocity bias (position error feedback or motor target)
    pub bias: f32,
    /// Constraint force mixing term; zero for a rigid row
    pub softness: f32,
    pub effective_mass: f32,
    pub accumulated_impulse: f32,
    pub lower_limit: f32,
    pub upper_limit: f32,
}

impl Default for ConstraintRow {
    fn default() -> Self {
        Self {
            linear_a: Vec3::ZERO,
            angular_a: Vec3::ZERO,
            linear_b: Vec3::ZERO,
            angular_b: Vec3::ZERO,
            bias: 0.0,
            softness: 0.0,
            effective_mass: 0.0,
            accumulated_impulse: 0.0,
            lower_limit: f32::NEG_INFINITY,
            upper_limit: f32::INFINITY,
        }
    }
}

impl ConstraintRow {
    /// A row keeping the anchor points at `r_a`/`r_b` (relative to the body
    /// centers) from moving apart along `direction`
    pub fn linear(direction: Vec3, r_a: Vec3, r_b: Vec3) -> Self {
        Self {
            linear_a: -direction,
            angular_a: -r_a.cross(direction),
            linear_b: direction,
            angular_b: r_b.cross(direction),
            ..Self::default()
        }
    }

    /// A row on the relative angular velocity about `axis`
    pub fn angular(axis: Vec3) -> Self {
        Self {
            angular_a: -axis,
            angular_b: axis,
            ..Self::default()
        }
    }

    pub fn with_limits(mut self, lower: f32, upper: f32) -> Self {
        self.lower_limit = lower;
        self.upper_limit = upper;
        self
    }

    /// Recomputes `effective_mass = 1 / (J M⁻¹ Jᵀ + softness)`.
    ///
    /// Sleeping bodies count as infinitely heavy, as they do for contacts.
    pub fn update_effective_mass(&mut self, body_a: &RigidBody, body_b: Option<&RigidBody>) {
        let mut k = self.linear_a.length_squared() * body_a.solver_inv_mass()
            + self.angular_a.dot(body_a.solver_inv_inertia() * self.angular_a);
        if let Some(b) = body_b {
            k += self.linear_b.length_squared() * b.solver_inv_mass()
                + self.angular_b.dot(b.solver_inv_inertia() * self.angular_b);
        }

        let k = k + self.softness;
        self.effective_mass = if k > 0.0 { 1.0 / k } else { 0.0 };
    }

    /// `Jv` for the current body velocities
    pub fn velocity(&self, body_a: &RigidBody, body_b: Option<&RigidBody>) -> f32 {
        let mut v = self.linear_a.dot(body_a.linear_velocity) + self.angular_a.dot(body_a.angular_velocity);
        if let Some(b) = body_b {
            v += self.linear_b.dot(b.linear_velocity) + self.angular_b.dot(b.angular_velocity);
        }
        v
    }

    /// Applies `lambda` along the Jacobian
    pub fn apply_impulse(&self, body_a: &mut RigidBody, body_b: Option<&mut RigidBody>, lambda: f32) {
        body_a.linear_velocity += self.linear_a * (body_a.solver_inv_mass() * lambda);
        body_a.angular_velocity += body_a.solver_inv_inertia() * (self.angular_a * lambda);
        if let Some(b) = body_b {
            b.linear_velocity += self.linear_b * (b.solver_inv_mass() * lambda);
            b.angular_velocity += b.solver_inv_inertia() * (self.angular_b * lambda);
        }
    }

    /// Re-applies the impulse carried over from the previous step
    pub fn warm_start(&self, body_a: &mut RigidBody, body_b: Option<&mut RigidBody>) {
        if self.accumulated_impulse != 0.0 {
            self.apply_impulse(body_a, body_b, self.accumulated_impulse);
        }
    }

    /// One projected Gauss-Seidel iteration. Returns the applied impulse.
    pub fn solve(&mut self, body_a: &mut RigidBody, mut body_b: Option<&mut RigidBody>) -> f32 {
        if self.effective_mass == 0.0 {
            return 0.0;
        }

        let jv = self.velocity(body_a, body_b.as_deref());
        let delta = -self.effective_mass * (jv + self.bias + self.softness * self.accumulated_impulse);

        let old = self.accumulated_impulse;
        self.accumulated_impulse = (old + delta).clamp(self.lower_limit, self.upper_limit);
        let applied = self.accumulated_impulse - old;

        self.apply_impulse(body_a, body_b.as_deref_mut(), applied);
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::BodyHandle;
    use crate::dynamics::RigidBodyDesc;
    use approx::assert_abs_diff_eq;

    fn body(desc: RigidBodyDesc) -> RigidBody {
        RigidBody::from_desc(BodyHandle::new(0, 0), &desc)
    }

    #[test]
    fn test_rigid_row_stops_relative_motion() {
        let mut a = body(RigidBodyDesc::dynamic().with_mass(1.0));
        let mut b = body(RigidBodyDesc::dynamic().with_mass(1.0).with_linear_velocity(Vec3::new(2.0, 0.0, 0.0)));

        let mut row = ConstraintRow::linear(Vec3::X, Vec3::ZERO, Vec3::ZERO);
        row.update_effective_mass(&a, Some(&b));
        assert_abs_diff_eq!(row.effective_mass, 0.5, epsilon = 1e-6);

        row.solve(&mut a, Some(&mut b));
        assert_abs_diff_eq!(row.velocity(&a, Some(&b)), 0.0, epsilon = 1e-6);
        // Momentum is shared equally
        assert_abs_diff_eq!(a.linear_velocity().x, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(b.linear_velocity().x, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_one_sided_row_only_pushes() {
        let mut a = body(RigidBodyDesc::dynamic().with_linear_velocity(Vec3::new(-1.0, 0.0, 0.0)));
        let mut row = ConstraintRow::linear(Vec3::X, Vec3::ZERO, Vec3::ZERO).with_limits(0.0, f32::INFINITY);
        row.update_effective_mass(&a, None);

        // Body A moving away from the world anchor: Jv > 0, nothing to do
        row.solve(&mut a, None);
        assert_eq!(row.accumulated_impulse, 0.0);
        assert_abs_diff_eq!(a.linear_velocity().x, -1.0);
    }

    #[test]
    fn test_static_pair_has_no_effective_mass() {
        let mut a = body(RigidBodyDesc::fixed());
        let mut row = ConstraintRow::angular(Vec3::Y);
        row.update_effective_mass(&a, None);
        assert_eq!(row.effective_mass, 0.0);
        assert_eq!(row.solve(&mut a, None), 0.0);
    }
}
