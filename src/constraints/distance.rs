use crate::collision::BodyHandle;
use crate::dynamics::RigidBody;
use crate::error::{PhysicsError, Result};
use crate::math::Vec3;

use super::row::ConstraintRow;

/// How the distance row reacts to length error
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DistanceMode {
    /// Holds the rest length exactly
    Rigid,
    /// Free between `min` and `max`, one-sided outside
    Limits { min: f32, max: f32 },
    /// Soft spring-damper; `stiffness` in (0, 1)
    Spring { stiffness: f32 },
}

/// Keeps two anchor points a fixed (or bounded) distance apart.
///
/// `anchor_a` is in body A's local frame. `anchor_b` is in body B's local
/// frame, or a world point when the joint is anchored to the world.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DistanceJoint {
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: Option<BodyHandle>,
    pub local_anchor_a: Vec3,
    pub local_anchor_b: Vec3,
    pub rest_length: f32,
    pub mode: DistanceMode,
    pub break_force: f32,
    pub(crate) enabled: bool,
    pub(crate) broken: bool,
    row: ConstraintRow,
    /// Row is inside its free range this step
    slack: bool,
}

impl DistanceJoint {
    pub fn new(
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
        anchor_a: Vec3,
        anchor_b: Vec3,
        rest_length: f32,
    ) -> Result<Self> {
        if !body_a.is_valid() {
            return Err(PhysicsError::MissingBody);
        }
        if body_b == Some(body_a) {
            return Err(PhysicsError::SelfJoint(body_a));
        }

        Ok(Self {
            body_a,
            body_b,
            local_anchor_a: anchor_a,
            local_anchor_b: anchor_b,
            rest_length: rest_length.max(0.0),
            mode: DistanceMode::Rigid,
            break_force: f32::INFINITY,
            enabled: true,
            broken: false,
            row: ConstraintRow::default(),
            slack: false,
        })
    }

    /// Lets the length move freely within `[min, max]`
    pub fn with_limits(mut self, min: f32, max: f32) -> Self {
        let min = min.max(0.0);
        self.mode = DistanceMode::Limits { min, max: max.max(min) };
        self
    }

    /// Turns the joint into a spring. Stiffness values at or above 1 keep
    /// the joint rigid.
    pub fn with_spring(mut self, stiffness: f32) -> Self {
        self.mode = if stiffness > 0.0 && stiffness < 1.0 {
            DistanceMode::Spring { stiffness }
        } else {
            DistanceMode::Rigid
        };
        self
    }

    pub fn with_break_force(mut self, force: f32) -> Self {
        self.break_force = force;
        self
    }

    #[inline]
    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    #[inline]
    pub fn body_b(&self) -> Option<BodyHandle> {
        self.body_b
    }

    /// Impulse applied along the joint during the last step
    #[inline]
    pub fn impulse(&self) -> f32 {
        self.row.accumulated_impulse
    }

    /// World positions of both anchors
    pub fn world_anchors(&self, body_a: &RigidBody, body_b: Option<&RigidBody>) -> (Vec3, Vec3) {
        let pa = body_a.transform().transform_point(self.local_anchor_a);
        let pb = match body_b {
            Some(b) => b.transform().transform_point(self.local_anchor_b),
            None => self.local_anchor_b,
        };
        (pa, pb)
    }

    /// Current distance between the anchors
    pub fn current_length(&self, body_a: &RigidBody, body_b: Option<&RigidBody>) -> f32 {
        let (pa, pb) = self.world_anchors(body_a, body_b);
        pa.distance(pb)
    }

    pub(crate) fn prepare(
        &mut self,
        body_a: &RigidBody,
        body_b: Option<&RigidBody>,
        dt: f32,
        baumgarte: f32,
        warm_start_factor: f32,
    ) {
        let (pa, pb) = self.world_anchors(body_a, body_b);
        let (direction, length) = (pb - pa).normalize_with_length().unwrap_or((Vec3::Y, 0.0));
        let r_a = pa - body_a.position;
        let r_b = body_b.map_or(Vec3::ZERO, |b| pb - b.position);

        let carried = self.row.accumulated_impulse * warm_start_factor;
        let mut row = ConstraintRow::linear(direction, r_a, r_b);
        self.slack = false;

        match self.mode {
            DistanceMode::Rigid => {
                row.bias = baumgarte / dt * (length - self.rest_length);
            }
            DistanceMode::Limits { min, max } => {
                if length < min {
                    row = row.with_limits(0.0, f32::INFINITY);
                    row.bias = baumgarte / dt * (length - min);
                } else if length > max {
                    row = row.with_limits(f32::NEG_INFINITY, 0.0);
                    row.bias = baumgarte / dt * (length - max);
                } else {
                    self.slack = true;
                }
            }
            DistanceMode::Spring { stiffness } => {
                // Softness is relative to the rigid row's inverse mass
                row.update_effective_mass(body_a, body_b);
                let k = if row.effective_mass > 0.0 { 1.0 / row.effective_mass } else { 0.0 };
                row.softness = k * (1.0 - stiffness) / stiffness;
                row.bias = stiffness / dt * (length - self.rest_length);
            }
        }

        row.update_effective_mass(body_a, body_b);
        row.accumulated_impulse = if self.slack {
            0.0
        } else {
            carried.clamp(row.lower_limit, row.upper_limit)
        };
        self.row = row;
    }

    pub(crate) fn warm_start(&self, body_a: &mut RigidBody, body_b: Option<&mut RigidBody>) {
        if !self.slack {
            self.row.warm_start(body_a, body_b);
        }
    }

    pub(crate) fn solve(&mut self, body_a: &mut RigidBody, body_b: Option<&mut RigidBody>) {
        if !self.slack {
            self.row.solve(body_a, body_b);
        }
    }

    /// Force the joint carried during the last step
    pub(crate) fn applied_force(&self, dt: f32) -> f32 {
        self.row.accumulated_impulse.abs() / dt
    }

    pub(crate) fn reset_impulses(&mut self) {
        self.row.accumulated_impulse = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::RigidBodyDesc;
    use approx::assert_abs_diff_eq;

    fn body(index: u32, desc: RigidBodyDesc) -> RigidBody {
        RigidBody::from_desc(BodyHandle::new(index, 0), &desc)
    }

    #[test]
    fn test_constructor_rejects_bad_handles() {
        let a = BodyHandle::new(0, 0);
        assert_eq!(
            DistanceJoint::new(BodyHandle::INVALID, Some(a), Vec3::ZERO, Vec3::ZERO, 1.0).unwrap_err(),
            PhysicsError::MissingBody
        );
        assert_eq!(
            DistanceJoint::new(a, Some(a), Vec3::ZERO, Vec3::ZERO, 1.0).unwrap_err(),
            PhysicsError::SelfJoint(a)
        );
        assert!(DistanceJoint::new(a, None, Vec3::ZERO, Vec3::ZERO, 1.0).is_ok());
    }

    #[test]
    fn test_rigid_joint_cancels_stretching_velocity() {
        let mut a = body(0, RigidBodyDesc::dynamic());
        let mut b = body(
            1,
            RigidBodyDesc::dynamic()
                .with_position(Vec3::new(2.0, 0.0, 0.0))
                .with_linear_velocity(Vec3::new(3.0, 0.0, 0.0)),
        );

        let mut joint = DistanceJoint::new(a.handle(), Some(b.handle()), Vec3::ZERO, Vec3::ZERO, 2.0).unwrap();
        joint.prepare(&a, Some(&b), 1.0 / 60.0, 0.2, 0.0);
        for _ in 0..4 {
            joint.solve(&mut a, Some(&mut b));
        }

        let stretch = (b.linear_velocity() - a.linear_velocity()).x;
        assert_abs_diff_eq!(stretch, 0.0, epsilon = 1e-5);
        // Pulling the anchors together is a negative impulse along A to B
        assert!(joint.impulse() < 0.0);
    }

    #[test]
    fn test_limits_are_slack_inside_range() {
        let mut a = body(0, RigidBodyDesc::dynamic().with_linear_velocity(Vec3::new(-1.0, 0.0, 0.0)));
        let mut joint = DistanceJoint::new(a.handle(), None, Vec3::ZERO, Vec3::new(1.5, 0.0, 0.0), 1.5)
            .unwrap()
            .with_limits(1.0, 2.0);

        joint.prepare(&a, None, 1.0 / 60.0, 0.2, 0.8);
        joint.solve(&mut a, None);
        assert_abs_diff_eq!(a.linear_velocity().x, -1.0);
        assert_eq!(joint.impulse(), 0.0);
    }

    #[test]
    fn test_spring_is_softer_than_rigid() {
        let start = || {
            (
                body(0, RigidBodyDesc::dynamic()),
                body(1, RigidBodyDesc::dynamic().with_position(Vec3::new(3.0, 0.0, 0.0))),
            )
        };
        let dt = 1.0 / 60.0;

        let (mut a, mut b) = start();
        let mut rigid = DistanceJoint::new(a.handle(), Some(b.handle()), Vec3::ZERO, Vec3::ZERO, 2.0).unwrap();
        rigid.prepare(&a, Some(&b), dt, 0.2, 0.0);
        rigid.solve(&mut a, Some(&mut b));
        let rigid_speed = b.linear_velocity().x.abs();

        let (mut a, mut b) = start();
        let mut spring = DistanceJoint::new(a.handle(), Some(b.handle()), Vec3::ZERO, Vec3::ZERO, 2.0)
            .unwrap()
            .with_spring(0.05);
        spring.prepare(&a, Some(&b), dt, 0.2, 0.0);
        spring.solve(&mut a, Some(&mut b));
        let spring_speed = b.linear_velocity().x.abs();

        assert!(spring_speed > 0.0);
        assert!(spring_speed < rigid_speed * 0.5);
        assert!(matches!(spring.mode, DistanceMode::Spring { .. }));
        assert!(matches!(spring.clone().with_spring(1.5).mode, DistanceMode::Rigid));
    }
}
