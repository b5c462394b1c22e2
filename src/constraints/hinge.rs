use crate::collision::BodyHandle;
use crate::dynamics::RigidBody;
use crate::error::{PhysicsError, Result};
use crate::math::{Quat, Vec3};

use super::row::ConstraintRow;

/// Angular limits of a hinge, in radians
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HingeLimits {
    pub lower: f32,
    pub upper: f32,
}

/// Velocity motor driving the hinge angle
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HingeMotor {
    /// Target angular speed (rad/s)
    pub speed: f32,
    pub max_torque: f32,
}

/// A revolute joint: the anchors coincide and the bodies may only rotate
/// relative to each other about a single axis.
///
/// Constrains 3 translational and 2 rotational degrees of freedom. Anchors
/// are local to their bodies (world space for a world-anchored joint) and
/// the axis is given in body A's frame.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HingeJoint {
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: Option<BodyHandle>,
    pub local_anchor_a: Vec3,
    pub local_anchor_b: Vec3,
    local_axis_a: Vec3,
    /// Hinge axis in B's frame, filled in by [`HingeJoint::bind`]
    local_axis_b: Vec3,
    local_reference_a: Vec3,
    local_reference_b: Vec3,
    pub limits: Option<HingeLimits>,
    pub motor: Option<HingeMotor>,
    pub break_force: f32,
    pub(crate) enabled: bool,
    pub(crate) broken: bool,
    point_rows: [ConstraintRow; 3],
    angular_rows: [ConstraintRow; 2],
    limit_row: Option<ConstraintRow>,
    motor_row: Option<ConstraintRow>,
}

impl HingeJoint {
    pub fn new(
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
        anchor_a: Vec3,
        anchor_b: Vec3,
        axis: Vec3,
    ) -> Result<Self> {
        if !body_a.is_valid() {
            return Err(PhysicsError::MissingBody);
        }
        if body_b == Some(body_a) {
            return Err(PhysicsError::SelfJoint(body_a));
        }

        let axis = axis.normalize_or(Vec3::Y);
        let reference = axis.any_perpendicular();
        Ok(Self {
            body_a,
            body_b,
            local_anchor_a: anchor_a,
            local_anchor_b: anchor_b,
            local_axis_a: axis,
            local_axis_b: axis,
            local_reference_a: reference,
            local_reference_b: reference,
            limits: None,
            motor: None,
            break_force: f32::INFINITY,
            enabled: true,
            broken: false,
            point_rows: [ConstraintRow::default(); 3],
            angular_rows: [ConstraintRow::default(); 2],
            limit_row: None,
            motor_row: None,
        })
    }

    /// Restricts the hinge angle to `[lower, upper]`
    pub fn with_limits(mut self, lower: f32, upper: f32) -> Self {
        self.limits = Some(HingeLimits {
            lower: lower.min(upper),
            upper: upper.max(lower),
        });
        self
    }

    /// Drives the hinge at `speed` using at most `max_torque`
    pub fn with_motor(mut self, speed: f32, max_torque: f32) -> Self {
        self.motor = Some(HingeMotor {
            speed,
            max_torque: max_torque.abs(),
        });
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

    /// Hinge axis in body A's frame
    #[inline]
    pub fn local_axis(&self) -> Vec3 {
        self.local_axis_a
    }

    /// Records the bodies' current relative orientation as the zero angle.
    ///
    /// Called when the joint is added to a world.
    pub fn bind(&mut self, body_a: &RigidBody, body_b: Option<&RigidBody>) {
        let to_world = body_a.orientation();
        let axis = to_world.rotate_vec(self.local_axis_a);
        let reference = to_world.rotate_vec(self.local_reference_a);
        let to_b = body_b.map_or(Quat::IDENTITY, |b| b.orientation());
        self.local_axis_b = to_b.inverse_rotate_vec(axis);
        self.local_reference_b = to_b.inverse_rotate_vec(reference);
    }

    fn world_frames(&self, body_a: &RigidBody, body_b: Option<&RigidBody>) -> (Vec3, Vec3, Vec3, Vec3) {
        let qa = body_a.orientation();
        let qb = body_b.map_or(Quat::IDENTITY, |b| b.orientation());
        (
            qa.rotate_vec(self.local_axis_a),
            qb.rotate_vec(self.local_axis_b),
            qa.rotate_vec(self.local_reference_a),
            qb.rotate_vec(self.local_reference_b),
        )
    }

    /// Rotation of B relative to A about the hinge axis, in `(-π, π]`
    pub fn angle(&self, body_a: &RigidBody, body_b: Option<&RigidBody>) -> f32 {
        let (axis, _, ref_a, ref_b) = self.world_frames(body_a, body_b);
        let ref_b = ref_b.project_on_plane(axis);
        ref_a.cross(ref_b).dot(axis).atan2(ref_a.dot(ref_b))
    }

    pub(crate) fn prepare(
        &mut self,
        body_a: &RigidBody,
        body_b: Option<&RigidBody>,
        dt: f32,
        baumgarte: f32,
        warm_start_factor: f32,
    ) {
        let pa = body_a.transform().transform_point(self.local_anchor_a);
        let pb = match body_b {
            Some(b) => b.transform().transform_point(self.local_anchor_b),
            None => self.local_anchor_b,
        };
        let r_a = pa - body_a.position;
        let r_b = body_b.map_or(Vec3::ZERO, |b| pb - b.position);
        let error = pb - pa;
        let erp = baumgarte / dt;

        for (row, axis) in self.point_rows.iter_mut().zip(Vec3::AXES) {
            let carried = row.accumulated_impulse * warm_start_factor;
            *row = ConstraintRow::linear(axis, r_a, r_b);
            row.bias = erp * error.dot(axis);
            row.accumulated_impulse = carried;
            row.update_effective_mass(body_a, body_b);
        }

        let (axis_a, axis_b, _, _) = self.world_frames(body_a, body_b);
        // Small-angle rotation that would carry A's axis onto B's
        let misalignment = axis_a.cross(axis_b);
        let (t1, t2) = axis_a.orthonormal_basis();
        for (row, tangent) in self.angular_rows.iter_mut().zip([t1, t2]) {
            let carried = row.accumulated_impulse * warm_start_factor;
            *row = ConstraintRow::angular(tangent);
            row.bias = erp * misalignment.dot(tangent);
            row.accumulated_impulse = carried;
            row.update_effective_mass(body_a, body_b);
        }

        let previous_limit = self.limit_row.map_or(0.0, |r| r.accumulated_impulse);
        self.limit_row = self.limits.and_then(|limits| {
            let angle = self.angle(body_a, body_b);
            let mut row = if angle < limits.lower {
                let mut row = ConstraintRow::angular(axis_a).with_limits(0.0, f32::INFINITY);
                row.bias = erp * (angle - limits.lower);
                row
            } else if angle > limits.upper {
                let mut row = ConstraintRow::angular(axis_a).with_limits(f32::NEG_INFINITY, 0.0);
                row.bias = erp * (angle - limits.upper);
                row
            } else {
                return None;
            };
            row.accumulated_impulse =
                (previous_limit * warm_start_factor).clamp(row.lower_limit, row.upper_limit);
            row.update_effective_mass(body_a, body_b);
            Some(row)
        });

        let previous_motor = self.motor_row.map_or(0.0, |r| r.accumulated_impulse);
        self.motor_row = self.motor.map(|motor| {
            let max_impulse = motor.max_torque * dt;
            let mut row = ConstraintRow::angular(axis_a).with_limits(-max_impulse, max_impulse);
            row.bias = -motor.speed;
            row.accumulated_impulse = (previous_motor * warm_start_factor).clamp(-max_impulse, max_impulse);
            row.update_effective_mass(body_a, body_b);
            row
        });
    }

    fn rows_mut(&mut self) -> impl Iterator<Item = &mut ConstraintRow> {
        self.motor_row
            .iter_mut()
            .chain(self.limit_row.iter_mut())
            .chain(self.angular_rows.iter_mut())
            .chain(self.point_rows.iter_mut())
    }

    pub(crate) fn warm_start(&self, body_a: &mut RigidBody, mut body_b: Option<&mut RigidBody>) {
        let rows = self
            .motor_row
            .iter()
            .chain(self.limit_row.iter())
            .chain(self.angular_rows.iter())
            .chain(self.point_rows.iter());
        for row in rows {
            row.warm_start(body_a, body_b.as_deref_mut());
        }
    }

    pub(crate) fn solve(&mut self, body_a: &mut RigidBody, mut body_b: Option<&mut RigidBody>) {
        // Motor and limit first so the positional rows get the last word
        for row in self.rows_mut() {
            row.solve(body_a, body_b.as_deref_mut());
        }
    }

    /// Linear force held by the point rows during the last step
    pub(crate) fn applied_force(&self, dt: f32) -> f32 {
        let impulse = Vec3::new(
            self.point_rows[0].accumulated_impulse,
            self.point_rows[1].accumulated_impulse,
            self.point_rows[2].accumulated_impulse,
        );
        impulse.length() / dt
    }

    pub(crate) fn reset_impulses(&mut self) {
        for row in self.rows_mut() {
            row.accumulated_impulse = 0.0;
        }
    }
}
