use std::ops::{Mul, MulAssign, Neg};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::vec3::Vec3;

/// A quaternion representing a rotation in 3D space.
///
/// Stored as (x, y, z, w) where w is the scalar part. Body orientations are
/// kept unit length; [`Quat::integrate`] renormalizes after every update.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(C)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    /// Identity quaternion (no rotation)
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Creates a quaternion from a rotation axis and angle (in radians).
    /// A zero axis yields the identity.
    #[inline]
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let axis = match axis.try_normalize() {
            Some(axis) => axis,
            None => return Self::IDENTITY,
        };
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    /// Creates the shortest rotation taking `from` onto `to`
    #[inline]
    pub fn from_rotation_arc(from: Vec3, to: Vec3) -> Self {
        let from = from.normalize_or(Vec3::Y);
        let to = to.normalize_or(Vec3::Y);
        let dot = from.dot(to);

        if dot > 0.9999 {
            return Self::IDENTITY;
        }
        if dot < -0.9999 {
            return Self::from_axis_angle(from.any_perpendicular(), std::f32::consts::PI);
        }

        let cross = from.cross(to);
        Self::new(cross.x, cross.y, cross.z, 1.0 + dot).normalize()
    }

    /// Vector part (x, y, z)
    #[inline]
    pub fn xyz(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    #[inline]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Returns a unit quaternion, or the identity for a degenerate input
    #[inline]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len > 1e-10 && len.is_finite() {
            let inv_len = 1.0 / len;
            Self::new(self.x * inv_len, self.y * inv_len, self.z * inv_len, self.w * inv_len)
        } else {
            Self::IDENTITY
        }
    }

    /// Returns the conjugate (inverse rotation for unit quaternions)
    #[inline]
    pub fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    #[inline]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Rotates a vector by this quaternion
    #[inline]
    pub fn rotate_vec(self, v: Vec3) -> Vec3 {
        let qv = self.xyz();
        let uv = qv.cross(v);
        let uuv = qv.cross(uv);
        v + (uv * self.w + uuv) * 2.0
    }

    /// Rotates a vector by the inverse of this quaternion
    #[inline]
    pub fn inverse_rotate_vec(self, v: Vec3) -> Vec3 {
        self.conjugate().rotate_vec(v)
    }

    /// Returns the local Y axis after rotation
    #[inline]
    pub fn local_y(self) -> Vec3 {
        self.rotate_vec(Vec3::Y)
    }

    /// Advances the orientation by angular velocity `omega` over `dt`.
    ///
    /// First order quaternion derivative: `q += 0.5 * (0, ω) * q * dt`,
    /// followed by renormalization.
    #[inline]
    pub fn integrate(self, omega: Vec3, dt: f32) -> Self {
        if omega.is_near_zero(1e-9) {
            return self;
        }

        let spin = Quat::new(omega.x, omega.y, omega.z, 0.0) * self;
        let h = 0.5 * dt;
        Self::new(
            self.x + spin.x * h,
            self.y + spin.y * h,
            self.z + spin.z * h,
            self.w + spin.w * h,
        )
        .normalize()
    }
}

impl Mul for Quat {
    type Output = Self;

    /// Hamilton product (applies `other` first, then `self`)
    #[inline]
    fn mul(self, other: Self) -> Self {
        Self::new(
            self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
            self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
        )
    }
}

impl MulAssign for Quat {
    #[inline]
    fn mul_assign(&mut self, other: Self) {
        *self = *self * other;
    }
}

impl Neg for Quat {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, -self.w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::PI;

    fn assert_vec_eq(a: Vec3, b: Vec3) {
        assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-4);
        assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-4);
        assert_abs_diff_eq!(a.z, b.z, epsilon = 1e-4);
    }

    #[test]
    fn test_axis_angle_rotation() {
        let q = Quat::from_axis_angle(Vec3::Z, PI / 2.0);
        assert_vec_eq(q.rotate_vec(Vec3::X), Vec3::Y);
        assert_vec_eq(q.inverse_rotate_vec(Vec3::Y), Vec3::X);
    }

    #[test]
    fn test_zero_axis_is_identity() {
        assert_eq!(Quat::from_axis_angle(Vec3::ZERO, 1.0), Quat::IDENTITY);
    }

    #[test]
    fn test_rotation_arc() {
        let q = Quat::from_rotation_arc(Vec3::X, Vec3::Z);
        assert_vec_eq(q.rotate_vec(Vec3::X), Vec3::Z);

        let flipped = Quat::from_rotation_arc(Vec3::Y, -Vec3::Y);
        assert_vec_eq(flipped.rotate_vec(Vec3::Y), -Vec3::Y);
    }

    #[test]
    fn test_integrate_keeps_unit_length() {
        let mut q = Quat::IDENTITY;
        for _ in 0..1000 {
            q = q.integrate(Vec3::new(3.0, -2.0, 5.0), 1.0 / 60.0);
        }
        assert_abs_diff_eq!(q.length(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_integrate_small_steps_match_axis_angle() {
        let omega = Vec3::new(0.0, 0.0, PI);
        let mut q = Quat::IDENTITY;
        let steps = 500;
        for _ in 0..steps {
            q = q.integrate(omega, 0.5 / steps as f32);
        }
        // Half a second at PI rad/s is a quarter turn
        assert_vec_eq(q.rotate_vec(Vec3::X), Vec3::Y);
    }

    #[test]
    fn test_degenerate_normalize() {
        let q = Quat::new(0.0, 0.0, 0.0, 0.0).normalize();
        assert_eq!(q, Quat::IDENTITY);
    }
}
