use std::ops::{Add, Mul};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::quat::Quat;
use super::vec3::Vec3;

/// A 3x3 matrix stored in column-major order.
///
/// Used for rotation matrices and inertia tensors.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(C)]
pub struct Mat3 {
    pub cols: [Vec3; 3],
}

impl Default for Mat3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat3 {
    pub const ZERO: Self = Self {
        cols: [Vec3::ZERO, Vec3::ZERO, Vec3::ZERO],
    };

    pub const IDENTITY: Self = Self {
        cols: [Vec3::X, Vec3::Y, Vec3::Z],
    };

    #[inline]
    pub const fn from_cols(c0: Vec3, c1: Vec3, c2: Vec3) -> Self {
        Self { cols: [c0, c1, c2] }
    }

    #[inline]
    pub fn from_diagonal(diag: Vec3) -> Self {
        Self::from_cols(
            Vec3::new(diag.x, 0.0, 0.0),
            Vec3::new(0.0, diag.y, 0.0),
            Vec3::new(0.0, 0.0, diag.z),
        )
    }

    /// Creates a rotation matrix from a unit quaternion
    #[inline]
    pub fn from_quat(q: Quat) -> Self {
        let x2 = q.x + q.x;
        let y2 = q.y + q.y;
        let z2 = q.z + q.z;

        let xx = q.x * x2;
        let xy = q.x * y2;
        let xz = q.x * z2;
        let yy = q.y * y2;
        let yz = q.y * z2;
        let zz = q.z * z2;
        let wx = q.w * x2;
        let wy = q.w * y2;
        let wz = q.w * z2;

        Self::from_cols(
            Vec3::new(1.0 - (yy + zz), xy + wz, xz - wy),
            Vec3::new(xy - wz, 1.0 - (xx + zz), yz + wx),
            Vec3::new(xz + wy, yz - wx, 1.0 - (xx + yy)),
        )
    }

    #[inline]
    pub fn transpose(self) -> Self {
        Self::from_cols(self.row(0), self.row(1), self.row(2))
    }

    #[inline]
    pub fn determinant(self) -> f32 {
        self.cols[0].dot(self.cols[1].cross(self.cols[2]))
    }

    /// Returns the inverse, or `None` for a singular matrix
    #[inline]
    pub fn try_inverse(self) -> Option<Self> {
        let det = self.determinant();
        if det.abs() < 1e-12 {
            return None;
        }

        let inv_det = 1.0 / det;
        let r0 = self.cols[1].cross(self.cols[2]) * inv_det;
        let r1 = self.cols[2].cross(self.cols[0]) * inv_det;
        let r2 = self.cols[0].cross(self.cols[1]) * inv_det;

        // Rows of the inverse are the scaled cross products
        Some(Self::from_cols(r0, r1, r2).transpose())
    }

    #[inline]
    pub fn transform_vec(self, v: Vec3) -> Vec3 {
        self.cols[0] * v.x + self.cols[1] * v.y + self.cols[2] * v.z
    }

    #[inline]
    pub fn col(self, index: usize) -> Vec3 {
        self.cols[index]
    }

    #[inline]
    pub fn row(self, index: usize) -> Vec3 {
        Vec3::new(self.cols[0][index], self.cols[1][index], self.cols[2][index])
    }

    #[inline]
    pub fn diagonal(self) -> Vec3 {
        Vec3::new(self.cols[0].x, self.cols[1].y, self.cols[2].z)
    }

    /// Matrix with the absolute value of every entry
    #[inline]
    pub fn abs(self) -> Self {
        Self::from_cols(self.cols[0].abs(), self.cols[1].abs(), self.cols[2].abs())
    }

    #[inline]
    pub fn scale(self, s: f32) -> Self {
        Self::from_cols(self.cols[0] * s, self.cols[1] * s, self.cols[2] * s)
    }

    /// Similarity transform `R * self * Rᵀ`, used to move inertia tensors
    /// between local and world space.
    #[inline]
    pub fn rotated(self, rotation: Mat3) -> Self {
        rotation * self * rotation.transpose()
    }
}

impl Add for Mat3 {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self::from_cols(
            self.cols[0] + other.cols[0],
            self.cols[1] + other.cols[1],
            self.cols[2] + other.cols[2],
        )
    }
}

impl Mul for Mat3 {
    type Output = Self;

    #[inline]
    fn mul(self, other: Self) -> Self {
        Self::from_cols(
            self.transform_vec(other.cols[0]),
            self.transform_vec(other.cols[1]),
            self.transform_vec(other.cols[2]),
        )
    }
}

impl Mul<Vec3> for Mat3 {
    type Output = Vec3;

    #[inline]
    fn mul(self, v: Vec3) -> Vec3 {
        self.transform_vec(v)
    }
}
