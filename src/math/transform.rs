#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::mat3::Mat3;
use super::quat::Quat;
use super::vec3::Vec3;

/// A rigid transformation: rotation followed by translation.
///
/// This is the read-only snapshot handed to renderers for each body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    #[inline]
    pub const fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    #[inline]
    pub const fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    #[inline]
    pub fn rotation_matrix(self) -> Mat3 {
        Mat3::from_quat(self.rotation)
    }

    /// Local point to world space
    #[inline]
    pub fn transform_point(self, point: Vec3) -> Vec3 {
        self.rotation.rotate_vec(point) + self.position
    }

    /// Local direction to world space (translation ignored)
    #[inline]
    pub fn transform_vector(self, vector: Vec3) -> Vec3 {
        self.rotation.rotate_vec(vector)
    }

    /// World point to local space
    #[inline]
    pub fn inverse_transform_point(self, point: Vec3) -> Vec3 {
        self.rotation.inverse_rotate_vec(point - self.position)
    }

    /// World direction to local space
    #[inline]
    pub fn inverse_transform_vector(self, vector: Vec3) -> Vec3 {
        self.rotation.inverse_rotate_vec(vector)
    }
}
