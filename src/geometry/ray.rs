#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// A half-line with a maximum travel distance.
///
/// The direction is normalized on construction; a zero direction falls back
/// to -Y so that queries stay well defined.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_distance: f32,
}

impl Ray {
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3, max_distance: f32) -> Self {
        Self {
            origin,
            direction: direction.normalize_or(-Vec3::Y),
            max_distance: max_distance.max(0.0),
        }
    }

    /// A ray with unlimited length
    #[inline]
    pub fn infinite(origin: Vec3, direction: Vec3) -> Self {
        Self::new(origin, direction, f32::INFINITY)
    }

    #[inline]
    pub fn point_at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

/// A ray hit against a single shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// World-space point of impact
    pub point: Vec3,
    /// Unit surface normal at the point of impact
    pub normal: Vec3,
    /// Distance along the ray
    pub distance: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_is_normalized() {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 3.0), 5.0);
        assert_eq!(ray.direction, Vec3::Z);
        assert_eq!(ray.point_at(2.0), Vec3::new(0.0, 0.0, 2.0));
    }

    #[test]
    fn test_zero_direction_falls_back() {
        let ray = Ray::new(Vec3::ZERO, Vec3::ZERO, -1.0);
        assert_eq!(ray.direction, -Vec3::Y);
        assert_eq!(ray.max_distance, 0.0);
    }
}
