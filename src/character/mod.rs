//! Capsule character controller driven through world queries.

mod controller;

pub use controller::{CharacterController, GroundHit};

use crate::geometry::Shape;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tuning for a [`CharacterController`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CharacterConfig {
    /// Capsule radius
    pub radius: f32,
    /// Total capsule height, caps included
    pub height: f32,
    /// Tallest ledge climbed without jumping
    pub step_height: f32,
    /// Steepest walkable slope in radians
    pub max_slope_angle: f32,
    /// Gap below the feet still counted as standing
    pub ground_check_distance: f32,
    /// Distance kept from obstacles when sweeping
    pub skin_width: f32,
    /// Downward acceleration applied while airborne
    pub gravity: f32,
    /// Decay rate of residual horizontal velocity on the ground, per second
    pub ground_friction: f32,
    /// Decay rate of inherited platform velocity after leaving it, per second
    pub platform_decay: f32,
    /// Speed of the forced slide down steep slopes
    pub slide_speed: f32,
    pub mass: f32,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            radius: 0.4,
            height: 1.8,
            step_height: 0.3,
            max_slope_angle: 45.0_f32.to_radians(),
            ground_check_distance: 0.1,
            skin_width: 0.02,
            gravity: 9.81,
            ground_friction: 10.0,
            platform_decay: 5.0,
            slide_speed: 5.0,
            mass: 70.0,
        }
    }
}

impl CharacterConfig {
    /// Distance from the capsule center to the feet
    #[inline]
    pub fn half_height(&self) -> f32 {
        self.height.max(2.0 * self.radius) * 0.5
    }

    /// Distance from the capsule center to either cap center
    #[inline]
    pub fn half_segment(&self) -> f32 {
        self.half_height() - self.radius
    }

    /// The collision shape matching this configuration
    pub fn shape(&self) -> Shape {
        Shape::capsule(self.radius, 2.0 * self.half_segment())
    }

    /// Cosine of the steepest walkable slope
    #[inline]
    pub(crate) fn min_walkable_normal_y(&self) -> f32 {
        self.max_slope_angle.clamp(0.0, std::f32::consts::FRAC_PI_2).cos()
    }
}

/// Locomotion state, re-evaluated on every move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CharacterState {
    /// Standing on flat ground
    Grounded,
    /// Nothing below within the ground check distance
    #[default]
    Airborne,
    /// Standing on a tilted surface, walkable or not
    OnSlope,
    /// Standing on a moving body
    OnMovingPlatform,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_config_shape_dimensions() {
        let config = CharacterConfig::default();
        assert_relative_eq!(config.half_height(), 0.9);
        assert_relative_eq!(config.half_segment(), 0.5);

        match config.shape() {
            Shape::Capsule(c) => assert_relative_eq!(c.total_height(), 1.8, epsilon = 1e-5),
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn test_height_never_below_diameter() {
        let config = CharacterConfig {
            radius: 1.0,
            height: 0.5,
            ..CharacterConfig::default()
        };
        assert_relative_eq!(config.half_height(), 1.0);
        assert_relative_eq!(config.half_segment(), 0.0);
    }
}
