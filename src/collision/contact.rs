#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::math::{Transform, Vec3};

/// Maximum number of contact points in a manifold
pub const MAX_CONTACT_POINTS: usize = 4;

/// Points closer than this (on body A) are considered the same contact
pub const CONTACT_MERGE_DISTANCE: f32 = 0.02;

/// Maximum drift of a cached point (local to body A) that still inherits
/// its previous impulses
pub const WARM_START_MATCH_DISTANCE: f32 = 0.1;

/// A handle to a body in the physics world.
///
/// The generation is bumped every time a slot is reused, so a handle to a
/// removed body never aliases its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyHandle {
    index: u32,
    generation: u32,
}

impl BodyHandle {
    /// Invalid/null body handle
    pub const INVALID: Self = Self {
        index: u32::MAX,
        generation: u32::MAX,
    };

    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the body arena
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl Default for BodyHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

/// A single contact point between two bodies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    /// Deepest point of A inside B, world space
    pub world_point_a: Vec3,
    /// Deepest point of B inside A, world space
    pub world_point_b: Vec3,
    /// `world_point_a` in the local frame of body A
    pub local_point_a: Vec3,
    /// `world_point_b` in the local frame of body B
    pub local_point_b: Vec3,
    /// Penetration depth along the manifold normal (positive when overlapping)
    pub penetration: f32,
    /// Accumulated normal impulse (for warm starting)
    pub normal_impulse: f32,
    /// Accumulated impulse along the first tangent
    pub tangent_impulse_1: f32,
    /// Accumulated impulse along the second tangent
    pub tangent_impulse_2: f32,
}

impl ContactPoint {
    /// Creates a point from its two world positions, caching the local ones
    pub fn new(
        world_point_a: Vec3,
        world_point_b: Vec3,
        transform_a: Transform,
        transform_b: Transform,
        penetration: f32,
    ) -> Self {
        Self {
            world_point_a,
            world_point_b,
            local_point_a: transform_a.inverse_transform_point(world_point_a),
            local_point_b: transform_b.inverse_transform_point(world_point_b),
            penetration,
            normal_impulse: 0.0,
            tangent_impulse_1: 0.0,
            tangent_impulse_2: 0.0,
        }
    }

    /// Returns the midpoint of the contact
    #[inline]
    pub fn midpoint(&self) -> Vec3 {
        (self.world_point_a + self.world_point_b) * 0.5
    }
}

/// Persistent contact state between two bodies.
///
/// The normal points from A to B. Friction is the geometric mean of the two
/// bodies' coefficients and restitution the larger of the two.
#[derive(Debug, Clone)]
pub struct ContactManifold {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Unit normal from A to B
    pub normal: Vec3,
    pub friction: f32,
    pub restitution: f32,
    points: [Option<ContactPoint>; MAX_CONTACT_POINTS],
    num_points: usize,
}

impl ContactManifold {
    /// Creates a new empty contact manifold
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, normal: Vec3) -> Self {
        Self {
            body_a,
            body_b,
            normal: normal.normalize_or(Vec3::X),
            friction: 0.5,
            restitution: 0.0,
            points: [None; MAX_CONTACT_POINTS],
            num_points: 0,
        }
    }

    /// Sets the combined material coefficients from the two bodies
    pub fn set_materials(&mut self, friction_a: f32, friction_b: f32, restitution_a: f32, restitution_b: f32) {
        self.friction = (friction_a * friction_b).max(0.0).sqrt();
        self.restitution = restitution_a.max(restitution_b);
    }

    /// Adds a contact point.
    ///
    /// A point within [`CONTACT_MERGE_DISTANCE`] of an existing one replaces
    /// it only if deeper. When the manifold is full the shallowest point is
    /// evicted in favor of a deeper newcomer.
    pub fn add_point(&mut self, point: ContactPoint) {
        let merge_sq = CONTACT_MERGE_DISTANCE * CONTACT_MERGE_DISTANCE;
        for existing in self.points.iter_mut().flatten() {
            if existing.world_point_a.distance_squared(point.world_point_a) < merge_sq {
                if point.penetration > existing.penetration {
                    *existing = point;
                }
                return;
            }
        }

        if let Some(slot) = self.points.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(point);
            self.num_points += 1;
            return;
        }

        let shallowest = self
            .points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|p| (i, p.penetration)))
            .min_by(|(_, a), (_, b)| a.total_cmp(b));

        if let Some((idx, depth)) = shallowest {
            if point.penetration > depth {
                self.points[idx] = Some(point);
            }
        }
    }

    /// Iterates over contact points
    pub fn iter(&self) -> impl Iterator<Item = &ContactPoint> {
        self.points.iter().flatten()
    }

    /// Iterates mutably over contact points
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ContactPoint> {
        self.points.iter_mut().flatten()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.num_points
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }

    /// Largest penetration among the points
    pub fn max_penetration(&self) -> f32 {
        self.iter().map(|p| p.penetration).fold(f32::NEG_INFINITY, f32::max)
    }

    /// Returns the same contact seen from the other body
    pub fn swapped(&self) -> Self {
        let mut flipped = Self::new(self.body_b, self.body_a, -self.normal);
        flipped.friction = self.friction;
        flipped.restitution = self.restitution;
        for point in self.iter() {
            flipped.add_point(ContactPoint {
                world_point_a: point.world_point_b,
                world_point_b: point.world_point_a,
                local_point_a: point.local_point_b,
                local_point_b: point.local_point_a,
                ..*point
            });
        }
        flipped
    }

    /// Recomputes world points and penetration from the cached local points
    pub fn refresh(&mut self, transform_a: Transform, transform_b: Transform) {
        let normal = self.normal;
        for point in self.iter_mut() {
            point.world_point_a = transform_a.transform_point(point.local_point_a);
            point.world_point_b = transform_b.transform_point(point.local_point_b);
            point.penetration = (point.world_point_a - point.world_point_b).dot(normal);
        }
    }

    /// Drops points that separated further than `threshold`.
    /// Returns the number of points removed.
    pub fn remove_separated(&mut self, threshold: f32) -> usize {
        let mut removed = 0;
        for slot in self.points.iter_mut() {
            if matches!(slot, Some(p) if p.penetration < -threshold) {
                *slot = None;
                removed += 1;
            }
        }
        self.num_points -= removed;
        removed
    }

    /// Seeds this manifold's impulses from last step's manifold.
    ///
    /// Points are matched by their position on body A; inherited impulses
    /// are scaled by `factor` so contacts that stop being refreshed decay.
    /// Returns the number of matched points.
    pub fn warm_start_from(&mut self, old: &ContactManifold, factor: f32) -> usize {
        if old.body_a != self.body_a || old.body_b != self.body_b || old.normal.dot(self.normal) < 0.9 {
            return 0;
        }

        let match_sq = WARM_START_MATCH_DISTANCE * WARM_START_MATCH_DISTANCE;
        let mut matched = 0;
        for point in self.iter_mut() {
            let best = old
                .iter()
                .map(|o| (o, o.local_point_a.distance_squared(point.local_point_a)))
                .filter(|(_, d)| *d < match_sq)
                .min_by(|(_, a), (_, b)| a.total_cmp(b));

            if let Some((old_point, _)) = best {
                point.normal_impulse = old_point.normal_impulse * factor;
                point.tangent_impulse_1 = old_point.tangent_impulse_1 * factor;
                point.tangent_impulse_2 = old_point.tangent_impulse_2 * factor;
                matched += 1;
            }
        }
        matched
    }
}

/// An unordered body pair, stored with the lower handle first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollisionPair {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
}

impl CollisionPair {
    /// Creates a new collision pair, ensuring consistent ordering
    pub fn new(a: BodyHandle, b: BodyHandle) -> Self {
        if a <= b {
            Self { body_a: a, body_b: b }
        } else {
            Self { body_a: b, body_b: a }
        }
    }

    #[inline]
    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.body_a == handle || self.body_b == handle
    }

    /// The body paired with `handle`, if `handle` belongs to this pair
    #[inline]
    pub fn other(&self, handle: BodyHandle) -> Option<BodyHandle> {
        if self.body_a == handle {
            Some(self.body_b)
        } else if self.body_b == handle {
            Some(self.body_a)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn handles() -> (BodyHandle, BodyHandle) {
        (BodyHandle::new(0, 0), BodyHandle::new(1, 0))
    }

    fn point_at(x: f32, penetration: f32) -> ContactPoint {
        let p = Vec3::new(x, 0.0, 0.0);
        ContactPoint::new(p, p, Transform::IDENTITY, Transform::IDENTITY, penetration)
    }

    #[test]
    fn test_duplicate_keeps_deeper_point() {
        let (a, b) = handles();
        let mut manifold = ContactManifold::new(a, b, Vec3::Y);
        manifold.add_point(point_at(0.0, 0.1));
        manifold.add_point(point_at(0.005, 0.3));
        manifold.add_point(point_at(0.01, 0.05));

        assert_eq!(manifold.len(), 1);
        assert_abs_diff_eq!(manifold.max_penetration(), 0.3);
    }

    #[test]
    fn test_full_manifold_evicts_shallowest() {
        let (a, b) = handles();
        let mut manifold = ContactManifold::new(a, b, Vec3::Y);
        for i in 0..6 {
            manifold.add_point(point_at(i as f32, 0.1 * i as f32));
        }

        assert_eq!(manifold.len(), MAX_CONTACT_POINTS);
        let mut depths: Vec<f32> = manifold.iter().map(|p| p.penetration).collect();
        depths.sort_by(f32::total_cmp);
        assert_abs_diff_eq!(depths[0], 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_refresh_and_remove_separated() {
        let (a, b) = handles();
        let mut manifold = ContactManifold::new(a, b, Vec3::Y);
        manifold.add_point(point_at(0.0, 0.0));

        // Pull B up and away from A
        manifold.refresh(Transform::IDENTITY, Transform::from_position(Vec3::new(0.0, 1.0, 0.0)));
        let p = manifold.iter().next().unwrap();
        assert_abs_diff_eq!(p.penetration, -1.0);

        assert_eq!(manifold.remove_separated(0.1), 1);
        assert!(manifold.is_empty());
    }

    #[test]
    fn test_warm_start_scales_matched_impulses() {
        let (a, b) = handles();
        let mut old = ContactManifold::new(a, b, Vec3::Y);
        old.add_point(point_at(0.0, 0.1));
        old.iter_mut().for_each(|p| {
            p.normal_impulse = 10.0;
            p.tangent_impulse_1 = 2.0;
        });

        let mut fresh = ContactManifold::new(a, b, Vec3::Y);
        fresh.add_point(point_at(0.05, 0.1));
        fresh.add_point(point_at(3.0, 0.1));

        assert_eq!(fresh.warm_start_from(&old, 0.8), 1);
        let impulses: Vec<f32> = fresh.iter().map(|p| p.normal_impulse).collect();
        assert_abs_diff_eq!(impulses[0], 8.0);
        assert_eq!(impulses[1], 0.0);
    }

    #[test]
    fn test_swapped_negates_normal() {
        let (a, b) = handles();
        let mut manifold = ContactManifold::new(a, b, Vec3::X);
        manifold.add_point(ContactPoint::new(
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.9, 0.0, 0.0),
            Transform::IDENTITY,
            Transform::IDENTITY,
            0.1,
        ));

        let flipped = manifold.swapped();
        assert_eq!(flipped.body_a, b);
        assert_eq!(flipped.normal, -Vec3::X);
        let p = flipped.iter().next().unwrap();
        assert_eq!(p.world_point_a, Vec3::new(0.9, 0.0, 0.0));
        assert_eq!(p.penetration, 0.1);
    }

    #[test]
    fn test_material_mixing() {
        let (a, b) = handles();
        let mut manifold = ContactManifold::new(a, b, Vec3::Y);
        manifold.set_materials(0.4, 0.9, 0.1, 0.7);
        assert_abs_diff_eq!(manifold.friction, 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(manifold.restitution, 0.7);
    }

    #[test]
    fn test_collision_pair_ordering() {
        let (a, b) = handles();
        let pair1 = CollisionPair::new(a, b);
        let pair2 = CollisionPair::new(b, a);

        assert_eq!(pair1, pair2);
        assert_eq!(pair1.body_a, a);
        assert_eq!(pair1.other(a), Some(b));
        assert_eq!(pair1.other(BodyHandle::new(7, 0)), None);
    }
}
