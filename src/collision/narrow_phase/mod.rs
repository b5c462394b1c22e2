//! Exact contact generation between pairs of shapes.
//!
//! Every routine reports its normal from the first shape to the second.
//! Mirrored pairs (box against sphere, sphere against capsule, ...) reuse
//! the canonical routine and flip the result.

mod box_box;
mod capsule;
mod sphere;

pub use box_box::{box_box, VERTEX_TOLERANCE};
pub use capsule::{capsule_box, capsule_capsule, capsule_sphere};
pub use sphere::{sphere_box, sphere_sphere};

use crate::collision::contact::{BodyHandle, ContactManifold, ContactPoint, CONTACT_MERGE_DISTANCE, MAX_CONTACT_POINTS};
use crate::dynamics::{BodySet, RigidBody};
use crate::geometry::Shape;
use crate::math::{Transform, Vec3};

/// One contact between two shapes, in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactSample {
    /// Deepest point of A inside B
    pub point_a: Vec3,
    /// Deepest point of B inside A
    pub point_b: Vec3,
    pub penetration: f32,
}

/// Raw narrow-phase output before it is bound to bodies
#[derive(Debug, Clone, PartialEq)]
pub struct ContactGeometry {
    /// Unit normal from A to B
    pub normal: Vec3,
    pub points: Vec<ContactSample>,
}

impl ContactGeometry {
    pub fn single(normal: Vec3, sample: ContactSample) -> Self {
        Self {
            normal,
            points: vec![sample],
        }
    }

    /// Keeps the deepest [`MAX_CONTACT_POINTS`] samples
    pub fn from_samples(normal: Vec3, mut samples: Vec<ContactSample>) -> Self {
        samples.sort_by(|a, b| b.penetration.total_cmp(&a.penetration));
        samples.truncate(MAX_CONTACT_POINTS);
        Self { normal, points: samples }
    }

    pub fn max_penetration(&self) -> f32 {
        self.points.iter().map(|p| p.penetration).fold(f32::NEG_INFINITY, f32::max)
    }

    /// Folds another result for the same shape pair into this one. The
    /// deeper result's normal wins; near-duplicate points are skipped.
    pub fn merge(&mut self, other: Option<ContactGeometry>) {
        let Some(other) = other else {
            return;
        };
        if other.max_penetration() > self.max_penetration() {
            self.normal = other.normal;
        }

        let merge_sq = CONTACT_MERGE_DISTANCE * CONTACT_MERGE_DISTANCE;
        for sample in other.points {
            let duplicate = self
                .points
                .iter()
                .any(|p| p.point_a.distance_squared(sample.point_a) < merge_sq);
            if !duplicate {
                self.points.push(sample);
            }
        }

        if self.points.len() > MAX_CONTACT_POINTS {
            let points = std::mem::take(&mut self.points);
            *self = Self::from_samples(self.normal, points);
        }
    }

    /// The same contact seen from the other shape
    pub fn flipped(mut self) -> Self {
        self.normal = -self.normal;
        for p in &mut self.points {
            std::mem::swap(&mut p.point_a, &mut p.point_b);
        }
        self
    }
}

/// Dispatches on the shape pair. Returns `None` when the shapes do not touch.
pub fn collide_shapes(
    shape_a: &Shape,
    transform_a: Transform,
    shape_b: &Shape,
    transform_b: Transform,
) -> Option<ContactGeometry> {
    match (shape_a, shape_b) {
        (Shape::Sphere(a), Shape::Sphere(b)) => {
            sphere_sphere(transform_a.position, a.radius, transform_b.position, b.radius)
        }
        (Shape::Sphere(a), Shape::Box(b)) => sphere_box(transform_a.position, a.radius, b, transform_b),
        (Shape::Box(a), Shape::Sphere(b)) => {
            sphere_box(transform_b.position, b.radius, a, transform_a).map(ContactGeometry::flipped)
        }
        (Shape::Box(a), Shape::Box(b)) => box_box(a, transform_a, b, transform_b),
        (Shape::Capsule(a), Shape::Sphere(b)) => capsule_sphere(a, transform_a, transform_b.position, b.radius),
        (Shape::Sphere(a), Shape::Capsule(b)) => {
            capsule_sphere(b, transform_b, transform_a.position, a.radius).map(ContactGeometry::flipped)
        }
        (Shape::Capsule(a), Shape::Capsule(b)) => capsule_capsule(a, transform_a, b, transform_b),
        (Shape::Capsule(a), Shape::Box(b)) => capsule_box(a, transform_a, b, transform_b),
        (Shape::Box(a), Shape::Capsule(b)) => capsule_box(b, transform_b, a, transform_a).map(ContactGeometry::flipped),
    }
}

/// Builds the contact manifold between two bodies.
///
/// Returns `None` if either body lacks a shape or the shapes are apart.
pub fn collide_bodies(body_a: &RigidBody, body_b: &RigidBody) -> Option<ContactManifold> {
    let (shape_a, shape_b) = (body_a.shape()?, body_b.shape()?);
    let (ta, tb) = (body_a.transform(), body_b.transform());
    let geometry = collide_shapes(shape_a, ta, shape_b, tb)?;

    let mut manifold = ContactManifold::new(body_a.handle(), body_b.handle(), geometry.normal);
    manifold.set_materials(body_a.friction, body_b.friction, body_a.restitution, body_b.restitution);
    for sample in geometry.points {
        manifold.add_point(ContactPoint::new(sample.point_a, sample.point_b, ta, tb, sample.penetration));
    }

    (!manifold.is_empty()).then_some(manifold)
}

/// Handle-based entry point: stale or identical handles yield `None`
pub fn detect_collision(bodies: &BodySet, a: BodyHandle, b: BodyHandle) -> Option<ContactManifold> {
    if a == b {
        return None;
    }
    collide_bodies(bodies.get(a)?, bodies.get(b)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::RigidBodyDesc;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sphere_pair_is_symmetric() {
        let mut bodies = BodySet::new();
        let a = bodies.insert(&RigidBodyDesc::dynamic().with_shape(Shape::sphere(1.0)));
        let b = bodies.insert(
            &RigidBodyDesc::dynamic()
                .with_shape(Shape::sphere(0.5))
                .with_position(Vec3::new(1.0, 0.5, 0.0)),
        );

        let ab = detect_collision(&bodies, a, b).unwrap();
        let ba = detect_collision(&bodies, b, a).unwrap();
        let (pab, pba) = (ab.iter().next().unwrap(), ba.iter().next().unwrap());

        assert_abs_diff_eq!((ab.normal + ba.normal).length(), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(pab.penetration, pba.penetration, epsilon = 1e-6);
        assert_abs_diff_eq!(pab.world_point_a.distance(pba.world_point_b), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(pab.world_point_b.distance(pba.world_point_a), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_box_sphere_is_mirrored() {
        let cube = Shape::cuboid(Vec3::ONE);
        let ball = Shape::sphere(0.5);
        let tb = Transform::from_position(Vec3::new(0.0, 1.3, 0.0));

        let sphere_first = collide_shapes(&ball, tb, &cube, Transform::IDENTITY).unwrap();
        let box_first = collide_shapes(&cube, Transform::IDENTITY, &ball, tb).unwrap();
        assert_abs_diff_eq!(box_first.normal.y, 1.0, epsilon = 1e-6);
        assert_eq!(box_first.normal, -sphere_first.normal);
        assert_eq!(box_first.points[0].point_a, sphere_first.points[0].point_b);
    }

    #[test]
    fn test_materials_are_combined() {
        let mut bodies = BodySet::new();
        let a = bodies.insert(
            &RigidBodyDesc::dynamic()
                .with_shape(Shape::sphere(1.0))
                .with_friction(0.25)
                .with_restitution(0.1),
        );
        let b = bodies.insert(
            &RigidBodyDesc::fixed()
                .with_shape(Shape::cuboid(Vec3::ONE))
                .with_position(Vec3::new(0.0, -1.5, 0.0))
                .with_friction(1.0)
                .with_restitution(0.6),
        );

        let m = detect_collision(&bodies, a, b).unwrap();
        assert_abs_diff_eq!(m.friction, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(m.restitution, 0.6);
    }

    #[test]
    fn test_missing_shape_and_stale_handles() {
        let mut bodies = BodySet::new();
        let a = bodies.insert(&RigidBodyDesc::dynamic());
        let b = bodies.insert(&RigidBodyDesc::dynamic().with_shape(Shape::sphere(1.0)));
        assert!(detect_collision(&bodies, a, b).is_none());
        assert!(detect_collision(&bodies, b, b).is_none());
        assert!(detect_collision(&bodies, b, BodyHandle::INVALID).is_none());

        bodies.remove(a);
        assert!(detect_collision(&bodies, a, b).is_none());
    }

    #[test]
    fn test_merge_keeps_deepest_normal() {
        let shallow = ContactGeometry::single(
            Vec3::X,
            ContactSample {
                point_a: Vec3::ZERO,
                point_b: Vec3::ZERO,
                penetration: 0.1,
            },
        );
        let mut merged = shallow.clone();
        merged.merge(Some(ContactGeometry::single(
            Vec3::Y,
            ContactSample {
                point_a: Vec3::ONE,
                point_b: Vec3::ONE,
                penetration: 0.3,
            },
        )));
        merged.merge(Some(shallow));
        merged.merge(None);

        assert_eq!(merged.normal, Vec3::Y);
        assert_eq!(merged.points.len(), 2);
    }
}
