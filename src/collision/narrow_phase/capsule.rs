use crate::geometry::{closest_point_on_segment, closest_points_between_segments, BoxShape, Capsule};
use crate::math::{Transform, Vec3};

use super::sphere::{sphere_box, sphere_sphere};
use super::ContactGeometry;

/// Refinement passes when searching the segment point closest to a box
const BOX_PROJECTION_PASSES: usize = 4;

/// Capsule (A) against sphere (B): a sphere test at the closest segment point
pub fn capsule_sphere(
    capsule: &Capsule,
    capsule_transform: Transform,
    center: Vec3,
    radius: f32,
) -> Option<ContactGeometry> {
    let (p0, p1) = capsule.world_segment(capsule_transform);
    let closest = closest_point_on_segment(center, p0, p1);
    sphere_sphere(closest, capsule.radius, center, radius)
}

/// Capsule against capsule.
///
/// The closest points between the two segments give the main contact; the
/// segment end points add a second contact when the capsules lie side by side.
pub fn capsule_capsule(
    capsule_a: &Capsule,
    transform_a: Transform,
    capsule_b: &Capsule,
    transform_b: Transform,
) -> Option<ContactGeometry> {
    let (a0, a1) = capsule_a.world_segment(transform_a);
    let (b0, b1) = capsule_b.world_segment(transform_b);
    let (ra, rb) = (capsule_a.radius, capsule_b.radius);

    let (ca, cb) = closest_points_between_segments(a0, a1, b0, b1);
    let mut result = sphere_sphere(ca, ra, cb, rb)?;

    for end in [a0, a1] {
        let on_b = closest_point_on_segment(end, b0, b1);
        result.merge(sphere_sphere(end, ra, on_b, rb));
    }
    for end in [b0, b1] {
        let on_a = closest_point_on_segment(end, a0, a1);
        result.merge(sphere_sphere(on_a, ra, end, rb));
    }

    Some(result)
}

/// Capsule (A) against box (B).
///
/// Tests the two cap spheres and the segment point closest to the box, found
/// by alternating projections between the segment and the box.
pub fn capsule_box(
    capsule: &Capsule,
    capsule_transform: Transform,
    shape: &BoxShape,
    box_transform: Transform,
) -> Option<ContactGeometry> {
    let (p0, p1) = capsule.world_segment(capsule_transform);
    let r = capsule.radius;

    let mut on_segment = (p0 + p1) * 0.5;
    for _ in 0..BOX_PROJECTION_PASSES {
        let local = box_transform.inverse_transform_point(on_segment);
        let on_box = box_transform.transform_point(local.clamp(-shape.half_extents, shape.half_extents));
        on_segment = closest_point_on_segment(on_box, p0, p1);
    }

    let mut result: Option<ContactGeometry> = None;
    for center in [p0, p1, on_segment] {
        let hit = sphere_box(center, r, shape, box_transform);
        match result.as_mut() {
            Some(existing) => existing.merge(hit),
            None => result = hit,
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Quat;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_capsule_sphere_hits_cylinder_side() {
        let capsule = Capsule::new(0.5, 2.0);
        let c = capsule_sphere(&capsule, Transform::IDENTITY, Vec3::new(0.8, 0.5, 0.0), 0.5).unwrap();
        assert_abs_diff_eq!(c.normal.x, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(c.points[0].penetration, 0.2, epsilon = 1e-5);
    }

    #[test]
    fn test_capsules_side_by_side_get_two_points() {
        let capsule = Capsule::new(0.5, 2.0);
        let tb = Transform::from_position(Vec3::new(0.9, 0.0, 0.0));
        let c = capsule_capsule(&capsule, Transform::IDENTITY, &capsule, tb).unwrap();
        assert_abs_diff_eq!(c.normal.x, 1.0, epsilon = 1e-6);
        assert!(c.points.len() >= 2);
        for p in &c.points {
            assert_abs_diff_eq!(p.penetration, 0.1, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_standing_capsule_on_box() {
        let capsule = Capsule::new(0.5, 1.0);
        let ground = BoxShape::new(Vec3::new(10.0, 0.5, 10.0));
        // Bottom of the capsule sits 0.05 into the ground top at y = 0.5
        let tc = Transform::from_position(Vec3::new(0.0, 1.45, 0.0));

        let c = capsule_box(&capsule, tc, &ground, Transform::IDENTITY).unwrap();
        assert_abs_diff_eq!(c.normal.y, -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(c.max_penetration(), 0.05, epsilon = 1e-5);
    }

    #[test]
    fn test_lying_capsule_on_box_contacts_both_caps() {
        let capsule = Capsule::new(0.5, 2.0);
        let ground = BoxShape::new(Vec3::new(10.0, 0.5, 10.0));
        let tc = Transform::new(
            Vec3::new(0.0, 0.95, 0.0),
            Quat::from_axis_angle(Vec3::Z, std::f32::consts::FRAC_PI_2),
        );

        let c = capsule_box(&capsule, tc, &ground, Transform::IDENTITY).unwrap();
        assert!(c.points.len() >= 2);
        assert!(c.points.iter().all(|p| (p.penetration - 0.05).abs() < 1e-4));
    }

    #[test]
    fn test_capsule_above_box_misses() {
        let capsule = Capsule::new(0.5, 1.0);
        let ground = BoxShape::new(Vec3::new(10.0, 0.5, 10.0));
        let tc = Transform::from_position(Vec3::new(0.0, 2.0, 0.0));
        assert!(capsule_box(&capsule, tc, &ground, Transform::IDENTITY).is_none());
    }
}
