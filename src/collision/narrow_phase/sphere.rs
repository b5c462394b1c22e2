use crate::geometry::BoxShape;
use crate::math::{Transform, Vec3};

use super::{ContactGeometry, ContactSample};

/// Sphere against sphere. The normal points from A to B; coincident centers
/// fall back to +X.
pub fn sphere_sphere(center_a: Vec3, radius_a: f32, center_b: Vec3, radius_b: f32) -> Option<ContactGeometry> {
    let delta = center_b - center_a;
    let radius_sum = radius_a + radius_b;
    let dist_sq = delta.length_squared();
    if dist_sq >= radius_sum * radius_sum {
        return None;
    }

    let (normal, dist) = delta.normalize_with_length().unwrap_or((Vec3::X, 0.0));
    let penetration = radius_sum - dist;

    Some(ContactGeometry::single(
        normal,
        ContactSample {
            point_a: center_a + normal * radius_a,
            point_b: center_b - normal * radius_b,
            penetration,
        },
    ))
}

/// Sphere (A) against box (B).
///
/// The sphere center is clamped into box space. When the center is inside
/// the box the face of least penetration decides the normal.
pub fn sphere_box(center: Vec3, radius: f32, shape: &BoxShape, box_transform: Transform) -> Option<ContactGeometry> {
    let h = shape.half_extents;
    let local = box_transform.inverse_transform_point(center);
    let closest = local.clamp(-h, h);
    let diff = local - closest;
    let dist_sq = diff.length_squared();

    if dist_sq > radius * radius {
        return None;
    }

    // Outward box normal (local) plus the box surface point and penetration
    let (local_normal, local_surface, penetration) = if dist_sq > 1e-12 {
        let dist = dist_sq.sqrt();
        (diff / dist, closest, radius - dist)
    } else {
        let mut best_axis = 0;
        let mut best_depth = f32::INFINITY;
        for axis in 0..3 {
            let depth = h[axis] - local[axis].abs();
            if depth < best_depth {
                best_depth = depth;
                best_axis = axis;
            }
        }

        let sign = if local[best_axis] >= 0.0 { 1.0 } else { -1.0 };
        let mut normal = Vec3::ZERO;
        normal[best_axis] = sign;
        let mut surface = local;
        surface[best_axis] = sign * h[best_axis];
        (normal, surface, radius + best_depth)
    };

    let box_normal = box_transform.transform_vector(local_normal);
    let normal = -box_normal;

    Some(ContactGeometry::single(
        normal,
        ContactSample {
            point_a: center + normal * radius,
            point_b: box_transform.transform_point(local_surface),
            penetration,
        },
    ))
}
