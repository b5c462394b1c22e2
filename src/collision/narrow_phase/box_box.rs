use crate::geometry::BoxShape;
use crate::math::{Transform, Vec3};

use super::{ContactGeometry, ContactSample};

/// Vertices this far outside the other box still produce (speculative) contacts
pub const VERTEX_TOLERANCE: f32 = 0.05;

/// An edge-edge axis must beat the best face axis by this factor to win
const EDGE_AXIS_BIAS: f32 = 0.95;
const EDGE_AXIS_SLACK: f32 = 0.01;

struct OrientedBox {
    center: Vec3,
    axes: [Vec3; 3],
    half_extents: Vec3,
}

impl OrientedBox {
    fn new(shape: &BoxShape, transform: Transform) -> Self {
        let rot = transform.rotation_matrix();
        Self {
            center: transform.position,
            axes: [rot.col(0), rot.col(1), rot.col(2)],
            half_extents: shape.half_extents,
        }
    }

    /// Half-length of the projection onto `axis`
    fn projected_radius(&self, axis: Vec3) -> f32 {
        (0..3)
            .map(|i| self.half_extents[i] * self.axes[i].dot(axis).abs())
            .sum()
    }

    fn support(&self, direction: Vec3) -> Vec3 {
        let mut point = self.center;
        for i in 0..3 {
            let sign = if self.axes[i].dot(direction) >= 0.0 { 1.0 } else { -1.0 };
            point += self.axes[i] * (self.half_extents[i] * sign);
        }
        point
    }

    fn contains(&self, point: Vec3, tolerance: f32) -> bool {
        let d = point - self.center;
        (0..3).all(|i| d.dot(self.axes[i]).abs() <= self.half_extents[i] + tolerance)
    }

    fn vertices(&self) -> impl Iterator<Item = Vec3> + '_ {
        (0..8).map(move |corner| {
            let mut v = self.center;
            for i in 0..3 {
                let sign = if corner & (1 << i) != 0 { 1.0 } else { -1.0 };
                v += self.axes[i] * (self.half_extents[i] * sign);
            }
            v
        })
    }
}

/// Box against box with the separating axis test over 15 axes.
///
/// The axis of least overlap becomes the normal (A to B). Contacts are the
/// vertices of each box that lie inside the other within
/// [`VERTEX_TOLERANCE`], deepest four kept. When no vertex qualifies (an
/// edge-edge hit) a single point is placed midway between the two support
/// points.
pub fn box_box(
    shape_a: &BoxShape,
    transform_a: Transform,
    shape_b: &BoxShape,
    transform_b: Transform,
) -> Option<ContactGeometry> {
    let a = OrientedBox::new(shape_a, transform_a);
    let b = OrientedBox::new(shape_b, transform_b);
    let offset = b.center - a.center;

    let mut best_axis = Vec3::ZERO;
    let mut best_overlap = f32::INFINITY;

    let mut test_axis = |axis: Vec3, is_edge: bool| -> bool {
        let overlap = a.projected_radius(axis) + b.projected_radius(axis) - offset.dot(axis).abs();
        if overlap < 0.0 {
            return false;
        }
        let better = if is_edge {
            overlap < best_overlap * EDGE_AXIS_BIAS - EDGE_AXIS_SLACK
        } else {
            overlap < best_overlap
        };
        if better {
            best_overlap = overlap;
            best_axis = axis;
        }
        true
    };

    for axis in a.axes.iter().chain(b.axes.iter()) {
        if !test_axis(*axis, false) {
            return None;
        }
    }

    for axis_a in &a.axes {
        for axis_b in &b.axes {
            // Near-parallel edges give no usable axis
            if let Some(axis) = axis_a.cross(*axis_b).normalize_with_length().filter(|(_, len)| *len > 1e-3) {
                if !test_axis(axis.0, true) {
                    return None;
                }
            }
        }
    }

    let normal = if offset.dot(best_axis) < 0.0 { -best_axis } else { best_axis };
    let radius_a = a.projected_radius(normal);
    let radius_b = b.projected_radius(normal);

    let mut samples: Vec<ContactSample> = Vec::with_capacity(8);

    for v in b.vertices() {
        let penetration = radius_a - (v - a.center).dot(normal);
        if penetration >= -VERTEX_TOLERANCE && a.contains(v, VERTEX_TOLERANCE) {
            samples.push(ContactSample {
                point_a: v + normal * penetration,
                point_b: v,
                penetration,
            });
        }
    }

    for v in a.vertices() {
        let penetration = (v - b.center).dot(normal) + radius_b;
        if penetration >= -VERTEX_TOLERANCE && b.contains(v, VERTEX_TOLERANCE) {
            samples.push(ContactSample {
                point_a: v,
                point_b: v - normal * penetration,
                penetration,
            });
        }
    }

    if samples.is_empty() {
        let mid = (a.support(normal) + b.support(-normal)) * 0.5;
        let half = normal * (best_overlap * 0.5);
        samples.push(ContactSample {
            point_a: mid + half,
            point_b: mid - half,
            penetration: best_overlap,
        });
    }

    Some(ContactGeometry::from_samples(normal, samples))
}
