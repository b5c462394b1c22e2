use crate::math::Vec3;

/// Closest point to `p` on the segment `[a, b]`
#[inline]
pub fn closest_point_on_segment(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < 1e-12 {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Closest pair of points between segments `[p1, q1]` and `[p2, q2]`.
///
/// Returns `(c1, c2)` with `c1` on the first segment. Degenerate segments
/// are treated as points; parallel segments pick the first segment's start
/// as the reference.
pub fn closest_points_between_segments(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> (Vec3, Vec3) {
    const EPS: f32 = 1e-10;

    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);

    let (s, t) = if a <= EPS && e <= EPS {
        (0.0, 0.0)
    } else if a <= EPS {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= EPS {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > EPS {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };

    (p1 + d1 * s, p2 + d2 * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_point_projection_clamps_to_ends() {
        let a = Vec3::ZERO;
        let b = Vec3::new(0.0, 2.0, 0.0);
        assert_eq!(closest_point_on_segment(Vec3::new(1.0, 1.0, 0.0), a, b), Vec3::Y);
        assert_eq!(closest_point_on_segment(Vec3::new(0.0, 5.0, 0.0), a, b), b);
        assert_eq!(closest_point_on_segment(Vec3::new(0.0, -5.0, 0.0), a, b), a);
        assert_eq!(closest_point_on_segment(Vec3::ONE, a, a), a);
    }

    #[test]
    fn test_crossing_segments() {
        let (c1, c2) = closest_points_between_segments(
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, -1.0),
            Vec3::new(0.0, 1.0, 1.0),
        );
        assert_abs_diff_eq!(c1.distance(Vec3::ZERO), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(c2.distance(Vec3::Y), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_parallel_segments() {
        let (c1, c2) = closest_points_between_segments(
            Vec3::ZERO,
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 2.0, 0.0),
        );
        assert_abs_diff_eq!(c1.distance(c2), 1.0, epsilon = 1e-6);
    }
}
