use std::f32::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::math::consts::MIN_DIMENSION;
use crate::math::{Mat3, Transform, Vec3};

use super::aabb::Aabb;
use super::ray::{Ray, RayHit};
use super::segment::closest_point_on_segment;

/// Slack added to every world AABB so resting contacts stay paired
pub const SHAPE_MARGIN: f32 = 0.01;

/// The type of collision shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeType {
    Sphere,
    Box,
    Capsule,
}

/// A collision shape that can be attached to rigid bodies.
///
/// Shapes are centered on the body origin and stored by value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Shape {
    /// A sphere defined by its radius
    Sphere(Sphere),
    /// A box (cuboid) defined by half-extents
    Box(BoxShape),
    /// A capsule aligned with local Y
    Capsule(Capsule),
}

impl Shape {
    #[inline]
    pub fn sphere(radius: f32) -> Self {
        Self::Sphere(Sphere::new(radius))
    }

    /// Creates a box shape from half-extents
    #[inline]
    pub fn cuboid(half_extents: Vec3) -> Self {
        Self::Box(BoxShape::new(half_extents))
    }

    /// Creates a capsule from its radius and the length of its cylindrical section
    #[inline]
    pub fn capsule(radius: f32, height: f32) -> Self {
        Self::Capsule(Capsule::new(radius, height))
    }

    #[inline]
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Sphere(_) => ShapeType::Sphere,
            Shape::Box(_) => ShapeType::Box,
            Shape::Capsule(_) => ShapeType::Capsule,
        }
    }

    /// World-space bounds inflated by [`SHAPE_MARGIN`]
    #[inline]
    pub fn world_aabb(&self, transform: Transform) -> Aabb {
        let tight = match self {
            Shape::Sphere(s) => s.world_aabb(transform),
            Shape::Box(b) => b.world_aabb(transform),
            Shape::Capsule(c) => c.world_aabb(transform),
        };
        tight.expand(SHAPE_MARGIN)
    }

    /// The point of the shape furthest along `direction` (local space)
    #[inline]
    pub fn support(&self, direction: Vec3) -> Vec3 {
        match self {
            Shape::Sphere(s) => s.support(direction),
            Shape::Box(b) => b.support(direction),
            Shape::Capsule(c) => c.support(direction),
        }
    }

    /// Returns the support point in world space given a transform
    #[inline]
    pub fn support_world(&self, transform: Transform, direction: Vec3) -> Vec3 {
        let local_dir = transform.inverse_transform_vector(direction);
        transform.transform_point(self.support(local_dir))
    }

    /// Casts a world-space ray against this shape placed at `transform`.
    ///
    /// A ray starting inside the shape reports a hit at distance 0 with the
    /// normal facing back along the ray.
    pub fn raycast(&self, ray: &Ray, transform: Transform) -> Option<RayHit> {
        let local_origin = transform.inverse_transform_point(ray.origin);
        let local_dir = transform.inverse_transform_vector(ray.direction);

        let (distance, local_normal) = match self {
            Shape::Sphere(s) => s.raycast_local(local_origin, local_dir)?,
            Shape::Box(b) => b.raycast_local(local_origin, local_dir)?,
            Shape::Capsule(c) => c.raycast_local(local_origin, local_dir)?,
        };

        if distance > ray.max_distance {
            return None;
        }

        Some(RayHit {
            point: ray.point_at(distance),
            normal: transform.transform_vector(local_normal).normalize_or(-ray.direction),
            distance,
        })
    }

    /// Returns true if the world-space point lies inside or on the shape
    #[inline]
    pub fn contains_point(&self, transform: Transform, point: Vec3) -> bool {
        let p = transform.inverse_transform_point(point);
        match self {
            Shape::Sphere(s) => p.length_squared() <= s.radius * s.radius,
            Shape::Box(b) => {
                let h = b.half_extents;
                p.x.abs() <= h.x && p.y.abs() <= h.y && p.z.abs() <= h.z
            }
            Shape::Capsule(c) => {
                let (a, b) = c.segment();
                closest_point_on_segment(p, a, b).distance_squared(p) <= c.radius * c.radius
            }
        }
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        match self {
            Shape::Sphere(s) => s.volume(),
            Shape::Box(b) => b.volume(),
            Shape::Capsule(c) => c.volume(),
        }
    }

    /// Local inertia tensor for a body of the given mass
    #[inline]
    pub fn inertia_tensor(&self, mass: f32) -> Mat3 {
        let diag = match self {
            Shape::Sphere(s) => s.inertia_diagonal(mass),
            Shape::Box(b) => b.inertia_diagonal(mass),
            Shape::Capsule(c) => c.inertia_diagonal(mass),
        };
        Mat3::from_diagonal(diag)
    }
}

/// A sphere collision shape
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sphere {
    pub radius: f32,
}

impl Sphere {
    #[inline]
    pub fn new(radius: f32) -> Self {
        Self {
            radius: radius.max(MIN_DIMENSION),
        }
    }

    #[inline]
    pub fn world_aabb(&self, transform: Transform) -> Aabb {
        Aabb::from_center_half_extents(transform.position, Vec3::splat(self.radius))
    }

    #[inline]
    pub fn support(&self, direction: Vec3) -> Vec3 {
        direction.normalize_or(Vec3::Y) * self.radius
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        (4.0 / 3.0) * PI * self.radius * self.radius * self.radius
    }

    #[inline]
    pub fn inertia_diagonal(&self, mass: f32) -> Vec3 {
        Vec3::splat(0.4 * mass * self.radius * self.radius)
    }

    fn raycast_local(&self, origin: Vec3, dir: Vec3) -> Option<(f32, Vec3)> {
        if origin.length_squared() <= self.radius * self.radius {
            return Some((0.0, -dir));
        }
        let t = ray_sphere(origin, dir, Vec3::ZERO, self.radius)?;
        let point = origin + dir * t;
        Some((t, point.normalize_or(-dir)))
    }
}

/// A box (cuboid) collision shape
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoxShape {
    /// Half-extents (half the size in each dimension)
    pub half_extents: Vec3,
}

impl BoxShape {
    #[inline]
    pub fn new(half_extents: Vec3) -> Self {
        Self {
            half_extents: half_extents.abs().max(Vec3::splat(MIN_DIMENSION)),
        }
    }

    #[inline]
    pub fn world_aabb(&self, transform: Transform) -> Aabb {
        // Sum of the absolute rotated axes gives the world extent
        let extent = transform.rotation_matrix().abs() * self.half_extents;
        Aabb::from_center_half_extents(transform.position, extent)
    }

    #[inline]
    pub fn support(&self, direction: Vec3) -> Vec3 {
        let h = self.half_extents;
        Vec3::new(
            if direction.x >= 0.0 { h.x } else { -h.x },
            if direction.y >= 0.0 { h.y } else { -h.y },
            if direction.z >= 0.0 { h.z } else { -h.z },
        )
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        8.0 * self.half_extents.x * self.half_extents.y * self.half_extents.z
    }

    #[inline]
    pub fn inertia_diagonal(&self, mass: f32) -> Vec3 {
        let size = self.half_extents * 2.0;
        let x2 = size.x * size.x;
        let y2 = size.y * size.y;
        let z2 = size.z * size.z;
        Vec3::new(y2 + z2, x2 + z2, x2 + y2) * (mass / 12.0)
    }

    /// Returns the 8 vertices of the box in local space
    #[inline]
    pub fn vertices(&self) -> [Vec3; 8] {
        let h = self.half_extents;
        [
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
        ]
    }

    fn raycast_local(&self, origin: Vec3, dir: Vec3) -> Option<(f32, Vec3)> {
        let h = self.half_extents;
        if origin.x.abs() <= h.x && origin.y.abs() <= h.y && origin.z.abs() <= h.z {
            return Some((0.0, -dir));
        }

        let mut t_enter = f32::NEG_INFINITY;
        let mut t_exit = f32::INFINITY;
        let mut normal = Vec3::ZERO;

        for axis in 0..3 {
            let o = origin[axis];
            let d = dir[axis];
            if d.abs() < 1e-8 {
                if o < -h[axis] || o > h[axis] {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / d;
            let t1 = (-h[axis] - o) * inv;
            let t2 = (h[axis] - o) * inv;
            let (near, far) = if t1 < t2 { (t1, t2) } else { (t2, t1) };

            if near > t_enter {
                t_enter = near;
                normal = Vec3::ZERO;
                normal[axis] = -d.signum();
            }
            t_exit = t_exit.min(far);
            if t_enter > t_exit {
                return None;
            }
        }

        if t_enter < 0.0 {
            return None;
        }
        Some((t_enter, normal))
    }
}

/// A capsule collision shape: a cylinder of length `height` along local Y
/// capped by two hemispheres of `radius`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Capsule {
    pub radius: f32,
    /// Length of the cylindrical section (cap centers are `height` apart)
    pub height: f32,
}

impl Capsule {
    #[inline]
    pub fn new(radius: f32, height: f32) -> Self {
        Self {
            radius: radius.max(MIN_DIMENSION),
            height: height.max(MIN_DIMENSION),
        }
    }

    #[inline]
    pub fn half_height(&self) -> f32 {
        self.height * 0.5
    }

    /// Total extent along the axis, caps included
    #[inline]
    pub fn total_height(&self) -> f32 {
        self.height + 2.0 * self.radius
    }

    /// The two cap centers in local space (bottom, top)
    #[inline]
    pub fn segment(&self) -> (Vec3, Vec3) {
        let hh = self.half_height();
        (Vec3::new(0.0, -hh, 0.0), Vec3::new(0.0, hh, 0.0))
    }

    /// The two cap centers in world space (bottom, top)
    #[inline]
    pub fn world_segment(&self, transform: Transform) -> (Vec3, Vec3) {
        let (a, b) = self.segment();
        (transform.transform_point(a), transform.transform_point(b))
    }

    #[inline]
    pub fn world_aabb(&self, transform: Transform) -> Aabb {
        let (a, b) = self.world_segment(transform);
        Aabb::from_points(a, b).expand(self.radius)
    }

    #[inline]
    pub fn support(&self, direction: Vec3) -> Vec3 {
        let hh = self.half_height();
        let center = Vec3::new(0.0, if direction.y >= 0.0 { hh } else { -hh }, 0.0);
        center + direction.normalize_or(Vec3::Y) * self.radius
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        let r = self.radius;
        PI * r * r * self.height + (4.0 / 3.0) * PI * r * r * r
    }

    /// Cylinder plus two hemispheres, mass split by volume
    pub fn inertia_diagonal(&self, mass: f32) -> Vec3 {
        let r = self.radius;
        let h = self.height;
        let cyl_volume = PI * r * r * h;
        let caps_volume = (4.0 / 3.0) * PI * r * r * r;
        let total = cyl_volume + caps_volume;

        let m_cyl = mass * cyl_volume / total;
        let m_caps = mass * caps_volume / total;

        let axial = m_cyl * r * r * 0.5 + m_caps * 0.4 * r * r;
        let transverse = m_cyl * (h * h / 12.0 + r * r * 0.25)
            + m_caps * (0.4 * r * r + h * h * 0.25 + 0.375 * h * r);

        Vec3::new(transverse, axial, transverse)
    }

    fn raycast_local(&self, origin: Vec3, dir: Vec3) -> Option<(f32, Vec3)> {
        let r = self.radius;
        let hh = self.half_height();
        let (bottom, top) = self.segment();

        if closest_point_on_segment(origin, bottom, top).distance_squared(origin) <= r * r {
            return Some((0.0, -dir));
        }

        let mut best: Option<(f32, Vec3)> = None;
        let mut consider = |t: f32, normal: Vec3| {
            if best.map_or(true, |(bt, _)| t < bt) {
                best = Some((t, normal));
            }
        };

        // Cylinder wall
        let a = dir.x * dir.x + dir.z * dir.z;
        if a > 1e-10 {
            let b = origin.x * dir.x + origin.z * dir.z;
            let c = origin.x * origin.x + origin.z * origin.z - r * r;
            let disc = b * b - a * c;
            if disc >= 0.0 {
                let t = (-b - disc.sqrt()) / a;
                let p = origin + dir * t;
                if t >= 0.0 && p.y.abs() <= hh {
                    consider(t, Vec3::new(p.x, 0.0, p.z).normalize_or(-dir));
                }
            }
        }

        // Hemispherical caps
        for center in [bottom, top] {
            if let Some(t) = ray_sphere(origin, dir, center, r) {
                let p = origin + dir * t;
                consider(t, (p - center).normalize_or(-dir));
            }
        }

        best
    }
}

/// First non-negative hit distance of a unit ray against a sphere whose
/// interior does not contain the origin.
fn ray_sphere(origin: Vec3, dir: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let oc = origin - center;
    let b = oc.dot(dir);
    let c = oc.length_squared() - radius * radius;
    if c > 0.0 && b > 0.0 {
        return None;
    }
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    Some((-b - disc.sqrt()).max(0.0))
}
