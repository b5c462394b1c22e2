mod aabb;
mod ray;
mod segment;
mod shape;

pub use aabb::Aabb;
pub use ray::{Ray, RayHit};
pub use segment::{closest_point_on_segment, closest_points_between_segments};
pub use shape::{BoxShape, Capsule, Shape, ShapeType, Sphere, SHAPE_MARGIN};
