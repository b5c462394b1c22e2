use crate::collision::BodyHandle;
use crate::dynamics::RigidBody;
use crate::geometry::{Aabb, Ray};
use crate::math::Vec3;

use super::World;

/// Result of a ray cast query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    /// Body that was hit
    pub body: BodyHandle,
    /// World space hit point
    pub point: Vec3,
    /// Surface normal at hit point
    pub normal: Vec3,
    /// Distance from ray origin
    pub distance: f32,
}

impl World {
    /// Closest hit along the ray, if any
    pub fn raycast(&self, ray: &Ray) -> Option<RaycastHit> {
        self.raycast_filtered(ray, |_| true)
    }

    /// Closest hit among the bodies accepted by `filter`
    pub fn raycast_filtered(&self, ray: &Ray, mut filter: impl FnMut(&RigidBody) -> bool) -> Option<RaycastHit> {
        self.ray_candidates(ray)
            .filter(|(body, _)| filter(*body))
            .map(|(_, hit)| hit)
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// Every hit along the ray, nearest first
    pub fn raycast_all(&self, ray: &Ray) -> Vec<RaycastHit> {
        let mut hits: Vec<RaycastHit> = self.ray_candidates(ray).map(|(_, hit)| hit).collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    /// Bodies whose shape bounds overlap `aabb`, in handle order
    pub fn overlapping_bodies_aabb(&self, aabb: Aabb) -> Vec<BodyHandle> {
        let mut found: Vec<BodyHandle> = self
            .broad_phase
            .query_aabb(aabb)
            .into_iter()
            .filter(|&h| {
                self.bodies
                    .get(h)
                    .and_then(RigidBody::world_aabb)
                    .is_some_and(|bounds| bounds.intersects(aabb))
            })
            .collect();
        found.sort_unstable();
        found
    }

    /// Bodies whose shape contains `point`, in handle order
    pub fn overlapping_bodies_point(&self, point: Vec3) -> Vec<BodyHandle> {
        let mut found: Vec<BodyHandle> = self
            .broad_phase
            .query_point(point)
            .into_iter()
            .filter(|&h| {
                self.bodies
                    .get(h)
                    .and_then(|body| body.shape().map(|shape| shape.contains_point(body.transform(), point)))
                    .unwrap_or(false)
            })
            .collect();
        found.sort_unstable();
        found
    }

    /// Exact shape hits for the bodies in the cells the ray crosses
    fn ray_candidates<'a>(&'a self, ray: &'a Ray) -> impl Iterator<Item = (&'a RigidBody, RaycastHit)> + 'a {
        self.broad_phase.query_ray(ray).into_iter().filter_map(move |handle| {
            let body = self.bodies.get(handle)?;
            let hit = body.shape()?.raycast(ray, body.transform())?;
            Some((
                body,
                RaycastHit {
                    body: handle,
                    point: hit.point,
                    normal: hit.normal,
                    distance: hit.distance,
                },
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::RigidBodyDesc;
    use crate::geometry::Shape;
    use approx::assert_abs_diff_eq;

    fn world_with_boxes() -> (World, BodyHandle, BodyHandle) {
        let mut world = World::default();
        let near = world.add_rigid_body(RigidBodyDesc::fixed().with_shape(Shape::cuboid(Vec3::ONE)));
        let far = world.add_rigid_body(
            RigidBodyDesc::fixed()
                .with_shape(Shape::sphere(1.0))
                .with_position(Vec3::new(0.0, -4.0, 0.0)),
        );
        (world, near, far)
    }

    #[test]
    fn test_raycast_hits_unit_box_top() {
        let (world, near, _) = world_with_boxes();
        let hit = world.raycast(&Ray::new(Vec3::new(0.0, 5.0, 0.0), -Vec3::Y, 100.0)).unwrap();

        assert_eq!(hit.body, near);
        assert_abs_diff_eq!(hit.distance, 4.0, epsilon = 1e-5);
        assert_abs_diff_eq!(hit.point.y, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(hit.normal.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_raycast_all_is_sorted_and_filter_skips() {
        let (world, near, far) = world_with_boxes();
        let ray = Ray::new(Vec3::new(0.0, 5.0, 0.0), -Vec3::Y, 100.0);

        let hits = world.raycast_all(&ray);
        assert_eq!(hits.iter().map(|h| h.body).collect::<Vec<_>>(), vec![near, far]);

        let hit = world.raycast_filtered(&ray, |body| body.handle() != near).unwrap();
        assert_eq!(hit.body, far);
        assert_abs_diff_eq!(hit.distance, 8.0, epsilon = 1e-5);
    }

    #[test]
    fn test_raycast_respects_max_distance() {
        let (world, _, _) = world_with_boxes();
        assert!(world.raycast(&Ray::new(Vec3::new(0.0, 5.0, 0.0), -Vec3::Y, 3.0)).is_none());
        assert!(world.raycast(&Ray::new(Vec3::new(5.0, 5.0, 0.0), -Vec3::Y, 100.0)).is_none());
    }

    #[test]
    fn test_overlap_queries() {
        let (world, near, far) = world_with_boxes();

        assert_eq!(world.overlapping_bodies_point(Vec3::new(0.5, 0.5, 0.5)), vec![near]);
        assert_eq!(world.overlapping_bodies_point(Vec3::new(0.0, -4.5, 0.0)), vec![far]);
        assert!(world.overlapping_bodies_point(Vec3::new(0.0, -2.0, 0.0)).is_empty());

        let both = Aabb::new(Vec3::new(-0.5, -4.0, -0.5), Vec3::new(0.5, 0.0, 0.5));
        assert_eq!(world.overlapping_bodies_aabb(both), vec![near, far]);
    }
}
