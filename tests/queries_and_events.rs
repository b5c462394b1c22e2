use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_abs_diff_eq;
use impulse3d::collision::{BroadPhaseConfig, SpatialHashBroadPhase};
use impulse3d::dynamics::BodySet;
use impulse3d::prelude::*;

const DT: f32 = 1.0 / 60.0;

#[test]
fn raycast_hits_top_of_unit_box() {
    let mut world = World::default();
    let cube = world.add_rigid_body(RigidBodyDesc::fixed().with_shape(Shape::cuboid(Vec3::ONE)));

    let hit = world
        .raycast(&Ray::new(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, -1.0, 0.0), 100.0))
        .unwrap();

    assert_eq!(hit.body, cube);
    assert_abs_diff_eq!(hit.point.x, 0.0, epsilon = 1e-5);
    assert_abs_diff_eq!(hit.point.y, 1.0, epsilon = 1e-5);
    assert_abs_diff_eq!(hit.point.z, 0.0, epsilon = 1e-5);
    assert_abs_diff_eq!(hit.normal.y, 1.0, epsilon = 1e-5);
    assert_abs_diff_eq!(hit.distance, 4.0, epsilon = 1e-5);
}

#[test]
fn raycast_sees_bodies_after_they_move() {
    let mut world = World::default();
    world.set_gravity(Vec3::ZERO);
    let ball = world.add_rigid_body(
        RigidBodyDesc::dynamic()
            .with_shape(Shape::sphere(0.5))
            .with_linear_velocity(Vec3::new(6.0, 0.0, 0.0)),
    );
    for _ in 0..60 {
        world.update(DT);
    }

    let ray = Ray::new(Vec3::new(6.0, 10.0, 0.0), Vec3::new(0.0, -1.0, 0.0), 20.0);
    let hit = world.raycast(&ray).unwrap();
    assert_eq!(hit.body, ball);
    assert!(world.raycast(&Ray::new(Vec3::new(0.0, 10.0, 0.0), Vec3::new(0.0, -1.0, 0.0), 20.0)).is_none());
}

#[test]
fn bodies_sharing_three_cells_pair_once() {
    let mut bodies = BodySet::new();
    let a = bodies.insert(
        &RigidBodyDesc::dynamic()
            .with_shape(Shape::cuboid(Vec3::new(2.5, 0.5, 0.5)))
            .with_position(Vec3::new(3.0, 1.0, 1.0)),
    );
    let b = bodies.insert(
        &RigidBodyDesc::dynamic()
            .with_shape(Shape::cuboid(Vec3::new(2.5, 0.5, 0.5)))
            .with_position(Vec3::new(3.0, 1.2, 1.0)),
    );

    let mut grid = SpatialHashBroadPhase::new(BroadPhaseConfig {
        cell_size: 2.0,
        ..BroadPhaseConfig::default()
    });
    grid.update_all_bodies(&bodies);

    let pairs = grid.find_potential_collisions(&bodies);
    assert_eq!(pairs, vec![CollisionPair::new(a, b)]);
    assert_eq!(grid.occupied_cells(), 3);
}

#[derive(Default)]
struct Counts {
    enter: usize,
    stay: usize,
    exit: usize,
}

struct Counter(Rc<RefCell<Counts>>);

impl CollisionListener for Counter {
    fn on_collision_enter(&mut self, _a: BodyHandle, _b: BodyHandle, manifold: &ContactManifold) {
        assert!(!manifold.is_empty());
        self.0.borrow_mut().enter += 1;
    }

    fn on_collision_stay(&mut self, _a: BodyHandle, _b: BodyHandle, _manifold: &ContactManifold) {
        self.0.borrow_mut().stay += 1;
    }

    fn on_collision_exit(&mut self, _a: BodyHandle, _b: BodyHandle) {
        self.0.borrow_mut().exit += 1;
    }
}

#[test]
fn collision_events_enter_stay_exit() {
    let mut world = World::default();
    let counts = Rc::new(RefCell::new(Counts::default()));
    world.add_collision_listener(Box::new(Counter(Rc::clone(&counts))));

    let floor = world.add_rigid_body(
        RigidBodyDesc::fixed()
            .with_shape(Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)))
            .with_position(Vec3::new(0.0, -0.5, 0.0))
            .with_restitution(0.0),
    );
    let ball = world.add_rigid_body(
        RigidBodyDesc::dynamic()
            .with_shape(Shape::sphere(0.5))
            .with_position(Vec3::new(0.0, 1.5, 0.0))
            .with_restitution(0.0),
    );

    for _ in 0..120 {
        world.update(DT);
    }
    {
        let counts = counts.borrow();
        assert_eq!(counts.enter, 1);
        assert!(counts.stay > 0);
        assert_eq!(counts.exit, 0);
    }
    assert_eq!(
        world.collision_events(),
        &[CollisionEvent::Stay(CollisionPair::new(floor, ball))]
    );

    world.set_position(ball, Vec3::new(0.0, 10.0, 0.0));
    world.update(DT);

    assert_eq!(counts.borrow().exit, 1);
    assert_eq!(
        world.collision_events(),
        &[CollisionEvent::Exit(CollisionPair::new(floor, ball))]
    );
}

#[test]
fn resting_pairs_keep_touching_while_asleep() {
    let mut world = World::default();
    world.add_rigid_body(
        RigidBodyDesc::fixed()
            .with_shape(Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)))
            .with_position(Vec3::new(0.0, -0.5, 0.0)),
    );
    let ball = world.add_rigid_body(
        RigidBodyDesc::dynamic()
            .with_shape(Shape::sphere(0.5))
            .with_position(Vec3::new(0.0, 0.5, 0.0))
            .with_restitution(0.0),
    );

    for _ in 0..300 {
        world.update(DT);
    }
    assert!(world.body(ball).unwrap().is_sleeping());

    world.update(DT);
    assert!(world
        .collision_events()
        .iter()
        .all(|event| matches!(event, CollisionEvent::Stay(_))));
    assert_eq!(world.num_manifolds(), 1);
}

#[test]
fn overlap_queries_report_touched_bodies() {
    let mut world = World::default();
    let a = world.add_rigid_body(RigidBodyDesc::fixed().with_shape(Shape::sphere(1.0)));
    let b = world.add_rigid_body(
        RigidBodyDesc::fixed()
            .with_shape(Shape::capsule(0.5, 2.0))
            .with_position(Vec3::new(4.0, 0.0, 0.0)),
    );

    assert_eq!(world.overlapping_bodies_point(Vec3::new(4.0, 1.4, 0.0)), vec![b]);
    assert!(world.overlapping_bodies_point(Vec3::new(4.0, 1.6, 0.0)).is_empty());

    let region = Aabb::new(Vec3::new(0.5, -0.5, -0.5), Vec3::new(3.7, 0.5, 0.5));
    assert_eq!(world.overlapping_bodies_aabb(region), vec![a, b]);
}
