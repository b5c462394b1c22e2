use approx::assert_abs_diff_eq;
use impulse3d::prelude::*;

const DT: f32 = 1.0 / 60.0;
const GRAVITY: f32 = 9.81;

/// Static slab whose top face is at y = 0
fn add_floor(world: &mut World) -> BodyHandle {
    world.add_rigid_body(
        RigidBodyDesc::fixed()
            .with_shape(Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)))
            .with_position(Vec3::new(0.0, -0.5, 0.0)),
    )
}

fn add_box(world: &mut World, y: f32) -> BodyHandle {
    world.add_rigid_body(
        RigidBodyDesc::dynamic()
            .with_shape(Shape::cuboid(Vec3::splat(0.5)))
            .with_position(Vec3::new(0.0, y, 0.0))
            .with_restitution(0.0),
    )
}

fn total_energy(world: &World) -> f32 {
    world
        .bodies()
        .filter(|b| b.is_dynamic())
        .map(|b| 0.5 * b.mass() * b.linear_velocity().length_squared() + b.mass() * GRAVITY * b.position().y)
        .sum()
}

#[test]
fn two_box_stack_settles_without_gaining_energy() {
    let mut world = World::default();
    add_floor(&mut world);
    let lower = add_box(&mut world, 0.5);
    let upper = add_box(&mut world, 1.5);

    let initial = total_energy(&world);
    for step in 0..300 {
        world.update(DT);
        let energy = total_energy(&world);
        assert!(energy <= initial + 0.05, "step {step}: energy {energy} > {initial}");
    }

    let slop = world.config().solver.slop;
    for manifold in world.manifolds() {
        assert!(
            manifold.max_penetration() <= slop + 0.02,
            "penetration {} between {:?} and {:?}",
            manifold.max_penetration(),
            manifold.body_a,
            manifold.body_b
        );
    }

    let lower = world.body(lower).unwrap().position();
    let upper = world.body(upper).unwrap().position();
    assert_abs_diff_eq!(lower.y, 0.5, epsilon = 0.03);
    assert_abs_diff_eq!(upper.y, 1.5, epsilon = 0.05);
    assert_abs_diff_eq!(upper.x, 0.0, epsilon = 0.05);
    assert_abs_diff_eq!(upper.z, 0.0, epsilon = 0.05);
}

#[test]
fn resting_body_sleeps_and_wakes_on_impulse() {
    let mut world = World::default();
    add_floor(&mut world);
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
    let rest_y = world.body(ball).unwrap().position().y;

    world.apply_impulse(ball, Vec3::new(0.0, 5.0, 0.0));
    assert!(!world.body(ball).unwrap().is_sleeping());

    world.update(DT);
    let body = world.body(ball).unwrap();
    assert!(!body.is_sleeping());
    assert!(body.position().y > rest_y);
}

#[test]
fn sleeping_body_wakes_on_force() {
    let mut world = World::default();
    add_floor(&mut world);
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

    world.apply_force(ball, Vec3::new(100.0, 0.0, 0.0));
    world.update(DT);

    let body = world.body(ball).unwrap();
    assert!(!body.is_sleeping());
    assert!(body.linear_velocity().x > 0.0);
}

#[test]
fn static_and_kinematic_bodies_ignore_forces() {
    let mut world = World::default();
    let fixed = world.add_rigid_body(RigidBodyDesc::fixed().with_position(Vec3::new(1.0, 2.0, 3.0)));
    let kinematic = world.add_rigid_body(RigidBodyDesc::kinematic().with_position(Vec3::new(-1.0, 2.0, 3.0)));

    for _ in 0..30 {
        world.apply_force(fixed, Vec3::new(0.0, 1000.0, 0.0));
        world.apply_force(kinematic, Vec3::new(0.0, 1000.0, 0.0));
        world.apply_torque(kinematic, Vec3::new(50.0, 0.0, 0.0));
        world.apply_impulse(kinematic, Vec3::new(10.0, 0.0, 0.0));
        world.update(DT);
    }

    assert_eq!(world.body(fixed).unwrap().position(), Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(world.body(kinematic).unwrap().position(), Vec3::new(-1.0, 2.0, 3.0));
    assert_eq!(world.body(kinematic).unwrap().orientation(), Quat::IDENTITY);
}

#[test]
fn kinematic_body_follows_its_velocity_and_pushes_dynamic_bodies() {
    let mut world = World::default();
    world.set_gravity(Vec3::ZERO);
    let pusher = world.add_rigid_body(
        RigidBodyDesc::kinematic()
            .with_shape(Shape::cuboid(Vec3::splat(0.5)))
            .with_linear_velocity(Vec3::new(2.0, 0.0, 0.0)),
    );
    let ball = world.add_rigid_body(
        RigidBodyDesc::dynamic()
            .with_shape(Shape::sphere(0.5))
            .with_position(Vec3::new(1.5, 0.0, 0.0)),
    );

    for _ in 0..60 {
        world.update(DT);
    }

    assert_abs_diff_eq!(world.body(pusher).unwrap().position().x, 2.0, epsilon = 1e-3);
    assert!(world.body(ball).unwrap().position().x > 2.5);
}

#[test]
fn removing_support_lets_body_fall() {
    let mut world = World::default();
    let floor = add_floor(&mut world);
    let top = add_box(&mut world, 0.5);
    for _ in 0..300 {
        world.update(DT);
    }
    assert!(world.body(top).unwrap().is_sleeping());

    world.remove_rigid_body(floor);
    assert!(!world.body(top).unwrap().is_sleeping());
    for _ in 0..30 {
        world.update(DT);
    }
    assert!(world.body(top).unwrap().position().y < 0.0);
}
