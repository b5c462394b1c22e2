//! Basic physics simulation example
//!
//! A small box stack and a ball settle on a floor while a pendulum swings
//! from a hinge. Collision events are printed as they happen.

use impulse3d::prelude::*;

/// Prints every contact start and end
struct EventPrinter;

impl CollisionListener for EventPrinter {
    fn on_collision_enter(&mut self, body_a: BodyHandle, body_b: BodyHandle, manifold: &ContactManifold) {
        println!(
            "  enter: {:?} <-> {:?} ({} points, depth {:.3})",
            body_a,
            body_b,
            manifold.len(),
            manifold.max_penetration()
        );
    }

    fn on_collision_exit(&mut self, body_a: BodyHandle, body_b: BodyHandle) {
        println!("  exit:  {:?} <-> {:?}", body_a, body_b);
    }
}

fn main() {
    println!("impulse3d - Basic Simulation Example");
    println!("====================================\n");

    let mut world = World::default();
    world.add_collision_listener(Box::new(EventPrinter));

    // Static floor with its top surface at y = 0
    world.add_rigid_body(
        RigidBodyDesc::fixed()
            .with_shape(Shape::cuboid(Vec3::new(10.0, 0.5, 10.0)))
            .with_position(Vec3::new(0.0, -0.5, 0.0)),
    );

    let boxes: Vec<BodyHandle> = (0..3)
        .map(|i| {
            world.add_rigid_body(
                RigidBodyDesc::dynamic()
                    .with_shape(Shape::cuboid(Vec3::splat(0.5)))
                    .with_position(Vec3::new(0.0, 0.5 + i as f32 * 1.05, 0.0))
                    .with_restitution(0.0),
            )
        })
        .collect();

    let ball = world.add_rigid_body(
        RigidBodyDesc::dynamic()
            .with_shape(Shape::sphere(0.5))
            .with_position(Vec3::new(3.0, 5.0, 0.0)),
    );

    // Pendulum: a hinge anchored to the world at (-3, 4, 0)
    let bob = world.add_rigid_body(
        RigidBodyDesc::dynamic()
            .with_shape(Shape::sphere(0.3))
            .with_position(Vec3::new(-1.5, 4.0, 0.0)),
    );
    let hinge = HingeJoint::new(bob, None, Vec3::new(-1.5, 0.0, 0.0), Vec3::new(-3.0, 4.0, 0.0), Vec3::Z)
        .and_then(|joint| world.add_joint(joint));
    let hinge = match hinge {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("failed to create pendulum: {err}");
            return;
        }
    };

    let dt = 1.0 / 60.0;
    let total_time = 4.0;
    let frames = (total_time / dt) as usize;
    println!("Simulating {} seconds ({} frames at {}Hz)...\n", total_time, frames, 1.0 / dt);

    for frame in 0..frames {
        world.update(dt);

        if frame % 60 == 0 {
            let t = world.time();
            let ball_y = world.body(ball).map(|b| b.position().y).unwrap_or_default();
            let top_y = boxes
                .last()
                .and_then(|&h| world.body(h))
                .map(|b| b.position().y)
                .unwrap_or_default();
            let angle = world.hinge_angle(hinge).unwrap_or_default();
            println!(
                "t={:.2}s: ball y={:.3}, top box y={:.3}, pendulum angle={:.1} deg",
                t,
                ball_y,
                top_y,
                angle.to_degrees()
            );
        }
    }

    let sleeping = world.bodies().filter(|b| b.is_sleeping()).count();
    println!("\n{} of {} bodies asleep after {:.1}s", sleeping, world.num_bodies(), world.time());
}
