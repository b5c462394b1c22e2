//! Character controller example
//!
//! A capsule walks across a floor, climbs a low step, stops at a wall and
//! jumps. The controller state is printed every few frames.

use impulse3d::prelude::*;

fn main() {
    println!("impulse3d - Character Walk Example");
    println!("==================================\n");

    let mut world = World::default();

    // Floor with its top at y = 0
    world.add_rigid_body(
        RigidBodyDesc::fixed()
            .with_shape(Shape::cuboid(Vec3::new(20.0, 0.5, 5.0)))
            .with_position(Vec3::new(0.0, -0.5, 0.0)),
    );
    // A 0.2 high step starting at x = 3
    world.add_rigid_body(
        RigidBodyDesc::fixed()
            .with_shape(Shape::cuboid(Vec3::new(2.0, 0.1, 5.0)))
            .with_position(Vec3::new(5.0, 0.1, 0.0)),
    );
    // A wall at x = 9
    world.add_rigid_body(
        RigidBodyDesc::fixed()
            .with_shape(Shape::cuboid(Vec3::new(0.5, 2.0, 5.0)))
            .with_position(Vec3::new(9.5, 2.0, 0.0)),
    );

    let config = CharacterConfig::default();
    let mut character = CharacterController::new(&mut world, Vec3::new(0.0, config.half_height(), 0.0), config);

    let dt = 1.0 / 60.0;
    let walk_speed = 3.0;

    for frame in 0..300 {
        let displacement = Vec3::new(walk_speed * dt, 0.0, 0.0);
        if let Err(err) = character.move_character(&mut world, displacement, dt) {
            eprintln!("character lost: {err}");
            return;
        }
        if frame == 240 && character.jump(5.0) {
            println!("  jump!");
        }
        world.update(dt);

        if frame % 20 == 0 {
            let position = character.position(&world).unwrap_or_default();
            println!(
                "frame {:3}: position=({:.2}, {:.2}, {:.2}) state={:?} grounded={}",
                frame,
                position.x,
                position.y,
                position.z,
                character.state(),
                character.is_grounded()
            );
        }
    }
}
