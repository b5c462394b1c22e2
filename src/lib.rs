//! # impulse3d
//!
//! A 3D rigid body physics engine written in Rust.
//!
//! ## Features
//!
//! - **Rigid Body Dynamics**: static, kinematic and dynamic bodies with sleeping
//! - **Collision Shapes**: Sphere, Box and Capsule primitives
//! - **Broad Phase**: uniform spatial hash grid with ray, point and box queries
//! - **Narrow Phase**: analytic and SAT contact generation with persistent manifolds
//! - **Constraint Solver**: sequential impulses with warm starting and position correction
//! - **Joints**: distance (rigid, limited or spring) and hinge (limits and motor) joints
//! - **Character Controller**: capsule movement with sliding, steps, slopes and platforms
//!
//! ## Quick Start
//!
//! ```rust
//! use impulse3d::prelude::*;
//!
//! // Create a physics world
//! let mut world = World::default();
//! world.set_gravity(Vec3::new(0.0, -9.81, 0.0));
//!
//! // Create a static floor whose top is at y = 0.5
//! world.add_rigid_body(
//!     RigidBodyDesc::fixed()
//!         .with_shape(Shape::cuboid(Vec3::new(10.0, 0.5, 10.0)))
//!         .with_position(Vec3::ZERO),
//! );
//!
//! // Create a dynamic ball
//! let ball = world.add_rigid_body(
//!     RigidBodyDesc::dynamic()
//!         .with_shape(Shape::sphere(0.5))
//!         .with_position(Vec3::new(0.0, 5.0, 0.0)),
//! );
//!
//! // Simulation loop
//! for _ in 0..600 {
//!     world.update(1.0 / 60.0);
//! }
//!
//! let y = world.body(ball).map(|b| b.position().y).unwrap_or_default();
//! assert!((y - 1.0).abs() < 0.05);
//! ```

pub mod character;
pub mod collision;
pub mod constraints;
pub mod dynamics;
pub mod error;
pub mod geometry;
pub mod math;
pub mod solver;
mod world;

pub use error::{PhysicsError, Result};
pub use world::{CollisionEvent, CollisionListener, RaycastHit, World, WorldConfig, DEFAULT_TIMESTEP};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::character::{CharacterConfig, CharacterController, CharacterState};
    pub use crate::collision::{BodyHandle, CollisionPair, ContactManifold, ContactPoint};
    pub use crate::constraints::{DistanceJoint, HingeJoint, Joint, JointHandle};
    pub use crate::dynamics::{BodyType, RigidBody, RigidBodyDesc};
    pub use crate::error::{PhysicsError, Result};
    pub use crate::geometry::{Aabb, BoxShape, Capsule, Ray, Shape, ShapeType, Sphere};
    pub use crate::math::{Mat3, Quat, Transform, Vec3};
    pub use crate::solver::SolverConfig;
    pub use crate::world::{CollisionEvent, CollisionListener, RaycastHit, World, WorldConfig};
}
