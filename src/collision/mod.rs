pub mod broad_phase;
pub mod contact;
pub mod narrow_phase;

pub use broad_phase::{BroadPhaseConfig, SpatialHashBroadPhase};
pub use contact::{BodyHandle, CollisionPair, ContactManifold, ContactPoint, MAX_CONTACT_POINTS};
pub use narrow_phase::{collide_bodies, collide_shapes, detect_collision, ContactGeometry, ContactSample};
