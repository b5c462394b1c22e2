//! Error types for world construction and joint setup.
//!
//! The simulation step itself never fails; these errors only surface from
//! calls that take handles or build joints.

use thiserror::Error;

use crate::collision::BodyHandle;
use crate::constraints::JointHandle;

/// Errors returned by world and joint construction APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PhysicsError {
    /// The handle does not refer to a live body.
    #[error("body {0:?} does not exist")]
    InvalidBody(BodyHandle),

    /// The handle does not refer to a live joint.
    #[error("joint {0:?} does not exist")]
    InvalidJoint(JointHandle),

    /// A joint was built without its required first body.
    #[error("joint requires a valid first body")]
    MissingBody,

    /// Both joint ends reference the same body.
    #[error("joint connects body {0:?} to itself")]
    SelfJoint(BodyHandle),

    /// A character controller was attached to a body without a capsule shape.
    #[error("body {0:?} does not carry a capsule shape")]
    NotACapsule(BodyHandle),
}

/// Result type for fallible physics operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;
