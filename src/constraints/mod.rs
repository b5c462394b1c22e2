//! Velocity constraints: contacts and joints.
//!
//! Joints are solved alongside contacts in the same sequential-impulse
//! loop. Each joint is a set of [`ConstraintRow`]s rebuilt every step.

mod contact_constraint;
mod distance;
mod hinge;
mod row;

pub use contact_constraint::ContactConstraint;
pub use distance::{DistanceJoint, DistanceMode};
pub use hinge::{HingeJoint, HingeLimits, HingeMotor};
pub use row::ConstraintRow;

use crate::collision::BodyHandle;
use crate::dynamics::RigidBody;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Handle to a joint stored in a [`JointSet`]. Slots are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointHandle(u32);

impl JointHandle {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A joint between a body and another body or the world
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Joint {
    Distance(DistanceJoint),
    Hinge(HingeJoint),
}

impl From<DistanceJoint> for Joint {
    fn from(joint: DistanceJoint) -> Self {
        Self::Distance(joint)
    }
}

impl From<HingeJoint> for Joint {
    fn from(joint: HingeJoint) -> Self {
        Self::Hinge(joint)
    }
}

impl Joint {
    pub fn body_a(&self) -> BodyHandle {
        match self {
            Self::Distance(j) => j.body_a,
            Self::Hinge(j) => j.body_a,
        }
    }

    /// Second body, or `None` for a world anchor
    pub fn body_b(&self) -> Option<BodyHandle> {
        match self {
            Self::Distance(j) => j.body_b,
            Self::Hinge(j) => j.body_b,
        }
    }

    pub fn involves(&self, body: BodyHandle) -> bool {
        self.body_a() == body || self.body_b() == Some(body)
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Distance(j) => j.enabled,
            Self::Hinge(j) => j.enabled,
        }
    }

    pub fn is_broken(&self) -> bool {
        match self {
            Self::Distance(j) => j.broken,
            Self::Hinge(j) => j.broken,
        }
    }

    /// Enables or disables the joint. Broken joints stay disabled.
    pub fn set_enabled(&mut self, enabled: bool) {
        let enabled = enabled && !self.is_broken();
        match self {
            Self::Distance(j) => j.enabled = enabled,
            Self::Hinge(j) => j.enabled = enabled,
        }
        if !enabled {
            self.reset_impulses();
        }
    }

    pub fn break_force(&self) -> f32 {
        match self {
            Self::Distance(j) => j.break_force,
            Self::Hinge(j) => j.break_force,
        }
    }

    pub fn as_distance(&self) -> Option<&DistanceJoint> {
        match self {
            Self::Distance(j) => Some(j),
            Self::Hinge(_) => None,
        }
    }

    pub fn as_hinge(&self) -> Option<&HingeJoint> {
        match self {
            Self::Hinge(j) => Some(j),
            Self::Distance(_) => None,
        }
    }

    pub(crate) fn bind(&mut self, body_a: &RigidBody, body_b: Option<&RigidBody>) {
        if let Self::Hinge(j) = self {
            j.bind(body_a, body_b);
        }
    }

    pub(crate) fn prepare(
        &mut self,
        body_a: &RigidBody,
        body_b: Option<&RigidBody>,
        dt: f32,
        baumgarte: f32,
        warm_start_factor: f32,
    ) {
        match self {
            Self::Distance(j) => j.prepare(body_a, body_b, dt, baumgarte, warm_start_factor),
            Self::Hinge(j) => j.prepare(body_a, body_b, dt, baumgarte, warm_start_factor),
        }
    }

    pub(crate) fn warm_start(&self, body_a: &mut RigidBody, body_b: Option<&mut RigidBody>) {
        match self {
            Self::Distance(j) => j.warm_start(body_a, body_b),
            Self::Hinge(j) => j.warm_start(body_a, body_b),
        }
    }

    pub(crate) fn solve(&mut self, body_a: &mut RigidBody, body_b: Option<&mut RigidBody>) {
        match self {
            Self::Distance(j) => j.solve(body_a, body_b),
            Self::Hinge(j) => j.solve(body_a, body_b),
        }
    }

    /// Marks the joint broken when the force it held over the last step
    /// exceeds its break force. Returns true if it broke just now.
    pub(crate) fn check_break(&mut self, dt: f32) -> bool {
        if self.is_broken() || !self.break_force().is_finite() || dt <= 0.0 {
            return false;
        }
        let force = match self {
            Self::Distance(j) => j.applied_force(dt),
            Self::Hinge(j) => j.applied_force(dt),
        };
        if force <= self.break_force() {
            return false;
        }

        match self {
            Self::Distance(j) => j.broken = true,
            Self::Hinge(j) => j.broken = true,
        }
        self.set_enabled(false);
        true
    }

    fn reset_impulses(&mut self) {
        match self {
            Self::Distance(j) => j.reset_impulses(),
            Self::Hinge(j) => j.reset_impulses(),
        }
    }
}

/// Joint storage addressed by [`JointHandle`]
#[derive(Debug, Clone, Default)]
pub struct JointSet {
    slots: Vec<Option<Joint>>,
    len: usize,
}

impl JointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, joint: Joint) -> JointHandle {
        let handle = JointHandle(self.slots.len() as u32);
        self.slots.push(Some(joint));
        self.len += 1;
        handle
    }

    pub fn remove(&mut self, handle: JointHandle) -> Option<Joint> {
        let joint = self.slots.get_mut(handle.index())?.take()?;
        self.len -= 1;
        Some(joint)
    }

    pub fn get(&self, handle: JointHandle) -> Option<&Joint> {
        self.slots.get(handle.index())?.as_ref()
    }

    pub fn get_mut(&mut self, handle: JointHandle) -> Option<&mut Joint> {
        self.slots.get_mut(handle.index())?.as_mut()
    }

    pub fn contains(&self, handle: JointHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Removes every joint attached to `body`, returning their handles
    pub fn remove_attached(&mut self, body: BodyHandle) -> Vec<JointHandle> {
        let mut removed = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(|j| j.involves(body)) {
                *slot = None;
                removed.push(JointHandle(index as u32));
            }
        }
        self.len -= removed.len();
        removed
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointHandle, &Joint)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|j| (JointHandle(i as u32), j)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (JointHandle, &mut Joint)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|j| (JointHandle(i as u32), j)))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.len = 0;
    }
}
