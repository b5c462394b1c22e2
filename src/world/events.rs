use std::collections::BTreeSet;

use crate::collision::{BodyHandle, CollisionPair, ContactManifold};

/// A change in the contact state of a body pair over one `World::update`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionEvent {
    /// The pair started touching
    Enter(CollisionPair),
    /// The pair was touching before and still is
    Stay(CollisionPair),
    /// The pair stopped touching
    Exit(CollisionPair),
}

impl CollisionEvent {
    #[inline]
    pub fn pair(&self) -> CollisionPair {
        match *self {
            Self::Enter(pair) | Self::Stay(pair) | Self::Exit(pair) => pair,
        }
    }

    pub fn involves(&self, body: BodyHandle) -> bool {
        self.pair().contains(body)
    }
}

/// Receives contact transitions once per `World::update`.
///
/// All methods default to doing nothing, so listeners only implement what
/// they need.
pub trait CollisionListener {
    fn on_collision_enter(&mut self, _body_a: BodyHandle, _body_b: BodyHandle, _manifold: &ContactManifold) {}

    fn on_collision_stay(&mut self, _body_a: BodyHandle, _body_b: BodyHandle, _manifold: &ContactManifold) {}

    fn on_collision_exit(&mut self, _body_a: BodyHandle, _body_b: BodyHandle) {}
}

/// Diffs the set of touching pairs between updates
#[derive(Debug, Clone, Default)]
pub(crate) struct EventTracker {
    touching: BTreeSet<CollisionPair>,
    events: Vec<CollisionEvent>,
}

impl EventTracker {
    /// Replaces the touching set with `current` and records the transitions:
    /// enters and stays in pair order, then exits.
    pub fn update(&mut self, current: impl IntoIterator<Item = CollisionPair>) {
        let current: BTreeSet<CollisionPair> = current.into_iter().collect();

        self.events.clear();
        for pair in &current {
            if self.touching.contains(pair) {
                self.events.push(CollisionEvent::Stay(*pair));
            } else {
                self.events.push(CollisionEvent::Enter(*pair));
            }
        }
        for pair in self.touching.difference(&current) {
            self.events.push(CollisionEvent::Exit(*pair));
        }

        self.touching = current;
    }

    pub fn events(&self) -> &[CollisionEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn is_touching(&self, pair: &CollisionPair) -> bool {
        self.touching.contains(pair)
    }

    /// Drops a removed body without reporting an exit
    pub fn forget_body(&mut self, body: BodyHandle) {
        self.touching.retain(|pair| !pair.contains(body));
        self.events.retain(|event| !event.involves(body));
    }

    pub fn clear(&mut self) {
        self.touching.clear();
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(a: u32, b: u32) -> CollisionPair {
        CollisionPair::new(BodyHandle::new(a, 0), BodyHandle::new(b, 0))
    }

    #[test]
    fn test_enter_stay_exit_sequence() {
        let mut tracker = EventTracker::default();

        tracker.update([pair(0, 1)]);
        assert_eq!(tracker.events(), &[CollisionEvent::Enter(pair(0, 1))]);

        tracker.update([pair(1, 0), pair(2, 3)]);
        assert_eq!(
            tracker.events(),
            &[CollisionEvent::Stay(pair(0, 1)), CollisionEvent::Enter(pair(2, 3))]
        );

        tracker.update([]);
        assert_eq!(
            tracker.events(),
            &[CollisionEvent::Exit(pair(0, 1)), CollisionEvent::Exit(pair(2, 3))]
        );
        assert!(!tracker.is_touching(&pair(0, 1)));
    }

    #[test]
    fn test_forgotten_body_never_exits() {
        let mut tracker = EventTracker::default();
        tracker.update([pair(0, 1), pair(1, 2)]);
        tracker.forget_body(BodyHandle::new(0, 0));

        tracker.update([pair(1, 2)]);
        assert_eq!(tracker.events(), &[CollisionEvent::Stay(pair(1, 2))]);
    }
}
