use crate::collision::BodyHandle;

use super::rigid_body::{RigidBody, RigidBodyDesc};

/// Arena of rigid bodies addressed by generational handles.
///
/// Removing a body frees its slot for reuse and bumps the slot generation,
/// so stale handles resolve to `None` instead of a different body.
#[derive(Debug, Default, Clone)]
pub struct BodySet {
    slots: Vec<Option<RigidBody>>,
    generations: Vec<u32>,
    free_list: Vec<u32>,
    len: usize,
}

impl BodySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a body from `desc` and returns its handle
    pub fn insert(&mut self, desc: &RigidBodyDesc) -> BodyHandle {
        let handle = match self.free_list.pop() {
            Some(index) => BodyHandle::new(index, self.generations[index as usize]),
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(None);
                self.generations.push(0);
                BodyHandle::new(index, 0)
            }
        };

        self.slots[handle.index()] = Some(RigidBody::from_desc(handle, desc));
        self.len += 1;
        handle
    }

    /// Removes a body, returning it if the handle was live
    pub fn remove(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        if !self.contains(handle) {
            return None;
        }
        let index = handle.index();
        let body = self.slots[index].take();
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.free_list.push(index as u32);
        self.len -= 1;
        body
    }

    #[inline]
    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.get(handle).is_some()
    }

    #[inline]
    pub fn get(&self, handle: BodyHandle) -> Option<&RigidBody> {
        let index = handle.index();
        if self.generations.get(index) != Some(&handle.generation()) {
            return None;
        }
        self.slots.get(index)?.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        let index = handle.index();
        if self.generations.get(index) != Some(&handle.generation()) {
            return None;
        }
        self.slots.get_mut(index)?.as_mut()
    }

    /// Gets mutable references to two distinct bodies
    pub fn get2_mut(&mut self, a: BodyHandle, b: BodyHandle) -> Option<(&mut RigidBody, &mut RigidBody)> {
        if a.index() == b.index() || !self.contains(a) || !self.contains(b) {
            return None;
        }

        let (ia, ib) = (a.index(), b.index());
        if ia < ib {
            let (left, right) = self.slots.split_at_mut(ib);
            Some((left[ia].as_mut()?, right[0].as_mut()?))
        } else {
            let (left, right) = self.slots.split_at_mut(ia);
            Some((right[0].as_mut()?, left[ib].as_mut()?))
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over live bodies in slot order
    pub fn iter(&self) -> impl Iterator<Item = &RigidBody> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RigidBody> {
        self.slots.iter_mut().flatten()
    }

    /// Handles of all live bodies in slot order
    pub fn handles(&self) -> impl Iterator<Item = BodyHandle> + '_ {
        self.iter().map(RigidBody::handle)
    }

    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.take().is_some() {
                self.generations[index] = self.generations[index].wrapping_add(1);
                self.free_list.push(index as u32);
            }
        }
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    #[test]
    fn test_stale_handle_does_not_alias() {
        let mut set = BodySet::new();
        let a = set.insert(&RigidBodyDesc::dynamic());
        assert!(set.remove(a).is_some());

        let b = set.insert(&RigidBodyDesc::dynamic().with_position(Vec3::ONE));
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(set.get(a).is_none());
        assert_eq!(set.get(b).unwrap().position(), Vec3::ONE);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_get2_mut() {
        let mut set = BodySet::new();
        let a = set.insert(&RigidBodyDesc::dynamic());
        let b = set.insert(&RigidBodyDesc::fixed());

        let (ba, bb) = set.get2_mut(b, a).unwrap();
        assert!(ba.is_static());
        assert!(bb.is_dynamic());
        assert!(set.get2_mut(a, a).is_none());
        assert!(set.get2_mut(a, BodyHandle::INVALID).is_none());
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut set = BodySet::new();
        let a = set.insert(&RigidBodyDesc::dynamic());
        set.clear();
        assert!(set.is_empty());
        assert!(!set.contains(a));
        assert_eq!(set.iter().count(), 0);
    }
}
