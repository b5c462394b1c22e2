use std::collections::{HashMap, HashSet};

use crate::collision::contact::{BodyHandle, CollisionPair};
use crate::dynamics::{BodySet, RigidBody};
use crate::geometry::{Aabb, Ray};
use crate::math::Vec3;

use super::BroadPhaseConfig;

/// Cells a ray may walk before the query gives up and returns every body
const MAX_RAY_CELLS: usize = 512;

/// Integer coordinates of a grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellKey {
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Inclusive box of cells covered by one AABB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub min: CellKey,
    pub max: CellKey,
}

impl CellRange {
    /// Number of cells in the range, computed wide to avoid overflow
    pub fn cell_count(&self) -> u64 {
        let dx = (self.max.x as i64 - self.min.x as i64 + 1).max(0) as u64;
        let dy = (self.max.y as i64 - self.min.y as i64 + 1).max(0) as u64;
        let dz = (self.max.z as i64 - self.min.z as i64 + 1).max(0) as u64;
        dx.saturating_mul(dy).saturating_mul(dz)
    }

    pub fn iter(&self) -> impl Iterator<Item = CellKey> {
        let (min, max) = (self.min, self.max);
        (min.x..=max.x).flat_map(move |x| {
            (min.y..=max.y).flat_map(move |y| (min.z..=max.z).map(move |z| CellKey::new(x, y, z)))
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    aabb: Aabb,
    /// `None` for oversized bodies that live outside the grid
    range: Option<CellRange>,
}

/// Uniform spatial hash grid.
///
/// Every body is registered in each cell its AABB touches. Bodies covering
/// more than `max_cells_per_body` cells (or with non-finite bounds) are kept
/// in a separate list and tested against everything.
#[derive(Debug, Clone)]
pub struct SpatialHashBroadPhase {
    config: BroadPhaseConfig,
    cells: HashMap<CellKey, Vec<BodyHandle>>,
    entries: HashMap<BodyHandle, Entry>,
    oversized: Vec<BodyHandle>,
}

impl Default for SpatialHashBroadPhase {
    fn default() -> Self {
        Self::new(BroadPhaseConfig::default())
    }
}

impl SpatialHashBroadPhase {
    pub fn new(config: BroadPhaseConfig) -> Self {
        let config = BroadPhaseConfig {
            cell_size: if config.cell_size > 0.0 && config.cell_size.is_finite() {
                config.cell_size
            } else {
                BroadPhaseConfig::default().cell_size
            },
            max_cells_per_body: config.max_cells_per_body.max(1),
        };
        Self {
            config,
            cells: HashMap::new(),
            entries: HashMap::new(),
            oversized: Vec::new(),
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.config.cell_size
    }

    /// Number of tracked bodies
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of occupied cells
    #[inline]
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// The AABB the body was last registered with
    #[inline]
    pub fn body_aabb(&self, handle: BodyHandle) -> Option<Aabb> {
        self.entries.get(&handle).map(|e| e.aabb)
    }

    /// Cell containing `point`
    #[inline]
    pub fn cell_key(&self, point: Vec3) -> CellKey {
        let p = (point / self.config.cell_size).floor();
        CellKey::new(p.x as i32, p.y as i32, p.z as i32)
    }

    fn cell_range(&self, aabb: Aabb) -> Option<CellRange> {
        if !aabb.min.is_finite() || !aabb.max.is_finite() || aabb.is_empty() {
            return None;
        }
        let range = CellRange {
            min: self.cell_key(aabb.min),
            max: self.cell_key(aabb.max),
        };
        (range.cell_count() <= self.config.max_cells_per_body as u64).then_some(range)
    }

    /// Registers a body. Re-inserting a tracked body updates it instead.
    pub fn insert_body(&mut self, handle: BodyHandle, aabb: Aabb) {
        if self.entries.contains_key(&handle) {
            self.update_body(handle, aabb);
            return;
        }

        let range = self.cell_range(aabb);
        self.link(handle, range);
        self.entries.insert(handle, Entry { aabb, range });
    }

    /// Unregisters a body. Returns false if it was not tracked.
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        match self.entries.remove(&handle) {
            Some(entry) => {
                self.unlink(handle, entry.range);
                true
            }
            None => false,
        }
    }

    /// Stores the new AABB and moves the body between cells if its cell
    /// range changed. Returns true when cell membership changed.
    pub fn update_body(&mut self, handle: BodyHandle, aabb: Aabb) -> bool {
        let new_range = self.cell_range(aabb);
        let old_range = match self.entries.get_mut(&handle) {
            Some(entry) => {
                entry.aabb = aabb;
                entry.range
            }
            None => {
                self.insert_body(handle, aabb);
                return true;
            }
        };

        if old_range == new_range {
            return false;
        }

        self.unlink(handle, old_range);
        self.link(handle, new_range);
        if let Some(entry) = self.entries.get_mut(&handle) {
            entry.range = new_range;
        }
        true
    }

    /// Synchronizes the grid with the body set: refreshes every body with a
    /// shape and drops bodies that were removed or lost their shape.
    /// Returns the number of bodies whose cell membership changed.
    pub fn update_all_bodies(&mut self, bodies: &BodySet) -> usize {
        let stale: Vec<BodyHandle> = self
            .entries
            .keys()
            .copied()
            .filter(|&h| bodies.get(h).map_or(true, |b| b.shape().is_none()))
            .collect();

        let mut changed = 0;
        for handle in stale {
            self.remove_body(handle);
            changed += 1;
        }

        for body in bodies.iter() {
            if let Some(aabb) = body.world_aabb() {
                if self.update_body(body.handle(), aabb) {
                    changed += 1;
                }
            }
        }
        changed
    }

    fn link(&mut self, handle: BodyHandle, range: Option<CellRange>) {
        match range {
            Some(range) => {
                for key in range.iter() {
                    self.cells.entry(key).or_default().push(handle);
                }
            }
            None => self.oversized.push(handle),
        }
    }

    fn unlink(&mut self, handle: BodyHandle, range: Option<CellRange>) {
        match range {
            Some(range) => {
                for key in range.iter() {
                    if let Some(bucket) = self.cells.get_mut(&key) {
                        bucket.retain(|&h| h != handle);
                        if bucket.is_empty() {
                            self.cells.remove(&key);
                        }
                    }
                }
            }
            None => self.oversized.retain(|&h| h != handle),
        }
    }

    /// Emits every candidate pair exactly once, sorted.
    ///
    /// Pairs are dropped when either body has no shape, neither body is
    /// dynamic, neither body is active, or their AABBs do not overlap.
    pub fn find_potential_collisions(&self, bodies: &BodySet) -> Vec<CollisionPair> {
        let mut seen = HashSet::new();
        let mut pairs = Vec::new();

        let mut consider = |a: BodyHandle, b: BodyHandle| {
            if a == b {
                return;
            }
            let pair = CollisionPair::new(a, b);
            if !seen.insert(pair) {
                return;
            }
            if self.accepts(pair, bodies) {
                pairs.push(pair);
            }
        };

        for bucket in self.cells.values() {
            for (i, &a) in bucket.iter().enumerate() {
                for &b in &bucket[i + 1..] {
                    consider(a, b);
                }
            }
        }

        for &big in &self.oversized {
            for &other in self.entries.keys() {
                consider(big, other);
            }
        }

        pairs.sort_unstable();
        pairs
    }

    fn accepts(&self, pair: CollisionPair, bodies: &BodySet) -> bool {
        let (Some(a), Some(b)) = (bodies.get(pair.body_a), bodies.get(pair.body_b)) else {
            return false;
        };
        if !should_pair(a, b) {
            return false;
        }
        match (self.entries.get(&pair.body_a), self.entries.get(&pair.body_b)) {
            (Some(ea), Some(eb)) => ea.aabb.intersects(eb.aabb),
            _ => false,
        }
    }

    /// Bodies whose stored AABB overlaps `aabb`, sorted
    pub fn query_aabb(&self, aabb: Aabb) -> Vec<BodyHandle> {
        let mut found = HashSet::new();

        match self.cell_range(aabb) {
            Some(range) => {
                for key in range.iter() {
                    if let Some(bucket) = self.cells.get(&key) {
                        found.extend(bucket.iter().copied());
                    }
                }
                found.extend(self.oversized.iter().copied());
            }
            // A query larger than the cell budget scans every entry instead
            None => found.extend(self.entries.keys().copied()),
        }

        let mut result: Vec<BodyHandle> = found
            .into_iter()
            .filter(|h| self.entries.get(h).map_or(false, |e| e.aabb.intersects(aabb)))
            .collect();
        result.sort_unstable();
        result
    }

    /// Bodies whose stored AABB contains `point`, sorted
    pub fn query_point(&self, point: Vec3) -> Vec<BodyHandle> {
        let key = self.cell_key(point);
        let mut result: Vec<BodyHandle> = self
            .cells
            .get(&key)
            .into_iter()
            .flatten()
            .chain(self.oversized.iter())
            .copied()
            .filter(|h| self.entries.get(h).map_or(false, |e| e.aabb.contains_point(point)))
            .collect();
        result.sort_unstable();
        result.dedup();
        result
    }

    /// Bodies whose stored AABB is crossed by the ray, sorted.
    ///
    /// Walks the cells along the ray with a 3D DDA; if the walk would exceed
    /// its cell budget every tracked body is tested instead.
    pub fn query_ray(&self, ray: &Ray) -> Vec<BodyHandle> {
        let mut candidates: HashSet<BodyHandle> = self.oversized.iter().copied().collect();

        if !self.walk_ray(ray, &mut candidates) {
            candidates.extend(self.entries.keys().copied());
        }

        let mut result: Vec<BodyHandle> = candidates
            .into_iter()
            .filter(|h| {
                self.entries
                    .get(h)
                    .map_or(false, |e| e.aabb.ray_intersection(ray).is_some())
            })
            .collect();
        result.sort_unstable();
        result
    }

    /// Amanatides-Woo traversal. Returns false when the budget ran out.
    fn walk_ray(&self, ray: &Ray, out: &mut HashSet<BodyHandle>) -> bool {
        let cs = self.config.cell_size;
        let mut cell = self.cell_key(ray.origin);
        let mut coords = [cell.x, cell.y, cell.z];
        let mut step = [0i32; 3];
        let mut t_max = [f32::INFINITY; 3];
        let mut t_delta = [f32::INFINITY; 3];

        for axis in 0..3 {
            let d = ray.direction[axis];
            if d > 1e-8 {
                step[axis] = 1;
                let boundary = (coords[axis] as f32 + 1.0) * cs;
                t_max[axis] = (boundary - ray.origin[axis]) / d;
                t_delta[axis] = cs / d;
            } else if d < -1e-8 {
                step[axis] = -1;
                let boundary = coords[axis] as f32 * cs;
                t_max[axis] = (boundary - ray.origin[axis]) / d;
                t_delta[axis] = -cs / d;
            }
        }

        for _ in 0..MAX_RAY_CELLS {
            if let Some(bucket) = self.cells.get(&cell) {
                out.extend(bucket.iter().copied());
            }

            let axis = if t_max[0] <= t_max[1] && t_max[0] <= t_max[2] {
                0
            } else if t_max[1] <= t_max[2] {
                1
            } else {
                2
            };

            if t_max[axis] > ray.max_distance || !t_max[axis].is_finite() {
                return true;
            }

            coords[axis] += step[axis];
            t_max[axis] += t_delta[axis];
            cell = CellKey::new(coords[0], coords[1], coords[2]);
        }

        false
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.entries.clear();
        self.oversized.clear();
    }
}

/// Pair filter shared by the broad phase and the world: both bodies need a
/// shape, at least one must be dynamic and at least one must be active.
#[inline]
pub fn should_pair(a: &RigidBody, b: &RigidBody) -> bool {
    a.shape().is_some()
        && b.shape().is_some()
        && (a.is_dynamic() || b.is_dynamic())
        && (a.is_active() || b.is_active())
}
