//! Flat-level residency by flood fill.
//!
//! The desired set is every chunk reachable from the focal chunk by 6-connected
//! steps while staying within `radius` (euclidean, in chunks). The fill is run
//! once to get the shape as offsets; after that a one-chunk step of the focal
//! point only touches the chunks entering and leaving the sphere, and a larger
//! jump rebuilds the whole set.

use std::collections::{HashSet, VecDeque};
use std::num::NonZeroUsize;

use cgmath::{Point3, Vector3};
use lru::LruCache;

use crate::engine_state::voxels::generator::VoxelGenerator;

/// Offsets of every chunk within `radius` of the origin, found by BFS.
pub fn flood_offsets(radius: i32) -> Vec<Vector3<i32>> {
    let within = |v: Vector3<i32>| v.x * v.x + v.y * v.y + v.z * v.z <= radius * radius;
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    let mut offsets = Vec::new();

    let start = Vector3::new(0, 0, 0);
    seen.insert(start);
    queue.push_back(start);
    while let Some(offset) = queue.pop_front() {
        offsets.push(offset);
        for step in [
            Vector3::unit_x(),
            -Vector3::unit_x(),
            Vector3::unit_y(),
            -Vector3::unit_y(),
            Vector3::unit_z(),
            -Vector3::unit_z(),
        ] {
            let next = offset + step;
            if within(next) && seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    offsets
}

/// Changes to the desired set.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrontierDelta {
    /// Chunks that became desired.
    pub entered: Vec<Point3<i32>>,
    /// Chunks that stopped being desired.
    pub left: Vec<Point3<i32>>,
}

/// Memo of generator "known empty" answers.
pub struct KnownEmptyCache {
    cache: LruCache<Point3<i32>, bool>,
}

impl KnownEmptyCache {
    /// A cache holding at most `capacity` answers.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Whether the LOD 0 chunk at `position` is known to be empty.
    pub fn is_known_empty(&mut self, generator: &dyn VoxelGenerator, position: Point3<i32>) -> bool {
        if let Some(&empty) = self.cache.get(&position) {
            return empty;
        }
        let empty = generator.is_region_known_empty(position, 0);
        self.cache.put(position, empty);
        empty
    }

    /// Answers currently cached.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// The desired set around the focal chunk.
pub struct Frontier {
    radius: i32,
    offsets: Vec<Vector3<i32>>,
    center: Option<Point3<i32>>,
    desired: HashSet<Point3<i32>>,
}

impl Frontier {
    /// An empty frontier of the given radius.
    pub fn new(radius: i32) -> Self {
        Self {
            radius,
            offsets: flood_offsets(radius),
            center: None,
            desired: HashSet::new(),
        }
    }

    /// Focal chunk of the current desired set.
    pub fn center(&self) -> Option<Point3<i32>> {
        self.center
    }

    /// Chunks currently desired.
    pub fn desired(&self) -> &HashSet<Point3<i32>> {
        &self.desired
    }

    /// Whether `position` is desired.
    pub fn contains(&self, position: &Point3<i32>) -> bool {
        self.desired.contains(position)
    }

    /// Recenters the frontier on `center` and reports what changed.
    pub fn recenter(&mut self, center: Point3<i32>) -> FrontierDelta {
        let Some(previous) = self.center else {
            self.center = Some(center);
            self.desired = self.offsets.iter().map(|o| center + *o).collect();
            return FrontierDelta {
                entered: self.desired.iter().copied().collect(),
                left: Vec::new(),
            };
        };
        if previous == center {
            return FrontierDelta::default();
        }
        self.center = Some(center);

        let step = center - previous;
        let one_step = step.x.abs() + step.y.abs() + step.z.abs() == 1;
        if one_step {
            self.step(previous, center)
        } else {
            self.rebuild(center)
        }
    }

    /// A unit move: the shifted sphere differs only in its leading and
    /// trailing shells.
    fn step(&mut self, previous: Point3<i32>, center: Point3<i32>) -> FrontierDelta {
        let mut delta = FrontierDelta::default();
        let step = center - previous;
        for offset in &self.offsets {
            let entering = center + *offset;
            if !self.offsets_contain(entering - previous) {
                self.desired.insert(entering);
                delta.entered.push(entering);
            }
            let leaving = previous + *offset;
            if !self.offsets_contain(leaving - center) {
                self.desired.remove(&leaving);
                delta.left.push(leaving);
            }
        }
        debug_assert_eq!(delta.entered.len(), delta.left.len(), "step {:?}", step);
        delta
    }

    fn rebuild(&mut self, center: Point3<i32>) -> FrontierDelta {
        let desired: HashSet<_> = self.offsets.iter().map(|o| center + *o).collect();
        let delta = FrontierDelta {
            entered: desired.difference(&self.desired).copied().collect(),
            left: self.desired.difference(&desired).copied().collect(),
        };
        self.desired = desired;
        delta
    }

    fn offsets_contain(&self, offset: Vector3<i32>) -> bool {
        offset.x * offset.x + offset.y * offset.y + offset.z * offset.z <= self.radius * self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::generator::{EmptyGenerator, HalfSpaceGenerator};
    use crate::engine_state::voxels::block::Block;

    #[test]
    fn flood_fill_matches_the_ball() {
        assert_eq!(flood_offsets(0).len(), 1);
        assert_eq!(flood_offsets(1).len(), 7);
        assert_eq!(flood_offsets(2).len(), 33);
    }

    #[test]
    fn unit_steps_match_a_full_rebuild() {
        let mut incremental = Frontier::new(3);
        incremental.recenter(Point3::new(0, 0, 0));
        let delta = incremental.recenter(Point3::new(0, 1, 0));
        assert!(!delta.entered.is_empty());
        assert_eq!(delta.entered.len(), delta.left.len());

        let mut rebuilt = Frontier::new(3);
        rebuilt.recenter(Point3::new(0, 1, 0));
        assert_eq!(incremental.desired(), rebuilt.desired());
    }

    #[test]
    fn large_jumps_diff_against_the_old_set() {
        let mut frontier = Frontier::new(1);
        frontier.recenter(Point3::new(0, 0, 0));
        let delta = frontier.recenter(Point3::new(10, 0, 0));
        assert_eq!(delta.entered.len(), 7);
        assert_eq!(delta.left.len(), 7);
        assert!(frontier.contains(&Point3::new(11, 0, 0)));
        assert!(!frontier.contains(&Point3::new(0, 0, 0)));
        assert_eq!(frontier.recenter(Point3::new(10, 0, 0)), FrontierDelta::default());
    }

    #[test]
    fn known_empty_answers_are_cached() {
        let generator = HalfSpaceGenerator {
            level: 0,
            block: Block::AIR,
        };
        let mut cache = KnownEmptyCache::new(2);
        assert!(cache.is_known_empty(&generator, Point3::new(0, 0, 0)));
        assert!(!cache.is_known_empty(&generator, Point3::new(0, -1, 0)));
        // Served from the cache, the empty generator is never asked.
        assert!(!cache.is_known_empty(&EmptyGenerator, Point3::new(0, -1, 0)));

        assert!(cache.is_known_empty(&generator, Point3::new(0, 3, 0)));
        assert_eq!(cache.len(), 2);
        // (0, 0, 0) was least recently used and got evicted.
        assert!(!cache.is_known_empty(&EmptyGenerator, Point3::new(0, -1, 0)));
        assert!(cache.is_known_empty(&EmptyGenerator, Point3::new(0, 0, 0)));
    }
}
