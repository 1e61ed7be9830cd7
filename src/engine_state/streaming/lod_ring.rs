//! Fixed rings of reusable chunk slots, one ring per level of detail.
//!
//! Level `L` covers a 4x4x4 cube of chunks of edge `32 << L` anchored at an
//! origin derived from the focal point. Every level above 0 leaves out the
//! inner 2x2x2 of its cube, which is roughly the region the level below
//! covers, so the rings hold 64 slots at LOD 0 and 56 above.
//!
//! A ring never loads or evicts. When the origin moves, the slots whose
//! coordinate fell out of the cube are handed the targets nobody holds and
//! regenerate in place, keeping their mesh handle.

use cgmath::Point3;

use crate::engine_state::{
    rendering::meshing::MeshHandle,
    voxels::{chunk::CHUNK_DIMENSION, world::ChunkKey},
};

/// Edge of a ring cube, in chunks.
pub const RING_EDGE: i32 = 4;

/// Chunk edge in world units at `lod`.
pub fn lod_chunk_size(lod: u8) -> f32 {
    (CHUNK_DIMENSION << lod) as f32
}

/// Minimum corner of the ring cube at `lod`, in chunk coordinates at that level.
///
/// `floor((focal - half_span) / size) - 1` per axis, with `half_span` half a
/// chunk at that level. The focal point always lies in the inner 2x2x2.
pub fn ring_origin(focal: Point3<f32>, lod: u8) -> Point3<i32> {
    let size = lod_chunk_size(lod);
    let half_span = size / 2.0;
    let axis = |value: f32| ((value - half_span) / size).floor() as i32 - 1;
    Point3::new(axis(focal.x), axis(focal.y), axis(focal.z))
}

/// Whether a cube offset is a target at `lod`.
fn is_target(lod: u8, offset: [i32; 3]) -> bool {
    lod == 0 || !offset.iter().all(|o| (1..=2).contains(o))
}

/// Bit of an offset in the 64-bit cube mask.
fn offset_bit(offset: [i32; 3]) -> u32 {
    (offset[0] + RING_EDGE * (offset[1] + RING_EDGE * offset[2])) as u32
}

/// Target offsets at `lod`, in bit order.
fn target_offsets(lod: u8) -> Vec<[i32; 3]> {
    let mut offsets = Vec::with_capacity((RING_EDGE * RING_EDGE * RING_EDGE) as usize);
    for z in 0..RING_EDGE {
        for y in 0..RING_EDGE {
            for x in 0..RING_EDGE {
                if is_target(lod, [x, y, z]) {
                    offsets.push([x, y, z]);
                }
            }
        }
    }
    offsets
}

/// Number of slots at `lod`.
pub fn ring_size(lod: u8) -> usize {
    target_offsets(lod).len()
}

/// One reusable chunk slot.
#[derive(Debug, Clone, Default)]
pub struct RingSlot {
    /// Coordinate currently generated into the slot.
    pub position: Option<Point3<i32>>,
    /// Mesh handle owned by the slot for its whole life.
    pub handle: Option<MeshHandle>,
}

/// A slot that must regenerate at a new coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regeneration {
    /// Level of the slot.
    pub lod: u8,
    /// Slot index within its level.
    pub slot: usize,
    /// Coordinate being vacated.
    pub previous: Option<Point3<i32>>,
    /// Coordinate to generate.
    pub target: Point3<i32>,
}

impl Regeneration {
    /// World key of the target.
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            lod: self.lod,
            position: self.target,
        }
    }
}

/// Ring of one level.
#[derive(Debug, Clone)]
pub struct LodLevel {
    lod: u8,
    offsets: Vec<[i32; 3]>,
    slots: Vec<RingSlot>,
    origin: Option<Point3<i32>>,
    converged: bool,
    cursor: usize,
}

impl LodLevel {
    /// An unpopulated ring at `lod`.
    pub fn new(lod: u8) -> Self {
        let offsets = target_offsets(lod);
        Self {
            lod,
            slots: vec![RingSlot::default(); offsets.len()],
            offsets,
            origin: None,
            converged: false,
            cursor: 0,
        }
    }

    /// Level of detail of this ring.
    pub fn lod(&self) -> u8 {
        self.lod
    }

    /// The slots.
    pub fn slots(&self) -> &[RingSlot] {
        &self.slots
    }

    /// Current origin, once planned.
    pub fn origin(&self) -> Option<Point3<i32>> {
        self.origin
    }

    /// Whether every target was held after the last pass.
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Offset of `position` in the cube, if it is a target.
    fn target_bit(&self, origin: Point3<i32>, position: Point3<i32>) -> Option<u32> {
        let offset = [
            position.x - origin.x,
            position.y - origin.y,
            position.z - origin.z,
        ];
        let inside = offset.iter().all(|o| (0..RING_EDGE).contains(o));
        (inside && is_target(self.lod, offset)).then(|| offset_bit(offset))
    }

    /// Regenerations needed for `focal`, nearest slot scan first.
    ///
    /// Returns nothing if the origin did not move and the last pass converged.
    pub fn plan(&mut self, focal: Point3<f32>) -> Vec<Regeneration> {
        let origin = ring_origin(focal, self.lod);
        if self.origin == Some(origin) && self.converged {
            return Vec::new();
        }
        self.origin = Some(origin);

        let mut held = 0u64;
        let mut consistent = vec![false; self.slots.len()];
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(bit) = slot.position.and_then(|p| self.target_bit(origin, p)) else {
                continue;
            };
            if held & (1 << bit) == 0 {
                held |= 1 << bit;
                consistent[index] = true;
            }
        }

        let mut plans = Vec::new();
        let slot_count = self.slots.len();
        let mut scanned = 0;
        for offset in &self.offsets {
            if held & (1 << offset_bit(*offset)) != 0 {
                continue;
            }
            while scanned < slot_count && consistent[self.cursor] {
                self.cursor = (self.cursor + 1) % slot_count;
                scanned += 1;
            }
            if scanned == slot_count {
                break;
            }

            let slot = self.cursor;
            consistent[slot] = true;
            self.cursor = (self.cursor + 1) % slot_count;
            scanned += 1;
            plans.push(Regeneration {
                lod: self.lod,
                slot,
                previous: self.slots[slot].position,
                target: Point3::new(
                    origin.x + offset[0],
                    origin.y + offset[1],
                    origin.z + offset[2],
                ),
            });
        }

        self.converged = plans.is_empty();
        plans
    }

    /// Records that a slot now holds `target`.
    pub fn complete(&mut self, slot: usize, target: Point3<i32>) {
        self.slots[slot].position = Some(target);
    }

    /// Marks the ring converged once a pass ran every planned regeneration.
    pub fn set_converged(&mut self, converged: bool) {
        self.converged = converged;
    }
}

/// All rings of a manager.
#[derive(Debug, Clone)]
pub struct LodRing {
    levels: Vec<LodLevel>,
}

impl LodRing {
    /// Rings for LOD `0..levels`.
    pub fn new(levels: u8) -> Self {
        Self {
            levels: (0..levels).map(LodLevel::new).collect(),
        }
    }

    /// The levels, finest first.
    pub fn levels(&self) -> &[LodLevel] {
        &self.levels
    }

    /// Mutable level access.
    pub fn level_mut(&mut self, lod: u8) -> &mut LodLevel {
        &mut self.levels[lod as usize]
    }

    /// Total slots over all levels, the bound on GPU mesh handles.
    pub fn slot_count(&self) -> usize {
        self.levels.iter().map(|level| level.slots.len()).sum()
    }

    /// Slots that do not own a mesh handle yet.
    pub fn missing_handles(&self) -> usize {
        self.levels
            .iter()
            .flat_map(|level| level.slots.iter())
            .filter(|slot| slot.handle.is_none())
            .count()
    }

    /// Hands out `handles` to the slots without one, finest level first.
    pub fn install_handles(&mut self, handles: Vec<MeshHandle>) {
        let mut handles = handles.into_iter();
        for slot in self.levels.iter_mut().flat_map(|level| level.slots.iter_mut()) {
            if slot.handle.is_none() {
                slot.handle = handles.next();
            }
        }
    }

    /// Handle of a slot.
    pub fn handle(&self, lod: u8, slot: usize) -> Option<MeshHandle> {
        self.levels[lod as usize].slots[slot].handle
    }

    /// Regenerations over every level for `focal`.
    pub fn plan(&mut self, focal: Point3<f32>) -> Vec<Regeneration> {
        self.levels
            .iter_mut()
            .flat_map(|level| level.plan(focal))
            .collect()
    }
}
