//! Sub-allocation of the shared face buffer.
//!
//! The face buffer is one array of packed quads shared by every handle. Each
//! handle owns one contiguous region of it. Regions are handed out first-fit
//! in multiples of [`REGION_GRANULE`] quads, and released regions are merged
//! with their free neighbours so the buffer does not fragment into slivers.

/// Regions are sized in multiples of this many quads.
pub const REGION_GRANULE: u32 = 32;

/// A contiguous run of quads in the face buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Region {
    /// First quad.
    pub offset: u32,
    /// Quads in the region.
    pub len: u32,
}

impl Region {
    fn end(&self) -> u32 {
        self.offset + self.len
    }
}

/// Free list over a face buffer of `capacity` quads.
#[derive(Debug, Clone)]
pub struct FaceRegions {
    /// Free regions sorted by offset, never adjacent to each other.
    free: Vec<Region>,
    capacity: u32,
}

impl FaceRegions {
    /// All `capacity` quads free.
    pub fn new(capacity: u32) -> Self {
        let free = if capacity > 0 {
            vec![Region {
                offset: 0,
                len: capacity,
            }]
        } else {
            Vec::new()
        };
        Self { free, capacity }
    }

    /// `quads` rounded up to a whole number of granules.
    pub fn rounded(quads: u32) -> u32 {
        quads.div_ceil(REGION_GRANULE) * REGION_GRANULE
    }

    /// Takes the first free region that can hold `quads`.
    pub fn allocate(&mut self, quads: u32) -> Option<Region> {
        let len = Self::rounded(quads);
        if len == 0 {
            return None;
        }
        let index = self.free.iter().position(|r| r.len >= len)?;
        let found = self.free[index];
        if found.len == len {
            self.free.remove(index);
        } else {
            self.free[index] = Region {
                offset: found.offset + len,
                len: found.len - len,
            };
        }
        Some(Region {
            offset: found.offset,
            len,
        })
    }

    /// Returns a region to the free list, merging it with free neighbours.
    pub fn release(&mut self, region: Region) {
        debug_assert!(region.end() <= self.capacity);
        let index = self.free.partition_point(|r| r.offset < region.offset);
        self.free.insert(index, region);

        if index + 1 < self.free.len() && self.free[index].end() == self.free[index + 1].offset {
            self.free[index].len += self.free[index + 1].len;
            self.free.remove(index + 1);
        }
        if index > 0 && self.free[index - 1].end() == self.free[index].offset {
            self.free[index - 1].len += self.free[index].len;
            self.free.remove(index);
        }
    }

    /// Extends the managed range to `capacity` quads; the new tail is free.
    pub fn grow(&mut self, capacity: u32) {
        if capacity <= self.capacity {
            return;
        }
        let tail = Region {
            offset: self.capacity,
            len: capacity - self.capacity,
        };
        self.capacity = capacity;
        self.release(tail);
    }

    /// Quads the buffer holds.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Quads not owned by any region.
    pub fn free_quads(&self) -> u32 {
        self.free.iter().map(|r| r.len).sum()
    }

    /// Size of the largest free region.
    pub fn largest_free(&self) -> u32 {
        self.free.iter().map(|r| r.len).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fit_rounds_to_granules() {
        let mut regions = FaceRegions::new(256);
        let a = regions.allocate(1).unwrap();
        let b = regions.allocate(33).unwrap();
        assert_eq!(a, Region { offset: 0, len: 32 });
        assert_eq!(b, Region { offset: 32, len: 64 });
        assert_eq!(regions.free_quads(), 160);
        assert_eq!(regions.allocate(0), None);
    }

    #[test]
    fn released_neighbours_coalesce() {
        let mut regions = FaceRegions::new(128);
        let a = regions.allocate(32).unwrap();
        let b = regions.allocate(32).unwrap();
        let c = regions.allocate(32).unwrap();

        regions.release(a);
        regions.release(c);
        assert_eq!(regions.largest_free(), 64);

        regions.release(b);
        assert_eq!(regions.largest_free(), 128);
        assert_eq!(regions.allocate(128), Some(Region { offset: 0, len: 128 }));
    }

    #[test]
    fn growth_extends_the_last_free_region() {
        let mut regions = FaceRegions::new(64);
        let _held = regions.allocate(32).unwrap();
        assert_eq!(regions.allocate(64), None);

        regions.grow(96);
        assert_eq!(regions.largest_free(), 64);
        assert_eq!(regions.allocate(64), Some(Region { offset: 32, len: 64 }));
        assert_eq!(regions.capacity(), 96);
    }
}
