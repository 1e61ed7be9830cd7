//! Live handle bookkeeping.
//!
//! A sparse set over `u32` handles: a dense array of live handles for
//! iteration and a sparse handle-indexed array pointing into it. Insert,
//! remove and lookup are O(1); removal swaps the last dense entry into the gap.

/// Set of live mesh handles.
#[derive(Debug, Default, Clone)]
pub struct SparseSet {
    dense: Vec<u32>,
    sparse: Vec<Option<u32>>,
}

impl SparseSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handle`. Returns false if it was already present.
    pub fn insert(&mut self, handle: u32) -> bool {
        if self.contains(handle) {
            return false;
        }
        let index = handle as usize;
        if index >= self.sparse.len() {
            self.sparse.resize(index + 1, None);
        }
        self.sparse[index] = Some(self.dense.len() as u32);
        self.dense.push(handle);
        true
    }

    /// Removes `handle`. Returns false if it was not present.
    pub fn remove(&mut self, handle: u32) -> bool {
        let Some(position) = self.sparse.get_mut(handle as usize).and_then(Option::take) else {
            return false;
        };
        let position = position as usize;
        self.dense.swap_remove(position);
        if let Some(&moved) = self.dense.get(position) {
            self.sparse[moved as usize] = Some(position as u32);
        }
        true
    }

    /// Whether `handle` is live.
    pub fn contains(&self, handle: u32) -> bool {
        matches!(self.sparse.get(handle as usize), Some(Some(_)))
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Whether no handle is live.
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Live handles in dense (unspecified) order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.dense.iter().copied()
    }
}
