use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A thread-safe, reference-counted resource container with read-write locking.
///
/// The streaming pipeline keeps exactly two long-lived values behind this type:
/// the [`World`](crate::engine_state::voxels::world::World) index and the
/// shared focal point read by the streaming thread while a pass is running.
/// Every lock taken through it is expected to be short: one chunk swap, one
/// focal read, one edit.
///
/// # Examples
///
/// ```
/// use std::thread;
/// use voxel_streamer::core::MtResource;
///
/// let focus = MtResource::new([0.0f32; 3]);
/// let writer = focus.clone();
///
/// thread::spawn(move || {
///     writer.get_mut()[1] = 12.5;
/// })
/// .join()
/// .unwrap();
///
/// assert_eq!(focus.get()[1], 12.5);
/// ```
///
/// # Panics
/// `get` and `get_mut` panic if another holder panicked while holding the
/// lock. A poisoned world means a producer died mid-swap, and the pipeline has
/// no way to recover the chunk it was writing.
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync> MtResource<T> {
    /// Wraps `resource` for shared access.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Returns a read guard over the contained value.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap()
    }

    /// Returns a write guard over the contained value.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap()
    }

    /// Number of live handles to the same value.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.resource)
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}
