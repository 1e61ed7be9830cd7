//! Per-pass work budget and pass cancellation.

use cgmath::{MetricSpace, Point3};

use crate::core::MtResource;

/// Operations a pass may run: a quarter of what is pending, clamped to
/// `[min_batch, max_batch]`, and never more than is pending.
pub fn pass_budget(pending: usize, min_batch: usize, max_batch: usize) -> usize {
    (pending / 4).clamp(min_batch, max_batch).min(pending)
}

/// Sorts items by ascending distance of their position to `focal`.
///
/// The sort is stable, so equally distant items keep their planning order.
pub fn sort_by_distance<T>(items: &mut [T], focal: Point3<f32>, position: impl Fn(&T) -> Point3<f32>) {
    items.sort_by(|a, b| {
        let da = position(a).distance2(focal);
        let db = position(b).distance2(focal);
        da.total_cmp(&db)
    });
}

/// Cancels a running pass once the live focal point strays too far from the
/// focal point the pass was planned for.
pub struct PassGuard<'a> {
    planned: Point3<f32>,
    live: Option<&'a MtResource<Point3<f32>>>,
    abort_distance: f32,
}

impl<'a> PassGuard<'a> {
    /// A guard for a pass planned around `planned`.
    ///
    /// Without a `live` focal source the pass never aborts.
    pub fn new(
        planned: Point3<f32>,
        live: Option<&'a MtResource<Point3<f32>>>,
        abort_distance: f32,
    ) -> Self {
        Self {
            planned,
            live,
            abort_distance,
        }
    }

    /// Whether the rest of the pass should be discarded.
    pub fn should_abort(&self) -> bool {
        self.live.is_some_and(|live| {
            let current = *live.get();
            current.distance(self.planned) > self.abort_distance
        })
    }
}
