//! FIFO of deferred render-thread work.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::engine_state::error::GpuError;

/// A unit of work executed on the render thread against its context.
pub type RenderCommand<C> = Box<dyn FnOnce(&mut C) -> Result<(), GpuError> + Send>;

/// What one drain did.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Commands executed, failed ones included.
    pub executed: usize,
    /// Errors returned by commands, in execution order.
    pub errors: Vec<GpuError>,
}

impl DrainReport {
    /// Whether every command succeeded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Mutex-guarded queue of [`RenderCommand`]s.
///
/// Producers push without blocking on the consumer. The render thread swaps
/// the whole queue out under the lock and runs it outside the lock, so a
/// command that enqueues another one cannot deadlock; the new command runs on
/// the next drain.
pub struct CommandQueue<C> {
    commands: Mutex<VecDeque<RenderCommand<C>>>,
}

impl<C> CommandQueue<C> {
    /// An empty queue.
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends a command.
    pub fn push(&self, command: RenderCommand<C>) {
        self.commands.lock().unwrap().push_back(command);
    }

    /// Commands waiting for the next drain.
    pub fn len(&self) -> usize {
        self.commands.lock().unwrap().len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every queued command once, in submission order.
    pub fn drain(&self, context: &mut C) -> DrainReport {
        let pending = std::mem::take(&mut *self.commands.lock().unwrap());

        let mut report = DrainReport::default();
        for command in pending {
            report.executed += 1;
            if let Err(e) = command(context) {
                report.errors.push(e);
            }
        }
        report
    }

    /// Drops every queued command without running it.
    pub fn clear(&self) -> usize {
        let mut commands = self.commands.lock().unwrap();
        let dropped = commands.len();
        commands.clear();
        dropped
    }
}

impl<C> Default for CommandQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_submission_order_exactly_once() {
        let queue = CommandQueue::<Vec<u32>>::new();
        for value in 0..5 {
            queue.push(Box::new(move |log: &mut Vec<u32>| {
                log.push(value);
                Ok(())
            }));
        }

        let mut log = Vec::new();
        let report = queue.drain(&mut log);
        assert_eq!(report.executed, 5);
        assert!(report.is_clean());
        assert_eq!(log, vec![0, 1, 2, 3, 4]);

        assert_eq!(queue.drain(&mut log).executed, 0);
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn failures_are_reported_and_later_commands_still_run() {
        let queue = CommandQueue::<Vec<u32>>::new();
        queue.push(Box::new(|_: &mut Vec<u32>| {
            Err(GpuError::DeviceUnavailable("lost".to_string()))
        }));
        queue.push(Box::new(|log: &mut Vec<u32>| {
            log.push(7);
            Ok(())
        }));

        let mut log = Vec::new();
        let report = queue.drain(&mut log);
        assert_eq!(report.executed, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(log, vec![7]);
    }
}
