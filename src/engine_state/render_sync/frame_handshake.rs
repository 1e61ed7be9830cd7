//! Blocking single-slot handoff of per-frame state.
//!
//! One producer and one consumer alternate on a shared record guarded by a
//! mutex and a condition variable:
//!
//! ```text
//! producer: wait sync  -> write state -> trigger = true  -> notify
//! consumer: wait trigger -> copy state -> (render) -> sync = true -> notify
//! ```
//!
//! `sync` starts out set, so the first publish never waits.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::engine_state::error::BridgeError;

struct Slot<T> {
    state: T,
    trigger: bool,
    sync: bool,
    closed: bool,
}

/// Ping-pong handoff of a `T` between two threads.
pub struct FrameHandshake<T> {
    slot: Mutex<Slot<T>>,
    signal: Condvar,
}

impl<T: Clone> FrameHandshake<T> {
    /// A handshake holding `initial`, ready for the first publish.
    pub fn new(initial: T) -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: initial,
                trigger: false,
                sync: true,
                closed: false,
            }),
            signal: Condvar::new(),
        }
    }

    /// Producer side. Blocks until the previous state was consumed, then
    /// publishes `state`.
    pub fn publish(&self, state: T) -> Result<(), BridgeError> {
        let mut slot = self
            .signal
            .wait_while(self.slot.lock().unwrap(), |slot| !slot.sync && !slot.closed)
            .unwrap();
        if slot.closed {
            return Err(BridgeError::ShutDown);
        }

        slot.state = state;
        slot.sync = false;
        slot.trigger = true;
        self.signal.notify_all();
        Ok(())
    }

    /// Consumer side. Blocks until a state was published and takes a copy.
    pub fn wait_frame(&self) -> Result<T, BridgeError> {
        let mut slot = self
            .signal
            .wait_while(self.slot.lock().unwrap(), |slot| !slot.trigger && !slot.closed)
            .unwrap();
        if slot.closed {
            return Err(BridgeError::ShutDown);
        }
        slot.trigger = false;
        Ok(slot.state.clone())
    }

    /// Consumer side with a deadline. `Ok(None)` when nothing arrived in time.
    pub fn wait_frame_timeout(&self, timeout: Duration) -> Result<Option<T>, BridgeError> {
        let (mut slot, result) = self
            .signal
            .wait_timeout_while(self.slot.lock().unwrap(), timeout, |slot| {
                !slot.trigger && !slot.closed
            })
            .unwrap();
        if slot.closed {
            return Err(BridgeError::ShutDown);
        }
        if result.timed_out() && !slot.trigger {
            return Ok(None);
        }
        slot.trigger = false;
        Ok(Some(slot.state.clone()))
    }

    /// Consumer side. Marks the copied state as consumed, releasing the producer.
    pub fn frame_done(&self) {
        let mut slot = self.slot.lock().unwrap();
        slot.sync = true;
        self.signal.notify_all();
    }

    /// Wakes every waiter; all later calls fail with [`BridgeError::ShutDown`].
    pub fn close(&self) {
        let mut slot = self.slot.lock().unwrap();
        slot.closed = true;
        self.signal.notify_all();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.slot.lock().unwrap().closed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn producer_and_consumer_alternate() {
        let handshake = Arc::new(FrameHandshake::new(0u32));
        let producer = {
            let handshake = handshake.clone();
            thread::spawn(move || {
                for frame in 1..=50 {
                    handshake.publish(frame).unwrap();
                }
            })
        };

        let mut seen = Vec::new();
        for _ in 0..50 {
            seen.push(handshake.wait_frame().unwrap());
            handshake.frame_done();
        }
        producer.join().unwrap();

        // Every publish waited for the previous frame_done, so nothing was
        // overwritten before it was read.
        assert_eq!(seen, (1..=50).collect::<Vec<_>>());
    }

    #[test]
    fn close_wakes_a_blocked_producer() {
        let handshake = Arc::new(FrameHandshake::new(0u32));
        handshake.publish(1).unwrap();

        let producer = {
            let handshake = handshake.clone();
            thread::spawn(move || handshake.publish(2))
        };
        thread::sleep(Duration::from_millis(20));
        handshake.close();

        assert!(matches!(producer.join().unwrap(), Err(BridgeError::ShutDown)));
        assert!(matches!(handshake.wait_frame(), Err(BridgeError::ShutDown)));
    }

    #[test]
    fn timed_wait_reports_no_frame() {
        let handshake = FrameHandshake::new(5u8);
        assert_eq!(
            handshake.wait_frame_timeout(Duration::from_millis(5)).unwrap(),
            None
        );
        handshake.publish(6).unwrap();
        assert_eq!(
            handshake.wait_frame_timeout(Duration::from_millis(5)).unwrap(),
            Some(6)
        );
    }
}
