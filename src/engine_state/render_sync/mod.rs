//! # Render Sync Bridge
//!
//! The only path from producer threads to the thread that owns the GPU.
//!
//! ## Two channels
//! - **Commands**: producers enqueue closures over the render context without
//!   blocking. The render thread drains the queue once per frame, in
//!   submission order, before it draws. A producer that needs an answer (a
//!   freshly minted mesh handle) uses [`RenderSyncBridge::execute_sync`] and
//!   spins until the command ran or the bridge shut down.
//! - **Frame state**: the camera matrices travel through a blocking
//!   ping-pong [`FrameHandshake`], so the render thread always draws with the
//!   most recently handed-off view.
//!
//! Producers never hold a backend, a buffer or an allocator. Everything that
//! touches one is a command executed by the render thread.

use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use cgmath::{Matrix4, Point3, SquareMatrix};
use log::{debug, info};

pub mod command_queue;
pub mod frame_handshake;

pub use command_queue::{CommandQueue, DrainReport, RenderCommand};
pub use frame_handshake::FrameHandshake;

use super::{
    buffer_state::BufferState,
    config::AllocatorConfig,
    error::{BridgeError, GpuError},
    rendering::{
        backend::{GpuBackend, HeadlessBackend},
        meshing::MeshSlotAllocator,
        texture::TextureTable,
        QUAD_SHADER,
    },
};

/// Everything the render thread owns and commands operate on.
pub struct RenderContext {
    /// GPU mesh storage.
    pub allocator: MeshSlotAllocator,
    /// Texture layers per block and side.
    pub textures: TextureTable,
}

impl RenderContext {
    /// Loads textures into `backend` and builds the mesh allocator on it.
    ///
    /// Without a texture directory every block gets its own sequential layer.
    pub fn new(
        backend: Box<dyn GpuBackend>,
        config: &AllocatorConfig,
        texture_directory: Option<&Path>,
    ) -> Result<Self, GpuError> {
        let mut buffer_state = BufferState::new(backend);
        let textures = match texture_directory {
            Some(directory) => TextureTable::load(buffer_state.backend_mut(), directory),
            None => TextureTable::sequential(),
        };
        let allocator = MeshSlotAllocator::new(buffer_state, config, QUAD_SHADER)?;
        Ok(Self {
            allocator,
            textures,
        })
    }

    /// A context over an unlimited [`HeadlessBackend`].
    pub fn headless(config: &AllocatorConfig) -> Result<Self, GpuError> {
        Self::new(Box::new(HeadlessBackend::new()), config, None)
    }
}

/// Per-frame state handed from the simulation thread to the render thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    /// Frame number assigned by the producer.
    pub frame: u64,
    /// Camera view matrix.
    pub view: Matrix4<f32>,
    /// Camera projection matrix.
    pub projection: Matrix4<f32>,
    /// Streaming focal point.
    pub focal: Point3<f32>,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            frame: 0,
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
            focal: Point3::new(0.0, 0.0, 0.0),
        }
    }
}

/// Shared between producers and the render thread behind an `Arc`.
pub struct RenderSyncBridge<C = RenderContext> {
    commands: CommandQueue<C>,
    frames: FrameHandshake<FrameState>,
    shut_down: AtomicBool,
}

impl<C: 'static> RenderSyncBridge<C> {
    /// A new bridge, ready to be cloned into producer threads.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            commands: CommandQueue::new(),
            frames: FrameHandshake::new(FrameState::default()),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Enqueues `command` for the next drain. Never blocks on the render thread.
    pub fn execute<F>(&self, command: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut C) -> Result<(), GpuError> + Send + 'static,
    {
        if self.is_shut_down() {
            return Err(BridgeError::ShutDown);
        }
        self.commands.push(Box::new(command));
        Ok(())
    }

    /// Enqueues `command` and spins until the render thread ran it.
    ///
    /// # Errors
    /// [`BridgeError::ShutDown`] if the bridge shuts down before the command
    /// ran, [`BridgeError::Command`] if the command itself failed.
    pub fn execute_sync<R, F>(&self, command: F) -> Result<R, BridgeError>
    where
        R: Send + 'static,
        F: FnOnce(&mut C) -> Result<R, GpuError> + Send + 'static,
    {
        let done = Arc::new(AtomicBool::new(false));
        let result = Arc::new(Mutex::new(None));

        {
            let done = done.clone();
            let result = result.clone();
            self.execute(move |context| {
                *result.lock().unwrap() = Some(command(context));
                done.store(true, Ordering::Release);
                Ok(())
            })?;
        }

        let mut spins = 0u32;
        while !done.load(Ordering::Acquire) {
            if self.is_shut_down() {
                return Err(BridgeError::ShutDown);
            }
            spins += 1;
            if spins < 64 {
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }

        let outcome = result.lock().unwrap().take();
        match outcome {
            Some(outcome) => Ok(outcome?),
            None => Err(BridgeError::ShutDown),
        }
    }

    /// Render thread: runs every queued command against `context`.
    pub fn drain(&self, context: &mut C) -> DrainReport {
        let report = self.commands.drain(context);
        if report.executed > 0 {
            debug!(
                "drained {} render commands ({} failed)",
                report.executed,
                report.errors.len()
            );
        }
        report
    }

    /// Commands waiting for the next drain.
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Producer: blocks until the last frame was consumed, then hands off `state`.
    pub fn sync(&self, state: FrameState) -> Result<(), BridgeError> {
        self.frames.publish(state)
    }

    /// Render thread: blocks for the next frame state.
    pub fn wait_frame(&self) -> Result<FrameState, BridgeError> {
        self.frames.wait_frame()
    }

    /// Render thread: like [`wait_frame`](Self::wait_frame) with a deadline.
    pub fn wait_frame_timeout(&self, timeout: Duration) -> Result<Option<FrameState>, BridgeError> {
        self.frames.wait_frame_timeout(timeout)
    }

    /// Render thread: the frame handed off last has been drawn.
    pub fn frame_done(&self) {
        self.frames.frame_done();
    }

    /// Stops the bridge and wakes every waiter on both channels.
    ///
    /// Commands still queued are dropped unexecuted.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.frames.close();
        let dropped = self.commands.clear();
        info!("render sync bridge shut down, {} commands dropped", dropped);
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}
