//! # Error Types
//!
//! One error enum per concern. GPU failures are the only ones the render loop
//! treats as critical; everything else is reported back to the caller that
//! triggered it.

use std::path::PathBuf;

use cgmath::Point3;
use thiserror::Error;

/// Failures reported by a [`GpuBackend`](crate::engine_state::rendering::backend::GpuBackend)
/// or by the buffer registry on top of it.
#[derive(Debug, Error)]
pub enum GpuError {
    /// The device could not satisfy an allocation.
    #[error("out of GPU memory allocating {requested} bytes for '{label}'")]
    OutOfMemory {
        /// Buffer being created.
        label: String,
        /// Bytes requested.
        requested: u64,
    },

    /// A buffer name or handle that was never created or was already destroyed.
    #[error("unknown buffer '{0}'")]
    UnknownBuffer(String),

    /// A write or copy past the end of a buffer.
    #[error("write of {len} bytes at offset {offset} overruns buffer '{label}' ({size} bytes)")]
    WriteOutOfBounds {
        /// Buffer written to.
        label: String,
        /// Byte offset of the write.
        offset: u64,
        /// Length of the write.
        len: u64,
        /// Size of the buffer.
        size: u64,
    },

    /// Shader source was rejected.
    #[error("shader '{label}' failed to compile: {reason}")]
    ShaderCompilation {
        /// Shader label.
        label: String,
        /// Driver or validator message.
        reason: String,
    },

    /// A texture file could not be read or decoded.
    #[error("failed to load texture {path:?}: {reason}")]
    TextureLoad {
        /// File that failed.
        path: PathBuf,
        /// Decoder or I/O message.
        reason: String,
    },

    /// No adapter or device could be created.
    #[error("no usable graphics device: {0}")]
    DeviceUnavailable(String),

    /// A read-back mapping failed.
    #[error("buffer mapping failed: {0}")]
    BufferMap(String),

    /// A draw referenced a pipeline that was never compiled.
    #[error("unknown pipeline {0}")]
    UnknownPipeline(u32),

    /// A mesh handle that is not currently allocated.
    #[error("mesh handle {0} is not live")]
    InvalidHandle(u32),

    /// An indirect command reads outside the face buffer.
    #[error("invalid indirect draw: {0}")]
    InvalidDraw(String),
}

/// Failures loading or validating [`EngineConfig`](crate::engine_state::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("could not read config {path:?}")]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for the config schema.
    #[error("could not parse config")]
    Parse(#[from] serde_json::Error),

    /// The values parse but contradict each other.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures of world edits.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    /// The edit targets a chunk that is not currently resident at LOD 0.
    #[error("chunk {0:?} is not resident")]
    ChunkNotResident(Point3<i32>),
}

/// Failures of the render-sync bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The bridge was shut down before the handoff completed.
    #[error("render bridge shut down")]
    ShutDown,

    /// The command ran but returned an error.
    #[error("render command failed")]
    Command(#[from] GpuError),
}

/// Top-level error returned by [`run`](crate::run).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Critical GPU failure.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// Cross-thread handoff problem.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// A worker thread panicked.
    #[error("thread '{0}' panicked")]
    ThreadPanicked(&'static str),
}
