//! # Core Module
//!
//! Shared-ownership primitives used by the threads of the streaming pipeline.
//!
//! ## Key Components
//! - `MtResource`: `Arc<RwLock<T>>` wrapper used for the world index and the
//!   shared focal point, both of which are touched by the streaming thread and
//!   the simulation thread.
//!
//! ## Usage
//! ```rust
//! use voxel_streamer::core::MtResource;
//!
//! let counter = MtResource::new(0);
//! *counter.get_mut() += 1;
//! assert_eq!(*counter.get(), 1);
//! ```

pub mod mt_resource;

pub use mt_resource::MtResource;
