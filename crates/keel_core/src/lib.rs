//! Keel Engine Core
//!
//! The object lifetime and indexing substrate the rest of the engine is
//! built on:
//! - Hierarchical bitmap index allocator
//! - Generational object pools with stable 32-bit handles
//! - Column-oriented archetype storage with projected views
//! - Injected memory allocators

pub mod archetype;
pub mod handle;
pub mod index_allocator;
pub mod memory;
pub mod pool;

pub use archetype::{
    Archetype, ArchetypeView, ArchetypeViewMut, Bundle, Component, ComponentSet, ViewSet,
};
pub use handle::Handle;
pub use index_allocator::IndexAllocator;
pub use memory::{Allocator, ChunkAllocator, SystemAllocator, TrackingAllocator};
pub use pool::{ObjectPool, PoolError};

// Re-export metrics from keel_metrics for convenience
pub use keel_metrics as metrics;

pub use glam;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
