//! Ray-guided brick streaming
//!
//! Key pieces:
//! - Load queue: rays append positions of bricks they need
//! - Residency: per-chunk GPU index and brick buffers in one device heap
//! - Timelines: `halt`, `load` and `processed` order the hand-off between
//!   the tracer and the world tick
//! - Deletion queue: replaced buffers are reclaimed once `processed` passes

pub mod timeline;
pub mod deletion_queue;
pub mod heap;
pub mod load_queue;
pub mod backend;
pub mod residency;
pub mod host;
pub mod manager;

pub use timeline::{SyncPoints, Timeline};
pub use deletion_queue::DeletionQueue;
pub use heap::{Allocation, HeapAllocator};
pub use load_queue::{HostLoadQueue, LoadRequests, DEFAULT_LOAD_QUEUE_CAPACITY};
pub use backend::{CopyRegion, IntegrateWork, LoadBatch, ScatterEntry, StreamingBackend};
pub use residency::{ChunkResidency, ResidencyManager, DEFAULT_STARTING_CAPACITY};
pub use host::{HostBackend, RayProbe};
pub use manager::{StreamingConfig, StreamingManager, StreamingStats, TickReport};

#[cfg(test)]
mod tests;
