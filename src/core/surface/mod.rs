pub mod buffer;
pub mod commit;
pub mod shm;
pub mod surface;

pub use buffer::{Buffer, BufferClass, BufferKind, BufferRegistry, DmabufPlane, GpuImage, ShmBufferData};
pub use commit::{apply_commit, CommitOutcome, ContentChange, PendingAttach};
pub use shm::{validate_shm_buffer, ShmBufferError, ShmPool};
pub use surface::{ContentState, WaylandSurface};

#[cfg(test)]
pub mod tests;
