use std::collections::HashMap;
use std::os::fd::OwnedFd;

use wayland_server::protocol::wl_buffer::WlBuffer;
use wayland_server::Resource;

use crate::core::ids::{BufferId, PoolId, SurfaceId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShmBufferData {
    pub pool: PoolId,
    pub offset: i32,
    pub width: i32,
    pub height: i32,
    pub stride: i32,
    pub format: u32,
}

impl ShmBufferData {
    /// Number of bytes the buffer covers inside its pool.
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }
}

#[derive(Debug)]
pub struct DmabufPlane {
    pub fd: OwnedFd,
    pub plane_idx: u32,
    pub offset: u32,
    pub stride: u32,
}

/// Externally owned GPU image (linux-dmabuf planes).
#[derive(Debug)]
pub struct GpuImage {
    pub width: i32,
    pub height: i32,
    pub fourcc: u32,
    pub modifier: u64,
    pub planes: Vec<DmabufPlane>,
}

/// Backing storage of a client buffer.
#[derive(Debug)]
pub enum BufferKind {
    Shm(ShmBufferData),
    GpuBacked(GpuImage),
}

/// Coarse buffer type, used to detect switches between SHM and GPU content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferClass {
    Shm,
    GpuBacked,
}

impl BufferKind {
    pub fn class(&self) -> BufferClass {
        match self {
            BufferKind::Shm(_) => BufferClass::Shm,
            BufferKind::GpuBacked(_) => BufferClass::GpuBacked,
        }
    }

    pub fn dimensions(&self) -> (i32, i32) {
        match self {
            BufferKind::Shm(data) => (data.width, data.height),
            BufferKind::GpuBacked(image) => (image.width, image.height),
        }
    }
}

/// A client buffer and its usage accounting.
///
/// `surface_refs` counts surfaces holding the buffer as pending or committed
/// content, `render_pins` counts renders that sampled it and have not completed.
/// The wire release is sent once per use, when both drop to zero.
#[derive(Debug)]
pub struct Buffer {
    pub id: BufferId,
    pub kind: BufferKind,
    pub resource: Option<WlBuffer>,
    surface_refs: u32,
    render_pins: u32,
    in_use: bool,
    release_count: u64,
}

impl Buffer {
    pub fn new(id: BufferId, kind: BufferKind, resource: Option<WlBuffer>) -> Self {
        Self {
            id,
            kind,
            resource,
            surface_refs: 0,
            render_pins: 0,
            in_use: false,
            release_count: 0,
        }
    }

    pub fn surface_refs(&self) -> u32 {
        self.surface_refs
    }

    pub fn render_pins(&self) -> u32 {
        self.render_pins
    }

    /// Attached since the last release.
    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    /// Total number of release events sent for this buffer.
    pub fn release_count(&self) -> u64 {
        self.release_count
    }

    fn is_unused(&self) -> bool {
        self.surface_refs == 0 && self.render_pins == 0
    }

    /// Notify the client that the buffer is no longer being used
    fn release(&mut self) {
        if let Some(resource) = &self.resource {
            if resource.is_alive() {
                resource.release();
                tracing::debug!("wl_buffer.release sent for buffer {}", self.id);
            } else {
                tracing::debug!("Buffer {} resource dead, release not sent", self.id);
            }
        }
        self.in_use = false;
        self.release_count += 1;
    }
}

/// Owns all client buffers of the compositor.
#[derive(Debug, Default)]
pub struct BufferRegistry {
    buffers: HashMap<BufferId, Buffer>,
    next_id: u32,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id for a buffer whose resource is created afterwards.
    pub fn allocate_id(&mut self) -> BufferId {
        self.next_id += 1;
        BufferId::new(self.next_id)
    }

    pub fn insert_with_id(&mut self, id: BufferId, kind: BufferKind, resource: Option<WlBuffer>) {
        self.buffers.insert(id, Buffer::new(id, kind, resource));
    }

    /// Register a new buffer and return its id.
    pub fn insert(&mut self, kind: BufferKind, resource: Option<WlBuffer>) -> BufferId {
        let id = self.allocate_id();
        self.insert_with_id(id, kind, resource);
        id
    }

    /// Attach a buffer to a surface, taking a surface reference on it.
    pub fn attach(&mut self, surface: SurfaceId, id: BufferId) -> Option<&Buffer> {
        let buffer = self.buffers.get_mut(&id)?;
        buffer.surface_refs += 1;
        buffer.in_use = true;
        tracing::trace!("Buffer {} attached to surface {} (refs={})", id, surface, buffer.surface_refs);
        Some(buffer)
    }

    /// Drop a surface reference and release the buffer if nothing else holds it.
    ///
    /// Returns true if a release was sent.
    pub fn detach(&mut self, surface: SurfaceId, id: BufferId) -> bool {
        let Some(buffer) = self.buffers.get_mut(&id) else {
            return false;
        };
        if buffer.surface_refs == 0 {
            tracing::error!("Buffer {} detached from surface {} without reference", id, surface);
            return false;
        }
        buffer.surface_refs -= 1;
        self.release_if_unused(id)
    }

    /// Keep a buffer alive for a render that has not completed yet.
    pub fn pin(&mut self, id: BufferId) {
        if let Some(buffer) = self.buffers.get_mut(&id) {
            buffer.render_pins += 1;
        }
    }

    /// Drop a render pin. Returns true if the buffer got released.
    pub fn unpin(&mut self, id: BufferId) -> bool {
        let Some(buffer) = self.buffers.get_mut(&id) else {
            return false;
        };
        if buffer.render_pins == 0 {
            tracing::error!("Buffer {} unpinned without pin", id);
            return false;
        }
        buffer.render_pins -= 1;
        self.release_if_unused(id)
    }

    /// Send the release event if the buffer is in use but referenced by nobody.
    ///
    /// Idempotent: a buffer already released is left alone.
    pub fn release_if_unused(&mut self, id: BufferId) -> bool {
        match self.buffers.get_mut(&id) {
            Some(buffer) if buffer.in_use && buffer.is_unused() => {
                buffer.release();
                true
            }
            _ => false,
        }
    }

    /// Forget a buffer whose wl_buffer was destroyed.
    pub fn remove(&mut self, id: BufferId) -> Option<Buffer> {
        self.buffers.remove(&id)
    }

    pub fn get(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(&id)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Number of buffers still backed by the given SHM pool.
    pub fn count_in_pool(&self, pool: PoolId) -> usize {
        self.buffers
            .values()
            .filter(|b| matches!(&b.kind, BufferKind::Shm(data) if data.pool == pool))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shm_kind() -> BufferKind {
        BufferKind::Shm(ShmBufferData {
            pool: PoolId(1),
            offset: 0,
            width: 4,
            height: 4,
            stride: 16,
            format: 0,
        })
    }

    #[test]
    fn test_release_only_after_last_reference() {
        let mut registry = BufferRegistry::new();
        let id = registry.insert(shm_kind(), None);

        registry.attach(SurfaceId(1), id);
        registry.attach(SurfaceId(2), id);
        assert!(!registry.detach(SurfaceId(1), id));
        assert!(registry.get(id).unwrap().is_in_use());
        assert!(registry.detach(SurfaceId(2), id));
        assert!(!registry.get(id).unwrap().is_in_use());
        assert_eq!(registry.get(id).unwrap().release_count(), 1);
    }

    #[test]
    fn test_render_pin_defers_release() {
        let mut registry = BufferRegistry::new();
        let id = registry.insert(shm_kind(), None);

        registry.attach(SurfaceId(1), id);
        registry.pin(id);
        assert!(!registry.detach(SurfaceId(1), id));
        assert!(registry.get(id).unwrap().is_in_use());
        assert!(registry.unpin(id));
        assert_eq!(registry.get(id).unwrap().release_count(), 1);
    }

    #[test]
    fn test_release_if_unused_is_idempotent() {
        let mut registry = BufferRegistry::new();
        let id = registry.insert(shm_kind(), None);

        // never attached: nothing to release
        assert!(!registry.release_if_unused(id));

        registry.attach(SurfaceId(1), id);
        assert!(registry.detach(SurfaceId(1), id));
        assert!(!registry.release_if_unused(id));
        assert!(!registry.release_if_unused(id));
        assert_eq!(registry.get(id).unwrap().release_count(), 1);
    }

    #[test]
    fn test_unbalanced_detach_is_ignored() {
        let mut registry = BufferRegistry::new();
        let id = registry.insert(shm_kind(), None);
        assert!(!registry.detach(SurfaceId(1), id));
        assert!(!registry.unpin(id));
        assert_eq!(registry.get(id).unwrap().release_count(), 0);
    }

    #[test]
    fn test_reuse_after_release_releases_again() {
        let mut registry = BufferRegistry::new();
        let id = registry.insert(shm_kind(), None);

        for _ in 0..3 {
            registry.attach(SurfaceId(1), id);
            assert!(registry.detach(SurfaceId(1), id));
        }
        assert_eq!(registry.get(id).unwrap().release_count(), 3);
    }

    #[test]
    fn test_count_in_pool() {
        let mut registry = BufferRegistry::new();
        registry.insert(shm_kind(), None);
        registry.insert(shm_kind(), None);
        assert_eq!(registry.count_in_pool(PoolId(1)), 2);
        assert_eq!(registry.count_in_pool(PoolId(2)), 0);
    }
}
