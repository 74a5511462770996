//! Stream source bookkeeping and content access for texture uploads.

use std::collections::BTreeSet;

use super::*;
use crate::core::ids::IviSurfaceId;
use crate::core::surface::{BufferKind, GpuImage};

/// Changes of the set of ivi-ids that have content, since the last dispatch.
///
/// A source that appears and vanishes again between two dispatches never
/// shows up in `new` nor in `obsolete`. `vanished` collects ivi-ids whose
/// binding or surface went away, with or without content.
#[derive(Debug, Default)]
pub struct StreamSourceSets {
    updated: BTreeSet<IviSurfaceId>,
    new: BTreeSet<IviSurfaceId>,
    obsolete: BTreeSet<IviSurfaceId>,
    known: BTreeSet<IviSurfaceId>,
    vanished: BTreeSet<IviSurfaceId>,
}

impl StreamSourceSets {
    /// Content was committed for a bound source.
    pub fn add_source(&mut self, id: IviSurfaceId) {
        self.updated.insert(id);
        if self.known.insert(id) {
            self.new.insert(id);
        }
    }

    /// A source lost its content, its binding or its surface.
    pub fn remove_source(&mut self, id: IviSurfaceId) {
        if !self.new.remove(&id) && self.known.contains(&id) {
            self.obsolete.insert(id);
        }
        self.updated.remove(&id);
        self.known.remove(&id);
    }

    /// The binding of a source ended.
    pub fn source_unbound(&mut self, id: IviSurfaceId) {
        self.remove_source(id);
        self.vanished.insert(id);
    }

    pub fn has_updated(&self) -> bool {
        !self.updated.is_empty()
    }

    pub fn dispatch_updated(&mut self) -> BTreeSet<IviSurfaceId> {
        std::mem::take(&mut self.updated)
    }

    pub fn dispatch_new(&mut self) -> BTreeSet<IviSurfaceId> {
        std::mem::take(&mut self.new)
    }

    pub fn dispatch_obsolete(&mut self) -> BTreeSet<IviSurfaceId> {
        std::mem::take(&mut self.obsolete)
    }

    pub fn dispatch_vanished(&mut self) -> BTreeSet<IviSurfaceId> {
        std::mem::take(&mut self.vanished)
    }

    pub fn is_known(&self, id: IviSurfaceId) -> bool {
        self.known.contains(&id)
    }
}

/// Pixel content of a committed buffer, borrowed for an upload.
#[derive(Debug)]
pub enum BufferContent<'a> {
    Shm {
        bytes: &'a [u8],
        width: i32,
        height: i32,
        stride: i32,
        format: u32,
    },
    Gpu(&'a GpuImage),
}

impl CompositorState {
    /// Pin the committed buffer of a source for the frame in flight.
    ///
    /// Returns the buffer and whether its type changed since the last upload.
    pub fn pin_content_for_upload(&mut self, ivi_id: IviSurfaceId) -> Option<(BufferId, bool)> {
        let surface_id = self.ivi.resolve(ivi_id)?;
        let surface = self.surfaces.get_mut(&surface_id)?;
        let buffer = surface.committed_buffer()?;
        let type_changed = surface.take_buffer_type_changed();
        self.pin_for_render(buffer);
        Some((buffer, type_changed))
    }

    pub fn buffer_content(&self, id: BufferId) -> Option<BufferContent<'_>> {
        let buffer = self.buffers.get(id)?;
        match &buffer.kind {
            BufferKind::Shm(data) => {
                let entry = self.shm_pools.get(&data.pool)?;
                let bytes = entry.pool.bytes(data.offset as usize, data.byte_len())?;
                Some(BufferContent::Shm {
                    bytes,
                    width: data.width,
                    height: data.height,
                    stride: data.stride,
                    format: data.format,
                })
            }
            BufferKind::GpuBacked(image) => Some(BufferContent::Gpu(image)),
        }
    }

    /// Post a fatal error on a buffer whose content could not be imported.
    pub fn post_buffer_error(&self, id: BufferId, message: &str) {
        use wayland_server::Resource;

        if let Some(resource) = self.buffers.get(id).and_then(|b| b.resource.as_ref()) {
            tracing::error!("Buffer {}: {}", id, message);
            resource.post_error(0u32, message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_and_detach_in_one_interval_coalesce() {
        let mut sets = StreamSourceSets::default();
        sets.add_source(IviSurfaceId(5));
        sets.remove_source(IviSurfaceId(5));
        assert!(sets.dispatch_new().is_empty());
        assert!(sets.dispatch_obsolete().is_empty());
        assert!(sets.dispatch_updated().is_empty());
    }

    #[test]
    fn test_transitions_across_dispatches() {
        let mut sets = StreamSourceSets::default();
        sets.add_source(IviSurfaceId(5));
        assert_eq!(sets.dispatch_new().into_iter().collect::<Vec<_>>(), vec![IviSurfaceId(5)]);
        assert!(sets.has_updated());
        sets.dispatch_updated();
        assert!(!sets.has_updated());

        sets.add_source(IviSurfaceId(5));
        assert!(sets.dispatch_new().is_empty());

        sets.remove_source(IviSurfaceId(5));
        assert_eq!(sets.dispatch_obsolete().into_iter().collect::<Vec<_>>(), vec![IviSurfaceId(5)]);
        assert!(!sets.is_known(IviSurfaceId(5)));
    }

    #[test]
    fn test_unbound_source_vanishes_without_content() {
        let mut sets = StreamSourceSets::default();
        sets.source_unbound(IviSurfaceId(4));
        assert!(sets.dispatch_obsolete().is_empty());
        assert_eq!(sets.dispatch_vanished().into_iter().collect::<Vec<_>>(), vec![IviSurfaceId(4)]);
        assert!(sets.dispatch_vanished().is_empty());

        sets.add_source(IviSurfaceId(4));
        sets.dispatch_new();
        sets.source_unbound(IviSurfaceId(4));
        assert_eq!(sets.dispatch_obsolete().into_iter().collect::<Vec<_>>(), vec![IviSurfaceId(4)]);
        assert_eq!(sets.dispatch_vanished().into_iter().collect::<Vec<_>>(), vec![IviSurfaceId(4)]);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut sets = StreamSourceSets::default();
        sets.remove_source(IviSurfaceId(9));
        assert!(sets.dispatch_obsolete().is_empty());
    }
}
