//! Surface, buffer and ivi-id handling for the compositor.
//!
//! Contains `CompositorState` methods behind the wl_surface, wl_buffer and
//! ivi_application requests. Every change of a surface's content or binding
//! is mirrored into the stream source sets.

use wayland_server::backend::ClientId;
use wayland_server::protocol::wl_buffer::WlBuffer;
use wayland_server::protocol::wl_callback::WlCallback;
use wayland_server::protocol::wl_surface::WlSurface;

use super::*;
use crate::core::ids::IviSurfaceId;
use crate::core::ivi_application::{BindOutcome, IviBindError};
use crate::core::surface::{BufferKind, ContentState, PendingAttach};

impl CompositorState {
    // =========================================================================
    // Surface Management
    // =========================================================================

    /// Generate next surface ID
    pub fn next_surface_id(&mut self) -> SurfaceId {
        let id = SurfaceId::new(self.next_surface_id);
        self.next_surface_id += 1;
        id
    }

    pub fn add_surface(&mut self, id: SurfaceId, client_id: Option<ClientId>, resource: Option<WlSurface>) {
        self.surfaces
            .insert(id, WaylandSurface::new(id, client_id, resource));
        tracing::debug!("Added surface {}", id);
    }

    /// Tear down a surface: buffer references, ivi binding and stream source.
    pub fn destroy_surface(&mut self, id: SurfaceId) {
        let Some(mut surface) = self.surfaces.remove(&id) else {
            return;
        };
        surface.destroy(&mut self.buffers);

        if let Some(ivi_id) = self.ivi.unbind(id) {
            self.streams.source_unbound(ivi_id);
        }
        tracing::debug!("Removed surface {}", id);
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&WaylandSurface> {
        self.surfaces.get(&id)
    }

    pub fn surface_mut(&mut self, id: SurfaceId) -> Option<&mut WaylandSurface> {
        self.surfaces.get_mut(&id)
    }

    /// Surface currently bound to an ivi-id.
    pub fn surface_by_ivi_id(&self, ivi_id: IviSurfaceId) -> Option<&WaylandSurface> {
        self.ivi.resolve(ivi_id).and_then(|id| self.surfaces.get(&id))
    }

    pub fn attach_buffer(&mut self, id: SurfaceId, buffer: Option<BufferId>) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.attach(&mut self.buffers, buffer);
        }
    }

    pub fn queue_frame_callback(&mut self, id: SurfaceId, callback: WlCallback) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.add_frame_callback(callback);
        }
    }

    pub fn handle_surface_commit(&mut self, id: SurfaceId) {
        let Some(surface) = self.surfaces.get_mut(&id) else {
            tracing::warn!("Commit for unknown surface {}", id);
            return;
        };

        let new_content = matches!(surface.pending_attach(), PendingAttach::Buffer(_));
        let transition = surface.commit(&mut self.buffers);

        if let Some(ivi_id) = surface.ivi_id() {
            if new_content {
                self.streams.add_source(ivi_id);
            } else if transition == Some(ContentState::Removed) {
                self.streams.remove_source(ivi_id);
            }
        }
    }

    // =========================================================================
    // Buffers
    // =========================================================================

    pub fn add_buffer(&mut self, id: BufferId, kind: BufferKind, resource: Option<WlBuffer>) {
        tracing::debug!("Added buffer {} ({:?})", id, kind.class());
        self.buffers.insert_with_id(id, kind, resource);
    }

    /// wl_buffer destroyed: drop it from every surface that uses it.
    pub fn remove_buffer(&mut self, id: BufferId) {
        for surface in self.surfaces.values_mut() {
            if surface.buffer_destroyed(id) == Some(ContentState::Removed) {
                if let Some(ivi_id) = surface.ivi_id() {
                    self.streams.remove_source(ivi_id);
                }
            }
        }
        self.render_pinned.retain(|b| *b != id);

        if let Some(buffer) = self.buffers.remove(id) {
            if let BufferKind::Shm(data) = buffer.kind {
                self.collect_shm_pool(data.pool);
            }
        }
        tracing::debug!("Removed buffer {}", id);
    }

    // =========================================================================
    // ivi-id bindings
    // =========================================================================

    pub fn bind_ivi_id(&mut self, surface: SurfaceId, ivi_id: IviSurfaceId) -> Result<BindOutcome, IviBindError> {
        let outcome = self.ivi.bind_ivi_id(surface, ivi_id)?;
        if outcome == BindOutcome::Bound {
            if let Some(s) = self.surfaces.get_mut(&surface) {
                s.set_ivi_id(Some(ivi_id));
                if s.has_content() {
                    self.streams.add_source(ivi_id);
                }
            }
        }
        Ok(outcome)
    }

    /// ivi_surface destroyed. The binding goes with the last handle.
    pub fn release_ivi_surface(&mut self, ivi_id: IviSurfaceId, surface_id: SurfaceId) {
        // the surface may be gone and the id taken over by another one
        if self.ivi.resolve(ivi_id) != Some(surface_id) {
            return;
        }
        if !self.ivi.release_handle(ivi_id) {
            return;
        }
        if let Some(surface) = self.surfaces.get_mut(&surface_id) {
            surface.set_ivi_id(None);
        }
        self.streams.source_unbound(ivi_id);
    }

    // =========================================================================
    // Shell
    // =========================================================================

    pub fn set_surface_title(&mut self, id: SurfaceId, title: String) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            tracing::debug!("Surface {} title: {}", id, title);
            surface.set_title(title);
        }
    }
}
