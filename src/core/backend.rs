//! Embedded compositor backends.
//!
//! The renderer talks to the compositor through [`EmbeddedCompositor`]. The
//! backend is picked from a constructor table; a Wayland backend that cannot
//! start is replaced by [`NullCompositor`] so rendering goes on without
//! stream texture content.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::core::compositor::EmbeddedCompositorServer;
use crate::core::config::EmbeddedCompositingConfig;
use crate::core::ids::{IviSurfaceId, TextureHandle};
use crate::stream::uploader::TextureUploader;

/// Compositor as seen by the stream texture manager.
pub trait EmbeddedCompositor {
    /// One non-blocking pass: accept clients, dispatch their requests.
    fn handle_requests_from_clients(&mut self);

    /// Finish a render tick. `notify_clients` means the frame completed.
    fn end_frame(&mut self, notify_clients: bool);

    /// Block until a client is active or `timeout` passed.
    fn wait_for_client_activity(&mut self, timeout: Duration) -> bool;

    fn has_updated_stream_texture_sources(&self) -> bool;
    fn dispatch_updated_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId>;
    fn dispatch_new_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId>;
    fn dispatch_obsolete_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId>;
    /// ivi-ids whose binding or surface ended since the last call.
    fn dispatch_vanished_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId>;

    /// Upload the committed buffer of `source` into `texture`.
    ///
    /// Returns the number of frames committed since the last finished frame.
    fn upload_compositing_content_for_stream_texture(
        &mut self,
        source: IviSurfaceId,
        texture: TextureHandle,
        uploader: &mut dyn TextureUploader,
    ) -> u32;

    fn is_content_available_for_stream_texture(&self, source: IviSurfaceId) -> bool;
    /// Whether a live surface is bound to `source`, with or without content.
    fn has_surface_for_stream_texture(&self, source: IviSurfaceId) -> bool;
    fn committed_frames_since_start(&self, source: IviSurfaceId) -> u64;
    fn compositor_connection_count(&self) -> u32;
    fn is_buffer_attached_to_surface(&self, source: IviSurfaceId) -> bool;
    fn title_of_surface(&self, source: IviSurfaceId) -> Option<String>;

    fn log_infos(&self);
}

/// Compositor without clients. Every source is unavailable.
#[derive(Debug, Default)]
pub struct NullCompositor;

impl EmbeddedCompositor for NullCompositor {
    fn handle_requests_from_clients(&mut self) {}

    fn end_frame(&mut self, _notify_clients: bool) {}

    fn wait_for_client_activity(&mut self, timeout: Duration) -> bool {
        std::thread::sleep(timeout);
        false
    }

    fn has_updated_stream_texture_sources(&self) -> bool {
        false
    }

    fn dispatch_updated_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId> {
        BTreeSet::new()
    }

    fn dispatch_new_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId> {
        BTreeSet::new()
    }

    fn dispatch_obsolete_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId> {
        BTreeSet::new()
    }

    fn dispatch_vanished_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId> {
        BTreeSet::new()
    }

    fn upload_compositing_content_for_stream_texture(
        &mut self,
        _source: IviSurfaceId,
        _texture: TextureHandle,
        _uploader: &mut dyn TextureUploader,
    ) -> u32 {
        0
    }

    fn is_content_available_for_stream_texture(&self, _source: IviSurfaceId) -> bool {
        false
    }

    fn has_surface_for_stream_texture(&self, _source: IviSurfaceId) -> bool {
        false
    }

    fn committed_frames_since_start(&self, _source: IviSurfaceId) -> u64 {
        0
    }

    fn compositor_connection_count(&self) -> u32 {
        0
    }

    fn is_buffer_attached_to_surface(&self, _source: IviSurfaceId) -> bool {
        false
    }

    fn title_of_surface(&self, _source: IviSurfaceId) -> Option<String> {
        None
    }

    fn log_infos(&self) {
        crate::wlog!(crate::util::logging::COMPOSITOR, "Embedded compositor disabled (dummy backend)");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositorBackend {
    Wayland,
    Dummy,
}

type Constructor = fn(EmbeddedCompositingConfig) -> anyhow::Result<Box<dyn EmbeddedCompositor>>;

fn create_wayland(config: EmbeddedCompositingConfig) -> anyhow::Result<Box<dyn EmbeddedCompositor>> {
    Ok(Box::new(EmbeddedCompositorServer::new(config)?))
}

fn create_dummy(_config: EmbeddedCompositingConfig) -> anyhow::Result<Box<dyn EmbeddedCompositor>> {
    Ok(Box::new(NullCompositor))
}

impl CompositorBackend {
    fn constructor(self) -> Constructor {
        match self {
            CompositorBackend::Wayland => create_wayland,
            CompositorBackend::Dummy => create_dummy,
        }
    }
}

/// Create the embedded compositor, falling back to the dummy backend.
pub fn create_embedded_compositor(
    backend: CompositorBackend,
    config: EmbeddedCompositingConfig,
) -> Box<dyn EmbeddedCompositor> {
    match backend.constructor()(config) {
        Ok(compositor) => compositor,
        Err(e) => {
            tracing::error!("Embedded compositor ({:?}) failed to start: {:#}", backend, e);
            tracing::warn!("Falling back to dummy embedded compositor");
            Box::new(NullCompositor)
        }
    }
}
