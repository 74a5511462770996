//! Stream texture management.
//!
//! `StreamTextureManager` is the bridge between the embedded compositor and
//! the renderer. Once per render tick it lets the compositor dispatch client
//! requests, uploads newly committed buffers into one composited texture per
//! source and reports which scenes and link consumers have to redraw.
//!
//! A source is referenced either by stream textures of scenes or by stream
//! buffer links. The composited texture lives as long as any reference does.

pub mod links;
pub mod uploader;

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, BTreeSet};

use crate::core::backend::EmbeddedCompositor;
use crate::core::ids::{DisplayId, IviSurfaceId, SceneId, StreamTextureHandle, TextureHandle};
use crate::util::logging::STREAM;

pub use links::{LinkError, StreamBufferLink, StreamBufferLinks, StreamConsumer};
pub use uploader::{MemoryTextureStore, StoredTexture, TextureSource, TextureUploader};

/// Renderer side of one source.
#[derive(Debug)]
struct CompositedTexture {
    texture: TextureHandle,
    /// Stream textures of scenes, in reference order; duplicates allowed
    scene_refs: BTreeMap<SceneId, Vec<StreamTextureHandle>>,
    /// References by `ref_stream` and by links
    stream_refs: u32,
    /// Availability last reported to the renderer
    content_available: bool,
}

impl CompositedTexture {
    fn is_referenced(&self) -> bool {
        self.stream_refs > 0 || !self.scene_refs.is_empty()
    }
}

/// What changed with the uploads of one tick.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StreamUpdates {
    /// Scenes sampling a source that got new content
    pub updated_scenes: BTreeSet<SceneId>,
    /// Link consumers sampling a source that got new content
    pub updated_consumers: Vec<StreamConsumer>,
    /// Frames committed since the previous tick, per uploaded source
    pub committed_frames: BTreeMap<IviSurfaceId, u32>,
}

/// Availability changes since the previous dispatch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StreamStateChanges {
    /// Stream textures whose source became available or unavailable, per scene
    pub stream_textures: BTreeMap<SceneId, Vec<StreamTextureHandle>>,
    pub new_streams: Vec<IviSurfaceId>,
    pub obsolete_streams: Vec<IviSurfaceId>,
    /// Links dropped because their source lost its surface
    pub removed_links: Vec<StreamBufferLink>,
}

impl StreamStateChanges {
    pub fn is_empty(&self) -> bool {
        self.stream_textures.is_empty()
            && self.new_streams.is_empty()
            && self.obsolete_streams.is_empty()
            && self.removed_links.is_empty()
    }
}

pub struct StreamTextureManager<U: TextureUploader> {
    compositor: Box<dyn EmbeddedCompositor>,
    uploader: U,
    textures: BTreeMap<IviSurfaceId, CompositedTexture>,
    links: StreamBufferLinks,
}

impl<U: TextureUploader> StreamTextureManager<U> {
    pub fn new(compositor: Box<dyn EmbeddedCompositor>, uploader: U) -> Self {
        Self {
            compositor,
            uploader,
            textures: BTreeMap::new(),
            links: StreamBufferLinks::new(),
        }
    }

    pub fn compositor(&self) -> &dyn EmbeddedCompositor {
        self.compositor.as_ref()
    }

    pub fn compositor_mut(&mut self) -> &mut dyn EmbeddedCompositor {
        self.compositor.as_mut()
    }

    pub fn uploader(&self) -> &U {
        &self.uploader
    }

    pub fn links(&self) -> &StreamBufferLinks {
        &self.links
    }

    // =========================================================================
    // References
    // =========================================================================

    /// Reference `source` from a stream texture of `scene`.
    pub fn ref_stream_texture(&mut self, stream_texture: StreamTextureHandle, source: IviSurfaceId, scene: SceneId) {
        tracing::debug!(
            "Stream texture {} of scene {} references ivi-id {}",
            stream_texture,
            scene,
            source
        );
        self.texture_for(source)
            .scene_refs
            .entry(scene)
            .or_default()
            .push(stream_texture);
    }

    pub fn unref_stream_texture(&mut self, stream_texture: StreamTextureHandle, source: IviSurfaceId, scene: SceneId) {
        let Some(entry) = self.textures.get_mut(&source) else {
            tracing::warn!("Unref of stream texture {} for unknown ivi-id {}", stream_texture, source);
            return;
        };
        let Some(handles) = entry.scene_refs.get_mut(&scene) else {
            tracing::warn!("Scene {} does not reference ivi-id {}", scene, source);
            return;
        };
        if let Some(pos) = handles.iter().position(|h| *h == stream_texture) {
            handles.remove(pos);
        }
        if handles.is_empty() {
            entry.scene_refs.remove(&scene);
        }
        self.delete_if_unreferenced(source);
    }

    /// Reference `source` without a scene, e.g. for a stream buffer.
    pub fn ref_stream(&mut self, source: IviSurfaceId) {
        self.texture_for(source).stream_refs += 1;
    }

    pub fn unref_stream(&mut self, source: IviSurfaceId) {
        match self.textures.get_mut(&source) {
            Some(entry) if entry.stream_refs > 0 => {
                entry.stream_refs -= 1;
                self.delete_if_unreferenced(source);
            }
            _ => tracing::warn!("Unbalanced unref of stream for ivi-id {}", source),
        }
    }

    fn texture_for(&mut self, source: IviSurfaceId) -> &mut CompositedTexture {
        let compositor = &mut self.compositor;
        let uploader = &mut self.uploader;
        self.textures.entry(source).or_insert_with(|| {
            let texture = uploader.create_texture();
            let content_available = compositor.is_content_available_for_stream_texture(source);
            if content_available {
                compositor.upload_compositing_content_for_stream_texture(source, texture, uploader);
            }
            tracing::debug!(
                "Created composited texture {} for ivi-id {} (content available: {})",
                texture,
                source,
                content_available
            );
            CompositedTexture {
                texture,
                scene_refs: BTreeMap::new(),
                stream_refs: 0,
                content_available,
            }
        })
    }

    fn delete_if_unreferenced(&mut self, source: IviSurfaceId) {
        if self.textures.get(&source).is_some_and(|t| !t.is_referenced()) {
            if let Some(entry) = self.textures.remove(&source) {
                tracing::debug!("Deleting composited texture {} of ivi-id {}", entry.texture, source);
                self.uploader.delete_texture(entry.texture);
            }
        }
    }

    // =========================================================================
    // Links
    // =========================================================================

    pub fn link(&mut self, consumer: StreamConsumer, source: IviSurfaceId) -> Result<(), LinkError> {
        self.links.link(consumer, source)?;
        self.ref_stream(source);
        tracing::info!(
            "Linked ivi-id {} to consumer {} of scene {} on display {}",
            source,
            consumer.consumer,
            consumer.scene,
            consumer.display
        );
        Ok(())
    }

    pub fn unlink(&mut self, consumer: StreamConsumer) -> Result<IviSurfaceId, LinkError> {
        let source = self.links.unlink(consumer)?;
        self.unref_stream(source);
        tracing::info!("Unlinked consumer {:?} from ivi-id {}", consumer, source);
        Ok(source)
    }

    /// Drop every link of a scene that is being torn down.
    pub fn remove_scene(&mut self, display: DisplayId, scene: SceneId) -> Vec<StreamBufferLink> {
        let removed = self.links.remove_scene(display, scene);
        for link in &removed {
            self.unref_stream(link.source);
        }
        if !removed.is_empty() {
            let display_id = display;
            tracing::info!("Removed {} link(s) of scene {} on display {}", removed.len(), scene, display_id);
        }
        removed
    }

    /// Texture to sample for `source`; invalid unless content is available.
    pub fn composited_texture(&self, source: IviSurfaceId) -> TextureHandle {
        if !self.compositor.is_content_available_for_stream_texture(source) {
            return TextureHandle::INVALID;
        }
        self.textures
            .get(&source)
            .map(|t| t.texture)
            .unwrap_or(TextureHandle::INVALID)
    }

    // =========================================================================
    // Per tick
    // =========================================================================

    /// Dispatch client requests and flush, without finishing a frame.
    pub fn process_client_requests(&mut self) {
        self.compositor.handle_requests_from_clients();
        self.compositor.end_frame(false);
    }

    /// The frame using the uploaded content has finished.
    pub fn notify_clients(&mut self) {
        self.compositor.end_frame(true);
    }

    pub fn has_updated_content_to_upload(&self) -> bool {
        self.compositor.has_updated_stream_texture_sources()
    }

    pub fn upload_resources_and_get_updates(&mut self) -> StreamUpdates {
        let mut updates = StreamUpdates::default();

        for source in self.compositor.dispatch_updated_stream_texture_source_ids() {
            let Some(entry) = self.textures.get(&source) else {
                tracing::trace!("ivi-id {} updated but nobody samples it", source);
                continue;
            };
            let frames =
                self.compositor
                    .upload_compositing_content_for_stream_texture(source, entry.texture, &mut self.uploader);

            updates.committed_frames.insert(source, frames);
            updates.updated_scenes.extend(entry.scene_refs.keys().copied());
            updates.updated_consumers.extend(self.links.consumers_of(source));
        }

        updates
    }

    pub fn dispatch_state_changes(&mut self) -> StreamStateChanges {
        let new_streams = self.compositor.dispatch_new_stream_texture_source_ids();
        let obsolete_streams = self.compositor.dispatch_obsolete_stream_texture_source_ids();

        let mut changes = StreamStateChanges::default();
        for &source in new_streams.union(&obsolete_streams) {
            let available = self.compositor.is_content_available_for_stream_texture(source);
            if let Some(entry) = self.textures.get_mut(&source) {
                if entry.content_available != available {
                    entry.content_available = available;
                    for (scene, handles) in &entry.scene_refs {
                        changes
                            .stream_textures
                            .entry(*scene)
                            .or_default()
                            .extend(handles.iter().copied());
                    }
                }
            }
        }

        let vanished = self.compositor.dispatch_vanished_stream_texture_source_ids();
        for &source in obsolete_streams.union(&vanished) {
            if self.compositor.has_surface_for_stream_texture(source) {
                continue;
            }
            let removed = self.links.remove_source(source);
            for link in &removed {
                tracing::info!("Dropping link of vanished ivi-id {} to {:?}", source, link.consumer);
                self.unref_stream(source);
            }
            changes.removed_links.extend(removed);
        }

        changes.new_streams = new_streams.into_iter().collect();
        changes.obsolete_streams = obsolete_streams.into_iter().collect();
        changes
    }

    pub fn log_infos(&self) {
        crate::wlog!(STREAM, "{} composited texture(s), {} link(s)", self.textures.len(), self.links.len());
        for (source, entry) in &self.textures {
            crate::wlog!(
                STREAM,
                "  ivi-id {}: texture {} available={} stream refs={} scenes={:?}",
                source,
                entry.texture,
                entry.content_available,
                entry.stream_refs,
                entry.scene_refs.keys().collect::<Vec<_>>()
            );
        }
        for link in self.links.iter() {
            crate::wlog!(
                STREAM,
                "  link ivi-id {} -> display {} scene {} consumer {}",
                link.source,
                link.consumer.display,
                link.consumer.scene,
                link.consumer.consumer
            );
        }
        self.compositor.log_infos();
    }
}
