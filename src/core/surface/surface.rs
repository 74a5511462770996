use std::collections::VecDeque;

use wayland_server::backend::ClientId;
use wayland_server::protocol::wl_callback::WlCallback;
use wayland_server::protocol::wl_surface::WlSurface;

use super::buffer::BufferRegistry;
use super::commit::{apply_commit, ContentChange, PendingAttach};
use crate::core::ids::{BufferId, IviSurfaceId, SurfaceId};

/// Observable content state of a surface. Transitions are edge-triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentState {
    #[default]
    NoContent,
    Available,
    Removed,
}

/// A client surface as seen by the embedded compositor.
pub struct WaylandSurface {
    pub id: SurfaceId,
    pub client_id: Option<ClientId>,
    pub resource: Option<WlSurface>,

    pending: PendingAttach,
    committed: Option<BufferId>,

    /// frame requests since the last commit
    pending_callbacks: Vec<WlCallback>,
    /// committed frame requests waiting for the next finished frame
    frame_callbacks: VecDeque<WlCallback>,

    ivi_id: Option<IviSurfaceId>,
    content_state: ContentState,

    frames_this_tick: u32,
    total_frames: u64,
    buffer_type_changed: bool,

    has_shell_surface: bool,
    title: String,
}

impl WaylandSurface {
    pub fn new(id: SurfaceId, client_id: Option<ClientId>, resource: Option<WlSurface>) -> Self {
        Self {
            id,
            client_id,
            resource,
            pending: PendingAttach::Unchanged,
            committed: None,
            pending_callbacks: Vec::new(),
            frame_callbacks: VecDeque::new(),
            ivi_id: None,
            content_state: ContentState::NoContent,
            frames_this_tick: 0,
            total_frames: 0,
            buffer_type_changed: false,
            has_shell_surface: false,
            title: String::new(),
        }
    }

    /// wl_surface.attach. `None` detaches the content on the next commit.
    pub fn attach(&mut self, buffers: &mut BufferRegistry, buffer: Option<BufferId>) {
        if let PendingAttach::Buffer(previous) = self.pending {
            if buffer == Some(previous) {
                return;
            }
            buffers.detach(self.id, previous);
        }

        self.pending = match buffer {
            Some(id) => {
                let class = buffers.attach(self.id, id).map(|b| b.kind.class());
                let committed_class = self
                    .committed
                    .and_then(|c| buffers.get(c))
                    .map(|b| b.kind.class());
                if class.is_some() && (committed_class.is_none() || committed_class != class) {
                    self.buffer_type_changed = true;
                }
                PendingAttach::Buffer(id)
            }
            None => PendingAttach::Detach,
        };
    }

    /// wl_surface.frame
    pub fn add_frame_callback(&mut self, callback: WlCallback) {
        self.pending_callbacks.push(callback);
    }

    /// wl_surface.commit
    ///
    /// Returns the new content state if it changed.
    pub fn commit(&mut self, buffers: &mut BufferRegistry) -> Option<ContentState> {
        self.frame_callbacks.extend(self.pending_callbacks.drain(..));
        self.frames_this_tick += 1;
        self.total_frames += 1;

        let outcome = apply_commit(&mut self.pending, &mut self.committed);
        if let Some(old) = outcome.superseded {
            buffers.detach(self.id, old);
        }

        let transition = match outcome.content {
            ContentChange::None => None,
            ContentChange::Attached(_) => self.set_content_state(ContentState::Available),
            ContentChange::Removed => self.set_content_state(ContentState::Removed),
        };

        tracing::debug!(
            "Surface {} committed: buffer={:?} frames={}",
            self.id,
            self.committed,
            self.total_frames
        );
        transition
    }

    fn set_content_state(&mut self, state: ContentState) -> Option<ContentState> {
        if self.content_state == state {
            return None;
        }
        self.content_state = state;
        Some(state)
    }

    /// A wl_buffer was destroyed by the client.
    ///
    /// Returns the new content state if the committed buffer disappeared.
    pub fn buffer_destroyed(&mut self, buffer: BufferId) -> Option<ContentState> {
        if self.pending == PendingAttach::Buffer(buffer) {
            self.pending = PendingAttach::Unchanged;
        }
        if self.committed == Some(buffer) {
            self.committed = None;
            return self.set_content_state(ContentState::Removed);
        }
        None
    }

    /// Drop every buffer reference held by this surface.
    pub fn destroy(&mut self, buffers: &mut BufferRegistry) {
        if let PendingAttach::Buffer(id) = std::mem::take(&mut self.pending) {
            buffers.detach(self.id, id);
        }
        if let Some(id) = self.committed.take() {
            buffers.detach(self.id, id);
        }
        self.pending_callbacks.clear();
        self.frame_callbacks.clear();
        self.ivi_id = None;
        tracing::debug!("Surface {} destroyed", self.id);
    }

    pub fn committed_buffer(&self) -> Option<BufferId> {
        self.committed
    }

    pub fn pending_attach(&self) -> PendingAttach {
        self.pending
    }

    pub fn has_content(&self) -> bool {
        self.committed.is_some()
    }

    pub fn content_state(&self) -> ContentState {
        self.content_state
    }

    pub fn ivi_id(&self) -> Option<IviSurfaceId> {
        self.ivi_id
    }

    pub fn set_ivi_id(&mut self, id: Option<IviSurfaceId>) {
        self.ivi_id = id;
    }

    /// Commits since the last finished frame.
    pub fn frames_this_tick(&self) -> u32 {
        self.frames_this_tick
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Read and reset the buffer-type switch flag before an upload.
    pub fn take_buffer_type_changed(&mut self) -> bool {
        std::mem::take(&mut self.buffer_type_changed)
    }

    /// Frame finished: hand out the queued frame callbacks in request order.
    pub fn finish_frame(&mut self) -> Vec<WlCallback> {
        self.frames_this_tick = 0;
        self.frame_callbacks.drain(..).collect()
    }

    pub fn queued_frame_callbacks(&self) -> usize {
        self.frame_callbacks.len()
    }

    pub fn has_shell_surface(&self) -> bool {
        self.has_shell_surface
    }

    /// Returns false if the surface already has a shell surface.
    pub fn set_shell_surface(&mut self) -> bool {
        !std::mem::replace(&mut self.has_shell_surface, true)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: String) {
        self.title = title;
    }
}

impl std::fmt::Debug for WaylandSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaylandSurface")
            .field("id", &self.id)
            .field("ivi_id", &self.ivi_id)
            .field("committed", &self.committed)
            .field("content_state", &self.content_state)
            .field("total_frames", &self.total_frames)
            .finish()
    }
}
