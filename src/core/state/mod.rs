//! Embedded compositor state.
//!
//! `CompositorState` is the dispatch state of the wayland display. It holds
//! the surface/buffer model, the ivi-id bindings and the stream source
//! bookkeeping, separate from the socket and display plumbing in
//! `core::compositor`.

use std::collections::HashMap;
use std::time::Instant;

use wayland_server::backend::ClientId;

use crate::core::ids::{BufferId, PoolId, SurfaceId};
use crate::core::ivi_application::IviApplicationExtension;
use crate::core::surface::{BufferRegistry, ShmPool, WaylandSurface};

mod streams;
mod surfaces;

pub use streams::{BufferContent, StreamSourceSets};

/// Bookkeeping for one connected client.
#[derive(Debug)]
pub struct ClientConnection {
    pub client_id: ClientId,
    pub pid: Option<i32>,
    /// Live wl_compositor bindings of this client
    pub compositor_bindings: u32,
}

impl ClientConnection {
    pub fn new(client_id: ClientId, pid: Option<i32>) -> Self {
        Self {
            client_id,
            pid,
            compositor_bindings: 0,
        }
    }
}

/// A wl_shm_pool mapping, kept until the pool and all its buffers are gone.
#[derive(Debug)]
pub struct PoolEntry {
    pub pool: ShmPool,
    /// The wl_shm_pool object itself is still alive
    pub alive: bool,
}

pub struct CompositorState {
    pub surfaces: HashMap<SurfaceId, WaylandSurface>,
    pub buffers: BufferRegistry,
    pub shm_pools: HashMap<PoolId, PoolEntry>,
    pub ivi: IviApplicationExtension,
    pub connections: HashMap<ClientId, ClientConnection>,
    pub streams: StreamSourceSets,

    /// Buffers sampled by the frame in flight
    render_pinned: Vec<BufferId>,

    next_surface_id: u32,
    next_pool_id: u32,
    started_at: Instant,
}

impl Default for CompositorState {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositorState {
    pub fn new() -> Self {
        Self {
            surfaces: HashMap::new(),
            buffers: BufferRegistry::new(),
            shm_pools: HashMap::new(),
            ivi: IviApplicationExtension::new(),
            connections: HashMap::new(),
            streams: StreamSourceSets::default(),
            render_pinned: Vec::new(),
            next_surface_id: 1,
            next_pool_id: 1,
            started_at: Instant::now(),
        }
    }

    // =========================================================================
    // Connections
    // =========================================================================

    pub fn add_connection(&mut self, client_id: ClientId, pid: Option<i32>) {
        self.connections
            .insert(client_id.clone(), ClientConnection::new(client_id, pid));
    }

    pub fn remove_connection(&mut self, client_id: &ClientId) -> Option<ClientConnection> {
        self.connections.remove(client_id)
    }

    pub fn compositor_bound(&mut self, client_id: &ClientId) {
        if let Some(conn) = self.connections.get_mut(client_id) {
            conn.compositor_bindings += 1;
            tracing::debug!(
                "Client {:?} bound wl_compositor ({} bindings)",
                client_id,
                conn.compositor_bindings
            );
        }
    }

    pub fn compositor_unbound(&mut self, client_id: &ClientId) {
        if let Some(conn) = self.connections.get_mut(client_id) {
            conn.compositor_bindings = conn.compositor_bindings.saturating_sub(1);
        }
    }

    /// Number of live wl_compositor bindings over all clients.
    pub fn compositor_connection_count(&self) -> u32 {
        self.connections.values().map(|c| c.compositor_bindings).sum()
    }

    // =========================================================================
    // SHM pools
    // =========================================================================

    pub fn add_shm_pool(&mut self, pool: ShmPool) -> PoolId {
        let id = PoolId::new(self.next_pool_id);
        self.next_pool_id += 1;
        self.shm_pools.insert(id, PoolEntry { pool, alive: true });
        id
    }

    /// wl_shm_pool destroyed; the mapping lives on while buffers use it.
    pub fn shm_pool_destroyed(&mut self, id: PoolId) {
        if let Some(entry) = self.shm_pools.get_mut(&id) {
            entry.alive = false;
        }
        self.collect_shm_pool(id);
    }

    fn collect_shm_pool(&mut self, id: PoolId) {
        let unused = self
            .shm_pools
            .get(&id)
            .is_some_and(|entry| !entry.alive && self.buffers.count_in_pool(id) == 0);
        if unused {
            self.shm_pools.remove(&id);
            tracing::debug!("SHM pool {} unmapped", id);
        }
    }

    // =========================================================================
    // Frames
    // =========================================================================

    /// Milliseconds since the compositor started, as sent in frame callbacks.
    pub fn frame_time_ms(&self) -> u32 {
        self.started_at.elapsed().as_millis() as u32
    }

    pub(crate) fn pin_for_render(&mut self, buffer: BufferId) {
        self.buffers.pin(buffer);
        self.render_pinned.push(buffer);
    }

    /// End of a render tick.
    ///
    /// With `frame_finished`, render pins are dropped (releasing buffers no
    /// surface holds anymore), queued frame callbacks are fired in request
    /// order and the per-tick commit counters are reset.
    pub fn end_frame(&mut self, frame_finished: bool) {
        if !frame_finished {
            return;
        }

        for buffer in std::mem::take(&mut self.render_pinned) {
            self.buffers.unpin(buffer);
        }

        let time = self.frame_time_ms();
        let mut fired = 0usize;
        for surface in self.surfaces.values_mut() {
            for callback in surface.finish_frame() {
                callback.done(time);
                fired += 1;
            }
        }
        if fired > 0 {
            tracing::trace!("Fired {} frame callbacks at {}ms", fired, time);
        }
    }
}
