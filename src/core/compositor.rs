//! Embedded compositor server.
//!
//! `EmbeddedCompositorServer` ties together:
//! - the wayland display and its globals
//! - the listening socket and client connections
//! - the compositor state the renderer polls once per tick
//!
//! Everything runs on the render thread; there is no compositor thread.

use std::collections::{BTreeSet, HashMap};
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use wayland_server::backend::{ClientData, ClientId, DisconnectReason};
use wayland_server::{Display, DisplayHandle};

use crate::core::backend::EmbeddedCompositor;
use crate::core::config::{EmbeddedCompositingConfig, SocketSource};
use crate::core::errors::CoreError;
use crate::core::ids::{IviSurfaceId, TextureHandle};
use crate::core::socket_manager::{SocketInfo, SocketManager};
use crate::core::state::{BufferContent, CompositorState};
use crate::core::surface::PendingAttach;
use crate::stream::uploader::TextureUploader;

// ============================================================================
// Client Data
// ============================================================================

/// Per-client data stored with each Wayland connection
#[derive(Debug)]
pub struct EmbeddedClientData {
    /// Unique client identifier (internal)
    pub id: u32,
    /// Connection timestamp
    pub connected_at: Instant,
    disconnected: AtomicBool,
}

impl EmbeddedClientData {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            connected_at: Instant::now(),
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }
}

impl ClientData for EmbeddedClientData {
    fn initialized(&self, client_id: ClientId) {
        tracing::debug!("Client {} initialized (backend id: {:?})", self.id, client_id);
    }

    fn disconnected(&self, client_id: ClientId, reason: DisconnectReason) {
        self.disconnected.store(true, Ordering::Release);
        match reason {
            DisconnectReason::ConnectionClosed => {
                tracing::info!("Client {} disconnected: connection closed ({:?})", self.id, client_id)
            }
            DisconnectReason::ProtocolError(err) => {
                tracing::error!("Client {} disconnected: protocol error {} ({:?})", self.id, err, client_id)
            }
        }
    }
}

// ============================================================================
// Server
// ============================================================================

pub struct EmbeddedCompositorServer {
    display: Display<CompositorState>,
    state: CompositorState,
    socket_manager: SocketManager,
    clients: HashMap<ClientId, Arc<EmbeddedClientData>>,
    next_client_id: u32,
    max_frame_callback_poll_time: Duration,
}

impl EmbeddedCompositorServer {
    /// Create the display, register the globals and start listening.
    pub fn new(config: EmbeddedCompositingConfig) -> Result<Self> {
        let source = config.validate().context("Invalid embedded compositing config")?;

        let display: Display<CompositorState> = Display::new().context("Failed to create Wayland display")?;
        crate::core::wayland::register(&display.handle());

        let socket_manager = match source {
            SocketSource::Named { name, runtime_dir } => {
                let mut manager = SocketManager::new(Some(runtime_dir.as_path()))?;
                manager.bind_primary(name, config.socket_group.as_deref(), config.socket_permissions)?;
                manager
            }
            SocketSource::Fd(fd) => {
                let fd = fd.try_clone().context("Failed to duplicate embedded compositor socket fd")?;
                let mut manager = SocketManager::new(None)?;
                manager.adopt_listening_fd(fd)?;
                manager
            }
        };

        tracing::info!(
            "Embedded compositor listening on {}",
            socket_manager
                .get_socket_info()
                .first()
                .map(|info| info.identifier.as_str())
                .unwrap_or("<none>")
        );

        Ok(Self {
            display,
            state: CompositorState::new(),
            socket_manager,
            clients: HashMap::new(),
            next_client_id: 1,
            max_frame_callback_poll_time: config.max_frame_callback_poll_time,
        })
    }

    pub fn display_handle(&self) -> DisplayHandle {
        self.display.handle()
    }

    pub fn socket_info(&self) -> Vec<&SocketInfo> {
        self.socket_manager.get_socket_info()
    }

    pub fn state(&self) -> &CompositorState {
        &self.state
    }

    pub fn max_frame_callback_poll_time(&self) -> Duration {
        self.max_frame_callback_poll_time
    }

    /// Number of clients whose socket is still open.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Serve a client over an already connected stream.
    pub fn insert_client_stream(&mut self, stream: UnixStream) -> Result<ClientId> {
        let data = Arc::new(EmbeddedClientData::new(self.next_client_id));
        self.next_client_id += 1;

        let mut handle = self.display.handle();
        let client = handle
            .insert_client(stream, data.clone())
            .map_err(|e| CoreError::socket(format!("failed to insert client: {}", e)))?;
        let client_id = client.id();
        let pid = client.get_credentials(&handle).ok().map(|c| c.pid);

        tracing::info!("Client {} connected (pid {:?})", data.id, pid);
        self.state.add_connection(client_id.clone(), pid);
        self.clients.insert(client_id.clone(), data);
        Ok(client_id)
    }

    /// Accept pending client connections
    fn accept_connections(&mut self) {
        while let Some((socket_type, stream)) = self.socket_manager.accept_any() {
            tracing::debug!("Accepted connection on {:?} socket", socket_type);
            if let Err(e) = self.insert_client_stream(stream) {
                tracing::error!("{:#}", e);
            }
        }
    }

    fn remove_disconnected_clients(&mut self) {
        let gone: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, data)| data.is_disconnected())
            .map(|(id, _)| id.clone())
            .collect();
        for client_id in gone {
            self.clients.remove(&client_id);
            self.state.remove_connection(&client_id);
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.display.flush_clients() {
            tracing::warn!("Failed to flush clients: {}", e);
        }
    }
}

impl EmbeddedCompositor for EmbeddedCompositorServer {
    fn handle_requests_from_clients(&mut self) {
        self.accept_connections();
        if let Err(e) = self.display.dispatch_clients(&mut self.state) {
            tracing::error!("Failed to dispatch client requests: {}", e);
        }
        self.remove_disconnected_clients();
        self.flush();
    }

    fn end_frame(&mut self, notify_clients: bool) {
        self.state.end_frame(notify_clients);
        self.flush();
    }

    fn wait_for_client_activity(&mut self, timeout: Duration) -> bool {
        let timeout = timeout.min(self.max_frame_callback_poll_time);
        let display_fd = self.display.backend().poll_fd().as_fd().as_raw_fd();

        let mut fds: Vec<libc::pollfd> = std::iter::once(display_fd)
            .chain(self.socket_manager.poll_fds())
            .map(|fd| libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        // SAFETY: fds is a valid array of pollfd for the duration of the call
        let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout.as_millis() as libc::c_int) };
        if ready < 0 {
            tracing::warn!("poll failed: {}", std::io::Error::last_os_error());
            return false;
        }
        ready > 0
    }

    fn has_updated_stream_texture_sources(&self) -> bool {
        self.state.streams.has_updated()
    }

    fn dispatch_updated_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId> {
        self.state.streams.dispatch_updated()
    }

    fn dispatch_new_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId> {
        self.state.streams.dispatch_new()
    }

    fn dispatch_obsolete_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId> {
        self.state.streams.dispatch_obsolete()
    }

    fn dispatch_vanished_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId> {
        self.state.streams.dispatch_vanished()
    }

    fn upload_compositing_content_for_stream_texture(
        &mut self,
        source: IviSurfaceId,
        texture: TextureHandle,
        uploader: &mut dyn TextureUploader,
    ) -> u32 {
        let Some((buffer, type_changed)) = self.state.pin_content_for_upload(source) else {
            tracing::warn!("No content to upload for ivi-id {}", source);
            return 0;
        };

        let result = match self.state.buffer_content(buffer) {
            Some(BufferContent::Shm {
                bytes,
                width,
                height,
                stride,
                format,
            }) => {
                if type_changed {
                    uploader.reset_swizzle(texture);
                }
                uploader.upload_shm(texture, width, height, stride, format, bytes)
            }
            Some(BufferContent::Gpu(image)) => uploader.import_gpu_image(texture, image),
            None => Err(CoreError::upload(format!("content of buffer {} is not accessible", buffer))),
        };

        if let Err(e) = result {
            self.state.post_buffer_error(buffer, &e.to_string());
        }

        self.state
            .surface_by_ivi_id(source)
            .map(|s| s.frames_this_tick())
            .unwrap_or(0)
    }

    fn is_content_available_for_stream_texture(&self, source: IviSurfaceId) -> bool {
        self.state
            .surface_by_ivi_id(source)
            .is_some_and(|s| s.has_content())
    }

    fn has_surface_for_stream_texture(&self, source: IviSurfaceId) -> bool {
        self.state.ivi.resolve(source).is_some()
    }

    fn committed_frames_since_start(&self, source: IviSurfaceId) -> u64 {
        self.state
            .surface_by_ivi_id(source)
            .map(|s| s.total_frames())
            .unwrap_or(0)
    }

    fn compositor_connection_count(&self) -> u32 {
        self.state.compositor_connection_count()
    }

    fn is_buffer_attached_to_surface(&self, source: IviSurfaceId) -> bool {
        self.state.surface_by_ivi_id(source).is_some_and(|s| {
            s.has_content() || matches!(s.pending_attach(), PendingAttach::Buffer(_))
        })
    }

    fn title_of_surface(&self, source: IviSurfaceId) -> Option<String> {
        self.state
            .surface_by_ivi_id(source)
            .map(|s| s.title().to_string())
    }

    fn log_infos(&self) {
        use crate::util::logging::COMPOSITOR;

        crate::wlog!(
            COMPOSITOR,
            "Embedded compositor: {} client(s), {} compositor connection(s), {} buffer(s)",
            self.clients.len(),
            self.state.compositor_connection_count(),
            self.state.buffers.len()
        );
        for (client_id, conn) in &self.state.connections {
            crate::wlog!(
                COMPOSITOR,
                "  client pid={} compositor bindings={}",
                conn.pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string()),
                conn.compositor_bindings
            );
            let mut surfaces: Vec<_> = self
                .state
                .surfaces
                .values()
                .filter(|s| s.client_id.as_ref() == Some(client_id))
                .collect();
            surfaces.sort_by_key(|s| s.id);
            for surface in surfaces {
                crate::wlog!(
                    COMPOSITOR,
                    "    surface {} ivi-id={} title=\"{}\" content={:?} committed frames={}",
                    surface.id,
                    surface
                        .ivi_id()
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "none".to_string()),
                    surface.title(),
                    surface.content_state(),
                    surface.total_frames()
                );
            }
        }
    }
}

impl Drop for EmbeddedCompositorServer {
    fn drop(&mut self) {
        tracing::info!("Shutting down embedded compositor ({} clients)", self.clients.len());
        self.socket_manager.close_all();
    }
}
