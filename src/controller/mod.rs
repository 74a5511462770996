//! System compositor controller.
//!
//! Client of the `ivi_controller` protocol of an external system compositor.
//! Property changes are staged locally and sent in one batch by
//! [`SystemCompositorControllerClient::commit_and_flush`], followed by
//! `commit_changes`, so the system compositor applies them together.
//!
//! Errors of the system compositor arrive asynchronously as `error` events.
//! They are logged and kept for [`SystemCompositorControllerClient::take_remote_errors`];
//! tying one to a request needs a roundtrip after that request.

pub mod client;
pub mod staging;


use std::collections::BTreeMap;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use anyhow::Context;
use wayland_backend::client::WaylandError;
use wayland_client::{Connection, EventQueue, QueueHandle};

use crate::core::config::{SystemCompositorControllerConfig, RUNTIME_DIR_ENV};
use crate::core::errors::{CoreError, Result};
use crate::core::ids::{IviLayerId, IviScreenId, IviSurfaceId};
use crate::core::wayland::protocol::client::ivi_controller::ivi_controller_layer::IviControllerLayer;

pub use client::{ControllerState, RemoteError, SurfaceStats, MAX_REMOTE_ERRORS};
pub use staging::{StagedChanges, StagedOp};

pub struct SystemCompositorControllerClient {
    connection: Connection,
    event_queue: EventQueue<ControllerState>,
    qh: QueueHandle<ControllerState>,
    state: ControllerState,
    staged: StagedChanges,
}

impl SystemCompositorControllerClient {
    /// Connect to the system compositor named in `config` and initialize.
    pub fn connect(config: &SystemCompositorControllerConfig) -> anyhow::Result<Self> {
        let name = config.display_name.as_deref().filter(|n| !n.is_empty());
        tracing::info!("Connecting to system compositor ({})", name.unwrap_or("$WAYLAND_DISPLAY"));

        let connection = match name {
            Some(name) => {
                let path = display_socket_path(name)?;
                let stream = UnixStream::connect(&path)
                    .with_context(|| format!("Failed to connect to {}", path.display()))?;
                Connection::from_socket(stream).context("Failed to set up Wayland connection")?
            }
            None => Connection::connect_to_env().context("Failed to connect to the system compositor")?,
        };
        Self::init(connection)
    }

    /// Initialize over an already connected socket.
    pub fn from_stream(stream: UnixStream) -> anyhow::Result<Self> {
        let connection = Connection::from_socket(stream).context("Failed to set up Wayland connection")?;
        Self::init(connection)
    }

    fn init(connection: Connection) -> anyhow::Result<Self> {
        let mut event_queue = connection.new_event_queue();
        let qh = event_queue.handle();
        let _registry = connection.display().get_registry(&qh, ());
        let mut state = ControllerState::default();

        // globals; the controller is bound from the registry events
        event_queue
            .roundtrip(&mut state)
            .context("First roundtrip to the system compositor failed")?;
        if state.controller.is_none() {
            anyhow::bail!("ivi_controller interface not available");
        }

        // screens, layers and surfaces that already exist
        event_queue
            .roundtrip(&mut state)
            .context("Second roundtrip to the system compositor failed")?;

        // surface events above queued surface_create for every known surface;
        // the proxies must exist remotely before the first staged operation
        event_queue
            .roundtrip(&mut state)
            .context("Third roundtrip to the system compositor failed")?;

        tracing::info!(
            "Connected to system compositor: {} screen(s), {} surface(s)",
            state.screens.len(),
            state.surfaces.len()
        );

        Ok(Self {
            connection,
            event_queue,
            qh,
            state,
            staged: StagedChanges::default(),
        })
    }

    /// Dispatch whatever the system compositor sent, without blocking.
    pub fn update(&mut self) -> Result<()> {
        self.dispatch_pending()?;
        self.connection.flush().map_err(wayland_error)?;

        if let Some(guard) = self.event_queue.prepare_read() {
            let mut pfd = libc::pollfd {
                fd: guard.connection_fd().as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            // SAFETY: pfd is a single valid pollfd
            let ready = unsafe { libc::poll(&mut pfd, 1, 0) };
            if ready > 0 && (pfd.revents & libc::POLLIN) != 0 {
                match guard.read() {
                    Ok(_) => {}
                    Err(WaylandError::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(wayland_error(e)),
                }
            }
        }

        self.dispatch_pending()
    }

    /// Block until the system compositor processed everything sent so far.
    pub fn roundtrip(&mut self) -> Result<()> {
        self.event_queue
            .roundtrip(&mut self.state)
            .map(|_| ())
            .map_err(|e| CoreError::controller(format!("roundtrip failed: {}", e)))
    }

    fn dispatch_pending(&mut self) -> Result<()> {
        self.event_queue
            .dispatch_pending(&mut self.state)
            .map(|_| ())
            .map_err(|e| CoreError::controller(format!("dispatch failed: {}", e)))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Ivi-ids of the surfaces known to the controller, sorted.
    pub fn known_surfaces(&self) -> Vec<IviSurfaceId> {
        self.state.surfaces.keys().copied().collect()
    }

    pub fn screens(&self) -> Vec<IviScreenId> {
        self.state.screens.keys().copied().collect()
    }

    /// Layers announced by the system compositor, in announcement order.
    pub fn layers(&self) -> &[IviLayerId] {
        &self.state.layers_seen
    }

    pub fn surface_stats(&self, surface: IviSurfaceId) -> Option<&SurfaceStats> {
        self.state.stats.get(&surface)
    }

    pub fn has_staged_changes(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Remote errors received since the last call, oldest first.
    pub fn take_remote_errors(&mut self) -> Vec<RemoteError> {
        self.state.errors.drain(..).collect()
    }

    /// Log the known ivi-ids and request statistics for each of them.
    pub fn list_ivi_surfaces(&mut self) -> Result<Vec<IviSurfaceId>> {
        let ids = self.known_surfaces();
        let listed: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        tracing::info!("Known ivi-ids are: {}", listed.join(" "));

        for proxy in self.state.surfaces.values() {
            proxy.send_stats();
        }
        // stats replies are logged by the surface listener
        self.roundtrip()?;
        Ok(ids)
    }

    // =========================================================================
    // Staged changes
    // =========================================================================

    pub fn set_surface_visibility(&mut self, surface: IviSurfaceId, visible: bool) {
        tracing::info!("Set visibility of surface {} to {}", surface, visible);
        self.staged.push(StagedOp::SurfaceVisibility { surface, visible });
    }

    /// Opacity is clamped to `[0, 1]`.
    pub fn set_surface_opacity(&mut self, surface: IviSurfaceId, opacity: f32) {
        let opacity = f64::from(opacity.clamp(0.0, 1.0));
        tracing::info!("Set opacity of surface {} to {}", surface, opacity);
        self.staged.push(StagedOp::SurfaceOpacity { surface, opacity });
    }

    pub fn set_surface_destination_rectangle(&mut self, surface: IviSurfaceId, x: i32, y: i32, width: i32, height: i32) {
        tracing::info!(
            "Set destination rectangle of surface {} to ({}, {}, {}, {})",
            surface,
            x,
            y,
            width,
            height
        );
        self.staged.push(StagedOp::SurfaceDestinationRectangle {
            surface,
            x,
            y,
            width,
            height,
        });
    }

    pub fn add_surface_to_layer(&mut self, surface: IviSurfaceId, layer: IviLayerId) {
        tracing::info!("Add surface {} to layer {}", surface, layer);
        self.staged.push(StagedOp::AddSurfaceToLayer { surface, layer });
    }

    pub fn remove_surface_from_layer(&mut self, surface: IviSurfaceId, layer: IviLayerId) -> Result<()> {
        tracing::info!("Remove surface {} from layer {}", surface, layer);
        self.require_known(surface)?;
        self.staged.push(StagedOp::RemoveSurfaceFromLayer { surface, layer });
        Ok(())
    }

    pub fn set_layer_visibility(&mut self, layer: IviLayerId, visible: bool) {
        tracing::info!("Set visibility of layer {} to {}", layer, visible);
        self.staged.push(StagedOp::LayerVisibility { layer, visible });
    }

    pub fn destroy_surface(&mut self, surface: IviSurfaceId) -> Result<()> {
        tracing::info!("Destroy surface {}", surface);
        self.require_known(surface)?;
        self.staged.push(StagedOp::DestroySurface { surface });
        Ok(())
    }

    fn require_known(&self, surface: IviSurfaceId) -> Result<()> {
        if self.state.surfaces.contains_key(&surface) && !self.staged.destroys(surface) {
            Ok(())
        } else {
            tracing::error!("Surface {} does not exist", surface);
            Err(CoreError::InvalidIviSurface(surface.value()))
        }
    }

    /// Send every staged change, then `commit_changes`, and flush.
    pub fn commit_and_flush(&mut self) -> Result<()> {
        let controller = self
            .state
            .controller
            .clone()
            .ok_or_else(|| CoreError::controller("not connected to ivi_controller"))?;

        let ops = self.staged.take();
        let mut layers: BTreeMap<IviLayerId, IviControllerLayer> = BTreeMap::new();

        for op in &ops {
            if let Some(layer) = op.layer() {
                layers
                    .entry(layer)
                    .or_insert_with(|| controller.layer_create(layer.value(), 0, 0, &self.qh, layer));
            }

            match *op {
                StagedOp::SurfaceVisibility { surface, visible } => {
                    if let Some(proxy) = self.state.surface_proxy(surface, &self.qh) {
                        proxy.set_visibility(u32::from(visible));
                    }
                }
                StagedOp::SurfaceOpacity { surface, opacity } => {
                    if let Some(proxy) = self.state.surface_proxy(surface, &self.qh) {
                        proxy.set_opacity(opacity);
                    }
                }
                StagedOp::SurfaceDestinationRectangle {
                    surface,
                    x,
                    y,
                    width,
                    height,
                } => {
                    if let Some(proxy) = self.state.surface_proxy(surface, &self.qh) {
                        proxy.set_destination_rectangle(x, y, width, height);
                    }
                }
                StagedOp::AddSurfaceToLayer { surface, layer } => {
                    if let (Some(proxy), Some(layer)) = (self.state.surface_proxy(surface, &self.qh), layers.get(&layer)) {
                        layer.add_surface(&proxy);
                    }
                }
                StagedOp::RemoveSurfaceFromLayer { surface, layer } => match self.state.surfaces.get(&surface) {
                    Some(proxy) => {
                        if let Some(layer) = layers.get(&layer) {
                            layer.remove_surface(proxy);
                        }
                    }
                    None => tracing::warn!("Surface {} vanished before removal from layer {}", surface, layer),
                },
                StagedOp::LayerVisibility { layer, visible } => {
                    if let Some(layer) = layers.get(&layer) {
                        layer.set_visibility(u32::from(visible));
                    }
                }
                StagedOp::DestroySurface { surface } => match self.state.surfaces.remove(&surface) {
                    Some(proxy) => {
                        self.state.stats.remove(&surface);
                        proxy.destroy(1);
                    }
                    None => tracing::warn!("Surface {} vanished before destroy", surface),
                },
            }
        }

        controller.commit_changes();

        // the temporary layer proxies must not take the scene layer with them
        for layer in layers.into_values() {
            layer.destroy(0);
        }

        tracing::debug!("Committed {} staged change(s)", ops.len());
        self.connection.flush().map_err(wayland_error)
    }

    /// Screenshot of `screen`, or of the only screen for `-1`.
    pub fn do_screenshot(&mut self, file_name: &str, screen: i32) -> Result<()> {
        let (id, proxy) = if screen == -1 {
            if self.state.screens.len() != 1 {
                tracing::warn!(
                    "Screenshot {} failed: found {} screens",
                    file_name,
                    self.state.screens.len()
                );
                return Err(CoreError::controller(format!(
                    "expected exactly one screen, found {}",
                    self.state.screens.len()
                )));
            }
            match self.state.screens.iter().next() {
                Some((id, proxy)) => (*id, proxy.clone()),
                None => return Err(CoreError::controller("no screen")),
            }
        } else {
            let id = IviScreenId(screen as u32);
            match self.state.screens.get(&id) {
                Some(proxy) => (id, proxy.clone()),
                None => {
                    tracing::warn!("Screenshot {} failed: screen {} not found", file_name, screen);
                    return Err(CoreError::controller(format!("screen {} not found", screen)));
                }
            }
        };

        proxy.screenshot(file_name.to_string());
        // the file exists once the system compositor handled the request
        self.roundtrip()?;
        tracing::info!("Saved screenshot of screen {} as {}", id, file_name);
        Ok(())
    }
}

fn wayland_error(e: WaylandError) -> CoreError {
    CoreError::controller(format!("connection error: {}", e))
}

/// Socket path of a display name: absolute, or relative to the runtime dir.
pub fn display_socket_path(name: &str) -> anyhow::Result<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_absolute() {
        return Ok(path);
    }
    let runtime_dir = std::env::var_os(RUNTIME_DIR_ENV)
        .with_context(|| format!("{} is not set, cannot resolve display {}", RUNTIME_DIR_ENV, name))?;
    Ok(PathBuf::from(runtime_dir).join(path))
}
