//! Event side of the ivi-controller client.
//!
//! `ControllerState` is the dispatch state of the controller's event queue.
//! It mirrors the screens and surfaces the system compositor announced.

use std::collections::{BTreeMap, VecDeque};

use wayland_client::protocol::{wl_output, wl_registry};
use wayland_client::{event_created_child, Connection, Dispatch, Proxy, QueueHandle};

use crate::core::ids::{IviLayerId, IviScreenId, IviSurfaceId};
use crate::core::wayland::protocol::client::ivi_controller::{
    ivi_controller, ivi_controller_layer, ivi_controller_screen, ivi_controller_surface,
};

/// Remote errors kept for `take_remote_errors`.
pub const MAX_REMOTE_ERRORS: usize = 64;

/// `error` event of the system compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub object_id: i32,
    pub object_type: i32,
    pub error_code: i32,
    pub error_text: String,
}

/// Statistics reported for a surface after `send_stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceStats {
    pub redraw_count: u32,
    pub frame_count: u32,
    pub update_count: u32,
    pub pid: u32,
    pub process_name: String,
}

#[derive(Debug, Default)]
pub struct ControllerState {
    pub controller: Option<ivi_controller::IviController>,
    /// Bound outputs; without them the system compositor announces no screens
    pub outputs: Vec<wl_output::WlOutput>,
    pub surfaces: BTreeMap<IviSurfaceId, ivi_controller_surface::IviControllerSurface>,
    pub screens: BTreeMap<IviScreenId, ivi_controller_screen::IviControllerScreen>,
    pub layers_seen: Vec<IviLayerId>,
    pub stats: BTreeMap<IviSurfaceId, SurfaceStats>,
    pub errors: VecDeque<RemoteError>,
}

impl ControllerState {
    /// Proxy of `surface`, created on first use.
    pub fn surface_proxy(
        &mut self,
        surface: IviSurfaceId,
        qh: &QueueHandle<Self>,
    ) -> Option<ivi_controller_surface::IviControllerSurface> {
        if let Some(proxy) = self.surfaces.get(&surface) {
            return Some(proxy.clone());
        }
        let controller = self.controller.as_ref()?;
        let proxy = controller.surface_create(surface.value(), qh, surface);
        self.surfaces.insert(surface, proxy.clone());
        Some(proxy)
    }

    fn push_error(&mut self, error: RemoteError) {
        if self.errors.len() == MAX_REMOTE_ERRORS {
            self.errors.pop_front();
        }
        self.errors.push_back(error);
    }
}

impl Dispatch<wl_registry::WlRegistry, ()> for ControllerState {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        if let wl_registry::Event::Global { name, interface, version } = event {
            match &interface[..] {
                "wl_output" => {
                    state.outputs.push(registry.bind(name, version.min(2), qh, ()));
                }
                "ivi_controller" => {
                    if state.controller.is_some() {
                        tracing::warn!("Ignoring second ivi_controller global {}", name);
                        return;
                    }
                    tracing::debug!("Binding ivi_controller (global {}, version {})", name, version);
                    state.controller = Some(registry.bind(name, 1, qh, ()));
                }
                _ => {}
            }
        }
    }
}

impl Dispatch<wl_output::WlOutput, ()> for ControllerState {
    fn event(_: &mut Self, _: &wl_output::WlOutput, _: wl_output::Event, _: &(), _: &Connection, _: &QueueHandle<Self>) {}
}

impl Dispatch<ivi_controller::IviController, ()> for ControllerState {
    fn event(
        state: &mut Self,
        _: &ivi_controller::IviController,
        event: ivi_controller::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            ivi_controller::Event::Screen { id_screen, screen } => {
                let id = IviScreenId(id_screen);
                tracing::info!("Detected ivi-screen: {}", id);
                if state.screens.contains_key(&id) {
                    tracing::error!("Screen with id {} already registered", id);
                    return;
                }
                state.screens.insert(id, screen);
            }
            ivi_controller::Event::Layer { id_layer } => {
                let id = IviLayerId(id_layer);
                tracing::info!("Detected ivi-layer: {}", id);
                if !state.layers_seen.contains(&id) {
                    state.layers_seen.push(id);
                }
            }
            ivi_controller::Event::Surface { id_surface } => {
                let id = IviSurfaceId(id_surface);
                tracing::info!("Detected ivi-surface: {}", id);
                state.surface_proxy(id, qh);
            }
            ivi_controller::Event::Error {
                object_id,
                object_type,
                error_code,
                error_text,
            } => {
                tracing::error!(
                    "ivi_controller error: {} {} code {}: {}",
                    object_type_name(object_type),
                    object_id,
                    error_code,
                    error_text
                );
                state.push_error(RemoteError {
                    object_id,
                    object_type,
                    error_code,
                    error_text,
                });
            }
        }
    }

    event_created_child!(ControllerState, ivi_controller::IviController, [
        ivi_controller::EVT_SCREEN_OPCODE => (ivi_controller_screen::IviControllerScreen, ()),
    ]);
}

impl Dispatch<ivi_controller_surface::IviControllerSurface, IviSurfaceId> for ControllerState {
    fn event(
        state: &mut Self,
        proxy: &ivi_controller_surface::IviControllerSurface,
        event: ivi_controller_surface::Event,
        id: &IviSurfaceId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            ivi_controller_surface::Event::Stats {
                redraw_count,
                frame_count,
                update_count,
                pid,
                process_name,
            } => {
                tracing::info!(
                    "Surface {} stats: redraws={} frames={} updates={} pid={} process={}",
                    id,
                    redraw_count,
                    frame_count,
                    update_count,
                    pid,
                    process_name
                );
                state.stats.insert(
                    *id,
                    SurfaceStats {
                        redraw_count,
                        frame_count,
                        update_count,
                        pid,
                        process_name,
                    },
                );
            }
            ivi_controller_surface::Event::Destroyed => {
                tracing::info!("Surface {} was destroyed by the system compositor", id);
                // only purge if the map still holds this very proxy
                if state.surfaces.get(id).is_some_and(|p| p.id() == proxy.id()) {
                    state.surfaces.remove(id);
                    state.stats.remove(id);
                    proxy.destroy(0);
                }
            }
            ivi_controller_surface::Event::Content { content_state } => {
                tracing::debug!("Surface {} content state {}", id, content_state);
            }
            ivi_controller_surface::Event::Visibility { visibility } => {
                tracing::debug!("Surface {} visibility {}", id, visibility);
            }
            ivi_controller_surface::Event::Opacity { opacity } => {
                tracing::debug!("Surface {} opacity {}", id, opacity);
            }
            ivi_controller_surface::Event::DestinationRectangle { x, y, width, height } => {
                tracing::debug!("Surface {} destination ({}, {}, {}, {})", id, x, y, width, height);
            }
            _ => {}
        }
    }
}

impl Dispatch<ivi_controller_layer::IviControllerLayer, IviLayerId> for ControllerState {
    fn event(
        _: &mut Self,
        _: &ivi_controller_layer::IviControllerLayer,
        event: ivi_controller_layer::Event,
        id: &IviLayerId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let ivi_controller_layer::Event::Visibility { visibility } = event {
            tracing::debug!("Layer {} visibility {}", id, visibility);
        }
    }
}

impl Dispatch<ivi_controller_screen::IviControllerScreen, ()> for ControllerState {
    fn event(
        _: &mut Self,
        _: &ivi_controller_screen::IviControllerScreen,
        _: ivi_controller_screen::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

/// Readable name of an `ivi_controller.object_type` value.
pub fn object_type_name(object_type: i32) -> &'static str {
    match u32::try_from(object_type).ok().map(ivi_controller::ObjectType::try_from) {
        Some(Ok(ivi_controller::ObjectType::Surface)) => "surface",
        Some(Ok(ivi_controller::ObjectType::Layer)) => "layer",
        Some(Ok(ivi_controller::ObjectType::Screen)) => "screen",
        _ => "unknown",
    }
}
