//! wl_shell
//!
//! Only the surface title is of interest; it shows up in diagnostics.

use wayland_server::{
    protocol::{wl_shell, wl_shell_surface},
    Dispatch, DisplayHandle, GlobalDispatch, Resource,
};

use crate::core::ids::SurfaceId;
use crate::core::state::CompositorState;

impl GlobalDispatch<wl_shell::WlShell, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &wayland_server::Client,
        resource: wayland_server::New<wl_shell::WlShell>,
        _global_data: &(),
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
    }
}

impl Dispatch<wl_shell::WlShell, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &wayland_server::Client,
        resource: &wl_shell::WlShell,
        request: wl_shell::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        if let wl_shell::Request::GetShellSurface { id, surface } = request {
            let Some(surface_id) = surface.data::<SurfaceId>().copied() else {
                data_init.init(id, SurfaceId::new(0));
                return;
            };
            data_init.init(id, surface_id);

            let first = state
                .surface_mut(surface_id)
                .map(|s| s.set_shell_surface())
                .unwrap_or(false);
            if !first {
                tracing::error!("Surface {} already has a shell surface", surface_id);
                resource.post_error(
                    wl_shell::Error::Role,
                    format!("surface {} already has a shell surface", surface_id),
                );
            }
        }
    }
}

impl Dispatch<wl_shell_surface::WlShellSurface, SurfaceId> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &wayland_server::Client,
        resource: &wl_shell_surface::WlShellSurface,
        request: wl_shell_surface::Request,
        data: &SurfaceId,
        _dhandle: &DisplayHandle,
        _data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        match request {
            wl_shell_surface::Request::SetTitle { title } => {
                state.set_surface_title(*data, title);
            }
            wl_shell_surface::Request::Pong { .. } => {}
            _ => {
                tracing::trace!("Ignoring {} request on surface {}", resource.id(), data);
            }
        }
    }
}

/// Register the wl_shell global
pub fn register_shell(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, wl_shell::WlShell, ()>(1, ())
}
