//! wl_compositor, wl_surface, wl_region and wl_callback.

use wayland_server::backend::ClientId;
use wayland_server::{
    protocol::{wl_callback, wl_compositor, wl_region, wl_surface},
    Dispatch, DisplayHandle, GlobalDispatch, Resource,
};

use crate::core::ids::{BufferId, SurfaceId};
use crate::core::state::CompositorState;

impl GlobalDispatch<wl_compositor::WlCompositor, ()> for CompositorState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &wayland_server::Client,
        resource: wayland_server::New<wl_compositor::WlCompositor>,
        _global_data: &(),
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
        state.compositor_bound(&client.id());
    }
}

impl Dispatch<wl_compositor::WlCompositor, ()> for CompositorState {
    fn request(
        state: &mut Self,
        client: &wayland_server::Client,
        _resource: &wl_compositor::WlCompositor,
        request: wl_compositor::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        match request {
            wl_compositor::Request::CreateSurface { id } => {
                let surface_id = state.next_surface_id();
                let surface = data_init.init(id, surface_id);
                state.add_surface(surface_id, Some(client.id()), Some(surface));
            }
            wl_compositor::Request::CreateRegion { id } => {
                // regions have no effect on stream textures
                data_init.init(id, ());
            }
            _ => {}
        }
    }

    fn destroyed(state: &mut Self, client: ClientId, _resource: &wl_compositor::WlCompositor, _data: &()) {
        state.compositor_unbound(&client);
    }
}

impl Dispatch<wl_surface::WlSurface, SurfaceId> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wl_surface::WlSurface,
        request: wl_surface::Request,
        data: &SurfaceId,
        _dhandle: &DisplayHandle,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        let id = *data;
        match request {
            wl_surface::Request::Attach { buffer, x, y } => {
                let buffer_id = buffer.as_ref().and_then(|b| b.data::<BufferId>()).copied();
                match buffer_id {
                    Some(b) => tracing::debug!("Surface {} attached buffer {} at ({}, {})", id, b, x, y),
                    None => tracing::debug!("Surface {} detached buffer", id),
                }
                state.attach_buffer(id, buffer_id);
            }
            wl_surface::Request::Frame { callback } => {
                let cb = data_init.init(callback, ());
                state.queue_frame_callback(id, cb);
            }
            wl_surface::Request::Commit => {
                state.handle_surface_commit(id);
            }
            wl_surface::Request::Destroy => {}
            _ => {}
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, _resource: &wl_surface::WlSurface, data: &SurfaceId) {
        state.destroy_surface(*data);
    }
}

impl Dispatch<wl_region::WlRegion, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wl_region::WlRegion,
        _request: wl_region::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
    }
}

impl Dispatch<wl_callback::WlCallback, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wl_callback::WlCallback,
        _request: wl_callback::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        // Callbacks don't have requests, they're one-shot events
    }
}

/// Register the wl_compositor global
pub fn register_compositor(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, wl_compositor::WlCompositor, ()>(4, ())
}
