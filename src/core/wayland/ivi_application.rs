//! ivi_application
//!
//! `surface_create` binds a wl_surface to an ivi-id. Conflicting bindings are
//! protocol errors and end the client connection.

use wayland_server::backend::ClientId;
use wayland_server::{Dispatch, DisplayHandle, GlobalDispatch, Resource};

use super::protocol::server::ivi_application::{ivi_application, ivi_surface};
use crate::core::ids::{IviSurfaceId, SurfaceId};
use crate::core::ivi_application::IviBindError;
use crate::core::state::CompositorState;

/// User data of an ivi_surface. `None` for a rejected `surface_create`.
#[derive(Debug, Clone, Copy)]
pub struct IviSurfaceData {
    pub binding: Option<(IviSurfaceId, SurfaceId)>,
}

impl IviBindError {
    fn wire_code(&self) -> ivi_application::Error {
        match self {
            IviBindError::IdInUse { .. } => ivi_application::Error::IviId,
            IviBindError::SurfaceAlreadyBound { .. } => ivi_application::Error::Role,
        }
    }
}

impl GlobalDispatch<ivi_application::IviApplication, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &wayland_server::Client,
        resource: wayland_server::New<ivi_application::IviApplication>,
        _global_data: &(),
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
    }
}

impl Dispatch<ivi_application::IviApplication, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &wayland_server::Client,
        resource: &ivi_application::IviApplication,
        request: ivi_application::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        let ivi_application::Request::SurfaceCreate { ivi_id, surface, id } = request;
        let ivi_id = IviSurfaceId::new(ivi_id);
        let Some(surface_id) = surface.data::<SurfaceId>().copied() else {
            data_init.init(id, IviSurfaceData { binding: None });
            return;
        };

        match state.bind_ivi_id(surface_id, ivi_id) {
            Ok(_) => {
                data_init.init(
                    id,
                    IviSurfaceData {
                        binding: Some((ivi_id, surface_id)),
                    },
                );
            }
            Err(e) => {
                data_init.init(id, IviSurfaceData { binding: None });
                tracing::error!("ivi_application.surface_create rejected: {}", e);
                resource.post_error(e.wire_code(), e.to_string());
            }
        }
    }
}

impl Dispatch<ivi_surface::IviSurface, IviSurfaceData> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &ivi_surface::IviSurface,
        _request: ivi_surface::Request,
        _data: &IviSurfaceData,
        _dhandle: &DisplayHandle,
        _data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        // Destroy is the only request, handled in destroyed()
    }

    fn destroyed(state: &mut Self, _client: ClientId, _resource: &ivi_surface::IviSurface, data: &IviSurfaceData) {
        if let Some((ivi_id, surface_id)) = data.binding {
            state.release_ivi_surface(ivi_id, surface_id);
        }
    }
}

/// Register the ivi_application global
pub fn register_ivi_application(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, ivi_application::IviApplication, ()>(1, ())
}
