//! wl_shm, wl_shm_pool and wl_buffer.

use wayland_server::backend::ClientId;
use wayland_server::{
    protocol::{wl_buffer, wl_shm, wl_shm_pool},
    Dispatch, DisplayHandle, GlobalDispatch, Resource, WEnum,
};

use crate::core::ids::{BufferId, PoolId};
use crate::core::state::CompositorState;
use crate::core::surface::{shm::SUPPORTED_FORMATS, validate_shm_buffer, BufferKind, ShmBufferData, ShmPool};

impl GlobalDispatch<wl_shm::WlShm, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &wayland_server::Client,
        resource: wayland_server::New<wl_shm::WlShm>,
        _global_data: &(),
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        let shm = data_init.init(resource, ());
        for format in SUPPORTED_FORMATS {
            shm.format(format);
        }
    }
}

impl Dispatch<wl_shm::WlShm, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &wayland_server::Client,
        resource: &wl_shm::WlShm,
        request: wl_shm::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        if let wl_shm::Request::CreatePool { id, fd, size } = request {
            match ShmPool::new(fd, size) {
                Ok(pool) => {
                    let pool_id = state.add_shm_pool(pool);
                    data_init.init(id, pool_id);
                    tracing::debug!("wl_shm.create_pool: pool {} with {} bytes", pool_id, size);
                }
                Err(e) => {
                    // never registered, so the pool's destructor has nothing to drop
                    data_init.init(id, PoolId::new(0));
                    resource.post_error(wl_shm::Error::InvalidFd, e.to_string());
                }
            }
        }
    }
}

impl Dispatch<wl_shm_pool::WlShmPool, PoolId> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &wayland_server::Client,
        resource: &wl_shm_pool::WlShmPool,
        request: wl_shm_pool::Request,
        data: &PoolId,
        _dhandle: &DisplayHandle,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        let pool_id = *data;
        match request {
            wl_shm_pool::Request::CreateBuffer {
                id,
                offset,
                width,
                height,
                stride,
                format,
            } => {
                let format = match format {
                    WEnum::Value(f) => f as u32,
                    WEnum::Unknown(f) => f,
                };
                let pool_size = state
                    .shm_pools
                    .get(&pool_id)
                    .map(|entry| entry.pool.size())
                    .unwrap_or(0);

                if let Err(e) = validate_shm_buffer(pool_size, offset, width, height, stride, format) {
                    data_init.init(id, BufferId::new(0));
                    tracing::error!("wl_shm_pool.create_buffer rejected: {}", e);
                    resource.post_error(e.wire_code(), e.to_string());
                    return;
                }

                let buffer_id = state.buffers.allocate_id();
                let buffer = data_init.init(id, buffer_id);
                let kind = BufferKind::Shm(ShmBufferData {
                    pool: pool_id,
                    offset,
                    width,
                    height,
                    stride,
                    format,
                });
                state.add_buffer(buffer_id, kind, Some(buffer));
                tracing::debug!("wl_shm_pool.create_buffer: {}x{} (id={})", width, height, buffer_id);
            }
            wl_shm_pool::Request::Resize { size } => {
                if let Some(entry) = state.shm_pools.get_mut(&pool_id) {
                    if let Err(e) = entry.pool.resize(size) {
                        resource.post_error(wl_shm::Error::InvalidStride, e.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, _resource: &wl_shm_pool::WlShmPool, data: &PoolId) {
        state.shm_pool_destroyed(*data);
    }
}

impl Dispatch<wl_buffer::WlBuffer, BufferId> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &wl_buffer::WlBuffer,
        _request: wl_buffer::Request,
        _data: &BufferId,
        _dhandle: &DisplayHandle,
        _data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        // Destroy is the only request, handled in destroyed()
    }

    fn destroyed(state: &mut Self, _client: ClientId, _resource: &wl_buffer::WlBuffer, data: &BufferId) {
        state.remove_buffer(*data);
    }
}

/// Register the wl_shm global
pub fn register_shm(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, wl_shm::WlShm, ()>(1, ())
}
