//! Linux DMABuf Protocol Implementation
//!
//! Clients rendering with a GPU hand in their buffers as dmabuf planes. The
//! compositor only records the planes; importing them into a texture is the
//! job of the texture uploader, which rejects the buffer if the import fails.

use std::sync::{Mutex, PoisonError};

use wayland_protocols::wp::linux_dmabuf::zv1::server::{zwp_linux_buffer_params_v1, zwp_linux_dmabuf_v1};
use wayland_server::protocol::wl_buffer::WlBuffer;
use wayland_server::{Dispatch, DisplayHandle, GlobalDispatch, Resource};

use crate::core::ids::BufferId;
use crate::core::state::CompositorState;
use crate::core::surface::{BufferKind, DmabufPlane, GpuImage};

/// DRM fourcc codes advertised to clients
pub const SUPPORTED_FOURCC: [u32; 4] = [
    0x3432_5241, // ARGB8888
    0x3432_5258, // XRGB8888
    0x3432_4241, // ABGR8888
    0x3432_4258, // XBGR8888
];
const DRM_FORMAT_MOD_LINEAR: u64 = 0;

/// Buffer parameters state (User data for zwp_linux_buffer_params_v1)
#[derive(Debug, Default)]
pub struct BufferParams {
    inner: Mutex<ParamsState>,
}

#[derive(Debug, Default)]
struct ParamsState {
    planes: Vec<DmabufPlane>,
    modifier: Option<u64>,
    used: bool,
}

impl GlobalDispatch<zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &wayland_server::Client,
        resource: wayland_server::New<zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1>,
        _global_data: &(),
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        let dmabuf = data_init.init(resource, ());
        for fourcc in SUPPORTED_FOURCC {
            dmabuf.format(fourcc);
            if dmabuf.version() >= 3 {
                dmabuf.modifier(fourcc, (DRM_FORMAT_MOD_LINEAR >> 32) as u32, DRM_FORMAT_MOD_LINEAR as u32);
            }
        }
    }
}

impl Dispatch<zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &wayland_server::Client,
        _resource: &zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1,
        request: zwp_linux_dmabuf_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        if let zwp_linux_dmabuf_v1::Request::CreateParams { params_id } = request {
            data_init.init(params_id, BufferParams::default());
        }
    }
}

impl BufferParams {
    /// Take the planes for buffer creation. `None` if the params were used before.
    fn take(&self, resource: &zwp_linux_buffer_params_v1::ZwpLinuxBufferParamsV1) -> Option<(Vec<DmabufPlane>, u64)> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.used {
            resource.post_error(
                zwp_linux_buffer_params_v1::Error::AlreadyUsed,
                "params were already used to create a buffer",
            );
            return None;
        }
        inner.used = true;
        let modifier = inner.modifier.unwrap_or(DRM_FORMAT_MOD_LINEAR);
        Some((std::mem::take(&mut inner.planes), modifier))
    }
}

fn gpu_image(width: i32, height: i32, fourcc: u32, modifier: u64, mut planes: Vec<DmabufPlane>) -> Result<GpuImage, String> {
    if width <= 0 || height <= 0 {
        return Err(format!("invalid size {}x{}", width, height));
    }
    if planes.is_empty() {
        return Err("no planes added".to_string());
    }
    if !SUPPORTED_FOURCC.contains(&fourcc) {
        return Err(format!("unsupported format {:#x}", fourcc));
    }
    planes.sort_by_key(|p| p.plane_idx);
    if planes.iter().enumerate().any(|(i, p)| p.plane_idx != i as u32) {
        return Err("planes are not contiguous".to_string());
    }
    Ok(GpuImage {
        width,
        height,
        fourcc,
        modifier,
        planes,
    })
}

impl Dispatch<zwp_linux_buffer_params_v1::ZwpLinuxBufferParamsV1, BufferParams> for CompositorState {
    fn request(
        state: &mut Self,
        client: &wayland_server::Client,
        resource: &zwp_linux_buffer_params_v1::ZwpLinuxBufferParamsV1,
        request: zwp_linux_buffer_params_v1::Request,
        params: &BufferParams,
        dhandle: &DisplayHandle,
        data_init: &mut wayland_server::DataInit<'_, Self>,
    ) {
        match request {
            zwp_linux_buffer_params_v1::Request::Add {
                fd,
                plane_idx,
                offset,
                stride,
                modifier_hi,
                modifier_lo,
            } => {
                let modifier = ((modifier_hi as u64) << 32) | (modifier_lo as u64);
                tracing::debug!("linux-dmabuf: received plane {} (modifier=0x{:016x})", plane_idx, modifier);

                let mut inner = params.inner.lock().unwrap_or_else(PoisonError::into_inner);
                if inner.used {
                    resource.post_error(zwp_linux_buffer_params_v1::Error::AlreadyUsed, "params already used");
                    return;
                }
                if inner.planes.iter().any(|p| p.plane_idx == plane_idx) {
                    resource.post_error(
                        zwp_linux_buffer_params_v1::Error::PlaneSet,
                        format!("plane {} already set", plane_idx),
                    );
                    return;
                }
                inner.modifier.get_or_insert(modifier);
                inner.planes.push(DmabufPlane {
                    fd,
                    plane_idx,
                    offset,
                    stride,
                });
            }
            zwp_linux_buffer_params_v1::Request::Create {
                width,
                height,
                format,
                flags: _,
            } => {
                let Some((planes, modifier)) = params.take(resource) else {
                    return;
                };
                let image = match gpu_image(width, height, format, modifier, planes) {
                    Ok(image) => image,
                    Err(e) => {
                        tracing::warn!("linux-dmabuf: create failed: {}", e);
                        resource.failed();
                        return;
                    }
                };

                let buffer_id = state.buffers.allocate_id();
                match client.create_resource::<WlBuffer, BufferId, CompositorState>(dhandle, 1, buffer_id) {
                    Ok(buffer) => {
                        resource.created(&buffer);
                        state.add_buffer(buffer_id, BufferKind::GpuBacked(image), Some(buffer));
                    }
                    Err(e) => {
                        tracing::error!("linux-dmabuf: failed to create wl_buffer: {}", e);
                        resource.failed();
                    }
                }
            }
            zwp_linux_buffer_params_v1::Request::CreateImmed {
                buffer_id: new_buffer,
                width,
                height,
                format,
                flags: _,
            } => {
                let Some((planes, modifier)) = params.take(resource) else {
                    data_init.init(new_buffer, BufferId::new(0));
                    return;
                };
                match gpu_image(width, height, format, modifier, planes) {
                    Ok(image) => {
                        let buffer_id = state.buffers.allocate_id();
                        let buffer = data_init.init(new_buffer, buffer_id);
                        state.add_buffer(buffer_id, BufferKind::GpuBacked(image), Some(buffer));
                    }
                    Err(e) => {
                        data_init.init(new_buffer, BufferId::new(0));
                        resource.post_error(zwp_linux_buffer_params_v1::Error::InvalidWlBuffer, e);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Register zwp_linux_dmabuf_v1 global
pub fn register_linux_dmabuf(display: &DisplayHandle) -> wayland_server::backend::GlobalId {
    display.create_global::<CompositorState, zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1, ()>(3, ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::OwnedFd;

    fn plane(idx: u32) -> DmabufPlane {
        let file = std::fs::File::open("/dev/null").unwrap();
        DmabufPlane {
            fd: OwnedFd::from(file),
            plane_idx: idx,
            offset: 0,
            stride: 256,
        }
    }

    #[test]
    fn test_gpu_image_validation() {
        assert!(gpu_image(64, 64, SUPPORTED_FOURCC[0], 0, vec![plane(0)]).is_ok());
        assert!(gpu_image(64, 64, SUPPORTED_FOURCC[0], 0, vec![plane(1), plane(0)]).is_ok());
        assert!(gpu_image(0, 64, SUPPORTED_FOURCC[0], 0, vec![plane(0)]).is_err());
        assert!(gpu_image(64, 64, SUPPORTED_FOURCC[0], 0, Vec::new()).is_err());
        assert!(gpu_image(64, 64, 0x1234, 0, vec![plane(0)]).is_err());
        assert!(gpu_image(64, 64, SUPPORTED_FOURCC[0], 0, vec![plane(1)]).is_err());
    }
}
