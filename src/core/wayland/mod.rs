//! Wayland protocol implementations of the embedded compositor.
//!
//! Each module holds the dispatch implementations of one protocol on
//! `CompositorState`; `register` creates all globals.

pub mod compositor;
pub mod ivi_application;
pub mod linux_dmabuf;
pub mod protocol;
pub mod shell;
pub mod shm;

use wayland_server::DisplayHandle;

/// Create every global the embedded compositor offers.
pub fn register(display: &DisplayHandle) {
    compositor::register_compositor(display);
    shm::register_shm(display);
    linux_dmabuf::register_linux_dmabuf(display);
    shell::register_shell(display);
    ivi_application::register_ivi_application(display);
    tracing::debug!("Registered wl_compositor, wl_shm, zwp_linux_dmabuf_v1, wl_shell, ivi_application");
}
