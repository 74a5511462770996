// IVI stream compositor
//
// Embedded Wayland compositor that turns client buffers into renderer
// stream textures, plus a client for the ivi-controller protocol of the
// system compositor.

pub mod controller;
pub mod core;
pub mod stream;
pub mod util;

pub use crate::controller::SystemCompositorControllerClient;
pub use crate::core::{create_embedded_compositor, CompositorBackend, EmbeddedCompositingConfig, EmbeddedCompositor};
pub use crate::stream::StreamTextureManager;

#[cfg(test)]
mod tests;
