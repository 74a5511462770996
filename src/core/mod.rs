pub mod backend;
pub mod compositor;
pub mod config;
pub mod errors;
pub mod ids;
pub mod ivi_application;
pub mod socket_manager;
pub mod state;
pub mod surface;
pub mod wayland;

// Re-export key types
pub use backend::{create_embedded_compositor, CompositorBackend, EmbeddedCompositor, NullCompositor};
pub use compositor::EmbeddedCompositorServer;
pub use config::{EmbeddedCompositingConfig, SystemCompositorControllerConfig};
pub use errors::{CoreError, Result};
pub use state::CompositorState;
