//! Wayland protocol bindings for the IVI extensions.
//!
//! Core and upstream protocols come from `wayland-server`, `wayland-client`
//! and `wayland-protocols`. The GENIVI extensions are generated here from the
//! XML files in `protocols/` with `wayland-scanner`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! // Server-side: the embedded compositor implements ivi_application
//! use crate::core::wayland::protocol::server::ivi_application::ivi_application;
//!
//! // Client-side: the system compositor controller speaks ivi_controller
//! use crate::core::wayland::protocol::client::ivi_controller::ivi_controller;
//! ```

// =============================================================================
// Server-Side Protocol Bindings
// =============================================================================

/// Server-side bindings, implemented by the embedded compositor.
pub mod server {
    /// ivi_application: binds a wl_surface to a numeric ivi-id
    pub mod ivi_application {
        use wayland_server;
        use wayland_server::protocol::*;

        pub mod __interfaces {
            use wayland_server::protocol::__interfaces::*;
            wayland_scanner::generate_interfaces!("protocols/ivi-application.xml");
        }
        use self::__interfaces::*;

        wayland_scanner::generate_server_code!("protocols/ivi-application.xml");
    }

    /// ivi_controller: only used by the in-process fake system compositor of the tests
    pub mod ivi_controller {
        use wayland_server;
        use wayland_server::protocol::*;

        pub mod __interfaces {
            use wayland_server::protocol::__interfaces::*;
            wayland_scanner::generate_interfaces!("protocols/ivi-controller.xml");
        }
        use self::__interfaces::*;

        wayland_scanner::generate_server_code!("protocols/ivi-controller.xml");
    }
}

// =============================================================================
// Client-Side Protocol Bindings
// =============================================================================

/// Client-side bindings.
pub mod client {
    /// ivi_application, used by test clients of the embedded compositor
    pub mod ivi_application {
        use wayland_client;
        use wayland_client::protocol::*;

        pub mod __interfaces {
            use wayland_client::protocol::__interfaces::*;
            wayland_scanner::generate_interfaces!("protocols/ivi-application.xml");
        }
        use self::__interfaces::*;

        wayland_scanner::generate_client_code!("protocols/ivi-application.xml");
    }

    /// ivi_controller, spoken by the system compositor controller
    pub mod ivi_controller {
        use wayland_client;
        use wayland_client::protocol::*;

        pub mod __interfaces {
            use wayland_client::protocol::__interfaces::*;
            wayland_scanner::generate_interfaces!("protocols/ivi-controller.xml");
        }
        use self::__interfaces::*;

        wayland_scanner::generate_client_code!("protocols/ivi-controller.xml");
    }
}
