//! End-to-end tests with real wayland clients.
