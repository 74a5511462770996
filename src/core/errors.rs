//! Core error types

use thiserror::Error;

/// Core compositor errors
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Shared memory error: {0}")]
    Shm(String),

    #[error("Wayland protocol error: {0}")]
    Protocol(String),

    #[error("Invalid surface ID: {0}")]
    InvalidSurface(u32),

    #[error("No surface bound to ivi-id {0}")]
    InvalidIviSurface(u32),

    #[error("Texture upload failed: {0}")]
    Upload(String),

    #[error("System compositor controller error: {0}")]
    Controller(String),
}

impl CoreError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn socket(msg: impl Into<String>) -> Self {
        Self::Socket(msg.into())
    }

    pub fn shm(msg: impl Into<String>) -> Self {
        Self::Shm(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    pub fn controller(msg: impl Into<String>) -> Self {
        Self::Controller(msg.into())
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
