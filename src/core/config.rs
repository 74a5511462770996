//! Embedded compositor configuration.

use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::path::PathBuf;
use std::time::Duration;

use crate::core::errors::{CoreError, Result};

/// Environment variable holding the runtime directory for named sockets.
pub const RUNTIME_DIR_ENV: &str = "XDG_RUNTIME_DIR";
/// Environment variable carrying an inherited, already bound listening socket.
pub const SOCKET_FD_ENV: &str = "IVI_EMBEDDED_COMPOSITOR_SOCKET_FD";
/// Environment variable naming the socket of the embedded compositor.
pub const SOCKET_NAME_ENV: &str = "IVI_EMBEDDED_COMPOSITOR_SOCKET";

pub const DEFAULT_SOCKET_PERMISSIONS: u32 = 0o660;
pub const DEFAULT_MAX_FRAME_CALLBACK_POLL_TIME: Duration = Duration::from_millis(10);

/// Where the embedded compositor listens for clients.
#[derive(Debug)]
pub enum SocketSource<'a> {
    Named { name: &'a str, runtime_dir: &'a PathBuf },
    Fd(&'a OwnedFd),
}

/// Configuration for the embedded compositor
#[derive(Debug)]
pub struct EmbeddedCompositingConfig {
    /// Socket name relative to the runtime directory (e.g. "wayland-ivi-0")
    pub socket_name: Option<String>,
    /// Pre-bound listening socket
    pub socket_fd: Option<OwnedFd>,
    /// POSIX group the socket file is handed to
    pub socket_group: Option<String>,
    /// Permission bits applied to the socket file
    pub socket_permissions: u32,
    /// Directory the named socket is created in
    pub runtime_dir: Option<PathBuf>,
    /// Upper bound for a blocking wait on client activity
    pub max_frame_callback_poll_time: Duration,
}

impl Default for EmbeddedCompositingConfig {
    fn default() -> Self {
        Self {
            socket_name: None,
            socket_fd: None,
            socket_group: None,
            socket_permissions: DEFAULT_SOCKET_PERMISSIONS,
            runtime_dir: None,
            max_frame_callback_poll_time: DEFAULT_MAX_FRAME_CALLBACK_POLL_TIME,
        }
    }
}

impl EmbeddedCompositingConfig {
    /// Build a configuration from the process environment.
    ///
    /// Picks up the runtime directory, the socket name and an inherited socket
    /// fd if the corresponding variables are set. Validation is left to
    /// [`EmbeddedCompositingConfig::validate`].
    pub fn from_env() -> Self {
        let mut config = Self {
            runtime_dir: std::env::var_os(RUNTIME_DIR_ENV).map(PathBuf::from),
            socket_name: std::env::var(SOCKET_NAME_ENV).ok(),
            ..Self::default()
        };

        if let Ok(value) = std::env::var(SOCKET_FD_ENV) {
            match value.parse::<RawFd>() {
                Ok(fd) if is_open_fd(fd) => {
                    // SAFETY: the fd was handed to this process for exclusive use
                    config.socket_fd = Some(unsafe { OwnedFd::from_raw_fd(fd) });
                }
                _ => tracing::warn!("Ignoring invalid {}={}", SOCKET_FD_ENV, value),
            }
        }

        config
    }

    pub fn with_socket_name(mut self, name: impl Into<String>) -> Self {
        self.socket_name = Some(name.into());
        self
    }

    pub fn with_socket_fd(mut self, fd: OwnedFd) -> Self {
        self.socket_fd = Some(fd);
        self
    }

    pub fn with_socket_group(mut self, group: impl Into<String>) -> Self {
        self.socket_group = Some(group.into());
        self
    }

    pub fn with_socket_permissions(mut self, mode: u32) -> Self {
        self.socket_permissions = mode;
        self
    }

    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = Some(dir.into());
        self
    }

    pub fn with_max_frame_callback_poll_time(mut self, timeout: Duration) -> Self {
        self.max_frame_callback_poll_time = timeout;
        self
    }

    /// Whether any socket is configured at all.
    pub fn has_socket(&self) -> bool {
        self.socket_fd.is_some() || self.socket_name.as_deref().is_some_and(|n| !n.is_empty())
    }

    /// Check the socket settings and return the endpoint to listen on.
    ///
    /// At most one of name and fd may be set, and a name needs a runtime directory.
    pub fn validate(&self) -> Result<SocketSource<'_>> {
        let name = self.socket_name.as_deref().filter(|n| !n.is_empty());

        match (name, &self.socket_fd) {
            (Some(name), Some(_)) => Err(CoreError::config(format!(
                "both socket name '{}' and socket fd are set, only one is allowed",
                name
            ))),
            (None, None) => Err(CoreError::config(
                "neither a socket name nor a socket fd is set",
            )),
            (None, Some(fd)) => Ok(SocketSource::Fd(fd)),
            (Some(name), None) => match &self.runtime_dir {
                Some(runtime_dir) => Ok(SocketSource::Named { name, runtime_dir }),
                None => Err(CoreError::config(format!(
                    "socket name '{}' is set but {} is not",
                    name, RUNTIME_DIR_ENV
                ))),
            },
        }
    }
}

fn is_open_fd(fd: RawFd) -> bool {
    // SAFETY: F_GETFD only queries descriptor flags
    fd >= 0 && unsafe { libc::fcntl(fd, libc::F_GETFD) } != -1
}

/// Configuration of the ivi-controller client.
#[derive(Debug, Clone, Default)]
pub struct SystemCompositorControllerConfig {
    /// Display of the system compositor; `None` uses `WAYLAND_DISPLAY`
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn test_config_default() {
        let config = EmbeddedCompositingConfig::default();
        assert!(config.socket_name.is_none());
        assert!(config.socket_fd.is_none());
        assert_eq!(config.socket_permissions, 0o660);
        assert_eq!(config.max_frame_callback_poll_time, Duration::from_millis(10));
        assert!(!config.has_socket());
    }

    #[test]
    fn test_validate_requires_a_socket() {
        let config = EmbeddedCompositingConfig::default().with_runtime_dir("/tmp");
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        let config = EmbeddedCompositingConfig::default()
            .with_socket_name("")
            .with_runtime_dir("/tmp");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_name_needs_runtime_dir() {
        let config = EmbeddedCompositingConfig::default().with_socket_name("wayland-ivi-0");
        assert!(config.validate().is_err());

        let config = config.with_runtime_dir("/tmp");
        match config.validate() {
            Ok(SocketSource::Named { name, .. }) => assert_eq!(name, "wayland-ivi-0"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_name_and_fd() {
        let dir = std::env::temp_dir().join(format!("ivi-config-test-{}", std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("both");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        let config = EmbeddedCompositingConfig::default()
            .with_socket_name("wayland-ivi-0")
            .with_runtime_dir(&dir)
            .with_socket_fd(OwnedFd::from(listener));
        assert!(config.validate().is_err());

        let config = EmbeddedCompositingConfig {
            socket_name: None,
            ..config
        };
        assert!(matches!(config.validate(), Ok(SocketSource::Fd(_))));
        let _ = std::fs::remove_dir_all(dir);
    }
}
