//! Socket Manager - handles the listening sockets of the embedded compositor
//!
//! Supports:
//! - A named Unix domain socket inside the runtime directory
//! - A pre-bound listening socket handed in as a file descriptor

use std::ffi::CString;
use std::os::fd::OwnedFd;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use wayland_server::ListeningSocket;

/// Socket type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
    /// Socket created by the compositor (e.g., wayland-ivi-0)
    Named,
    /// Listening socket created by someone else and passed as fd
    Inherited,
}

/// Information about a bound socket
#[derive(Debug)]
pub struct SocketInfo {
    /// Type of socket
    pub socket_type: SocketType,
    /// Path (for named sockets) or fd description
    pub identifier: String,
}

enum Listener {
    Named(ListeningSocket),
    Inherited(UnixListener),
}

impl Listener {
    fn accept(&mut self) -> Option<UnixStream> {
        match self {
            Listener::Named(socket) => match socket.accept() {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!("Failed to accept on named socket: {}", e);
                    None
                }
            },
            Listener::Inherited(listener) => match listener.accept() {
                Ok((stream, _)) => Some(stream),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
                Err(e) => {
                    tracing::warn!("Failed to accept on inherited socket: {}", e);
                    None
                }
            },
        }
    }

    fn as_raw_fd(&self) -> RawFd {
        match self {
            Listener::Named(socket) => socket.as_raw_fd(),
            Listener::Inherited(listener) => listener.as_raw_fd(),
        }
    }
}

/// Manages the listening sockets of the compositor
pub struct SocketManager {
    sockets: Vec<(Listener, SocketInfo)>,

    /// Primary socket name (empty when listening on an inherited fd)
    primary_socket: String,

    /// Runtime directory for named sockets
    runtime_dir: Option<PathBuf>,
}

impl SocketManager {
    /// Create a new socket manager
    pub fn new(runtime_dir: Option<&Path>) -> Result<Self> {
        if let Some(dir) = runtime_dir {
            if !dir.exists() {
                anyhow::bail!("Runtime directory {} does not exist", dir.display());
            }
        }

        Ok(Self {
            sockets: Vec::new(),
            primary_socket: String::new(),
            runtime_dir: runtime_dir.map(Path::to_path_buf),
        })
    }

    /// Bind the named socket and apply ownership and permissions
    pub fn bind_primary(&mut self, socket_name: &str, group: Option<&str>, permissions: u32) -> Result<()> {
        let runtime_dir = self
            .runtime_dir
            .as_ref()
            .context("Cannot bind a named socket without runtime directory")?;
        let socket_path = runtime_dir.join(socket_name);

        tracing::info!("Binding embedded compositor socket: {}", socket_path.display());

        let socket = ListeningSocket::bind_absolute(socket_path.clone())
            .with_context(|| format!("Failed to bind socket at {}", socket_path.display()))?;

        if let Some(group) = group {
            let gid = lookup_group_id(group)
                .with_context(|| format!("Socket group '{}' does not exist", group))?;
            std::os::unix::fs::chown(&socket_path, None, Some(gid))
                .with_context(|| format!("Failed to hand socket {} to group '{}'", socket_path.display(), group))?;
            tracing::debug!("Socket {} now belongs to group {} ({})", socket_path.display(), group, gid);
        }

        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(permissions))
            .with_context(|| format!("Failed to set permissions {:o} on {}", permissions, socket_path.display()))?;

        let info = SocketInfo {
            socket_type: SocketType::Named,
            identifier: socket_path.to_string_lossy().to_string(),
        };

        self.sockets.push((Listener::Named(socket), info));
        self.primary_socket = socket_name.to_string();

        Ok(())
    }

    /// Listen on a socket that was bound by the caller
    pub fn adopt_listening_fd(&mut self, fd: OwnedFd) -> Result<()> {
        let raw = fd.as_raw_fd();
        let listener = UnixListener::from(fd);
        listener
            .set_nonblocking(true)
            .with_context(|| format!("Failed to make inherited socket fd {} non-blocking", raw))?;

        tracing::info!("Listening on inherited socket fd {}", raw);

        let info = SocketInfo {
            socket_type: SocketType::Inherited,
            identifier: format!("fd:{}", raw),
        };
        self.sockets.push((Listener::Inherited(listener), info));

        Ok(())
    }

    /// Get information about all bound sockets
    pub fn get_socket_info(&self) -> Vec<&SocketInfo> {
        self.sockets.iter().map(|(_, info)| info).collect()
    }

    /// Get the primary socket name
    pub fn primary_socket_name(&self) -> &str {
        &self.primary_socket
    }

    /// Get all file descriptors for polling
    pub fn poll_fds(&self) -> Vec<RawFd> {
        self.sockets.iter().map(|(socket, _)| socket.as_raw_fd()).collect()
    }

    /// Accept a connection from any socket
    ///
    /// Returns `None` if no connections are pending
    pub fn accept_any(&mut self) -> Option<(SocketType, UnixStream)> {
        for (socket, info) in &mut self.sockets {
            if let Some(stream) = socket.accept() {
                return Some((info.socket_type, stream));
            }
        }
        None
    }

    /// Close all sockets and clean up socket files
    pub fn close_all(&mut self) {
        tracing::info!("Closing {} socket(s)", self.sockets.len());
        self.remove_socket_files();
        self.sockets.clear();
    }

    fn remove_socket_files(&self) {
        for (_, info) in &self.sockets {
            if info.socket_type == SocketType::Named {
                let path = Path::new(&info.identifier);
                if path.exists() {
                    if let Err(e) = std::fs::remove_file(path) {
                        tracing::warn!("Failed to remove socket file {}: {}", info.identifier, e);
                    } else {
                        tracing::debug!("Removed socket file: {}", info.identifier);
                    }
                }
            }
        }
    }
}

impl Drop for SocketManager {
    fn drop(&mut self) {
        self.remove_socket_files();
    }
}

/// Resolve a POSIX group name to its gid
pub fn lookup_group_id(name: &str) -> Option<u32> {
    let c_name = CString::new(name).ok()?;
    // SAFETY: all-zero is a valid bit pattern for the plain C struct
    let mut group: libc::group = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::group = std::ptr::null_mut();
    let mut buf = vec![0 as libc::c_char; 16 * 1024];

    // SAFETY: every pointer references a live local buffer of the given length
    let rc = unsafe {
        libc::getgrnam_r(c_name.as_ptr(), &mut group, buf.as_mut_ptr(), buf.len(), &mut result)
    };
    if rc != 0 || result.is_null() {
        return None;
    }
    Some(group.gr_gid)
}
