//! Shared memory pools backing wl_shm buffers.

use std::os::fd::{AsRawFd, OwnedFd};
use std::ptr::NonNull;

use thiserror::Error;
use wayland_server::protocol::wl_shm;

use crate::core::errors::{CoreError, Result};

/// Formats advertised on wl_shm.
pub const SUPPORTED_FORMATS: [wl_shm::Format; 2] = [wl_shm::Format::Argb8888, wl_shm::Format::Xrgb8888];

const BYTES_PER_PIXEL: i32 = 4;

/// A client memory pool, mapped for the lifetime of the object.
pub struct ShmPool {
    fd: OwnedFd,
    size: usize,
    data: NonNull<u8>,
}

// SAFETY: the mapping is only touched from the compositor thread; the
// pointer is never handed out beyond borrowed slices.
unsafe impl Send for ShmPool {}
unsafe impl Sync for ShmPool {}

impl std::fmt::Debug for ShmPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmPool")
            .field("fd", &self.fd.as_raw_fd())
            .field("size", &self.size)
            .finish()
    }
}

fn map_fd(fd: &OwnedFd, size: usize) -> Result<NonNull<u8>> {
    if size == 0 {
        return Err(CoreError::shm("cannot map an empty pool"));
    }
    // SAFETY: mapping a caller supplied fd read-only and shared
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ,
            libc::MAP_SHARED,
            fd.as_raw_fd(),
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(CoreError::shm(format!(
            "mmap of fd {} with {} bytes failed: {}",
            fd.as_raw_fd(),
            size,
            std::io::Error::last_os_error()
        )));
    }
    NonNull::new(ptr as *mut u8).ok_or_else(|| CoreError::shm("mmap returned null"))
}

impl ShmPool {
    /// Map `size` bytes of `fd`. Fails if the fd cannot be mapped.
    pub fn new(fd: OwnedFd, size: i32) -> Result<Self> {
        if size <= 0 {
            return Err(CoreError::shm(format!("invalid pool size {}", size)));
        }
        let size = size as usize;
        let data = map_fd(&fd, size)?;
        tracing::debug!("Mapped SHM pool fd={} ({} bytes)", fd.as_raw_fd(), size);
        Ok(Self { fd, size, data })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Grow the pool. Shrinking is a client error.
    pub fn resize(&mut self, new_size: i32) -> Result<()> {
        if new_size < 0 || (new_size as usize) < self.size {
            return Err(CoreError::shm(format!(
                "pool can only grow ({} -> {})",
                self.size, new_size
            )));
        }
        let new_size = new_size as usize;
        if new_size == self.size {
            return Ok(());
        }

        let data = map_fd(&self.fd, new_size)?;
        // SAFETY: the old mapping was created by map_fd with self.size
        unsafe {
            libc::munmap(self.data.as_ptr() as *mut libc::c_void, self.size);
        }
        self.data = data;
        self.size = new_size;
        tracing::debug!("Resized SHM pool to {} bytes", self.size);
        Ok(())
    }

    /// Borrow `len` bytes starting at `offset`, if inside the pool.
    pub fn bytes(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        if end > self.size {
            return None;
        }
        // SAFETY: the range was checked against the mapped size
        Some(unsafe { std::slice::from_raw_parts(self.data.as_ptr().add(offset), len) })
    }
}

impl Drop for ShmPool {
    fn drop(&mut self) {
        // SAFETY: unmapping the region created in new/resize
        unsafe {
            libc::munmap(self.data.as_ptr() as *mut libc::c_void, self.size);
        }
    }
}

/// Rejected wl_shm_pool.create_buffer parameters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShmBufferError {
    #[error("unsupported format {0:#x}")]
    InvalidFormat(u32),

    #[error("invalid geometry {width}x{height} stride {stride}")]
    InvalidGeometry { width: i32, height: i32, stride: i32 },

    #[error("buffer at offset {offset} with {len} bytes exceeds pool of {pool_size} bytes")]
    OutOfBounds { offset: i32, len: i64, pool_size: usize },
}

impl ShmBufferError {
    /// The wl_shm error code posted for this violation.
    pub fn wire_code(&self) -> wl_shm::Error {
        match self {
            ShmBufferError::InvalidFormat(_) => wl_shm::Error::InvalidFormat,
            _ => wl_shm::Error::InvalidStride,
        }
    }
}

/// Check buffer parameters against the pool bounds.
pub fn validate_shm_buffer(
    pool_size: usize,
    offset: i32,
    width: i32,
    height: i32,
    stride: i32,
    format: u32,
) -> std::result::Result<(), ShmBufferError> {
    if !SUPPORTED_FORMATS.iter().any(|f| *f as u32 == format) {
        return Err(ShmBufferError::InvalidFormat(format));
    }
    if width <= 0 || height <= 0 || stride <= 0 || offset < 0 {
        return Err(ShmBufferError::InvalidGeometry { width, height, stride });
    }
    if (stride as i64) < width as i64 * BYTES_PER_PIXEL as i64 {
        return Err(ShmBufferError::InvalidGeometry { width, height, stride });
    }
    let len = stride as i64 * height as i64;
    if offset as i64 + len > pool_size as i64 {
        return Err(ShmBufferError::OutOfBounds { offset, len, pool_size });
    }
    Ok(())
}
