//! Texture upload seam between the compositor and the renderer.

use std::collections::HashMap;

use crate::core::errors::{CoreError, Result};
use crate::core::ids::TextureHandle;
use crate::core::surface::GpuImage;

/// Renderer side of a stream texture upload.
pub trait TextureUploader {
    fn create_texture(&mut self) -> TextureHandle;

    /// Copy client pixels (4 bytes per pixel, rows `stride` bytes apart).
    fn upload_shm(
        &mut self,
        texture: TextureHandle,
        width: i32,
        height: i32,
        stride: i32,
        format: u32,
        bytes: &[u8],
    ) -> Result<()>;

    /// Bind an external GPU image to the texture.
    fn import_gpu_image(&mut self, texture: TextureHandle, image: &GpuImage) -> Result<()>;

    /// Reset the channel swizzle after switching from GPU to SHM content.
    fn reset_swizzle(&mut self, texture: TextureHandle);

    fn delete_texture(&mut self, texture: TextureHandle);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureSource {
    Empty,
    Shm { format: u32 },
    Gpu { fourcc: u32, modifier: u64 },
}

#[derive(Debug, Clone)]
pub struct StoredTexture {
    pub width: i32,
    pub height: i32,
    /// Tightly packed rows of the last SHM upload
    pub pixels: Vec<u8>,
    pub source: TextureSource,
    pub uploads: u64,
    pub swizzle_resets: u64,
}

impl StoredTexture {
    fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            pixels: Vec::new(),
            source: TextureSource::Empty,
            uploads: 0,
            swizzle_resets: 0,
        }
    }
}

/// CPU-side texture store, used headless and in tests.
#[derive(Debug)]
pub struct MemoryTextureStore {
    textures: HashMap<TextureHandle, StoredTexture>,
    next_handle: u32,
    accept_gpu_images: bool,
}

impl Default for MemoryTextureStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTextureStore {
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            next_handle: 0,
            accept_gpu_images: true,
        }
    }

    /// Refuse GPU imports, like a renderer without dmabuf support.
    pub fn without_gpu_import(mut self) -> Self {
        self.accept_gpu_images = false;
        self
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&StoredTexture> {
        self.textures.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    fn texture_mut(&mut self, handle: TextureHandle) -> Result<&mut StoredTexture> {
        self.textures
            .get_mut(&handle)
            .ok_or_else(|| CoreError::upload(format!("unknown texture {}", handle)))
    }
}

impl TextureUploader for MemoryTextureStore {
    fn create_texture(&mut self) -> TextureHandle {
        let handle = TextureHandle::new(self.next_handle);
        self.next_handle += 1;
        self.textures.insert(handle, StoredTexture::empty());
        handle
    }

    fn upload_shm(
        &mut self,
        texture: TextureHandle,
        width: i32,
        height: i32,
        stride: i32,
        format: u32,
        bytes: &[u8],
    ) -> Result<()> {
        let row_len = width as usize * 4;
        let stride = stride as usize;
        if width <= 0 || height <= 0 || stride < row_len || bytes.len() < stride * (height as usize - 1) + row_len {
            return Err(CoreError::upload(format!(
                "{} bytes do not hold {}x{} pixels with stride {}",
                bytes.len(),
                width,
                height,
                stride
            )));
        }

        let target = self.texture_mut(texture)?;
        target.pixels.clear();
        for row in bytes.chunks(stride).take(height as usize) {
            target.pixels.extend_from_slice(&row[..row_len]);
        }
        target.width = width;
        target.height = height;
        target.source = TextureSource::Shm { format };
        target.uploads += 1;
        Ok(())
    }

    fn import_gpu_image(&mut self, texture: TextureHandle, image: &GpuImage) -> Result<()> {
        if !self.accept_gpu_images {
            return Err(CoreError::upload("GPU image import is not supported"));
        }
        let target = self.texture_mut(texture)?;
        target.pixels.clear();
        target.width = image.width;
        target.height = image.height;
        target.source = TextureSource::Gpu {
            fourcc: image.fourcc,
            modifier: image.modifier,
        };
        target.uploads += 1;
        Ok(())
    }

    fn reset_swizzle(&mut self, texture: TextureHandle) {
        if let Some(target) = self.textures.get_mut(&texture) {
            target.swizzle_resets += 1;
        }
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_strips_row_padding() {
        let mut store = MemoryTextureStore::new();
        let texture = store.create_texture();
        // 1x2 image with 8 byte stride
        let bytes = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8];
        store.upload_shm(texture, 1, 2, 8, 0, &bytes).unwrap();

        let stored = store.texture(texture).unwrap();
        assert_eq!(stored.pixels, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(stored.uploads, 1);
    }

    #[test]
    fn test_upload_rejects_short_data() {
        let mut store = MemoryTextureStore::new();
        let texture = store.create_texture();
        assert!(store.upload_shm(texture, 2, 2, 8, 0, &[0; 12]).is_err());
        assert!(store.upload_shm(TextureHandle::new(99), 1, 1, 4, 0, &[0; 4]).is_err());
    }

    #[test]
    fn test_gpu_import_can_be_refused() {
        let image = GpuImage {
            width: 4,
            height: 4,
            fourcc: 0x3432_5241,
            modifier: 0,
            planes: Vec::new(),
        };
        let mut store = MemoryTextureStore::new();
        let texture = store.create_texture();
        assert!(store.import_gpu_image(texture, &image).is_ok());

        let mut store = MemoryTextureStore::new().without_gpu_import();
        let texture = store.create_texture();
        assert!(store.import_gpu_image(texture, &image).is_err());
    }

    #[test]
    fn test_delete_texture() {
        let mut store = MemoryTextureStore::new();
        let texture = store.create_texture();
        store.delete_texture(texture);
        assert!(store.is_empty());
    }
}
