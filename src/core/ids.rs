//! Strongly typed identifiers.
//!
//! Every entity kind gets its own newtype so a layer id can never be passed
//! where a surface id is expected.

use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $inner);

        impl $name {
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            pub const fn value(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Process-wide unique id binding a wl_surface to a compositing source.
    IviSurfaceId(u32)
);
id_type!(
    /// Layer id of the external system compositor.
    IviLayerId(u32)
);
id_type!(
    /// Screen id of the external system compositor.
    IviScreenId(u32)
);
id_type!(
    /// Internal id of a wl_surface.
    SurfaceId(u32)
);
id_type!(
    /// Internal id of a wl_buffer.
    BufferId(u32)
);
id_type!(
    /// Internal id of a wl_shm_pool.
    PoolId(u32)
);
id_type!(DisplayId(u32));
id_type!(SceneId(u64));
id_type!(
    /// Sampler consumer inside a scene.
    ConsumerId(u32)
);
id_type!(
    /// Scene-local handle of a stream texture.
    StreamTextureHandle(u32)
);

/// Renderer-side handle of a composited texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureHandle(u32);

impl TextureHandle {
    pub const INVALID: TextureHandle = TextureHandle(u32::MAX);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

impl Default for TextureHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("<invalid>")
        }
    }
}
