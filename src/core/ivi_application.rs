//! ivi-id bookkeeping of the ivi_application extension.
//!
//! An ivi-id is held by at most one live surface and a surface holds at most
//! one ivi-id. Every successful `surface_create` hands out one ivi_surface
//! handle; the binding goes away with the last handle or with the surface.

use std::collections::HashMap;

use thiserror::Error;

use crate::core::ids::{IviSurfaceId, SurfaceId};

/// A rejected `surface_create`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IviBindError {
    #[error("ivi-id {ivi_id} is already bound to surface {holder}")]
    IdInUse { ivi_id: IviSurfaceId, holder: SurfaceId },

    #[error("surface {surface} is already bound to ivi-id {existing}")]
    SurfaceAlreadyBound { surface: SurfaceId, existing: IviSurfaceId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// First binding between the surface and the id
    Bound,
    /// The surface already holds this id; another handle was added
    AlreadyBound,
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    surface: SurfaceId,
    handles: u32,
}

#[derive(Debug, Default)]
pub struct IviApplicationExtension {
    by_id: HashMap<IviSurfaceId, Binding>,
    by_surface: HashMap<SurfaceId, IviSurfaceId>,
}

impl IviApplicationExtension {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_ivi_id(&mut self, surface: SurfaceId, ivi_id: IviSurfaceId) -> Result<BindOutcome, IviBindError> {
        if let Some(existing) = self.by_surface.get(&surface) {
            if *existing != ivi_id {
                return Err(IviBindError::SurfaceAlreadyBound {
                    surface,
                    existing: *existing,
                });
            }
        }

        match self.by_id.get_mut(&ivi_id) {
            Some(binding) if binding.surface != surface => Err(IviBindError::IdInUse {
                ivi_id,
                holder: binding.surface,
            }),
            Some(binding) => {
                binding.handles += 1;
                Ok(BindOutcome::AlreadyBound)
            }
            None => {
                self.by_id.insert(ivi_id, Binding { surface, handles: 1 });
                self.by_surface.insert(surface, ivi_id);
                tracing::info!("Surface {} bound to ivi-id {}", surface, ivi_id);
                Ok(BindOutcome::Bound)
            }
        }
    }

    /// Drop one ivi_surface handle. Returns true if the id became free.
    pub fn release_handle(&mut self, ivi_id: IviSurfaceId) -> bool {
        let Some(binding) = self.by_id.get_mut(&ivi_id) else {
            return false;
        };
        binding.handles = binding.handles.saturating_sub(1);
        if binding.handles > 0 {
            return false;
        }
        let surface = binding.surface;
        self.by_id.remove(&ivi_id);
        self.by_surface.remove(&surface);
        tracing::info!("ivi-id {} released by surface {}", ivi_id, surface);
        true
    }

    /// Forget the binding of a destroyed surface.
    pub fn unbind(&mut self, surface: SurfaceId) -> Option<IviSurfaceId> {
        let ivi_id = self.by_surface.remove(&surface)?;
        self.by_id.remove(&ivi_id);
        tracing::info!("ivi-id {} unbound from destroyed surface {}", ivi_id, surface);
        Some(ivi_id)
    }

    pub fn resolve(&self, ivi_id: IviSurfaceId) -> Option<SurfaceId> {
        self.by_id.get(&ivi_id).map(|b| b.surface)
    }

    pub fn ivi_id_of(&self, surface: SurfaceId) -> Option<IviSurfaceId> {
        self.by_surface.get(&surface).copied()
    }

    pub fn bound_ids(&self) -> impl Iterator<Item = IviSurfaceId> + '_ {
        self.by_id.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
