//! Property changes waiting for the next commit.

use crate::core::ids::{IviLayerId, IviSurfaceId};

#[derive(Debug, Clone, PartialEq)]
pub enum StagedOp {
    SurfaceVisibility { surface: IviSurfaceId, visible: bool },
    SurfaceOpacity { surface: IviSurfaceId, opacity: f64 },
    SurfaceDestinationRectangle {
        surface: IviSurfaceId,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    AddSurfaceToLayer { surface: IviSurfaceId, layer: IviLayerId },
    RemoveSurfaceFromLayer { surface: IviSurfaceId, layer: IviLayerId },
    LayerVisibility { layer: IviLayerId, visible: bool },
    DestroySurface { surface: IviSurfaceId },
}

impl StagedOp {
    /// Surface the op acts on, if any.
    pub fn surface(&self) -> Option<IviSurfaceId> {
        match self {
            StagedOp::SurfaceVisibility { surface, .. }
            | StagedOp::SurfaceOpacity { surface, .. }
            | StagedOp::SurfaceDestinationRectangle { surface, .. }
            | StagedOp::AddSurfaceToLayer { surface, .. }
            | StagedOp::RemoveSurfaceFromLayer { surface, .. }
            | StagedOp::DestroySurface { surface } => Some(*surface),
            StagedOp::LayerVisibility { .. } => None,
        }
    }

    /// Layer the op needs a temporary proxy for, if any.
    pub fn layer(&self) -> Option<IviLayerId> {
        match self {
            StagedOp::AddSurfaceToLayer { layer, .. }
            | StagedOp::RemoveSurfaceFromLayer { layer, .. }
            | StagedOp::LayerVisibility { layer, .. } => Some(*layer),
            _ => None,
        }
    }
}

/// Ordered list of staged ops. Emitted in staging order on commit.
#[derive(Debug, Default)]
pub struct StagedChanges {
    ops: Vec<StagedOp>,
}

impl StagedChanges {
    pub fn push(&mut self, op: StagedOp) {
        self.ops.push(op);
    }

    pub fn take(&mut self) -> Vec<StagedOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// A destroy is staged for `surface`.
    pub fn destroys(&self, surface: IviSurfaceId) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, StagedOp::DestroySurface { surface: s } if *s == surface))
    }

    /// Layers touched by the staged ops, in first-use order.
    pub fn layers(&self) -> Vec<IviLayerId> {
        let mut layers = Vec::new();
        for layer in self.ops.iter().filter_map(StagedOp::layer) {
            if !layers.contains(&layer) {
                layers.push(layer);
            }
        }
        layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_ops_keep_order() {
        let mut staged = StagedChanges::default();
        staged.push(StagedOp::SurfaceOpacity {
            surface: IviSurfaceId(3),
            opacity: 0.5,
        });
        staged.push(StagedOp::SurfaceVisibility {
            surface: IviSurfaceId(3),
            visible: true,
        });
        assert_eq!(staged.len(), 2);

        let ops = staged.take();
        assert!(matches!(ops[0], StagedOp::SurfaceOpacity { .. }));
        assert!(matches!(ops[1], StagedOp::SurfaceVisibility { .. }));
        assert!(staged.is_empty());
    }

    #[test]
    fn test_layers_are_deduplicated() {
        let mut staged = StagedChanges::default();
        staged.push(StagedOp::LayerVisibility {
            layer: IviLayerId(2),
            visible: true,
        });
        staged.push(StagedOp::AddSurfaceToLayer {
            surface: IviSurfaceId(1),
            layer: IviLayerId(5),
        });
        staged.push(StagedOp::RemoveSurfaceFromLayer {
            surface: IviSurfaceId(1),
            layer: IviLayerId(2),
        });
        assert_eq!(staged.layers(), vec![IviLayerId(2), IviLayerId(5)]);
    }

    #[test]
    fn test_destroys() {
        let mut staged = StagedChanges::default();
        staged.push(StagedOp::DestroySurface { surface: IviSurfaceId(9) });
        assert!(staged.destroys(IviSurfaceId(9)));
        assert!(!staged.destroys(IviSurfaceId(8)));
        assert_eq!(StagedOp::DestroySurface { surface: IviSurfaceId(9) }.surface(), Some(IviSurfaceId(9)));
    }
}
