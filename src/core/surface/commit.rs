use crate::core::ids::BufferId;

/// Buffer change requested by wl_surface.attach since the last commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingAttach {
    /// No attach since the last commit
    #[default]
    Unchanged,
    Buffer(BufferId),
    /// attach(null): drop the content on the next commit
    Detach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentChange {
    None,
    Attached(BufferId),
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Previously committed buffer whose surface reference must be dropped
    pub superseded: Option<BufferId>,
    pub content: ContentChange,
}

/// Performs the atomic update of the committed buffer.
///
/// The pending state is reset to `Unchanged`. The pending buffer's surface
/// reference is carried over to the committed slot, so the previous committed
/// buffer is reported as superseded even when the same buffer is committed again.
pub fn apply_commit(pending: &mut PendingAttach, committed: &mut Option<BufferId>) -> CommitOutcome {
    match std::mem::take(pending) {
        PendingAttach::Unchanged => CommitOutcome {
            superseded: None,
            content: ContentChange::None,
        },
        PendingAttach::Buffer(id) => CommitOutcome {
            superseded: committed.replace(id),
            content: ContentChange::Attached(id),
        },
        PendingAttach::Detach => {
            let superseded = committed.take();
            CommitOutcome {
                superseded,
                content: if superseded.is_some() {
                    ContentChange::Removed
                } else {
                    ContentChange::None
                },
            }
        }
    }
}
