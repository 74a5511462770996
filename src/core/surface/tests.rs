use crate::core::ids::{PoolId, SurfaceId};
use crate::core::surface::*;

fn shm_buffer(registry: &mut BufferRegistry) -> crate::core::ids::BufferId {
    registry.insert(
        BufferKind::Shm(ShmBufferData {
            pool: PoolId(1),
            offset: 0,
            width: 2,
            height: 2,
            stride: 8,
            format: 0,
        }),
        None,
    )
}

fn gpu_buffer(registry: &mut BufferRegistry) -> crate::core::ids::BufferId {
    registry.insert(
        BufferKind::GpuBacked(GpuImage {
            width: 2,
            height: 2,
            fourcc: 0x3432_5258,
            modifier: 0,
            planes: Vec::new(),
        }),
        None,
    )
}

fn is_free(registry: &BufferRegistry, id: crate::core::ids::BufferId) -> bool {
    !registry.get(id).unwrap().is_in_use()
}

#[test]
fn test_apply_commit() {
    let mut pending = PendingAttach::Unchanged;
    let mut committed = None;
    let outcome = apply_commit(&mut pending, &mut committed);
    assert_eq!(outcome.content, ContentChange::None);

    let id = crate::core::ids::BufferId(7);
    pending = PendingAttach::Buffer(id);
    let outcome = apply_commit(&mut pending, &mut committed);
    assert_eq!(outcome.content, ContentChange::Attached(id));
    assert_eq!(outcome.superseded, None);
    assert_eq!(pending, PendingAttach::Unchanged);

    // same buffer again still supersedes the old reference
    pending = PendingAttach::Buffer(id);
    assert_eq!(apply_commit(&mut pending, &mut committed).superseded, Some(id));

    pending = PendingAttach::Detach;
    let outcome = apply_commit(&mut pending, &mut committed);
    assert_eq!(outcome.content, ContentChange::Removed);
    assert_eq!(committed, None);

    pending = PendingAttach::Detach;
    assert_eq!(apply_commit(&mut pending, &mut committed).content, ContentChange::None);
}

#[test]
fn test_surface_init() {
    let surface = WaylandSurface::new(SurfaceId(1), None, None);
    assert_eq!(surface.id, SurfaceId(1));
    assert!(surface.ivi_id().is_none());
    assert_eq!(surface.content_state(), ContentState::NoContent);
    assert_eq!(surface.total_frames(), 0);
}

#[test]
fn test_attach_has_no_effect_until_commit() {
    let mut registry = BufferRegistry::new();
    let buffer = shm_buffer(&mut registry);
    let mut surface = WaylandSurface::new(SurfaceId(1), None, None);

    surface.attach(&mut registry, Some(buffer));
    assert!(!surface.has_content());
    assert_eq!(surface.pending_attach(), PendingAttach::Buffer(buffer));

    assert_eq!(surface.commit(&mut registry), Some(ContentState::Available));
    assert_eq!(surface.committed_buffer(), Some(buffer));
}

#[test]
fn test_content_state_is_edge_triggered() {
    let mut registry = BufferRegistry::new();
    let buffer = shm_buffer(&mut registry);
    let mut surface = WaylandSurface::new(SurfaceId(1), None, None);

    surface.attach(&mut registry, Some(buffer));
    assert_eq!(surface.commit(&mut registry), Some(ContentState::Available));
    surface.attach(&mut registry, Some(buffer));
    assert_eq!(surface.commit(&mut registry), None);

    surface.attach(&mut registry, None);
    assert_eq!(surface.commit(&mut registry), Some(ContentState::Removed));
    surface.attach(&mut registry, None);
    assert_eq!(surface.commit(&mut registry), None);
    assert_eq!(surface.content_state(), ContentState::Removed);
}

#[test]
fn test_commit_counters() {
    let mut registry = BufferRegistry::new();
    let buffer = shm_buffer(&mut registry);
    let mut surface = WaylandSurface::new(SurfaceId(1), None, None);

    for _ in 0..5 {
        surface.attach(&mut registry, Some(buffer));
        surface.commit(&mut registry);
    }
    assert_eq!(surface.frames_this_tick(), 5);
    assert_eq!(surface.total_frames(), 5);

    surface.finish_frame();
    assert_eq!(surface.frames_this_tick(), 0);
    assert_eq!(surface.total_frames(), 5);
}

#[test]
fn test_recommit_same_buffer_keeps_single_reference() {
    let mut registry = BufferRegistry::new();
    let buffer = shm_buffer(&mut registry);
    let mut surface = WaylandSurface::new(SurfaceId(1), None, None);

    for _ in 0..3 {
        surface.attach(&mut registry, Some(buffer));
        surface.commit(&mut registry);
        assert_eq!(registry.get(buffer).unwrap().surface_refs(), 1);
    }
    assert_eq!(registry.get(buffer).unwrap().release_count(), 0);
}

#[test]
fn test_reattach_before_commit_releases_replaced_pending() {
    let mut registry = BufferRegistry::new();
    let first = shm_buffer(&mut registry);
    let second = shm_buffer(&mut registry);
    let mut surface = WaylandSurface::new(SurfaceId(1), None, None);

    surface.attach(&mut registry, Some(first));
    surface.attach(&mut registry, Some(second));
    assert!(is_free(&registry, first));
    surface.commit(&mut registry);
    assert!(!is_free(&registry, second));
}

#[test]
fn test_same_buffer_attached_twice_stays_held() {
    let mut registry = BufferRegistry::new();
    let buffer = shm_buffer(&mut registry);
    let mut surface = WaylandSurface::new(SurfaceId(1), None, None);

    surface.attach(&mut registry, Some(buffer));
    surface.attach(&mut registry, Some(buffer));
    assert!(!is_free(&registry, buffer));
    surface.commit(&mut registry);
    assert!(!is_free(&registry, buffer));
    assert_eq!(registry.get(buffer).unwrap().release_count(), 0);
    assert_eq!(surface.committed_buffer(), Some(buffer));
}

#[test]
fn test_buffer_type_change_flag() {
    let mut registry = BufferRegistry::new();
    let shm = shm_buffer(&mut registry);
    let gpu = gpu_buffer(&mut registry);
    let mut surface = WaylandSurface::new(SurfaceId(1), None, None);

    surface.attach(&mut registry, Some(shm));
    surface.commit(&mut registry);
    assert!(surface.take_buffer_type_changed());
    assert!(!surface.take_buffer_type_changed());

    surface.attach(&mut registry, Some(shm));
    surface.commit(&mut registry);
    assert!(!surface.take_buffer_type_changed());

    surface.attach(&mut registry, Some(gpu));
    surface.commit(&mut registry);
    assert!(surface.take_buffer_type_changed());
}

#[test]
fn test_buffer_destroyed_removes_content() {
    let mut registry = BufferRegistry::new();
    let buffer = shm_buffer(&mut registry);
    let mut surface = WaylandSurface::new(SurfaceId(1), None, None);

    surface.attach(&mut registry, Some(buffer));
    surface.commit(&mut registry);
    assert_eq!(surface.buffer_destroyed(buffer), Some(ContentState::Removed));
    assert!(!surface.has_content());
}

#[test]
fn test_shell_surface_only_once() {
    let mut surface = WaylandSurface::new(SurfaceId(1), None, None);
    assert!(surface.set_shell_surface());
    assert!(!surface.set_shell_surface());
    surface.set_title("navigation".to_string());
    assert_eq!(surface.title(), "navigation");
}

/// Two surfaces sharing three buffers; a client always reuses the first free buffer.
#[test]
fn test_free_state_sequence_with_shared_buffers() {
    let mut registry = BufferRegistry::new();
    let mut s1 = WaylandSurface::new(SurfaceId(1), None, None);
    let mut s2 = WaylandSurface::new(SurfaceId(2), None, None);

    let render = |registry: &mut BufferRegistry, surfaces: [&WaylandSurface; 2]| {
        let pinned: Vec<_> = surfaces.iter().filter_map(|s| s.committed_buffer()).collect();
        for id in &pinned {
            registry.pin(*id);
        }
        for id in pinned {
            registry.unpin(id);
        }
    };
    let bits = |registry: &BufferRegistry, ids: &[crate::core::ids::BufferId]| -> String {
        ids.iter().map(|id| if is_free(registry, *id) { '1' } else { '0' }).collect()
    };

    let buf0 = shm_buffer(&mut registry);
    s1.attach(&mut registry, Some(buf0));
    s1.commit(&mut registry);
    s2.attach(&mut registry, Some(buf0));
    s2.commit(&mut registry);
    render(&mut registry, [&s1, &s2]);
    assert_eq!(bits(&registry, &[buf0]), "0");

    let buf1 = shm_buffer(&mut registry);
    s1.attach(&mut registry, Some(buf1));
    s1.commit(&mut registry);
    render(&mut registry, [&s1, &s2]);
    assert_eq!(bits(&registry, &[buf0, buf1]), "00");

    let buf2 = shm_buffer(&mut registry);
    s2.attach(&mut registry, Some(buf2));
    s2.commit(&mut registry);
    render(&mut registry, [&s1, &s2]);
    assert_eq!(bits(&registry, &[buf0, buf1, buf2]), "100");

    s1.attach(&mut registry, Some(buf0));
    s1.commit(&mut registry);
    render(&mut registry, [&s1, &s2]);
    assert_eq!(bits(&registry, &[buf0, buf1, buf2]), "010");

    s1.attach(&mut registry, None);
    s1.commit(&mut registry);
    render(&mut registry, [&s1, &s2]);
    assert_eq!(bits(&registry, &[buf0, buf1, buf2]), "110");

    s2.attach(&mut registry, None);
    s2.commit(&mut registry);
    render(&mut registry, [&s1, &s2]);
    assert_eq!(bits(&registry, &[buf0, buf1, buf2]), "111");
}

#[test]
fn test_destroy_drops_references() {
    let mut registry = BufferRegistry::new();
    let committed = shm_buffer(&mut registry);
    let pending = shm_buffer(&mut registry);
    let mut surface = WaylandSurface::new(SurfaceId(1), None, None);

    surface.attach(&mut registry, Some(committed));
    surface.commit(&mut registry);
    surface.attach(&mut registry, Some(pending));
    surface.destroy(&mut registry);

    assert!(is_free(&registry, committed));
    assert!(is_free(&registry, pending));
    assert_eq!(registry.get(committed).unwrap().release_count(), 1);
}
