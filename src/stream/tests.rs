use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::time::Duration;

use super::*;
use crate::core::ids::{ConsumerId, DisplayId};

#[derive(Debug, Default)]
struct FakeState {
    available: BTreeSet<IviSurfaceId>,
    surfaces: BTreeSet<IviSurfaceId>,
    updated: BTreeSet<IviSurfaceId>,
    new: BTreeSet<IviSurfaceId>,
    obsolete: BTreeSet<IviSurfaceId>,
    vanished: BTreeSet<IviSurfaceId>,
    frames: BTreeMap<IviSurfaceId, u32>,
    calls: Vec<String>,
}

/// Scripted compositor; tests keep a second handle to the state.
#[derive(Debug, Clone, Default)]
struct FakeCompositor(Rc<RefCell<FakeState>>);

impl FakeCompositor {
    fn content(&self, source: u32, frames: u32) {
        let mut state = self.0.borrow_mut();
        let id = IviSurfaceId(source);
        state.available.insert(id);
        state.surfaces.insert(id);
        state.updated.insert(id);
        state.frames.insert(id, frames);
    }

    fn calls(&self) -> Vec<String> {
        std::mem::take(&mut self.0.borrow_mut().calls)
    }
}

impl EmbeddedCompositor for FakeCompositor {
    fn handle_requests_from_clients(&mut self) {
        self.0.borrow_mut().calls.push("handle_requests".to_string());
    }

    fn end_frame(&mut self, notify_clients: bool) {
        self.0.borrow_mut().calls.push(format!("end_frame({})", notify_clients));
    }

    fn wait_for_client_activity(&mut self, _timeout: Duration) -> bool {
        false
    }

    fn has_updated_stream_texture_sources(&self) -> bool {
        !self.0.borrow().updated.is_empty()
    }

    fn dispatch_updated_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId> {
        std::mem::take(&mut self.0.borrow_mut().updated)
    }

    fn dispatch_new_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId> {
        std::mem::take(&mut self.0.borrow_mut().new)
    }

    fn dispatch_obsolete_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId> {
        std::mem::take(&mut self.0.borrow_mut().obsolete)
    }

    fn dispatch_vanished_stream_texture_source_ids(&mut self) -> BTreeSet<IviSurfaceId> {
        std::mem::take(&mut self.0.borrow_mut().vanished)
    }

    fn upload_compositing_content_for_stream_texture(
        &mut self,
        source: IviSurfaceId,
        texture: TextureHandle,
        uploader: &mut dyn TextureUploader,
    ) -> u32 {
        let _ = uploader.upload_shm(texture, 1, 1, 4, 0, &[source.0 as u8, 0, 0, 255]);
        let mut state = self.0.borrow_mut();
        state.calls.push(format!("upload({})", source));
        state.frames.get(&source).copied().unwrap_or(0)
    }

    fn is_content_available_for_stream_texture(&self, source: IviSurfaceId) -> bool {
        self.0.borrow().available.contains(&source)
    }

    fn has_surface_for_stream_texture(&self, source: IviSurfaceId) -> bool {
        self.0.borrow().surfaces.contains(&source)
    }

    fn committed_frames_since_start(&self, _source: IviSurfaceId) -> u64 {
        0
    }

    fn compositor_connection_count(&self) -> u32 {
        0
    }

    fn is_buffer_attached_to_surface(&self, source: IviSurfaceId) -> bool {
        self.0.borrow().available.contains(&source)
    }

    fn title_of_surface(&self, _source: IviSurfaceId) -> Option<String> {
        None
    }

    fn log_infos(&self) {}
}

const SOURCE: IviSurfaceId = IviSurfaceId(11);
const SOURCE2: IviSurfaceId = IviSurfaceId(12);
const SCENE: SceneId = SceneId(30);
const SCENE2: SceneId = SceneId(31);
const STREAM_TEXTURE: StreamTextureHandle = StreamTextureHandle(22);
const STREAM_TEXTURE2: StreamTextureHandle = StreamTextureHandle(23);

fn manager() -> (StreamTextureManager<MemoryTextureStore>, FakeCompositor) {
    let fake = FakeCompositor::default();
    let manager = StreamTextureManager::new(Box::new(fake.clone()), MemoryTextureStore::new());
    (manager, fake)
}

fn consumer(scene: u64, consumer: u32) -> StreamConsumer {
    StreamConsumer::new(DisplayId(0), SceneId(scene), ConsumerId(consumer))
}

#[test]
fn test_texture_created_and_deleted_with_scene_reference() {
    let (mut manager, fake) = manager();
    manager.ref_stream_texture(STREAM_TEXTURE, SOURCE, SCENE);
    assert_eq!(manager.uploader().len(), 1);
    assert!(fake.calls().is_empty(), "no upload without content");

    manager.unref_stream_texture(STREAM_TEXTURE, SOURCE, SCENE);
    assert!(manager.uploader().is_empty());
}

#[test]
fn test_composited_texture_requires_available_content() {
    let (mut manager, fake) = manager();
    assert!(!manager.composited_texture(IviSurfaceId(234)).is_valid());

    manager.ref_stream(SOURCE);
    assert!(!manager.composited_texture(SOURCE).is_valid());

    fake.content(SOURCE.0, 1);
    let texture = manager.composited_texture(SOURCE);
    assert!(texture.is_valid());

    fake.0.borrow_mut().available.clear();
    assert!(!manager.composited_texture(SOURCE).is_valid());
    manager.unref_stream(SOURCE);
}

#[test]
fn test_available_content_is_uploaded_on_first_reference() {
    let (mut manager, fake) = manager();
    fake.content(SOURCE.0, 1);

    manager.ref_stream(SOURCE);
    assert_eq!(fake.calls(), vec!["upload(11)".to_string()]);
    let texture = manager.composited_texture(SOURCE);
    assert_eq!(manager.uploader().texture(texture).unwrap().pixels, vec![11, 0, 0, 255]);

    // second reference shares the texture
    manager.ref_stream_texture(STREAM_TEXTURE, SOURCE, SCENE);
    assert!(fake.calls().is_empty());
    assert_eq!(manager.uploader().len(), 1);
}

#[test]
fn test_one_texture_per_source() {
    let (mut manager, fake) = manager();
    fake.content(SOURCE.0, 1);
    fake.content(SOURCE2.0, 1);

    manager.ref_stream_texture(STREAM_TEXTURE, SOURCE, SCENE);
    manager.ref_stream_texture(STREAM_TEXTURE2, SOURCE, SCENE);
    manager.ref_stream(SOURCE);
    manager.ref_stream_texture(STREAM_TEXTURE, SOURCE2, SCENE2);

    assert_eq!(manager.uploader().len(), 2);
    assert_ne!(manager.composited_texture(SOURCE), manager.composited_texture(SOURCE2));
}

#[test]
fn test_texture_deleted_only_after_all_references() {
    let (mut manager, _fake) = manager();
    manager.ref_stream(SOURCE);
    manager.ref_stream_texture(STREAM_TEXTURE, SOURCE, SCENE);
    manager.ref_stream(SOURCE);
    manager.ref_stream_texture(STREAM_TEXTURE2, SOURCE, SCENE);

    manager.unref_stream(SOURCE);
    manager.unref_stream_texture(STREAM_TEXTURE, SOURCE, SCENE);
    manager.unref_stream(SOURCE);
    assert_eq!(manager.uploader().len(), 1);

    manager.unref_stream_texture(STREAM_TEXTURE2, SOURCE, SCENE);
    assert!(manager.uploader().is_empty());

    // unbalanced unrefs are ignored
    manager.unref_stream(SOURCE);
    manager.unref_stream_texture(STREAM_TEXTURE2, SOURCE, SCENE);
}

#[test]
fn test_process_client_requests_and_notify() {
    let (mut manager, fake) = manager();
    manager.process_client_requests();
    assert_eq!(fake.calls(), vec!["handle_requests", "end_frame(false)"]);

    manager.notify_clients();
    assert_eq!(fake.calls(), vec!["end_frame(true)"]);
}

#[test]
fn test_upload_reports_scenes_consumers_and_frames() {
    let (mut manager, fake) = manager();
    manager.ref_stream_texture(STREAM_TEXTURE, SOURCE, SCENE);
    manager.link(consumer(40, 1), SOURCE).unwrap();
    manager.ref_stream_texture(STREAM_TEXTURE, SOURCE2, SCENE2);

    assert!(!manager.has_updated_content_to_upload());
    fake.content(SOURCE.0, 3);
    assert!(manager.has_updated_content_to_upload());

    let updates = manager.upload_resources_and_get_updates();
    assert_eq!(updates.updated_scenes, BTreeSet::from([SCENE]));
    assert_eq!(updates.updated_consumers, vec![consumer(40, 1)]);
    assert_eq!(updates.committed_frames, BTreeMap::from([(SOURCE, 3)]));
    assert_eq!(fake.calls(), vec!["upload(11)".to_string()]);

    assert!(!manager.has_updated_content_to_upload());
    assert_eq!(manager.upload_resources_and_get_updates(), StreamUpdates::default());
}

#[test]
fn test_updates_of_unreferenced_sources_are_skipped() {
    let (mut manager, fake) = manager();
    fake.content(SOURCE.0, 1);
    let updates = manager.upload_resources_and_get_updates();
    assert!(updates.committed_frames.is_empty());
    assert!(fake.calls().is_empty());
}

#[test]
fn test_dispatch_without_changes() {
    let (mut manager, _fake) = manager();
    assert!(manager.dispatch_state_changes().is_empty());
}

#[test]
fn test_dispatch_new_and_obsolete_streams() {
    let (mut manager, fake) = manager();
    fake.0.borrow_mut().new.insert(SOURCE);
    let changes = manager.dispatch_state_changes();
    assert_eq!(changes.new_streams, vec![SOURCE]);
    assert!(changes.obsolete_streams.is_empty());

    // dispatching clears
    assert!(manager.dispatch_state_changes().is_empty());

    fake.0.borrow_mut().obsolete.insert(SOURCE);
    let changes = manager.dispatch_state_changes();
    assert!(changes.new_streams.is_empty());
    assert_eq!(changes.obsolete_streams, vec![SOURCE]);
}

#[test]
fn test_dispatch_reports_stream_textures_of_one_scene() {
    let (mut manager, fake) = manager();
    manager.ref_stream_texture(STREAM_TEXTURE, SOURCE, SCENE);
    manager.ref_stream_texture(STREAM_TEXTURE2, SOURCE, SCENE);

    fake.content(SOURCE.0, 1);
    fake.0.borrow_mut().new.insert(SOURCE);

    let changes = manager.dispatch_state_changes();
    assert_eq!(changes.stream_textures.len(), 1);
    assert_eq!(changes.stream_textures[&SCENE], vec![STREAM_TEXTURE, STREAM_TEXTURE2]);
    assert_eq!(changes.new_streams, vec![SOURCE]);
}

#[test]
fn test_dispatch_reports_only_changed_availability() {
    let (mut manager, fake) = manager();
    manager.ref_stream_texture(STREAM_TEXTURE, SOURCE, SCENE);
    manager.ref_stream_texture(STREAM_TEXTURE2, SOURCE2, SCENE);
    manager.ref_stream_texture(STREAM_TEXTURE, SOURCE2, SCENE2);
    manager.ref_stream_texture(STREAM_TEXTURE2, SOURCE, SCENE2);

    // only the first source actually has content
    fake.content(SOURCE.0, 1);
    fake.0.borrow_mut().new.extend([SOURCE, SOURCE2]);

    let changes = manager.dispatch_state_changes();
    assert_eq!(changes.stream_textures.len(), 2);
    assert_eq!(changes.stream_textures[&SCENE], vec![STREAM_TEXTURE]);
    assert_eq!(changes.stream_textures[&SCENE2], vec![STREAM_TEXTURE2]);
    assert_eq!(changes.new_streams, vec![SOURCE, SOURCE2]);

    // same availability reported again is no change
    fake.0.borrow_mut().new.insert(SOURCE);
    assert!(manager.dispatch_state_changes().stream_textures.is_empty());
}

#[test]
fn test_link_rejects_occupied_consumer() {
    let (mut manager, _fake) = manager();
    manager.link(consumer(40, 1), SOURCE).unwrap();
    assert!(matches!(
        manager.link(consumer(40, 1), SOURCE2),
        Err(LinkError::ConsumerOccupied { .. })
    ));
    // the rejected link did not create a texture
    assert_eq!(manager.uploader().len(), 1);

    assert_eq!(manager.unlink(consumer(40, 1)), Ok(SOURCE));
    assert!(manager.uploader().is_empty());
    assert!(manager.unlink(consumer(40, 1)).is_err());
}

#[test]
fn test_links_of_vanished_source_are_dropped() {
    let (mut manager, fake) = manager();
    fake.content(SOURCE.0, 1);
    fake.content(SOURCE2.0, 1);
    manager.link(consumer(40, 1), SOURCE).unwrap();
    manager.link(consumer(41, 1), SOURCE).unwrap();
    manager.link(consumer(41, 2), SOURCE2).unwrap();

    // SOURCE2 lost its content but keeps its surface
    {
        let mut state = fake.0.borrow_mut();
        state.available.remove(&SOURCE2);
        state.obsolete.insert(SOURCE2);
    }
    let changes = manager.dispatch_state_changes();
    assert!(changes.removed_links.is_empty());
    assert_eq!(manager.links().len(), 3);

    // SOURCE lost its surface
    {
        let mut state = fake.0.borrow_mut();
        state.available.remove(&SOURCE);
        state.surfaces.remove(&SOURCE);
        state.obsolete.insert(SOURCE);
        state.vanished.insert(SOURCE);
    }
    let changes = manager.dispatch_state_changes();
    assert_eq!(changes.removed_links.len(), 2);
    assert!(changes.removed_links.iter().all(|l| l.source == SOURCE));
    assert_eq!(manager.links().len(), 1);
    // the texture of SOURCE went with its last link
    assert_eq!(manager.uploader().len(), 1);
}

#[test]
fn test_links_dropped_when_source_vanishes_without_content() {
    let (mut manager, fake) = manager();
    fake.0.borrow_mut().surfaces.insert(SOURCE);
    manager.link(consumer(40, 1), SOURCE).unwrap();

    // bound, never committed, then gone: nothing obsolete, only vanished
    {
        let mut state = fake.0.borrow_mut();
        state.surfaces.remove(&SOURCE);
        state.vanished.insert(SOURCE);
    }
    let changes = manager.dispatch_state_changes();
    assert!(changes.obsolete_streams.is_empty());
    assert_eq!(changes.removed_links.len(), 1);
    assert!(manager.links().is_empty());
    assert!(manager.uploader().is_empty());
}

#[test]
fn test_rebound_source_keeps_links() {
    let (mut manager, fake) = manager();
    manager.link(consumer(40, 1), SOURCE).unwrap();

    // unbound and bound again by another surface before the dispatch
    {
        let mut state = fake.0.borrow_mut();
        state.surfaces.insert(SOURCE);
        state.vanished.insert(SOURCE);
    }
    assert!(manager.dispatch_state_changes().removed_links.is_empty());
    assert_eq!(manager.links().len(), 1);
}

#[test]
fn test_remove_scene_drops_its_links() {
    let (mut manager, _fake) = manager();
    manager.link(consumer(40, 1), SOURCE).unwrap();
    manager.link(consumer(40, 2), SOURCE2).unwrap();
    manager.link(consumer(41, 1), SOURCE).unwrap();

    let removed = manager.remove_scene(DisplayId(0), SceneId(40));
    assert_eq!(removed.len(), 2);
    assert_eq!(manager.links().len(), 1);
    // SOURCE is still linked from scene 41
    assert_eq!(manager.uploader().len(), 1);

    assert!(manager.remove_scene(DisplayId(1), SceneId(41)).is_empty());
    assert_eq!(manager.remove_scene(DisplayId(0), SceneId(41)).len(), 1);
    assert!(manager.uploader().is_empty());
}
