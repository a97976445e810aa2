use std::fs;
use std::sync::Arc;

use pageink::geometry::{PercentPoint, PixelPoint, PixelSize};
use pageink::ink::{Color, InkLayer, StrokeStyle};
use pageink::interaction::Tool;
use pageink::markers::{MarkerOverlay, MarkerStyle, NewMarker};
use pageink::notification::NoticeTopic;
use pageink::persistence::{InkKey, JsonFileStore, MemoryStore, PersistenceGateway};
use pageink::test_utils::{FakeDocumentService, WAIT, drag_pointer, loaded_viewer, test_config};
use pageink::{HostSignal, Viewer};
use tempfile::TempDir;

#[test]
fn test_ink_and_markers_survive_a_new_session() {
    let temp = TempDir::new().unwrap();
    let service = Arc::new(FakeDocumentService::uniform(2, 600, 800));

    {
        let store = Arc::new(JsonFileStore::new(temp.path()));
        let mut viewer = loaded_viewer(service.clone(), store, test_config(), "book");
        viewer.select_tool(Tool::Pen);
        drag_pointer(&mut viewer, &[(60.0, 80.0), (120.0, 160.0)]);
        viewer
            .add_marker(NewMarker::answer("B"), None, Some(PercentPoint::new(30.0, 40.0)))
            .unwrap();
        // Dropping the viewer persists what is still dirty
    }

    let store = Arc::new(JsonFileStore::new(temp.path()));
    assert_eq!(store.ink_pages("book", "student-1").unwrap(), vec![1]);

    let mut config = test_config();
    config.render.initial_scale = 2.0;
    let viewer = loaded_viewer(service, store, config, "book");
    assert_eq!(viewer.surface_size(), Some(PixelSize::new(1200, 1600)));

    let layer = viewer.ink_layer().unwrap();
    assert_eq!(layer.len(), 1);
    let stroke = &layer.strokes()[0];
    let first = stroke.first_point().unwrap();
    assert!((first.x - 120.0).abs() < 0.5 && (first.y - 160.0).abs() < 0.5);
    assert!((stroke.style.width - 6.0).abs() < 0.01, "pen width scales with the page");

    assert_eq!(viewer.markers().len(), 1);
    assert_eq!(viewer.markers().markers()[0].anchor(), PercentPoint::new(30.0, 40.0));
}

#[test]
fn test_ink_is_kept_per_user() {
    let service = Arc::new(FakeDocumentService::uniform(1, 600, 800));
    let store = Arc::new(MemoryStore::new());

    let mut alice = Viewer::new(service.clone(), store.clone(), "alice", test_config());
    alice.load_document("doc", "doc");
    assert!(alice.wait_idle(WAIT));
    alice.select_tool(Tool::Pen);
    drag_pointer(&mut alice, &[(10.0, 10.0), (40.0, 40.0)]);
    alice.flush();

    let mut bob = Viewer::new(service, store.clone(), "bob", test_config());
    bob.load_document("doc", "doc");
    assert!(bob.wait_idle(WAIT));
    assert!(bob.ink_layer().unwrap().is_empty());

    assert!(store.ink(&InkKey::new("doc", 1, "alice")).is_some());
    assert!(store.ink(&InkKey::new("doc", 1, "bob")).is_none());
}

#[test]
fn test_save_failure_keeps_local_state() {
    let service = Arc::new(FakeDocumentService::uniform(2, 600, 800));
    let store = Arc::new(MemoryStore::new());
    let mut viewer = loaded_viewer(service, store.clone(), test_config(), "doc");
    viewer.drain_signals();

    store.set_failing(true);
    viewer.select_tool(Tool::Pen);
    drag_pointer(&mut viewer, &[(10.0, 10.0), (40.0, 40.0)]);
    viewer.flush();

    assert_eq!(viewer.ink_layer().unwrap().len(), 1);
    assert!(viewer.lifecycle().is_ready());
    let notices: Vec<NoticeTopic> = viewer
        .drain_signals()
        .into_iter()
        .filter_map(|s| match s {
            HostSignal::Notice(n) => Some(n.topic),
            _ => None,
        })
        .collect();
    assert_eq!(notices, vec![NoticeTopic::Persistence]);
    assert_eq!(
        viewer.notifications().current().map(|n| n.topic),
        Some(NoticeTopic::Persistence)
    );
}

#[test]
fn test_load_failure_starts_empty() {
    let service = Arc::new(FakeDocumentService::uniform(1, 600, 800));
    let store = Arc::new(MemoryStore::new());
    store.set_failing(true);

    let viewer = loaded_viewer(service, store, test_config(), "doc");
    assert!(viewer.lifecycle().is_ready());
    assert!(viewer.ink_layer().unwrap().is_empty());
    assert!(viewer.markers().is_empty());
}

#[test]
fn test_corrupt_ink_file_is_treated_as_empty() {
    let temp = TempDir::new().unwrap();
    let store = JsonFileStore::new(temp.path());

    let mut layer = InkLayer::new(PixelSize::new(600, 800));
    layer.begin_stroke(PixelPoint::new(1.0, 1.0), StrokeStyle::pen(Color::BLACK, 2.0));
    layer.finish_stroke();
    let key = InkKey::new("doc", 1, "student-1");
    store.save_ink_layer(&key, &layer.to_serialized()).unwrap();

    let page_file = temp
        .path()
        .join("doc")
        .join("ink")
        .join("student-1")
        .join("page-1.json");
    assert!(page_file.exists());
    fs::write(&page_file, "{ not json").unwrap();

    let service = Arc::new(FakeDocumentService::uniform(1, 600, 800));
    let viewer = loaded_viewer(service, Arc::new(store), test_config(), "doc");
    assert!(viewer.ink_layer().unwrap().is_empty());
}

#[test]
fn test_markers_added_during_load_are_merged() {
    let service = Arc::new(FakeDocumentService::uniform(1, 600, 800));
    let store = Arc::new(MemoryStore::new());

    let mut existing = MarkerOverlay::new(MarkerStyle::default());
    existing.add(NewMarker::audio("intro.mp3"), 1, None);
    store.save_markers("doc", existing.markers()).unwrap();

    let mut viewer = Viewer::new(service, store.clone(), "editor", test_config());
    viewer.load_document("doc", "doc");
    let added = viewer
        .add_marker(NewMarker::answer("early"), Some(1), None)
        .unwrap();
    assert!(viewer.wait_idle(WAIT));

    assert_eq!(viewer.markers().len(), 2);
    assert_eq!(viewer.markers().markers()[1].id(), added.id());
    viewer.flush();
    assert_eq!(store.load_markers("doc").unwrap().len(), 2);
}
