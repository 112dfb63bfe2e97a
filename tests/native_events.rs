use std::path::PathBuf;

use notify::event::{
    AccessKind, CreateKind, DataChange, Flag, ModifyKind, RemoveKind, RenameMode,
};
use notify::{Event, EventKind};
use vfswatch::types::ChangeType;
use vfswatch::watch::NativeEvent;
use vfswatch::watch::native::{classify, event_queue};

fn change(kind: ChangeType, path: &str) -> NativeEvent {
    NativeEvent::Change {
        kind,
        path: PathBuf::from(path),
    }
}

#[test]
fn creations_and_removals_map_per_path() {
    let event = Event::new(EventKind::Create(CreateKind::File))
        .add_path("/a".into())
        .add_path("/b".into());
    assert_eq!(
        classify(event),
        vec![change(ChangeType::Created, "/a"), change(ChangeType::Created, "/b")]
    );

    let event = Event::new(EventKind::Remove(RemoveKind::Any)).add_path("/a".into());
    assert_eq!(classify(event), vec![change(ChangeType::Removed, "/a")]);
}

#[test]
fn content_modifications_are_modified() {
    let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
        .add_path("/a".into());
    assert_eq!(classify(event), vec![change(ChangeType::Modified, "/a")]);
}

#[test]
fn renames_remove_the_source_and_create_the_target() {
    let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
        .add_path("/old".into())
        .add_path("/new".into());
    assert_eq!(
        classify(event),
        vec![change(ChangeType::Removed, "/old"), change(ChangeType::Created, "/new")]
    );

    let event =
        Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any))).add_path("/x".into());
    assert_eq!(classify(event), vec![change(ChangeType::Invalidated, "/x")]);
}

#[test]
fn access_events_are_ignored() {
    let event = Event::new(EventKind::Access(AccessKind::Read)).add_path("/a".into());
    assert!(classify(event).is_empty());
}

#[test]
fn unclassifiable_events_are_unknown() {
    let event = Event::new(EventKind::Other).add_path("/a".into());
    assert_eq!(
        classify(event),
        vec![NativeEvent::Unknown {
            path: Some(PathBuf::from("/a"))
        }]
    );
}

#[test]
fn rescan_requests_are_overflows() {
    let event = Event::new(EventKind::Any).set_flag(Flag::Rescan);
    assert_eq!(classify(event), vec![NativeEvent::Overflow { path: None }]);

    let event = Event::new(EventKind::Modify(ModifyKind::Any))
        .add_path("/dir".into())
        .set_flag(Flag::Rescan);
    assert_eq!(
        classify(event),
        vec![NativeEvent::Overflow {
            path: Some(PathBuf::from("/dir"))
        }]
    );
}

#[tokio::test]
async fn full_queue_raises_the_overflow_flag_once() {
    let (sender, mut receiver) = event_queue(1);

    sender.send(change(ChangeType::Created, "/a"));
    sender.send(change(ChangeType::Created, "/b"));
    sender.send(change(ChangeType::Created, "/c"));

    assert_eq!(receiver.recv().await, Some(change(ChangeType::Created, "/a")));
    assert!(receiver.take_overflow());
    assert!(!receiver.take_overflow());

    drop(sender);
    assert_eq!(receiver.recv().await, None);
}
