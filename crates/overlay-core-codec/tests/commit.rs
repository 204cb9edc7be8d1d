use overlay_core::{
    Collected, Item, MemorySource, OverlaySource, Payload, SortKey, Tombstone,
};
use overlay_core_codec::{
    CodecError, Commit, WidgetRecord, WireKey, apply_commit, decode_commit, decode_widgets,
    encode_commit, encode_widgets,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn widget(base: u32, offset: i8, text: &str) -> WidgetRecord {
    WidgetRecord {
        widget_type: b'm',
        key: WireKey { base, offset },
        text: text.to_string(),
    }
}

fn keys_and_texts(file: &[u8]) -> Vec<(i64, String)> {
    decode_widgets(file)
        .unwrap()
        .into_iter()
        .map(|item| match item.payload {
            Payload::Widget { text, .. } => (item.key.millis(), text),
            Payload::Image { .. } => panic!("image in widget file"),
        })
        .collect()
}

#[tokio::test]
async fn test_overlay_edits_commit_into_descriptor() {
    let descriptor = encode_widgets(&[widget(10, 1, "a"), widget(20, 1, "b"), widget(30, 1, "c")])
        .unwrap();
    let bottom = Arc::new(MemorySource::new(decode_widgets(&descriptor).unwrap()));
    let overlay = OverlaySource::open(bottom).await.unwrap();
    overlay.highlights().await.unwrap();

    let doomed = overlay.at(1).await.unwrap().item;
    overlay.remove(1, 1, vec![Tombstone::of(&doomed)]).unwrap();
    overlay
        .insert(0, vec![Item::widget(SortKey::from_millis(15_000), 'm', "new")])
        .unwrap();

    let payload = encode_commit(&overlay.collect()).unwrap();
    let commit = decode_commit(&payload).unwrap();
    assert_eq!(commit.added, vec![widget(15, 0, "new")]);
    assert_eq!(commit.deleted, vec![WireKey { base: 20, offset: 1 }]);

    let updated = apply_commit(&descriptor, &payload).unwrap();
    assert_eq!(
        keys_and_texts(&updated),
        vec![
            (10_001, "a".to_string()),
            (15_001, "new".to_string()),
            (30_001, "c".to_string()),
        ]
    );
}

#[test]
fn test_additions_merge_inside_a_second() {
    let descriptor = encode_widgets(&[widget(5, -1, "early"), widget(5, 1, "late")]).unwrap();
    let payload = Commit {
        added: vec![widget(5, 0, "between")],
        deleted: vec![],
    }
    .encode()
    .unwrap();

    let updated = apply_commit(&descriptor, &payload).unwrap();
    assert_eq!(
        keys_and_texts(&updated),
        vec![
            (4_999, "early".to_string()),
            (5_001, "between".to_string()),
            (5_002, "late".to_string()),
        ]
    );
}

#[test]
fn test_deleting_every_record_of_a_second() {
    let descriptor = encode_widgets(&[widget(5, 1, "x"), widget(5, 2, "y"), widget(6, 1, "z")])
        .unwrap();
    let payload = Commit {
        added: vec![],
        deleted: vec![WireKey { base: 5, offset: 2 }, WireKey { base: 5, offset: 1 }],
    }
    .encode()
    .unwrap();

    let updated = apply_commit(&descriptor, &payload).unwrap();
    assert_eq!(keys_and_texts(&updated), vec![(6_001, "z".to_string())]);
}

#[test]
fn test_unmatched_deletions_fail_the_merge() {
    let descriptor = encode_widgets(&[widget(5, 1, "x")]).unwrap();

    let before = Commit {
        added: vec![],
        deleted: vec![WireKey { base: 4, offset: 0 }],
    }
    .encode()
    .unwrap();
    assert_eq!(
        apply_commit(&descriptor, &before),
        Err(CodecError::UnmatchedDeletion {
            key: SortKey::from_millis(4_000)
        })
    );

    let after = Commit {
        added: vec![],
        deleted: vec![WireKey { base: 9, offset: 0 }],
    }
    .encode()
    .unwrap();
    assert_eq!(
        apply_commit(&descriptor, &after),
        Err(CodecError::UnmatchedDeletion {
            key: SortKey::from_millis(9_000)
        })
    );
}

#[test]
fn test_images_cannot_be_committed() {
    let photo = Item::image(SortKey::from_millis(1_000), 1, 2, 3);
    let added = Collected {
        added: vec![photo.clone()],
        deleted: vec![],
    };
    assert_eq!(
        encode_commit(&added),
        Err(CodecError::NotAWidget { key: photo.key })
    );

    let deleted = Collected {
        added: vec![],
        deleted: vec![Tombstone::of(&photo)],
    };
    assert_eq!(
        encode_commit(&deleted),
        Err(CodecError::NotAWidget { key: photo.key })
    );
}

#[test]
fn test_truncated_descriptor_is_an_error() {
    let mut descriptor = encode_widgets(&[widget(1, 1, "hello")]).unwrap();
    descriptor.truncate(descriptor.len() - 2);
    assert!(matches!(
        decode_widgets(&descriptor),
        Err(CodecError::Truncated {
            offset: 8,
            needed: 5,
            available: 3,
        })
    ));
}
