use super::*;
use crate::config::{CommentsOptions, FieldMapping};
use serde_json::json;

fn transformer_for(user: &str, mapping: FieldMapping) -> CommentTransformer {
    let context = CommentsContext::new(CommentsOptions {
        current_user_id: UserId::new(user),
        field_mappings: mapping,
        ..CommentsOptions::default()
    })
    .unwrap();
    CommentTransformer::new(context)
}

fn transformer() -> CommentTransformer {
    transformer_for("u1", FieldMapping::default())
}

fn payload(value: serde_json::Value) -> CommentPayload {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn canonical_reply() -> CommentPayload {
    payload(json!({
        "id": "c2",
        "parent": "c1",
        "created": "2024-03-01T10:00:00.000Z",
        "modified": "2024-03-01T10:05:30.250Z",
        "content": "hello @bob",
        "pings": ["bob"],
        "attachments": [
            {"mime_type": "image/png", "file": "https://cdn/x.png", "name": "x.png", "size": 2048},
            {"mime_type": "application/pdf", "file": "https://cdn/y.pdf"}
        ],
        "creator": "u1",
        "fullname": "Alice",
        "profile_picture_url": null,
        "upvote_count": 3,
        "user_has_upvoted": true,
        "is_deleted": false,
        "is_new": true,
        "created_by_admin": false,
        "thread_color": "teal",
        "meta": {"source": "import", "rank": [1, 2]}
    }))
}

#[test]
fn enrich_maps_fields_and_derives_ownership() {
    let comment = transformer().enrich(&canonical_reply()).unwrap();

    assert_eq!(comment.id, CommentId::new("c2"));
    assert_eq!(comment.parent_id, Some(CommentId::new("c1")));
    assert!(comment.child_ids.is_empty());
    assert_eq!(comment.pings, vec![UserId::new("bob")]);
    assert_eq!(comment.attachments.len(), 2);
    assert_eq!(comment.attachments[0].url, "https://cdn/x.png");
    assert_eq!(comment.attachments[1].name, None);
    assert_eq!(comment.upvote_count, 3);
    assert!(comment.user_has_upvoted);
    assert!(comment.created_by_current_user);
    assert!(comment.was_edited());
    assert_eq!(comment.extra.len(), 2);
    assert_eq!(comment.extra["thread_color"], json!("teal"));
}

#[test]
fn created_by_current_user_compares_creator_with_context() {
    let comment = transformer_for("someone-else", FieldMapping::default())
        .enrich(&canonical_reply())
        .unwrap();
    assert!(!comment.created_by_current_user);
}

#[test]
fn deplete_inverts_enrich_for_canonical_records() {
    let transformer = transformer();
    let wire = canonical_reply();
    let comment = transformer.enrich(&wire).unwrap();
    assert_eq!(transformer.deplete(&comment), wire);
}

#[test]
fn round_trip_holds_under_a_custom_mapping() {
    let mapping = FieldMapping {
        parent: "parent_id".into(),
        created: "createdAt".into(),
        upvote_count: "votes".into(),
        ..FieldMapping::default()
    };
    let transformer = transformer_for("u1", mapping);
    let wire = payload(json!({
        "id": "c1",
        "parent_id": null,
        "createdAt": "2023-12-31T23:59:59.999Z",
        "modified": null,
        "content": "top",
        "pings": [],
        "attachments": [],
        "creator": "u9",
        "fullname": null,
        "profile_picture_url": "https://cdn/u9.png",
        "votes": 0,
        "user_has_upvoted": false,
        "is_deleted": true,
        "is_new": false,
        "created_by_admin": true,
        "upvote_count": "not mapped any more"
    }));

    let comment = transformer.enrich(&wire).unwrap();
    assert!(comment.is_top_level());
    assert!(comment.is_deleted);
    assert_eq!(comment.extra["upvote_count"], json!("not mapped any more"));
    assert_eq!(transformer.deplete(&comment), wire);
}

#[test]
fn falsy_parent_markers_mean_top_level() {
    let transformer = transformer();
    for marker in [json!(null), json!(""), json!(0), json!(false)] {
        let mut wire = canonical_reply();
        wire.insert("parent".into(), marker.clone());
        let comment = transformer.enrich(&wire).unwrap();
        assert_eq!(comment.parent_id, None, "marker {marker}");
    }
}

#[test]
fn lenient_inputs_are_normalized() {
    let transformer = transformer();
    let wire = payload(json!({
        "id": 42,
        "parent": 7,
        "created": 1_709_287_200_000_i64,
        "content": "numbers",
        "creator": 5
    }));

    let comment = transformer.enrich(&wire).unwrap();
    assert_eq!(comment.id, CommentId::new("42"));
    assert_eq!(comment.parent_id, Some(CommentId::new("7")));
    assert_eq!(comment.creator_user_id, UserId::new("5"));
    assert_eq!(format_time(&comment.created_at), "2024-03-01T10:00:00.000Z");
    assert_eq!(comment.upvote_count, 0);
    assert!(comment.modified_at.is_none());
    assert_eq!(transformer.deplete(&comment), wire);
}

#[test]
fn integer_ids_and_epoch_times_round_trip() {
    let transformer = transformer();
    let mut wire = canonical_reply();
    wire.insert("id".into(), json!(1));
    wire.insert("parent".into(), json!(0));
    wire.insert("modified".into(), json!(1_709_287_530_250_i64));

    let comment = transformer.enrich(&wire).unwrap();
    assert_eq!(comment.id, CommentId::new("1"));
    assert!(comment.is_top_level());
    assert_eq!(transformer.deplete(&comment), wire);
}

#[test]
fn second_precision_timestamps_round_trip() {
    let transformer = transformer();
    let mut wire = canonical_reply();
    wire.insert("created".into(), json!("2024-03-01T10:00:00Z"));
    wire.insert("modified".into(), json!("2024-03-01T12:00:00+02:00"));

    let comment = transformer.enrich(&wire).unwrap();
    assert!(!comment.was_edited());
    assert_eq!(transformer.deplete(&comment), wire);
}

#[test]
fn changed_fields_are_written_in_canonical_form() {
    let transformer = transformer();
    let wire = payload(json!({
        "id": 42,
        "created": 1_709_287_200_000_i64,
        "modified": 1_709_287_200_000_i64,
        "content": "numbers",
        "creator": "u1"
    }));
    let mut comment = transformer.enrich(&wire).unwrap();
    comment.id = CommentId::new("srv-42");
    comment.modified_at = Some(comment.created_at + chrono::Duration::seconds(5));
    comment.upvote_count = 1;

    let depleted = transformer.deplete(&comment);
    assert_eq!(depleted["id"], json!("srv-42"));
    assert_eq!(depleted["modified"], json!("2024-03-01T10:00:05.000Z"));
    assert_eq!(depleted["upvote_count"], json!(1));
    assert_eq!(depleted["created"], json!(1_709_287_200_000_i64));
    assert!(!depleted.contains_key("is_deleted"));
}

#[test]
fn unknown_attachment_keys_pass_through() {
    let transformer = transformer();
    let mut wire = canonical_reply();
    wire.insert(
        "attachments".into(),
        json!([{"file": "https://cdn/x.png", "id": 7, "mime_type": "image/png"}]),
    );

    let mut comment = transformer.enrich(&wire).unwrap();
    assert_eq!(comment.attachments[0].extra["id"], json!(7));
    assert_eq!(transformer.deplete(&comment), wire);

    // Rendered from the parsed record rather than the received spelling.
    comment.wire = WireOrigin::default();
    assert_eq!(transformer.deplete(&comment)["attachments"], wire["attachments"]);
}

#[test]
fn missing_required_fields_are_reported() {
    let transformer = transformer();
    for key in ["id", "created", "content", "creator"] {
        let mut wire = canonical_reply();
        wire.remove(key);
        assert_eq!(
            transformer.enrich(&wire),
            Err(TransformError::MissingField(key.to_string()))
        );
    }
}

#[test]
fn malformed_values_are_rejected() {
    let transformer = transformer();

    let mut wire = canonical_reply();
    wire.insert("created".into(), json!("yesterday"));
    assert!(matches!(
        transformer.enrich(&wire),
        Err(TransformError::InvalidTimestamp { .. })
    ));

    let mut wire = canonical_reply();
    wire.insert("upvote_count".into(), json!(-1));
    assert_eq!(
        transformer.enrich(&wire),
        Err(TransformError::Negative("upvote_count".into()))
    );

    let mut wire = canonical_reply();
    wire.insert("user_has_upvoted".into(), json!("true"));
    assert!(matches!(
        transformer.enrich(&wire),
        Err(TransformError::WrongType { .. })
    ));

    let mut wire = canonical_reply();
    wire.insert("attachments".into(), json!([{"file": "no mime"}]));
    assert!(matches!(
        transformer.enrich(&wire),
        Err(TransformError::WrongType { .. })
    ));
}

#[test]
fn merge_overlays_response_and_keeps_the_rest() {
    let transformer = transformer();
    let mut current = transformer.enrich(&canonical_reply()).unwrap();
    current.child_ids = vec![CommentId::new("c3")];

    let response = payload(json!({
        "content": "server cleaned",
        "modified": "2024-03-01T11:00:00.000Z",
        "parent": null,
        "thread_color": "red",
        "server_rev": 9
    }));
    let merged = transformer.merge(&current, &response).unwrap();

    assert_eq!(merged.content, "server cleaned");
    assert_eq!(merged.parent_id, current.parent_id);
    assert_eq!(merged.child_ids, current.child_ids);
    assert_eq!(merged.upvote_count, 3);
    assert_eq!(merged.pings, current.pings);
    assert_eq!(merged.extra["thread_color"], json!("red"));
    assert_eq!(merged.extra["server_rev"], json!(9));
    assert_eq!(merged.extra["meta"], current.extra["meta"]);
}
