use super::*;
use std::collections::HashMap;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn default_mapping_is_valid_and_uses_plain_keys() {
    let mapping = FieldMapping::default();
    assert_eq!(mapping.validate(), Ok(()));
    assert!(mapping.is_mapped("upvote_count"));
    assert!(!mapping.is_mapped("upvoteCount"));
}

#[test]
fn duplicate_external_key_is_rejected() {
    let mapping = FieldMapping {
        modified: "created".into(),
        ..FieldMapping::default()
    };
    assert_eq!(
        mapping.validate(),
        Err(MappingError::DuplicateKey {
            key: "created".into()
        })
    );
}

#[test]
fn empty_external_key_is_rejected() {
    let mapping = FieldMapping {
        pings: "  ".into(),
        ..FieldMapping::default()
    };
    assert_eq!(
        mapping.validate(),
        Err(MappingError::EmptyKey { field: "pings" })
    );
    assert!(CommentsContext::new(CommentsOptions {
        field_mappings: mapping,
        ..CommentsOptions::default()
    })
    .is_err());
}

#[test]
fn toml_overrides_only_the_listed_fields() {
    let options: CommentsOptions = toml::from_str(
        r#"
        current_user_id = "u-7"
        enable_attachments = true
        default_sort = "popularity"

        [field_mappings]
        parent = "parent_id"
        "#,
    )
    .unwrap();

    assert_eq!(options.current_user_id, UserId::new("u-7"));
    assert!(options.enable_attachments);
    assert!(options.enable_replying);
    assert!(!options.enable_deleting_comment_with_replies);
    assert_eq!(options.default_sort, SortKey::Popularity);
    assert_eq!(options.field_mappings.parent, "parent_id");
    assert_eq!(options.field_mappings.id, "id");
}

#[test]
fn env_overrides_win_and_bad_values_are_ignored() {
    let mut options = CommentsOptions::default();
    apply_env_overrides(
        &mut options,
        lookup(&[
            ("COMMENTS__CURRENT_USER_ID", "admin-1"),
            ("COMMENTS__CURRENT_USER_IS_ADMIN", "yes"),
            ("COMMENTS__ENABLE_UPVOTING", "0"),
            ("COMMENTS__ENABLE_EDITING", "sometimes"),
            ("COMMENTS__DEFAULT_SORT", "sideways"),
        ]),
    );

    assert_eq!(options.current_user_id, UserId::new("admin-1"));
    assert!(options.current_user_is_admin);
    assert!(!options.enable_upvoting);
    assert!(options.enable_editing);
    assert_eq!(options.default_sort, SortKey::Newest);
}

#[test]
fn missing_config_file_falls_back_to_defaults() {
    let path = std::env::temp_dir().join("comments-config-that-does-not-exist.toml");
    let options = load_options(&path).unwrap();
    assert_eq!(options.field_mappings, FieldMapping::default());
}

#[test]
fn config_file_with_conflicting_mapping_fails_to_load() {
    let path = std::env::temp_dir().join(format!(
        "comments-config-{}.toml",
        std::process::id()
    ));
    fs::write(&path, "[field_mappings]\ncontent = \"id\"\n").unwrap();
    let err = load_options(&path).unwrap_err();
    fs::remove_file(&path).ok();
    assert!(format!("{err:#}").contains("mapped more than once"));
}
