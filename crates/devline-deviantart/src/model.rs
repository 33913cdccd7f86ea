//! Serde models for API responses
//!
//! Every field is optional on the wire; nulls and missing keys become
//! defaults so one odd record never fails a whole page.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize null as `T::default()`
fn null_to_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Accept `"1683132000"`, `1683132000` or null as a string
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    })
}

/// Paged listing
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default = "Vec::new", deserialize_with = "null_to_default")]
    pub results: Vec<T>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub has_more: bool,
    #[serde(default)]
    pub next_offset: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserRef {
    #[serde(deserialize_with = "null_to_default")]
    pub userid: String,
    #[serde(deserialize_with = "null_to_default")]
    pub username: String,
    #[serde(deserialize_with = "null_to_default")]
    pub usericon: String,
    #[serde(rename = "type", deserialize_with = "null_to_default")]
    pub user_type: String,
}

/// What a watch relation subscribes to
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatchFlags {
    pub friend: bool,
    pub deviations: bool,
    pub journals: bool,
    pub forum_threads: bool,
    pub critiques: bool,
    pub scraps: bool,
    pub activity: bool,
    pub collections: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatcherEntry {
    pub user: UserRef,
    pub is_watching: bool,
    #[serde(deserialize_with = "string_or_number")]
    pub lastvisit: String,
    pub watch: WatchFlags,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FriendEntry {
    pub user: UserRef,
    pub is_watching: bool,
    pub watches_you: bool,
    #[serde(deserialize_with = "string_or_number")]
    pub lastvisit: String,
    pub watch: WatchFlags,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileStats {
    pub user_deviations: Option<u64>,
    pub user_favourites: Option<u64>,
    pub user_comments: Option<u64>,
    pub profile_pageviews: Option<u64>,
    pub profile_comments: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub user: UserRef,
    #[serde(deserialize_with = "null_to_default")]
    pub real_name: String,
    #[serde(deserialize_with = "null_to_default")]
    pub tagline: String,
    #[serde(deserialize_with = "null_to_default")]
    pub country: String,
    #[serde(deserialize_with = "null_to_default")]
    pub website: String,
    #[serde(deserialize_with = "null_to_default")]
    pub bio: String,
    pub cover_photo: Value,
    pub last_status: Value,
    #[serde(deserialize_with = "null_to_default")]
    pub artist_level: String,
    #[serde(deserialize_with = "null_to_default")]
    pub artist_specialty: String,
    pub user_is_artist: Option<bool>,
    #[serde(deserialize_with = "null_to_default")]
    pub profile_url: String,
    pub stats: ProfileStats,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Content {
    #[serde(deserialize_with = "null_to_default")]
    pub src: String,
    pub height: Option<u64>,
    pub width: Option<u64>,
    pub transparency: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviationStats {
    pub comments: Option<u64>,
    pub favourites: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Deviation {
    #[serde(deserialize_with = "null_to_default")]
    pub deviationid: String,
    #[serde(deserialize_with = "null_to_default")]
    pub url: String,
    #[serde(deserialize_with = "null_to_default")]
    pub title: String,
    pub author: Option<UserRef>,
    #[serde(deserialize_with = "string_or_number")]
    pub published_time: String,
    pub content: Option<Content>,
    pub stats: Option<DeviationStats>,
    pub is_mature: Option<bool>,
    pub is_downloadable: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Tag {
    #[serde(deserialize_with = "null_to_default")]
    pub tag_name: String,
    pub sponsored: bool,
    #[serde(deserialize_with = "null_to_default")]
    pub sponsor: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetadataEntry {
    #[serde(deserialize_with = "null_to_default")]
    pub deviationid: String,
    #[serde(deserialize_with = "null_to_default")]
    pub title: String,
    #[serde(deserialize_with = "null_to_default")]
    pub description: String,
    pub author: UserRef,
    #[serde(deserialize_with = "null_to_default")]
    pub license: String,
    pub allows_comments: Option<bool>,
    pub is_favourited: Option<bool>,
    pub is_mature: Option<bool>,
    pub can_post_comment: Option<bool>,
    #[serde(deserialize_with = "null_to_default")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MetadataResponse {
    #[serde(deserialize_with = "null_to_default")]
    pub metadata: Vec<MetadataEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_tolerates_nulls() {
        let page: Page<WatcherEntry> =
            serde_json::from_str(r#"{"results": null, "has_more": null}"#).unwrap();
        assert!(page.results.is_empty());
        assert!(!page.has_more);
        assert_eq!(page.next_offset, None);
    }

    #[test]
    fn watcher_entry_full() {
        let e: WatcherEntry = serde_json::from_str(
            r#"{
                "user": {"userid": "U1", "username": "amy", "usericon": "https://a/i.png", "type": "regular"},
                "is_watching": true,
                "lastvisit": "2024-02-01T10:00:00-0800",
                "watch": {"friend": true, "deviations": true, "journals": false,
                          "forum_threads": false, "critiques": true, "scraps": false,
                          "activity": true, "collections": false}
            }"#,
        )
        .unwrap();
        assert_eq!(e.user.username, "amy");
        assert_eq!(e.user.user_type, "regular");
        assert!(e.watch.critiques && !e.watch.scraps);
        assert_eq!(e.lastvisit, "2024-02-01T10:00:00-0800");
    }

    #[test]
    fn missing_nested_fields_default() {
        let e: FriendEntry = serde_json::from_str(r#"{"user": {"username": "zed"}}"#).unwrap();
        assert_eq!(e.user.username, "zed");
        assert!(e.user.userid.is_empty());
        assert!(!e.watches_you);
        assert!(e.lastvisit.is_empty());
    }

    #[test]
    fn numeric_published_time() {
        let d: Deviation =
            serde_json::from_str(r#"{"deviationid": "D1", "published_time": 1683132000}"#).unwrap();
        assert_eq!(d.published_time, "1683132000");
        let d: Deviation =
            serde_json::from_str(r#"{"deviationid": "D1", "published_time": "1683132000"}"#)
                .unwrap();
        assert_eq!(d.published_time, "1683132000");
    }

    #[test]
    fn metadata_with_null_tags() {
        let m: MetadataResponse = serde_json::from_str(
            r#"{"metadata": [{"deviationid": "D1", "tags": null, "license": null}]}"#,
        )
        .unwrap();
        assert_eq!(m.metadata.len(), 1);
        assert!(m.metadata[0].tags.is_empty());
        assert!(m.metadata[0].license.is_empty());
    }
}
