//! API responses → CSV rows
//!
//! Row structs serialize with the column names used by earlier crawls, so
//! new output appends cleanly to existing files.

use serde::Serialize;
use serde_json::Value;

use crate::model::{
    Deviation, FriendEntry, MetadataEntry, MetadataResponse, Page, Profile, WatcherEntry,
};

/// JSON text for nested values; null → empty cell
fn json_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        v => v.to_string(),
    }
}

fn json_list<T: Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfileRow {
    pub user: String,
    pub user_id: String,
    pub user_type: String,
    pub real_name: String,
    pub profil_url: String,
    pub tag_line: String,
    pub country: String,
    pub user_is_artist: Option<bool>,
    pub website: String,
    pub bio: String,
    pub cover_photo: String,
    pub last_status: String,
    pub level: String,
    pub specialty: String,
    pub user_deviations: Option<u64>,
    pub user_favourites: Option<u64>,
    pub user_comments: Option<u64>,
    pub profile_pageviews: Option<u64>,
    pub profile_comments: Option<u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WatcherRow {
    #[serde(rename = "Watchers name")]
    pub name: String,
    pub user_icon: String,
    #[serde(rename = "type")]
    pub user_type: String,
    pub is_watching: bool,
    pub last_visit: String,
    pub activity: bool,
    pub collections: bool,
    pub critiques: bool,
    pub deviations: bool,
    pub forum_threads: bool,
    pub friend: bool,
    pub journals: bool,
    pub scraps: bool,
    #[serde(rename = "Deviant")]
    pub deviant: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FriendRow {
    #[serde(rename = "Friends name")]
    pub name: String,
    pub user_icon: String,
    #[serde(rename = "type")]
    pub user_type: String,
    pub is_watching: bool,
    pub watches_you: bool,
    pub last_visit: String,
    pub friends: bool,
    pub deviations: bool,
    pub journals: bool,
    pub forum_threads: bool,
    pub critiques: bool,
    pub scraps: bool,
    pub activity: bool,
    pub collections: bool,
    #[serde(rename = "Deviant")]
    pub deviant: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GalleryRow {
    #[serde(rename = "Deviation_id")]
    pub deviation_id: String,
    #[serde(rename = "Deviation_url")]
    pub url: String,
    #[serde(rename = "Deviation_title")]
    pub title: String,
    #[serde(rename = "Author_id")]
    pub author_id: String,
    #[serde(rename = "Author_name")]
    pub author_name: String,
    #[serde(rename = "Author_type")]
    pub author_type: String,
    #[serde(rename = "Published_on")]
    pub published_on: String,
    #[serde(rename = "Deviation_source")]
    pub source: String,
    #[serde(rename = "Deviation_height")]
    pub height: Option<u64>,
    #[serde(rename = "Deviation_width")]
    pub width: Option<u64>,
    #[serde(rename = "Deviation_transparency")]
    pub transparency: Option<bool>,
    #[serde(rename = "Comments")]
    pub comments: Option<u64>,
    #[serde(rename = "is_Mature")]
    pub is_mature: Option<bool>,
    #[serde(rename = "is_Downloadable")]
    pub is_downloadable: Option<bool>,
    #[serde(rename = "Favourites")]
    pub favourites: Option<u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetadataRow {
    #[serde(rename = "Devtn_Id")]
    pub id: String,
    #[serde(rename = "Devtn_Title")]
    pub title: String,
    #[serde(rename = "Devtn_Descp")]
    pub description: String,
    #[serde(rename = "Author_Id")]
    pub author_id: String,
    #[serde(rename = "Author_Name")]
    pub author_name: String,
    #[serde(rename = "Author_Icon")]
    pub author_icon: String,
    #[serde(rename = "Author_Type")]
    pub author_type: String,
    #[serde(rename = "License")]
    pub license: String,
    #[serde(rename = "Allows_Comments")]
    pub allows_comments: Option<bool>,
    #[serde(rename = "Is_Favourited")]
    pub is_favourited: Option<bool>,
    #[serde(rename = "Is_Mature")]
    pub is_mature: Option<bool>,
    #[serde(rename = "Can_post_comments")]
    pub can_post_comments: Option<bool>,
    #[serde(rename = "Tags_Info")]
    pub tags_info: String,
    pub tag_name: String,
    #[serde(rename = "Sponsered")]
    pub sponsored: String,
    #[serde(rename = "Sponser")]
    pub sponsor: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TagDeviantRow {
    pub username: String,
    pub tag: String,
}

/// `None` when the body is an API error or not a profile
pub fn parse_profile(username: &str, body: Value) -> Option<ProfileRow> {
    if body.get("error").is_some() {
        log::warn!(
            "{username}: profile error: {}",
            body.get("error_description")
                .or_else(|| body.get("error"))
                .map(json_cell)
                .unwrap_or_default()
        );
        return None;
    }
    let p: Profile = match serde_json::from_value(body) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("{username}: unreadable profile: {e}");
            return None;
        }
    };
    Some(ProfileRow {
        user: username.to_string(),
        user_id: p.user.userid,
        user_type: p.user.user_type,
        real_name: p.real_name,
        profil_url: p.profile_url,
        tag_line: p.tagline,
        country: p.country,
        user_is_artist: p.user_is_artist,
        website: p.website,
        bio: p.bio,
        cover_photo: json_cell(&p.cover_photo),
        last_status: json_cell(&p.last_status),
        level: p.artist_level,
        specialty: p.artist_specialty,
        user_deviations: p.stats.user_deviations,
        user_favourites: p.stats.user_favourites,
        user_comments: p.stats.user_comments,
        profile_pageviews: p.stats.profile_pageviews,
        profile_comments: p.stats.profile_comments,
    })
}

fn parse_page<T: serde::de::DeserializeOwned>(body: Value) -> Page<T> {
    serde_json::from_value(body).unwrap_or_else(|e| {
        log::debug!("unreadable page: {e}");
        Page {
            results: Vec::new(),
            has_more: false,
            next_offset: None,
        }
    })
}

/// `(has_more, rows)` for one watchers page of `deviant`
pub fn parse_watchers(body: Value, deviant: &str) -> (bool, Vec<WatcherRow>) {
    let page: Page<WatcherEntry> = parse_page(body);
    let rows = page
        .results
        .into_iter()
        .filter(|e| !e.user.username.is_empty())
        .map(|e| WatcherRow {
            name: e.user.username,
            user_icon: e.user.usericon,
            user_type: e.user.user_type,
            is_watching: e.is_watching,
            last_visit: e.lastvisit,
            activity: e.watch.activity,
            collections: e.watch.collections,
            critiques: e.watch.critiques,
            deviations: e.watch.deviations,
            forum_threads: e.watch.forum_threads,
            friend: e.watch.friend,
            journals: e.watch.journals,
            scraps: e.watch.scraps,
            deviant: deviant.to_string(),
        })
        .collect();
    (page.has_more, rows)
}

/// `(has_more, rows)` for one friends page of `deviant`
pub fn parse_friends(body: Value, deviant: &str) -> (bool, Vec<FriendRow>) {
    let page: Page<FriendEntry> = parse_page(body);
    let rows = page
        .results
        .into_iter()
        .filter(|e| !e.user.username.is_empty())
        .map(|e| FriendRow {
            name: e.user.username,
            user_icon: e.user.usericon,
            user_type: e.user.user_type,
            is_watching: e.is_watching,
            watches_you: e.watches_you,
            last_visit: e.lastvisit,
            friends: e.watch.friend,
            deviations: e.watch.deviations,
            journals: e.watch.journals,
            forum_threads: e.watch.forum_threads,
            critiques: e.watch.critiques,
            scraps: e.watch.scraps,
            activity: e.watch.activity,
            collections: e.watch.collections,
            deviant: deviant.to_string(),
        })
        .collect();
    (page.has_more, rows)
}

/// One parsed gallery page
#[derive(Debug, Default)]
pub struct GalleryPage {
    pub rows: Vec<GalleryRow>,
    /// Results on the page, including entries without an id
    pub result_count: usize,
    pub has_more: bool,
    pub next_offset: Option<u64>,
}

fn gallery_row(d: Deviation) -> GalleryRow {
    let author = d.author.unwrap_or_default();
    let content = d.content.unwrap_or_default();
    let stats = d.stats.unwrap_or_default();
    GalleryRow {
        deviation_id: d.deviationid,
        url: d.url,
        title: d.title,
        author_id: author.userid,
        author_name: author.username,
        author_type: author.user_type,
        published_on: d.published_time,
        source: content.src,
        height: content.height,
        width: content.width,
        transparency: content.transparency,
        comments: stats.comments,
        is_mature: d.is_mature,
        is_downloadable: d.is_downloadable,
        favourites: stats.favourites,
    }
}

pub fn parse_gallery(body: Value) -> GalleryPage {
    let page: Page<Deviation> = parse_page(body);
    let result_count = page.results.len();
    let rows = page
        .results
        .into_iter()
        .filter(|d| !d.deviationid.is_empty())
        .map(gallery_row)
        .collect();
    GalleryPage {
        rows,
        result_count,
        has_more: page.has_more,
        next_offset: page.next_offset,
    }
}

fn metadata_row(m: MetadataEntry) -> MetadataRow {
    let names: Vec<&str> = m.tags.iter().map(|t| t.tag_name.as_str()).collect();
    let sponsored: Vec<bool> = m.tags.iter().map(|t| t.sponsored).collect();
    let sponsors: Vec<&str> = m.tags.iter().map(|t| t.sponsor.as_str()).collect();
    MetadataRow {
        tags_info: json_list(&m.tags),
        tag_name: json_list(&names),
        sponsored: json_list(&sponsored),
        sponsor: json_list(&sponsors),
        id: m.deviationid,
        title: m.title,
        description: m.description,
        author_id: m.author.userid,
        author_name: m.author.username,
        author_icon: m.author.usericon,
        author_type: m.author.user_type,
        license: m.license,
        allows_comments: m.allows_comments,
        is_favourited: m.is_favourited,
        is_mature: m.is_mature,
        can_post_comments: m.can_post_comment,
    }
}

pub fn parse_metadata(body: Value) -> Vec<MetadataRow> {
    let resp: MetadataResponse = serde_json::from_value(body).unwrap_or_default();
    resp.metadata
        .into_iter()
        .filter(|m| !m.deviationid.is_empty())
        .map(metadata_row)
        .collect()
}

/// Author usernames of a daily-deviations listing, in listing order
pub fn daily_authors(body: &Value) -> Vec<String> {
    body.get("results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|d| d.pointer("/author/username").and_then(Value::as_str))
                .filter(|u| !u.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// One parsed tag-browse page
#[derive(Debug, Default)]
pub struct TagPage {
    pub rows: Vec<TagDeviantRow>,
    pub next_offset: Option<u64>,
}

pub fn parse_tag_page(body: Value, tag: &str) -> TagPage {
    let page: Page<Deviation> = parse_page(body);
    let rows = page
        .results
        .into_iter()
        .filter_map(|d| d.author)
        .filter(|a| !a.username.is_empty())
        .map(|a| TagDeviantRow {
            username: a.username,
            tag: tag.to_string(),
        })
        .collect();
    TagPage {
        rows,
        next_offset: page.next_offset,
    }
}

/// `"cats?cursor=abc"` → `"cats"`
pub fn split_tag_cursor(entry: &str) -> &str {
    entry.split_once('?').map_or(entry, |(tag, _)| tag).trim()
}
