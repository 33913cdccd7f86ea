//! Table definitions for the deviant database

use std::path::Path;

use anyhow::Context;
use rusqlite::Connection;

/// Tables created by [`init`], in creation order
pub const TABLES: &[&str] = &[
    "artists",
    "watchers_v1",
    "friends_v1",
    "watchings",
    "artist_interactions",
    "imgs_date",
    "imgs_dscrpt",
    "imgs_tags",
];

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS artists (
    id INTEGER PRIMARY KEY,
    artist_name TEXT UNIQUE,
    profile_url TEXT,
    country TEXT,
    level TEXT,
    registration_date INTEGER,
    no_of_deviations INTEGER,
    no_of_favourites INTEGER,
    no_of_user_comments INTEGER,
    no_of_pageviews INTEGER,
    no_of_profile_comments INTEGER,
    is_artist BOOLEAN,
    gender TEXT,
    speciality TEXT,
    no_of_images INTEGER,
    no_of_AI_images INTEGER,
    ai_adopter BOOLEAN,
    ai_adoption_first_time INTEGER
);

CREATE TABLE IF NOT EXISTS watchers_v1 (
    id INTEGER PRIMARY KEY,
    artist_id INTEGER NOT NULL REFERENCES artists(id),
    watcher_name TEXT NOT NULL,
    watcher_type TEXT,
    is_watching BOOLEAN,
    last_visit INTEGER,
    activity BOOLEAN,
    collections BOOLEAN,
    critiques BOOLEAN,
    deviations BOOLEAN,
    forum_threads BOOLEAN,
    friend BOOLEAN,
    journals BOOLEAN,
    scraps BOOLEAN,
    artist_name TEXT,
    UNIQUE (artist_id, watcher_name)
);

CREATE TABLE IF NOT EXISTS friends_v1 (
    id INTEGER PRIMARY KEY,
    artist_id INTEGER NOT NULL REFERENCES artists(id),
    friend_name TEXT NOT NULL,
    friend_type TEXT,
    is_watching BOOLEAN,
    last_visit INTEGER,
    friends BOOLEAN,
    deviations BOOLEAN,
    journals BOOLEAN,
    forum_threads BOOLEAN,
    critiques BOOLEAN,
    scraps BOOLEAN,
    activity BOOLEAN,
    collections BOOLEAN,
    artist_name TEXT,
    watches_you BOOLEAN,
    UNIQUE (artist_id, friend_name)
);

CREATE TABLE IF NOT EXISTS watchings (
    id INTEGER PRIMARY KEY,
    artist_id INTEGER NOT NULL REFERENCES artists(id),
    watching_name TEXT NOT NULL,
    UNIQUE (artist_id, watching_name)
);

CREATE TABLE IF NOT EXISTS artist_interactions (
    id INTEGER PRIMARY KEY,
    artist_id_to INTEGER NOT NULL REFERENCES artists(id),
    artist_name_to TEXT,
    artist_id_from INTEGER NOT NULL,
    artist_name_from TEXT,
    interaction_type TEXT NOT NULL,
    date INTEGER,
    UNIQUE (artist_id_to, artist_id_from, interaction_type)
);

CREATE TABLE IF NOT EXISTS imgs_date (
    id TEXT PRIMARY KEY,
    artist_id INTEGER REFERENCES artists(id),
    artist_name TEXT,
    date INTEGER
);

CREATE TABLE IF NOT EXISTS imgs_dscrpt (
    id TEXT PRIMARY KEY,
    artist_id INTEGER REFERENCES artists(id),
    artist_name TEXT,
    description TEXT
);

CREATE TABLE IF NOT EXISTS imgs_tags (
    tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
    image_id TEXT,
    artist_id INTEGER REFERENCES artists(id),
    artist_name TEXT,
    tags TEXT,
    UNIQUE (image_id, tags)
);
"#;

/// Open (or create) the database at `path` with the schema applied
pub fn open(path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
        .context("Failed to configure SQLite")?;
    init(&conn)?;
    Ok(conn)
}

/// Create missing tables
pub fn init(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(DDL).context("Failed to create tables")
}
