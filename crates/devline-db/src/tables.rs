//! Loaders for each crawl output

use std::fmt;
use std::path::Path;

use anyhow::{Context, bail};
use devline_core::is_shutdown_requested;
use rusqlite::types::Value;
use rusqlite::{Connection, params};
use rustc_hash::FxHashMap;

use crate::checkpoint::ChunkCheckpoint;
use crate::convert::{
    bool_cell, clean_description, epoch_seconds, int_cell, iso_to_millis, parse_tag_list,
    parse_watching_list,
};
use crate::loader::{
    Cells, DEFAULT_CHUNK_SIZE, LoadSummary, Mapped, Row, TableSpec, artist_ids, dedup,
    insert_rows, load_csv, opt_bool, opt_int, text,
};
use crate::registry::InteractorIds;
use crate::schema;

/// Rows of `watchings` read per interaction batch
pub const WATCHING_BATCH: usize = 10_000;

const ARTISTS: TableSpec = TableSpec {
    table: "artists",
    columns: &[
        "artist_name",
        "profile_url",
        "country",
        "level",
        "no_of_deviations",
        "no_of_favourites",
        "no_of_user_comments",
        "no_of_pageviews",
        "no_of_profile_comments",
        "is_artist",
        "speciality",
    ],
    key: &["artist_name"],
    refresh: &[],
};

const WATCHERS: TableSpec = TableSpec {
    table: "watchers_v1",
    columns: &[
        "artist_id",
        "watcher_name",
        "watcher_type",
        "is_watching",
        "last_visit",
        "activity",
        "collections",
        "critiques",
        "deviations",
        "forum_threads",
        "friend",
        "journals",
        "scraps",
        "artist_name",
    ],
    key: &["artist_id", "watcher_name"],
    refresh: &[],
};

const FRIENDS: TableSpec = TableSpec {
    table: "friends_v1",
    columns: &[
        "artist_id",
        "friend_name",
        "friend_type",
        "is_watching",
        "watches_you",
        "last_visit",
        "friends",
        "deviations",
        "journals",
        "forum_threads",
        "critiques",
        "scraps",
        "activity",
        "collections",
        "artist_name",
    ],
    key: &["artist_id", "friend_name"],
    refresh: &[],
};

const INTERACTIONS: TableSpec = TableSpec {
    table: "artist_interactions",
    columns: &[
        "artist_id_to",
        "artist_name_to",
        "artist_id_from",
        "artist_name_from",
        "interaction_type",
        "date",
    ],
    key: &["artist_id_to", "artist_id_from", "interaction_type"],
    refresh: &[],
};

const WATCHINGS: TableSpec = TableSpec {
    table: "watchings",
    columns: &["artist_id", "watching_name"],
    key: &["artist_id", "watching_name"],
    refresh: &[],
};

const IMGS_DATE: TableSpec = TableSpec {
    table: "imgs_date",
    columns: &["id", "artist_id", "artist_name", "date"],
    key: &["id"],
    refresh: &["artist_name"],
};

const IMGS_DSCRPT: TableSpec = TableSpec {
    table: "imgs_dscrpt",
    columns: &["id", "artist_id", "artist_name", "description"],
    key: &["id"],
    refresh: &[],
};

const IMGS_TAGS: TableSpec = TableSpec {
    table: "imgs_tags",
    columns: &["image_id", "artist_id", "artist_name", "tags"],
    key: &["image_id", "tags"],
    refresh: &[],
};

// Watcher and friend flag columns, CSV name == DB name
const WATCHER_FLAGS: [&str; 8] = [
    "activity",
    "collections",
    "critiques",
    "deviations",
    "forum_threads",
    "friend",
    "journals",
    "scraps",
];
const FRIEND_FLAGS: [&str; 8] = [
    "friends",
    "deviations",
    "journals",
    "forum_threads",
    "critiques",
    "scraps",
    "activity",
    "collections",
];

/// Edge kind stored in `artist_interactions.interaction_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Watcher,
    Watching,
    Friend,
}

impl InteractionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Watcher => "watcher",
            Self::Watching => "watching",
            Self::Friend => "friend",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `artists.id` of the trimmed `column` value
fn artist_of(
    artists: &FxHashMap<String, i64>,
    cells: &Cells<'_>,
    column: &str,
) -> Result<(i64, String), Mapped> {
    let name = cells.get(column).trim();
    if name.is_empty() {
        return Err(Mapped::Skip);
    }
    match artists.get(name) {
        Some(&id) => Ok((id, name.to_string())),
        None => Err(Mapped::Unmapped(name.to_string())),
    }
}

fn flag(cells: &Cells<'_>, column: &str) -> Value {
    opt_bool(bool_cell(cells.get(column)))
}

fn count(cells: &Cells<'_>, column: &str) -> Value {
    opt_int(int_cell(cells.get(column)))
}

/// Deviant database with its load settings
pub struct Database {
    conn: Connection,
    chunk_size: usize,
    interactors: Option<InteractorIds>,
}

impl Database {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::from_connection(schema::open(path)?))
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        schema::init(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            chunk_size: DEFAULT_CHUNK_SIZE,
            interactors: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of rows in one of [`schema::TABLES`]
    pub fn row_count(&self, table: &str) -> anyhow::Result<i64> {
        if !schema::TABLES.contains(&table) {
            bail!("Unknown table '{table}'");
        }
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |r| r.get(0))
            .with_context(|| format!("Failed to count {table}"))
    }

    fn take_interactors(&mut self) -> anyhow::Result<InteractorIds> {
        match self.interactors.take() {
            Some(ids) => Ok(ids),
            None => InteractorIds::load(&self.conn),
        }
    }

    /// Profiles CSV → `artists`, keyed on `artist_name`
    pub fn load_artists(&mut self, profile_csv: &Path) -> anyhow::Result<LoadSummary> {
        let checkpoint = ChunkCheckpoint::for_csv(profile_csv);
        load_csv(
            &mut self.conn,
            profile_csv,
            &ARTISTS,
            &checkpoint,
            self.chunk_size,
            &["user"],
            |cells| {
                let name = cells.get("user").trim();
                if name.is_empty() {
                    return Mapped::Skip;
                }
                Mapped::Rows(vec![vec![
                    text(name),
                    text(cells.get("profil_url")),
                    text(cells.get("country")),
                    text(cells.get("level")),
                    count(cells, "user_deviations"),
                    count(cells, "user_favourites"),
                    count(cells, "user_comments"),
                    count(cells, "profile_pageviews"),
                    count(cells, "profile_comments"),
                    flag(cells, "user_is_artist"),
                    text(cells.get("specialty")),
                ]])
            },
        )
    }

    /// Watchers CSV → `watchers_v1`
    pub fn load_watchers(&mut self, csv: &Path) -> anyhow::Result<LoadSummary> {
        let artists = artist_ids(&self.conn)?;
        let checkpoint = ChunkCheckpoint::for_csv(csv);
        load_csv(
            &mut self.conn,
            csv,
            &WATCHERS,
            &checkpoint,
            self.chunk_size,
            &["Deviant", "Watchers name"],
            |cells| {
                let (artist_id, artist) = match artist_of(&artists, cells, "Deviant") {
                    Ok(found) => found,
                    Err(outcome) => return outcome,
                };
                let watcher = cells.get("Watchers name").trim();
                if watcher.is_empty() {
                    return Mapped::Skip;
                }
                let mut row: Row = vec![
                    Value::Integer(artist_id),
                    text(watcher),
                    text(cells.get("type")),
                    flag(cells, "is_watching"),
                    opt_int(iso_to_millis(cells.get("last_visit"))),
                ];
                row.extend(WATCHER_FLAGS.iter().map(|c| flag(cells, c)));
                row.push(Value::Text(artist));
                Mapped::Rows(vec![row])
            },
        )
    }

    /// Friends CSV → `friends_v1`
    pub fn load_friends(&mut self, csv: &Path) -> anyhow::Result<LoadSummary> {
        let artists = artist_ids(&self.conn)?;
        let checkpoint = ChunkCheckpoint::for_csv(csv);
        load_csv(
            &mut self.conn,
            csv,
            &FRIENDS,
            &checkpoint,
            self.chunk_size,
            &["Deviant", "Friends name"],
            |cells| {
                let (artist_id, artist) = match artist_of(&artists, cells, "Deviant") {
                    Ok(found) => found,
                    Err(outcome) => return outcome,
                };
                let friend = cells.get("Friends name").trim();
                if friend.is_empty() {
                    return Mapped::Skip;
                }
                let mut row: Row = vec![
                    Value::Integer(artist_id),
                    text(friend),
                    text(cells.get("type")),
                    flag(cells, "is_watching"),
                    flag(cells, "watches_you"),
                    opt_int(iso_to_millis(cells.get("last_visit"))),
                ];
                row.extend(FRIEND_FLAGS.iter().map(|c| flag(cells, c)));
                row.push(Value::Text(artist));
                Mapped::Rows(vec![row])
            },
        )
    }

    /// Watcher or friend CSV → `artist_interactions`.
    ///
    /// The `Deviant` column is the target (`artist_id_to`); `from_col` names
    /// the interactor, whose id comes from [`InteractorIds`]. `date_col`,
    /// when given, is converted to epoch milliseconds.
    pub fn load_interactions(
        &mut self,
        csv: &Path,
        kind: InteractionKind,
        from_col: &str,
        date_col: Option<&str>,
    ) -> anyhow::Result<LoadSummary> {
        let artists = artist_ids(&self.conn)?;
        let mut ids = self.take_interactors()?;
        let checkpoint = ChunkCheckpoint::for_table(csv, INTERACTIONS.table);
        let result = load_csv(
            &mut self.conn,
            csv,
            &INTERACTIONS,
            &checkpoint,
            self.chunk_size,
            &["Deviant", from_col],
            |cells| {
                let (to_id, to_name) = match artist_of(&artists, cells, "Deviant") {
                    Ok(found) => found,
                    Err(outcome) => return outcome,
                };
                let from = cells.get(from_col).trim();
                if from.is_empty() {
                    return Mapped::Skip;
                }
                let date = date_col.and_then(|c| iso_to_millis(cells.get(c)));
                Mapped::Rows(vec![vec![
                    Value::Integer(to_id),
                    Value::Text(to_name),
                    Value::Integer(ids.get_or_assign(from)),
                    Value::Text(from.to_string()),
                    Value::Text(kind.as_str().to_string()),
                    opt_int(date),
                ]])
            },
        );
        self.interactors = Some(ids);
        result
    }

    /// `watchings` → `artist_interactions` with kind `watching` and no date
    pub fn load_watching_interactions(&mut self) -> anyhow::Result<LoadSummary> {
        let mut ids = self.take_interactors()?;
        let result = self.watching_batches(&mut ids);
        self.interactors = Some(ids);
        result
    }

    fn watching_batches(&mut self, ids: &mut InteractorIds) -> anyhow::Result<LoadSummary> {
        let mut summary = LoadSummary::new(INTERACTIONS.table);
        let mut offset = 0usize;
        loop {
            if is_shutdown_requested() {
                summary.interrupted = true;
                break;
            }
            let batch: Vec<(i64, String, String)> = {
                let mut stmt = self
                    .conn
                    .prepare(
                        "SELECT w.artist_id, a.artist_name, w.watching_name FROM watchings AS w \
                         JOIN artists AS a ON a.id = w.artist_id \
                         ORDER BY w.id LIMIT ?1 OFFSET ?2",
                    )
                    .context("Failed to prepare watchings query")?;
                let rows = stmt.query_map(params![WATCHING_BATCH as i64, offset as i64], |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                    ))
                })?;
                rows.collect::<Result<_, _>>()
                    .context("Failed to read watchings")?
            };
            if batch.is_empty() {
                break;
            }
            offset += batch.len();

            let mut rows: Vec<Row> = batch
                .into_iter()
                .map(|(to_id, to_name, from)| {
                    vec![
                        Value::Integer(to_id),
                        Value::Text(to_name),
                        Value::Integer(ids.get_or_assign(&from)),
                        Value::Text(from),
                        Value::Text(InteractionKind::Watching.as_str().to_string()),
                        Value::Null,
                    ]
                })
                .collect();
            let repeats = dedup(&INTERACTIONS, &mut rows);
            let (inserted, _) = insert_rows(&mut self.conn, &INTERACTIONS, &rows)?;
            log::info!("watching: {offset} edges read, {inserted} inserted from this batch");
            summary.processed += inserted;
            summary.skipped_duplicates += repeats + rows.len() - inserted;
        }
        summary.log();
        Ok(summary)
    }

    /// About-page CSV → `watchings`, one row per watched name
    pub fn load_watchings(&mut self, about_csv: &Path) -> anyhow::Result<LoadSummary> {
        let artists = artist_ids(&self.conn)?;
        let checkpoint = ChunkCheckpoint::for_csv(about_csv);
        load_csv(
            &mut self.conn,
            about_csv,
            &WATCHINGS,
            &checkpoint,
            self.chunk_size,
            &["username", "Watching"],
            |cells| {
                let (artist_id, _) = match artist_of(&artists, cells, "username") {
                    Ok(found) => found,
                    Err(outcome) => return outcome,
                };
                let names = parse_watching_list(cells.get("Watching"));
                if names.is_empty() {
                    return Mapped::Skip;
                }
                Mapped::Rows(
                    names
                        .into_iter()
                        .map(|n| vec![Value::Integer(artist_id), Value::Text(n)])
                        .collect(),
                )
            },
        )
    }

    /// Gallery CSV → `imgs_date`; existing ids get their `artist_name` refreshed
    pub fn load_imgs_date(&mut self, gallery_csv: &Path) -> anyhow::Result<LoadSummary> {
        let artists = artist_ids(&self.conn)?;
        let checkpoint = ChunkCheckpoint::for_csv(gallery_csv);
        load_csv(
            &mut self.conn,
            gallery_csv,
            &IMGS_DATE,
            &checkpoint,
            self.chunk_size,
            &["Deviation_id", "Author_name"],
            |cells| {
                let (artist_id, artist) = match artist_of(&artists, cells, "Author_name") {
                    Ok(found) => found,
                    Err(outcome) => return outcome,
                };
                let id = cells.get("Deviation_id").trim();
                if id.is_empty() {
                    return Mapped::Skip;
                }
                Mapped::Rows(vec![vec![
                    text(id),
                    Value::Integer(artist_id),
                    Value::Text(artist),
                    opt_int(epoch_seconds(cells.get("Published_on"))),
                ]])
            },
        )
    }

    /// Metadata CSV → `imgs_dscrpt` with cleaned descriptions
    pub fn load_imgs_dscrpt(&mut self, metadata_csv: &Path) -> anyhow::Result<LoadSummary> {
        let artists = artist_ids(&self.conn)?;
        let checkpoint = ChunkCheckpoint::for_csv(metadata_csv);
        load_csv(
            &mut self.conn,
            metadata_csv,
            &IMGS_DSCRPT,
            &checkpoint,
            self.chunk_size,
            &["Devtn_Id", "Author_Name"],
            |cells| {
                let (artist_id, artist) = match artist_of(&artists, cells, "Author_Name") {
                    Ok(found) => found,
                    Err(outcome) => return outcome,
                };
                let id = cells.get("Devtn_Id").trim();
                if id.is_empty() {
                    return Mapped::Skip;
                }
                Mapped::Rows(vec![vec![
                    text(id),
                    Value::Integer(artist_id),
                    Value::Text(artist),
                    text(clean_description(cells.get("Devtn_Descp")).trim()),
                ]])
            },
        )
    }

    /// Metadata CSV → `imgs_tags`, one row per tag in `tag_name`
    pub fn load_imgs_tags(&mut self, metadata_csv: &Path) -> anyhow::Result<LoadSummary> {
        let artists = artist_ids(&self.conn)?;
        let checkpoint = ChunkCheckpoint::for_table(metadata_csv, IMGS_TAGS.table);
        load_csv(
            &mut self.conn,
            metadata_csv,
            &IMGS_TAGS,
            &checkpoint,
            self.chunk_size,
            &["Devtn_Id", "Author_Name", "tag_name"],
            |cells| {
                let (artist_id, artist) = match artist_of(&artists, cells, "Author_Name") {
                    Ok(found) => found,
                    Err(outcome) => return outcome,
                };
                let id = cells.get("Devtn_Id").trim();
                let Some(tags) = parse_tag_list(cells.get("tag_name")) else {
                    log::debug!("{id}: unreadable tag list");
                    return Mapped::Skip;
                };
                if id.is_empty() || tags.is_empty() {
                    return Mapped::Skip;
                }
                Mapped::Rows(
                    tags.into_iter()
                        .map(|tag| {
                            vec![
                                Value::Text(id.to_string()),
                                Value::Integer(artist_id),
                                Value::Text(artist.clone()),
                                Value::Text(tag),
                            ]
                        })
                        .collect(),
                )
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn with_artists(dir: &TempDir) -> Database {
        let mut db = Database::open_in_memory().unwrap();
        let profiles = write(
            dir,
            "profiles.csv",
            "user,profil_url,country,user_is_artist,user_deviations,specialty\n\
             amy,https://x/amy,DE,True,12.0,Digital Art\n\
             bo,,FR,false,,\n",
        );
        db.load_artists(&profiles).unwrap();
        db
    }

    fn query<T: rusqlite::types::FromSql>(db: &Database, sql: &str) -> T {
        db.connection().query_row(sql, [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn artists_converted() {
        let dir = TempDir::new().unwrap();
        let db = with_artists(&dir);
        assert_eq!(db.row_count("artists").unwrap(), 2);
        let n: i64 = query(
            &db,
            "SELECT no_of_deviations FROM artists WHERE artist_name = 'amy'",
        );
        assert_eq!(n, 12);
        let artist: bool = query(
            &db,
            "SELECT is_artist FROM artists WHERE artist_name = 'amy'",
        );
        assert!(artist);
        let url: Option<String> = query(
            &db,
            "SELECT profile_url FROM artists WHERE artist_name = 'bo'",
        );
        assert_eq!(url, None);
    }

    #[test]
    fn watchers_mapped_to_artists() {
        let dir = TempDir::new().unwrap();
        let mut db = with_artists(&dir);
        let csv = write(
            &dir,
            "watchers.csv",
            "Watchers name,user_icon,type,is_watching,last_visit,activity,collections,critiques,\
             deviations,forum_threads,friend,journals,scraps,Deviant\n\
             zed,i,regular,True,1970-01-01T00:00:01Z,True,False,False,True,False,False,True,False,amy\n\
             cy,i,regular,False,,False,False,False,False,False,False,False,False,nobody\n",
        );
        let summary = db.load_watchers(&csv).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped_unmapped, 1);
        let visit: i64 = query(&db, "SELECT last_visit FROM watchers_v1");
        assert_eq!(visit, 1000);
        let name: String = query(&db, "SELECT artist_name FROM watchers_v1");
        assert_eq!(name, "amy");
        let scraps: bool = query(&db, "SELECT scraps FROM watchers_v1");
        assert!(!scraps);
    }

    #[test]
    fn friend_interactions_reuse_interactor_ids() {
        let dir = TempDir::new().unwrap();
        let mut db = with_artists(&dir);
        let csv = write(
            &dir,
            "friends.csv",
            "Friends name,last_visit,Deviant\nzed,1970-01-01T00:00:02Z,amy\nzed,,bo\ncy,,amy\n",
        );
        let summary = db
            .load_interactions(
                &csv,
                InteractionKind::Friend,
                "Friends name",
                Some("last_visit"),
            )
            .unwrap();
        assert_eq!(summary.processed, 3);
        let zed_ids: i64 = query(
            &db,
            "SELECT COUNT(DISTINCT artist_id_from) FROM artist_interactions \
             WHERE artist_name_from = 'zed'",
        );
        assert_eq!(zed_ids, 1);
        let date: i64 = query(
            &db,
            "SELECT date FROM artist_interactions WHERE artist_name_to = 'amy' \
             AND artist_name_from = 'zed'",
        );
        assert_eq!(date, 2000);
    }

    #[test]
    fn watchings_become_interactions() {
        let dir = TempDir::new().unwrap();
        let mut db = with_artists(&dir);
        let about = write(
            &dir,
            "about.csv",
            "username,Watching\namy,Watching 2 Deviants zed bo\nbo,\nghost,Watching 1 Deviants amy\n",
        );
        let summary = db.load_watchings(&about).unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped_unmapped, 1);

        let edges = db.load_watching_interactions().unwrap();
        assert_eq!(edges.processed, 2);
        let again = db.load_watching_interactions().unwrap();
        assert_eq!(again.processed, 0);
        assert_eq!(again.skipped_duplicates, 2);
        let kind: String = query(
            &db,
            "SELECT DISTINCT interaction_type FROM artist_interactions",
        );
        assert_eq!(kind, "watching");
    }

    #[test]
    fn image_dates_refresh_artist_name() {
        let dir = TempDir::new().unwrap();
        let mut db = with_artists(&dir);
        let first = write(
            &dir,
            "gallery.csv",
            "Deviation_id,Author_name,Published_on\nD1,amy,1700000000\nD2,bo,2024-01-01T00:00:00Z\n",
        );
        db.load_imgs_date(&first).unwrap();
        let second = write(
            &dir,
            "gallery2.csv",
            "Deviation_id,Author_name,Published_on\nD1,bo,1700000000\n",
        );
        let summary = db.load_imgs_date(&second).unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.updated, 1);
        let name: String = query(&db, "SELECT artist_name FROM imgs_date WHERE id = 'D1'");
        assert_eq!(name, "bo");
        let date: i64 = query(&db, "SELECT date FROM imgs_date WHERE id = 'D2'");
        assert_eq!(date, 1_704_067_200);
    }

    #[test]
    fn metadata_descriptions_and_tags() {
        let dir = TempDir::new().unwrap();
        let mut db = with_artists(&dir);
        let csv = write(
            &dir,
            "metadata.csv",
            "Devtn_Id,Devtn_Descp,Author_Name,tag_name\n\
             D1,Hi<br/>there!,amy,\"[\"\"cats\"\",\"\"ink\"\"]\"\n\
             D2,,amy,\"['cats', 'cats']\"\n\
             D3,x,amy,not a list\n",
        );
        let d = db.load_imgs_dscrpt(&csv).unwrap();
        assert_eq!(d.processed, 3);
        let text: String = query(&db, "SELECT description FROM imgs_dscrpt WHERE id = 'D1'");
        assert_eq!(text, "Hi there");

        let t = db.load_imgs_tags(&csv).unwrap();
        assert_eq!(t.processed, 3);
        assert_eq!(t.skipped_duplicates, 1);
        let again = db.load_imgs_tags(&csv).unwrap();
        assert_eq!(again.chunks_skipped, 0);
        assert_eq!(again.processed, 0);
    }

    #[test]
    fn unknown_table_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.row_count("sqlite_master").is_err());
    }
}
