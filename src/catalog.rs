//! Video catalog persistence.
//!
//! Categories, channels and videos live in one libsql database under the data
//! root. Channel avatars are written here by whoever resolved them; the
//! resolver itself never touches the database.

use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Builder, Connection, Row, params};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Database file relative to the data root.
pub const CATALOG_DB_FILE: &str = "catalog.db";

const HANDLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub handle: String,
    pub avatar: Option<String>,
    /// Channel page the avatar can be resolved from. `None` for upload channels.
    pub source_url: Option<String>,
}

impl Channel {
    /// Blank stored avatars count as missing, matching `channels_missing_avatar`.
    pub fn has_avatar(&self) -> bool {
        self.avatar
            .as_deref()
            .is_some_and(|avatar| !avatar.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Ready,
    Processing,
}

impl VideoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Processing => "processing",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "ready" => Ok(Self::Ready),
            "processing" => Ok(Self::Processing),
            other => bail!("unknown video status {other:?}"),
        }
    }
}

/// Fields supplied when a video enters the catalog.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub title: String,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub youtube_url: Option<String>,
    pub youtube_id: Option<String>,
    pub duration: Option<i64>,
    pub status: VideoStatus,
    pub channel_id: String,
    pub category_id: Option<String>,
}

/// A stored video joined with its channel and category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub youtube_url: Option<String>,
    pub youtube_id: Option<String>,
    pub duration: Option<i64>,
    pub views: i64,
    pub status: VideoStatus,
    pub created_at: DateTime<Utc>,
    pub channel: Channel,
    pub category: Option<Category>,
}

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA foreign_keys=ON;
        "#,
    )
    .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS channels (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            handle TEXT NOT NULL UNIQUE,
            avatar TEXT,
            source_url TEXT
        );

        CREATE TABLE IF NOT EXISTS videos (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            thumbnail TEXT,
            youtube_url TEXT,
            youtube_id TEXT,
            duration INTEGER,
            views INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            channel_id TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            category_id TEXT REFERENCES categories(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_videos_category ON videos(category_id);
        CREATE INDEX IF NOT EXISTS idx_videos_created ON videos(created_at);
        CREATE INDEX IF NOT EXISTS idx_channels_name ON channels(name);
        "#,
    )
    .await?;
    Ok(())
}

/// Lowercase, alphanumeric runs joined by `-`.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Handle body derived from a display name: ASCII letters, digits and
/// single dashes, at most 50 characters.
pub fn sanitize_handle(name: &str) -> String {
    let kept: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    let joined = kept.split_whitespace().collect::<Vec<_>>().join("-");
    let clipped: String = joined.chars().take(HANDLE_MAX_CHARS).collect();
    if clipped.is_empty() {
        "channel".to_string()
    } else {
        clipped
    }
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

const VIDEO_COLUMNS: &str = r#"
    v.id, v.title, v.description, v.thumbnail, v.youtube_url, v.youtube_id,
    v.duration, v.views, v.status, v.created_at,
    c.id, c.name, c.handle, c.avatar, c.source_url,
    cat.id, cat.name, cat.slug
    FROM videos v
    JOIN channels c ON c.id = v.channel_id
    LEFT JOIN categories cat ON cat.id = v.category_id
"#;

/// Cloneable handle over the catalog connection.
#[derive(Clone)]
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Opens (and if necessary creates) the database and its schema.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating catalog directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening catalog DB {}", path.display()))?;
        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    /// Changes whenever another connection commits to the database.
    pub async fn data_version(&self) -> Result<i64> {
        let mut rows = self.conn.query("PRAGMA data_version", params![]).await?;
        let row = rows.next().await?.context("missing data_version row")?;
        Ok(row.get(0)?)
    }

    /// Inserts the category unless one with the same slug exists.
    pub async fn ensure_category(&self, name: &str) -> Result<Category> {
        let name = name.trim();
        let slug = slugify(name);
        if slug.is_empty() {
            bail!("category name {name:?} has no letters or digits");
        }
        if let Some(existing) = self.category_by_slug(&slug).await? {
            return Ok(existing);
        }
        let category = Category {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            slug,
        };
        self.conn
            .execute(
                "INSERT INTO categories (id, name, slug) VALUES (?1, ?2, ?3)",
                params![
                    category.id.as_str(),
                    category.name.as_str(),
                    category.slug.as_str()
                ],
            )
            .await
            .with_context(|| format!("inserting category {}", category.slug))?;
        Ok(category)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut rows = self
            .conn
            .query("SELECT id, name, slug FROM categories ORDER BY name ASC", params![])
            .await?;
        let mut categories = Vec::new();
        while let Some(row) = rows.next().await? {
            categories.push(row_to_category(&row, 0)?.context("category row without id")?);
        }
        Ok(categories)
    }

    async fn category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let mut rows = self
            .conn
            .query("SELECT id, name, slug FROM categories WHERE slug = ?1", [slug])
            .await?;
        match rows.next().await? {
            Some(row) => row_to_category(&row, 0),
            None => Ok(None),
        }
    }

    /// Channel for a YouTube author. Matches on display name; a stored channel
    /// only gains an avatar (or source URL) when it has none yet.
    pub async fn find_or_create_youtube_channel(
        &self,
        name: &str,
        source_url: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<Channel> {
        let avatar = avatar.filter(|avatar| !avatar.trim().is_empty());
        if let Some(mut channel) = self.channel_by_name(name).await? {
            if !channel.has_avatar()
                && let Some(avatar) = avatar
            {
                self.set_channel_avatar(&channel.id, avatar).await?;
                channel.avatar = Some(avatar.to_string());
            }
            if channel.source_url.is_none()
                && let Some(url) = source_url
            {
                self.conn
                    .execute(
                        "UPDATE channels SET source_url = ?1 WHERE id = ?2",
                        params![url, channel.id.as_str()],
                    )
                    .await?;
                channel.source_url = Some(url.to_string());
            }
            return Ok(channel);
        }

        let handle = self.unique_handle(&sanitize_handle(name)).await?;
        self.insert_channel(Channel {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            handle,
            avatar: avatar.map(str::to_string),
            source_url: source_url.map(str::to_string),
        })
        .await
    }

    /// Default channel for local uploads, named after the uploader.
    pub async fn find_or_create_upload_channel(&self, uploader: &str) -> Result<Channel> {
        let uploader = match uploader.trim() {
            "" => "user",
            trimmed => trimmed,
        };
        let name = format!("{uploader}'s Channel");
        if let Some(channel) = self.channel_by_name(&name).await? {
            return Ok(channel);
        }
        let handle = self.unique_handle(&sanitize_handle(uploader)).await?;
        self.insert_channel(Channel {
            id: Uuid::new_v4().to_string(),
            name,
            handle,
            avatar: None,
            source_url: None,
        })
        .await
    }

    /// `@base`, then `@base_1`, `@base_2`, ... until free.
    async fn unique_handle(&self, base: &str) -> Result<String> {
        let mut candidate = format!("@{base}");
        let mut counter = 1;
        while self.handle_taken(&candidate).await? {
            candidate = format!("@{base}_{counter}");
            counter += 1;
        }
        Ok(candidate)
    }

    async fn handle_taken(&self, handle: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query("SELECT 1 FROM channels WHERE handle = ?1", [handle])
            .await?;
        Ok(rows.next().await?.is_some())
    }

    async fn insert_channel(&self, channel: Channel) -> Result<Channel> {
        self.conn
            .execute(
                r#"
                INSERT INTO channels (id, name, handle, avatar, source_url)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    channel.id.as_str(),
                    channel.name.as_str(),
                    channel.handle.as_str(),
                    channel.avatar.as_deref(),
                    channel.source_url.as_deref(),
                ],
            )
            .await
            .with_context(|| format!("inserting channel {}", channel.handle))?;
        Ok(channel)
    }

    pub async fn channel_by_name(&self, name: &str) -> Result<Option<Channel>> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT id, name, handle, avatar, source_url
                FROM channels
                WHERE name = ?1
                ORDER BY rowid ASC
                LIMIT 1
                "#,
                [name],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_channel(&row, 0)?)),
            None => Ok(None),
        }
    }

    /// Channels with a known page but no avatar yet.
    pub async fn channels_missing_avatar(&self) -> Result<Vec<Channel>> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT id, name, handle, avatar, source_url
                FROM channels
                WHERE (avatar IS NULL OR TRIM(avatar) = '')
                  AND source_url IS NOT NULL
                ORDER BY rowid ASC
                "#,
                params![],
            )
            .await?;
        let mut channels = Vec::new();
        while let Some(row) = rows.next().await? {
            channels.push(row_to_channel(&row, 0)?);
        }
        Ok(channels)
    }

    /// Returns `false` when no channel has that id.
    pub async fn set_channel_avatar(&self, channel_id: &str, avatar: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE channels SET avatar = ?1 WHERE id = ?2",
                params![avatar, channel_id],
            )
            .await?;
        Ok(changed > 0)
    }

    pub async fn insert_video(&self, video: &NewVideo) -> Result<String> {
        self.insert_video_at(video, Utc::now()).await
    }

    pub async fn insert_video_at(&self, video: &NewVideo, created_at: DateTime<Utc>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                r#"
                INSERT INTO videos (
                    id, title, description, thumbnail, youtube_url, youtube_id,
                    duration, views, status, channel_id, category_id, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?10, ?11)
                "#,
                params![
                    id.as_str(),
                    video.title.as_str(),
                    video.description.as_deref(),
                    video.thumbnail.as_deref(),
                    video.youtube_url.as_deref(),
                    video.youtube_id.as_deref(),
                    video.duration,
                    video.status.as_str(),
                    video.channel_id.as_str(),
                    video.category_id.as_deref(),
                    timestamp(created_at),
                ],
            )
            .await
            .with_context(|| format!("inserting video {:?}", video.title))?;
        Ok(id)
    }

    pub async fn get_video(&self, id: &str) -> Result<Option<VideoRecord>> {
        let sql = format!("SELECT {VIDEO_COLUMNS} WHERE v.id = ?1");
        let mut rows = self.conn.query(&sql, [id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_video(&row)?)),
            None => Ok(None),
        }
    }

    /// Newest first. `None` or `All` lists every video.
    pub async fn list_videos(&self, category_slug: Option<&str>) -> Result<Vec<VideoRecord>> {
        let slug = category_slug
            .map(str::trim)
            .filter(|slug| !slug.is_empty() && !slug.eq_ignore_ascii_case("all"));
        let sql = format!(
            "SELECT {VIDEO_COLUMNS} WHERE (?1 IS NULL OR cat.slug = ?1) \
             ORDER BY v.created_at DESC, v.rowid DESC"
        );
        let mut rows = self.conn.query(&sql, params![slug]).await?;
        let mut videos = Vec::new();
        while let Some(row) = rows.next().await? {
            videos.push(row_to_video(&row)?);
        }
        Ok(videos)
    }

    /// Increments the view counter. `None` when the video does not exist.
    pub async fn record_view(&self, id: &str) -> Result<Option<i64>> {
        let changed = self
            .conn
            .execute("UPDATE videos SET views = views + 1 WHERE id = ?1", [id])
            .await?;
        if changed == 0 {
            return Ok(None);
        }
        let mut rows = self
            .conn
            .query("SELECT views FROM videos WHERE id = ?1", [id])
            .await?;
        let row = rows.next().await?.context("video vanished after update")?;
        Ok(Some(row.get(0)?))
    }
}

fn row_to_channel(row: &Row, offset: i32) -> Result<Channel> {
    Ok(Channel {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        handle: row.get(offset + 2)?,
        avatar: row.get(offset + 3)?,
        source_url: row.get(offset + 4)?,
    })
}

/// `None` when the LEFT JOIN found no category.
fn row_to_category(row: &Row, offset: i32) -> Result<Option<Category>> {
    let id: Option<String> = row.get(offset)?;
    let Some(id) = id else {
        return Ok(None);
    };
    Ok(Some(Category {
        id,
        name: row.get(offset + 1)?,
        slug: row.get(offset + 2)?,
    }))
}

/// Column order must match [`VIDEO_COLUMNS`].
fn row_to_video(row: &Row) -> Result<VideoRecord> {
    let status: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .with_context(|| format!("parsing stored created_at {created_at:?}"))?
        .with_timezone(&Utc);
    Ok(VideoRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        thumbnail: row.get(3)?,
        youtube_url: row.get(4)?,
        youtube_id: row.get(5)?,
        duration: row.get(6)?,
        views: row.get(7)?,
        status: VideoStatus::parse(&status)?,
        created_at,
        channel: row_to_channel(row, 10)?,
        category: row_to_category(row, 15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::path::PathBuf;
    use tempfile::tempdir;

    async fn create_catalog() -> Result<(tempfile::TempDir, Catalog, PathBuf)> {
        let dir = tempdir()?;
        let path = dir.path().join("data/catalog.db");
        let catalog = Catalog::open(&path).await?;
        Ok((dir, catalog, path))
    }

    fn youtube_video(channel_id: &str, category_id: Option<&str>, title: &str) -> NewVideo {
        NewVideo {
            title: title.into(),
            description: Some("desc".into()),
            thumbnail: Some("https://i.ytimg.com/vi/abc/hqdefault.jpg".into()),
            youtube_url: Some("https://www.youtube.com/watch?v=abc".into()),
            youtube_id: Some("abc".into()),
            duration: Some(125),
            status: VideoStatus::Ready,
            channel_id: channel_id.into(),
            category_id: category_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn opens_catalog_and_creates_schema() -> Result<()> {
        let (_temp, catalog, path) = create_catalog().await?;
        assert!(path.exists(), "database file should be created");

        let mut rows = catalog.conn.query("PRAGMA journal_mode", params![]).await?;
        let journal: String = rows.next().await?.context("missing journal_mode row")?.get(0)?;
        assert_eq!(journal.to_lowercase(), "wal");

        let mut rows = catalog.conn.query("PRAGMA foreign_keys", params![]).await?;
        let flag: i64 = rows.next().await?.context("missing foreign_keys row")?.get(0)?;
        assert_eq!(flag, 1);

        for table in ["categories", "channels", "videos"] {
            let mut rows = catalog
                .conn
                .query(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                )
                .await?;
            let exists: Option<String> = rows
                .next()
                .await?
                .map(|row| row.get::<String>(0))
                .transpose()?;
            assert_eq!(exists.as_deref(), Some(table));
        }
        Ok(())
    }

    #[test]
    fn slugs_and_handles() {
        assert_eq!(slugify("Computer Science"), "computer-science");
        assert_eq!(slugify("  Math & Physics!! "), "math-physics");
        assert_eq!(slugify("!!!"), "");
        assert_eq!(sanitize_handle("Prof. Jane Doe"), "prof-jane-doe");
        assert_eq!(sanitize_handle("日本"), "channel");
        assert_eq!(sanitize_handle(&"a".repeat(80)).len(), HANDLE_MAX_CHARS);
    }

    #[tokio::test]
    async fn ensure_category_is_idempotent_by_slug() -> Result<()> {
        let (_temp, catalog, _path) = create_catalog().await?;
        let first = catalog.ensure_category("Computer Science").await?;
        let again = catalog.ensure_category("computer  science").await?;
        assert_eq!(first, again);
        catalog.ensure_category("Biology").await?;

        let names: Vec<String> = catalog
            .list_categories()
            .await?
            .into_iter()
            .map(|category| category.name)
            .collect();
        assert_eq!(names, vec!["Biology", "Computer Science"]);
        assert!(catalog.ensure_category("???").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn youtube_channels_match_by_name_and_fill_missing_avatar() -> Result<()> {
        let (_temp, catalog, _path) = create_catalog().await?;
        let created = catalog
            .find_or_create_youtube_channel("Prof Jane", Some("https://www.youtube.com/@jane"), None)
            .await?;
        assert_eq!(created.handle, "@prof-jane");
        assert!(created.avatar.is_none());

        let filled = catalog
            .find_or_create_youtube_channel("Prof Jane", None, Some("https://yt3.ggpht.com/a"))
            .await?;
        assert_eq!(filled.id, created.id);
        assert_eq!(filled.avatar.as_deref(), Some("https://yt3.ggpht.com/a"));

        let kept = catalog
            .find_or_create_youtube_channel("Prof Jane", None, Some("https://yt3.ggpht.com/b"))
            .await?;
        assert_eq!(kept.avatar.as_deref(), Some("https://yt3.ggpht.com/a"));
        Ok(())
    }

    #[tokio::test]
    async fn blank_avatars_are_treated_as_missing() -> Result<()> {
        let (_temp, catalog, _path) = create_catalog().await?;
        let created = catalog
            .find_or_create_youtube_channel("Blank", Some("https://www.youtube.com/@blank"), Some(" "))
            .await?;
        assert!(created.avatar.is_none());

        catalog.set_channel_avatar(&created.id, "").await?;
        let stored = catalog.channel_by_name("Blank").await?.expect("channel");
        assert!(!stored.has_avatar());
        assert_eq!(catalog.channels_missing_avatar().await?.len(), 1);

        let filled = catalog
            .find_or_create_youtube_channel("Blank", None, Some("https://yt3.ggpht.com/b"))
            .await?;
        assert_eq!(filled.avatar.as_deref(), Some("https://yt3.ggpht.com/b"));
        assert!(catalog.channels_missing_avatar().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn handles_get_numeric_suffixes_when_taken() -> Result<()> {
        let (_temp, catalog, _path) = create_catalog().await?;
        let a = catalog.find_or_create_youtube_channel("Same Name", None, None).await?;
        let b = catalog.find_or_create_youtube_channel("same name!", None, None).await?;
        let c = catalog.find_or_create_youtube_channel("SAME NAME", None, None).await?;
        assert_eq!(a.handle, "@same-name");
        assert_eq!(b.handle, "@same-name_1");
        assert_eq!(c.handle, "@same-name_2");
        Ok(())
    }

    #[tokio::test]
    async fn upload_channel_is_reused() -> Result<()> {
        let (_temp, catalog, _path) = create_catalog().await?;
        let first = catalog.find_or_create_upload_channel("alice").await?;
        let second = catalog.find_or_create_upload_channel("alice").await?;
        assert_eq!(first, second);
        assert_eq!(first.name, "alice's Channel");
        assert_eq!(first.handle, "@alice");
        assert!(first.source_url.is_none());

        let anonymous = catalog.find_or_create_upload_channel("  ").await?;
        assert_eq!(anonymous.name, "user's Channel");
        Ok(())
    }

    #[tokio::test]
    async fn videos_roundtrip_with_channel_and_category() -> Result<()> {
        let (_temp, catalog, _path) = create_catalog().await?;
        let channel = catalog
            .find_or_create_youtube_channel("Prof", None, Some("https://yt3.ggpht.com/p"))
            .await?;
        let category = catalog.ensure_category("Math").await?;
        let id = catalog
            .insert_video(&youtube_video(&channel.id, Some(&category.id), "Lecture 1"))
            .await?;

        let video = catalog.get_video(&id).await?.context("video stored")?;
        assert_eq!(video.title, "Lecture 1");
        assert_eq!(video.status, VideoStatus::Ready);
        assert_eq!(video.views, 0);
        assert_eq!(video.channel.avatar.as_deref(), Some("https://yt3.ggpht.com/p"));
        assert_eq!(video.category.as_ref().map(|c| c.slug.as_str()), Some("math"));
        assert!(catalog.get_video("ghost").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn list_videos_filters_by_category_newest_first() -> Result<()> {
        let (_temp, catalog, _path) = create_catalog().await?;
        let channel = catalog.find_or_create_youtube_channel("Prof", None, None).await?;
        let math = catalog.ensure_category("Math").await?;
        let art = catalog.ensure_category("Art").await?;
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        catalog
            .insert_video_at(&youtube_video(&channel.id, Some(&math.id), "old math"), base)
            .await?;
        catalog
            .insert_video_at(
                &youtube_video(&channel.id, Some(&art.id), "art"),
                base + Duration::days(1),
            )
            .await?;
        catalog
            .insert_video_at(
                &youtube_video(&channel.id, None, "uncategorised"),
                base + Duration::days(2),
            )
            .await?;
        catalog
            .insert_video_at(
                &youtube_video(&channel.id, Some(&math.id), "new math"),
                base + Duration::days(3),
            )
            .await?;

        let titles = |videos: Vec<VideoRecord>| -> Vec<String> {
            videos.into_iter().map(|video| video.title).collect()
        };
        assert_eq!(
            titles(catalog.list_videos(None).await?),
            vec!["new math", "uncategorised", "art", "old math"]
        );
        assert_eq!(catalog.list_videos(Some("All")).await?.len(), 4);
        assert_eq!(
            titles(catalog.list_videos(Some("math")).await?),
            vec!["new math", "old math"]
        );
        assert!(catalog.list_videos(Some("nope")).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn record_view_increments_counter() -> Result<()> {
        let (_temp, catalog, _path) = create_catalog().await?;
        let channel = catalog.find_or_create_upload_channel("bob").await?;
        let mut upload = youtube_video(&channel.id, None, "clip.mp4");
        upload.status = VideoStatus::Processing;
        let id = catalog.insert_video(&upload).await?;

        assert_eq!(catalog.record_view(&id).await?, Some(1));
        assert_eq!(catalog.record_view(&id).await?, Some(2));
        assert_eq!(catalog.record_view("ghost").await?, None);
        let stored = catalog.get_video(&id).await?.context("video stored")?;
        assert_eq!(stored.status, VideoStatus::Processing);
        Ok(())
    }

    #[tokio::test]
    async fn channels_missing_avatar_only_lists_resolvable_channels() -> Result<()> {
        let (_temp, catalog, _path) = create_catalog().await?;
        let pending = catalog
            .find_or_create_youtube_channel("Pending", Some("https://www.youtube.com/@pending"), None)
            .await?;
        catalog
            .find_or_create_youtube_channel(
                "Done",
                Some("https://www.youtube.com/@done"),
                Some("https://yt3.ggpht.com/d"),
            )
            .await?;
        catalog.find_or_create_upload_channel("carol").await?;

        let missing = catalog.channels_missing_avatar().await?;
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, pending.id);

        assert!(catalog.set_channel_avatar(&pending.id, "https://yt3.ggpht.com/p").await?);
        assert!(!catalog.set_channel_avatar("ghost", "x").await?);
        assert!(catalog.channels_missing_avatar().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn data_version_moves_when_another_connection_writes() -> Result<()> {
        let (_temp, catalog, path) = create_catalog().await?;
        let before = catalog.data_version().await?;
        let other = Catalog::open(&path).await?;
        other.ensure_category("Chemistry").await?;
        let after = catalog.data_version().await?;
        assert_ne!(before, after);
        Ok(())
    }
}
