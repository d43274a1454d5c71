use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Result as SqlResult};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::data::{Image, ItemGroup};
use super::filters::{keys, FilterSet, ImageSort};
use crate::error::{FetchError, Result};
use crate::query::{offset_cursor, page_end, parse_offset_cursor, FeedPage, FeedRequest, QueryOptions, QuerySource};

/// A post to be stored in the catalog
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub model_id: i64,
    pub model_version_id: Option<i64>,
    pub username: Option<String>,
    /// Unix seconds
    pub created_at: i64,
    pub reaction_count: i64,
    pub comment_count: i64,
    pub collected_count: i64,
    /// Posted to this model but primarily about another one
    pub cross_post: bool,
    /// (width, height) per image, in display order
    pub images: Vec<(Option<u32>, Option<u32>)>,
}

/// The Catalog manages the SQLite database of posts and their images.
/// It is the local data source the gallery pages through.
pub struct Catalog {
    conn: Connection,
    db_path: PathBuf,
}

impl Catalog {
    /// Open (or create) the catalog at `db_path` and initialize the schema
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        info!(path = %db_path.display(), "📁 Catalog opened");

        let catalog = Catalog { conn, db_path };
        catalog.init_schema()?;
        Ok(catalog)
    }

    /// Initialize the database schema.
    /// Creates all necessary tables and indexes if they don't exist.
    fn init_schema(&self) -> SqlResult<()> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS posts (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                model_id          INTEGER NOT NULL,
                model_version_id  INTEGER,
                username          TEXT,
                created_at        INTEGER NOT NULL,
                reaction_count    INTEGER NOT NULL DEFAULT 0,
                comment_count     INTEGER NOT NULL DEFAULT 0,
                collected_count   INTEGER NOT NULL DEFAULT 0,
                cross_post        INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS images (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id   INTEGER NOT NULL,
                position  INTEGER NOT NULL,
                width     INTEGER,
                height    INTEGER,
                url       TEXT,
                FOREIGN KEY(post_id) REFERENCES posts(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_posts_model_created
                ON posts(model_id, created_at DESC);

            CREATE INDEX IF NOT EXISTS idx_images_post_id
                ON images(post_id, position);",
        )?;

        debug!("✅ Catalog schema initialized");
        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Get a count of posts in the catalog
    pub fn post_count(&self) -> SqlResult<i64> {
        self.conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))
    }

    /// Store a post and its images, returning the new post ID
    pub fn insert_post(&mut self, post: &NewPost) -> SqlResult<i64> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO posts (model_id, model_version_id, username, created_at,
                                reaction_count, comment_count, collected_count, cross_post)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                post.model_id,
                post.model_version_id,
                post.username,
                post.created_at,
                post.reaction_count,
                post.comment_count,
                post.collected_count,
                post.cross_post,
            ],
        )?;
        let post_id = tx.last_insert_rowid();

        for (position, (width, height)) in post.images.iter().enumerate() {
            tx.execute(
                "INSERT INTO images (post_id, position, width, height) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![post_id, position as i64, width, height],
            )?;
        }
        tx.commit()?;
        Ok(post_id)
    }

    /// Fill the catalog with `count` generated posts for `model_id`.
    ///
    /// Dimensions, authors and counters cycle through fixed tables so the
    /// result is the same on every run, apart from timestamps.
    pub fn seed_demo(&mut self, model_id: i64, count: usize) -> SqlResult<usize> {
        const SIZES: [(Option<u32>, Option<u32>); 7] = [
            (Some(512), Some(768)),
            (Some(768), Some(512)),
            (Some(1024), Some(1024)),
            (Some(832), Some(1216)),
            (Some(1216), Some(832)),
            (None, None),
            (Some(640), Some(1600)),
        ];
        const AUTHORS: [&str; 4] = ["ayman", "mira", "koji", "lena"];

        let now = Utc::now().timestamp();
        for i in 0..count {
            let image_count = 1 + (i * 7) % 3;
            let images = (0..image_count).map(|k| SIZES[(i + k * 3) % SIZES.len()]).collect();
            let post = NewPost {
                model_id,
                model_version_id: Some(model_id * 10 + (i % 2) as i64),
                username: Some(AUTHORS[i % AUTHORS.len()].to_string()),
                created_at: now - (i as i64) * 3_600 * 7,
                reaction_count: ((i * 37) % 101) as i64,
                comment_count: ((i * 13) % 29) as i64,
                collected_count: ((i * 5) % 17) as i64,
                cross_post: i % 5 == 4,
                images,
            };
            self.insert_post(&post)?;
        }

        info!(count, model_id, "🌱 Seeded demo posts");
        Ok(count)
    }

    /// Run a page request synchronously against this catalog
    pub fn query_page(&self, request: &FeedRequest) -> std::result::Result<FeedPage, FetchError> {
        query_page(&self.conn, request)
    }

    /// Async query source backed by this catalog's file
    pub fn source(&self) -> CatalogSource {
        CatalogSource { db_path: self.db_path.clone() }
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("db_path", &self.db_path)
            .finish()
    }
}

/// `QuerySource` reading from a catalog file.
///
/// rusqlite::Connection is not Send, so every request opens its own
/// connection on a blocking worker thread.
#[derive(Debug, Clone)]
pub struct CatalogSource {
    db_path: PathBuf,
}

impl CatalogSource {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self { db_path: db_path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

impl QuerySource for CatalogSource {
    fn fetch_page(
        &self,
        request: FeedRequest,
        options: QueryOptions,
    ) -> impl Future<Output = std::result::Result<FeedPage, FetchError>> + Send {
        let db_path = self.db_path.clone();
        async move {
            // SQLite has no request batching; every call is already unbatched
            debug!(skip_batch = options.skip_batch, cursor = ?request.cursor, "catalog query");
            tokio::task::spawn_blocking(move || {
                let conn = Connection::open(&db_path)?;
                query_page(&conn, &request)
            })
            .await?
        }
    }
}

fn order_clause(sort: Option<ImageSort>) -> &'static str {
    match sort.unwrap_or(ImageSort::Newest) {
        ImageSort::Newest => "p.created_at DESC, p.id DESC",
        ImageSort::Oldest => "p.created_at ASC, p.id ASC",
        ImageSort::MostReactions => "p.reaction_count DESC, p.id DESC",
        ImageSort::MostComments => "p.comment_count DESC, p.id DESC",
        ImageSort::MostCollected => "p.collected_count DESC, p.id DESC",
    }
}

/// WHERE clause and its parameters for a filter set
fn where_clause(filters: &FilterSet) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    if let Some(model_id) = filters.number(keys::MODEL_ID) {
        conditions.push("p.model_id = ?");
        params.push(Value::Integer(model_id));
    }
    if let Some(version_id) = filters.number(keys::MODEL_VERSION_ID) {
        conditions.push("p.model_version_id = ?");
        params.push(Value::Integer(version_id));
    }
    if let Some(username) = filters.text(keys::USERNAME) {
        conditions.push("p.username = ?");
        params.push(Value::Text(username.to_string()));
    }
    if filters.flag(keys::EXCLUDE_CROSS_POSTS) {
        conditions.push("p.cross_post = 0");
    }
    if let Some(window) = filters.period().and_then(|period| period.window()) {
        conditions.push("p.created_at >= ?");
        params.push(Value::Integer(Utc::now().timestamp() - window.num_seconds()));
    }

    if conditions.is_empty() {
        (String::new(), params)
    } else {
        (format!("WHERE {}", conditions.join(" AND ")), params)
    }
}

fn query_page(conn: &Connection, request: &FeedRequest) -> std::result::Result<FeedPage, FetchError> {
    let offset = parse_offset_cursor(request.cursor.as_ref())?;
    let (filter_sql, mut params) = where_clause(&request.filters);

    let invalid = || FetchError::InvalidCursor(offset_cursor(offset).as_str().to_string());
    let end = page_end(offset, request.limit)?;
    // One extra row tells us whether another page exists
    let fetch_limit = i64::try_from(request.limit)
        .ok()
        .and_then(|limit| limit.checked_add(1))
        .ok_or_else(invalid)?;
    params.push(Value::Integer(fetch_limit));
    params.push(Value::Integer(i64::try_from(offset).map_err(|_| invalid())?));

    let sql = format!(
        "SELECT p.id, p.username, p.created_at FROM posts p {} ORDER BY {} LIMIT ? OFFSET ?",
        filter_sql,
        order_clause(request.filters.sort()),
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut posts: Vec<(i64, Option<String>, i64)> = stmt
        .query_map(params_from_iter(params), |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<SqlResult<_>>()?;

    let has_more = posts.len() > request.limit;
    posts.truncate(request.limit);

    let mut images_stmt =
        conn.prepare("SELECT id, width, height, url FROM images WHERE post_id = ?1 ORDER BY position, id")?;
    let mut items = Vec::with_capacity(posts.len());
    for (post_id, username, created_at) in posts {
        let images: Vec<Image> = images_stmt
            .query_map([post_id], |row| {
                Ok(Image {
                    id: row.get(0)?,
                    width: row.get(1)?,
                    height: row.get(2)?,
                    url: row.get(3)?,
                })
            })?
            .collect::<SqlResult<_>>()?;

        // Posts without images have nothing to lay out
        if let Ok(group) = ItemGroup::new(images) {
            items.push(group.with_post(post_id, username, created_at));
        }
    }

    let next_cursor = has_more.then(|| offset_cursor(end));
    Ok(FeedPage { items, next_cursor })
}
