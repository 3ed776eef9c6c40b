//! Database operations for Castwork

use secrecy::{ExposeSecret, SecretString};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::error::{CastworkError, DbError, Result};
use crate::platforms::PlatformOptions;
use crate::types::{
    Credentials, Media, MetricSnapshot, Post, PostStatus, PublishTarget, SocialAccount,
    TargetStatus,
};

/// A publish target joined with the account it publishes through
#[derive(Debug)]
pub struct TargetWithAccount {
    pub target: PublishTarget,
    pub account: SocialAccount,
}

/// A published target due for an analytics refresh
#[derive(Debug)]
pub struct SyncTarget {
    pub target: PublishTarget,
    pub account: SocialAccount,
    /// Owning client of the content item
    pub client_id: String,
    /// When the newest snapshot for this target was recorded
    pub last_synced_at: Option<i64>,
}

const TARGET_COLUMNS: &str = r#"
    t.id, t.post_id, t.social_account_id, t.platform, t.external_post_id,
    t.status, t.error_message, t.attempts, t.next_attempt_at, t.published_at,
    t.created_at, t.updated_at,
    a.client_id AS account_client_id, a.platform AS account_platform,
    a.account_name, a.access_token, a.refresh_token, a.token_expires_at,
    a.metadata AS account_metadata, a.created_at AS account_created_at
"#;

const POST_COLUMNS: &str = r#"
    p.id, p.client_id, p.author_id, p.title, p.body, p.status,
    p.scheduled_at, p.published_at, p.recurrence, p.created_at, p.updated_at
"#;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Use mode=rwc to allow creating the database file if it doesn't exist
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Seeding, used by the authoring side of the system and by tests
    // ------------------------------------------------------------------

    pub async fn create_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, client_id, author_id, title, body, status,
                               scheduled_at, published_at, recurrence, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.client_id)
        .bind(&post.author_id)
        .bind(&post.title)
        .bind(&post.body)
        .bind(post.status.as_str())
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .bind(&post.recurrence)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn add_media(&self, media: &Media) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_media (id, post_id, path, media_type, url, position)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&media.id)
        .bind(&media.post_id)
        .bind(&media.path)
        .bind(media.media_type.as_str())
        .bind(&media.url)
        .bind(media.position)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn create_account(&self, account: &SocialAccount) -> Result<()> {
        let credentials = &account.credentials;

        sqlx::query(
            r#"
            INSERT INTO social_accounts (id, client_id, platform, account_name, access_token,
                                         refresh_token, token_expires_at, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.client_id)
        .bind(&account.platform)
        .bind(&account.account_name)
        .bind(credentials.access_token.expose_secret())
        .bind(credentials.refresh_token.as_ref().map(|t| t.expose_secret().to_string()))
        .bind(credentials.expires_at)
        .bind(account.options.encode())
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn create_target(&self, target: &PublishTarget) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_platforms (id, post_id, social_account_id, platform, external_post_id,
                                        status, error_message, attempts, next_attempt_at,
                                        published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&target.id)
        .bind(&target.post_id)
        .bind(&target.social_account_id)
        .bind(&target.platform)
        .bind(&target.external_post_id)
        .bind(target.status.as_str())
        .bind(&target.error_message)
        .bind(target.attempts as i64)
        .bind(target.next_attempt_at)
        .bind(target.published_at)
        .bind(target.created_at)
        .bind(target.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let query = format!("SELECT {} FROM posts p WHERE p.id = ?", POST_COLUMNS);
        let row = sqlx::query(&query)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(post_from_row).transpose()
    }

    /// All targets of a content item, without their accounts
    pub async fn get_targets(&self, post_id: &str) -> Result<Vec<PublishTarget>> {
        let query = format!(
            r#"
            SELECT {}
            FROM post_platforms t
            JOIN social_accounts a ON a.id = t.social_account_id
            WHERE t.post_id = ?
            ORDER BY t.created_at ASC, t.id ASC
            "#,
            TARGET_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(target_from_row).collect()
    }

    pub async fn get_target(&self, target_id: &str) -> Result<Option<PublishTarget>> {
        let query = format!(
            r#"
            SELECT {}
            FROM post_platforms t
            JOIN social_accounts a ON a.id = t.social_account_id
            WHERE t.id = ?
            "#,
            TARGET_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(target_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(target_from_row).transpose()
    }

    /// Snapshots for a target, oldest first
    pub async fn list_snapshots(&self, post_platform_id: &str) -> Result<Vec<MetricSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_platform_id, likes, comments, shares, views, impressions,
                   reach, clicks, engagement_rate, platform_data, recorded_at
            FROM analytics
            WHERE post_platform_id = ?
            ORDER BY recorded_at ASC, id ASC
            "#,
        )
        .bind(post_platform_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| MetricSnapshot {
                id: Some(r.get("id")),
                post_platform_id: r.get("post_platform_id"),
                likes: r.get("likes"),
                comments: r.get("comments"),
                shares: r.get("shares"),
                views: r.get("views"),
                impressions: r.get("impressions"),
                reach: r.get("reach"),
                clicks: r.get("clicks"),
                engagement_rate: r.get("engagement_rate"),
                platform_data: decode_json(r.get("platform_data")),
                recorded_at: r.get("recorded_at"),
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Work selection
    // ------------------------------------------------------------------

    /// Content items due for publishing, oldest `scheduled_at` first
    ///
    /// With `retry_max_attempts` set, `partially_published` items owning a
    /// failed target whose retry time has come are returned too.
    pub async fn select_due_posts(
        &self,
        now: i64,
        client_id: Option<&str>,
        platform: Option<&str>,
        retry_max_attempts: Option<u32>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        let mut due = String::from(
            "(p.status = 'scheduled' AND p.scheduled_at IS NOT NULL AND p.scheduled_at <= ?)",
        );
        if retry_max_attempts.is_some() {
            due.push_str(
                r#"
                OR (p.status = 'partially_published' AND EXISTS (
                    SELECT 1 FROM post_platforms r
                    WHERE r.post_id = p.id
                      AND r.status = 'failed'
                      AND r.attempts < ?
                      AND r.next_attempt_at IS NOT NULL
                      AND r.next_attempt_at <= ?))
                "#,
            );
        }

        let mut where_clauses = vec![format!("({})", due)];
        if client_id.is_some() {
            where_clauses.push("p.client_id = ?".to_string());
        }
        if platform.is_some() {
            where_clauses.push(
                "EXISTS (SELECT 1 FROM post_platforms f WHERE f.post_id = p.id AND f.platform = ?)"
                    .to_string(),
            );
        }

        let query_str = format!(
            r#"
            SELECT {}
            FROM posts p
            WHERE {}
            ORDER BY p.scheduled_at ASC, p.created_at ASC
            LIMIT ?
            "#,
            POST_COLUMNS,
            where_clauses.join(" AND ")
        );

        // Bind parameters in the same order as the WHERE clauses
        let mut query = sqlx::query(&query_str).bind(now);
        if let Some(max_attempts) = retry_max_attempts {
            query = query.bind(max_attempts as i64).bind(now);
        }
        if let Some(client) = client_id {
            query = query.bind(client);
        }
        if let Some(plat) = platform {
            query = query.bind(plat);
        }
        query = query.bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Targets with their accounts for a batch of content items, in one query
    pub async fn load_targets_for(
        &self,
        post_ids: &[String],
    ) -> Result<HashMap<String, Vec<TargetWithAccount>>> {
        let mut grouped: HashMap<String, Vec<TargetWithAccount>> = HashMap::new();
        if post_ids.is_empty() {
            return Ok(grouped);
        }

        let query_str = format!(
            r#"
            SELECT {}
            FROM post_platforms t
            JOIN social_accounts a ON a.id = t.social_account_id
            WHERE t.post_id IN ({})
            ORDER BY t.created_at ASC, t.id ASC
            "#,
            TARGET_COLUMNS,
            placeholders(post_ids.len())
        );

        let mut query = sqlx::query(&query_str);
        for id in post_ids {
            query = query.bind(id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        for row in &rows {
            let target = target_from_row(row)?;
            let account = account_from_row(row, &target.social_account_id);
            grouped
                .entry(target.post_id.clone())
                .or_default()
                .push(TargetWithAccount { target, account });
        }

        Ok(grouped)
    }

    /// Media for a batch of content items, in one query, ordered by position
    pub async fn load_media_for(&self, post_ids: &[String]) -> Result<HashMap<String, Vec<Media>>> {
        let mut grouped: HashMap<String, Vec<Media>> = HashMap::new();
        if post_ids.is_empty() {
            return Ok(grouped);
        }

        let query_str = format!(
            r#"
            SELECT id, post_id, path, media_type, url, position
            FROM post_media
            WHERE post_id IN ({})
            ORDER BY position ASC, id ASC
            "#,
            placeholders(post_ids.len())
        );

        let mut query = sqlx::query(&query_str);
        for id in post_ids {
            query = query.bind(id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        for row in &rows {
            let media_type: String = row.get("media_type");
            let media = Media {
                id: row.get("id"),
                post_id: row.get("post_id"),
                path: row.get("path"),
                media_type: media_type
                    .parse()
                    .map_err(|reason| corrupt("post_media", reason))?,
                url: row.get("url"),
                position: row.get("position"),
            };
            grouped.entry(media.post_id.clone()).or_default().push(media);
        }

        Ok(grouped)
    }

    /// Published targets within the lookback window, newest first
    pub async fn select_analytics_targets(
        &self,
        published_since: i64,
        client_id: Option<&str>,
        platform: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SyncTarget>> {
        let mut where_clauses = vec![
            "t.status = 'published'",
            "t.external_post_id IS NOT NULL",
            "t.published_at IS NOT NULL",
            "t.published_at >= ?",
        ];
        if client_id.is_some() {
            where_clauses.push("p.client_id = ?");
        }
        if platform.is_some() {
            where_clauses.push("t.platform = ?");
        }

        let query_str = format!(
            r#"
            SELECT {},
                   p.client_id AS post_client_id,
                   (SELECT MAX(s.recorded_at) FROM analytics s
                    WHERE s.post_platform_id = t.id) AS last_synced_at
            FROM post_platforms t
            JOIN social_accounts a ON a.id = t.social_account_id
            JOIN posts p ON p.id = t.post_id
            WHERE {}
            ORDER BY t.published_at DESC, t.id ASC
            LIMIT ?
            "#,
            TARGET_COLUMNS,
            where_clauses.join(" AND ")
        );

        let mut query = sqlx::query(&query_str).bind(published_since);
        if let Some(client) = client_id {
            query = query.bind(client);
        }
        if let Some(plat) = platform {
            query = query.bind(plat);
        }
        query = query.bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|row| {
                let target = target_from_row(row)?;
                let account = account_from_row(row, &target.social_account_id);
                Ok(SyncTarget {
                    target,
                    account,
                    client_id: row.get("post_client_id"),
                    last_synced_at: row.get("last_synced_at"),
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Outcome writes
    // ------------------------------------------------------------------

    pub async fn record_target_success(
        &self,
        target_id: &str,
        external_post_id: &str,
        published_at: i64,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE post_platforms
            SET status = 'published', external_post_id = ?, published_at = ?,
                error_message = NULL, next_attempt_at = NULL,
                attempts = attempts + 1, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(external_post_id)
        .bind(published_at)
        .bind(now)
        .bind(target_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Mark a target failed, keeping any external id from an earlier success
    pub async fn record_target_failure(
        &self,
        target_id: &str,
        error_message: &str,
        next_attempt_at: Option<i64>,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE post_platforms
            SET status = 'failed', error_message = ?, next_attempt_at = ?,
                attempts = attempts + 1, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(error_message)
        .bind(next_attempt_at)
        .bind(now)
        .bind(target_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Write the aggregate outcome of a content item
    ///
    /// `None` for `published_at` or `scheduled_at` keeps the stored value.
    pub async fn update_post_outcome(
        &self,
        post_id: &str,
        status: PostStatus,
        published_at: Option<i64>,
        scheduled_at: Option<i64>,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE posts
            SET status = ?,
                published_at = COALESCE(?, published_at),
                scheduled_at = COALESCE(?, scheduled_at),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(published_at)
        .bind(scheduled_at)
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Append a snapshot and return its row id
    pub async fn insert_snapshot(&self, snapshot: &MetricSnapshot) -> Result<i64> {
        let platform_data = snapshot
            .platform_data
            .as_ref()
            .map(|value| value.to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO analytics (post_platform_id, likes, comments, shares, views, impressions,
                                   reach, clicks, engagement_rate, platform_data, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.post_platform_id)
        .bind(snapshot.likes)
        .bind(snapshot.comments)
        .bind(snapshot.shares)
        .bind(snapshot.views)
        .bind(snapshot.impressions)
        .bind(snapshot.reach)
        .bind(snapshot.clicks)
        .bind(snapshot.engagement_rate)
        .bind(platform_data)
        .bind(snapshot.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.last_insert_rowid())
    }

    // ------------------------------------------------------------------
    // Run leases
    // ------------------------------------------------------------------

    /// Take the lease for `kind`, or fail with the current holder
    ///
    /// An expired lease is taken over.
    pub async fn acquire_run_lock(&self, kind: &str, holder: &str, now: i64, ttl_secs: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO run_locks (kind, holder, acquired_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(kind) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE run_locks.expires_at <= excluded.acquired_at
            "#,
        )
        .bind(kind)
        .bind(holder)
        .bind(now)
        .bind(now + ttl_secs)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT holder FROM run_locks WHERE kind = ?")
                .bind(kind)
                .fetch_optional(&self.pool)
                .await
                .map_err(DbError::SqlxError)?;

        Err(CastworkError::RunInProgress {
            kind: kind.to_string(),
            holder: current.unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Release the lease if `holder` still owns it
    pub async fn release_run_lock(&self, kind: &str, holder: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM run_locks WHERE kind = ? AND holder = ?")
            .bind(kind)
            .bind(holder)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn corrupt(table: &'static str, reason: String) -> CastworkError {
    DbError::CorruptRow { table, reason }.into()
}

fn decode_json(raw: Option<String>) -> Option<serde_json::Value> {
    raw.and_then(|text| serde_json::from_str(&text).ok())
}

fn post_from_row(r: &SqliteRow) -> Result<Post> {
    let status: String = r.get("status");
    Ok(Post {
        id: r.get("id"),
        client_id: r.get("client_id"),
        author_id: r.get("author_id"),
        title: r.get("title"),
        body: r.get("body"),
        status: status.parse().map_err(|reason| corrupt("posts", reason))?,
        scheduled_at: r.get("scheduled_at"),
        published_at: r.get("published_at"),
        recurrence: r.get("recurrence"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn target_from_row(r: &SqliteRow) -> Result<PublishTarget> {
    let status: String = r.get("status");
    let attempts: i64 = r.get("attempts");
    Ok(PublishTarget {
        id: r.get("id"),
        post_id: r.get("post_id"),
        social_account_id: r.get("social_account_id"),
        platform: r.get("platform"),
        external_post_id: r.get("external_post_id"),
        status: status
            .parse::<TargetStatus>()
            .map_err(|reason| corrupt("post_platforms", reason))?,
        error_message: r.get("error_message"),
        attempts: u32::try_from(attempts.max(0)).unwrap_or(u32::MAX),
        next_attempt_at: r.get("next_attempt_at"),
        published_at: r.get("published_at"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

/// Account columns of a joined target row
///
/// Options that cannot be decoded fall back to the platform default.
fn account_from_row(r: &SqliteRow, account_id: &str) -> SocialAccount {
    let platform: String = r.get("account_platform");
    let metadata: Option<String> = r.get("account_metadata");
    let options = PlatformOptions::decode(&platform, metadata.as_deref()).unwrap_or_else(|reason| {
        warn!(account_id, platform = %platform, %reason, "ignoring undecodable platform options");
        PlatformOptions::default_for(&platform)
    });

    let access_token: String = r.get("access_token");
    let refresh_token: Option<String> = r.get("refresh_token");

    SocialAccount {
        id: account_id.to_string(),
        client_id: r.get("account_client_id"),
        platform,
        account_name: r.get("account_name"),
        credentials: Credentials {
            access_token: SecretString::from(access_token),
            refresh_token: refresh_token.map(SecretString::from),
            expires_at: r.get("token_expires_at"),
        },
        options,
        created_at: r.get("account_created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::options::FacebookOptions;
    use crate::types::MediaType;
    use tempfile::TempDir;

    const NOW: i64 = 1_760_000_000;

    async fn setup_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        (db, temp_dir)
    }

    async fn seed_account(db: &Database, client: &str, platform: &str) -> SocialAccount {
        let account = SocialAccount::new(client, platform, "Acme", Credentials::new("token", None));
        db.create_account(&account).await.unwrap();
        account
    }

    async fn seed_post(db: &Database, client: &str, scheduled_at: i64) -> Post {
        let post = Post::new(client, "author-1", "Hello".to_string()).scheduled(scheduled_at);
        db.create_post(&post).await.unwrap();
        post
    }

    #[tokio::test]
    async fn test_database_initialization_with_invalid_path() {
        #[cfg(unix)]
        let invalid_path = "/tmp/test\0invalid.db";

        #[cfg(windows)]
        let invalid_path = "C:\\invalid<>path\\test.db";

        let result = Database::new(invalid_path).await;
        assert!(matches!(result, Err(CastworkError::Database(_))));
    }

    #[tokio::test]
    async fn test_create_and_retrieve_post() {
        let (db, _temp) = setup_db().await;
        let mut post = Post::new("client-1", "author-1", "Launch day".to_string()).scheduled(NOW);
        post.title = Some("Launch".to_string());
        post.recurrence = Some("weekly".to_string());
        db.create_post(&post).await.unwrap();

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.body, "Launch day");
        assert_eq!(stored.title.as_deref(), Some("Launch"));
        assert_eq!(stored.status, PostStatus::Scheduled);
        assert_eq!(stored.scheduled_at, Some(NOW));
        assert!(stored.is_recurring());

        assert!(db.get_post("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_status_is_corrupt_row() {
        let (db, _temp) = setup_db().await;
        let post = seed_post(&db, "client-1", NOW).await;
        sqlx::query("UPDATE posts SET status = 'posted' WHERE id = ?")
            .bind(&post.id)
            .execute(db.pool())
            .await
            .unwrap();

        let result = db.get_post(&post.id).await;
        assert!(matches!(
            result,
            Err(CastworkError::Database(DbError::CorruptRow { table: "posts", .. }))
        ));
    }

    #[tokio::test]
    async fn test_target_unique_per_post_and_account() {
        let (db, _temp) = setup_db().await;
        let account = seed_account(&db, "client-1", "facebook").await;
        let post = seed_post(&db, "client-1", NOW).await;

        db.create_target(&PublishTarget::new(&post.id, &account)).await.unwrap();
        let duplicate = db.create_target(&PublishTarget::new(&post.id, &account)).await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_select_due_posts_orders_oldest_first() {
        let (db, _temp) = setup_db().await;
        let later = seed_post(&db, "client-1", NOW - 10).await;
        let earlier = seed_post(&db, "client-1", NOW - 100).await;
        seed_post(&db, "client-1", NOW + 100).await;

        let draft = Post::new("client-1", "author-1", "Draft".to_string());
        db.create_post(&draft).await.unwrap();

        let due = db.select_due_posts(NOW, None, None, None, 50).await.unwrap();
        let ids: Vec<&str> = due.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![earlier.id.as_str(), later.id.as_str()]);

        let capped = db.select_due_posts(NOW, None, None, None, 1).await.unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].id, earlier.id);
    }

    #[tokio::test]
    async fn test_select_due_posts_filters_by_client_and_platform() {
        let (db, _temp) = setup_db().await;
        let fb = seed_account(&db, "client-1", "facebook").await;
        let tw = seed_account(&db, "client-2", "twitter").await;

        let first = seed_post(&db, "client-1", NOW - 10).await;
        db.create_target(&PublishTarget::new(&first.id, &fb)).await.unwrap();
        let second = seed_post(&db, "client-2", NOW - 10).await;
        db.create_target(&PublishTarget::new(&second.id, &tw)).await.unwrap();

        let by_client = db
            .select_due_posts(NOW, Some("client-2"), None, None, 50)
            .await
            .unwrap();
        assert_eq!(by_client.len(), 1);
        assert_eq!(by_client[0].id, second.id);

        let by_platform = db
            .select_due_posts(NOW, None, Some("facebook"), None, 50)
            .await
            .unwrap();
        assert_eq!(by_platform.len(), 1);
        assert_eq!(by_platform[0].id, first.id);
    }

    #[tokio::test]
    async fn test_select_due_posts_includes_retry_eligible_items() {
        let (db, _temp) = setup_db().await;
        let account = seed_account(&db, "client-1", "twitter").await;

        let mut post = Post::new("client-1", "author-1", "Retry me".to_string()).scheduled(NOW - 500);
        post.status = PostStatus::PartiallyPublished;
        db.create_post(&post).await.unwrap();

        let mut target = PublishTarget::new(&post.id, &account);
        target.status = TargetStatus::Failed;
        target.attempts = 1;
        target.next_attempt_at = Some(NOW - 1);
        db.create_target(&target).await.unwrap();

        let without_retry = db.select_due_posts(NOW, None, None, None, 50).await.unwrap();
        assert!(without_retry.is_empty());

        let with_retry = db.select_due_posts(NOW, None, None, Some(3), 50).await.unwrap();
        assert_eq!(with_retry.len(), 1);

        let exhausted = db.select_due_posts(NOW, None, None, Some(1), 50).await.unwrap();
        assert!(exhausted.is_empty());

        let too_early = db.select_due_posts(NOW - 10, None, None, Some(3), 50).await.unwrap();
        assert!(too_early.is_empty());
    }

    #[tokio::test]
    async fn test_load_targets_decodes_account_options() {
        let (db, _temp) = setup_db().await;
        let account = SocialAccount::new("client-1", "facebook", "Acme", Credentials::new("token", Some(NOW + 60)))
            .with_options(PlatformOptions::Facebook(FacebookOptions {
                page_id: Some("page-9".to_string()),
                link: None,
            }));
        db.create_account(&account).await.unwrap();
        let post = seed_post(&db, "client-1", NOW).await;
        db.create_target(&PublishTarget::new(&post.id, &account)).await.unwrap();

        let grouped = db.load_targets_for(&[post.id.clone()]).await.unwrap();
        let targets = &grouped[&post.id];
        assert_eq!(targets.len(), 1);

        let loaded = &targets[0].account;
        assert_eq!(loaded.credentials.expires_at, Some(NOW + 60));
        assert!(loaded.credentials.has_access_token());
        match &loaded.options {
            PlatformOptions::Facebook(fb) => assert_eq!(fb.page_id.as_deref(), Some("page-9")),
            other => panic!("expected facebook options, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_targets_falls_back_on_bad_options() {
        let (db, _temp) = setup_db().await;
        let account = seed_account(&db, "client-1", "linkedin").await;
        sqlx::query("UPDATE social_accounts SET metadata = '{not json' WHERE id = ?")
            .bind(&account.id)
            .execute(db.pool())
            .await
            .unwrap();
        let post = seed_post(&db, "client-1", NOW).await;
        db.create_target(&PublishTarget::new(&post.id, &account)).await.unwrap();

        let grouped = db.load_targets_for(&[post.id.clone()]).await.unwrap();
        assert_eq!(
            grouped[&post.id][0].account.options,
            PlatformOptions::default_for("linkedin")
        );
    }

    #[tokio::test]
    async fn test_load_media_groups_and_orders() {
        let (db, _temp) = setup_db().await;
        let post = seed_post(&db, "client-1", NOW).await;

        let mut video = Media::new(&post.id, "/m/clip.mp4", MediaType::Video);
        video.position = 1;
        let image = Media::new(&post.id, "/m/cover.jpg", MediaType::Image);
        db.add_media(&video).await.unwrap();
        db.add_media(&image).await.unwrap();

        let grouped = db.load_media_for(&[post.id.clone(), "other".to_string()]).await.unwrap();
        let media = &grouped[&post.id];
        assert_eq!(media.len(), 2);
        assert_eq!(media[0].path, "/m/cover.jpg");
        assert_eq!(media[1].media_type, MediaType::Video);
        assert!(!grouped.contains_key("other"));
    }

    #[tokio::test]
    async fn test_record_outcomes_update_target() {
        let (db, _temp) = setup_db().await;
        let account = seed_account(&db, "client-1", "facebook").await;
        let post = seed_post(&db, "client-1", NOW).await;
        let target = PublishTarget::new(&post.id, &account);
        db.create_target(&target).await.unwrap();

        db.record_target_failure(&target.id, "Network error: reset", Some(NOW + 900), NOW)
            .await
            .unwrap();
        let failed = db.get_target(&target.id).await.unwrap().unwrap();
        assert_eq!(failed.status, TargetStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert_eq!(failed.next_attempt_at, Some(NOW + 900));

        db.record_target_success(&target.id, "fb_123", NOW + 1, NOW + 1)
            .await
            .unwrap();
        let published = db.get_target(&target.id).await.unwrap().unwrap();
        assert_eq!(published.status, TargetStatus::Published);
        assert_eq!(published.external_post_id.as_deref(), Some("fb_123"));
        assert_eq!(published.error_message, None);
        assert_eq!(published.next_attempt_at, None);
        assert_eq!(published.attempts, 2);
    }

    #[tokio::test]
    async fn test_update_post_outcome_keeps_unset_fields() {
        let (db, _temp) = setup_db().await;
        let post = seed_post(&db, "client-1", NOW - 60).await;

        db.update_post_outcome(&post.id, PostStatus::Failed, None, None, NOW)
            .await
            .unwrap();
        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert_eq!(stored.published_at, None);
        assert_eq!(stored.scheduled_at, Some(NOW - 60));
        assert_eq!(stored.updated_at, NOW);
    }

    #[tokio::test]
    async fn test_analytics_selection_window_and_last_sync() {
        let (db, _temp) = setup_db().await;
        let account = seed_account(&db, "client-1", "facebook").await;

        let mut recent_ids = Vec::new();
        for published_at in [NOW - 100, NOW - 50, NOW - 30 * 86_400] {
            let post = seed_post(&db, "client-1", published_at).await;
            let mut target = PublishTarget::new(&post.id, &account);
            target.status = TargetStatus::Published;
            target.external_post_id = Some(format!("fb_{}", published_at));
            target.published_at = Some(published_at);
            db.create_target(&target).await.unwrap();
            recent_ids.push(target.id);
        }

        let snapshot = MetricSnapshot {
            id: None,
            post_platform_id: recent_ids[0].clone(),
            likes: 1,
            comments: 0,
            shares: 0,
            views: 0,
            impressions: 10,
            reach: 0,
            clicks: 0,
            engagement_rate: 10.0,
            platform_data: Some(serde_json::json!({"source": "test"})),
            recorded_at: NOW - 20,
        };
        db.insert_snapshot(&snapshot).await.unwrap();

        let candidates = db
            .select_analytics_targets(NOW - 7 * 86_400, None, None, 100)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].target.id, recent_ids[1]);
        assert_eq!(candidates[0].last_synced_at, None);
        assert_eq!(candidates[1].target.id, recent_ids[0]);
        assert_eq!(candidates[1].last_synced_at, Some(NOW - 20));
        assert_eq!(candidates[1].client_id, "client-1");

        let other_platform = db
            .select_analytics_targets(NOW - 7 * 86_400, None, Some("twitter"), 100)
            .await
            .unwrap();
        assert!(other_platform.is_empty());
    }

    #[tokio::test]
    async fn test_snapshots_append() {
        let (db, _temp) = setup_db().await;
        let account = seed_account(&db, "client-1", "facebook").await;
        let post = seed_post(&db, "client-1", NOW).await;
        let target = PublishTarget::new(&post.id, &account);
        db.create_target(&target).await.unwrap();

        let mut snapshot = MetricSnapshot {
            id: None,
            post_platform_id: target.id.clone(),
            likes: 1,
            comments: 0,
            shares: 0,
            views: 0,
            impressions: 0,
            reach: 0,
            clicks: 0,
            engagement_rate: 0.0,
            platform_data: None,
            recorded_at: NOW,
        };
        let first = db.insert_snapshot(&snapshot).await.unwrap();
        snapshot.likes = 5;
        snapshot.recorded_at = NOW + 10;
        let second = db.insert_snapshot(&snapshot).await.unwrap();
        assert!(second > first);

        let stored = db.list_snapshots(&target.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].likes, 1);
        assert_eq!(stored[1].likes, 5);
    }

    #[tokio::test]
    async fn test_run_lock_contention_and_expiry() {
        let (db, _temp) = setup_db().await;

        db.acquire_run_lock("publish", "run-a", NOW, 900).await.unwrap();

        let contended = db.acquire_run_lock("publish", "run-b", NOW + 10, 900).await;
        match contended {
            Err(CastworkError::RunInProgress { kind, holder }) => {
                assert_eq!(kind, "publish");
                assert_eq!(holder, "run-a");
            }
            other => panic!("expected RunInProgress, got {:?}", other),
        }

        // Different kinds do not contend
        db.acquire_run_lock("analytics", "run-c", NOW, 900).await.unwrap();

        // Expired lease is taken over
        db.acquire_run_lock("publish", "run-d", NOW + 900, 900).await.unwrap();
        assert!(!db.release_run_lock("publish", "run-a").await.unwrap());
        assert!(db.release_run_lock("publish", "run-d").await.unwrap());

        db.acquire_run_lock("publish", "run-e", NOW + 901, 900).await.unwrap();
    }
}
