//! Database operations for Schedcast
//!
//! A single SQLite database backs the four logical stores of the pipeline:
//! the pending queue, the event ledger, the credential store (with its
//! publish history), and the short-lived OAuth attempt table.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result, SchedcastError};
use crate::types::{
    Credential, EngagementStats, Event, Network, OAuthAttempt, PendingPost, PendingStatus,
    PostPayload, Profile, PublishResult, PublishedPost,
};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

fn parse_network(raw: &str) -> Result<Network> {
    Network::from_str_opt(raw)
        .ok_or_else(|| DbError::Corrupt(format!("unknown network '{}'", raw)).into())
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

        // mode=rwc creates the database file if it does not exist
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

    /// In-memory database for tests. A single pooled connection that never
    /// closes, so the database survives for the pool's lifetime.
    pub async fn in_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Record the opaque per-user identifier supplied by the auth provider.
    pub async fn ensure_user(&self, owner_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO users (id, created_at) VALUES (?, ?)")
            .bind(owner_id)
            .bind(crate::types::now_ms())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ========================================================================
    // Pending queue
    // ========================================================================

    /// Add a scheduled post to the pending queue.
    pub async fn enqueue(&self, post: &PendingPost) -> Result<()> {
        let payload = serde_json::to_string(&post.payload).map_err(DbError::SerdeError)?;

        sqlx::query(
            r#"
            INSERT INTO pending_posts (id, owner_id, network, due_at, payload, status, attempts, last_error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.owner_id)
        .bind(post.network.as_str())
        .bind(post.due_at)
        .bind(payload)
        .bind(post.status.as_str())
        .bind(post.attempts)
        .bind(&post.last_error)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// All pending items with due_at <= now, earliest first. Ties on due_at
    /// keep insertion order.
    pub async fn list_due(&self, now_ms: i64) -> Result<Vec<PendingPost>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, network, due_at, payload, status, attempts, last_error, created_at
            FROM pending_posts
            WHERE status = 'pending' AND due_at <= ?
            ORDER BY due_at ASC, created_at ASC
            "#,
        )
        .bind(now_ms)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_pending).collect()
    }

    pub async fn get_pending(&self, id: &str) -> Result<Option<PendingPost>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, network, due_at, payload, status, attempts, last_error, created_at
            FROM pending_posts WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(row_to_pending).transpose()
    }

    pub async fn list_pending_by_owner(&self, owner_id: &str) -> Result<Vec<PendingPost>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, network, due_at, payload, status, attempts, last_error, created_at
            FROM pending_posts
            WHERE owner_id = ?
            ORDER BY due_at ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_pending).collect()
    }

    /// Remove a pending item. Idempotent: removing an absent id is a no-op.
    pub async fn remove_pending(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM pending_posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Record a failed publish attempt. Once the attempt count reaches
    /// `max_attempts` the item is parked in the terminal failed state and no
    /// longer returned by `list_due`.
    pub async fn record_failure(
        &self,
        id: &str,
        error: &str,
        max_attempts: i64,
    ) -> Result<(i64, PendingStatus)> {
        sqlx::query(
            r#"
            UPDATE pending_posts
            SET attempts = attempts + 1,
                last_error = ?,
                status = CASE WHEN attempts + 1 >= ? THEN 'failed' ELSE status END
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(max_attempts)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let row = sqlx::query("SELECT attempts, status FROM pending_posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?
            .ok_or_else(|| SchedcastError::NotFound(format!("pending post {}", id)))?;

        let attempts: i64 = row.get("attempts");
        let status = match row.get::<String, _>("status").as_str() {
            "failed" => PendingStatus::Failed,
            _ => PendingStatus::Pending,
        };

        Ok((attempts, status))
    }

    /// Park an item in the terminal failed state immediately, regardless of
    /// how many attempts remain. Used for errors that cannot succeed on a
    /// retry.
    pub async fn park_failed(&self, id: &str, error: &str) -> Result<i64> {
        let result = sqlx::query(
            r#"
            UPDATE pending_posts
            SET attempts = attempts + 1,
                last_error = ?,
                status = 'failed'
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(SchedcastError::NotFound(format!("pending post {}", id)));
        }

        let row = sqlx::query("SELECT attempts FROM pending_posts WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(row.get("attempts"))
    }

    // ========================================================================
    // Event ledger
    // ========================================================================

    pub async fn create_event(&self, event: &Event) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events (id, owner_id, network, pending_post_id, scheduled_at, summary, border_color, posted)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.owner_id)
        .bind(event.network.as_str())
        .bind(&event.pending_post_id)
        .bind(event.scheduled_at)
        .bind(&event.summary)
        .bind(event.border_color.as_str())
        .bind(if event.posted { 1 } else { 0 })
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Flip an event to posted. Fails with `NotFound` for an unknown id;
    /// callers invoke this at most once per pending post.
    pub async fn mark_event_posted(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE events SET posted = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(SchedcastError::NotFound(format!("event {}", id)));
        }

        Ok(())
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<Event>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, network, pending_post_id, scheduled_at, summary, border_color, posted
            FROM events WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(row_to_event).transpose()
    }

    pub async fn get_event_for_pending(&self, pending_post_id: &str) -> Result<Option<Event>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, network, pending_post_id, scheduled_at, summary, border_color, posted
            FROM events WHERE pending_post_id = ?
            "#,
        )
        .bind(pending_post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(row_to_event).transpose()
    }

    pub async fn list_events_by_owner(&self, owner_id: &str) -> Result<Vec<Event>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, network, pending_post_id, scheduled_at, summary, border_color, posted
            FROM events
            WHERE owner_id = ?
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_event).collect()
    }

    pub async fn delete_event(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ========================================================================
    // Credentials
    // ========================================================================

    pub async fn upsert_credential(&self, credential: &Credential) -> Result<()> {
        let followers =
            serde_json::to_string(&credential.profile.followers).map_err(DbError::SerdeError)?;

        sqlx::query(
            r#"
            INSERT INTO credentials (owner_id, network, access_token, refresh_token, expires_at,
                                     profile_external_id, profile_display_name, profile_avatar_url,
                                     follower_history, connected_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (owner_id, network) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                profile_external_id = excluded.profile_external_id,
                profile_display_name = excluded.profile_display_name,
                profile_avatar_url = excluded.profile_avatar_url,
                follower_history = excluded.follower_history
            "#,
        )
        .bind(&credential.owner_id)
        .bind(credential.network.as_str())
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at)
        .bind(&credential.profile.external_id)
        .bind(&credential.profile.display_name)
        .bind(&credential.profile.avatar_url)
        .bind(followers)
        .bind(credential.connected_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_credential(
        &self,
        owner_id: &str,
        network: Network,
    ) -> Result<Option<Credential>> {
        let row = sqlx::query(
            r#"
            SELECT owner_id, network, access_token, refresh_token, expires_at,
                   profile_external_id, profile_display_name, profile_avatar_url,
                   follower_history, connected_at
            FROM credentials WHERE owner_id = ? AND network = ?
            "#,
        )
        .bind(owner_id)
        .bind(network.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(row_to_credential).transpose()
    }

    /// Persist refreshed token fields. Called immediately after a refresh,
    /// before publish, so a crash cannot re-spend a single-use refresh token.
    pub async fn update_tokens(
        &self,
        owner_id: &str,
        network: Network,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE credentials
            SET access_token = ?, refresh_token = COALESCE(?, refresh_token), expires_at = ?
            WHERE owner_id = ? AND network = ?
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(owner_id)
        .bind(network.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(SchedcastError::NotFound(format!(
                "credential for {} on {}",
                owner_id, network
            )));
        }

        Ok(())
    }

    /// Remove a credential on revoke. Publish history is kept.
    pub async fn delete_credential(&self, owner_id: &str, network: Network) -> Result<()> {
        sqlx::query("DELETE FROM credentials WHERE owner_id = ? AND network = ?")
            .bind(owner_id)
            .bind(network.as_str())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ========================================================================
    // Publish history
    // ========================================================================

    pub async fn append_published_post(
        &self,
        owner_id: &str,
        network: Network,
        post: &PublishedPost,
    ) -> Result<()> {
        let stats = serde_json::to_string(&post.stats).map_err(DbError::SerdeError)?;

        sqlx::query(
            r#"
            INSERT INTO published_posts (owner_id, network, external_id, content, published_at, stats)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(owner_id)
        .bind(network.as_str())
        .bind(&post.external_id)
        .bind(&post.content)
        .bind(post.published_at)
        .bind(stats)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn list_published(
        &self,
        owner_id: &str,
        network: Network,
    ) -> Result<Vec<PublishedPost>> {
        let rows = sqlx::query(
            r#"
            SELECT external_id, content, published_at, stats
            FROM published_posts
            WHERE owner_id = ? AND network = ?
            ORDER BY published_at ASC, id ASC
            "#,
        )
        .bind(owner_id)
        .bind(network.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                let stats: Vec<EngagementStats> =
                    serde_json::from_str(&r.get::<String, _>("stats"))
                        .map_err(DbError::SerdeError)?;
                Ok(PublishedPost {
                    external_id: r.get("external_id"),
                    content: r.get("content"),
                    published_at: r.get("published_at"),
                    stats,
                })
            })
            .collect()
    }

    /// Prune a history entry after the remote post was deleted.
    pub async fn remove_published(
        &self,
        owner_id: &str,
        network: Network,
        external_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "DELETE FROM published_posts WHERE owner_id = ? AND network = ? AND external_id = ?",
        )
        .bind(owner_id)
        .bind(network.as_str())
        .bind(external_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Success bookkeeping for one published item, in a single transaction:
    /// mark the mirroring event posted (clearing the queue back-reference),
    /// append the publish history entry, and dequeue the pending post. A
    /// crash cannot leave an event posted but the item still queued.
    pub async fn finalize_published(
        &self,
        pending: &PendingPost,
        result: &PublishResult,
        stats: EngagementStats,
    ) -> Result<()> {
        let stats_json =
            serde_json::to_string(&vec![stats.clone()]).map_err(DbError::SerdeError)?;

        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        let updated = sqlx::query(
            "UPDATE events SET posted = 1, pending_post_id = NULL WHERE pending_post_id = ?",
        )
        .bind(&pending.id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        if updated.rows_affected() == 0 {
            // The ledger entry can be missing if the user cancelled the event
            // between claim and publish. The publish already happened, so the
            // remaining bookkeeping still proceeds.
            tracing::warn!(
                pending_post_id = %pending.id,
                "no pending event found while finalizing publish"
            );
        }

        sqlx::query(
            r#"
            INSERT INTO published_posts (owner_id, network, external_id, content, published_at, stats)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&pending.owner_id)
        .bind(pending.network.as_str())
        .bind(&result.external_id)
        .bind(&result.canonical_text)
        .bind(result.published_at)
        .bind(stats_json)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        sqlx::query("DELETE FROM pending_posts WHERE id = ?")
            .bind(&pending.id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        tx.commit().await.map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ========================================================================
    // OAuth attempts
    // ========================================================================

    /// Store the PKCE state for an authorization attempt. A new attempt by
    /// the same user for the same network replaces the previous one.
    pub async fn put_oauth_attempt(&self, attempt: &OAuthAttempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO oauth_attempts (owner_id, network, state, code_verifier, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attempt.owner_id)
        .bind(attempt.network.as_str())
        .bind(&attempt.state)
        .bind(&attempt.code_verifier)
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Consume an authorization attempt. The row is removed either way;
    /// expired attempts are reported as absent.
    pub async fn take_oauth_attempt(
        &self,
        owner_id: &str,
        network: Network,
        now_ms: i64,
    ) -> Result<Option<OAuthAttempt>> {
        let row = sqlx::query(
            r#"
            SELECT owner_id, network, state, code_verifier, created_at
            FROM oauth_attempts WHERE owner_id = ? AND network = ?
            "#,
        )
        .bind(owner_id)
        .bind(network.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM oauth_attempts WHERE owner_id = ? AND network = ?")
            .bind(owner_id)
            .bind(network.as_str())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let attempt = OAuthAttempt {
            owner_id: row.get("owner_id"),
            network: parse_network(&row.get::<String, _>("network"))?,
            state: row.get("state"),
            code_verifier: row.get("code_verifier"),
            created_at: row.get("created_at"),
        };

        if attempt.is_expired(now_ms) {
            return Ok(None);
        }

        Ok(Some(attempt))
    }

    pub async fn purge_expired_oauth(&self, now_ms: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM oauth_attempts WHERE created_at < ?")
            .bind(now_ms - crate::types::OAUTH_ATTEMPT_TTL_MS)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }
}

fn row_to_pending(row: &sqlx::sqlite::SqliteRow) -> Result<PendingPost> {
    let payload: PostPayload =
        serde_json::from_str(&row.get::<String, _>("payload")).map_err(DbError::SerdeError)?;

    Ok(PendingPost {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        network: parse_network(&row.get::<String, _>("network"))?,
        due_at: row.get("due_at"),
        payload,
        status: match row.get::<String, _>("status").as_str() {
            "failed" => PendingStatus::Failed,
            _ => PendingStatus::Pending,
        },
        attempts: row.get("attempts"),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
    })
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<Event> {
    Ok(Event {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        network: parse_network(&row.get::<String, _>("network"))?,
        pending_post_id: row.get("pending_post_id"),
        scheduled_at: row.get("scheduled_at"),
        summary: row.get("summary"),
        border_color: row.get("border_color"),
        posted: row.get::<i64, _>("posted") != 0,
    })
}

fn row_to_credential(row: &sqlx::sqlite::SqliteRow) -> Result<Credential> {
    let followers = serde_json::from_str(&row.get::<String, _>("follower_history"))
        .map_err(DbError::SerdeError)?;

    Ok(Credential {
        owner_id: row.get("owner_id"),
        network: parse_network(&row.get::<String, _>("network"))?,
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        expires_at: row.get("expires_at"),
        profile: Profile {
            external_id: row.get("profile_external_id"),
            display_name: row.get("profile_display_name"),
            avatar_url: row.get("profile_avatar_url"),
            followers,
        },
        connected_at: row.get("connected_at"),
    })
}
