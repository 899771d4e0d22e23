//! Delivery sweeper
//!
//! Each pass claims every due queue item and walks it through the full
//! delivery sequence: credential lookup, token refresh, publish, and the
//! transactional success bookkeeping. One item's failure never aborts the
//! pass; errors are recorded on the item and the sweep moves on.

use std::collections::HashMap;

use crate::db::Database;
use crate::error::{NetworkError, Result, SchedcastError};
use crate::networks::Publisher;
use crate::stats::StatsProvider;
use crate::types::{Network, PendingPost, PendingStatus};

/// Outcome counts for one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    /// Items that were due when the pass started.
    pub due: usize,
    /// Items published and finalized.
    pub published: usize,
    /// Items whose attempt failed and was recorded.
    pub failed: usize,
    /// Items skipped without consuming an attempt (no publisher, no
    /// credential, or expired authorization).
    pub skipped: usize,
}

pub struct Sweeper {
    db: Database,
    publishers: HashMap<Network, Box<dyn Publisher>>,
    stats: Box<dyn StatsProvider>,
    max_attempts: i64,
}

impl Sweeper {
    pub fn new(
        db: Database,
        publishers: HashMap<Network, Box<dyn Publisher>>,
        stats: Box<dyn StatsProvider>,
        max_attempts: i64,
    ) -> Self {
        Self {
            db,
            publishers,
            stats,
            max_attempts,
        }
    }

    /// Run one sweep over everything due at `now_ms`.
    pub async fn run_pass(&self, now_ms: i64) -> Result<PassSummary> {
        // Stale PKCE attempts ride along with the sweep
        match self.db.purge_expired_oauth(now_ms).await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "purged expired oauth attempts"),
            Err(e) => tracing::warn!(error = %e, "failed to purge oauth attempts"),
        }

        let due = self.db.list_due(now_ms).await?;
        let mut summary = PassSummary {
            due: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            return Ok(summary);
        }

        tracing::info!(due = due.len(), "sweep pass starting");

        for item in &due {
            match self.deliver(item, now_ms).await {
                Delivery::Published => summary.published += 1,
                Delivery::Failed => summary.failed += 1,
                Delivery::Skipped => summary.skipped += 1,
            }
        }

        tracing::info!(
            published = summary.published,
            failed = summary.failed,
            skipped = summary.skipped,
            "sweep pass finished"
        );

        Ok(summary)
    }

    /// Deliver a single queue item. Every error path is absorbed here so the
    /// caller's loop keeps going.
    async fn deliver(&self, item: &PendingPost, now_ms: i64) -> Delivery {
        let Some(publisher) = self.publishers.get(&item.network) else {
            tracing::warn!(
                pending_post_id = %item.id,
                network = %item.network,
                "no publisher configured, skipping"
            );
            return Delivery::Skipped;
        };

        let credential = match self.db.get_credential(&item.owner_id, item.network).await {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                tracing::warn!(
                    pending_post_id = %item.id,
                    owner_id = %item.owner_id,
                    network = %item.network,
                    "no credential connected, skipping"
                );
                return Delivery::Skipped;
            }
            Err(e) => {
                tracing::error!(pending_post_id = %item.id, error = %e, "credential lookup failed");
                return Delivery::Skipped;
            }
        };

        let (credential, refreshed) =
            match publisher.refresh_if_expired(&credential, now_ms).await {
                Ok(pair) => pair,
                Err(SchedcastError::Network(NetworkError::AuthExpired(message))) => {
                    // Needs user re-authorization; retrying would burn
                    // attempts on an item that cannot succeed yet
                    tracing::warn!(
                        pending_post_id = %item.id,
                        network = %item.network,
                        message,
                        "authorization expired, skipping until reconnected"
                    );
                    return Delivery::Skipped;
                }
                Err(e) => return self.record_failure(item, &e).await,
            };

        if refreshed {
            // Persist rotated tokens before using them; a crash after this
            // point must not lose the only valid refresh token
            if let Err(e) = self
                .db
                .update_tokens(
                    &item.owner_id,
                    item.network,
                    &credential.access_token,
                    credential.refresh_token.as_deref(),
                    credential.expires_at,
                )
                .await
            {
                tracing::error!(
                    pending_post_id = %item.id,
                    error = %e,
                    "failed to persist refreshed tokens, skipping"
                );
                return Delivery::Skipped;
            }
            tracing::info!(
                owner_id = %item.owner_id,
                network = %item.network,
                "refreshed access token"
            );
        }

        match publisher.publish(&credential, &item.payload).await {
            Ok(result) => {
                tracing::info!(
                    pending_post_id = %item.id,
                    network = %item.network,
                    external_id = %result.external_id,
                    "published"
                );

                let stats = self.stats.seed(now_ms);
                if let Err(e) = self.db.finalize_published(item, &result, stats).await {
                    // The post is live; the item stays queued and will be
                    // retried, which can double-post. Surface loudly.
                    tracing::error!(
                        pending_post_id = %item.id,
                        external_id = %result.external_id,
                        error = %e,
                        "publish succeeded but finalize failed"
                    );
                }

                Delivery::Published
            }
            Err(e) => {
                if let SchedcastError::Network(NetworkError::PartialThread {
                    root_id,
                    posted,
                    total,
                    ..
                }) = &e
                {
                    tracing::warn!(
                        pending_post_id = %item.id,
                        root_id = ?root_id,
                        posted,
                        total,
                        "thread partially posted, remote segments were left behind"
                    );
                }
                self.record_failure(item, &e).await
            }
        }
    }

    async fn record_failure(&self, item: &PendingPost, error: &SchedcastError) -> Delivery {
        tracing::warn!(
            pending_post_id = %item.id,
            network = %item.network,
            error = %error,
            "publish attempt failed"
        );

        // A non-transient failure cannot succeed on a later pass, so the
        // item parks immediately instead of burning retries
        if !error.is_transient() {
            match self.db.park_failed(&item.id, &error.to_string()).await {
                Ok(attempts) => {
                    tracing::error!(
                        pending_post_id = %item.id,
                        attempts,
                        "non-retryable failure, item parked as failed"
                    );
                }
                Err(e) => {
                    tracing::error!(pending_post_id = %item.id, error = %e, "failed to park item");
                }
            }
            return Delivery::Failed;
        }

        match self
            .db
            .record_failure(&item.id, &error.to_string(), self.max_attempts)
            .await
        {
            Ok((attempts, PendingStatus::Failed)) => {
                tracing::error!(
                    pending_post_id = %item.id,
                    attempts,
                    "attempt limit reached, item parked as failed"
                );
            }
            Ok((attempts, _)) => {
                tracing::debug!(pending_post_id = %item.id, attempts, "will retry next pass");
            }
            Err(e) => {
                tracing::error!(pending_post_id = %item.id, error = %e, "failed to record failure");
            }
        }

        Delivery::Failed
    }
}

enum Delivery {
    Published,
    Failed,
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networks::mock::{MockFailure, MockPublisher};
    use crate::stats::FixedStats;
    use crate::types::{
        now_ms, Credential, Event, PostPayload, Profile, TwitterPayload,
    };

    fn payload(text: &str) -> PostPayload {
        PostPayload::Twitter(TwitterPayload {
            segments: vec![text.to_string()],
        })
    }

    fn credential(owner: &str, network: Network, expires_at: i64) -> Credential {
        Credential {
            owner_id: owner.to_string(),
            network,
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at,
            profile: Profile {
                external_id: "ext".to_string(),
                display_name: "name".to_string(),
                avatar_url: None,
                followers: vec![],
            },
            connected_at: 0,
        }
    }

    async fn sweeper_with_mock(
        network: Network,
    ) -> (Sweeper, Database, MockPublisher) {
        let db = Database::in_memory().await.unwrap();
        let mock = MockPublisher::new(network);

        let mut publishers: HashMap<Network, Box<dyn Publisher>> = HashMap::new();
        publishers.insert(network, Box::new(mock.clone()));

        let sweeper = Sweeper::new(
            db.clone(),
            publishers,
            Box::new(FixedStats { impressions: 100 }),
            3,
        );
        (sweeper, db, mock)
    }

    async fn enqueue_with_event(db: &Database, post: &PendingPost) {
        db.enqueue(post).await.unwrap();
        db.create_event(&Event::for_pending(post)).await.unwrap();
    }

    #[tokio::test]
    async fn test_pass_publishes_due_item_exactly_once() {
        let (sweeper, db, mock) = sweeper_with_mock(Network::Twitter).await;
        let now = now_ms();

        db.upsert_credential(&credential("user-1", Network::Twitter, now + 60_000))
            .await
            .unwrap();
        let post = PendingPost::new("user-1", payload("hello"), now - 1_000);
        enqueue_with_event(&db, &post).await;

        let summary = sweeper.run_pass(now).await.unwrap();
        assert_eq!(summary.due, 1);
        assert_eq!(summary.published, 1);
        assert_eq!(mock.publish_call_count(), 1);

        // Item consumed, event posted, history written
        assert!(db.get_pending(&post.id).await.unwrap().is_none());
        let event = db.get_event_for_pending(&post.id).await.unwrap();
        assert!(event.is_none());
        let history = db.list_published("user-1", Network::Twitter).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].stats[0].impressions, 100);

        // A second pass finds nothing; the publish is not repeated
        let summary = sweeper.run_pass(now).await.unwrap();
        assert_eq!(summary.due, 0);
        assert_eq!(mock.publish_call_count(), 1);
    }

    #[tokio::test]
    async fn test_pass_ignores_future_items() {
        let (sweeper, db, mock) = sweeper_with_mock(Network::Twitter).await;
        let now = now_ms();

        db.upsert_credential(&credential("user-1", Network::Twitter, now + 60_000))
            .await
            .unwrap();
        let post = PendingPost::new("user-1", payload("later"), now + 60_000);
        enqueue_with_event(&db, &post).await;

        let summary = sweeper.run_pass(now).await.unwrap();
        assert_eq!(summary.due, 0);
        assert_eq!(mock.publish_call_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_credential_is_refreshed_and_persisted_before_publish() {
        let (sweeper, db, mock) = sweeper_with_mock(Network::Twitter).await;
        let now = now_ms();

        // Token expired well before now
        db.upsert_credential(&credential("user-1", Network::Twitter, now - 10_000))
            .await
            .unwrap();
        let post = PendingPost::new("user-1", payload("hello"), now - 1_000);
        enqueue_with_event(&db, &post).await;

        let summary = sweeper.run_pass(now).await.unwrap();
        assert_eq!(summary.published, 1);
        assert_eq!(mock.refresh_call_count(), 1);

        // Publish saw the refreshed token, not the stale one
        assert_eq!(mock.observed_tokens(), vec!["refreshed-refresh-1".to_string()]);

        // Rotated tokens were persisted
        let stored = db
            .get_credential("user-1", Network::Twitter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, "refreshed-refresh-1");
        assert_eq!(stored.refresh_token.as_deref(), Some("rotated-refresh-1"));
        assert!(stored.expires_at > now);
    }

    #[tokio::test]
    async fn test_valid_credential_is_not_refreshed() {
        let (sweeper, db, mock) = sweeper_with_mock(Network::Twitter).await;
        let now = now_ms();

        db.upsert_credential(&credential("user-1", Network::Twitter, now + 60_000))
            .await
            .unwrap();
        let post = PendingPost::new("user-1", payload("hello"), now - 1_000);
        enqueue_with_event(&db, &post).await;

        sweeper.run_pass(now).await.unwrap();
        assert_eq!(mock.refresh_call_count(), 0);
        assert_eq!(mock.observed_tokens(), vec!["access".to_string()]);
    }

    #[tokio::test]
    async fn test_revoked_authorization_skips_without_consuming_attempts() {
        let (sweeper, db, mock) = sweeper_with_mock(Network::Twitter).await;
        mock.set_failure(MockFailure::Refresh("revoked".to_string()));
        let now = now_ms();

        db.upsert_credential(&credential("user-1", Network::Twitter, now - 10_000))
            .await
            .unwrap();
        let post = PendingPost::new("user-1", payload("blocked"), now - 1_000);
        enqueue_with_event(&db, &post).await;

        let summary = sweeper.run_pass(now).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(mock.publish_call_count(), 0);

        // Item stays queued with no attempt recorded
        let stored = db.get_pending(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 0);
        assert_eq!(stored.status, PendingStatus::Pending);
    }

    #[tokio::test]
    async fn test_missing_credential_skips_item() {
        let (sweeper, db, mock) = sweeper_with_mock(Network::Twitter).await;
        let now = now_ms();

        let post = PendingPost::new("user-1", payload("orphan"), now - 1_000);
        enqueue_with_event(&db, &post).await;

        let summary = sweeper.run_pass(now).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(mock.publish_call_count(), 0);
        assert!(db.get_pending(&post.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_item_parks_at_cap() {
        let (sweeper, db, mock) = sweeper_with_mock(Network::Twitter).await;
        mock.set_failure(MockFailure::Publish("rejected".to_string()));
        let now = now_ms();

        db.upsert_credential(&credential("user-1", Network::Twitter, now + 60_000))
            .await
            .unwrap();
        let post = PendingPost::new("user-1", payload("flaky"), now - 1_000);
        enqueue_with_event(&db, &post).await;

        // max_attempts is 3 in the test harness
        for expected_attempts in 1..=3i64 {
            let summary = sweeper.run_pass(now).await.unwrap();
            assert_eq!(summary.failed, 1);
            let stored = db.get_pending(&post.id).await.unwrap().unwrap();
            assert_eq!(stored.attempts, expected_attempts);
        }

        let stored = db.get_pending(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PendingStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("Publish failed: rejected"));

        // Parked items are no longer swept
        let summary = sweeper.run_pass(now).await.unwrap();
        assert_eq!(summary.due, 0);
        assert_eq!(mock.publish_call_count(), 3);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_other_items() {
        let (sweeper, db, mock) = sweeper_with_mock(Network::Twitter).await;
        let now = now_ms();

        db.upsert_credential(&credential("user-1", Network::Twitter, now + 60_000))
            .await
            .unwrap();
        db.upsert_credential(&credential("user-2", Network::Twitter, now + 60_000))
            .await
            .unwrap();

        // Both publishes fail transiently in the first pass; a second pass
        // with the fault cleared delivers both
        let first = PendingPost::new("user-1", payload("first"), now - 2_000);
        let second = PendingPost::new("user-2", payload("second"), now - 1_000);
        enqueue_with_event(&db, &first).await;
        enqueue_with_event(&db, &second).await;

        mock.set_failure(MockFailure::Publish("over capacity".to_string()));
        let summary = sweeper.run_pass(now).await.unwrap();
        assert_eq!(summary.due, 2);
        assert_eq!(summary.failed, 2);

        mock.set_failure(MockFailure::None);
        let summary = sweeper.run_pass(now).await.unwrap();
        assert_eq!(summary.published, 2);
    }

    #[tokio::test]
    async fn test_partial_thread_parks_immediately() {
        let (sweeper, db, mock) = sweeper_with_mock(Network::Twitter).await;
        let now = now_ms();

        db.upsert_credential(&credential("user-1", Network::Twitter, now + 60_000))
            .await
            .unwrap();
        let post = PendingPost::new("user-1", payload("thread"), now - 1_000);
        enqueue_with_event(&db, &post).await;

        mock.set_failure(MockFailure::PartialThread {
            posted: 1,
            total: 3,
        });
        let summary = sweeper.run_pass(now).await.unwrap();
        assert_eq!(summary.failed, 1);

        // Retrying would repost the segments that already went out, so one
        // attempt parks the item even though the cap is 3
        let stored = db.get_pending(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PendingStatus::Failed);
        assert_eq!(stored.attempts, 1);
        assert!(stored.last_error.as_deref().unwrap_or("").contains("1/3"));

        mock.set_failure(MockFailure::None);
        let summary = sweeper.run_pass(now).await.unwrap();
        assert_eq!(summary.due, 0);
        assert_eq!(mock.publish_call_count(), 1);
    }

    #[tokio::test]
    async fn test_mixed_outcomes_in_one_pass() {
        let (sweeper, db, mock) = sweeper_with_mock(Network::Twitter).await;
        let now = now_ms();

        // user-1 has a credential; user-2 does not
        db.upsert_credential(&credential("user-1", Network::Twitter, now + 60_000))
            .await
            .unwrap();

        let ok = PendingPost::new("user-1", payload("goes out"), now - 2_000);
        let orphan = PendingPost::new("user-2", payload("stuck"), now - 1_000);
        enqueue_with_event(&db, &ok).await;
        enqueue_with_event(&db, &orphan).await;

        let summary = sweeper.run_pass(now).await.unwrap();
        assert_eq!(summary.due, 2);
        assert_eq!(summary.published, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(mock.publish_call_count(), 1);
    }
}
