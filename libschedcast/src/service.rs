//! Scheduling service
//!
//! The operations behind the user-facing surface: scheduling a post
//! (queue item plus its calendar event, created together), cancelling a
//! schedule (event plus any still-pending queue item), and reconciling a
//! remote deletion with the local history.

use crate::db::Database;
use crate::error::{Result, SchedcastError};
use crate::networks::Publisher;
use crate::oauth;
use crate::types::{
    now_ms, Credential, Event, PendingPost, PostPayload, Profile, ShareMediaCategory,
};

const TWITTER_SEGMENT_LIMIT: usize = 280;
const LINKEDIN_COMMENTARY_LIMIT: usize = 3000;
const YOUTUBE_TITLE_LIMIT: usize = 100;

/// Validate a payload before it is queued.
pub fn validate_payload(payload: &PostPayload) -> Result<()> {
    match payload {
        PostPayload::Twitter(p) => {
            if p.segments.is_empty() {
                return Err(SchedcastError::InvalidInput(
                    "Tweet must have at least one segment".to_string(),
                ));
            }
            for (i, segment) in p.segments.iter().enumerate() {
                if segment.trim().is_empty() {
                    return Err(SchedcastError::InvalidInput(format!(
                        "Tweet segment {} is empty",
                        i + 1
                    )));
                }
                if segment.chars().count() > TWITTER_SEGMENT_LIMIT {
                    return Err(SchedcastError::InvalidInput(format!(
                        "Tweet segment {} exceeds {} characters",
                        i + 1,
                        TWITTER_SEGMENT_LIMIT
                    )));
                }
            }
        }
        PostPayload::Linkedin(p) => {
            if p.commentary.chars().count() > LINKEDIN_COMMENTARY_LIMIT {
                return Err(SchedcastError::InvalidInput(format!(
                    "Commentary exceeds {} characters",
                    LINKEDIN_COMMENTARY_LIMIT
                )));
            }
            if p.commentary.trim().is_empty() && p.media.is_empty() {
                return Err(SchedcastError::InvalidInput(
                    "LinkedIn post needs commentary or media".to_string(),
                ));
            }
            if p.media_category != ShareMediaCategory::None && p.media.is_empty() {
                return Err(SchedcastError::InvalidInput(
                    "Media category set but no media given".to_string(),
                ));
            }
        }
        PostPayload::Youtube(p) => {
            if p.title.trim().is_empty() {
                return Err(SchedcastError::InvalidInput(
                    "Video title cannot be empty".to_string(),
                ));
            }
            if p.title.chars().count() > YOUTUBE_TITLE_LIMIT {
                return Err(SchedcastError::InvalidInput(format!(
                    "Video title exceeds {} characters",
                    YOUTUBE_TITLE_LIMIT
                )));
            }
            if p.media.asset.trim().is_empty() {
                return Err(SchedcastError::InvalidInput(
                    "Video media reference cannot be empty".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Queue a post for delivery and create its calendar event.
///
/// Both rows are written together; the event carries a back-reference to
/// the queue item so cancellation and finalization can find it.
pub async fn schedule_post(
    db: &Database,
    owner_id: &str,
    payload: PostPayload,
    due_at: i64,
) -> Result<(PendingPost, Event)> {
    validate_payload(&payload)?;

    if due_at <= 0 {
        return Err(SchedcastError::InvalidInput(
            "Due time must be a positive epoch-millisecond timestamp".to_string(),
        ));
    }

    db.ensure_user(owner_id).await?;

    let pending = PendingPost::new(owner_id, payload, due_at);
    let event = Event::for_pending(&pending);

    db.enqueue(&pending).await?;
    db.create_event(&event).await?;

    tracing::info!(
        pending_post_id = %pending.id,
        event_id = %event.id,
        network = %pending.network,
        due_at,
        "scheduled post"
    );

    Ok((pending, event))
}

/// Cancel a scheduled event.
///
/// Deleting an unposted event also removes the queue item it mirrors, so
/// the sweeper never delivers a cancelled post. Posted events are removed
/// from the calendar only; the published post is untouched.
pub async fn cancel_schedule(db: &Database, owner_id: &str, event_id: &str) -> Result<()> {
    let event = db
        .get_event(event_id)
        .await?
        .filter(|e| e.owner_id == owner_id)
        .ok_or_else(|| SchedcastError::NotFound(format!("event {}", event_id)))?;

    if !event.posted {
        if let Some(pending_id) = &event.pending_post_id {
            db.remove_pending(pending_id).await?;
        }
    }

    db.delete_event(event_id).await?;

    tracing::info!(event_id, posted = event.posted, "cancelled event");

    Ok(())
}

/// Finish connecting an account: consume the authorization attempt,
/// exchange the callback code for tokens, and store the credential.
///
/// The profile is fetched by the caller with the new access token before
/// the credential row is written.
pub async fn connect_account(
    db: &Database,
    publisher: &dyn Publisher,
    owner_id: &str,
    state: &str,
    code: &str,
    profile: Profile,
) -> Result<Credential> {
    let network = publisher.network();

    let verifier = oauth::complete_attempt(db, owner_id, network, state)
        .await?
        .ok_or_else(|| {
            SchedcastError::InvalidInput(
                "Authorization attempt expired or state did not match".to_string(),
            )
        })?;

    let grant = publisher.exchange_code(code, &verifier).await?;

    db.ensure_user(owner_id).await?;

    let credential = Credential::from_grant(owner_id, network, &grant, profile, now_ms());
    db.upsert_credential(&credential).await?;

    tracing::info!(owner_id, %network, "connected account");

    Ok(credential)
}

/// Disconnect an account: revoke the grant at the network, then drop the
/// stored credential. Revocation is best effort; a network that rejects
/// the call (token already dead, endpoint down) does not keep the
/// credential alive locally.
pub async fn disconnect_account(
    db: &Database,
    publisher: &dyn Publisher,
    owner_id: &str,
) -> Result<()> {
    let network = publisher.network();

    let credential = db
        .get_credential(owner_id, network)
        .await?
        .ok_or_else(|| {
            SchedcastError::NotFound(format!("credential for {} on {}", owner_id, network))
        })?;

    if let Err(e) = publisher.revoke(&credential.access_token).await {
        tracing::warn!(owner_id, %network, error = %e, "remote revoke failed");
    }

    db.delete_credential(owner_id, network).await?;

    tracing::info!(owner_id, %network, "disconnected account");

    Ok(())
}

/// Delete a published post on the network and drop it from the local
/// history. Returns whether the remote post still existed.
pub async fn record_remote_delete(
    db: &Database,
    publisher: &dyn Publisher,
    owner_id: &str,
    external_id: &str,
) -> Result<bool> {
    let network = publisher.network();

    let credential = db
        .get_credential(owner_id, network)
        .await?
        .ok_or_else(|| {
            SchedcastError::NotFound(format!("credential for {} on {}", owner_id, network))
        })?;

    let (credential, refreshed) = publisher
        .refresh_if_expired(&credential, crate::types::now_ms())
        .await?;
    if refreshed {
        db.update_tokens(
            owner_id,
            network,
            &credential.access_token,
            credential.refresh_token.as_deref(),
            credential.expires_at,
        )
        .await?;
    }

    let found = publisher.delete(&credential, external_id).await?;
    if !found {
        tracing::warn!(external_id, %network, "remote post was already gone");
    }

    // The history entry goes either way; a missing remote post should not
    // keep a stale row around
    db.remove_published(owner_id, network, external_id).await?;

    Ok(found)
}
