//! Core types for Schedcast

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current wall-clock time in epoch milliseconds.
///
/// Due times, token expirations, and history timestamps are all epoch ms.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A social network a user can connect and publish to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Twitter,
    Linkedin,
    Youtube,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Twitter => "twitter",
            Network::Linkedin => "linkedin",
            Network::Youtube => "youtube",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "twitter" => Some(Network::Twitter),
            "linkedin" => Some(Network::Linkedin),
            "youtube" => Some(Network::Youtube),
            _ => None,
        }
    }

    /// Calendar border color for events on this network.
    pub fn border_color(&self) -> &'static str {
        match self {
            Network::Twitter => "#1DA1F2",
            Network::Linkedin => "#0A66C2",
            Network::Youtube => "#FF0000",
        }
    }

    pub fn all() -> [Network; 3] {
        [Network::Twitter, Network::Linkedin, Network::Youtube]
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Network::from_str_opt(s).ok_or_else(|| {
            format!(
                "Unknown network: '{}'. Valid options: twitter, linkedin, youtube",
                s
            )
        })
    }
}

/// Opaque reference into the external media store.
///
/// LinkedIn assets are pre-uploaded URNs; YouTube media is a storage key the
/// publisher resolves against the configured media base URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaRef {
    pub asset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MediaRef {
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            title: None,
            description: None,
        }
    }
}

/// Twitter content: ordered text segments. One segment publishes as a single
/// post; several publish as a linked thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TwitterPayload {
    pub segments: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShareMediaCategory {
    None,
    Article,
    Image,
    Video,
}

/// LinkedIn content: commentary plus zero or more pre-uploaded media assets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkedinPayload {
    pub commentary: String,
    pub media_category: ShareMediaCategory,
    #[serde(default)]
    pub media: Vec<MediaRef>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoKind {
    Video,
    Short,
}

/// YouTube content: one media reference plus its metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct YoutubePayload {
    pub title: String,
    pub description: String,
    pub kind: VideoKind,
    pub media: MediaRef,
}

/// Network-specific post content, dispatched by the `network` tag.
///
/// The tagged union keeps the publisher capability set exhaustively checked:
/// adding a network without a payload variant (or vice versa) fails to
/// compile at the match sites.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "network", rename_all = "lowercase")]
pub enum PostPayload {
    Twitter(TwitterPayload),
    Linkedin(LinkedinPayload),
    Youtube(YoutubePayload),
}

impl PostPayload {
    pub fn network(&self) -> Network {
        match self {
            PostPayload::Twitter(_) => Network::Twitter,
            PostPayload::Linkedin(_) => Network::Linkedin,
            PostPayload::Youtube(_) => Network::Youtube,
        }
    }

    /// Short display text for the calendar event mirroring this payload.
    pub fn summary(&self) -> String {
        match self {
            PostPayload::Twitter(p) => p
                .segments
                .first()
                .cloned()
                .unwrap_or_else(|| "Twitter post".to_string()),
            PostPayload::Linkedin(p) => {
                if p.commentary.is_empty() {
                    "LinkedIn post, just media".to_string()
                } else {
                    p.commentary.clone()
                }
            }
            PostPayload::Youtube(p) => p.title.clone(),
        }
    }
}

/// Status of a queue item. Items start pending; the bounded-retry policy
/// moves repeatedly failing items to a terminal failed state instead of
/// leaving them queued forever.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    Pending,
    Failed,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::Pending => "pending",
            PendingStatus::Failed => "failed",
        }
    }
}

/// A scheduled-but-unpublished post. Consumed exactly once, by successful
/// publish or by explicit cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPost {
    pub id: String,
    pub owner_id: String,
    pub network: Network,
    /// Due time in epoch ms; eligible once due_at <= now.
    pub due_at: i64,
    pub payload: PostPayload,
    pub status: PendingStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
}

impl PendingPost {
    pub fn new(owner_id: impl Into<String>, payload: PostPayload, due_at: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            network: payload.network(),
            due_at,
            payload,
            status: PendingStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now_ms(),
        }
    }
}

/// A user-visible calendar entry mirroring a queue item and its terminal
/// state. `pending_post_id` is cleared once the queue item is consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub owner_id: String,
    pub network: Network,
    pub pending_post_id: Option<String>,
    pub scheduled_at: i64,
    pub summary: String,
    pub border_color: String,
    pub posted: bool,
}

impl Event {
    /// Create the pending event matching a freshly enqueued post.
    pub fn for_pending(pending: &PendingPost) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: pending.owner_id.clone(),
            network: pending.network,
            pending_post_id: Some(pending.id.clone()),
            scheduled_at: pending.due_at,
            summary: pending.payload.summary(),
            border_color: pending.network.border_color().to_string(),
            posted: false,
        }
    }
}

/// A follower-count sample taken at connect time or on later profile syncs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FollowerSample {
    pub date: i64,
    pub count: i64,
}

/// Profile snapshot captured when the account was connected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub external_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub followers: Vec<FollowerSample>,
}

/// Per-network, per-user OAuth credential.
///
/// Only the sweeper mutates the token fields; user-facing reads tolerate
/// eventually-consistent tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub owner_id: String,
    pub network: Network,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Expiry in epoch ms. Expired credentials must be refreshed before use.
    pub expires_at: i64,
    pub profile: Profile,
    pub connected_at: i64,
}

impl Credential {
    /// Build the credential stored when an account is first connected,
    /// from the code-exchange grant and the profile fetched with it.
    pub fn from_grant(
        owner_id: impl Into<String>,
        network: Network,
        grant: &TokenGrant,
        profile: Profile,
        now_ms: i64,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            network,
            access_token: grant.access_token.clone(),
            refresh_token: grant.refresh_token.clone(),
            expires_at: now_ms + grant.expires_in * 1000,
            profile,
            connected_at: now_ms,
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }

    /// Apply a token grant from a refresh or code exchange. Networks that do
    /// not rotate refresh tokens return None and the old one is kept.
    pub fn apply_grant(&mut self, grant: &TokenGrant, now_ms: i64) {
        self.access_token = grant.access_token.clone();
        if grant.refresh_token.is_some() {
            self.refresh_token = grant.refresh_token.clone();
        }
        self.expires_at = now_ms + grant.expires_in * 1000;
    }
}

/// Tokens returned by a network's OAuth token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, as reported by the endpoint.
    pub expires_in: i64,
}

/// Engagement numbers attached to a published post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngagementStats {
    pub date: i64,
    pub impressions: i64,
    pub comments: i64,
    pub likes: i64,
}

/// One entry in a credential's publish history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedPost {
    pub external_id: String,
    pub content: String,
    pub published_at: i64,
    #[serde(default)]
    pub stats: Vec<EngagementStats>,
}

/// Outcome of a successful publish call.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishResult {
    /// Network-side id; for a thread, the id of the root post.
    pub external_id: String,
    pub canonical_text: String,
    pub published_at: i64,
}

/// Lifetime of a persisted OAuth attempt, matching the short consent window.
pub const OAUTH_ATTEMPT_TTL_MS: i64 = 120_000;

/// Short-lived PKCE state for one authorization attempt, keyed by
/// (owner, network) so concurrent attempts by one user replace each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthAttempt {
    pub owner_id: String,
    pub network: Network,
    pub state: String,
    pub code_verifier: String,
    pub created_at: i64,
}

impl OAuthAttempt {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms - self.created_at > OAUTH_ATTEMPT_TTL_MS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn twitter_payload(segments: &[&str]) -> PostPayload {
        PostPayload::Twitter(TwitterPayload {
            segments: segments.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn test_network_round_trip() {
        for network in Network::all() {
            let parsed: Network = network.as_str().parse().unwrap();
            assert_eq!(parsed, network);
        }
        assert!("facebook".parse::<Network>().is_err());
    }

    #[test]
    fn test_network_border_colors() {
        assert_eq!(Network::Twitter.border_color(), "#1DA1F2");
        assert_eq!(Network::Linkedin.border_color(), "#0A66C2");
        assert_eq!(Network::Youtube.border_color(), "#FF0000");
    }

    #[test]
    fn test_payload_network_dispatch() {
        assert_eq!(twitter_payload(&["hi"]).network(), Network::Twitter);

        let linkedin = PostPayload::Linkedin(LinkedinPayload {
            commentary: "hello".to_string(),
            media_category: ShareMediaCategory::None,
            media: vec![],
        });
        assert_eq!(linkedin.network(), Network::Linkedin);

        let youtube = PostPayload::Youtube(YoutubePayload {
            title: "My video".to_string(),
            description: String::new(),
            kind: VideoKind::Video,
            media: MediaRef::new("videos/abc"),
        });
        assert_eq!(youtube.network(), Network::Youtube);
    }

    #[test]
    fn test_payload_serde_tagging() {
        let payload = twitter_payload(&["one", "two"]);
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains(r#""network":"twitter""#));

        let back: PostPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_payload_summary() {
        assert_eq!(twitter_payload(&["first", "second"]).summary(), "first");

        let linkedin = PostPayload::Linkedin(LinkedinPayload {
            commentary: String::new(),
            media_category: ShareMediaCategory::Image,
            media: vec![MediaRef::new("urn:li:digitalmediaAsset:1")],
        });
        assert_eq!(linkedin.summary(), "LinkedIn post, just media");

        let youtube = PostPayload::Youtube(YoutubePayload {
            title: "Launch day".to_string(),
            description: "notes".to_string(),
            kind: VideoKind::Short,
            media: MediaRef::new("videos/launch"),
        });
        assert_eq!(youtube.summary(), "Launch day");
    }

    #[test]
    fn test_pending_post_new_defaults() {
        let due = now_ms() + 60_000;
        let post = PendingPost::new("user-1", twitter_payload(&["hi"]), due);

        assert!(Uuid::parse_str(&post.id).is_ok());
        assert_eq!(post.owner_id, "user-1");
        assert_eq!(post.network, Network::Twitter);
        assert_eq!(post.due_at, due);
        assert_eq!(post.status, PendingStatus::Pending);
        assert_eq!(post.attempts, 0);
        assert!(post.last_error.is_none());
    }

    #[test]
    fn test_event_for_pending() {
        let post = PendingPost::new("user-1", twitter_payload(&["thread root", "reply"]), 42);
        let event = Event::for_pending(&post);

        assert_eq!(event.owner_id, post.owner_id);
        assert_eq!(event.network, Network::Twitter);
        assert_eq!(event.pending_post_id.as_deref(), Some(post.id.as_str()));
        assert_eq!(event.scheduled_at, 42);
        assert_eq!(event.summary, "thread root");
        assert_eq!(event.border_color, "#1DA1F2");
        assert!(!event.posted);
    }

    #[test]
    fn test_credential_expiry() {
        let credential = Credential {
            owner_id: "user-1".to_string(),
            network: Network::Twitter,
            access_token: "tok".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: 1_000,
            profile: Profile {
                external_id: "42".to_string(),
                display_name: "someone".to_string(),
                avatar_url: None,
                followers: vec![],
            },
            connected_at: 0,
        };

        assert!(!credential.is_expired(999));
        assert!(credential.is_expired(1_000));
        assert!(credential.is_expired(2_000));
    }

    #[test]
    fn test_apply_grant_keeps_old_refresh_token_when_absent() {
        let mut credential = Credential {
            owner_id: "user-1".to_string(),
            network: Network::Linkedin,
            access_token: "old-access".to_string(),
            refresh_token: Some("old-refresh".to_string()),
            expires_at: 0,
            profile: Profile {
                external_id: "li-1".to_string(),
                display_name: "someone".to_string(),
                avatar_url: None,
                followers: vec![],
            },
            connected_at: 0,
        };

        credential.apply_grant(
            &TokenGrant {
                access_token: "new-access".to_string(),
                refresh_token: None,
                expires_in: 3600,
            },
            1_000,
        );

        assert_eq!(credential.access_token, "new-access");
        assert_eq!(credential.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(credential.expires_at, 1_000 + 3600 * 1000);
    }

    #[test]
    fn test_apply_grant_rotates_refresh_token() {
        let mut credential = Credential {
            owner_id: "user-1".to_string(),
            network: Network::Twitter,
            access_token: "old".to_string(),
            refresh_token: Some("old-refresh".to_string()),
            expires_at: 0,
            profile: Profile {
                external_id: "tw-1".to_string(),
                display_name: "someone".to_string(),
                avatar_url: None,
                followers: vec![],
            },
            connected_at: 0,
        };

        credential.apply_grant(
            &TokenGrant {
                access_token: "new".to_string(),
                refresh_token: Some("new-refresh".to_string()),
                expires_in: 7200,
            },
            0,
        );

        assert_eq!(credential.refresh_token.as_deref(), Some("new-refresh"));
    }

    #[test]
    fn test_oauth_attempt_ttl() {
        let attempt = OAuthAttempt {
            owner_id: "user-1".to_string(),
            network: Network::Twitter,
            state: "state".to_string(),
            code_verifier: "verifier".to_string(),
            created_at: 0,
        };

        assert!(!attempt.is_expired(OAUTH_ATTEMPT_TTL_MS));
        assert!(attempt.is_expired(OAUTH_ATTEMPT_TTL_MS + 1));
    }

    #[test]
    fn test_published_post_serialization() {
        let post = PublishedPost {
            external_id: "179".to_string(),
            content: "hello".to_string(),
            published_at: 123,
            stats: vec![EngagementStats {
                date: 123,
                impressions: 500,
                comments: 50,
                likes: 100,
            }],
        };

        let json = serde_json::to_string(&post).unwrap();
        let back: PublishedPost = serde_json::from_str(&json).unwrap();
        assert_eq!(back.external_id, post.external_id);
        assert_eq!(back.stats, post.stats);
    }
}
