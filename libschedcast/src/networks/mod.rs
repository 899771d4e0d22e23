//! Network abstraction and implementations
//!
//! This module provides a unified trait for delivering posts to the
//! supported social networks. Each implementation handles the network's
//! OAuth token lifecycle, publish call shape, and remote deletion.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::Config;
use crate::error::{NetworkError, Result};
use crate::types::{now_ms, Credential, Network, PostPayload, PublishResult, TokenGrant};

pub mod linkedin;
pub mod twitter;
pub mod youtube;

// Mock network is available for all builds (not just tests) to support
// integration tests
pub mod mock;

/// Publisher trait for unified network interactions
///
/// Implementations are stateless clients: credentials are passed per call
/// so one client can serve every connected user of that network.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// The network this publisher delivers to.
    fn network(&self) -> Network;

    /// Exchange an authorization code (plus its PKCE verifier) for tokens.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::AuthExpired` if the network rejects the code.
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenGrant>;

    /// Trade a refresh token for a fresh grant.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::AuthExpired` if the refresh token was revoked
    /// or has itself expired; the user must re-authorize.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant>;

    /// Deliver one payload using the given credential.
    ///
    /// The credential is assumed valid; callers refresh first via
    /// [`Publisher::refresh_if_expired`]. Returns the remote identifier of
    /// the created post (for multi-segment threads, the root).
    async fn publish(&self, credential: &Credential, payload: &PostPayload)
        -> Result<PublishResult>;

    /// Delete a previously published post.
    ///
    /// Returns `Ok(false)` when the remote post is already gone, so callers
    /// can treat deletion as idempotent.
    async fn delete(&self, credential: &Credential, external_id: &str) -> Result<bool>;

    /// Revoke a token at the network, invalidating the grant remotely.
    ///
    /// Called on disconnect before the stored credential is dropped.
    async fn revoke(&self, token: &str) -> Result<()>;

    /// Refresh the credential's tokens when the access token has expired.
    ///
    /// A credential that is still valid at `now_ms` is returned unchanged
    /// with no network call. The boolean reports whether a refresh happened,
    /// so callers know to persist the rotated tokens before using them.
    async fn refresh_if_expired(
        &self,
        credential: &Credential,
        now_ms: i64,
    ) -> Result<(Credential, bool)> {
        if !credential.is_expired(now_ms) {
            return Ok((credential.clone(), false));
        }

        let refresh = credential.refresh_token.as_deref().ok_or_else(|| {
            NetworkError::AuthExpired(format!(
                "{} access token expired and no refresh token is stored",
                self.network()
            ))
        })?;

        let grant = self.refresh_token(refresh).await?;

        let mut updated = credential.clone();
        updated.apply_grant(&grant, now_ms);

        Ok((updated, true))
    }
}

/// Instantiate a publisher for every network enabled in the configuration.
pub fn create_publishers(config: &Config) -> HashMap<Network, Box<dyn Publisher>> {
    let mut publishers: HashMap<Network, Box<dyn Publisher>> = HashMap::new();

    if let Some(app) = &config.twitter {
        if app.enabled {
            publishers.insert(
                Network::Twitter,
                Box::new(twitter::TwitterPublisher::new(app)),
            );
        }
    }

    if let Some(app) = &config.linkedin {
        if app.enabled {
            publishers.insert(
                Network::Linkedin,
                Box::new(linkedin::LinkedinPublisher::new(app)),
            );
        }
    }

    if let Some(app) = &config.youtube {
        if app.enabled {
            publishers.insert(
                Network::Youtube,
                Box::new(youtube::YoutubePublisher::new(app)),
            );
        }
    }

    publishers
}

/// Wire shape of the OAuth token endpoints all three networks share.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

impl From<TokenResponse> for TokenGrant {
    fn from(resp: TokenResponse) -> Self {
        TokenGrant {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_in: resp.expires_in,
        }
    }
}

/// Map a token-endpoint response to a grant, treating any rejection as an
/// expired authorization.
pub(crate) async fn grant_from_response(
    network: Network,
    response: reqwest::Response,
) -> Result<TokenGrant> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(NetworkError::AuthExpired(format!(
            "{} token endpoint returned {}: {}",
            network, status, body
        ))
        .into());
    }

    let parsed: TokenResponse = response
        .json()
        .await
        .map_err(|e| NetworkError::Http(format!("{} token response: {}", network, e)))?;

    Ok(parsed.into())
}

pub(crate) fn publish_timestamp() -> i64 {
    now_ms()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NetworkAppConfig, YoutubeAppConfig};
    use crate::types::Profile;

    fn app() -> NetworkAppConfig {
        NetworkAppConfig {
            enabled: true,
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            callback_url: "https://example.com/cb".to_string(),
        }
    }

    fn credential(expires_at: i64, refresh: Option<&str>) -> Credential {
        Credential {
            owner_id: "user-1".to_string(),
            network: Network::Twitter,
            access_token: "access".to_string(),
            refresh_token: refresh.map(String::from),
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

    #[test]
    fn test_create_publishers_respects_enabled_flags() {
        let mut config = Config::default_config();
        config.twitter = Some(app());
        config.linkedin = Some(NetworkAppConfig {
            enabled: false,
            ..app()
        });
        config.youtube = Some(YoutubeAppConfig {
            enabled: true,
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            callback_url: "https://example.com/cb".to_string(),
            media_base_url: "https://media.example.com/".to_string(),
        });

        let publishers = create_publishers(&config);
        assert!(publishers.contains_key(&Network::Twitter));
        assert!(!publishers.contains_key(&Network::Linkedin));
        assert!(publishers.contains_key(&Network::Youtube));
    }

    #[tokio::test]
    async fn test_refresh_if_expired_skips_valid_credential() {
        let publisher = mock::MockPublisher::new(Network::Twitter);
        let credential = credential(i64::MAX, Some("refresh"));

        let (returned, refreshed) = publisher
            .refresh_if_expired(&credential, 1_000)
            .await
            .unwrap();

        assert!(!refreshed);
        assert_eq!(returned.access_token, "access");
        assert_eq!(publisher.refresh_call_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_if_expired_rotates_tokens() {
        let publisher = mock::MockPublisher::new(Network::Twitter);
        let credential = credential(500, Some("refresh"));

        let (returned, refreshed) = publisher
            .refresh_if_expired(&credential, 1_000)
            .await
            .unwrap();

        assert!(refreshed);
        assert_ne!(returned.access_token, "access");
        assert!(returned.expires_at > 1_000);
        assert_eq!(publisher.refresh_call_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_if_expired_without_refresh_token() {
        let publisher = mock::MockPublisher::new(Network::Twitter);
        let credential = credential(500, None);

        let result = publisher.refresh_if_expired(&credential, 1_000).await;
        assert!(matches!(
            result,
            Err(crate::error::SchedcastError::Network(
                NetworkError::AuthExpired(_)
            ))
        ));
    }
}
