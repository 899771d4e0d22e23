//! Mock network implementation for testing
//!
//! A configurable publisher that can simulate successes, failures, partial
//! threads, and token refreshes. Integration tests use it to exercise the
//! sweeper without network credentials or live endpoints.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::{NetworkError, Result};
use crate::networks::Publisher;
use crate::types::{Credential, Network, PostPayload, PublishResult, TokenGrant};

/// Failure mode for the next publish calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    None,
    /// Every publish fails with `NetworkError::Publish`.
    Publish(String),
    /// Every publish fails with a partial thread after the given count.
    PartialThread { posted: usize, total: usize },
    /// Every refresh fails with `NetworkError::AuthExpired`.
    Refresh(String),
}

#[derive(Clone)]
struct MockState {
    failure: MockFailure,
    delete_result: bool,
    revoke_fails: bool,
    refresh_expires_in: i64,
    publish_calls: usize,
    refresh_calls: usize,
    delete_calls: usize,
    /// Access tokens observed by publish, in call order.
    observed_tokens: Vec<String>,
    published: Vec<PostPayload>,
    deleted_ids: Vec<String>,
    revoked_tokens: Vec<String>,
}

/// Mock publisher for testing. Clones share state, so tests can keep a
/// handle for assertions after handing the publisher to the sweeper.
#[derive(Clone)]
pub struct MockPublisher {
    network: Network,
    state: Arc<Mutex<MockState>>,
}

impl MockPublisher {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            state: Arc::new(Mutex::new(MockState {
                failure: MockFailure::None,
                delete_result: true,
                revoke_fails: false,
                refresh_expires_in: 7200,
                publish_calls: 0,
                refresh_calls: 0,
                delete_calls: 0,
                observed_tokens: Vec::new(),
                published: Vec::new(),
                deleted_ids: Vec::new(),
                revoked_tokens: Vec::new(),
            })),
        }
    }

    /// Create a mock whose publishes fail with the given message.
    pub fn publish_failure(network: Network, error: &str) -> Self {
        let mock = Self::new(network);
        mock.set_failure(MockFailure::Publish(error.to_string()));
        mock
    }

    /// Create a mock whose refreshes report a revoked authorization.
    pub fn refresh_failure(network: Network, error: &str) -> Self {
        let mock = Self::new(network);
        mock.set_failure(MockFailure::Refresh(error.to_string()));
        mock
    }

    pub fn set_failure(&self, failure: MockFailure) {
        self.state.lock().unwrap().failure = failure;
    }

    pub fn set_delete_result(&self, found: bool) {
        self.state.lock().unwrap().delete_result = found;
    }

    pub fn set_revoke_failure(&self, fails: bool) {
        self.state.lock().unwrap().revoke_fails = fails;
    }

    pub fn publish_call_count(&self) -> usize {
        self.state.lock().unwrap().publish_calls
    }

    pub fn refresh_call_count(&self) -> usize {
        self.state.lock().unwrap().refresh_calls
    }

    pub fn delete_call_count(&self) -> usize {
        self.state.lock().unwrap().delete_calls
    }

    /// Access tokens seen by publish, in call order.
    pub fn observed_tokens(&self) -> Vec<String> {
        self.state.lock().unwrap().observed_tokens.clone()
    }

    /// Payloads successfully published.
    pub fn published(&self) -> Vec<PostPayload> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_ids.clone()
    }

    /// Tokens revoked at the network, in call order.
    pub fn revoked_tokens(&self) -> Vec<String> {
        self.state.lock().unwrap().revoked_tokens.clone()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn network(&self) -> Network {
        self.network
    }

    async fn exchange_code(&self, code: &str, _verifier: &str) -> Result<TokenGrant> {
        Ok(TokenGrant {
            access_token: format!("mock-access-{}", code),
            refresh_token: Some(format!("mock-refresh-{}", code)),
            expires_in: self.state.lock().unwrap().refresh_expires_in,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        let mut state = self.state.lock().unwrap();
        state.refresh_calls += 1;

        if let MockFailure::Refresh(message) = &state.failure {
            return Err(NetworkError::AuthExpired(message.clone()).into());
        }

        let n = state.refresh_calls;
        Ok(TokenGrant {
            access_token: format!("refreshed-{}-{}", refresh_token, n),
            refresh_token: Some(format!("rotated-{}-{}", refresh_token, n)),
            expires_in: state.refresh_expires_in,
        })
    }

    async fn publish(
        &self,
        credential: &Credential,
        payload: &PostPayload,
    ) -> Result<PublishResult> {
        let mut state = self.state.lock().unwrap();
        state.publish_calls += 1;
        state.observed_tokens.push(credential.access_token.clone());

        match &state.failure {
            MockFailure::Publish(message) => {
                return Err(NetworkError::Publish(message.clone()).into());
            }
            MockFailure::PartialThread { posted, total } => {
                return Err(NetworkError::PartialThread {
                    root_id: Some(format!("{}:mock-root", self.network)),
                    posted: *posted,
                    total: *total,
                    message: "mock segment rejected".to_string(),
                }
                .into());
            }
            _ => {}
        }

        state.published.push(payload.clone());

        Ok(PublishResult {
            external_id: format!("{}:mock-{}", self.network, uuid::Uuid::new_v4()),
            canonical_text: payload.summary(),
            published_at: crate::types::now_ms(),
        })
    }

    async fn delete(&self, _credential: &Credential, external_id: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls += 1;
        state.deleted_ids.push(external_id.to_string());
        Ok(state.delete_result)
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.revoked_tokens.push(token.to_string());

        if state.revoke_fails {
            return Err(NetworkError::Http("mock revoke rejected".to_string()).into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Profile, TwitterPayload};

    fn credential(token: &str) -> Credential {
        Credential {
            owner_id: "user-1".to_string(),
            network: Network::Twitter,
            access_token: token.to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: i64::MAX,
            profile: Profile {
                external_id: "ext".to_string(),
                display_name: "name".to_string(),
                avatar_url: None,
                followers: vec![],
            },
            connected_at: 0,
        }
    }

    fn payload() -> PostPayload {
        PostPayload::Twitter(TwitterPayload {
            segments: vec!["hello".to_string()],
        })
    }

    #[tokio::test]
    async fn test_mock_publish_records_token_and_payload() {
        let mock = MockPublisher::new(Network::Twitter);

        let result = mock.publish(&credential("tok-1"), &payload()).await.unwrap();
        assert!(result.external_id.starts_with("twitter:mock-"));
        assert_eq!(result.canonical_text, "hello");

        assert_eq!(mock.publish_call_count(), 1);
        assert_eq!(mock.observed_tokens(), vec!["tok-1".to_string()]);
        assert_eq!(mock.published().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_publish_failure() {
        let mock = MockPublisher::publish_failure(Network::Twitter, "boom");

        let result = mock.publish(&credential("tok"), &payload()).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("boom"));
        assert_eq!(mock.publish_call_count(), 1);
        assert!(mock.published().is_empty());
    }

    #[tokio::test]
    async fn test_mock_partial_thread_failure() {
        let mock = MockPublisher::new(Network::Twitter);
        mock.set_failure(MockFailure::PartialThread {
            posted: 2,
            total: 3,
        });

        let err = mock
            .publish(&credential("tok"), &payload())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("2/3"));
    }

    #[tokio::test]
    async fn test_mock_refresh_rotates_tokens() {
        let mock = MockPublisher::new(Network::Twitter);

        let grant = mock.refresh_token("old-refresh").await.unwrap();
        assert_eq!(grant.access_token, "refreshed-old-refresh-1");
        assert_eq!(grant.refresh_token.as_deref(), Some("rotated-old-refresh-1"));
        assert_eq!(mock.refresh_call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_refresh_failure() {
        let mock = MockPublisher::refresh_failure(Network::Twitter, "revoked");

        let result = mock.refresh_token("refresh").await;
        assert!(matches!(
            result,
            Err(crate::error::SchedcastError::Network(
                NetworkError::AuthExpired(_)
            ))
        ));
    }

    #[tokio::test]
    async fn test_mock_revoke() {
        let mock = MockPublisher::new(Network::Twitter);

        mock.revoke("tok-1").await.unwrap();
        assert_eq!(mock.revoked_tokens(), vec!["tok-1"]);

        mock.set_revoke_failure(true);
        assert!(mock.revoke("tok-2").await.is_err());
        assert_eq!(mock.revoked_tokens(), vec!["tok-1", "tok-2"]);
    }

    #[tokio::test]
    async fn test_mock_delete() {
        let mock = MockPublisher::new(Network::Twitter);

        assert!(mock.delete(&credential("tok"), "post-1").await.unwrap());

        mock.set_delete_result(false);
        assert!(!mock.delete(&credential("tok"), "post-2").await.unwrap());

        assert_eq!(mock.deleted_ids(), vec!["post-1", "post-2"]);
    }
}
