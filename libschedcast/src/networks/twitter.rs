//! Twitter network implementation
//!
//! Uses the v2 API: OAuth2 authorization-code flow with PKCE for tokens,
//! `POST /2/tweets` for publishing (threads are posted as reply chains),
//! and `DELETE /2/tweets/:id` for removal.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::NetworkAppConfig;
use crate::error::{NetworkError, Result};
use crate::networks::{grant_from_response, publish_timestamp, Publisher};
use crate::types::{Credential, Network, PostPayload, PublishResult, TokenGrant};

const TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";
const REVOKE_URL: &str = "https://api.twitter.com/2/oauth2/revoke";
const TWEETS_URL: &str = "https://api.twitter.com/2/tweets";

pub struct TwitterPublisher {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    callback_url: String,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

#[derive(Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct DeleteData {
    deleted: bool,
}

#[derive(Deserialize)]
struct DeleteResponse {
    data: DeleteData,
}

impl TwitterPublisher {
    pub fn new(app: &NetworkAppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: app.client_id.clone(),
            client_secret: app.client_secret.clone(),
            callback_url: app.callback_url.clone(),
        }
    }

    /// Post one tweet, optionally as a reply to a previous segment.
    async fn post_segment(
        &self,
        access_token: &str,
        text: &str,
        in_reply_to: Option<&str>,
    ) -> std::result::Result<String, NetworkError> {
        let mut body = json!({ "text": text });
        if let Some(parent) = in_reply_to {
            body["reply"] = json!({ "in_reply_to_tweet_id": parent });
        }

        let response = self
            .http
            .post(TWEETS_URL)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(NetworkError::RateLimit("twitter publish".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Publish(format!(
                "twitter returned {}: {}",
                status, body
            )));
        }

        let parsed: TweetResponse = response
            .json()
            .await
            .map_err(|e| NetworkError::Http(format!("twitter tweet response: {}", e)))?;

        Ok(parsed.data.id)
    }
}

#[async_trait]
impl Publisher for TwitterPublisher {
    fn network(&self) -> Network {
        Network::Twitter
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenGrant> {
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.callback_url.as_str()),
                ("code_verifier", verifier),
            ])
            .send()
            .await
            .map_err(NetworkError::from)?;

        grant_from_response(Network::Twitter, response).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(NetworkError::from)?;

        grant_from_response(Network::Twitter, response).await
    }

    async fn publish(
        &self,
        credential: &Credential,
        payload: &PostPayload,
    ) -> Result<PublishResult> {
        let PostPayload::Twitter(tweet) = payload else {
            return Err(NetworkError::Publish(format!(
                "twitter publisher given a {} payload",
                payload.network()
            ))
            .into());
        };

        if tweet.segments.is_empty() {
            return Err(NetworkError::Publish("empty tweet thread".to_string()).into());
        }

        // Segments form a reply chain rooted at the first tweet. A failure
        // after the root has posted is reported as a partial thread so the
        // orphaned tweets can be located.
        let mut root_id: Option<String> = None;
        let mut previous_id: Option<String> = None;

        for (index, segment) in tweet.segments.iter().enumerate() {
            match self
                .post_segment(&credential.access_token, segment, previous_id.as_deref())
                .await
            {
                Ok(id) => {
                    if root_id.is_none() {
                        root_id = Some(id.clone());
                    }
                    previous_id = Some(id);
                }
                Err(err) if index > 0 => {
                    return Err(NetworkError::PartialThread {
                        root_id,
                        posted: index,
                        total: tweet.segments.len(),
                        message: err.to_string(),
                    }
                    .into());
                }
                Err(err) => return Err(err.into()),
            }
        }

        // Non-empty segments guarantee root_id is set here
        let external_id = root_id.ok_or_else(|| {
            NetworkError::Publish("thread posted without a root id".to_string())
        })?;

        Ok(PublishResult {
            external_id,
            canonical_text: tweet.segments[0].clone(),
            published_at: publish_timestamp(),
        })
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        let response = self
            .http
            .post(REVOKE_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", token), ("token_type_hint", "access_token")])
            .send()
            .await
            .map_err(NetworkError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Http(format!(
                "twitter revoke returned {}: {}",
                status, body
            ))
            .into());
        }

        Ok(())
    }

    async fn delete(&self, credential: &Credential, external_id: &str) -> Result<bool> {
        let response = self
            .http
            .delete(format!("{}/{}", TWEETS_URL, external_id))
            .bearer_auth(&credential.access_token)
            .send()
            .await
            .map_err(NetworkError::from)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                NetworkError::Publish(format!("twitter delete returned {}: {}", status, body))
                    .into(),
            );
        }

        let parsed: DeleteResponse = response
            .json()
            .await
            .map_err(|e| NetworkError::Http(format!("twitter delete response: {}", e)))?;

        Ok(parsed.data.deleted)
    }
}
