//! LinkedIn network implementation
//!
//! Tokens come from the OAuth2 authorization-code endpoint; posts go out
//! through the UGC posts API as member shares.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::NetworkAppConfig;
use crate::error::{NetworkError, Result};
use crate::networks::{grant_from_response, publish_timestamp, Publisher};
use crate::types::{
    Credential, LinkedinPayload, Network, PostPayload, PublishResult, ShareMediaCategory,
    TokenGrant,
};

const TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const REVOKE_URL: &str = "https://www.linkedin.com/oauth/v2/revoke";
const UGC_POSTS_URL: &str = "https://api.linkedin.com/v2/ugcPosts";

pub struct LinkedinPublisher {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    callback_url: String,
}

#[derive(Deserialize)]
struct UgcPostResponse {
    id: String,
}

fn category_name(category: ShareMediaCategory) -> &'static str {
    match category {
        ShareMediaCategory::None => "NONE",
        ShareMediaCategory::Article => "ARTICLE",
        ShareMediaCategory::Image => "IMAGE",
        ShareMediaCategory::Video => "VIDEO",
    }
}

fn share_content(payload: &LinkedinPayload) -> serde_json::Value {
    let mut content = json!({
        "shareCommentary": { "text": payload.commentary },
        "shareMediaCategory": category_name(payload.media_category),
    });

    if payload.media_category != ShareMediaCategory::None {
        let media: Vec<serde_json::Value> = payload
            .media
            .iter()
            .map(|m| {
                let mut entry = json!({ "status": "READY" });
                // Articles reference a URL; images and videos reference a
                // previously registered asset URN.
                if payload.media_category == ShareMediaCategory::Article {
                    entry["originalUrl"] = json!(m.asset);
                } else {
                    entry["media"] = json!(m.asset);
                }
                if let Some(title) = &m.title {
                    entry["title"] = json!({ "text": title });
                }
                if let Some(description) = &m.description {
                    entry["description"] = json!({ "text": description });
                }
                entry
            })
            .collect();
        content["media"] = json!(media);
    }

    content
}

impl LinkedinPublisher {
    pub fn new(app: &NetworkAppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: app.client_id.clone(),
            client_secret: app.client_secret.clone(),
            callback_url: app.callback_url.clone(),
        }
    }
}

#[async_trait]
impl Publisher for LinkedinPublisher {
    fn network(&self) -> Network {
        Network::Linkedin
    }

    async fn exchange_code(&self, code: &str, _verifier: &str) -> Result<TokenGrant> {
        // LinkedIn's token endpoint takes client credentials in the form
        // body and does not use PKCE
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.callback_url.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(NetworkError::from)?;

        grant_from_response(Network::Linkedin, response).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(NetworkError::from)?;

        grant_from_response(Network::Linkedin, response).await
    }

    async fn publish(
        &self,
        credential: &Credential,
        payload: &PostPayload,
    ) -> Result<PublishResult> {
        let PostPayload::Linkedin(share) = payload else {
            return Err(NetworkError::Publish(format!(
                "linkedin publisher given a {} payload",
                payload.network()
            ))
            .into());
        };

        let author = format!("urn:li:person:{}", credential.profile.external_id);
        let body = json!({
            "author": author,
            "lifecycleState": "PUBLISHED",
            "specificContent": {
                "com.linkedin.ugc.ShareContent": share_content(share),
            },
            "visibility": {
                "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC",
            },
        });

        let response = self
            .http
            .post(UGC_POSTS_URL)
            .bearer_auth(&credential.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&body)
            .send()
            .await
            .map_err(NetworkError::from)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(NetworkError::RateLimit("linkedin publish".to_string()).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Publish(format!(
                "linkedin returned {}: {}",
                status, body
            ))
            .into());
        }

        let parsed: UgcPostResponse = response
            .json()
            .await
            .map_err(|e| NetworkError::Http(format!("linkedin post response: {}", e)))?;

        Ok(PublishResult {
            external_id: parsed.id,
            canonical_text: share.commentary.clone(),
            published_at: publish_timestamp(),
        })
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        let response = self
            .http
            .post(REVOKE_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("token", token),
            ])
            .send()
            .await
            .map_err(NetworkError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Http(format!(
                "linkedin revoke returned {}: {}",
                status, body
            ))
            .into());
        }

        Ok(())
    }

    async fn delete(&self, credential: &Credential, external_id: &str) -> Result<bool> {
        // UGC post ids are URNs and must be percent-encoded in the path
        let encoded = external_id.replace(':', "%3A");

        let response = self
            .http
            .delete(format!("{}/{}", UGC_POSTS_URL, encoded))
            .bearer_auth(&credential.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .send()
            .await
            .map_err(NetworkError::from)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Publish(format!(
                "linkedin delete returned {}: {}",
                status, body
            ))
            .into());
        }

        Ok(true)
    }
}
