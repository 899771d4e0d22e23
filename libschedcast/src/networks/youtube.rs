//! YouTube network implementation
//!
//! Tokens come from Google's OAuth2 endpoint. Publishing fetches the video
//! bytes from the external media store and streams them to the Data API's
//! multipart upload endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::YoutubeAppConfig;
use crate::error::{NetworkError, Result};
use crate::networks::{grant_from_response, publish_timestamp, Publisher};
use crate::types::{Credential, Network, PostPayload, PublishResult, TokenGrant, VideoKind};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?part=snippet,status&uploadType=multipart";
const VIDEOS_URL: &str = "https://www.googleapis.com/youtube/v3/videos";

pub struct YoutubePublisher {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    callback_url: String,
    media_base_url: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    id: String,
}

impl YoutubePublisher {
    pub fn new(app: &YoutubeAppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: app.client_id.clone(),
            client_secret: app.client_secret.clone(),
            callback_url: app.callback_url.clone(),
            media_base_url: app.media_base_url.clone(),
        }
    }

    fn media_url(&self, asset: &str) -> String {
        format!(
            "{}/{}",
            self.media_base_url.trim_end_matches('/'),
            asset.trim_start_matches('/')
        )
    }

    /// Download the video bytes from the media store.
    async fn fetch_media(&self, asset: &str) -> std::result::Result<Vec<u8>, NetworkError> {
        let url = self.media_url(asset);
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(NetworkError::Publish(format!(
                "media store returned {} for {}",
                response.status(),
                url
            )));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Publisher for YoutubePublisher {
    fn network(&self) -> Network {
        Network::Youtube
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenGrant> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.callback_url.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code_verifier", verifier),
            ])
            .send()
            .await
            .map_err(NetworkError::from)?;

        grant_from_response(Network::Youtube, response).await
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

        grant_from_response(Network::Youtube, response).await
    }

    async fn publish(
        &self,
        credential: &Credential,
        payload: &PostPayload,
    ) -> Result<PublishResult> {
        let PostPayload::Youtube(video) = payload else {
            return Err(NetworkError::Publish(format!(
                "youtube publisher given a {} payload",
                payload.network()
            ))
            .into());
        };

        let media = self.fetch_media(&video.media.asset).await?;

        // Shorts are ordinary uploads tagged in the title
        let title = match video.kind {
            VideoKind::Short if !video.title.contains("#Shorts") => {
                format!("{} #Shorts", video.title)
            }
            _ => video.title.clone(),
        };

        let metadata = json!({
            "snippet": {
                "title": title,
                "description": video.description,
            },
            "status": { "privacyStatus": "public" },
        });

        let form = reqwest::multipart::Form::new()
            .part(
                "metadata",
                reqwest::multipart::Part::text(metadata.to_string())
                    .mime_str("application/json")
                    .map_err(NetworkError::from)?,
            )
            .part(
                "media",
                reqwest::multipart::Part::bytes(media)
                    .mime_str("video/*")
                    .map_err(NetworkError::from)?,
            );

        let response = self
            .http
            .post(UPLOAD_URL)
            .bearer_auth(&credential.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(NetworkError::from)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(NetworkError::RateLimit("youtube upload".to_string()).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Publish(format!(
                "youtube returned {}: {}",
                status, body
            ))
            .into());
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| NetworkError::Http(format!("youtube upload response: {}", e)))?;

        Ok(PublishResult {
            external_id: parsed.id,
            canonical_text: video.title.clone(),
            published_at: publish_timestamp(),
        })
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        let response = self
            .http
            .post(REVOKE_URL)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(NetworkError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Http(format!(
                "youtube revoke returned {}: {}",
                status, body
            ))
            .into());
        }

        Ok(())
    }

    async fn delete(&self, credential: &Credential, external_id: &str) -> Result<bool> {
        let response = self
            .http
            .delete(VIDEOS_URL)
            .query(&[("id", external_id)])
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
            return Err(NetworkError::Publish(format!(
                "youtube delete returned {}: {}",
                status, body
            ))
            .into());
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::YoutubeAppConfig;

    fn publisher(base: &str) -> YoutubePublisher {
        YoutubePublisher::new(&YoutubeAppConfig {
            enabled: true,
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            callback_url: "https://example.com/cb".to_string(),
            media_base_url: base.to_string(),
        })
    }

    #[test]
    fn test_media_url_joins_without_double_slash() {
        let p = publisher("https://media.example.com/");
        assert_eq!(
            p.media_url("/uploads/clip.mp4"),
            "https://media.example.com/uploads/clip.mp4"
        );

        let p = publisher("https://media.example.com");
        assert_eq!(
            p.media_url("uploads/clip.mp4"),
            "https://media.example.com/uploads/clip.mp4"
        );
    }
}
