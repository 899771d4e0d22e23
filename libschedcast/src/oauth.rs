//! PKCE helpers for the OAuth authorization-code flow
//!
//! Each network connection starts with an authorization attempt: a random
//! state value plus a PKCE verifier/challenge pair. The attempt is persisted
//! with a short TTL and consumed exactly once when the callback arrives.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::db::Database;
use crate::error::Result;
use crate::types::{now_ms, Network, OAuthAttempt};

/// A PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

/// Generate a PKCE pair using the S256 challenge method.
pub fn generate_pkce() -> Pkce {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let verifier = URL_SAFE_NO_PAD.encode(bytes);

    let digest = Sha256::digest(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(digest);

    Pkce {
        verifier,
        challenge,
    }
}

/// Random opaque state value for CSRF protection.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Start an authorization attempt: generate state and PKCE material and
/// persist them. A prior unfinished attempt for the same network is
/// replaced. Returns the state and challenge to embed in the
/// authorization URL.
pub async fn begin_attempt(
    db: &Database,
    owner_id: &str,
    network: Network,
) -> Result<(String, String)> {
    let pkce = generate_pkce();
    let state = generate_state();

    db.put_oauth_attempt(&OAuthAttempt {
        owner_id: owner_id.to_string(),
        network,
        state: state.clone(),
        code_verifier: pkce.verifier,
        created_at: now_ms(),
    })
    .await?;

    Ok((state, pkce.challenge))
}

/// Consume the stored attempt for the callback. Returns the code verifier
/// only when an unexpired attempt exists and its state matches; the stored
/// attempt is gone afterwards either way.
pub async fn complete_attempt(
    db: &Database,
    owner_id: &str,
    network: Network,
    state: &str,
) -> Result<Option<String>> {
    let Some(attempt) = db.take_oauth_attempt(owner_id, network, now_ms()).await? else {
        return Ok(None);
    };

    if attempt.state != state {
        tracing::warn!(owner_id, %network, "oauth state mismatch");
        return Ok(None);
    }

    Ok(Some(attempt.code_verifier))
}
