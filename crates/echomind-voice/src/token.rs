//! LiveKit join-token issuance.

use crate::config::LiveKitConfig;
use crate::error::SessionError;
use livekit_api::access_token::{AccessToken, VideoGrants};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Credentials handed to a client so it can join its room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinToken {
    pub identity: String,
    pub access_token: String,
    pub room_name: String,
}

/// Random ASCII letters and digits.
pub fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// `room-XXXX-XXXX-<suffix>`.
pub fn generate_room_name(suffix: &str) -> String {
    format!(
        "room-{}-{}-{}",
        random_alphanumeric(4),
        random_alphanumeric(4),
        suffix
    )
}

/// `identity-XXXX`.
pub fn generate_identity() -> String {
    format!("identity-{}", random_alphanumeric(4))
}

#[derive(Debug, Clone)]
pub struct TokenIssuer {
    config: LiveKitConfig,
}

impl TokenIssuer {
    pub fn new(config: LiveKitConfig) -> Self {
        Self { config }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn is_configured(&self) -> bool {
        self.config.has_credentials()
    }

    /// Issues a token for a fresh room and identity.
    ///
    /// Metadata that is not a JSON object is replaced by `{}`.
    pub fn issue(&self, metadata: &Value) -> Result<JoinToken, SessionError> {
        let room_name = generate_room_name(&self.config.room_suffix);
        let identity = generate_identity();

        let metadata = match metadata {
            Value::Object(map) => {
                if map.is_empty() {
                    warn!(identity = %identity, "issuing join token with empty metadata");
                }
                metadata.clone()
            }
            other => {
                warn!(identity = %identity, kind = ?other, "join metadata is not an object, ignoring it");
                Value::Object(serde_json::Map::new())
            }
        };

        let access_token = self.sign(&room_name, &identity, &metadata.to_string())?;
        debug!(room = %room_name, identity = %identity, "issued join token");

        Ok(JoinToken {
            identity,
            access_token,
            room_name,
        })
    }

    /// Signs a token that lets `identity` join, publish, publish data and
    /// subscribe in `room_name`.
    pub fn sign(
        &self,
        room_name: &str,
        identity: &str,
        metadata: &str,
    ) -> Result<String, SessionError> {
        if !self.is_configured() {
            return Err(SessionError::Config(
                "LiveKit API key and secret must be set".to_string(),
            ));
        }

        let token = AccessToken::with_api_key(&self.config.api_key, &self.config.api_secret)
            .with_identity(identity)
            .with_metadata(metadata)
            .with_grants(VideoGrants {
                room_join: true,
                room: room_name.to_string(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .with_ttl(Duration::from_secs(self.config.token_ttl_seconds));

        Ok(token.to_jwt()?)
    }
}
