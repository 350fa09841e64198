//! Transport collaborator.
//!
//! The real-time room (media negotiation, data channel, host permission
//! prompts) lives outside this crate. The driver talks to it only through
//! [`Transport`] and receives its events as [`TransportEvent`](crate::event::TransportEvent)s.

use crate::error::{PermissionOutcome, TransportError};
use async_trait::async_trait;
use echomind_types::MediaKind;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Publishes or mutes the local microphone track.
    async fn set_local_microphone_enabled(&self, enabled: bool) -> Result<(), TransportError>;

    /// Sends a reliable data packet to the room.
    async fn publish_data(&self, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Shows the host's media permission prompt. Denial is an outcome, not an error.
    async fn request_media_permission(&self, kind: MediaKind) -> PermissionOutcome;
}
