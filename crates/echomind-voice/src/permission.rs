//! Microphone permission gate.
//!
//! The host prompt itself is performed by the transport collaborator; this
//! type caches the last known answer, keeps at most one prompt in flight and
//! remembers why the prompt was issued so the answer can be applied later.

use crate::error::PermissionOutcome;
use crate::event::RequestId;
use echomind_types::PermissionState;
use tracing::{info, warn};

/// Why a permission prompt was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionIntent {
    /// Initial check after connecting; a grant may trigger the one-time auto-enable.
    Probe,
    /// The user asked for the floor; a grant should enable the microphone.
    EnableMicrophone,
}

/// A prompt awaiting the host's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPermission {
    pub request: RequestId,
    pub intent: PermissionIntent,
    /// Connection epoch the intent belongs to.
    pub epoch: u64,
}

#[derive(Debug, Default)]
pub struct PermissionGate {
    state: PermissionState,
    pending: Option<PendingPermission>,
    next_request: RequestId,
    advisory: Option<String>,
}

impl PermissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PermissionState {
        self.state
    }

    pub fn is_granted(&self) -> bool {
        self.state == PermissionState::Granted
    }

    /// Human-readable reason from the last denial, cleared by a later grant.
    pub fn advisory(&self) -> Option<&str> {
        self.advisory.as_deref()
    }

    pub fn pending(&self) -> Option<&PendingPermission> {
        self.pending.as_ref()
    }

    /// Starts a host prompt if one is needed.
    ///
    /// Returns the new request id when the caller must prompt the host. No
    /// prompt is needed when permission is already granted, or when one is
    /// already in flight; in the latter case an `EnableMicrophone` intent
    /// replaces a pending `Probe`.
    pub fn begin(&mut self, intent: PermissionIntent, epoch: u64) -> Option<RequestId> {
        if self.is_granted() {
            return None;
        }

        if let Some(pending) = self.pending.as_mut() {
            if intent == PermissionIntent::EnableMicrophone {
                pending.intent = intent;
                pending.epoch = epoch;
            }
            return None;
        }

        self.next_request += 1;
        let request = self.next_request;
        self.pending = Some(PendingPermission {
            request,
            intent,
            epoch,
        });
        info!(request, ?intent, "requesting microphone permission");
        Some(request)
    }

    /// Applies the host's answer.
    ///
    /// Returns the pending prompt it answered, or `None` when the answer does
    /// not belong to the prompt in flight.
    pub fn resolve(
        &mut self,
        request: RequestId,
        outcome: &PermissionOutcome,
        fallback_reason: &str,
    ) -> Option<PendingPermission> {
        match self.pending {
            Some(pending) if pending.request == request => {}
            _ => {
                warn!(request, "ignoring answer to a permission request that is not in flight");
                return None;
            }
        }
        let pending = self.pending.take();

        self.state = outcome.state();
        match outcome {
            PermissionOutcome::Granted => {
                info!(request, "microphone permission granted");
                self.advisory = None;
            }
            PermissionOutcome::Denied { reason } => {
                let reason = if reason.trim().is_empty() {
                    fallback_reason.to_string()
                } else {
                    reason.clone()
                };
                warn!(request, %reason, "microphone permission denied");
                self.advisory = Some(reason);
            }
        }

        pending
    }
}
