//! Cross-device login session state, held only in the ephemeral cache.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Session status. `Completed` is terminal: the session is deleted on the
/// first successful status read after completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QrStatus {
    Pending,
    Completed,
}

/// Claims reported by the external identity provider for a completed flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalClaims {
    pub subject: String,
    pub email: String,
}

/// Cached cross-device session, serialized as JSON into the ephemeral cache
/// with the session TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrAuthSession {
    pub session_id: String,
    pub tenant_id: Uuid,
    pub external_token: String,
    pub status: QrStatus,
}
