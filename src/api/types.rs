//! Wire types for the control API.

use serde::{Deserialize, Serialize};

/// Outcome payload returned by the control endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Whether the operation was carried out.
    pub success: bool,
    /// Human-readable outcome description.
    pub message: String,
}

impl ControlResponse {
    /// A successful outcome.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// A failed outcome.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
