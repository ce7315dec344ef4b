// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

//! Configuration for the mutation coordinator.

use crate::enums::Severity;
use crate::traits::SyncError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Title reported when the remote store returns the updated entity.
    pub success_title: String,
    /// Title reported when a failed update was rolled back.
    pub rollback_title: String,
    /// Title reported when an update failed after a newer mutation replaced its value.
    pub superseded_title: String,
    /// Severity of both failure notifications.
    pub rollback_severity: Severity,
    /// Leave the cache alone when a failed attempt's optimistic value has
    /// already been replaced by another write to the same key. When false the
    /// snapshot is always restored (last write wins).
    pub skip_superseded_rollback: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            success_title: "Entity updated!".to_string(),
            rollback_title: "Update failed; restoring previous values".to_string(),
            superseded_title: "Update failed; a newer change is pending".to_string(),
            rollback_severity: Severity::Warning,
            skip_superseded_rollback: true,
        }
    }
}

impl CoordinatorConfig {
    /// Parses a JSON object; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, SyncError> {
        serde_json::from_str(json).map_err(|e| SyncError::Serialization(e.to_string()))
    }
}
