// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::traits::SyncError;

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Success => write!(f, "success"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl FromStr for Severity {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "success" => Ok(Severity::Success),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            _ => Err(SyncError::Serialization(format!("Unknown severity: {}", s))),
        }
    }
}

/// Lifecycle state of a single mutation attempt.
///
/// ```text
/// Idle -> Capturing -> OptimisticallyApplied -> AwaitingRemote -> Succeeded | RolledBack -> Settled
/// ```
///
/// `Capturing -> Succeeded` is the missing-operand short circuit and
/// `OptimisticallyApplied -> RolledBack` covers a diff that could not be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationState {
    Idle,
    Capturing,
    OptimisticallyApplied,
    AwaitingRemote,
    Succeeded,
    RolledBack,
    Settled,
}

impl MutationState {
    pub fn can_transition_to(self, next: MutationState) -> bool {
        use MutationState::*;
        matches!(
            (self, next),
            (Idle, Capturing)
                | (Capturing, OptimisticallyApplied)
                | (Capturing, Succeeded)
                | (OptimisticallyApplied, AwaitingRemote)
                | (OptimisticallyApplied, RolledBack)
                | (AwaitingRemote, Succeeded)
                | (AwaitingRemote, RolledBack)
                | (Succeeded, Settled)
                | (RolledBack, Settled)
        )
    }

    /// Succeeded or RolledBack.
    pub fn is_terminal(self) -> bool {
        matches!(self, MutationState::Succeeded | MutationState::RolledBack)
    }
}

impl fmt::Display for MutationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationState::Idle => write!(f, "Idle"),
            MutationState::Capturing => write!(f, "Capturing"),
            MutationState::OptimisticallyApplied => write!(f, "OptimisticallyApplied"),
            MutationState::AwaitingRemote => write!(f, "AwaitingRemote"),
            MutationState::Succeeded => write!(f, "Succeeded"),
            MutationState::RolledBack => write!(f, "RolledBack"),
            MutationState::Settled => write!(f, "Settled"),
        }
    }
}
