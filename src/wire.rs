// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

//! Wire shapes exchanged with the remote store.
//!
//! `PATCH /entity/{id}` carries a [`PatchRequest`] and an `Authorization`
//! header built from [`AuthContext`]; a successful reply is a [`PatchResponse`].

use crate::patch::Patch;
use crate::traits::Entity;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Request path for an entity.
pub fn entity_path(id: &str) -> String {
    format!("/entity/{}", id)
}

/// Credentials derived from the entity being updated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    token: Option<String>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn from_entity<T: Entity>(entity: &T) -> Self {
        Self {
            token: entity.auth_token(),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Value for the `Authorization` header, if there is a token.
    pub fn authorization_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub patch: Patch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: DeserializeOwned"))]
pub struct PatchResponse<T> {
    #[serde(default)]
    pub entity: Option<T>,
}
