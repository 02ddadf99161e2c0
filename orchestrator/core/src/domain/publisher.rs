// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Whether a platform failure can be fixed by trying again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishErrorKind {
    /// Token expired, permission revoked, account disconnected. Needs a human.
    Credential,
    Transient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformResult {
    pub success: bool,
    pub post_id: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<PublishErrorKind>,
}

impl PlatformResult {
    pub fn ok(post_id: impl Into<String>) -> Self {
        Self {
            success: true,
            post_id: Some(post_id.into()),
            error: None,
            error_kind: None,
        }
    }

    pub fn failed(error: impl Into<String>, kind: PublishErrorKind) -> Self {
        Self {
            success: false,
            post_id: None,
            error: Some(error.into()),
            error_kind: Some(kind),
        }
    }
}

/// Raw per-platform publishing. Implementations never fail as a whole; every
/// requested platform gets a [`PlatformResult`].
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        platforms: &BTreeSet<String>,
        media_ref: &str,
        caption: &str,
    ) -> BTreeMap<String, PlatformResult>;
}
