//! Platform publish adapters
//!
//! One adapter per social platform. The worker's queue and state-machine
//! logic stays platform-agnostic: it resolves an adapter from the registry,
//! asks it to refresh credentials when they are about to expire, and hands
//! it the due post. Adding a platform means adding an adapter, not touching
//! the worker.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::posts::DuePost;

pub mod facebook;
pub mod youtube;

#[cfg(test)]
pub mod mock;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{platform} API error (status {status}): {body}")]
    Api {
        platform: &'static str,
        status: u16,
        body: String,
    },
    #[error("{0}")]
    Validation(String),
    #[error("no publish adapter registered for platform '{0}'")]
    UnknownPlatform(String),
    #[error("publishing to {0} is not implemented")]
    Unsupported(&'static str),
    #[error("account store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl PlatformError {
    /// HTTP status for the publish log, when the failure carries one.
    pub fn http_status(&self) -> Option<i32> {
        match self {
            PlatformError::Api { status, .. } => Some(*status as i32),
            PlatformError::Http(e) => e.status().map(|s| s.as_u16() as i32),
            _ => None,
        }
    }
}

/// Narrowed token-endpoint response shared by all adapters.
#[derive(Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    /// Providers rotate the refresh token only sometimes; `None` means keep
    /// the stored one.
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

/// Outcome of a successful publish call, with the raw payload snapshots the
/// audit log keeps.
#[derive(Debug)]
pub struct PublishedPost {
    pub platform_post_id: String,
    pub platform_post_url: String,
    pub http_status: u16,
    pub request_payload: serde_json::Value,
    pub response_payload: serde_json::Value,
}

#[async_trait]
pub trait PublishAdapter: Send + Sync {
    /// Lowercase identifier matching `social_accounts.platform`.
    fn platform(&self) -> &'static str;

    /// Exchange a refresh token for fresh credentials at the platform's
    /// token endpoint.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, PlatformError>;

    /// Publish one due post with a valid access token.
    async fn publish(
        &self,
        access_token: &str,
        post: &DuePost,
    ) -> Result<PublishedPost, PlatformError>;
}

/// Adapter lookup by platform name.
#[derive(Clone)]
pub struct PlatformRegistry {
    adapters: Arc<Vec<Arc<dyn PublishAdapter>>>,
}

impl PlatformRegistry {
    pub fn new(adapters: Vec<Arc<dyn PublishAdapter>>) -> Self {
        Self {
            adapters: Arc::new(adapters),
        }
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn PublishAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.platform() == platform)
            .cloned()
    }
}
