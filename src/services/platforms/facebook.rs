//! Facebook publish adapter (stub)
//!
//! Meta publishing is not wired up yet; the adapter exists so queued
//! facebook posts fail cleanly as unsupported instead of erroring as an
//! unknown platform. TODO: implement against the Graph API page-feed
//! endpoint once the Meta app review lands.

use async_trait::async_trait;

use super::{PlatformError, PublishAdapter, PublishedPost, TokenResponse};
use crate::domain::posts::DuePost;

pub struct FacebookAdapter;

#[async_trait]
impl PublishAdapter for FacebookAdapter {
    fn platform(&self) -> &'static str {
        "facebook"
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse, PlatformError> {
        Err(PlatformError::Unsupported("facebook"))
    }

    async fn publish(
        &self,
        _access_token: &str,
        _post: &DuePost,
    ) -> Result<PublishedPost, PlatformError> {
        Err(PlatformError::Unsupported("facebook"))
    }
}
