//! Mock publish adapter for tests
//!
//! Configurable success/failure plus call counters, so batch and registry
//! logic can be exercised without platform credentials or network access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::{PlatformError, PublishAdapter, PublishedPost, TokenResponse};
use crate::domain::posts::DuePost;

pub struct MockAdapter {
    platform: &'static str,
    publish_succeeds: bool,
    refresh_succeeds: bool,
    pub publish_calls: Arc<Mutex<usize>>,
    pub refresh_calls: Arc<Mutex<usize>>,
    pub published_content: Arc<Mutex<Vec<String>>>,
}

impl MockAdapter {
    pub fn succeeding(platform: &'static str) -> Self {
        Self {
            platform,
            publish_succeeds: true,
            refresh_succeeds: true,
            publish_calls: Arc::new(Mutex::new(0)),
            refresh_calls: Arc::new(Mutex::new(0)),
            published_content: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(platform: &'static str) -> Self {
        Self {
            publish_succeeds: false,
            refresh_succeeds: false,
            ..Self::succeeding(platform)
        }
    }
}

#[async_trait]
impl PublishAdapter for MockAdapter {
    fn platform(&self) -> &'static str {
        self.platform
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse, PlatformError> {
        *self.refresh_calls.lock().unwrap() += 1;

        if !self.refresh_succeeds {
            return Err(PlatformError::Api {
                platform: self.platform,
                status: 401,
                body: "invalid_grant".to_string(),
            });
        }

        Ok(TokenResponse {
            access_token: "refreshed-access-token".to_string(),
            refresh_token: Some("rotated-refresh-token".to_string()),
            expires_in: 3600,
        })
    }

    async fn publish(
        &self,
        _access_token: &str,
        post: &DuePost,
    ) -> Result<PublishedPost, PlatformError> {
        *self.publish_calls.lock().unwrap() += 1;

        if !self.publish_succeeds {
            return Err(PlatformError::Api {
                platform: self.platform,
                status: 403,
                body: "forbidden".to_string(),
            });
        }

        self.published_content
            .lock()
            .unwrap()
            .push(post.content.clone());

        Ok(PublishedPost {
            platform_post_id: "mock-post-1".to_string(),
            platform_post_url: "https://youtube.example/watch?v=mock-post-1".to_string(),
            http_status: 200,
            request_payload: serde_json::json!({ "content": post.content }),
            response_payload: serde_json::json!({ "id": "mock-post-1" }),
        })
    }
}
