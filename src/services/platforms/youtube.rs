//! End-to-end YouTube publish adapter

use async_trait::async_trait;

use super::{PlatformError, PublishAdapter, PublishedPost, TokenResponse};
use crate::domain::posts::DuePost;
use crate::services::youtube::YouTubeClient;

pub struct YouTubeAdapter {
    client: YouTubeClient,
}

impl YouTubeAdapter {
    pub fn new(client: YouTubeClient) -> Self {
        Self { client }
    }
}

/// First line of the content, clipped to YouTube's title limit. The full
/// content becomes the description.
fn title_from_content(content: &str) -> String {
    const MAX_TITLE_CHARS: usize = 100;

    content
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect()
}

#[async_trait]
impl PublishAdapter for YouTubeAdapter {
    fn platform(&self) -> &'static str {
        "youtube"
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, PlatformError> {
        self.client.refresh_token(refresh_token).await
    }

    async fn publish(
        &self,
        access_token: &str,
        post: &DuePost,
    ) -> Result<PublishedPost, PlatformError> {
        // YouTube publishes videos; a post without a media reference can
        // never succeed, so fail it up front instead of burning an upload
        // session.
        let media_url = post.media_url.as_deref().ok_or_else(|| {
            PlatformError::Validation("YouTube posts require a video attachment".to_string())
        })?;

        let title = title_from_content(&post.content);
        if title.is_empty() {
            return Err(PlatformError::Validation("post content is empty".to_string()));
        }

        let metadata = serde_json::json!({
            "snippet": {
                "title": title,
                "description": post.content,
            },
            "status": {
                "privacyStatus": "public",
            },
        });

        let (media, content_type) = self.client.fetch_media(media_url).await?;
        let (http_status, response) = self
            .client
            .upload_video(access_token, &metadata, media, &content_type)
            .await?;

        let video_id = response
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PlatformError::Api {
                platform: "youtube",
                status: http_status,
                body: format!("upload response carried no video id: {}", response),
            })?
            .to_string();

        Ok(PublishedPost {
            platform_post_url: format!("https://www.youtube.com/watch?v={}", video_id),
            platform_post_id: video_id,
            http_status,
            request_payload: metadata,
            response_payload: response,
        })
    }
}
