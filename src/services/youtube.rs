//! Google / YouTube API client
//!
//! OAuth 2.0 authorization-code client plus the two YouTube calls this
//! service makes: the channel profile fetch after a connection and the
//! video upload behind the publish adapter.

use reqwest::Client;
use serde::Deserialize;

use crate::services::platforms::{PlatformError, TokenResponse};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const CHANNELS_URL: &str =
    "https://www.googleapis.com/youtube/v3/channels?part=snippet,statistics&mine=true";
const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status";

const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube.readonly",
    "https://www.googleapis.com/auth/userinfo.profile",
];

/// A hung platform call fails the request (and the post) instead of pinning
/// the handler until the hosting runtime's own timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct YouTubeClient {
    client_id: String,
    client_secret: String,
    http: Client,
}

impl YouTubeClient {
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            http,
        }
    }

    /// Build the consent-screen URL. Offline access plus forced consent so a
    /// refresh token is issued even when the account was connected before.
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> String {
        let scope = SCOPES.join(" ");

        format!(
            "{AUTH_URL}?client_id={}&redirect_uri={}&response_type=code&access_type=offline&prompt=consent&scope={}&state={}",
            percent_encode(&self.client_id),
            percent_encode(redirect_uri),
            percent_encode(&scope),
            percent_encode(state)
        )
    }

    /// Exchange an authorization code for tokens. `redirect_uri` must be
    /// byte-for-byte the URI the consent redirect carried.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, PlatformError> {
        let params = [
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        self.token_request(&params).await
    }

    /// Refresh an access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, PlatformError> {
        let params = [
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];

        self.token_request(&params).await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, PlatformError> {
        let resp = self
            .http
            .post(TOKEN_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(params)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await?;
            return Err(PlatformError::Api {
                platform: "youtube",
                status,
                body,
            });
        }

        let raw: RawTokenResponse = resp.json().await?;

        // Some grant problems arrive inside a 200 body with no token.
        let access_token = raw.access_token.ok_or_else(|| PlatformError::Api {
            platform: "youtube",
            status: 200,
            body: "token response carried no access token".to_string(),
        })?;

        Ok(TokenResponse {
            access_token,
            refresh_token: raw.refresh_token,
            expires_in: raw.expires_in.unwrap_or(3600),
        })
    }

    /// Fetch the authenticated account's channel profile.
    pub async fn get_channel(&self, access_token: &str) -> Result<ChannelProfile, PlatformError> {
        let resp = self
            .http
            .get(CHANNELS_URL)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await?;
            return Err(PlatformError::Api {
                platform: "youtube",
                status,
                body,
            });
        }

        let wrapper: ChannelListResponse = resp.json().await?;
        let channel = wrapper
            .items
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| {
                PlatformError::Validation("no YouTube channel found for this account".to_string())
            })?;

        Ok(ChannelProfile::from(channel))
    }

    /// Download the media reference attached to a post.
    pub async fn fetch_media(&self, url: &str) -> Result<(Vec<u8>, String), PlatformError> {
        let resp = self.http.get(url).send().await?;

        if !resp.status().is_success() {
            return Err(PlatformError::Api {
                platform: "youtube",
                status: resp.status().as_u16(),
                body: format!("media download failed for {}", url),
            });
        }

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("video/mp4")
            .to_string();
        let bytes = resp.bytes().await?.to_vec();

        Ok((bytes, content_type))
    }

    /// Upload a video via the resumable protocol: open an upload session
    /// with the metadata, then send the bytes to the session URL Google
    /// returns. Returns the final HTTP status and response payload.
    pub async fn upload_video(
        &self,
        access_token: &str,
        metadata: &serde_json::Value,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(u16, serde_json::Value), PlatformError> {
        let resp = self
            .http
            .post(UPLOAD_URL)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("X-Upload-Content-Type", content_type)
            .json(metadata)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await?;
            return Err(PlatformError::Api {
                platform: "youtube",
                status: status.as_u16(),
                body: format!("upload session open failed: {}", body),
            });
        }

        let session_url = resp
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| PlatformError::Api {
                platform: "youtube",
                status: status.as_u16(),
                body: "upload session response carried no location header".to_string(),
            })?
            .to_string();

        let resp = self
            .http
            .put(&session_url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", content_type)
            .body(data)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(PlatformError::Api {
                platform: "youtube",
                status: status.as_u16(),
                body,
            });
        }

        let payload: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            PlatformError::Api {
                platform: "youtube",
                status: status.as_u16(),
                body: format!("Failed to parse upload response: {} - body: {}", e, body),
            }
        })?;

        Ok((status.as_u16(), payload))
    }
}

fn percent_encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}

#[derive(Debug, Deserialize)]
struct RawTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    items: Option<Vec<Channel>>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    snippet: ChannelSnippet,
    statistics: ChannelStatistics,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: String,
    #[serde(rename = "customUrl")]
    custom_url: Option<String>,
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChannelStatistics {
    // YouTube serializes the statistics counters as strings.
    #[serde(rename = "subscriberCount")]
    subscriber_count: Option<String>,
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
}

/// Narrowed channel profile handed to the callback handler.
#[derive(Debug)]
pub struct ChannelProfile {
    pub id: String,
    pub title: String,
    pub custom_url: Option<String>,
    pub avatar_url: Option<String>,
    pub subscriber_count: i64,
    pub view_count: i64,
}

impl From<Channel> for ChannelProfile {
    fn from(channel: Channel) -> Self {
        let subscriber_count = channel
            .statistics
            .subscriber_count
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let view_count = channel
            .statistics
            .view_count
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        Self {
            id: channel.id,
            avatar_url: channel
                .snippet
                .thumbnails
                .and_then(|t| t.high)
                .map(|t| t.url),
            custom_url: channel.snippet.custom_url,
            title: channel.snippet.title,
            subscriber_count,
            view_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_requests_offline_access_and_forced_consent() {
        let client = YouTubeClient::new("client-id", "client-secret");
        let url = client.authorize_url("https://gw.example.com/oauth/callback?apikey=anon", "abc123");

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("state=abc123"));
        // The redirect URI is percent-encoded, gateway credential included.
        assert!(url.contains("redirect_uri=https%3A%2F%2Fgw%2Eexample%2Ecom%2Foauth%2Fcallback%3Fapikey%3Danon"));
    }

    #[test]
    fn channel_profile_parses_string_counters() {
        let channel = Channel {
            id: "UC123".to_string(),
            snippet: ChannelSnippet {
                title: "Speech Lab".to_string(),
                custom_url: Some("@speechlab".to_string()),
                thumbnails: Some(Thumbnails {
                    high: Some(Thumbnail {
                        url: "https://img.example.com/avatar.jpg".to_string(),
                    }),
                }),
            },
            statistics: ChannelStatistics {
                subscriber_count: Some("1523".to_string()),
                view_count: Some("99000".to_string()),
            },
        };

        let profile = ChannelProfile::from(channel);
        assert_eq!(profile.subscriber_count, 1523);
        assert_eq!(profile.view_count, 99000);
        assert_eq!(profile.custom_url.as_deref(), Some("@speechlab"));
    }

    #[test]
    fn channel_profile_defaults_unparseable_counters_to_zero() {
        let channel = Channel {
            id: "UC456".to_string(),
            snippet: ChannelSnippet {
                title: "No Stats".to_string(),
                custom_url: None,
                thumbnails: None,
            },
            statistics: ChannelStatistics {
                subscriber_count: Some("hidden".to_string()),
                view_count: None,
            },
        };

        let profile = ChannelProfile::from(channel);
        assert_eq!(profile.subscriber_count, 0);
        assert_eq!(profile.view_count, 0);
        assert_eq!(profile.avatar_url, None);
    }
}
