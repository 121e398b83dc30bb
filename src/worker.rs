//! Scheduled publish worker
//!
//! Moves due `social_posts` rows into a terminal state: claims each due
//! post, refreshes expiring credentials, hands the post to its platform
//! adapter, and records the outcome in the post row plus an append-only
//! log entry. Safe to invoke concurrently; the claim is atomic and each
//! post is processed independently.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::{error, info};

use crate::domain::posts::{DuePost, NewPublishLog};
use crate::domain::{accounts, posts};
use crate::services::platforms::{PlatformError, PlatformRegistry, PublishedPost};

/// Tokens expiring within this margin are refreshed before the publish
/// call rather than risking a mid-flight 401.
const REFRESH_MARGIN_MINUTES: i64 = 5;

pub(crate) fn needs_refresh(token_expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    token_expires_at < now + Duration::minutes(REFRESH_MARGIN_MINUTES)
}

/// One batch pass. Returns the number of due posts the scan picked up.
pub async fn run_due_posts(db: &PgPool, platforms: &PlatformRegistry) -> Result<usize, sqlx::Error> {
    let now = Utc::now();
    let due = posts::list_due_posts(db, now).await?;

    if due.is_empty() {
        return Ok(0);
    }

    info!("{} post(s) due", due.len());

    for post in &due {
        // One post's failure must not abort the rest of the batch.
        if let Err(e) = process_post(db, platforms, post, now).await {
            error!("Post {}: store error while recording outcome: {}", post.id, e);
        }
    }

    Ok(due.len())
}

async fn process_post(
    db: &PgPool,
    platforms: &PlatformRegistry,
    post: &DuePost,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    // Losing the conditional update means another worker run claimed the
    // post between our scan and now; skip without touching it.
    if !posts::claim_post(db, post.id).await? {
        info!("Post {} already claimed, skipping", post.id);
        return Ok(());
    }

    info!(
        "Publishing post {} for user {} (was due {})",
        post.id, post.user_id, post.scheduled_at
    );

    match publish_post(db, platforms, post, now).await {
        Ok(published) => {
            posts::mark_published(
                db,
                post.id,
                &published.platform_post_id,
                &published.platform_post_url,
            )
            .await?;

            let log = NewPublishLog {
                post_id: post.id,
                status: "published",
                http_status: Some(published.http_status as i32),
                error_details: None,
                api_request_payload: Some(published.request_payload),
                api_response_payload: Some(published.response_payload),
            };
            if let Err(e) = posts::insert_publish_log(db, log).await {
                error!("Post {}: failed to append publish log: {}", post.id, e);
            }

            info!(
                "Post {} published to {} as {}",
                post.id, post.platform, published.platform_post_id
            );
        }
        Err(err) => {
            let message = err.to_string();
            posts::mark_failed(db, post.id, &message).await?;

            let log = NewPublishLog {
                post_id: post.id,
                status: "failed",
                http_status: err.http_status(),
                error_details: Some(&message),
                api_request_payload: None,
                api_response_payload: None,
            };
            if let Err(e) = posts::insert_publish_log(db, log).await {
                error!("Post {}: failed to append publish log: {}", post.id, e);
            }

            error!("Post {} failed: {}", post.id, message);
        }
    }

    Ok(())
}

/// Refresh-if-needed, then publish. Every error funnels into the caller's
/// failure path for this post only.
async fn publish_post(
    db: &PgPool,
    platforms: &PlatformRegistry,
    post: &DuePost,
    now: DateTime<Utc>,
) -> Result<PublishedPost, PlatformError> {
    let adapter = platforms
        .get(&post.platform)
        .ok_or_else(|| PlatformError::UnknownPlatform(post.platform.clone()))?;

    let access_token = if needs_refresh(post.token_expires_at, now) {
        let refresh_token = post.refresh_token.as_deref().ok_or_else(|| {
            PlatformError::Validation(format!(
                "access token expired and no refresh token is stored for account {}",
                post.account_id
            ))
        })?;

        match adapter.refresh_token(refresh_token).await {
            Ok(tokens) => {
                let expires_at = now + Duration::seconds(tokens.expires_in);
                accounts::update_account_tokens(
                    db,
                    post.account_id,
                    &tokens.access_token,
                    tokens.refresh_token.as_deref(),
                    expires_at,
                )
                .await?;

                tokens.access_token
            }
            Err(e) => {
                // The stored grant is dead; surface that on the account so
                // the dashboard can prompt a reconnect.
                if let Err(mark) = accounts::mark_account_expired(db, post.account_id).await {
                    error!(
                        "Account {}: failed to mark expired: {}",
                        post.account_id, mark
                    );
                }
                return Err(e);
            }
        }
    } else {
        post.access_token.clone()
    };

    adapter.publish(&access_token, post).await
}

/// Interval-driven variant of the batch pass, spawned from `main`. External
/// cron hitting POST /publish/run stays supported; this task covers
/// deployments without one.
pub async fn start_background_scheduler(
    db: PgPool,
    platforms: PlatformRegistry,
    interval_secs: u64,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match run_due_posts(&db, &platforms).await {
            Ok(0) => {}
            Ok(count) => info!("[scheduler] processed {} due post(s)", count),
            Err(e) => error!("[scheduler] publish batch error: {}", e),
        }
    }
}
