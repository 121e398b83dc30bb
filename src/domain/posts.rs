//! Post queue store - DB queries for social_posts and social_publish_logs

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

/// A due post joined with the credentials of its linked account.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DuePost {
    pub id: i64,
    pub user_id: Uuid,
    pub content: String,
    pub media_url: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub account_id: i64,
    pub platform: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: DateTime<Utc>,
}

/// All scheduled posts whose time has passed, oldest first.
pub async fn list_due_posts<'e, E>(
    executor: E,
    now: DateTime<Utc>,
) -> Result<Vec<DuePost>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT p.id, p.user_id, p.content, p.media_url, p.scheduled_at,
               a.id AS account_id, a.platform, a.access_token, a.refresh_token,
               a.expires_at AS token_expires_at
        FROM social_posts p
        JOIN social_accounts a ON a.id = p.account_id
        WHERE p.status = 'scheduled' AND p.scheduled_at <= $1
        ORDER BY p.scheduled_at
        "#,
    )
    .bind(now)
    .fetch_all(executor)
    .await
}

/// Claim a post for publishing. The conditional update makes the claim
/// atomic: of two overlapping worker runs, exactly one sees an affected row.
pub async fn claim_post<'e, E>(executor: E, post_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE social_posts
        SET status = 'publishing', updated_at = NOW()
        WHERE id = $1 AND status = 'scheduled'
        "#,
    )
    .bind(post_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn mark_published<'e, E>(
    executor: E,
    post_id: i64,
    platform_post_id: &str,
    platform_post_url: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE social_posts
        SET status = 'published', platform_post_id = $2, platform_post_url = $3,
            error_message = NULL, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(post_id)
    .bind(platform_post_id)
    .bind(platform_post_url)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn mark_failed<'e, E>(
    executor: E,
    post_id: i64,
    error_message: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE social_posts
        SET status = 'failed', error_message = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(post_id)
    .bind(error_message)
    .execute(executor)
    .await?;

    Ok(())
}

/// One row per publish attempt, with the raw payload snapshots.
#[derive(Debug)]
pub struct NewPublishLog<'a> {
    pub post_id: i64,
    pub status: &'a str,
    pub http_status: Option<i32>,
    pub error_details: Option<&'a str>,
    pub api_request_payload: Option<serde_json::Value>,
    pub api_response_payload: Option<serde_json::Value>,
}

/// Append to the publish audit log. Log rows are never updated or deleted.
pub async fn insert_publish_log<'e, E>(
    executor: E,
    log: NewPublishLog<'_>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO social_publish_logs
            (post_id, status, http_status, error_details,
             api_request_payload, api_response_payload)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(log.post_id)
    .bind(log.status)
    .bind(log.http_status)
    .bind(log.error_details)
    .bind(log.api_request_payload)
    .bind(log.api_response_payload)
    .execute(executor)
    .await?;

    Ok(())
}
