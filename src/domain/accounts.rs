//! Linked account store - DB queries for social_accounts
//!
//! All functions use the generic Executor pattern, so they work with both
//! `&PgPool` and `&mut PgConnection` (transactions).

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

/// Connection data written by the OAuth callback. The unique
/// `(user_id, platform, platform_account_id)` triple is the only key;
/// reconnecting overwrites credentials instead of duplicating rows.
#[derive(Debug)]
pub struct NewLinkedAccount<'a> {
    pub user_id: Uuid,
    pub platform: &'a str,
    pub platform_account_id: &'a str,
    pub account_name: &'a str,
    pub username: &'a str,
    pub avatar_url: Option<&'a str>,
    pub metrics: serde_json::Value,
    pub access_token: &'a str,
    pub refresh_token: Option<&'a str>,
    pub expires_at: DateTime<Utc>,
}

/// Upsert a linked account, reactivating it on reconnection. Keeps the
/// stored refresh token when the provider did not issue a new one.
pub async fn upsert_account<'e, E>(
    executor: E,
    account: NewLinkedAccount<'_>,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO social_accounts
            (user_id, platform, platform_account_id, account_name, username,
             avatar_url, metrics, access_token, refresh_token, expires_at, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'active')
        ON CONFLICT (user_id, platform, platform_account_id) DO UPDATE SET
            account_name = $4,
            username = $5,
            avatar_url = $6,
            metrics = $7,
            access_token = $8,
            refresh_token = COALESCE($9, social_accounts.refresh_token),
            expires_at = $10,
            status = 'active',
            updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(account.user_id)
    .bind(account.platform)
    .bind(account.platform_account_id)
    .bind(account.account_name)
    .bind(account.username)
    .bind(account.avatar_url)
    .bind(&account.metrics)
    .bind(account.access_token)
    .bind(account.refresh_token)
    .bind(account.expires_at)
    .fetch_one(executor)
    .await?;

    Ok(row.0)
}

/// Persist refreshed credentials before the publish call proceeds.
pub async fn update_account_tokens<'e, E>(
    executor: E,
    account_id: i64,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE social_accounts SET
            access_token = $2,
            refresh_token = COALESCE($3, refresh_token),
            expires_at = $4,
            status = 'active',
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(account_id)
    .bind(access_token)
    .bind(refresh_token)
    .bind(expires_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Flag an account whose refresh grant no longer works. The user has to
/// reconnect; the worker never deletes rows.
pub async fn mark_account_expired<'e, E>(executor: E, account_id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE social_accounts SET status = 'expired', updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(account_id)
    .execute(executor)
    .await?;

    Ok(())
}
