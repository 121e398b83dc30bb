//! Social OAuth endpoints (/oauth/*)
//!
//! Two halves of one flow: /oauth/start sends the browser to the platform's
//! consent screen with the request context packed into `state`, and
//! /oauth/callback receives the authorization code, exchanges it, persists
//! the linked account, and sends the browser back where it came from.
//! The callback is reachable with no session cookie - the browser arrives
//! via a third-party redirect - so its authority comes entirely from the
//! state envelope this service minted.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};
use uuid::Uuid;

use crate::AppState;
use crate::domain::accounts::{self, NewLinkedAccount};
use crate::services::oauth_state::StateEnvelope;

pub fn routes() -> Router<Arc<AppState>> {
    // Rate limit: stricter for OAuth - 5 requests per minute to prevent abuse
    let rate_limit_config = GovernorConfigBuilder::default()
        .per_second(12)
        .burst_size(5)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("Failed to build rate limit config");

    let rate_limit_layer = GovernorLayer {
        config: rate_limit_config.into(),
    };

    // The dashboard probes these endpoints cross-origin before handing the
    // browser over, so preflights must succeed with no body.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ]);

    Router::new()
        .route("/oauth/start", get(oauth_start))
        .route("/oauth/callback", get(oauth_callback))
        .layer(cors)
        .layer(rate_limit_layer)
}

#[derive(Deserialize)]
struct StartQuery {
    platform: Option<String>,
    user_id: Option<String>,
    redirect_uri: Option<String>,
    apikey: Option<String>,
}

/// GET /oauth/start - Redirect the browser to the platform's consent screen
async fn oauth_start(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StartQuery>,
) -> Response {
    let (Some(platform), Some(user_id), Some(redirect_uri)) = (
        query.platform.as_deref(),
        query.user_id.as_deref(),
        query.redirect_uri.as_deref(),
    ) else {
        return missing_parameters();
    };

    // Only the video platform is connected end-to-end today.
    if platform != "youtube" {
        return missing_parameters();
    }

    let Ok(user_id) = Uuid::parse_str(user_id) else {
        return missing_parameters();
    };

    // A caller-supplied gateway credential wins over the configured one, and
    // rides along in the envelope so the callback rebuilds the exact same
    // redirect URI for the token exchange.
    let gateway_key = query
        .apikey
        .clone()
        .or_else(|| state.config.gateway_api_key.clone());
    let callback_url = state.config.callback_url(gateway_key.as_deref());

    let envelope = StateEnvelope::new(user_id, platform, redirect_uri, gateway_key);
    let auth_url = state.youtube.authorize_url(&callback_url, &envelope.encode());

    redirect_found(&auth_url)
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /oauth/callback - Complete the code exchange and persist the account
async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(raw_state) = query.state.as_deref() else {
        return invalid_callback();
    };

    // The state travelled through a third party; treat it as hostile. With
    // no decodable envelope there is no trusted redirect target, so this is
    // the one failure that ends in a 400 instead of a redirect.
    let envelope = match StateEnvelope::decode(raw_state) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("State decode error: {}", e);
            return invalid_callback();
        }
    };

    // The user declined on the consent screen.
    if let Some(denied) = query.error.as_deref() {
        warn!("Consent denied for user {}: {}", envelope.user_id, denied);
        return redirect_found(&with_query_flag(&envelope.orig_redirect, "auth_error=true"));
    }

    let Some(code) = query.code.as_deref() else {
        return invalid_callback();
    };

    let result = (|| async {
        if envelope.platform != "youtube" {
            return Err(format!("unsupported platform '{}'", envelope.platform));
        }

        // Must match the redirect URI from the consent request byte for byte.
        let callback_url = state.config.callback_url(envelope.gateway_key.as_deref());

        let tokens = state
            .youtube
            .exchange_code(code, &callback_url)
            .await
            .map_err(|e| format!("Token exchange failed: {}", e))?;

        let channel = state
            .youtube
            .get_channel(&tokens.access_token)
            .await
            .map_err(|e| format!("Channel fetch failed: {}", e))?;

        let expires_at = Utc::now() + Duration::seconds(tokens.expires_in);
        let metrics = serde_json::json!({
            "followers": channel.subscriber_count,
            "engagement": 0,
            "views": channel.view_count,
        });

        accounts::upsert_account(
            &state.db,
            NewLinkedAccount {
                user_id: envelope.user_id,
                platform: &envelope.platform,
                platform_account_id: &channel.id,
                account_name: &channel.title,
                username: channel.custom_url.as_deref().unwrap_or(&channel.title),
                avatar_url: channel.avatar_url.as_deref(),
                metrics,
                access_token: &tokens.access_token,
                refresh_token: tokens.refresh_token.as_deref(),
                expires_at,
            },
        )
        .await
        .map_err(|e| format!("Account upsert failed: {}", e))?;

        Ok::<(), String>(())
    })()
    .await;

    match result {
        Ok(()) => redirect_found(&with_query_flag(&envelope.orig_redirect, "auth_success=true")),
        Err(e) => {
            // The browser gets a flag, never the raw failure detail.
            error!("OAuth exchange error for user {}: {}", envelope.user_id, e);
            redirect_found(&with_query_flag(&envelope.orig_redirect, "auth_error=true"))
        }
    }
}

/// Append a query flag, honoring any query string the URI already carries.
fn with_query_flag(uri: &str, flag: &str) -> String {
    if uri.contains('?') {
        format!("{}&{}", uri, flag)
    } else {
        format!("{}?{}", uri, flag)
    }
}

fn redirect_found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

fn missing_parameters() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": "Missing parameters" })),
    )
        .into_response()
}

fn invalid_callback() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": "Invalid callback" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::platforms::PlatformRegistry;
    use crate::services::youtube::YouTubeClient;
    use axum_test::{TestResponse, TestServer};
    use sqlx::PgPool;

    fn test_state(gateway_api_key: Option<&str>) -> Arc<AppState> {
        let config = Config {
            database_url: "postgres://localhost/social_test".to_string(),
            port: "0".to_string(),
            google_client_id: "client-id".to_string(),
            google_client_secret: "client-secret".to_string(),
            oauth_callback_url: "https://gw.example.com/oauth/callback".to_string(),
            gateway_api_key: gateway_api_key.map(String::from),
            publish_interval_secs: 300,
        };

        // Lazy pool: none of the paths under test touch the database.
        let db = PgPool::connect_lazy(&config.database_url).expect("lazy pool");

        Arc::new(AppState {
            db,
            youtube: YouTubeClient::new(&config.google_client_id, &config.google_client_secret),
            platforms: PlatformRegistry::new(vec![]),
            config,
        })
    }

    fn test_server(state: Arc<AppState>) -> TestServer {
        // The governor layer wants a real peer address, which the test
        // transport does not provide, so tests drive the bare handlers.
        let app = Router::new()
            .route("/oauth/start", get(oauth_start))
            .route("/oauth/callback", get(oauth_callback))
            .with_state(state);

        TestServer::new(app).expect("test server")
    }

    fn location_of(response: &TestResponse) -> String {
        response
            .headers()
            .get("location")
            .expect("location header")
            .to_str()
            .unwrap()
            .to_string()
    }

    fn query_param(url: &str, name: &str) -> Option<String> {
        let (_, query) = url.split_once('?')?;
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key == name {
                return Some(
                    percent_encoding::percent_decode_str(value)
                        .decode_utf8()
                        .unwrap()
                        .into_owned(),
                );
            }
        }
        None
    }

    #[test]
    fn query_flag_honors_existing_query_strings() {
        assert_eq!(
            with_query_flag("https://app.example.com", "auth_success=true"),
            "https://app.example.com?auth_success=true"
        );
        assert_eq!(
            with_query_flag("https://app.example.com/d?tab=social", "auth_error=true"),
            "https://app.example.com/d?tab=social&auth_error=true"
        );
    }

    #[tokio::test]
    async fn start_without_parameters_is_rejected() {
        let server = test_server(test_state(None));

        let res = server.get("/oauth/start").await;

        res.assert_status(StatusCode::BAD_REQUEST);
        res.assert_json(&serde_json::json!({ "error": "Missing parameters" }));
    }

    #[tokio::test]
    async fn start_with_unknown_platform_is_rejected() {
        let server = test_server(test_state(None));

        let res = server
            .get("/oauth/start")
            .add_query_param("platform", "tiktok")
            .add_query_param("user_id", Uuid::new_v4().to_string())
            .add_query_param("redirect_uri", "https://app.example.com")
            .await;

        res.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn start_with_malformed_user_id_is_rejected() {
        let server = test_server(test_state(None));

        let res = server
            .get("/oauth/start")
            .add_query_param("platform", "youtube")
            .add_query_param("user_id", "not-a-uuid")
            .add_query_param("redirect_uri", "https://app.example.com")
            .await;

        res.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn start_state_round_trips_user_and_redirect() {
        let server = test_server(test_state(None));
        let user_id = Uuid::new_v4();

        let res = server
            .get("/oauth/start")
            .add_query_param("platform", "youtube")
            .add_query_param("user_id", user_id.to_string())
            .add_query_param("redirect_uri", "https://app.example.com/dashboard")
            .await;

        res.assert_status(StatusCode::FOUND);
        let location = location_of(&res);
        assert!(location.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(location.contains("access_type=offline"));
        assert!(location.contains("prompt=consent"));

        let state = query_param(&location, "state").expect("state param");
        let envelope = StateEnvelope::decode(&state).expect("decodable state");
        assert_eq!(envelope.user_id, user_id);
        assert_eq!(envelope.platform, "youtube");
        assert_eq!(envelope.orig_redirect, "https://app.example.com/dashboard");
    }

    #[tokio::test]
    async fn start_threads_the_gateway_credential_through_the_callback_url() {
        let server = test_server(test_state(Some("anon-key")));

        let res = server
            .get("/oauth/start")
            .add_query_param("platform", "youtube")
            .add_query_param("user_id", Uuid::new_v4().to_string())
            .add_query_param("redirect_uri", "https://app.example.com")
            .await;

        res.assert_status(StatusCode::FOUND);
        let location = location_of(&res);

        let redirect_uri = query_param(&location, "redirect_uri").expect("redirect_uri param");
        assert_eq!(
            redirect_uri,
            "https://gw.example.com/oauth/callback?apikey=anon-key"
        );

        let envelope = StateEnvelope::decode(&query_param(&location, "state").unwrap()).unwrap();
        assert_eq!(envelope.gateway_key.as_deref(), Some("anon-key"));
    }

    #[tokio::test]
    async fn callback_without_code_or_state_is_rejected() {
        let server = test_server(test_state(None));

        let res = server.get("/oauth/callback").await;

        res.assert_status(StatusCode::BAD_REQUEST);
        res.assert_json(&serde_json::json!({ "error": "Invalid callback" }));
    }

    #[tokio::test]
    async fn callback_with_malformed_state_terminates_in_a_400() {
        let server = test_server(test_state(None));

        for state in ["%%%", "bm90LWpzb24", ""] {
            let res = server
                .get("/oauth/callback")
                .add_query_param("code", "4/abc")
                .add_query_param("state", state)
                .await;

            res.assert_status(StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn consent_denial_redirects_home_with_the_error_flag() {
        let server = test_server(test_state(None));
        let envelope = StateEnvelope::new(
            Uuid::new_v4(),
            "youtube",
            "https://app.example.com/dashboard",
            None,
        );

        let res = server
            .get("/oauth/callback")
            .add_query_param("state", envelope.encode())
            .add_query_param("error", "access_denied")
            .await;

        res.assert_status(StatusCode::FOUND);
        assert_eq!(
            location_of(&res),
            "https://app.example.com/dashboard?auth_error=true"
        );
    }

    #[tokio::test]
    async fn error_flag_appends_to_an_existing_query_string() {
        let server = test_server(test_state(None));
        let envelope = StateEnvelope::new(
            Uuid::new_v4(),
            "youtube",
            "https://app.example.com/dashboard?tab=social",
            None,
        );

        let res = server
            .get("/oauth/callback")
            .add_query_param("state", envelope.encode())
            .add_query_param("error", "access_denied")
            .await;

        res.assert_status(StatusCode::FOUND);
        assert_eq!(
            location_of(&res),
            "https://app.example.com/dashboard?tab=social&auth_error=true"
        );
    }
}
