//! Publish worker endpoint (/publish/run)

use axum::{Router, extract::State, http::StatusCode, routing::post};
use std::sync::Arc;

use crate::AppState;
use crate::services::error::LogErr;
use crate::worker;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/publish/run", post(run_publish))
}

/// POST /publish/run - Process every due scheduled post. Invoked by the
/// deployment's cron; nothing consumes the body beyond logs, so it stays a
/// plain summary.
async fn run_publish(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    let due = worker::run_due_posts(&state.db, &state.platforms)
        .await
        .log_500("Publish batch error")?;

    if due == 0 {
        Ok("No posts due")
    } else {
        Ok("Batch Processed")
    }
}
