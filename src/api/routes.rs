use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::chain::TzktClient;
use crate::db::{FeedSubscription, SqliteSubscriptionStore, SubscriptionSource};
use crate::error::AppError;
use crate::scheduler::SchedulerHandle;
use crate::types::Account;

/// Control surface over the feed: the boundary-crossing context that starts,
/// stops, and reconfigures the scanner while the scan task runs.
#[derive(Clone)]
pub struct ApiState {
    pub handle: SchedulerHandle,
    pub store: SqliteSubscriptionStore,
    pub chain: Arc<TzktClient>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/feed/status", get(get_feed_status))
        .route("/feed/start", post(post_feed_start))
        .route("/feed/stop", post(post_feed_stop))
        .route("/feeds", get(get_feeds).put(put_feed))
        .route("/feeds/:guild_id/:channel_id", delete(delete_feed))
        .route("/accounts/:address", get(get_account))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request/response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct FeedUpsert {
    pub guild_id: i64,
    pub channel_id: i64,
    #[serde(default)]
    pub minimum_sale_amount: i64,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub active: bool,
    pub channels: usize,
    /// Global minimum across all subscriptions — the extractor's pre-filter
    /// floor while the feed runs.
    pub minimum_sale_amount: Option<i64>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct FeedChangeResponse {
    pub message: String,
    pub previous_minimum: Option<i64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "feed_active": state.handle.is_active(),
    }))
}

async fn get_feed_status(
    State(state): State<ApiState>,
) -> Result<Json<StatusResponse>, AppError> {
    let feeds = state.store.list_subscriptions().await?;
    Ok(Json(StatusResponse {
        active: state.handle.is_active(),
        channels: feeds.len(),
        minimum_sale_amount: feeds.iter().map(|f| f.minimum_sale_amount).min(),
    }))
}

async fn post_feed_start(State(state): State<ApiState>) -> Json<MessageResponse> {
    let message = if state.handle.start() {
        "Sales feed starting.".to_string()
    } else {
        "Sales feed is already running. Use PUT /feeds to add a channel.".to_string()
    };
    Json(MessageResponse { message })
}

async fn post_feed_stop(State(state): State<ApiState>) -> Json<MessageResponse> {
    let message = if state.handle.stop().await {
        "Sales feed stopping.".to_string()
    } else {
        "Sales feed is not running.".to_string()
    };
    Json(MessageResponse { message })
}

async fn get_feeds(
    State(state): State<ApiState>,
) -> Result<Json<Vec<FeedSubscription>>, AppError> {
    Ok(Json(state.store.list_subscriptions().await?))
}

async fn put_feed(
    State(state): State<ApiState>,
    Json(body): Json<FeedUpsert>,
) -> Result<Json<FeedChangeResponse>, AppError> {
    let previous = state
        .store
        .set_feed(body.guild_id, body.channel_id, body.minimum_sale_amount)
        .await?;
    let message = match previous {
        Some(prev) => format!(
            "Updated sales feed channel '{}' - set min amount from {prev}\u{a729} to {}\u{a729}.",
            body.channel_id, body.minimum_sale_amount
        ),
        None => format!(
            "Added sales feed channel '{}' with min amount {}\u{a729}.",
            body.channel_id, body.minimum_sale_amount
        ),
    };
    Ok(Json(FeedChangeResponse {
        message,
        previous_minimum: previous,
    }))
}

async fn delete_feed(
    State(state): State<ApiState>,
    Path((guild_id, channel_id)): Path<(i64, i64)>,
) -> Result<Json<MessageResponse>, AppError> {
    let message = if state.store.remove_feed(guild_id, channel_id).await? {
        format!("Removed sales feed channel '{channel_id}'.")
    } else {
        format!("Channel '{channel_id}' is not set as a sales feed channel.")
    };
    Ok(Json(MessageResponse { message }))
}

async fn get_account(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<Account>, AppError> {
    Ok(Json(state.chain.account(&address).await?))
}
