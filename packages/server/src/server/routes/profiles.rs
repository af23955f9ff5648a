//! Profile, activity feed, and leaderboard routes.

use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use serde::{Deserialize, Serialize};

use aniquest_engine::models::{ActivityRecord, UserProfile};
use aniquest_engine::EngineError;

use crate::server::app::AppState;
use crate::server::error::ApiError;

const DEFAULT_FEED_LIMIT: usize = 20;
const DEFAULT_BOARD_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: String,
    pub xp: u64,
    pub level: u32,
    pub current_streak: u32,
    pub badges: usize,
}

/// Current profile for a user. Users who have never earned anything get the
/// level-1 default rather than a 404, matching what both clients render.
pub async fn profile_handler(
    Extension(state): Extension<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = state.deps.game.profile(&user_id).await?;
    Ok(Json(profile))
}

/// Recent activity rows for a user, newest first.
pub async fn activity_handler(
    Extension(state): Extension<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<ActivityRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_FEED_LIMIT).min(MAX_LIMIT);
    let feed = state
        .deps
        .activity
        .recent(&user_id, limit)
        .await
        .map_err(EngineError::from)?;
    Ok(Json(feed))
}

/// Top profiles by XP with a dense rank, ties broken by user id.
pub async fn leaderboard_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_BOARD_LIMIT).min(MAX_LIMIT);
    let profiles = state
        .deps
        .stores
        .profiles
        .top_by_xp(limit)
        .await
        .map_err(EngineError::from)?;
    let entries = profiles
        .into_iter()
        .enumerate()
        .map(|(index, profile)| LeaderboardEntry {
            rank: index + 1,
            user_id: profile.user_id,
            xp: profile.xp,
            level: profile.level,
            current_streak: profile.streak,
            badges: profile.badges.len(),
        })
        .collect();
    Ok(Json(entries))
}
