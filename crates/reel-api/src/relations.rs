use axum::extract::{Query, State};
use tracing::debug;

use reel_types::api::{
    Empty, FriendListResponse, RelationActionRequest, UserListResponse, UserQuery, UserResponse,
};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ServiceError;
use crate::extractors::AuthUser;
use crate::friends::FriendAggregator;
use crate::graph::RelationGraph;
use crate::response::Reply;

const ACTION_FOLLOW: i32 = 1;
const ACTION_UNFOLLOW: i32 = 2;

pub async fn user_info(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    Query(query): Query<UserQuery>,
) -> Result<Reply<UserResponse>, ServiceError> {
    let db = state.db.clone();
    let user =
        blocking(move || RelationGraph::new(&db).profile(Some(viewer), query.user_id)).await?;
    Ok(Reply::ok(UserResponse { user }))
}

pub async fn relation_action(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    Query(req): Query<RelationActionRequest>,
) -> Result<Reply<Empty>, ServiceError> {
    let db = state.db.clone();
    let target = req.to_user_id;
    let changed = match req.action_type {
        ACTION_FOLLOW => {
            blocking(move || RelationGraph::new(&db).follow(viewer, target)).await?
        }
        ACTION_UNFOLLOW => {
            blocking(move || RelationGraph::new(&db).unfollow(viewer, target)).await?
        }
        other => {
            return Err(ServiceError::validation(format!("unknown action_type {}", other)));
        }
    };
    debug!(viewer, target, action = req.action_type, changed, "relation action applied");
    Ok(Reply::ok(Empty::default()))
}

pub async fn follow_list(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    Query(query): Query<UserQuery>,
) -> Result<Reply<UserListResponse>, ServiceError> {
    let db = state.db.clone();
    let user_list =
        blocking(move || RelationGraph::new(&db).following_of(viewer, query.user_id)).await?;
    Ok(Reply::ok(UserListResponse { user_list }))
}

pub async fn follower_list(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    Query(query): Query<UserQuery>,
) -> Result<Reply<UserListResponse>, ServiceError> {
    let db = state.db.clone();
    let user_list =
        blocking(move || RelationGraph::new(&db).followers_of(viewer, query.user_id)).await?;
    Ok(Reply::ok(UserListResponse { user_list }))
}

pub async fn friend_list(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    Query(query): Query<UserQuery>,
) -> Result<Reply<FriendListResponse>, ServiceError> {
    let db = state.db.clone();
    let user_list =
        blocking(move || FriendAggregator::new(&db).friends(viewer, query.user_id)).await?;
    Ok(Reply::ok(FriendListResponse { user_list }))
}
