use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use crate::auth::{self, AppState};
use crate::middleware::{optional_auth, require_auth};
use crate::{messages, relations, videos};

/// The douyin-style API plus static media under `/static`.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let media = ServeDir::new(state.pipeline.media_root());

    let public_routes = Router::new()
        .route("/douyin/user/register/", post(auth::register))
        .route("/douyin/user/login/", post(auth::login))
        .with_state(state.clone());

    let feed_routes = Router::new()
        .route("/douyin/feed/", get(videos::feed))
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_auth))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/douyin/user/", get(relations::user_info))
        .route("/douyin/relation/action/", post(relations::relation_action))
        .route("/douyin/relation/follow/list/", get(relations::follow_list))
        .route("/douyin/relation/follower/list/", get(relations::follower_list))
        .route("/douyin/relation/friend/list/", get(relations::friend_list))
        .route(
            "/douyin/publish/action/",
            post(videos::publish).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/douyin/publish/list/", get(videos::publish_list))
        .route("/douyin/message/action/", post(messages::message_action))
        .route("/douyin/message/chat/", get(messages::chat))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(feed_routes)
        .merge(protected_routes)
        .nest_service("/static", media)
}
