use serde::{Deserialize, Serialize};

use crate::models::{FriendUser, Message, User, UserId, Video, VideoId};

// -- JWT Claims --

/// JWT claims issued at login/registration and checked by the auth
/// middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user_id: UserId,
    pub token: String,
}

// -- Users & relations --

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct RelationActionRequest {
    pub to_user_id: UserId,
    /// 1 = follow, 2 = unfollow.
    pub action_type: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponse {
    pub user_list: Vec<User>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendListResponse {
    pub user_list: Vec<FriendUser>,
}

// -- Videos --

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// Unix milliseconds; absent or zero means "now".
    pub latest_time: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedResponse {
    pub next_time: i64,
    pub video_list: Vec<Video>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VideoListResponse {
    pub video_list: Vec<Video>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub video_id: VideoId,
    pub cover_generated: bool,
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct MessageActionRequest {
    pub to_user_id: UserId,
    /// 1 = send.
    pub action_type: i32,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub to_user_id: UserId,
    /// Unix milliseconds; only messages strictly newer are returned.
    pub pre_msg_time: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message_list: Vec<Message>,
}

/// Body of responses that carry nothing besides the status pair.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Empty {}
