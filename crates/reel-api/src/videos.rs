use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use bytes::Bytes;

use reel_types::api::{FeedQuery, FeedResponse, PublishResponse, UserQuery, VideoListResponse};

use crate::auth::AppState;
use crate::error::ServiceError;
use crate::extractors::{AuthUser, MaybeAuthUser};
use crate::ingest::Upload;
use crate::response::Reply;

/// GET /douyin/feed/: newest published videos older than `latest_time`.
pub async fn feed(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Query(query): Query<FeedQuery>,
) -> Result<Reply<FeedResponse>, ServiceError> {
    let page = state.pipeline.feed(viewer, query.latest_time).await?;
    Ok(Reply::ok(FeedResponse {
        next_time: page.next_time,
        video_list: page.videos,
    }))
}

/// POST /douyin/publish/action/: multipart `data` (the file) and `title`.
pub async fn publish(
    State(state): State<AppState>,
    AuthUser(author): AuthUser,
    mut multipart: Multipart,
) -> Result<Reply<PublishResponse>, ServiceError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("invalid multipart data", e))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "data" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("failed to read upload", e))?;
                file = Some((file_name, data));
            }
            "title" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error("failed to read title", e))?;
                title = Some(text);
            }
            _ => {}
        }
    }

    let (file_name, data) = file.ok_or_else(|| ServiceError::validation("no file provided"))?;
    let upload = Upload {
        file_name,
        title: title.unwrap_or_default(),
        data,
    };

    let outcome = state.pipeline.publish(author, upload, true).await?;
    Ok(Reply::ok(PublishResponse {
        video_id: outcome.video_id,
        cover_generated: outcome.cover.is_some(),
    }))
}

/// A body cut off by the upload limit is reported as too large; anything
/// else is a malformed request.
fn multipart_error(context: &str, err: MultipartError) -> ServiceError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::UploadTooLarge
    } else {
        ServiceError::validation(format!("{}: {}", context, err))
    }
}

/// GET /douyin/publish/list/
pub async fn publish_list(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    Query(query): Query<UserQuery>,
) -> Result<Reply<VideoListResponse>, ServiceError> {
    let video_list = state.pipeline.published_by(Some(viewer), query.user_id).await?;
    Ok(Reply::ok(VideoListResponse { video_list }))
}
