use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tracing::{error, info, warn};

use reel_db::Database;
use reel_db::models::VideoRow;
use reel_types::models::{User, UserId, Video, VideoId};

use crate::blocking;
use crate::error::ServiceError;
use crate::graph::RelationGraph;
use crate::media::{MediaStore, cover_path_for, url_path};
use crate::thumbnail::ThumbnailExtractor;

const MAX_TITLE_CHARS: usize = 128;
const MAX_EXTENSION_LEN: usize = 10;

pub struct IngestConfig {
    /// Base URL the static media route is reachable under.
    pub public_url: String,
    pub feed_page_size: u32,
}

/// An uploaded file as received from the client.
pub struct Upload {
    pub file_name: String,
    pub title: String,
    pub data: Bytes,
}

#[derive(Debug)]
pub struct PublishOutcome {
    pub video_id: VideoId,
    /// Relative cover path, if one was derived.
    pub cover: Option<String>,
}

#[derive(Debug)]
pub struct FeedPage {
    /// Cursor for the next (older) page.
    pub next_time: i64,
    pub videos: Vec<Video>,
}

/// Publishing and browsing of videos.
///
/// Publishing is: pending row → durable file write → row published →
/// best-effort cover. A cover failure is logged and never fails the publish;
/// the video stays in the feed without a cover.
pub struct VideoIngestionPipeline {
    db: Arc<Database>,
    media: MediaStore,
    thumbnails: ThumbnailExtractor,
    config: IngestConfig,
}

impl VideoIngestionPipeline {
    pub fn new(
        db: Arc<Database>,
        media: MediaStore,
        thumbnails: ThumbnailExtractor,
        config: IngestConfig,
    ) -> Self {
        Self {
            db,
            media,
            thumbnails,
            config,
        }
    }

    pub fn media_root(&self) -> &Path {
        self.media.root()
    }

    pub async fn publish(
        &self,
        author: UserId,
        upload: Upload,
        generate_cover: bool,
    ) -> Result<PublishOutcome, ServiceError> {
        let extension = file_extension(&upload.file_name)?.to_string();
        let title = upload.title.trim().to_string();
        if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
            return Err(ServiceError::validation(format!(
                "title must be 1 to {} characters",
                MAX_TITLE_CHARS
            )));
        }
        if upload.data.is_empty() {
            return Err(ServiceError::validation("uploaded file is empty"));
        }

        let db = self.db.clone();
        let created_at = Utc::now().timestamp_millis();
        let video_id = blocking(move || {
            db.create_pending_video(author, &title, created_at).map_err(|e| {
                ServiceError::internal(format!("create video row for user {}", author), e)
            })
        })
        .await?;

        let video_path = MediaStore::video_path(video_id, &extension);
        if let Err(e) = self.media.write(&video_path, &upload.data).await {
            error!(video_id, author, error = %e, "failed to store video file");
            self.discard(video_id, None).await;
            return Err(ServiceError::Internal);
        }

        let db = self.db.clone();
        let path = video_path.clone();
        let published = blocking(move || mark_published(&db, video_id, &path)).await;
        if let Err(e) = published {
            self.discard(video_id, Some(&video_path)).await;
            return Err(e);
        }

        info!(video_id, author, path = %video_path, bytes = upload.data.len(), "video published");

        let cover = if generate_cover {
            self.derive_cover(video_id, &video_path).await
        } else {
            None
        };

        Ok(PublishOutcome { video_id, cover })
    }

    /// Best effort: every failure is logged and yields `None`.
    async fn derive_cover(&self, video_id: VideoId, video_path: &str) -> Option<String> {
        let Some(cover_path) = cover_path_for(Path::new(video_path)).map(|p| url_path(&p)) else {
            error!(video_id, path = %video_path, "no cover location for video path");
            return None;
        };

        let source = self.media.absolute(video_path);
        let target = self.media.absolute(&cover_path);
        if let Err(e) = self.thumbnails.extract(&source, &target).await {
            error!(
                video_id,
                error = %e,
                cause = %e.cause,
                "cover generation failed; video stays published without a cover"
            );
            return None;
        }

        self.attach_cover(video_id, cover_path).await
    }

    /// Records a written cover on the video row. If that fails the cover file
    /// is removed again, so no unreferenced image stays on disk.
    async fn attach_cover(&self, video_id: VideoId, cover_path: String) -> Option<String> {
        let db = self.db.clone();
        let recorded = cover_path.clone();
        match blocking(move || record_cover(&db, video_id, &recorded)).await {
            Ok(()) => {
                info!(video_id, cover = %cover_path, "cover generated");
                Some(cover_path)
            }
            Err(e) => {
                warn!(video_id, error = %e, "cover not recorded, removing it");
                if let Err(e) = self.media.delete(&cover_path).await {
                    warn!(video_id, error = %e, "failed to remove unrecorded cover");
                }
                None
            }
        }
    }

    /// Removes a row that never became a complete video, and its file if one
    /// was written.
    async fn discard(&self, video_id: VideoId, video_path: Option<&str>) {
        if let Some(path) = video_path {
            if let Err(e) = self.media.delete(path).await {
                warn!(video_id, error = %e, "failed to remove orphaned video file");
            }
        }
        let db = self.db.clone();
        let removed = blocking(move || {
            db.delete_video(video_id).map_err(|e| {
                ServiceError::internal(format!("discard pending video {}", video_id), e)
            })
        })
        .await;
        if removed.is_err() {
            warn!(video_id, "pending video row left behind");
        }
    }

    /// Published videos strictly older than `latest_time`, newest first.
    /// An absent or non-positive cursor means "now". An empty page hands the
    /// resolved cursor back unchanged.
    pub async fn feed(
        &self,
        viewer: Option<UserId>,
        latest_time: Option<i64>,
    ) -> Result<FeedPage, ServiceError> {
        let cursor = match latest_time {
            Some(t) if t > 0 => t,
            _ => Utc::now().timestamp_millis(),
        };

        let db = self.db.clone();
        let limit = self.config.feed_page_size;
        let public_url = self.config.public_url.clone();
        blocking(move || {
            let rows = db
                .list_videos_before(cursor, limit)
                .map_err(|e| ServiceError::internal(format!("list videos before {}", cursor), e))?;
            let next_time = rows.last().map(|row| row.created_at).unwrap_or(cursor);
            let videos = render_videos(&db, &public_url, viewer, rows)?;
            Ok(FeedPage { next_time, videos })
        })
        .await
    }

    /// Every published video of `author`, newest first.
    pub async fn published_by(
        &self,
        viewer: Option<UserId>,
        author: UserId,
    ) -> Result<Vec<Video>, ServiceError> {
        let db = self.db.clone();
        let public_url = self.config.public_url.clone();
        blocking(move || {
            RelationGraph::new(&db).require_user(author)?;
            let rows = db
                .list_videos_by_author(author)
                .map_err(|e| ServiceError::internal(format!("list videos of user {}", author), e))?;
            render_videos(&db, &public_url, viewer, rows)
        })
        .await
    }
}

/// Makes a pending video visible. A row that vanished in the meantime is
/// reported as not found.
fn mark_published(db: &Database, video_id: VideoId, video_path: &str) -> Result<(), ServiceError> {
    match db.publish_video(video_id, video_path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(ServiceError::VideoNotFound(video_id)),
        Err(e) => Err(ServiceError::internal(format!("publish video {}", video_id), e)),
    }
}

fn record_cover(db: &Database, video_id: VideoId, cover_path: &str) -> Result<(), ServiceError> {
    match db.set_video_cover(video_id, cover_path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(ServiceError::VideoNotFound(video_id)),
        Err(e) => Err(ServiceError::internal(format!("record cover of video {}", video_id), e)),
    }
}

/// Text after the final `.` of an uploaded file name.
pub fn file_extension(file_name: &str) -> Result<&str, ServiceError> {
    let (_, extension) = file_name
        .rsplit_once('.')
        .ok_or_else(|| ServiceError::validation("file name has no extension"))?;

    if extension.is_empty()
        || extension.len() > MAX_EXTENSION_LEN
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(ServiceError::validation(format!(
            "unsupported file extension '{}'",
            extension
        )));
    }
    Ok(extension)
}

/// Attaches authors (with `is_follow` for `viewer`, one batched query) and
/// public URLs to video rows.
fn render_videos(
    db: &Database,
    public_url: &str,
    viewer: Option<UserId>,
    rows: Vec<VideoRow>,
) -> Result<Vec<Video>, ServiceError> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let author_ids: Vec<UserId> = rows
        .iter()
        .map(|row| row.author_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let author_rows = db.get_users_by_ids(&author_ids).map_err(|e| {
        ServiceError::internal(format!("load {} video authors", author_ids.len()), e)
    })?;
    let authors: HashMap<UserId, User> = RelationGraph::new(db)
        .annotate(viewer, author_rows)?
        .into_iter()
        .map(|user| (user.id, user))
        .collect();

    let base = public_url.trim_end_matches('/');
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let Some(author) = authors.get(&row.author_id) else {
                warn!(
                    video_id = row.id,
                    author_id = row.author_id,
                    "video author missing, skipping"
                );
                return None;
            };
            Some(Video {
                id: row.id,
                author: author.clone(),
                play_url: format!("{}/static/{}", base, row.video_path),
                cover_url: row.cover_path.map(|cover| format!("{}/static/{}", base, cover)),
                title: row.title,
                created_at: row.created_at,
            })
        })
        .collect())
}
