use anyhow::Result;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

pub const VIDEO_DIR: &str = "upload/video";
pub const COVER_DIR: &str = "upload/img";

/// On-disk storage for uploaded videos and their covers.
///
/// Paths handed in and out are relative to the media root and use `/`
/// separators, e.g. `upload/video/42.mp4`. The same relative path is what the
/// static file route serves.
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(root.join(VIDEO_DIR)).await?;
        fs::create_dir_all(root.join(COVER_DIR)).await?;
        info!("Media storage directory: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative path for a video file.
    pub fn video_path(video_id: i64, extension: &str) -> String {
        format!("{}/{}.{}", VIDEO_DIR, video_id, extension)
    }

    pub fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Writes `data` to a temporary sibling, syncs it and renames it into
    /// place. When this returns `Ok` the file is complete and durable.
    pub async fn write(&self, relative: &str, data: &[u8]) -> Result<()> {
        let path = self.absolute(relative);
        let dir = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("media path has no parent: {}", relative))?;
        fs::create_dir_all(dir).await?;

        let tmp = dir.join(format!(".{}.part", Uuid::new_v4()));
        let mut file = fs::File::create(&tmp).await?;
        let written = async {
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                warn!("Failed to remove partial upload {}: {}", tmp.display(), cleanup);
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Deletes a stored file. A file that is already gone is not an error.
    pub async fn delete(&self, relative: &str) -> Result<()> {
        let path = self.absolute(relative);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted media file {}", relative);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Media file {} already gone", relative);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Cover location for a stored video: the first `video` directory segment
/// becomes `img` and the extension becomes `.jpg`.
///
/// `upload/video/42.mp4` maps to `upload/img/42.jpg`. Returns `None` when the
/// path has no file stem or no `video` segment to substitute.
pub fn cover_path_for(video_path: &Path) -> Option<PathBuf> {
    let stem = video_path.file_stem()?;
    let parent = video_path.parent()?;

    let mut replaced = false;
    let mut cover = PathBuf::new();
    for component in parent.components() {
        match component {
            Component::Normal(segment) if !replaced && segment == "video" => {
                cover.push("img");
                replaced = true;
            }
            other => cover.push(other.as_os_str()),
        }
    }
    if !replaced {
        return None;
    }

    let mut name = stem.to_os_string();
    name.push(".jpg");
    cover.push(name);
    Some(cover)
}

/// Relative path rendered with `/` separators, for storage and URLs.
pub fn url_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
