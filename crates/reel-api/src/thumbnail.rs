//! Cover extraction: one frame of a stored video, re-encoded as JPEG.
//!
//! The frame is pulled out by an external `ffmpeg` process writing MJPEG to
//! stdout. The child is bounded by a timeout and is killed if the calling
//! future is dropped, so an abandoned request does not leave it running.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Frame selected by the `select=gte(n,N)` filter.
pub const THUMBNAIL_FRAME_INDEX: u32 = 1;

const JPEG_QUALITY: u8 = 85;

/// Longest stderr excerpt kept on an extractor failure.
const STDERR_EXCERPT: usize = 512;

#[derive(Debug, Error)]
#[error("thumbnail derivation failed for {}", video.display())]
pub struct ThumbnailError {
    pub video: PathBuf,
    #[source]
    pub cause: ThumbnailCause,
}

#[derive(Debug, Error)]
pub enum ThumbnailCause {
    #[error("could not start frame extractor: {0}")]
    Spawn(std::io::Error),

    #[error("frame extractor timed out after {0:?}")]
    TimedOut(Duration),

    #[error("frame extractor exited with {status}: {stderr}")]
    Extractor { status: ExitStatus, stderr: String },

    #[error("no frame at index {0}")]
    NoFrame(u32),

    #[error("could not decode frame: {0}")]
    Decode(image::ImageError),

    #[error("could not encode cover: {0}")]
    Encode(image::ImageError),

    #[error("could not write cover: {0}")]
    Write(std::io::Error),

    #[error("encoder task failed: {0}")]
    Join(tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct ThumbnailExtractor {
    ffmpeg_path: PathBuf,
    timeout: Duration,
    frame_index: u32,
}

impl ThumbnailExtractor {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout,
            frame_index: THUMBNAIL_FRAME_INDEX,
        }
    }

    /// Decodes one frame of `video` and writes it to `cover` as JPEG.
    pub async fn extract(&self, video: &Path, cover: &Path) -> Result<(), ThumbnailError> {
        let fail = |cause: ThumbnailCause| ThumbnailError {
            video: video.to_path_buf(),
            cause,
        };

        let frame = self.grab_frame(video).await.map_err(fail)?;
        debug!(video = %video.display(), bytes = frame.len(), "frame extracted");

        let cover_path = cover.to_path_buf();
        tokio::task::spawn_blocking(move || write_jpeg(&frame, &cover_path))
            .await
            .map_err(|e| fail(ThumbnailCause::Join(e)))?
            .map_err(fail)
    }

    async fn grab_frame(&self, video: &Path) -> Result<Vec<u8>, ThumbnailCause> {
        let child = Command::new(&self.ffmpeg_path)
            .arg("-v")
            .arg("error")
            .arg("-i")
            .arg(video)
            .arg("-vf")
            .arg(format!("select=gte(n\\,{})", self.frame_index))
            .arg("-vframes")
            .arg("1")
            .arg("-f")
            .arg("image2")
            .arg("-vcodec")
            .arg("mjpeg")
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ThumbnailCause::Spawn)?;

        // On timeout the future owning `child` is dropped, which kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ThumbnailCause::TimedOut(self.timeout))?
            .map_err(ThumbnailCause::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.trim().chars().take(STDERR_EXCERPT).collect();
            return Err(ThumbnailCause::Extractor {
                status: output.status,
                stderr,
            });
        }
        if output.stdout.is_empty() {
            return Err(ThumbnailCause::NoFrame(self.frame_index));
        }
        Ok(output.stdout)
    }
}

fn write_jpeg(frame: &[u8], cover: &Path) -> Result<(), ThumbnailCause> {
    let image = image::load_from_memory(frame).map_err(ThumbnailCause::Decode)?;
    let rgb = image.to_rgb8();

    if let Some(parent) = cover.parent() {
        std::fs::create_dir_all(parent).map_err(ThumbnailCause::Write)?;
    }
    let file = std::fs::File::create(cover).map_err(ThumbnailCause::Write)?;
    let mut writer = std::io::BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(ThumbnailCause::Encode)?;
    writer.flush().map_err(ThumbnailCause::Write)?;
    writer
        .get_ref()
        .sync_all()
        .map_err(ThumbnailCause::Write)
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Writes an executable shell script standing in for ffmpeg.
    pub(crate) fn fake_ffmpeg(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// A tiny JPEG for the fake extractor to emit.
    pub(crate) fn sample_frame(dir: &Path) -> PathBuf {
        let path = dir.join("frame.jpg");
        let img = image::RgbImage::from_pixel(8, 6, image::Rgb([200, 30, 30]));
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = std::io::BufWriter::new(file);
        JpegEncoder::new(&mut writer).encode_image(&img).unwrap();
        writer.flush().unwrap();
        path
    }

    #[tokio::test]
    async fn writes_a_jpeg_cover() {
        let dir = tempfile::tempdir().unwrap();
        let frame = sample_frame(dir.path());
        let ffmpeg = fake_ffmpeg(dir.path(), "ffmpeg-ok", &format!("cat '{}'", frame.display()));
        let extractor = ThumbnailExtractor::new(ffmpeg, Duration::from_secs(10));

        let cover = dir.path().join("img/1.jpg");
        extractor.extract(&dir.path().join("video/1.mp4"), &cover).await.unwrap();

        let decoded = image::open(&cover).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (8, 6));
    }

    #[tokio::test]
    async fn extractor_failure_keeps_the_cause() {
        let dir = tempfile::tempdir().unwrap();
        let script = "echo 'moov atom not found' >&2; exit 1";
        let ffmpeg = fake_ffmpeg(dir.path(), "ffmpeg-broken", script);
        let extractor = ThumbnailExtractor::new(ffmpeg, Duration::from_secs(10));

        let err = extractor
            .extract(Path::new("upload/video/9.mp4"), &dir.path().join("9.jpg"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("thumbnail derivation failed"));
        match err.cause {
            ThumbnailCause::Extractor { stderr, .. } => assert_eq!(stderr, "moov atom not found"),
            other => panic!("unexpected cause: {}", other),
        }
    }

    #[tokio::test]
    async fn empty_output_means_no_frame() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(dir.path(), "ffmpeg-short", "exit 0");
        let extractor = ThumbnailExtractor::new(ffmpeg, Duration::from_secs(10));

        let err = extractor
            .extract(Path::new("v.mp4"), &dir.path().join("v.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err.cause, ThumbnailCause::NoFrame(THUMBNAIL_FRAME_INDEX)));
    }

    #[tokio::test]
    async fn garbage_frame_fails_to_decode() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(dir.path(), "ffmpeg-garbage", "printf 'not a jpeg'");
        let extractor = ThumbnailExtractor::new(ffmpeg, Duration::from_secs(10));

        let cover = dir.path().join("g.jpg");
        let err = extractor.extract(Path::new("g.mp4"), &cover).await.unwrap_err();
        assert!(matches!(err.cause, ThumbnailCause::Decode(_)));
        assert!(!cover.exists());
    }

    #[tokio::test]
    async fn slow_extractor_is_cut_off() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(dir.path(), "ffmpeg-slow", "sleep 5");
        let extractor = ThumbnailExtractor::new(ffmpeg, Duration::from_millis(200));

        let err = extractor
            .extract(Path::new("s.mp4"), &dir.path().join("s.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err.cause, ThumbnailCause::TimedOut(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let extractor =
            ThumbnailExtractor::new(dir.path().join("no-such-ffmpeg"), Duration::from_secs(1));

        let err = extractor
            .extract(Path::new("m.mp4"), &dir.path().join("m.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err.cause, ThumbnailCause::Spawn(_)));
    }
}
