//! Still-frame extraction for journal thumbnails.
//!
//! Frames are grabbed with an `ffmpeg` subprocess and encoded as JPEG on
//! stdout, so no intermediate file is written.

use crate::config::ThumbnailConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, instrument};

/// Produces a JPEG still from a local video file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    /// Encode the frame at `offset` into the clip as JPEG bytes
    async fn generate(&self, video_path: &Path, offset: Duration) -> Result<Vec<u8>>;
}

/// ffmpeg-backed thumbnail generator
pub struct FfmpegThumbnailer {
    ffmpeg_path: String,
    qscale: u8,
}

impl FfmpegThumbnailer {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            qscale: jpeg_qscale(config.jpeg_quality),
        }
    }

    fn command(&self, video_path: &Path, offset: Duration) -> Command {
        let mut command = Command::new(&self.ffmpeg_path);

        command
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-ss")
            .arg(format!("{:.3}", offset.as_secs_f64()))
            .arg("-i")
            .arg(video_path)
            .arg("-frames:v")
            .arg("1")
            .arg("-q:v")
            .arg(self.qscale.to_string())
            .arg("-f")
            .arg("image2pipe")
            .arg("-vcodec")
            .arg("mjpeg")
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command
    }
}

#[async_trait]
impl ThumbnailGenerator for FfmpegThumbnailer {
    #[instrument(skip(self), fields(video = %video_path.display()))]
    async fn generate(&self, video_path: &Path, offset: Duration) -> Result<Vec<u8>> {
        if !video_path.exists() {
            return Err(anyhow!(
                "Video file does not exist: {}",
                video_path.display()
            ));
        }

        let output = self
            .command(video_path, offset)
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", self.ffmpeg_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(stderr = %stderr, "ffmpeg frame extraction failed");
            return Err(anyhow!("ffmpeg exited with {}: {}", output.status, stderr.trim()));
        }

        // A clip shorter than the offset exits cleanly with no frame
        if output.stdout.is_empty() {
            return Err(anyhow!(
                "No frame at {:.3}s in {}",
                offset.as_secs_f64(),
                video_path.display()
            ));
        }

        debug!(size_bytes = output.stdout.len(), "Thumbnail extracted");
        Ok(output.stdout)
    }
}

/// Map a 0.0-1.0 JPEG quality onto ffmpeg's 2 (best) to 31 (worst) qscale
fn jpeg_qscale(quality: f32) -> u8 {
    let quality = quality.clamp(0.0, 1.0);
    (2.0 + ((1.0 - quality) * 29.0).round()) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_qscale_bounds() {
        assert_eq!(jpeg_qscale(1.0), 2);
        assert_eq!(jpeg_qscale(0.0), 31);
        assert_eq!(jpeg_qscale(0.8), 8);
        assert_eq!(jpeg_qscale(7.5), 2);
    }

    #[test]
    fn test_command_arguments() {
        let thumbnailer = FfmpegThumbnailer::new(&ThumbnailConfig::default());
        let command = thumbnailer.command(Path::new("/tmp/clip.mp4"), Duration::from_millis(500));
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss + 1], "0.500");
        assert!(args.windows(2).any(|w| w[0] == "-frames:v" && w[1] == "1"));
        assert!(args.windows(2).any(|w| w[0] == "-q:v" && w[1] == "8"));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[tokio::test]
    async fn test_missing_video_is_an_error() {
        let thumbnailer = FfmpegThumbnailer::new(&ThumbnailConfig::default());
        let result = thumbnailer
            .generate(Path::new("/nonexistent/clip.mp4"), Duration::from_millis(500))
            .await;

        assert!(result.is_err());
    }
}
