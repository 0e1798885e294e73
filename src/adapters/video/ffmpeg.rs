use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::application::ports::{VideoCodecPort, VideoInfo};
use crate::domain::errors::{DomainError, DomainResult};

const DEFAULT_FPS: f32 = 25.0;
const MIN_FPS: f32 = 1.0;
const MAX_FPS: f32 = 120.0;
const FRAME_PATTERN: &str = "frame_%06d.png";

/// Decodes and encodes video by shelling out to `ffprobe` / `ffmpeg`.
pub struct FfmpegVideoCodec {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegVideoCodec {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self { ffmpeg: ffmpeg.into(), ffprobe: ffprobe.into() }
    }

    async fn run(&self, program: &str, args: &[String]) -> DomainResult<Vec<u8>> {
        debug!("{} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                error!("Cannot run {}: {}", program, e);
                DomainError::OperationFailed(format!("cannot run {program} (is it installed?): {e}"))
            })?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} failed: {}", program, stderr.trim());
            Err(DomainError::OperationFailed(format!("{program} failed: {}", stderr.trim())))
        }
    }
}

impl Default for FfmpegVideoCodec {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

/// Parses `30000/1001` or `25` into frames per second.
pub fn parse_frame_rate(raw: &str) -> Option<f32> {
    let fps = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f32 = num.trim().parse().ok()?;
            let den: f32 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Reads the first video stream out of `ffprobe -of json` output.
pub fn parse_probe(json: &[u8]) -> DomainResult<VideoInfo> {
    let value: serde_json::Value = serde_json::from_slice(json)
        .map_err(|e| DomainError::OperationFailed(format!("bad ffprobe output: {e}")))?;
    let stream = value["streams"]
        .as_array()
        .and_then(|s| s.first())
        .ok_or_else(|| DomainError::InvalidInput("upload has no video stream".into()))?;

    let width = stream["width"].as_u64().unwrap_or(0) as u32;
    let height = stream["height"].as_u64().unwrap_or(0) as u32;
    if width == 0 || height == 0 {
        return Err(DomainError::InvalidInput("video stream has no dimensions".into()));
    }

    let fps = ["avg_frame_rate", "r_frame_rate"]
        .iter()
        .filter_map(|k| stream[*k].as_str().and_then(parse_frame_rate))
        .next()
        .unwrap_or(DEFAULT_FPS)
        .clamp(MIN_FPS, MAX_FPS);

    let frame_count = stream["nb_frames"]
        .as_str()
        .and_then(|n| n.parse::<u64>().ok());

    Ok(VideoInfo { width, height, fps, frame_count })
}

#[async_trait]
impl VideoCodecPort for FfmpegVideoCodec {
    async fn probe(&self, input: &Path) -> DomainResult<VideoInfo> {
        let args: Vec<String> = vec![
            "-v".into(),
            "error".into(),
            "-select_streams".into(),
            "v:0".into(),
            "-show_entries".into(),
            "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames".into(),
            "-of".into(),
            "json".into(),
            input.to_string_lossy().into_owned(),
        ];
        let stdout = self.run(&self.ffprobe, &args).await?;
        parse_probe(&stdout)
    }

    async fn decode_frames(&self, input: &Path, frames_dir: &Path) -> DomainResult<Vec<PathBuf>> {
        tokio::fs::create_dir_all(frames_dir).await?;
        let args: Vec<String> = vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-vsync".into(),
            "0".into(),
            frames_dir.join(FRAME_PATTERN).to_string_lossy().into_owned(),
        ];
        self.run(&self.ffmpeg, &args).await?;

        let mut frames = Vec::new();
        let mut entries = tokio::fs::read_dir(frames_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "png") {
                frames.push(path);
            }
        }
        // Zero-padded names sort in frame order.
        frames.sort();
        info!("Decoded {} frames from {}", frames.len(), input.display());
        Ok(frames)
    }

    async fn encode_frames(&self, frames_dir: &Path, fps: f32, output: &Path) -> DomainResult<()> {
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let fps = if fps.is_finite() { fps.clamp(MIN_FPS, MAX_FPS) } else { DEFAULT_FPS };
        let args: Vec<String> = vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-framerate".into(),
            format!("{fps:.3}"),
            "-i".into(),
            frames_dir.join(FRAME_PATTERN).to_string_lossy().into_owned(),
            // yuv420p needs even dimensions
            "-vf".into(),
            "scale=trunc(iw/2)*2:trunc(ih/2)*2".into(),
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-preset".into(),
            "fast".into(),
            "-crf".into(),
            "23".into(),
            "-movflags".into(),
            "+faststart".into(),
            output.to_string_lossy().into_owned(),
        ];
        self.run(&self.ffmpeg, &args).await?;
        info!("Encoded {} @ {:.2} fps", output.display(), fps);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rates() {
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn probe_json_is_parsed() {
        let json = br#"{"streams":[{"width":1280,"height":720,"avg_frame_rate":"0/0","r_frame_rate":"24/1","nb_frames":"48"}]}"#;
        let info = parse_probe(json).unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
        assert_eq!(info.fps, 24.0);
        assert_eq!(info.frame_count, Some(48));
    }

    #[test]
    fn probe_defaults_and_errors() {
        let json = br#"{"streams":[{"width":640,"height":480}]}"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(info.fps, DEFAULT_FPS);
        assert_eq!(info.frame_count, None);

        assert!(matches!(parse_probe(br#"{"streams":[]}"#), Err(DomainError::InvalidInput(_))));
        assert!(parse_probe(b"garbage").is_err());
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let codec = FfmpegVideoCodec::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let res = codec.probe(Path::new("clip.mp4")).await;
        assert!(matches!(res, Err(DomainError::OperationFailed(_))));
    }
}
