//! Clip rendering, concatenation and music mixing with ffmpeg.
//!
//! Every operation works in its own scratch directory, which is removed
//! when the operation returns. Child processes are killed if the calling
//! future is dropped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ProviderError;

/// Silence prepended to every narration track.
pub const NARRATION_LEAD_IN: Duration = Duration::from_millis(500);

/// Error type for ffmpeg/ffprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("{0} binary not found: {1}")]
    NotFound(&'static str, std::io::Error),

    #[error("{program} failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        program: &'static str,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("input file not found: {0}")]
    InputNotFound(String),

    #[error("no clips to concatenate")]
    NoClips,
}

/// Visual source for one clip.
#[derive(Debug, Clone)]
pub enum Visual {
    /// Still image, animated with a slow zoom.
    Image(Vec<u8>),
    /// Generated video, last frame held to cover the narration.
    Video(Vec<u8>),
}

impl Visual {
    pub fn kind(&self) -> &'static str {
        match self {
            Visual::Image(_) => "image",
            Visual::Video(_) => "video",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClipRenderInput {
    pub visual: Visual,
    /// Narration MP3.
    pub audio: Vec<u8>,
    pub audio_duration_ms: i32,
    /// SRT document burned into the frames.
    pub captions: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenderedClip {
    /// MP4 bytes.
    pub bytes: Vec<u8>,
    /// Measured with ffprobe; `None` when the probe failed.
    pub duration_ms: Option<i32>,
}

#[async_trait]
pub trait MediaRenderer: Send + Sync {
    async fn render_clip(&self, input: ClipRenderInput) -> Result<RenderedClip, ProviderError>;

    /// Join clips in the given order.
    async fn concatenate(&self, clips: Vec<Vec<u8>>) -> Result<Vec<u8>, ProviderError>;

    /// Lay looped `music` under the video's narration, ending with the video.
    async fn mix_background(&self, video: Vec<u8>, music: &Path)
        -> Result<Vec<u8>, ProviderError>;
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// ffprobe `-show_format` output, trimmed to what is read.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

fn parse_duration_ms(stdout: &str) -> Result<i32, MediaError> {
    let probe: FfprobeOutput = serde_json::from_str(stdout)
        .map_err(|e| MediaError::ParseError(format!("{e}: {stdout}")))?;
    let secs: f64 = probe
        .format
        .duration
        .as_deref()
        .ok_or_else(|| MediaError::ParseError("no format duration".into()))?
        .trim()
        .parse()
        .map_err(|e| MediaError::ParseError(format!("bad duration: {e}")))?;
    Ok((secs * 1000.0).round() as i32)
}

// ---------------------------------------------------------------------------
// Filter construction
// ---------------------------------------------------------------------------

/// Escape a path for use inside a single-quoted filter argument.
pub fn escape_filter_path(path: &str) -> String {
    path.replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "'\\''")
}

/// Slow centred zoom over a still image. Frame count covers the narration
/// plus lead-in, with two seconds of slack so the video never ends first.
pub fn zoom_filter(duration_ms: i32, width: u32, height: u32, fps: u32) -> String {
    let total_ms = duration_ms.max(0) as u64 + NARRATION_LEAD_IN.as_millis() as u64 + 2_000;
    let frames = (total_ms * fps as u64).div_ceil(1000).max(1);
    format!(
        "scale={sw}:-2,zoompan=z='min(zoom+0.0008,1.25)':\
         x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d={frames}:s={width}x{height}:fps={fps}",
        sw = width * 4,
    )
}

/// Cover-crop a generated video to the frame and hold its last frame.
pub fn freeze_filter(width: u32, height: u32) -> String {
    format!(
        "scale={width}:{height}:force_original_aspect_ratio=increase,\
         crop={width}:{height},tpad=stop_mode=clone:stop_duration=60"
    )
}

fn with_captions(filter: String, captions: Option<&Path>) -> String {
    match captions {
        Some(path) => format!(
            "{filter},subtitles='{}'",
            escape_filter_path(&path.to_string_lossy())
        ),
        None => filter,
    }
}

// ---------------------------------------------------------------------------
// Process helpers
// ---------------------------------------------------------------------------

/// Keep the tail of ffmpeg's stderr, where the actual error is.
fn stderr_tail(stderr: &[u8]) -> String {
    const MAX: usize = 2000;
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    match text.char_indices().rev().nth(MAX) {
        Some((idx, _)) => text[idx..].to_string(),
        None => text.to_string(),
    }
}

async fn run(program: &'static str, args: &[String]) -> Result<Vec<u8>, MediaError> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| MediaError::NotFound(program, e))?;

    if !output.status.success() {
        return Err(MediaError::ExecutionFailed {
            program,
            exit_code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        });
    }
    Ok(output.stdout)
}

async fn ffmpeg(args: Vec<String>) -> Result<(), MediaError> {
    let mut full = vec!["-hide_banner".to_string(), "-y".to_string()];
    full.extend(args);
    run("ffmpeg", &full).await?;
    Ok(())
}

/// Container duration of a media file.
pub async fn probe_duration_ms(path: &Path) -> Result<i32, MediaError> {
    if !path.exists() {
        return Err(MediaError::InputNotFound(path.to_string_lossy().to_string()));
    }
    let stdout = run(
        "ffprobe",
        &[
            "-v".into(),
            "quiet".into(),
            "-print_format".into(),
            "json".into(),
            "-show_format".into(),
            path.to_string_lossy().to_string(),
        ],
    )
    .await?;
    parse_duration_ms(&String::from_utf8_lossy(&stdout))
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

// ---------------------------------------------------------------------------
// FfmpegRenderer
// ---------------------------------------------------------------------------

/// [`MediaRenderer`] that shells out to the `ffmpeg`/`ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    width: u32,
    height: u32,
    fps: u32,
    scratch_root: Option<PathBuf>,
}

impl Default for FfmpegRenderer {
    fn default() -> Self {
        Self::new(1080, 1920)
    }
}

impl FfmpegRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fps: 30,
            scratch_root: None,
        }
    }

    /// Create scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: PathBuf) -> Self {
        self.scratch_root = Some(root);
        self
    }

    fn scratch(&self) -> Result<tempfile::TempDir, MediaError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("clipforge-");
        Ok(match &self.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        })
    }

    async fn render_in(
        &self,
        dir: &Path,
        input: ClipRenderInput,
    ) -> Result<RenderedClip, MediaError> {
        let raw_audio = dir.join("narration.mp3");
        let audio = dir.join("narration_padded.m4a");
        let output = dir.join("clip.mp4");
        tokio::fs::write(&raw_audio, &input.audio).await?;

        let lead_ms = NARRATION_LEAD_IN.as_millis();
        ffmpeg(vec![
            "-i".into(),
            arg(&raw_audio),
            "-af".into(),
            format!("adelay={lead_ms}|{lead_ms}"),
            "-c:a".into(),
            "aac".into(),
            arg(&audio),
        ])
        .await?;

        let captions = match &input.captions {
            Some(srt) => {
                let path = dir.join("captions.srt");
                tokio::fs::write(&path, srt).await?;
                Some(path)
            }
            None => None,
        };

        let mut args: Vec<String> = Vec::new();
        match &input.visual {
            Visual::Image(bytes) => {
                let image = dir.join("frame.png");
                tokio::fs::write(&image, bytes).await?;
                let filter = with_captions(
                    zoom_filter(input.audio_duration_ms, self.width, self.height, self.fps),
                    captions.as_deref(),
                );
                args.extend([
                    "-i".into(),
                    arg(&image),
                    "-i".into(),
                    arg(&audio),
                    "-vf".into(),
                    filter,
                ]);
            }
            Visual::Video(bytes) => {
                let source = dir.join("generated.mp4");
                tokio::fs::write(&source, bytes).await?;
                let filter = with_captions(
                    format!("[0:v]{}", freeze_filter(self.width, self.height)),
                    captions.as_deref(),
                );
                args.extend([
                    "-i".into(),
                    arg(&source),
                    "-i".into(),
                    arg(&audio),
                    "-filter_complex".into(),
                    format!("{filter}[v]"),
                    "-map".into(),
                    "[v]".into(),
                    "-map".into(),
                    "1:a".into(),
                ]);
            }
        }
        args.extend(
            [
                "-c:v", "libx264", "-c:a", "aac", "-b:a", "192k", "-pix_fmt", "yuv420p",
                "-shortest",
            ]
            .map(String::from),
        );
        args.push(arg(&output));
        ffmpeg(args).await?;

        let duration_ms = match probe_duration_ms(&output).await {
            Ok(ms) => Some(ms),
            Err(e) => {
                tracing::warn!(error = %e, "Could not measure rendered clip duration");
                None
            }
        };
        let bytes = tokio::fs::read(&output).await?;
        Ok(RenderedClip { bytes, duration_ms })
    }

    async fn concatenate_in(&self, dir: &Path, clips: Vec<Vec<u8>>) -> Result<Vec<u8>, MediaError> {
        if clips.is_empty() {
            return Err(MediaError::NoClips);
        }

        let mut list = String::new();
        for (i, clip) in clips.iter().enumerate() {
            let path = dir.join(format!("clip_{i:04}.mp4"));
            tokio::fs::write(&path, clip).await?;
            list.push_str(&format!("file '{}'\n", arg(&path).replace('\'', "'\\''")));
        }
        let list_path = dir.join("concat.txt");
        tokio::fs::write(&list_path, list).await?;

        let output = dir.join("joined.mp4");
        ffmpeg(vec![
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            arg(&list_path),
            "-c".into(),
            "copy".into(),
            arg(&output),
        ])
        .await?;
        Ok(tokio::fs::read(&output).await?)
    }

    async fn mix_in(
        &self,
        dir: &Path,
        video: Vec<u8>,
        music: &Path,
    ) -> Result<Vec<u8>, MediaError> {
        if !tokio::fs::try_exists(music).await? {
            return Err(MediaError::InputNotFound(music.to_string_lossy().to_string()));
        }

        let source = dir.join("joined.mp4");
        let output = dir.join("final.mp4");
        tokio::fs::write(&source, video).await?;

        ffmpeg(vec![
            "-i".into(),
            arg(&source),
            "-stream_loop".into(),
            "-1".into(),
            "-i".into(),
            arg(music),
            "-filter_complex".into(),
            "[0:a]volume=1.0[narration];[1:a]volume=0.12[music];\
             [narration][music]amix=inputs=2:duration=first:dropout_transition=3[aout]"
                .into(),
            "-map".into(),
            "0:v".into(),
            "-map".into(),
            "[aout]".into(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "192k".into(),
            "-shortest".into(),
            arg(&output),
        ])
        .await?;
        Ok(tokio::fs::read(&output).await?)
    }
}

#[async_trait]
impl MediaRenderer for FfmpegRenderer {
    async fn render_clip(&self, input: ClipRenderInput) -> Result<RenderedClip, ProviderError> {
        let dir = self.scratch()?;
        let visual = input.visual.kind();
        let rendered = self.render_in(dir.path(), input).await?;
        tracing::debug!(
            visual,
            bytes = rendered.bytes.len(),
            duration_ms = ?rendered.duration_ms,
            "Clip rendered",
        );
        Ok(rendered)
    }

    async fn concatenate(&self, clips: Vec<Vec<u8>>) -> Result<Vec<u8>, ProviderError> {
        let dir = self.scratch()?;
        Ok(self.concatenate_in(dir.path(), clips).await?)
    }

    async fn mix_background(
        &self,
        video: Vec<u8>,
        music: &Path,
    ) -> Result<Vec<u8>, ProviderError> {
        let dir = self.scratch()?;
        Ok(self.mix_in(dir.path(), video, music).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn probe_duration_parses_format_section() {
        let stdout = r#"{"format": {"filename": "clip.mp4", "duration": "5.533000"}}"#;
        assert_eq!(parse_duration_ms(stdout).unwrap(), 5533);
    }

    #[test]
    fn probe_without_duration_is_a_parse_error() {
        assert_matches!(
            parse_duration_ms(r#"{"format": {}}"#),
            Err(MediaError::ParseError(_))
        );
        assert_matches!(parse_duration_ms("not json"), Err(MediaError::ParseError(_)));
    }

    #[test]
    fn zoom_covers_narration_lead_in_and_slack() {
        // 5 s narration + 0.5 s lead-in + 2 s slack at 30 fps.
        let filter = zoom_filter(5_000, 1080, 1920, 30);
        assert!(filter.starts_with("scale=4320:-2,zoompan="));
        assert!(filter.contains(":d=225:"));
        assert!(filter.ends_with("s=1080x1920:fps=30"));
    }

    #[test]
    fn freeze_holds_last_frame() {
        let filter = freeze_filter(720, 1280);
        assert!(filter.contains("crop=720:1280"));
        assert!(filter.ends_with("tpad=stop_mode=clone:stop_duration=60"));
    }

    #[test]
    fn caption_paths_are_escaped() {
        assert_eq!(escape_filter_path("/tmp/a:b/c's.srt"), "/tmp/a\\:b/c'\\''s.srt");
        assert_eq!(
            with_captions("scale=1:1".into(), Some(Path::new("/tmp/x.srt"))),
            "scale=1:1,subtitles='/tmp/x.srt'"
        );
        assert_eq!(with_captions("scale=1:1".into(), None), "scale=1:1");
    }

    #[test]
    fn stderr_keeps_the_tail() {
        let long = "x".repeat(5000) + "real error";
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.ends_with("real error"));
        assert!(tail.len() <= 2001);
    }

    #[tokio::test]
    async fn concatenating_nothing_is_refused() {
        let renderer = FfmpegRenderer::default();
        assert_matches!(
            renderer.concatenate(Vec::new()).await,
            Err(ProviderError::Media(MediaError::NoClips))
        );
    }

    #[tokio::test]
    async fn missing_music_is_reported() {
        let renderer = FfmpegRenderer::default();
        assert_matches!(
            renderer
                .mix_background(vec![0u8; 4], Path::new("/nonexistent/clipforge/music.mp3"))
                .await,
            Err(ProviderError::Media(MediaError::InputNotFound(_)))
        );
    }
}
