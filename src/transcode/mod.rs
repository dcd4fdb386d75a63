//! External ffmpeg invocation.
//!
//! Includes:
//! - The [`Transcoder`] seam so tests can swap in a mock
//! - The fixed mux/re-encode command line (video from the visual input,
//!   audio from the audio input, trimmed to the shorter of the two)
//! - stderr capture for failure diagnostics

use crate::common::errors::{PipelineError, Result};
use crate::common::{WATERMARK_FONT_COLOR, WATERMARK_FONT_SIZE, WATERMARK_POSITION};
use log::{debug, info};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Keep diagnostics chat-sized; ffmpeg stderr can run to many kilobytes.
/// Measured in characters, since the tail is cut on a char boundary.
const DIAGNOSTIC_TAIL_CHARS: usize = 2000;

/// One complete unit of transcoding work: exactly one visual and one audio
/// reference plus the derived watermark decision. Ephemeral, never persisted.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub visual: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    /// `Some(text)` burns the watermark in; `None` leaves the video clean.
    pub watermark: Option<String>,
}

/// Synchronous, blocking transcode. Implementations must not hold any lock
/// shared across requesters while running.
pub trait Transcoder: Send + Sync {
    fn run(&self, job: &TranscodeJob) -> Result<PathBuf>;
}

/// Shells out to ffmpeg with a fixed invocation shape.
pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>) -> Self {
        FfmpegTranscoder {
            binary: binary.into(),
        }
    }

    fn build_args(job: &TranscodeJob) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            job.visual.to_string_lossy().into_owned(),
            "-i".to_string(),
            job.audio.to_string_lossy().into_owned(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-shortest".to_string(),
        ];

        if let Some(text) = &job.watermark {
            let (x, y) = WATERMARK_POSITION;
            args.push("-vf".to_string());
            args.push(format!(
                "drawtext=text='{}':fontcolor={}:fontsize={}:x={}:y={}",
                text, WATERMARK_FONT_COLOR, WATERMARK_FONT_SIZE, x, y
            ));
        }

        args.push(job.output.to_string_lossy().to_string());
        args
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        FfmpegTranscoder::new("ffmpeg")
    }
}

impl Transcoder for FfmpegTranscoder {
    fn run(&self, job: &TranscodeJob) -> Result<PathBuf> {
        let args = Self::build_args(job);
        debug!("Running {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| PipelineError::TranscodeFailed {
                diagnostic: format!("failed to spawn {}: {}", self.binary, e),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(PipelineError::TranscodeFailed {
                diagnostic: tail(&stderr),
            });
        }
        if !job.output.exists() {
            return Err(PipelineError::TranscodeFailed {
                diagnostic: format!(
                    "{} exited successfully but produced no output: {}",
                    self.binary,
                    tail(&stderr)
                ),
            });
        }

        info!("Transcoded {:?} + {:?} -> {:?}", job.visual, job.audio, job.output);
        Ok(job.output.clone())
    }
}

fn tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return "no diagnostic output".to_string();
    }
    match trimmed.char_indices().nth_back(DIAGNOSTIC_TAIL_CHARS) {
        Some((idx, _)) => trimmed[idx..].to_string(),
        None => trimmed.to_string(),
    }
}

/// Probe that the configured ffmpeg binary is runnable. Logged at startup so
/// a misconfigured host fails loudly before the first pairing.
pub fn check_ffmpeg(binary: &str) -> bool {
    match Command::new(binary).arg("-version").output() {
        Ok(output) if output.status.success() => {
            let version_info = String::from_utf8_lossy(&output.stdout);
            let version_number = version_info
                .lines()
                .next()
                .unwrap_or("unknown")
                .split_whitespace()
                .nth(2)
                .unwrap_or("unknown");
            info!("{} version: {}", binary, version_number);
            true
        }
        Ok(_) => {
            log::error!(
                "`{}` was found but returned an error. Please ensure it is correctly installed.",
                binary
            );
            false
        }
        Err(_) => {
            log::error!(
                "`{}` is not installed or not available in PATH.",
                binary
            );
            false
        }
    }
}
