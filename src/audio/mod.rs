use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::tools::ToolCommand;

pub mod clip;

/// File name of the downloaded source inside a task's artifact directory.
pub const PRIMARY_ARTIFACT: &str = "audio.m4a";
/// Output template handed to the download tool; it fills in the extension.
const DOWNLOAD_TEMPLATE: &str = "audio.%(ext)s";

/// Noise reduction profile applied when a clip asks for denoising.
const DENOISE_FILTER: &str = "afftdn=nr=20:nf=-25";
/// Vorbis quality on ffmpeg's 0-10 scale.
const OGG_QUALITY: &str = "6";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    M4a,
    Ogg,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::M4a => "m4a",
            AudioFormat::Ogg => "ogg",
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Ogg => "audio/ogg",
        }
    }
}

/// Trim window and effects for one processing request. Times are seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipParams {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub fade_in: f64,
    #[serde(default)]
    pub fade_out: f64,
    #[serde(default)]
    pub denoise: bool,
}

impl ClipParams {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("start", self.start),
            ("end", self.end),
            ("fade_in", self.fade_in),
            ("fade_out", self.fade_out),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(format!("{} must be a finite number", name));
            }
            if value < 0.0 {
                return Err(format!("{} must not be negative", name));
            }
        }
        if self.end <= self.start {
            return Err(format!("end ({}) must be greater than start ({})", self.end, self.start));
        }
        Ok(())
    }
}

/// Artifact directory for `task_id` under the scratch root.
pub fn task_dir(scratch_dir: &Path, task_id: &str) -> PathBuf {
    scratch_dir.join(task_id)
}

pub fn primary_artifact(scratch_dir: &Path, task_id: &str) -> PathBuf {
    task_dir(scratch_dir, task_id).join(PRIMARY_ARTIFACT)
}

/// Builds the download invocation: audio only, re-encoded to m4a at the best
/// quality, written to [`PRIMARY_ARTIFACT`] inside `dir`.
pub fn download_command(tool: &str, url: &str, dir: &Path) -> ToolCommand {
    ToolCommand::new(tool)
        .arg("-x")
        .arg("--audio-format")
        .arg(AudioFormat::M4a.extension())
        .arg("--audio-quality")
        .arg("0")
        .arg("-o")
        .arg(dir.join(DOWNLOAD_TEMPLATE).to_string_lossy())
        .arg(url)
}

/// Composes the ffmpeg audio filter chain for a clip.
///
/// Order is fixed:
/// 1. trim to `[start, end)` and reset timestamps to zero
/// 2. denoise, when requested
/// 3. fade in, when `fade_in > 0`
/// 4. fade out, when `0 < fade_out < end - start`
///
/// A fade-out as long as the clip or longer is dropped rather than given a
/// negative start offset.
pub fn filter_chain(params: &ClipParams) -> String {
    let duration = params.duration();
    let mut filters = vec![format!(
        "atrim=start={}:end={},asetpts=PTS-STARTPTS",
        params.start, params.end
    )];

    if params.denoise {
        filters.push(DENOISE_FILTER.to_string());
    }

    if params.fade_in > 0.0 {
        filters.push(format!("afade=t=in:st=0:d={}", params.fade_in));
    }

    if params.fade_out > 0.0 && params.fade_out < duration {
        let fade_start = duration - params.fade_out;
        filters.push(format!("afade=t=out:st={}:d={}", fade_start, params.fade_out));
    }

    filters.join(",")
}

/// Builds the transcode invocation producing an Ogg Vorbis clip at `output`.
pub fn transcode_command(tool: &str, input: &Path, filters: &str, output: &Path) -> ToolCommand {
    ToolCommand::new(tool)
        .arg("-y")
        .arg("-i")
        .arg(input.to_string_lossy())
        .arg("-af")
        .arg(filters)
        .arg("-c:a")
        .arg("libvorbis")
        .arg("-q:a")
        .arg(OGG_QUALITY)
        .arg(output.to_string_lossy())
}
