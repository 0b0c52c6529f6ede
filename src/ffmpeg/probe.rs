use std::fmt::Display;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{CompressorError, Result};
use crate::ffmpeg::{FFmpeg, display_name};

/// Reported by ffprobe as `bits_per_raw_sample`; most streams leave it `N/A`.
pub const DEFAULT_BIT_DEPTH: u32 = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MediaInfo {
    pub duration_seconds: f64,
    pub resolution: Resolution,
    pub bit_depth: u32,
}

impl FFmpeg {
    /// Runs ffprobe once against the first video stream of `path`.
    pub fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let output = Command::new(self.ffprobe_path())
            .args(["-v", "error"])
            .args(["-select_streams", "v:0"])
            .args(["-show_entries", "stream=duration,width,height,bits_per_raw_sample:format=duration"])
            .args(["-of", "default=noprint_wrappers=1"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied =>
                    CompressorError::tool_missing(display_name(self.ffprobe_path())),
                _ => CompressorError::Io(err),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match stderr.trim() {
                "" => String::from("ffprobe did not exit successfully."),
                msg => format!("ffprobe did not exit successfully: {msg}"),
            };
            return Err(CompressorError::probe_failed(path, &message));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("ffprobe output for {:?}: {}", path, stdout.trim());
        let media_info = parse_probe_output(path, &stdout)?;
        info!(
            "Probed {:?}: duration {}s, resolution {}, bit depth {}",
            path, media_info.duration_seconds, media_info.resolution, media_info.bit_depth
        );
        Ok(media_info)
    }
}

/// Extracts media info from ffprobe's `key=value` output.
///
/// `duration` may be listed once for the stream and once for the container;
/// the first positive value wins so a stream reporting `N/A` falls back to the
/// container duration. Width, height and bit depth are optional.
pub fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo> {
    let mut duration: Option<f64> = None;
    let mut saw_duration: Option<&str> = None;
    let mut width: Option<u32> = None;
    let mut height: Option<u32> = None;
    let mut bit_depth: Option<u32> = None;

    for token in output.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "duration" => {
                if saw_duration.is_none() {
                    saw_duration = Some(value);
                }
                if duration.is_none() {
                    duration = value.parse::<f64>().ok().filter(|d| d.is_finite() && *d > 0.0);
                }
            },
            "width" => { width = width.or_else(|| value.parse().ok()); },
            "height" => { height = height.or_else(|| value.parse().ok()); },
            "bits_per_raw_sample" => { bit_depth = bit_depth.or_else(|| value.parse().ok()); },
            _ => continue,
        }
    }

    let duration_seconds = match (duration, saw_duration) {
        (Some(d), _) => d,
        (None, Some(raw)) => return Err(CompressorError::probe_parse(path, &format!("duration '{raw}' is not a positive number."))),
        (None, None) => return Err(CompressorError::probe_parse(path, "ffprobe did not report a duration.")),
    };

    Ok(MediaInfo {
        duration_seconds,
        resolution: Resolution {
            width: width.unwrap_or(0),
            height: height.unwrap_or(0),
        },
        bit_depth: bit_depth.unwrap_or(DEFAULT_BIT_DEPTH),
    })
}
