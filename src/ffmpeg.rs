use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{CompressorError, Result};

pub mod arguments;
pub mod probe;

/// Locations of the ffmpeg/ffprobe binaries, either bare names looked up in
/// `PATH` or explicit paths.
#[derive(Clone, Debug)]
pub struct FFmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FFmpeg {
    fn default() -> Self {
        FFmpeg::new()
    }
}

impl FFmpeg {
    pub fn new() -> Self {
        FFmpeg {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }

    pub fn ffmpeg(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg = path.into();
        self
    }

    pub fn ffprobe(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffprobe = path.into();
        self
    }

    pub fn ffmpeg_path(&self) -> &PathBuf {
        &self.ffmpeg
    }

    pub fn ffprobe_path(&self) -> &PathBuf {
        &self.ffprobe
    }

    pub fn is_installed(&self) -> bool {
        let cmd = Command::new(&self.ffmpeg)
            .arg("-version")
            .stdin(Stdio::null())
            .output();
        match cmd {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    /// Resolves both binaries, failing with the first one that is missing.
    pub fn require(&self) -> Result<()> {
        for tool in [&self.ffmpeg, &self.ffprobe] {
            match which::which(tool) {
                Ok(resolved) => debug!("found {} at {:?}", display_name(tool), resolved),
                Err(_) => return Err(CompressorError::tool_missing(display_name(tool))),
            }
        }
        Ok(())
    }
}

pub(crate) fn display_name(tool: &Path) -> String {
    tool.file_name()
        .unwrap_or(tool.as_os_str())
        .to_string_lossy()
        .into_owned()
}
