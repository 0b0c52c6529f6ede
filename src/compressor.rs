use human_repr::HumanCount;
use tracing::info;

use crate::compression_job::CompressionJob;
use crate::compression_state::CompressionResult;
use crate::error::{CompressorError, Result};
use crate::ffmpeg::{FFmpeg, display_name};
use crate::fstools::{DirEntryCategory, classify_file, file_size};
use crate::supervisor::Supervisor;

/// Runs one job end to end: validation, tool check, probe, then supervision.
pub struct Compressor<'a> {
    ffmpeg: &'a FFmpeg,
    supervisor: Supervisor<'a>,
}

impl<'a> Compressor<'a> {
    pub fn new(ffmpeg: &'a FFmpeg, supervisor: Supervisor<'a>) -> Self {
        Compressor {
            ffmpeg,
            supervisor,
        }
    }

    pub fn compress_file(&mut self, job: &CompressionJob) -> Result<CompressionResult> {
        job.validate()?;
        check_input(job)?;

        self.ffmpeg.require()?;
        if !self.ffmpeg.is_installed() {
            return Err(CompressorError::tool_missing(display_name(self.ffmpeg.ffmpeg_path())));
        }

        let media_info = self.ffmpeg.probe(job.input())?;
        info!("Compressing {:?} ({}, {}s, {}, {}-bit) to fit {} MB",
            job.input(),
            file_size(job.input()).human_count_bytes(),
            media_info.duration_seconds,
            media_info.resolution,
            media_info.bit_depth,
            job.size_budget_mb);

        self.supervisor.run(job, &media_info)
    }
}

fn check_input(job: &CompressionJob) -> Result<()> {
    match classify_file(job.input()) {
        DirEntryCategory::RegularFile => Ok(()),
        DirEntryCategory::DoesNotExist => Err(CompressorError::InputNotFound { path: job.input_path.clone() }),
        DirEntryCategory::Directory => Err(CompressorError::InvalidInput(format!("{:?} is a directory.", job.input()))),
        DirEntryCategory::SymbolicLink => Err(CompressorError::InvalidInput(format!("{:?} is a symlink.", job.input()))),
        DirEntryCategory::Unknown => Err(CompressorError::InvalidInput(format!("Unable to classify {:?}.", job.input()))),
    }
}
