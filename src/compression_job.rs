use std::path::{Path, PathBuf};

use crate::error::{CompressorError, Result};

const BYTES_PER_MEGABYTE: u64 = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct CompressionJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub size_budget_mb: u64,
    pub concurrency_limit: usize,
    pub extra_encoder_args: Vec<String>,
    pub delete_source_on_success: bool,
}

impl CompressionJob {
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>, size_budget_mb: u64) -> Self {
        CompressionJob {
            input_path: input_path.into(),
            output_path: output_path.into(),
            size_budget_mb,
            concurrency_limit: num_cpus::get(),
            extra_encoder_args: vec![],
            delete_source_on_success: false,
        }
    }

    pub fn concurrency_limit(mut self, concurrency_limit: usize) -> Self {
        self.concurrency_limit = concurrency_limit;
        self
    }

    pub fn extra_encoder_args(mut self, extra_encoder_args: Vec<String>) -> Self {
        self.extra_encoder_args = extra_encoder_args;
        self
    }

    pub fn delete_source_on_success(mut self, delete_source_on_success: bool) -> Self {
        self.delete_source_on_success = delete_source_on_success;
        self
    }

    pub fn size_budget_bytes(&self) -> u64 {
        self.size_budget_mb.saturating_mul(BYTES_PER_MEGABYTE)
    }

    pub fn input(&self) -> &Path {
        &self.input_path
    }

    pub fn output(&self) -> &Path {
        &self.output_path
    }

    pub fn validate(&self) -> Result<()> {
        if self.size_budget_mb == 0 {
            return Err(CompressorError::InvalidInput(String::from("--max-size-mb must be greater than 0.")));
        }
        if self.concurrency_limit == 0 {
            return Err(CompressorError::InvalidInput(String::from("--cpu-limit must be at least 1.")));
        }
        if self.input_path == self.output_path {
            return Err(CompressorError::InvalidInput(format!("input and output are both {:?}.", self.input_path)));
        }
        Ok(())
    }
}

/// Splits a passthrough string on whitespace. Quotes are not interpreted.
pub fn split_extra_args(extra_args: &str) -> Vec<String> {
    extra_args.split_whitespace().map(String::from).collect()
}
