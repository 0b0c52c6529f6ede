pub mod bitrate;
pub mod cancellation;
pub mod compression_job;
pub mod compression_state;
pub mod compressor;
pub mod error;
pub mod ffmpeg;
pub mod fstools;
pub mod logging;
pub mod progress;
pub mod prompt;
pub mod supervisor;

#[cfg(all(test, unix))]
mod test_support;

use std::path::Path;
use std::process::ExitCode;

use human_repr::HumanCount;
use rustop::opts;
use tracing::{error, info, warn};

use cancellation::CancellationToken;
use compression_job::{CompressionJob, split_extra_args};
use compression_state::CompressionResult;
use compressor::Compressor;
use error::CompressorError;
use ffmpeg::FFmpeg;
use progress::{BarIndicator, Hidden, ProgressIndicator, SharedBar};
use prompt::{AssumeYes, OverwritePrompt, StdinPrompt};
use supervisor::Supervisor;

fn main() -> ExitCode {
    let (args, _rest) = opts! {
        synopsis "Compress a video with ffmpeg so that it fits a target file size.";
        opt input:Option<String>, desc:"Input video file. (required)";
        opt output:Option<String>, desc:"Output video file. (required)";
        opt max_size_mb:Option<u64>, desc:"Target output size in MB. (required)";
        opt log_dir:String=String::from("logs"), desc:"Directory holding ffmpeg.log.";
        opt extra_args:String=String::new(), desc:"Additional ffmpeg arguments, split on whitespace.";
        opt verbosity:u8=0, desc:"2 logs to the console, 3 adds ffmpeg's output, 4 adds debug output.";
        opt cpu_limit:Option<usize>, desc:"Maximum number of ffmpeg threads. (default: number of CPUs)";
        opt remove_original:bool=false, desc:"Delete the input file after a successful compression.";
        opt overwrite:bool=false, desc:"Overwrite an existing output file without asking.";
        opt quiet:bool=false, desc:"Don't draw a progress bar.";
        opt ffmpeg:String=String::from("ffmpeg"), desc:"ffmpeg binary to use.";
        opt ffprobe:String=String::from("ffprobe"), desc:"ffprobe binary to use.";
    }.parse_or_exit();

    let (Some(input), Some(output), Some(max_size_mb)) = (args.input, args.output, args.max_size_mb) else {
        println!("--input, --output and --max-size-mb are required. See --help.");
        return ExitCode::FAILURE;
    };

    let pbar = SharedBar::new();
    let (dispatch, _guard) = match logging::init(Path::new(&args.log_dir), args.verbosity, pbar.clone()) {
        Ok(logging) => logging,
        Err(err) => {
            println!("Unable to open the log file in {:?}: {err}", args.log_dir);
            return ExitCode::FAILURE;
        },
    };

    let mut job = CompressionJob::new(input, output, max_size_mb)
        .extra_encoder_args(split_extra_args(&args.extra_args))
        .delete_source_on_success(args.remove_original);
    if let Some(cpu_limit) = args.cpu_limit {
        job = job.concurrency_limit(cpu_limit);
    }

    let ffmpeg = FFmpeg::new().ffmpeg(&args.ffmpeg).ffprobe(&args.ffprobe);
    let prompt: Box<dyn OverwritePrompt> = match args.overwrite {
        true => Box::new(AssumeYes),
        false => Box::new(StdinPrompt),
    };
    let progress: Box<dyn ProgressIndicator> = match args.quiet {
        true => Box::new(Hidden),
        false => Box::new(BarIndicator::shared(pbar)),
    };

    tracing::dispatcher::with_default(&dispatch, || {
        let cancellation = CancellationToken::new();
        if let Err(err) = cancellation.register_signals() {
            warn!("Unable to install signal handlers; Ctrl-C will not stop ffmpeg cleanly: {err}");
        }

        let supervisor = Supervisor::new(&ffmpeg, cancellation)
            .logger(dispatch.clone())
            .prompt(prompt)
            .progress(progress)
            .verbosity(args.verbosity);
        let mut compressor = Compressor::new(&ffmpeg, supervisor);

        info!("Job start: {:?} -> {:?} ({} MB, {} threads)",
            job.input(), job.output(), job.size_budget_mb, job.concurrency_limit);
        match compressor.compress_file(&job) {
            Ok(result) => report(&job, result),
            Err(err) => {
                error!("{err}");
                println!("Failure -__-\n{err}");
                ExitCode::FAILURE
            },
        }
    })
}

fn report(job: &CompressionJob, result: CompressionResult) -> ExitCode {
    if result.success {
        println!("Finished compressing video from {:?} to {:?} it took {:.2} Seconds ({})",
            job.input(), job.output(), result.elapsed.as_secs_f64(), result.output_bytes.human_count_bytes());
        if let Some(err) = result.error {
            println!("Warning: {err}");
        }
        return ExitCode::SUCCESS;
    }

    match result.error {
        Some(err) if err.is_benign() => {
            println!("Operation cancelled.");
            ExitCode::SUCCESS
        },
        Some(CompressorError::Interrupted) => {
            println!("\nTerminated by user. Cleaning up...");
            ExitCode::FAILURE
        },
        Some(err) => {
            println!("Failure -__-\n{err}");
            ExitCode::FAILURE
        },
        None => ExitCode::FAILURE,
    }
}
