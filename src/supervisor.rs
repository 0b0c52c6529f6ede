use std::fs;
use std::io::{self, BufRead, BufReader, PipeReader};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use human_repr::HumanCount;
use tracing::{Dispatch, debug, error, info, warn};

use crate::bitrate::{bitrate_kbps, encoder_kbps};
use crate::cancellation::CancellationToken;
use crate::compression_job::CompressionJob;
use crate::compression_state::{CompressionResult, SupervisorState};
use crate::error::{CompressorError, Result};
use crate::ffmpeg::arguments::build_args;
use crate::ffmpeg::probe::MediaInfo;
use crate::ffmpeg::{FFmpeg, display_name};
use crate::fstools::remove_if_exists;
use crate::progress::{BarIndicator, Hidden, ProgressIndicator, ProgressSample};
use crate::prompt::{OverwritePrompt, StdinPrompt};

/// How often the output file is sampled and the child polled for exit.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// ffmpeg's own output is only logged at the highest verbosity.
const ENCODER_OUTPUT_VERBOSITY: u8 = 3;

enum Exit {
    Exited(ExitStatus),
    Interrupted,
}

/// Launches ffmpeg for one job and watches it until it exits.
pub struct Supervisor<'a> {
    ffmpeg: &'a FFmpeg,
    cancellation: CancellationToken,
    dispatch: Dispatch,
    prompt: Box<dyn OverwritePrompt + 'a>,
    progress: Box<dyn ProgressIndicator + 'a>,
    verbosity: u8,
    poll_interval: Duration,
    state: SupervisorState,
}

impl<'a> Supervisor<'a> {
    pub fn new(ffmpeg: &'a FFmpeg, cancellation: CancellationToken) -> Self {
        Supervisor {
            ffmpeg,
            cancellation,
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
            prompt: Box::new(StdinPrompt),
            progress: Box::new(BarIndicator::new()),
            verbosity: 0,
            poll_interval: POLL_INTERVAL,
            state: SupervisorState::Idle,
        }
    }

    /// Dispatcher re-entered by the drainer and poller threads.
    pub fn logger(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn prompt(mut self, prompt: Box<dyn OverwritePrompt + 'a>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn progress(mut self, progress: Box<dyn ProgressIndicator + 'a>) -> Self {
        self.progress = progress;
        self
    }

    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    fn transition(&mut self, state: SupervisorState) {
        debug!("supervisor {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    pub fn run(&mut self, job: &CompressionJob, media_info: &MediaInfo) -> Result<CompressionResult> {
        self.state = SupervisorState::Idle;
        let kbps = encoder_kbps(bitrate_kbps(job.size_budget_mb, media_info.duration_seconds)?);

        if job.output().exists() {
            let confirmed = self.prompt.confirm_overwrite(job.output())?;
            if self.cancellation.is_cancelled() {
                return Ok(self.cancelled(CompressorError::Interrupted));
            }
            if !confirmed {
                info!("Declined to overwrite {:?}", job.output());
                return Ok(self.cancelled(CompressorError::UserDeclinedOverwrite { path: job.output_path.clone() }));
            }
            fs::remove_file(job.output())?;
            info!("Removed existing {:?}", job.output());
        }

        if self.cancellation.is_cancelled() {
            return Ok(self.cancelled(CompressorError::Interrupted));
        }

        self.transition(SupervisorState::Launching);
        let args = build_args(job, kbps);
        debug!("{} {}",
            self.ffmpeg.ffmpeg_path().display(),
            args.iter().map(|a| format!("{:?}", a)).collect::<Vec<String>>().join(" "));

        // stdout and stderr share one pipe; the command (and its copies of the
        // write end) is dropped right after spawning so the drainer sees EOF
        let (reader, writer) = io::pipe()?;
        let started = Instant::now();
        let mut child = {
            let mut cmd = Command::new(self.ffmpeg.ffmpeg_path());
            cmd.args(&args)
                .stdin(Stdio::null())
                .stdout(writer.try_clone()?)
                .stderr(writer);
            cmd.spawn().map_err(|err| match err.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied =>
                    CompressorError::tool_missing(display_name(self.ffmpeg.ffmpeg_path())),
                _ => CompressorError::Io(err),
            })?
        };
        info!("Started compressing video from {:?} to {:?} with bitrate {} kbps ({} threads, pid {})",
            job.input(), job.output(), kbps, job.concurrency_limit, child.id());

        self.transition(SupervisorState::Running);
        let budget = job.size_budget_bytes();
        let label = job.output().file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let mut progress = std::mem::replace(&mut self.progress, Box::new(Hidden));
        progress.start(budget, &label);

        let dispatch = self.dispatch.clone();
        let cancellation = self.cancellation.clone();
        let verbosity = self.verbosity;
        let tick = self.poll_interval;
        let finished = AtomicBool::new(false);

        let exit = thread::scope(|scope| {
            let drainer = scope.spawn(|| drain_output(reader, &dispatch, verbosity));
            let poller = scope.spawn(|| {
                poll_output_size(job.output(), budget, started, progress.as_mut(), &finished, tick, &dispatch)
            });

            let exit = wait_for_exit(&mut child, &cancellation, tick);
            finished.store(true, Ordering::Release);

            self.transition(SupervisorState::Joining);
            if drainer.join().is_err() {
                error!("ffmpeg output reader panicked");
            }
            if poller.join().is_err() {
                error!("progress poller panicked");
            }
            exit
        });

        let elapsed = started.elapsed();
        let final_sample = ProgressSample::observe(job.output(), started);
        progress.finish(final_sample.displayed(budget));
        self.progress = progress;

        self.conclude(job, exit, elapsed, final_sample.bytes_written)
    }

    /// Maps how ffmpeg ended onto the job result, cleaning up the output and
    /// source as needed.
    fn conclude(&mut self, job: &CompressionJob, exit: io::Result<Exit>, elapsed: Duration, bytes_written: u64) -> Result<CompressionResult> {
        let result = match exit {
            Err(err) => {
                error!("Lost track of ffmpeg while compressing {:?}: {err}", job.input());
                discard_partial_output(job.output());
                self.transition(SupervisorState::Done);
                return Err(CompressorError::Io(err));
            },
            Ok(Exit::Exited(status)) if status.success() => {
                info!("Finished compressing video from {:?} to {:?} it took {:.2} Seconds ({})",
                    job.input(), job.output(), elapsed.as_secs_f64(), bytes_written.human_count_bytes());
                self.transition(SupervisorState::Done);
                let mut result = CompressionResult::completed(elapsed, bytes_written);
                if job.delete_source_on_success {
                    match fs::remove_file(job.input()) {
                        Ok(()) => info!("Removed original {:?}", job.input()),
                        Err(err) => {
                            error!("Unable to remove original {:?}: {err}", job.input());
                            result.error = Some(CompressorError::Io(err));
                        },
                    }
                }
                result
            },
            // ffmpeg shares our terminal and usually dies of the same SIGINT
            // before the token is noticed
            Ok(Exit::Exited(_) | Exit::Interrupted) if self.cancellation.is_cancelled() => {
                warn!("Compression of {:?} interrupted after {:.2} Seconds", job.input(), elapsed.as_secs_f64());
                discard_partial_output(job.output());
                self.transition(SupervisorState::Cancelled);
                CompressionResult::cancelled(CompressorError::Interrupted, elapsed)
            },
            Ok(Exit::Exited(status)) => {
                let err = CompressorError::EncoderFailed { code: status.code() };
                error!("Compressing {:?} failed: {err}", job.input());
                discard_partial_output(job.output());
                self.transition(SupervisorState::Done);
                CompressionResult::failed(err, elapsed)
            },
            Ok(Exit::Interrupted) => {
                discard_partial_output(job.output());
                self.transition(SupervisorState::Cancelled);
                CompressionResult::cancelled(CompressorError::Interrupted, elapsed)
            },
        };
        debug_assert!(self.state.is_terminal());
        Ok(result)
    }

    fn cancelled(&mut self, error: CompressorError) -> CompressionResult {
        self.transition(SupervisorState::Cancelled);
        CompressionResult::cancelled(error, Duration::ZERO)
    }
}

/// Polls for exit on every tick, killing the child once cancellation is
/// requested. The child is always reaped before returning.
fn wait_for_exit(child: &mut Child, cancellation: &CancellationToken, tick: Duration) -> io::Result<Exit> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Exit::Exited(status)),
            Ok(None) => (),
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            },
        }

        if cancellation.is_cancelled() {
            warn!("Caught stop signal; killing ffmpeg ({})", child.id());
            if let Err(err) = child.kill() {
                warn!("error killing ffmpeg process ({}) {err:?}", child.id());
            }
            child.wait()?;
            return Ok(Exit::Interrupted);
        }

        thread::sleep(tick);
    }
}

/// Reads up to the next `\r` or `\n` into `segment`, dropping the
/// terminator. Returns `false` once the reader is exhausted.
fn read_segment(reader: &mut impl BufRead, segment: &mut Vec<u8>) -> io::Result<bool> {
    segment.clear();
    loop {
        let available = match reader.fill_buf() {
            Ok(available) => available,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        if available.is_empty() {
            return Ok(!segment.is_empty());
        }
        match available.iter().position(|&b| b == b'\r' || b == b'\n') {
            Some(end) => {
                segment.extend_from_slice(&available[..end]);
                reader.consume(end + 1);
                return Ok(true);
            },
            None => {
                let read = available.len();
                segment.extend_from_slice(available);
                reader.consume(read);
            },
        }
    }
}

/// Reads the child's combined output until EOF so it never blocks on a full
/// pipe. ffmpeg redraws its stats line with `\r`, so each `\r` or `\n`
/// ends a line and it is logged as soon as it arrives.
fn drain_output(reader: PipeReader, dispatch: &Dispatch, verbosity: u8) {
    tracing::dispatcher::with_default(dispatch, || {
        let mut reader = BufReader::new(reader);
        let mut segment = Vec::new();
        loop {
            match read_segment(&mut reader, &mut segment) {
                Ok(true) => {
                    if verbosity < ENCODER_OUTPUT_VERBOSITY {
                        continue;
                    }
                    let line = String::from_utf8_lossy(&segment);
                    let line = line.trim();
                    if !line.is_empty() {
                        info!(target: "ffmpeg", "{line}");
                    }
                },
                Ok(false) => break,
                Err(err) => {
                    warn!("error reading ffmpeg output: {err}");
                    break;
                },
            }
        }
    })
}

fn poll_output_size(
    output: &Path,
    budget: u64,
    started: Instant,
    progress: &mut dyn ProgressIndicator,
    finished: &AtomicBool,
    tick: Duration,
    dispatch: &Dispatch,
) {
    tracing::dispatcher::with_default(dispatch, || {
        while !finished.load(Ordering::Acquire) {
            let sample = ProgressSample::observe(output, started);
            progress.update(sample.displayed(budget));
            thread::sleep(tick);
        }
    })
}

fn discard_partial_output(output: &Path) {
    match remove_if_exists(output) {
        Ok(true) => info!("Removed partial output {:?}", output),
        Ok(false) => (),
        Err(err) => warn!("Unable to remove partial output {:?}: {err}", output),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::sync::{Arc, Mutex};
    use crate::ffmpeg::probe::Resolution;
    use crate::test_support::write_script;

    const MB: u64 = 1024 * 1024;

    #[derive(Clone, Default)]
    struct Recorded {
        budget: Arc<Mutex<Option<u64>>>,
        updates: Arc<Mutex<Vec<u64>>>,
        finished: Arc<Mutex<Option<u64>>>,
    }

    struct RecordingIndicator(Recorded);

    impl ProgressIndicator for RecordingIndicator {
        fn start(&mut self, budget_bytes: u64, _label: &str) {
            *self.0.budget.lock().unwrap() = Some(budget_bytes);
        }

        fn update(&mut self, bytes: u64) {
            self.0.updates.lock().unwrap().push(bytes);
        }

        fn finish(&mut self, bytes: u64) {
            *self.0.finished.lock().unwrap() = Some(bytes);
        }
    }

    struct Decline;

    impl OverwritePrompt for Decline {
        fn confirm_overwrite(&self, _path: &Path) -> io::Result<bool> {
            Ok(false)
        }
    }

    struct Accept;

    impl OverwritePrompt for Accept {
        fn confirm_overwrite(&self, _path: &Path) -> io::Result<bool> {
            Ok(true)
        }
    }

    struct CancelDuringPrompt(CancellationToken);

    impl OverwritePrompt for CancelDuringPrompt {
        fn confirm_overwrite(&self, _path: &Path) -> io::Result<bool> {
            self.0.cancel();
            Ok(true)
        }
    }

    /// Sets the token only after ffmpeg has exited, like a SIGINT that
    /// reached ffmpeg before the supervisor noticed it.
    struct CancelOnFinish(CancellationToken);

    impl ProgressIndicator for CancelOnFinish {
        fn start(&mut self, _budget_bytes: u64, _label: &str) {}

        fn update(&mut self, _bytes: u64) {}

        fn finish(&mut self, _bytes: u64) {
            self.0.cancel();
        }
    }

    fn media_info() -> MediaInfo {
        MediaInfo {
            duration_seconds: 60.0,
            resolution: Resolution { width: 1920, height: 1080 },
            bit_depth: 8,
        }
    }

    /// Fake encoder: writes `kib` KiB to the last argument, then runs `tail`.
    fn encoder(dir: &Path, kib: u64, tail: &str) -> FFmpeg {
        let body = format!(
            "for last; do :; done\necho \"frame=1 size=0kB\"\ndd if=/dev/zero of=\"$last\" bs=1024 count={kib} 2>/dev/null\n{tail}"
        );
        FFmpeg::new().ffmpeg(write_script(dir, "ffmpeg", &body))
    }

    fn supervisor<'a>(ffmpeg: &'a FFmpeg, recorded: &Recorded) -> Supervisor<'a> {
        Supervisor::new(ffmpeg, CancellationToken::new())
            .progress(Box::new(RecordingIndicator(recorded.clone())))
            .prompt(Box::new(Decline))
            .poll_interval(Duration::from_millis(20))
    }

    fn job(dir: &Path, budget_mb: u64) -> CompressionJob {
        let input = dir.join("input.mkv");
        fs::write(&input, b"source").unwrap();
        CompressionJob::new(input, dir.join("output.mp4"), budget_mb).concurrency_limit(2)
    }

    #[test]
    fn test_run_success_clamps_progress() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = encoder(dir.path(), 3 * 1024, "sleep 0.2");
        let recorded = Recorded::default();
        let mut supervisor = supervisor(&ffmpeg, &recorded);
        let job = job(dir.path(), 2);

        let before = Instant::now();
        let result = supervisor.run(&job, &media_info()).unwrap();
        let wall_clock = before.elapsed();

        assert!(result.success, "{:?}", result.error);
        assert!(result.error.is_none());
        assert_eq!(result.state, SupervisorState::Done);
        assert_eq!(supervisor.state(), SupervisorState::Done);
        assert_eq!(result.output_bytes, 3 * MB);
        assert!(result.elapsed <= wall_clock);

        assert_eq!(*recorded.budget.lock().unwrap(), Some(2 * MB));
        let updates = recorded.updates.lock().unwrap();
        assert!(!updates.is_empty());
        assert!(updates.iter().all(|&bytes| bytes <= 2 * MB), "{updates:?}");
        assert_eq!(*recorded.finished.lock().unwrap(), Some(2 * MB));

        assert!(job.input().exists());
    }

    #[test]
    fn test_run_deletes_source_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = encoder(dir.path(), 16, "exit 0");
        let mut supervisor = supervisor(&ffmpeg, &Recorded::default());
        let job = job(dir.path(), 1).delete_source_on_success(true);

        let result = supervisor.run(&job, &media_info()).unwrap();
        assert!(result.success);
        assert!(!job.input().exists());
        assert!(job.output().exists());
    }

    #[test]
    fn test_run_declined_overwrite_launches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("launched");
        let ffmpeg = FFmpeg::new().ffmpeg(write_script(dir.path(), "ffmpeg", &format!("touch {:?}", marker)));
        let recorded = Recorded::default();
        let mut supervisor = supervisor(&ffmpeg, &recorded);
        let job = job(dir.path(), 1);
        fs::write(job.output(), b"previous output").unwrap();

        let result = supervisor.run(&job, &media_info()).unwrap();

        assert!(!result.success);
        assert_eq!(result.state, SupervisorState::Cancelled);
        assert!(matches!(result.error, Some(CompressorError::UserDeclinedOverwrite { .. })));
        assert!(!marker.exists());
        assert_eq!(fs::read(job.output()).unwrap(), b"previous output");
        assert!(recorded.budget.lock().unwrap().is_none());
    }

    #[test]
    fn test_run_confirmed_overwrite_replaces_output() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = encoder(dir.path(), 8, "exit 0");
        let mut supervisor = supervisor(&ffmpeg, &Recorded::default()).prompt(Box::new(Accept));
        let job = job(dir.path(), 1);
        fs::write(job.output(), b"previous output").unwrap();

        let result = supervisor.run(&job, &media_info()).unwrap();
        assert!(result.success);
        assert_eq!(fs::metadata(job.output()).unwrap().len(), 8 * 1024);
    }

    #[test]
    fn test_run_passes_discrete_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let argv = dir.path().join("argv.txt");
        let body = format!("for arg; do printf '%s\\n' \"$arg\"; done > {:?}", argv);
        let ffmpeg = FFmpeg::new().ffmpeg(write_script(dir.path(), "ffmpeg", &body));
        let mut supervisor = supervisor(&ffmpeg, &Recorded::default());
        let job = job(dir.path(), 10)
            .extra_encoder_args(vec![String::from("-metadata"), String::from("title=a;b")]);

        supervisor.run(&job, &media_info()).unwrap();

        let recorded = fs::read_to_string(&argv).unwrap();
        let lines: Vec<&str> = recorded.lines().collect();
        assert_eq!(lines, vec![
            "-hide_banner", "-nostdin",
            "-i", job.input().to_str().unwrap(),
            "-b:v", "1365k",
            "-bufsize", "1365k",
            "-threads", "2",
            "-metadata", "title=a;b",
            job.output().to_str().unwrap(),
        ]);
    }

    #[test]
    fn test_run_nonzero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = encoder(dir.path(), 16, "echo 'Conversion failed!' >&2\nexit 3");
        let mut supervisor = supervisor(&ffmpeg, &Recorded::default());
        let job = job(dir.path(), 1).delete_source_on_success(true);

        let result = supervisor.run(&job, &media_info()).unwrap();

        assert!(!result.success);
        assert_eq!(result.state, SupervisorState::Done);
        assert!(matches!(result.error, Some(CompressorError::EncoderFailed { code: Some(3) })));
        assert!(!job.output().exists());
        assert!(job.input().exists());
    }

    #[test]
    fn test_run_interrupt_kills_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = encoder(dir.path(), 4, "exec sleep 30");
        let cancellation = CancellationToken::new();
        let mut supervisor = supervisor(&ffmpeg, &Recorded::default());
        supervisor.cancellation = cancellation.clone();
        let job = job(dir.path(), 1).delete_source_on_success(true);

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            cancellation.cancel();
        });
        let before = Instant::now();
        let result = supervisor.run(&job, &media_info()).unwrap();
        canceller.join().unwrap();

        assert!(before.elapsed() < Duration::from_secs(10));
        assert!(!result.success);
        assert_eq!(result.state, SupervisorState::Cancelled);
        assert!(matches!(result.error, Some(CompressorError::Interrupted)));
        assert!(!job.output().exists());
        assert!(job.input().exists());
    }

    #[test]
    fn test_run_rejects_invalid_duration_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("launched");
        let ffmpeg = FFmpeg::new().ffmpeg(write_script(dir.path(), "ffmpeg", &format!("touch {:?}", marker)));
        let mut supervisor = supervisor(&ffmpeg, &Recorded::default());
        let job = job(dir.path(), 1);
        let media_info = MediaInfo { duration_seconds: 0.0, ..media_info() };

        assert!(matches!(supervisor.run(&job, &media_info), Err(CompressorError::InvalidInput(_))));
        assert!(!marker.exists());
    }

    #[test]
    fn test_run_missing_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = FFmpeg::new().ffmpeg(dir.path().join("ffmpeg"));
        let mut supervisor = supervisor(&ffmpeg, &Recorded::default());
        let job = job(dir.path(), 1);

        assert!(matches!(supervisor.run(&job, &media_info()), Err(CompressorError::ToolMissing { .. })));
    }

    #[test]
    fn test_run_encoder_killed_by_interrupt() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = encoder(dir.path(), 16, "echo 'Exiting normally, received signal 2.' >&2\nexit 255");
        let cancellation = CancellationToken::new();
        let mut supervisor = supervisor(&ffmpeg, &Recorded::default())
            .progress(Box::new(CancelOnFinish(cancellation.clone())));
        supervisor.cancellation = cancellation;
        let job = job(dir.path(), 1).delete_source_on_success(true);

        let result = supervisor.run(&job, &media_info()).unwrap();

        assert!(!result.success);
        assert_eq!(result.state, SupervisorState::Cancelled);
        assert_eq!(supervisor.state(), SupervisorState::Cancelled);
        assert!(matches!(result.error, Some(CompressorError::Interrupted)));
        assert!(!job.output().exists());
        assert!(job.input().exists());
    }

    #[test]
    fn test_run_interrupt_during_overwrite_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("launched");
        let ffmpeg = FFmpeg::new().ffmpeg(write_script(dir.path(), "ffmpeg", &format!("touch {:?}", marker)));
        let cancellation = CancellationToken::new();
        let recorded = Recorded::default();
        let mut supervisor = supervisor(&ffmpeg, &recorded)
            .prompt(Box::new(CancelDuringPrompt(cancellation.clone())));
        supervisor.cancellation = cancellation;
        let job = job(dir.path(), 1);
        fs::write(job.output(), b"previous output").unwrap();

        let result = supervisor.run(&job, &media_info()).unwrap();

        assert!(!result.success);
        assert_eq!(result.state, SupervisorState::Cancelled);
        assert!(matches!(result.error, Some(CompressorError::Interrupted)));
        assert!(!marker.exists());
        assert_eq!(fs::read(job.output()).unwrap(), b"previous output");
        assert!(recorded.budget.lock().unwrap().is_none());
    }

    #[test]
    fn test_lost_child_discards_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = FFmpeg::new();
        let mut supervisor = supervisor(&ffmpeg, &Recorded::default());
        let job = job(dir.path(), 1).delete_source_on_success(true);
        fs::write(job.output(), b"partial").unwrap();
        supervisor.transition(SupervisorState::Joining);

        let exit = Err(io::Error::other("try_wait failed"));
        let result = supervisor.conclude(&job, exit, Duration::from_secs(1), 7);

        assert!(matches!(result, Err(CompressorError::Io(_))));
        assert_eq!(supervisor.state(), SupervisorState::Done);
        assert!(!job.output().exists());
        assert!(job.input().exists());
    }

    #[test]
    fn test_read_segment_splits_on_carriage_return_and_newline() {
        let mut reader = BufReader::with_capacity(4, Cursor::new(b"frame=1\rframe=2\r\nvideo:1kB\nEnd".to_vec()));
        let mut segment = Vec::new();
        let mut segments = Vec::new();
        while read_segment(&mut reader, &mut segment).unwrap() {
            segments.push(String::from_utf8(segment.clone()).unwrap());
        }
        assert_eq!(segments, vec!["frame=1", "frame=2", "", "video:1kB", "End"]);
        assert!(!read_segment(&mut reader, &mut segment).unwrap());
    }

    #[test]
    fn test_drain_logs_stats_lines_while_encoder_runs() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join(crate::logging::LOG_FILE_NAME);
        let (dispatch, guard) = crate::logging::init(dir.path(), ENCODER_OUTPUT_VERBOSITY, io::sink).unwrap();
        let (reader, mut writer) = io::pipe().unwrap();
        let drainer = thread::spawn(move || drain_output(reader, &dispatch, ENCODER_OUTPUT_VERBOSITY));

        writer.write_all(b"frame=   10 fps=25.0 size=256kB\rframe=   20 fps=25.0 size=512kB\r").unwrap();
        writer.flush().unwrap();

        // the writer stays open, so both lines must be logged before EOF
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut logged = String::new();
        while Instant::now() < deadline {
            logged = fs::read_to_string(&log_file).unwrap_or_default();
            if logged.contains("frame=   20") {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(logged.contains("frame=   10 fps=25.0 size=256kB"), "{logged:?}");
        assert!(logged.contains("frame=   20 fps=25.0 size=512kB"), "{logged:?}");
        assert!(!drainer.is_finished());

        writer.write_all(b"\nvideo:1024kB audio:0kB\n").unwrap();
        drop(writer);
        drainer.join().unwrap();
        drop(guard);

        let logged = fs::read_to_string(&log_file).unwrap();
        let lines: Vec<&str> = logged.lines().filter(|line| line.contains("ffmpeg:")).collect();
        assert_eq!(lines.len(), 3, "{logged:?}");
        assert!(lines[2].ends_with("video:1024kB audio:0kB"));
    }
}
