use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::prelude::*;

use crate::progress::SharedBar;

pub const LOG_FILE_NAME: &str = "ffmpeg.log";

/// Console output starts at `-v 2`; the log file always records INFO.
fn console_level(verbosity: u8) -> Option<LevelFilter> {
    match verbosity {
        0 | 1 => None,
        2 | 3 => Some(LevelFilter::INFO),
        _ => Some(LevelFilter::DEBUG),
    }
}

/// Collects one formatted event and hands it to the progress bar as a single
/// line when dropped.
pub struct ConsoleLine {
    pbar: SharedBar,
    buf: Vec<u8>,
}

impl Write for ConsoleLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleLine {
    fn drop(&mut self) {
        if !self.buf.is_empty() {
            let _ = self.pbar.print_line(&String::from_utf8_lossy(&self.buf));
        }
    }
}

impl<'a> MakeWriter<'a> for SharedBar {
    type Writer = ConsoleLine;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleLine { pbar: self.clone(), buf: Vec::new() }
    }
}

/// Builds the dispatcher handed to every component. Nothing is installed
/// globally; callers enter it with `tracing::dispatcher::with_default`.
///
/// The returned guard flushes the log file when dropped and must outlive
/// every use of the dispatcher. Console records go to `console`, normally the
/// `SharedBar` the progress bar draws into.
pub fn init<W>(log_dir: &Path, verbosity: u8, console: W) -> io::Result<(Dispatch, WorkerGuard)>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fs::create_dir_all(log_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE_NAME))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);
    let console_layer = console_level(verbosity).map(|level| {
        fmt::layer()
            .with_writer(console)
            .with_target(false)
            .with_filter(level)
    });

    let subscriber = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer);
    Ok((Dispatch::new(subscriber), guard))
}
