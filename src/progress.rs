use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use kdam::{Bar, BarExt, term, tqdm};

use crate::fstools::file_size;

/// Bytes written to the output file so far, sampled from disk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressSample {
    pub bytes_written: u64,
    pub elapsed: Duration,
}

impl ProgressSample {
    pub fn observe(output: &Path, started: Instant) -> Self {
        ProgressSample {
            bytes_written: file_size(output),
            elapsed: started.elapsed(),
        }
    }

    /// Value shown on the indicator; never above the budget even when the
    /// encoder overshoots it on disk.
    pub fn displayed(&self, budget_bytes: u64) -> u64 {
        self.bytes_written.min(budget_bytes)
    }
}

pub trait ProgressIndicator: Send {
    fn start(&mut self, budget_bytes: u64, label: &str);

    fn update(&mut self, bytes: u64);

    fn finish(&mut self, bytes: u64);
}

/// The bar currently on screen, if any. Console log lines go through it so
/// they are printed above the bar instead of through it.
#[derive(Clone, Default)]
pub struct SharedBar(Arc<Mutex<Option<Bar>>>);

impl SharedBar {
    pub fn new() -> Self {
        SharedBar::default()
    }

    fn with_bar<R>(&self, f: impl FnOnce(&mut Option<Bar>) -> R) -> R {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut slot)
    }

    pub fn is_drawn(&self) -> bool {
        self.with_bar(|slot| slot.is_some())
    }

    /// Prints one line of text, above the bar while one is drawn and straight
    /// to stderr otherwise. Returns whether a bar was drawn.
    pub fn print_line(&self, text: &str) -> io::Result<bool> {
        let text = text.trim_end_matches(['\r', '\n']);
        self.with_bar(|slot| match slot {
            Some(pbar) => pbar.write(text).map(|()| true),
            None => writeln!(io::stderr().lock(), "{text}").map(|()| false),
        })
    }

    #[cfg(test)]
    pub(crate) fn redirect_to(&self, file: std::fs::File) {
        self.with_bar(|slot| {
            if let Some(pbar) = slot.as_mut() {
                pbar.writer = term::InitializedOutput::Tty(file);
            }
        })
    }
}

/// Terminal progress bar measured in bytes against the size budget.
pub struct BarIndicator {
    pbar: SharedBar,
}

impl BarIndicator {
    pub fn new() -> Self {
        BarIndicator::shared(SharedBar::new())
    }

    /// Draws into `pbar`, which the console log writer also holds.
    pub fn shared(pbar: SharedBar) -> Self {
        BarIndicator { pbar }
    }
}

impl Default for BarIndicator {
    fn default() -> Self {
        BarIndicator::new()
    }
}

impl ProgressIndicator for BarIndicator {
    fn start(&mut self, budget_bytes: u64, label: &str) {
        term::init(false);
        let pbar = tqdm!(
            total = usize::try_from(budget_bytes).unwrap_or(usize::MAX),
            desc = label.to_string(),
            unit = "B",
            unit_scale = true,
            unit_divisor = 1024,
            position = 0,
            force_refresh = true
        );
        self.pbar.with_bar(|slot| *slot = Some(pbar));
    }

    fn update(&mut self, bytes: u64) {
        self.pbar.with_bar(|slot| {
            if let Some(pbar) = slot.as_mut() {
                let _ = pbar.update_to(usize::try_from(bytes).unwrap_or(usize::MAX));
            }
        })
    }

    fn finish(&mut self, bytes: u64) {
        self.pbar.with_bar(|slot| {
            if let Some(mut pbar) = slot.take() {
                let _ = pbar.update_to(usize::try_from(bytes).unwrap_or(usize::MAX));
                let _ = pbar.refresh();
                eprintln!();
            }
        })
    }
}

/// Draws nothing.
pub struct Hidden;

impl ProgressIndicator for Hidden {
    fn start(&mut self, _budget_bytes: u64, _label: &str) {}

    fn update(&mut self, _bytes: u64) {}

    fn finish(&mut self, _bytes: u64) {}
}
