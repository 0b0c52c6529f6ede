use std::io::{self, BufRead, Write};
use std::path::Path;

pub trait OverwritePrompt {
    fn confirm_overwrite(&self, path: &Path) -> io::Result<bool>;
}

/// Asks on the terminal.
pub struct StdinPrompt;

impl OverwritePrompt for StdinPrompt {
    fn confirm_overwrite(&self, path: &Path) -> io::Result<bool> {
        ask(&mut io::stdin().lock(), &mut io::stdout(), path)
    }
}

/// Backs `--overwrite`.
pub struct AssumeYes;

impl OverwritePrompt for AssumeYes {
    fn confirm_overwrite(&self, _path: &Path) -> io::Result<bool> {
        Ok(true)
    }
}

fn ask(reader: &mut impl BufRead, writer: &mut impl Write, path: &Path) -> io::Result<bool> {
    write!(writer, "The file {:?} already exists. Do you want to overwrite it? (y/n): ", path)?;
    writer.flush()?;

    let mut answer = String::new();
    if reader.read_line(&mut answer)? == 0 {
        // stdin closed
        writeln!(writer)?;
        return Ok(false);
    }
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
