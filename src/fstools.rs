use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, PartialEq)]
pub enum DirEntryCategory {
    DoesNotExist,
    RegularFile,
    SymbolicLink,
    Directory,
    Unknown,
}

pub fn classify_file(path: &Path) -> DirEntryCategory {
    // symlink_metadata, otherwise links are followed and never reported
    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            if metadata.is_symlink() {
                match fs::metadata(path) {
                    Ok(target) if target.is_file() => DirEntryCategory::RegularFile,
                    Ok(_) => DirEntryCategory::SymbolicLink,
                    Err(_) => DirEntryCategory::DoesNotExist,
                }
            } else if metadata.is_file() {
                DirEntryCategory::RegularFile
            } else if metadata.is_dir() {
                DirEntryCategory::Directory
            } else {
                DirEntryCategory::Unknown
            }
        },
        Err(_) => DirEntryCategory::DoesNotExist,
    }
}

/// Size of the file at `path`, or 0 while it has not been created yet.
pub fn file_size(path: &Path) -> u64 {
    match fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(_) => 0,
    }
}

/// Removes `path`, treating an already missing file as success.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}
