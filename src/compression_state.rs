use std::time::Duration;

use crate::error::CompressorError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Launching,
    Running,
    Joining,
    Done,
    Cancelled,
}

impl SupervisorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SupervisorState::Done | SupervisorState::Cancelled)
    }
}

#[derive(Debug)]
pub struct CompressionResult {
    pub success: bool,
    pub elapsed: Duration,
    pub error: Option<CompressorError>,
    pub state: SupervisorState,
    pub output_bytes: u64,
}

impl CompressionResult {
    pub fn completed(elapsed: Duration, output_bytes: u64) -> Self {
        CompressionResult {
            success: true,
            elapsed,
            error: None,
            state: SupervisorState::Done,
            output_bytes,
        }
    }

    pub fn failed(error: CompressorError, elapsed: Duration) -> Self {
        CompressionResult {
            success: false,
            elapsed,
            error: Some(error),
            state: SupervisorState::Done,
            output_bytes: 0,
        }
    }

    pub fn cancelled(error: CompressorError, elapsed: Duration) -> Self {
        CompressionResult {
            success: false,
            elapsed,
            error: Some(error),
            state: SupervisorState::Cancelled,
            output_bytes: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_constructors() {
        let done = CompressionResult::completed(Duration::from_secs(3), 1024);
        assert!(done.success && done.error.is_none());
        assert_eq!(done.state, SupervisorState::Done);

        let failed = CompressionResult::failed(CompressorError::EncoderFailed { code: Some(1) }, Duration::from_secs(1));
        assert!(!failed.success);
        assert_eq!(failed.state, SupervisorState::Done);

        let declined = CompressionResult::cancelled(CompressorError::UserDeclinedOverwrite { path: PathBuf::from("out.mp4") }, Duration::ZERO);
        assert!(!declined.success);
        assert_eq!(declined.state, SupervisorState::Cancelled);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SupervisorState::Done.is_terminal());
        assert!(SupervisorState::Cancelled.is_terminal());
        assert!(!SupervisorState::Running.is_terminal());
        assert!(!SupervisorState::Idle.is_terminal());
    }
}
