//! Pipeline stages and the legal transitions between them

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ConvertError, Result};

/// Stage of a conversion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Not started
    Idle,
    /// Unpacking the AppImage payload
    Extracting,
    /// Reading desktop entry, AppStream data and icons
    ResolvingMetadata,
    /// Scanning ELF files for sonames
    AnalyzingDependencies,
    /// Staging the install root and building the spec model
    GeneratingSpec,
    /// Running rpmbuild
    Building,
    /// Finished successfully
    Done,
    /// Aborted by an error
    Failed,
    /// Stopped at a stage boundary on request
    Cancelled,
}

impl Stage {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Rough completion percentage when this stage starts
    pub fn percent(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Extracting => 5,
            Self::ResolvingMetadata => 30,
            Self::AnalyzingDependencies => 45,
            Self::GeneratingSpec => 65,
            Self::Building => 80,
            Self::Done | Self::Failed | Self::Cancelled => 100,
        }
    }

    /// Stage that follows this one in a full conversion
    fn successor(&self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Extracting),
            Self::Extracting => Some(Self::ResolvingMetadata),
            Self::ResolvingMetadata => Some(Self::AnalyzingDependencies),
            Self::AnalyzingDependencies => Some(Self::GeneratingSpec),
            Self::GeneratingSpec => Some(Self::Building),
            Self::Building => Some(Self::Done),
            Self::Done | Self::Failed | Self::Cancelled => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Extracting => "Extracting",
            Self::ResolvingMetadata => "Resolving metadata",
            Self::AnalyzingDependencies => "Analyzing dependencies",
            Self::GeneratingSpec => "Generating spec",
            Self::Building => "Building",
            Self::Done => "Done",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Current stage of one run plus the path it took
#[derive(Debug, Clone)]
pub struct PipelineState {
    current: Stage,
    last_working: Stage,
    history: Vec<Stage>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    /// Full conversion: ends after `Building`
    pub fn new() -> Self {
        Self {
            current: Stage::Idle,
            last_working: Stage::Building,
            history: vec![Stage::Idle],
        }
    }

    /// Inspection run: ends after `AnalyzingDependencies`
    pub fn inspection() -> Self {
        Self {
            last_working: Stage::AnalyzingDependencies,
            ..Self::new()
        }
    }

    /// Current stage
    pub fn current(&self) -> Stage {
        self.current
    }

    /// Every stage entered so far, starting with `Idle`
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    /// Whether `next` may follow the current stage
    pub fn can_advance(&self, next: Stage) -> bool {
        if self.current.is_terminal() {
            return false;
        }
        match next {
            Stage::Failed | Stage::Cancelled => true,
            Stage::Done => self.current == self.last_working,
            _ => self.current != self.last_working && self.current.successor() == Some(next),
        }
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn advance(&mut self, next: Stage) -> Result<()> {
        if !self.can_advance(next) {
            return Err(ConvertError::Other(format!(
                "Illegal pipeline transition {} -> {}",
                self.current, next
            )));
        }
        self.current = next;
        self.history.push(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_run_order() {
        let mut state = PipelineState::new();
        for stage in [
            Stage::Extracting,
            Stage::ResolvingMetadata,
            Stage::AnalyzingDependencies,
            Stage::GeneratingSpec,
            Stage::Building,
            Stage::Done,
        ] {
            state.advance(stage).unwrap();
        }
        assert_eq!(state.current(), Stage::Done);
        assert_eq!(state.history().len(), 7);
        assert!(state.advance(Stage::Failed).is_err());
    }

    #[test]
    fn test_skipping_is_rejected() {
        let mut state = PipelineState::new();
        assert!(state.advance(Stage::ResolvingMetadata).is_err());
        state.advance(Stage::Extracting).unwrap();
        assert!(state.advance(Stage::Done).is_err());
        assert!(state.advance(Stage::Extracting).is_err());
    }

    #[test]
    fn test_failure_and_cancel_from_any_working_stage() {
        let mut state = PipelineState::new();
        state.advance(Stage::Extracting).unwrap();
        assert!(state.can_advance(Stage::Failed));
        assert!(state.can_advance(Stage::Cancelled));
        state.advance(Stage::Cancelled).unwrap();
        assert!(!state.can_advance(Stage::Failed));
    }

    #[test]
    fn test_inspection_ends_after_dependencies() {
        let mut state = PipelineState::inspection();
        state.advance(Stage::Extracting).unwrap();
        state.advance(Stage::ResolvingMetadata).unwrap();
        state.advance(Stage::AnalyzingDependencies).unwrap();
        assert!(!state.can_advance(Stage::GeneratingSpec));
        state.advance(Stage::Done).unwrap();
    }

    #[test]
    fn test_percent_is_monotonic() {
        let stages = [
            Stage::Idle,
            Stage::Extracting,
            Stage::ResolvingMetadata,
            Stage::AnalyzingDependencies,
            Stage::GeneratingSpec,
            Stage::Building,
            Stage::Done,
        ];
        assert!(stages.windows(2).all(|w| w[0].percent() < w[1].percent()));
    }
}
