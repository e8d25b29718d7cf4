//! Pipeline stages and the linear state machine that orders them.
//!
//! The pipeline moves through `Pending → Packaged → Staged → Prepared →
//! Installed → Validated`. Each state is reachable only from its immediate
//! predecessor, and any non-terminal state can move to `Failed`.

use crate::error::{Result, VerifyError};
use std::fmt;

/// One step of the Build-Install-Verify pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Build the distribution archive from the project tree.
    Package,
    /// Create the staging directory and extract the archive into it.
    Stage,
    /// Run the project's own preparation step inside the extracted tree.
    Prepare,
    /// Install the prepared tree into the user's environment.
    Install,
    /// Run the example script against the installed package.
    Validate,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Self; 5] = [
        Self::Package,
        Self::Stage,
        Self::Prepare,
        Self::Install,
        Self::Validate,
    ];

    /// Stable lowercase identifier used in logs and error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Stage => "stage",
            Self::Prepare => "prepare",
            Self::Install => "install",
            Self::Validate => "validate",
        }
    }

    /// Progress label shown to the user.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Package => "Building source distribution",
            Self::Stage => "Extracting archive into staging directory",
            Self::Prepare => "Preparing extracted tree",
            Self::Install => "Installing package",
            Self::Validate => "Running validation example",
        }
    }

    /// The stage that runs after this one.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Package => Some(Self::Stage),
            Self::Stage => Some(Self::Prepare),
            Self::Prepare => Some(Self::Install),
            Self::Install => Some(Self::Validate),
            Self::Validate => None,
        }
    }

    /// One-based position in the pipeline.
    #[must_use]
    pub const fn ordinal(self) -> usize {
        match self {
            Self::Package => 1,
            Self::Stage => 2,
            Self::Prepare => 3,
            Self::Install => 4,
            Self::Validate => 5,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Progress of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// No stage has completed yet.
    #[default]
    Pending,
    /// The archive has been built.
    Packaged,
    /// The archive has been extracted into the staging directory.
    Staged,
    /// The extracted tree has been prepared.
    Prepared,
    /// The package has been installed.
    Installed,
    /// The example script succeeded.
    Validated,
    /// The named stage failed; no later stage ran.
    Failed {
        /// The stage that failed.
        stage: Stage,
    },
}

impl PipelineState {
    /// The stage whose success leads into this state.
    const fn reached_by(self) -> Option<Stage> {
        match self {
            Self::Packaged => Some(Stage::Package),
            Self::Staged => Some(Stage::Stage),
            Self::Prepared => Some(Stage::Prepare),
            Self::Installed => Some(Stage::Install),
            Self::Validated => Some(Stage::Validate),
            Self::Pending | Self::Failed { .. } => None,
        }
    }

    /// The stage allowed to run from this state.
    #[must_use]
    pub const fn pending_stage(self) -> Option<Stage> {
        match self {
            Self::Pending => Some(Stage::Package),
            Self::Failed { .. } | Self::Validated => None,
            other => match other.reached_by() {
                Some(stage) => stage.next(),
                None => None,
            },
        }
    }

    /// Whether the run has finished, successfully or not.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Validated | Self::Failed { .. })
    }

    /// Record a successful `stage`, moving to its postcondition state.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::InvalidTransition`] unless `stage` is the one
    /// immediately following the current state.
    pub fn advance(&mut self, stage: Stage) -> Result<()> {
        if self.pending_stage() != Some(stage) {
            return Err(VerifyError::InvalidTransition { from: *self, stage });
        }
        *self = Self::after(stage);
        Ok(())
    }

    /// Record that `stage` failed.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::InvalidTransition`] if the run already reached a
    /// terminal state.
    pub fn fail(&mut self, stage: Stage) -> Result<()> {
        if self.is_terminal() {
            return Err(VerifyError::InvalidTransition { from: *self, stage });
        }
        *self = Self::Failed { stage };
        Ok(())
    }

    const fn after(stage: Stage) -> Self {
        match stage {
            Stage::Package => Self::Packaged,
            Stage::Stage => Self::Staged,
            Stage::Prepare => Self::Prepared,
            Stage::Install => Self::Installed,
            Stage::Validate => Self::Validated,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Packaged => f.write_str("packaged"),
            Self::Staged => f.write_str("staged"),
            Self::Prepared => f.write_str("prepared"),
            Self::Installed => f.write_str("installed"),
            Self::Validated => f.write_str("validated"),
            Self::Failed { stage } => write!(f, "failed at {stage}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn stages_advance_in_order_to_validated() {
        let mut state = PipelineState::default();
        for stage in Stage::ALL {
            state.advance(stage).expect("in-order transition");
        }
        assert_eq!(state, PipelineState::Validated);
        assert!(state.is_terminal());
    }

    #[rstest]
    #[case::skip_stage(PipelineState::Pending, Stage::Stage)]
    #[case::repeat_stage(PipelineState::Packaged, Stage::Package)]
    #[case::jump_ahead(PipelineState::Staged, Stage::Validate)]
    #[case::after_validated(PipelineState::Validated, Stage::Validate)]
    #[case::after_failure(PipelineState::Failed { stage: Stage::Install }, Stage::Validate)]
    fn out_of_order_transitions_are_rejected(#[case] from: PipelineState, #[case] stage: Stage) {
        let mut state = from;
        let err = state.advance(stage).expect_err("transition should be rejected");
        assert!(matches!(err, VerifyError::InvalidTransition { .. }));
        assert_eq!(state, from, "state must not change on rejection");
    }

    #[rstest]
    #[case(PipelineState::Pending)]
    #[case(PipelineState::Packaged)]
    #[case(PipelineState::Installed)]
    fn any_running_state_can_fail(#[case] from: PipelineState) {
        let mut state = from;
        state.fail(Stage::Prepare).expect("fail from running state");
        assert_eq!(state, PipelineState::Failed { stage: Stage::Prepare });
    }

    #[test]
    fn terminal_states_cannot_fail_again() {
        let mut state = PipelineState::Failed { stage: Stage::Package };
        assert!(state.fail(Stage::Stage).is_err());
    }

    #[test]
    fn next_follows_execution_order() {
        let chained: Vec<Stage> =
            std::iter::successors(Some(Stage::Package), |stage| stage.next()).collect();
        assert_eq!(chained, Stage::ALL);
    }

    #[test]
    fn display_of_failed_state_names_stage() {
        let state = PipelineState::Failed { stage: Stage::Validate };
        assert_eq!(state.to_string(), "failed at validate");
    }
}
