//! View cursor and step sequencing
//!
//! The wizard runs `preview → selection → results`. Moving between steps is
//! free in both directions, except that `results` can only be entered once
//! model results exist.

use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::session::ModelSession;

/// Which wizard step is displayed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Preview,
    Selection,
    Results,
}

impl ViewMode {
    /// Steps in navigation order
    pub const ORDER: [ViewMode; 3] = [ViewMode::Preview, ViewMode::Selection, ViewMode::Results];

    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Preview => "preview",
            ViewMode::Selection => "selection",
            ViewMode::Results => "results",
        }
    }

    fn position(self) -> usize {
        match self {
            ViewMode::Preview => 0,
            ViewMode::Selection => 1,
            ViewMode::Results => 2,
        }
    }

    pub fn next(self) -> Option<ViewMode> {
        Self::ORDER.get(self.position() + 1).copied()
    }

    pub fn previous(self) -> Option<ViewMode> {
        self.position().checked_sub(1).map(|i| Self::ORDER[i])
    }

    /// Labels shown above the step
    pub fn info(self) -> StepInfo {
        match self {
            ViewMode::Preview => StepInfo {
                number: "01",
                subtitle: "Let's begin with",
                title: "Data previsualization",
                hint: "If everything looks good with your data, proceed to variable selection",
            },
            ViewMode::Selection => StepInfo {
                number: "02",
                subtitle: "Now we proceed to",
                title: "Variable Selection",
                hint: "Select your outcome variable and predictors for the model",
            },
            ViewMode::Results => StepInfo {
                number: "03",
                subtitle: "Finally, let's review",
                title: "Model Results",
                hint: "Review the model results and performance metrics",
            },
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewMode {
    type Err = StepError;

    /// `train` is accepted as another name for `selection`. `summary` shows up
    /// in some navigation labels but has no step behind it.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preview" => Ok(ViewMode::Preview),
            "selection" | "train" => Ok(ViewMode::Selection),
            "results" => Ok(ViewMode::Results),
            other => Err(StepError::UnsupportedStep(other.to_string())),
        }
    }
}

/// Display labels for one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInfo {
    pub number: &'static str,
    pub subtitle: &'static str,
    pub title: &'static str,
    pub hint: &'static str,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("Results are not available until a model has been trained")]
    ResultsUnavailable,

    #[error("Unsupported step: {0}")]
    UnsupportedStep(String),

    #[error("Already at the last step")]
    LastStep,
}

/// Whether the cursor may move to `target` given whether results exist
pub fn can_enter(target: ViewMode, has_results: bool) -> bool {
    target != ViewMode::Results || has_results
}

/// Check a transition, refusing `results` without model results
pub fn check_transition(target: ViewMode, has_results: bool) -> Result<(), StepError> {
    if can_enter(target, has_results) {
        Ok(())
    } else {
        Err(StepError::ResultsUnavailable)
    }
}

/// Whether the "next" button is enabled
pub fn can_go_next(session: &ModelSession) -> bool {
    session
        .current_view()
        .next()
        .is_some_and(|next| can_enter(next, session.model_results().is_some()))
}

/// Move one step forward
pub fn go_next(session: &mut ModelSession) -> Result<ViewMode, StepError> {
    let next = session
        .current_view()
        .next()
        .ok_or(StepError::LastStep)?;
    session.set_current_view(next)?;
    Ok(next)
}

/// Move one step back; stays put on the first step
pub fn go_back(session: &mut ModelSession) -> ViewMode {
    if let Some(previous) = session.current_view().previous() {
        if let Err(err) = session.set_current_view(previous) {
            debug!("Cannot step back to {previous}: {err}");
        }
    }
    session.current_view()
}

/// What the page should render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepView {
    /// A request is in flight and nothing can be shown yet
    Loading,
    /// No dataset: show the file uploader
    Upload,
    /// A persisted model was reloaded: show its report
    SavedReport,
    Preview,
    VariableSelection,
    /// Training is running (or failed and awaits retry)
    TrainingProgress,
    Results,
}

/// Map the session state to the step to render
pub fn select_view(session: &ModelSession) -> StepView {
    if session.is_loading() {
        return StepView::Loading;
    }
    if session.is_loaded_model() && session.model_results().is_some() {
        return StepView::SavedReport;
    }
    if session.dataset().is_none() {
        return StepView::Upload;
    }

    match session.current_view() {
        ViewMode::Preview => StepView::Preview,
        ViewMode::Selection if session.is_training() => StepView::TrainingProgress,
        ViewMode::Selection => StepView::VariableSelection,
        ViewMode::Results if session.model_results().is_some() => StepView::Results,
        ViewMode::Results => StepView::VariableSelection,
    }
}
