//! Error taxonomy for calibration runs.
//!
//! Every failure carries enough context (candidate parameter values, metric
//! name, location) to reproduce the failing case. Each variant also maps to a
//! process exit code so the `rcal` binary can stay a thin wrapper.

use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CalibrationError>;

#[derive(Debug, Error)]
pub enum CalibrationError {
    /// Invalid bounds, unknown metric names, mismatched series lengths, bad settings.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The simulation runner failed or timed out for a candidate.
    #[error("simulation failed for candidate [{candidate}] at {location}: {message}")]
    Simulation {
        candidate: String,
        location: String,
        message: String,
    },

    /// The external multi-objective optimizer failed.
    #[error("optimizer error: {message}")]
    Optimizer { message: String },

    /// Degenerate metric inputs (e.g. zero-sum observed series in percent bias).
    #[error("evaluation error in metric '{metric}'{}: {message}", candidate_context(.candidate))]
    Evaluation {
        metric: String,
        /// Parameter values of the candidate being scored, when known.
        candidate: Option<String>,
        message: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl CalibrationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn evaluation(metric: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluation {
            metric: metric.into(),
            candidate: None,
            message: message.into(),
        }
    }

    /// Name the candidate in scoring errors so the failing case can be rerun.
    pub fn for_candidate(self, parameters: &impl fmt::Display) -> Self {
        match self {
            Self::Evaluation {
                metric,
                candidate: None,
                message,
            } => Self::Evaluation {
                metric,
                candidate: Some(parameters.to_string()),
                message,
            },
            Self::Configuration { message } => Self::Configuration {
                message: format!("candidate [{parameters}]: {message}"),
            },
            other => other,
        }
    }

    pub fn optimizer(message: impl Into<String>) -> Self {
        Self::Optimizer {
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Process exit code for the `rcal` binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            CalibrationError::Configuration { .. } => 2,
            CalibrationError::Evaluation { .. } => 3,
            CalibrationError::Simulation { .. } => 4,
            CalibrationError::Optimizer { .. } => 5,
            CalibrationError::Io { .. } => 6,
        }
    }
}

fn candidate_context(candidate: &Option<String>) -> String {
    candidate
        .as_deref()
        .map(|c| format!(" for candidate [{c}]"))
        .unwrap_or_default()
}
