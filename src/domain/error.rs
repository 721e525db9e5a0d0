//! Domain error types.

/// A parse error with position information for eligibility rule parsing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for factorpick.
#[derive(Debug, thiserror::Error)]
pub enum FactorpickError {
    #[error("data format error: {reason}")]
    DataFormat { reason: String },

    #[error("insufficient history for {code}: {reason}")]
    InsufficientHistory { code: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    RuleParse(#[from] ParseError),

    #[error("model error: {reason}")]
    Model { reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FactorpickError {
    pub fn data_format(reason: impl Into<String>) -> Self {
        FactorpickError::DataFormat {
            reason: reason.into(),
        }
    }

    pub fn insufficient_history(code: &str, reason: impl Into<String>) -> Self {
        FactorpickError::InsufficientHistory {
            code: code.to_string(),
            reason: reason.into(),
        }
    }

    pub fn model(reason: impl Into<String>) -> Self {
        FactorpickError::Model {
            reason: reason.into(),
        }
    }

    /// True for the per-asset coverage failure the labeling loop may skip.
    pub fn is_insufficient_history(&self) -> bool {
        matches!(self, FactorpickError::InsufficientHistory { .. })
    }
}

impl From<&FactorpickError> for std::process::ExitCode {
    fn from(err: &FactorpickError) -> Self {
        let code: u8 = match err {
            FactorpickError::Io(_) | FactorpickError::Csv(_) => 1,
            FactorpickError::ConfigParse { .. }
            | FactorpickError::ConfigMissing { .. }
            | FactorpickError::ConfigInvalid { .. } => 2,
            FactorpickError::DataFormat { .. } => 3,
            FactorpickError::RuleParse(_) => 4,
            FactorpickError::InsufficientHistory { .. } => 5,
            FactorpickError::Model { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
