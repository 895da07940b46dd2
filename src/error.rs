use thiserror::Error;

/// Failure taxonomy shared by every flow step.
///
/// Each variant maps to one recovery policy at the flow boundary:
/// re-prompt the same step, send a generic refusal, offer a refreshed
/// selection, or apologize without advancing state.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input (name, date, time, pin shape). Never fatal, the
    /// current step is re-prompted.
    #[error("{0}")]
    Validation(String),

    /// Unknown alias or wrong PIN. Deliberately carries no detail so the
    /// two cases are indistinguishable to the sender.
    #[error("authentication failed")]
    Authentication,

    /// Slot taken, duplicate active appointment, already-blocked hour.
    #[error("{0}")]
    Conflict(String),

    /// Staff acting outside their own schedule. Hard rejection.
    #[error("not allowed: {0}")]
    Authorization(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Store or messaging boundary failure. Logged, the user gets a
    /// generic apology and may retry the same step.
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
