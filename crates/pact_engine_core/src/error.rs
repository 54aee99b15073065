//! crates/pact_engine_core/src/error.rs
//!
//! The error taxonomy of the engine's public operations.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No caller identity was supplied.
    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Caller is not a participant of this pact")]
    NotParticipant,

    #[error("Pact not found: {0}")]
    PactNotFound(uuid::Uuid),

    #[error("Pact is archived")]
    PactArchived,

    /// A check-in already exists for this pact, participant and date.
    #[error("Already checked in for this date")]
    AlreadyCheckedIn,

    #[error("Invalid pact configuration: {0}")]
    InvalidPactConfiguration(String),

    #[error("Pact limit reached ({current}/{max})")]
    PactLimitReached { current: u32, max: u32 },

    /// The store was unreachable or misbehaved. Not retried by the engine.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] PortError),

    /// Roast thread creation could not be requested. Only ever logged.
    #[error("Side effect failure: {0}")]
    SideEffectFailure(String),
}

impl EngineError {
    /// The message shown to the end user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            EngineError::AlreadyCheckedIn => "You've already checked in for this pact today.",
            EngineError::Unauthenticated => "Please sign in to continue.",
            EngineError::NotParticipant => "You're not part of this pact.",
            EngineError::PactLimitReached { .. } => {
                "This group has reached its pact limit. Upgrade to create more."
            }
            _ => "Something went wrong. Please try again.",
        }
    }
}

/// A convenience type alias for `Result<T, EngineError>`.
pub type EngineResult<T> = Result<T, EngineError>;
