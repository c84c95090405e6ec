//! Error taxonomy shared by the deck engine, the state machine and the providers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::faction::{DeckFaction, FactionRule};

/// A deck rule was (or would be) broken. Never auto-corrected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Point cap exceeded: {points} of {cap} points")]
    PointCapExceeded { points: u32, cap: u32 },

    #[error("Faction rule violated: {rule} deck contains {found} units")]
    FactionViolated {
        rule: FactionRule,
        found: DeckFaction,
    },

    #[error("Copy cap exceeded for {unit}: {cap} allowed")]
    CopyCapExceeded { unit: String, cap: u32 },

    #[error("Unknown unit {0}")]
    UnknownUnit(String),

    #[error("Deck is empty")]
    EmptyDeck,
}

/// Sign-in failure normalised from the requester's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInFailure {
    pub status: u16,
    pub rate_limit_code: Option<String>,
    pub message: String,
}

impl SignInFailure {
    pub fn is_rate_limited(&self) -> bool {
        if self.status == 429 {
            return true;
        }
        if self
            .rate_limit_code
            .as_deref()
            .is_some_and(|code| code.contains("rate_limit"))
        {
            return true;
        }
        let lower = self.message.to_lowercase();
        lower.contains("rate limit") || lower.contains("you can only request this after")
    }
}

#[derive(Debug, Error)]
pub enum SignInError {
    #[error("sign-in rejected with status {}", .0.status)]
    Rejected(SignInFailure),

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// What the caller sees when an action cannot complete.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Too many sign-in requests. Try again in {wait_secs} seconds.")]
    RateLimited { wait_secs: u64 },

    #[error("Sign in to {0}")]
    AuthenticationRequired(&'static str),

    #[error("{0}")]
    Transport(String),
}

impl AppError {
    /// Generic wording for provider failures; the detail goes to the console only.
    pub fn transport(what: &str) -> Self {
        Self::Transport(format!("Could not {what}. Please try again."))
    }
}
