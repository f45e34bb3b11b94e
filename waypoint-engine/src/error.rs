use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::access::AccessReason;

/// Errors raised by the catalog normalizer, the XP model and the mutators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProgressionError {
    #[error("invalid journey format: {0}")]
    InvalidFormat(String),
    #[error("level must be at least 1 (got {0})")]
    InvalidLevel(u32),
    #[error("chapter {0} does not exist in the active journey")]
    InvalidChapter(u32),
    #[error("chapter {chapter} has no challenge at index {index}")]
    InvalidChallenge { chapter: u32, index: usize },
    #[error("precondition failed: {0}")]
    PreconditionFailed(ValidationRefusal),
}

/// Why a chapter validation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum ValidationRefusal {
    /// The chapter failed an accessibility gate.
    Inaccessible(AccessReason),
    AlreadyValidated,
    /// Validations have caught up with elapsed days.
    NoCredits,
    /// No challenge in the chapter is completed, so it does not hold its level.
    NotCommitted,
}

impl std::fmt::Display for ValidationRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inaccessible(reason) => write!(f, "chapter not accessible ({reason})"),
            Self::AlreadyValidated => write!(f, "chapter already validated"),
            Self::NoCredits => write!(f, "no validation credits left today"),
            Self::NotCommitted => write!(f, "chapter does not hold its level's commitment"),
        }
    }
}
