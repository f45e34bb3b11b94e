//! Level commitment: the first chapter at a level with any completed
//! challenge claims the level and closes its siblings. A validated chapter
//! keeps the claim for good, so a level never ends up with two validated
//! chapters.
use serde::{Deserialize, Serialize};

use crate::user::{ChapterRecord, User};

/// Chapter holding the commitment slot for `level`, if any.
///
/// The validated chapter at that level holds it if there is one. Otherwise
/// the lowest-numbered chapter with at least one completed challenge wins,
/// and un-completing every challenge in it frees the slot again.
#[must_use]
pub fn committed_chapter_for_level(user: &User, level: u32) -> Option<u32> {
    let journey = user.active_journey()?;
    validated_chapter_for_level(user, level).or_else(|| {
        journey.chapters_at_level(level).find(|number| {
            user.chapter_record(*number)
                .is_some_and(ChapterRecord::has_completed_challenge)
        })
    })
}

/// Validated chapter at `level`. Exclusivity keeps this to at most one.
#[must_use]
pub fn validated_chapter_for_level(user: &User, level: u32) -> Option<u32> {
    let journey = user.active_journey()?;
    journey
        .chapters_at_level(level)
        .find(|number| user.is_validated(*number))
}

/// Commitment state of one level of the active journey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCommitment {
    pub level: u32,
    pub chapters: Vec<u32>,
    pub committed: Option<u32>,
    pub validated: Option<u32>,
}

/// Per-level summary in ascending level order; empty without a journey.
#[must_use]
pub fn level_overview(user: &User) -> Vec<LevelCommitment> {
    let Some(journey) = user.active_journey() else {
        return Vec::new();
    };
    journey
        .levels()
        .into_iter()
        .map(|level| LevelCommitment {
            level,
            chapters: journey.chapters_at_level(level).collect(),
            committed: committed_chapter_for_level(user, level),
            validated: validated_chapter_for_level(user, level),
        })
        .collect()
}
