//! XP curve and chapter yields.
//!
//! The cost of each successive level grows linearly, so the XP needed to
//! reach a level grows quadratically: level `L` spans
//! `[0.75·(L−1)·L, 0.75·L·(L+1))`. Total XP is never stored; it is summed
//! from validated chapter records on every call.
use serde::{Deserialize, Serialize};

use crate::constants::{LEVEL_CURVE_DENOMINATOR, LEVEL_CURVE_NUMERATOR, LEVEL_XP_STEP, MIN_LEVEL};
use crate::error::ProgressionError;
use crate::numbers::{floor_f64_to_u32, u64_to_f64};
use crate::user::{ChallengeRecord, ChapterRecord, User};

/// Half-open XP interval `[min_xp, max_xp)` covered by one level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelBounds {
    pub min_xp: f64,
    pub max_xp: f64,
}

impl LevelBounds {
    #[must_use]
    pub fn contains(&self, xp: f64) -> bool {
        self.min_xp <= xp && xp < self.max_xp
    }

    #[must_use]
    pub fn span(&self) -> f64 {
        self.max_xp - self.min_xp
    }
}

/// Level reached with `xp` experience; level 1 for anything not positive.
#[must_use]
pub fn level_for_xp(xp: f64) -> u32 {
    if xp.is_nan() || xp <= 0.0 {
        return MIN_LEVEL;
    }
    // (16·xp)/3 keeps boundary values exact: 16·0.75·k / 3 == 4k.
    let root = (1.0 + LEVEL_CURVE_NUMERATOR * xp / LEVEL_CURVE_DENOMINATOR).sqrt();
    floor_f64_to_u32(0.5 + 0.5 * root).max(MIN_LEVEL)
}

/// XP interval of `level`.
///
/// # Errors
///
/// Returns [`ProgressionError::InvalidLevel`] for level 0.
pub fn level_bounds(level: u32) -> Result<LevelBounds, ProgressionError> {
    if level < MIN_LEVEL {
        return Err(ProgressionError::InvalidLevel(level));
    }
    Ok(bounds_for(level))
}

fn bounds_for(level: u32) -> LevelBounds {
    let level = u64::from(level);
    LevelBounds {
        min_xp: LEVEL_XP_STEP * u64_to_f64(level.saturating_sub(1) * level),
        max_xp: LEVEL_XP_STEP * u64_to_f64(level * (level + 1)),
    }
}

/// Bonus for completed challenges: `required_level` scaled by the completed
/// share of total difficulty weight.
#[must_use]
pub fn challenge_bonus(required_level: u32, challenges: &[ChallengeRecord]) -> f64 {
    let total: f64 = challenges
        .iter()
        .map(|c| c.template.difficulty.weight())
        .sum();
    if challenges.is_empty() || total <= 0.0 {
        return 0.0;
    }
    let completed: f64 = challenges
        .iter()
        .filter(|c| c.completed)
        .map(|c| c.template.difficulty.weight())
        .sum();
    f64::from(required_level) * completed / total
}

/// Base plus bonus XP for a chapter in its current challenge state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChapterXpPreview {
    pub base: f64,
    pub bonus: f64,
    pub total: f64,
}

#[must_use]
pub fn chapter_preview(record: &ChapterRecord) -> ChapterXpPreview {
    let base = f64::from(record.required_level);
    let bonus = challenge_bonus(record.required_level, &record.challenges);
    ChapterXpPreview {
        base,
        bonus,
        total: base + bonus,
    }
}

/// XP a chapter yields once validated.
#[must_use]
pub fn chapter_xp(record: &ChapterRecord) -> f64 {
    chapter_preview(record).total
}

/// Sum of chapter yields over validated records. Challenge work in chapters
/// that are not validated contributes nothing.
#[must_use]
pub fn total_xp(user: &User) -> f64 {
    if user.active_journey().is_none() {
        return 0.0;
    }
    user.chapters
        .values()
        .filter(|record| record.validated)
        .map(chapter_xp)
        .sum()
}

#[must_use]
pub fn current_level(user: &User) -> u32 {
    level_for_xp(total_xp(user))
}

/// Where the user sits on the curve, for progress displays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XpProgress {
    pub total_xp: f64,
    pub level: u32,
    pub min_xp: f64,
    pub max_xp: f64,
    /// Fraction of the current level already earned, in `[0, 1]`.
    pub progress_in_level: f64,
    pub xp_to_next: f64,
}

#[must_use]
pub fn xp_progress(user: &User) -> XpProgress {
    let total = total_xp(user);
    let level = level_for_xp(total);
    let bounds = bounds_for(level);
    let progress = if bounds.span() > 0.0 {
        ((total - bounds.min_xp) / bounds.span()).clamp(0.0, 1.0)
    } else {
        0.0
    };
    XpProgress {
        total_xp: total,
        level,
        min_xp: bounds.min_xp,
        max_xp: bounds.max_xp,
        progress_in_level: progress,
        xp_to_next: bounds.max_xp - total,
    }
}
