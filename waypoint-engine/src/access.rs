//! Chapter and challenge gating.
//!
//! Checks run in a fixed order and the first failure wins: the chapter must
//! exist, the user's level must reach the chapter's requirement, every
//! required achievement must be held, and no sibling chapter at the same
//! level may hold the commitment slot. Evaluators never touch the user
//! record, so calling them cannot materialize chapter records.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::commitment::committed_chapter_for_level;
use crate::constants::LOG_ACCESS;
use crate::user::User;
use crate::xp::current_level;

/// Achievement ids reported as missing; usually only a handful.
pub type AchievementIds = SmallVec<[String; 4]>;

/// Outcome classification of an accessibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    InvalidChapter,
    InvalidChallenge,
    InsufficientLevel,
    MissingAchievements,
    CommittedElsewhere,
    AllConditionsMet,
}

impl AccessReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidChapter => "invalid_chapter",
            Self::InvalidChallenge => "invalid_challenge",
            Self::InsufficientLevel => "insufficient_level",
            Self::MissingAchievements => "missing_achievements",
            Self::CommittedElsewhere => "committed_elsewhere",
            Self::AllConditionsMet => "all_conditions_met",
        }
    }
}

impl fmt::Display for AccessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an accessibility query with the context that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    pub accessible: bool,
    pub reason: AccessReason,
    #[serde(default)]
    pub required_level: Option<u32>,
    #[serde(default)]
    pub user_level: Option<u32>,
    #[serde(default)]
    pub missing_achievements: AchievementIds,
    /// Chapter holding the level's commitment slot, if any.
    #[serde(default)]
    pub committed_chapter: Option<u32>,
}

impl Access {
    fn denied(reason: AccessReason) -> Self {
        Self {
            accessible: false,
            reason,
            required_level: None,
            user_level: None,
            missing_achievements: AchievementIds::new(),
            committed_chapter: None,
        }
    }

    fn with_levels(mut self, required_level: u32, user_level: u32) -> Self {
        self.required_level = Some(required_level);
        self.user_level = Some(user_level);
        self
    }

    fn granted(required_level: u32, user_level: u32, committed: Option<u32>) -> Self {
        Self {
            accessible: true,
            reason: AccessReason::AllConditionsMet,
            committed_chapter: committed,
            ..Self::denied(AccessReason::AllConditionsMet)
        }
        .with_levels(required_level, user_level)
    }
}

/// Decide whether chapter `number` may be entered.
#[must_use]
pub fn can_access_chapter(user: &User, number: u32) -> Access {
    let Some(template) = user.chapter_template(number) else {
        log::debug!(target: LOG_ACCESS, "chapter {number}: not in active journey");
        return Access::denied(AccessReason::InvalidChapter);
    };
    let required = template.required_level;
    let level = current_level(user);

    if level < required {
        log::debug!(target: LOG_ACCESS, "chapter {number}: level {level} < {required}");
        return Access::denied(AccessReason::InsufficientLevel).with_levels(required, level);
    }

    let missing = user.missing_achievements(&template.depends_on);
    if !missing.is_empty() {
        log::debug!(target: LOG_ACCESS, "chapter {number}: missing {missing:?}");
        let mut access =
            Access::denied(AccessReason::MissingAchievements).with_levels(required, level);
        access.missing_achievements = missing.into_iter().collect();
        return access;
    }

    let committed = committed_chapter_for_level(user, required);
    if let Some(holder) = committed
        && holder != number
    {
        log::debug!(target: LOG_ACCESS, "chapter {number}: level {required} committed to {holder}");
        let mut access =
            Access::denied(AccessReason::CommittedElsewhere).with_levels(required, level);
        access.committed_chapter = Some(holder);
        return access;
    }

    Access::granted(required, level, committed)
}

/// Decide whether challenge `index` of chapter `number` may be entered.
///
/// A chapter-level refusal is returned as is. The challenge's own
/// achievement list is then checked, followed by the commitment rule at
/// the parent chapter's level.
#[must_use]
pub fn can_access_challenge(user: &User, number: u32, index: usize) -> Access {
    let chapter = can_access_chapter(user, number);
    if !chapter.accessible {
        return chapter;
    }
    let (required, level) = (
        chapter.required_level.unwrap_or_default(),
        chapter.user_level.unwrap_or_default(),
    );

    let depends_on = match user.chapter_record(number) {
        Some(record) => record
            .challenges
            .get(index)
            .map(|challenge| &challenge.template.depends_on),
        None => user
            .chapter_template(number)
            .and_then(|template| template.challenges.get(index))
            .map(|challenge| &challenge.depends_on),
    };
    let Some(depends_on) = depends_on else {
        log::debug!(target: LOG_ACCESS, "chapter {number}: no challenge {index}");
        return Access::denied(AccessReason::InvalidChallenge).with_levels(required, level);
    };

    let missing = user.missing_achievements(depends_on);
    if !missing.is_empty() {
        log::debug!(target: LOG_ACCESS, "challenge {number}/{index}: missing {missing:?}");
        let mut access =
            Access::denied(AccessReason::MissingAchievements).with_levels(required, level);
        access.missing_achievements = missing.into_iter().collect();
        return access;
    }

    let committed = committed_chapter_for_level(user, required);
    if let Some(holder) = committed
        && holder != number
    {
        let mut access =
            Access::denied(AccessReason::CommittedElsewhere).with_levels(required, level);
        access.committed_chapter = Some(holder);
        return access;
    }

    Access::granted(required, level, committed)
}
