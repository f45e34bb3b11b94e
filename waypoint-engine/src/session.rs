use chrono::NaiveDate;
use serde::Serialize;

use crate::access::{Access, can_access_challenge, can_access_chapter};
use crate::commitment::{LevelCommitment, level_overview};
use crate::completion::{JourneyPhase, journey_phase};
use crate::day_accounting::{CreditLedger, DayContext, chapter_date, credit_ledger, is_day_elapsed};
use crate::error::{ProgressionError, ValidationRefusal};
use crate::progression::{
    ValidationOutcome, can_validate_chapter, toggle_challenge_completion, validate_chapter,
};
use crate::user::User;
use crate::xp::{ChapterXpPreview, XpProgress, chapter_preview, xp_progress};

/// High-level session wrapper binding a user record to the day it is viewed on.
#[derive(Debug, Clone)]
pub struct ProgressSession {
    user: User,
    day: DayContext,
}

impl ProgressSession {
    #[must_use]
    pub const fn new(user: User, day: DayContext) -> Self {
        Self { user, day }
    }

    /// Borrow the underlying user record.
    #[must_use]
    pub const fn user(&self) -> &User {
        &self.user
    }

    /// Apply a closure to the mutable user record.
    pub fn with_user_mut<R>(&mut self, f: impl FnOnce(&mut User) -> R) -> R {
        f(&mut self.user)
    }

    #[must_use]
    pub const fn day(&self) -> DayContext {
        self.day
    }

    /// Move the session to another calendar day.
    pub const fn set_day(&mut self, day: DayContext) {
        self.day = day;
    }

    #[must_use]
    pub fn chapter_access(&self, number: u32) -> Access {
        can_access_chapter(&self.user, number)
    }

    #[must_use]
    pub fn challenge_access(&self, number: u32, index: usize) -> Access {
        can_access_challenge(&self.user, number, index)
    }

    /// # Errors
    ///
    /// See [`toggle_challenge_completion`].
    pub fn toggle_challenge(
        &mut self,
        number: u32,
        index: usize,
        completed: bool,
    ) -> Result<(), ProgressionError> {
        toggle_challenge_completion(&mut self.user, number, index, completed)
    }

    /// # Errors
    ///
    /// The first unmet validation precondition.
    pub fn can_validate(&self, number: u32) -> Result<(), ValidationRefusal> {
        can_validate_chapter(&self.user, number, &self.day)
    }

    /// # Errors
    ///
    /// See [`validate_chapter`].
    pub fn validate(&mut self, number: u32) -> Result<ValidationOutcome, ProgressionError> {
        validate_chapter(&mut self.user, number, &self.day)
    }

    #[must_use]
    pub fn phase(&self) -> JourneyPhase {
        journey_phase(&self.user)
    }

    #[must_use]
    pub fn xp(&self) -> XpProgress {
        xp_progress(&self.user)
    }

    #[must_use]
    pub fn credits(&self) -> CreditLedger {
        credit_ledger(&self.user, &self.day)
    }

    /// Derived view of every chapter of the active journey, in order.
    #[must_use]
    pub fn chapters(&self) -> Vec<ChapterStatus> {
        let Some(journey) = self.user.active_journey() else {
            return Vec::new();
        };
        journey
            .chapters
            .iter()
            .map(|(number, template)| {
                let record = self.user.chapter_record(*number);
                let date = record.map(|r| r.date).or_else(|| {
                    self.user
                        .start_date
                        .map(|start| chapter_date(start, *number))
                });
                let (completed, total) = record.map_or((0, template.challenges.len()), |r| {
                    (
                        r.challenges.iter().filter(|c| c.completed).count(),
                        r.challenges.len(),
                    )
                });
                ChapterStatus {
                    number: *number,
                    title: template.title.clone(),
                    required_level: template.required_level,
                    date,
                    day_elapsed: date.is_some_and(|d| is_day_elapsed(d, &self.day)),
                    validated: record.is_some_and(|r| r.validated),
                    completed_challenges: completed,
                    total_challenges: total,
                    access: self.chapter_access(*number),
                    preview: record.map(chapter_preview),
                }
            })
            .collect()
    }

    /// Everything a progress screen needs, computed from the current record.
    #[must_use]
    pub fn status(&self) -> ProgressStatus {
        ProgressStatus {
            username: self.user.username.clone(),
            journey_name: self.user.journey_name.clone(),
            journey_title: self.user.active_journey().map(|j| j.title.clone()),
            phase: self.phase(),
            start_date: self.user.start_date,
            timezone: self.user.timezone.clone(),
            today: self.day.today,
            fast_forward: self.day.fast_forward,
            xp: self.xp(),
            credits: self.credits(),
            levels: level_overview(&self.user),
            chapters: self.chapters(),
            achievements: self.user.achievements.keys().cloned().collect(),
        }
    }

    /// Consume the session, returning the user record.
    #[must_use]
    pub fn into_user(self) -> User {
        self.user
    }
}

/// Per-chapter view for progress displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterStatus {
    pub number: u32,
    pub title: String,
    pub required_level: u32,
    pub date: Option<NaiveDate>,
    pub day_elapsed: bool,
    pub validated: bool,
    pub completed_challenges: usize,
    pub total_challenges: usize,
    pub access: Access,
    /// Present once the chapter has a record.
    pub preview: Option<ChapterXpPreview>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressStatus {
    pub username: String,
    pub journey_name: Option<String>,
    pub journey_title: Option<String>,
    pub phase: JourneyPhase,
    pub start_date: Option<NaiveDate>,
    pub timezone: String,
    pub today: NaiveDate,
    pub fast_forward: bool,
    pub xp: XpProgress,
    pub credits: CreditLedger,
    pub levels: Vec<LevelCommitment>,
    pub chapters: Vec<ChapterStatus>,
    pub achievements: Vec<String>,
}
