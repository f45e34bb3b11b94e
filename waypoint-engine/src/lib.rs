//! Waypoint Progression Engine
//!
//! Platform-agnostic core logic for gamified journeys: catalog
//! normalization, the XP curve, chapter gating, commitment and validation
//! credits, and completion detection. This crate has no UI or storage
//! dependencies; hosts plug those in through [`JourneySource`] and
//! [`UserStore`].

pub mod access;
pub mod catalog;
pub mod commitment;
pub mod completion;
pub mod constants;
pub mod data;
pub mod day_accounting;
pub mod error;
pub mod numbers;
pub mod progression;
pub mod session;
pub mod user;
pub mod xp;

use anyhow::{Context, anyhow, bail};
use chrono::{NaiveDate, NaiveDateTime};

// Re-export commonly used types
pub use access::{Access, AccessReason, can_access_challenge, can_access_chapter};
pub use catalog::{
    CatalogEntry, JourneyCatalog, JourneyOrigin, RawJourney, SkippedJourney, StructureIssue,
    normalize_journey, parse_journey, validate_structure,
};
pub use commitment::{
    LevelCommitment, committed_chapter_for_level, level_overview, validated_chapter_for_level,
};
pub use completion::{JourneyPhase, is_journey_completed, journey_phase};
pub use data::{ChallengeTemplate, ChapterTemplate, Difficulty, JourneyDefinition};
pub use day_accounting::{
    CreditLedger, DayContext, chapter_date, credit_ledger, days_elapsed, is_day_elapsed,
    validation_credits,
};
pub use error::{ProgressionError, ValidationRefusal};
pub use progression::{
    ValidationOutcome, can_validate_chapter, journey_key, mark_intro_shown, personal_copy,
    reset_journey, save_custom_journey, start_journey, toggle_challenge_completion, unlock_achievement,
    validate_chapter,
};
pub use session::{ChapterStatus, ProgressSession, ProgressStatus};
pub use user::{Achievement, ChallengeRecord, ChapterRecord, SavedJourney, User};
pub use xp::{
    ChapterXpPreview, LevelBounds, XpProgress, chapter_xp, current_level, level_bounds,
    level_for_xp, total_xp, xp_progress,
};

/// Trait for abstracting where official journey documents come from.
/// Platform-specific implementations should provide this
pub trait JourneySource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load every official journey document, unparsed.
    ///
    /// # Errors
    ///
    /// Returns an error if the source itself cannot be read. Individual
    /// malformed documents are not errors; the catalog skips them.
    fn load_raw_journeys(&self) -> Result<Vec<RawJourney>, Self::Error>;
}

/// Trait for abstracting user record persistence.
/// Records are read and written whole.
pub trait UserStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load a user record
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read.
    fn load_user(&self, username: &str) -> Result<Option<User>, Self::Error>;

    /// Save a user record
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    fn save_user(&self, user: &User) -> Result<(), Self::Error>;
}

/// Main engine tying a journey source and a user store to the progression rules.
///
/// Every mutating call loads the record, applies one operation and saves the
/// record only when the operation succeeded.
pub struct ProgressionEngine<J, S>
where
    J: JourneySource,
    S: UserStore,
{
    journeys: J,
    store: S,
}

impl<J, S> ProgressionEngine<J, S>
where
    J: JourneySource,
    S: UserStore,
{
    /// Create a new engine with the provided journey source and user store
    pub const fn new(journeys: J, store: S) -> Self {
        Self { journeys, store }
    }

    /// Create and persist a user with no journey.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken or the store fails.
    pub fn register_user(&self, username: &str) -> anyhow::Result<User> {
        if username.trim().is_empty() {
            bail!("username must not be empty");
        }
        if self.store.load_user(username)?.is_some() {
            bail!("user '{username}' already exists");
        }
        let user = User::new(username);
        self.store.save_user(&user)?;
        log::info!("registered user {username}");
        Ok(user)
    }

    /// Load an existing user.
    ///
    /// # Errors
    ///
    /// Returns an error if the user is unknown or the store fails.
    pub fn load_user(&self, username: &str) -> anyhow::Result<User> {
        self.store
            .load_user(username)?
            .ok_or_else(|| anyhow!("unknown user '{username}'"))
    }

    /// Official journeys plus the user's personal collection, if given.
    ///
    /// # Errors
    ///
    /// Returns an error if the journey source cannot be read.
    pub fn available_journeys(&self, user: Option<&User>) -> anyhow::Result<JourneyCatalog> {
        let raw = self
            .journeys
            .load_raw_journeys()
            .context("failed to load journey catalog")?;
        Ok(JourneyCatalog::assemble(raw, user))
    }

    /// Bind a user record to the given day.
    ///
    /// # Errors
    ///
    /// Returns an error if the user cannot be loaded.
    pub fn session(&self, username: &str, day: DayContext) -> anyhow::Result<ProgressSession> {
        Ok(ProgressSession::new(self.load_user(username)?, day))
    }

    /// Persist the user record held by a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be saved.
    pub fn save_session(&self, session: &ProgressSession) -> anyhow::Result<()> {
        self.store.save_user(session.user())?;
        Ok(())
    }

    fn update<R>(
        &self,
        username: &str,
        apply: impl FnOnce(&mut User) -> Result<R, ProgressionError>,
    ) -> anyhow::Result<R> {
        let mut user = self.load_user(username)?;
        let result = apply(&mut user)?;
        self.store.save_user(&user)?;
        Ok(result)
    }

    /// Start journey `name` on `start_date`. Without an explicit timezone
    /// the user's current one is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the journey is not in the user's catalog or the
    /// store fails.
    pub fn start_journey(
        &self,
        username: &str,
        name: &str,
        start_date: NaiveDate,
        timezone: Option<&str>,
    ) -> anyhow::Result<User> {
        let mut user = self.load_user(username)?;
        let catalog = self.available_journeys(Some(&user))?;
        let entry = catalog
            .find(name)
            .ok_or_else(|| anyhow!("journey '{name}' is not available"))?;
        let timezone = timezone.map_or_else(|| user.timezone.clone(), str::to_string);
        start_journey(&mut user, start_date, entry, &timezone);
        self.store.save_user(&user)?;
        Ok(user)
    }

    /// # Errors
    ///
    /// Returns an error if the chapter or challenge does not exist or the
    /// store fails.
    pub fn toggle_challenge(
        &self,
        username: &str,
        number: u32,
        index: usize,
        completed: bool,
    ) -> anyhow::Result<()> {
        self.update(username, |user| {
            toggle_challenge_completion(user, number, index, completed)
        })
    }

    /// # Errors
    ///
    /// Returns an error if validation is refused or the store fails.
    pub fn validate_chapter(
        &self,
        username: &str,
        number: u32,
        day: &DayContext,
    ) -> anyhow::Result<ValidationOutcome> {
        self.update(username, |user| validate_chapter(user, number, day))
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn reset_journey(&self, username: &str) -> anyhow::Result<()> {
        self.update(username, |user| {
            reset_journey(user);
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn unlock_achievement(
        &self,
        username: &str,
        id: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> anyhow::Result<bool> {
        self.update(username, |user| {
            Ok(unlock_achievement(user, id, title, description))
        })
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn mark_intro_shown(&self, username: &str) -> anyhow::Result<()> {
        self.update(username, |user| {
            mark_intro_shown(user);
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns an error if the name is unusable or the store fails.
    pub fn save_custom_journey(
        &self,
        username: &str,
        name: &str,
        definition: JourneyDefinition,
        now: NaiveDateTime,
    ) -> anyhow::Result<String> {
        self.update(username, |user| {
            save_custom_journey(user, name, definition, now)
        })
    }

    /// Copy official journey `official` into the user's collection under
    /// `name` (defaults to the official name) and return the key.
    ///
    /// # Errors
    ///
    /// Returns an error if no official journey has that name, the name
    /// cleans to an empty key, or the store fails.
    pub fn copy_official_journey(
        &self,
        username: &str,
        official: &str,
        name: Option<&str>,
        now: NaiveDateTime,
    ) -> anyhow::Result<String> {
        let catalog = self.available_journeys(None)?;
        let entry = catalog
            .find(official)
            .ok_or_else(|| anyhow!("no official journey named '{official}'"))?;
        let definition = personal_copy(&entry.definition);
        let name = name.unwrap_or(&entry.name);
        self.update(username, |user| {
            save_custom_journey(user, name, definition, now)
        })
    }

    /// Derived progress snapshot for `username` on `day`.
    ///
    /// # Errors
    ///
    /// Returns an error if the user cannot be loaded.
    pub fn status(&self, username: &str, day: DayContext) -> anyhow::Result<ProgressStatus> {
        Ok(self.session(username, day)?.status())
    }
}
