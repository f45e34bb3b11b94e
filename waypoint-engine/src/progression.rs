//! Mutators for the user record.
//!
//! Every operation here either applies completely or leaves the record
//! untouched: preconditions are evaluated against the unmodified user
//! before any field is written.
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::access::can_access_chapter;
use crate::catalog::CatalogEntry;
use crate::completion::is_journey_completed;
use crate::constants::{LOG_PROGRESSION, PERSONAL_COPY_SUFFIX};
use crate::data::JourneyDefinition;
use crate::day_accounting::{DayContext, validation_credits};
use crate::error::{ProgressionError, ValidationRefusal};
use crate::user::{Achievement, SavedJourney, User};
use crate::xp::{chapter_xp, current_level};

/// Mark challenge `index` of chapter `number` as completed or not.
///
/// Completion is deliberately not gated by accessibility: evaluators may
/// observe progress in a chapter the user can no longer enter.
///
/// # Errors
///
/// [`ProgressionError::InvalidChapter`] without a running journey or for an
/// unknown chapter, [`ProgressionError::InvalidChallenge`] for an index past
/// the chapter's challenge list. The user is unchanged on error.
pub fn toggle_challenge_completion(
    user: &mut User,
    number: u32,
    index: usize,
    completed: bool,
) -> Result<(), ProgressionError> {
    if !user.has_active_journey() {
        return Err(ProgressionError::InvalidChapter(number));
    }
    let count = user
        .chapter_record(number)
        .map(|record| record.challenges.len())
        .or_else(|| {
            user.chapter_template(number)
                .map(|template| template.challenges.len())
        })
        .ok_or(ProgressionError::InvalidChapter(number))?;
    let invalid = ProgressionError::InvalidChallenge {
        chapter: number,
        index,
    };
    if index >= count {
        return Err(invalid);
    }

    let challenge = user
        .chapter_record_mut(number)?
        .challenges
        .get_mut(index)
        .ok_or(invalid)?;
    challenge.completed = completed;
    log::debug!(
        target: LOG_PROGRESSION,
        "{}: chapter {number} challenge {index} completed={completed}",
        user.username
    );
    Ok(())
}

/// Check every validation precondition without touching the user.
///
/// # Errors
///
/// The first refusal found, checked in this order: accessibility, already
/// validated, validation credits, commitment.
pub fn can_validate_chapter(
    user: &User,
    number: u32,
    day: &DayContext,
) -> Result<(), ValidationRefusal> {
    let access = can_access_chapter(user, number);
    if !access.accessible {
        return Err(ValidationRefusal::Inaccessible(access.reason));
    }
    if user.is_validated(number) {
        return Err(ValidationRefusal::AlreadyValidated);
    }
    if validation_credits(user, day) == 0 {
        return Err(ValidationRefusal::NoCredits);
    }
    if access.committed_chapter != Some(number) {
        return Err(ValidationRefusal::NotCommitted);
    }
    Ok(())
}

/// What a successful validation produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub chapter: u32,
    pub xp_gained: f64,
    /// Level after the validation was applied.
    pub level: u32,
    pub journey_completed: bool,
}

/// Validate chapter `number`, spending one validation credit.
///
/// # Errors
///
/// [`ProgressionError::PreconditionFailed`] carrying the refusal reason;
/// the record is left exactly as it was.
pub fn validate_chapter(
    user: &mut User,
    number: u32,
    day: &DayContext,
) -> Result<ValidationOutcome, ProgressionError> {
    if let Err(refusal) = can_validate_chapter(user, number, day) {
        log::debug!(
            target: LOG_PROGRESSION,
            "{}: validation of chapter {number} refused: {refusal}",
            user.username
        );
        return Err(ProgressionError::PreconditionFailed(refusal));
    }

    let record = user.chapter_record_mut(number)?;
    record.validated = true;
    let xp_gained = chapter_xp(record);

    let outcome = ValidationOutcome {
        chapter: number,
        xp_gained,
        level: current_level(user),
        journey_completed: is_journey_completed(user),
    };
    log::info!(
        target: LOG_PROGRESSION,
        "{}: chapter {number} validated (+{xp_gained:.2} xp, level {})",
        user.username,
        outcome.level
    );
    if outcome.journey_completed {
        log::info!(target: LOG_PROGRESSION, "{}: journey completed", user.username);
    }
    Ok(outcome)
}

/// Abandon the running journey. Personal journeys, timezone and
/// credentials survive; everything tied to the run is cleared.
pub fn reset_journey(user: &mut User) {
    user.start_date = None;
    user.chapters.clear();
    user.active_journey_data = None;
    user.journey_name = None;
    user.intro_shown = false;
    user.avatar.clear();
    user.world.clear();
    user.achievements.clear();
    log::info!(target: LOG_PROGRESSION, "{}: journey reset", user.username);
}

/// Begin `entry` on `start_date`, replacing any journey in progress.
pub fn start_journey(
    user: &mut User,
    start_date: NaiveDate,
    entry: &CatalogEntry,
    timezone: &str,
) {
    let definition = &entry.definition;
    user.start_date = Some(start_date);
    user.timezone = timezone.to_string();
    user.chapters.clear();
    user.journey_name = Some(entry.name.clone());
    user.intro_shown = false;
    user.achievements.clear();
    user.avatar = parse_initial_state(definition.initial_avatar.as_deref());
    user.world = parse_initial_state(definition.initial_world.as_deref());
    user.active_journey_data = Some(definition.clone());
    log::info!(
        target: LOG_PROGRESSION,
        "{}: started '{}' on {start_date} ({timezone})",
        user.username,
        entry.name
    );
}

/// Decode an initial avatar/world blob. Anything that is not a JSON object
/// becomes an empty object.
#[must_use]
pub fn parse_initial_state(raw: Option<&str>) -> Map<String, Value> {
    let Some(text) = raw.map(str::trim).filter(|text| !text.is_empty()) else {
        return Map::new();
    };
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            log::warn!(target: LOG_PROGRESSION, "initial state is not an object: {other}");
            Map::new()
        }
        Err(err) => {
            log::warn!(target: LOG_PROGRESSION, "initial state is not valid JSON: {err}");
            Map::new()
        }
    }
}

/// Record achievement `id`. Returns `false` when it was already held, in
/// which case the stored entry is kept as is.
pub fn unlock_achievement(
    user: &mut User,
    id: &str,
    title: Option<&str>,
    description: Option<&str>,
) -> bool {
    if user.has_achievement(id) {
        return false;
    }
    let title = title.filter(|title| !title.is_empty()).unwrap_or(id);
    user.achievements.insert(
        id.to_string(),
        Achievement {
            id: id.to_string(),
            title: title.to_string(),
            description: description.unwrap_or_default().to_string(),
        },
    );
    log::info!(target: LOG_PROGRESSION, "{}: achievement '{id}' unlocked", user.username);
    true
}

pub fn mark_intro_shown(user: &mut User) {
    user.intro_shown = true;
}

/// Collection key for a personal journey file name.
#[must_use]
pub fn journey_key(name: &str) -> String {
    name.trim().replace(".json", "").replace(' ', "_").to_lowercase()
}

/// Editable copy of a catalog journey, retitled so it reads as the user's own.
#[must_use]
pub fn personal_copy(definition: &JourneyDefinition) -> JourneyDefinition {
    JourneyDefinition {
        title: format!("{}{PERSONAL_COPY_SUFFIX}", definition.title),
        ..definition.clone()
    }
}

/// Store `definition` in the user's personal collection and return its key.
///
/// Re-saving under the same key keeps the original `created_at`.
///
/// # Errors
///
/// [`ProgressionError::InvalidFormat`] when `name` cleans to an empty key.
pub fn save_custom_journey(
    user: &mut User,
    name: &str,
    definition: JourneyDefinition,
    now: NaiveDateTime,
) -> Result<String, ProgressionError> {
    let key = journey_key(name);
    if key.is_empty() {
        return Err(ProgressionError::InvalidFormat(format!(
            "journey name '{name}' is empty"
        )));
    }
    let created_at = user
        .custom_journeys
        .get(&key)
        .map_or(now, |existing| existing.created_at);
    user.custom_journeys.insert(
        key.clone(),
        SavedJourney {
            definition,
            created_at,
            modified_at: now,
        },
    );
    log::info!(target: LOG_PROGRESSION, "{}: saved personal journey '{key}'", user.username);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessReason;
    use crate::catalog::CatalogEntry;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn started(chapters: u32) -> User {
        let mut definition = JourneyDefinition::empty_template("Trail", chapters);
        definition.initial_avatar = Some(r#"{"hp": 3}"#.to_string());
        definition.initial_world = Some("[1, 2]".to_string());
        let entry = CatalogEntry::official("trail", definition);
        let mut user = User::new("jo");
        start_journey(&mut user, date(2024, 1, 1), &entry, "UTC");
        user
    }

    #[test]
    fn start_seeds_state_and_clears_previous_run() {
        let mut user = User::new("jo");
        unlock_achievement(&mut user, "old", None, None);
        user.intro_shown = true;
        let entry = CatalogEntry::official("trail", JourneyDefinition::empty_template("T", 2));
        start_journey(&mut user, date(2024, 1, 1), &entry, "Asia/Tokyo");

        assert!(user.has_active_journey());
        assert!(user.achievements.is_empty());
        assert!(!user.intro_shown);
        assert_eq!(user.journey_name.as_deref(), Some("trail"));
        assert_eq!(user.timezone, "Asia/Tokyo");

        let seeded = started(2);
        assert_eq!(seeded.avatar.get("hp"), Some(&Value::from(3)));
        assert!(seeded.world.is_empty(), "non-object world falls back to empty");
    }

    #[test]
    fn initial_state_parsing_is_lenient() {
        assert!(parse_initial_state(None).is_empty());
        assert!(parse_initial_state(Some("  ")).is_empty());
        assert!(parse_initial_state(Some("{not json")).is_empty());
        assert_eq!(parse_initial_state(Some(r#"{"a":1}"#)).len(), 1);
    }

    #[test]
    fn toggle_is_idempotent_and_checks_bounds_first() {
        let mut user = started(2);
        toggle_challenge_completion(&mut user, 1, 0, true).unwrap();
        toggle_challenge_completion(&mut user, 1, 0, true).unwrap();
        assert!(user.chapter_record(1).unwrap().challenges[0].completed);

        let before = user.clone();
        assert_eq!(
            toggle_challenge_completion(&mut user, 2, 4, true),
            Err(ProgressionError::InvalidChallenge {
                chapter: 2,
                index: 4
            })
        );
        assert_eq!(
            toggle_challenge_completion(&mut user, 9, 0, true),
            Err(ProgressionError::InvalidChapter(9))
        );
        assert_eq!(user, before, "failed toggles must not materialize records");

        toggle_challenge_completion(&mut user, 1, 0, false).unwrap();
        assert!(!user.chapter_record(1).unwrap().has_completed_challenge());
    }

    #[test]
    fn validation_refusals_come_in_order() {
        let mut user = started(2);
        let today = DayContext::on(date(2024, 1, 3));

        assert_eq!(
            can_validate_chapter(&user, 1, &today),
            Err(ValidationRefusal::NotCommitted)
        );
        assert_eq!(
            can_validate_chapter(&user, 1, &DayContext::on(date(2024, 1, 1))),
            Err(ValidationRefusal::NoCredits)
        );

        toggle_challenge_completion(&mut user, 1, 0, true).unwrap();
        assert_eq!(
            can_validate_chapter(&user, 2, &today),
            Err(ValidationRefusal::Inaccessible(AccessReason::CommittedElsewhere))
        );

        let outcome = validate_chapter(&mut user, 1, &today).unwrap();
        assert_eq!(outcome.chapter, 1);
        assert!((outcome.xp_gained - 2.0).abs() < 1e-12);
        assert_eq!(outcome.level, 2);
        assert!(outcome.journey_completed);

        let before = serde_json::to_string(&user).unwrap();
        assert_eq!(
            validate_chapter(&mut user, 1, &today),
            Err(ProgressionError::PreconditionFailed(
                ValidationRefusal::AlreadyValidated
            ))
        );
        assert_eq!(serde_json::to_string(&user).unwrap(), before);
    }

    #[test]
    fn reset_keeps_personal_collection() {
        let mut user = started(2);
        let now = date(2024, 1, 2).and_hms_opt(9, 0, 0).unwrap();
        save_custom_journey(&mut user, "Mine.json", JourneyDefinition::default(), now).unwrap();
        toggle_challenge_completion(&mut user, 1, 0, true).unwrap();
        unlock_achievement(&mut user, "key", Some("Key"), None);

        reset_journey(&mut user);
        assert!(!user.has_active_journey());
        assert!(user.chapters.is_empty());
        assert!(user.achievements.is_empty());
        assert!(user.avatar.is_empty());
        assert_eq!(user.journey_name, None);
        assert_eq!(user.custom_journeys.len(), 1);
        assert_eq!(user.timezone, "UTC");
    }

    #[test]
    fn unlocking_twice_keeps_first_entry() {
        let mut user = User::new("kim");
        assert!(unlock_achievement(&mut user, "found_key", None, Some("rusty")));
        assert!(!unlock_achievement(&mut user, "found_key", Some("Other"), None));
        let held = &user.achievements["found_key"];
        assert_eq!(held.title, "found_key");
        assert_eq!(held.description, "rusty");
    }

    #[test]
    fn saved_journeys_keep_creation_time() {
        let mut user = User::new("lu");
        let first = date(2024, 1, 1).and_hms_opt(8, 0, 0).unwrap();
        let later = date(2024, 2, 1).and_hms_opt(8, 0, 0).unwrap();
        let key = save_custom_journey(&mut user, "My Trip.json", JourneyDefinition::default(), first)
            .unwrap();
        assert_eq!(key, "my_trip");
        save_custom_journey(&mut user, "my trip", JourneyDefinition::default(), later).unwrap();

        let saved = &user.custom_journeys["my_trip"];
        assert_eq!(saved.created_at, first);
        assert_eq!(saved.modified_at, later);
        assert!(matches!(
            save_custom_journey(&mut user, ".json", JourneyDefinition::default(), later),
            Err(ProgressionError::InvalidFormat(_))
        ));
    }

    #[test]
    fn personal_copy_only_changes_the_title() {
        let original = JourneyDefinition::empty_template("Harbor", 2);
        let copy = personal_copy(&original);
        assert_eq!(copy.title, "Harbor (My Version)");
        assert_eq!(copy.chapters, original.chapters);
        assert_eq!(original.title, "Harbor");
    }
}
