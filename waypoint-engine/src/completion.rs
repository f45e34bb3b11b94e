use serde::{Deserialize, Serialize};
use std::fmt;

use crate::commitment::validated_chapter_for_level;
use crate::user::User;

/// A journey is complete once a chapter at its highest required level has
/// been validated. Journeys without chapters never complete.
#[must_use]
pub fn is_journey_completed(user: &User) -> bool {
    user.active_journey()
        .and_then(|journey| journey.max_required_level())
        .is_some_and(|top| validated_chapter_for_level(user, top).is_some())
}

/// Which screen of the journey the user belongs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyPhase {
    NotStarted,
    Intro,
    InProgress,
    Completed,
}

impl JourneyPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Intro => "intro",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for JourneyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[must_use]
pub fn journey_phase(user: &User) -> JourneyPhase {
    if !user.has_active_journey() {
        JourneyPhase::NotStarted
    } else if !user.intro_shown {
        JourneyPhase::Intro
    } else if is_journey_completed(user) {
        JourneyPhase::Completed
    } else {
        JourneyPhase::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::JourneyDefinition;
    use chrono::NaiveDate;

    fn laddered_user() -> User {
        let mut journey = JourneyDefinition::empty_template("Ladder", 4);
        for (number, level) in [(2, 2), (3, 3), (4, 3)] {
            journey.chapters.get_mut(&number).unwrap().required_level = level;
        }
        let mut user = User::new("ivy");
        user.start_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        user.active_journey_data = Some(journey);
        user
    }

    #[test]
    fn completes_on_any_top_level_validation() {
        let mut user = laddered_user();
        user.chapter_record_mut(1).unwrap().validated = true;
        user.chapter_record_mut(2).unwrap().validated = true;
        assert!(!is_journey_completed(&user));

        user.chapter_record_mut(4).unwrap().validated = true;
        assert!(is_journey_completed(&user));
    }

    #[test]
    fn empty_or_missing_journey_is_never_complete() {
        assert!(!is_journey_completed(&User::new("nobody")));
        let mut user = User::new("blank");
        user.active_journey_data = Some(JourneyDefinition::empty_template("Blank", 0));
        assert!(!is_journey_completed(&user));
    }

    #[test]
    fn phase_walks_from_intro_to_completed() {
        assert_eq!(journey_phase(&User::new("new")), JourneyPhase::NotStarted);
        let mut user = laddered_user();
        assert_eq!(journey_phase(&user), JourneyPhase::Intro);
        user.intro_shown = true;
        assert_eq!(journey_phase(&user), JourneyPhase::InProgress);
        user.chapter_record_mut(3).unwrap().validated = true;
        assert_eq!(journey_phase(&user), JourneyPhase::Completed);
        assert_eq!(JourneyPhase::InProgress.to_string(), "in_progress");
    }
}
