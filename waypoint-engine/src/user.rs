//! Persisted user record and the per-chapter progress it carries.
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::constants::DEFAULT_TIMEZONE;
use crate::data::{ChallengeTemplate, ChapterTemplate, JourneyDefinition};
use crate::day_accounting::chapter_date;
use crate::error::ProgressionError;

/// An unlocked achievement with its display text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// A challenge instance inside a user's chapter record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    #[serde(flatten)]
    pub template: ChallengeTemplate,
    #[serde(default)]
    pub completed: bool,
}

impl From<&ChallengeTemplate> for ChallengeRecord {
    fn from(template: &ChallengeTemplate) -> Self {
        Self {
            template: template.clone(),
            completed: false,
        }
    }
}

/// Per-user progress for one chapter, materialized from its template the
/// first time the chapter is touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRecord {
    /// One-way: once set it is never cleared except by a journey reset.
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub intro: String,
    pub required_level: u32,
    /// Calendar slot of the chapter: start date plus `number - 1` days.
    pub date: NaiveDate,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub challenges: Vec<ChallengeRecord>,
}

impl ChapterRecord {
    #[must_use]
    pub fn from_template(number: u32, template: &ChapterTemplate, start_date: NaiveDate) -> Self {
        Self {
            validated: false,
            title: template.title.clone(),
            description: template.description.clone(),
            image: template.image.clone(),
            intro: template.intro.clone(),
            required_level: template.required_level,
            date: chapter_date(start_date, number),
            depends_on: template.depends_on.clone(),
            challenges: template.challenges.iter().map(ChallengeRecord::from).collect(),
        }
    }

    /// Whether any challenge has been completed; this is what commits a level.
    #[must_use]
    pub fn has_completed_challenge(&self) -> bool {
        self.challenges.iter().any(|c| c.completed)
    }
}

/// A personal journey saved in the user's collection: the journey fields
/// themselves with the two timestamps stored alongside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedJourney {
    #[serde(flatten)]
    pub definition: JourneyDefinition,
    #[serde(default = "unknown_timestamp", deserialize_with = "lenient_timestamp")]
    pub created_at: NaiveDateTime,
    #[serde(default = "unknown_timestamp", deserialize_with = "lenient_timestamp")]
    pub modified_at: NaiveDateTime,
}

fn unknown_timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Accepts naive ISO timestamps with or without fractional seconds, a space
/// instead of `T`, an RFC 3339 offset (converted to UTC) or a bare date.
fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    text.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|at| at.naive_utc()))
        .or_else(|| {
            text.parse::<NaiveDate>()
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(unknown_timestamp()),
        Some(text) => parse_timestamp(&text)
            .ok_or_else(|| D::Error::custom(format!("unrecognized timestamp '{text}'"))),
    }
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

/// Identity plus all progression state for one participant.
///
/// Everything derived (XP, level, credits, commitment, accessibility) is
/// recomputed from these fields on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default, with = "crate::data::chapter_keys")]
    pub chapters: BTreeMap<u32, ChapterRecord>,
    #[serde(default)]
    pub active_journey_data: Option<JourneyDefinition>,
    #[serde(default)]
    pub custom_journeys: BTreeMap<String, SavedJourney>,
    #[serde(default)]
    pub journey_name: Option<String>,
    #[serde(default)]
    pub intro_shown: bool,
    #[serde(default)]
    pub achievements: BTreeMap<String, Achievement>,
    #[serde(default)]
    pub avatar: Map<String, Value>,
    #[serde(default)]
    pub world: Map<String, Value>,
    /// Top-level fields owned by the account store, such as `salt` and
    /// `pw_hash`. Kept as found and written back on every save.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// A freshly registered user with no journey.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            start_date: None,
            timezone: default_timezone(),
            chapters: BTreeMap::new(),
            active_journey_data: None,
            custom_journeys: BTreeMap::new(),
            journey_name: None,
            intro_shown: false,
            achievements: BTreeMap::new(),
            avatar: Map::new(),
            world: Map::new(),
            extra: Map::new(),
        }
    }

    #[must_use]
    pub const fn has_active_journey(&self) -> bool {
        self.start_date.is_some() && self.active_journey_data.is_some()
    }

    #[must_use]
    pub const fn active_journey(&self) -> Option<&JourneyDefinition> {
        self.active_journey_data.as_ref()
    }

    #[must_use]
    pub fn chapter_template(&self, number: u32) -> Option<&ChapterTemplate> {
        self.active_journey_data.as_ref()?.chapters.get(&number)
    }

    #[must_use]
    pub fn chapter_record(&self, number: u32) -> Option<&ChapterRecord> {
        self.chapters.get(&number)
    }

    /// Get the chapter record, creating it from the active journey's
    /// template on first access.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressionError::InvalidChapter`] when no journey is
    /// running or the chapter is not part of it.
    pub fn chapter_record_mut(&mut self, number: u32) -> Result<&mut ChapterRecord, ProgressionError> {
        let start = self
            .start_date
            .ok_or(ProgressionError::InvalidChapter(number))?;
        let template = self
            .active_journey_data
            .as_ref()
            .and_then(|journey| journey.chapters.get(&number))
            .ok_or(ProgressionError::InvalidChapter(number))?;
        Ok(self
            .chapters
            .entry(number)
            .or_insert_with(|| ChapterRecord::from_template(number, template, start)))
    }

    #[must_use]
    pub fn has_achievement(&self, id: &str) -> bool {
        self.achievements.contains_key(id)
    }

    /// Required achievement ids the user does not hold, in input order.
    #[must_use]
    pub fn missing_achievements(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|id| !self.has_achievement(id))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn validated_count(&self) -> usize {
        self.chapters.values().filter(|c| c.validated).count()
    }

    #[must_use]
    pub fn is_validated(&self, number: u32) -> bool {
        self.chapter_record(number).is_some_and(|c| c.validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Difficulty;

    fn journey() -> JourneyDefinition {
        let mut journey = JourneyDefinition::empty_template("Record", 3);
        let chapter = journey.chapters.get_mut(&2).unwrap();
        chapter.required_level = 2;
        chapter.challenges[0].difficulty = Difficulty::Hard;
        journey
    }

    fn started_user() -> User {
        let mut user = User::new("ada");
        user.start_date = NaiveDate::from_ymd_opt(2024, 3, 10);
        user.active_journey_data = Some(journey());
        user
    }

    #[test]
    fn record_materializes_lazily_with_dated_slot() {
        let mut user = started_user();
        assert!(user.chapter_record(2).is_none());
        let record = user.chapter_record_mut(2).unwrap();
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(record.required_level, 2);
        assert_eq!(record.challenges[0].template.difficulty, Difficulty::Hard);
        assert!(!record.challenges[0].completed);
        record.challenges[0].completed = true;

        // Second access returns the existing record rather than a fresh copy.
        assert!(user.chapter_record_mut(2).unwrap().has_completed_challenge());
        assert_eq!(user.chapters.len(), 1);
    }

    #[test]
    fn record_access_requires_running_journey() {
        let mut user = User::new("bo");
        assert_eq!(
            user.chapter_record_mut(1).unwrap_err(),
            ProgressionError::InvalidChapter(1)
        );
        let mut user = started_user();
        assert_eq!(
            user.chapter_record_mut(9).unwrap_err(),
            ProgressionError::InvalidChapter(9)
        );
        assert!(user.chapters.is_empty());
    }

    #[test]
    fn missing_achievements_keeps_order() {
        let mut user = User::new("cy");
        user.achievements.insert(
            "b".to_string(),
            Achievement {
                id: "b".to_string(),
                title: "B".to_string(),
                description: String::new(),
            },
        );
        let required = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(user.missing_achievements(&required), vec!["c", "a"]);
    }

    #[test]
    fn persisted_shape_uses_string_chapter_keys_and_flat_challenges() {
        let mut user = started_user();
        user.chapter_record_mut(1).unwrap().challenges[0].completed = true;
        let value = serde_json::to_value(&user).unwrap();
        let challenge = &value["chapters"]["1"]["challenges"][0];
        assert_eq!(challenge["completed"], serde_json::json!(true));
        assert_eq!(challenge["difficulty"], serde_json::json!("easy"));
        assert_eq!(value["start_date"], serde_json::json!("2024-03-10"));
        assert!(value.get("credentials").is_none());

        let restored: User = serde_json::from_value(value).unwrap();
        assert_eq!(restored, user);
    }

    #[test]
    fn minimal_record_deserializes_with_defaults() {
        let user: User = serde_json::from_str(r#"{"username": "dee", "salt": "x"}"#).unwrap();
        assert_eq!(user.timezone, DEFAULT_TIMEZONE);
        assert!(user.start_date.is_none());
        assert!(!user.has_active_journey());
        assert_eq!(user.extra.get("salt"), Some(&serde_json::json!("x")));
    }

    const ACCOUNT_STORE_RECORD: &str = r#"{
        "username": "ana",
        "salt": "c2FsdA==",
        "pw_hash": "9f86d081",
        "start_date": "2024-01-01",
        "timezone": "Asia/Tokyo",
        "chapters": {
            "1": {"validated": true, "title": "Gate", "required_level": 1,
                  "date": "2024-01-01",
                  "challenges": [{"title": "Knock", "difficulty": "easy", "completed": true}]}
        },
        "active_journey_data": {
            "title": "Trip", "initial_avatar": {"hp": 3}, "initial_world": "{}",
            "chapters": {"1": {"title": "Gate", "challenges": [{"title": "Knock"}]}}
        },
        "custom_journeys": {
            "my_trip": {
                "title": "Trip", "description": "", "image": null, "intro_text": "",
                "failure_text": "", "success_text": "",
                "initial_avatar": {"hp": 3}, "initial_world": "{}",
                "chapters": {"1": {"title": "Gate", "required_level": 1, "challenges": []}},
                "created_at": "2024-01-01T08:00:00.123456",
                "modified_at": "2024-01-02T09:30:00"
            }
        },
        "journey_name": "trip",
        "intro_shown": true,
        "avatar": {"hp": 3},
        "world": {},
        "achievements": {}
    }"#;

    #[test]
    fn account_store_record_loads_and_keeps_credentials() {
        let user: User = serde_json::from_str(ACCOUNT_STORE_RECORD).unwrap();
        assert!(user.is_validated(1));
        assert_eq!(user.timezone, "Asia/Tokyo");
        assert_eq!(
            user.active_journey().unwrap().initial_avatar.as_deref(),
            Some(r#"{"hp":3}"#)
        );

        let saved = &user.custom_journeys["my_trip"];
        assert_eq!(saved.definition.title, "Trip");
        assert_eq!(saved.definition.chapters.len(), 1);
        assert_eq!(
            saved.created_at,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_micro_opt(8, 0, 0, 123_456)
                .unwrap()
        );
        assert_eq!(
            saved.modified_at,
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap()
        );

        let written = serde_json::to_value(&user).unwrap();
        assert_eq!(written["salt"], serde_json::json!("c2FsdA=="));
        assert_eq!(written["pw_hash"], serde_json::json!("9f86d081"));
        let entry = &written["custom_journeys"]["my_trip"];
        assert_eq!(entry["title"], serde_json::json!("Trip"));
        assert!(entry.get("definition").is_none());
        assert!(entry["created_at"].as_str().unwrap().starts_with("2024-01-01T08:00:00"));

        let reloaded: User = serde_json::from_value(written).unwrap();
        assert_eq!(reloaded, user);
    }

    #[test]
    fn timestamps_parse_leniently() {
        let noon = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-06-01T12:00:00"), Some(noon));
        assert_eq!(parse_timestamp("2024-06-01 12:00:00"), Some(noon));
        assert_eq!(parse_timestamp("2024-06-01T14:00:00+02:00"), Some(noon));
        assert_eq!(
            parse_timestamp("2024-06-01"),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp("last tuesday"), None);

        let saved: SavedJourney = serde_json::from_str(r#"{"title": "Bare"}"#).unwrap();
        assert_eq!(saved.created_at, unknown_timestamp());
    }
}
