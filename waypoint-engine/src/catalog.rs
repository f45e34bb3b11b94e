//! Journey catalog: normalization of raw journey documents, catalog assembly
//! and authoring checks.
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::constants::{
    DEFAULT_CHALLENGE_TITLE, DEFAULT_REQUIRED_LEVEL, JOURNEY_REQUIRED_FIELDS, LOG_CATALOG,
};
use crate::data::{ChallengeTemplate, ChapterTemplate, Difficulty, JourneyDefinition};
use crate::error::ProgressionError;
use crate::user::User;

/// Normalize a raw journey document into a [`JourneyDefinition`].
///
/// Accepts `chapters` or the legacy `days` key, shaped as a list (numbered
/// from 1 unless an entry carries `chapter`/`day`) or as a map keyed by
/// chapter number. Normalizing the serialized form of a normalized
/// definition yields the same definition.
///
/// # Errors
///
/// Returns [`ProgressionError::InvalidFormat`] when the document is not an
/// object, has no `title`, or names a chapter with something that is not a
/// positive integer.
pub fn normalize_journey(raw: &Value) -> Result<JourneyDefinition, ProgressionError> {
    let object = raw
        .as_object()
        .ok_or_else(|| invalid("journey must be a JSON object"))?;
    let title = match object.get("title") {
        Some(Value::String(title)) => title.clone(),
        Some(_) => return Err(invalid("title must be a string")),
        None => return Err(invalid("missing title")),
    };
    let chapters = match object.get("chapters").or_else(|| object.get("days")) {
        Some(raw_chapters) => normalize_chapters(raw_chapters)?,
        None => BTreeMap::new(),
    };

    Ok(JourneyDefinition {
        title,
        description: string_field(object, "description"),
        image: optional_string(object, "image"),
        intro_text: string_field(object, "intro_text"),
        failure_text: string_field(object, "failure_text"),
        success_text: string_field(object, "success_text"),
        initial_avatar: initial_state_field(object, "initial_avatar"),
        initial_world: initial_state_field(object, "initial_world"),
        chapters,
    })
}

/// Parse a JSON text into a journey definition.
///
/// # Errors
///
/// Returns [`ProgressionError::InvalidFormat`] for unparsable JSON or any
/// failure reported by [`normalize_journey`].
pub fn parse_journey(body: &str) -> Result<JourneyDefinition, ProgressionError> {
    let raw: Value = serde_json::from_str(body).map_err(|err| invalid(&err.to_string()))?;
    normalize_journey(&raw)
}

fn invalid(message: &str) -> ProgressionError {
    ProgressionError::InvalidFormat(message.to_string())
}

fn normalize_chapters(raw: &Value) -> Result<BTreeMap<u32, ChapterTemplate>, ProgressionError> {
    let mut chapters = BTreeMap::new();
    match raw {
        Value::Array(items) => {
            for (position, item) in (1_u32..).zip(items) {
                let Some(chapter) = item.as_object() else {
                    continue;
                };
                let number = match chapter.get("chapter").or_else(|| chapter.get("day")) {
                    Some(explicit) => coerce_chapter_number(explicit).ok_or_else(|| {
                        invalid(&format!("chapter number {explicit} is not a positive integer"))
                    })?,
                    None => position,
                };
                chapters.insert(number, normalize_chapter(chapter));
            }
        }
        Value::Object(entries) => {
            for (key, item) in entries {
                let Some(chapter) = item.as_object() else {
                    continue;
                };
                let number = key
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| {
                        invalid(&format!("chapter key {key:?} is not a positive integer"))
                    })?;
                chapters.insert(number, normalize_chapter(chapter));
            }
        }
        _ => {}
    }
    Ok(chapters)
}

fn normalize_chapter(chapter: &Map<String, Value>) -> ChapterTemplate {
    let challenges = chapter
        .get("challenges")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(normalize_challenge)
                .collect()
        })
        .unwrap_or_default();

    ChapterTemplate {
        title: string_field(chapter, "title"),
        description: string_field(chapter, "description"),
        image: optional_string(chapter, "image"),
        intro: string_field(chapter, "intro"),
        required_level: level_field(chapter.get("required_level")),
        depends_on: string_list(chapter, "depends_on"),
        challenges,
    }
}

fn normalize_challenge(challenge: &Map<String, Value>) -> ChallengeTemplate {
    let difficulty = challenge
        .get("difficulty")
        .and_then(Value::as_str)
        .and_then(|d| d.parse::<Difficulty>().ok())
        .unwrap_or_default();
    ChallengeTemplate {
        title: challenge
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_CHALLENGE_TITLE)
            .to_string(),
        description: string_field(challenge, "description"),
        image: optional_string(challenge, "image"),
        difficulty,
        code: string_field(challenge, "code"),
        depends_on: string_list(challenge, "depends_on"),
    }
}

fn coerce_chapter_number(value: &Value) -> Option<u32> {
    let number = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 1.0)
                .map(|f| crate::numbers::floor_f64_to_u32(f).into())
        })?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    u32::try_from(number).ok().filter(|n| *n >= 1)
}

fn level_field(value: Option<&Value>) -> u32 {
    let level = match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|l| u32::try_from(l).ok())
            .or_else(|| n.as_f64().map(crate::numbers::floor_f64_to_u32)),
        Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    level.unwrap_or(DEFAULT_REQUIRED_LEVEL).max(DEFAULT_REQUIRED_LEVEL)
}

fn string_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn optional_string(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn string_list(object: &Map<String, Value>, key: &str) -> Vec<String> {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn initial_state_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(text) => Some(text.clone()),
        blob @ Value::Object(_) => Some(blob.to_string()),
        _ => None,
    }
}

/// A journey document as read by a [`crate::JourneySource`], before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawJourney {
    /// Catalog name, typically the file stem.
    pub name: String,
    pub body: String,
}

impl RawJourney {
    #[must_use]
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

/// Where a catalog entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JourneyOrigin {
    /// Shipped with the catalog.
    Official,
    /// Saved in the user's personal collection.
    Personal,
}

/// A selectable journey.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub source: JourneyOrigin,
    pub definition: JourneyDefinition,
    pub chapter_count: usize,
    pub created_at: Option<NaiveDateTime>,
    pub modified_at: Option<NaiveDateTime>,
}

impl CatalogEntry {
    #[must_use]
    pub fn official(name: impl Into<String>, definition: JourneyDefinition) -> Self {
        Self {
            name: name.into(),
            source: JourneyOrigin::Official,
            chapter_count: definition.chapters.len(),
            definition,
            created_at: None,
            modified_at: None,
        }
    }
}

/// A document left out of the catalog and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedJourney {
    pub name: String,
    pub reason: String,
}

/// Journeys available to a user, plus the documents that failed to load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JourneyCatalog {
    entries: Vec<CatalogEntry>,
    skipped: Vec<SkippedJourney>,
}

impl JourneyCatalog {
    /// Build the catalog from official documents and, when given, the
    /// user's personal collection. A bad document is skipped and reported
    /// without affecting the others.
    #[must_use]
    pub fn assemble(official: Vec<RawJourney>, user: Option<&User>) -> Self {
        let mut catalog = Self::default();
        let mut official = official;
        official.sort_by(|a, b| a.name.cmp(&b.name));

        for raw in official {
            match parse_journey(&raw.body) {
                Ok(definition) => catalog
                    .entries
                    .push(CatalogEntry::official(raw.name, definition)),
                Err(err) => {
                    log::warn!(target: LOG_CATALOG, "skipping journey {}: {err}", raw.name);
                    catalog.skipped.push(SkippedJourney {
                        name: raw.name,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if let Some(user) = user {
            for (name, saved) in &user.custom_journeys {
                catalog.entries.push(CatalogEntry {
                    name: name.clone(),
                    source: JourneyOrigin::Personal,
                    definition: saved.definition.clone(),
                    chapter_count: saved.definition.chapters.len(),
                    created_at: Some(saved.created_at),
                    modified_at: Some(saved.modified_at),
                });
            }
        }

        log::debug!(
            target: LOG_CATALOG,
            "catalog assembled: {} entries, {} skipped",
            catalog.entries.len(),
            catalog.skipped.len()
        );
        catalog
    }

    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn skipped(&self) -> &[SkippedJourney] {
        &self.skipped
    }

    /// Find an entry by name, official entries first.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.name == name && e.source == JourneyOrigin::Official)
            .or_else(|| self.entries.iter().find(|e| e.name == name))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CatalogEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a JourneyCatalog {
    type Item = &'a CatalogEntry;
    type IntoIter = std::slice::Iter<'a, CatalogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Authoring problem found in a raw journey document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureIssue {
    #[error("Journey must be a JSON object")]
    NotAnObject,
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Journey title is required")]
    MissingTitle,
    #[error("Journey must contain at least one chapter")]
    NoChapters,
    #[error("Chapter {0}: invalid structure")]
    InvalidChapter(String),
    #[error("Chapter {0}: missing introduction")]
    MissingIntro(String),
    #[error("Chapter {0}: no challenges defined")]
    NoChallenges(String),
    #[error("Chapter {chapter}, Challenge {position}: invalid structure")]
    InvalidChallenge { chapter: String, position: usize },
    #[error("Chapter {chapter}, Challenge {position}: missing title")]
    MissingChallengeTitle { chapter: String, position: usize },
    #[error("Chapter {chapter}, Challenge {position}: invalid difficulty ({difficulty})")]
    InvalidDifficulty {
        chapter: String,
        position: usize,
        difficulty: String,
    },
}

/// Report authoring problems in a raw journey document without failing.
///
/// Challenge positions are 1-based.
#[must_use]
pub fn validate_structure(raw: &Value) -> Vec<StructureIssue> {
    let Some(object) = raw.as_object() else {
        return vec![StructureIssue::NotAnObject];
    };
    let mut issues: Vec<StructureIssue> = JOURNEY_REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !object.contains_key(*field))
        .map(StructureIssue::MissingField)
        .collect();

    if !is_truthy(object.get("title")) {
        issues.push(StructureIssue::MissingTitle);
    }
    if !is_truthy(object.get("chapters")) {
        issues.push(StructureIssue::NoChapters);
    }

    let chapters: Vec<(String, &Value)> = match object.get("chapters") {
        Some(Value::Object(entries)) => entries.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Some(Value::Array(items)) => (1_usize..)
            .zip(items)
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    };

    for (label, chapter) in chapters {
        let Some(chapter) = chapter.as_object() else {
            issues.push(StructureIssue::InvalidChapter(label));
            continue;
        };
        if !is_truthy(chapter.get("intro")) {
            issues.push(StructureIssue::MissingIntro(label.clone()));
        }
        let challenges = chapter
            .get("challenges")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if challenges.is_empty() {
            issues.push(StructureIssue::NoChallenges(label.clone()));
        }
        for (position, challenge) in (1_usize..).zip(challenges) {
            issues.extend(challenge_issues(&label, position, challenge));
        }
    }
    issues
}

fn challenge_issues(chapter: &str, position: usize, challenge: &Value) -> Vec<StructureIssue> {
    let Some(challenge) = challenge.as_object() else {
        return vec![StructureIssue::InvalidChallenge {
            chapter: chapter.to_string(),
            position,
        }];
    };
    let mut issues = Vec::new();
    if !is_truthy(challenge.get("title")) {
        issues.push(StructureIssue::MissingChallengeTitle {
            chapter: chapter.to_string(),
            position,
        });
    }
    let difficulty = challenge.get("difficulty");
    let known = difficulty
        .and_then(Value::as_str)
        .is_some_and(|d| d.parse::<Difficulty>().is_ok());
    if !known {
        issues.push(StructureIssue::InvalidDifficulty {
            chapter: chapter.to_string(),
            position,
            difficulty: difficulty.map_or_else(|| "missing".to_string(), describe_value),
        });
    }
    issues
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(entries)) => !entries.is_empty(),
        Some(Value::Number(_)) => true,
    }
}
