//! Normalized journey definitions shared by the catalog and user records.
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::constants::{
    DEFAULT_CHALLENGE_TITLE, DEFAULT_REQUIRED_LEVEL, WEIGHT_EASY, WEIGHT_EXTREME, WEIGHT_HARD,
    WEIGHT_MEDIUM,
};

/// Difficulty tier of a challenge; drives its share of the chapter bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
    Extreme,
}

impl Difficulty {
    pub const ALL: [Self; 4] = [Self::Easy, Self::Medium, Self::Hard, Self::Extreme];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::Extreme => "extreme",
        }
    }

    /// Relative weight of the tier in the challenge bonus.
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::Easy => WEIGHT_EASY,
            Self::Medium => WEIGHT_MEDIUM,
            Self::Hard => WEIGHT_HARD,
            Self::Extreme => WEIGHT_EXTREME,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            "extreme" => Ok(Self::Extreme),
            _ => Err(()),
        }
    }
}

/// Static definition of a challenge inside a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeTemplate {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Opaque payload for the scripting collaborator; never inspected here.
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Default for ChallengeTemplate {
    fn default() -> Self {
        Self {
            title: DEFAULT_CHALLENGE_TITLE.to_string(),
            description: String::new(),
            image: None,
            difficulty: Difficulty::Easy,
            code: String::new(),
            depends_on: Vec::new(),
        }
    }
}

/// Static definition of a chapter: narrative, gating and challenges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterTemplate {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub intro: String,
    #[serde(default = "default_required_level")]
    pub required_level: u32,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub challenges: Vec<ChallengeTemplate>,
}

const fn default_required_level() -> u32 {
    DEFAULT_REQUIRED_LEVEL
}

impl Default for ChapterTemplate {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            image: None,
            intro: String::new(),
            required_level: DEFAULT_REQUIRED_LEVEL,
            depends_on: Vec::new(),
            challenges: Vec::new(),
        }
    }
}

/// A journey in its normalized shape, keyed by chapter number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JourneyDefinition {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub intro_text: String,
    #[serde(default)]
    pub failure_text: String,
    #[serde(default)]
    pub success_text: String,
    /// JSON object text seeding the avatar blob at journey start.
    #[serde(default, deserialize_with = "blob_text")]
    pub initial_avatar: Option<String>,
    /// JSON object text seeding the world blob at journey start.
    #[serde(default, deserialize_with = "blob_text")]
    pub initial_world: Option<String>,
    #[serde(default, with = "chapter_keys")]
    pub chapters: BTreeMap<u32, ChapterTemplate>,
}

/// Initial-state blobs are stored either as text or as an inline object.
fn blob_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(blob @ Value::Object(_)) => Some(blob.to_string()),
        _ => None,
    })
}

/// Chapter maps keyed by number, written with string keys.
///
/// Keys are parsed by hand so the maps also load when nested under
/// `#[serde(flatten)]`, where serde buffers keys as plain strings.
pub(crate) mod chapter_keys {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S, T>(chapters: &BTreeMap<u32, T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        serializer.collect_map(
            chapters
                .iter()
                .map(|(number, chapter)| (number.to_string(), chapter)),
        )
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<BTreeMap<u32, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        BTreeMap::<String, T>::deserialize(deserializer)?
            .into_iter()
            .map(|(key, chapter)| match key.trim().parse::<u32>() {
                Ok(number) => Ok((number, chapter)),
                Err(_) => Err(D::Error::custom(format!(
                    "chapter key '{key}' is not a number"
                ))),
            })
            .collect()
    }
}

impl JourneyDefinition {
    /// Build an editable skeleton with `chapter_count` placeholder chapters.
    #[must_use]
    pub fn empty_template(title: &str, chapter_count: u32) -> Self {
        let chapters = (1..=chapter_count)
            .map(|number| {
                let chapter = ChapterTemplate {
                    title: format!("Chapter {number}"),
                    description: format!("Description for chapter {number}"),
                    intro: format!("Chapter {number} - Write your introduction here..."),
                    challenges: vec![ChallengeTemplate {
                        title: "Example challenge".to_string(),
                        description: "Challenge description...".to_string(),
                        ..ChallengeTemplate::default()
                    }],
                    ..ChapterTemplate::default()
                };
                (number, chapter)
            })
            .collect();
        Self {
            title: title.to_string(),
            chapters,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn chapter(&self, number: u32) -> Option<&ChapterTemplate> {
        self.chapters.get(&number)
    }

    /// Highest `required_level` across all chapters, if any exist.
    #[must_use]
    pub fn max_required_level(&self) -> Option<u32> {
        self.chapters.values().map(|c| c.required_level).max()
    }

    /// Chapter numbers sharing `level`, in ascending order.
    pub fn chapters_at_level(&self, level: u32) -> impl Iterator<Item = u32> + '_ {
        self.chapters
            .iter()
            .filter(move |(_, chapter)| chapter.required_level == level)
            .map(|(number, _)| *number)
    }

    /// Distinct required levels in ascending order.
    #[must_use]
    pub fn levels(&self) -> Vec<u32> {
        let mut levels: Vec<u32> = self.chapters.values().map(|c| c.required_level).collect();
        levels.sort_unstable();
        levels.dedup();
        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_weights_follow_table() {
        let weights: Vec<f64> = Difficulty::ALL.iter().map(|d| d.weight()).collect();
        assert_eq!(weights, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!("hard".parse::<Difficulty>(), Ok(Difficulty::Hard));
        assert!("legendary".parse::<Difficulty>().is_err());
        assert_eq!(Difficulty::Extreme.to_string(), "extreme");
    }

    #[test]
    fn empty_template_is_dense_and_level_one() {
        let journey = JourneyDefinition::empty_template("Draft", 3);
        assert_eq!(journey.chapters.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        let second = journey.chapter(2).unwrap();
        assert_eq!(second.title, "Chapter 2");
        assert_eq!(second.required_level, 1);
        assert_eq!(second.challenges.len(), 1);
        assert_eq!(second.challenges[0].difficulty, Difficulty::Easy);
        assert_eq!(journey.max_required_level(), Some(1));
    }

    #[test]
    fn level_helpers_group_chapters() {
        let mut journey = JourneyDefinition::empty_template("Levels", 4);
        journey.chapters.get_mut(&3).unwrap().required_level = 2;
        journey.chapters.get_mut(&4).unwrap().required_level = 2;
        assert_eq!(journey.levels(), vec![1, 2]);
        assert_eq!(journey.chapters_at_level(2).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(journey.max_required_level(), Some(2));
        assert_eq!(JourneyDefinition::default().max_required_level(), None);
    }

    #[test]
    fn serialized_chapter_keys_are_strings() {
        let journey = JourneyDefinition::empty_template("Keys", 2);
        let value = serde_json::to_value(&journey).unwrap();
        assert!(value["chapters"].get("1").is_some());
        let back: JourneyDefinition = serde_json::from_value(value).unwrap();
        assert_eq!(back, journey);
    }

    #[test]
    fn stored_definitions_accept_inline_blobs_and_reject_bad_keys() {
        let journey: JourneyDefinition = serde_json::from_str(
            r#"{"title": "Blob", "initial_avatar": {"hp": 2}, "initial_world": 7,
                "chapters": {" 2 ": {"title": "Two"}}}"#,
        )
        .unwrap();
        assert_eq!(journey.initial_avatar.as_deref(), Some(r#"{"hp":2}"#));
        assert_eq!(journey.initial_world, None);
        assert_eq!(journey.chapter(2).unwrap().title, "Two");

        let err = serde_json::from_str::<JourneyDefinition>(
            r#"{"title": "Bad", "chapters": {"intro": {}}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("chapter key 'intro'"));
    }
}
