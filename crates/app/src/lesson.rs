//! Lesson files read by the terminal runner.

use std::path::Path;

use learn_core::model::{
    AudioChannel, Hint, Item, ItemError, ItemId, Lesson, LessonId, MediaUri,
    MediaValidationError,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LessonFileError {
    #[error("cannot read lesson file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid lesson file: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Item(#[from] ItemError),
    #[error(transparent)]
    Media(#[from] MediaValidationError),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LessonFile {
    id: u64,
    title: String,
    items: Vec<ItemEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ItemEntry {
    id: u64,
    prompt: String,
    answers: Vec<String>,
    #[serde(default)]
    audio: AudioEntry,
    #[serde(default)]
    hint: Option<HintEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AudioEntry {
    meaning: Option<String>,
    target: Option<String>,
    trigger: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HintEntry {
    text: Option<String>,
    image: Option<String>,
}

impl ItemEntry {
    fn into_item(self) -> Result<Item, LessonFileError> {
        let mut item = Item::new(ItemId::new(self.id), self.prompt, self.answers)?;
        let channels = [
            (AudioChannel::Meaning, self.audio.meaning),
            (AudioChannel::Target, self.audio.target),
            (AudioChannel::Trigger, self.audio.trigger),
        ];
        for (channel, raw) in channels {
            if let Some(raw) = raw {
                item = item.with_audio(channel, MediaUri::parse(raw)?);
            }
        }
        if let Some(hint) = self.hint {
            item = item.with_hint(Hint {
                text: hint.text.filter(|t| !t.trim().is_empty()),
                image: hint.image.map(MediaUri::parse).transpose()?,
            });
        }
        Ok(item)
    }
}

/// Parse a lesson from its JSON text.
///
/// # Errors
///
/// Returns `LessonFileError` for malformed JSON or invalid items.
pub fn parse_lesson(json: &str) -> Result<Lesson, LessonFileError> {
    let file: LessonFile = serde_json::from_str(json)?;
    let items = file
        .items
        .into_iter()
        .map(ItemEntry::into_item)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Lesson::new(LessonId::new(file.id), file.title, items)?)
}

/// # Errors
///
/// Returns `LessonFileError` if the file cannot be read or parsed.
pub fn load_lesson(path: &Path) -> Result<Lesson, LessonFileError> {
    let json = std::fs::read_to_string(path)?;
    parse_lesson(&json)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": 4,
        "title": "Animals",
        "items": [
            {
                "id": 1,
                "prompt": "dog",
                "answers": ["perro"],
                "audio": { "meaning": "audio/dog.mp3", "trigger": "https://cdn.example.com/dog-hint.mp3" },
                "hint": { "text": "barks", "image": "img/dog.png" }
            },
            { "id": 2, "prompt": "cat", "answers": ["gato", " "] }
        ]
    }"#;

    #[test]
    fn parses_items_audio_and_hints() {
        let lesson = parse_lesson(SAMPLE).unwrap();
        assert_eq!(lesson.id(), LessonId::new(4));
        assert_eq!(lesson.len(), 2);

        let dog = lesson.item(0).unwrap();
        assert!(dog.audio().meaning.as_ref().unwrap().as_path().is_some());
        assert!(dog.audio().trigger.as_ref().unwrap().as_url().is_some());
        assert!(dog.audio().target.is_none());
        assert_eq!(dog.hint().text.as_deref(), Some("barks"));

        let cat = lesson.item(1).unwrap();
        assert_eq!(cat.accepted_answers(), &["gato".to_string()]);
        assert!(cat.hint().is_empty());
    }

    #[test]
    fn rejects_duplicate_items() {
        let json = r#"{ "id": 1, "title": "x", "items": [
            { "id": 1, "prompt": "a", "answers": ["a"] },
            { "id": 1, "prompt": "b", "answers": ["b"] }
        ] }"#;
        assert!(matches!(
            parse_lesson(json),
            Err(LessonFileError::Item(ItemError::DuplicateItem(_)))
        ));
    }

    #[test]
    fn bundled_demo_lesson_parses() {
        let lesson = parse_lesson(include_str!("../../../demos/spanish-home.json")).unwrap();
        assert_eq!(lesson.len(), 4);
        assert!(lesson.item(2).unwrap().hint().image.as_ref().unwrap().as_url().is_some());
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lesson.json");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(load_lesson(&path).unwrap().title(), "Animals");
        assert!(matches!(
            load_lesson(&dir.path().join("missing.json")),
            Err(LessonFileError::Io(_))
        ));
    }
}
