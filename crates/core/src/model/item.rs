use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::model::ids::{ItemId, LessonId};
use crate::model::media::MediaUri;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ItemError {
    #[error("item prompt cannot be empty")]
    EmptyPrompt,

    #[error("item {0} needs at least one accepted answer")]
    NoAcceptedAnswers(ItemId),

    #[error("lesson has no items")]
    EmptyLesson,

    #[error("duplicate item id {0} in lesson")]
    DuplicateItem(ItemId),
}

//
// ─── AUDIO ─────────────────────────────────────────────────────────────────────
//

/// Logical audio channels attached to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioChannel {
    /// Spoken meaning in the learner's language.
    Meaning,
    /// Spoken target-language word.
    Target,
    /// Spoken memory trigger accompanying the hint.
    Trigger,
}

impl AudioChannel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meaning => "meaning",
            Self::Target => "target",
            Self::Trigger => "trigger",
        }
    }
}

impl fmt::Display for AudioChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemAudio {
    pub meaning: Option<MediaUri>,
    pub target: Option<MediaUri>,
    pub trigger: Option<MediaUri>,
}

impl ItemAudio {
    #[must_use]
    pub fn channel(&self, channel: AudioChannel) -> Option<&MediaUri> {
        match channel {
            AudioChannel::Meaning => self.meaning.as_ref(),
            AudioChannel::Target => self.target.as_ref(),
            AudioChannel::Trigger => self.trigger.as_ref(),
        }
    }
}

/// Memory trigger shown as a progressive hint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hint {
    pub text: Option<String>,
    pub image: Option<MediaUri>,
}

impl Hint {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.image.is_none()
    }
}

//
// ─── ITEM ──────────────────────────────────────────────────────────────────────
//

/// A single vocabulary item. Read-only for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    id: ItemId,
    prompt: String,
    accepted_answers: Vec<String>,
    audio: ItemAudio,
    hint: Hint,
}

impl Item {
    /// Creates an item without audio or hint.
    ///
    /// Blank accepted answers are dropped.
    ///
    /// # Errors
    ///
    /// Returns `ItemError::EmptyPrompt` for a blank prompt and
    /// `ItemError::NoAcceptedAnswers` when no usable answer remains.
    pub fn new(
        id: ItemId,
        prompt: impl Into<String>,
        accepted_answers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, ItemError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(ItemError::EmptyPrompt);
        }

        let accepted_answers: Vec<String> = accepted_answers
            .into_iter()
            .map(Into::into)
            .filter(|a: &String| !a.trim().is_empty())
            .collect();
        if accepted_answers.is_empty() {
            return Err(ItemError::NoAcceptedAnswers(id));
        }

        Ok(Self {
            id,
            prompt,
            accepted_answers,
            audio: ItemAudio::default(),
            hint: Hint::default(),
        })
    }

    #[must_use]
    pub fn with_audio(mut self, channel: AudioChannel, uri: MediaUri) -> Self {
        match channel {
            AudioChannel::Meaning => self.audio.meaning = Some(uri),
            AudioChannel::Target => self.audio.target = Some(uri),
            AudioChannel::Trigger => self.audio.trigger = Some(uri),
        }
        self
    }

    #[must_use]
    pub fn with_hint(mut self, hint: Hint) -> Self {
        self.hint = hint;
        self
    }

    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn accepted_answers(&self) -> &[String] {
        &self.accepted_answers
    }

    #[must_use]
    pub fn audio(&self) -> &ItemAudio {
        &self.audio
    }

    #[must_use]
    pub fn hint(&self) -> &Hint {
        &self.hint
    }
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

/// Ordered list of items that a session walks through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    id: LessonId,
    title: String,
    items: Vec<Item>,
}

impl Lesson {
    /// # Errors
    ///
    /// Returns `ItemError::EmptyLesson` if `items` is empty, or
    /// `ItemError::DuplicateItem` if two items share an id.
    pub fn new(id: LessonId, title: impl Into<String>, items: Vec<Item>) -> Result<Self, ItemError> {
        if items.is_empty() {
            return Err(ItemError::EmptyLesson);
        }
        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(item.id()) {
                return Err(ItemError::DuplicateItem(item.id()));
            }
        }
        Ok(Self {
            id,
            title: title.into(),
            items,
        })
    }

    #[must_use]
    pub fn id(&self) -> LessonId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    #[must_use]
    pub fn item(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn item_ids(&self) -> Vec<ItemId> {
        self.items.iter().map(Item::id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_requires_prompt_and_answer() {
        assert_eq!(
            Item::new(ItemId::new(1), "  ", ["casa"]).unwrap_err(),
            ItemError::EmptyPrompt
        );
        assert_eq!(
            Item::new(ItemId::new(1), "house", ["", "  "]).unwrap_err(),
            ItemError::NoAcceptedAnswers(ItemId::new(1))
        );
    }

    #[test]
    fn item_exposes_audio_channels() {
        let uri = MediaUri::parse("audio/casa-target.mp3").unwrap();
        let item = Item::new(ItemId::new(1), "house", ["casa"])
            .unwrap()
            .with_audio(AudioChannel::Target, uri.clone());

        assert_eq!(item.audio().channel(AudioChannel::Target), Some(&uri));
        assert!(item.audio().channel(AudioChannel::Meaning).is_none());
        assert!(item.hint().is_empty());
    }

    #[test]
    fn lesson_rejects_empty_and_duplicates() {
        assert_eq!(
            Lesson::new(LessonId::new(1), "Empty", Vec::new()).unwrap_err(),
            ItemError::EmptyLesson
        );

        let a = Item::new(ItemId::new(1), "house", ["casa"]).unwrap();
        let b = Item::new(ItemId::new(1), "dog", ["perro"]).unwrap();
        assert_eq!(
            Lesson::new(LessonId::new(1), "Dupes", vec![a, b]).unwrap_err(),
            ItemError::DuplicateItem(ItemId::new(1))
        );
    }
}
