//! Characters and their approved style exemplars.

use serde::{Deserialize, Serialize};

use crate::error::CharacterError;

/// Upper bound on style exemplars per character.
pub const MAX_STYLE_EXEMPLARS: usize = 5;

/// An approved question/answer pair showing how the character talks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleExemplar {
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributor: Option<String>,
}

impl StyleExemplar {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            contributor: None,
        }
    }
}

/// A chatbot persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub style_exemplars: Vec<StyleExemplar>,
}

impl Character {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            style_exemplars: Vec::new(),
        }
    }

    /// Knowledge-base namespace for this character.
    pub fn namespace(&self) -> String {
        self.id.to_string()
    }

    pub fn validate(&self) -> Result<(), CharacterError> {
        if self.style_exemplars.len() > MAX_STYLE_EXEMPLARS {
            return Err(CharacterError::TooManyExemplars {
                character: self.name.clone(),
                count: self.style_exemplars.len(),
                max: MAX_STYLE_EXEMPLARS,
            });
        }
        Ok(())
    }

    /// Add an exemplar, refusing to exceed the cap.
    pub fn add_exemplar(&mut self, exemplar: StyleExemplar) -> Result<(), CharacterError> {
        if self.style_exemplars.len() >= MAX_STYLE_EXEMPLARS {
            return Err(CharacterError::TooManyExemplars {
                character: self.name.clone(),
                count: self.style_exemplars.len() + 1,
                max: MAX_STYLE_EXEMPLARS,
            });
        }
        self.style_exemplars.push(exemplar);
        Ok(())
    }
}
