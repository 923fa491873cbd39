//! Style exemplar formatting.

use personachat_core::character::StyleExemplar;
use personachat_core::locale::Locale;
use personachat_core::message::Role;

/// Labels for the two sides of a rendered exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeLabels {
    pub user: String,
    pub assistant: String,
}

impl ExchangeLabels {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }

    /// The locale's default user/assistant labels.
    pub fn for_locale(locale: Locale) -> Self {
        Self::new(locale.role_label(&Role::User), locale.role_label(&Role::Assistant))
    }

    /// Label for a message role; roles other than user/assistant use their own name.
    pub fn label_for<'a>(&'a self, role: &Role) -> &'a str {
        match role {
            Role::User => &self.user,
            Role::Assistant => &self.assistant,
            other => other.as_str(),
        }
    }
}

impl Default for ExchangeLabels {
    fn default() -> Self {
        Self::for_locale(Locale::En)
    }
}

/// Render exemplars as two-line exchanges separated by a blank line.
///
/// The question is flattened to one line; the answer keeps its own line
/// breaks. Empty input renders as an empty string.
pub fn format_style_exemplars(exemplars: &[StyleExemplar], labels: &ExchangeLabels) -> String {
    exemplars
        .iter()
        .map(|ex| {
            let question = ex.question.trim().replace('\n', " ");
            let answer = ex.answer.trim();
            format!("{}: {question}\n{}: {answer}", labels.user, labels.assistant)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
