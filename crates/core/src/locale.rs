//! Prompt language selection.

use serde::{Deserialize, Serialize};

use crate::message::Role;

/// Language of the persona prompt, role labels, and summary prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ko,
}

impl Locale {
    /// Default history label for a role.
    pub fn role_label(&self, role: &Role) -> &'static str {
        match (self, role) {
            (Locale::En, Role::User) => "user",
            (Locale::En, Role::Assistant) => "assistant",
            (Locale::Ko, Role::User) => "사용자",
            (Locale::Ko, Role::Assistant) => "나",
            (_, other) => other.as_str(),
        }
    }

    /// Prefix of the synthetic summary message.
    pub fn summary_prefix(&self) -> &'static str {
        match self {
            Locale::En => "Summary of earlier conversation: ",
            Locale::Ko => "이전 대화 요약: ",
        }
    }
}
