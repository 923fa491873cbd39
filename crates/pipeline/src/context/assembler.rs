//! Persona prompt assembly.
//!
//! Renders the single prompt a turn sends to the model. The layout is
//! fixed per locale:
//!
//! 1. **Identity**: who the character is and that tone comes first
//! 2. **Knowledge**: merged retrieval context
//! 3. **Style**: approved question/answer exemplars
//! 4. **History**: the session's memory view
//! 5. **Rules**: reply length, staying in character
//! 6. **Input**: the user's message and the answer cue
//!
//! # Determinism
//!
//! Identical parts always render the identical prompt. The estimator
//! relies on this: an estimate and the call it gates count the same text.

use personachat_core::locale::Locale;

use super::style::ExchangeLabels;

// ── Types ─────────────────────────────────────────────────────────────────

/// Everything a prompt is rendered from.
#[derive(Debug, Clone, Copy)]
pub struct PromptParts<'a> {
    pub character_name: &'a str,
    /// Optional one-paragraph persona description.
    pub description: &'a str,
    /// Rendered retrieval context.
    pub context: &'a str,
    /// Rendered style exemplars.
    pub style_examples: &'a str,
    /// Rendered memory view.
    pub chat_history: &'a str,
    pub input: &'a str,
}

/// Renders prompts for one locale.
///
/// The labels are the ones history and exemplars are rendered with, so
/// the input line reads the same as every earlier user line.
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    locale: Locale,
    labels: ExchangeLabels,
}

// ── Assembly ──────────────────────────────────────────────────────────────

impl PromptAssembler {
    pub fn new(locale: Locale) -> Self {
        Self {
            locale,
            labels: ExchangeLabels::for_locale(locale),
        }
    }

    pub fn with_labels(mut self, labels: ExchangeLabels) -> Self {
        self.labels = labels;
        self
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn labels(&self) -> &ExchangeLabels {
        &self.labels
    }

    pub fn render(&self, parts: &PromptParts<'_>) -> String {
        let user = self.labels.user.as_str();
        match self.locale {
            Locale::En => render_en(parts, user),
            Locale::Ko => render_ko(parts, user),
        }
    }
}

fn description_line(description: &str) -> String {
    let d = description.trim();
    if d.is_empty() {
        String::new()
    } else {
        format!("{d}\n")
    }
}

fn render_en(p: &PromptParts<'_>, user: &str) -> String {
    let name = p.character_name;
    format!(
        "I am {name}.\n\
         {description}\
         My replies must reflect {name}'s personality and way of speaking above all else.\n\
         Even when I explain facts, I say them in {name}'s own tone and mood.\n\
         \n\
         [What I know about {name}]\n\
         {context}\n\
         \n\
         [How I talk]\n\
         {style}\n\
         \n\
         [Earlier conversation]\n\
         {history}\n\
         \n\
         [Rules]\n\
         - Personality and tone come first, facts included.\n\
         - Answer in one to three sentences.\n\
         - Do not over-explain or pad the answer with politeness.\n\
         - Match the length and manner of the style examples.\n\
         - Stay in character when refusing.\n\
         - Do not recite safety guidelines; deflect the way the character would.\n\
         - Do not answer about things the character could not know.\n\
         - Never say that I am an AI.\n\
         \n\
         {user}: {input}\n\
         \n\
         {name}'s answer:",
        description = description_line(p.description),
        context = p.context,
        style = p.style_examples,
        history = p.chat_history,
        input = p.input,
    )
}

fn render_ko(p: &PromptParts<'_>, user: &str) -> String {
    let name = p.character_name;
    format!(
        "나는 {name}야.\n\
         {description}\
         내 대답은 반드시 {name}의 **성격과 말투**를 최우선으로 반영해야 해.\n\
         정보를 설명하더라도 언제나 {name}다운 어조와 감정으로 표현할 거야.\n\
         \n\
         [내가 아는 {name} 관련 정보]\n\
         {context}\n\
         \n\
         [말투 / 성격 예시]\n\
         {style}\n\
         \n\
         [이전 대화 기록]\n\
         {history}\n\
         \n\
         [대화 규칙]\n\
         - 말투와 성격을 최우선시해. (사실이나 맥락 설명도 반드시 캐릭터다운 어조로)\n\
         - **대답은 1~3문장 이내로 간결하게.**\n\
         - 불필요하게 친절하거나 설명을 늘어놓지 않는다.\n\
         - 답변의 길이·화법·친절함 정도는 반드시 말투 예시를 따른다.\n\
         - 단, 거절할 때도 반드시 캐릭터 말투와 성격을 유지한다.\n\
         - 안전 지침을 직접적으로 말하지 말고, 캐릭터다운 냉소/회피/단호함으로 답한다.\n\
         - 캐릭터가 모르는 지식에 대해서는 답변할 수 없어.\n\
         - 감정, 반응, 말버릇, 뉘앙스를 캐릭터답게 드러내.\n\
         - 캐릭터임을 의식하지 말고 실제 사람처럼 자연스럽게 반응해.\n\
         - 절대 '저는 AI입니다' 같은 말 하지 마.\n\
         \n\
         {user}: {input}\n\
         \n\
         {name}의 대답:",
        description = description_line(p.description),
        context = p.context,
        style = p.style_examples,
        history = p.chat_history,
        input = p.input,
    )
}
