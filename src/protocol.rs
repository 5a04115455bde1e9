//! Public request/response bodies for the HTTP endpoints (serde ready).
//! Field names follow the browser client (camelCase).

use serde::{Deserialize, Serialize};

use crate::domain::{ConversationMessage, Question, Story};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryIn {
    pub hsk_level: String,
    #[serde(default)]
    pub topic: Option<String>,
}

/// Story response. On failure both texts are empty and `error` is set.
#[derive(Debug, Serialize)]
pub struct StoryOut {
    pub hanzi: String,
    pub pinyin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoryOut {
    pub fn failed(error: String) -> Self {
        Self { hanzi: String::new(), pinyin: String::new(), error: Some(error) }
    }
}

impl From<Story> for StoryOut {
    fn from(s: Story) -> Self {
        Self { hanzi: s.hanzi, pinyin: s.pinyin, error: None }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeIn {
    pub sentence: String,
    pub original_story: String,
    pub hsk_level: String,
    #[serde(default)]
    pub conversation_history: Vec<ConversationMessage>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisOut {
    pub analysis: String,
}

/// Comprehension endpoint body, tagged by `action`.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ComprehensionIn {
    Generate {
        story: String,
        #[serde(rename = "hskLevel")]
        hsk_level: String,
    },
    GenerateOpenEnded {
        story: String,
        #[serde(rename = "hskLevel")]
        hsk_level: String,
    },
    Review {
        story: String,
        question: String,
        answer: String,
        #[serde(rename = "hskLevel")]
        hsk_level: String,
    },
    ReviewOpenEnded {
        story: String,
        question: String,
        answer: String,
        #[serde(rename = "hskLevel")]
        hsk_level: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ComprehensionOut {
    Questions { questions: Vec<Question> },
    Review { review: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    #[test]
    fn story_out_omits_error_on_success() {
        let out = StoryOut::from(Story { hanzi: "你好".into(), pinyin: "nǐ hǎo".into() });
        assert_eq!(serde_json::to_string(&out).unwrap(), r#"{"hanzi":"你好","pinyin":"nǐ hǎo"}"#);
    }

    #[test]
    fn analyze_in_defaults_history() {
        let body: AnalyzeIn = serde_json::from_str(
            r#"{"sentence":"我很好。","originalStory":"故事","hskLevel":"HSK 1-6"}"#,
        )
        .unwrap();
        assert!(body.conversation_history.is_empty());

        let body: AnalyzeIn = serde_json::from_str(
            r#"{"sentence":"why?","originalStory":"故事","hskLevel":"HSK 2",
                "conversationHistory":[{"role":"assistant","content":"hi"}]}"#,
        )
        .unwrap();
        assert_eq!(body.conversation_history[0].role, Role::Assistant);
    }

    #[test]
    fn comprehension_in_dispatches_on_action() {
        let body: ComprehensionIn = serde_json::from_str(
            r#"{"action":"review-open-ended","story":"s","question":"q","answer":"a","hskLevel":"HSK 3"}"#,
        )
        .unwrap();
        assert!(matches!(body, ComprehensionIn::ReviewOpenEnded { ref answer, .. } if answer == "a"));

        let bad = serde_json::from_str::<ComprehensionIn>(r#"{"action":"grade","story":"s","hskLevel":"x"}"#);
        assert!(bad.is_err());
    }
}
