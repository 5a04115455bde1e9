//! Domain models: HSK levels, stories, conversation turns and questions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Blank line between paragraphs, in both scripts.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// One of the six standardized proficiency tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HskLevel {
  Hsk1,
  Hsk2,
  Hsk3,
  Hsk4,
  Hsk5,
  Hsk6,
}

impl HskLevel {
  pub fn number(self) -> u8 {
    match self {
      HskLevel::Hsk1 => 1,
      HskLevel::Hsk2 => 2,
      HskLevel::Hsk3 => 3,
      HskLevel::Hsk4 => 4,
      HskLevel::Hsk5 => 5,
      HskLevel::Hsk6 => 6,
    }
  }
}

impl fmt::Display for HskLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "HSK {}", self.number())
  }
}

impl FromStr for HskLevel {
  type Err = String;

  /// Accepts "HSK 3", "hsk3", "HSK3" and a bare "3".
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let trimmed = s.trim();
    let lower = trimmed.to_ascii_lowercase();
    let digits = lower.strip_prefix("hsk").unwrap_or(&lower).trim();
    match digits {
      "1" => Ok(HskLevel::Hsk1),
      "2" => Ok(HskLevel::Hsk2),
      "3" => Ok(HskLevel::Hsk3),
      "4" => Ok(HskLevel::Hsk4),
      "5" => Ok(HskLevel::Hsk5),
      "6" => Ok(HskLevel::Hsk6),
      _ => Err(format!("Unsupported HSK level: '{}' (expected HSK 1 to HSK 6)", trimmed)),
    }
  }
}

/// A generated story in both scripts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Story {
  pub hanzi: String,
  pub pinyin: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Assistant,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Role::User => "user",
      Role::Assistant => "assistant",
    }
  }
}

/// One turn of the client-held analysis conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
  pub role: Role,
  pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
  pub id: u32,
  pub question: String,
}

/// Which batch of questions is being generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuestionKind {
  /// Answers can be found directly in the story.
  Comprehension,
  /// Discussion prompts with many valid answers.
  OpenEnded,
}

impl QuestionKind {
  pub fn expected_count(self) -> usize {
    match self {
      QuestionKind::Comprehension => 5,
      QuestionKind::OpenEnded => 3,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewKind {
  Factual,
  OpenEnded,
}

/// Non-empty paragraphs of a text split on blank lines.
pub fn paragraphs(text: &str) -> Vec<&str> {
  text
    .split(PARAGRAPH_SEPARATOR)
    .map(str::trim)
    .filter(|p| !p.is_empty())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hsk_level_accepts_common_spellings() {
    assert_eq!("HSK 1".parse::<HskLevel>().unwrap(), HskLevel::Hsk1);
    assert_eq!("hsk4".parse::<HskLevel>().unwrap(), HskLevel::Hsk4);
    assert_eq!(" 6 ".parse::<HskLevel>().unwrap(), HskLevel::Hsk6);
    assert_eq!(HskLevel::Hsk3.to_string(), "HSK 3");
  }

  #[test]
  fn hsk_level_rejects_out_of_range() {
    assert!("HSK 7".parse::<HskLevel>().is_err());
    assert!("HSK 1-6".parse::<HskLevel>().is_err());
    assert!("".parse::<HskLevel>().is_err());
  }

  #[test]
  fn paragraphs_skip_blank_runs() {
    let text = "第一段。\n\n\n\n第二段。\n\n";
    assert_eq!(paragraphs(text), vec!["第一段。", "第二段。"]);
  }
}
