//! Turning raw model replies into stories, question batches and reviews.
//!
//! Models are asked for clean JSON but regularly:
//!   - wrap it in ```json fences,
//!   - emit one `{hanzi, pinyin}` object per paragraph instead of one merged object,
//!   - leave out a field,
//!   - or answer in plain prose.
//!
//! Every function here is total: a reply either normalizes or yields a
//! `NormalizeError`, which the fallback loop treats as "try the next model".

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{paragraphs, Question, Story, PARAGRAPH_SEPARATOR};
use crate::pinyin::{paragraph_pinyin, to_pinyin_diacritics};

/// Pinyin placeholder used when the reply held no JSON at all.
pub const PINYIN_FAILED: &str = "Pinyin generation failed. Please try again.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
  #[error("empty reply")]
  Empty,
  #[error("story is too short ({got} chars, need {min})")]
  TooShort { got: usize, min: usize },
  #[error("JSON found but no object carries a non-empty 'hanzi' field")]
  MissingHanzi,
  #[error("{0}")]
  Parse(String),
  #[error("expected {expected} questions, got {got}")]
  WrongCount { expected: usize, got: usize },
  #[error("question {index} has an empty 'question' field")]
  BlankQuestion { index: usize },
}

impl NormalizeError {
  /// Short status label used in surfaced error strings ("<label> - <detail>").
  pub fn label(&self) -> &'static str {
    match self {
      NormalizeError::Parse(_) => "parse_error",
      _ => "invalid_format",
    }
  }
}

/// Remove Markdown code-fence markers (```json, ```JSON, ```) wherever they appear.
/// A newline right after a marker goes with it.
pub fn strip_code_fences(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  let mut rest = raw;
  while let Some(pos) = rest.find("```") {
    out.push_str(&rest[..pos]);
    rest = &rest[pos + 3..];
    if rest.get(..4).is_some_and(|tag| tag.eq_ignore_ascii_case("json")) {
      rest = &rest[4..];
    }
    if let Some(stripped) = rest.strip_prefix("\r\n") {
      rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('\n') {
      rest = stripped;
    }
  }
  out.push_str(rest);
  out.trim().to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScanState {
  /// Between objects; anything but `{` is ignored.
  Outside,
  /// Inside an object, outside any string literal.
  InObject,
  /// Inside a string literal of an object.
  InString,
  /// Right after a backslash inside a string literal.
  Escape,
}

/// Iterator over top-level brace-balanced `{...}` substrings of a text.
///
/// Braces inside JSON string literals do not count. An object still open when
/// the text ends is dropped.
pub struct JsonObjects<'a> {
  text: &'a str,
  pos: usize,
}

impl<'a> JsonObjects<'a> {
  pub fn new(text: &'a str) -> Self {
    Self { text, pos: 0 }
  }
}

impl<'a> Iterator for JsonObjects<'a> {
  type Item = &'a str;

  fn next(&mut self) -> Option<&'a str> {
    let mut state = ScanState::Outside;
    let mut depth = 0usize;
    let mut start = 0usize;

    for (offset, ch) in self.text[self.pos..].char_indices() {
      let idx = self.pos + offset;
      state = match (state, ch) {
        (ScanState::Outside, '{') => {
          start = idx;
          depth = 1;
          ScanState::InObject
        }
        (ScanState::Outside, _) => ScanState::Outside,
        (ScanState::InObject, '"') => ScanState::InString,
        (ScanState::InObject, '{') => {
          depth += 1;
          ScanState::InObject
        }
        (ScanState::InObject, '}') => {
          depth -= 1;
          if depth == 0 {
            let end = idx + ch.len_utf8();
            self.pos = end;
            return Some(&self.text[start..end]);
          }
          ScanState::InObject
        }
        (ScanState::InObject, _) => ScanState::InObject,
        (ScanState::InString, '\\') => ScanState::Escape,
        (ScanState::InString, '"') => ScanState::InObject,
        (ScanState::InString, _) => ScanState::InString,
        (ScanState::Escape, _) => ScanState::InString,
      };
    }

    self.pos = self.text.len();
    None
  }
}

#[derive(Debug, Default, Deserialize)]
struct StoryFragment {
  #[serde(default)]
  hanzi: Option<String>,
  #[serde(default)]
  pinyin: Option<String>,
}

impl StoryFragment {
  fn hanzi(&self) -> Option<&str> {
    self.hanzi.as_deref().map(str::trim).filter(|h| !h.is_empty())
  }
}

/// Normalize a story reply.
///
/// Order of attempts: the whole (unfenced) reply as one object, then every
/// balanced object found in it merged in order. Only a reply with no JSON
/// object at all falls back to the raw text as hanzi with `PINYIN_FAILED` as
/// pinyin. `min_chars` of 0 disables the length check.
pub fn normalize_story(raw: &str, min_chars: usize) -> Result<Story, NormalizeError> {
  let raw = raw.trim();
  if raw.is_empty() {
    return Err(NormalizeError::Empty);
  }
  let cleaned = strip_code_fences(raw);

  let objects: Vec<Value> = match serde_json::from_str::<Value>(&cleaned) {
    Ok(whole @ Value::Object(_)) => vec![whole],
    _ => JsonObjects::new(&cleaned)
      .filter_map(|obj| serde_json::from_str::<Value>(obj).ok())
      .filter(Value::is_object)
      .collect(),
  };

  // Objects of the wrong shape are skipped; none left is MissingHanzi.
  let story = if objects.is_empty() {
    Story { hanzi: raw.to_string(), pinyin: PINYIN_FAILED.to_string() }
  } else {
    let fragments: Vec<StoryFragment> = objects
      .into_iter()
      .filter_map(|obj| serde_json::from_value(obj).ok())
      .collect();
    merge_fragments(&fragments)?
  };

  let got = story.hanzi.chars().filter(|c| !c.is_whitespace()).count();
  if got < min_chars {
    return Err(NormalizeError::TooShort { got, min: min_chars });
  }
  Ok(story)
}

fn merge_fragments(fragments: &[StoryFragment]) -> Result<Story, NormalizeError> {
  let mut hanzi_parts = Vec::new();
  let mut pinyin_parts = Vec::new();

  for fragment in fragments {
    let Some(hanzi) = fragment.hanzi() else { continue };
    let pinyin = match fragment.pinyin.as_deref().map(str::trim) {
      Some(p) if !p.is_empty() => p.to_string(),
      _ => to_pinyin_diacritics(hanzi),
    };
    hanzi_parts.push(hanzi.to_string());
    pinyin_parts.push(pinyin);
  }

  if hanzi_parts.is_empty() {
    return Err(NormalizeError::MissingHanzi);
  }

  let hanzi = hanzi_parts.join(PARAGRAPH_SEPARATOR);
  let mut pinyin = pinyin_parts.join(PARAGRAPH_SEPARATOR);
  if paragraphs(&pinyin).len() != paragraphs(&hanzi).len() {
    pinyin = paragraph_pinyin(&hanzi);
  }
  Ok(Story { hanzi, pinyin })
}

/// Normalize a question batch: a JSON array of exactly `expected` `{id, question}` items.
pub fn normalize_questions(raw: &str, expected: usize) -> Result<Vec<Question>, NormalizeError> {
  let cleaned = strip_code_fences(raw);
  if cleaned.is_empty() {
    return Err(NormalizeError::Empty);
  }
  let questions: Vec<Question> =
    serde_json::from_str(&cleaned).map_err(|e| NormalizeError::Parse(e.to_string()))?;

  if questions.len() != expected {
    return Err(NormalizeError::WrongCount { expected, got: questions.len() });
  }
  if let Some(index) = questions.iter().position(|q| q.question.trim().is_empty()) {
    return Err(NormalizeError::BlankQuestion { index });
  }
  Ok(questions)
}

/// Reviews and analyses are Markdown passed through as-is, only trimmed.
pub fn normalize_text(raw: &str) -> Result<String, NormalizeError> {
  let text = raw.trim();
  if text.is_empty() {
    return Err(NormalizeError::Empty);
  }
  Ok(text.to_string())
}
