//! Hanzi → Hanyu Pinyin (tone diacritics, space-separated), copy non-Chinese as-is.
//!
//! Used to repair stories whose pinyin is missing or does not line up with the hanzi.
//!
//! Example:
//!   输入: "中国人计划 2025！"
//!   输出: "zhōng guó rén jì huà 2025！"
use pinyin::ToPinyin;

use crate::domain::{paragraphs, PARAGRAPH_SEPARATOR};

/// Convert Chinese text into Hanyu Pinyin with tone diacritics, space-separated.
/// Non-Chinese characters are copied as-is.
///
/// Per-character conversion (no word segmentation), so some polyphonic
/// characters use their default reading.
pub fn to_pinyin_diacritics(text: &str) -> String {
  let mut out = String::with_capacity(text.len() * 2);
  let mut last_was_hanzi = false;

  for ch in text.chars() {
    if let Some(py) = ch.to_pinyin() {
      if last_was_hanzi {
        out.push(' ');
      }
      out.push_str(py.with_tone());
      last_was_hanzi = true;
    } else {
      out.push(ch);
      last_was_hanzi = false;
    }
  }

  out
}

/// Pinyin for a multi-paragraph story, one output paragraph per hanzi paragraph.
pub fn paragraph_pinyin(hanzi: &str) -> String {
  paragraphs(hanzi)
    .into_iter()
    .map(to_pinyin_diacritics)
    .collect::<Vec<_>>()
    .join(PARAGRAPH_SEPARATOR)
}
