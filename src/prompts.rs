//! Prompt rendering. Pure functions of the request data and the configured templates.

use crate::config::Prompts;
use crate::domain::{ConversationMessage, HskLevel, QuestionKind, ReviewKind, Role};
use crate::util::fill_template;

pub fn story_prompt(prompts: &Prompts, level: HskLevel, topic: Option<&str>) -> String {
  let topic_clause = match topic.map(str::trim).filter(|t| !t.is_empty()) {
    Some(topic) => fill_template(&prompts.story_topic_clause, &[("topic", topic)]),
    None => prompts.story_random_topic_clause.clone(),
  };
  let level = level.to_string();
  fill_template(&prompts.story_template, &[("level", &level), ("topic_clause", &topic_clause)])
}

/// Message sequence for sentence analysis: story context first, then the
/// client-held history, then the current turn.
///
/// Without history the turn is a full analysis request for `sentence`;
/// with history `sentence` is a follow-up question sent verbatim.
pub fn analysis_messages(
  prompts: &Prompts,
  level: &str,
  story: &str,
  sentence: &str,
  history: &[ConversationMessage],
) -> Vec<ConversationMessage> {
  // Several free-tier models reject the system role, so context goes in as a user turn.
  let mut messages = Vec::with_capacity(history.len() + 2);
  messages.push(ConversationMessage {
    role: Role::User,
    content: fill_template(&prompts.analysis_context_template, &[("level", level), ("story", story)]),
  });
  messages.extend(history.iter().cloned());

  let content = if history.is_empty() {
    fill_template(&prompts.analysis_first_template, &[("sentence", sentence)])
  } else {
    sentence.to_string()
  };
  messages.push(ConversationMessage { role: Role::User, content });
  messages
}

pub fn questions_prompt(prompts: &Prompts, kind: QuestionKind, level: &str, story: &str) -> String {
  let template = match kind {
    QuestionKind::Comprehension => &prompts.comprehension_template,
    QuestionKind::OpenEnded => &prompts.open_ended_template,
  };
  fill_template(template, &[("level", level), ("story", story)])
}

pub fn review_prompt(
  prompts: &Prompts,
  kind: ReviewKind,
  level: &str,
  story: &str,
  question: &str,
  answer: &str,
) -> String {
  let template = match kind {
    ReviewKind::Factual => &prompts.review_template,
    ReviewKind::OpenEnded => &prompts.open_ended_review_template,
  };
  fill_template(
    template,
    &[("level", level), ("story", story), ("question", question), ("answer", answer)],
  )
}
