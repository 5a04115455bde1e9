//! Request orchestration: validate, build the prompt, run the model fallback
//! loop with the matching normalizer.

use tracing::{info, instrument};

use crate::domain::{ConversationMessage, HskLevel, QuestionKind, ReviewKind, Role, Story};
use crate::error::{require, ApiError};
use crate::normalize::{normalize_questions, normalize_story, normalize_text};
use crate::prompts::{analysis_messages, questions_prompt, review_prompt, story_prompt};
use crate::protocol::{AnalyzeIn, ComprehensionIn, ComprehensionOut, StoryIn};
use crate::state::AppState;

fn single_user_turn(content: String) -> Vec<ConversationMessage> {
  vec![ConversationMessage { role: Role::User, content }]
}

#[instrument(level = "info", skip(state, body), fields(level = %body.hsk_level, has_topic = body.topic.as_deref().is_some_and(|t| !t.trim().is_empty())))]
pub async fn generate_story(state: &AppState, body: &StoryIn) -> Result<Story, ApiError> {
  let level: HskLevel = body.hsk_level.parse().map_err(ApiError::BadRequest)?;
  let gateway = state.gateway()?;

  let messages = single_user_turn(story_prompt(&state.prompts, level, body.topic.as_deref()));
  let min_chars = state.story.min_chars;
  let story = gateway
    .complete_with_fallback("Story", &state.models.story, &messages, |raw| normalize_story(raw, min_chars))
    .await
    .map_err(ApiError::upstream("generate story"))?;

  info!(target: "story_backend", %level, hanzi_chars = story.hanzi.chars().count(), "Story generated");
  Ok(story)
}

#[instrument(level = "info", skip(state, body), fields(level = %body.hsk_level, history = body.conversation_history.len()))]
pub async fn analyze_sentence(state: &AppState, body: &AnalyzeIn) -> Result<String, ApiError> {
  let sentence = require("sentence", &body.sentence)?;
  let story = require("originalStory", &body.original_story)?;
  let level = require("hskLevel", &body.hsk_level)?;
  let gateway = state.gateway()?;

  let messages = analysis_messages(&state.prompts, level, story, sentence, &body.conversation_history);
  let analysis = gateway
    .complete_with_fallback("Analysis", &state.models.analysis, &messages, normalize_text)
    .await
    .map_err(ApiError::upstream("analyze sentence"))?;

  info!(target: "story_backend", analysis_len = analysis.len(), "Analysis generated");
  Ok(analysis)
}

#[instrument(level = "info", skip(state, body))]
pub async fn comprehension(state: &AppState, body: &ComprehensionIn) -> Result<ComprehensionOut, ApiError> {
  match body {
    ComprehensionIn::Generate { story, hsk_level } => {
      generate_questions(state, QuestionKind::Comprehension, story, hsk_level).await
    }
    ComprehensionIn::GenerateOpenEnded { story, hsk_level } => {
      generate_questions(state, QuestionKind::OpenEnded, story, hsk_level).await
    }
    ComprehensionIn::Review { story, question, answer, hsk_level } => {
      review_answer(state, ReviewKind::Factual, story, question, answer, hsk_level).await
    }
    ComprehensionIn::ReviewOpenEnded { story, question, answer, hsk_level } => {
      review_answer(state, ReviewKind::OpenEnded, story, question, answer, hsk_level).await
    }
  }
}

async fn generate_questions(
  state: &AppState,
  kind: QuestionKind,
  story: &str,
  level: &str,
) -> Result<ComprehensionOut, ApiError> {
  let story = require("story", story)?;
  let level = require("hskLevel", level)?;
  let gateway = state.gateway()?;

  let title = match kind {
    QuestionKind::Comprehension => "Comprehension",
    QuestionKind::OpenEnded => "Open-Ended",
  };
  let expected = kind.expected_count();
  let messages = single_user_turn(questions_prompt(&state.prompts, kind, level, story));
  let questions = gateway
    .complete_with_fallback(title, &state.models.questions, &messages, |raw| normalize_questions(raw, expected))
    .await
    .map_err(ApiError::upstream("process request"))?;

  info!(target: "story_backend", ?kind, count = questions.len(), "Questions generated");
  Ok(ComprehensionOut::Questions { questions })
}

async fn review_answer(
  state: &AppState,
  kind: ReviewKind,
  story: &str,
  question: &str,
  answer: &str,
  level: &str,
) -> Result<ComprehensionOut, ApiError> {
  let story = require("story", story)?;
  let question = require("question", question)?;
  let answer = require("answer", answer)?;
  let level = require("hskLevel", level)?;
  let gateway = state.gateway()?;

  let title = match kind {
    ReviewKind::Factual => "Review",
    ReviewKind::OpenEnded => "Open-Ended Review",
  };
  let messages = single_user_turn(review_prompt(&state.prompts, kind, level, story, question, answer));
  let review = gateway
    .complete_with_fallback(title, &state.models.review, &messages, normalize_text)
    .await
    .map_err(ApiError::upstream("process request"))?;

  info!(target: "story_backend", ?kind, review_len = review.len(), "Review generated");
  Ok(ComprehensionOut::Review { review })
}
