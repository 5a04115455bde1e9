//! Loading agent configuration (prompts, model rosters, gateway settings) from TOML.
//!
//! Every table and field is optional; anything left out keeps its default.
//!
//! ```toml
//! [models]
//! story = ["google/gemini-2.5-flash", "qwen/qwen3-235b-a22b:free"]
//!
//! [gateway]
//! base_url = "https://openrouter.ai/api/v1"
//! timeout_secs = 45
//!
//! [story]
//! min_chars = 100
//! ```

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct AgentConfig {
  pub prompts: Prompts,
  pub models: ModelRoster,
  pub gateway: GatewaySettings,
  pub story: StorySettings,
}

/// Ordered model candidates per operation kind. Tried first to last.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ModelRoster {
  pub story: Vec<String>,
  pub analysis: Vec<String>,
  pub questions: Vec<String>,
  pub review: Vec<String>,
}

fn free_tier_models() -> Vec<String> {
  vec![
    "google/gemini-2.0-flash-exp:free".into(),
    "qwen/qwen3-235b-a22b:free".into(),
    "deepseek/deepseek-chat-v3-0324:free".into(),
    "mistralai/mistral-small-3.2-24b-instruct:free".into(),
  ]
}

impl Default for ModelRoster {
  fn default() -> Self {
    let mut story = vec!["google/gemini-2.5-flash".to_string()];
    story.extend(free_tier_models().into_iter().take(3));
    Self {
      story,
      analysis: free_tier_models(),
      questions: free_tier_models(),
      review: free_tier_models(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
  /// OpenAI-compatible API root; `/chat/completions` is appended.
  pub base_url: String,
  /// Per-candidate timeout. 0 disables it.
  pub timeout_secs: u64,
  /// Prefix of the `X-Title` header, e.g. "Chinese Practice App - Review".
  pub app_name: String,
  /// Sent as `HTTP-Referer` when set.
  pub referer: Option<String>,
}

impl Default for GatewaySettings {
  fn default() -> Self {
    Self {
      base_url: "https://openrouter.ai/api/v1".into(),
      timeout_secs: 60,
      app_name: "Chinese Practice App".into(),
      referer: None,
    }
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct StorySettings {
  /// Minimum hanzi length (chars, whitespace excluded). 0 disables the check.
  pub min_chars: usize,
}

/// Prompt templates. Placeholders in `{braces}` are filled per request.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Story generation: {level}, {topic_clause}
  pub story_template: String,
  pub story_topic_clause: String,
  pub story_random_topic_clause: String,
  // Sentence analysis: {level}, {story} / {sentence}
  pub analysis_context_template: String,
  pub analysis_first_template: String,
  // Question generation: {level}, {story}
  pub comprehension_template: String,
  pub open_ended_template: String,
  // Answer review: {level}, {story}, {question}, {answer}
  pub review_template: String,
  pub open_ended_review_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      story_template: r#"You are a Chinese language teacher. Generate a short story in Chinese suitable for {level} students {topic_clause}.

Requirements:
1. Use vocabulary and grammar appropriate for {level}
2. The story must be at least 4 paragraphs, with each paragraph having 4-5 sentences.
3. Separate paragraphs with a blank line, in both fields.
4. Make it engaging and educational
5. Return your response as ONE JSON object with two fields:
   - "hanzi": The story written in Chinese characters (汉字)
   - "pinyin": The same story written in pinyin with tone marks

Example format:
{
  "hanzi": "今天天气很好。小明去公园玩。",
  "pinyin": "Jīntiān tiānqì hěn hǎo. Xiǎo míng qù gōngyuán wán."
}

Only return the JSON, no additional text."#.into(),
      story_topic_clause: "about \"{topic}\"".into(),
      story_random_topic_clause: "about any random topic you can think of".into(),

      analysis_context_template: r#"You are an expert Chinese language teacher specializing in grammar analysis for {level} students.

Context: The student is reading this story:
{story}

Your task is to help the student understand Chinese sentences by:
1. Providing clear English translations
2. Breaking down grammar structures with detailed explanations
3. Highlighting word types (verb, noun, adjective, adverb, etc.) using markdown **bold** or *italic*
4. Explaining grammar points used in the sentence
5. Answering follow-up questions about grammar, word choice, and usage

Format your response in markdown for clear readability. Use:
- **Bold** for important terms and word types
- *Italic* for pinyin or emphasis
- Bullet points for breakdowns
- Code blocks for sentence structure patterns

Be conversational and encouraging. If the student asks follow-up questions, refer back to the original sentence and story context."#.into(),
      analysis_first_template: r#"Please analyze this sentence from the story: "{sentence}"

Provide:
1. English translation
2. Grammar breakdown with word types (mark verbs, nouns, adjectives, etc.)
3. Grammar points used
4. Any cultural or contextual notes if relevant"#.into(),

      comprehension_template: r#"You are an expert Chinese language teacher creating comprehension questions for {level} students.

Story:
{story}

Generate exactly 5 comprehension questions about this story. The questions should:
1. Be written in Chinese (Simplified)
2. Have answers that can be found directly in the story passage
3. Test understanding of the main ideas and details
4. Be appropriate for {level} level
5. Progress from easier to slightly more challenging

Return ONLY a valid JSON array with this exact format:
[
  {"id": 1, "question": "第一个问题?"},
  {"id": 2, "question": "第二个问题?"},
  {"id": 3, "question": "第三个问题?"},
  {"id": 4, "question": "第四个问题?"},
  {"id": 5, "question": "第五个问题?"}
]

Do not include any other text, explanations, or markdown code blocks. Only return the raw JSON array."#.into(),
      open_ended_template: r#"You are an expert Chinese language teacher creating open-ended discussion questions for {level} students.

Story:
{story}

Generate exactly 3 open-ended discussion questions about this story. The questions should:
1. Be written in Chinese (Simplified)
2. Encourage creative thinking and personal expression
3. Allow for multiple valid answers and perspectives
4. Be related to the story's themes, characters, or situations
5. Be appropriate for {level} level

Examples of open-ended questions:
- "如果你是故事中的人物，你会怎么做？" (What would you do if you were the character?)
- "你觉得这个故事想告诉我们什么？" (What do you think this story is trying to tell us?)
- "你有过类似的经历吗？" (Have you had a similar experience?)

Return ONLY a valid JSON array with this exact format:
[
  {"id": 1, "question": "第一个问题?"},
  {"id": 2, "question": "第二个问题?"},
  {"id": 3, "question": "第三个问题?"}
]

Do not include any other text, explanations, or markdown code blocks. Only return the raw JSON array."#.into(),

      review_template: r#"You are an expert Chinese language teacher reviewing a student's answer for {level} level.

Story Passage:
{story}

Question (in Chinese):
{question}

Student's Answer (in Chinese):
{answer}

Review the student's answer and provide feedback in English. Your review should include:

1. **Correctness**: Is the answer factually correct based on the story? Does it answer the question?
2. **Grammar**: Check for any grammar mistakes in the Chinese sentence
3. **Improvements**: Suggest how the answer could be improved (word choice, sentence structure, more natural phrasing)
4. **Encouragement**: Provide positive, encouraging feedback

Format your response in markdown for clear readability. Use:
- **Bold** for section headers and key points
- *Italic* for Chinese text and pinyin
- Bullet points for lists
- A friendly, encouraging tone

If the answer is correct and well-written, praise the student. If there are issues, explain them clearly and provide the correct version."#.into(),
      open_ended_review_template: r#"You are an expert Chinese language teacher reviewing a student's creative answer for {level} level.

Story Passage:
{story}

Open-Ended Question (in Chinese):
{question}

Student's Answer (in Chinese):
{answer}

Review the student's open-ended answer and provide feedback in English. Your review should include:

1. **Content Evaluation**: Does the answer demonstrate understanding and creative thinking? Is it relevant to the question?
2. **Grammar Check**: Identify any grammar mistakes in the Chinese sentence
3. **Language Quality**: Comment on vocabulary usage, sentence structure, and natural expression
4. **Constructive Feedback**: Provide specific suggestions on how to improve the answer
5. **Encouragement**: Acknowledge good points and encourage continued learning

Format your response in markdown for clear readability. Use:
- **Bold** for section headers and key points
- *Italic* for Chinese text and pinyin
- Bullet points for lists
- A friendly, supportive, and encouraging tone

Since this is an open-ended question, focus on the quality of expression rather than looking for a "correct" answer. Appreciate creative and thoughtful responses while helping improve Chinese language skills."#.into(),
    }
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "story_backend", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "story_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "story_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
