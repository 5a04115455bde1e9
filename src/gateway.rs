//! Minimal client for an OpenAI-compatible chat-completions gateway, plus the
//! model fallback loop every handler goes through.
//!
//! One request = one ordered list of model candidates. Each candidate gets
//! exactly one POST; its reply is normalized right away and a reply that does
//! not normalize counts as that candidate's failure.
//!
//! Failure classes:
//!   - 429 / 500, empty content, bad content, transport errors, timeouts: try the next model
//!   - any other non-2xx status: stop immediately
//!
//! Calls log model names, statuses and latencies, never prompt contents or the API key.

use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::config::GatewaySettings;
use crate::domain::ConversationMessage;
use crate::normalize::NormalizeError;
use crate::util::trunc_for_log;

/// Why one model candidate did not produce a result.
#[derive(Debug, Error)]
pub enum CallError {
  #[error("{status} - {body}")]
  Status { status: u16, body: String },
  #[error("no_content - No content in response")]
  EmptyContent,
  #[error("{} - {}", .0.label(), .0)]
  Content(#[from] NormalizeError),
  #[error("timeout - {0}")]
  Timeout(String),
  #[error("error - {0}")]
  Transport(String),
}

impl CallError {
  /// Retryable failures move on to the next candidate; the rest end the request.
  pub fn is_retryable(&self) -> bool {
    match self {
      CallError::Status { status, .. } => matches!(status, 429 | 500),
      _ => true,
    }
  }

  fn from_reqwest(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      CallError::Timeout(e.to_string())
    } else {
      CallError::Transport(e.to_string())
    }
  }
}

/// Outcome of a whole fallback run that produced nothing.
#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("{cause}")]
  Exhausted { model: String, cause: CallError },
  #[error("{cause}")]
  Aborted { model: String, cause: CallError },
  #[error("no models configured for this operation")]
  NoModels,
}

impl GatewayError {
  /// Model whose failure ended the run.
  pub fn model(&self) -> Option<&str> {
    match self {
      GatewayError::Exhausted { model, .. } | GatewayError::Aborted { model, .. } => Some(model),
      GatewayError::NoModels => None,
    }
  }
}

#[derive(Clone)]
pub struct Gateway {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub app_name: String,
  pub referer: Option<String>,
}

impl Gateway {
  pub fn new(settings: &GatewaySettings, api_key: String) -> Result<Self, reqwest::Error> {
    let mut builder = reqwest::Client::builder();
    if settings.timeout_secs > 0 {
      builder = builder.timeout(Duration::from_secs(settings.timeout_secs));
    }
    Ok(Self {
      client: builder.build()?,
      api_key,
      base_url: settings.base_url.trim_end_matches('/').to_string(),
      app_name: settings.app_name.clone(),
      referer: settings.referer.clone(),
    })
  }

  /// Construct the client if LLM_API_KEY (or OPENROUTER_API_KEY) is set; otherwise None.
  /// LLM_BASE_URL overrides the configured base URL.
  pub fn from_env(settings: &GatewaySettings) -> Option<Self> {
    let api_key = std::env::var("LLM_API_KEY")
      .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
      .ok()
      .filter(|k| !k.trim().is_empty())?;
    let mut settings = settings.clone();
    if let Ok(url) = std::env::var("LLM_BASE_URL") {
      settings.base_url = url;
    }
    match Self::new(&settings, api_key) {
      Ok(gw) => Some(gw),
      Err(e) => {
        error!(target: "gateway", error = %e, "Failed to build HTTP client");
        None
      }
    }
  }

  /// One chat completion against one model. Returns the raw completion text.
  #[instrument(level = "info", skip(self, messages), fields(model = %model, messages = messages.len()))]
  async fn chat(&self, model: &str, messages: &[ConversationMessage], title: &str) -> Result<String, CallError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model,
      messages: messages
        .iter()
        .map(|m| ChatMessageReq { role: m.role.as_str(), content: &m.content })
        .collect(),
    };

    let mut builder = self.client.post(&url)
      .header(USER_AGENT, "hsk-story-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .header("X-Title", format!("{} - {}", self.app_name, title));
    if let Some(referer) = &self.referer {
      builder = builder.header("HTTP-Referer", referer);
    }

    let res = builder.json(&req).send().await.map_err(CallError::from_reqwest)?;

    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      return Err(CallError::Status { status: status.as_u16(), body });
    }

    let body: ChatCompletionResponse = res.json().await.map_err(CallError::from_reqwest)?;
    if let Some(usage) = &body.usage {
      info!(target: "gateway", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "Gateway usage");
    }

    body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .filter(|text| !text.trim().is_empty())
      .ok_or(CallError::EmptyContent)
  }

  /// Try `models` in order until one reply passes `accept`.
  ///
  /// `title` names the operation in the `X-Title` header and in logs.
  #[instrument(level = "info", skip(self, models, messages, accept), fields(candidates = models.len()))]
  pub async fn complete_with_fallback<T, F>(
    &self,
    title: &str,
    models: &[String],
    messages: &[ConversationMessage],
    mut accept: F,
  ) -> Result<T, GatewayError>
  where
    F: FnMut(&str) -> Result<T, NormalizeError>,
  {
    let mut last: Option<(String, CallError)> = None;

    for model in models {
      let start = Instant::now();
      let outcome = match self.chat(model, messages, title).await {
        Ok(text) => accept(text.as_str()).map_err(|e| {
          warn!(target: "gateway", %model, reply = %trunc_for_log(&text, 120), "Reply did not normalize");
          CallError::from(e)
        }),
        Err(e) => Err(e),
      };
      let elapsed = start.elapsed();

      match outcome {
        Ok(value) => {
          info!(target: "gateway", %model, %title, ?elapsed, "Model candidate succeeded");
          return Ok(value);
        }
        Err(cause) if cause.is_retryable() => {
          warn!(target: "gateway", %model, %title, ?elapsed, error = %cause, "Model candidate failed; trying next");
          last = Some((model.clone(), cause));
        }
        Err(cause) => {
          error!(target: "gateway", %model, %title, ?elapsed, error = %cause, "Model candidate failed terminally; aborting");
          return Err(GatewayError::Aborted { model: model.clone(), cause });
        }
      }
    }

    match last {
      Some((model, cause)) => Err(GatewayError::Exhausted { model, cause }),
      None => Err(GatewayError::NoModels),
    }
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessageReq<'a>>,
}
#[derive(Serialize)]
struct ChatMessageReq<'a> { role: &'a str, content: &'a str }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)] choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { #[serde(default)] content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Role;
  use crate::normalize::normalize_text;
  use mockito::{Matcher, Server, ServerGuard};
  use serde_json::json;

  fn gateway_for(server: &ServerGuard) -> Gateway {
    let settings = GatewaySettings { base_url: server.url(), ..GatewaySettings::default() };
    Gateway::new(&settings, "test-key".into()).unwrap()
  }

  fn models(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
  }

  fn prompt() -> Vec<ConversationMessage> {
    vec![ConversationMessage { role: Role::User, content: "hi".into() }]
  }

  fn completion(content: &str) -> String {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] }).to_string()
  }

  #[tokio::test]
  async fn rate_limited_candidate_falls_through_to_next() {
    let mut server = Server::new_async().await;
    let first = server.mock("POST", "/chat/completions")
      .match_body(Matcher::PartialJson(json!({ "model": "m-a" })))
      .with_status(429)
      .with_body("slow down")
      .expect(1)
      .create_async().await;
    let second = server.mock("POST", "/chat/completions")
      .match_body(Matcher::PartialJson(json!({ "model": "m-b" })))
      .match_header("authorization", "Bearer test-key")
      .match_header("x-title", "Chinese Practice App - Test")
      .with_status(200)
      .with_body(completion("ok"))
      .expect(1)
      .create_async().await;

    let gw = gateway_for(&server);
    let out = gw.complete_with_fallback("Test", &models(&["m-a", "m-b"]), &prompt(), normalize_text).await;

    assert_eq!(out.unwrap(), "ok");
    first.assert_async().await;
    second.assert_async().await;
  }

  #[tokio::test]
  async fn forbidden_aborts_without_trying_next() {
    let mut server = Server::new_async().await;
    let _first = server.mock("POST", "/chat/completions")
      .match_body(Matcher::PartialJson(json!({ "model": "m-a" })))
      .with_status(403)
      .with_body("no access")
      .create_async().await;
    let second = server.mock("POST", "/chat/completions")
      .match_body(Matcher::PartialJson(json!({ "model": "m-b" })))
      .with_status(200)
      .with_body(completion("ok"))
      .expect(0)
      .create_async().await;

    let gw = gateway_for(&server);
    let err = gw
      .complete_with_fallback("Test", &models(&["m-a", "m-b"]), &prompt(), normalize_text)
      .await
      .unwrap_err();

    assert!(matches!(&err, GatewayError::Aborted { model, .. } if model == "m-a"));
    assert_eq!(err.to_string(), "403 - no access");
    second.assert_async().await;
  }

  #[tokio::test]
  async fn empty_content_and_bad_shape_are_retryable() {
    let mut server = Server::new_async().await;
    let _a = server.mock("POST", "/chat/completions")
      .match_body(Matcher::PartialJson(json!({ "model": "m-a" })))
      .with_status(200)
      .with_body(json!({ "choices": [{ "message": { "content": null } }] }).to_string())
      .create_async().await;
    let _b = server.mock("POST", "/chat/completions")
      .match_body(Matcher::PartialJson(json!({ "model": "m-b" })))
      .with_status(200)
      .with_body(completion("not json"))
      .create_async().await;
    let _c = server.mock("POST", "/chat/completions")
      .match_body(Matcher::PartialJson(json!({ "model": "m-c" })))
      .with_status(200)
      .with_body(completion("[1, 2]"))
      .create_async().await;

    let gw = gateway_for(&server);
    let out = gw
      .complete_with_fallback("Test", &models(&["m-a", "m-b", "m-c"]), &prompt(), |raw| {
        serde_json::from_str::<Vec<u8>>(raw).map_err(|e| NormalizeError::Parse(e.to_string()))
      })
      .await;

    assert_eq!(out.unwrap(), vec![1, 2]);
  }

  #[tokio::test]
  async fn exhaustion_reports_last_failure() {
    let mut server = Server::new_async().await;
    let _a = server.mock("POST", "/chat/completions")
      .match_body(Matcher::PartialJson(json!({ "model": "m-a" })))
      .with_status(429)
      .with_body("rate limited")
      .create_async().await;
    let _b = server.mock("POST", "/chat/completions")
      .match_body(Matcher::PartialJson(json!({ "model": "m-b" })))
      .with_status(500)
      .with_body("upstream exploded")
      .create_async().await;

    let gw = gateway_for(&server);
    let err = gw
      .complete_with_fallback("Test", &models(&["m-a", "m-b"]), &prompt(), normalize_text)
      .await
      .unwrap_err();

    assert!(matches!(&err, GatewayError::Exhausted { .. }));
    assert_eq!(err.model(), Some("m-b"));
    assert_eq!(err.to_string(), "500 - upstream exploded");
  }

  #[tokio::test]
  async fn undecodable_body_is_retryable() {
    let mut server = Server::new_async().await;
    let first = server.mock("POST", "/chat/completions")
      .match_body(Matcher::PartialJson(json!({ "model": "m-a" })))
      .with_status(200)
      .with_header("content-type", "text/html")
      .with_body("<html>gateway maintenance</html>")
      .expect(1)
      .create_async().await;
    let second = server.mock("POST", "/chat/completions")
      .match_body(Matcher::PartialJson(json!({ "model": "m-b" })))
      .with_status(200)
      .with_body(completion("ok"))
      .expect(1)
      .create_async().await;

    let gw = gateway_for(&server);
    let out = gw.complete_with_fallback("Test", &models(&["m-a", "m-b"]), &prompt(), normalize_text).await;

    assert_eq!(out.unwrap(), "ok");
    first.assert_async().await;
    second.assert_async().await;
  }

  #[tokio::test]
  async fn undecodable_body_alone_surfaces_as_error_label() {
    let mut server = Server::new_async().await;
    let _only = server.mock("POST", "/chat/completions")
      .with_status(200)
      .with_body("not json")
      .create_async().await;

    let gw = gateway_for(&server);
    let err = gw
      .complete_with_fallback("Test", &models(&["m-a"]), &prompt(), normalize_text)
      .await
      .unwrap_err();

    assert!(matches!(&err, GatewayError::Exhausted { cause: CallError::Transport(_), .. }));
    assert!(err.to_string().starts_with("error - "));
  }

  /// Read one HTTP/1.1 request (headers plus `content-length` body) off `sock`.
  async fn read_request(sock: &mut tokio::net::TcpStream) {
    use tokio::io::AsyncReadExt;
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
      let n = sock.read(&mut chunk).await.unwrap();
      if n == 0 {
        return;
      }
      buf.extend_from_slice(&chunk[..n]);
      let text = String::from_utf8_lossy(&buf);
      if let Some(head_end) = text.find("\r\n\r\n") {
        let body_len = text[..head_end]
          .lines()
          .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") { value.trim().parse::<usize>().ok() } else { None }
          })
          .unwrap_or(0);
        if buf.len() >= head_end + 4 + body_len {
          return;
        }
      }
    }
  }

  #[tokio::test]
  async fn slow_candidate_times_out_and_falls_through() {
    use tokio::io::AsyncWriteExt;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = tokio::spawn(async move {
      // First candidate: request read, never answered.
      let (mut stalled, _) = listener.accept().await.unwrap();
      read_request(&mut stalled).await;

      let (mut sock, _) = listener.accept().await.unwrap();
      read_request(&mut sock).await;
      let body = completion("ok");
      let reply = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
      );
      sock.write_all(reply.as_bytes()).await.unwrap();
      sock.flush().await.unwrap();
      stalled
    });

    let settings = GatewaySettings {
      base_url: format!("http://{}", addr),
      timeout_secs: 1,
      ..GatewaySettings::default()
    };
    let gw = Gateway::new(&settings, "test-key".into()).unwrap();
    let start = Instant::now();
    let out = gw.complete_with_fallback("Test", &models(&["m-slow", "m-b"]), &prompt(), normalize_text).await;

    assert_eq!(out.unwrap(), "ok");
    assert!(start.elapsed() < Duration::from_secs(10));
    drop(peer.await.unwrap());
  }

  #[tokio::test]
  async fn configured_referer_is_sent() {
    let mut server = Server::new_async().await;
    let only = server.mock("POST", "/chat/completions")
      .match_header("http-referer", "https://reader.example")
      .with_status(200)
      .with_body(completion("ok"))
      .expect(1)
      .create_async().await;

    let settings = GatewaySettings {
      base_url: server.url(),
      referer: Some("https://reader.example".into()),
      ..GatewaySettings::default()
    };
    let gw = Gateway::new(&settings, "test-key".into()).unwrap();
    let out = gw.complete_with_fallback("Test", &models(&["m-a"]), &prompt(), normalize_text).await;

    assert_eq!(out.unwrap(), "ok");
    only.assert_async().await;
  }

  #[tokio::test]
  async fn no_models_is_its_own_error() {
    let server = Server::new_async().await;
    let gw = gateway_for(&server);
    let err = gw.complete_with_fallback("Test", &[], &prompt(), normalize_text).await.unwrap_err();
    assert!(matches!(err, GatewayError::NoModels));
  }

  #[test]
  fn classification_matches_status_table() {
    let status = |s| CallError::Status { status: s, body: String::new() };
    assert!(status(429).is_retryable());
    assert!(status(500).is_retryable());
    assert!(!status(400).is_retryable());
    assert!(!status(403).is_retryable());
    assert!(!status(503).is_retryable());
    assert!(CallError::EmptyContent.is_retryable());
    assert!(CallError::Timeout("t".into()).is_retryable());
  }
}
