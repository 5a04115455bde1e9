//! Application state: prompts, model rosters, story settings and the optional gateway client.
//!
//! Everything here is read-only after startup; requests share nothing mutable.

use tracing::{info, instrument, warn};

use crate::config::{load_agent_config_from_env, AgentConfig, ModelRoster, Prompts, StorySettings};
use crate::error::ApiError;
use crate::gateway::Gateway;

pub struct AppState {
    pub gateway: Option<Gateway>,
    pub prompts: Prompts,
    pub models: ModelRoster,
    pub story: StorySettings,
}

impl AppState {
    /// Build state from env: load TOML config (or defaults), then the gateway client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_agent_config_from_env().unwrap_or_default();
        let gateway = Gateway::from_env(&cfg.gateway);
        Self::from_config(cfg, gateway)
    }

    pub fn from_config(cfg: AgentConfig, gateway: Option<Gateway>) -> Self {
        match &gateway {
            Some(gw) => info!(
                target: "story_backend",
                base_url = %gw.base_url,
                story_models = cfg.models.story.len(),
                analysis_models = cfg.models.analysis.len(),
                question_models = cfg.models.questions.len(),
                review_models = cfg.models.review.len(),
                "LLM gateway enabled."
            ),
            None => warn!(target: "story_backend", "LLM gateway disabled (no LLM_API_KEY). Every LLM endpoint will answer 500."),
        }

        Self {
            gateway,
            prompts: cfg.prompts,
            models: cfg.models,
            story: cfg.story,
        }
    }

    /// The configured gateway, or the configuration error handlers report as 500.
    pub fn gateway(&self) -> Result<&Gateway, ApiError> {
        self.gateway.as_ref().ok_or(ApiError::MissingCredential)
    }
}
