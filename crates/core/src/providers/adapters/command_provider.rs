//! Provider that reaches a model through a command-line tool.

use crate::providers::base::{ModelError, ModelProvider, ModelRequest, ModelResponse};
use crate::providers::command_executor::CommandExecutor;
use async_trait::async_trait;
use serde::Deserialize;
use sk_protocol::config_models::ProviderProfile;
use sk_protocol::run_models::TokenUsage;
use std::time::Duration;
use tracing::debug;

const MODEL_PLACEHOLDER: &str = "{model}";
const PROMPT_PLACEHOLDER: &str = "{prompt}";

/// Command adapter for invoking a model CLI.
///
/// Every call spawns `profile.command` with `profile.args`, replacing
/// `{model}` and `{prompt}`. When no argument mentions `{prompt}` the prompt
/// is written to stdin instead.
///
/// Stdout is the response. If it parses as a JSON object carrying a
/// `result`/`text`/`output` field, that field is the response and any
/// `usage.input_tokens`/`usage.output_tokens` and `total_cost_usd`/`cost`
/// fields are recorded.
pub struct CommandProvider {
    profile: ProviderProfile,
}

impl CommandProvider {
    pub fn new(profile: ProviderProfile) -> Self {
        Self { profile }
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    fn build_args(&self, request: &ModelRequest) -> (Vec<String>, Option<String>) {
        let prompt_in_args = self
            .profile
            .args
            .iter()
            .any(|arg| arg.contains(PROMPT_PLACEHOLDER));

        let args = self
            .profile
            .args
            .iter()
            .map(|arg| {
                arg.replace(MODEL_PLACEHOLDER, &request.model)
                    .replace(PROMPT_PLACEHOLDER, &request.prompt)
            })
            .collect();

        let stdin = if prompt_in_args {
            None
        } else {
            Some(request.prompt.clone())
        };

        (args, stdin)
    }

    fn timeout(&self) -> Option<Duration> {
        self.profile.timeout_secs.map(Duration::from_secs)
    }
}

#[async_trait]
impl ModelProvider for CommandProvider {
    async fn check_availability(&self) -> bool {
        which::which(&self.profile.command).is_ok()
    }

    #[tracing::instrument(skip(self, request), fields(provider = %self.profile.name, model = %request.model), level = "debug")]
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let (args, stdin) = self.build_args(request);
        let output = CommandExecutor::run(&self.profile.command, &args, stdin, self.timeout()).await?;

        if !output.success {
            return Err(classify_failure(&output.stderr, &output.stdout, output.exit_code));
        }

        debug!(bytes = output.stdout.len(), "command provider returned");
        Ok(parse_response(&output.stdout))
    }
}

/// Structured output some model CLIs emit with a JSON output flag.
#[derive(Debug, Deserialize)]
struct JsonOutput {
    #[serde(alias = "text", alias = "output")]
    result: Option<String>,
    usage: Option<JsonUsage>,
    #[serde(alias = "cost")]
    total_cost_usd: Option<f64>,
    is_error: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct JsonUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

fn parse_response(stdout: &str) -> ModelResponse {
    let trimmed = stdout.trim();

    if trimmed.starts_with('{') {
        if let Ok(parsed) = serde_json::from_str::<JsonOutput>(trimmed) {
            if let (Some(text), false) = (parsed.result, parsed.is_error.unwrap_or(false)) {
                return ModelResponse {
                    text: text.trim().to_string(),
                    token_usage: parsed.usage.map(|usage| TokenUsage {
                        input: usage.input_tokens.unwrap_or(0),
                        output: usage.output_tokens.unwrap_or(0),
                    }),
                    cost_estimate: parsed.total_cost_usd,
                };
            }
        }
    }

    ModelResponse::text(trimmed)
}

fn classify_failure(stderr: &str, stdout: &str, exit_code: Option<i32>) -> ModelError {
    let detail = if stderr.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    };
    let lower = detail.to_lowercase();

    if lower.contains("rate limit") || lower.contains("rate_limit") || lower.contains("429") {
        ModelError::RateLimited(detail.to_string())
    } else {
        let code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
        ModelError::ProviderError(format!("exit {code}: {detail}"))
    }
}
