use crate::config::{Config, DeepseekConfig, GptOssConfig, resolve_api_key};
use crate::parser::canonical_form;
use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Reason reported for rows whose judge call failed
pub const FAILURE_REASON: &str = "call failed";

/// Text substituted for the judge's reply when the call fails
pub fn failure_sentinel() -> String {
    canonical_form(0.0, FAILURE_REASON)
}

/// Prompt in, free text out
#[async_trait]
pub trait Judge: Send + Sync {
    /// Send one prompt to the judge service and return its raw reply
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Call the judge, turning any failure into the failure sentinel
pub async fn call_judge<J: Judge + ?Sized>(judge: &J, prompt: &str) -> String {
    match judge.complete(prompt).await {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "judge call failed");
            failure_sentinel()
        }
    }
}

/// Named judge configurations selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeProfile {
    Deepseek,
    GptOss,
}

impl JudgeProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            JudgeProfile::Deepseek => "Deepseek",
            JudgeProfile::GptOss => "GPT-oss",
        }
    }
}

impl fmt::Display for JudgeProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JudgeProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "deepseek" => Ok(JudgeProfile::Deepseek),
            "gpt-oss" | "gpt_oss" => Ok(JudgeProfile::GptOss),
            _ => anyhow::bail!("unsupported judge profile: {s}"),
        }
    }
}

/// The judge selected for a run
pub enum ProfileJudge {
    Deepseek(DeepseekJudge),
    GptOss(GptOssJudge),
}

impl ProfileJudge {
    /// Build the judge for a profile from its configuration section
    pub fn from_config(profile: JudgeProfile, config: &Config) -> Result<Self> {
        let judge = match profile {
            JudgeProfile::Deepseek => ProfileJudge::Deepseek(DeepseekJudge::new(&config.deepseek)?),
            JudgeProfile::GptOss => ProfileJudge::GptOss(GptOssJudge::new(&config.gpt_oss)?),
        };
        tracing::info!(profile = %profile, endpoint = judge.endpoint(), "judge profile selected");
        Ok(judge)
    }

    pub fn endpoint(&self) -> &str {
        match self {
            ProfileJudge::Deepseek(judge) => &judge.endpoint,
            ProfileJudge::GptOss(judge) => &judge.endpoint,
        }
    }
}

#[async_trait]
impl Judge for ProfileJudge {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self {
            ProfileJudge::Deepseek(judge) => judge.complete(prompt).await,
            ProfileJudge::GptOss(judge) => judge.complete(prompt).await,
        }
    }
}

/// HTTP client for judge traffic; ambient proxy settings never apply to it
fn judge_http_client(timeout_secs: Option<u64>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().no_proxy();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().context("Failed to build judge HTTP client")
}

/// Judge reached through the chat completions API
pub struct DeepseekJudge {
    client: Client<OpenAIConfig>,
    endpoint: String,
    model: String,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

impl DeepseekJudge {
    pub fn new(config: &DeepseekConfig) -> Result<Self> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(resolve_api_key(config.env_var_api_key.as_deref()))
            .with_api_base(&config.api_endpoint);
        let client = Client::with_config(openai_config)
            .with_http_client(judge_http_client(config.request_timeout_secs)?);

        Ok(Self {
            client,
            endpoint: config.api_endpoint.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let user_message: ChatCompletionRequestMessage =
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.to_string())
                .build()
                .context("Failed to build judge user message")?
                .into();

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![user_message])
            .temperature(self.temperature)
            .top_p(self.top_p)
            .max_tokens(self.max_tokens)
            .build()
            .context("Failed to build judge completion request")?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("Judge chat completion failed")?;

        match response.choices.last() {
            Some(choice) => Ok(choice
                .message
                .content
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_string()),
            None => anyhow::bail!("Judge returned no choices"),
        }
    }
}

/// Judge reached through the responses API
pub struct GptOssJudge {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    instructions: String,
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl ResponsesReply {
    /// Concatenated text of every `output_text` part of every message item
    fn text(self) -> String {
        if let Some(text) = self.output_text {
            return text;
        }

        self.output
            .into_iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content)
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text)
            .collect()
    }
}

impl GptOssJudge {
    pub fn new(config: &GptOssConfig) -> Result<Self> {
        Ok(Self {
            http: judge_http_client(config.request_timeout_secs)?,
            endpoint: config.api_endpoint.clone(),
            model: config.model.clone(),
            api_key: resolve_api_key(config.env_var_api_key.as_deref()),
            instructions: config.instructions.clone(),
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/responses", self.endpoint.trim_end_matches('/'));
        let body = ResponsesRequest {
            model: &self.model,
            instructions: &self.instructions,
            input: prompt,
        };

        let reply: ResponsesReply = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach judge at {url}"))?
            .error_for_status()
            .context("Judge returned an error status")?
            .json()
            .await
            .context("Failed to decode judge response")?;

        Ok(reply.text())
    }
}
