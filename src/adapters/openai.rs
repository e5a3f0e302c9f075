use crate::config::toml_config::EnrichmentConfig;
use crate::domain::model::RequirementRecord;
use crate::domain::ports::{Enricher, Enrichment};
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::LazyLock;
use std::time::Duration;

const SYSTEM_PROMPT: &str =
    "You are a data quality expert who turns raw requirement records into Jira-ready stories.";

/// OpenAI 相容的 chat completions 增強服務
pub struct OpenAiEnricher {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiEnricher {
    pub fn new(config: &EnrichmentConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl Enricher for OpenAiEnricher {
    async fn enrich(&self, record: &RequirementRecord) -> Result<Enrichment> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_prompt(record) }
            ]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SyncError::EnrichmentUnavailable {
                message: format!("status {}: {}", status, text),
            });
        }

        let chat: ChatResponse = response.json().await.map_err(unavailable)?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| SyncError::EnrichmentUnavailable {
                message: "empty completion".to_string(),
            })?;

        tracing::debug!("Enrichment reply for '{}': {}", record.id, content);
        Ok(parse_enrichment(&content))
    }
}

fn unavailable(error: reqwest::Error) -> SyncError {
    SyncError::EnrichmentUnavailable {
        message: error.to_string(),
    }
}

/// 組合單筆記錄的提示內容，空白欄位不送出
pub fn build_prompt(record: &RequirementRecord) -> String {
    let mut prompt = String::from(
        "Analyze this requirement record and provide:\n\
         1. Data quality assessment (VALID/INVALID with a brief reason)\n\
         2. Jira summary (format: [Requirement ID] concise title)\n\
         3. Standardized description (format: As a [user], I want [feature], so that [goal])\n\n\
         Record:\n",
    );

    for (label, value) in [
        ("Requirement ID", &record.id),
        ("Requirement", &record.epic_name),
        ("Description", &record.description),
        ("Priority", &record.priority_code),
        ("Domain", &record.domain),
        ("Sub-domain", &record.sub_domain),
        ("Requirement type", &record.requirement_type),
    ] {
        if !value.trim().is_empty() {
            prompt.push_str(&format!("  {}: {}\n", label, value.trim()));
        }
    }

    prompt.push_str(
        "\nReply in exactly this format:\n\
         Quality: VALID|INVALID - brief reason\n\
         Summary: [Requirement ID] concise title\n\
         Description: As a [user], I want [feature], so that [goal]\n",
    );
    prompt
}

static QUALITY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:-[ \t]*)?Quality[ \t]*:[ \t]*(.*)$")
        .expect("QUALITY_LINE regex should compile")
});
static SUMMARY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:-[ \t]*)?Summary[ \t]*:[ \t]*(.*)$")
        .expect("SUMMARY_LINE regex should compile")
});
static DESCRIPTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:-[ \t]*)?Description[ \t]*:[ \t]*(.*)$")
        .expect("DESCRIPTION_LINE regex should compile")
});

/// 解析逐行格式的回覆；缺少 Quality 行視為有效
pub fn parse_enrichment(content: &str) -> Enrichment {
    let line = |re: &Regex| -> Option<String> {
        re.captures(content)
            .map(|caps| caps[1].trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let is_valid = match line(&QUALITY_LINE) {
        Some(verdict) => !verdict.to_uppercase().starts_with("INVALID"),
        None => true,
    };

    Enrichment {
        is_valid,
        summary: line(&SUMMARY_LINE),
        description: line(&DESCRIPTION_LINE),
    }
}
