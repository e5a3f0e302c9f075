use crate::domain::model::{Reply, RequirementRecord, StoryDraft, TicketRef};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// 與具體 HTTP 函式庫無關的請求描述，path 相對於追蹤系統 base URL
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>, query: Vec<(String, String)>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            query,
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 單次 HTTP 往返；重試與狀態碼判讀由上層負責
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpReply>;
}

/// 追蹤系統的四個邏輯操作
#[async_trait]
pub trait Tracker: Send + Sync {
    async fn search_by_name(&self, epic_name: &str) -> Result<Reply<Option<TicketRef>>>;
    async fn search_by_record_id(&self, record_id: &str) -> Result<Reply<Option<TicketRef>>>;
    async fn create_epic(&self, name: &str, description: &str) -> Result<Reply<TicketRef>>;
    async fn create_story(&self, story: &StoryDraft) -> Result<Reply<TicketRef>>;
}

/// 外部文字增強服務的判定結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub is_valid: bool,
    pub summary: Option<String>,
    pub description: Option<String>,
}

#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, record: &RequirementRecord) -> Result<Enrichment>;
}
