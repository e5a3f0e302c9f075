use crate::config::toml_config::{LookupStrategy, TrackerConfig};
use crate::domain::model::{CallDescriptor, Reply, StoryDraft, TicketRef};
use crate::domain::ports::{HttpReply, HttpRequest, Tracker, Transport};
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// 會觸發重試的 HTTP 狀態碼
pub const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

pub fn is_transient_status(status: u16) -> bool {
    TRANSIENT_STATUSES.contains(&status)
}

/// 單次重試等待的上限
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// 每次呼叫的重試預算；計數只存在於單次呼叫的迴圈內
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// 第 n 次重試前的等待時間（n 從 1 開始）：1, 2, 4 ... 倍 base_delay，上限 MAX_RETRY_DELAY
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        self.base_delay
            .checked_mul(2u32.saturating_pow(retry.saturating_sub(1)))
            .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
    }
}

enum TransientFailure {
    Status { status: u16, body: String },
    Network(String),
}

impl std::fmt::Display for TransientFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransientFailure::Status { status, .. } => write!(f, "status {}", status),
            TransientFailure::Network(message) => write!(f, "{}", message),
        }
    }
}

/// 搜尋結果中的一筆候選票據
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IssueMatch {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub fields: IssueFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IssueFields {
    #[serde(default)]
    pub summary: String,
}

impl IssueMatch {
    fn to_ref(&self) -> TicketRef {
        TicketRef {
            id: self.id.clone(),
            key: self.key.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<IssueMatch>,
}

/// 追蹤系統客戶端：重試、dry-run 短路與冪等查詢
pub struct TrackerClient<T: Transport> {
    /// None 代表 dry-run，不會有任何網路存取
    transport: Option<T>,
    project_key: String,
    search_path: String,
    issue_path: String,
    epic_issue_type: String,
    story_issue_type: String,
    epic_name_field: String,
    lookup_strategy: LookupStrategy,
    search_max_results: usize,
    retry: RetryPolicy,
}

impl<T: Transport> TrackerClient<T> {
    pub fn live(transport: T, config: &TrackerConfig) -> Self {
        Self::build(Some(transport), config)
    }

    pub fn dry_run(config: &TrackerConfig) -> Self {
        Self::build(None, config)
    }

    fn build(transport: Option<T>, config: &TrackerConfig) -> Self {
        let project_key = if config.project_key.trim().is_empty() {
            "DRYRUN".to_string()
        } else {
            config.project_key.trim().to_string()
        };

        Self {
            transport,
            project_key,
            search_path: config.search_path.clone(),
            issue_path: config.issue_path.clone(),
            epic_issue_type: config.epic_issue_type.clone(),
            story_issue_type: config.story_issue_type.clone(),
            epic_name_field: config.epic_name_field.clone(),
            lookup_strategy: config.lookup_strategy,
            search_max_results: config.search_max_results.max(1),
            retry: RetryPolicy::from_config(config),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.transport.is_none()
    }

    async fn execute(&self, request: HttpRequest) -> Result<Reply<Value>> {
        let Some(transport) = &self.transport else {
            tracing::debug!(
                "🔍 [DRY RUN] {} {}",
                request.method.as_str(),
                request.path
            );
            return Ok(Reply::DryRun(CallDescriptor {
                method: request.method.as_str().to_string(),
                path: request.path,
                query: request.query,
                payload: request.body,
            }));
        };

        self.send_with_retry(transport, &request).await.map(Reply::Done)
    }

    async fn send_with_retry(&self, transport: &T, request: &HttpRequest) -> Result<Value> {
        let mut attempt: u32 = 1;
        loop {
            let failure = match transport.send(request).await {
                Ok(reply) if reply.is_success() => return parse_body(&reply),
                Ok(reply) if is_transient_status(reply.status) => TransientFailure::Status {
                    status: reply.status,
                    body: reply.body,
                },
                Ok(reply) => return Err(rejection(reply)),
                Err(e) if e.is_transient() => TransientFailure::Network(e.to_string()),
                Err(e) => return Err(e),
            };

            if attempt >= self.retry.max_attempts {
                tracing::error!(
                    "❌ {} {} failed after {} attempts: {}",
                    request.method.as_str(),
                    request.path,
                    attempt,
                    failure
                );
                return Err(match failure {
                    TransientFailure::Status { status: 429, .. } => {
                        SyncError::RateLimited { attempts: attempt }
                    }
                    TransientFailure::Status { status, body } => SyncError::TransientNetworkError {
                        attempts: attempt,
                        message: format!("status {}: {}", status, body),
                    },
                    TransientFailure::Network(message) => SyncError::TransientNetworkError {
                        attempts: attempt,
                        message,
                    },
                });
            }

            let delay = self.retry.delay_before_retry(attempt);
            tracing::warn!(
                "🔄 {} {} hit {}, retrying in {:?} (attempt {}/{})",
                request.method.as_str(),
                request.path,
                failure,
                delay,
                attempt + 1,
                self.retry.max_attempts
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn search(&self, jql: String, max_results: usize) -> Result<Reply<Vec<IssueMatch>>> {
        tracing::debug!("Searching tracker: {}", jql);
        let request = HttpRequest::get(
            self.search_path.clone(),
            vec![
                ("jql".to_string(), jql),
                ("maxResults".to_string(), max_results.to_string()),
                ("fields".to_string(), "summary".to_string()),
            ],
        );

        match self.execute(request).await? {
            Reply::DryRun(call) => Ok(Reply::DryRun(call)),
            Reply::Done(value) => {
                let response: SearchResponse = serde_json::from_value(value)?;
                Ok(Reply::Done(response.issues))
            }
        }
    }

    async fn search_epic_exact(&self, epic_name: &str) -> Result<Reply<Option<TicketRef>>> {
        let jql = format!(
            "{} AND \"{}\" = \"{}\"",
            self.issue_type_clause(&self.epic_issue_type),
            jql_escape(&self.epic_name_field),
            jql_escape(epic_name)
        );

        match self.search(jql, 1).await {
            Ok(Reply::DryRun(call)) => Ok(Reply::DryRun(call)),
            Ok(Reply::Done(issues)) => Ok(Reply::Done(issues.first().map(IssueMatch::to_ref))),
            Err(e) if e.status() == Some(400) => {
                tracing::debug!(
                    "Exact lookup on '{}' unsupported by tracker: {}",
                    self.epic_name_field,
                    e
                );
                Ok(Reply::Done(None))
            }
            Err(e) => Err(e),
        }
    }

    async fn search_epic_fuzzy(&self, epic_name: &str) -> Result<Reply<Option<TicketRef>>> {
        let jql = format!(
            "{} AND summary ~ \"{}\"",
            self.issue_type_clause(&self.epic_issue_type),
            jql_escape(&phrase(epic_name))
        );

        match self.search(jql, self.search_max_results).await {
            Ok(Reply::DryRun(call)) => Ok(Reply::DryRun(call)),
            Ok(Reply::Done(issues)) => Ok(Reply::Done(
                issues
                    .iter()
                    .find(|issue| title_matches_name(&issue.fields.summary, epic_name))
                    .map(IssueMatch::to_ref),
            )),
            Err(e) if e.status() == Some(400) => {
                tracing::warn!("⚠️ Epic search rejected by tracker, treating as not found: {}", e);
                Ok(Reply::Done(None))
            }
            Err(e) => Err(e),
        }
    }

    fn issue_type_clause(&self, issue_type: &str) -> String {
        format!(
            "project = \"{}\" AND issuetype = \"{}\"",
            jql_escape(&self.project_key),
            jql_escape(issue_type)
        )
    }

    fn fields_base(&self, summary: &str, issue_type: &str, description: &str) -> serde_json::Map<String, Value> {
        let mut fields = serde_json::Map::new();
        fields.insert("project".to_string(), json!({ "key": self.project_key }));
        fields.insert("summary".to_string(), json!(summary));
        fields.insert("issuetype".to_string(), json!({ "name": issue_type }));
        if !description.trim().is_empty() {
            fields.insert("description".to_string(), adf_document(description));
        }
        fields
    }

    async fn create(&self, fields: serde_json::Map<String, Value>) -> Result<Reply<TicketRef>> {
        let request = HttpRequest::post(self.issue_path.clone(), json!({ "fields": fields }));
        match self.execute(request).await? {
            Reply::DryRun(call) => Ok(Reply::DryRun(call)),
            Reply::Done(value) => Ok(Reply::Done(serde_json::from_value(value)?)),
        }
    }
}

#[async_trait]
impl<T: Transport> Tracker for TrackerClient<T> {
    async fn search_by_name(&self, epic_name: &str) -> Result<Reply<Option<TicketRef>>> {
        match self.lookup_strategy {
            LookupStrategy::Exact => self.search_epic_exact(epic_name).await,
            LookupStrategy::Fuzzy => self.search_epic_fuzzy(epic_name).await,
            LookupStrategy::ExactThenFuzzy => match self.search_epic_exact(epic_name).await? {
                Reply::Done(None) => self.search_epic_fuzzy(epic_name).await,
                found => Ok(found),
            },
        }
    }

    async fn search_by_record_id(&self, record_id: &str) -> Result<Reply<Option<TicketRef>>> {
        let record_id = record_id.trim();
        if record_id.is_empty() {
            return Ok(Reply::Done(None));
        }

        let jql = format!(
            "{} AND summary ~ \"{}\"",
            self.issue_type_clause(&self.story_issue_type),
            jql_escape(&phrase(record_id))
        );

        // 查詢策略只影響 Epic；Story 一律驗證候選標題
        match self.search(jql, self.search_max_results).await {
            Ok(Reply::DryRun(call)) => Ok(Reply::DryRun(call)),
            Ok(Reply::Done(issues)) => Ok(Reply::Done(
                issues
                    .iter()
                    .find(|issue| title_matches_record(&issue.fields.summary, record_id))
                    .map(IssueMatch::to_ref),
            )),
            Err(e) if e.status() == Some(400) => {
                tracing::warn!(
                    "⚠️ Story search for '{}' rejected by tracker, treating as not found: {}",
                    record_id,
                    e
                );
                Ok(Reply::Done(None))
            }
            Err(e) => Err(e),
        }
    }

    async fn create_epic(&self, name: &str, description: &str) -> Result<Reply<TicketRef>> {
        let fields = self.fields_base(name, &self.epic_issue_type, description);
        self.create(fields).await
    }

    async fn create_story(&self, story: &StoryDraft) -> Result<Reply<TicketRef>> {
        let mut fields = self.fields_base(&story.summary, &self.story_issue_type, &story.description);
        if let Some(priority) = &story.priority {
            fields.insert("priority".to_string(), json!({ "name": priority }));
        }
        if let Some(parent_id) = story.parent_id.as_deref().filter(|id| !id.is_empty()) {
            fields.insert("parent".to_string(), json!({ "id": parent_id }));
        }
        if !story.labels.is_empty() {
            fields.insert("labels".to_string(), json!(story.labels));
        }
        if !story.components.is_empty() {
            fields.insert("components".to_string(), json!(story.components));
        }
        self.create(fields).await
    }
}

fn parse_body(reply: &HttpReply) -> Result<Value> {
    if reply.body.trim().is_empty() {
        return Ok(json!({}));
    }
    Ok(serde_json::from_str(&reply.body)?)
}

fn rejection(reply: HttpReply) -> SyncError {
    if (400..500).contains(&reply.status) {
        SyncError::ClientRequestError {
            status: reply.status,
            body: reply.body,
        }
    } else {
        SyncError::UnexpectedStatus {
            status: reply.status,
            body: reply.body,
        }
    }
}

/// Atlassian Document Format：單一段落包住純文字
pub fn adf_document(text: &str) -> Value {
    json!({
        "type": "doc",
        "version": 1,
        "content": [{
            "type": "paragraph",
            "content": [{ "type": "text", "text": text }]
        }]
    })
}

/// JQL 字串常值只需跳脫反斜線與雙引號
pub fn jql_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn phrase(text: &str) -> String {
    format!("\"{}\"", text.trim())
}

/// 全文搜尋不精確，候選標題必須以 ID 開頭或含有 `[ID]`
pub fn title_matches_record(title: &str, record_id: &str) -> bool {
    let title = title.trim_start();
    if title.contains(&format!("[{}]", record_id)) {
        return true;
    }
    match title.strip_prefix(record_id) {
        Some(rest) => rest.chars().next().map_or(true, |c| !c.is_alphanumeric()),
        None => false,
    }
}

pub fn title_matches_name(title: &str, epic_name: &str) -> bool {
    title.trim().to_lowercase() == epic_name.trim().to_lowercase()
}
