use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 正規化後的需求記錄（一列表格資料）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementRecord {
    pub id: String,
    pub epic_name: String,
    pub description: String,
    pub priority_code: String,
    pub domain: String,
    pub sub_domain: String,
    pub requirement_type: String,
}

impl RequirementRecord {
    /// 依設定中的欄位名稱取值，供 labels / components 推導使用
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name.trim().to_ascii_lowercase().as_str() {
            "id" | "requirement_id" => &self.id,
            "epic_name" | "requirement" => &self.epic_name,
            "description" => &self.description,
            "priority" | "priority_code" => &self.priority_code,
            "domain" => &self.domain,
            "sub_domain" | "subdomain" => &self.sub_domain,
            "type" | "requirement_type" => &self.requirement_type,
            _ => return None,
        };
        Some(value.as_str())
    }
}

/// 依 Epic 名稱分組的記錄，保留第一次出現的順序
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpicGroups {
    groups: Vec<EpicGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpicGroup {
    pub name: String,
    pub records: Vec<RequirementRecord>,
}

impl EpicGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, epic_name: &str, record: RequirementRecord) {
        match self.groups.iter_mut().find(|g| g.name == epic_name) {
            Some(group) => group.records.push(record),
            None => self.groups.push(EpicGroup {
                name: epic_name.to_string(),
                records: vec![record],
            }),
        }
    }

    pub fn get(&self, epic_name: &str) -> Option<&[RequirementRecord]> {
        self.groups
            .iter()
            .find(|g| g.name == epic_name)
            .map(|g| g.records.as_slice())
    }

    pub fn names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EpicGroup> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// 追蹤系統回傳的票據識別
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRef {
    pub name: String,
}

/// 建立 Story 所需的全部欄位
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoryDraft {
    pub record_id: String,
    pub summary: String,
    pub description: String,
    pub priority: Option<String>,
    pub labels: Vec<String>,
    pub components: Vec<ComponentRef>,
    pub parent_id: Option<String>,
}

/// Dry-run 模式下代替實際呼叫的描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDescriptor {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// 追蹤系統操作的結果：實際回應或 dry-run 描述
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<T> {
    Done(T),
    DryRun(CallDescriptor),
}

impl<T> Reply<T> {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, Reply::DryRun(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    MissingId,
    InsufficientData,
    OverEpicCap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoryStatus {
    Created { ticket: TicketRef },
    Skipped { existing: TicketRef },
    Planned { call: CallDescriptor },
    Excluded { reason: ExclusionReason },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryOutcome {
    pub epic_name: String,
    pub record_id: String,
    pub summary: String,
    #[serde(flatten)]
    pub status: StoryStatus,
}

/// 單次同步的彙總結果
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub dry_run: bool,
    pub epics_created: usize,
    pub epics_resolved: usize,
    pub stories_created: usize,
    pub stories_skipped: usize,
    pub stories_excluded: usize,
    pub outcomes: Vec<StoryOutcome>,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn outcome_for(&self, record_id: &str) -> Option<&StoryOutcome> {
        self.outcomes.iter().find(|o| o.record_id == record_id)
    }
}
