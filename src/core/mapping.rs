use crate::domain::model::{ComponentRef, RequirementRecord};
use std::collections::{BTreeMap, HashSet};

/// 描述與 ID 都為空時的標題
pub const UNTITLED_SUMMARY: &str = "Untitled Story";

/// 將 P0..P4 之類的代碼對應到追蹤系統的優先級名稱
pub fn map_priority(code: &str, table: &BTreeMap<String, String>) -> Option<String> {
    let key = code.trim().to_uppercase();
    table
        .get(&key)
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

pub fn build_labels(record: &RequirementRecord, fields: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    fields
        .iter()
        .filter_map(|field| record.field(field))
        .map(|value| value.trim().replace(' ', "-").to_lowercase())
        .filter(|label| !label.is_empty())
        .filter(|label| seen.insert(label.clone()))
        .collect()
}

pub fn build_components(record: &RequirementRecord, field: Option<&str>) -> Vec<ComponentRef> {
    let Some(field) = field.filter(|f| !f.trim().is_empty()) else {
        return Vec::new();
    };
    match record.field(field).map(str::trim) {
        Some(value) if !value.is_empty() => vec![ComponentRef {
            name: value.to_string(),
        }],
        _ => Vec::new(),
    }
}

/// `[id] 描述前 N 個字`；兩者皆空時回傳 "Untitled Story"
pub fn make_fallback_summary(id: &str, description: &str, max_words: usize) -> String {
    let short = description
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ");
    let id = id.trim();
    let bracket = if id.is_empty() {
        String::new()
    } else {
        format!("[{}]", id)
    };

    match (bracket.is_empty(), short.is_empty()) {
        (true, true) => UNTITLED_SUMMARY.to_string(),
        (false, true) => bracket,
        (true, false) => short,
        (false, false) => format!("{} {}", bracket, short),
    }
}

/// Epic 描述：成員描述以空行串接
pub fn aggregate_epic_description(records: &[RequirementRecord]) -> String {
    records
        .iter()
        .map(|r| r.description.trim())
        .filter(|d| !d.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
