use crate::domain::model::RequirementRecord;
use serde::Serialize;
use std::collections::BTreeMap;

/// 描述少於此字數時提示補充
pub const MIN_DESCRIPTION_WORDS: usize = 3;

/// 單一記錄的檢查問題
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordIssue {
    MissingId,
    MissingEpic,
    MissingDescription,
    UnknownPriority { code: String },
    ShortDescription { words: usize },
}

impl std::fmt::Display for RecordIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordIssue::MissingId => write!(f, "missing requirement id"),
            RecordIssue::MissingEpic => write!(f, "missing requirement (epic name)"),
            RecordIssue::MissingDescription => write!(f, "missing description"),
            RecordIssue::UnknownPriority { code } => {
                write!(f, "priority '{}' is not in the priority table", code)
            }
            RecordIssue::ShortDescription { words } => write!(
                f,
                "description has {} words; consider at least {}",
                words, MIN_DESCRIPTION_WORDS
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFinding {
    /// 表格中的列號（表頭後第一列為 1）
    pub row: usize,
    pub id: String,
    pub issues: Vec<RecordIssue>,
}

/// 不呼叫追蹤系統的輸入檢查結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub total_records: usize,
    pub valid_records: usize,
    pub findings: Vec<RecordFinding>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn issue_count(&self) -> usize {
        self.findings.iter().map(|f| f.issues.len()).sum()
    }
}

/// 檢查每筆記錄的必填欄位、優先級代碼與描述長度
pub fn validate_records(
    records: &[RequirementRecord],
    priority_table: &BTreeMap<String, String>,
) -> ValidationReport {
    let findings: Vec<RecordFinding> = records
        .iter()
        .enumerate()
        .filter_map(|(idx, record)| {
            let issues = check_record(record, priority_table);
            (!issues.is_empty()).then(|| RecordFinding {
                row: idx + 1,
                id: record.id.trim().to_string(),
                issues,
            })
        })
        .collect();

    let report = ValidationReport {
        total_records: records.len(),
        valid_records: records.len() - findings.len(),
        findings,
    };
    tracing::info!(
        "🔍 Validated {} records: {} valid, {} issues",
        report.total_records,
        report.valid_records,
        report.issue_count()
    );
    report
}

fn check_record(record: &RequirementRecord, priority_table: &BTreeMap<String, String>) -> Vec<RecordIssue> {
    let mut issues = Vec::new();

    if record.id.trim().is_empty() {
        issues.push(RecordIssue::MissingId);
    }
    if record.epic_name.trim().is_empty() {
        issues.push(RecordIssue::MissingEpic);
    }

    let code = record.priority_code.trim().to_uppercase();
    if !code.is_empty() && !priority_table.contains_key(&code) {
        issues.push(RecordIssue::UnknownPriority { code });
    }

    let words = record.description.split_whitespace().count();
    if words == 0 {
        issues.push(RecordIssue::MissingDescription);
    } else if words < MIN_DESCRIPTION_WORDS {
        issues.push(RecordIssue::ShortDescription { words });
    }
    issues
}
